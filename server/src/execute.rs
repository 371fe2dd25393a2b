//! Command execution - bridges protocol commands to cache operations.

use bytes::BytesMut;
use kiln_cache::{LruCache, ThreadSafeCache};
use kiln_protocol::Command;
use std::fmt::Write;

use crate::metrics::{DELETES, GETS, HITS, MISSES, SETS, STORE_ERRORS};

const STORED: &[u8] = b"STORED\r\n";
const NOT_STORED: &[u8] = b"NOT_STORED\r\n";
const DELETED: &[u8] = b"DELETED\r\n";
const NOT_FOUND: &[u8] = b"NOT_FOUND\r\n";
const END: &[u8] = b"END\r\n";
const TOO_LARGE: &[u8] = b"SERVER_ERROR object too large for cache\r\n";

/// Execute a command against the cache, appending the reply to
/// `write_buf`. Exactly one cache operation runs per command (one per
/// key for multi-key gets).
pub fn execute(
    command: &Command,
    cache: &ThreadSafeCache,
    payload: &[u8],
    write_buf: &mut BytesMut,
) {
    match command {
        Command::Set { key, .. } => {
            SETS.increment();
            if cache.put(key, payload) {
                write_buf.extend_from_slice(STORED);
            } else {
                STORE_ERRORS.increment();
                write_buf.extend_from_slice(TOO_LARGE);
            }
        }
        Command::Add { key, .. } => {
            SETS.increment();
            if LruCache::cost_of(key, payload) > cache.max_bytes() {
                STORE_ERRORS.increment();
                write_buf.extend_from_slice(TOO_LARGE);
            } else if cache.put_if_absent(key, payload) {
                write_buf.extend_from_slice(STORED);
            } else {
                write_buf.extend_from_slice(NOT_STORED);
            }
        }
        Command::Replace { key, .. } => {
            SETS.increment();
            if LruCache::cost_of(key, payload) > cache.max_bytes() {
                STORE_ERRORS.increment();
                write_buf.extend_from_slice(TOO_LARGE);
            } else if cache.set(key, payload) {
                write_buf.extend_from_slice(STORED);
            } else {
                write_buf.extend_from_slice(NOT_STORED);
            }
        }
        Command::Get { keys } => {
            for key in keys {
                GETS.increment();
                match cache.get(key) {
                    Some(value) => {
                        HITS.increment();
                        write_buf.extend_from_slice(b"VALUE ");
                        write_buf.extend_from_slice(key);
                        write!(write_buf, " {}\r\n", value.len()).unwrap();
                        write_buf.extend_from_slice(&value);
                        write_buf.extend_from_slice(b"\r\n");
                    }
                    None => {
                        MISSES.increment();
                    }
                }
            }
            write_buf.extend_from_slice(END);
        }
        Command::Delete { key } => {
            DELETES.increment();
            if cache.delete(key) {
                write_buf.extend_from_slice(DELETED);
            } else {
                write_buf.extend_from_slice(NOT_FOUND);
            }
        }
    }
}
