//! Per-connection state for the cache server.
//!
//! [`Connection`] is the protocol state machine, free of any socket so
//! it can be exercised directly: bytes go in through
//! [`append_recv_data`](Connection::append_recv_data), replies come
//! out of the write buffer. [`serve`] is the blocking driver that
//! loops a socket through it.

use bytes::{Buf, BytesMut};
use kiln_cache::ThreadSafeCache;
use kiln_protocol::{Command, ParseError, Parser, Status};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

use crate::execute::execute;
use crate::metrics::PROTOCOL_ERRORS;

/// Read chunk size for the blocking driver.
pub const READ_CHUNK: usize = 4096;

/// Per-connection protocol state.
///
/// A connection cycles through reading a header, collecting the
/// declared payload bytes (which may straddle any number of reads),
/// executing the command, and buffering the reply.
pub struct Connection {
    parser: Parser,
    buffer: BytesMut,
    command: Option<Command>,
    /// Payload bytes still expected, including the trailing `\r\n`.
    arg_remains: usize,
    payload: BytesMut,
    write_buf: BytesMut,
    should_close: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            command: None,
            arg_remains: 0,
            payload: BytesMut::new(),
            write_buf: BytesMut::new(),
            should_close: false,
        }
    }

    /// Append received bytes to the input buffer.
    pub fn append_recv_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Process every complete command currently in the input buffer,
    /// appending replies to the write buffer.
    pub fn process(&mut self, cache: &ThreadSafeCache) {
        loop {
            if self.should_close {
                break;
            }

            if self.command.is_none() {
                if self.buffer.is_empty() {
                    break;
                }
                match self.parser.parse(&self.buffer) {
                    Ok(Status::Complete { consumed }) => {
                        self.buffer.advance(consumed);
                        let (command, arg_remains) = self
                            .parser
                            .build()
                            .expect("a complete header must build a command");
                        debug!(command = command.name(), arg_remains, "parsed command");
                        self.command = Some(command);
                        self.arg_remains = arg_remains;
                    }
                    Ok(Status::Incomplete { consumed }) => {
                        self.buffer.advance(consumed);
                        break;
                    }
                    Err(error) => {
                        PROTOCOL_ERRORS.increment();
                        self.reject(error);
                        break;
                    }
                }
            }

            if self.arg_remains > 0 {
                if self.buffer.is_empty() {
                    break;
                }
                let take = self.arg_remains.min(self.buffer.len());
                self.payload.extend_from_slice(&self.buffer[..take]);
                self.buffer.advance(take);
                self.arg_remains -= take;
                if self.arg_remains > 0 {
                    break;
                }
            }

            let command = self
                .command
                .take()
                .expect("command is assembled at this point");
            self.finish(command, cache);
        }
    }

    /// Emit an error reply for a grammar violation and mark the
    /// connection for closing.
    fn reject(&mut self, error: ParseError) {
        match error {
            ParseError::UnknownCommand => {
                self.write_buf.extend_from_slice(b"ERROR\r\n");
            }
            other => {
                self.write_buf.extend_from_slice(b"CLIENT_ERROR ");
                self.write_buf.extend_from_slice(other.to_string().as_bytes());
                self.write_buf.extend_from_slice(b"\r\n");
            }
        }
        self.should_close = true;
    }

    /// Execute an assembled command and queue its reply.
    fn finish(&mut self, command: Command, cache: &ThreadSafeCache) {
        if command.carries_payload() {
            // The stream carries the payload plus a closing \r\n.
            if self.payload.ends_with(b"\r\n") {
                let len = self.payload.len() - 2;
                execute(&command, cache, &self.payload[..len], &mut self.write_buf);
            } else {
                PROTOCOL_ERRORS.increment();
                self.write_buf
                    .extend_from_slice(b"CLIENT_ERROR bad data chunk\r\n");
                self.should_close = true;
            }
        } else {
            execute(&command, cache, &[], &mut self.write_buf);
        }

        self.payload.clear();
        self.parser.reset();
    }

    #[inline]
    pub fn has_pending_write(&self) -> bool {
        !self.write_buf.is_empty()
    }

    #[inline]
    pub fn pending_write_data(&self) -> &[u8] {
        &self.write_buf
    }

    /// Discard reply bytes after they have been sent.
    #[inline]
    pub fn clear_write(&mut self) {
        self.write_buf.clear();
    }

    /// Returns `true` after a protocol error; the driver closes the
    /// socket once the error reply is flushed.
    #[inline]
    pub fn should_close(&self) -> bool {
        self.should_close
    }
}

/// Serve one client socket until it closes, errors, times out, or the
/// server stops.
///
/// Replies are written with blocking sends in exact command order.
/// EOF (a clean peer close) is distinguished from a genuine error by
/// the most recent read's return value.
pub fn serve(mut stream: TcpStream, peer: SocketAddr, cache: &ThreadSafeCache, running: &AtomicBool) {
    let mut conn = Connection::new();
    let mut chunk = [0u8; READ_CHUNK];

    debug!(%peer, "serving connection");
    while running.load(Ordering::Acquire) {
        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!(%peer, "read timed out, closing");
                break;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(%peer, error = %e, "read failed");
                break;
            }
        };

        conn.append_recv_data(&chunk[..read]);
        conn.process(cache);

        if conn.has_pending_write() {
            if let Err(e) = stream.write_all(conn.pending_write_data()) {
                error!(%peer, error = %e, "send failed");
                break;
            }
            conn.clear_write();
        }

        if conn.should_close() {
            debug!(%peer, "closing connection after protocol error");
            break;
        }
    }
}
