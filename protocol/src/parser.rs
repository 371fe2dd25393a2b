//! Incremental, restartable command header parser.
//!
//! The parser absorbs input a chunk at a time and recognizes one
//! `\r\n`-terminated command header. It never looks at payload bytes;
//! after [`Parser::build`] hands the command to the caller, the caller
//! reads `arg_remains` payload bytes off the stream, then resets the
//! parser before the next header.

use crate::command::Command;
use thiserror::Error;

/// Headers longer than this are rejected, bounding memory for a
/// stream that never sends `\r\n`.
pub const MAX_HEADER_LEN: usize = 8 * 1024;

/// Keys longer than this are rejected.
pub const MAX_KEY_LEN: usize = 250;

/// Declared payload lengths above this are rejected.
pub const MAX_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

/// Grammar violations that terminate the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The verb is not part of the command set.
    #[error("unknown command")]
    UnknownCommand,
    /// Wrong token count, empty key, or a bare `\n` terminator.
    #[error("malformed command header")]
    BadHeader,
    /// A numeric argument failed to parse or exceeds the payload bound.
    #[error("bad payload length")]
    BadLength,
    /// Key exceeds [`MAX_KEY_LEN`].
    #[error("key too long")]
    KeyTooLong,
    /// Header exceeds [`MAX_HEADER_LEN`] without a terminator.
    #[error("command header too long")]
    HeaderTooLong,
}

/// Outcome of feeding bytes to [`Parser::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A full header was recognized after absorbing `consumed` bytes;
    /// call [`Parser::build`] to obtain the command.
    Complete { consumed: usize },
    /// More input is required; `consumed` bytes were absorbed into the
    /// parser's internal state (zero when the input was empty).
    Incomplete { consumed: usize },
}

/// Streaming header parser.
///
/// # Example
///
/// ```
/// use kiln_protocol::{Command, Parser, Status};
///
/// let mut parser = Parser::new();
/// // The header may arrive in arbitrary pieces.
/// assert!(matches!(parser.parse(b"set fo").unwrap(), Status::Incomplete { consumed: 6 }));
/// assert!(matches!(parser.parse(b"o 3\r\n").unwrap(), Status::Complete { consumed: 5 }));
///
/// let (command, arg_remains) = parser.build().unwrap();
/// assert!(matches!(command, Command::Set { .. }));
/// // Three payload bytes plus the trailing \r\n.
/// assert_eq!(arg_remains, 5);
/// parser.reset();
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    header: Vec<u8>,
    parsed: Option<Command>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb input until a full header line is recognized.
    ///
    /// Returns [`Status::Complete`] once the terminating `\r\n` has
    /// been seen; the reported `consumed` count covers only the bytes
    /// taken from `buf` by this call. On [`Status::Incomplete`] the
    /// entire input was absorbed and more bytes are needed.
    pub fn parse(&mut self, buf: &[u8]) -> Result<Status, ParseError> {
        if self.parsed.is_some() {
            // A recognized header is waiting to be built; nothing to do.
            return Ok(Status::Complete { consumed: 0 });
        }

        match buf.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                self.header.extend_from_slice(&buf[..=nl]);
                if self.header.len() > MAX_HEADER_LEN {
                    return Err(ParseError::HeaderTooLong);
                }
                let line = match self.header.strip_suffix(b"\r\n") {
                    Some(line) => line,
                    None => return Err(ParseError::BadHeader),
                };
                self.parsed = Some(parse_header(line)?);
                Ok(Status::Complete { consumed: nl + 1 })
            }
            None => {
                self.header.extend_from_slice(buf);
                if self.header.len() > MAX_HEADER_LEN {
                    return Err(ParseError::HeaderTooLong);
                }
                Ok(Status::Incomplete {
                    consumed: buf.len(),
                })
            }
        }
    }

    /// Take the recognized command.
    ///
    /// Returns the command and `arg_remains`: the number of bytes the
    /// connection must still read for the payload. For storage
    /// commands this is the declared length plus two for the trailing
    /// `\r\n`, even when the declared length is zero; for other
    /// commands it is zero.
    pub fn build(&mut self) -> Option<(Command, usize)> {
        let command = self.parsed.take()?;
        let arg_remains = if command.carries_payload() {
            command.arg_len() + 2
        } else {
            0
        };
        Some((command, arg_remains))
    }

    /// Restore the initial state.
    pub fn reset(&mut self) {
        self.header.clear();
        self.parsed = None;
    }
}

fn parse_header(line: &[u8]) -> Result<Command, ParseError> {
    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
    let verb = tokens.next().ok_or(ParseError::BadHeader)?;

    match verb {
        b"set" | b"add" | b"replace" => {
            let key = parse_key(tokens.next())?;
            let numerics: Vec<&[u8]> = tokens.collect();
            // Two header forms are accepted: `set <key> <bytes>` and
            // the classic `set <key> <flags> <exptime> <bytes>`. Flags
            // and exptime must be numeric but are discarded.
            let bytes_token = match numerics.len() {
                1 => numerics[0],
                3 => numerics[2],
                _ => return Err(ParseError::BadHeader),
            };
            for token in &numerics {
                parse_number(token)?;
            }
            let bytes = parse_number(bytes_token)?;
            if bytes > MAX_PAYLOAD_LEN {
                return Err(ParseError::BadLength);
            }
            Ok(match verb {
                b"set" => Command::Set { key, bytes },
                b"add" => Command::Add { key, bytes },
                _ => Command::Replace { key, bytes },
            })
        }
        b"get" => {
            let mut keys = Vec::new();
            for token in tokens {
                keys.push(parse_key(Some(token))?);
            }
            if keys.is_empty() {
                return Err(ParseError::BadHeader);
            }
            Ok(Command::Get { keys })
        }
        b"delete" => {
            let key = parse_key(tokens.next())?;
            if tokens.next().is_some() {
                return Err(ParseError::BadHeader);
            }
            Ok(Command::Delete { key })
        }
        _ => Err(ParseError::UnknownCommand),
    }
}

fn parse_key(token: Option<&[u8]>) -> Result<Vec<u8>, ParseError> {
    let key = token.ok_or(ParseError::BadHeader)?;
    if key.is_empty() {
        return Err(ParseError::BadHeader);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ParseError::KeyTooLong);
    }
    Ok(key.to_vec())
}

fn parse_number(token: &[u8]) -> Result<usize, ParseError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::BadLength)
}
