//! Commands produced by the protocol parser.

/// A fully parsed command header.
///
/// Storage commands record the declared payload length; the payload
/// itself is read from the stream by the connection layer and handed
/// to the executor together with the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Unconditional store: `set <key> <bytes>`
    Set { key: Vec<u8>, bytes: usize },
    /// Store only if the key is absent: `add <key> <bytes>`
    Add { key: Vec<u8>, bytes: usize },
    /// Store only if the key is present: `replace <key> <bytes>`
    Replace { key: Vec<u8>, bytes: usize },
    /// Fetch one or more values: `get <key> [<key>...]`
    Get { keys: Vec<Vec<u8>> },
    /// Remove an entry: `delete <key>`
    Delete { key: Vec<u8> },
}

impl Command {
    /// The wire name of the command verb.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Add { .. } => "add",
            Command::Replace { .. } => "replace",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
        }
    }

    /// Declared payload length in bytes, zero for commands without a
    /// payload. Does not include the payload's trailing `\r\n`.
    pub fn arg_len(&self) -> usize {
        match self {
            Command::Set { bytes, .. }
            | Command::Add { bytes, .. }
            | Command::Replace { bytes, .. } => *bytes,
            Command::Get { .. } | Command::Delete { .. } => 0,
        }
    }

    /// Whether a payload block (possibly empty) follows the header on
    /// the wire.
    pub fn carries_payload(&self) -> bool {
        matches!(
            self,
            Command::Set { .. } | Command::Add { .. } | Command::Replace { .. }
        )
    }
}
