use crate::storage::Storage;

/// A decoded command header, ready to run once its data block (if any) has
/// been read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: Vec<u8>, body_len: usize },
    Add { key: Vec<u8>, body_len: usize },
    Replace { key: Vec<u8>, body_len: usize },
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Add { .. } => "add",
            Command::Replace { .. } => "replace",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
        }
    }

    /// Bytes of payload that follow the header line, excluding the two
    /// trailing framing bytes.
    pub fn body_len(&self) -> usize {
        match self {
            Command::Set { body_len, .. }
            | Command::Add { body_len, .. }
            | Command::Replace { body_len, .. } => *body_len,
            Command::Get { .. } | Command::Delete { .. } => 0,
        }
    }

    /// Applies the command to the cache and renders the response bytes.
    ///
    /// Never blocks on I/O. Application-level failures (key absent, value
    /// would not fit) come back as ordinary protocol responses; the caller
    /// appends the trailing CRLF frame.
    pub fn execute(&self, storage: &mut dyn Storage, body: &[u8]) -> Vec<u8> {
        match self {
            Command::Set { key, .. } => stored(storage.put(key, body)),
            Command::Add { key, .. } => stored(storage.put_if_absent(key, body)),
            Command::Replace { key, .. } => stored(storage.set(key, body)),
            Command::Get { key } => match storage.get(key) {
                Some(value) => render_value(key, &value),
                None => b"END".to_vec(),
            },
            Command::Delete { key } => {
                if storage.delete(key) {
                    b"DELETED".to_vec()
                } else {
                    b"NOT_FOUND".to_vec()
                }
            }
        }
    }
}

fn stored(ok: bool) -> Vec<u8> {
    if ok {
        b"STORED".to_vec()
    } else {
        b"NOT_STORED".to_vec()
    }
}

fn render_value(key: &[u8], value: &[u8]) -> Vec<u8> {
    let header = format!(" 0 {}\r\n", value.len());
    let mut out = Vec::with_capacity(6 + key.len() + header.len() + value.len() + 5);
    out.extend_from_slice(b"VALUE ");
    out.extend_from_slice(key);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\nEND");
    out
}
