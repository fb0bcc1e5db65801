use thiserror::Error;

use super::command::Command;

/// Upper bound on a declared data block, so a hostile header cannot make the
/// worker reserve arbitrary memory before any body byte arrives.
pub const MAX_DATA_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("command line is not valid text")]
    NotText,
    #[error("command line must end with CRLF")]
    BareLineFeed,
    #[error("empty command line")]
    EmptyLine,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("wrong number of arguments for '{0}'")]
    BadArity(&'static str),
    #[error("invalid numeric argument '{0}'")]
    InvalidNumber(String),
    #[error("declared data block of {0} bytes exceeds the size limit")]
    DataTooLarge(usize),
}

/// Outcome of feeding bytes to the parser.
///
/// `consumed` bytes have been taken from the front of the input; the caller
/// keeps the rest for the next call. `command` is set once a full header
/// line has been decoded.
#[derive(Debug, PartialEq, Eq)]
pub struct Parsed {
    pub consumed: usize,
    pub command: Option<Command>,
}

/// Incremental decoder for the text command protocol.
///
/// A command header is a single `CR LF` terminated line. `parse` either
/// consumes a whole line or, when no terminator is present yet, consumes
/// nothing and asks for more input. After yielding a command the parser
/// refuses further input until `reset`.
#[derive(Debug, Default)]
pub struct Parser {
    complete: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the parser ready for the next command.
    pub fn reset(&mut self) {
        self.complete = false;
    }

    pub fn parse(&mut self, buf: &[u8]) -> Result<Parsed, ParseError> {
        assert!(!self.complete, "parse called before reset");

        let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
            return Ok(Parsed {
                consumed: 0,
                command: None,
            });
        };
        if newline == 0 || buf[newline - 1] != b'\r' {
            return Err(ParseError::BareLineFeed);
        }
        let line = &buf[..newline - 1];
        let command = decode_line(line)?;
        self.complete = true;
        Ok(Parsed {
            consumed: newline + 1,
            command: Some(command),
        })
    }
}

fn decode_line(line: &[u8]) -> Result<Command, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::NotText)?;
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(ParseError::EmptyLine)?;

    match verb {
        "set" => decode_store("set", tokens),
        "add" => decode_store("add", tokens),
        "replace" => decode_store("replace", tokens),
        "get" => {
            let key = single_key("get", tokens)?;
            Ok(Command::Get { key })
        }
        "delete" => {
            let key = single_key("delete", tokens)?;
            Ok(Command::Delete { key })
        }
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// `<verb> <key> <flags> <exptime> <bytes>`. Flags and exptime are decoded
/// for validity and discarded; expiration is not supported.
fn decode_store<'a>(
    verb: &'static str,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<Command, ParseError> {
    let key = tokens.next().ok_or(ParseError::BadArity(verb))?;
    let flags = tokens.next().ok_or(ParseError::BadArity(verb))?;
    let exptime = tokens.next().ok_or(ParseError::BadArity(verb))?;
    let bytes = tokens.next().ok_or(ParseError::BadArity(verb))?;
    if tokens.next().is_some() {
        return Err(ParseError::BadArity(verb));
    }

    parse_number::<u32>(flags)?;
    parse_number::<i64>(exptime)?;
    let body_len = parse_number::<usize>(bytes)?;
    if body_len > MAX_DATA_BYTES {
        return Err(ParseError::DataTooLarge(body_len));
    }

    let key = key.as_bytes().to_vec();
    Ok(match verb {
        "set" => Command::Set { key, body_len },
        "add" => Command::Add { key, body_len },
        "replace" => Command::Replace { key, body_len },
        _ => unreachable!("decode_store called for '{verb}'"),
    })
}

fn single_key<'a>(
    verb: &'static str,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<Vec<u8>, ParseError> {
    let key = tokens.next().ok_or(ParseError::BadArity(verb))?;
    if tokens.next().is_some() {
        return Err(ParseError::BadArity(verb));
    }
    Ok(key.as_bytes().to_vec())
}

fn parse_number<T: std::str::FromStr>(token: &str) -> Result<T, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::InvalidNumber(token.to_string()))
}
