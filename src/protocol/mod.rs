mod command;
mod parser;

pub use command::Command;
pub use parser::{MAX_DATA_BYTES, ParseError, Parsed, Parser};
