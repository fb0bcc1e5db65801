use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::protocol::{Command, Parser};
use crate::storage::SharedStorage;

const BUF_SIZE: usize = 4096;
/// Framing bytes that trail every data block and every response.
const CRLF: &[u8] = b"\r\n";

/// A command whose header has been decoded but whose data block is still
/// arriving. `arg_remains` counts the outstanding body bytes plus the two
/// trailing framing bytes.
struct Pending {
    command: Command,
    arg_remains: usize,
    body: Vec<u8>,
}

/// Services one connection until the peer closes, the receive timeout
/// expires, the server shuts the read side down, or an error ends the
/// session. Exactly one response is written per completed command, in
/// arrival order.
pub(super) fn run(mut stream: TcpStream, storage: SharedStorage) -> Result<()> {
    let mut parser = Parser::new();
    let mut pending: Option<Pending> = None;
    let mut buf = [0u8; BUF_SIZE];
    let mut filled = 0usize;

    loop {
        let read = match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                debug!("receive timeout; closing connection");
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading from client"),
        };
        filled += read;

        let mut cursor = 0;
        loop {
            let available = filled - cursor;
            match &mut pending {
                // AWAIT_HEADER: feed the parser until it yields a command.
                None => {
                    if available == 0 {
                        break;
                    }
                    let parsed = match parser.parse(&buf[cursor..filled]) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            let line = format!("CLIENT_ERROR {err}\r\n");
                            let _ = stream.write_all(line.as_bytes());
                            bail!("protocol error: {err}");
                        }
                    };
                    cursor += parsed.consumed;
                    match parsed.command {
                        Some(command) => {
                            debug!(verb = command.verb(), "decoded command");
                            let body_len = command.body_len();
                            let arg_remains = if body_len > 0 { body_len + 2 } else { 0 };
                            pending = Some(Pending {
                                command,
                                arg_remains,
                                body: Vec::with_capacity(arg_remains),
                            });
                        }
                        None => {
                            if cursor == 0 && filled == buf.len() {
                                let _ = stream.write_all(b"CLIENT_ERROR command line too long\r\n");
                                bail!("command line exceeds {BUF_SIZE} bytes");
                            }
                            // No terminator buffered yet; wait for more bytes.
                            break;
                        }
                    }
                }
                // AWAIT_BODY: consume up to arg_remains bytes.
                Some(wip) if wip.arg_remains > 0 => {
                    if available == 0 {
                        break;
                    }
                    let take = wip.arg_remains.min(available);
                    wip.body.extend_from_slice(&buf[cursor..cursor + take]);
                    cursor += take;
                    wip.arg_remains -= take;
                }
                // READY_TO_EXECUTE.
                Some(_) => {
                    let Pending { command, mut body, .. } =
                        pending.take().expect("pending command present");
                    if !body.is_empty() {
                        body.truncate(body.len() - CRLF.len());
                    }
                    let mut response = {
                        let mut storage = storage.lock();
                        command.execute(&mut *storage, &body)
                    };
                    response.extend_from_slice(CRLF);
                    stream
                        .write_all(&response)
                        .context("writing response to client")?;
                    parser.reset();
                }
            }
        }

        // Keep the unconsumed suffix at the front for the next read.
        if cursor > 0 {
            buf.copy_within(cursor..filled, 0);
            filled -= cursor;
        }
    }
}
