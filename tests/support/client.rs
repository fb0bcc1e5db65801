use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};

/// How long a test client waits on the socket before giving up; generous
/// enough to outlast the server's 5 s receive timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Line-oriented test client for the cache protocol.
pub struct CacheClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl CacheClient {
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("connecting to test server {addr}"))?;
        stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).context("sending to server")?;
        Ok(())
    }

    /// Reads one CRLF-terminated line and returns it without the frame.
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        self.reader
            .read_until(b'\n', &mut line)
            .context("reading response line")?;
        ensure!(!line.is_empty(), "connection closed by server");
        ensure!(line.ends_with(b"\r\n"), "response line missing CRLF frame");
        line.truncate(line.len() - 2);
        String::from_utf8(line).map_err(|_| anyhow!("response line is not text"))
    }

    /// Sends `<verb> <key> 0 0 <len>` plus the data block and returns the
    /// response line.
    pub fn store(&mut self, verb: &str, key: &str, value: &[u8]) -> Result<String> {
        let mut request = format!("{verb} {key} 0 0 {}\r\n", value.len()).into_bytes();
        // A zero-length body carries no data block, so no trailing frame
        // either; the server reads framing bytes only when a body follows.
        if !value.is_empty() {
            request.extend_from_slice(value);
            request.extend_from_slice(b"\r\n");
        }
        self.send(&request)?;
        self.read_line()
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<String> {
        self.store("set", key, value)
    }

    /// Issues `get <key>` and decodes the value block, or `None` on a bare
    /// `END`.
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.send(format!("get {key}\r\n").as_bytes())?;
        let header = self.read_line()?;
        if header == "END" {
            return Ok(None);
        }
        let declared: usize = header
            .strip_prefix(&format!("VALUE {key} 0 "))
            .ok_or_else(|| anyhow!("unexpected get response '{header}'"))?
            .parse()
            .context("parsing value length")?;
        let mut value = vec![0u8; declared + 2];
        self.reader
            .read_exact(&mut value)
            .context("reading value block")?;
        ensure!(value.ends_with(b"\r\n"), "value block missing CRLF frame");
        value.truncate(declared);
        let trailer = self.read_line()?;
        ensure!(trailer == "END", "missing END after value block");
        Ok(Some(value))
    }

    pub fn delete(&mut self, key: &str) -> Result<String> {
        self.send(format!("delete {key}\r\n").as_bytes())?;
        self.read_line()
    }

    /// Half-closes the write side and drains whatever the server still
    /// sends before closing.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.writer.shutdown(Shutdown::Write)?;
        let mut rest = Vec::new();
        self.reader
            .read_to_end(&mut rest)
            .context("draining connection")?;
        Ok(rest)
    }

    /// Expects the server to close the connection without further data.
    pub fn expect_eof(mut self) -> Result<()> {
        let mut rest = Vec::new();
        let read = self
            .reader
            .read_to_end(&mut rest)
            .context("waiting for server close")?;
        if read > 0 {
            bail!(
                "expected EOF, got {read} bytes: {}",
                String::from_utf8_lossy(&rest)
            );
        }
        Ok(())
    }
}
