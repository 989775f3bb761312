//! Line-oriented reading helpers shared by the acceptor (inbound request
//! line/headers) and the forwarder (upstream status line/headers and chunk
//! size lines). HTTP/1.1 framing is CRLF-delimited throughout, so both sides
//! read the same way.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads one CRLF-terminated line, returning it without the terminator.
/// Returns `Ok(None)` only if the peer closed the connection before any byte
/// of the line arrived; a close mid-line is an error.
pub async fn read_crlf_line<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-line",
            ));
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n") {
            buf.truncate(buf.len() - 2);
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }
    }
}

/// Reads lines up to and including the bare CRLF that terminates a header
/// section, returning the raw block (each line followed by `\r\n`, including
/// the trailing blank one) ready for [`crate::http_message::Headers::parse`].
pub async fn read_header_block<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut block = Vec::new();
    loop {
        match read_crlf_line(reader).await? {
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before end of header block",
                ))
            }
            Some(line) => {
                if line.is_empty() {
                    break;
                }
                block.extend_from_slice(line.as_bytes());
                block.extend_from_slice(b"\r\n");
            }
        }
    }
    block.extend_from_slice(b"\r\n");
    Ok(block)
}
