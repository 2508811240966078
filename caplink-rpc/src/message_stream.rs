//! Header framed JSON messages.
//!
//! Every message is an ASCII header block followed by a UTF-8 JSON body:
//!
//! ```text
//! Content-Length: 65\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"cancelToken","params":["ct_1"]}
//! ```

use std::io::{Read, Write};

#[cfg(not(feature = "log-to-stdout"))]
use log::trace;

#[cfg(feature = "log-to-stdout")]
use crate::trace;
use crate::message::{RawMessage, RpcMessage};

const CONTENT_LENGTH: &str = "content-length";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const MAX_HEADER_LINE: usize = 8 * 1024;

/// A trait which can read [RpcMessage] from a stream
pub trait ReadMessage {
    fn read_message(&mut self) -> crate::Result<RpcMessage>;
}

/// A trait which can write [RpcMessage] into a stream
pub trait WriteMessage {
    fn write_message(&mut self, message: &RpcMessage) -> crate::Result<()>;
}

impl<R: Read> ReadMessage for R {
    fn read_message(&mut self) -> crate::Result<RpcMessage> {
        let len = read_header(self)?;
        trace!("Message body len: {len}");

        // Grows with the received data, so a bogus length can't allocate upfront
        let mut body = Vec::new();
        self.take(len as u64).read_to_end(&mut body)?;

        if body.len() < len {
            return Err(crate::Error::ConnectionClosed);
        }

        decode_body(&body)
    }
}

impl<W: Write> WriteMessage for W {
    fn write_message(&mut self, message: &RpcMessage) -> crate::Result<()> {
        let frame = encode(message)?;
        trace!("Writing frame of {} bytes", frame.len());

        self.write_all(&frame)?;
        self.flush()?;
        Ok(())
    }
}

/// Encode a message into a complete frame. The body is compact JSON
pub fn encode(message: &RpcMessage) -> crate::Result<Vec<u8>> {
    let body = serde_json::to_vec(&RawMessage::from(message))?;

    let mut frame = format!("Content-Length: {}", body.len()).into_bytes();
    frame.extend_from_slice(HEADER_TERMINATOR);
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decode a single complete frame
pub fn decode(mut frame: &[u8]) -> crate::Result<RpcMessage> {
    let message = frame.read_message()?;

    if !frame.is_empty() {
        return Err(crate::Error::Framing(format!(
            "{} trailing bytes after the message body",
            frame.len()
        )));
    }

    Ok(message)
}

fn decode_body(body: &[u8]) -> crate::Result<RpcMessage> {
    let raw: RawMessage = serde_json::from_slice(body)
        .map_err(|e| crate::Error::Framing(format!("Invalid message body: {e}")))?;

    RpcMessage::try_from(raw)
}

/// Read header lines until an empty one. Returns the body length
fn read_header<R: Read + ?Sized>(reader: &mut R) -> crate::Result<usize> {
    let mut content_length = None;

    loop {
        let line = read_line(reader)?;

        if line.is_empty() {
            break;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(crate::Error::Framing(format!("Malformed header line `{line}`")));
        };

        if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let len: i64 = value
                .parse()
                .map_err(|_| crate::Error::Framing(format!("Invalid Content-Length `{value}`")))?;

            if len <= 0 {
                return Err(crate::Error::Framing(format!("Invalid Content-Length `{len}`")));
            }

            content_length = Some(len as usize);
        }
    }

    content_length.ok_or_else(|| crate::Error::Framing("Missing Content-Length header".into()))
}

/// Read a single `\r\n` terminated line byte by byte, so nothing past the header is consumed
fn read_line<R: Read + ?Sized>(reader: &mut R) -> crate::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        reader.read_exact(&mut byte)?;

        if byte[0] == b'\n' {
            break;
        }

        line.push(byte[0]);

        if line.len() > MAX_HEADER_LINE {
            return Err(crate::Error::Framing("Header line is too long".into()));
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    String::from_utf8(line).map_err(|_| crate::Error::Framing("Header is not ASCII".into()))
}
