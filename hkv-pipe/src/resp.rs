//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode pipelined commands and parse server replies, keeping
//! allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use bytes::Bytes;
use hkv_common::{Arg, PipeError, PipeResult, Value};

/// One decoded RESP2 frame, error replies included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// +OK or +PONG style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays, with None for null.
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Turns the frame into a reply value, mapping error replies to
    /// `PipeError::Server`. An error nested inside an array fails the whole reply.
    pub fn into_result(self) -> PipeResult<Value> {
        match self {
            Frame::Simple(text) => Ok(Value::Status(String::from_utf8_lossy(&text).into_owned())),
            Frame::Error(message) => Err(PipeError::Server(
                String::from_utf8_lossy(&message).into_owned(),
            )),
            Frame::Integer(value) => Ok(Value::Int(value)),
            Frame::Bulk(Some(data)) => Ok(Value::Bulk(Bytes::from(data))),
            Frame::Bulk(None) | Frame::Array(None) => Ok(Value::Nil),
            Frame::Array(Some(items)) => items
                .into_iter()
                .map(Frame::into_result)
                .collect::<PipeResult<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// Encodes a RESP2 array command (`name` followed by `args`) into `out`.
///
/// The buffer is appended to, not cleared, so a whole batch can be encoded
/// back to back before one write.
pub fn encode_command(name: &[u8], args: &[Arg], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len() + 1);
    out.extend_from_slice(b"\r\n");
    push_bulk(out, name);
    for arg in args {
        push_bulk(out, arg.as_bytes());
    }
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    push_usize(out, data.len());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Reads one RESP frame from the buffered reader.
pub fn read_frame<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> PipeResult<Frame> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(PipeError::Protocol("empty reply line".to_string()));
    }

    match line_buf[0] {
        b'+' => Ok(Frame::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(Frame::Error(line_buf[1..].to_vec())),
        b':' => Ok(Frame::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf)
        }
        other => Err(PipeError::Protocol(format!(
            "unexpected reply type byte {:?}",
            other as char
        ))),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> PipeResult<Frame> {
    if len < 0 {
        return Ok(Frame::Bulk(None));
    }
    let len = len as usize;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(PipeError::Protocol("bulk string missing crlf".to_string()));
    }

    line_buf.clear();
    Ok(Frame::Bulk(Some(data)))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> PipeResult<Frame> {
    if len < 0 {
        return Ok(Frame::Array(None));
    }

    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_frame(reader, line_buf)?);
    }
    Ok(Frame::Array(Some(items)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> PipeResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(PipeError::Protocol("connection closed by server".to_string()));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(PipeError::Protocol("reply line missing crlf".to_string()));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> PipeResult<i64> {
    if data.is_empty() {
        return Err(PipeError::Protocol("empty integer".to_string()));
    }
    let mut negative = false;
    let mut idx = 0;
    if data[0] == b'-' {
        negative = true;
        idx = 1;
    }

    let mut value: i64 = 0;
    while idx < data.len() {
        let b = data[idx];
        if !b.is_ascii_digit() {
            return Err(PipeError::Protocol("invalid integer".to_string()));
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
        idx += 1;
    }

    if negative {
        Ok(-value)
    } else {
        Ok(value)
    }
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
