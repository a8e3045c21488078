//! RESP2 (REdis Serialization Protocol) framing
//!
//! Decoding is incremental: a partial frame leaves the buffer untouched and
//! reports that more bytes are needed.

use bytes::{Buf, BytesMut};
use std::fmt;

/// Maximum bulk string size (512MB)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum array size (1M elements)
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting; commands are flat arrays of bulk strings
const MAX_DEPTH: usize = 32;

/// One RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:1000\r\n`
    Integer(i64),
    /// `$6\r\nfoobar\r\n`, or `$-1\r\n` for nil
    Bulk(Option<Vec<u8>>),
    /// `*2\r\n...`, or `*-1\r\n` for nil
    Array(Option<Vec<Frame>>),
}

/// Malformed input that cannot become a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First byte is not a RESP type marker
    UnknownType(u8),
    /// Length prefix below -1
    InvalidLength(i64),
    /// Integer line does not parse
    InvalidInteger(String),
    /// Line is not UTF-8
    InvalidUtf8,
    /// Bulk string over the size limit
    BulkTooLarge(usize),
    /// Array over the element limit
    ArrayTooLarge(usize),
    /// Bulk payload not followed by `\r\n`
    MissingTerminator,
    /// Arrays nested deeper than the limit
    NestingTooDeep,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownType(b) => write!(f, "unknown RESP type '{}'", *b as char),
            ProtocolError::InvalidLength(len) => write!(f, "invalid length {}", len),
            ProtocolError::InvalidInteger(s) => write!(f, "invalid integer '{}'", s),
            ProtocolError::InvalidUtf8 => write!(f, "invalid UTF-8 in line"),
            ProtocolError::BulkTooLarge(len) => write!(
                f,
                "bulk string too large: {} bytes (max: {} bytes)",
                len, MAX_BULK_LEN
            ),
            ProtocolError::ArrayTooLarge(len) => write!(
                f,
                "array too large: {} elements (max: {} elements)",
                len, MAX_ARRAY_LEN
            ),
            ProtocolError::MissingTerminator => write!(f, "expected \\r\\n after bulk string"),
            ProtocolError::NestingTooDeep => {
                write!(f, "arrays nested deeper than {} levels", MAX_DEPTH)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl Frame {
    /// `+OK`
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    /// Nil bulk string
    pub fn null() -> Frame {
        Frame::Bulk(None)
    }

    /// `-ERR <msg>`
    pub fn err(msg: impl fmt::Display) -> Frame {
        Frame::Error(format!("ERR {}", msg))
    }

    /// Bulk string argument as bytes
    pub fn as_bulk(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Consumes the frame's bytes on success; returns `Ok(None)` and leaves
    /// `buf` alone when the frame is incomplete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let mut reader = Reader {
            buf: &buf[..],
            pos: 0,
            depth: 0,
        };
        match reader.frame()? {
            Some(frame) => {
                let consumed = reader.pos;
                buf.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
            }
            Frame::Error(e) => {
                out.push(b'-');
                out.extend_from_slice(e.as_bytes());
            }
            Frame::Integer(i) => out.extend_from_slice(format!(":{}", i).as_bytes()),
            Frame::Bulk(None) => out.extend_from_slice(b"$-1"),
            Frame::Bulk(Some(data)) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
            }
            Frame::Array(None) => out.extend_from_slice(b"*-1"),
            Frame::Array(Some(items)) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_to(out);
                }
                // Elements carry their own terminators
                return;
            }
        }
        out.extend_from_slice(b"\r\n");
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(&tag) = self.buf.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;

        match tag {
            b'+' => Ok(self.text()?.map(Frame::Simple)),
            b'-' => Ok(self.text()?.map(Frame::Error)),
            b':' => Ok(self.integer()?.map(Frame::Integer)),
            b'$' => self.bulk(),
            b'*' => self.array(),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    fn bulk(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(len) = self.length(MAX_BULK_LEN, ProtocolError::BulkTooLarge)? else {
            return Ok(None);
        };
        let Some(len) = len else {
            return Ok(Some(Frame::Bulk(None)));
        };

        let end = self.pos + len;
        if self.buf.len() < end + 2 {
            return Ok(None);
        }
        if &self.buf[end..end + 2] != b"\r\n" {
            return Err(ProtocolError::MissingTerminator);
        }

        let data = self.buf[self.pos..end].to_vec();
        self.pos = end + 2;
        Ok(Some(Frame::Bulk(Some(data))))
    }

    fn array(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(len) = self.length(MAX_ARRAY_LEN, ProtocolError::ArrayTooLarge)? else {
            return Ok(None);
        };
        let Some(len) = len else {
            return Ok(Some(Frame::Array(None)));
        };

        if self.depth >= MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep);
        }

        self.depth += 1;
        let mut items = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            match self.frame()? {
                Some(item) => items.push(item),
                None => return Ok(None),
            }
        }
        self.depth -= 1;
        Ok(Some(Frame::Array(Some(items))))
    }

    /// Length prefix: `Ok(None)` if incomplete, `Some(None)` for nil (-1).
    fn length(
        &mut self,
        max: usize,
        too_large: fn(usize) -> ProtocolError,
    ) -> Result<Option<Option<usize>>, ProtocolError> {
        let Some(len) = self.integer()? else {
            return Ok(None);
        };
        if len == -1 {
            return Ok(Some(None));
        }
        let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidLength(len))?;
        if len > max {
            return Err(too_large(len));
        }
        Ok(Some(Some(len)))
    }

    fn integer(&mut self) -> Result<Option<i64>, ProtocolError> {
        let Some(line) = self.line() else {
            return Ok(None);
        };
        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        text.parse()
            .map(Some)
            .map_err(|_| ProtocolError::InvalidInteger(text.to_string()))
    }

    fn text(&mut self) -> Result<Option<String>, ProtocolError> {
        let Some(line) = self.line() else {
            return Ok(None);
        };
        String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn line(&mut self) -> Option<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let end = rest.windows(2).position(|w| w == b"\r\n")?;
        self.pos += end + 2;
        Some(&rest[..end])
    }
}
