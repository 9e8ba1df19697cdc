//! Low level helpers to pull bytes and ASCII tokens out of a buffered stream.

use std::io::{self, BufRead};

use failure::Fail;

use crate::{
    error::Error as PlyError,
    types::ScalarType,
};


/// A buffered input stream that keeps track of how many bytes were consumed
/// so far. Errors carry that offset.
#[derive(Debug)]
pub(crate) struct Input<R> {
    reader: R,
    offset: u64,
    token: String,
}

impl<R: BufRead> Input<R> {
    pub(crate) fn new(reader: R, offset: u64) -> Self {
        Self {
            reader,
            offset,
            token: String::new(),
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Fills `dst` completely or fails with `UnexpectedEof`.
    pub(crate) fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < dst.len() {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEof(self.offset));
            }

            let n = std::cmp::min(buf.len(), dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&buf[..n]);
            self.reader.consume(n);
            self.offset += n as u64;
            filled += n;
        }

        Ok(())
    }

    /// Skips exactly `num_bytes` bytes or fails with `UnexpectedEof`.
    pub(crate) fn skip(&mut self, mut num_bytes: usize) -> Result<(), Error> {
        while num_bytes > 0 {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEof(self.offset));
            }

            let n = std::cmp::min(buf.len(), num_bytes);
            self.reader.consume(n);
            self.offset += n as u64;
            num_bytes -= n;
        }

        Ok(())
    }

    /// Skips leading whitespace (including line breaks) and returns the next
    /// whitespace delimited token together with the offset of its first byte.
    pub(crate) fn next_token(&mut self) -> Result<(&str, u64), Error> {
        // Skip whitespace
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEof(self.offset));
            }

            let ws = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let done = ws < buf.len();
            self.reader.consume(ws);
            self.offset += ws as u64;
            if done {
                break;
            }
        }

        // Collect the token. Non-ASCII bytes end up as garbage characters
        // which will fail to parse as number later.
        let start = self.offset;
        self.token.clear();
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }

            let len = buf.iter().take_while(|b| !b.is_ascii_whitespace()).count();
            self.token.extend(buf[..len].iter().map(|&b| b as char));
            let done = len < buf.len();
            self.reader.consume(len);
            self.offset += len as u64;
            if done {
                break;
            }
        }

        Ok((self.token.as_str(), start))
    }
}

/// Errors of the payload decoder. They don't know which property they occured
/// in; [`Error::in_property`] adds that information.
#[derive(Debug, Fail)]
pub(crate) enum Error {
    #[fail(display = "IO error: {}", _0)]
    Io(io::Error),

    #[fail(display = "unexpected EOF while parsing (at {})", _0)]
    UnexpectedEof(u64),

    #[fail(display = "invalid '{}' literal {:?} (at {})", ty, literal, offset)]
    InvalidLiteral {
        ty: ScalarType,
        literal: String,
        offset: u64,
    },

    #[fail(display = "invalid list length (at {})", _0)]
    InvalidListLength(u64),

    #[fail(display = "destination buffer too small: need {} bytes, got {}", needed, capacity)]
    DestinationOverflow {
        needed: usize,
        capacity: usize,
    },
}

impl Error {
    pub(crate) fn in_property(self, element: &str, property: &str) -> PlyError {
        let element = element.to_string();
        let property = property.to_string();
        match self {
            Error::Io(e) => PlyError::Io(e),
            Error::UnexpectedEof(offset) => PlyError::UnexpectedEof { element, property, offset },
            Error::InvalidLiteral { ty, literal, offset } => {
                PlyError::InvalidLiteral { element, property, ty, literal, offset }
            }
            Error::InvalidListLength(offset) => {
                PlyError::InvalidListLength { element, property, offset }
            }
            Error::DestinationOverflow { needed, capacity } => {
                PlyError::DestinationOverflow { element, property, needed, capacity }
            }
        }
    }
}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Self {
        Error::Io(src)
    }
}
