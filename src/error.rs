use std::io;

use failure::Fail;

use crate::{
    data::DataId,
    types::ScalarType,
};


/// Everything that can go wrong while reading or writing a PLY file.
///
/// Errors fall into three groups: invalid requests by the caller (reported
/// before the stream is touched), malformed documents (reported where the
/// problem is detected) and plain IO errors of the underlying stream.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "IO error: {}", _0)]
    Io(io::Error),

    #[fail(display = "malformed PLY header (line {}): {}", line, msg)]
    MalformedHeader {
        line: usize,
        msg: String,
    },

    #[fail(display = "invalid request: {}", _0)]
    InvalidRequest(String),

    #[fail(
        display = "element-property key has already been requested: '{}' '{}'",
        element, property
    )]
    DuplicateRequest {
        element: String,
        property: String,
    },

    #[fail(
        display = "unexpected EOF while reading property '{}' of element '{}' (at byte {}). \
            Malformed file?",
        property, element, offset
    )]
    UnexpectedEof {
        element: String,
        property: String,
        offset: u64,
    },

    #[fail(
        display = "unexpected EOF: property '{}' of element '{}' needs {} bytes, but its \
            buffer only holds {} bytes. Malformed file or wrong list size hint?",
        property, element, needed, capacity
    )]
    DestinationOverflow {
        element: String,
        property: String,
        needed: usize,
        capacity: usize,
    },

    #[fail(
        display = "invalid '{}' literal {:?} for property '{}' of element '{}' (at byte {})",
        ty, literal, property, element, offset
    )]
    InvalidLiteral {
        element: String,
        property: String,
        ty: ScalarType,
        literal: String,
        offset: u64,
    },

    #[fail(
        display = "invalid list length for property '{}' of element '{}' (at byte {})",
        property, element, offset
    )]
    InvalidListLength {
        element: String,
        property: String,
        offset: u64,
    },

    #[fail(
        display = "variable length lists are not supported: property '{}' of element '{}' \
            was declared with {} items per record, but a record with {} items was found",
        property, element, expected, found
    )]
    ListLengthMismatch {
        element: String,
        property: String,
        expected: usize,
        found: usize,
    },

    #[fail(
        display = "failed to allocate {} bytes for {}. Malformed file or wrong list size hint?",
        size, data
    )]
    AllocationFailed {
        data: DataId,
        size: usize,
    },

    #[fail(display = "type mismatch: data is stored as '{}', but '{}' was requested", found, expected)]
    TypeMismatch {
        expected: ScalarType,
        found: ScalarType,
    },
}

impl Error {
    pub(crate) fn malformed(line: usize, msg: impl Into<String>) -> Self {
        Error::MalformedHeader { line, msg: msg.into() }
    }

    pub(crate) fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Self {
        Error::Io(src)
    }
}
