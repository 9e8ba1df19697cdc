//! Reading and writing PLY files straight from and into flat buffers.
//!
//! PLY files describe a number of *elements* (e.g. `vertex` or `face`), each
//! consisting of a number of records with typed *properties* (e.g. `x` of
//! type `float` or `vertex_indices` which is a list of `int`). The payload is
//! either ASCII or binary (little or big endian).
//!
//! This library does not know anything about meshes. Instead, you tell the
//! [`Reader`] which properties you are interested in and get flat, host endian
//! byte buffers back. Properties requested together end up interleaved in one
//! buffer, so requesting `x`, `y` and `z` of `vertex` gives you one buffer of
//! position triples. All other properties are skipped.
//!
//! ```
//! use std::io::Cursor;
//! use plybuf::Reader;
//!
//! let file = "ply\n\
//!     format ascii 1.0\n\
//!     element vertex 2\n\
//!     property float x\n\
//!     property float y\n\
//!     property float z\n\
//!     end_header\n\
//!     1.0 2.0 3.0\n\
//!     4.0 5.0 6.0\n";
//!
//! let mut reader = Reader::new(Cursor::new(file));
//! reader.parse_header()?;
//! let positions = reader.request_properties_from_element("vertex", &["x", "y", "z"], 0)?;
//! reader.read()?;
//!
//! let positions = reader.data(positions).unwrap().to_vec::<f32>()?;
//! assert_eq!(positions, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! # Ok::<(), plybuf::Error>(())
//! ```
//!
//! Writing works the other way around: the [`Writer`] borrows your buffers and
//! encodes them as ASCII or binary file.
//!
//! Lists whose length varies between records (e.g. faces with different
//! numbers of vertices in one file) are not supported.

#[cfg(test)]
#[macro_use]
mod test_utils;

mod binding;
mod data;
mod error;
mod header;
mod parse;
mod read;
mod types;
mod write;


pub use self::{
    data::{Data, DataId},
    error::Error,
    header::{Element, Format, Header, Property},
    read::Reader,
    types::{endian_reverse, PlyScalar, ScalarType, ScalarTypeParseError},
    write::Writer,
};
