//! Writing PLY files from caller owned buffers.
//!
//! The writer never copies the caller's data: buffers are borrowed for the
//! lifetime `'a` of the writer and encoded record by record when
//! [`Writer::write`] is called.
//!
//! Binary files are always written in the byte order of the host and labeled
//! accordingly. For ASCII encoding we simply use the `Display` impl of the
//! Rust number types, which never depends on a locale.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use fxhash::FxHashMap;
use log::{debug, trace};

use crate::{
    binding::{Binding, ElementLookup, PropKey},
    data::{Data, DataArena, DataId},
    error::Error,
    header::{Element, Format, Header},
    types::{self, PlyScalar, ScalarType},
};


/// Collects elements, properties and the buffers holding their values, and
/// writes them as PLY file.
///
/// # Example
///
/// ```
/// use plybuf::{ScalarType, Writer};
///
/// let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
/// let indices = [0u32, 1, 2];
///
/// let mut writer = Writer::new();
/// writer.add_comment("a single triangle");
/// writer.add_typed_properties_to_element("vertex", &["x", "y", "z"], 3, &positions, None, 0)?;
/// writer.add_typed_properties_to_element(
///     "face",
///     &["vertex_indices"],
///     1,
///     &indices,
///     Some(ScalarType::Uint8),
///     3,
/// )?;
///
/// let mut out = Vec::new();
/// writer.write(&mut out, false)?;
/// assert!(out.ends_with(b"end_header\n0 0 0 \n1 0 0 \n0 1 0 \n3 0 1 2 \n"));
/// # Ok::<(), plybuf::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Writer<'a> {
    header: Header,
    datas: DataArena<'a>,
}

impl<'a> Writer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Whether the last call to `write` produced a binary file.
    pub fn is_binary(&self) -> bool {
        self.header.is_binary
    }

    /// Adds a `comment` line to the file header.
    ///
    /// The given string must not contain `'\n'` or else this method panics.
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        assert!(!comment.contains('\n'), "PLY comments must not contain '\\n'!");
        self.header.comments.push(comment);
    }

    /// Adds an `obj_info` line to the file header.
    ///
    /// The given string must not contain `'\n'` or else this method panics.
    pub fn add_obj_info(&mut self, info: impl Into<String>) {
        let info = info.into();
        assert!(!info.contains('\n'), "PLY obj_info must not contain '\\n'!");
        self.header.obj_info.push(info);
    }

    /// Declares an element without any properties and returns its index. Its
    /// record count is set by the first call to `add_properties_to_element`.
    /// If an element with that name was added before, its index is returned.
    pub fn add_element(&mut self, name: &str) -> usize {
        match self.header.find_element(name) {
            Some(idx) => idx,
            None => {
                self.header.elements.push(Element::new(name, 0));
                self.header.elements.len() - 1
            }
        }
    }

    /// Declares properties of an element and binds them to `data`.
    ///
    /// `data` holds `count` records with the values of all `keys` interleaved
    /// per record, each `ty.stride()` bytes in host byte order. If
    /// `list_type` is given, the properties are lists of exactly `list_count`
    /// items each, with a count field of type `list_type`. The element is
    /// created if it doesn't exist yet.
    ///
    /// Fails without changing anything if `keys` is empty, a key is already
    /// declared, `count` differs from the record count of an element that
    /// already has properties bound, the list count doesn't fit the count type
    /// or `data` is too short.
    pub fn add_properties_to_element(
        &mut self,
        element: &str,
        keys: &[&str],
        ty: ScalarType,
        count: usize,
        data: &'a [u8],
        list_type: Option<ScalarType>,
        list_count: usize,
    ) -> Result<DataId, Error> {
        if element.is_empty() {
            return Err(Error::invalid_request("element name is empty"));
        }
        if keys.is_empty() {
            return Err(Error::invalid_request("list of property keys is empty"));
        }

        if let Some(list_type) = list_type {
            match list_type.max_list_len() {
                None => return Err(Error::invalid_request(format!(
                    "list count type has to be an integer type, but is '{}'",
                    list_type,
                ))),
                Some(max) if list_count as u64 > max => return Err(Error::invalid_request(
                    format!("list count {} does not fit into '{}'", list_count, list_type),
                )),
                Some(_) => {}
            }
        }

        let items_per_record = if list_type.is_some() { list_count } else { 1 };
        let needed = count * ty.stride() * items_per_record * keys.len();
        if data.len() < needed {
            return Err(Error::invalid_request(format!(
                "buffer for {:?} of element '{}' holds {} bytes, but {} records need {} bytes",
                keys,
                element,
                data.len(),
                count,
                needed,
            )));
        }

        let elem_idx = match self.header.find_element(element) {
            Some(idx) => {
                let bound = self.header.bindings.binds_element(idx);
                let elem = &mut self.header.elements[idx];
                if bound && elem.size != count {
                    return Err(Error::invalid_request(format!(
                        "element '{}' has {} records, but {} were given",
                        element,
                        elem.size,
                        count,
                    )));
                }
                elem.create_properties(keys, ty, list_type, list_count)?;
                elem.size = count;
                idx
            }
            None => {
                let mut elem = Element::new(element, count);
                elem.create_properties(keys, ty, list_type, list_count)?;
                self.header.elements.push(elem);
                self.header.elements.len() - 1
            }
        };

        let id = self.datas.push(Data::alias(ty, &data[..needed], count, list_type.is_some()));
        let elem = &self.header.elements[elem_idx];
        for key in keys {
            if let Some(prop_idx) = elem.find_property(key) {
                let binding = Binding { data: id, list_size_hint: 0 };
                self.header.bindings.insert(PropKey::new(elem_idx, prop_idx), binding);
            }
        }

        Ok(id)
    }

    /// Like [`Writer::add_properties_to_element`], but takes a typed slice and
    /// derives the scalar type from `T`.
    pub fn add_typed_properties_to_element<T: PlyScalar>(
        &mut self,
        element: &str,
        keys: &[&str],
        count: usize,
        data: &'a [T],
        list_type: Option<ScalarType>,
        list_count: usize,
    ) -> Result<DataId, Error> {
        let bytes = types::as_byte_slice(data);
        self.add_properties_to_element(element, keys, T::TY, count, bytes, list_type, list_count)
    }

    /// Writes the complete file. Binary output uses the host byte order.
    pub fn write(&mut self, mut w: impl Write, as_binary: bool) -> Result<(), Error> {
        self.datas.reset_cursors();
        let format = if as_binary { Format::binary_native() } else { Format::Ascii };
        self.header.set_format(format);

        let lookup = self.header.property_lookup_table();
        self.check_buffers(&lookup)?;

        self.header.write(&mut w)?;
        trace!("wrote PLY header, format {}", format);

        if as_binary {
            self.write_payload::<BinaryEncoding>(&mut w, &lookup)?;
        } else {
            self.write_payload::<AsciiEncoding>(&mut w, &lookup)?;
        }
        w.flush()?;

        Ok(())
    }

    /// Creates the file at `path` (truncating it if it exists) and writes to
    /// it.
    pub fn write_to_file(&mut self, path: impl AsRef<Path>, as_binary: bool) -> Result<(), Error> {
        let path = path.as_ref();
        debug!("writing PLY file to '{}'", path.display());
        let file = File::create(path)?;
        self.write(BufWriter::new(file), as_binary)
    }

    /// Makes sure that every declared property is bound and that every buffer
    /// holds the bytes of all records, before anything is written.
    fn check_buffers(&self, lookup: &[ElementLookup]) -> Result<(), Error> {
        let mut needed = FxHashMap::<DataId, usize>::default();
        for (elem, elem_lookup) in self.header.elements.iter().zip(lookup) {
            for (prop, lookup) in elem.properties.iter().zip(elem_lookup) {
                let binding = lookup.binding.ok_or_else(|| unbound(&elem.name, &prop.name))?;
                let items = if prop.is_list() { prop.list_count } else { 1 };
                let bytes = elem.size.saturating_mul(items).saturating_mul(lookup.prop_stride);
                let total = needed.entry(binding.data).or_insert(0);
                *total = total.saturating_add(bytes);
            }
        }

        for (id, total) in needed {
            let available = self.datas.data(id).bytes().len();
            if available < total {
                return Err(Error::invalid_request(format!(
                    "{} holds {} bytes, but the declared records need {} bytes",
                    id,
                    available,
                    total,
                )));
            }
        }

        Ok(())
    }

    fn write_payload<E: EncodingWriter>(
        &mut self,
        w: &mut impl Write,
        lookup: &[ElementLookup],
    ) -> Result<(), Error> {
        for (elem, elem_lookup) in self.header.elements.iter().zip(lookup) {
            for _ in 0..elem.size {
                for (prop, lookup) in elem.properties.iter().zip(elem_lookup) {
                    let binding = lookup.binding.ok_or_else(|| unbound(&elem.name, &prop.name))?;

                    let (data, cursor) = self.datas.slot_mut(binding.data);
                    let len = if prop.is_list() { prop.list_count } else { 1 };
                    let start = cursor.byte_offset;
                    let end = start.saturating_add(len.saturating_mul(lookup.prop_stride));
                    let values = data.bytes().get(start..end).ok_or_else(|| {
                        Error::invalid_request(format!(
                            "buffer of property '{}' of element '{}' ends at byte {}, but \
                                needs {} bytes",
                            prop.name,
                            elem.name,
                            data.bytes().len(),
                            end,
                        ))
                    })?;

                    if let Some(list_type) = prop.list_type {
                        E::write_len(w, list_type, len)?;
                    }
                    E::write_values(w, prop.scalar_type, values)?;
                    cursor.byte_offset = end;
                }
                E::finish_record(w)?;
            }
        }

        Ok(())
    }
}

fn unbound(element: &str, property: &str) -> Error {
    Error::invalid_request(format!(
        "property '{}' of element '{}' has no data bound to it",
        property,
        element,
    ))
}

/// Abstracts over the two output encodings.
trait EncodingWriter {
    /// Writes the count field of a list.
    fn write_len(w: &mut impl Write, ty: ScalarType, len: usize) -> io::Result<()>;

    /// Writes host endian values of type `ty`.
    fn write_values(w: &mut impl Write, ty: ScalarType, src: &[u8]) -> io::Result<()>;

    fn finish_record(_w: &mut impl Write) -> io::Result<()> {
        Ok(())
    }
}

/// Binary encoding in host byte order.
enum BinaryEncoding {}
impl EncodingWriter for BinaryEncoding {
    fn write_len(w: &mut impl Write, ty: ScalarType, len: usize) -> io::Result<()> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..ty.stride()];
        ty.encode_len(len, buf);
        w.write_all(buf)
    }

    fn write_values(w: &mut impl Write, _: ScalarType, src: &[u8]) -> io::Result<()> {
        w.write_all(src)
    }
}

/// One line per record, every token followed by a single space.
enum AsciiEncoding {}
impl EncodingWriter for AsciiEncoding {
    fn write_len(w: &mut impl Write, _: ScalarType, len: usize) -> io::Result<()> {
        write!(w, "{} ", len)
    }

    fn write_values(w: &mut impl Write, ty: ScalarType, src: &[u8]) -> io::Result<()> {
        for value in src.chunks_exact(ty.stride()) {
            ty.write_ascii(value, w)?;
            w.write_all(b" ")?;
        }
        Ok(())
    }

    fn finish_record(w: &mut impl Write) -> io::Result<()> {
        w.write_all(b"\n")
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Property;

    #[test]
    fn rejects_bad_requests() {
        let bytes = [0u8; 12];
        let big = vec![0u8; 300];
        let mut writer = Writer::new();

        let empty: &[&str] = &[];
        assert!(writer.add_properties_to_element("v", empty, ScalarType::Uint8, 1, &bytes, None, 0)
            .is_err());
        assert!(writer.add_properties_to_element("", &["a"], ScalarType::Uint8, 1, &bytes, None, 0)
            .is_err());

        // Buffer too short
        assert!(writer.add_properties_to_element("v", &["a"], ScalarType::Int32, 4, &bytes, None, 0)
            .is_err());

        // List count doesn't fit into the count type
        assert!(writer.add_properties_to_element(
            "f", &["i"], ScalarType::Uint8, 1, &big, Some(ScalarType::Int8), 200,
        ).is_err());
        assert!(writer.add_properties_to_element(
            "f", &["i"], ScalarType::Uint8, 1, &big, Some(ScalarType::Float32), 2,
        ).is_err());

        // Nothing was declared by the failed calls
        assert!(writer.header().elements.is_empty());

        writer.add_properties_to_element("v", &["a"], ScalarType::Int32, 3, &bytes, None, 0)
            .unwrap();
        match writer.add_properties_to_element("v", &["a"], ScalarType::Int32, 3, &bytes, None, 0) {
            Err(Error::DuplicateRequest { element, property }) => {
                assert_eq!(element, "v");
                assert_eq!(property, "a");
            }
            other => panic!("expected duplicate request error, got {:?}", other),
        }

        // Record count mismatch
        assert!(writer.add_properties_to_element("v", &["b"], ScalarType::Uint8, 2, &bytes, None, 0)
            .is_err());
        assert_eq!(writer.header().elements[0].properties.len(), 1);
    }

    #[test]
    fn add_element_then_properties() {
        let values = [1u16, 2];
        let mut writer = Writer::new();
        assert_eq!(writer.add_element("v"), 0);
        assert_eq!(writer.add_element("w"), 1);
        assert_eq!(writer.add_element("v"), 0);
        assert_eq!(writer.header().elements.len(), 2);
        assert_eq!(writer.header().elements[0].size, 0);

        writer.add_typed_properties_to_element("v", &["a"], 2, &values, None, 0).unwrap();
        let elem = &writer.header().elements[0];
        assert_eq!(elem.size, 2);
        assert_eq!(elem.properties[0].scalar_type, ScalarType::Uint16);
    }

    #[test]
    fn record_count_is_fixed_once_bound() -> Result<(), failure::Error> {
        let empty: [u8; 0] = [];
        let values = [1u8, 2];
        let mut writer = Writer::new();
        writer.add_properties_to_element("v", &["a"], ScalarType::Uint8, 0, &empty, None, 0)?;

        match writer.add_properties_to_element("v", &["b"], ScalarType::Uint8, 2, &values, None, 0) {
            Err(Error::InvalidRequest(_)) => {}
            other => panic!("expected invalid request, got {:?}", other),
        }
        assert_eq!(writer.header().elements[0].size, 0);
        assert_eq!(writer.header().elements[0].properties.len(), 1);

        let mut out = Vec::new();
        writer.write(&mut out, false)?;
        assert_eq!(
            String::from_utf8(out)?,
            "ply\nformat ascii 1.0\nelement v 0\nproperty uchar a\nend_header\n",
        );

        Ok(())
    }

    #[test]
    fn inconsistent_header_is_rejected_before_writing() {
        let values = [1u8, 2];
        let mut writer = Writer::new();
        writer.add_typed_properties_to_element("v", &["a"], 2, &values, None, 0).unwrap();

        // More records than the buffer holds
        writer.header.elements[0].size = 5;
        let mut out = Vec::new();
        match writer.write(&mut out, false) {
            Err(Error::InvalidRequest(_)) => {}
            other => panic!("expected invalid request, got {:?}", other),
        }
        assert!(out.is_empty());
        writer.header.elements[0].size = 2;

        // A property without data
        writer.header.elements.push(Element::new("w", 2));
        writer.header.elements[1].properties.push(Property::scalar("q", ScalarType::Float32));
        match writer.write(&mut out, true) {
            Err(Error::InvalidRequest(_)) => {}
            other => panic!("expected invalid request, got {:?}", other),
        }
        assert!(out.is_empty());

        writer.header.elements.pop();
        writer.write(&mut out, false).unwrap();
        assert!(out.ends_with(b"end_header\n1 \n2 \n"));
    }

    #[test]
    #[should_panic]
    fn comment_with_newline() {
        Writer::new().add_comment("a\nb");
    }

    #[test]
    fn ascii_payload() -> Result<(), failure::Error> {
        let ints = [-1i8, 2, 3, -4];
        let lists = [10u16, 11, 12, 13];

        let mut writer = Writer::new();
        writer.add_typed_properties_to_element("thing", &["a", "b"], 2, &ints, None, 0)?;
        writer.add_typed_properties_to_element(
            "thing",
            &["l"],
            2,
            &lists,
            Some(ScalarType::Uint32),
            2,
        )?;

        let mut out = Vec::new();
        writer.write(&mut out, false)?;
        assert!(!writer.is_binary());
        assert_eq!(String::from_utf8(out)?, "ply\n\
            format ascii 1.0\n\
            element thing 2\n\
            property char a\n\
            property char b\n\
            property list uint ushort l\n\
            end_header\n\
            -1 2 2 10 11 \n\
            3 -4 2 12 13 \n");

        Ok(())
    }

    #[test]
    fn binary_payload() -> Result<(), failure::Error> {
        let values = [1.5f32, -2.0];
        let lists = [7i16, 8, 9, 10, 11, 12];

        let mut writer = Writer::new();
        writer.add_typed_properties_to_element("v", &["x"], 2, &values, None, 0)?;
        writer.add_typed_properties_to_element(
            "v",
            &["l"],
            2,
            &lists,
            Some(ScalarType::Uint16),
            3,
        )?;

        // Writing twice produces the same output as cursors are reset.
        let mut first = Vec::new();
        writer.write(&mut first, true)?;
        let mut out = Vec::new();
        writer.write(&mut out, true)?;
        assert_eq!(first, out);
        assert!(writer.is_binary());

        let header = format!(
            "ply\nformat {} 1.0\nelement v 2\nproperty float x\n\
                property list ushort short l\nend_header\n",
            Format::binary_native().keyword(),
        );
        assert!(out.starts_with(header.as_bytes()));

        let mut expected = Vec::new();
        for i in 0..2 {
            expected.extend_from_slice(&values[i].to_ne_bytes());
            expected.extend_from_slice(&3u16.to_ne_bytes());
            for v in &lists[i * 3..i * 3 + 3] {
                expected.extend_from_slice(&v.to_ne_bytes());
            }
        }
        assert_eq!(&out[header.len()..], &expected[..]);

        Ok(())
    }
}
