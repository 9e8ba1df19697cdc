//! Reading PLY files: header parsing, property requests and payload decoding.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use log::{debug, trace, warn};
use smallvec::SmallVec;

use crate::{
    binding::{Binding, ElementLookup, PropKey, PropertyLookup},
    data::{Data, DataArena, DataId},
    error::Error,
    header::{Element, Format, Header, Property},
    parse::{self, Input},
    types::ScalarType,
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    HeaderParsed,
    DataRead,
}

/// Which of the two traversals of the payload is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Only measures how many bytes each data needs and learns list lengths.
    Measure,

    /// Copies values into the allocated datas.
    Store,
}

/// A reader for PLY files that decodes only the requested properties.
///
/// Usage is strictly sequential:
///
/// 1. create the reader with [`Reader::new`] or [`Reader::open`],
/// 2. call [`Reader::parse_header`] and inspect the elements,
/// 3. request properties, each call returning a [`DataId`],
/// 4. call [`Reader::read`] once,
/// 5. access the decoded buffers via [`Reader::data`] or
///    [`Reader::take_data`].
///
/// Requested properties of one call share a single buffer, with their values
/// interleaved per record. That makes it possible to get `x`, `y` and `z` of
/// all vertices as one flat array of triples.
#[derive(Debug)]
pub struct Reader<R> {
    stream: R,
    header: Header,
    datas: DataArena<'static>,
    payload_offset: u64,
    state: State,
}

impl Reader<BufReader<File>> {
    /// Opens the file at the given path. The header is not parsed yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> Reader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            header: Header::new(),
            datas: DataArena::new(),
            payload_offset: 0,
            state: State::Created,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn elements(&self) -> &[Element] {
        &self.header.elements
    }

    pub fn comments(&self) -> &[String] {
        &self.header.comments
    }

    pub fn comments_mut(&mut self) -> &mut Vec<String> {
        &mut self.header.comments
    }

    /// The `obj_info` lines of the header.
    pub fn info(&self) -> &[String] {
        &self.header.obj_info
    }

    pub fn is_binary(&self) -> bool {
        self.header.is_binary
    }

    pub fn format(&self) -> Format {
        self.header.format()
    }

    /// Returns the decoded data for the given request. `None` before `read()`
    /// finished or after the data was taken.
    pub fn data(&self, id: DataId) -> Option<&Data<'static>> {
        if self.state != State::DataRead {
            return None;
        }
        self.datas.get(id)
    }

    /// Moves the decoded data for the given request out of the reader.
    pub fn take_data(&mut self, id: DataId) -> Option<Data<'static>> {
        if self.state != State::DataRead {
            return None;
        }
        self.datas.take(id)
    }

    /// Prints a summary of the header to stdout.
    pub fn report_structure(&self) -> Result<(), Error> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.header.report(&mut lock)?;
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    /// Requests properties of the element with the given name. See
    /// [`Reader::request_properties_from_element_at`].
    pub fn request_properties_from_element(
        &mut self,
        element: &str,
        properties: &[&str],
        list_size_hint: u32,
    ) -> Result<DataId, Error> {
        self.check_requests_allowed()?;
        if self.header.elements.is_empty() {
            return Err(Error::invalid_request("header had no elements defined. Malformed file?"));
        }
        if element.is_empty() {
            return Err(Error::invalid_request("element name is empty"));
        }

        let idx = self.header.find_element(element).ok_or_else(|| {
            Error::invalid_request(format!("requested element '{}' not found", element))
        })?;
        self.request_properties_from_element_at(idx, properties, list_size_hint)
    }

    /// Requests that the given properties of the element with index `element`
    /// are decoded into one shared buffer.
    ///
    /// All found properties must have the same scalar type. Names that the
    /// element doesn't have are skipped with a warning. `list_size_hint` is
    /// the expected number of items per record of list properties; if any
    /// request passes a non-zero hint, the payload is read in one pass and all
    /// list requests must pass a hint. Otherwise, the payload is traversed
    /// twice to measure buffer sizes first.
    ///
    /// Fails before touching the stream if the request is empty, contains
    /// no known property, mixes scalar types or requests a property a second
    /// time.
    pub fn request_properties_from_element_at(
        &mut self,
        element: usize,
        properties: &[&str],
        list_size_hint: u32,
    ) -> Result<DataId, Error> {
        self.check_requests_allowed()?;
        let elem = self.header.elements.get(element).ok_or_else(|| {
            Error::invalid_request(format!("element index {} out of range", element))
        })?;
        if properties.is_empty() {
            return Err(Error::invalid_request("list of requested properties is empty"));
        }

        let mut keys = SmallVec::<[PropKey; 4]>::new();
        for &name in properties {
            let prop_idx = match elem.find_property(name) {
                Some(idx) => idx,
                None => {
                    warn!(
                        "requested property '{}' not found in element '{}', ignoring it",
                        name,
                        elem.name,
                    );
                    continue;
                }
            };

            let key = PropKey::new(element, prop_idx);
            if keys.contains(&key) || self.header.bindings.contains(key) {
                return Err(Error::DuplicateRequest {
                    element: elem.name.clone(),
                    property: name.to_string(),
                });
            }
            keys.push(key);
        }

        let first = match keys.first() {
            Some(key) => &elem.properties[key.property],
            None => {
                return Err(Error::invalid_request(format!(
                    "none of the requested properties exist in element '{}'",
                    elem.name,
                )));
            }
        };

        let ty = first.scalar_type;
        if let Some(other) = keys.iter()
            .map(|k| &elem.properties[k.property])
            .find(|p| p.scalar_type != ty)
        {
            return Err(Error::invalid_request(format!(
                "all requested properties must share the scalar type, but '{}' is '{}' and \
                    '{}' is '{}'",
                first.name,
                ty,
                other.name,
                other.scalar_type,
            )));
        }

        let is_list = keys.iter().any(|k| elem.properties[k.property].is_list());
        let mut data = Data::owned(ty, 0);
        data.set_count(elem.size, is_list);
        let id = self.datas.push(data);

        debug!(
            "requested {} properties of '{}' as {} (type {}, list: {}, hint: {})",
            keys.len(),
            elem.name,
            id,
            ty,
            is_list,
            list_size_hint,
        );

        for key in keys {
            self.header.bindings.insert(key, Binding { data: id, list_size_hint });
        }

        Ok(id)
    }

    fn check_requests_allowed(&self) -> Result<(), Error> {
        match self.state {
            State::Created => Err(Error::invalid_request("header was not parsed yet")),
            State::HeaderParsed => Ok(()),
            State::DataRead => Err(Error::invalid_request("data was already read")),
        }
    }
}

impl<R: BufRead> Reader<R> {
    /// Parses the header. Returns `false` if unknown header lines were
    /// skipped; the rest of the header is usable nonetheless.
    pub fn parse_header(&mut self) -> Result<bool, Error> {
        if self.state != State::Created {
            return Err(Error::invalid_request("header was already parsed"));
        }

        let (ok, len) = self.header.parse(&mut self.stream)?;
        self.payload_offset = len;
        self.state = State::HeaderParsed;
        debug!(
            "parsed PLY header ({} bytes, format {}, {} elements)",
            len,
            self.header.format(),
            self.header.elements.len(),
        );

        Ok(ok)
    }
}

impl<R: BufRead + Seek> Reader<R> {
    /// Decodes the payload into the buffers of all requests.
    ///
    /// Afterwards, all buffers hold values in host byte order. If any list
    /// property was read, its `list_count` in the header is set to the length
    /// found in the file. Lists whose length varies between records are not
    /// supported and result in `ListLengthMismatch` (unless a hint was given,
    /// in which case the lengths are trusted).
    pub fn read(&mut self) -> Result<(), Error> {
        match self.state {
            State::Created => return Err(Error::invalid_request("header was not parsed yet")),
            State::HeaderParsed => {}
            State::DataRead => return Err(Error::invalid_request("data was already read")),
        }

        if self.header.bindings.is_empty() {
            warn!("no properties were requested, the payload is only checked for validity");
        }

        let lookup = self.header.property_lookup_table();
        let format = self.header.format();

        if self.header.bindings.any_list_hint() {
            debug!("list size hint given: allocating up front and reading in one pass");
            self.allocate_from_hints()?;
        } else {
            debug!("no list size hint given: measuring in a first pass");
            let start = self.stream.seek(SeekFrom::Current(0))?;
            self.parse_payload(format, Pass::Measure, &lookup)?;
            self.stream.seek(SeekFrom::Start(start))?;

            for id in self.datas.ids() {
                let size = self.datas.cursor(id).total_size_bytes;
                let ty = self.datas.data(id).ty();
                debug!("allocating {} bytes for {} ({})", size, id, ty);
                resize(id, self.datas.data_mut(id), size)?;
            }
        }

        self.datas.reset_cursors();
        self.parse_payload(format, Pass::Store, &lookup)?;

        if format.needs_swap() {
            trace!("swapping byte order of all buffers");
            for id in self.datas.ids() {
                self.datas.data_mut(id).endian_reverse();
            }
        }

        self.state = State::DataRead;
        Ok(())
    }

    fn allocate_from_hints(&mut self) -> Result<(), Error> {
        for id in self.datas.ids() {
            let keys = self.header.bindings.keys_of(id);
            let hint = self.header.bindings.hint_of(id) as usize;
            let data = self.datas.data_mut(id);

            let items_per_record = if data.is_list() {
                if hint == 0 {
                    let key = keys[0];
                    let elem = &self.header.elements[key.element];
                    return Err(Error::invalid_request(format!(
                        "list property '{}' of element '{}' was requested without a list size \
                            hint, but other requests have one. Either all or no list requests \
                            need a hint",
                        elem.properties[key.property].name,
                        elem.name,
                    )));
                }
                hint
            } else {
                1
            };

            let size = data.count()
                .checked_mul(data.ty().stride() * keys.len())
                .and_then(|n| n.checked_mul(items_per_record))
                .ok_or_else(|| Error::invalid_request(format!(
                    "buffer size for {} overflows (list size hint {})",
                    id,
                    hint,
                )))?;
            debug!("allocating {} bytes for {} ({})", size, id, data.ty());
            resize(id, data, size)?;
        }

        Ok(())
    }

    fn parse_payload(
        &mut self,
        format: Format,
        pass: Pass,
        lookup: &[ElementLookup],
    ) -> Result<(), Error> {
        trace!("starting {:?} pass at byte {}", pass, self.payload_offset);
        let mut input = Input::new(&mut self.stream, self.payload_offset);
        let header = &mut self.header;
        let datas = &mut self.datas;

        match format {
            Format::Ascii => {
                parse_data::<AsciiEncoding, _>(&mut input, header, datas, pass, lookup)?;
            }
            Format::BinaryBigEndian => {
                parse_data::<BbeEncoding, _>(&mut input, header, datas, pass, lookup)?;
            }
            Format::BinaryLittleEndian => {
                parse_data::<BleEncoding, _>(&mut input, header, datas, pass, lookup)?;
            }
        }

        trace!("finished {:?} pass at byte {}", pass, input.offset());
        Ok(())
    }
}

/// Replaces the data's buffer with a zeroed one of `len_bytes` bytes. The
/// size comes from the file, so a failed allocation is an error, not an abort.
fn resize(id: DataId, data: &mut Data<'static>, len_bytes: usize) -> Result<(), Error> {
    let (ty, count, is_list) = (data.ty(), data.count(), data.is_list());
    *data = Data::try_owned(ty, len_bytes)
        .map_err(|_| Error::AllocationFailed { data: id, size: len_bytes })?;
    data.set_count(count, is_list);
    Ok(())
}


// ===========================================================================
// ===== Payload decoding
// ===========================================================================

/// Walks over all records of all elements once.
fn parse_data<E: EncodingReader, R: BufRead>(
    input: &mut Input<R>,
    header: &mut Header,
    datas: &mut DataArena<'static>,
    pass: Pass,
    lookup: &[ElementLookup],
) -> Result<(), Error> {
    for (elem, elem_lookup) in header.elements.iter_mut().zip(lookup) {
        if elem.properties.is_empty() {
            continue;
        }

        for _ in 0..elem.size {
            for (prop, lookup) in elem.properties.iter_mut().zip(elem_lookup) {
                decode_property::<E, R>(input, &elem.name, prop, lookup, datas, pass)?;
            }
        }
    }

    Ok(())
}

fn decode_property<E: EncodingReader, R: BufRead>(
    input: &mut Input<R>,
    elem_name: &str,
    prop: &mut Property,
    lookup: &PropertyLookup,
    datas: &mut DataArena<'static>,
    pass: Pass,
) -> Result<(), Error> {
    let binding = match (lookup.binding, pass) {
        (None, _) => {
            return skip_property::<E, R>(input, prop)
                .map(|_| ())
                .map_err(|e| e.in_property(elem_name, &prop.name));
        }
        (Some(binding), Pass::Measure) => binding,
        (Some(binding), Pass::Store) => {
            return store_property::<E, R>(input, prop, binding, datas)
                .map_err(|e| e.in_property(elem_name, &prop.name));
        }
    };

    let len = skip_property::<E, R>(input, prop)
        .map_err(|e| e.in_property(elem_name, &prop.name))?;
    datas.cursor_mut(binding.data).total_size_bytes += len * lookup.prop_stride;

    if prop.is_list() {
        if prop.list_count == 0 {
            prop.list_count = len;
        } else if prop.list_count != len {
            return Err(Error::ListLengthMismatch {
                element: elem_name.to_string(),
                property: prop.name.clone(),
                expected: prop.list_count,
                found: len,
            });
        }
    }

    Ok(())
}

/// Skips one property value and returns the number of scalars it consisted of.
fn skip_property<E: EncodingReader, R: BufRead>(
    input: &mut Input<R>,
    prop: &Property,
) -> Result<usize, parse::Error> {
    let len = match prop.list_type {
        Some(list_type) => E::read_len(input, list_type)?,
        None => 1,
    };
    E::skip_values(input, prop.scalar_type, len)?;

    Ok(len)
}

fn store_property<E: EncodingReader, R: BufRead>(
    input: &mut Input<R>,
    prop: &Property,
    binding: Binding,
    datas: &mut DataArena<'static>,
) -> Result<(), parse::Error> {
    let len = match prop.list_type {
        Some(list_type) => E::read_len(input, list_type)?,
        None => 1,
    };

    let (data, cursor) = datas.slot_mut(binding.data);
    let capacity = data.bytes().len();
    let start = cursor.byte_offset;
    let end = len.checked_mul(prop.scalar_type.stride())
        .and_then(|n| n.checked_add(start))
        .filter(|&end| end <= capacity)
        .ok_or(parse::Error::DestinationOverflow {
            needed: start.saturating_add(len.saturating_mul(prop.scalar_type.stride())),
            capacity,
        })?;

    E::read_values(input, prop.scalar_type, &mut data.bytes_mut()[start..end])?;
    cursor.byte_offset = end;

    Ok(())
}

/// Abstracts over the three payload encodings.
trait EncodingReader {
    /// Reads a list count field of type `ty`.
    fn read_len<R: BufRead>(input: &mut Input<R>, ty: ScalarType) -> Result<usize, parse::Error>;

    /// Fills `dst` with values of type `ty`, stored in file byte order for
    /// binary encodings and host byte order for ASCII.
    fn read_values<R: BufRead>(
        input: &mut Input<R>,
        ty: ScalarType,
        dst: &mut [u8],
    ) -> Result<(), parse::Error>;

    /// Skips `count` values of type `ty`.
    fn skip_values<R: BufRead>(
        input: &mut Input<R>,
        ty: ScalarType,
        count: usize,
    ) -> Result<(), parse::Error>;
}

fn read_binary_len<B: ByteOrder, R: BufRead>(
    input: &mut Input<R>,
    ty: ScalarType,
) -> Result<usize, parse::Error> {
    let offset = input.offset();
    let mut buf = [0u8; 8];
    let buf = &mut buf[..ty.stride()];
    input.read_exact(buf)?;

    // The count is needed right away, so it is converted from file byte order
    // here instead of in the bulk swap after reading.
    ty.decode_len::<B>(buf)
        .map(|len| len as usize)
        .ok_or(parse::Error::InvalidListLength(offset))
}

fn skip_binary_values<R: BufRead>(
    input: &mut Input<R>,
    ty: ScalarType,
    count: usize,
) -> Result<(), parse::Error> {
    let num_bytes = count.checked_mul(ty.stride())
        .ok_or(parse::Error::UnexpectedEof(input.offset()))?;
    input.skip(num_bytes)
}

enum BbeEncoding {}
impl EncodingReader for BbeEncoding {
    fn read_len<R: BufRead>(input: &mut Input<R>, ty: ScalarType) -> Result<usize, parse::Error> {
        read_binary_len::<BigEndian, _>(input, ty)
    }
    fn read_values<R: BufRead>(
        input: &mut Input<R>,
        _: ScalarType,
        dst: &mut [u8],
    ) -> Result<(), parse::Error> {
        input.read_exact(dst)
    }
    fn skip_values<R: BufRead>(
        input: &mut Input<R>,
        ty: ScalarType,
        count: usize,
    ) -> Result<(), parse::Error> {
        skip_binary_values(input, ty, count)
    }
}

enum BleEncoding {}
impl EncodingReader for BleEncoding {
    fn read_len<R: BufRead>(input: &mut Input<R>, ty: ScalarType) -> Result<usize, parse::Error> {
        read_binary_len::<LittleEndian, _>(input, ty)
    }
    fn read_values<R: BufRead>(
        input: &mut Input<R>,
        _: ScalarType,
        dst: &mut [u8],
    ) -> Result<(), parse::Error> {
        input.read_exact(dst)
    }
    fn skip_values<R: BufRead>(
        input: &mut Input<R>,
        ty: ScalarType,
        count: usize,
    ) -> Result<(), parse::Error> {
        skip_binary_values(input, ty, count)
    }
}

enum AsciiEncoding {}
impl EncodingReader for AsciiEncoding {
    fn read_len<R: BufRead>(input: &mut Input<R>, ty: ScalarType) -> Result<usize, parse::Error> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..ty.stride()];
        let (token, offset) = input.next_token()?;
        ty.read_ascii(token, buf, offset)?;

        ty.decode_len::<NativeEndian>(buf)
            .map(|len| len as usize)
            .ok_or(parse::Error::InvalidListLength(offset))
    }
    fn read_values<R: BufRead>(
        input: &mut Input<R>,
        ty: ScalarType,
        dst: &mut [u8],
    ) -> Result<(), parse::Error> {
        for value in dst.chunks_exact_mut(ty.stride()) {
            let (token, offset) = input.next_token()?;
            ty.read_ascii(token, value, offset)?;
        }
        Ok(())
    }
    fn skip_values<R: BufRead>(
        input: &mut Input<R>,
        _: ScalarType,
        count: usize,
    ) -> Result<(), parse::Error> {
        for _ in 0..count {
            input.next_token()?;
        }
        Ok(())
    }
}
