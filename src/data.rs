//! Typed, flat byte buffers holding decoded property values.

use std::collections::TryReserveError;

use derive_more::{Display, From};

use crate::{
    error::Error,
    types::{self, PlyScalar, ScalarType},
};


/// Storage of a [`Data`]: either a buffer owned by the data or a borrowed view
/// of a caller's slice (used when writing).
#[derive(Debug, Clone)]
pub(crate) enum Buffer<'a> {
    Owned(Vec<u8>),
    Alias(&'a [u8]),
}

impl Buffer<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Owned(v) => v,
            Buffer::Alias(s) => s,
        }
    }
}

/// A flat buffer of densely packed values of one scalar type.
///
/// After a successful read, `bytes()` holds `num_items()` values in host byte
/// order, in record order, with the values of all properties sharing this
/// data interleaved per record in request order. Lists are stored without
/// their length prefix.
#[derive(Debug, Clone)]
pub struct Data<'a> {
    ty: ScalarType,
    buffer: Buffer<'a>,
    count: usize,
    is_list: bool,
}

impl<'a> Data<'a> {
    pub(crate) fn owned(ty: ScalarType, len_bytes: usize) -> Self {
        Self {
            ty,
            buffer: Buffer::Owned(vec![0; len_bytes]),
            count: 0,
            is_list: false,
        }
    }

    /// Like `owned`, but reports a failed allocation instead of aborting.
    pub(crate) fn try_owned(ty: ScalarType, len_bytes: usize) -> Result<Self, TryReserveError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len_bytes)?;
        buf.resize(len_bytes, 0);

        Ok(Self {
            ty,
            buffer: Buffer::Owned(buf),
            count: 0,
            is_list: false,
        })
    }

    pub(crate) fn alias(ty: ScalarType, bytes: &'a [u8], count: usize, is_list: bool) -> Self {
        Self {
            ty,
            buffer: Buffer::Alias(bytes),
            count,
            is_list,
        }
    }

    /// The scalar type of every value in this buffer.
    pub fn ty(&self) -> ScalarType {
        self.ty
    }

    /// The number of records (element instances) this data was filled from.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the bound property is a list property.
    pub fn is_list(&self) -> bool {
        self.is_list
    }

    /// The raw, host endian bytes.
    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// The number of scalar values stored, i.e. `bytes().len() / stride`.
    pub fn num_items(&self) -> usize {
        self.bytes().len() / self.ty.stride()
    }

    /// Decodes all values into a `Vec<T>`. Fails with `TypeMismatch` if `T`
    /// does not correspond to the stored scalar type.
    pub fn to_vec<T: PlyScalar>(&self) -> Result<Vec<T>, Error> {
        if T::TY != self.ty {
            return Err(Error::TypeMismatch { expected: T::TY, found: self.ty });
        }

        let out = self.bytes()
            .chunks_exact(self.ty.stride())
            .map(T::read_ne)
            .collect();
        Ok(out)
    }

    /// Consumes the data and returns the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.buffer {
            Buffer::Owned(v) => v,
            Buffer::Alias(s) => s.to_vec(),
        }
    }

    pub(crate) fn set_count(&mut self, count: usize, is_list: bool) {
        self.count = count;
        self.is_list = is_list;
    }

    /// Mutable access to an owned buffer. Aliased data is never written to.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.buffer {
            Buffer::Owned(v) => v,
            Buffer::Alias(_) => &mut [],
        }
    }

    /// Reverses the byte order of every stored value in place.
    pub(crate) fn endian_reverse(&mut self) {
        let ty = self.ty;
        types::endian_reverse(ty, self.bytes_mut());
    }
}

/// Handle to one [`Data`] returned by a property request. It stays valid for
/// the lifetime of the reader or writer that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Display)]
#[display(fmt = "DataId({})", _0)]
pub struct DataId(u32);

impl DataId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Where the next value of a data goes and how large the data is.
///
/// During the measuring pass `total_size_bytes` accumulates the required
/// size, during the storing pass `byte_offset` advances and must never exceed
/// it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DataCursor {
    pub(crate) byte_offset: usize,
    pub(crate) total_size_bytes: usize,
}

#[derive(Debug)]
struct Slot<'a> {
    data: Data<'a>,
    cursor: DataCursor,
    taken: bool,
}

/// All datas created by a reader or writer, addressed by `DataId`.
#[derive(Debug, Default)]
pub(crate) struct DataArena<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> DataArena<'a> {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn push(&mut self, data: Data<'a>) -> DataId {
        let id = DataId::from(self.slots.len() as u32);
        self.slots.push(Slot { data, cursor: DataCursor::default(), taken: false });
        id
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = DataId> {
        (0..self.slots.len() as u32).map(DataId::from)
    }

    /// Returns the data unless it was taken out already.
    pub(crate) fn get(&self, id: DataId) -> Option<&Data<'a>> {
        self.slots.get(id.idx()).filter(|s| !s.taken).map(|s| &s.data)
    }

    /// Moves the data out, leaving an empty buffer of the same type behind.
    pub(crate) fn take(&mut self, id: DataId) -> Option<Data<'a>> {
        let slot = self.slots.get_mut(id.idx()).filter(|s| !s.taken)?;
        let empty = Data::owned(slot.data.ty, 0);
        slot.taken = true;
        Some(std::mem::replace(&mut slot.data, empty))
    }

    pub(crate) fn data(&self, id: DataId) -> &Data<'a> {
        &self.slots[id.idx()].data
    }

    pub(crate) fn data_mut(&mut self, id: DataId) -> &mut Data<'a> {
        &mut self.slots[id.idx()].data
    }

    pub(crate) fn cursor(&self, id: DataId) -> DataCursor {
        self.slots[id.idx()].cursor
    }

    pub(crate) fn cursor_mut(&mut self, id: DataId) -> &mut DataCursor {
        &mut self.slots[id.idx()].cursor
    }

    /// Returns the data and its cursor at the same time.
    pub(crate) fn slot_mut(&mut self, id: DataId) -> (&mut Data<'a>, &mut DataCursor) {
        let slot = &mut self.slots[id.idx()];
        (&mut slot.data, &mut slot.cursor)
    }

    pub(crate) fn reset_cursors(&mut self) {
        for slot in &mut self.slots {
            slot.cursor = DataCursor::default();
        }
    }
}
