//! Which properties were requested and where their values go.

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    data::DataId,
    header::Header,
};


/// Position of a property inside the header: element index and property index
/// within that element. Names are resolved to this once, at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PropKey {
    pub(crate) element: usize,
    pub(crate) property: usize,
}

impl PropKey {
    pub(crate) fn new(element: usize, property: usize) -> Self {
        Self { element, property }
    }
}

/// The destination of one requested property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) data: DataId,

    /// Expected number of list items per record, 0 if unknown.
    pub(crate) list_size_hint: u32,
}

/// Maps each requested property to its binding. Every key can be bound at most
/// once; several keys may share one data.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bindings {
    map: FxHashMap<PropKey, Binding>,
}

impl Bindings {
    pub(crate) fn contains(&self, key: PropKey) -> bool {
        self.map.contains_key(&key)
    }

    /// Adds a binding. The key must not be bound yet.
    pub(crate) fn insert(&mut self, key: PropKey, binding: Binding) {
        let old = self.map.insert(key, binding);
        debug_assert!(old.is_none(), "property {:?} bound twice", key);
    }

    pub(crate) fn get(&self, key: PropKey) -> Option<Binding> {
        self.map.get(&key).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether any property of the element with the given index is bound.
    pub(crate) fn binds_element(&self, element: usize) -> bool {
        self.map.keys().any(|k| k.element == element)
    }

    /// Whether any request came with a list size hint. This selects the single
    /// pass allocation strategy.
    pub(crate) fn any_list_hint(&self) -> bool {
        self.map.values().any(|b| b.list_size_hint > 0)
    }

    /// All keys sharing the given data, in header order.
    pub(crate) fn keys_of(&self, data: DataId) -> SmallVec<[PropKey; 4]> {
        let mut keys: SmallVec<[_; 4]> = self.map.iter()
            .filter(|(_, b)| b.data == data)
            .map(|(k, _)| *k)
            .collect();
        keys.sort();
        keys
    }

    /// The list size hint given for a data (the largest, if several keys
    /// share it).
    pub(crate) fn hint_of(&self, data: DataId) -> u32 {
        self.map.values()
            .filter(|b| b.data == data)
            .map(|b| b.list_size_hint)
            .max()
            .unwrap_or(0)
    }
}

/// Flattened view of the bindings for one property, looked up by index in the
/// inner decode/encode loops instead of hashing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PropertyLookup {
    /// `None` means the property is skipped.
    pub(crate) binding: Option<Binding>,
    pub(crate) prop_stride: usize,
}

/// Lookups of all properties of one element.
pub(crate) type ElementLookup = SmallVec<[PropertyLookup; 8]>;

impl Header {
    /// Builds the lookup table, indexed by element and property index.
    pub(crate) fn property_lookup_table(&self) -> Vec<ElementLookup> {
        self.elements.iter().enumerate().map(|(ei, elem)| {
            elem.properties.iter().enumerate().map(|(pi, prop)| {
                PropertyLookup {
                    binding: self.bindings.get(PropKey::new(ei, pi)),
                    prop_stride: prop.scalar_type.stride(),
                }
            }).collect()
        }).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        header::{Element, Property},
        types::ScalarType,
    };

    fn header() -> Header {
        let mut header = Header::new();
        let mut vertex = Element::new("vertex", 4);
        vertex.properties.push(Property::scalar("x", ScalarType::Float32));
        vertex.properties.push(Property::scalar("y", ScalarType::Float32));
        vertex.properties.push(Property::scalar("red", ScalarType::Uint8));
        header.elements.push(vertex);
        let mut face = Element::new("face", 2);
        face.properties.push(
            Property::list("vertex_indices", ScalarType::Uint8, ScalarType::Int32, 0),
        );
        header.elements.push(face);
        header
    }

    #[test]
    fn shared_data() {
        let mut bindings = Bindings::default();
        let a = DataId::from(0);
        let b = DataId::from(1);
        assert!(bindings.is_empty());

        bindings.insert(PropKey::new(0, 1), Binding { data: a, list_size_hint: 0 });
        bindings.insert(PropKey::new(0, 0), Binding { data: a, list_size_hint: 0 });
        bindings.insert(PropKey::new(1, 0), Binding { data: b, list_size_hint: 0 });

        assert!(bindings.binds_element(1));
        assert!(!bindings.binds_element(2));
        assert!(bindings.contains(PropKey::new(0, 0)));
        assert!(!bindings.contains(PropKey::new(0, 2)));
        assert_eq!(bindings.keys_of(a).as_slice(), &[PropKey::new(0, 0), PropKey::new(0, 1)]);
        assert_eq!(bindings.keys_of(b).as_slice(), &[PropKey::new(1, 0)]);
        assert!(!bindings.any_list_hint());
        assert_eq!(bindings.hint_of(b), 0);
    }

    #[test]
    fn hints() {
        let mut bindings = Bindings::default();
        let a = DataId::from(0);
        bindings.insert(PropKey::new(1, 0), Binding { data: a, list_size_hint: 3 });
        assert!(bindings.any_list_hint());
        assert_eq!(bindings.hint_of(a), 3);
        assert_eq!(bindings.get(PropKey::new(1, 0)).map(|b| b.list_size_hint), Some(3));
    }

    #[test]
    fn lookup_table() {
        let mut header = header();
        let id = DataId::from(7);
        header.bindings.insert(PropKey::new(1, 0), Binding { data: id, list_size_hint: 0 });

        let table = header.property_lookup_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].len(), 3);
        assert!(table[0].iter().all(|l| l.binding.is_none()));
        assert_eq!(table[0][0].prop_stride, 4);
        assert_eq!(table[0][2].prop_stride, 1);

        let face = table[1][0];
        assert_eq!(face.binding.map(|b| b.data), Some(id));
        assert_eq!(face.prop_stride, 4);
    }
}
