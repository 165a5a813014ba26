//! The symbol table: one converter per source type.
//!
//! A source type is reachable under two keys: `(library, type index)` when it is found by
//! enumeration or by a local reference, and `(library, type GUID)` when a cross-library
//! reference names it by GUID. The library part is the `LIBID` together with the major and
//! minor version, so two versions of one library never share a converter. Both keys are bound to the same slot, so every lookup for one
//! source type yields the same converter.
//!
//! Converters live in an arena and are addressed by [`ConverterId`]; the ids stay valid for the
//! whole run, which lets converters refer to each other before they are populated.

use std::collections::{HashMap, VecDeque};

use uguid::Guid;

use crate::{typelib::LibraryIdentity, Result};

/// Canonical identity of a source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKey {
    /// Located by enumeration order
    Index {
        /// `LIBID` of the owning library
        library: Guid,
        /// Major version of the owning library
        major: u16,
        /// Minor version of the owning library
        minor: u16,
        /// Type index inside the library
        index: u32,
    },
    /// Located by type GUID
    Guid {
        /// `LIBID` of the owning library
        library: Guid,
        /// Major version of the owning library
        major: u16,
        /// Minor version of the owning library
        minor: u16,
        /// GUID of the type
        guid: Guid,
    },
}

impl SymbolKey {
    /// The key of type `index` in `library`.
    #[must_use]
    pub fn by_index(library: &LibraryIdentity, index: u32) -> Self {
        SymbolKey::Index {
            library: library.guid,
            major: library.major,
            minor: library.minor,
            index,
        }
    }

    /// The key of the type with GUID `guid` in `library`.
    #[must_use]
    pub fn by_guid(library: &LibraryIdentity, guid: Guid) -> Self {
        SymbolKey::Guid {
            library: library.guid,
            major: library.major,
            minor: library.minor,
            guid,
        }
    }
}

/// Stable handle of a converter inside a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConverterId(pub usize);

/// Arena of converters indexed by [`SymbolKey`].
///
/// Insertions are queued in order so the importer can define newly registered types in the
/// order they appeared.
#[derive(Debug)]
pub struct SymbolTable<T> {
    entries: Vec<T>,
    keys: HashMap<SymbolKey, ConverterId>,
    added: VecDeque<ConverterId>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable {
            entries: Vec::new(),
            keys: HashMap::new(),
            added: VecDeque::new(),
        }
    }
}

impl<T> SymbolTable<T> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The converter bound to `key`.
    #[must_use]
    pub fn lookup(&self, key: &SymbolKey) -> Option<ConverterId> {
        self.keys.get(key).copied()
    }

    /// The converter bound to `key`, created by `factory` if there is none.
    ///
    /// `factory` receives the table and may register other types. If that re-entrant work
    /// binds `key` itself, the converter created first wins and the factory's value is dropped.
    ///
    /// # Errors
    /// Propagates the error of `factory`; nothing is bound in that case.
    pub fn get_or_create<F>(&mut self, key: SymbolKey, factory: F) -> Result<ConverterId>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }

        let value = factory(self)?;
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }

        let id = ConverterId(self.entries.len());
        self.entries.push(value);
        self.keys.insert(key, id);
        self.added.push_back(id);
        Ok(id)
    }

    /// Bind a second key to `id`. Returns the converter the key resolves to afterwards, which
    /// is the existing one if the key was already bound.
    pub fn bind(&mut self, key: SymbolKey, id: ConverterId) -> ConverterId {
        *self.keys.entry(key).or_insert(id)
    }

    /// Take the oldest converter not yet reported by this method.
    pub fn next_added(&mut self) -> Option<ConverterId> {
        self.added.pop_front()
    }

    /// The converter `id`.
    #[must_use]
    pub fn get(&self, id: ConverterId) -> Option<&T> {
        self.entries.get(id.0)
    }

    /// The converter `id`, mutably.
    pub fn get_mut(&mut self, id: ConverterId) -> Option<&mut T> {
        self.entries.get_mut(id.0)
    }

    /// Number of converters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every converter id in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ConverterId> {
        (0..self.entries.len()).map(ConverterId)
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;

    const LIB: LibraryIdentity = LibraryIdentity {
        guid: guid!("3f2a0c11-0000-4000-8000-00000000aaaa"),
        major: 1,
        minor: 0,
        lcid: 0,
    };

    fn index(index: u32) -> SymbolKey {
        SymbolKey::by_index(&LIB, index)
    }

    #[test]
    fn same_key_same_converter() {
        let mut table = SymbolTable::new();
        let first = table.get_or_create(index(0), |_| Ok("IFoo")).unwrap();
        let second = table
            .get_or_create(index(0), |_| panic!("factory must not run twice"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(first), Some(&"IFoo"));
    }

    #[test]
    fn guid_key_binds_to_existing() {
        let mut table = SymbolTable::new();
        let id = table.get_or_create(index(2), |_| Ok(2)).unwrap();
        let by_guid = SymbolKey::by_guid(&LIB, guid!("11111111-2222-3333-4444-555555555555"));
        assert_eq!(table.bind(by_guid, id), id);
        assert_eq!(table.lookup(&by_guid), Some(id));

        let other = table.get_or_create(index(3), |_| Ok(3)).unwrap();
        assert_eq!(table.bind(by_guid, other), id);
    }

    #[test]
    fn versions_are_distinct() {
        let mut table = SymbolTable::new();
        let newer = LibraryIdentity { major: 2, ..LIB };
        let old = table.get_or_create(index(0), |_| Ok("v1")).unwrap();
        let new = table
            .get_or_create(SymbolKey::by_index(&newer, 0), |_| Ok("v2"))
            .unwrap();
        assert_ne!(old, new);
        assert_eq!(table.get(new), Some(&"v2"));
    }

    #[test]
    fn reentrant_creation_has_one_winner() {
        let mut table = SymbolTable::new();
        let id = table
            .get_or_create(index(0), |inner| {
                let nested = inner.get_or_create(index(0), |_| Ok("inner"))?;
                assert_eq!(nested, ConverterId(0));
                Ok("outer")
            })
            .unwrap();
        assert_eq!(id, ConverterId(0));
        assert_eq!(table.get(id), Some(&"inner"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn failed_factory_binds_nothing() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        assert!(table
            .get_or_create(index(1), |_| Err(malformed_error!("unreadable")))
            .is_err());
        assert!(table.lookup(&index(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn additions_are_queued_in_order() {
        let mut table = SymbolTable::new();
        for i in 0..3 {
            table.get_or_create(index(i), |_| Ok(i)).unwrap();
        }
        assert_eq!(table.next_added(), Some(ConverterId(0)));
        assert_eq!(table.next_added(), Some(ConverterId(1)));
        assert_eq!(table.next_added(), Some(ConverterId(2)));
        assert_eq!(table.next_added(), None);
        assert_eq!(table.ids().count(), 3);
    }
}
