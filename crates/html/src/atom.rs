//! Atom table for interned HTML tag/attribute names.

use std::collections::HashMap;
use std::sync::Arc;

/// Opaque atom identifier. Equality is index comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Parse-session atom table.
///
/// Owned by exactly one parse; there is no cross-document sharing, so no
/// locking. Names are stored in canonical ASCII-lowercase form; the source
/// spelling of each occurrence is kept separately on the node that uses it.
#[derive(Debug, Default)]
pub struct AtomTable {
    atoms: Vec<Arc<str>>,
    map: HashMap<String, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, applying ASCII-lowercase folding.
    pub fn intern_folded(&mut self, name: &str) -> AtomId {
        if !name.bytes().any(|b| b.is_ascii_uppercase()) {
            return self.intern_canonical(name);
        }
        let folded = name.to_ascii_lowercase();
        self.intern_canonical(&folded)
    }

    fn intern_canonical(&mut self, name: &str) -> AtomId {
        if let Some(id) = self.map.get(name) {
            return *id;
        }
        debug_assert!(self.atoms.len() < u32::MAX as usize);
        let id = AtomId(self.atoms.len() as u32);
        self.atoms.push(Arc::<str>::from(name));
        self.map.insert(name.to_string(), id);
        id
    }

    /// Canonical (lowercase) spelling of an atom.
    pub fn resolve(&self, id: AtomId) -> &str {
        &self.atoms[id.0 as usize]
    }

    pub fn resolve_arc(&self, id: AtomId) -> Arc<str> {
        Arc::clone(&self.atoms[id.0 as usize])
    }

    /// Look up without interning, for membership probes against keyword
    /// sets. Folds case like `intern_folded`.
    pub fn get_folded(&self, name: &str) -> Option<AtomId> {
        if !name.bytes().any(|b| b.is_ascii_uppercase()) {
            return self.map.get(name).copied();
        }
        self.map.get(name.to_ascii_lowercase().as_str()).copied()
    }
}
