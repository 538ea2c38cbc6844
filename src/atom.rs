use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A cheaply clonable string with pointer-equality fast path. Atoms produced
/// by the same [`AtomTable`] share storage, so comparing them is usually a
/// single pointer compare; atoms built ad hoc still compare correctly by
/// content.
#[derive(Debug, Clone, Eq)]
pub struct Atom(Rc<str>);

impl Atom {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Self(Rc::from(value))
    }
}

impl From<String> for Atom {
    fn from(value: String) -> Self {
        Self(Rc::from(value.as_str()))
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Interning table for atoms. Owned by the compiler instance so that two
/// independent compilations in one process never share mutable state.
#[derive(Default, Debug)]
pub struct AtomTable {
    atoms: HashMap<Box<str>, Atom>,
}

impl AtomTable {
    pub fn intern(&mut self, value: &str) -> Atom {
        if let Some(atom) = self.atoms.get(value) {
            return atom.clone();
        }

        let atom = Atom::from(value);
        self.atoms.insert(Box::from(value), atom.clone());
        atom
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_atoms_share_storage() {
        let mut table = AtomTable::default();

        let a = table.intern("fib");
        let b = table.intern("fib");

        assert!(Rc::ptr_eq(&a.0, &b.0));
        assert_eq!(1, table.len());
    }

    #[test]
    fn test_uninterned_atoms_compare_by_content() {
        let a = Atom::from("fib");
        let b = Atom::from("fib");

        assert_eq!(a, b);
        assert_ne!(a, Atom::from("fact"));
    }
}
