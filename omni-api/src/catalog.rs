use crate::entry::Entry;
use crate::error::{Error, Result};
use std::ops::Deref;

/// Anything that can be found in a [`Catalog`] by canonical id or display title.
pub trait Addressable {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
}

/// How a caller names a catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Position in catalog order
    Position(usize),
    /// Canonical id or display title
    Key(String),
    /// An already resolved entry, used as is
    Entry(Entry),
}

impl From<usize> for Selector {
    fn from(position: usize) -> Self {
        Selector::Position(position)
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Selector::Key(key.to_string())
    }
}

impl From<String> for Selector {
    fn from(key: String) -> Self {
        Selector::Key(key)
    }
}

impl From<&String> for Selector {
    fn from(key: &String) -> Self {
        Selector::Key(key.clone())
    }
}

impl From<Entry> for Selector {
    fn from(entry: Entry) -> Self {
        Selector::Entry(entry)
    }
}

impl From<&Entry> for Selector {
    fn from(entry: &Entry) -> Self {
        Selector::Entry(entry.clone())
    }
}

/// An ordered list of entries addressable by position, id or title.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog<T> {
    name: String,
    items: Vec<T>,
}

impl<T: Addressable> Catalog<T> {
    /// `name` is used in error messages ("metrics", "elements", ...).
    pub fn new(name: &str, items: Vec<T>) -> Self {
        Catalog {
            name: name.to_string(),
            items,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry at `position`.
    pub fn at(&self, position: usize) -> Result<&T> {
        self.items.get(position).ok_or_else(|| Error::NotFound {
            key: position.to_string(),
            catalog: self.name.clone(),
        })
    }

    /// The single entry whose id or title equals `key`.
    pub fn find(&self, key: &str) -> Result<&T> {
        let matches = self
            .items
            .iter()
            .filter(|item| item.id() == key || item.title() == key)
            .collect::<Vec<&T>>();
        match matches.as_slice() {
            [] => Err(Error::NotFound {
                key: key.to_string(),
                catalog: self.name.clone(),
            }),
            [only] => Ok(*only),
            many => Err(Error::AmbiguousKey {
                key: key.to_string(),
                matches: many
                    .iter()
                    .map(|item| format!("<{}: {} in {}>", item.title(), item.id(), self.name))
                    .collect(),
            }),
        }
    }

    /// Look an entry up by position or by id/title.
    pub fn lookup(&self, selector: impl Into<LookupKey>) -> Result<&T> {
        match selector.into() {
            LookupKey::Position(position) => self.at(position),
            LookupKey::Key(key) => self.find(&key),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl Catalog<Entry> {
    /// Resolve a [`Selector`] to an owned entry.
    pub fn resolve(&self, selector: Selector) -> Result<Entry> {
        match selector {
            Selector::Position(position) => self.at(position).cloned(),
            Selector::Key(key) => self.find(&key).cloned(),
            Selector::Entry(entry) => Ok(entry),
        }
    }
}

impl<T> Deref for Catalog<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a Catalog<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Key accepted by [`Catalog::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum LookupKey {
    Position(usize),
    Key(String),
}

impl From<usize> for LookupKey {
    fn from(position: usize) -> Self {
        LookupKey::Position(position)
    }
}

impl From<&str> for LookupKey {
    fn from(key: &str) -> Self {
        LookupKey::Key(key.to_string())
    }
}

impl From<String> for LookupKey {
    fn from(key: String) -> Self {
        LookupKey::Key(key)
    }
}
