//! Cross-cutting key-value pairs that travel with a [`Context`] and
//! across process boundaries via the `baggage` header.
//!
//! [`Context`]: crate::Context

use std::collections::btree_map;
use std::collections::BTreeMap;

/// An immutable-by-convention map of baggage entries.
///
/// Entries are kept sorted by key so that header encoding is
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: BTreeMap<String, String>,
}

impl Baggage {
    /// Create an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    /// Insert an entry, replacing any previous value for the same key.
    ///
    /// Returns `false` (and leaves the baggage untouched) when the key
    /// is not a valid header token.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if !is_valid_key(&key) {
            tracing::warn!(
                name: "Baggage.InvalidKey",
                key = key.as_str(),
                "baggage entry discarded, key is not a valid header token"
            );
            return false;
        }
        self.entries.insert(key, value.into());
        true
    }

    /// Remove the entry stored under `key`, if any.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.entries.iter())
    }
}

/// Iterator over baggage entries.
#[derive(Debug)]
pub struct Iter<'a>(btree_map::Iter<'a, String, String>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a Baggage {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(String, String)> for Baggage {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut baggage = Baggage::new();
        for (k, v) in iter {
            baggage.insert(k, v);
        }
        baggage
    }
}

// RFC 7230 token characters, the set allowed in baggage keys.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
