//! HTTP header storage
//!
//! Headers are stored in insertion order under canonical
//! `Capitalized-Hyphenated` names. Repeated headers are comma-joined into a
//! single value rather than kept as a list, matching how they are forwarded.

/// Canonicalize a header name: capitalize each hyphen-delimited segment.
///
/// `cOnTeNt-LeNgTh` becomes `Content-Length`. Idempotent.
pub fn canonicalize(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Ordered header map keyed by canonical names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name (canonicalized before matching).
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = canonicalize(name);
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing any existing value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = canonicalize(name);
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Add a header occurrence. A repeat comma-joins onto the existing value.
    pub fn append(&mut self, name: &str, value: &str) {
        let name = canonicalize(name);
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1.push(',');
            entry.1.push_str(value);
        } else {
            self.entries.push((name, value.to_string()));
        }
    }

    /// Remove a header. Returns the removed value, if any.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = canonicalize(name);
        let pos = self.entries.iter().position(|(k, _)| *k == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeaderMap {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name, value);
        }
        map
    }
}
