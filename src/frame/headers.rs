//! Decoded header lists.

use bytes::Bytes;

/// `content-encoding` header name.
pub const CONTENT_ENCODING: &str = "content-encoding";
/// `content-length` header name.
pub const CONTENT_LENGTH: &str = "content-length";

/// A single decoded header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderField {
    /// Create a header field from anything convertible into [`Bytes`].
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered header list as produced by the HPACK decoder.
///
/// Name lookups compare ASCII case-insensitively. Duplicate names are kept in
/// their original order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<HeaderField>);

impl Headers {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append a header, keeping any existing values with the same name.
    pub fn insert(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.0.push(HeaderField::new(name, value));
    }

    /// Builder-style variant of [`Headers::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.insert(name, value);
        self
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.0
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name.as_bytes()))
            .map(|field| &field.value)
    }

    /// Remove every value stored under `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0
            .retain(|field| !field.name.eq_ignore_ascii_case(name.as_bytes()));
        before - self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> { self.0.iter() }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<HeaderField> for Headers {
    fn from_iter<I: IntoIterator<Item = HeaderField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}
