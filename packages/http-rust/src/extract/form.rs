//! Form value types: url-encoded forms and multipart forms.

use std::collections::BTreeMap;
use std::ops::Deref;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Ordered multimap of form keys to their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values(BTreeMap<String, Vec<String>>);

impl Values {
    /// Create a new, empty set of values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `application/x-www-form-urlencoded` bytes.
    pub(crate) fn parse(input: &[u8]) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)?;
        Ok(pairs.into_iter().collect())
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Every value for `key`, in arrival order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` when `key` has at least one value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds `value` after any values already stored under `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Appends every value of `other` after the values already present.
    pub(crate) fn merge(&mut self, other: Values) {
        for (key, values) in other.0 {
            self.0.entry(key).or_default().extend(values);
        }
    }

    /// Keys in order, each with its values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for Values
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (key, value) in iter {
            values.append(key, value);
        }
        values
    }
}

// ---------------------------------------------------------------------------
// Form / PostForm
// ---------------------------------------------------------------------------

/// Url-encoded body values followed by query-string values.
///
/// Parsed on first use and cached for the rest of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form(pub(crate) Values);

/// Url-encoded body values only. Query-string values are not included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm(pub(crate) Values);

impl Form {
    /// Unwraps the merged values.
    #[must_use]
    pub fn into_inner(self) -> Values {
        self.0
    }
}

impl PostForm {
    /// Unwraps the body values.
    #[must_use]
    pub fn into_inner(self) -> Values {
        self.0
    }
}

impl Deref for Form {
    type Target = Values;

    fn deref(&self) -> &Values {
        &self.0
    }
}

impl Deref for PostForm {
    type Target = Values;

    fn deref(&self) -> &Values {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// MultipartForm
// ---------------------------------------------------------------------------

/// One uploaded file from a multipart form, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Parsed `multipart/form-data` request: text fields and uploaded files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub(crate) values: Values,
    pub(crate) files: BTreeMap<String, Vec<FilePart>>,
}

impl MultipartForm {
    /// Text fields (parts without a file name).
    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// First file uploaded under `name`.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FilePart> {
        self.files.get(name).and_then(|f| f.first())
    }

    /// Every file uploaded under `name`.
    #[must_use]
    pub fn files(&self, name: &str) -> &[FilePart] {
        self.files.get(name).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn push_file(&mut self, name: String, file: FilePart) {
        self.files.entry(name).or_default().push(file);
    }
}
