//! Turns an expanded template back into named fields.

/// Ordered mapping of field name to raw resolved bytes.
///
/// Values stay as bytes until decoration because a response body may be in
/// any charset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldRecord {
    fields: Vec<(String, Vec<u8>)>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing the value in place if the field already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl IntoIterator for FieldRecord {
    type Item = (String, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(String, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

pub struct RecordSplitter;

impl RecordSplitter {
    /// Cuts `expanded` on `delimiter`, then each chunk on its first comma.
    ///
    /// Values may contain commas; only the first one in a chunk separates the
    /// name. A chunk without a comma becomes a field with an empty value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use exchange_log::splitter::RecordSplitter;
    /// use exchange_log::template::DELIMITER;
    ///
    /// let expanded = format!("method,GET{DELIMITER}uri,http://a.test/?x=1,2");
    /// let record = RecordSplitter::split(expanded.as_bytes(), DELIMITER);
    /// assert_eq!(record.get("uri"), Some(&b"http://a.test/?x=1,2"[..]));
    /// ```
    pub fn split(expanded: &[u8], delimiter: &str) -> FieldRecord {
        let mut record = FieldRecord::new();
        for chunk in split_on(expanded, delimiter.as_bytes()) {
            match chunk.iter().position(|&b| b == b',') {
                Some(comma) => record.insert(
                    String::from_utf8_lossy(&chunk[..comma]),
                    &chunk[comma + 1..],
                ),
                None => record.insert(String::from_utf8_lossy(chunk), Vec::new()),
            }
        }
        record
    }
}

/// Non-overlapping, left-to-right split of `haystack` on `needle`.
fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    if needle.is_empty() {
        return vec![haystack];
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            parts.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&haystack[start..]);
    parts
}
