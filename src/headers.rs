//! Case-insensitive, multi-valued header storage.

#[inline(always)]
pub fn is_transfer_encoding(val: &str) -> bool {
    val.eq_ignore_ascii_case("transfer-encoding")
}

#[inline(always)]
pub fn is_content_length(val: &str) -> bool {
    val.eq_ignore_ascii_case("content-length")
}

#[inline(always)]
pub fn is_connection(val: &str) -> bool {
    val.eq_ignore_ascii_case("connection")
}

/// Ordered, case-insensitive, multi-valued header map.
///
/// Insertion order is preserved among values sharing the same name; lookups
/// compare names ASCII-case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap { entries: Vec::new() }
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_string(), value.into()));
    }

    /// First value stored under `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any comma-separated token of the `Connection` header
    /// (case-insensitively, whitespace-trimmed) equals `token`.
    pub fn connection_has(&self, token: &str) -> bool {
        self.get_all("connection")
            .flat_map(|v| v.split(','))
            .map(|t| t.trim())
            .any(|t| t.eq_ignore_ascii_case(token))
    }
}
