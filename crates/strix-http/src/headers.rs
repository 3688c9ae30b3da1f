//! Case-insensitive, Title-Case-normalized header map.
//!
//! Single-value semantics: `insert` replaces. Names are stored normalized
//! (`x-forwarded-for` becomes `X-Forwarded-For`), lookups compare
//! case-insensitively on top of that.

/// Normalize a header name to Title-Case per `-`-separated segment.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for ch in name.chars() {
        if ch == '-' {
            out.push('-');
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Ordered single-value header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, normalizing the name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let canonical = canonical_name(name);
        let value = value.into();
        for entry in &mut self.entries {
            if entry.0.eq_ignore_ascii_case(&canonical) {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((canonical, value));
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Minimal header access used by pluggable request validators, so they do
/// not need to depend on the concrete request type.
pub trait HeaderAccess {
    fn has_header(&self, name: &str) -> bool;
    fn header_value(&self, name: &str) -> Option<&str>;
}

impl HeaderAccess for HeaderMap {
    fn has_header(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_title_case() {
        assert_eq!(canonical_name("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(canonical_name("CONTENT-LENGTH"), "Content-Length");
        assert_eq!(canonical_name("mcp-session-id"), "Mcp-Session-Id");
        assert_eq!(canonical_name("ETag"), "Etag");
    }

    #[test]
    fn insert_replaces_and_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain");
        headers.insert("Content-Type", "application/json");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn preserves_insertion_order() {
        let mut headers = HeaderMap::new();
        headers.insert("b", "2");
        headers.insert("a", "1");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn remove_returns_value() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "example.com");
        assert_eq!(headers.remove("host"), Some("example.com".to_string()));
        assert!(headers.is_empty());
    }
}
