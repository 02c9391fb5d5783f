/// Header map that keeps the casing headers arrived with.
///
/// HTTP header names are case-insensitive on the wire, but this server
/// stores and re-emits them exactly as received; only lookups fold case.
/// Entries keep insertion order, so serialised responses are stable.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap {
            entries: Vec::new(),
        }
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

    /// Insert or replace. Replacement matches case-insensitively but the
    /// stored name takes the casing of this call.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            *entry = (name, value);
        } else {
            self.entries.push((name, value));
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Length", "5");
        assert_eq!(headers.get("content-length"), Some("5"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("5"));
        assert_eq!(headers.get("Content-Type"), None);
    }

    #[test]
    fn insert_replaces_across_casings() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive");
        headers.insert("Connection", "close");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("connection"), Some("close"));
        // the later casing wins
        assert_eq!(headers.iter().next(), Some(("Connection", "close")));
    }

    #[test]
    fn received_casing_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert("X-CuStOm", "1");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-CuStOm"]);
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut headers = HeaderMap::new();
        headers.insert("A", "1");
        headers.insert("B", "2");
        headers.insert("C", "3");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
