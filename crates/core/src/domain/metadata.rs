// Sidecar metadata (key/value text files next to inputs and products)

use std::collections::BTreeMap;

/// Key/value metadata attached to an input file or a produced artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the sidecar text format: one `key value` pair per line
    ///
    /// Blank lines and `#` comments are ignored; a key without a value maps
    /// to the empty string.
    pub fn parse(text: &str) -> Self {
        let mut out = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once(char::is_whitespace) {
                Some((key, value)) => out.insert(key, value.trim()),
                None => out.insert(line, ""),
            }
        }
        out
    }

    /// Render in the sidecar text format, sorted by key
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{} {}\n", k, v))
            .collect()
    }

    /// Merge sidecar metadata over values emitted by a processing command
    ///
    /// Operator-supplied sidecar values win on conflict; command output only
    /// fills keys the sidecar does not define.
    pub fn cascade(sidecar: &Metadata, produced: &Metadata) -> Metadata {
        let mut merged = produced.clone();
        for (k, v) in sidecar.iter() {
            merged.insert(k, v);
        }
        merged
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
