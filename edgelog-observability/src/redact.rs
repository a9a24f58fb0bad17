//! Header redaction applied at capture time.

/// Replacement string used for all masked values.
pub const REDACTED: &str = "[REDACTED]";

/// Case-insensitive set of header names whose values must not be logged.
#[derive(Debug, Clone, Default)]
pub struct HeaderRedactor {
    names: Vec<String>,
}

impl HeaderRedactor {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// The value to log for `name`.
    pub fn scrub<'a>(&self, name: &str, value: &'a str) -> &'a str {
        if self.is_sensitive(name) { REDACTED } else { value }
    }
}
