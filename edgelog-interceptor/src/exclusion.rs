use edgelog_core::EdgelogError;
use std::collections::BTreeSet;

/// Paths the interceptor never logs.
///
/// Patterns use router syntax: `/internal/logging`, `/static/{file}`,
/// `/assets/{*rest}`. A trailing slash on the request path is ignored.
pub struct ExclusionSet {
    router: matchit::Router<()>,
    patterns: Vec<String>,
}

impl ExclusionSet {
    /// Build the set. `ingest_path` is always excluded so the interceptor
    /// never logs its own forwarding calls.
    pub fn new<I, S>(ingest_path: &str, patterns: I) -> Result<Self, EdgelogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique = BTreeSet::new();
        unique.insert(ingest_path.to_string());
        for p in patterns {
            let p = p.as_ref().trim();
            if !p.is_empty() {
                unique.insert(p.to_string());
            }
        }

        let mut router = matchit::Router::new();
        for pattern in &unique {
            if !pattern.starts_with('/') {
                return Err(EdgelogError::Config(format!(
                    "exclude path {pattern:?} must start with '/'"
                )));
            }
            router.insert(pattern.as_str(), ()).map_err(|e| {
                EdgelogError::Config(format!("exclude path {pattern:?}: {e}"))
            })?;
        }

        Ok(Self {
            router,
            patterns: unique.into_iter().collect(),
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        if self.router.at(path).is_ok() {
            return true;
        }
        match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => self.router.at(trimmed).is_ok(),
            _ => false,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
