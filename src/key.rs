//! Namespaced key composition.
//!
//! Every backend stores entries under a composite key of the form
//! `namespace + delimiter + key`. The composer is fixed per cache instance
//! and is total: any namespace, key or delimiter string is accepted.

/// Delimiter used when the configuration does not name one.
pub const DEFAULT_DELIMITER: &str = ":";

/// Builds and takes apart composite keys for one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComposer {
    delimiter: String,
}

impl KeyComposer {
    /// Create a composer using the given delimiter.
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// The delimiter placed between namespace and key.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Compose the backend-native key for `key` inside `namespace`.
    ///
    /// # Example
    /// ```
    /// use cachex::KeyComposer;
    ///
    /// let keys = KeyComposer::default();
    /// assert_eq!(keys.compose("jwt", "abc"), "jwt:abc");
    /// ```
    pub fn compose(&self, namespace: &str, key: &str) -> String {
        let mut out = String::with_capacity(namespace.len() + self.delimiter.len() + key.len());
        out.push_str(namespace);
        out.push_str(&self.delimiter);
        out.push_str(key);
        out
    }

    /// The prefix shared by every composite key in `namespace`.
    pub fn prefix(&self, namespace: &str) -> String {
        self.compose(namespace, "")
    }

    /// Recover the logical key from a composite key.
    ///
    /// If `composite` does not carry the namespace prefix it is returned
    /// unchanged.
    pub fn strip<'a>(&self, composite: &'a str, namespace: &str) -> &'a str {
        composite
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix(self.delimiter.as_str()))
            .unwrap_or(composite)
    }

    /// Glob pattern matching every composite key in `namespace`.
    ///
    /// Glob metacharacters in the prefix are escaped, so the pattern only
    /// ever matches keys that literally start with `prefix(namespace)`.
    pub fn scan_pattern(&self, namespace: &str) -> String {
        let prefix = self.prefix(namespace);
        let mut out = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('*');
        out
    }
}

impl Default for KeyComposer {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}
