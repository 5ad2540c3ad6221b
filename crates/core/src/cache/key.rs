//! Deterministic cache key construction.

/// Keys over roughly this length get replaced by a digest to stay friendly
/// to backends with key size limits.
const MAX_PLAIN_KEY_LEN: usize = 200;

/// A structured cache key: namespace, identifier and optional parameters.
///
/// Parameters are sorted by name before rendering so the same logical
/// lookup always produces the same key regardless of call-site ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    namespace: String,
    identifier: String,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Render the backend key string.
    pub fn render(&self) -> String {
        let mut params = self.params.clone();
        params.sort();
        let mut rendered = format!("{}:{}", self.namespace, self.identifier);
        for (name, value) in &params {
            rendered.push_str(&format!(":{}={}", name, value));
        }
        if rendered.len() > MAX_PLAIN_KEY_LEN {
            let digest = md5::compute(rendered.as_bytes());
            return format!("{}:{:x}", self.namespace, digest);
        }
        rendered
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_key() {
        let key = CacheKey::new("transcripts", "abc123");
        assert_eq!(key.render(), "transcripts:abc123");
    }

    #[test]
    fn test_params_are_sorted() {
        let a = CacheKey::new("transcripts", "list")
            .with_param("days", 30)
            .with_param("limit", 50);
        let b = CacheKey::new("transcripts", "list")
            .with_param("limit", 50)
            .with_param("days", 30);
        assert_eq!(a.render(), b.render());
        assert_eq!(a.render(), "transcripts:list:days=30:limit=50");
    }

    #[test]
    fn test_long_key_is_hashed() {
        let key = CacheKey::new("transcripts", "x".repeat(300));
        let rendered = key.render();
        assert!(rendered.len() <= MAX_PLAIN_KEY_LEN);
        assert!(rendered.starts_with("transcripts:"));
        // 32 hex chars after the namespace prefix.
        assert_eq!(rendered.len(), "transcripts:".len() + 32);
    }

    #[test]
    fn test_hashed_keys_stay_distinct() {
        let a = CacheKey::new("transcripts", "x".repeat(300)).render();
        let b = CacheKey::new("transcripts", "y".repeat(300)).render();
        assert_ne!(a, b);
    }
}
