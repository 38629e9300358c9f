use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://draft.nodetoy.co";

/// Canonical graph URL; the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphUrl(String);

impl GraphUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }
}

impl fmt::Display for GraphUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GraphUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns short graph ids and raw URLs into canonical [`GraphUrl`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphResolver {
    base_url: String,
}

impl Default for GraphResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GRAPH_BASE_URL)
    }
}

impl GraphResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `url_or_id`. Pure; returns `None` for blank input.
    ///
    /// - `scheme://...` and `data:` URLs are kept (trailing `/` trimmed),
    /// - protocol-relative `//host/...` becomes `https://host/...`,
    /// - anything else is a graph id under the base URL.
    pub fn resolve(&self, url_or_id: &str) -> Option<GraphUrl> {
        let s = url_or_id.trim();
        if s.is_empty() {
            return None;
        }

        if s.starts_with("data:") {
            return Some(GraphUrl(s.to_string()));
        }
        if s.contains("://") {
            return Some(GraphUrl(s.trim_end_matches('/').to_string()));
        }
        if let Some(rest) = s.strip_prefix("//") {
            return Some(GraphUrl(format!("https://{}", rest.trim_end_matches('/'))));
        }

        let id = s.trim_matches('/');
        if id.is_empty() {
            return None;
        }
        Some(GraphUrl(format!("{}/{}", self.base_url, id)))
    }
}

/// Resolve against [`DEFAULT_GRAPH_BASE_URL`].
pub fn resolve(url_or_id: &str) -> Option<GraphUrl> {
    GraphResolver::default().resolve(url_or_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_gets_base_url() {
        let url = resolve("nFvoIaHuvkvm3uMa").unwrap();
        assert_eq!(url.as_str(), "https://draft.nodetoy.co/nFvoIaHuvkvm3uMa");
        assert_eq!(url.scheme(), Some("https"));
    }

    #[test]
    fn full_urls_pass_through_normalized() {
        let a = resolve("https://dev-draft.nodetoy.co/j8p4WJNH6YeZdodG/").unwrap();
        let b = resolve("  https://dev-draft.nodetoy.co/j8p4WJNH6YeZdodG").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            resolve("//cdn.example.com/g1").unwrap().as_str(),
            "https://cdn.example.com/g1"
        );
    }

    #[test]
    fn custom_base_and_blank_input() {
        let resolver = GraphResolver::new("file:///srv/graphs/");
        assert_eq!(resolver.resolve("/g1").unwrap().as_str(), "file:///srv/graphs/g1");
        assert_eq!(resolver.resolve("   "), None);
        assert_eq!(resolver.resolve("/"), None);
    }
}
