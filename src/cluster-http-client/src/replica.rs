//! The [`Replica`] identity.

use std::fmt;

/// One concrete server endpoint belonging to a logical cluster.
///
/// Equality and ordering are ordinal on the normalized URL string, so a
/// `Replica` can be used directly as a map key (see
/// [`crate::storage::ReplicaStorage`]) without a separate normalization step
/// at each call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Replica {
    url: String,
}

impl Replica {
    /// Wraps an absolute base URL as a `Replica`.
    ///
    /// The URL is normalized by trimming a single trailing slash, so that
    /// `http://host:1` and `http://host:1/` compare equal.
    pub fn new(url: impl Into<String>) -> Self {
        let mut url = url.into();
        if url.len() > 1 && url.ends_with('/') {
            url.pop();
        }
        Replica { url }
    }

    /// The normalized base URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl From<String> for Replica {
    fn from(url: String) -> Self {
        Replica::new(url)
    }
}

impl From<&str> for Replica {
    fn from(url: &str) -> Self {
        Replica::new(url)
    }
}

/// Merges duplicate replicas (by normalized URL) out of a cluster listing,
/// preserving first-seen order. Used when `deduplicateRequestUrl` is set.
pub fn dedupe(replicas: Vec<Replica>) -> Vec<Replica> {
    let mut seen = std::collections::HashSet::with_capacity(replicas.len());
    replicas
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_normalizes() {
        assert_eq!(Replica::new("http://a:1/"), Replica::new("http://a:1"));
    }

    #[test]
    fn dedupe_preserves_order() {
        let replicas = vec![
            Replica::new("http://a"),
            Replica::new("http://b"),
            Replica::new("http://a/"),
        ];
        let deduped = dedupe(replicas);
        assert_eq!(
            deduped,
            vec![Replica::new("http://a"), Replica::new("http://b")]
        );
    }
}
