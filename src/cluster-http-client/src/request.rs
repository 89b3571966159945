//! The [`Request`] side of the data model.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Enumerated HTTP methods this client is willing to dispatch.
///
/// Deliberately closed (not a wrapper around [`http::Method`]'s open string
/// space): §4.9's `HttpMethodValidation` module rejects anything outside
/// this set, and an open-ended method type would make that validation
/// unenforceable at the type level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Head,
    Patch,
    Delete,
    Options,
    Trace,
}

impl Method {
    /// The [`http::Method`] this enumerated value corresponds to, for
    /// handing off to a transport built on the `http` crate's types.
    pub fn as_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Head => http::Method::HEAD,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
            Method::Options => http::Method::OPTIONS,
            Method::Trace => http::Method::TRACE,
        }
    }
}

/// Capability a transport must advertise before a body variant requiring it
/// may legally be submitted (see [`crate::transport::Transport::supports`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The transport can stream a request body incrementally.
    RequestStreaming,
    /// The transport can send a composite (multi-buffer) request body.
    RequestCompositeBody,
}

/// A body attached to a request or response.
///
/// A streaming body is single-use: submitting it twice, or concurrently, is
/// a programming error the caller must avoid (enforced upstream by
/// `RequestValidation`, which rejects a streaming body paired with a
/// parallel-dispatch strategy).
#[derive(Clone)]
pub enum Body {
    /// No body.
    None,
    /// A fully buffered, repeatable body.
    Buffer(Bytes),
    /// A single-use streaming source. Cloning a streaming body is not
    /// supported; strategies that need concurrent attempts must reject it
    /// before constructing more than one [`Request`].
    Streaming(std::sync::Arc<dyn StreamingSource>),
    /// A composite sequence of buffers, concatenated by the transport.
    Composite(Vec<Bytes>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::None => write!(f, "Body::None"),
            Body::Buffer(b) => write!(f, "Body::Buffer({} bytes)", b.len()),
            Body::Streaming(_) => write!(f, "Body::Streaming(..)"),
            Body::Composite(parts) => write!(f, "Body::Composite({} parts)", parts.len()),
        }
    }
}

impl Body {
    /// The capability a transport must support to carry this body variant,
    /// if any.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Body::None | Body::Buffer(_) => None,
            Body::Streaming(_) => Some(Capability::RequestStreaming),
            Body::Composite(_) => Some(Capability::RequestCompositeBody),
        }
    }

    /// Whether this body variant may be submitted to more than one replica
    /// concurrently.
    pub fn is_concurrency_safe(&self) -> bool {
        !matches!(self, Body::Streaming(_))
    }
}

/// A single-use source of streamed request body bytes.
pub trait StreamingSource: Send + Sync {
    /// Produces the next chunk, or `None` once exhausted.
    fn next_chunk(&self) -> Option<Bytes>;
}

/// Case-insensitive header map, keyed by lowercased header name.
#[derive(Debug, Clone, Default)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.0.get(&name.as_ref().to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One logical HTTP request, possibly relative to a replica base URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Target URL. Relative URLs are resolved against a replica's base URL
    /// by a [`crate::transport::ReplicaTransform`] before dispatch.
    pub target: String,
    pub headers: Headers,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Request {
            method,
            target: target.into(),
            headers: Headers::new(),
            body: Body::None,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn streaming_body_requires_capability_and_is_not_concurrency_safe() {
        struct Empty;
        impl StreamingSource for Empty {
            fn next_chunk(&self) -> Option<Bytes> {
                None
            }
        }
        let body = Body::Streaming(std::sync::Arc::new(Empty));
        assert_eq!(body.required_capability(), Some(Capability::RequestStreaming));
        assert!(!body.is_concurrency_safe());
    }

    #[test]
    fn buffer_body_is_concurrency_safe_and_capability_free() {
        let body = Body::Buffer(Bytes::from_static(b"hi"));
        assert_eq!(body.required_capability(), None);
        assert!(body.is_concurrency_safe());
    }
}
