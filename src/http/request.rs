use std::num::ParseIntError;

use url::Url;

/// HTTP request methods.
///
/// Method tokens are matched case-sensitively. Anything outside the known set
/// is kept verbatim as an [`Method::Extension`] so the router can tell an
/// unrecognized verb apart from a recognized but disallowed one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other token, exactly as received
    Extension(String),
}

impl Method {
    /// Maps a request-line token to a method. Never fails.
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("get"), Method::Extension("get".into()));
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Extension(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Extension(token) => token,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Method::Extension(_))
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list. Duplicate names are kept in arrival order; lookups
/// compare names ASCII case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value for `name`, in arrival order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Represents a parsed HTTP request head.
///
/// Only ever built from a complete header block; there is no partially
/// populated state. The body, if any, travels separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target, before any normalization
    pub target: String,
    /// Protocol version token (typically "HTTP/1.1")
    pub version: String,
    /// Request headers in arrival order
    pub headers: HeaderList,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HeaderList,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: None,
            headers: HeaderList::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(key, value);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target: self.target.ok_or("target missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// The declared body length.
    ///
    /// `Ok(0)` when the header is absent, an error when it is present but not
    /// a non-negative integer.
    pub fn content_length(&self) -> Result<usize, ParseIntError> {
        match self.header("Content-Length") {
            None => Ok(0),
            Some(v) => v.trim().parse(),
        }
    }

    /// The request path with `.` and `..` segments resolved and the query
    /// string dropped. Traversal never climbs above `/`.
    ///
    /// ```
    /// # use lantern::http::request::{Method, RequestBuilder};
    /// let req = RequestBuilder::new()
    ///     .method(Method::GET)
    ///     .target("/a/./b/../../../etc/passwd?x=1")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(req.normalized_path(), "/etc/passwd");
    /// ```
    pub fn normalized_path(&self) -> String {
        normalize_target(&self.target)
    }
}

/// Resolves dot segments in a request target against the root.
///
/// Absolute-form targets (`http://host/path`) keep only their path. Targets
/// that cannot be interpreted at all normalize to `/`.
pub fn normalize_target(target: &str) -> String {
    let base = match Url::parse("http://localhost/") {
        Ok(base) => base,
        Err(_) => return "/".to_string(),
    };

    let relative = if target.starts_with('/') || target.contains("://") {
        target.to_string()
    } else {
        format!("/{target}")
    };

    base.join(&relative)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}
