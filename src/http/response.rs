use bytes::Bytes;
use std::borrow::Cow;

/// HTTP status code.
///
/// Any integer is representable; the codes this server emits have named
/// constants and an entry in the error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

/// Short phrase and long description for a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEntry {
    pub phrase: &'static str,
    pub description: &'static str,
}

/// Used for codes with no table entry.
pub const UNKNOWN_ENTRY: ErrorEntry = ErrorEntry {
    phrase: "???",
    description: "???",
};

const ERROR_TABLE: &[(u16, ErrorEntry)] = &[
    (
        200,
        ErrorEntry {
            phrase: "OK",
            description: "Request fulfilled, document follows",
        },
    ),
    (
        400,
        ErrorEntry {
            phrase: "Bad Request",
            description: "Bad request syntax or unsupported method",
        },
    ),
    (
        403,
        ErrorEntry {
            phrase: "Forbidden",
            description: "Request forbidden -- authorization will not help",
        },
    ),
    (
        404,
        ErrorEntry {
            phrase: "Not Found",
            description: "Nothing matches the given URI",
        },
    ),
    (
        405,
        ErrorEntry {
            phrase: "Method Not Allowed",
            description: "Specified method is invalid for this resource.",
        },
    ),
];

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);

    pub const fn from_u16(code: u16) -> Self {
        StatusCode(code)
    }

    /// Returns the numeric HTTP status code.
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Table entry for this code, or [`UNKNOWN_ENTRY`].
    pub fn entry(&self) -> ErrorEntry {
        ERROR_TABLE
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, entry)| *entry)
            .unwrap_or(UNKNOWN_ENTRY)
    }

    /// Returns the reason phrase for this status code.
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::from_u16(418).reason_phrase(), "???");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        self.entry().phrase
    }

    pub fn description(&self) -> &'static str {
        self.entry().description
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Body of the fixed success page served for `GET`.
pub const INDEX_PAGE: &[u8] =
    b"<html><head><title>Success</title></head><body>Index page</body></html>";

/// Headers the writer emits itself, in this order, ahead of any others.
pub const MANAGED_HEADERS: [&str; 4] = ["Date", "Content-Type", "Content-Length", "Connection"];

/// Represents a complete HTTP response ready to be sent to a client.
///
/// `Date`, `Content-Length` and `Connection` are not stored; the writer
/// derives them when the response is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Reason phrase for the status line
    pub reason: Cow<'static, str>,
    /// Value of the Content-Type header
    pub content_type: Cow<'static, str>,
    /// Additional headers, emitted after the managed ones
    pub headers: Vec<(String, String)>,
    /// Response body as bytes
    pub body: Bytes,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .content_type("application/json")
///     .body(b"{}".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    reason: Option<Cow<'static, str>>,
    content_type: Cow<'static, str>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            content_type: Cow::Borrowed("text/plain"),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Overrides the table reason phrase.
    pub fn reason(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<Cow<'static, str>>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Appends a header.
    ///
    /// `Content-Type` replaces the content type. The other managed names are
    /// owned by the writer and are ignored here.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.eq_ignore_ascii_case("Content-Type") {
            self.content_type = Cow::Owned(value.into());
        } else if !MANAGED_HEADERS.iter().any(|m| m.eq_ignore_ascii_case(&key)) {
            self.headers.push((key, value.into()));
        }
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the final Response.
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            reason: self
                .reason
                .unwrap_or(Cow::Borrowed(self.status.reason_phrase())),
            content_type: self.content_type,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK).body(body).build()
    }

    /// The fixed success page.
    pub fn index() -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .content_type("text/html")
            .body(Bytes::from_static(INDEX_PAGE))
            .build()
    }

    /// An error response whose phrase and body come from the error table.
    pub fn error(status: StatusCode) -> Self {
        let entry = status.entry();
        ResponseBuilder::new(status)
            .body(format!("{} {}\n{}\n", status.as_u16(), entry.phrase, entry.description))
            .build()
    }

    pub fn bad_request() -> Self {
        Self::error(StatusCode::BAD_REQUEST)
    }

    pub fn forbidden() -> Self {
        Self::error(StatusCode::FORBIDDEN)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::error(StatusCode::METHOD_NOT_ALLOWED)
    }
}
