use crate::http::request::{HeaderList, Method, Request};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("request line must have exactly 3 tokens, found {found}")]
    MalformedRequestLine { found: usize },
    #[error("header line {line} has no ':' separator")]
    MalformedHeader { line: usize },
    #[error("header block is not valid UTF-8")]
    InvalidEncoding,
}

/// Parses a header block into a [`Request`].
///
/// `block` is everything the framer returned before the terminator: the
/// request line followed by zero or more header lines. Lines end in CRLF; a
/// bare LF is tolerated. The method is not validated here, only tokenised.
pub fn parse_request_head(block: &[u8]) -> Result<Request, ParseError> {
    let text = std::str::from_utf8(block).map_err(|_| ParseError::InvalidEncoding)?;

    let mut lines = text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

    // Request line
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let [method, target, version] = parts[..] else {
        return Err(ParseError::MalformedRequestLine { found: parts.len() });
    };

    // Headers
    let mut headers = HeaderList::new();

    for (index, line) in lines.enumerate() {
        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::MalformedHeader { line: index + 2 })?;

        headers.push(key.trim(), value.trim());
    }

    Ok(Request {
        method: Method::from_token(method),
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}
