//! Method routing.
//!
//! Every request passes two checks. Admission decides whether the method may
//! be handled at all: write-style verbs are forbidden and unrecognized tokens
//! are not allowed. Admitted methods are then looked up in an explicit
//! method → handler table.

use std::collections::HashMap;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// Produces a response for an admitted request.
pub trait Handler: Send + Sync {
    fn call(&self, request: &Request, body: &[u8]) -> Response;
}

impl<F> Handler for F
where
    F: Fn(&Request, &[u8]) -> Response + Send + Sync,
{
    fn call(&self, request: &Request, body: &[u8]) -> Response {
        self(request, body)
    }
}

/// Serves the fixed index page for any target.
pub struct IndexPage;

impl Handler for IndexPage {
    fn call(&self, _request: &Request, _body: &[u8]) -> Response {
        Response::index()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Recognized, but on the deny list (403).
    Forbidden,
    /// Not a method this server knows (405).
    Unrecognized,
}

pub struct Router {
    handlers: HashMap<Method, Box<dyn Handler>>,
    forbidden: Vec<Method>,
}

impl Router {
    /// A router with no handlers and nothing forbidden.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            forbidden: Vec::new(),
        }
    }

    pub fn route(mut self, method: Method, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(method, Box::new(handler));
        self
    }

    pub fn forbid(mut self, method: Method) -> Self {
        if !self.forbidden.contains(&method) {
            self.forbidden.push(method);
        }
        self
    }

    pub fn admit(&self, method: &Method) -> Admission {
        if !method.is_recognized() {
            Admission::Unrecognized
        } else if self.forbidden.contains(method) {
            Admission::Forbidden
        } else {
            Admission::Admitted
        }
    }

    pub fn handler(&self, method: &Method) -> Option<&dyn Handler> {
        self.handlers.get(method).map(|h| &**h)
    }
}

impl Default for Router {
    /// `GET` serves the index page; `POST`, `PUT`, `DELETE` and `PATCH` are
    /// forbidden. `HEAD` and `OPTIONS` are admitted but have no handler.
    fn default() -> Self {
        Router::new()
            .route(Method::GET, IndexPage)
            .forbid(Method::POST)
            .forbid(Method::PUT)
            .forbid(Method::DELETE)
            .forbid(Method::PATCH)
    }
}
