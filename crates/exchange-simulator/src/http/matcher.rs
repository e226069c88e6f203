//! Request matchers.

use super::request::Request;
use std::fmt;

pub trait RequestMatcher: Send + Sync + fmt::Debug {
    fn matches(&self, request: &Request) -> bool;
}

/// Method + path equality. An empty field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPredicate {
    method: String,
    path: String,
}

impl RequestPredicate {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Predicate accepting every request.
    pub fn any() -> Self {
        Self::default()
    }
}

impl RequestMatcher for RequestPredicate {
    fn matches(&self, request: &Request) -> bool {
        (self.method.is_empty() || request.method == self.method)
            && (self.path.is_empty() || request.path == self.path)
    }
}
