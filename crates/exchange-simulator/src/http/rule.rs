//! HTTP rules and the ordered ruleset behind the base path.

use super::matcher::RequestMatcher;
use super::request::Request;
use super::responder::Responder;

#[derive(Debug)]
pub struct HttpRule {
    pub matcher: Box<dyn RequestMatcher>,
    pub responder: Box<dyn Responder>,
}

impl HttpRule {
    pub fn new(
        matcher: impl RequestMatcher + 'static,
        responder: impl Responder + 'static,
    ) -> Self {
        Self {
            matcher: Box::new(matcher),
            responder: Box::new(responder),
        }
    }
}

/// Rules evaluated in declaration order; the first accepting matcher wins.
#[derive(Debug)]
pub struct HttpRuleSet {
    base_path: String,
    rules: Vec<HttpRule>,
}

impl HttpRuleSet {
    pub fn new(base_path: impl Into<String>, rules: Vec<HttpRule>) -> Self {
        Self {
            base_path: base_path.into(),
            rules,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the request with the base path cut off, or `None` when the path
    /// lies outside it.
    pub fn strip_base_path(&self, mut request: Request) -> Option<Request> {
        let rest = request.path.strip_prefix(self.base_path.as_str())?;
        request.path = rest.to_string();
        Some(request)
    }

    pub fn find_rule(&self, request: &Request) -> Option<&HttpRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(request))
    }
}
