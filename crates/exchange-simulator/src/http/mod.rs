//! HTTP side of the simulator: request model, matchers, responders and rules.
//!
//! # Module Structure
//!
//! - `request` - Request/response snapshots
//! - `matcher` - Method and path predicates
//! - `responder` - String and file backed responses
//! - `redirect` - Forwarding to a real server, with optional recording
//! - `rule` - Ordered first-match ruleset

mod matcher;
mod redirect;
mod request;
mod responder;
mod rule;

pub use matcher::{RequestMatcher, RequestPredicate};
pub use redirect::{build_http_client, RedirectResponder};
pub use request::{Request, Response, TimedResponse};
pub use responder::{Responder, ResponseFromFile, ResponseFromString};
pub use rule::{HttpRule, HttpRuleSet};
