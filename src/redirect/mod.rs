//! Role-based post-login redirects.
//!
//! `rule` defines the per-role configuration record, its sanitized form
//! boundary, and its persistence in the property store. `resolve` turns a
//! login event plus a rule snapshot into at most one destination URL.

pub mod resolve;
pub mod rule;

pub use resolve::{resolve_destination, RedirectContext};
pub use rule::{RedirectRule, RedirectStrategy, RoleName, UserAttribute};
