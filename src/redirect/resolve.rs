use crate::events::LoginEvent;
use crate::redirect::rule::{RedirectRule, RedirectStrategy, RoleName, UserAttribute};

/// Everything the resolver needs besides the event itself: the rule snapshot
/// for the user's roles (in the user's role order) and the redirect policy.
#[derive(Debug, Clone)]
pub struct RedirectContext {
    pub rules: Vec<(RoleName, RedirectRule)>,
    /// Site base URL without a trailing slash
    pub base_url: String,
    /// Hosts other than the base URL's that destinations may point at
    pub allowed_hosts: Vec<String>,
    /// When true, custom_url rules get the same-path check too instead of
    /// redirecting unconditionally
    pub custom_url_loop_check: bool,
}

struct Candidate {
    url: String,
    skip_same_path_check: bool,
}

/// Resolve at most one destination for a login event.
///
/// Roles are visited in the order they are attached to the user; the first
/// role whose rule yields a redirect wins. A rule that is unconfigured,
/// references a missing user attribute, resolves to an off-site URL, or
/// points at the path the user is already headed to is skipped, and the next
/// role gets its turn.
pub fn resolve_destination(event: &LoginEvent, ctx: &RedirectContext) -> Option<String> {
    let base = match url::Url::parse(&ctx.base_url) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(base_url = %ctx.base_url, error = %e, "Unparseable base URL, skipping redirect resolution");
            return None;
        }
    };

    for (role, rule) in &ctx.rules {
        let Some(candidate) = candidate_for_rule(rule, event, &ctx.base_url) else {
            continue;
        };

        if !is_same_site(&candidate.url, &base, &ctx.allowed_hosts) {
            tracing::warn!(role = %role, destination = %candidate.url, "Skipping off-site redirect destination");
            continue;
        }

        let unconditional = candidate.skip_same_path_check && !ctx.custom_url_loop_check;
        if unconditional || path_component(&candidate.url) != event.current_path {
            tracing::debug!(role = %role, destination = %candidate.url, "Resolved post-login redirect");
            return Some(candidate.url);
        }
        // Already headed there; the next role gets a turn
    }

    None
}

fn candidate_for_rule(
    rule: &RedirectRule,
    event: &LoginEvent,
    base_url: &str,
) -> Option<Candidate> {
    match rule.strategy {
        RedirectStrategy::UserPage => {
            let attribute = rule.attribute?;
            let value = attribute_value(event, attribute)?;
            if rule.path.is_empty() {
                return None;
            }
            let resolved = substitute_placeholders(&rule.path, value);
            if resolved.is_empty() {
                return None;
            }
            Some(Candidate {
                url: join_base(base_url, &resolved),
                skip_same_path_check: false,
            })
        }
        RedirectStrategy::SpecificPage => {
            if rule.page.is_empty() {
                return None;
            }
            Some(Candidate {
                url: rule.page.clone(),
                skip_same_path_check: false,
            })
        }
        RedirectStrategy::CustomUrl => {
            let trimmed = rule.url.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(Candidate {
                url: join_base(base_url, trimmed),
                skip_same_path_check: true,
            })
        }
    }
}

/// Replace every placeholder token with the one selected attribute value.
/// All three tokens get the same value; there is no per-token resolution.
pub fn substitute_placeholders(template: &str, value: &str) -> String {
    template
        .replace("{username}", value)
        .replace("{userid}", value)
        .replace("{email}", value)
}

fn attribute_value(event: &LoginEvent, attribute: UserAttribute) -> Option<&str> {
    match attribute {
        UserAttribute::Username => Some(event.username.as_str()),
        UserAttribute::UserId => Some(event.subject.as_str()),
        UserAttribute::Email => event.email.as_deref().filter(|e| !e.is_empty()),
    }
}

/// Append a path to the base URL with exactly one separating slash. Leading
/// slashes on the path are stripped so a stored `//host/...` cannot turn into
/// a protocol-relative URL on another origin.
fn join_base(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Path component of a destination, used for the same-path check.
pub fn path_component(destination: &str) -> String {
    match url::Url::parse(destination) {
        Ok(u) => u.path().to_string(),
        Err(_) => {
            // Relative destination: drop fragment and query by hand
            let no_fragment = destination.split('#').next().unwrap_or("");
            no_fragment.split('?').next().unwrap_or("").to_string()
        }
    }
}

/// Same-site check: http(s) URL whose host matches the base URL's host or an
/// explicitly allowed host. Host comparison only; ports are not considered.
fn is_same_site(destination: &str, base: &url::Url, allowed_hosts: &[String]) -> bool {
    let parsed = match url::Url::parse(destination) {
        Ok(u) => u,
        Err(_) => return false,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let host = match parsed.host_str() {
        Some(h) => h,
        None => return false,
    };
    if allowed_hosts.iter().any(|a| a.eq_ignore_ascii_case(host)) {
        return true;
    }
    base.host_str()
        .map(|b| b.eq_ignore_ascii_case(host))
        .unwrap_or(false)
}
