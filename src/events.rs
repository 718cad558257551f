//! Login-event subscriptions.
//!
//! Handlers are registered once at startup and are pure: they see the event
//! payload and the configuration snapshot, and return a destination URL or
//! nothing. The web layer fires one event per successful login; the first
//! handler to return a destination wins, so at most one redirect is issued.

use crate::redirect::resolve::{resolve_destination, RedirectContext};

/// Payload of a successful login, as handed to subscribers.
#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub username: String,
    pub subject: String,
    pub email: Option<String>,
    /// Role names in the order attached to the user
    pub roles: Vec<String>,
    /// Path the login flow is about to send the user to
    pub current_path: String,
}

type Handler = Box<dyn Fn(&LoginEvent, &RedirectContext) -> Option<String> + Send + Sync>;

/// Registry of login subscribers, built once during startup.
#[derive(Default)]
pub struct LoginHooks {
    handlers: Vec<Handler>,
}

impl LoginHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&LoginEvent, &RedirectContext) -> Option<String> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Dispatch the event; the first handler returning a destination wins.
    pub fn dispatch(&self, event: &LoginEvent, ctx: &RedirectContext) -> Option<String> {
        self.handlers.iter().find_map(|h| h(event, ctx))
    }
}

/// The standard subscription set: the role-based redirect resolver.
pub fn default_hooks() -> LoginHooks {
    let mut hooks = LoginHooks::new();
    hooks.subscribe(|event, ctx| resolve_destination(event, ctx));
    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::rule::{RedirectRule, RedirectStrategy, RoleName, UserAttribute};

    fn event() -> LoginEvent {
        LoginEvent {
            username: "alice".to_string(),
            subject: "user-42".to_string(),
            email: None,
            roles: vec!["subscriber".to_string()],
            current_path: "/".to_string(),
        }
    }

    fn ctx() -> RedirectContext {
        RedirectContext {
            rules: Vec::new(),
            base_url: "http://localhost:8080".to_string(),
            allowed_hosts: Vec::new(),
            custom_url_loop_check: false,
        }
    }

    #[test]
    fn test_empty_registry_yields_nothing() {
        let hooks = LoginHooks::new();
        assert_eq!(hooks.dispatch(&event(), &ctx()), None);
    }

    #[test]
    fn test_first_some_wins() {
        let mut hooks = LoginHooks::new();
        hooks.subscribe(|_, _| None);
        hooks.subscribe(|_, _| Some("/first".to_string()));
        hooks.subscribe(|_, _| Some("/second".to_string()));

        assert_eq!(hooks.dispatch(&event(), &ctx()), Some("/first".to_string()));
    }

    #[test]
    fn test_default_hooks_resolve_role_rules() {
        let hooks = default_hooks();
        let mut c = ctx();
        c.rules = vec![(
            RoleName::from("subscriber"),
            RedirectRule {
                strategy: RedirectStrategy::UserPage,
                attribute: Some(UserAttribute::Username),
                path: "/{username}".to_string(),
                ..Default::default()
            },
        )];

        assert_eq!(
            hooks.dispatch(&event(), &c),
            Some("http://localhost:8080/alice".to_string())
        );
    }
}
