use crate::errors::WaypointError;
use crate::storage;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Property-store owner under which all redirect rules live.
pub const SETTINGS_OWNER: &str = "redirect";

/// A role identifier, as attached to users and registered in the role registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Settings key for a role's rule record: `<role>_redirect_rule`
pub fn settings_key(role: &RoleName) -> String {
    format!("{}_redirect_rule", role.as_str())
}

/// How a role's destination is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RedirectStrategy {
    /// Per-user page: a user attribute substituted into a path template
    #[default]
    UserPage,
    /// A fixed site page, stored as an absolute URL
    SpecificPage,
    /// An arbitrary path appended to the site base URL
    CustomUrl,
}

impl RedirectStrategy {
    pub fn keyword(&self) -> &'static str {
        match self {
            RedirectStrategy::UserPage => "user_page",
            RedirectStrategy::SpecificPage => "specific_page",
            RedirectStrategy::CustomUrl => "custom_url",
        }
    }

    /// Unknown keywords fall back to the default strategy rather than failing.
    pub fn from_keyword(s: &str) -> Self {
        match s {
            "specific_page" => RedirectStrategy::SpecificPage,
            "custom_url" => RedirectStrategy::CustomUrl,
            _ => RedirectStrategy::UserPage,
        }
    }
}

impl From<String> for RedirectStrategy {
    fn from(s: String) -> Self {
        Self::from_keyword(&s)
    }
}

impl From<RedirectStrategy> for String {
    fn from(s: RedirectStrategy) -> Self {
        s.keyword().to_string()
    }
}

/// User attribute substituted into a `user_page` path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAttribute {
    Username,
    UserId,
    Email,
}

impl UserAttribute {
    pub fn keyword(&self) -> &'static str {
        match self {
            UserAttribute::Username => "username",
            UserAttribute::UserId => "userid",
            UserAttribute::Email => "email",
        }
    }

    /// Empty or unknown keywords mean "not configured".
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "username" => Some(UserAttribute::Username),
            "userid" => Some(UserAttribute::UserId),
            "email" => Some(UserAttribute::Email),
            _ => None,
        }
    }
}

fn de_attribute<'de, D>(d: D) -> Result<Option<UserAttribute>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    Ok(UserAttribute::from_keyword(&raw))
}

fn ser_attribute<S>(attr: &Option<UserAttribute>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(attr.map(|a| a.keyword()).unwrap_or(""))
}

/// One role's redirect configuration, stored as a flat record in the property
/// store. Every field except `strategy` may be empty; empty means "not
/// configured" and is resolved as "skip this role", never as an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RedirectRule {
    #[serde(rename = "type", default)]
    pub strategy: RedirectStrategy,
    #[serde(
        rename = "param",
        default,
        deserialize_with = "de_attribute",
        serialize_with = "ser_attribute"
    )]
    pub attribute: Option<UserAttribute>,
    /// Path template for `user_page`; may contain `{username}`, `{userid}`, `{email}`
    #[serde(default)]
    pub path: String,
    /// Absolute page URL for `specific_page`
    #[serde(default)]
    pub page: String,
    /// Site-relative path for `custom_url`
    #[serde(default)]
    pub url: String,
}

impl RedirectRule {
    /// Build a rule from raw form input. Each field is sanitized
    /// independently; no cross-field validation happens here, so a
    /// `user_page` rule with an empty path is legal.
    pub fn from_form_fields(
        strategy: &str,
        attribute: &str,
        path: &str,
        page: &str,
        url: &str,
    ) -> Self {
        Self {
            strategy: RedirectStrategy::from_keyword(&sanitize_text_field(strategy)),
            attribute: UserAttribute::from_keyword(&sanitize_text_field(attribute)),
            path: sanitize_text_field(path),
            page: sanitize_text_field(page),
            url: sanitize_text_field(url),
        }
    }
}

/// Plain-text sanitation for submitted settings fields: drops markup tags and
/// control characters, collapses whitespace runs, trims. No semantic
/// validation of the remaining text.
pub fn sanitize_text_field(input: &str) -> String {
    let mut stripped = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_whitespace() || c.is_control() => stripped.push(' '),
            c => stripped.push(c),
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fetch a role's rule. Absent or malformed records yield the default rule.
pub async fn load_rule(
    db: &DatabaseConnection,
    role: &RoleName,
) -> Result<RedirectRule, WaypointError> {
    match storage::get_property(db, SETTINGS_OWNER, &settings_key(role)).await {
        Ok(Some(value)) => Ok(serde_json::from_value(value).unwrap_or_default()),
        Ok(None) => Ok(RedirectRule::default()),
        Err(WaypointError::Serde(_)) => Ok(RedirectRule::default()),
        Err(e) => Err(e),
    }
}

/// Fetch the rules for an ordered role list, preserving that order.
pub async fn load_rules(
    db: &DatabaseConnection,
    roles: &[String],
) -> Result<Vec<(RoleName, RedirectRule)>, WaypointError> {
    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        let role = RoleName::new(role.clone());
        let rule = load_rule(db, &role).await?;
        out.push((role, rule));
    }
    Ok(out)
}

pub async fn save_rule(
    db: &DatabaseConnection,
    role: &RoleName,
    rule: &RedirectRule,
) -> Result<(), WaypointError> {
    let value = serde_json::to_value(rule)?;
    storage::set_property(db, SETTINGS_OWNER, &settings_key(role), &value).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_key() {
        assert_eq!(
            settings_key(&RoleName::from("subscriber")),
            "subscriber_redirect_rule"
        );
    }

    #[test]
    fn test_rule_serializes_as_flat_record() {
        let rule = RedirectRule {
            strategy: RedirectStrategy::UserPage,
            attribute: Some(UserAttribute::Username),
            path: "/{username}/profile".to_string(),
            page: String::new(),
            url: String::new(),
        };

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "user_page",
                "param": "username",
                "path": "/{username}/profile",
                "page": "",
                "url": "",
            })
        );
    }

    #[test]
    fn test_rule_decodes_with_defaults() {
        // An empty record is a valid "not configured" rule
        let rule: RedirectRule = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(rule.strategy, RedirectStrategy::UserPage);
        assert!(rule.attribute.is_none());
        assert!(rule.path.is_empty());
        assert!(rule.page.is_empty());
        assert!(rule.url.is_empty());
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_default() {
        let rule: RedirectRule =
            serde_json::from_value(serde_json::json!({"type": "teleport"})).unwrap();
        assert_eq!(rule.strategy, RedirectStrategy::UserPage);
    }

    #[test]
    fn test_empty_param_is_unset() {
        let rule: RedirectRule =
            serde_json::from_value(serde_json::json!({"type": "user_page", "param": ""})).unwrap();
        assert!(rule.attribute.is_none());
    }

    #[test]
    fn test_rule_round_trip() {
        let rule = RedirectRule {
            strategy: RedirectStrategy::CustomUrl,
            attribute: None,
            path: String::new(),
            page: String::new(),
            url: "/foo".to_string(),
        };

        let value = serde_json::to_value(&rule).unwrap();
        let decoded: RedirectRule = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, rule);
    }

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(
            sanitize_text_field("<script>x</script>/{username}"),
            "x/{username}"
        );
        assert_eq!(sanitize_text_field("<b>bold</b> text"), "bold text");
    }

    #[test]
    fn test_sanitize_strips_control_chars_and_collapses_whitespace() {
        assert_eq!(sanitize_text_field("  /a\t\tb\n\nc  "), "/a b c");
        assert_eq!(sanitize_text_field("/pa\u{0007}th"), "/pa th");
    }

    #[test]
    fn test_sanitize_drops_dangling_tag() {
        // An unterminated tag swallows the rest of the input
        assert_eq!(sanitize_text_field("/ok<script src="), "/ok");
    }

    #[test]
    fn test_from_form_fields_sanitizes_each_field() {
        let rule = RedirectRule::from_form_fields(
            "custom_url",
            "",
            "<i>/{username}</i>",
            "",
            "  /dashboard  ",
        );
        assert_eq!(rule.strategy, RedirectStrategy::CustomUrl);
        assert!(rule.attribute.is_none());
        assert_eq!(rule.path, "/{username}");
        assert_eq!(rule.url, "/dashboard");
    }

    #[test]
    fn test_from_form_fields_unknown_strategy_defaults() {
        let rule = RedirectRule::from_form_fields("nonsense", "username", "/p", "", "");
        assert_eq!(rule.strategy, RedirectStrategy::UserPage);
        assert_eq!(rule.attribute, Some(UserAttribute::Username));
    }
}
