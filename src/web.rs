//! HTTP surface: the login/logout flow, the signed-in landing page, and the
//! admin screen for per-role redirect rules. Handlers stay thin; rule
//! persistence lives in `redirect::rule` and destination resolution in
//! `redirect::resolve`, fired through the login-event registry in `events`.

use crate::errors::WaypointError;
use crate::events::{LoginEvent, LoginHooks};
use crate::redirect::resolve::{path_component, RedirectContext};
use crate::redirect::rule::{self, RedirectRule, RedirectStrategy, RoleName, UserAttribute};
use crate::session::SessionCookie;
use crate::settings::Settings;
use crate::storage;
use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Role whose members may use the admin screens
pub const ADMIN_ROLE: &str = "administrator";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub hooks: Arc<LoginHooks>,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // X-Frame-Options: Prevent clickjacking
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    // X-Content-Type-Options: Prevent MIME sniffing
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // Content-Security-Policy: the settings form ships a small inline script
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; form-action 'self'",
        ),
    );

    // Referrer-Policy: Control referrer information
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

pub async fn serve(settings: Settings, db: DatabaseConnection) -> miette::Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
        db,
        hooks: Arc::new(crate::events::default_hooks()),
    };

    let router = Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/admin", get(admin_menu))
        .route(
            "/admin/redirects",
            get(redirect_settings_page).post(redirect_settings_submit),
        )
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn(security_headers))
        .with_state(state.clone());

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    tracing::info!(%addr, "Waypoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    error: Option<String>,
    return_to: Option<String>,
}

async fn login_page(Query(q): Query<LoginQuery>) -> impl IntoResponse {
    let error_html = if let Some(err) = q.error {
        format!("<p class='error'>{}</p>", html_escape(&err))
    } else {
        String::new()
    };

    let return_to = html_escape(&q.return_to.unwrap_or_default());

    let html = format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>Login - Waypoint</title>
            <style>
                body {{ font-family: Arial, sans-serif; max-width: 400px; margin: 100px auto; padding: 20px; }}
                h1 {{ color: #333; }}
                label {{ display: block; margin-top: 10px; }}
                input[type="text"], input[type="password"] {{ width: 100%; padding: 8px; margin-top: 5px; box-sizing: border-box; }}
                button {{ margin-top: 20px; padding: 10px 20px; background-color: #007bff; color: white; border: none; cursor: pointer; }}
                button:hover {{ background-color: #0056b3; }}
                .error {{ color: red; }}
            </style>
        </head>
        <body>
            <h1>Login</h1>
            {error_html}
            <form method="POST" action="/login">
                <input type="hidden" name="return_to" value="{return_to}">
                <label>
                    Username:
                    <input type="text" name="username" required autofocus>
                </label>
                <label>
                    Password:
                    <input type="password" name="password" required>
                </label>
                <button type="submit">Login</button>
            </form>
        </body>
        </html>
    "#
    );

    Html(html)
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    return_to: Option<String>,
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    // Verify credentials
    let subject =
        match storage::verify_user_password(&state.db, &form.username, &form.password).await {
            Ok(Some(sub)) => sub,
            _ => {
                let return_to = urlencoded(&form.return_to.unwrap_or_default());
                let error = urlencoded("Invalid username or password");
                return Redirect::temporary(&format!("/login?error={error}&return_to={return_to}"))
                    .into_response();
            }
        };

    let user = match storage::get_user_by_subject(&state.db, &subject).await {
        Ok(Some(u)) => u,
        _ => {
            let return_to = urlencoded(&form.return_to.unwrap_or_default());
            let error = urlencoded("User not found");
            return Redirect::temporary(&format!("/login?error={error}&return_to={return_to}"))
                .into_response();
        }
    };

    // Create session
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let session = match storage::create_session(
        &state.db,
        &subject,
        state.settings.session.ttl_secs,
        user_agent,
    )
    .await
    {
        Ok(s) => s,
        Err(_) => {
            let return_to = urlencoded(&form.return_to.unwrap_or_default());
            let error = urlencoded("Failed to create session");
            return Redirect::temporary(&format!("/login?error={error}&return_to={return_to}"))
                .into_response();
        }
    };

    let cookie = SessionCookie::new(session.session_id);
    let cookie_header = cookie.to_cookie_header(&state.settings);

    // Where the login flow would send the user without any rules
    let return_to = sanitize_return_to(form.return_to);

    // Fire the login event; the first subscriber to return a destination
    // overrides the pending one. Rule-loading failures degrade to "no
    // redirect" rather than failing the login.
    let event = LoginEvent {
        username: user.username.clone(),
        subject: user.subject.clone(),
        email: user.email.clone(),
        roles: user.roles.clone(),
        current_path: path_component(&return_to),
    };
    let rules = match rule::load_rules(&state.db, &user.roles).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!(username = %user.username, error = %e, "Failed to load redirect rules");
            Vec::new()
        }
    };
    let ctx = RedirectContext {
        rules,
        base_url: state.settings.base_url(),
        allowed_hosts: state.settings.redirect.allowed_hosts.clone(),
        custom_url_loop_check: state.settings.redirect.custom_url_loop_check,
    };
    let destination = state.hooks.dispatch(&event, &ctx).unwrap_or(return_to);

    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(axum::http::header::SET_COOKIE, cookie_header)
        .header(axum::http::header::LOCATION, destination)
        .body(Body::empty())
        .unwrap()
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(cookie) = SessionCookie::from_headers(&headers) {
        let _ = storage::delete_session(&state.db, &cookie.session_id).await;
    }

    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(
            axum::http::header::SET_COOKIE,
            SessionCookie::delete_cookie_header(),
        )
        .header(axum::http::header::LOCATION, "/")
        .body(Body::empty())
        .unwrap()
        .into_response()
}

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match session_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let body = match user {
        Some(user) => {
            let admin_link = if user.roles.iter().any(|r| r == ADMIN_ROLE) {
                "<p><a href=\"/admin\">Administration</a></p>"
            } else {
                ""
            };
            format!(
                "<h1>Signed in as {}</h1><p>Roles: {}</p>{}<p><a href=\"/logout\">Log out</a></p>",
                html_escape(&user.username),
                html_escape(&user.roles.join(", ")),
                admin_link
            )
        }
        None => "<h1>Waypoint</h1><p><a href=\"/login\">Log in</a></p>".to_string(),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Waypoint</title><link rel="stylesheet" href="/static/admin.css"></head>
<body>{body}</body>
</html>"#
    ))
    .into_response()
}

// ============================================================================
// Admin: redirect settings
// ============================================================================

async fn admin_menu(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_admin(&state, &headers, "/admin").await {
        return resp;
    }

    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>Administration - Waypoint</title><link rel="stylesheet" href="/static/admin.css"></head>
<body>
<h1>Administration</h1>
<ul>
    <li><a href="/admin/redirects">Login redirects</a></li>
</ul>
<p><a href="/">Back to site</a></p>
</body>
</html>"#,
    )
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SettingsQuery {
    saved: Option<String>,
}

async fn redirect_settings_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<SettingsQuery>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers, "/admin/redirects").await {
        return resp;
    }

    let roles = match storage::list_roles(&state.db).await {
        Ok(r) => r,
        Err(e) => return internal_error(e),
    };
    let pages = match storage::list_pages(&state.db).await {
        Ok(p) => p,
        Err(e) => return internal_error(e),
    };

    let mut blocks = String::new();
    for role in &roles {
        let rule = match rule::load_rule(&state.db, &RoleName::new(role.name.clone())).await {
            Ok(r) => r,
            Err(e) => return internal_error(e),
        };
        blocks.push_str(&role_block_html(&role.name, &role.display_name, &rule, &pages));
    }

    let notice = if q.saved.is_some() {
        "<p class=\"notice\">Redirect rules saved.</p>"
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Login redirects - Waypoint</title>
    <link rel="stylesheet" href="/static/admin.css">
</head>
<body>
<h1>Login redirects</h1>
<p>Choose, per role, where users are sent after logging in. The first role
attached to a user whose rule produces a destination wins.</p>
{notice}
<form method="POST" action="/admin/redirects">
{blocks}
<button type="submit">Save all rules</button>
</form>
<p><a href="/admin">Back to administration</a></p>
{script}
</body>
</html>"#,
        notice = notice,
        blocks = blocks,
        script = SETTINGS_SCRIPT,
    );

    Html(html).into_response()
}

/// One `<fieldset>` per role: the strategy selector plus the three field
/// groups, of which the client-side script shows exactly one.
fn role_block_html(
    role: &str,
    display_name: &str,
    rule: &RedirectRule,
    pages: &[storage::Page],
) -> String {
    let role_esc = html_escape(role);
    let strategy = rule.strategy;

    let strategy_options = [
        (RedirectStrategy::UserPage, "User page"),
        (RedirectStrategy::SpecificPage, "Specific page"),
        (RedirectStrategy::CustomUrl, "Custom URL"),
    ]
    .iter()
    .map(|(s, label)| {
        format!(
            "<option value=\"{}\"{}>{}</option>",
            s.keyword(),
            selected(strategy == *s),
            label
        )
    })
    .collect::<String>();

    let attribute_options = {
        let mut opts = format!(
            "<option value=\"\"{}>&mdash; none &mdash;</option>",
            selected(rule.attribute.is_none())
        );
        for (attr, label) in [
            (UserAttribute::Username, "Username"),
            (UserAttribute::UserId, "User ID"),
            (UserAttribute::Email, "Email"),
        ] {
            opts.push_str(&format!(
                "<option value=\"{}\"{}>{}</option>",
                attr.keyword(),
                selected(rule.attribute == Some(attr)),
                label
            ));
        }
        opts
    };

    let page_options = {
        let mut opts = format!(
            "<option value=\"\"{}>&mdash; select a page &mdash;</option>",
            selected(rule.page.is_empty())
        );
        for page in pages {
            opts.push_str(&format!(
                "<option value=\"{}\"{}>{}</option>",
                html_escape(&page.permalink),
                selected(rule.page == page.permalink),
                html_escape(&page.title)
            ));
        }
        opts
    };

    format!(
        r#"<fieldset class="role-rule">
<legend>{display} <code>{role}</code></legend>
<label>Strategy:
    <select name="{role}_strategy" class="strategy-select" data-role="{role}">
        {strategy_options}
    </select>
</label>
<div class="rule-group" id="{role}-user_page">
    <label>User attribute:
        <select name="{role}_attribute">{attribute_options}</select>
    </label>
    <label>Path template:
        <input type="text" name="{role}_path" value="{path}" placeholder="/{{username}}/profile">
    </label>
    <p class="hint">Placeholders {{username}}, {{userid}}, and {{email}} are all replaced with the selected attribute's value.</p>
</div>
<div class="rule-group" id="{role}-specific_page">
    <label>Page:
        <select name="{role}_page">{page_options}</select>
    </label>
</div>
<div class="rule-group" id="{role}-custom_url">
    <label>Path:
        <input type="text" name="{role}_url" value="{url}" placeholder="/dashboard">
    </label>
    <p class="hint">Appended to the site base URL. This rule redirects even when the user is already headed to that path.</p>
</div>
</fieldset>
"#,
        display = html_escape(display_name),
        role = role_esc,
        strategy_options = strategy_options,
        attribute_options = attribute_options,
        page_options = page_options,
        path = html_escape(&rule.path),
        url = html_escape(&rule.url),
    )
}

/// Shows the one field group matching each role's selected strategy, at load
/// and on change.
const SETTINGS_SCRIPT: &str = r#"<script>
function syncRuleGroups(select) {
    var role = select.dataset.role;
    ['user_page', 'specific_page', 'custom_url'].forEach(function (kind) {
        var group = document.getElementById(role + '-' + kind);
        if (group) {
            group.style.display = select.value === kind ? '' : 'none';
        }
    });
}
document.querySelectorAll('.strategy-select').forEach(function (select) {
    syncRuleGroups(select);
    select.addEventListener('change', function () { syncRuleGroups(select); });
});
</script>"#;

async fn redirect_settings_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers, "/admin/redirects").await {
        return resp;
    }

    let roles = match storage::list_roles(&state.db).await {
        Ok(r) => r,
        Err(e) => return internal_error(e),
    };

    // One record per registered role; fields are namespaced by role name and
    // sanitized independently inside from_form_fields
    for role in &roles {
        let field = |suffix: &str| {
            form.get(&format!("{}_{}", role.name, suffix))
                .map(String::as_str)
                .unwrap_or("")
        };
        let rule = RedirectRule::from_form_fields(
            field("strategy"),
            field("attribute"),
            field("path"),
            field("page"),
            field("url"),
        );
        if let Err(e) = rule::save_rule(&state.db, &RoleName::new(role.name.clone()), &rule).await {
            return internal_error(e);
        }
    }

    Redirect::to("/admin/redirects?saved=1").into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Look up the user behind the request's session cookie, if any.
async fn session_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<storage::User>, Response> {
    let Some(cookie) = SessionCookie::from_headers(headers) else {
        return Ok(None);
    };
    let session = match storage::get_session(&state.db, &cookie.session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return Ok(None),
        Err(e) => return Err(internal_error(e)),
    };
    match storage::get_user_by_subject(&state.db, &session.subject).await {
        Ok(user) => Ok(user),
        Err(e) => Err(internal_error(e)),
    }
}

/// Admin screens require a signed-in user holding the administrator role.
async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    return_to: &str,
) -> Result<storage::User, Response> {
    match session_user(state, headers).await? {
        Some(user) if user.roles.iter().any(|r| r == ADMIN_ROLE) => Ok(user),
        Some(_) => Err((
            StatusCode::FORBIDDEN,
            Html("<h1>Forbidden</h1><p>This screen requires the administrator role.</p>"),
        )
            .into_response()),
        None => Err(Redirect::temporary(&format!(
            "/login?return_to={}",
            urlencoded(return_to)
        ))
        .into_response()),
    }
}

/// Only site-relative paths survive as a post-login destination; anything
/// absolute or protocol-relative falls back to the site root.
fn sanitize_return_to(raw: Option<String>) -> String {
    match raw {
        Some(p) if p.starts_with('/') && !p.starts_with("//") => p,
        _ => "/".to_string(),
    }
}

fn internal_error(e: WaypointError) -> Response {
    tracing::error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<h1>Internal error</h1>"),
    )
        .into_response()
}

fn selected(is_selected: bool) -> &'static str {
    if is_selected {
        " selected"
    } else {
        ""
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn urlencoded(s: &str) -> String {
    serde_urlencoded::to_string([("", s)])
        .unwrap_or_default()
        .trim_start_matches('=')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_return_to() {
        assert_eq!(sanitize_return_to(Some("/profile".to_string())), "/profile");
        assert_eq!(sanitize_return_to(Some("//evil.example.com".to_string())), "/");
        assert_eq!(
            sanitize_return_to(Some("https://evil.example.com".to_string())),
            "/"
        );
        assert_eq!(sanitize_return_to(Some(String::new())), "/");
        assert_eq!(sanitize_return_to(None), "/");
    }

    #[test]
    fn test_role_block_reflects_persisted_rule() {
        let rule = RedirectRule {
            strategy: RedirectStrategy::SpecificPage,
            page: "http://localhost:8080/welcome".to_string(),
            ..Default::default()
        };
        let pages = vec![storage::Page {
            page_id: "p1".to_string(),
            title: "Welcome".to_string(),
            permalink: "http://localhost:8080/welcome".to_string(),
            created_at: 0,
        }];

        let html = role_block_html("editor", "Editor", &rule, &pages);
        assert!(html.contains("<option value=\"specific_page\" selected>"));
        assert!(html.contains("name=\"editor_strategy\""));
        assert!(html.contains("value=\"http://localhost:8080/welcome\" selected"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape("<script>\"x\"</script>"),
            "&lt;script&gt;&quot;x&quot;&lt;/script&gt;"
        );
    }
}
