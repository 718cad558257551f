//! End-to-end coverage of the redirect pipeline against a real database:
//! rules saved through the rule store, loaded back per user role order, and
//! resolved through the login-event registry.

mod helpers;

use helpers::db::{seed_test_role, seed_test_user, TestDb};
use waypoint::events::{default_hooks, LoginEvent};
use waypoint::redirect::resolve::RedirectContext;
use waypoint::redirect::rule::{
    load_rule, load_rules, save_rule, RedirectRule, RedirectStrategy, RoleName, UserAttribute,
};
use waypoint::storage;

const BASE: &str = "http://localhost:8080";

fn login_event(user: &storage::User, current_path: &str) -> LoginEvent {
    LoginEvent {
        username: user.username.clone(),
        subject: user.subject.clone(),
        email: user.email.clone(),
        roles: user.roles.clone(),
        current_path: current_path.to_string(),
    }
}

fn context(rules: Vec<(RoleName, RedirectRule)>) -> RedirectContext {
    RedirectContext {
        rules,
        base_url: BASE.to_string(),
        allowed_hosts: Vec::new(),
        custom_url_loop_check: false,
    }
}

#[tokio::test]
async fn rule_is_stored_under_role_derived_key() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let rule = RedirectRule {
        strategy: RedirectStrategy::CustomUrl,
        url: "/dashboard".to_string(),
        ..Default::default()
    };
    save_rule(db, &RoleName::from("subscriber"), &rule)
        .await
        .expect("Failed to save rule");

    let stored = storage::get_property(db, "redirect", "subscriber_redirect_rule")
        .await
        .expect("Failed to read property")
        .expect("Rule record not found");
    assert_eq!(stored["type"], "custom_url");
    assert_eq!(stored["url"], "/dashboard");
}

#[tokio::test]
async fn rule_round_trips_through_store() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let rule = RedirectRule {
        strategy: RedirectStrategy::UserPage,
        attribute: Some(UserAttribute::Username),
        path: "/{username}/profile".to_string(),
        ..Default::default()
    };
    save_rule(db, &RoleName::from("editor"), &rule)
        .await
        .expect("Failed to save rule");

    let loaded = load_rule(db, &RoleName::from("editor"))
        .await
        .expect("Failed to load rule");
    assert_eq!(loaded, rule);
}

#[tokio::test]
async fn absent_rule_loads_as_default() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let loaded = load_rule(db, &RoleName::from("subscriber"))
        .await
        .expect("Failed to load rule");
    assert_eq!(loaded, RedirectRule::default());
}

#[tokio::test]
async fn malformed_rule_record_loads_as_default() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    // A stored record that is not an object at all
    storage::set_property(
        db,
        "redirect",
        "subscriber_redirect_rule",
        &serde_json::json!("scrambled"),
    )
    .await
    .expect("Failed to set property");

    let loaded = load_rule(db, &RoleName::from("subscriber"))
        .await
        .expect("Failed to load rule");
    assert_eq!(loaded, RedirectRule::default());
}

#[tokio::test]
async fn login_redirects_first_configured_role() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    seed_test_role(db, "editor", "Editor").await;
    seed_test_role(db, "subscriber", "Subscriber").await;

    // editor is saved unconfigured (the settings form was submitted with its
    // defaults); subscriber has a user_page rule
    save_rule(db, &RoleName::from("editor"), &RedirectRule::default())
        .await
        .expect("Failed to save rule");
    save_rule(
        db,
        &RoleName::from("subscriber"),
        &RedirectRule {
            strategy: RedirectStrategy::UserPage,
            attribute: Some(UserAttribute::Username),
            path: "/{username}/profile".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to save rule");

    let user = seed_test_user(db, "alice", &["editor", "subscriber"]).await;
    let rules = load_rules(db, &user.roles).await.expect("Failed to load rules");

    let destination = default_hooks().dispatch(&login_event(&user, "/"), &context(rules));
    assert_eq!(destination, Some(format!("{BASE}/alice/profile")));
}

#[tokio::test]
async fn login_without_configured_rules_is_not_redirected() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let user = seed_test_user(db, "bob", &["editor", "subscriber"]).await;
    let rules = load_rules(db, &user.roles).await.expect("Failed to load rules");

    let destination = default_hooks().dispatch(&login_event(&user, "/"), &context(rules));
    assert_eq!(destination, None);
}

#[tokio::test]
async fn custom_url_redirects_even_when_already_there() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    save_rule(
        db,
        &RoleName::from("subscriber"),
        &RedirectRule {
            strategy: RedirectStrategy::CustomUrl,
            url: "/foo".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to save rule");

    let user = seed_test_user(db, "carol", &["subscriber"]).await;
    let rules = load_rules(db, &user.roles).await.expect("Failed to load rules");

    let destination = default_hooks().dispatch(&login_event(&user, "/foo"), &context(rules));
    assert_eq!(destination, Some(format!("{BASE}/foo")));
}

#[tokio::test]
async fn user_page_redirect_is_suppressed_at_destination() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    save_rule(
        db,
        &RoleName::from("subscriber"),
        &RedirectRule {
            strategy: RedirectStrategy::UserPage,
            attribute: Some(UserAttribute::Username),
            path: "/{username}".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to save rule");

    let user = seed_test_user(db, "dave", &["subscriber"]).await;
    let rules = load_rules(db, &user.roles).await.expect("Failed to load rules");

    let destination = default_hooks().dispatch(&login_event(&user, "/dave"), &context(rules));
    assert_eq!(destination, None);
}

#[tokio::test]
async fn sanitized_form_input_round_trips_and_resolves() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    // Simulates the settings form submission path: raw input is sanitized at
    // the boundary, persisted, and must still substitute correctly
    let rule = RedirectRule::from_form_fields(
        "user_page",
        "username",
        "<script>x</script>/{username}",
        "",
        "",
    );
    save_rule(db, &RoleName::from("subscriber"), &rule)
        .await
        .expect("Failed to save rule");

    let loaded = load_rule(db, &RoleName::from("subscriber"))
        .await
        .expect("Failed to load rule");
    assert_eq!(loaded.path, "x/{username}");

    let user = seed_test_user(db, "eve", &["subscriber"]).await;
    let rules = load_rules(db, &user.roles).await.expect("Failed to load rules");

    let destination = default_hooks().dispatch(&login_event(&user, "/"), &context(rules));
    assert_eq!(destination, Some(format!("{BASE}/x/eve")));
}
