use crate::storage;
use miette::{IntoDiagnostic, Result};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::fs;

/// Role definition from the bootstrap JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Role slug (e.g. "subscriber")
    pub name: String,
    /// Name shown in the settings form
    pub display_name: String,
}

/// Site page definition from the bootstrap JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDefinition {
    pub title: String,
    /// Absolute URL of the page
    pub permalink: String,
}

/// User definition from the bootstrap JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDefinition {
    /// Username (unique identifier)
    pub username: String,
    /// User email
    #[serde(default)]
    pub email: Option<String>,
    /// Plain text password (will be hashed)
    pub password: String,
    /// Role names in priority order
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the user account is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Root structure of the bootstrap JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapFile {
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
    #[serde(default)]
    pub pages: Vec<PageDefinition>,
    #[serde(default)]
    pub users: Vec<UserDefinition>,
}

/// Sync roles, pages, and users from a JSON file to the database (idempotent)
pub async fn sync_from_file(db: &DatabaseConnection, file_path: &str) -> Result<()> {
    tracing::info!("Loading bootstrap fixtures from {}", file_path);

    let content = fs::read_to_string(file_path)
        .into_diagnostic()
        .map_err(|e| miette::miette!("Failed to read bootstrap file at '{}': {}", file_path, e))?;

    let file: BootstrapFile = serde_json::from_str(&content)
        .into_diagnostic()
        .map_err(|e| {
            miette::miette!(
                "Failed to parse bootstrap JSON file: {}\n\nExpected format:\n{{\n  \"roles\": [{{\"name\": \"subscriber\", \"display_name\": \"Subscriber\"}}],\n  \"pages\": [{{\"title\": \"Welcome\", \"permalink\": \"http://localhost:8080/welcome\"}}],\n  \"users\": [{{\"username\": \"alice\", \"password\": \"secure-password\", \"roles\": [\"subscriber\"]}}]\n}}",
                e
            )
        })?;

    tracing::info!(
        "Found {} role(s), {} page(s), {} user(s) in file",
        file.roles.len(),
        file.pages.len(),
        file.users.len()
    );

    for role_def in &file.roles {
        storage::upsert_role(db, &role_def.name, &role_def.display_name)
            .await
            .into_diagnostic()?;
    }

    let mut pages_created = 0;
    let mut pages_updated = 0;
    for page_def in &file.pages {
        match sync_page(db, page_def).await? {
            SyncResult::Created => pages_created += 1,
            SyncResult::Updated => pages_updated += 1,
            SyncResult::Unchanged => {}
        }
    }

    let mut created = 0;
    let mut updated = 0;
    let mut unchanged = 0;
    for user_def in &file.users {
        match sync_user(db, user_def).await? {
            SyncResult::Created => created += 1,
            SyncResult::Updated => updated += 1,
            SyncResult::Unchanged => unchanged += 1,
        }
    }

    tracing::info!(
        "Bootstrap sync complete: {} roles, {} pages created / {} updated, users {} created / {} updated / {} unchanged",
        file.roles.len(),
        pages_created,
        pages_updated,
        created,
        updated,
        unchanged
    );

    Ok(())
}

#[derive(Debug)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

async fn sync_page(db: &DatabaseConnection, page_def: &PageDefinition) -> Result<SyncResult> {
    let existing = storage::get_page_by_permalink(db, &page_def.permalink)
        .await
        .into_diagnostic()?;

    match existing {
        None => {
            tracing::info!("Creating page: {}", page_def.title);
            storage::create_page(db, &page_def.title, &page_def.permalink)
                .await
                .into_diagnostic()?;
            Ok(SyncResult::Created)
        }
        Some(page) if page.title != page_def.title => {
            tracing::info!("Updating page: {}", page_def.title);
            storage::update_page_title(db, &page.page_id, &page_def.title)
                .await
                .into_diagnostic()?;
            Ok(SyncResult::Updated)
        }
        Some(_) => Ok(SyncResult::Unchanged),
    }
}

/// Sync a single user (idempotent)
async fn sync_user(db: &DatabaseConnection, user_def: &UserDefinition) -> Result<SyncResult> {
    let existing = storage::get_user_by_username(db, &user_def.username)
        .await
        .into_diagnostic()?;

    match existing {
        None => {
            tracing::info!("Creating user: {}", user_def.username);
            storage::create_user(
                db,
                &user_def.username,
                &user_def.password,
                user_def.email.clone(),
                &user_def.roles,
            )
            .await
            .into_diagnostic()?;

            if !user_def.enabled {
                storage::update_user(db, &user_def.username, false, None)
                    .await
                    .into_diagnostic()?;
            }

            Ok(SyncResult::Created)
        }
        Some(existing_user) => {
            let enabled_matches = (existing_user.enabled == 1) == user_def.enabled;
            let email_matches = existing_user.email == user_def.email;
            let roles_match = existing_user.roles == user_def.roles;

            if enabled_matches && email_matches && roles_match {
                return Ok(SyncResult::Unchanged);
            }

            tracing::info!("Updating user: {}", user_def.username);
            if !enabled_matches || !email_matches {
                storage::update_user(
                    db,
                    &user_def.username,
                    user_def.enabled,
                    user_def.email.clone(),
                )
                .await
                .into_diagnostic()?;
            }
            if !roles_match {
                storage::set_user_roles(db, &existing_user.subject, &user_def.roles)
                    .await
                    .into_diagnostic()?;
            }

            Ok(SyncResult::Updated)
        }
    }
}
