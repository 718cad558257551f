use crate::entities;
use crate::errors::WaypointError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub subject: String,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    /// Role names in priority order; the first role wins at redirect time
    pub roles: Vec<String>,
    pub created_at: i64,
    pub enabled: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub subject: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub display_name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page_id: String,
    pub title: String,
    pub permalink: String,
    pub created_at: i64,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, WaypointError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn user_from_model(model: entities::user::Model) -> Result<User, WaypointError> {
    let roles: Vec<String> = serde_json::from_str(&model.roles)?;
    Ok(User {
        subject: model.subject,
        username: model.username,
        password_hash: model.password_hash,
        email: model.email,
        roles,
        created_at: model.created_at,
        enabled: model.enabled,
    })
}

// User management functions

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    email: Option<String>,
    roles: &[String],
) -> Result<User, WaypointError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let subject = random_id();
    let created_at = Utc::now().timestamp();
    let roles_json = serde_json::to_string(roles)?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| WaypointError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = entities::user::ActiveModel {
        subject: Set(subject.clone()),
        username: Set(username.to_string()),
        password_hash: Set(password_hash.clone()),
        email: Set(email.clone()),
        roles: Set(roles_json),
        created_at: Set(created_at),
        enabled: Set(1),
    };

    user.insert(db).await?;

    Ok(User {
        subject,
        username: username.to_string(),
        password_hash,
        email,
        roles: roles.to_vec(),
        created_at,
        enabled: 1,
    })
}

pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<User>, WaypointError> {
    use entities::user::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?
    {
        Ok(Some(user_from_model(model)?))
    } else {
        Ok(None)
    }
}

pub async fn get_user_by_subject(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<Option<User>, WaypointError> {
    use entities::user::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::Subject.eq(subject))
        .one(db)
        .await?
    {
        Ok(Some(user_from_model(model)?))
    } else {
        Ok(None)
    }
}

pub async fn verify_user_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<String>, WaypointError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_username(db, username).await? {
        Some(u) if u.enabled == 1 => u,
        _ => return Ok(None),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| WaypointError::Other(format!("Invalid password hash: {}", e)))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
    {
        Ok(Some(user.subject))
    } else {
        Ok(None)
    }
}

/// Replace a user's ordered role list
pub async fn set_user_roles(
    db: &DatabaseConnection,
    subject: &str,
    roles: &[String],
) -> Result<(), WaypointError> {
    use entities::user::{Column, Entity};

    let user = Entity::find()
        .filter(Column::Subject.eq(subject))
        .one(db)
        .await?
        .ok_or_else(|| WaypointError::Other(format!("User not found: {}", subject)))?;

    let mut active: entities::user::ActiveModel = user.into();
    active.roles = Set(serde_json::to_string(roles)?);
    active.update(db).await?;

    Ok(())
}

pub async fn update_user(
    db: &DatabaseConnection,
    username: &str,
    enabled: bool,
    email: Option<String>,
) -> Result<(), WaypointError> {
    use entities::user::{Column, Entity};

    let user = Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or_else(|| WaypointError::Other(format!("User not found: {}", username)))?;

    let mut active: entities::user::ActiveModel = user.into();
    active.enabled = Set(if enabled { 1 } else { 0 });
    if let Some(email_val) = email {
        active.email = Set(Some(email_val));
    }
    active.update(db).await?;

    Ok(())
}

// Session management functions

pub async fn create_session(
    db: &DatabaseConnection,
    subject: &str,
    ttl_secs: i64,
    user_agent: Option<String>,
) -> Result<Session, WaypointError> {
    let session_id = random_id();
    let now = Utc::now().timestamp();
    let expires_at = now + ttl_secs;

    let session = entities::session::ActiveModel {
        session_id: Set(session_id.clone()),
        subject: Set(subject.to_string()),
        created_at: Set(now),
        expires_at: Set(expires_at),
        user_agent: Set(user_agent.clone()),
    };

    session.insert(db).await?;

    Ok(Session {
        session_id,
        subject: subject.to_string(),
        created_at: now,
        expires_at,
        user_agent,
    })
}

pub async fn get_session(
    db: &DatabaseConnection,
    session_id: &str,
) -> Result<Option<Session>, WaypointError> {
    use entities::session::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::SessionId.eq(session_id))
        .one(db)
        .await?
    {
        // Check if session is expired
        let now = Utc::now().timestamp();
        if now > model.expires_at {
            return Ok(None);
        }

        Ok(Some(Session {
            session_id: model.session_id,
            subject: model.subject,
            created_at: model.created_at,
            expires_at: model.expires_at,
            user_agent: model.user_agent,
        }))
    } else {
        Ok(None)
    }
}

pub async fn delete_session(
    db: &DatabaseConnection,
    session_id: &str,
) -> Result<(), WaypointError> {
    use entities::session::{Column, Entity};

    Entity::delete_many()
        .filter(Column::SessionId.eq(session_id))
        .exec(db)
        .await?;

    Ok(())
}

// Property (key-value settings) functions

pub async fn get_property(
    db: &DatabaseConnection,
    owner: &str,
    key: &str,
) -> Result<Option<Value>, WaypointError> {
    use entities::property::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::Owner.eq(owner))
        .filter(Column::Key.eq(key))
        .one(db)
        .await?
    {
        let json: Value = serde_json::from_str(&model.value)?;
        Ok(Some(json))
    } else {
        Ok(None)
    }
}

pub async fn set_property(
    db: &DatabaseConnection,
    owner: &str,
    key: &str,
    value: &Value,
) -> Result<(), WaypointError> {
    use entities::property::{Column, Entity};
    use sea_orm::sea_query::OnConflict;

    let now = Utc::now().timestamp();
    let json = serde_json::to_string(value)?;

    let property = entities::property::ActiveModel {
        owner: Set(owner.to_string()),
        key: Set(key.to_string()),
        value: Set(json.clone()),
        updated_at: Set(now),
    };

    Entity::insert(property)
        .on_conflict(
            OnConflict::columns([Column::Owner, Column::Key])
                .update_columns([Column::Value, Column::UpdatedAt])
                .to_owned(),
        )
        .exec(db)
        .await?;

    Ok(())
}

// Role registry functions

pub async fn get_role(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<Role>, WaypointError> {
    use entities::role::{Column, Entity};

    if let Some(model) = Entity::find().filter(Column::Name.eq(name)).one(db).await? {
        Ok(Some(Role {
            name: model.name,
            display_name: model.display_name,
            created_at: model.created_at,
        }))
    } else {
        Ok(None)
    }
}

pub async fn upsert_role(
    db: &DatabaseConnection,
    name: &str,
    display_name: &str,
) -> Result<Role, WaypointError> {
    use entities::role::{Column, Entity};
    use sea_orm::sea_query::OnConflict;

    let created_at = Utc::now().timestamp();

    let role = entities::role::ActiveModel {
        name: Set(name.to_string()),
        display_name: Set(display_name.to_string()),
        created_at: Set(created_at),
    };

    Entity::insert(role)
        .on_conflict(
            OnConflict::column(Column::Name)
                .update_column(Column::DisplayName)
                .to_owned(),
        )
        .exec(db)
        .await?;

    Ok(Role {
        name: name.to_string(),
        display_name: display_name.to_string(),
        created_at,
    })
}

/// All registered roles, ordered by name for stable settings-form rendering
pub async fn list_roles(db: &DatabaseConnection) -> Result<Vec<Role>, WaypointError> {
    use entities::role::{Column, Entity};

    let models = Entity::find().order_by_asc(Column::Name).all(db).await?;

    Ok(models
        .into_iter()
        .map(|m| Role {
            name: m.name,
            display_name: m.display_name,
            created_at: m.created_at,
        })
        .collect())
}

// Page registry functions

pub async fn create_page(
    db: &DatabaseConnection,
    title: &str,
    permalink: &str,
) -> Result<Page, WaypointError> {
    let page_id = random_id();
    let created_at = Utc::now().timestamp();

    let page = entities::page::ActiveModel {
        page_id: Set(page_id.clone()),
        title: Set(title.to_string()),
        permalink: Set(permalink.to_string()),
        created_at: Set(created_at),
    };

    page.insert(db).await?;

    Ok(Page {
        page_id,
        title: title.to_string(),
        permalink: permalink.to_string(),
        created_at,
    })
}

pub async fn get_page_by_permalink(
    db: &DatabaseConnection,
    permalink: &str,
) -> Result<Option<Page>, WaypointError> {
    use entities::page::{Column, Entity};

    if let Some(model) = Entity::find()
        .filter(Column::Permalink.eq(permalink))
        .one(db)
        .await?
    {
        Ok(Some(Page {
            page_id: model.page_id,
            title: model.title,
            permalink: model.permalink,
            created_at: model.created_at,
        }))
    } else {
        Ok(None)
    }
}

pub async fn update_page_title(
    db: &DatabaseConnection,
    page_id: &str,
    title: &str,
) -> Result<(), WaypointError> {
    use entities::page::{Column, Entity};

    let page = Entity::find()
        .filter(Column::PageId.eq(page_id))
        .one(db)
        .await?
        .ok_or_else(|| WaypointError::Other(format!("Page not found: {}", page_id)))?;

    let mut active: entities::page::ActiveModel = page.into();
    active.title = Set(title.to_string());
    active.update(db).await?;

    Ok(())
}

/// All registered pages, ordered by title for the settings-form picker
pub async fn list_pages(db: &DatabaseConnection) -> Result<Vec<Page>, WaypointError> {
    use entities::page::{Column, Entity};

    let models = Entity::find().order_by_asc(Column::Title).all(db).await?;

    Ok(models
        .into_iter()
        .map(|m| Page {
            page_id: m.page_id,
            title: m.title,
            permalink: m.permalink,
            created_at: m.created_at,
        })
        .collect())
}
