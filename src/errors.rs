use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WaypointError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(waypoint::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(waypoint::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(waypoint::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(waypoint::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Bad request: {0}")]
    #[diagnostic(code(waypoint::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(waypoint::other))]
    Other(String),
}
