use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Create a test user with an ordered role list
pub async fn seed_test_user(
    db: &DatabaseConnection,
    username: &str,
    roles: &[&str],
) -> waypoint::storage::User {
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    waypoint::storage::create_user(db, username, "password123", None, &roles)
        .await
        .expect("Failed to create test user")
}

/// Register a role in the role registry
pub async fn seed_test_role(db: &DatabaseConnection, name: &str, display_name: &str) {
    waypoint::storage::upsert_role(db, name, display_name)
        .await
        .expect("Failed to create test role");
}
