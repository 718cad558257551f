use clap::Parser;
use migration::MigratorTrait;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};
use waypoint::{bootstrap, settings, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "waypoint",
    version,
    about = "Login service with role-based post-login redirects"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database) and bring the schema up to date
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    // sync operator-declared roles, pages, and users
    if let Some(file) = settings.bootstrap.file.clone() {
        bootstrap::sync_from_file(&db, &file).await?;
    }

    // start web server
    web::serve(settings, db).await?;
    Ok(())
}
