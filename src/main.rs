use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use contacts_api::{
    build_app,
    store::{self, SqliteStore},
    AppState,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "contacts-api", about = "Contacts address book REST API")]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// SQLite database path (":memory:" for a throwaway database)
    #[arg(long, env = "CONTACTS_DB", default_value = "contacts.db")]
    db: String,

    /// Seed the database with sample data if empty
    #[arg(long, default_value_t = false)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("contacts_api=info".parse()?))
        .init();

    let cli = Cli::parse();

    let connection = rusqlite::Connection::open(&cli.db)?;
    let conn = Arc::new(Mutex::new(connection));
    store::init_db(&conn)?;
    let sqlite = SqliteStore::new(conn);

    if cli.seed && sqlite.is_empty()? {
        info!("Seeding database with sample contacts...");
        store::seed_data(&sqlite)?;
    }

    let state = AppState::new(Arc::new(sqlite))?;
    let app = build_app(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Contacts API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down Contacts API...");
        })
        .await?;

    Ok(())
}
