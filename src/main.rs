use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use diesel::Connection;
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing_subscriber::EnvFilter;

mod forms;
mod models;
mod pagination;
mod routes;
mod schema;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type State = axum::extract::State<Arc<AppState>>;

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct AuthConfig {
    header: String,
    #[serde(default)]
    librarians: Vec<String>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default)]
struct DebugConfig {
    #[serde(default)]
    assume_user: Option<String>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct DatabaseConfig {
    url: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct ServerConfig {
    port: u16,
}

fn default_page_size() -> i64 {
    10
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct CatalogConfig {
    #[serde(default = "default_page_size")]
    page_size: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct Config {
    #[serde(default)]
    debug: DebugConfig,
    auth: AuthConfig,
    database: DatabaseConfig,
    server: ServerConfig,
    #[serde(default)]
    catalog: CatalogConfig,
}

impl Config {
    fn load(path: &str) -> anyhow::Result<Self> {
        toml::from_str(
            &std::fs::read_to_string(path)
                .with_context(|| format!("Could not load the configuration file '{path}'"))?,
        )
        .with_context(|| "Could not parse the configuration file")
    }

    fn is_librarian(&self, user: &str) -> bool {
        self.auth.librarians.iter().any(|l| l == user)
    }
}

struct AppState {
    config: Config,
    db: Pool<AsyncPgConnection>,
}

async fn run_migrations(url: String) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&url)
            .with_context(|| format!("While connecting to the database at {url}"))?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| "Could not apply the database migrations")?;

        for migration in applied {
            tracing::info!("applied migration {migration}");
        }

        Ok(())
    })
    .await?
}

fn router(state: Arc<AppState>) -> Router {
    use routes::{authors, books, genres, instances, languages};

    Router::new()
        .route("/", get(routes::index))
        .route("/books", get(books::list_books))
        .route(
            "/book/create",
            get(books::create_book).post(books::do_create_book),
        )
        .route("/book/:id", get(books::get_book))
        .route(
            "/book/:id/update",
            get(books::update_book).post(books::do_update_book),
        )
        .route(
            "/book/:id/delete",
            get(books::delete_book).post(books::do_delete_book),
        )
        .route("/authors", get(authors::list_authors))
        .route(
            "/author/create",
            get(authors::create_author).post(authors::do_create_author),
        )
        .route("/author/:id", get(authors::get_author))
        .route(
            "/author/:id/update",
            get(authors::update_author).post(authors::do_update_author),
        )
        .route(
            "/author/:id/delete",
            get(authors::delete_author).post(authors::do_delete_author),
        )
        .route("/genres", get(genres::list_genres))
        .route(
            "/genre/create",
            get(genres::create_genre).post(genres::do_create_genre),
        )
        .route("/genre/:id", get(genres::get_genre))
        .route(
            "/genre/:id/update",
            get(genres::update_genre).post(genres::do_update_genre),
        )
        .route(
            "/genre/:id/delete",
            get(genres::delete_genre).post(genres::do_delete_genre),
        )
        .route("/languages", get(languages::list_languages))
        .route(
            "/language/create",
            get(languages::create_language).post(languages::do_create_language),
        )
        .route("/language/:id", get(languages::get_language))
        .route(
            "/language/:id/update",
            get(languages::update_language).post(languages::do_update_language),
        )
        .route(
            "/language/:id/delete",
            get(languages::delete_language).post(languages::do_delete_language),
        )
        .route("/bookinstances", get(instances::list_instances))
        .route("/borrowed", get(instances::borrowed))
        .route(
            "/bookinstance/create",
            get(instances::create_instance).post(instances::do_create_instance),
        )
        .route("/bookinstance/:id", get(instances::get_instance))
        .route(
            "/bookinstance/:id/update",
            get(instances::update_instance).post(instances::do_update_instance),
        )
        .route(
            "/bookinstance/:id/delete",
            get(instances::delete_instance).post(instances::do_delete_instance),
        )
        .route(
            "/bookinstance/:id/renew",
            get(instances::renew_instance).post(instances::do_renew_instance),
        )
        .fallback(routes::not_found)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args();
    args.next();

    let cfg = if let Some(arg) = args.next() {
        Config::load(&arg)?
    } else if let Ok(arg) = std::env::var("LOCALLIBRARY_CONFIG") {
        Config::load(&arg)?
    } else {
        anyhow::bail!("No configuration was supplied");
    };

    run_migrations(cfg.database.url.clone()).await?;

    let db = Pool::builder(AsyncDieselConnectionManager::<AsyncPgConnection>::new(
        &cfg.database.url,
    ))
    .build()
    .with_context(|| "Could not create the database pool")?;

    let port = cfg.server.port;

    let state = Arc::new(AppState { config: cfg, db });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| "Could not create TCP Listener")?;

    tracing::info!("listening on port {port}");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn minimal_config() {
        let cfg: Config = toml::from_str(
            r#"
            [auth]
            header = "Remote-User"

            [database]
            url = "postgres://library@localhost/library"

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(cfg.catalog.page_size, 10);
        assert!(cfg.auth.librarians.is_empty());
        assert!(cfg.debug.assume_user.is_none());
        assert!(!cfg.is_librarian("alice"));
    }

    #[test]
    fn librarians() {
        let cfg: Config = toml::from_str(
            r#"
            [debug]
            assume_user = "alice"

            [auth]
            header = "Remote-User"
            librarians = ["alice", "bob"]

            [database]
            url = "postgres://library@localhost/library"

            [server]
            port = 8080

            [catalog]
            page_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(cfg.catalog.page_size, 25);
        assert!(cfg.is_librarian("bob"));
        assert!(!cfg.is_librarian("carol"));
        assert_eq!(cfg.debug.assume_user.as_deref(), Some("alice"));
    }
}
