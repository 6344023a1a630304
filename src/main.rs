use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use guateabroad::identity::{hosted::HostedIdentity, inmem::InMemIdentity, IdentityProvider};
use guateabroad::openapi::ApiDoc;
use guateabroad::repo::Repo;
use guateabroad::storage::build_avatar_store;
use guateabroad::{configure, AppConfig, AppState, SecurityHeaders};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable one of the `inmem-store` or `postgres-store` features");

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    info!("Bootstrapping GuateAbroad server");
    info!("Site URL: {}", cfg.site_url);

    let repo = build_repo(&cfg).await?;

    let identity: Arc<dyn IdentityProvider> = match &cfg.identity {
        Some(idp) => {
            info!("Using hosted identity provider at {}", idp.url);
            Arc::new(HostedIdentity::new(&idp.url, &idp.anon_key, &idp.service_key))
        }
        None => {
            warn!("IDENTITY_URL not set, accounts live in process memory and vanish on restart");
            Arc::new(InMemIdentity::new())
        }
    };

    let avatars = build_avatar_store(&cfg).await.map_err(|e| io::Error::other(e.to_string()))?;

    let openapi = ApiDoc::openapi();
    let state = AppState { repo, identity, avatars, config: cfg.clone() };
    let security = SecurityHeaders::from_config(&cfg);
    let frontend_url = cfg.frontend_url.clone();
    let site_url = cfg.site_url.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local Next.js dev server
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_origin(&site_url)
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = frontend_url.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(security.clone())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> io::Result<Arc<dyn Repo>> {
    use guateabroad::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(db_url)
        .map_err(|e| io::Error::other(e.to_string()))?;
    let repo = PgRepo::new(pool);
    // missing tables surface as 503 / demo fallback instead of a crash
    if let Err(e) = repo.migrate().await {
        warn!("migrations not applied: {e}");
    }
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> io::Result<Arc<dyn Repo>> {
    use guateabroad::repo::inmem::InMemRepo;

    let snapshot = cfg.data_dir.join("state.json");
    info!("Using in-memory repository backend (snapshot {})", snapshot.display());
    Ok(Arc::new(InMemRepo::with_snapshot(snapshot)))
}
