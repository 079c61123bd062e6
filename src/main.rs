use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use clap::Parser;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

mod auth;
mod config;
mod db;
mod issuer;
mod middleware;
mod models;
pub mod observability;
mod routes;
mod saml;
mod tenant;

#[cfg(test)]
mod tests;

use crate::{
    issuer::{AssertionSigner, IssuanceService, XmlDsigSigner},
    tenant::{CachedTenantStore, EndpointGrammar, MemoryTenantStore, TenantResolver, TenantStore},
};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "portcullis.toml";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::PortcullisConfig>,
    /// Tenant resolution, issuance gate and signer.
    pub issuance: Arc<IssuanceService>,
    /// Decides which subject an assertion is issued for.
    pub verifier: Arc<auth::AuthenticationVerifier>,
}

/// Failures while wiring the application together.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to initialize tenant store: {0}")]
    Store(#[from] db::DbError),

    #[error("Failed to load signing identity: {0}")]
    Signer(#[from] issuer::SignerError),

    #[error("Failed to configure authentication: {0}")]
    Auth(#[from] auth::AuthError),
}

impl AppState {
    pub async fn new(config: config::PortcullisConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn TenantStore> = match &config.tenants.store {
            config::TenantStoreConfig::Static(static_config) => {
                let store = MemoryTenantStore::new(
                    static_config.tenants.iter().map(models::Tenant::from),
                )?;
                tracing::info!(tenants = store.len(), "Loaded static tenants");
                Arc::new(store)
            }
            #[cfg(feature = "database-sqlite")]
            config::TenantStoreConfig::Sqlite(sqlite_config) => {
                let pool = db::DbPool::from_config(sqlite_config).await?;
                if sqlite_config.run_migrations {
                    pool.run_migrations().await?;
                }
                tracing::info!(path = %sqlite_config.path, "Connected to SQLite tenant store");
                Arc::new(pool.tenants())
            }
        };

        let store: Arc<dyn TenantStore> = if config.tenants.cache_ttl_secs > 0 {
            tracing::debug!(
                ttl_secs = config.tenants.cache_ttl_secs,
                "Tenant lookups are cached"
            );
            Arc::new(CachedTenantStore::new(
                store,
                Duration::from_secs(config.tenants.cache_ttl_secs),
            ))
        } else {
            store
        };

        let signer = XmlDsigSigner::from_config(&config.idp)?;
        tracing::info!(entity_id = %config.idp.entity_id, "Loaded signing identity");

        Self::with_parts(config, store, Arc::new(signer))
    }

    /// Assemble state around an already-built tenant store and signer.
    pub fn with_parts(
        config: config::PortcullisConfig,
        store: Arc<dyn TenantStore>,
        signer: Arc<dyn AssertionSigner>,
    ) -> Result<Self, StartupError> {
        let resolver = TenantResolver::new(
            EndpointGrammar::from_config(&config.tenants),
            config.tenants.subdomain_matching,
            store,
        );
        let verifier = auth::AuthenticationVerifier::from_config(&config)?;
        tracing::info!(verifier = verifier.kind(), "Authentication configured");

        Ok(Self {
            config: Arc::new(config),
            issuance: Arc::new(IssuanceService::new(resolver, signer)),
            verifier: Arc::new(verifier),
        })
    }
}

pub fn build_app(config: &config::PortcullisConfig, state: AppState) -> Router {
    let mut app = Router::new()
        // Health check endpoint
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        .route(
            routes::sso::SSO_PATH,
            get(routes::sso::sso_redirect).post(routes::sso::sso_post),
        );

    // Add Prometheus metrics endpoint if enabled
    if config.observability.metrics.enabled {
        app = app.route(
            &config.observability.metrics.path,
            get(routes::health::metrics),
        );
    }

    // Layers added later run outermost: the request ID span wraps the
    // trace layer, which wraps the security headers on route responses.
    app.layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::security_headers_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(axum::middleware::from_fn(middleware::request_id_middleware))
    .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
    .with_state(state)
}

#[derive(Parser, Debug)]
#[command(version, about = "Portcullis multi-tenant SAML identity provider", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./portcullis.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the identity provider (default)
    Serve,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./portcullis.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and signing material, then exit
    Check,
    /// Run tenant store migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    #[cfg(feature = "database-sqlite")]
    Migrate,
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show enabled compile-time features
    Features,
}

/// Starting configuration written by `portcullis init`.
fn default_config_toml() -> &'static str {
    r#"# Portcullis Configuration

[server]
host = "127.0.0.1"
port = 8080

# Trust the identity header only from your authenticating proxy
# [server.trusted_proxies]
# cidrs = ["10.0.0.0/8"]

[tenants]
# Service-provider endpoints look like https://{tenant}.example.com/...
domain_suffix = "example.com"
require_https = true
cache_ttl_secs = 30

[tenants.store]
type = "static"

[[tenants.store.tenants]]
subdomain = "acme"
name = "Acme Corp"
assertion_issuance_enabled = true

# Or read tenants from SQLite:
# [tenants.store]
# type = "sqlite"
# path = "portcullis.db"

[idp]
entity_id = "https://idp.example.com/saml/metadata"
# Generate with:
#   openssl req -x509 -newkey rsa:2048 -nodes -days 365 \
#     -subj "/CN=idp.example.com" -keyout idp.key -out idp.crt
certificate_path = "idp.crt"
private_key_path = "idp.key"

[auth]
type = "sso"
identity_header = "X-Authenticated-Email"

[observability.logging]
level = "info"
format = "compact"
"#
}

/// Resolve the config path: the explicit one, or the file in the working directory.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf, String> {
    let path = PathBuf::from(explicit_path.unwrap_or(DEFAULT_CONFIG_FILE));
    if !path.exists() {
        return Err(format!(
            "Config file not found: {}\nCreate one with: portcullis init",
            path.display()
        ));
    }
    Ok(path)
}

/// Load and validate the config file, exiting on failure.
fn load_config(explicit_path: Option<&str>) -> (PathBuf, config::PortcullisConfig) {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match config::PortcullisConfig::from_file(&config_path) {
        Ok(config) => (config_path, config),
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    }
}

fn init_tracing_or_exit(config: &config::PortcullisConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Check) => {
            run_check(args.config.as_deref());
        }
        #[cfg(feature = "database-sqlite")]
        Some(Command::Migrate) => {
            run_migrate(args.config.as_deref()).await;
        }
        Some(Command::Features) => {
            run_features();
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

/// Create a configuration file from the built-in template.
fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Edit [tenants] and [idp], then validate it with:");
    println!("  portcullis check --config {}", output_path.display());
}

/// Parse the config and load the signing identity without serving.
fn run_check(explicit_config_path: Option<&str>) {
    let (config_path, config) = load_config(explicit_config_path);

    if let Err(e) = XmlDsigSigner::from_config(&config.idp) {
        eprintln!("Invalid signing identity: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = auth::AuthenticationVerifier::from_config(&config) {
        eprintln!("Invalid authentication config: {}", e);
        std::process::exit(1);
    }

    println!("Configuration OK: {}", config_path.display());
    println!("  tenant store:   {}", config.tenants.store.kind());
    println!("  domain suffix:  {}", config.tenants.domain_suffix);
    println!("  authentication: {}", config.auth.kind());
}

/// Export JSON schema for the configuration file to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match config::PortcullisConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize config schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path);
        }
        None => {
            println!("{}", content);
        }
    }
}

/// Print enabled compile-time features and build profile.
fn run_features() {
    let version = env!("CARGO_PKG_VERSION");

    let features: &[(&str, &str, bool)] = &[
        (
            "database-sqlite",
            "Tenant stores",
            cfg!(feature = "database-sqlite"),
        ),
        ("prometheus", "Observability", cfg!(feature = "prometheus")),
        ("json-schema", "Tooling", cfg!(feature = "json-schema")),
    ];

    // Infer build profile from enabled features
    let profile = if cfg!(feature = "full") {
        "full"
    } else if cfg!(feature = "standard") {
        "standard"
    } else if cfg!(feature = "minimal") {
        "minimal"
    } else {
        "custom"
    };

    println!("Portcullis v{version}\n");
    println!("Build profile: {profile}");
    match profile {
        "full" => println!("  (full = standard + json-schema)\n"),
        "standard" => println!("  (standard = minimal + database-sqlite, prometheus)\n"),
        "minimal" => println!("  (minimal = static tenants from the config file only)\n"),
        _ => println!(),
    }

    println!("Compile-time features:");

    let mut current_group = "";
    for &(name, group, enabled) in features {
        if group != current_group {
            if !current_group.is_empty() {
                println!();
            }
            println!("  {group}:");
            current_group = group;
        }
        let status = if enabled { "enabled" } else { "disabled" };
        println!("    {name:<32} {status}");
    }
}

/// Run the identity provider
async fn run_server(explicit_config_path: Option<&str>) {
    let (config_path, config) = load_config(explicit_config_path);

    init_tracing_or_exit(&config);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    tracing::info!(
        config_file = %config_path.display(),
        "Starting Portcullis"
    );

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    let app = build_app(&config, state);

    let bind_addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, address = %bind_addr, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    // Peer addresses feed the trusted-proxy check.
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}

/// Run tenant store migrations and exit.
#[cfg(feature = "database-sqlite")]
async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config_path, config) = load_config(explicit_config_path);

    init_tracing_or_exit(&config);

    tracing::info!(
        config_file = %config_path.display(),
        "Running database migrations"
    );

    let config::TenantStoreConfig::Sqlite(sqlite_config) = &config.tenants.store else {
        eprintln!("Error: tenants.store is not a database. Nothing to migrate.");
        std::process::exit(1);
    };

    match db::DbPool::from_config(sqlite_config).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}
