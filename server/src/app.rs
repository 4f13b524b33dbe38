//! Core application

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::{ApiServer, AuthState, ReportsApiState, build_router};
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::{AppConfig, GrantBackend, GrantsConfig};
use crate::core::constants::{
    APP_NAME, DEFAULT_LOG_FILTER, DIMENSION_VALUES_TTL_SECS, ENV_LOG, RESULT_RETENTION_SECS,
    SWEEP_INTERVAL_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::{DruidClient, FileArtifactSink, FileGrantSource, SqlGrantSource};
use crate::domain::access::{AccessFilterResolver, GrantSource, check_rights};
use crate::domain::query::QueryCompiler;
use crate::domain::reports::{
    DimensionValuesService, JobExecutor, JobRegistry, ReportService, ReportSpec, WorkerPool,
};
use crate::domain::schema::SchemaStore;

/// Grant source plus the pool to close on shutdown, if any
struct Grants {
    source: Arc<dyn GrantSource>,
    pool: Option<Arc<SqlGrantSource>>,
}

impl Grants {
    async fn open(config: &GrantsConfig) -> Result<Self> {
        let sql = match config.backend {
            GrantBackend::File => {
                let source = FileGrantSource::load(&config.file).with_context(|| {
                    format!("Failed to load grants file: {}", config.file.display())
                })?;
                tracing::debug!(path = %config.file.display(), "File grants loaded");
                return Ok(Self {
                    source: Arc::new(source),
                    pool: None,
                });
            }
            GrantBackend::Sqlite => {
                SqlGrantSource::connect_sqlite(database_url(config)?).await
            }
            GrantBackend::Postgres => {
                SqlGrantSource::connect_postgres(database_url(config)?).await
            }
        }
        .with_context(|| format!("Failed to connect {} grants database", config.backend))?;

        tracing::debug!(backend = %config.backend, "SQL grants connected");
        let pool = Arc::new(sql);
        Ok(Self {
            source: pool.clone(),
            pool: Some(pool),
        })
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            tracing::debug!("Grants database closed");
        }
    }
}

fn database_url(config: &GrantsConfig) -> Result<&str> {
    config
        .database_url
        .as_deref()
        .context("grants.database_url is not set")
}

pub struct CoreApp {
    pub config: AppConfig,
    pub shutdown: ShutdownService,
    pub schemas: Arc<SchemaStore>,
    pub registry: Arc<JobRegistry>,
    pub reports: Arc<ReportService>,
    pub values: Arc<DimensionValuesService>,
    pub executor: Arc<JobExecutor>,
    grants: Grants,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Compile {
                datasource,
                spec,
                user,
                admin,
                context,
            }) => {
                Self::compile_command(&cli_config, &datasource, &spec, user, admin, &context).await
            }
            Some(Commands::Start) | None => {
                let app = Self::init(&cli_config).await?;
                Self::start_server(app).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let schemas = Arc::new(load_schema(&config.schema_path)?);
        let grants = Grants::open(&config.grants).await?;

        let transport = Arc::new(
            DruidClient::new(&config.backend.url, config.backend.timeout())
                .context("Failed to build backend client")?,
        );
        tracing::debug!(endpoint = transport.endpoint(), "Backend client ready");

        let sink = FileArtifactSink::new(config.reports.dir.clone());
        let resolver = AccessFilterResolver::new(grants.source.clone());
        let values = Arc::new(DimensionValuesService::new(
            schemas.clone(),
            resolver.clone(),
            transport.clone(),
            Duration::from_secs(DIMENSION_VALUES_TTL_SECS),
        ));
        let executor = Arc::new(JobExecutor::new(
            schemas.clone(),
            QueryCompiler::new(resolver),
            transport,
            Arc::new(sink.clone()),
        ));

        let registry = Arc::new(JobRegistry::new());
        let reports = Arc::new(ReportService::new(
            registry.clone(),
            schemas.clone(),
            sink,
            config.reports.max_file_age(),
        ));

        Ok(Self {
            config,
            shutdown: ShutdownService::new(),
            schemas,
            registry,
            reports,
            values,
            executor,
            grants,
        })
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        let router = build_router(
            ReportsApiState {
                reports: app.reports.clone(),
                values: app.values.clone(),
                contexts: Arc::new(app.config.backend.contexts.clone()),
            },
            AuthState::new(&app.config.auth.jwt_secret),
        );
        let server = ApiServer::new(&app.config.server, router)?;

        tracing::info!(
            app = APP_NAME,
            host = %app.config.server.host,
            port = app.config.server.port,
            workers = app.config.workers.count,
            reports_dir = %app.config.reports.dir.display(),
            "Server starting"
        );

        let served = server.start(&app.shutdown).await;

        // Stop workers even if the listener failed
        app.shutdown.shutdown().await;
        app.grants.close().await;

        let dropped = app.registry.queued_len();
        if dropped > 0 {
            tracing::warn!(count = dropped, "Queued reports dropped at shutdown");
        }
        served
    }

    pub async fn start_background_tasks(&self) {
        let pool = WorkerPool::new(
            self.registry.clone(),
            self.executor.clone(),
            self.config.workers.count,
            self.config.workers.poll_interval(),
        );
        self.shutdown
            .register_all(pool.start(self.shutdown.subscribe()))
            .await;

        self.shutdown
            .register(spawn_sweeper(
                self.registry.clone(),
                self.values.clone(),
                self.shutdown.subscribe(),
            ))
            .await;

        #[cfg(unix)]
        self.shutdown
            .register(spawn_schema_reload(
                self.schemas.clone(),
                self.shutdown.subscribe(),
            ))
            .await;

        tracing::debug!("Background tasks started");
    }

    /// Compile one spec file and print the backend query
    async fn compile_command(
        cli: &CliConfig,
        datasource: &str,
        spec_path: &Path,
        user: Option<String>,
        admin: bool,
        context: &str,
    ) -> Result<()> {
        let config = AppConfig::load_offline(cli)?;
        let username = match (user, admin) {
            (Some(user), _) => user,
            (None, true) => String::new(),
            (None, false) => anyhow::bail!("--user is required unless --admin is set"),
        };

        let content = std::fs::read_to_string(spec_path)
            .with_context(|| format!("Failed to read spec file: {}", spec_path.display()))?;
        let spec: ReportSpec = serde_json::from_str(&content)
            .with_context(|| format!("Invalid report spec: {}", spec_path.display()))?;

        let store = load_schema(&config.schema_path)?;
        let catalog = store.snapshot();
        let problems = check_rights(&spec, &catalog, datasource, admin);
        if !problems.is_empty() {
            let codes: Vec<String> = problems.iter().map(|p| p.to_string()).collect();
            anyhow::bail!("Report rejected: {}", codes.join(", "));
        }
        let schema = catalog
            .get_datasource(datasource)
            .with_context(|| format!("Unknown datasource: {}", datasource))?;

        let grants = Grants::open(&config.grants).await?;
        let compiler = QueryCompiler::new(AccessFilterResolver::new(grants.source.clone()));
        let compiled = compiler
            .compile(datasource, schema, &spec, &username, admin, context)
            .await;
        grants.close().await;

        let query = compiled?;
        println!("{}", serde_json::to_string_pretty(&query)?);
        Ok(())
    }
}

fn load_schema(path: &Path) -> Result<SchemaStore> {
    SchemaStore::load(path)
        .with_context(|| format!("Failed to load datasource schema: {}", path.display()))
}

/// Periodically drop expired job results and cached dimension values
fn spawn_sweeper(
    registry: Arc<JobRegistry>,
    values: Arc<DimensionValuesService>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let retention = Duration::from_secs(RESULT_RETENTION_SECS);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                biased;
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let results = registry.evict_finished(retention);
                    let cached = values.evict_expired();
                    if results > 0 || cached > 0 {
                        tracing::debug!(results, cached, "Evicted expired entries");
                    }
                }
            }
        }
        tracing::debug!("Sweeper task stopped");
    })
}

/// Reload the schema file on SIGHUP. A failed reload keeps the current one.
#[cfg(unix)]
fn spawn_schema_reload(
    schemas: Arc<SchemaStore>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGHUP handler, schema reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if let Err(e) = schemas.reload() {
                        tracing::error!(error = %e, "Schema reload failed, keeping previous schema");
                    }
                }
            }
        }
        tracing::debug!("Schema reload task stopped");
    })
}
