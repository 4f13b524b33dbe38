use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_BACKEND_URL,
    DEFAULT_GRANTS_FILE, DEFAULT_HOST, DEFAULT_MAX_FILE_AGE_HOURS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PORT, DEFAULT_REPORTS_DIR, DEFAULT_SCHEMA_PATH, DEFAULT_WORKERS,
};

// =============================================================================
// Grant Backend Enum
// =============================================================================

/// Where per-user access grants are read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantBackend {
    #[default]
    File,
    Sqlite,
    Postgres,
}

impl fmt::Display for GrantBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantBackend::File => write!(f, "file"),
            GrantBackend::Sqlite => write!(f, "sqlite"),
            GrantBackend::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// File Config Structs (all Option for partial configs)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Analytics backend section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackendFileConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub contexts: Option<BTreeMap<String, String>>,
}

/// Worker pool section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkersFileConfig {
    pub count: Option<usize>,
    pub poll_interval_ms: Option<u64>,
}

/// Report artifacts section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReportsFileConfig {
    pub dir: Option<String>,
    pub max_file_age_hours: Option<u64>,
}

/// Datasource schema section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SchemaFileConfig {
    pub path: Option<String>,
}

/// Authentication section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthFileConfig {
    pub jwt_secret: Option<String>,
}

/// Access grants section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GrantsFileConfig {
    pub backend: Option<GrantBackend>,
    pub file: Option<String>,
    pub database_url: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub backend: Option<BackendFileConfig>,
    pub workers: Option<WorkersFileConfig>,
    pub reports: Option<ReportsFileConfig>,
    pub schema: Option<SchemaFileConfig>,
    pub auth: Option<AuthFileConfig>,
    pub grants: Option<GrantsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `target` when `value` is set
fn merge_opt<T: fmt::Debug>(target: &mut Option<T>, value: Option<T>, key: &str) {
    if value.is_some() {
        tracing::trace!(key, value = ?value, "Merging config value");
        *target = value;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(Default::default);
            merge_opt(&mut current.host, server.host, "server.host");
            merge_opt(&mut current.port, server.port, "server.port");
        }

        if let Some(backend) = other.backend {
            let current = self.backend.get_or_insert_with(Default::default);
            merge_opt(&mut current.url, backend.url, "backend.url");
            merge_opt(
                &mut current.timeout_secs,
                backend.timeout_secs,
                "backend.timeout_secs",
            );
            merge_opt(&mut current.contexts, backend.contexts, "backend.contexts");
        }

        if let Some(workers) = other.workers {
            let current = self.workers.get_or_insert_with(Default::default);
            merge_opt(&mut current.count, workers.count, "workers.count");
            merge_opt(
                &mut current.poll_interval_ms,
                workers.poll_interval_ms,
                "workers.poll_interval_ms",
            );
        }

        if let Some(reports) = other.reports {
            let current = self.reports.get_or_insert_with(Default::default);
            merge_opt(&mut current.dir, reports.dir, "reports.dir");
            merge_opt(
                &mut current.max_file_age_hours,
                reports.max_file_age_hours,
                "reports.max_file_age_hours",
            );
        }

        if let Some(schema) = other.schema {
            let current = self.schema.get_or_insert_with(Default::default);
            merge_opt(&mut current.path, schema.path, "schema.path");
        }

        if let Some(auth) = other.auth {
            let current = self.auth.get_or_insert_with(Default::default);
            if auth.jwt_secret.is_some() {
                tracing::trace!("Merging auth.jwt_secret");
                current.jwt_secret = auth.jwt_secret;
            }
        }

        if let Some(grants) = other.grants {
            let current = self.grants.get_or_insert_with(Default::default);
            merge_opt(&mut current.backend, grants.backend, "grants.backend");
            merge_opt(&mut current.file, grants.file, "grants.file");
            if grants.database_url.is_some() {
                tracing::trace!("Merging grants.database_url");
                current.database_url = grants.database_url;
            }
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Analytics backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Request host (from Origin or Referer) to the application tag sent in
    /// the query context. Unmapped hosts are sent as-is.
    pub contexts: BTreeMap<String, String>,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkersConfig {
    pub count: usize,
    pub poll_interval_ms: u64,
}

impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Report artifact configuration
#[derive(Debug, Clone)]
pub struct ReportsConfig {
    pub dir: PathBuf,
    /// 0 disables expiry
    pub max_file_age_hours: u64,
}

impl ReportsConfig {
    pub fn max_file_age(&self) -> Option<Duration> {
        (self.max_file_age_hours > 0).then(|| Duration::from_secs(self.max_file_age_hours * 3600))
    }
}

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[redacted]")
            .finish()
    }
}

/// Access grant configuration
#[derive(Clone)]
pub struct GrantsConfig {
    pub backend: GrantBackend,
    pub file: PathBuf,
    pub database_url: Option<String>,
}

impl fmt::Debug for GrantsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantsConfig")
            .field("backend", &self.backend)
            .field("file", &self.file)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub workers: WorkersConfig,
    pub reports: ReportsConfig,
    pub schema_path: PathBuf,
    pub auth: AuthConfig,
    pub grants: GrantsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.insight/insight.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let config = Self::load_layers(cli)?;
        config.validate()?;
        tracing::debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    /// Load for offline commands that never serve HTTP, so no JWT secret
    /// is required
    pub fn load_offline(cli: &CliConfig) -> Result<Self> {
        let config = Self::load_layers(cli)?;
        config.validate_sources()?;
        Ok(config)
    }

    fn load_layers(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Ok(Self::from_layers(file_config, cli))
    }

    /// Layer defaults, merged file config and CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_backend = file_config.backend.unwrap_or_default();
        let file_workers = file_config.workers.unwrap_or_default();
        let file_reports = file_config.reports.unwrap_or_default();
        let file_schema = file_config.schema.unwrap_or_default();
        let file_auth = file_config.auth.unwrap_or_default();
        let file_grants = file_config.grants.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let backend = BackendConfig {
            url: cli
                .backend_url
                .clone()
                .or(file_backend.url)
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            timeout_secs: file_backend
                .timeout_secs
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS),
            contexts: file_backend.contexts.unwrap_or_default(),
        };

        let workers = WorkersConfig {
            count: cli.workers.or(file_workers.count).unwrap_or(DEFAULT_WORKERS),
            poll_interval_ms: file_workers
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        };

        let reports = ReportsConfig {
            dir: cli
                .reports_dir
                .clone()
                .or_else(|| file_reports.dir.map(|d| expand_path(&d)))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORTS_DIR)),
            max_file_age_hours: file_reports
                .max_file_age_hours
                .unwrap_or(DEFAULT_MAX_FILE_AGE_HOURS),
        };

        let schema_path = cli
            .schema
            .clone()
            .or_else(|| file_schema.path.map(|p| expand_path(&p)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH));

        let auth = AuthConfig {
            jwt_secret: cli
                .jwt_secret
                .clone()
                .or(file_auth.jwt_secret)
                .unwrap_or_default(),
        };

        let grants = GrantsConfig {
            backend: cli
                .grants_backend
                .or(file_grants.backend)
                .unwrap_or_default(),
            file: cli
                .grants_file
                .clone()
                .or_else(|| file_grants.file.map(|f| expand_path(&f)))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GRANTS_FILE)),
            database_url: cli
                .grants_database_url
                .clone()
                .or(file_grants.database_url)
                .filter(|u| !u.is_empty()),
        };

        Self {
            server,
            backend,
            workers,
            reports,
            schema_path,
            auth,
            grants,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        self.validate_sources()?;

        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.workers.count == 0 {
            anyhow::bail!("Configuration error: workers.count must be greater than 0");
        }

        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!(
                "Configuration error: auth.jwt_secret is required (or set INSIGHT_JWT_SECRET)"
            );
        }

        if self.workers.poll_interval_ms == 0 {
            tracing::warn!("workers.poll_interval_ms is 0, idle workers will spin");
        }

        if is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "Server is listening on all interfaces"
            );
        }

        Ok(())
    }

    /// Checks shared by the server and offline commands
    fn validate_sources(&self) -> Result<()> {
        if self.backend.url.is_empty() {
            anyhow::bail!("Configuration error: backend.url must not be empty");
        }

        if self.grants.backend != GrantBackend::File && self.grants.database_url.is_none() {
            anyhow::bail!(
                "Configuration error: grants.database_url is required when grants.backend is '{}'",
                self.grants.backend
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.insight/insight.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
