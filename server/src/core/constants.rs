// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Insight";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "insight";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".insight";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "insight.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "INSIGHT_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "INSIGHT_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "INSIGHT_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "INSIGHT_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Default log filter when neither INSIGHT_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "info,insight=info";

/// Maximum request body size (1MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

// =============================================================================
// Analytics Backend
// =============================================================================

/// Environment variable for the analytics backend base URL
pub const ENV_BACKEND_URL: &str = "INSIGHT_BACKEND_URL";

/// Default analytics backend base URL (query broker)
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8082";

/// Default backend request timeout in seconds
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 300;

/// Query context tag when a request carries no Origin or Referer
pub const DEFAULT_QUERY_CONTEXT: &str = "direct";

// =============================================================================
// Workers
// =============================================================================

/// Environment variable for the worker count
pub const ENV_WORKERS: &str = "INSIGHT_WORKERS";

/// Default number of report workers
pub const DEFAULT_WORKERS: usize = 5;

/// Default idle poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

// =============================================================================
// Reports & Schema
// =============================================================================

/// Environment variable for the reports directory
pub const ENV_REPORTS_DIR: &str = "INSIGHT_REPORTS_DIR";

/// Default reports directory
pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// Default maximum artifact age in hours (0 = never expire)
pub const DEFAULT_MAX_FILE_AGE_HOURS: u64 = 0;

/// How long finished job results stay in memory before status lookups
/// fall back to disk
pub const RESULT_RETENTION_SECS: u64 = 3600;

/// How long dimension value lists are cached
pub const DIMENSION_VALUES_TTL_SECS: u64 = 3600;

/// Interval between sweeps of expired results and cached values
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Environment variable for the datasource schema file
pub const ENV_SCHEMA: &str = "INSIGHT_SCHEMA";

/// Default datasource schema file
pub const DEFAULT_SCHEMA_PATH: &str = "config/datasources.json";

// =============================================================================
// Auth
// =============================================================================

/// Environment variable for the JWT signing secret
pub const ENV_JWT_SECRET: &str = "INSIGHT_JWT_SECRET";

// =============================================================================
// Access Grants
// =============================================================================

/// Environment variable for the grant backend (file, sqlite, postgres)
pub const ENV_GRANTS_BACKEND: &str = "INSIGHT_GRANTS_BACKEND";

/// Environment variable for the users/grants file
pub const ENV_GRANTS_FILE: &str = "INSIGHT_GRANTS_FILE";

/// Environment variable for the grants database URL
pub const ENV_GRANTS_DATABASE_URL: &str = "INSIGHT_GRANTS_DATABASE_URL";

/// Default users/grants file
pub const DEFAULT_GRANTS_FILE: &str = "config/users.json";

/// Connection pool size for SQL grant sources
pub const GRANTS_MAX_CONNECTIONS: u32 = 4;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
