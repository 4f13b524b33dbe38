use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::GrantBackend;
use super::constants::{
    DEFAULT_QUERY_CONTEXT, ENV_BACKEND_URL, ENV_CONFIG, ENV_GRANTS_BACKEND,
    ENV_GRANTS_DATABASE_URL, ENV_GRANTS_FILE, ENV_HOST, ENV_JWT_SECRET, ENV_PORT, ENV_REPORTS_DIR,
    ENV_SCHEMA, ENV_WORKERS,
};

#[derive(Parser)]
#[command(name = "insight")]
#[command(version, about = "Report compilation and execution service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Analytics backend base URL (queries go to <url>/druid/v2/)
    #[arg(long, global = true, env = ENV_BACKEND_URL)]
    pub backend_url: Option<String>,

    /// Number of report workers
    #[arg(long, short = 'w', global = true, env = ENV_WORKERS)]
    pub workers: Option<usize>,

    /// Datasource schema file (JSON)
    #[arg(long, global = true, env = ENV_SCHEMA)]
    pub schema: Option<PathBuf>,

    /// Directory report artifacts are written to
    #[arg(long, global = true, env = ENV_REPORTS_DIR)]
    pub reports_dir: Option<PathBuf>,

    /// JWT signing secret
    #[arg(long, global = true, env = ENV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Access grant backend (file, sqlite or postgres)
    #[arg(long, global = true, env = ENV_GRANTS_BACKEND, value_parser = parse_grant_backend)]
    pub grants_backend: Option<GrantBackend>,

    /// Users/grants file (file backend)
    #[arg(long, global = true, env = ENV_GRANTS_FILE)]
    pub grants_file: Option<PathBuf>,

    /// Grants database URL (sqlite or postgres backend)
    #[arg(long, global = true, env = ENV_GRANTS_DATABASE_URL, hide_env_values = true)]
    pub grants_database_url: Option<String>,
}

/// Parse grant backend from CLI/env string
fn parse_grant_backend(s: &str) -> Result<GrantBackend, String> {
    match s.to_lowercase().as_str() {
        "file" => Ok(GrantBackend::File),
        "sqlite" => Ok(GrantBackend::Sqlite),
        "postgres" | "postgresql" => Ok(GrantBackend::Postgres),
        _ => Err(format!(
            "Invalid grant backend '{}'. Valid options: file, sqlite, postgres",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Compile a report spec and print the backend query without running it
    Compile {
        /// Datasource name from the schema file
        #[arg(long, short = 'd')]
        datasource: String,
        /// Report spec JSON file
        spec: PathBuf,
        /// Username whose access grants apply
        #[arg(long, short = 'u')]
        user: Option<String>,
        /// Compile as an admin (no access filters)
        #[arg(long)]
        admin: bool,
        /// Application tag sent in the query context
        #[arg(long, default_value = DEFAULT_QUERY_CONTEXT)]
        context: String,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub workers: Option<usize>,
    pub schema: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub grants_backend: Option<GrantBackend>,
    pub grants_file: Option<PathBuf>,
    pub grants_database_url: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        backend_url: cli.backend_url,
        workers: cli.workers,
        schema: cli.schema,
        reports_dir: cli.reports_dir,
        jwt_secret: cli.jwt_secret,
        grants_backend: cli.grants_backend,
        grants_file: cli.grants_file,
        grants_database_url: cli.grants_database_url,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grant_backend() {
        assert_eq!(parse_grant_backend("FILE"), Ok(GrantBackend::File));
        assert_eq!(parse_grant_backend("postgresql"), Ok(GrantBackend::Postgres));
        assert!(parse_grant_backend("mysql").is_err());
    }

    #[test]
    fn test_compile_subcommand() {
        let cli = Cli::try_parse_from([
            "insight",
            "compile",
            "-d",
            "sales",
            "spec.json",
            "--user",
            "alice",
            "--workers",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(2));
        match cli.command {
            Some(Commands::Compile {
                datasource,
                spec,
                user,
                admin,
                context,
            }) => {
                assert_eq!(datasource, "sales");
                assert_eq!(spec, PathBuf::from("spec.json"));
                assert_eq!(user.as_deref(), Some("alice"));
                assert!(!admin);
                assert_eq!(context, "direct");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
