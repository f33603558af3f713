//! Command-line interface.
//!
//! Flags follow `psql` conventions, which is why `-h` is the host and help
//! is only available as `--help`. Connection values fall back to the usual
//! `PG*` environment variables; a `--service` definition overrides both.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::config::{load_service, service_file_path, ConfigError, DoctorConfig};
use crate::connection::ConnectParams;
use crate::types::ShowLevel;

/// Analyze a PostgreSQL/TimescaleDB database and provide recommendations.
#[derive(Debug, Parser)]
#[command(name = "timescale-doctor", version, about, disable_help_flag = true)]
pub struct Cli {
    /// User name to connect as
    #[arg(short = 'U', long = "username", env = "PGUSER", value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password to use when connecting
    #[arg(short = 'W', long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connection service to use, read from PGSERVICEFILE or ~/.pg_service.conf
    #[arg(short = 's', long, value_name = "NAME")]
    pub service: Option<String>,

    /// Name of the database to connect to
    #[arg(short = 'd', long = "dbname", value_name = "DBNAME")]
    pub dbname_option: Option<String>,

    /// Name of the database to connect to
    #[arg(value_name = "DBNAME", env = "PGDATABASE")]
    pub dbname: Option<String>,

    /// Database server port number
    #[arg(short = 'p', long, env = "PGPORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Database server host or socket directory
    #[arg(short = 'h', long, env = "PGHOST", value_name = "HOSTNAME")]
    pub host: Option<String>,

    /// Mode for negotiating an SSL connection
    #[arg(long, env = "PGSSLMODE", value_name = "MODE")]
    pub sslmode: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Verbose logging; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// List rules matching PATTERN instead of running them (all rules if omitted)
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "*")]
    pub list: Option<String>,

    /// What to show for each listed rule
    #[arg(long, value_enum, requires = "list")]
    pub show: Option<ShowLevel>,

    /// Only run rules matching these comma-separated patterns
    #[arg(long, value_name = "PATTERNS", value_delimiter = ',')]
    pub select: Vec<String>,

    /// Skip rules matching these comma-separated patterns
    #[arg(long, value_name = "PATTERNS", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Per-query timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Print the run report as JSON
    #[arg(long, conflicts_with = "list")]
    pub json: bool,

    /// Configuration file to use instead of the default locations
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolve connection parameters, reading the service file when
    /// `--service` is given.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the service file is missing, malformed,
    /// or lacks the requested service.
    pub fn connect_params(&self) -> Result<ConnectParams, ConfigError> {
        match self.service {
            Some(_) => {
                let path = service_file_path().ok_or(ConfigError::NoServiceFile)?;
                self.connect_params_from(Some(&path))
            }
            None => self.connect_params_from(None),
        }
    }

    /// Like [`Cli::connect_params`], reading services from `service_file`.
    ///
    /// # Errors
    ///
    /// Same as [`Cli::connect_params`].
    pub fn connect_params_from(&self, service_file: Option<&Path>) -> Result<ConnectParams, ConfigError> {
        let user = self.username.clone().unwrap_or_else(os_user);
        let dbname = self
            .dbname_option
            .clone()
            .or_else(|| self.dbname.clone())
            .unwrap_or_else(|| user.clone());

        let mut params = ConnectParams::new(user, dbname);
        params.host = self.host.clone();
        if let Some(port) = self.port {
            params.port = port;
        }
        params.password = self.password.clone();
        params.sslmode = self.sslmode.clone();

        if let (Some(name), Some(path)) = (self.service.as_deref(), service_file) {
            let service = load_service(path, name)?;
            log::debug!("using service '{name}' from {}", path.display());
            params.apply_service(&service);
        }
        Ok(params)
    }

    /// Load the configuration file (`--config`, else the default locations)
    /// and apply the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the chosen file cannot be read or parsed.
    pub fn load_config(&self, working_dir: &Path) -> Result<DoctorConfig, ConfigError> {
        let mut config = DoctorConfig::load(self.config.as_deref(), working_dir)?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    ///
    /// Selection patterns are added to those from the file.
    pub fn apply_overrides(&self, config: &mut DoctorConfig) {
        config.select.extend(self.select.iter().cloned());
        config.exclude.extend(self.exclude.iter().cloned());
        if let Some(secs) = self.timeout {
            config.query_timeout_secs = secs;
        }
    }

    /// Default `tracing` filter directive for the requested verbosity.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Name of the user running the tool, as libpq would default it.
fn os_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "postgres".to_owned())
}
