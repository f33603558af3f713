//! Configuration loading and resolution for Timescale Doctor.
//!
//! Tool settings resolve in this order, first file found wins:
//! 1. An explicit `--config PATH`
//! 2. `timescale-doctor.toml` in the working directory
//! 3. `$XDG_CONFIG_HOME/timescale-doctor/config.toml` (platform config dir)
//! 4. Built-in defaults
//!
//! Settings live under a `[check]` table. Connection parameters are not part
//! of this file; they come from flags, `PG*` variables, or a libpq service
//! file read by [`load_service`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectOptions;
use crate::rule::Rule;

/// Name of the per-directory configuration file.
pub const CONFIG_FILE_NAME: &str = "timescale-doctor.toml";

/// Column width of wrapped findings.
pub const DEFAULT_WRAP_WIDTH: usize = 70;

// ---------------------------------------------------------------------------
// Main config
// ---------------------------------------------------------------------------

/// Complete tool configuration.
///
/// Loaded from the resolution order above, then optionally overridden by CLI
/// flags. Passed to the runner by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorConfig {
    /// Column at which findings are wrapped.
    pub wrap_width: usize,

    /// Per-query `statement_timeout` in seconds (0 = no timeout).
    pub query_timeout_secs: u64,

    /// Connection establishment timeout in seconds (0 = no timeout).
    pub connect_timeout_secs: u64,

    /// Glob patterns over `category.name` to run. Empty selects every rule.
    pub select: Vec<String>,

    /// Glob patterns over `category.name` to skip.
    pub exclude: Vec<String>,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
            query_timeout_secs: 30,
            connect_timeout_secs: 10,
            select: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TOML deserialization helpers
// ---------------------------------------------------------------------------

/// Raw TOML structure for `timescale-doctor.toml`.
#[derive(Debug, Deserialize)]
struct TomlDoctorFile {
    check: Option<TomlCheckSection>,
}

/// The `[check]` section inside the TOML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCheckSection {
    wrap_width: Option<usize>,
    query_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    select: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

/// Apply a [`TomlCheckSection`] onto a [`DoctorConfig`], overriding any set values.
fn apply_toml_section(config: &mut DoctorConfig, section: &TomlCheckSection) {
    if let Some(v) = section.wrap_width {
        config.wrap_width = v;
    }
    if let Some(v) = section.query_timeout_secs {
        config.query_timeout_secs = v;
    }
    if let Some(v) = section.connect_timeout_secs {
        config.connect_timeout_secs = v;
    }
    if let Some(ref v) = section.select {
        config.select = v.clone();
    }
    if let Some(ref v) = section.exclude {
        config.exclude = v.clone();
    }
}

impl DoctorConfig {
    /// Load configuration using the resolution order in the module docs.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a found config file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let local = working_dir.join(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load_file(&local);
        }

        if let Some(user) = user_config_path() {
            if user.is_file() {
                return Self::load_file(&user);
            }
        }

        Ok(Self::default())
    }

    /// Load a single configuration file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.display().to_string(), e.to_string()))?;
        let parsed: TomlDoctorFile = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))?;

        let mut config = Self::default();
        if let Some(ref section) = parsed.check {
            apply_toml_section(&mut config, section);
        }
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Session timeouts derived from this configuration.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }

    /// Compile `select`/`exclude` into a [`RuleFilter`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for a malformed glob.
    pub fn rule_filter(&self) -> Result<RuleFilter, ConfigError> {
        let select = if self.select.is_empty() {
            None
        } else {
            Some(build_globset(&self.select)?)
        };
        Ok(RuleFilter {
            select,
            exclude: build_globset(&self.exclude)?,
        })
    }
}

/// Platform configuration path, e.g. `~/.config/timescale-doctor/config.toml`.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("timescale-doctor").join("config.toml"))
}

// ---------------------------------------------------------------------------
// Rule selection
// ---------------------------------------------------------------------------

/// Compiled rule selection.
///
/// A pattern without a `.` names a whole category, so `index` is the same as
/// `index.*`.
#[derive(Debug, Clone)]
pub struct RuleFilter {
    select: Option<GlobSet>,
    exclude: GlobSet,
}

impl RuleFilter {
    /// A filter that enables every rule.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            select: None,
            exclude: GlobSet::empty(),
        }
    }

    /// Whether `rule` should run: it must match a `select` pattern (if any
    /// are given) and no `exclude` pattern.
    #[must_use]
    pub fn is_enabled(&self, rule: &Rule) -> bool {
        let name = rule.qualified_name();
        if let Some(ref select) = self.select {
            if !select.is_match(&name) {
                return false;
            }
        }
        !self.exclude.is_match(&name)
    }
}

/// Glob metacharacters understood by `globset`.
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Compile a glob for `category.name` matching.
///
/// A bare category name such as `index` is shorthand for `index.*`. Any
/// pattern containing a `.` or a glob metacharacter is used as written, so
/// `*unused` matches `index.unused`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPattern`] if `pattern` is not a valid glob.
pub fn compile_pattern(pattern: &str) -> Result<Glob, ConfigError> {
    let normalized = if pattern.contains('.') || pattern.contains(GLOB_META) {
        pattern.to_owned()
    } else {
        format!("{pattern}.*")
    };
    Glob::new(&normalized).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: e.kind().to_string(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_pattern(pattern.trim())?);
    }
    builder.build().map_err(|e| ConfigError::InvalidPattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Connection service file
// ---------------------------------------------------------------------------

/// One `[name]` section of a libpq connection service file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntry {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub sslmode: Option<String>,
}

/// Location of the service file: `PGSERVICEFILE`, else `~/.pg_service.conf`.
#[must_use]
pub fn service_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("PGSERVICEFILE") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".pg_service.conf"))
}

/// Read the service `name` from the INI-format file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed, has no such section, or
/// carries a non-numeric port.
pub fn load_service(path: &Path, name: &str) -> Result<ServiceEntry, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::ReadError(
            path.display().to_string(),
            "file not found".to_owned(),
        ));
    }

    let settings = ::config::Config::builder()
        .add_source(::config::File::new(
            &path.to_string_lossy(),
            ::config::FileFormat::Ini,
        ))
        .build()
        .map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))?;

    let table = settings
        .get_table(name)
        .map_err(|_| ConfigError::UnknownService {
            name: name.to_owned(),
            path: path.display().to_string(),
        })?;
    let field = |key: &str| {
        table
            .get(key)
            .and_then(|value| value.clone().into_string().ok())
    };

    let port = match field("port") {
        Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
            ConfigError::ParseError(
                path.display().to_string(),
                format!("service '{name}' has invalid port '{raw}': {e}"),
            )
        })?),
        None => None,
    };

    Ok(ServiceEntry {
        host: field("host"),
        port,
        user: field("user"),
        password: field("password"),
        dbname: field("dbname"),
        sslmode: field("sslmode"),
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{0}': {1}")]
    ReadError(String, String),

    /// Failed to parse a configuration file.
    #[error("Failed to parse config file '{0}': {1}")]
    ParseError(String, String),

    /// A rule pattern is not a valid glob.
    #[error("Invalid rule pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The service file has no section for the requested service.
    #[error("Service '{name}' not found in '{path}'")]
    UnknownService { name: String, path: String },

    /// No service file location could be determined.
    #[error("Cannot locate a service file: set PGSERVICEFILE or HOME")]
    NoServiceFile,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDefinition;
    use indoc::indoc;

    fn rule(category: &str, name: &str) -> Rule {
        RuleDefinition::new(category, name)
            .query("SELECT 1")
            .message("found")
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = DoctorConfig::default();
        assert_eq!(config.wrap_width, 70);
        assert_eq!(config.query_timeout_secs, 30);
        assert!(config.select.is_empty());
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_connect_options() {
        let mut config = DoctorConfig::default();
        config.query_timeout_secs = 5;
        let options = config.connect_options();
        assert_eq!(options.query_timeout, Duration::from_secs(5));
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_nonexistent_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DoctorConfig::load(None, &dir.path().join("missing")).unwrap();
        assert_eq!(config.wrap_width, DEFAULT_WRAP_WIDTH);
    }

    #[test]
    fn test_load_from_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let content = indoc! {r#"
            [check]
            wrap_width = 100
            query_timeout_secs = 5
            exclude = ["hypertable.candidate"]
        "#};
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), content).unwrap();

        let config = DoctorConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.wrap_width, 100);
        assert_eq!(config.query_timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.exclude, vec!["hypertable.candidate"]);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = DoctorConfig::load(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(..)));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[check]\nwrap = 10\n").unwrap();
        let err = DoctorConfig::load(Some(&path), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_file_without_check_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[other]\nkey = 1\n").unwrap();
        let config = DoctorConfig::load(Some(&path), dir.path()).unwrap();
        assert_eq!(config, DoctorConfig::default());
    }

    #[test]
    fn test_filter_allows_everything_by_default() {
        let filter = DoctorConfig::default().rule_filter().unwrap();
        assert!(filter.is_enabled(&rule("index", "unused")));
        assert!(RuleFilter::allow_all().is_enabled(&rule("compression", "linear_segmentby")));
    }

    #[test]
    fn test_select_filter() {
        let mut config = DoctorConfig::default();
        config.select = vec!["index".to_owned(), "hypertable.chunk_*".to_owned()];
        let filter = config.rule_filter().unwrap();
        assert!(filter.is_enabled(&rule("index", "unused")));
        assert!(filter.is_enabled(&rule("index", "duplicate")));
        assert!(filter.is_enabled(&rule("hypertable", "chunk_permissions")));
        assert!(!filter.is_enabled(&rule("hypertable", "candidate")));
        assert!(!filter.is_enabled(&rule("compression", "linear_segmentby")));
    }

    #[test]
    fn test_exclude_wins_over_select() {
        let mut config = DoctorConfig::default();
        config.select = vec!["index".to_owned()];
        config.exclude = vec!["index.unused".to_owned()];
        let filter = config.rule_filter().unwrap();
        assert!(!filter.is_enabled(&rule("index", "unused")));
        assert!(filter.is_enabled(&rule("index", "duplicate")));
    }

    #[test]
    fn test_compile_pattern_category_shorthand() {
        let matcher = compile_pattern("index").unwrap().compile_matcher();
        assert!(matcher.is_match("index.unused"));
        assert!(!matcher.is_match("hypertable.candidate"));
    }

    #[test]
    fn test_compile_pattern_keeps_globs_without_dot() {
        for pattern in ["*unused", "*used", "*", "index*"] {
            let matcher = compile_pattern(pattern).unwrap().compile_matcher();
            assert!(matcher.is_match("index.unused"), "{pattern}");
        }
        let matcher = compile_pattern("*unused").unwrap().compile_matcher();
        assert!(!matcher.is_match("index.duplicate"));
    }

    #[test]
    fn test_exclude_glob_without_dot() {
        let mut config = DoctorConfig::default();
        config.exclude = vec!["*segmentby".to_owned()];
        let filter = config.rule_filter().unwrap();
        assert!(!filter.is_enabled(&rule("compression", "pointless_segmentby")));
        assert!(filter.is_enabled(&rule("index", "unused")));
    }

    #[test]
    fn test_invalid_pattern() {
        let mut config = DoctorConfig::default();
        config.exclude = vec!["index.[".to_owned()];
        let err = config.rule_filter().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_load_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg_service.conf");
        let content = indoc! {"
            [production]
            host=db.example.com
            port=6543
            user=doctor
            password=hunter2
            dbname=metrics

            [local]
            host=/var/run/postgresql
            dbname=dev
            sslmode=disable
        "};
        std::fs::write(&path, content).unwrap();

        let prod = load_service(&path, "production").unwrap();
        assert_eq!(prod.host.as_deref(), Some("db.example.com"));
        assert_eq!(prod.port, Some(6543));
        assert_eq!(prod.user.as_deref(), Some("doctor"));
        assert_eq!(prod.dbname.as_deref(), Some("metrics"));
        assert_eq!(prod.sslmode, None);

        let local = load_service(&path, "local").unwrap();
        assert_eq!(local.port, None);
        assert_eq!(local.sslmode.as_deref(), Some("disable"));
    }

    #[test]
    fn test_load_unknown_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg_service.conf");
        std::fs::write(&path, "[local]\ndbname=dev\n").unwrap();
        let err = load_service(&path, "production").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService { .. }));
    }

    #[test]
    fn test_load_service_bad_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg_service.conf");
        std::fs::write(&path, "[local]\nport=fivefourthreetwo\n").unwrap();
        let err = load_service(&path, "local").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_load_service_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_service(&dir.path().join("absent.conf"), "local").unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(..)));
    }
}
