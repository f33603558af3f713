//! Database access for the rule runner.
//!
//! The runner only needs to run a statement and read back its rows by column
//! name. That contract is the [`Database`] trait; [`PgDatabase`] implements it
//! on top of a blocking `postgres::Client`.
//!
//! Queries go through the simple query protocol so every value arrives in
//! PostgreSQL's text format. Catalog types such as `regclass` or `name` then
//! render exactly as `psql` would print them, without per-type decoding.
//!
//! TLS is negotiated with `rustls` according to the libpq `sslmode`. As with
//! libpq, `prefer` and `require` encrypt without checking the server
//! certificate, while `verify-ca` and `verify-full` check it against the
//! Mozilla root store.
//!
//! Each session is opened with `default_transaction_read_only = on` and a
//! `statement_timeout`, so a slow catalog scan is cancelled server-side and
//! reported as a failure of that one rule.

use std::sync::Arc;
use std::time::Duration;

use postgres::config::SslMode;
use postgres::error::SqlState;
use postgres::{Client, SimpleQueryMessage};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::config::ServiceEntry;
use crate::types::Row;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Host used when none is configured.
const DEFAULT_HOST: &str = "localhost";

/// Errors from the database boundary.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The connection could not be established.
    #[error("could not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: postgres::Error,
    },

    /// A statement failed on the server or on the wire.
    #[error("{0}")]
    Query(String),

    /// A statement was cancelled by `statement_timeout`.
    #[error("query cancelled after exceeding the {}s statement timeout", .0.as_secs())]
    Timeout(Duration),

    /// The `sslmode` value is not one libpq knows.
    #[error("invalid sslmode '{0}'; expected disable, allow, prefer, require, verify-ca or verify-full")]
    UnsupportedSslMode(String),

    /// The TLS client configuration could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// A read-only source of query results.
///
/// Implementations run `sql` and return its rows. Statements are expected
/// to be independent: a failed statement must not poison later ones.
pub trait Database {
    /// Run `sql` and return every row it produced.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError`] if the statement fails.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError>;
}

/// Connection parameters, resolved from flags, environment and service file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Host name, IP address, or Unix socket directory.
    pub host: Option<String>,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    /// libpq-style `sslmode` value.
    pub sslmode: Option<String>,
}

impl ConnectParams {
    /// Parameters with default host and port for the given user and database.
    #[must_use]
    pub fn new(user: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            dbname: dbname.into(),
            user: user.into(),
            password: None,
            sslmode: None,
        }
    }

    /// Overwrite parameters with every value a service definition sets.
    pub fn apply_service(&mut self, service: &ServiceEntry) {
        if let Some(ref host) = service.host {
            self.host = Some(host.clone());
        }
        if let Some(port) = service.port {
            self.port = port;
        }
        if let Some(ref user) = service.user {
            self.user = user.clone();
        }
        if let Some(ref password) = service.password {
            self.password = Some(password.clone());
        }
        if let Some(ref dbname) = service.dbname {
            self.dbname = dbname.clone();
        }
        if let Some(ref sslmode) = service.sslmode {
            self.sslmode = Some(sslmode.clone());
        }
    }

    /// `user@host:port/dbname`, for messages. Never includes the password.
    #[must_use]
    pub fn target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user,
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port,
            self.dbname
        )
    }

    /// Build a `postgres::Config` for these parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnsupportedSslMode`] for an unknown `sslmode`.
    pub fn to_pg_config(&self, connect_timeout: Duration) -> Result<postgres::Config, DbError> {
        let mut config = postgres::Config::new();
        config
            .host(self.host.as_deref().unwrap_or(DEFAULT_HOST))
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .application_name("timescale-doctor")
            .ssl_mode(self.ssl_policy()?.mode);
        if !connect_timeout.is_zero() {
            config.connect_timeout(connect_timeout);
        }
        if let Some(ref password) = self.password {
            config.password(password);
        }
        Ok(config)
    }

    /// TLS behaviour for the configured `sslmode`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnsupportedSslMode`] for an unknown `sslmode`.
    pub fn ssl_policy(&self) -> Result<SslPolicy, DbError> {
        parse_ssl_mode(self.sslmode.as_deref())
    }
}

/// How a libpq `sslmode` is honoured by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SslPolicy {
    /// Whether TLS is skipped, attempted, or mandatory.
    pub mode: SslMode,
    /// Whether the server certificate must chain to a trusted root and match
    /// the host name.
    pub verify_server: bool,
}

/// Map a libpq `sslmode` onto the client's TLS settings.
///
/// `allow` has no direct counterpart and is treated as `prefer`. `verify-ca`
/// also checks the host name, like `verify-full`.
fn parse_ssl_mode(mode: Option<&str>) -> Result<SslPolicy, DbError> {
    let (mode, verify_server) = match mode.map(str::to_lowercase).as_deref() {
        None | Some("prefer") | Some("allow") => (SslMode::Prefer, false),
        Some("disable") => (SslMode::Disable, false),
        Some("require") => (SslMode::Require, false),
        Some("verify-ca") | Some("verify-full") => (SslMode::Require, true),
        Some(other) => return Err(DbError::UnsupportedSslMode(other.to_owned())),
    };
    Ok(SslPolicy { mode, verify_server })
}

/// Build the `rustls` connector used for every session.
///
/// With `verify_server` the certificate is checked against the bundled
/// Mozilla roots. Without it any certificate is accepted, but handshake
/// signatures are still verified.
///
/// # Errors
///
/// Returns [`DbError::Tls`] if the crypto provider supports no usable
/// protocol version.
pub fn tls_connector(verify_server: bool) -> Result<MakeRustlsConnect, DbError> {
    let provider = Arc::new(ring::default_provider());
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DbError::Tls(e.to_string()))?;

    let config = if verify_server {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(algorithms)))
            .with_no_client_auth()
    };
    Ok(MakeRustlsConnect::new(config))
}

/// Certificate verifier for `prefer` and `require`: encryption without
/// server authentication.
#[derive(Debug)]
struct AcceptAnyServerCert(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}

/// Timeouts applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on establishing the connection. Zero waits indefinitely.
    pub connect_timeout: Duration,
    /// Server-side `statement_timeout` for every rule query. Zero disables it.
    pub query_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// A live PostgreSQL session used for one diagnostic pass.
pub struct PgDatabase {
    client: Client,
    query_timeout: Duration,
}

impl PgDatabase {
    /// Connect using resolved parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connect`] if the server is unreachable or rejects
    /// the login, or if the session settings cannot be applied.
    pub fn connect(params: &ConnectParams, options: ConnectOptions) -> Result<Self, DbError> {
        let config = params.to_pg_config(options.connect_timeout)?;
        let tls = tls_connector(params.ssl_policy()?.verify_server)?;
        Self::from_config(&config, &params.target(), tls, options)
    }

    /// Connect using an already built `postgres::Config` and TLS connector.
    ///
    /// # Errors
    ///
    /// Same as [`PgDatabase::connect`].
    pub fn from_config(
        config: &postgres::Config,
        target: &str,
        tls: MakeRustlsConnect,
        options: ConnectOptions,
    ) -> Result<Self, DbError> {
        log::debug!("connecting to {target} (sslmode {:?})", config.get_ssl_mode());
        let mut client = config.connect(tls).map_err(|source| DbError::Connect {
            target: target.to_owned(),
            source,
        })?;

        let session = format!(
            "SET default_transaction_read_only = on; SET statement_timeout = {}",
            options.query_timeout.as_millis()
        );
        client
            .batch_execute(&session)
            .map_err(|source| DbError::Connect {
                target: target.to_owned(),
                source,
            })?;

        Ok(Self {
            client,
            query_timeout: options.query_timeout,
        })
    }

    fn classify(&self, err: &postgres::Error) -> DbError {
        if err.code() == Some(&SqlState::QUERY_CANCELED) {
            return DbError::Timeout(self.query_timeout);
        }
        match err.as_db_error() {
            Some(db) => DbError::Query(db.message().to_owned()),
            None => DbError::Query(err.to_string()),
        }
    }
}

impl Database for PgDatabase {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|err| self.classify(&err))?;

        let rows = messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    row.columns()
                        .iter()
                        .enumerate()
                        .map(|(idx, column)| {
                            (column.name().to_owned(), row.get(idx).map(str::to_owned))
                        })
                        .collect::<Row>(),
                ),
                _ => None,
            })
            .collect();
        Ok(rows)
    }
}

/// Quote a string as an SQL literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
