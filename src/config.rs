//! Connection descriptor, validation and defaults.
//!
//! A [`ConnectionConfig`] is what callers fill in. [`ConnectionConfig::resolve`]
//! validates it and produces [`ConnectionSettings`], the fully defaulted form
//! the connection pool works from. Validation is policy, not transport: a
//! privileged port or an empty password are rejected here even though the
//! store itself might accept them.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for establishing a TCP connection
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for reading one reply
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for writing one command
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Default time to wait for a free pooled connection
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for one facade operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Lowest port accepted; privileged ports are refused by policy
pub const MIN_PORT: u32 = 1024;

/// Highest valid TCP port
pub const MAX_PORT: u32 = 65535;

const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Errors raised while validating a [`ConnectionConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host is required")]
    MissingHost,

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error("port is required")]
    MissingPort,

    #[error("port must be in range 1-65535, got: {0}")]
    PortOutOfRange(u32),

    #[error("port must be >= 1024 (privileged ports are not allowed), got: {0}")]
    PrivilegedPort(u32),

    #[error("password is required")]
    MissingPassword,

    #[error("db must be >= 0, got: {0}")]
    NegativeDb(i64),
}

/// Tuning knobs. Any knob left at zero receives its default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub pool_size: usize,
    pub pool_timeout: Duration,
    /// Deadline applied to every facade operation
    pub operation_timeout: Duration,
}

impl ConnectionOptions {
    /// Returns a copy with every zero-valued knob replaced by its default.
    pub fn with_defaults(&self) -> Self {
        fn or(value: Duration, default: Duration) -> Duration {
            if value.is_zero() {
                default
            } else {
                value
            }
        }

        Self {
            dial_timeout: or(self.dial_timeout, DEFAULT_DIAL_TIMEOUT),
            read_timeout: or(self.read_timeout, DEFAULT_READ_TIMEOUT),
            write_timeout: or(self.write_timeout, DEFAULT_WRITE_TIMEOUT),
            pool_size: if self.pool_size == 0 {
                DEFAULT_POOL_SIZE
            } else {
                self.pool_size
            },
            pool_timeout: or(self.pool_timeout, DEFAULT_POOL_TIMEOUT),
            operation_timeout: or(self.operation_timeout, DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

/// Connection descriptor supplied by the caller.
///
/// `port` and `db` are wider than the wire types so that out-of-range input
/// can be reported instead of silently wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u32,
    /// ACL user name; `None` authenticates with the password only
    pub user: Option<String>,
    pub password: String,
    pub db: i64,
    pub options: ConnectionOptions,
}

impl ConnectionConfig {
    /// Creates a descriptor with default options and db 0.
    pub fn new(host: impl Into<String>, port: u32, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks every rule and reports the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if !is_valid_host(&self.host) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::MissingPort);
        }
        if self.port > MAX_PORT {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        if self.port < MIN_PORT {
            return Err(ConfigError::PrivilegedPort(self.port));
        }

        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }

        if self.db < 0 {
            return Err(ConfigError::NegativeDb(self.db));
        }

        Ok(())
    }

    /// Validates the descriptor and applies defaults.
    pub fn resolve(&self) -> Result<ConnectionSettings, ConfigError> {
        self.validate()?;

        let options = self.options.with_defaults();
        Ok(ConnectionSettings {
            addr: format!("{}:{}", self.host, self.port),
            user: self.user.clone().filter(|u| !u.is_empty()),
            password: self.password.clone(),
            db: self.db,
            dial_timeout: options.dial_timeout,
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
            pool_size: options.pool_size,
            pool_timeout: options.pool_timeout,
            operation_timeout: options.operation_timeout,
        })
    }
}

/// A validated, fully defaulted descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub addr: String,
    pub user: Option<String>,
    pub password: String,
    pub db: i64,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub pool_size: usize,
    pub pool_timeout: Duration,
    pub operation_timeout: Duration,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("pool_size", &self.pool_size)
            .field("pool_timeout", &self.pool_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// Accepts `localhost`, literal IPv4/IPv6 addresses and DNS names.
fn is_valid_host(host: &str) -> bool {
    if host == "localhost" || host.parse::<IpAddr>().is_ok() {
        return true;
    }

    if host.len() > MAX_HOST_LEN {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
