//! Store connection configuration.

use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

/// Default relational host.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default relational port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default relational database name.
pub const DEFAULT_DB_NAME: &str = "benchmark_db";

/// Default relational user.
pub const DEFAULT_DB_USER: &str = "benchmark_user";

/// Default relational password.
pub const DEFAULT_DB_PASSWORD: &str = "benchmark_pass";

/// Fixed pool size; the pool never grows past it.
pub const DEFAULT_POOL_SIZE: u32 = 20;

/// Default timeout when acquiring a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default document store host.
pub const DEFAULT_ES_HOST: &str = "localhost";

/// Default document store port.
pub const DEFAULT_ES_PORT: u16 = 9200;

/// Relational store configuration.
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// Timeout when acquiring a pooled connection.
    pub acquire_timeout: Duration,
}

impl RelationalConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Driver connect options.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }

    /// `user@host:port/database`, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            database: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub host: String,
    pub port: u16,
}

impl DocumentConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL of the HTTP endpoint, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ES_HOST, DEFAULT_ES_PORT)
    }
}
