//! Configuration for pg-schema-cache.
//!
//! Settings come from CLI arguments with environment-variable fallbacks.
//! They cover the connection pool bounds, the internal timeouts, and the
//! catalog-exclusion policy applied during schema crawls.

use std::time::Duration;

use clap::Parser;
use tracing::warn;

pub const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
pub const DEFAULT_MIN_OPEN_CONNS: u32 = 2;
pub const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 3600;
pub const DEFAULT_CONN_MAX_IDLE_SECS: u64 = 1800;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Schema namespaces excluded from every crawl regardless of configuration.
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Configuration parsed from CLI arguments and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "pg-schema-cache", version)]
pub struct Config {
    /// Maximum open connections per pool
    #[arg(long, default_value_t = DEFAULT_MAX_OPEN_CONNS, env = "DB_MAX_OPEN_CONNS")]
    pub max_open_conns: u32,

    /// Minimum open connections per pool
    #[arg(long, default_value_t = DEFAULT_MIN_OPEN_CONNS, env = "DB_MIN_OPEN_CONNS")]
    pub min_open_conns: u32,

    /// Maximum lifetime of a pooled connection in seconds
    #[arg(long, default_value_t = DEFAULT_CONN_MAX_LIFETIME_SECS, env = "DB_CONN_MAX_LIFETIME")]
    pub conn_max_lifetime_secs: u64,

    /// Maximum idle time of a pooled connection in seconds
    #[arg(long, default_value_t = DEFAULT_CONN_MAX_IDLE_SECS, env = "DB_CONN_MAX_IDLE_TIME")]
    pub conn_max_idle_secs: u64,

    /// Pool construction / connection acquire timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "DB_CONNECT_TIMEOUT")]
    pub connect_timeout_secs: u64,

    /// Per-statement execution timeout in seconds
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS, env = "DB_QUERY_TIMEOUT")]
    pub query_timeout_secs: u64,

    /// Additional schema names excluded from crawls (comma separated)
    #[arg(
        long = "exclude-schema",
        value_name = "NAME",
        env = "CRAWL_EXCLUDED_SCHEMAS",
        value_delimiter = ','
    )]
    pub excluded_schemas: Vec<String>,

    /// Schema name prefixes excluded from crawls (comma separated)
    #[arg(
        long = "exclude-schema-prefix",
        value_name = "PREFIX",
        env = "CRAWL_EXCLUDED_SCHEMA_PREFIXES",
        value_delimiter = ','
    )]
    pub excluded_schema_prefixes: Vec<String>,

    /// Table name prefixes excluded from crawls (comma separated)
    #[arg(
        long = "exclude-table-prefix",
        value_name = "PREFIX",
        env = "CRAWL_EXCLUDED_TABLE_PREFIXES",
        value_delimiter = ','
    )]
    pub excluded_table_prefixes: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            min_open_conns: DEFAULT_MIN_OPEN_CONNS,
            conn_max_lifetime_secs: DEFAULT_CONN_MAX_LIFETIME_SECS,
            conn_max_idle_secs: DEFAULT_CONN_MAX_IDLE_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            excluded_schemas: Vec::new(),
            excluded_schema_prefixes: Vec::new(),
            excluded_table_prefixes: Vec::new(),
            log_level: "info".to_string(),
        }
    }

    /// Pool bounds and timeouts, with `min > max` clamped down.
    pub fn pool_settings(&self) -> PoolSettings {
        let mut min_open = self.min_open_conns;
        if min_open > self.max_open_conns {
            warn!(
                min = min_open,
                max = self.max_open_conns,
                "min_open_conns exceeds max_open_conns, clamping"
            );
            min_open = self.max_open_conns;
        }
        PoolSettings {
            max_open: self.max_open_conns,
            min_open,
            max_lifetime: Duration::from_secs(self.conn_max_lifetime_secs),
            max_idle_time: Duration::from_secs(self.conn_max_idle_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }

    /// The catalog-exclusion policy for schema crawls.
    pub fn catalog_filter(&self) -> CatalogFilter {
        let mut filter = CatalogFilter::default();
        filter
            .excluded_schemas
            .extend(self.excluded_schemas.iter().cloned());
        filter
            .excluded_schema_prefixes
            .extend(self.excluded_schema_prefixes.iter().cloned());
        filter
            .excluded_table_prefixes
            .extend(self.excluded_table_prefixes.iter().cloned());
        filter
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Bounds applied to every connection pool the service constructs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_open: u32,
    pub min_open: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Config::default_config().pool_settings()
    }
}

/// Which schemas and tables a crawl skips.
///
/// System namespaces (`pg_catalog`, `information_schema`, `pg_toast`, and
/// anything starting with `pg_`) are always excluded. The configurable lists
/// handle extension-internal and scratch namespaces on top of that.
#[derive(Debug, Clone)]
pub struct CatalogFilter {
    pub excluded_schemas: Vec<String>,
    pub excluded_schema_prefixes: Vec<String>,
    pub excluded_table_prefixes: Vec<String>,
}

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            excluded_schemas: Vec::new(),
            // temp: scratch namespaces; topology: PostGIS internals
            excluded_schema_prefixes: vec!["temp".to_string(), "topolo".to_string()],
            // spatial_ref_sys and friends from PostGIS
            excluded_table_prefixes: vec!["spatia".to_string()],
        }
    }
}

impl CatalogFilter {
    /// A filter excluding only the hard system namespaces.
    pub fn permissive() -> Self {
        Self {
            excluded_schemas: Vec::new(),
            excluded_schema_prefixes: Vec::new(),
            excluded_table_prefixes: Vec::new(),
        }
    }

    /// Whether a schema participates in the crawl.
    pub fn allows_schema(&self, name: &str) -> bool {
        if SYSTEM_SCHEMAS.contains(&name) || name.starts_with("pg_") {
            return false;
        }
        if self.excluded_schemas.iter().any(|s| s == name) {
            return false;
        }
        !self
            .excluded_schema_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }

    /// Whether a table participates in the crawl.
    pub fn allows_table(&self, name: &str) -> bool {
        !self
            .excluded_table_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }
}
