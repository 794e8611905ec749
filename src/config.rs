//! Typed access to the environment options recognized by the storage backend.
//!
//! Plain `std::env::var` reads with tolerant defaults, no third-party config
//! crate. Options that belong to the RPC/CLI layer (`SERVERPORT`) are
//! intentionally not read here; they are external collaborator territory.

use std::env;

/// Database connection parameters, read from `PGHOST`/`PGPORT`/`PGUSER`/`PGPASSWORD`/
/// `PGDBNAME` rather than a single pre-assembled `DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PGPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5433),
            user: env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("PGPASSWORD").unwrap_or_default(),
            dbname: env::var("PGDBNAME").unwrap_or_else(|_| "data".to_string()),
        }
    }

    /// Builds the `sqlx::postgres::PgConnectOptions` equivalent connection string.
    /// TLS is left at the driver default (disabled), matching `sslmode=disable`
    /// for local development.
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

/// Retention/cleanup and write-limit options.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub db: DbConfig,
    /// Minimum seconds between retention runs (`CLEANUPINTERVAL`, default 86400).
    pub cleanup_interval_secs: i64,
    /// Max observations accepted in a single `put_observations` call (`PUTOBSLIMIT`,
    /// default 100000).
    pub put_obs_limit: usize,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            db: DbConfig::from_env(),
            cleanup_interval_secs: parse_env_or("CLEANUPINTERVAL", 86400),
            put_obs_limit: parse_env_or::<i64>("PUTOBSLIMIT", 100000).max(1) as usize,
        }
    }
}

/// Parses an environment variable as `T`, logging a warning and falling back to
/// `default` on a missing or unparsable value.
fn parse_env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(
                "failed to parse {name}={raw:?} as the expected type; falling back to default {default}"
            );
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_config_defaults() {
        // NOTE: mutating process env in tests races with other tests in this binary;
        // this test only reads variables that are unset by default in CI.
        unsafe {
            env::remove_var("PGHOST");
            env::remove_var("PGPORT");
            env::remove_var("PGDBNAME");
        }
        let cfg = DbConfig::from_env();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.dbname, "data");
    }

    #[test]
    fn parse_env_or_falls_back_on_garbage() {
        unsafe {
            env::set_var("MET_OBS_TEST_GARBAGE", "not-a-number");
        }
        let v: i64 = parse_env_or("MET_OBS_TEST_GARBAGE", 42);
        assert_eq!(v, 42);
        unsafe {
            env::remove_var("MET_OBS_TEST_GARBAGE");
        }
    }

    #[test]
    fn parse_env_or_uses_default_when_unset() {
        unsafe {
            env::remove_var("MET_OBS_TEST_UNSET");
        }
        let v: i64 = parse_env_or("MET_OBS_TEST_UNSET", 7);
        assert_eq!(v, 7);
    }
}
