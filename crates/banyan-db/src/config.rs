use std::env;

/// Database configuration.
///
/// Reads from the `BANYAN_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/banyan` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/banyan";

    /// Build a config from the environment.
    ///
    /// Priority: `BANYAN_DATABASE_URL` env var, then the compile-time default.
    pub fn from_env() -> Self {
        let database_url =
            env::var("BANYAN_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Extract the database name from the URL.
    ///
    /// Returns `None` if the URL cannot be parsed or has no path component.
    pub fn database_name(&self) -> Option<&str> {
        self.database_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target DB does not
    /// yet exist.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let mut url = self.database_url[..pos].to_owned();
                url.push_str("/postgres");
                url
            }
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Server-wide configuration pulled from the environment.
///
/// Separate from [`DbConfig`] because the HTTP bind address has nothing to
/// do with persistence, but both are read the same way so operators only
/// have to learn one convention.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub port: u16,
    pub bind: String,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 5100;

    pub fn from_env() -> Self {
        let port = env::var("BANYAN_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_PORT);
        let bind = env::var("BANYAN_BIND").unwrap_or_else(|_| "0.0.0.0".to_owned());
        Self {
            db: DbConfig::from_env(),
            port,
            bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/banyan");
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/banyan");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://localhost:5432/postgres"
        );
    }

    #[test]
    fn explicit_new() {
        let cfg = DbConfig::new("postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_url, "postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_name(), Some("other"));
    }

    #[test]
    fn server_config_default_port() {
        // SAFETY: test runs single-threaded w.r.t. this var via serial env access.
        unsafe {
            std::env::remove_var("BANYAN_PORT");
        }
        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.port, ServerConfig::DEFAULT_PORT);
    }
}
