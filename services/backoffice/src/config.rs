use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ACCESS_TOKEN_MINUTES: u64 = 60;
pub const DEFAULT_REFRESH_TOKEN_MINUTES: u64 = 7 * 24 * 60;
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCK_MINUTES: u64 = 15;
pub const DEFAULT_JWT_ISSUER: &str = "artweb-backoffice";
/// Character classes (lower, upper, digit, other) a new password must mix.
pub const DEFAULT_PASSWORD_STRENGTH: u8 = 2;

// Backoffice configuration sourced from environment variables, optionally
// overridden by a YAML file named in ARTWEB_CONFIG.
#[derive(Debug, Clone)]
pub struct BackofficeConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub request_timeout_ms: u64,
    pub security: SecurityConfig,
    pub admin: Option<AdminSeedConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unsupported storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_minutes: u64,
    pub refresh_token_minutes: u64,
    pub max_failed_attempts: u32,
    pub lock_minutes: u64,
    pub password_strength: u8,
    /// Peers whose `x-forwarded-for` header is believed. Empty trusts nobody.
    pub trusted_proxies: Vec<IpAddr>,
}

impl SecurityConfig {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_minutes * 60)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_minutes * 60)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_secs(self.lock_minutes * 60)
    }
}

/// Staff account created at boot when no user with `username` exists yet.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeedConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
struct BackofficeConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    request_timeout_ms: Option<u64>,
    security: Option<SecurityOverride>,
    admin: Option<AdminSeedConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityOverride {
    jwt_secret: Option<String>,
    jwt_issuer: Option<String>,
    access_token_minutes: Option<u64>,
    refresh_token_minutes: Option<u64>,
    max_failed_attempts: Option<u32>,
    lock_minutes: Option<u64>,
    password_strength: Option<u8>,
    trusted_proxies: Option<Vec<String>>,
}

fn parse_proxies<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Vec<IpAddr>> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("parse trusted proxy {value}"))
        })
        .collect()
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

impl BackofficeConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("ARTWEB_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .with_context(|| "parse ARTWEB_BIND")?;
        let metrics_bind = std::env::var("ARTWEB_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9100".to_string())
            .parse()
            .with_context(|| "parse ARTWEB_METRICS_BIND")?;
        let storage = match std::env::var("ARTWEB_STORAGE") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = match std::env::var("ARTWEB_DATABASE_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse("ARTWEB_PG_MAX_CONNECTIONS", 10)?,
                connect_timeout_ms: env_parse("ARTWEB_PG_CONNECT_TIMEOUT_MS", 5_000)?,
                acquire_timeout_ms: env_parse("ARTWEB_PG_ACQUIRE_TIMEOUT_MS", 5_000)?,
            }),
            Err(_) => None,
        };
        let request_timeout_ms =
            env_parse("ARTWEB_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        let security = SecurityConfig {
            jwt_secret: std::env::var("ARTWEB_JWT_SECRET").unwrap_or_default(),
            jwt_issuer: std::env::var("ARTWEB_JWT_ISSUER")
                .unwrap_or_else(|_| DEFAULT_JWT_ISSUER.to_string()),
            access_token_minutes: env_parse(
                "ARTWEB_ACCESS_TOKEN_MINUTES",
                DEFAULT_ACCESS_TOKEN_MINUTES,
            )?,
            max_failed_attempts: env_parse(
                "ARTWEB_MAX_FAILED_ATTEMPTS",
                DEFAULT_MAX_FAILED_ATTEMPTS,
            )?,
            refresh_token_minutes: env_parse(
                "ARTWEB_REFRESH_TOKEN_MINUTES",
                DEFAULT_REFRESH_TOKEN_MINUTES,
            )?,
            lock_minutes: env_parse("ARTWEB_LOCK_MINUTES", DEFAULT_LOCK_MINUTES)?,
            password_strength: env_parse("ARTWEB_PASSWORD_STRENGTH", DEFAULT_PASSWORD_STRENGTH)?,
            trusted_proxies: match std::env::var("ARTWEB_TRUSTED_PROXIES") {
                Ok(value) => parse_proxies(value.split(','))?,
                Err(_) => Vec::new(),
            },
        };
        let admin = match (
            std::env::var("ARTWEB_ADMIN_USERNAME"),
            std::env::var("ARTWEB_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(AdminSeedConfig { username, password }),
            _ => None,
        };
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            request_timeout_ms,
            security,
            admin,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("ARTWEB_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read ARTWEB_CONFIG: {path}"))?;
            let override_cfg: BackofficeConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse backoffice config yaml")?;
            config.apply(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, override_cfg: BackofficeConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.request_timeout_ms {
            self.request_timeout_ms = value;
        }
        if let Some(security) = override_cfg.security {
            if let Some(value) = security.jwt_secret {
                self.security.jwt_secret = value;
            }
            if let Some(value) = security.jwt_issuer {
                self.security.jwt_issuer = value;
            }
            if let Some(value) = security.access_token_minutes {
                self.security.access_token_minutes = value;
            }
            if let Some(value) = security.max_failed_attempts {
                self.security.max_failed_attempts = value;
            }
            if let Some(value) = security.refresh_token_minutes {
                self.security.refresh_token_minutes = value;
            }
            if let Some(value) = security.lock_minutes {
                self.security.lock_minutes = value;
            }
            if let Some(value) = security.password_strength {
                self.security.password_strength = value;
            }
            if let Some(values) = security.trusted_proxies {
                self.security.trusted_proxies = parse_proxies(values.iter().map(String::as_str))?;
            }
        }
        if let Some(value) = override_cfg.admin {
            self.admin = Some(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.security.jwt_secret.len() < 16 {
            bail!("jwt secret must be at least 16 bytes (set ARTWEB_JWT_SECRET)");
        }
        if self.security.max_failed_attempts == 0 {
            bail!("max_failed_attempts must be positive");
        }
        if !(1..=4).contains(&self.security.password_strength) {
            bail!("password_strength must be between 1 and 4");
        }
        if self.security.refresh_token_minutes <= self.security.access_token_minutes {
            bail!("refresh tokens must outlive access tokens");
        }
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("postgres storage selected but ARTWEB_DATABASE_URL is not set");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    #[test]
    #[serial]
    fn from_env_defaults() {
        let _g1 = EnvGuard::unset("ARTWEB_BIND");
        let _g2 = EnvGuard::unset("ARTWEB_STORAGE");
        let _g6 = EnvGuard::unset("ARTWEB_TRUSTED_PROXIES");
        let _g3 = EnvGuard::unset("ARTWEB_DATABASE_URL");
        let _g4 = EnvGuard::unset("ARTWEB_MAX_FAILED_ATTEMPTS");
        let _g5 = EnvGuard::unset("ARTWEB_ADMIN_USERNAME");

        let config = BackofficeConfig::from_env().expect("config");
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.postgres.is_none());
        assert!(config.admin.is_none());
        assert_eq!(
            config.security.max_failed_attempts,
            DEFAULT_MAX_FAILED_ATTEMPTS
        );
        assert_eq!(
            config.request_timeout(),
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
        assert!(config.security.trusted_proxies.is_empty());
        assert!(config.security.refresh_token_ttl() > config.security.access_token_ttl());
    }

    #[test]
    #[serial]
    fn from_env_reads_postgres_and_security() {
        let _g1 = EnvGuard::set("ARTWEB_STORAGE", "postgres");
        let _g2 = EnvGuard::set("ARTWEB_DATABASE_URL", "postgres://localhost/artweb");
        let _g3 = EnvGuard::set("ARTWEB_LOCK_MINUTES", "30");
        let _g4 = EnvGuard::set("ARTWEB_JWT_SECRET", "0123456789abcdef0123");
        let _g5 = EnvGuard::set("ARTWEB_TRUSTED_PROXIES", "10.0.0.1, ::1");

        let config = BackofficeConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        let pg = config.postgres.as_ref().expect("postgres");
        assert_eq!(pg.url, "postgres://localhost/artweb");
        assert_eq!(pg.max_connections, 10);
        assert_eq!(config.security.lock_duration(), Duration::from_secs(1800));
        assert_eq!(
            config.security.trusted_proxies,
            vec![
                "10.0.0.1".parse::<IpAddr>().expect("v4"),
                "::1".parse::<IpAddr>().expect("v6")
            ]
        );
        config.validate().expect("valid");
    }

    #[test]
    #[serial]
    fn from_env_rejects_bad_values() {
        let _g1 = EnvGuard::set("ARTWEB_BIND", "not-an-addr");
        assert!(BackofficeConfig::from_env().is_err());
        drop(_g1);
        let _g2 = EnvGuard::set("ARTWEB_STORAGE", "sqlite");
        assert!(BackofficeConfig::from_env().is_err());
        drop(_g2);
        let _g3 = EnvGuard::set("ARTWEB_TRUSTED_PROXIES", "10.0.0.1,proxy.internal");
        assert!(BackofficeConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn yaml_override_applies() {
        let _g1 = EnvGuard::unset("ARTWEB_STORAGE");
        let _g2 = EnvGuard::set("ARTWEB_JWT_SECRET", "short");
        let dir = std::env::temp_dir().join(format!("artweb-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("backoffice.yaml");
        fs::write(
            &path,
            "bind_addr: 127.0.0.1:9001\nrequest_timeout_ms: 250\nsecurity:\n  jwt_secret: yaml-secret-0123456789\n  max_failed_attempts: 3\n  trusted_proxies: [\"127.0.0.1\"]\nadmin:\n  username: root\n  password: changeme\n",
        )
        .expect("write");
        let _g3 = EnvGuard::set("ARTWEB_CONFIG", path.to_str().expect("path"));

        let config = BackofficeConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.bind_addr.port(), 9001);
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.security.jwt_secret, "yaml-secret-0123456789");
        assert_eq!(config.security.max_failed_attempts, 3);
        assert_eq!(config.security.trusted_proxies.len(), 1);
        assert_eq!(config.admin.as_ref().map(|a| a.username.as_str()), Some("root"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    #[serial]
    fn validate_rejects_short_secret_and_missing_postgres() {
        let _g1 = EnvGuard::set("ARTWEB_JWT_SECRET", "short");
        let _g2 = EnvGuard::unset("ARTWEB_CONFIG");
        let err = BackofficeConfig::from_env_or_yaml().expect_err("short secret");
        assert!(err.to_string().contains("jwt secret"));

        let _g3 = EnvGuard::set("ARTWEB_JWT_SECRET", "0123456789abcdef0123");
        let _g4 = EnvGuard::set("ARTWEB_STORAGE", "postgres");
        let _g5 = EnvGuard::unset("ARTWEB_DATABASE_URL");
        let err = BackofficeConfig::from_env_or_yaml().expect_err("missing postgres");
        assert!(err.to_string().contains("ARTWEB_DATABASE_URL"));
    }
}
