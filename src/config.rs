use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least 32 characters long")]
    WeakSecret,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct HostedIdentityConfig {
    pub url: String,
    pub anon_key: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bind_addr: String,
    /// Public site origin; password reset links land on `{site_url}/reset-password`.
    pub site_url: String,
    pub frontend_url: Option<String>,
    pub data_dir: PathBuf,
    pub media_base_url: String,
    pub enable_hsts: bool,
    /// Fabricate a profile from the token when the profile row/table is missing.
    pub demo_fallback: bool,
    pub forum_page_size: usize,
    pub identity: Option<HostedIdentityConfig>,
    pub s3: Option<S3Config>,
    pub database_url: Option<String>,
}

const MIN_SECRET_LEN: usize = 32;

fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: v }),
        },
    }
}

fn number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let jwt_ttl_hours: i64 = number("JWT_TTL_HOURS", 24)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::Invalid { name: "JWT_TTL_HOURS", value: jwt_ttl_hours.to_string() });
        }
        let forum_page_size: usize = number("FORUM_PAGE_SIZE", 10)?;
        if forum_page_size == 0 {
            return Err(ConfigError::Invalid { name: "FORUM_PAGE_SIZE", value: "0".into() });
        }

        // hosted identity only when all three are present
        let identity = match (var("IDENTITY_URL"), var("IDENTITY_ANON_KEY"), var("IDENTITY_SERVICE_KEY")) {
            (Some(url), Some(anon_key), Some(service_key)) => Some(HostedIdentityConfig { url, anon_key, service_key }),
            (Some(_), _, _) => return Err(ConfigError::Missing("IDENTITY_ANON_KEY / IDENTITY_SERVICE_KEY")),
            _ => None,
        };

        let s3 = var("S3_ENDPOINT").map(|endpoint| S3Config {
            endpoint,
            bucket: var("S3_BUCKET").unwrap_or_else(|| "guateabroad-avatars".into()),
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            access_key: var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: var("S3_SECRET_KEY").unwrap_or_default(),
        });

        Ok(AppConfig {
            jwt_secret,
            jwt_ttl_hours,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            site_url: var("SITE_URL").unwrap_or_else(|| "http://localhost:3000".into()).trim_end_matches('/').to_string(),
            frontend_url: var("FRONTEND_URL"),
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            media_base_url: var("MEDIA_BASE_URL").unwrap_or_else(|| "/media".into()).trim_end_matches('/').to_string(),
            enable_hsts: flag("ENABLE_HSTS", false)?,
            demo_fallback: flag("DEMO_FALLBACK", true)?,
            forum_page_size,
            identity,
            s3,
            database_url: var("DATABASE_URL"),
        })
    }

    /// Defaults with the given secret; no env lookups.
    pub fn for_secret(jwt_secret: impl Into<String>) -> Self {
        AppConfig {
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 24,
            bind_addr: "0.0.0.0:8080".into(),
            site_url: "http://localhost:3000".into(),
            frontend_url: None,
            data_dir: PathBuf::from("data"),
            media_base_url: "/media".into(),
            enable_hsts: false,
            demo_fallback: true,
            forum_page_size: 10,
            identity: None,
            s3: None,
            database_url: None,
        }
    }

    /// Frontend page a password reset link opens.
    pub fn password_reset_redirect(&self) -> String {
        format!("{}/auth/reset-password", self.site_url)
    }

    /// Frontend page an email confirmation link opens.
    pub fn confirm_redirect(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn clear() {
        for k in [
            "JWT_SECRET", "JWT_TTL_HOURS", "BIND_ADDR", "SITE_URL", "FRONTEND_URL", "DATA_DIR", "MEDIA_BASE_URL",
            "ENABLE_HSTS", "DEMO_FALLBACK", "FORUM_PAGE_SIZE", "IDENTITY_URL", "IDENTITY_ANON_KEY",
            "IDENTITY_SERVICE_KEY", "S3_ENDPOINT", "S3_BUCKET", "DATABASE_URL",
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    #[serial]
    fn secret_is_required_and_long() {
        clear();
        assert_eq!(AppConfig::from_env().unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        env::set_var("JWT_SECRET", "short");
        assert_eq!(AppConfig::from_env().unwrap_err(), ConfigError::WeakSecret);
        clear();
    }

    #[test]
    #[serial]
    fn defaults() {
        clear();
        env::set_var("JWT_SECRET", SECRET);
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.forum_page_size, 10);
        assert!(cfg.demo_fallback);
        assert!(!cfg.enable_hsts);
        assert!(cfg.identity.is_none());
        assert!(cfg.s3.is_none());
        assert_eq!(cfg.password_reset_redirect(), "http://localhost:3000/auth/reset-password");
        assert_eq!(cfg.confirm_redirect(), "http://localhost:3000/auth/callback");
        clear();
    }

    #[test]
    #[serial]
    fn overrides_and_bad_values() {
        clear();
        env::set_var("JWT_SECRET", SECRET);
        env::set_var("SITE_URL", "https://guateabroad.org/");
        env::set_var("DEMO_FALLBACK", "off");
        env::set_var("S3_ENDPOINT", "http://minio:9000");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.site_url, "https://guateabroad.org");
        assert_eq!(cfg.password_reset_redirect(), "https://guateabroad.org/auth/reset-password");
        assert!(!cfg.demo_fallback);
        assert_eq!(cfg.s3.unwrap().bucket, "guateabroad-avatars");

        env::set_var("FORUM_PAGE_SIZE", "ten");
        assert!(matches!(AppConfig::from_env(), Err(ConfigError::Invalid { name: "FORUM_PAGE_SIZE", .. })));
        env::remove_var("FORUM_PAGE_SIZE");

        env::set_var("IDENTITY_URL", "http://auth.local");
        assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing(_))));
        clear();
    }
}
