//! Portal configuration.
//!
//! Values are layered: built-in defaults, then an optional `portal.toml` /
//! `portal.yaml` (or the file passed on the command line), then `PORTAL__*`
//! environment variables. A `.env` file is loaded first when present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_SESSION_TTL_HOURS: u32 = 24 * 365 * 10;
const MAX_SIGNED_URL_TTL_SECS: u64 = 60 * 60 * 24 * 365 * 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Directory holding the database, object buckets and logs.
    pub data_dir: PathBuf,
    pub bind_addr: String,
    /// Base used when building public and signed object URLs.
    pub public_base_url: String,
    /// Canonical site origin advertised in `robots.txt` and `sitemap.xml`.
    pub site_url: String,
    pub calendar_url: String,
    pub session_ttl_hours: u32,
    pub signed_url_ttl_secs: u64,
    /// Base64 of 32 bytes. A random key is generated per process when unset.
    #[serde(default)]
    pub url_signing_key: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bind_addr: "127.0.0.1:8080".to_string(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
            site_url: "https://caro-consulting-webapp.vercel.app".to_string(),
            calendar_url: "https://calendly.com/s-caro-alvarado/30min".to_string(),
            session_ttl_hours: 24 * 7,
            signed_url_ttl_secs: 3_600,
            url_signing_key: None,
        }
    }
}

impl PortalConfig {
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?
            .set_default("bind_addr", defaults.bind_addr)?
            .set_default("public_base_url", defaults.public_base_url)?
            .set_default("site_url", defaults.site_url)?
            .set_default("calendar_url", defaults.calendar_url)?
            .set_default("session_ttl_hours", i64::from(defaults.session_ttl_hours))?
            .set_default("signed_url_ttl_secs", defaults.signed_url_ttl_secs as i64)?;

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("portal").required(false)),
        };

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PORTAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session_ttl_hours == 0 || self.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            anyhow::bail!(
                "session_ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS,
                self.session_ttl_hours
            );
        }
        if self.signed_url_ttl_secs == 0 || self.signed_url_ttl_secs > MAX_SIGNED_URL_TTL_SECS {
            anyhow::bail!(
                "signed_url_ttl_secs must be between 1 and {}, got {}",
                MAX_SIGNED_URL_TTL_SECS,
                self.signed_url_ttl_secs
            );
        }
        if !self.public_base_url.starts_with("http://") && !self.public_base_url.starts_with("https://") {
            anyhow::bail!("public_base_url must be an http(s) url, got {}", self.public_base_url);
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("portal.sqlite")
    }

    pub fn storage_root(&self) -> PathBuf {
        self.data_dir.join("storage")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PortalConfig::default();
        config.validate().expect("defaults validate");
        assert!(config.database_path().ends_with("portal.sqlite"));
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("portal.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/portal\"\nsession_ttl_hours = 12\ncalendar_url = \"https://cal.example/30min\"\n",
        )
        .expect("write config");

        let config = PortalConfig::load(Some(&path)).expect("load");
        assert_eq!(config.data_dir, PathBuf::from("/srv/portal"));
        assert_eq!(config.session_ttl_hours, 12);
        assert_eq!(config.calendar_url, "https://cal.example/30min");
        assert_eq!(config.signed_url_ttl_secs, 3_600);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = PortalConfig {
            public_base_url: "ftp://files".to_string(),
            ..PortalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_ttls_beyond_ten_years() {
        let session = PortalConfig {
            session_ttl_hours: u32::MAX,
            ..PortalConfig::default()
        };
        assert!(session.validate().is_err());

        let signed = PortalConfig {
            signed_url_ttl_secs: u64::MAX,
            ..PortalConfig::default()
        };
        assert!(signed.validate().is_err());

        let longest = PortalConfig {
            session_ttl_hours: MAX_SESSION_TTL_HOURS,
            signed_url_ttl_secs: MAX_SIGNED_URL_TTL_SECS,
            ..PortalConfig::default()
        };
        longest.validate().expect("ten years is allowed");
    }
}
