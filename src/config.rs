// Copyright 2026 The pathkit authors.

//! Environment-variable configuration (spec.md C20 / §6).
//!
//! Reads exactly the variable names spec.md §6 lists as the external
//! contract; profile-scoped variants (`<PROFILE>__HDFS_*`) override the
//! unscoped ones when a profile is requested.

use std::collections::HashMap;
use std::env;

/// AWS/S3 credentials and endpoint, read from the environment.
#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Config {
    pub fn from_env() -> Self {
        S3Config {
            endpoint: env::var("OSS_ENDPOINT").ok(),
            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
        }
    }
}

/// WebHDFS connection details, optionally scoped to a named profile.
#[derive(Clone, Debug, Default)]
pub struct HdfsConfig {
    pub user: Option<String>,
    pub url: Option<String>,
    pub root: Option<String>,
    pub timeout_secs: Option<u64>,
    pub token: Option<String>,
    pub config_path: Option<String>,
}

impl HdfsConfig {
    pub fn from_env(profile: Option<&str>) -> Self {
        let get = |key: &str| -> Option<String> {
            if let Some(profile) = profile {
                if let Ok(v) = env::var(format!("{}__{key}", profile.to_ascii_uppercase())) {
                    return Some(v);
                }
            }
            env::var(key).ok()
        };
        HdfsConfig {
            user: get("HDFS_USER"),
            url: get("HDFS_URL"),
            root: get("HDFS_ROOT"),
            timeout_secs: get("HDFS_TIMEOUT").and_then(|s| s.parse().ok()),
            token: get("HDFS_TOKEN"),
            config_path: get("HDFS_CONFIG_PATH"),
        }
    }
}

/// SFTP authentication details.
#[derive(Clone, Debug, Default)]
pub struct SftpConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_path: Option<String>,
    pub private_key_type: Option<String>,
    pub private_key_password: Option<String>,
}

impl SftpConfig {
    pub fn from_env() -> Self {
        SftpConfig {
            username: env::var("SFTP_USERNAME").ok(),
            password: env::var("SFTP_PASSWORD").ok(),
            private_key_path: env::var("SFTP_PRIVATE_KEY_PATH").ok(),
            private_key_type: env::var("SFTP_PRIVATE_KEY_TYPE").ok(),
            private_key_password: env::var("SFTP_PRIVATE_KEY_PASSWORD").ok(),
        }
    }
}

/// WebDAV authentication details.
#[derive(Clone, Debug, Default)]
pub struct WebdavConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub token_command: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl WebdavConfig {
    pub fn from_env() -> Self {
        WebdavConfig {
            username: env::var("WEBDAV_USERNAME").ok(),
            password: env::var("WEBDAV_PASSWORD").ok(),
            token: env::var("WEBDAV_TOKEN").ok(),
            token_command: env::var("WEBDAV_TOKEN_COMMAND").ok(),
            timeout_secs: env::var("WEBDAV_TIMEOUT").ok().and_then(|s| s.parse().ok()),
        }
    }
}

/// All environment-derived configuration gathered at startup.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub s3: S3Config,
    pub sftp: SftpConfig,
    pub webdav: WebdavConfig,
    /// HDFS config per profile name; the unscoped default lives under `""`.
    pub hdfs_profiles: HashMap<String, HdfsConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut hdfs_profiles = HashMap::new();
        hdfs_profiles.insert(String::new(), HdfsConfig::from_env(None));
        Config {
            s3: S3Config::from_env(),
            sftp: SftpConfig::from_env(),
            webdav: WebdavConfig::from_env(),
            hdfs_profiles,
        }
    }

    pub fn hdfs(&self, profile: Option<&str>) -> HdfsConfig {
        match profile {
            Some(p) => HdfsConfig::from_env(Some(p)),
            None => self
                .hdfs_profiles
                .get("")
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Default directory searched for `aliases.conf` / `aliases.toml`:
    /// `$XDG_CONFIG_HOME/pathkit` or platform equivalent.
    pub fn default_config_dir() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pathkit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdfs_profile_variant_overrides_unscoped() {
        std::env::set_var("HDFS_URL", "http://default:9870");
        std::env::set_var("PROD__HDFS_URL", "http://prod:9870");
        let cfg = HdfsConfig::from_env(Some("prod"));
        assert_eq!(cfg.url.as_deref(), Some("http://prod:9870"));
        let cfg = HdfsConfig::from_env(Some("staging"));
        assert_eq!(cfg.url.as_deref(), Some("http://default:9870"));
        std::env::remove_var("HDFS_URL");
        std::env::remove_var("PROD__HDFS_URL");
    }
}
