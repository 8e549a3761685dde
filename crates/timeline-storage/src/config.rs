use serde::{Deserialize, Serialize};

/// Where the bucket folders live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem, e.g. a synced copy of the archive
    Fs {
        #[serde(default = "default_fs_root")]
        root: String,
    },
    /// AWS S3 compatible storage
    S3 {
        bucket: String,
        /// Root path within bucket
        #[serde(default = "default_s3_root")]
        root: String,
        #[serde(default)]
        region: Option<String>,
        /// Custom endpoint for S3-compatible services
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
        /// Session token for temporary credentials
        #[serde(default)]
        session_token: Option<String>,
        /// Unsigned requests, for public archives
        #[serde(default)]
        anonymous: bool,
        /// Disable config/credential auto-loading
        #[serde(default)]
        disable_config_load: bool,
        #[serde(default)]
        enable_virtual_host_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Fs {
            root: default_fs_root(),
        }
    }
}

fn default_fs_root() -> String {
    "./archive".to_string()
}

fn default_s3_root() -> String {
    "/".to_string()
}
