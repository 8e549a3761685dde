use anyhow::Result;
use opendal::{Operator, services};
use tracing::info;

use crate::config::StorageConfig;

/// Builds the OpenDAL operator for `config`. Does not touch the network.
pub fn create_operator(config: &StorageConfig) -> Result<Operator> {
    let op = match config {
        StorageConfig::Fs { root } => {
            info!(%root, "Reading archive from the local filesystem");
            Operator::new(services::Fs::default().root(root))?.finish()
        }
        StorageConfig::S3 {
            bucket,
            root,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
            session_token,
            anonymous,
            disable_config_load,
            enable_virtual_host_style,
        } => {
            info!(%bucket, ?region, anonymous, "Reading archive from S3");
            let mut s3 = services::S3::default()
                .bucket(bucket)
                .root(root.trim_start_matches('/'));

            if let Some(region) = region {
                s3 = s3.region(region);
            }
            if let Some(endpoint) = endpoint {
                s3 = s3.endpoint(endpoint);
            }
            if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
                s3 = s3.access_key_id(key_id).secret_access_key(secret);
            }
            if let Some(token) = session_token {
                s3 = s3.session_token(token);
            }
            // Public hydrophone buckets take unsigned requests only.
            if *anonymous {
                s3 = s3.allow_anonymous().disable_ec2_metadata();
            }
            if *disable_config_load {
                s3 = s3.disable_config_load();
            }
            if *enable_virtual_host_style {
                s3 = s3.enable_virtual_host_style();
            }
            Operator::new(s3)?.finish()
        }
    };
    Ok(op)
}
