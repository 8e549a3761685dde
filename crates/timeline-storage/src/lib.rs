//! Object storage backends for `hls-timeline`.
//!
//! - [`StorageConfig`] - Serializable backend selection (local fs or S3)
//! - [`create_operator`] - Builds the OpenDAL operator for a config
//! - [`OpendalGateway`] - The engine's `ObjectStoreGateway` over that operator

pub mod config;
pub mod gateway;
pub mod operator;

pub use config::StorageConfig;
pub use gateway::OpendalGateway;
pub use operator::create_operator;
