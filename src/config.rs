//! Orchestrator configuration
//!
//! Configuration is a nested YAML document mirroring the matchmaker
//! platform's shared config layout. Every option has a default, so a missing
//! or partial file still yields a runnable configuration; the caller decides
//! whether a load failure is worth more than a warning.

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// State storage endpoint.
    pub redis: RedisConfig,
    /// Profile and proposal queue settings.
    pub queues: QueuesConfig,
    /// Timing knobs for the evaluator trigger.
    pub interval: IntervalConfig,
    /// Fallback container images.
    pub default_images: DefaultImagesConfig,
    /// Paths into schema-free payloads read by the orchestrator.
    pub jsonkeys: JsonKeysConfig,
    /// Enables verbose logging.
    pub debug: bool,
}

/// State storage endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisConfig {
    /// Hostname of the Redis endpoint.
    pub hostname: String,
    /// Port of the Redis endpoint.
    pub port: u16,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            hostname: "redis".to_string(),
            port: 6379,
        }
    }
}

/// Queue names and drain sizing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueuesConfig {
    /// The set of pending profile IDs.
    pub profiles: ProfileQueueConfig,
    /// The collection of match proposals written by workers.
    pub proposals: ProposalQueueConfig,
}

/// Profile queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileQueueConfig {
    /// Key of the profile set in state storage.
    pub name: String,
    /// Maximum number of profile IDs popped per tick.
    pub pull_count: usize,
}

impl Default for ProfileQueueConfig {
    fn default() -> Self {
        Self {
            name: "profileq".to_string(),
            pull_count: 100,
        }
    }
}

/// Proposal queue settings. The orchestrator only ever reads its length.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProposalQueueConfig {
    /// Key of the proposal collection in state storage.
    pub name: String,
}

impl Default for ProposalQueueConfig {
    fn default() -> Self {
        Self {
            name: "proposalq".to_string(),
        }
    }
}

/// Evaluator timing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntervalConfig {
    /// Deadline in seconds after which an evaluator run is forced.
    pub evaluator: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self { evaluator: 10 }
    }
}

/// Fallback images for workers and the evaluator image.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultImagesConfig {
    /// Worker image used when a profile carries no usable image reference.
    pub mmf: ImageRefConfig,
    /// Image the evaluator job runs.
    pub evaluator: ImageRefConfig,
}

impl Default for DefaultImagesConfig {
    fn default() -> Self {
        Self {
            mmf: ImageRefConfig {
                name: "matchforge-mmf".to_string(),
                tag: "latest".to_string(),
            },
            evaluator: ImageRefConfig {
                name: "matchforge-evaluator".to_string(),
                tag: "latest".to_string(),
            },
        }
    }
}

/// A container image reference split into name and tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageRefConfig {
    /// Image name, including any registry prefix.
    pub name: String,
    /// Image tag.
    pub tag: String,
}

impl Default for ImageRefConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            tag: "latest".to_string(),
        }
    }
}

impl ImageRefConfig {
    /// Assemble the `<name>:<tag>` reference passed to the container platform.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Paths into schema-free JSON payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonKeysConfig {
    /// Dotted path within a profile payload holding the MMF image reference(s).
    pub mmf_images: String,
}

impl Default for JsonKeysConfig {
    fn default() -> Self {
        Self {
            mmf_images: "imagename".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))
    }

    /// The Redis URL for the configured state storage endpoint.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis.hostname, self.redis.port)
    }

    /// The fallback worker image list, assembled once at startup.
    pub fn default_mmf_images(&self) -> Vec<String> {
        vec![self.default_images.mmf.reference()]
    }

    /// The evaluator image, assembled once at startup.
    pub fn evaluator_image(&self) -> String {
        self.default_images.evaluator.reference()
    }
}
