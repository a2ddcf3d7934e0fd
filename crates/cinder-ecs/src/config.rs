//! Scene configuration.

use serde::{Deserialize, Serialize};

use crate::SceneError;

/// Tunables for a [`Scene`](crate::scene::Scene).
///
/// ```
/// use cinder_ecs::config::SceneConfig;
///
/// let config = SceneConfig::from_json(r#"{ "initial_pool_capacity": 32 }"#).unwrap();
/// assert_eq!(config.initial_pool_capacity, 32);
/// assert_eq!(config.initial_entity_capacity, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// Slot capacity of a newly created component pool.
    pub initial_pool_capacity: usize,
    /// Capacity of the scene's entity handle pool.
    pub initial_entity_capacity: usize,
}

impl Default for SceneConfig {
    /// 8 slots per new pool, 64 entities.
    fn default() -> Self {
        Self {
            initial_pool_capacity: 8,
            initial_entity_capacity: 64,
        }
    }
}

impl SceneConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let config: SceneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every capacity is non-zero.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.initial_pool_capacity == 0 {
            return Err(SceneError::InvalidConfig(
                "initial_pool_capacity must be positive".to_owned(),
            ));
        }
        if self.initial_entity_capacity == 0 {
            return Err(SceneError::InvalidConfig(
                "initial_entity_capacity must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
