// ABOUTME: Codec configuration: serializability enforcement, handle table sizing and decode guards.
// ABOUTME: Loadable from partial JSON documents; missing keys keep their defaults.

use crate::error::{Error, Result};
use crate::types::limits;
use serde::{Deserialize, Serialize};

/// Configuration shared by encoders and decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarshallerConfig {
    /// Refuse classes registered as not serializable (default: true)
    pub require_serializable: bool,
    /// Initial capacity of the handle table
    pub initial_handle_capacity: usize,
    /// Maximum nesting of described values
    pub max_depth: usize,
    /// Maximum element count of a decoded collection or array
    pub max_collection_size: usize,
}

impl Default for MarshallerConfig {
    fn default() -> Self {
        Self {
            require_serializable: true,
            initial_handle_capacity: limits::INITIAL_HANDLE_CAPACITY,
            max_depth: limits::MAX_DEPTH,
            max_collection_size: limits::MAX_COLLECTION_SIZE,
        }
    }
}

impl MarshallerConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarshallerConfig::default();
        assert!(config.require_serializable);
        assert_eq!(config.initial_handle_capacity, 16);
        assert_eq!(config.max_depth, limits::MAX_DEPTH);
        assert_eq!(config.max_collection_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json() {
        let config = MarshallerConfig::from_json(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert!(config.require_serializable);
    }

    #[test]
    fn test_invalid_json() {
        let err = MarshallerConfig::from_json(r#"{"max_depth": "deep"}"#).unwrap_err();
        assert_eq!(err.error_type(), "config");
        assert!(MarshallerConfig::from_json(r#"{"colour": 1}"#).is_err());
        assert!(MarshallerConfig::from_json(r#"{"max_depth": 0}"#).is_err());
    }
}
