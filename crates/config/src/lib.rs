//! Shared configuration for the sculpting core
//!
//! This crate is the single source of truth for the tunables shared by the
//! sculpting session: how many undo steps are kept, how the picking BVH is
//! shaped, and which tool settings a fresh session starts with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of undo records kept before the oldest is evicted
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default number of faces stored in one BVH leaf
pub const DEFAULT_LEAF_SIZE: usize = 4;

/// Fraction of faces touched by a stroke above which the BVH is rebuilt
/// instead of refitted
pub const DEFAULT_REFIT_LIMIT: f32 = 0.25;

/// Default brush radius in mesh units
pub const DEFAULT_RADIUS: f32 = 0.25;

/// Default brush intensity (0.0 to 1.0)
pub const DEFAULT_INTENSITY: f32 = 0.5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("history.max_records must be at least 1")]
    EmptyHistory,
    #[error("spatial.leaf_size must be at least 1")]
    EmptyLeaf,
    #[error("spatial.refit_limit must be within [0, 1], got {0}")]
    RefitLimit(f32),
    #[error("tools.{field} must be non-negative, got {value}")]
    NegativeTool { field: &'static str, value: f32 },
}

/// Undo/redo history bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of records; the oldest is evicted on overflow
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Picking BVH tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Faces per leaf before a node is split
    pub leaf_size: usize,
    /// Touched-face fraction above which a stroke triggers a full rebuild
    pub refit_limit: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
            refit_limit: DEFAULT_REFIT_LIMIT,
        }
    }
}

/// Tool settings a new session starts with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolDefaults {
    pub radius: f32,
    pub intensity: f32,
    pub symmetry: bool,
    pub continuous: bool,
    /// Paint color (linear RGB)
    pub color: [f32; 3],
    /// Paint material (roughness, metalness)
    pub material: [f32; 2],
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            intensity: DEFAULT_INTENSITY,
            symmetry: true,
            continuous: false,
            color: [1.0, 0.2, 0.2],
            material: [0.18, 0.08],
        }
    }
}

/// Top-level sculpting configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SculptConfig {
    pub history: HistoryConfig,
    pub spatial: SpatialConfig,
    pub tools: ToolDefaults,
}

impl SculptConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.max_records == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        if self.spatial.leaf_size == 0 {
            return Err(ConfigError::EmptyLeaf);
        }
        if !(0.0..=1.0).contains(&self.spatial.refit_limit) {
            return Err(ConfigError::RefitLimit(self.spatial.refit_limit));
        }
        for (field, value) in [
            ("radius", self.tools.radius),
            ("intensity", self.tools.intensity),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeTool { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SculptConfig::default();
        assert_eq!(config.history.max_records, DEFAULT_MAX_HISTORY);
        assert_eq!(config.spatial.leaf_size, DEFAULT_LEAF_SIZE);
        assert_eq!(config.tools.radius, DEFAULT_RADIUS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SculptConfig::from_json_str(r#"{ "history": { "max_records": 8 } }"#).unwrap();
        assert_eq!(config.history.max_records, 8);
        assert_eq!(config.spatial.leaf_size, DEFAULT_LEAF_SIZE);
        assert_eq!(config.tools.intensity, DEFAULT_INTENSITY);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = SculptConfig::default();
        config.tools.symmetry = false;
        config.spatial.refit_limit = 0.5;
        let json = config.to_json_string().unwrap();
        assert_eq!(SculptConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            SculptConfig::from_json_str(r#"{ "history": { "max_records": 0 } }"#),
            Err(ConfigError::EmptyHistory)
        ));
        assert!(matches!(
            SculptConfig::from_json_str(r#"{ "spatial": { "refit_limit": 2.0 } }"#),
            Err(ConfigError::RefitLimit(_))
        ));
        assert!(matches!(
            SculptConfig::from_json_str(r#"{ "tools": { "radius": -1.0 } }"#),
            Err(ConfigError::NegativeTool { field: "radius", .. })
        ));
        assert!(matches!(
            SculptConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
