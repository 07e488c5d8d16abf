//! Driver configuration.

use serde::{Deserialize, Serialize};
use tagline_types::DiskGeometry;

/// Tunables fixed for the driver's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub geometry: DiskGeometry,
    /// Block cache capacity in entries.
    pub cache_capacity: usize,
    /// Upper bound on any single tagline's length.
    pub max_blocks_per_tagline: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            geometry: DiskGeometry {
                disks: 9,
                blocks_per_disk: 4096,
                block_size: 1024,
            },
            cache_capacity: 256,
            max_blocks_per_tagline: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DriverConfig::default();
        assert!(config.geometry.validate().is_ok());
        assert!(config.cache_capacity > 0);
    }

    #[test]
    fn partial_config_deserializes_over_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{ "cache_capacity": 8 }"#).expect("parse");
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.geometry, DriverConfig::default().geometry);
    }
}
