//! Accelerator configuration.
//!
//! Loads [`AcceleratorConfig`] from a TOML file (`mvm.toml`) with environment
//! variable overrides via `MVM_*` prefixed variables.

use crate::types::TileGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest tile side accepted by validation.
pub const MAX_TILE_SIDE: usize = 4096;
/// Largest tile count accepted by validation.
pub const MAX_TILES: u32 = 65_536;

/// Accelerator session configuration loaded from TOML with environment
/// variable overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
    /// Number of addressable tiles.
    /// Override: `MVM_NUM_TILES`
    pub num_tiles: u32,

    /// Row capacity of every tile.
    /// Override: `MVM_TILE_ROWS`
    pub tile_rows: usize,

    /// Column capacity of every tile (also the device vector length).
    /// Override: `MVM_TILE_COLS`
    pub tile_cols: usize,

    /// Element count above which quantization scales in parallel.
    /// Override: `MVM_PARALLEL_THRESHOLD`
    pub parallel_threshold: usize,

    /// Number of chained MVMs after which a precision warning is logged.
    /// Override: `MVM_CHAIN_DEPTH_WARNING`
    pub chain_depth_warning: usize,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            num_tiles: 1,
            tile_rows: 5,
            tile_cols: 6,
            parallel_threshold: 4096,
            chain_depth_warning: 4,
        }
    }
}

/// Errors that can occur when loading or validating an [`AcceleratorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl AcceleratorConfig {
    /// Tile geometry described by this configuration.
    pub fn geometry(&self) -> TileGeometry {
        TileGeometry::new(self.tile_rows, self.tile_cols)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, then apply environment variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: AcceleratorConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load only from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_tiles == 0 {
            return Err(ConfigError::Validation("num_tiles must be > 0".into()));
        }
        if self.num_tiles > MAX_TILES {
            return Err(ConfigError::Validation(format!(
                "num_tiles must be <= {MAX_TILES}, got {}",
                self.num_tiles
            )));
        }
        for (name, side) in [("tile_rows", self.tile_rows), ("tile_cols", self.tile_cols)] {
            if side == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
            if side > MAX_TILE_SIDE {
                return Err(ConfigError::Validation(format!(
                    "{name} must be <= {MAX_TILE_SIDE}, got {side}"
                )));
            }
        }
        if self.parallel_threshold == 0 {
            return Err(ConfigError::Validation("parallel_threshold must be > 0".into()));
        }
        Ok(())
    }

    /// Apply `MVM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse::<u32>("MVM_NUM_TILES")? {
            self.num_tiles = v;
        }
        if let Some(v) = env_parse::<usize>("MVM_TILE_ROWS")? {
            self.tile_rows = v;
        }
        if let Some(v) = env_parse::<usize>("MVM_TILE_COLS")? {
            self.tile_cols = v;
        }
        if let Some(v) = env_parse::<usize>("MVM_PARALLEL_THRESHOLD")? {
            self.parallel_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("MVM_CHAIN_DEPTH_WARNING")? {
            self.chain_depth_warning = v;
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().map(Some).map_err(|e| ConfigError::EnvOverride {
            key: key.into(),
            value: val.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: [&str; 5] = [
        "MVM_NUM_TILES",
        "MVM_TILE_ROWS",
        "MVM_TILE_COLS",
        "MVM_PARALLEL_THRESHOLD",
        "MVM_CHAIN_DEPTH_WARNING",
    ];

    fn cleared_env() -> Vec<(&'static str, Option<&'static str>)> {
        ENV_KEYS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AcceleratorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.geometry(), TileGeometry::new(5, 6));
    }

    #[test]
    #[serial(mvm_env)]
    fn test_default_toml_round_trips() {
        temp_env::with_vars(cleared_env(), || {
            let toml_str = AcceleratorConfig::default().to_toml().unwrap();
            let cfg = AcceleratorConfig::from_toml(&toml_str).unwrap();
            assert_eq!(cfg, AcceleratorConfig::default());
        });
    }

    #[test]
    #[serial(mvm_env)]
    fn test_from_toml_partial_uses_defaults() {
        temp_env::with_vars(cleared_env(), || {
            let cfg = AcceleratorConfig::from_toml("num_tiles = 8\ntile_rows = 128\n").unwrap();
            assert_eq!(cfg.num_tiles, 8);
            assert_eq!(cfg.tile_rows, 128);
            assert_eq!(cfg.tile_cols, 6);
            assert_eq!(cfg.chain_depth_warning, 4);
        });
    }

    #[test]
    fn test_validation_zero_tiles() {
        let cfg = AcceleratorConfig { num_tiles: 0, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("num_tiles must be > 0"));
    }

    #[test]
    fn test_validation_too_many_tiles() {
        let cfg = AcceleratorConfig { num_tiles: MAX_TILES + 1, ..Default::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("num_tiles must be <="));
    }

    #[test]
    fn test_validation_zero_and_oversized_sides() {
        let cfg = AcceleratorConfig { tile_cols: 0, ..Default::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("tile_cols must be > 0"));

        let cfg = AcceleratorConfig { tile_rows: MAX_TILE_SIDE + 1, ..Default::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("tile_rows must be <="));
    }

    #[test]
    fn test_validation_zero_parallel_threshold() {
        let cfg = AcceleratorConfig { parallel_threshold: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    #[serial(mvm_env)]
    fn test_env_override_multiple_fields() {
        temp_env::with_vars(
            [
                ("MVM_NUM_TILES", Some("4")),
                ("MVM_TILE_ROWS", Some("64")),
                ("MVM_TILE_COLS", Some("32")),
                ("MVM_PARALLEL_THRESHOLD", Some("1024")),
                ("MVM_CHAIN_DEPTH_WARNING", Some("2")),
            ],
            || {
                let cfg = AcceleratorConfig::from_env().unwrap();
                assert_eq!(cfg.num_tiles, 4);
                assert_eq!(cfg.geometry(), TileGeometry::new(64, 32));
                assert_eq!(cfg.parallel_threshold, 1024);
                assert_eq!(cfg.chain_depth_warning, 2);
            },
        );
    }

    #[test]
    #[serial(mvm_env)]
    fn test_env_override_beats_file_values() {
        let mut vars = cleared_env();
        vars[0] = ("MVM_NUM_TILES", Some("16"));
        temp_env::with_vars(vars, || {
            let cfg = AcceleratorConfig::from_toml("num_tiles = 2").unwrap();
            assert_eq!(cfg.num_tiles, 16);
        });
    }

    #[test]
    #[serial(mvm_env)]
    fn test_env_override_invalid_value() {
        let mut vars = cleared_env();
        vars[1] = ("MVM_TILE_ROWS", Some("many"));
        temp_env::with_vars(vars, || {
            let err = AcceleratorConfig::from_env().unwrap_err();
            match err {
                ConfigError::EnvOverride { key, value, .. } => {
                    assert_eq!(key, "MVM_TILE_ROWS");
                    assert_eq!(value, "many");
                }
                other => panic!("expected EnvOverride, got: {other}"),
            }
        });
    }

    #[test]
    #[serial(mvm_env)]
    fn test_load_from_tempfile() {
        temp_env::with_vars(cleared_env(), || {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("mvm.toml");
            std::fs::write(&path, "num_tiles = 3\ntile_cols = 12\n").unwrap();
            let cfg = AcceleratorConfig::load(&path).unwrap();
            assert_eq!(cfg.num_tiles, 3);
            assert_eq!(cfg.tile_cols, 12);
        });
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = AcceleratorConfig::load(Path::new("/nonexistent/mvm.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_error_converts_to_mvm_error() {
        let err: crate::MvmError = ConfigError::Validation("bad".into()).into();
        assert!(matches!(err, crate::MvmError::Config(ref s) if s.contains("bad")));
    }
}
