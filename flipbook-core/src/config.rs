use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Zoom changes smaller than this are ignored.
    pub epsilon: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 0.8,
            max: 3.0,
            step: 0.1,
            epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    /// Pages on each side of the current page that get pre-warmed.
    pub neighborhood_radius: usize,
    /// Retention window kept after navigation settles: `[page - retain_behind, page + retain_ahead]`.
    pub retain_behind: usize,
    pub retain_ahead: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            neighborhood_radius: 2,
            retain_behind: 2,
            retain_ahead: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub total_duration_ms: u64,
    pub frame_rate: u32,
    pub min_steps: usize,
    /// Go-to-page requests farther than this are animated.
    pub jump_threshold: usize,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            total_duration_ms: 4000,
            frame_rate: 12,
            min_steps: 4,
            jump_threshold: 2,
        }
    }
}

impl AnimationConfig {
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_duration_ms)
    }

    /// Number of frames that fit in the total duration at the configured cadence.
    pub fn max_steps(&self) -> usize {
        let frames = u64::from(self.frame_rate) * self.total_duration_ms / 1000;
        (frames as usize).max(self.min_steps)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub mobile_max_width: f32,
    pub tablet_max_width: f32,
    pub tablet_leaf_threshold: f32,
    pub desktop_leaf_threshold: f32,
    pub min_container: f32,
    pub default_page_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            mobile_max_width: 767.0,
            tablet_max_width: 1023.0,
            tablet_leaf_threshold: 300.0,
            desktop_leaf_threshold: 260.0,
            min_container: 320.0,
            default_page_ratio: 960.0 / 620.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub zoom: ZoomConfig,
    pub cache: CacheConfig,
    pub animation: AnimationConfig,
    pub layout: LayoutConfig,
    pub resize_debounce_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomConfig::default(),
            cache: CacheConfig::default(),
            animation: AnimationConfig::default(),
            layout: LayoutConfig::default(),
            resize_debounce_ms: 100,
        }
    }
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "flipbook", "flipbook")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads `path` when given; otherwise the platform default location, falling back to defaults
    /// when that file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zoom = &self.zoom;
        if !(zoom.min > 0.0 && zoom.min <= zoom.max && zoom.max.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "zoom bounds must satisfy 0 < min <= max, got {}..{}",
                zoom.min, zoom.max
            )));
        }
        if zoom.step <= 0.0 || zoom.epsilon < 0.0 {
            return Err(ConfigError::Invalid(
                "zoom step must be positive and epsilon non-negative".into(),
            ));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid("cache.max_size must be at least 1".into()));
        }
        if self.animation.frame_rate == 0 || self.animation.min_steps == 0 {
            return Err(ConfigError::Invalid(
                "animation frame_rate and min_steps must be at least 1".into(),
            ));
        }
        let layout = &self.layout;
        if !(layout.default_page_ratio > 0.0 && layout.min_container > 0.0) {
            return Err(ConfigError::Invalid(
                "layout page ratio and minimum container size must be positive".into(),
            ));
        }
        if layout.mobile_max_width > layout.tablet_max_width {
            return Err(ConfigError::Invalid(
                "layout.mobile_max_width exceeds layout.tablet_max_width".into(),
            ));
        }
        Ok(())
    }
}
