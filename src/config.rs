//! Application configuration
//!
//! Loaded from TOML. Search order: an explicit `--config` path, then
//! `<config dir>/sr-weave/config.toml`, then built-in defaults. Missing keys
//! take their defaults, so a file only needs the values it changes.

use bevy::math::{UVec2, Vec2, Vec3};
use bevy::prelude::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::display::DisplayRect;
use crate::eyes::EyeSource;
use crate::lifecycle::LifecycleSettings;
use crate::render::{ColorSpacePolicy, Rgba};
use crate::runtime::simulated::{SimulatedDisplaySpec, SimulationSettings};
use crate::scene::cube::{DEFAULT_CUBE_SIZE_MM, DEFAULT_SPIN_RAD_PER_SEC};
use crate::scene::stereo_image::DEFAULT_IMAGE_FILE;
use crate::weaver::LatencyPolicy;

pub const CONFIG_DIR_NAME: &str = "sr-weave";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Most frames of latency a weaver is asked to compensate
pub const MAX_LATENCY_FRAMES: u32 = 8;

/// Longest startup or recovery deadline accepted, one hour
pub const MAX_DEADLINE_SECS: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Validation shared by every configuration section
pub trait ConfigSection {
    fn validate(&self) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "LeiaSR Weaving Example".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

impl WindowConfig {
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }
}

impl ConfigSection for WindowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(
                "window size",
                format!("{}x{} has no area", self.width, self.height),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub startup_deadline_secs: f64,
    pub recovery_deadline_secs: f64,
    pub poll_interval_ms: u64,
    pub latency: LatencyPolicy,
    /// Open the eye-pair stream even when the weaver can predict
    pub eye_listener: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            startup_deadline_secs: 10.0,
            recovery_deadline_secs: 30.0,
            poll_interval_ms: 100,
            latency: LatencyPolicy::default(),
            eye_listener: true,
        }
    }
}

impl RuntimeConfig {
    /// Deadlines that are not valid durations keep their defaults
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        let defaults = LifecycleSettings::default();
        LifecycleSettings {
            startup_deadline: Duration::try_from_secs_f64(self.startup_deadline_secs)
                .unwrap_or(defaults.startup_deadline),
            recovery_deadline: Duration::try_from_secs_f64(self.recovery_deadline_secs)
                .unwrap_or(defaults.recovery_deadline),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

impl ConfigSection for RuntimeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("runtime.startup_deadline_secs", self.startup_deadline_secs),
            ("runtime.recovery_deadline_secs", self.recovery_deadline_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("{} is not a positive duration", value)));
            }
            if value > MAX_DEADLINE_SECS {
                return Err(invalid(
                    field,
                    format!("{} s exceeds {} s", value, MAX_DEADLINE_SECS),
                ));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("runtime.poll_interval_ms", "must be non-zero"));
        }
        match self.latency {
            LatencyPolicy::Frames(frames) if frames > MAX_LATENCY_FRAMES => Err(invalid(
                "runtime.latency",
                format!("{} frames exceeds {}", frames, MAX_LATENCY_FRAMES),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub color_space: ColorSpacePolicy,
    /// Linear clear color of the view texture
    pub view_clear_color: Rgba,
    /// Linear clear color of the backbuffer
    pub backbuffer_clear_color: Rgba,
    /// Depth of the zero-parallax plane
    pub virtual_screen_depth_mm: f32,
    pub near_mm: f32,
    pub far_mm: f32,
    pub vsync: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            color_space: ColorSpacePolicy::default(),
            view_clear_color: crate::render::pipeline::DEFAULT_VIEW_CLEAR,
            backbuffer_clear_color: crate::render::pipeline::DEFAULT_BACKBUFFER_CLEAR,
            virtual_screen_depth_mm: 0.0,
            near_mm: crate::projection::DEFAULT_NEAR_MM,
            far_mm: crate::projection::DEFAULT_FAR_MM,
            vsync: true,
        }
    }
}

impl ConfigSection for RenderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.near_mm > 0.0) {
            return Err(invalid("render.near_mm", format!("{} must be positive", self.near_mm)));
        }
        if !(self.far_mm > self.near_mm) {
            return Err(invalid(
                "render.far_mm",
                format!("{} must exceed near plane {}", self.far_mm, self.near_mm),
            ));
        }
        if !self.virtual_screen_depth_mm.is_finite() {
            return Err(invalid("render.virtual_screen_depth_mm", "must be finite"));
        }
        for (field, color) in [
            ("render.view_clear_color", self.view_clear_color),
            ("render.backbuffer_clear_color", self.backbuffer_clear_color),
        ] {
            if color.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(invalid(field, format!("{:?} has components outside [0, 1]", color)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EyesConfig {
    pub source: EyeSource,
}

/// Demo content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoMode {
    Cube,
    StereoImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Unset picks the stereo image when one is named on the command line
    pub mode: Option<DemoMode>,
    pub image_path: PathBuf,
    pub cube_size_mm: f32,
    pub cube_spin_rad_per_sec: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            mode: None,
            image_path: PathBuf::from(DEFAULT_IMAGE_FILE),
            cube_size_mm: DEFAULT_CUBE_SIZE_MM,
            cube_spin_rad_per_sec: DEFAULT_SPIN_RAD_PER_SEC,
        }
    }
}

impl DemoConfig {
    pub fn resolved_mode(&self, image_on_command_line: bool) -> DemoMode {
        self.mode.unwrap_or(if image_on_command_line {
            DemoMode::StereoImage
        } else {
            DemoMode::Cube
        })
    }
}

impl ConfigSection for DemoConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cube_size_mm > 0.0) {
            return Err(invalid("demo.cube_size_mm", "must be positive"));
        }
        if !self.cube_spin_rad_per_sec.is_finite() {
            return Err(invalid("demo.cube_spin_rad_per_sec", "must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDisplayConfig {
    pub resolution: [u32; 2],
    pub physical_size_cm: [f32; 2],
    pub dot_pitch_cm: f32,
    /// Per-eye view texture size
    pub view_texture: [u32; 2],
    pub viewing_position_mm: [f32; 3],
}

impl Default for SimulatedDisplayConfig {
    fn default() -> Self {
        let spec = SimulatedDisplaySpec::default();
        Self {
            resolution: spec.resolution.to_array(),
            physical_size_cm: spec.physical_size_cm.to_array(),
            dot_pitch_cm: spec.dot_pitch_cm,
            view_texture: spec.view_texture.to_array(),
            viewing_position_mm: spec.viewing_position_mm.to_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub service_delay_ms: u64,
    pub display_delay_ms: u64,
    pub service_available: bool,
    pub modern_display_manager: bool,
    pub legacy_weaver: bool,
    pub eye_sway_mm: f32,
    pub eye_stream_hz: f32,
    pub display: SimulatedDisplayConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            service_delay_ms: 0,
            display_delay_ms: 0,
            service_available: true,
            modern_display_manager: true,
            legacy_weaver: false,
            eye_sway_mm: 15.0,
            eye_stream_hz: 90.0,
            display: SimulatedDisplayConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn settings(&self) -> SimulationSettings {
        let resolution = UVec2::from_array(self.display.resolution);
        SimulationSettings {
            service_delay: Duration::from_millis(self.service_delay_ms),
            display_delay: Duration::from_millis(self.display_delay_ms),
            service_available: self.service_available,
            modern_display_manager: self.modern_display_manager,
            legacy_weaver: self.legacy_weaver,
            display: SimulatedDisplaySpec {
                identifier: 1,
                resolution,
                physical_resolution: resolution,
                physical_size_cm: Vec2::from_array(self.display.physical_size_cm),
                dot_pitch_cm: self.display.dot_pitch_cm,
                location: DisplayRect {
                    left: 0,
                    top: 0,
                    right: resolution.x as i64,
                    bottom: resolution.y as i64,
                },
                view_texture: UVec2::from_array(self.display.view_texture),
                viewing_position_mm: Vec3::from_array(self.display.viewing_position_mm),
            },
            eye_sway_mm: self.eye_sway_mm,
        }
    }

    pub fn eye_stream_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.eye_stream_hz)
    }
}

impl ConfigSection for SimulationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        if display.resolution.contains(&0) || display.view_texture.contains(&0) {
            return Err(invalid("simulation.display", "resolutions must be non-zero"));
        }
        if display.physical_size_cm.iter().any(|v| !(*v > 0.0)) {
            return Err(invalid("simulation.display.physical_size_cm", "must be positive"));
        }
        if !(self.eye_stream_hz > 0.0 && self.eye_stream_hz <= 1000.0) {
            return Err(invalid("simulation.eye_stream_hz", "must be in (0, 1000]"));
        }
        Ok(())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub runtime: RuntimeConfig,
    pub render: RenderConfig,
    pub eyes: EyesConfig,
    pub demo: DemoConfig,
    pub simulation: SimulationConfig,
}

impl ConfigSection for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.runtime.validate()?;
        self.render.validate()?;
        self.demo.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

impl AppConfig {
    /// `<config dir>/sr-weave/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load following the search order; returns the file used, if any
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Ok((Self::from_file(&path)?, Some(path))),
            _ => {
                debug!("No configuration file, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok((config, None))
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        info!("⚙️ Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML; `origin` names the source in errors
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
