// SPDX-License-Identifier: CEPL-1.0
//! `prism.toml` loading.
//!
//! Every field has a default, so a missing file (or a missing table) is never
//! an error. A file that exists but does not parse is.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "prism.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub shaders: ShaderPaths,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_true")]
    pub resizable: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderConfig {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModePref,
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    /// Upper bound on a single image acquisition. `0` waits forever.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default)]
    pub validation: Validation,
}

/// Optional precompiled SPIR-V overrides for the built-in triangle shaders.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ShaderPaths {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePref {
    /// MAILBOX when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// On in debug builds, off in release builds.
    #[default]
    Auto,
    On,
    Off,
}

impl Validation {
    pub fn enabled(self) -> bool {
        match self {
            Validation::Auto => cfg!(debug_assertions),
            Validation::On => true,
            Validation::Off => false,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            resizable: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            clear_color: default_clear(),
            present_mode: PresentModePref::Mailbox,
            frames_in_flight: default_frames_in_flight(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            validation: Validation::Auto,
        }
    }
}

impl RenderConfig {
    pub fn acquire_timeout_ns(&self) -> u64 {
        if self.acquire_timeout_ms == 0 {
            u64::MAX
        } else {
            self.acquire_timeout_ms.saturating_mul(1_000_000)
        }
    }
}

fn default_title() -> String {
    "Prism".to_owned()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_true() -> bool {
    true
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_frames_in_flight() -> usize {
    2
}
fn default_acquire_timeout_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_toml(src: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(src).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(s) => Self::from_toml(&s, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no config at {} → defaults", path.display());
                Ok(AppConfig::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render.frames_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "render.frames_in_flight",
                reason: "must be at least 1".into(),
            });
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid {
                field: "window.width/height",
                reason: format!("{}x{} has no area", self.window.width, self.window.height),
            });
        }
        if self.shaders.vertex.is_some() != self.shaders.fragment.is_some() {
            return Err(ConfigError::Invalid {
                field: "shaders",
                reason: "vertex and fragment must be overridden together".into(),
            });
        }
        Ok(())
    }
}
