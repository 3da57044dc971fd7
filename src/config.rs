//! Configuration loading using Figment
//!
//! Configuration is layered, later sources winning:
//! 1. Built-in defaults (`RelayConfig::default()`)
//! 2. A TOML file (`config/frame_relay.toml` unless another path is given)
//! 3. Environment variables prefixed with `FRAME_RELAY_`, nested keys split
//!    on `__` (e.g. `FRAME_RELAY_SERVER__PORT=9000`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Example
//! ```no_run
//! use frame_relay::config::RelayConfig;
//!
//! let config = RelayConfig::load(None)?;
//! println!("Listening on {}", config.server.bind_addr());
//! # Ok::<(), frame_relay::error::RelayError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppResult, RelayError};
use crate::network::protocol::HeaderLayout;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/frame_relay.toml";

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener settings
    pub server: ServerConfig,
    /// Wire protocol settings
    pub protocol: ProtocolConfig,
    /// Upload draining and persistence
    pub upload: UploadConfig,
    /// Detection backend selection and tuning
    pub detection: DetectionConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (all interfaces by default)
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Per-read deadline on a connection in milliseconds (0 = wait forever)
    pub read_timeout_ms: u64,
}

/// Wire protocol configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Upload header layout expected from devices
    pub header_layout: HeaderLayout,
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory receiving one `d_<device_id>.jpg` per device
    pub dir: PathBuf,
    /// Socket read chunk size in bytes
    pub buffer_size: usize,
    /// Hard ceiling on a single payload
    pub max_payload_bytes: usize,
}

/// Detection backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// Frame-differencing motion detector
    #[default]
    Motion,
    /// Echo the upload unchanged with an empty summary
    Passthrough,
}

impl std::str::FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "motion" => Ok(DetectorBackend::Motion),
            "passthrough" => Ok(DetectorBackend::Passthrough),
            other => Err(format!(
                "Invalid detector backend '{}'. Must be one of: motion, passthrough",
                other
            )),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Which detector processes uploads
    pub backend: DetectorBackend,
    /// Per-pixel grayscale difference counted as change
    pub motion_threshold: u8,
    /// Dilation radius (L-infinity) applied to the change mask
    pub dilate_radius: u8,
    /// Minimum contour area in pixels for a motion region
    pub min_area: f64,
    /// JPEG quality of the annotated frame
    pub jpeg_quality: u8,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
    /// Emit span open/close events (one pair per connection)
    pub span_events: bool,
    /// Include source file and line in each event
    pub file_and_line: bool,
    /// Include the runtime thread name in each event
    pub thread_names: bool,
    /// ANSI colors for pretty/compact output
    pub ansi: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10086,
            read_timeout_ms: 0,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("upload"),
            buffer_size: 1024,
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Motion,
            motion_threshold: 30,
            dilate_radius: 2,
            min_area: 500.0,
            jpeg_quality: 85,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            span_events: false,
            file_and_line: false,
            thread_names: true,
            ansi: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RelayConfig {
    /// Load configuration from `path` (or the default file) and the environment.
    ///
    /// A missing default file is not an error; defaults and environment
    /// still apply. An explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let path = match path {
            Some(path) if !path.is_file() => {
                return Err(RelayError::Configuration(format!(
                    "Configuration file '{}' not found",
                    path.display()
                )));
            }
            Some(path) => path,
            None => Path::new(DEFAULT_CONFIG_PATH),
        };
        let config: RelayConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack used by [`RelayConfig::load`]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RelayConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FRAME_RELAY_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(RelayError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(RelayError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.upload.buffer_size == 0 {
            return Err(RelayError::Configuration(
                "upload.buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.upload.max_payload_bytes == 0 {
            return Err(RelayError::Configuration(
                "upload.max_payload_bytes must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.detection.jpeg_quality) {
            return Err(RelayError::Configuration(format!(
                "Invalid jpeg_quality {}. Must be 1-100",
                self.detection.jpeg_quality
            )));
        }

        Ok(())
    }
}
