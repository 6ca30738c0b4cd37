//! Strongly-typed configuration for Flex automation.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support), or merged with explicit overrides.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use thiserror::Error;

use crate::bridge::{
    BridgeResultMode, DEFAULT_BRIDGE_ELEMENT_ID, DEFAULT_BRIDGE_SENTINEL, DEFAULT_FAILURE_MARKER,
};
use crate::invoker::SerializationMode;

/// Method every ready Flex movie exposes.
pub const DEFAULT_READY_METHOD: &str = "fp_click";
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Shared logger callback signature used by the configuration.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Verbosity level for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration values for Flex commands and the browser they run in.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct FlexConfig {
    #[serde(alias = "bridgeElementId")]
    pub bridge_element_id: String,
    #[serde(alias = "bridgeSentinel")]
    pub bridge_sentinel: String,
    #[serde(alias = "failureMarker")]
    pub failure_marker: String,
    #[serde(alias = "readyMethod")]
    pub ready_method: String,
    pub serialization: SerializationMode,
    #[serde(alias = "bridgeResultMode")]
    pub bridge_result_mode: BridgeResultMode,
    #[serde(alias = "readyTimeoutMs")]
    pub ready_timeout_ms: u64,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    pub verbose: Verbosity,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
    #[serde(alias = "cdpUrl")]
    pub cdp_url: Option<String>,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<String>,
    pub headless: bool,
    #[serde(alias = "userDataDir")]
    pub user_data_dir: Option<String>,
    #[serde(alias = "launchArgs")]
    pub launch_args: Vec<String>,
}

impl Default for FlexConfig {
    fn default() -> Self {
        FlexConfig {
            bridge_element_id: DEFAULT_BRIDGE_ELEMENT_ID.to_string(),
            bridge_sentinel: DEFAULT_BRIDGE_SENTINEL.to_string(),
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            ready_method: DEFAULT_READY_METHOD.to_string(),
            serialization: SerializationMode::default(),
            bridge_result_mode: BridgeResultMode::default(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verbose: Verbosity::default(),
            logger: None,
            cdp_url: None,
            chrome_executable: None,
            headless: true,
            user_data_dir: None,
            launch_args: Vec::new(),
        }
    }
}

impl FlexConfig {
    /// Load configuration from `.env` and `FLEXBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, FlexConfigError> {
        let _ = dotenv();
        let mut config = FlexConfig::default();

        if let Some(value) = env_var("FLEXBRIDGE_BRIDGE_ELEMENT_ID") {
            config.bridge_element_id = value;
        }

        if let Some(value) = env_var("FLEXBRIDGE_BRIDGE_SENTINEL") {
            config.bridge_sentinel = value;
        }

        if let Some(value) = env_var("FLEXBRIDGE_FAILURE_MARKER") {
            config.failure_marker = value;
        }

        if let Some(value) = env_var("FLEXBRIDGE_READY_METHOD") {
            config.ready_method = value;
        }

        if let Some(value) = env_var("FLEXBRIDGE_SERIALIZATION") {
            config.serialization = SerializationMode::parse(&value).ok_or_else(|| {
                FlexConfigError::invalid_enum("FLEXBRIDGE_SERIALIZATION", value.clone())
            })?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_BRIDGE_RESULT_MODE") {
            config.bridge_result_mode = BridgeResultMode::parse(&value).ok_or_else(|| {
                FlexConfigError::invalid_enum("FLEXBRIDGE_BRIDGE_RESULT_MODE", value.clone())
            })?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_READY_TIMEOUT_MS") {
            config.ready_timeout_ms = parse_u64("FLEXBRIDGE_READY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_u64("FLEXBRIDGE_POLL_INTERVAL_MS", &value)?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_VERBOSE") {
            let parsed = parse_u8("FLEXBRIDGE_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                FlexConfigError::invalid_enum("FLEXBRIDGE_VERBOSE", parsed.to_string())
            })?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_CDP_URL") {
            config.cdp_url = Some(value);
        }

        if let Some(value) = env_var("FLEXBRIDGE_CHROME_BIN") {
            config.chrome_executable = Some(value);
        }

        if let Some(value) = env_var("FLEXBRIDGE_HEADLESS") {
            config.headless = parse_bool("FLEXBRIDGE_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("FLEXBRIDGE_USER_DATA_DIR") {
            config.user_data_dir = Some(value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot work with.
    ///
    /// An empty failure marker would match every write-back; an empty element
    /// id or ready method addresses nothing.
    pub fn validate(&self) -> Result<(), FlexConfigError> {
        let required = [
            ("bridge_element_id", &self.bridge_element_id),
            ("failure_marker", &self.failure_marker),
            ("ready_method", &self.ready_method),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(FlexConfigError::Empty { field });
            }
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: FlexConfigOverrides) -> FlexConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.bridge_element_id {
            next.bridge_element_id = value;
        }
        if let Some(value) = overrides.bridge_sentinel {
            next.bridge_sentinel = value;
        }
        if let Some(value) = overrides.failure_marker {
            next.failure_marker = value;
        }
        if let Some(value) = overrides.ready_method {
            next.ready_method = value;
        }
        if let Some(value) = overrides.serialization {
            next.serialization = value;
        }
        if let Some(value) = overrides.bridge_result_mode {
            next.bridge_result_mode = value;
        }
        if let Some(value) = overrides.ready_timeout_ms {
            next.ready_timeout_ms = value;
        }
        if let Some(value) = overrides.poll_interval_ms {
            next.poll_interval_ms = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.cdp_url {
            next.cdp_url = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.user_data_dir {
            next.user_data_dir = value;
        }
        if let Some(value) = overrides.launch_args {
            next.launch_args = value;
        }

        next
    }
}

/// Field-level overrides for [`FlexConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct FlexConfigOverrides {
    pub bridge_element_id: Option<String>,
    pub bridge_sentinel: Option<String>,
    pub failure_marker: Option<String>,
    pub ready_method: Option<String>,
    pub serialization: Option<SerializationMode>,
    pub bridge_result_mode: Option<BridgeResultMode>,
    pub ready_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub verbose: Option<Verbosity>,
    pub logger: Option<Option<LoggerCallback>>,
    pub cdp_url: Option<Option<String>>,
    pub chrome_executable: Option<Option<String>>,
    pub headless: Option<bool>,
    pub user_data_dir: Option<Option<String>>,
    pub launch_args: Option<Vec<String>>,
}

impl FlexConfigOverrides {
    /// Builder-style helper to set the `bridge_result_mode` override.
    pub fn bridge_result_mode(mut self, mode: BridgeResultMode) -> Self {
        self.bridge_result_mode = Some(mode);
        self
    }

    /// Builder-style helper to set the `cdp_url` override.
    pub fn cdp_url<T: Into<Option<String>>>(mut self, url: T) -> Self {
        self.cdp_url = Some(url.into());
        self
    }
}

impl fmt::Debug for FlexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexConfig")
            .field("bridge_element_id", &self.bridge_element_id)
            .field("bridge_sentinel", &self.bridge_sentinel)
            .field("failure_marker", &self.failure_marker)
            .field("ready_method", &self.ready_method)
            .field("serialization", &self.serialization)
            .field("bridge_result_mode", &self.bridge_result_mode)
            .field("ready_timeout_ms", &self.ready_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("verbose", &self.verbose)
            .field("cdp_url", &self.cdp_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("headless", &self.headless)
            .field("user_data_dir", &self.user_data_dir)
            .field("launch_args", &self.launch_args)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for FlexConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexConfigOverrides")
            .field("bridge_element_id", &self.bridge_element_id)
            .field("bridge_result_mode", &self.bridge_result_mode)
            .field("serialization", &self.serialization)
            .field("ready_timeout_ms", &self.ready_timeout_ms)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .field("cdp_url", &self.cdp_url)
            .field("headless", &self.headless)
            .finish_non_exhaustive()
    }
}

/// Errors that can arise while constructing a [`FlexConfig`].
#[derive(Debug, Error)]
pub enum FlexConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

impl FlexConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        FlexConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, FlexConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FlexConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, FlexConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| FlexConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, FlexConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| FlexConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
