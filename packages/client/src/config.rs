//! # Client configuration - `notes.toml`
//!
//! Settings that shape how the client synchronises with the store. A missing
//! or empty file is equivalent to [`ClientConfig::default`].
//!
//! ## Structure
//!
//! ```toml
//! [autosave]
//! debounce_ms = 1000          # quiet period before a draft is written
//!
//! [notes]
//! default_title = "Новая заметка"
//! default_content = "# Новая заметка\n\nНачните здесь..."
//!
//! [subscription.reconnect]
//! policy = "never"            # or "retry" with max_attempts and delay_ms
//! ```
//!
//! ## Types
//!
//! | Struct | Purpose |
//! |--------|---------|
//! | [`ClientConfig`] | Top-level config with builder helpers and TOML (de)serialisation. |
//! | [`AutosaveConfig`] | Debounce quiet period, **1000 ms** by default. |
//! | [`NotesConfig`] | Title and body given to freshly created notes. |
//! | [`SubscriptionConfig`] | What to do when the push channel drops, see [`ReconnectPolicy`]. |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to read or write `notes.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration stored in `notes.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Defaults for newly created notes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_content")]
    pub default_content: String,
}

fn default_title() -> String {
    "Новая заметка".to_string()
}

fn default_content() -> String {
    "# Новая заметка\n\nНачните здесь...".to_string()
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            default_content: default_content(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// Behaviour after the index subscription reports a dropped channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Report the drop and stay disconnected.
    #[default]
    Never,
    /// Resubscribe up to `max_attempts` times, waiting `delay_ms` before each.
    Retry { max_attempts: u32, delay_ms: u64 },
}

impl ClientConfig {
    /// Builder method to set the autosave quiet period.
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.autosave.debounce_ms = ms;
        self
    }

    /// Builder method to set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.subscription.reconnect = policy;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave.debounce_ms)
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "notes.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read a config file. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::from_toml(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Config next to the session file in the platform data directory.
    pub fn load_default() -> Result<Self, ConfigError> {
        match dirs::config_dir() {
            Some(dir) => Self::load(&dir.join("notes").join(Self::filename())),
            None => Ok(Self::default()),
        }
    }
}
