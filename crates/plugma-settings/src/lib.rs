//! # plugma-settings
//!
//! Configuration for the relay broker and the client transport wrapper.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.plugma/relay.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PLUGMA_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, LoggingSettings, ReconnectSettings, RelaySettings, ServerSettings};
