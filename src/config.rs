//! Bus and harness settings.
//!
//! Later sources win: built-in defaults, `~/.config/axi-emu/config.toml`,
//! `./axi-emu.toml`, then the `AXI_EMU_CYCLE_LIMIT` and
//! `AXI_EMU_BIG_ENDIAN` environment variables.
//!
//! # File format
//!
//! ```toml
//! # axi-emu.toml
//!
//! # Cycles a harness waits for one operation before giving up
//! cycle_limit = 1000
//!
//! # Bus geometry
//! address_width = 32
//! data_width = 32
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Project-local config file name.
const LOCAL_CONFIG: &str = "axi-emu.toml";

/// Default harness watchdog, in cycles per operation.
pub const DEFAULT_CYCLE_LIMIT: u64 = 1000;

/// Default backing memory size for bench slaves.
pub const DEFAULT_MEMORY_SIZE: usize = 0x1_0000;

/// axi-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Cycles a harness steps before declaring an operation stalled.
    pub cycle_limit: Option<u64>,

    /// Pack data words into memory big-endian.
    pub big_endian: Option<bool>,

    /// Address bus width in bits.
    pub address_width: Option<u32>,

    /// Data bus width in bits (32 or 64 for AXI4-Lite).
    pub data_width: Option<u32>,

    /// Bytes of backing memory given to bench slaves.
    pub memory_size: Option<usize>,
}

impl Config {
    /// Defaults, then `~/.config/axi-emu/config.toml`, then `axi-emu.toml`
    /// in the working directory, then `AXI_EMU_*` variables. Each layer
    /// only replaces the fields it sets.
    pub fn load() -> Self {
        let mut config = Self::default();
        for layer in [Self::load_user_config(), Self::load_local_config()].into_iter().flatten() {
            config.merge(layer);
        }
        config.apply_env_overrides();
        config
    }

    /// Process-wide configuration, read once.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    pub fn cycle_limit(&self) -> u64 {
        self.cycle_limit.unwrap_or(DEFAULT_CYCLE_LIMIT)
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian.unwrap_or(false)
    }

    pub fn address_width(&self) -> u32 {
        self.address_width.unwrap_or(32)
    }

    pub fn data_width(&self) -> u32 {
        self.data_width.unwrap_or(32)
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE)
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// `axi-emu.toml` in the working directory, else in the crate root when
    /// run through cargo.
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new(LOCAL_CONFIG)).or_else(|| {
            let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;
            Self::load_from_file(&Path::new(&manifest_dir).join(LOCAL_CONFIG))
        })
    }

    /// A missing file is silent; an unreadable or malformed one is a warning.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer `other` on top: fields it leaves unset keep their value.
    pub fn merge(&mut self, other: Self) {
        if other.cycle_limit.is_some() {
            self.cycle_limit = other.cycle_limit;
        }
        if other.big_endian.is_some() {
            self.big_endian = other.big_endian;
        }
        if other.address_width.is_some() {
            self.address_width = other.address_width;
        }
        if other.data_width.is_some() {
            self.data_width = other.data_width;
        }
        if other.memory_size.is_some() {
            self.memory_size = other.memory_size;
        }
    }

    /// Unparseable values are logged and ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("AXI_EMU_CYCLE_LIMIT") {
            match value.parse() {
                Ok(limit) => {
                    log::info!("Using AXI_EMU_CYCLE_LIMIT from environment: {}", limit);
                    self.cycle_limit = Some(limit);
                }
                Err(e) => log::warn!("Ignoring AXI_EMU_CYCLE_LIMIT={}: {}", value, e),
            }
        }
        if let Ok(value) = std::env::var("AXI_EMU_BIG_ENDIAN") {
            match parse_flag(&value) {
                Some(flag) => {
                    log::info!("Using AXI_EMU_BIG_ENDIAN from environment: {}", flag);
                    self.big_endian = Some(flag);
                }
                None => log::warn!("Ignoring AXI_EMU_BIG_ENDIAN={}", value),
            }
        }
    }

    /// `~/.config/axi-emu/config.toml`, or `None` without a config dir.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("axi-emu").join("config.toml"))
    }

    /// Commented TOML listing every setting at its default.
    pub fn sample_config() -> String {
        r#"# axi-emu configuration
# Place this file at ~/.config/axi-emu/config.toml or ./axi-emu.toml

# Cycles a harness waits for one operation before reporting a stall
cycle_limit = 1000

# Pack data words into memory big-endian (default: little-endian)
# big_endian = false

# Bus geometry. AXI4-Lite slaves accept data widths of 32 or 64 only.
address_width = 32
data_width = 32

# Backing memory size in bytes for bench slaves
# memory_size = 65536
"#
        .to_string()
    }
}

/// Parse a boolean environment flag.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cycle_limit(), DEFAULT_CYCLE_LIMIT);
        assert!(!config.big_endian());
        assert_eq!(config.address_width(), 32);
        assert_eq!(config.data_width(), 32);
        assert_eq!(config.memory_size(), DEFAULT_MEMORY_SIZE);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            cycle_limit: Some(500),
            big_endian: None,
            data_width: Some(32),
            ..Default::default()
        };

        let overlay = Config {
            cycle_limit: None,
            big_endian: Some(true),
            data_width: Some(64),
            ..Default::default()
        };

        base.merge(overlay);

        assert_eq!(base.cycle_limit, Some(500));
        assert_eq!(base.big_endian, Some(true));
        assert_eq!(base.data_width, Some(64));
        assert_eq!(base.address_width, None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.cycle_limit, Some(1000));
        assert_eq!(config.data_width, Some(32));
        assert_eq!(config.big_endian, None);
    }
}
