//! Relay configuration.
//!
//! Settings are layered from lowest to highest precedence: built-in
//! defaults, an optional `key = value` config file, `SLOWRELAY_*`
//! environment variables, and finally command-line flags. The merged
//! settings are validated once into an immutable [`RelayConfig`].

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use macaddr::MacAddr6;
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/slowrelay.conf";
pub const DEFAULT_CAPACITY: usize = 512;
pub const DEFAULT_DELAY_MS: u64 = 0;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Validated relay configuration. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface frames are captured on.
    pub interface: String,
    /// Interface frames are forwarded out of. Defaults to `interface`.
    pub egress_interface: Option<String>,
    /// Next-hop address written as destination of every forwarded frame.
    pub gateway_mac: MacAddr6,
    /// Source address for forwarded frames. Resolved from the egress
    /// interface when not set.
    pub local_mac: Option<MacAddr6>,
    /// Only frames with this IPv4 source are forwarded.
    pub target: Ipv4Addr,
    /// Hold time applied to every forwarded frame.
    pub delay: Duration,
    /// Queue capacity in frames.
    pub capacity: usize,
    /// Longest a loop waits before checking for shutdown.
    pub poll_interval: Duration,
}

impl RelayConfig {
    pub fn egress_interface(&self) -> &str {
        self.egress_interface.as_deref().unwrap_or(&self.interface)
    }
}

/// Unvalidated settings from a single source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Settings {
    pub interface: Option<String>,
    pub egress_interface: Option<String>,
    pub gateway: Option<String>,
    pub local_mac: Option<String>,
    pub target: Option<String>,
    pub delay_ms: Option<String>,
    pub capacity: Option<String>,
}

impl Settings {
    /// Parse `key = value` lines. Blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        let mut settings = Settings::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring malformed config line: {}", line);
                continue;
            };
            let value = Some(value.trim().to_string());
            match key.trim() {
                "interface" => settings.interface = value,
                "egress_interface" => settings.egress_interface = value,
                "gateway" => settings.gateway = value,
                "local_mac" => settings.local_mac = value,
                "target" => settings.target = value,
                "delay_ms" => settings.delay_ms = value,
                "capacity" => settings.capacity = value,
                other => warn!("Ignoring unknown config key: {}", other),
            }
        }
        settings
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Read `SLOWRELAY_*` environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Settings {
            interface: var("SLOWRELAY_INTERFACE"),
            egress_interface: var("SLOWRELAY_EGRESS_INTERFACE"),
            gateway: var("SLOWRELAY_GATEWAY"),
            local_mac: var("SLOWRELAY_LOCAL_MAC"),
            target: var("SLOWRELAY_TARGET"),
            delay_ms: var("SLOWRELAY_DELAY_MS"),
            capacity: var("SLOWRELAY_CAPACITY"),
        }
    }

    /// Overlay `higher` on top of `self`; values set in `higher` win.
    pub fn merge(self, higher: Settings) -> Settings {
        Settings {
            interface: higher.interface.or(self.interface),
            egress_interface: higher.egress_interface.or(self.egress_interface),
            gateway: higher.gateway.or(self.gateway),
            local_mac: higher.local_mac.or(self.local_mac),
            target: higher.target.or(self.target),
            delay_ms: higher.delay_ms.or(self.delay_ms),
            capacity: higher.capacity.or(self.capacity),
        }
    }

    /// Validate into a [`RelayConfig`].
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let interface = self
            .interface
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::Missing("interface"))?;
        let egress_interface = self.egress_interface.filter(|name| !name.is_empty());

        let gateway_mac = parse_mac("gateway", self.gateway.as_deref())?
            .ok_or(ConfigError::Missing("gateway"))?;
        let local_mac = parse_mac("local_mac", self.local_mac.as_deref())?;

        let target = self.target.ok_or(ConfigError::Missing("target"))?;
        let target = target
            .parse::<Ipv4Addr>()
            .map_err(|_| ConfigError::InvalidAddress {
                key: "target",
                value: target.clone(),
            })?;

        let delay_ms = match self.delay_ms {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                key: "delay_ms",
                value: value.clone(),
            })?,
            None => DEFAULT_DELAY_MS,
        };

        let capacity = match self.capacity {
            Some(value) => value.parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
                key: "capacity",
                value: value.clone(),
            })?,
            None => DEFAULT_CAPACITY,
        };
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(RelayConfig {
            interface,
            egress_interface,
            gateway_mac,
            local_mac,
            target,
            delay: Duration::from_millis(delay_ms),
            capacity,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

fn parse_mac(key: &'static str, value: Option<&str>) -> Result<Option<MacAddr6>, ConfigError> {
    value
        .map(|value| {
            value.parse::<MacAddr6>().map_err(|_| ConfigError::InvalidMac {
                key,
                value: value.to_string(),
            })
        })
        .transpose()
}

/// Pick the config file to read.
///
/// An explicit path always wins, then `SLOWRELAY_CONFIG`. The default path
/// is only used if it exists.
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("SLOWRELAY_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.exists().then(|| default.to_path_buf())
}

/// Load file and environment settings and overlay `cli` on top.
pub fn load(config_path: Option<&Path>, cli: Settings) -> Result<RelayConfig, ConfigError> {
    let file = match config_file_path(config_path) {
        Some(path) => Settings::from_file(&path)?,
        None => Settings::default(),
    };
    file.merge(Settings::from_env()).merge(cli).into_config()
}
