use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::paths;

pub const DEFAULT_APP_NAME: &str = "FreeTube";
/// Flatpak cache location used by the periodic refresher.
pub const DEFAULT_PERIODIC_CACHE_DIR: &str = "~/.var/app/io.freetubeapp.FreeTube/cache";
/// Native-install cache location used by the network watcher.
pub const DEFAULT_WATCH_CACHE_DIR: &str = "~/.config/FreeTube/Cache";
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_SETTLE_SECS: u64 = 4;
pub const DEFAULT_SESSION_DOMAIN: &str = "youtube.com";
pub const DEFAULT_WATCH_DOMAINS: &[&str] = &["youtube.com", "google.com"];
pub const DEFAULT_VPN_REGION: &str = "US-FL";
pub const DEFAULT_VPN_POOL_SIZE: u32 = 218;
pub const DEFAULT_VPN_SETTLE_SECS: u64 = 2;
pub const DEFAULT_TOAST_KEYWORDS: &[&str] = &["block", "legacy"];

/// Root configuration structure. Deserialized from the tubeflush config.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub periodic: PeriodicConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
}

/// Settings for the interval-driven refresher.
#[derive(Debug, Deserialize, Clone)]
pub struct PeriodicConfig {
    /// Cache directory cleared on every tick. `~` and `$HOME` are expanded.
    #[serde(default = "default_periodic_cache_dir")]
    pub cache_dir: String,
    /// Case-insensitive substring of the application's window title.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Wait between clearing the cache and sending the refresh.
    #[serde(default = "default_cache_settle_secs")]
    pub settle_secs: u64,
    /// A live connection to this host suppresses the refresh.
    #[serde(default = "default_session_domain")]
    pub session_domain: String,
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_periodic_cache_dir(),
            app_name: default_app_name(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            settle_secs: DEFAULT_CACHE_SETTLE_SECS,
            session_domain: default_session_domain(),
        }
    }
}

impl PeriodicConfig {
    pub fn cache_path(&self) -> PathBuf {
        paths::expand_home(&self.cache_dir)
    }
}

/// Settings for the packet-driven watcher.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_cache_settle_secs")]
    pub settle_secs: u64,
    /// Destination-host substrings that count as a match.
    #[serde(default = "default_watch_domains")]
    pub domains: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_watch_cache_dir(),
            app_name: default_app_name(),
            settle_secs: DEFAULT_CACHE_SETTLE_SECS,
            domains: default_watch_domains(),
        }
    }
}

impl WatchConfig {
    pub fn cache_path(&self) -> PathBuf {
        paths::expand_home(&self.cache_dir)
    }
}

/// VPN server pool and the on-screen keywords that trigger a rotation.
#[derive(Debug, Deserialize, Clone)]
pub struct VpnConfig {
    /// Prefix of every server id, e.g. "US-FL" in "US-FL#12".
    #[serde(default = "default_vpn_region")]
    pub region: String,
    /// Servers are numbered 1 through `pool_size`.
    #[serde(default = "default_vpn_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_vpn_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_toast_keywords")]
    pub keywords: Vec<String>,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            region: default_vpn_region(),
            pool_size: DEFAULT_VPN_POOL_SIZE,
            settle_secs: DEFAULT_VPN_SETTLE_SECS,
            keywords: default_toast_keywords(),
        }
    }
}

/// Command-line values that take precedence over the `[periodic]` table.
#[derive(Debug, Default)]
pub struct PeriodicOverrides {
    pub cache_dir: Option<String>,
    pub app_name: Option<String>,
    pub interval_secs: Option<u64>,
}

impl Config {
    pub fn apply_periodic_overrides(&mut self, overrides: PeriodicOverrides) {
        if let Some(dir) = overrides.cache_dir {
            self.periodic.cache_dir = dir;
        }
        if let Some(name) = overrides.app_name {
            self.periodic.app_name = name;
        }
        if let Some(secs) = overrides.interval_secs {
            self.periodic.interval_secs = secs;
        }
    }

    /// Rejects values that would make either loop meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.periodic.interval_secs == 0 {
            bail!("periodic.interval_secs must be greater than zero");
        }
        if self.periodic.app_name.trim().is_empty() || self.watch.app_name.trim().is_empty() {
            bail!("app_name must not be empty");
        }
        if self.watch.domains.is_empty() {
            bail!("watch.domains must list at least one domain");
        }
        if self.vpn.pool_size == 0 {
            bail!("vpn.pool_size must be at least 1");
        }
        if self.vpn.keywords.iter().all(|k| k.trim().is_empty()) {
            bail!("vpn.keywords must contain at least one non-empty keyword");
        }
        Ok(())
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_periodic_cache_dir() -> String {
    DEFAULT_PERIODIC_CACHE_DIR.to_string()
}

fn default_watch_cache_dir() -> String {
    DEFAULT_WATCH_CACHE_DIR.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_cache_settle_secs() -> u64 {
    DEFAULT_CACHE_SETTLE_SECS
}

fn default_session_domain() -> String {
    DEFAULT_SESSION_DOMAIN.to_string()
}

fn default_watch_domains() -> Vec<String> {
    DEFAULT_WATCH_DOMAINS.iter().map(|d| d.to_string()).collect()
}

fn default_vpn_region() -> String {
    DEFAULT_VPN_REGION.to_string()
}

fn default_vpn_pool_size() -> u32 {
    DEFAULT_VPN_POOL_SIZE
}

fn default_vpn_settle_secs() -> u64 {
    DEFAULT_VPN_SETTLE_SECS
}

fn default_toast_keywords() -> Vec<String> {
    DEFAULT_TOAST_KEYWORDS.iter().map(|k| k.to_string()).collect()
}
