// settings.rs - Static bridge settings, read once at attach.
//
// These are the knobs the controller never touches: socket port, poll
// cadences and the discovery retry policy. They come from an optional
// `bridge.toml` placed next to the injected module; anything missing falls
// back to the defaults below.

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// File name looked up next to the module.
pub const SETTINGS_FILE: &str = "bridge.toml";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Control channel port (localhost only).
    pub port: u16,
    pub bind: String,
    /// Sleep between poll passes; also the state-line cadence.
    pub poll_interval_ms: u64,
    pub entity_interval_ms: u64,
    pub container_interval_ms: u64,
    /// Container scan is suppressed this long after a screen or world change.
    pub world_transition_ms: u64,
    pub discovery_attempts: u32,
    pub discovery_backoff_ms: u64,
    /// Wait before the first discovery attempt so the host can finish booting.
    pub startup_delay_ms: u64,
    /// How often unresolved live roles are re-attempted by the poller.
    pub live_role_retry_ms: u64,
    /// Chunk radius of the container scan (chunks on each side of the player).
    pub chunk_radius: i32,
    /// Upper bound on entities sampled from the world list per pass.
    pub entity_cap: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 25590,
            bind: "127.0.0.1".into(),
            poll_interval_ms: 50,
            entity_interval_ms: 100,
            container_interval_ms: 100,
            world_transition_ms: 5000,
            discovery_attempts: 5,
            discovery_backoff_ms: 3000,
            startup_delay_ms: 5000,
            live_role_retry_ms: 2000,
            chunk_radius: 4,
            entity_cap: 128,
            log_level: "info".into(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Unknown keys are ignored.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut s: Settings = toml::from_str(text)?;
        s.sanitize();
        Ok(s)
    }

    /// Load `bridge.toml` from `dir`. A missing file yields defaults; a
    /// malformed one yields defaults plus the parse error for logging.
    pub fn load(dir: &Path) -> (Self, Option<crate::error::BridgeError>) {
        let path = dir.join(SETTINGS_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => return (Self::default(), None),
        };
        match Self::from_toml(&text) {
            Ok(s) => (s, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1000);
        self.discovery_attempts = self.discovery_attempts.max(1);
        self.chunk_radius = self.chunk_radius.clamp(0, 8);
        self.entity_cap = self.entity_cap.clamp(1, 1024);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn entity_interval(&self) -> Duration {
        Duration::from_millis(self.entity_interval_ms)
    }

    pub fn container_interval(&self) -> Duration {
        Duration::from_millis(self.container_interval_ms)
    }

    pub fn world_transition(&self) -> Duration {
        Duration::from_millis(self.world_transition_ms)
    }

    pub fn live_role_retry(&self) -> Duration {
        Duration::from_millis(self.live_role_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let s = Settings::from_toml("port = 30000\nchunk_radius = 2\n").unwrap();
        assert_eq!(s.port, 30000);
        assert_eq!(s.chunk_radius, 2);
        assert_eq!(s.poll_interval_ms, 50);
        assert_eq!(s.discovery_attempts, 5);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let s = Settings::from_toml("poll_interval_ms = 0\nchunk_radius = 99\ndiscovery_attempts = 0").unwrap();
        assert_eq!(s.poll_interval_ms, 10);
        assert_eq!(s.chunk_radius, 8);
        assert_eq!(s.discovery_attempts, 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Settings::from_toml("port = \"abc\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = std::env::temp_dir().join("client_bridge_settings_missing");
        let (s, err) = Settings::load(&dir);
        assert!(err.is_none());
        assert_eq!(s, Settings::default());
    }
}
