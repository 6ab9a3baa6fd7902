// config.rs - Controller-owned feature toggles and parameters.
//
// The external controller pushes `{"type":"config", ...}` lines over the
// control channel. Each line carries any subset of the fields below; only
// the keys present are applied, everything else keeps its current value.

use serde::Deserialize;
use serde_json::Value;

/// Upper bound for the per-overlay record counts.
pub const MAX_OVERLAY_COUNT: u32 = 20;

/// Default Win32 virtual key for the autoclicker toggle (backtick / `VK_OEM_3`).
pub const DEFAULT_AUTOCLICKER_KEY: u32 = 0xC0;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    // Click timing: stored and echoed, the timing itself runs in the controller.
    pub armed: bool,
    pub clicking: bool,
    pub min_cps: f32,
    pub max_cps: f32,
    pub jitter: bool,
    pub click_in_chests: bool,
    pub right: bool,
    pub right_min_cps: f32,
    pub right_max_cps: f32,
    pub right_block: bool,
    pub break_blocks: bool,

    // Overlays
    pub nametags: bool,
    pub chest_esp: bool,
    pub closest_player_info: bool,
    pub nametag_show_health: bool,
    pub nametag_show_armor: bool,
    pub nametag_max_count: u32,
    pub chest_esp_max_count: u32,

    pub keybinds: Keybinds,
}

/// Virtual-key codes for the local hotkeys. Zero means unbound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keybinds {
    pub autoclicker: u32,
    pub nametags: u32,
    pub closest_player: u32,
    pub chest_esp: u32,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            autoclicker: DEFAULT_AUTOCLICKER_KEY,
            nametags: 0,
            closest_player: 0,
            chest_esp: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            armed: false,
            clicking: false,
            min_cps: 10.0,
            max_cps: 14.0,
            jitter: false,
            click_in_chests: false,
            right: false,
            right_min_cps: 10.0,
            right_max_cps: 14.0,
            right_block: false,
            break_blocks: false,
            nametags: false,
            chest_esp: false,
            closest_player_info: false,
            nametag_show_health: true,
            nametag_show_armor: true,
            nametag_max_count: 8,
            chest_esp_max_count: 5,
            keybinds: Keybinds::default(),
        }
    }
}

/// One inbound `config` line. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub armed: Option<bool>,
    pub clicking: Option<bool>,
    #[serde(rename = "minCPS")]
    pub min_cps: Option<f32>,
    #[serde(rename = "maxCPS")]
    pub max_cps: Option<f32>,
    pub jitter: Option<bool>,
    pub click_in_chests: Option<bool>,
    pub right: Option<bool>,
    #[serde(rename = "rightMinCPS")]
    pub right_min_cps: Option<f32>,
    #[serde(rename = "rightMaxCPS")]
    pub right_max_cps: Option<f32>,
    pub right_block: Option<bool>,
    pub break_blocks: Option<bool>,
    pub nametags: Option<bool>,
    pub chest_esp: Option<bool>,
    pub closest_player_info: Option<bool>,
    pub nametag_show_health: Option<bool>,
    pub nametag_show_armor: Option<bool>,
    pub nametag_max_count: Option<i64>,
    pub chest_esp_max_count: Option<i64>,
    pub keybind_autoclicker: Option<u32>,
    pub keybind_nametags: Option<u32>,
    pub keybind_closest_player: Option<u32>,
    pub keybind_chest_esp: Option<u32>,
}

macro_rules! apply {
    ($dst:expr, $src:expr) => {
        if let Some(v) = $src {
            $dst = v;
        }
    };
}

impl Config {
    /// Apply the fields present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: ConfigPatch) {
        apply!(self.armed, patch.armed);
        apply!(self.clicking, patch.clicking);
        apply!(self.min_cps, patch.min_cps);
        apply!(self.max_cps, patch.max_cps);
        apply!(self.jitter, patch.jitter);
        apply!(self.click_in_chests, patch.click_in_chests);
        apply!(self.right, patch.right);
        apply!(self.right_min_cps, patch.right_min_cps);
        apply!(self.right_max_cps, patch.right_max_cps);
        apply!(self.right_block, patch.right_block);
        apply!(self.break_blocks, patch.break_blocks);
        apply!(self.nametags, patch.nametags);
        apply!(self.chest_esp, patch.chest_esp);
        apply!(self.closest_player_info, patch.closest_player_info);
        apply!(self.nametag_show_health, patch.nametag_show_health);
        apply!(self.nametag_show_armor, patch.nametag_show_armor);
        if let Some(n) = patch.nametag_max_count {
            self.nametag_max_count = clamp_count(n);
        }
        if let Some(n) = patch.chest_esp_max_count {
            self.chest_esp_max_count = clamp_count(n);
        }
        apply!(self.keybinds.autoclicker, patch.keybind_autoclicker);
        apply!(self.keybinds.nametags, patch.keybind_nametags);
        apply!(self.keybinds.closest_player, patch.keybind_closest_player);
        apply!(self.keybinds.chest_esp, patch.keybind_chest_esp);
    }

    /// Apply an inbound control message if it is a `config` message.
    ///
    /// Returns `true` when the message was a config line and parsed cleanly.
    /// Any other message type, or a config line with badly typed fields,
    /// leaves the config unchanged.
    pub fn apply_message(&mut self, msg: &Value) -> bool {
        if msg.get("type").and_then(Value::as_str) != Some("config") {
            return false;
        }
        match ConfigPatch::deserialize(msg) {
            Ok(patch) => {
                self.apply(patch);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether the reader needs the per-entity heavy lookups this pass.
    pub fn wants_entity_details(&self) -> bool {
        self.nametags || self.closest_player_info
    }
}

fn clamp_count(n: i64) -> u32 {
    n.clamp(1, MAX_OVERLAY_COUNT as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_key_leaves_everything_else() {
        let mut cfg = Config::default();
        cfg.nametags = true;
        cfg.min_cps = 7.5;
        cfg.nametag_max_count = 3;
        let before = cfg.clone();

        assert!(cfg.apply_message(&json!({"type": "config", "armed": true})));

        assert!(cfg.armed);
        assert_eq!(Config { armed: false, ..cfg.clone() }, before);
    }

    #[test]
    fn wire_names_map_to_fields() {
        let mut cfg = Config::default();
        cfg.apply_message(&json!({
            "type": "config",
            "minCPS": 8.0,
            "rightMaxCPS": 20.0,
            "chestEsp": true,
            "closestPlayerInfo": true,
            "nametagShowArmor": false,
            "keybindNametags": 0x4E
        }));
        assert_eq!(cfg.min_cps, 8.0);
        assert_eq!(cfg.right_max_cps, 20.0);
        assert!(cfg.chest_esp);
        assert!(cfg.closest_player_info);
        assert!(!cfg.nametag_show_armor);
        assert_eq!(cfg.keybinds.nametags, 0x4E);
        assert_eq!(cfg.keybinds.autoclicker, DEFAULT_AUTOCLICKER_KEY);
    }

    #[test]
    fn counts_are_clamped() {
        let mut cfg = Config::default();
        cfg.apply_message(&json!({"type": "config", "nametagMaxCount": 99, "chestEspMaxCount": 0}));
        assert_eq!(cfg.nametag_max_count, MAX_OVERLAY_COUNT);
        assert_eq!(cfg.chest_esp_max_count, 1);
    }

    #[test]
    fn other_message_types_are_ignored() {
        let mut cfg = Config::default();
        assert!(!cfg.apply_message(&json!({"type": "state", "armed": true})));
        assert!(!cfg.apply_message(&json!({"armed": true})));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut cfg = Config::default();
        assert!(cfg.apply_message(&json!({"type": "config", "someFutureFlag": 1, "jitter": true})));
        assert!(cfg.jitter);
    }

    #[test]
    fn badly_typed_patch_changes_nothing() {
        let mut cfg = Config::default();
        assert!(!cfg.apply_message(&json!({"type": "config", "armed": "yes", "jitter": true})));
        assert_eq!(cfg, Config::default());
    }
}
