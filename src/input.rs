// input.rs - Local hotkeys captured from the game window.
//
// The window procedure hands every key-down here. Bound keys flip the
// matching Config flag on the spot and queue a `cmd` line so the controller
// can mirror the change. F6 only toggles the overlay and never leaves the
// process. Keys that did something are kept from the game.

use crate::config::Config;
use crate::context::BridgeContext;
use serde::Serialize;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

/// Local overlay toggle.
pub const VK_F6: u32 = 0x75;
/// Asks the controller to show or hide its own window.
pub const VK_INSERT: u32 = 0x2D;

/// One-shot command pushed to the controller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// A module was switched locally with its keybind.
    Toggle { module: &'static str, value: bool },
    ToggleExternalGui,
}

/// Wire form: `{"type":"cmd","action":...}`.
#[derive(Serialize)]
struct CmdLine<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    cmd: &'a Command,
}

impl Command {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&CmdLine { kind: "cmd", cmd: self })
    }
}

/// Modules that can carry a keybind, with their wire name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Module {
    Autoclicker,
    Nametags,
    ClosestPlayer,
    ChestEsp,
}

impl Module {
    pub const ALL: [Module; 4] = [Module::Autoclicker, Module::Nametags, Module::ClosestPlayer, Module::ChestEsp];

    pub fn name(self) -> &'static str {
        match self {
            Module::Autoclicker => "autoclicker",
            Module::Nametags => "nametags",
            Module::ClosestPlayer => "closestPlayer",
            Module::ChestEsp => "chestEsp",
        }
    }

    fn key(self, cfg: &Config) -> u32 {
        match self {
            Module::Autoclicker => cfg.keybinds.autoclicker,
            Module::Nametags => cfg.keybinds.nametags,
            Module::ClosestPlayer => cfg.keybinds.closest_player,
            Module::ChestEsp => cfg.keybinds.chest_esp,
        }
    }

    fn flag(self, cfg: &mut Config) -> &mut bool {
        match self {
            Module::Autoclicker => &mut cfg.armed,
            Module::Nametags => &mut cfg.nametags,
            Module::ClosestPlayer => &mut cfg.closest_player_info,
            Module::ChestEsp => &mut cfg.chest_esp,
        }
    }

    /// Module bound to `vk`, if any. Unbound (0) never matches.
    pub fn bound_to(cfg: &Config, vk: u32) -> Option<Module> {
        if vk == 0 {
            return None;
        }
        Module::ALL.into_iter().find(|m| m.key(cfg) == vk)
    }
}

/// What a key-down did.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyAction {
    Ignored,
    Overlay(bool),
    Command(Command),
}

impl KeyAction {
    /// Whether the game should not see the key.
    pub fn consumed(&self) -> bool {
        !matches!(self, KeyAction::Ignored)
    }
}

// ============================================================
// Subclass slot
// ============================================================

/// The subclassed window and the procedure it had before. Both are plain
/// integers so the slot can live in a static.
pub struct Subclass {
    window: AtomicUsize,
    previous: AtomicIsize,
}

impl Subclass {
    pub const fn new() -> Self {
        Self { window: AtomicUsize::new(0), previous: AtomicIsize::new(0) }
    }

    /// Reserve the slot for `window`. False when a window is already held.
    pub fn claim(&self, window: usize) -> bool {
        window != 0 && self.window.compare_exchange(0, window, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.window.load(Ordering::Acquire) != 0
    }

    pub fn set_previous(&self, previous: isize) {
        self.previous.store(previous, Ordering::Release);
    }

    /// Procedure to forward messages to, 0 when none is saved.
    pub fn previous(&self) -> isize {
        self.previous.load(Ordering::Acquire)
    }

    /// Put the saved procedure back through `restore`, then clear the slot.
    /// Messages arriving while `restore` runs still find the saved procedure.
    pub fn release(&self, restore: impl FnOnce(usize, isize)) {
        let window = self.window.load(Ordering::Acquire);
        let previous = self.previous();
        if window != 0 && previous != 0 {
            restore(window, previous);
        }
        self.previous.store(0, Ordering::Release);
        self.window.store(0, Ordering::Release);
    }
}

impl Default for Subclass {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle one key-down. `repeat` is the auto-repeat bit of the message.
pub fn on_key_down(ctx: &BridgeContext, vk: u32, repeat: bool) -> KeyAction {
    if repeat {
        return KeyAction::Ignored;
    }
    if vk == VK_F6 {
        return KeyAction::Overlay(ctx.toggle_overlay());
    }
    if vk == VK_INSERT {
        ctx.push_command(Command::ToggleExternalGui);
        return KeyAction::Command(Command::ToggleExternalGui);
    }
    let toggled = ctx.update_config(|cfg| {
        let module = Module::bound_to(cfg, vk)?;
        let flag = module.flag(cfg);
        *flag = !*flag;
        Some(Command::Toggle { module: module.name(), value: *flag })
    });
    match toggled {
        Some(cmd) => {
            tracing::debug!(?cmd, vk, "keybind");
            ctx.push_command(cmd.clone());
            KeyAction::Command(cmd)
        }
        None => KeyAction::Ignored,
    }
}
