// context.rs - State shared between the poller, network thread and hooks.
//
// Built once by the worker thread and handed out as `Arc<BridgeContext>`.
// Nothing in here touches the host runtime: the accessor cache lives with
// the polling thread, which is the only place host calls are allowed.

use crate::config::Config;
use crate::input::Command;
use crate::projection::Viewport;
use crate::settings::Settings;
use crate::snapshot::SnapshotSlot;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::error;

/// Queued outbound commands beyond this are dropped (no controller reading).
const MAX_PENDING_COMMANDS: usize = 64;

/// Longest single sleep inside `pause`, so a cleared running flag is seen
/// promptly.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

pub struct BridgeContext {
    pub settings: Settings,
    pub snapshots: SnapshotSlot,
    config: Mutex<Config>,
    commands: Mutex<VecDeque<Command>>,
    running: AtomicBool,
    overlay_visible: AtomicBool,
    /// Width in the high half, height in the low half.
    viewport: AtomicU64,
}

impl BridgeContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            snapshots: SnapshotSlot::new(),
            config: Mutex::new(Config::default()),
            commands: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            overlay_visible: AtomicBool::new(true),
            viewport: AtomicU64::new(pack_viewport(Viewport::DEFAULT.width as u32, Viewport::DEFAULT.height as u32)),
        }
    }

    // -- lifecycle -------------------------------------------------------------

    pub fn running(&self) -> &AtomicBool {
        &self.running
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    // -- config ----------------------------------------------------------------

    /// Copy of the current config; the lock is held only for the clone.
    pub fn config(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn update_config<T>(&self, f: impl FnOnce(&mut Config) -> T) -> T {
        f(&mut self.config.lock())
    }

    /// Apply an inbound control message; `true` when it was a config line.
    pub fn apply_message(&self, msg: &Value) -> bool {
        self.config.lock().apply_message(msg)
    }

    // -- outbound commands -----------------------------------------------------

    pub fn push_command(&self, cmd: Command) {
        let mut q = self.commands.lock();
        if q.len() >= MAX_PENDING_COMMANDS {
            q.pop_front();
        }
        q.push_back(cmd);
    }

    pub fn drain_commands(&self) -> Vec<Command> {
        self.commands.lock().drain(..).collect()
    }

    // -- render-side state -----------------------------------------------------

    /// Last viewport seen by the render callback.
    pub fn viewport(&self) -> Viewport {
        let packed = self.viewport.load(Ordering::Relaxed);
        Viewport::new((packed >> 32) as u32 as f32, packed as u32 as f32)
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport.store(pack_viewport(width, height), Ordering::Relaxed);
        }
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible.load(Ordering::Relaxed)
    }

    /// Flip the local overlay toggle; returns the new state.
    pub fn toggle_overlay(&self) -> bool {
        !self.overlay_visible.fetch_xor(true, Ordering::Relaxed)
    }
}

fn pack_viewport(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}

/// Sleep up to `total`, waking early once `running` clears. Returns whether
/// the flag is still set.
pub fn pause(running: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown"
    }
}

/// Join every thread, logging the ones that panicked. Returns how many did.
pub fn join_all(threads: Vec<JoinHandle<()>>) -> usize {
    let mut panicked = 0;
    for t in threads {
        let name = t.thread().name().unwrap_or("unnamed").to_owned();
        if let Err(payload) = t.join() {
            error!(thread = %name, reason = panic_reason(&*payload), "thread panicked");
            panicked += 1;
        }
    }
    panicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_messages_go_through_the_lock() {
        let ctx = BridgeContext::new(Settings::default());
        assert!(ctx.apply_message(&json!({"type": "config", "nametags": true})));
        assert!(ctx.config().nametags);
        assert!(!ctx.apply_message(&json!({"type": "ping"})));
    }

    #[test]
    fn command_queue_is_bounded_and_drains_in_order() {
        let ctx = BridgeContext::new(Settings::default());
        for i in 0..(MAX_PENDING_COMMANDS + 3) {
            ctx.push_command(Command::Toggle { module: "nametags", value: i % 2 == 0 });
        }
        let drained = ctx.drain_commands();
        assert_eq!(drained.len(), MAX_PENDING_COMMANDS);
        assert_eq!(drained[0], Command::Toggle { module: "nametags", value: false });
        assert!(ctx.drain_commands().is_empty());
    }

    #[test]
    fn overlay_toggle_and_viewport() {
        let ctx = BridgeContext::new(Settings::default());
        assert_eq!(ctx.viewport(), Viewport::DEFAULT);
        ctx.set_viewport(0, 700);
        assert_eq!(ctx.viewport(), Viewport::DEFAULT);
        ctx.set_viewport(1280, 720);
        assert_eq!(ctx.viewport(), Viewport::new(1280.0, 720.0));

        assert!(ctx.overlay_visible());
        assert!(!ctx.toggle_overlay());
        assert!(ctx.toggle_overlay());
    }

    #[test]
    fn viewport_is_never_torn() {
        let ctx = std::sync::Arc::new(BridgeContext::new(Settings::default()));
        let writer = {
            let ctx = std::sync::Arc::clone(&ctx);
            std::thread::spawn(move || {
                for i in 0..20_000 {
                    if i % 2 == 0 {
                        ctx.set_viewport(1280, 720);
                    } else {
                        ctx.set_viewport(1920, 1080);
                    }
                }
            })
        };
        let seen = [Viewport::DEFAULT, Viewport::new(1280.0, 720.0), Viewport::new(1920.0, 1080.0)];
        for _ in 0..20_000 {
            let vp = ctx.viewport();
            assert!(seen.contains(&vp), "{vp:?}");
        }
        writer.join().unwrap();
    }

    #[test]
    fn join_all_counts_panicked_threads() {
        let named = std::thread::Builder::new()
            .name("bridge-net".into())
            .spawn(|| panic!("socket gone"))
            .unwrap();
        let owned = std::thread::spawn(|| std::panic::panic_any(String::from("owned reason")));
        let fine = std::thread::spawn(|| {});
        assert_eq!(join_all(vec![named, owned, fine]), 2);
        assert_eq!(join_all(Vec::new()), 0);
    }

    #[test]
    fn panic_payloads_become_text() {
        let s: Box<dyn Any + Send> = Box::new("static reason");
        assert_eq!(panic_reason(&*s), "static reason");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_reason(&*s), "owned");
        let s: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_reason(&*s), "unknown");
    }

    #[test]
    fn pause_returns_early_when_stopped() {
        let flag = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!pause(&flag, Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
        let flag = AtomicBool::new(true);
        assert!(pause(&flag, Duration::from_millis(1)));
    }
}
