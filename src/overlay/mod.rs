// overlay/mod.rs - Per-frame overlay composition and GL context tracking.
//
// Runs inside the swap-buffers detour on the game's render thread. The
// composer reads nothing but copies: the Config clone and the latest
// published snapshot. It projects, smooths, and lays out into a `DrawList`;
// a backend replays the list. No host call can happen here since nothing on
// this path has a runtime to call through.

pub mod draw;
#[cfg(windows)]
pub mod gl;
pub mod smoothing;

use crate::config::Config;
use crate::context::BridgeContext;
use crate::error::Result;
use crate::logging::LogOnce;
use crate::math::Vec3;
use crate::projection::{CameraBasis, Projector, ScreenPoint, Viewport};
use crate::reader::CONTAINER_RANGE;
use crate::snapshot::{EntityRecord, StaticFeatureRecord, WorldSnapshot};
use draw::{
    container_color, health_color, text_height, text_width, DrawList, BAR_BG, CONTAINER_FILL, HELD_ITEM, HUD_BG,
    HUD_BORDER, PANEL_BG, STATS, STATS_LOW, STATUS, TEXT_SCALE, WHITE,
};
use smoothing::OverlaySmoothing;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Full health for the bar fraction.
const MAX_HEALTH: f32 = 20.0;
/// Stats text turns red at or below this.
const LOW_HEALTH: f32 = 8.0;
/// Corners of a unit block relative to its minimum corner.
const BLOCK_CORNERS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];
/// A box needs at least this many corners in front of the camera.
const MIN_BOX_CORNERS: usize = 4;
const HUD_ORIGIN: (f32, f32) = (10.0, 10.0);
const HUD_MIN_WIDTH: f32 = 220.0;

/// Names made only of these are hologram separators, not players.
fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| matches!(c, '-' | '=' | ' ' | '_' | '[' | ']'))
}

/// Label scale shrinking with distance, floored so far tags stay legible.
fn name_scale(distance: f64) -> f32 {
    ((1.0 - distance / 64.0) as f32).clamp(0.65, 1.0) * TEXT_SCALE
}

// ============================================================
// Composer
// ============================================================

pub struct RenderComposer {
    nametags: OverlaySmoothing<i32, 2>,
    containers: OverlaySmoothing<[i32; 3], 4>,
    last_frame: Option<Instant>,
    list: DrawList,
}

impl Default for RenderComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderComposer {
    pub fn new() -> Self {
        Self {
            nametags: OverlaySmoothing::new(),
            containers: OverlaySmoothing::new(),
            last_frame: None,
            list: DrawList::new(),
        }
    }

    /// Compose one frame from the shared context.
    pub fn compose_from(&mut self, ctx: &BridgeContext, now: Instant) -> &DrawList {
        let config = ctx.config();
        let snapshot = ctx.snapshots.latest();
        self.compose(&config, &snapshot, ctx.viewport(), ctx.overlay_visible(), now)
    }

    pub fn compose(
        &mut self,
        config: &Config,
        snapshot: &WorldSnapshot,
        viewport: Viewport,
        visible: bool,
        now: Instant,
    ) -> &DrawList {
        let dt = self
            .last_frame
            .map(|t| now.saturating_duration_since(t).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.nametags.evict(now);
        self.containers.evict(now);
        self.list.clear();

        if !visible {
            self.list.shadow_text(6.0, 6.0, "overlay off (F6)", STATUS, TEXT_SCALE);
            return &self.list;
        }
        if !snapshot.in_world || !viewport.is_valid() {
            return &self.list;
        }
        let Some(camera) = snapshot.camera.as_ref() else {
            return &self.list;
        };
        let projector = Projector::new(camera, viewport);

        if config.chest_esp {
            self.compose_containers(config, &snapshot.containers, &projector, dt, now);
        }
        if config.nametags {
            self.compose_nametags(config, &snapshot.entities, &projector, dt, now);
        }
        if config.closest_player_info {
            if let Some(closest) = snapshot.entities.iter().find(|e| e.detailed()) {
                self.compose_closest(config, closest, camera.eye, camera.yaw);
            }
        }
        &self.list
    }

    /// Smoothing entries currently tracked (nametags, containers).
    pub fn tracked(&self) -> (usize, usize) {
        (self.nametags.len(), self.containers.len())
    }

    fn compose_nametags(
        &mut self,
        config: &Config,
        entities: &[EntityRecord],
        projector: &Projector<'_>,
        dt: f32,
        now: Instant,
    ) {
        let cap = config.nametag_max_count as usize;
        let mut drawn = 0;
        for e in entities.iter().filter(|e| e.detailed()) {
            if drawn >= cap {
                break;
            }
            let name = e.name.as_deref().unwrap_or_default();
            if is_placeholder_name(name) {
                continue;
            }
            let Some(p) = projector.project(e.anchor()) else {
                continue;
            };
            let [x, y] = self.nametags.update(e.id, [p.x, p.y], dt, now);
            nametag_panel(&mut self.list, config, e, name, ScreenPoint { x, y });
            drawn += 1;
        }
    }

    fn compose_containers(
        &mut self,
        config: &Config,
        containers: &[StaticFeatureRecord],
        projector: &Projector<'_>,
        dt: f32,
        now: Instant,
    ) {
        let vp = projector.viewport();
        let nearest = containers
            .iter()
            .filter(|c| c.distance <= CONTAINER_RANGE)
            .take(config.chest_esp_max_count as usize);
        for c in nearest {
            let Some([x0, y0, x1, y1]) = block_bounds(projector, c.corner(), vp) else {
                continue;
            };
            let [x0, y0, x1, y1] = self.containers.update(c.block, [x0, y0, x1, y1], dt, now);
            self.list.fill_rect(x0, y0, x1, y1, CONTAINER_FILL);
            self.list.outline_rect(x0, y0, x1, y1, container_color(c.distance), 1.5);
        }
    }

    fn compose_closest(&mut self, config: &Config, e: &EntityRecord, eye: Vec3, yaw: f32) {
        let name = e.name.as_deref().unwrap_or_default();
        let title = format!("{} {}  {:.0}m", direction_arrow(eye, yaw, e.position), name, e.distance);
        let stats = stats_row(config, e, true);

        let scale = TEXT_SCALE;
        let small = scale * 0.82;
        let (pad_x, pad_y, gap, bar_h) = (10.0, 6.0, 3.0, 4.0);
        let width = HUD_MIN_WIDTH
            .max(text_width(&title, scale) + pad_x * 2.0)
            .max(text_width(&stats, small) + pad_x * 2.0);
        let mut height = pad_y * 2.0 + text_height(scale) + gap + bar_h + gap;
        if !stats.is_empty() {
            height += text_height(small) + gap;
        }

        let (x0, y0) = HUD_ORIGIN;
        let (x1, y1) = (x0 + width, y0 + height);
        self.list.fill_rect(x0, y0, x1, y1, HUD_BG);
        self.list.outline_rect(x0, y0, x1, y1, HUD_BORDER, 1.0);

        let mut y = y0 + pad_y;
        self.list.shadow_text(x0 + pad_x, y, &title, WHITE, scale);
        y += text_height(scale) + gap;

        let frac = e.health.map(|h| h / MAX_HEALTH).unwrap_or(0.0).clamp(0.0, 1.0);
        let (bx0, bx1) = (x0 + pad_x, x1 - pad_x);
        self.list.fill_rect(bx0, y, bx1, y + bar_h, BAR_BG);
        self.list.fill_rect(bx0, y, bx0 + (bx1 - bx0) * frac, y + bar_h, health_color(frac));
        y += bar_h + gap;

        if !stats.is_empty() {
            let low = e.health.is_some_and(|h| h <= LOW_HEALTH);
            self.list.shadow_text(x0 + pad_x, y, &stats, if low { STATS_LOW } else { STATS }, small);
        }
    }
}

/// "20 HP | 4 ARM", optionally followed by the held item.
fn stats_row(config: &Config, e: &EntityRecord, with_item: bool) -> String {
    let mut parts = Vec::new();
    if config.nametag_show_health {
        if let Some(hp) = e.health {
            parts.push(format!("{hp:.0} HP"));
        }
    }
    if config.nametag_show_armor {
        if let Some(armor) = e.armor.filter(|a| *a > 0) {
            parts.push(format!("{armor} ARM"));
        }
    }
    let mut row = parts.join(" | ");
    if with_item {
        if let Some(item) = &e.held_item {
            if !row.is_empty() {
                row.push_str("  ");
            }
            row.push_str(item);
        }
    }
    row
}

fn nametag_panel(list: &mut DrawList, config: &Config, e: &EntityRecord, name: &str, at: ScreenPoint) {
    let scale = name_scale(e.distance);
    let info = scale * 0.85;
    let stats = stats_row(config, e, false);
    let item = e.held_item.as_deref().unwrap_or_default();

    let mut width = text_width(name, scale);
    let mut height = text_height(scale);
    if !stats.is_empty() {
        width = width.max(text_width(&stats, info));
        height += text_height(info) + 2.0;
    }
    if !item.is_empty() {
        width = width.max(text_width(item, info));
        height += text_height(info) + 2.0;
    }

    let pad = (8.0 * scale).floor();
    let x0 = (at.x - width / 2.0).floor() - pad;
    let y0 = (at.y - height - pad * 2.0).floor();
    let x1 = x0 + width + pad * 2.0;
    let y1 = y0 + height + pad * 2.0;
    list.fill_rect(x0, y0, x1, y1, PANEL_BG);

    let centred = |text: &str, s: f32| (at.x - text_width(text, s) / 2.0).floor();
    let mut y = y0 + pad;
    list.shadow_text(centred(name, scale), y, name, WHITE, scale);
    y += text_height(scale) + 2.0;
    if !stats.is_empty() {
        let low = e.health.is_some_and(|h| h <= LOW_HEALTH);
        list.shadow_text(centred(&stats, info), y, &stats, if low { STATS_LOW } else { STATS }, info);
        y += text_height(info) + 2.0;
    }
    if !item.is_empty() {
        list.shadow_text(centred(item, info), y, item, HELD_ITEM, info);
    }

    if config.nametag_show_health {
        if let Some(hp) = e.health {
            let frac = (hp / MAX_HEALTH).clamp(0.0, 1.0);
            let bar_h = (6.0 * scale).floor().max(1.0);
            list.fill_rect(x0, y1, x0 + (x1 - x0) * frac, y1 + bar_h, health_color(frac));
        }
    }
}

/// Screen-space bounds of the unit block at `corner`, clamped to the
/// viewport. `None` when too few corners project or nothing is left after
/// clamping.
fn block_bounds(projector: &Projector<'_>, corner: Vec3, vp: Viewport) -> Option<[f32; 4]> {
    let mut bounds = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
    let mut projected = 0;
    for [dx, dy, dz] in BLOCK_CORNERS {
        let Some(p) = projector.project(corner + Vec3::new(dx, dy, dz)) else {
            continue;
        };
        bounds[0] = bounds[0].min(p.x);
        bounds[1] = bounds[1].min(p.y);
        bounds[2] = bounds[2].max(p.x);
        bounds[3] = bounds[3].max(p.y);
        projected += 1;
    }
    if projected < MIN_BOX_CORNERS {
        return None;
    }
    let [x0, y0, x1, y1] = bounds;
    let clamped = [x0.max(0.0), y0.max(0.0), x1.min(vp.width), y1.min(vp.height)];
    (clamped[2] > clamped[0] && clamped[3] > clamped[1]).then_some(clamped)
}

/// Where `target` is relative to the view direction, ignoring height.
fn direction_arrow(eye: Vec3, yaw: f32, target: Vec3) -> char {
    let basis = CameraBasis::from_angles(yaw, 0.0);
    let to = target - eye;
    let fwd = to.dot(basis.forward);
    let right = to.dot(basis.right);
    if right.abs() > fwd.abs() {
        if right >= 0.0 {
            '>'
        } else {
            '<'
        }
    } else if fwd >= 0.0 {
        '^'
    } else {
        'v'
    }
}

// ============================================================
// Context tracking
// ============================================================

/// Frames to wait after a context change before re-initialising.
pub const WARMUP_FRAMES: u32 = 3;

/// What the tracker needs from a rendering backend.
pub trait Backend {
    /// Create GL objects against the current context.
    fn init(&mut self) -> Result<()>;
    /// Drop everything. `delete_objects` is false when the objects belong to
    /// a context that is no longer current; they are forgotten, not deleted.
    fn teardown(&mut self, delete_objects: bool);
    fn draw(&mut self, list: &DrawList, viewport: Viewport);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninit,
    Ready { context: usize },
    WarmingUp { context: usize, frames_left: u32 },
}

/// Ties the backend's GL objects to the context they were created in.
pub struct ContextTracker<B: Backend> {
    backend: B,
    state: ContextState,
    init_failed: LogOnce,
}

impl<B: Backend> ContextTracker<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, state: ContextState::Uninit, init_failed: LogOnce::new() }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Advance for a frame rendered in `current`; true when the backend is
    /// ready to draw this frame.
    pub fn frame(&mut self, current: usize) -> bool {
        if current == 0 {
            return false;
        }
        match self.state {
            ContextState::Ready { context } if context == current => true,
            ContextState::Ready { context } => {
                info!(old = context, new = current, "GL context changed, deferring overlay re-init");
                self.backend.teardown(false);
                self.state = ContextState::WarmingUp { context: current, frames_left: WARMUP_FRAMES };
                false
            }
            ContextState::WarmingUp { context, .. } if context != current => {
                self.state = ContextState::WarmingUp { context: current, frames_left: WARMUP_FRAMES };
                false
            }
            ContextState::WarmingUp { context, frames_left } if frames_left > 0 => {
                self.state = ContextState::WarmingUp { context, frames_left: frames_left - 1 };
                false
            }
            ContextState::WarmingUp { .. } | ContextState::Uninit => self.init(current),
        }
    }

    fn init(&mut self, current: usize) -> bool {
        match self.backend.init() {
            Ok(()) => {
                debug!(context = current, "overlay backend ready");
                self.init_failed.reset();
                self.state = ContextState::Ready { context: current };
                true
            }
            Err(e) => {
                if self.init_failed.first() {
                    warn!(error = %e, "overlay backend init failed");
                }
                self.backend.teardown(true);
                self.state = ContextState::Uninit;
                false
            }
        }
    }

    /// Run `list` through the backend if this frame can draw.
    pub fn render(&mut self, current: usize, list: &DrawList, viewport: Viewport) {
        if self.frame(current) && !list.is_empty() {
            self.backend.draw(list, viewport);
        }
    }

    /// Release everything at detach. GL objects are only deleted when their
    /// context is the one current on this thread.
    pub fn shutdown(&mut self, current: usize) {
        match self.state {
            ContextState::Ready { context } => self.backend.teardown(context == current),
            ContextState::WarmingUp { .. } | ContextState::Uninit => {}
        }
        self.state = ContextState::Uninit;
    }
}
