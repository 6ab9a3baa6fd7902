// snapshot.rs - Immutable per-pass state and its publication slot.
//
// The poller builds a whole `WorldSnapshot` off to the side and swaps it in
// as one `Arc`. Readers clone the `Arc` under the lock and never see a mix
// of two passes.

use crate::accessors::Feature;
use crate::math::{Mat4, Vec3};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Eye height above the feet position.
pub const EYE_HEIGHT: f64 = 1.62;
/// Nametag anchor height above the feet position.
pub const NAMETAG_HEIGHT: f64 = 2.05;
pub const DEFAULT_FOV: f32 = 70.0;

#[derive(Clone, Debug, PartialEq)]
pub struct CameraState {
    /// Origin the captured matrices are relative to.
    pub origin: Vec3,
    /// Eye position, used when the view is rebuilt from angles.
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// View and projection, when captured this pass.
    pub matrices: Option<(Mat4, Mat4)>,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            origin: Vec3::default(),
            eye: Vec3::default(),
            yaw: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
            matrices: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    /// Host identity hash; stable for the entity's lifetime.
    pub id: i32,
    /// Feet position.
    pub position: Vec3,
    /// Distance from the camera eye.
    pub distance: f64,
    pub name: Option<String>,
    pub health: Option<f32>,
    pub armor: Option<i32>,
    pub held_item: Option<String>,
}

impl EntityRecord {
    pub fn anchor(&self) -> Vec3 {
        self.position + Vec3::new(0.0, NAMETAG_HEIGHT, 0.0)
    }

    /// Whether the heavy lookups ran for this entity.
    pub fn detailed(&self) -> bool {
        self.name.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Chest,
    EnderChest,
    Other,
}

/// Simple-name fragments per kind, readable and intermediary mappings.
const ENDER_CHEST_NAMES: &[&str] = &["Ender", "class_2611"];
const CHEST_NAMES: &[&str] = &["Chest", "class_2595"];

impl ContainerKind {
    /// Kind from a host class name.
    pub fn from_class_name(name: &str) -> Self {
        let simple = crate::host::simple_name(name);
        let matches = |hints: &[&str]| hints.iter().any(|h| simple.contains(h));
        if matches(ENDER_CHEST_NAMES) {
            ContainerKind::EnderChest
        } else if matches(CHEST_NAMES) {
            ContainerKind::Chest
        } else {
            ContainerKind::Other
        }
    }
}

/// A fixed-position world feature (a container block).
#[derive(Clone, Debug, PartialEq)]
pub struct StaticFeatureRecord {
    pub kind: ContainerKind,
    pub block: [i32; 3],
    pub distance: f64,
}

impl StaticFeatureRecord {
    /// Minimum corner of the block.
    pub fn corner(&self) -> Vec3 {
        Vec3::new(self.block[0] as f64, self.block[1] as f64, self.block[2] as f64)
    }

    /// Block centre on the horizontal axes, bottom face on Y.
    pub fn anchor(&self) -> Vec3 {
        self.corner() + Vec3::new(0.5, 0.0, 0.5)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Publication sequence number; 0 for the initial empty snapshot.
    pub seq: u64,
    /// Root singleton resolved.
    pub mapped: bool,
    pub in_world: bool,
    pub camera: Option<CameraState>,
    /// Sorted nearest first.
    pub entities: Vec<EntityRecord>,
    /// Sorted nearest first.
    pub containers: Vec<StaticFeatureRecord>,
    pub gui_open: bool,
    pub screen_name: Option<String>,
    pub holding_block: bool,
    pub looking_at_block: bool,
    pub breaking_block: bool,
    pub features: Vec<Feature>,
}

impl WorldSnapshot {
    pub fn has_feature(&self, f: Feature) -> bool {
        self.features.contains(&f)
    }
}

/// Swap-publish slot for the latest snapshot.
pub struct SnapshotSlot {
    current: Mutex<Arc<WorldSnapshot>>,
    seq: AtomicU64,
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(WorldSnapshot::default())),
            seq: AtomicU64::new(0),
        }
    }

    /// Stamp and publish a finished snapshot in one swap.
    pub fn publish(&self, mut snapshot: WorldSnapshot) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        snapshot.seq = seq;
        let next = Arc::new(snapshot);
        *self.current.lock() = next;
        seq
    }

    pub fn latest(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&self.current.lock())
    }
}
