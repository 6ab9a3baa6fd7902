// accessors.rs - Resolved host locators, keyed by logical role.
//
// Discovery writes each role at most once; everything afterwards only reads.
// Slots are `OnceCell`s, so reads after resolution are lock-free and a race
// between two resolvers simply keeps whichever value landed first.

use crate::host::{Runtime, Value};
use crate::logging::LogOnce;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, warn};

// ============================================================
// Roles
// ============================================================

/// Logical purpose a host field/method/class is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
pub enum Role {
    RootClass,
    RootInstance,
    PlayerField,
    PlayerClass,
    /// Most-derived class in the player hierarchy that declares the health getter.
    LivingClass,
    ScreenField,
    WorldField,
    WorldClass,
    EntityList,
    EntityPosition,
    EntityYaw,
    EntityPitch,
    EntityHealth,
    EntityName,
    EntityArmor,
    EntityHeldItem,
    ItemStackClass,
    ItemStackName,
    ItemStackItem,
    /// Stable item id on the item class, for sword tiers.
    ItemUnlocalizedName,
    PlaceableItemClass,
    CrosshairTarget,
    HitKind,
    BreakingBlock,
    FovSetting,
    ViewerPosition,
    CameraMatrices,
    ChunkAccess,
    ChunkClass,
    BlockEntityClass,
    BlockEntityMap,
    ContainerClasses,
    BlockPosClass,
    BlockPosCoords,
    BlockEntityPos,
    HashMapBuckets,
}

impl Role {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Without these nothing else can be resolved.
    pub fn is_essential(self) -> bool {
        matches!(self, Role::RootClass | Role::RootInstance)
    }

    /// Roles whose heuristics need live objects; the poller keeps retrying
    /// them instead of giving up after the discovery passes.
    pub fn is_live(self) -> bool {
        matches!(self, Role::EntityList | Role::BlockEntityMap | Role::HitKind | Role::ViewerPosition)
    }
}

/// Overlay/state features and the roles each one needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum Feature {
    Entities,
    EntityDetails,
    Containers,
    Camera,
    HeldItem,
    Crosshair,
}

impl Feature {
    pub fn required_roles(self) -> &'static [Role] {
        match self {
            Feature::Entities => &[Role::WorldField, Role::EntityList, Role::EntityPosition],
            Feature::EntityDetails => &[Role::EntityName, Role::EntityHealth],
            Feature::Containers => &[
                Role::WorldField,
                Role::ChunkAccess,
                Role::BlockEntityMap,
                Role::BlockEntityClass,
            ],
            Feature::Camera => &[Role::EntityPosition, Role::EntityYaw, Role::EntityPitch],
            Feature::HeldItem => &[Role::EntityHeldItem, Role::ItemStackItem],
            Feature::Crosshair => &[Role::CrosshairTarget, Role::HitKind],
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

// ============================================================
// Accessors
// ============================================================

/// Field pair + float getter for legacy static float-buffer matrices, or
/// field pair + 16 cells for JOML matrices held by the game renderer.
pub enum MatrixAccess<R: Runtime> {
    Buffers { owner: R::Class, view: R::Field, proj: R::Field, get: R::Method },
    Joml { renderer: R::Field, view: R::Field, proj: R::Field, cells: [R::Field; 16] },
}

/// Direct field access into the standard hash map's bucket table. Only
/// valid on instances of `map_class`.
pub struct BucketAccess<R: Runtime> {
    pub map_class: R::Class,
    pub table: R::Field,
    pub key: R::Field,
    pub value: R::Field,
    pub next: R::Field,
}

/// One resolved role.
pub enum Accessor<R: Runtime> {
    Class(R::Class),
    Classes(Vec<R::Class>),
    Instance(R::Object),
    Field(R::Field),
    Method(R::Method),
    /// Zero-arg methods applied in sequence (e.g. name -> text -> string).
    Chain(Vec<R::Method>),
    /// Three coordinate fields on the object itself.
    Triplet([R::Field; 3]),
    /// A field on the object holding a sub-object, and a field on that.
    Nested { holder: R::Field, inner: R::Field },
    /// A field holding a vector object with three coordinate fields.
    NestedTriplet { holder: R::Field, coords: [R::Field; 3] },
    Buckets(BucketAccess<R>),
    Matrices(MatrixAccess<R>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolved,
    FailedPermanently,
}

struct Slot<R: Runtime> {
    cell: OnceCell<Accessor<R>>,
    failed: AtomicBool,
    missing_logged: LogOnce,
}

pub struct AccessorCache<R: Runtime> {
    slots: Vec<Slot<R>>,
}

impl<R: Runtime> Default for AccessorCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> AccessorCache<R> {
    pub fn new() -> Self {
        let slots = (0..Role::COUNT)
            .map(|_| Slot {
                cell: OnceCell::new(),
                failed: AtomicBool::new(false),
                missing_logged: LogOnce::new(),
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, role: Role) -> &Slot<R> {
        &self.slots[role as usize]
    }

    pub fn state(&self, role: Role) -> ResolutionState {
        let slot = self.slot(role);
        if slot.cell.get().is_some() {
            ResolutionState::Resolved
        } else if slot.failed.load(Ordering::Acquire) {
            ResolutionState::FailedPermanently
        } else {
            ResolutionState::Unresolved
        }
    }

    pub fn is_resolved(&self, role: Role) -> bool {
        self.slot(role).cell.get().is_some()
    }

    pub fn get(&self, role: Role) -> Option<&Accessor<R>> {
        self.slot(role).cell.get()
    }

    /// Resolve `role` with `probe` unless it is already settled.
    ///
    /// The probe builds the complete accessor before anything is stored, so
    /// a role is either fully written or untouched. Returns whether the role
    /// is resolved afterwards.
    pub fn resolve(&self, role: Role, probe: impl FnOnce() -> Option<Accessor<R>>) -> bool {
        let slot = self.slot(role);
        if slot.cell.get().is_some() {
            return true;
        }
        if slot.failed.load(Ordering::Acquire) {
            return false;
        }
        match probe() {
            Some(acc) => {
                if slot.cell.set(acc).is_ok() {
                    debug!(role = role.name(), "role resolved");
                }
                true
            }
            None => false,
        }
    }

    /// Give up on an unresolved role. Logged once.
    pub fn mark_failed(&self, role: Role) {
        let slot = self.slot(role);
        if slot.cell.get().is_some() {
            return;
        }
        if !slot.failed.swap(true, Ordering::AcqRel) {
            warn!(role = role.name(), "role could not be resolved; dependent features disabled");
        }
    }

    /// Note (once) that a feature is skipped because `role` is missing.
    pub fn note_missing(&self, role: Role) {
        if self.slot(role).missing_logged.first() {
            debug!(role = role.name(), "role unavailable, skipping");
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.slots.iter().filter(|s| s.cell.get().is_some()).count()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = Role> + '_ {
        Role::iter().filter(|r| self.state(*r) == ResolutionState::Unresolved)
    }

    pub fn feature_available(&self, feature: Feature) -> bool {
        feature.required_roles().iter().all(|r| self.is_resolved(*r))
    }

    // -- typed views ---------------------------------------------------------

    pub fn class(&self, role: Role) -> Option<&R::Class> {
        match self.get(role)? {
            Accessor::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn classes(&self, role: Role) -> &[R::Class] {
        match self.get(role) {
            Some(Accessor::Classes(c)) => c,
            _ => &[],
        }
    }

    pub fn instance(&self, role: Role) -> Option<&R::Object> {
        match self.get(role)? {
            Accessor::Instance(o) => Some(o),
            _ => None,
        }
    }

    pub fn field(&self, role: Role) -> Option<R::Field> {
        match self.get(role)? {
            Accessor::Field(f) => Some(*f),
            _ => None,
        }
    }

    pub fn method(&self, role: Role) -> Option<R::Method> {
        match self.get(role)? {
            Accessor::Method(m) => Some(*m),
            _ => None,
        }
    }

    pub fn triplet(&self, role: Role) -> Option<[R::Field; 3]> {
        match self.get(role)? {
            Accessor::Triplet(t) => Some(*t),
            _ => None,
        }
    }

    pub fn buckets(&self, role: Role) -> Option<&BucketAccess<R>> {
        match self.get(role)? {
            Accessor::Buckets(b) => Some(b),
            _ => None,
        }
    }

    pub fn matrices(&self, role: Role) -> Option<&MatrixAccess<R>> {
        match self.get(role)? {
            Accessor::Matrices(m) => Some(m),
            _ => None,
        }
    }

    /// Object read through `role` on `obj` (field, getter, chain or nested).
    pub fn object_of(&self, rt: &R, role: Role, obj: &R::Object) -> Option<R::Object> {
        self.value_of(rt, role, obj)?.object()
    }

    /// Value of `role` on `obj`, whatever shape the accessor has.
    pub fn value_of(&self, rt: &R, role: Role, obj: &R::Object) -> Option<Value<R::Object>> {
        match self.get(role)? {
            Accessor::Field(f) => rt.read(obj, *f),
            Accessor::Method(m) => rt.call(obj, *m),
            Accessor::Chain(methods) => {
                let (last, init) = methods.split_last()?;
                let mut cur = obj.clone();
                for m in init {
                    cur = rt.call_object(&cur, *m)?;
                }
                rt.call(&cur, *last)
            }
            Accessor::Nested { holder, inner } => {
                let h = rt.read_object(obj, *holder)?;
                rt.read(&h, *inner)
            }
            _ => None,
        }
    }

    /// Three doubles through a `Triplet` or `NestedTriplet` accessor.
    pub fn coords_of(&self, rt: &R, role: Role, obj: &R::Object) -> Option<[f64; 3]> {
        let (holder, fields) = match self.get(role)? {
            Accessor::Triplet(f) => (None, f),
            Accessor::NestedTriplet { holder, coords } => (Some(*holder), coords),
            _ => return None,
        };
        let target = match holder {
            Some(h) => rt.read_object(obj, h)?,
            None => obj.clone(),
        };
        Some([
            rt.read_f64(&target, fields[0])?,
            rt.read_f64(&target, fields[1])?,
            rt.read_f64(&target, fields[2])?,
        ])
    }
}
