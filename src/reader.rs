// reader.rs - Builds one WorldSnapshot per poll pass from resolved accessors.
//
// Runs only on the polling thread. Every host read goes through the
// accessor cache; a role that is missing or a call that fails just leaves
// the matching part of the snapshot empty. Entity gathering and the
// container scan are throttled separately from the camera, and the
// container scan pauses for a while after the screen or world changes.

use crate::accessors::{AccessorCache, BucketAccess, Feature, MatrixAccess, Role};
use crate::config::Config;
use crate::discovery::DiscoveryEngine;
use crate::host::{simple_name, Runtime, Value};
use crate::math::{Mat4, Vec3};
use crate::settings::Settings;
use crate::snapshot::{
    CameraState, ContainerKind, EntityRecord, StaticFeatureRecord, WorldSnapshot, DEFAULT_FOV, EYE_HEIGHT,
};
use crate::text;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use tracing::{debug, info};

/// Containers further than this from the camera are not recorded.
pub const CONTAINER_RANGE: f64 = 64.0;
/// Upper bound on block entities walked per chunk.
const MAX_BLOCK_ENTITIES_PER_CHUNK: usize = 512;
/// Longest hash-bucket chain followed before giving up on a bucket.
const MAX_CHAIN: usize = 64;
const HIT_BLOCK: &str = "BLOCK";
const PLACEABLE_NAME_HINT: &str = "Block";

/// Chunk coordinate containing block coordinate `v`.
pub fn chunk_coord(v: f64) -> i32 {
    (v.floor() as i32) >> 4
}

/// Chunk object holding world position (`x`, `z`), through the resolved
/// chunk getter.
pub fn chunk_at<R: Runtime>(
    rt: &R,
    cache: &AccessorCache<R>,
    world: &R::Object,
    x: f64,
    z: f64,
) -> Option<R::Object> {
    if !x.is_finite() || !z.is_finite() {
        return None;
    }
    chunk_by_coords(rt, cache, world, chunk_coord(x), chunk_coord(z))
}

fn chunk_by_coords<R: Runtime>(
    rt: &R,
    cache: &AccessorCache<R>,
    world: &R::Object,
    cx: i32,
    cz: i32,
) -> Option<R::Object> {
    let getter = cache.method(Role::ChunkAccess)?;
    rt.invoke(world, getter, &[Value::Int(cx), Value::Int(cz)])?.object()
}

fn available_features<R: Runtime>(cache: &AccessorCache<R>) -> Vec<Feature> {
    Feature::iter().filter(|f| cache.feature_available(*f)).collect()
}

fn due(last: Option<Instant>, every: Duration, now: Instant) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= every)
}

pub struct StateReader<R: Runtime> {
    settings: Settings,
    entities: Vec<EntityRecord>,
    containers: Vec<StaticFeatureRecord>,
    last_entity_scan: Option<Instant>,
    last_container_scan: Option<Instant>,
    last_live_retry: Option<Instant>,
    transition_until: Option<Instant>,
    last_screen: Option<String>,
    /// Last non-null world object seen.
    last_world: Option<R::Object>,
}

impl<R: Runtime> StateReader<R> {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            entities: Vec::new(),
            containers: Vec::new(),
            last_entity_scan: None,
            last_container_scan: None,
            last_live_retry: None,
            transition_until: None,
            last_screen: None,
            last_world: None,
        }
    }

    /// Whether the container scan is currently paused after a transition.
    pub fn in_transition(&self, now: Instant) -> bool {
        self.transition_until.is_some_and(|t| now < t)
    }

    /// One poll pass.
    pub fn poll(&mut self, engine: &DiscoveryEngine<'_, R>, config: &Config, now: Instant) -> WorldSnapshot {
        let rt = engine.runtime();
        let cache = engine.cache();
        let mut snap = WorldSnapshot {
            mapped: cache.is_resolved(Role::RootInstance),
            features: available_features(cache),
            ..Default::default()
        };
        let Some(root) = cache.instance(Role::RootInstance) else {
            return snap;
        };

        let screen = cache.field(Role::ScreenField).and_then(|f| rt.read_object(root, f));
        snap.gui_open = screen.is_some();
        snap.screen_name = screen
            .as_ref()
            .and_then(|s| rt.class_name_of(s))
            .map(|n| simple_name(&n).to_string());

        let world = cache.field(Role::WorldField).and_then(|f| rt.read_object(root, f));
        let player = cache.field(Role::PlayerField).and_then(|f| rt.read_object(root, f));
        self.track_transition(rt, snap.screen_name.as_deref(), world.as_ref(), now);
        snap.breaking_block = cache
            .value_of(rt, Role::BreakingBlock, root)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let (Some(world), Some(player)) = (world, player) else {
            self.entities.clear();
            self.containers.clear();
            return snap;
        };
        snap.in_world = true;

        if due(self.last_live_retry, self.settings.live_role_retry(), now) {
            self.last_live_retry = Some(now);
            self.retry_live_roles(engine, &world, &player);
            snap.features = available_features(cache);
        }

        let Some(camera) = self.camera(rt, cache, root, &player) else {
            cache.note_missing(Role::EntityPosition);
            return snap;
        };

        if due(self.last_entity_scan, self.settings.entity_interval(), now) {
            self.last_entity_scan = Some(now);
            self.entities = self.gather_entities(rt, cache, &world, &player, camera.eye, config);
        }

        if !config.chest_esp {
            self.containers.clear();
        } else if !self.in_transition(now) && due(self.last_container_scan, self.settings.container_interval(), now) {
            self.last_container_scan = Some(now);
            self.containers = self.scan_containers(rt, cache, &world, camera.eye);
        }

        snap.holding_block = self.holding_block(rt, cache, &player);
        snap.looking_at_block = !snap.gui_open && self.looking_at_block(rt, cache, root);
        snap.entities = self.entities.clone();
        snap.containers = self.containers.clone();
        snap.camera = Some(camera);
        snap
    }

    // ============================================================
    // Transitions and live roles
    // ============================================================

    fn track_transition(&mut self, rt: &R, screen: Option<&str>, world: Option<&R::Object>, now: Instant) {
        let screen_changed = self.last_screen.as_deref() != screen;
        let world_changed = match (&self.last_world, world) {
            (Some(prev), Some(cur)) => !rt.same_object(prev, cur),
            _ => false,
        };
        if screen_changed {
            info!(screen = screen.unwrap_or("<none>"), "screen changed");
            self.last_screen = screen.map(str::to_string);
        }
        if world_changed {
            info!("world changed");
        }
        if let Some(w) = world {
            self.last_world = Some(w.clone());
        }
        if screen_changed || world_changed {
            self.transition_until = Some(now + self.settings.world_transition());
            self.containers.clear();
            self.last_container_scan = None;
            self.last_live_retry = None;
        }
    }

    fn retry_live_roles(&self, engine: &DiscoveryEngine<'_, R>, world: &R::Object, player: &R::Object) {
        let rt = engine.runtime();
        let cache = engine.cache();
        engine.refresh_live();
        if !cache.is_resolved(Role::EntityList) && engine.refresh_entity_list(world) {
            info!("entity list resolved from live world");
        }
        if !cache.is_resolved(Role::BlockEntityMap) {
            let chunk = cache
                .coords_of(rt, Role::EntityPosition, player)
                .and_then(|p| chunk_at(rt, cache, world, p[0], p[2]));
            if let Some(chunk) = chunk {
                if engine.refresh_block_entity_map(&chunk) {
                    info!("block entity map resolved from live chunk");
                }
            }
        }
    }

    // ============================================================
    // Camera
    // ============================================================

    fn camera(&self, rt: &R, cache: &AccessorCache<R>, root: &R::Object, player: &R::Object) -> Option<CameraState> {
        let [x, y, z] = cache.coords_of(rt, Role::EntityPosition, player)?;
        let feet = Vec3::new(x, y, z);
        if !feet.is_finite() {
            return None;
        }
        let angle = |role| {
            cache
                .value_of(rt, role, player)
                .and_then(|v| v.as_f64())
                .filter(|a| a.is_finite())
                .unwrap_or(0.0) as f32
        };
        let fov = cache
            .value_of(rt, Role::FovSetting, root)
            .and_then(|v| v.as_f64())
            .map(|f| f as f32)
            .filter(|f| f.is_finite() && *f > 1.0 && *f < 179.0)
            .unwrap_or(DEFAULT_FOV);
        let origin = cache
            .coords_of(rt, Role::ViewerPosition, root)
            .map(|[x, y, z]| Vec3::new(x, y, z))
            .filter(|v| v.is_finite() && !v.is_zero())
            .unwrap_or(feet);
        Some(CameraState {
            origin,
            eye: feet + Vec3::new(0.0, EYE_HEIGHT, 0.0),
            yaw: angle(Role::EntityYaw),
            pitch: angle(Role::EntityPitch),
            fov,
            matrices: self.matrices(rt, cache, root),
        })
    }

    fn matrices(&self, rt: &R, cache: &AccessorCache<R>, root: &R::Object) -> Option<(Mat4, Mat4)> {
        let pair = match cache.matrices(Role::CameraMatrices)? {
            MatrixAccess::Buffers { owner, view, proj, get } => {
                let view = rt.read_static(owner, *view)?.object()?;
                let proj = rt.read_static(owner, *proj)?.object()?;
                (read_buffer(rt, &view, *get)?, read_buffer(rt, &proj, *get)?)
            }
            MatrixAccess::Joml { renderer, view, proj, cells } => {
                let renderer = rt.read_object(root, *renderer)?;
                let view = rt.read_object(&renderer, *view)?;
                let proj = rt.read_object(&renderer, *proj)?;
                (read_cells(rt, &view, cells)?, read_cells(rt, &proj, cells)?)
            }
        };
        let usable = |m: &Mat4| m.is_finite() && !m.is_zero();
        (usable(&pair.0) && usable(&pair.1)).then_some(pair)
    }

    // ============================================================
    // Entities
    // ============================================================

    fn gather_entities(
        &self,
        rt: &R,
        cache: &AccessorCache<R>,
        world: &R::Object,
        player: &R::Object,
        eye: Vec3,
        config: &Config,
    ) -> Vec<EntityRecord> {
        if !cache.feature_available(Feature::Entities) {
            cache.note_missing(Role::EntityList);
            return Vec::new();
        }
        let Some(living) = cache.class(Role::LivingClass) else {
            cache.note_missing(Role::LivingClass);
            return Vec::new();
        };
        let Some(list) = cache.object_of(rt, Role::EntityList, world) else {
            return Vec::new();
        };

        let mut found: Vec<(R::Object, EntityRecord)> = rt
            .collection(&list, self.settings.entity_cap)
            .into_iter()
            .filter(|e| !rt.same_object(e, player) && rt.is_instance(e, living))
            .filter_map(|e| {
                let [x, y, z] = cache.coords_of(rt, Role::EntityPosition, &e)?;
                let position = Vec3::new(x, y, z);
                if !position.is_finite() {
                    return None;
                }
                let record = EntityRecord {
                    id: rt.identity_hash(&e),
                    position,
                    distance: position.distance(eye),
                    name: None,
                    health: None,
                    armor: None,
                    held_item: None,
                };
                Some((e, record))
            })
            .collect();
        found.sort_by(|a, b| a.1.distance.total_cmp(&b.1.distance));

        if config.wants_entity_details() {
            for (entity, record) in found.iter_mut().take(config.nametag_max_count as usize) {
                fill_details(rt, cache, entity, record);
            }
        }
        found.into_iter().map(|(_, r)| r).collect()
    }

    // ============================================================
    // Containers
    // ============================================================

    fn scan_containers(&self, rt: &R, cache: &AccessorCache<R>, world: &R::Object, eye: Vec3) -> Vec<StaticFeatureRecord> {
        if !cache.feature_available(Feature::Containers) {
            cache.note_missing(Role::BlockEntityMap);
            return Vec::new();
        }
        let Some(block_entity) = cache.class(Role::BlockEntityClass) else {
            return Vec::new();
        };
        let containers = cache.classes(Role::ContainerClasses);
        let (cx, cz) = (chunk_coord(eye.x), chunk_coord(eye.z));
        let r = self.settings.chunk_radius.max(0);

        let mut out = Vec::new();
        for dx in -r..=r {
            for dz in -r..=r {
                let Some(chunk) = chunk_by_coords(rt, cache, world, cx + dx, cz + dz) else {
                    continue;
                };
                let Some(map) = cache.object_of(rt, Role::BlockEntityMap, &chunk) else {
                    continue;
                };
                for (key, be) in block_entities(rt, cache, &map) {
                    if !rt.is_instance(&be, block_entity) {
                        continue;
                    }
                    let Some(kind) = container_kind(rt, containers, &be) else {
                        continue;
                    };
                    let block = key
                        .and_then(|k| block_pos(rt, cache, &k))
                        .or_else(|| {
                            let pos = rt.read_object(&be, cache.field(Role::BlockEntityPos)?)?;
                            block_pos(rt, cache, &pos)
                        });
                    let Some(block) = block else { continue };
                    let mut record = StaticFeatureRecord { kind, block, distance: 0.0 };
                    record.distance = record.anchor().distance(eye);
                    if record.distance <= CONTAINER_RANGE {
                        out.push(record);
                    }
                }
            }
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!(count = out.len(), "container scan");
        out
    }

    // ============================================================
    // Flags
    // ============================================================

    fn holding_block(&self, rt: &R, cache: &AccessorCache<R>, player: &R::Object) -> bool {
        let Some(item) = cache
            .object_of(rt, Role::EntityHeldItem, player)
            .and_then(|stack| cache.object_of(rt, Role::ItemStackItem, &stack))
        else {
            return false;
        };
        match cache.class(Role::PlaceableItemClass) {
            Some(placeable) => rt.is_instance(&item, placeable),
            None => rt
                .class_name_of(&item)
                .is_some_and(|n| simple_name(&n).contains(PLACEABLE_NAME_HINT)),
        }
    }

    fn looking_at_block(&self, rt: &R, cache: &AccessorCache<R>, root: &R::Object) -> bool {
        cache
            .field(Role::CrosshairTarget)
            .and_then(|f| rt.read_object(root, f))
            .and_then(|hit| cache.object_of(rt, Role::HitKind, &hit))
            .and_then(|kind| rt.enum_name(&kind))
            .is_some_and(|n| n == HIT_BLOCK)
    }
}

fn read_buffer<R: Runtime>(rt: &R, buffer: &R::Object, get: R::Method) -> Option<Mat4> {
    let mut m = [0.0f32; 16];
    for (i, cell) in m.iter_mut().enumerate() {
        *cell = rt.invoke(buffer, get, &[Value::Int(i as i32)])?.as_f64()? as f32;
    }
    Some(Mat4(m))
}

fn read_cells<R: Runtime>(rt: &R, matrix: &R::Object, cells: &[R::Field; 16]) -> Option<Mat4> {
    let mut m = [0.0f32; 16];
    for (cell, field) in m.iter_mut().zip(cells) {
        *cell = rt.read_f64(matrix, *field)? as f32;
    }
    Some(Mat4(m))
}

fn string_of<R: Runtime>(rt: &R, v: Option<Value<R::Object>>) -> Option<String> {
    rt.string(&v?.object()?)
}

/// The per-entity lookups that each cost one or more host calls.
fn fill_details<R: Runtime>(rt: &R, cache: &AccessorCache<R>, entity: &R::Object, record: &mut EntityRecord) {
    record.name = string_of(rt, cache.value_of(rt, Role::EntityName, entity))
        .map(|n| text::strip_formatting(&n))
        .filter(|n| !n.is_empty());
    record.health = cache
        .value_of(rt, Role::EntityHealth, entity)
        .and_then(|v| v.as_f64())
        .filter(|h| h.is_finite())
        .map(|h| h as f32);
    record.armor = cache.value_of(rt, Role::EntityArmor, entity).and_then(|v| v.as_i32());
    record.held_item = cache.object_of(rt, Role::EntityHeldItem, entity).map(|stack| {
        let display = string_of(rt, cache.value_of(rt, Role::ItemStackName, &stack)).unwrap_or_default();
        let unlocalized = cache
            .object_of(rt, Role::ItemStackItem, &stack)
            .and_then(|item| string_of(rt, cache.value_of(rt, Role::ItemUnlocalizedName, &item)));
        text::held_item_text(&display, unlocalized.as_deref())
    });
}

/// Entries of a block-entity map as (key, value). Walks the hash table
/// directly when the map is the standard hash map, else samples values.
fn block_entities<R: Runtime>(rt: &R, cache: &AccessorCache<R>, map: &R::Object) -> Vec<(Option<R::Object>, R::Object)> {
    if let Some(buckets) = cache.buckets(Role::HashMapBuckets) {
        if rt.is_instance(map, &buckets.map_class) {
            return walk_buckets(rt, buckets, map);
        }
    }
    rt.collection(map, MAX_BLOCK_ENTITIES_PER_CHUNK)
        .into_iter()
        .map(|v| (None, v))
        .collect()
}

fn walk_buckets<R: Runtime>(rt: &R, b: &BucketAccess<R>, map: &R::Object) -> Vec<(Option<R::Object>, R::Object)> {
    let Some(table) = rt.read_object(map, b.table) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for head in rt.array(&table, usize::MAX).into_iter().flatten() {
        let mut node = Some(head);
        let mut hops = 0;
        while let Some(n) = node {
            if out.len() >= MAX_BLOCK_ENTITIES_PER_CHUNK || hops >= MAX_CHAIN {
                break;
            }
            if let Some(value) = rt.read_object(&n, b.value) {
                out.push((rt.read_object(&n, b.key), value));
            }
            node = rt.read_object(&n, b.next);
            hops += 1;
        }
        if out.len() >= MAX_BLOCK_ENTITIES_PER_CHUNK {
            break;
        }
    }
    out
}

/// Container kind of a block entity, or `None` when it is not a container.
fn container_kind<R: Runtime>(rt: &R, containers: &[R::Class], be: &R::Object) -> Option<ContainerKind> {
    if let Some(class) = containers.iter().find(|c| rt.is_instance(be, c)) {
        let kind = rt
            .class_name(class)
            .map(|n| ContainerKind::from_class_name(&n))
            .unwrap_or(ContainerKind::Other);
        return Some(kind);
    }
    let name = rt.class_name_of(be)?;
    let kind = ContainerKind::from_class_name(&name);
    (kind != ContainerKind::Other).then_some(kind)
}

fn block_pos<R: Runtime>(rt: &R, cache: &AccessorCache<R>, pos: &R::Object) -> Option<[i32; 3]> {
    if !rt.is_instance(pos, cache.class(Role::BlockPosClass)?) {
        return None;
    }
    let [x, y, z] = cache.triplet(Role::BlockPosCoords)?;
    Some([rt.read_i32(pos, x)?, rt.read_i32(pos, y)?, rt.read_i32(pos, z)?])
}
