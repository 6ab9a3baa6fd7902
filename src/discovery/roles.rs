// discovery/roles.rs - Resolution chains, one per role.
//
// Every chain is an `Option` early-return: known names for each mapping
// generation first, then structural scans. Nothing here writes the cache;
// the engine stores whatever a chain returns.

use super::probe::{
    declares_any_method, first_field_of_type, instance_fields, known_field, known_field_of_kind,
    known_triplet, method_with_params, positional_fields, returns_kind, returns_named,
    validated_collection_field, zero_arg_method, STRING,
};
use super::roots::{find_root_class, root_instance, EXCLUDED_PREFIXES};
use super::DiscoveryEngine;
use crate::accessors::{Accessor, BucketAccess, MatrixAccess, Role};
use crate::host::{FieldDescriptor, MethodDescriptor, Runtime, TypeKind};
use tracing::debug;

// -- root fields ---------------------------------------------------------------

const PLAYER_FIELDS: &[&str] = &["thePlayer", "field_71439_g", "player", "field_1724"];
const SCREEN_FIELDS: &[&str] = &["currentScreen", "field_71462_r", "screen", "field_1755"];
const SCREEN_METHODS: &[&str] = &[
    "drawScreen",
    "func_73863_a",
    "initGui",
    "func_73866_w_",
    "method_25426",
    "method_25394",
];
const WORLD_FIELDS: &[&str] = &["theWorld", "field_71441_e", "world", "field_1687"];
const WORLD_TYPE_HINTS: &[&str] = &["WorldClient", "ClientWorld", "class_638"];
const CROSSHAIR_FIELDS: &[&str] = &["objectMouseOver", "field_71476_x", "crosshairTarget", "field_1765"];
const CONTROLLER_FIELDS: &[&str] = &["playerController", "field_71442_b", "interactionManager", "field_1761"];
const BREAKING_FIELDS: &[&str] = &["isHittingBlock", "field_78778_j", "breakingBlock", "field_3717"];
const OPTIONS_FIELDS: &[&str] = &["gameSettings", "field_71474_y", "options", "field_1690"];
const FOV_FIELDS: &[&str] = &["fovSetting", "field_74334_X"];
const RENDER_MANAGER_FIELDS: &[&str] = &["renderManager", "field_175616_W"];
const VIEWER_TRIPLES: &[[&str; 3]] = &[
    ["viewerPosX", "viewerPosY", "viewerPosZ"],
    ["renderPosX", "renderPosY", "renderPosZ"],
    ["field_78730_l", "field_78731_m", "field_78728_n"],
    ["field_78725_b", "field_78726_c", "field_78723_d"],
    ["o", "p", "q"],
];

// -- camera --------------------------------------------------------------------

const RENDER_INFO_CLASSES: &[&str] = &["net.minecraft.client.renderer.ActiveRenderInfo"];
const MODELVIEW_FIELDS: &[&str] = &["MODELVIEW", "field_178812_b"];
const PROJECTION_FIELDS: &[&str] = &["PROJECTION", "field_178813_c"];
const FLOAT_BUFFER: &str = "java.nio.FloatBuffer";
const INT_BUFFER: &str = "java.nio.IntBuffer";
const GAME_RENDERER_FIELDS: &[&str] = &["gameRenderer", "field_1773"];
const JOML_VIEW_FIELDS: &[&str] = &["lunar$savedModelView$v1_19_3", "savedModelView"];
const JOML_PROJECTION_FIELDS: &[&str] = &["lunar$savedProjection$v1_19_3", "savedProjection"];
const MATRIX4F: &str = "org.joml.Matrix4f";

// -- entities ------------------------------------------------------------------

const HEALTH_GETTERS: &[&str] = &["getHealth", "func_110143_aJ", "method_6032"];
const POSITION_TRIPLES: &[[&str; 3]] = &[
    ["posX", "posY", "posZ"],
    ["field_70165_t", "field_70163_u", "field_70161_v"],
];
const POSITION_HOLDERS: &[&str] = &["pos", "field_22467"];
const VECTOR_TRIPLES: &[[&str; 3]] = &[["x", "y", "z"], ["field_1352", "field_1351", "field_1350"]];
const YAW_FIELDS: &[&str] = &["rotationYaw", "field_70177_z", "yaw", "field_6031"];
const YAW_METHODS: &[&str] = &["getYaw", "method_36454"];
const PITCH_FIELDS: &[&str] = &["rotationPitch", "field_70125_A", "pitch", "field_5965"];
const PITCH_METHODS: &[&str] = &["getPitch", "method_36455"];
const NAME_STRING_GETTERS: &[&str] = &["getName", "func_70005_c_"];
const NAME_TEXT_GETTERS: &[&str] = &["getName", "method_5477", "getDisplayName", "method_5476"];
const TEXT_TO_STRING: &[&str] = &["getString", "method_10858", "getUnformattedText", "func_150260_c"];
const ARMOR_GETTERS: &[&str] = &["getTotalArmorValue", "func_70658_aO", "getArmor", "method_6096"];
const HELD_ITEM_GETTERS: &[&str] = &["getHeldItem", "func_70694_bm", "getMainHandStack", "method_6047"];
const ENTITY_LIST_FIELDS: &[&str] = &["playerEntities", "field_73010_i", "players", "field_18226"];
const ENTITY_SAMPLE: usize = 8;

// -- items ---------------------------------------------------------------------

const STACK_NAME_STRING_GETTERS: &[&str] = &["getDisplayName", "func_82833_r"];
const STACK_NAME_TEXT_GETTERS: &[&str] = &["getName", "method_7964"];
const STACK_ITEM_GETTERS: &[&str] = &["getItem", "func_77973_b", "method_7909"];
const ITEM_UNLOCALIZED_GETTERS: &[&str] = &["getUnlocalizedName", "func_77658_a", "getTranslationKey", "method_7876"];
const PLACEABLE_CLASSES: &[&str] = &["net.minecraft.item.ItemBlock", "net.minecraft.class_1747"];
const BLOCK_CLASSES: &[&str] = &["net.minecraft.block.Block", "net.minecraft.class_2248"];
const HIT_KIND_FIELDS: &[&str] = &["typeOfHit", "field_72313_a"];
const HIT_KIND_METHODS: &[&str] = &["getType", "method_17783"];

// -- chunks and block entities -------------------------------------------------

const CHUNK_GETTERS: &[&str] = &["getChunkFromChunkCoords", "func_72964_e", "getChunk", "method_8497"];
const BLOCK_ENTITY_CLASSES: &[&str] = &[
    "net.minecraft.tileentity.TileEntity",
    "net.minecraft.block.entity.BlockEntity",
    "net.minecraft.class_2586",
];
const BLOCK_ENTITY_MAP_FIELDS: &[&str] = &["chunkTileEntityMap", "field_150816_i", "blockEntities", "field_34543"];
const BLOCK_ENTITY_SAMPLE: usize = 4;
const CONTAINER_CLASSES: &[&str] = &[
    "net.minecraft.tileentity.TileEntityChest",
    "net.minecraft.tileentity.TileEntityEnderChest",
    "net.minecraft.block.entity.ChestBlockEntity",
    "net.minecraft.block.entity.EnderChestBlockEntity",
    "net.minecraft.class_2595",
    "net.minecraft.class_2611",
];
const CONTAINER_NAME_HINT: &str = "Chest";
const BLOCK_POS_CLASSES: &[&str] = &[
    "net.minecraft.util.BlockPos",
    "net.minecraft.util.math.BlockPos",
    "net.minecraft.class_2338",
];
const BLOCK_POS_TRIPLES: &[[&str; 3]] = &[
    ["x", "y", "z"],
    ["field_177962_a", "field_177960_b", "field_177961_c"],
    ["field_11175", "field_11174", "field_11173"],
];
const BLOCK_ENTITY_POS_FIELDS: &[&str] = &["pos", "field_174879_c", "field_11867"];

const HASH_MAP: &str = "java.util.HashMap";
const HASH_NODE: &str = "java.util.HashMap$Node";
const HASH_TABLE: &str = "[Ljava.util.HashMap$Node;";
const COLLECTION: &str = "java.util.Collection";
const MAP: &str = "java.util.Map";

fn is_object_type(type_name: &str) -> bool {
    TypeKind::of(type_name) == TypeKind::Object && !type_name.starts_with('[')
}

fn returns_object(t: &str) -> bool {
    is_object_type(t) && t != STRING
}

impl<R: Runtime> DiscoveryEngine<'_, R> {
    /// Run the resolution chain for `role`. Prerequisite roles are read from
    /// the cache; a missing prerequisite is a miss.
    pub(super) fn probe(&self, role: Role) -> Option<Accessor<R>> {
        match role {
            Role::RootClass => find_root_class(self.rt, self.loader()).map(|c| Accessor::Class(c.class)),
            Role::RootInstance => root_instance(self.rt, self.root_class()?).map(Accessor::Instance),
            Role::PlayerField => self.player_field().map(|(f, _)| Accessor::Field(f)),
            Role::PlayerClass => self.player_class().map(Accessor::Class),
            Role::LivingClass => self.health_getter().map(|(owner, _)| Accessor::Class(owner)),
            Role::ScreenField => self.screen_field().map(Accessor::Field),
            Role::WorldField => self.world_field().map(|(f, _)| Accessor::Field(f)),
            Role::WorldClass => self.world_class().map(Accessor::Class),
            Role::EntityList => self.entity_list().map(Accessor::Field),
            Role::EntityPosition => self.entity_position(),
            Role::EntityYaw => self.angle(YAW_FIELDS, YAW_METHODS),
            Role::EntityPitch => self.angle(PITCH_FIELDS, PITCH_METHODS),
            Role::EntityHealth => self.health_getter().map(|(_, m)| Accessor::Method(m)),
            Role::EntityName => self.entity_name(),
            Role::EntityArmor => {
                let class = self.cache.class(Role::PlayerClass)?;
                zero_arg_method(self.rt, class, ARMOR_GETTERS, returns_kind(TypeKind::Int))
                    .map(|(_, _, m)| Accessor::Method(m))
            }
            Role::EntityHeldItem => self.held_item_getter().map(|(_, m)| Accessor::Method(m)),
            Role::ItemStackClass => {
                let (desc, _) = self.held_item_getter()?;
                self.load(&desc.return_type).map(Accessor::Class)
            }
            Role::ItemStackName => self.item_stack_name(),
            Role::ItemStackItem => self.item_getter().map(|(_, m)| Accessor::Method(m)),
            Role::ItemUnlocalizedName => {
                let (desc, _) = self.item_getter()?;
                let item = self.load(&desc.return_type)?;
                zero_arg_method(self.rt, &item, ITEM_UNLOCALIZED_GETTERS, returns_named(STRING))
                    .map(|(_, _, m)| Accessor::Method(m))
            }
            Role::PlaceableItemClass => self.placeable_item_class().map(Accessor::Class),
            Role::CrosshairTarget => {
                let root = self.root_class()?;
                self.object_field(root, CROSSHAIR_FIELDS).map(|(f, _)| Accessor::Field(f))
            }
            Role::HitKind => self.hit_kind(),
            Role::BreakingBlock => {
                self.nested(self.root_class()?, CONTROLLER_FIELDS, BREAKING_FIELDS, TypeKind::Boolean)
            }
            Role::FovSetting => self.nested(self.root_class()?, OPTIONS_FIELDS, FOV_FIELDS, TypeKind::Float),
            Role::ViewerPosition => self.viewer_position(),
            Role::CameraMatrices => self
                .buffer_matrices()
                .or_else(|| self.joml_matrices())
                .map(Accessor::Matrices),
            Role::ChunkAccess => self.chunk_getter().map(|(_, m)| Accessor::Method(m)),
            Role::ChunkClass => {
                let (desc, _) = self.chunk_getter()?;
                self.load(&desc.return_type).map(Accessor::Class)
            }
            Role::BlockEntityClass => self.load_first(BLOCK_ENTITY_CLASSES).map(Accessor::Class),
            Role::BlockEntityMap => self.block_entity_map().map(Accessor::Field),
            Role::ContainerClasses => self.container_classes().map(Accessor::Classes),
            Role::BlockPosClass => self.load_first(BLOCK_POS_CLASSES).map(Accessor::Class),
            Role::BlockPosCoords => {
                let class = self.cache.class(Role::BlockPosClass)?;
                known_triplet(self.rt, class, BLOCK_POS_TRIPLES, TypeKind::Int)
                    .or_else(|| positional_fields(self.rt, class, "int", false, true))
                    .map(Accessor::Triplet)
            }
            Role::BlockEntityPos => self.block_entity_pos().map(Accessor::Field),
            Role::HashMapBuckets => self.hash_map_buckets().map(Accessor::Buckets),
        }
    }

    // ============================================================
    // Shared lookups
    // ============================================================

    /// Class by name through the game loader, then the system loader.
    pub(super) fn load(&self, name: &str) -> Option<R::Class> {
        if !is_object_type(name) {
            return None;
        }
        self.rt
            .load_class(self.loader(), name)
            .or_else(|| self.rt.load_class(None, name))
    }

    fn load_first(&self, names: &[&str]) -> Option<R::Class> {
        names.iter().find_map(|n| self.load(n))
    }

    fn root_class(&self) -> Option<&R::Class> {
        self.cache.class(Role::RootClass)
    }

    /// First known name declared with a reference type.
    fn object_field(&self, class: &R::Class, names: &[&str]) -> Option<(R::Field, FieldDescriptor)> {
        names.iter().find_map(|name| {
            let (id, desc) = known_field(self.rt, class, &[name], false)?;
            is_object_type(&desc.type_name).then_some((id, desc))
        })
    }

    /// Instance field whose declared type is assignable to `sup`.
    fn declared_as(&self, desc: &FieldDescriptor, sup: &R::Class) -> bool {
        is_object_type(&desc.type_name)
            && self.load(&desc.type_name).is_some_and(|c| self.rt.is_assignable(&c, sup))
    }

    /// Holder field on `class`, then a field of `kind` on the holder's type.
    fn nested(&self, class: &R::Class, holders: &[&str], names: &[&str], kind: TypeKind) -> Option<Accessor<R>> {
        holders.iter().find_map(|h| {
            let (holder, desc) = self.object_field(class, &[h])?;
            let holder_class = self.load(&desc.type_name)?;
            let inner = known_field_of_kind(self.rt, &holder_class, names, kind)?;
            Some(Accessor::Nested { holder, inner })
        })
    }

    /// Getter returning a text object, then that object's string conversion.
    fn text_chain(&self, class: &R::Class, getters: &[&str]) -> Option<Accessor<R>> {
        getters.iter().find_map(|g| {
            let (_, desc, first) = zero_arg_method(self.rt, class, &[g], returns_object)?;
            let text = self.load(&desc.return_type)?;
            let (_, _, second) = zero_arg_method(self.rt, &text, TEXT_TO_STRING, returns_named(STRING))?;
            Some(Accessor::Chain(vec![first, second]))
        })
    }

    // ============================================================
    // Root fields
    // ============================================================

    fn player_field(&self) -> Option<(R::Field, FieldDescriptor)> {
        let root = self.root_class()?;
        self.object_field(root, PLAYER_FIELDS).or_else(|| {
            instance_fields(self.rt, root)
                .into_iter()
                .filter(|(_, f)| is_object_type(&f.type_name))
                .find_map(|(owner, f)| {
                    let ty = self.load(&f.type_name)?;
                    zero_arg_method(self.rt, &ty, HEALTH_GETTERS, returns_kind(TypeKind::Float))?;
                    debug!(field = %f.name, "player field found by health getter");
                    Some((self.rt.field(&owner, &f.name, &f.type_name, false)?, f))
                })
        })
    }

    fn player_class(&self) -> Option<R::Class> {
        let (field, desc) = self.player_field()?;
        self.load(&desc.type_name).or_else(|| {
            let player = self.rt.read_object(self.root()?, field)?;
            self.rt.class_of(&player)
        })
    }

    /// Health getter on the player hierarchy; its declaring class is the
    /// living-entity base.
    fn health_getter(&self) -> Option<(R::Class, R::Method)> {
        let class = self.cache.class(Role::PlayerClass)?;
        let (owner, _, method) = zero_arg_method(self.rt, class, HEALTH_GETTERS, returns_kind(TypeKind::Float))?;
        Some((owner, method))
    }

    fn screen_field(&self) -> Option<R::Field> {
        let root = self.root_class()?;
        if let Some((f, _)) = self.object_field(root, SCREEN_FIELDS) {
            return Some(f);
        }
        instance_fields(self.rt, root)
            .into_iter()
            .filter(|(_, f)| is_object_type(&f.type_name))
            .find_map(|(owner, f)| {
                let ty = self.load(&f.type_name)?;
                declares_any_method(self.rt, &ty, SCREEN_METHODS)
                    .then(|| self.rt.field(&owner, &f.name, &f.type_name, false))
                    .flatten()
            })
    }

    fn world_field(&self) -> Option<(R::Field, FieldDescriptor)> {
        let root = self.root_class()?;
        if let Some(hit) = self.object_field(root, WORLD_FIELDS) {
            return Some(hit);
        }
        let candidates: Vec<(R::Class, FieldDescriptor)> = instance_fields(self.rt, root)
            .into_iter()
            .filter(|(_, f)| is_object_type(&f.type_name))
            .collect();
        let by_name = candidates
            .iter()
            .find(|(_, f)| WORLD_TYPE_HINTS.iter().any(|h| f.type_name.contains(h)));
        let by_shape = || {
            candidates.iter().find(|(_, f)| {
                self.load(&f.type_name).is_some_and(|ty| {
                    method_with_params(self.rt, &ty, CHUNK_GETTERS, &["int", "int"], returns_object).is_some()
                })
            })
        };
        let (owner, f) = by_name.or_else(by_shape)?;
        Some((self.rt.field(owner, &f.name, &f.type_name, false)?, f.clone()))
    }

    fn world_class(&self) -> Option<R::Class> {
        let (field, desc) = self.world_field()?;
        self.load(&desc.type_name).or_else(|| {
            let world = self.rt.read_object(self.root()?, field)?;
            self.rt.class_of(&world)
        })
    }

    fn hit_kind(&self) -> Option<Accessor<R>> {
        let root = self.root_class()?;
        let (_, desc) = self.object_field(root, CROSSHAIR_FIELDS)?;
        let target = self.load(&desc.type_name)?;
        if let Some((f, _)) = self.object_field(&target, HIT_KIND_FIELDS) {
            return Some(Accessor::Field(f));
        }
        zero_arg_method(self.rt, &target, HIT_KIND_METHODS, returns_object).map(|(_, _, m)| Accessor::Method(m))
    }

    fn viewer_position(&self) -> Option<Accessor<R>> {
        let root = self.root_class()?;
        RENDER_MANAGER_FIELDS.iter().find_map(|name| {
            let (holder, desc) = self.object_field(root, &[name])?;
            let manager = self.load(&desc.type_name)?;
            let coords = known_triplet(self.rt, &manager, VIEWER_TRIPLES, TypeKind::Double)?;
            Some(Accessor::NestedTriplet { holder, coords })
        })
    }

    // ============================================================
    // Camera matrices
    // ============================================================

    fn static_buffer(&self, owner: &R::Class, names: &[&str]) -> Option<R::Field> {
        names.iter().find_map(|name| {
            let (id, desc) = known_field(self.rt, owner, &[name], true)?;
            (desc.type_name == FLOAT_BUFFER).then_some(id)
        })
    }

    /// A class holding two static float buffers and an int buffer.
    fn scan_render_info(&self) -> Option<R::Class> {
        self.rt.loaded_classes().into_iter().find(|class| {
            let Some(name) = self.rt.class_name(class) else { return false };
            if EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p)) {
                return false;
            }
            let fields = self.rt.declared_fields(class);
            let count = |ty: &str| fields.iter().filter(|f| f.is_static && f.type_name == ty).count();
            count(FLOAT_BUFFER) >= 2 && count(INT_BUFFER) >= 1
        })
    }

    fn buffer_matrices(&self) -> Option<MatrixAccess<R>> {
        let owner = self.load_first(RENDER_INFO_CLASSES).or_else(|| self.scan_render_info())?;
        let (view, proj) = match (
            self.static_buffer(&owner, MODELVIEW_FIELDS),
            self.static_buffer(&owner, PROJECTION_FIELDS),
        ) {
            (Some(v), Some(p)) => (v, p),
            _ => {
                let [v, p] = positional_fields(self.rt, &owner, FLOAT_BUFFER, true, false)?;
                (v, p)
            }
        };
        let buffer = self.rt.load_class(None, FLOAT_BUFFER)?;
        let get = self.rt.method(&buffer, "get", &["int"], "float")?;
        Some(MatrixAccess::Buffers { owner, view, proj, get })
    }

    fn joml_matrices(&self) -> Option<MatrixAccess<R>> {
        let root = self.root_class()?;
        let (renderer, desc) = self.object_field(root, GAME_RENDERER_FIELDS)?;
        let renderer_class = self.load(&desc.type_name)?;
        let matrix_field = |names: &[&str]| {
            names.iter().find_map(|name| {
                let (id, desc) = known_field(self.rt, &renderer_class, &[name], false)?;
                (desc.type_name == MATRIX4F).then_some(id)
            })
        };
        let view = matrix_field(JOML_VIEW_FIELDS)?;
        let proj = matrix_field(JOML_PROJECTION_FIELDS)?;
        let matrix = self.load(MATRIX4F)?;
        // mCR is column C, row R; column-major index C*4+R.
        let cells: Vec<R::Field> = (0..16)
            .map(|i| self.rt.field(&matrix, &format!("m{}{}", i / 4, i % 4), "float", false))
            .collect::<Option<_>>()?;
        let cells = cells.try_into().ok()?;
        Some(MatrixAccess::Joml { renderer, view, proj, cells })
    }

    // ============================================================
    // Entity hierarchy
    // ============================================================

    fn entity_position(&self) -> Option<Accessor<R>> {
        let class = self.cache.class(Role::PlayerClass)?;
        if let Some(t) = known_triplet(self.rt, class, POSITION_TRIPLES, TypeKind::Double) {
            return Some(Accessor::Triplet(t));
        }
        let nested = POSITION_HOLDERS.iter().find_map(|name| {
            let (holder, desc) = self.object_field(class, &[name])?;
            let vector = self.load(&desc.type_name)?;
            let coords = known_triplet(self.rt, &vector, VECTOR_TRIPLES, TypeKind::Double)?;
            Some(Accessor::NestedTriplet { holder, coords })
        });
        nested.or_else(|| positional_fields(self.rt, class, "double", false, true).map(Accessor::Triplet))
    }

    fn angle(&self, fields: &[&str], methods: &[&str]) -> Option<Accessor<R>> {
        let class = self.cache.class(Role::PlayerClass)?;
        known_field_of_kind(self.rt, class, fields, TypeKind::Float)
            .map(Accessor::Field)
            .or_else(|| {
                zero_arg_method(self.rt, class, methods, returns_kind(TypeKind::Float))
                    .map(|(_, _, m)| Accessor::Method(m))
            })
    }

    fn entity_name(&self) -> Option<Accessor<R>> {
        let class = self.cache.class(Role::PlayerClass)?;
        zero_arg_method(self.rt, class, NAME_STRING_GETTERS, returns_named(STRING))
            .map(|(_, _, m)| Accessor::Method(m))
            .or_else(|| self.text_chain(class, NAME_TEXT_GETTERS))
    }

    fn held_item_getter(&self) -> Option<(MethodDescriptor, R::Method)> {
        let class = self.cache.class(Role::PlayerClass)?;
        let (_, desc, method) = zero_arg_method(self.rt, class, HELD_ITEM_GETTERS, returns_object)?;
        Some((desc, method))
    }

    fn entity_list(&self) -> Option<R::Field> {
        let world_class = self.cache.class(Role::WorldClass)?;
        let collection = self.rt.load_class(None, COLLECTION)?;
        let known = ENTITY_LIST_FIELDS.iter().find_map(|name| {
            let (id, desc) = known_field(self.rt, world_class, &[name], false)?;
            self.declared_as(&desc, &collection).then_some(id)
        });
        known.or_else(|| self.validate_entity_list(&self.world()?))
    }

    /// Collection field on the live world whose sampled elements are all
    /// living entities.
    pub(super) fn validate_entity_list(&self, world: &R::Object) -> Option<R::Field> {
        let living = self.cache.class(Role::LivingClass)?;
        let collection = self.rt.load_class(None, COLLECTION)?;
        let class = self.rt.class_of(world)?;
        let field = validated_collection_field(
            self.rt,
            &class,
            world,
            |f| self.declared_as(f, &collection),
            ENTITY_SAMPLE,
            |items| items.iter().all(|e| self.rt.is_instance(e, living)),
        )?;
        debug!("entity list validated by contents");
        Some(field)
    }

    // ============================================================
    // Items
    // ============================================================

    fn item_stack_name(&self) -> Option<Accessor<R>> {
        let class = self.cache.class(Role::ItemStackClass)?;
        zero_arg_method(self.rt, class, STACK_NAME_STRING_GETTERS, returns_named(STRING))
            .map(|(_, _, m)| Accessor::Method(m))
            .or_else(|| self.text_chain(class, STACK_NAME_TEXT_GETTERS))
    }

    fn item_getter(&self) -> Option<(MethodDescriptor, R::Method)> {
        let class = self.cache.class(Role::ItemStackClass)?;
        let (_, desc, method) = zero_arg_method(self.rt, class, STACK_ITEM_GETTERS, returns_object)?;
        Some((desc, method))
    }

    /// Direct item subclass carrying a block reference.
    fn placeable_item_class(&self) -> Option<R::Class> {
        if let Some(c) = self.load_first(PLACEABLE_CLASSES) {
            return Some(c);
        }
        let (desc, _) = self.item_getter()?;
        let item = self.load(&desc.return_type)?;
        let block = self.load_first(BLOCK_CLASSES)?;
        let block_name = self.rt.class_name(&block)?;
        self.rt.loaded_classes().into_iter().find(|c| {
            self.rt.superclass(c).is_some_and(|s| self.rt.same_class(&s, &item))
                && self
                    .rt
                    .declared_fields(c)
                    .iter()
                    .any(|f| !f.is_static && f.type_name == block_name)
        })
    }

    // ============================================================
    // Chunks and block entities
    // ============================================================

    fn chunk_getter(&self) -> Option<(MethodDescriptor, R::Method)> {
        let world = self.cache.class(Role::WorldClass)?;
        let params = ["int", "int"];
        method_with_params(self.rt, world, CHUNK_GETTERS, &params, returns_object)
            .or_else(|| {
                method_with_params(self.rt, world, &[], &params, |t| {
                    returns_object(t) && t.contains("Chunk")
                })
            })
            .or_else(|| {
                let map = self.rt.load_class(None, MAP)?;
                method_with_params(self.rt, world, &[], &params, |t| {
                    returns_object(t)
                        && self.load(t).is_some_and(|c| {
                            instance_fields(self.rt, &c).iter().any(|(_, f)| self.declared_as(f, &map))
                        })
                })
            })
    }

    fn block_entity_map(&self) -> Option<R::Field> {
        let chunk_class = self.cache.class(Role::ChunkClass)?;
        let map = self.rt.load_class(None, MAP)?;
        let known = BLOCK_ENTITY_MAP_FIELDS.iter().find_map(|name| {
            let (id, desc) = known_field(self.rt, chunk_class, &[name], false)?;
            self.declared_as(&desc, &map).then_some(id)
        });
        known.or_else(|| {
            let player = self.player()?;
            let pos = self.cache.coords_of(self.rt, Role::EntityPosition, &player)?;
            let chunk = crate::reader::chunk_at(self.rt, self.cache, &self.world()?, pos[0], pos[2])?;
            self.validate_block_entity_map(&chunk)
        })
    }

    /// Map field on a live chunk whose sampled values are block entities.
    pub(super) fn validate_block_entity_map(&self, chunk: &R::Object) -> Option<R::Field> {
        let block_entity = self.cache.class(Role::BlockEntityClass)?;
        let map = self.rt.load_class(None, MAP)?;
        let class = self.rt.class_of(chunk)?;
        let field = validated_collection_field(
            self.rt,
            &class,
            chunk,
            |f| self.declared_as(f, &map),
            BLOCK_ENTITY_SAMPLE,
            |items| items.iter().all(|v| self.rt.is_instance(v, block_entity)),
        )?;
        debug!("block entity map validated by contents");
        Some(field)
    }

    fn container_classes(&self) -> Option<Vec<R::Class>> {
        let mut found: Vec<R::Class> = CONTAINER_CLASSES.iter().filter_map(|n| self.load(n)).collect();
        if found.is_empty() {
            let base = self.cache.class(Role::BlockEntityClass)?;
            found = self
                .rt
                .loaded_classes()
                .into_iter()
                .filter(|c| {
                    self.rt.class_name(c).is_some_and(|n| n.contains(CONTAINER_NAME_HINT))
                        && self.rt.is_assignable(c, base)
                })
                .collect();
        }
        (!found.is_empty()).then_some(found)
    }

    fn block_entity_pos(&self) -> Option<R::Field> {
        let block_entity = self.cache.class(Role::BlockEntityClass)?;
        let pos_class = self.cache.class(Role::BlockPosClass)?;
        let pos_name = self.rt.class_name(pos_class)?;
        BLOCK_ENTITY_POS_FIELDS
            .iter()
            .find_map(|name| {
                let (id, desc) = known_field(self.rt, block_entity, &[name], false)?;
                (desc.type_name == pos_name).then_some(id)
            })
            .or_else(|| first_field_of_type(self.rt, block_entity, &pos_name))
    }

    fn hash_map_buckets(&self) -> Option<BucketAccess<R>> {
        let map = self.rt.load_class(None, HASH_MAP)?;
        let node = self.rt.load_class(None, HASH_NODE)?;
        Some(BucketAccess {
            table: self.rt.field(&map, "table", HASH_TABLE, false)?,
            key: self.rt.field(&node, "key", "java.lang.Object", false)?,
            value: self.rt.field(&node, "value", "java.lang.Object", false)?,
            next: self.rt.field(&node, "next", HASH_NODE, false)?,
            map_class: map,
        })
    }
}
