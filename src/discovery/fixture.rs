// discovery/fixture.rs - A small but complete game object graph for tests.
//
// Laid out with the legacy readable names, so every role has a known-name
// path. Tests rename or drop members to push discovery onto the structural
// heuristics.

use crate::host::synthetic::{ClassId, ObjId, Synthetic};
use crate::host::Value;

pub const ENTITY: &str = "net.minecraft.entity.Entity";
pub const LIVING: &str = "net.minecraft.entity.EntityLivingBase";
pub const PLAYER: &str = "net.minecraft.entity.player.EntityPlayer";
pub const LOCAL_PLAYER: &str = "net.minecraft.client.entity.EntityPlayerSP";
pub const OTHER_PLAYER: &str = "net.minecraft.client.entity.EntityOtherPlayerMP";
pub const ITEM_ENTITY: &str = "net.minecraft.entity.item.EntityItem";
pub const WORLD: &str = "net.minecraft.client.multiplayer.WorldClient";
pub const CHUNK: &str = "net.minecraft.world.chunk.Chunk";
pub const SCREEN: &str = "net.minecraft.client.gui.GuiScreen";
pub const STACK: &str = "net.minecraft.item.ItemStack";
pub const ITEM: &str = "net.minecraft.item.Item";
pub const ITEM_BLOCK: &str = "net.minecraft.item.ItemBlock";
pub const BLOCK: &str = "net.minecraft.block.Block";
pub const TILE: &str = "net.minecraft.tileentity.TileEntity";
pub const CHEST: &str = "net.minecraft.tileentity.TileEntityChest";
pub const ENDER_CHEST: &str = "net.minecraft.tileentity.TileEntityEnderChest";
pub const FURNACE: &str = "net.minecraft.tileentity.TileEntityFurnace";
pub const VEC3I: &str = "net.minecraft.util.Vec3i";
pub const BLOCK_POS: &str = "net.minecraft.util.BlockPos";
pub const HIT: &str = "net.minecraft.util.MovingObjectPosition";
pub const HIT_TYPE: &str = "net.minecraft.util.MovingObjectPosition$MovingObjectType";
pub const ROOT: &str = "net.minecraft.client.Minecraft";

pub struct Game {
    pub s: Synthetic,
    pub root_class: ClassId,
    pub living_class: ClassId,
    pub local_player_class: ClassId,
    pub other_player_class: ClassId,
    pub item_entity_class: ClassId,
    pub world_class: ClassId,
    pub chunk_class: ClassId,
    pub screen_class: ClassId,
    pub stack_class: ClassId,
    pub item_class: ClassId,
    pub item_block_class: ClassId,
    pub chest_class: ClassId,
    pub ender_chest_class: ClassId,
    pub furnace_class: ClassId,
    pub block_pos_class: ClassId,
    pub hit_type_class: ClassId,
    pub root: ObjId,
    pub player: ObjId,
    pub world: ObjId,
    pub chunk: ObjId,
    pub hit: ObjId,
    pub controller: ObjId,
    pub settings: ObjId,
    pub render_manager: ObjId,
    pub modelview: ObjId,
    pub projection: ObjId,
    players: Vec<ObjId>,
    entities: Vec<ObjId>,
    tiles: Vec<(ObjId, ObjId)>,
    ticks: ObjId,
}

impl Game {
    pub fn new() -> Self {
        let mut s = Synthetic::new();
        let loader_class = s.find("java.lang.ClassLoader").unwrap();
        let loader = s.object(loader_class);
        s.thread("Client thread", Some(loader));
        s.thread("Server thread", None);

        // -- entities ---------------------------------------------------------
        let entity = s.class(ENTITY, None);
        for f in ["posX", "posY", "posZ"] {
            s.add_field(entity, f, "double", false);
        }
        s.add_field(entity, "rotationYaw", "float", false);
        s.add_field(entity, "rotationPitch", "float", false);
        s.add_field(entity, "name", "java.lang.String", false);
        s.getter(entity, "getName", "java.lang.String", "name");

        let living = s.class(LIVING, Some(entity));
        s.add_field(living, "health", "float", false);
        s.add_field(living, "armor", "int", false);
        s.add_field(living, "held", STACK, false);
        s.getter(living, "getHealth", "float", "health");
        s.getter(living, "getTotalArmorValue", "int", "armor");
        s.getter(living, "getHeldItem", STACK, "held");

        let player = s.class(PLAYER, Some(living));
        let local_player = s.class(LOCAL_PLAYER, Some(player));
        let other_player = s.class(OTHER_PLAYER, Some(player));
        let item_entity = s.class(ITEM_ENTITY, Some(entity));

        // -- items ------------------------------------------------------------
        let item = s.class(ITEM, None);
        s.add_field(item, "unlocalizedName", "java.lang.String", false);
        s.getter(item, "getUnlocalizedName", "java.lang.String", "unlocalizedName");
        s.class(BLOCK, None);
        let item_block = s.class(ITEM_BLOCK, Some(item));
        s.add_field(item_block, "block", BLOCK, false);
        let stack = s.class(STACK, None);
        s.add_field(stack, "displayName", "java.lang.String", false);
        s.add_field(stack, "item", ITEM, false);
        s.getter(stack, "getDisplayName", "java.lang.String", "displayName");
        s.getter(stack, "getItem", ITEM, "item");

        // -- block entities ---------------------------------------------------
        let vec3i = s.class(VEC3I, None);
        for f in ["x", "y", "z"] {
            s.add_field(vec3i, f, "int", false);
        }
        let block_pos = s.class(BLOCK_POS, Some(vec3i));
        let tile = s.class(TILE, None);
        s.add_field(tile, "worldObj", WORLD, false);
        s.add_field(tile, "pos", BLOCK_POS, false);
        let chest = s.class(CHEST, Some(tile));
        let ender_chest = s.class(ENDER_CHEST, Some(tile));
        let furnace = s.class(FURNACE, Some(tile));
        let tick_entry = s.class("net.minecraft.world.NextTickListEntry", None);

        // -- world ------------------------------------------------------------
        let chunk_class = s.class(CHUNK, None);
        s.add_field(chunk_class, "tickMap", "java.util.Map", false);
        s.add_field(chunk_class, "chunkTileEntityMap", "java.util.Map", false);
        let world_class = s.class(WORLD, None);
        s.add_field(world_class, "loadedEntityList", "java.util.List", false);
        s.add_field(world_class, "playerEntities", "java.util.List", false);
        s.add_method(world_class, "getChunkFromChunkCoords", &["int", "int"], CHUNK, |s, this, args| {
            match args {
                [Value::Int(0), Value::Int(0)] => s.get(this, "chunk00"),
                _ => Some(Value::Null),
            }
        });

        // -- root-held state --------------------------------------------------
        let screen = s.class(SCREEN, None);
        s.add_method(screen, "drawScreen", &["int", "int", "float"], "void", |_, _, _| Some(Value::Null));
        let hit_type = s.class(HIT_TYPE, None);
        let hit_class = s.class(HIT, None);
        s.add_field(hit_class, "typeOfHit", HIT_TYPE, false);
        let controller_class = s.class("net.minecraft.client.multiplayer.PlayerControllerMP", None);
        s.add_field(controller_class, "isHittingBlock", "boolean", false);
        let settings_class = s.class("net.minecraft.client.settings.GameSettings", None);
        s.add_field(settings_class, "fovSetting", "float", false);
        let manager_class = s.class("net.minecraft.client.renderer.entity.RenderManager", None);
        for f in ["viewerPosX", "viewerPosY", "viewerPosZ"] {
            s.add_field(manager_class, f, "double", false);
        }

        let float_buffer = s.find("java.nio.FloatBuffer").unwrap();
        s.add_method(float_buffer, "get", &["int"], "float", |s, this, args| {
            let i = args.first()?.as_i32()?;
            s.get(this, &format!("f{i}"))
        });
        let render_info = s.class("net.minecraft.client.renderer.ActiveRenderInfo", None);
        s.add_field(render_info, "VIEWPORT", "java.nio.IntBuffer", true);
        s.add_field(render_info, "MODELVIEW", "java.nio.FloatBuffer", true);
        s.add_field(render_info, "PROJECTION", "java.nio.FloatBuffer", true);

        let root_class = s.class(ROOT, None);
        s.add_field(root_class, "theMinecraft", ROOT, true);
        s.add_field(root_class, "thePlayer", LOCAL_PLAYER, false);
        s.add_field(root_class, "theWorld", WORLD, false);
        s.add_field(root_class, "currentScreen", SCREEN, false);
        s.add_field(root_class, "objectMouseOver", HIT, false);
        s.add_field(root_class, "playerController", "net.minecraft.client.multiplayer.PlayerControllerMP", false);
        s.add_field(root_class, "gameSettings", "net.minecraft.client.settings.GameSettings", false);
        s.add_field(root_class, "renderManager", "net.minecraft.client.renderer.entity.RenderManager", false);
        s.filler_fields(root_class, 20);

        // -- instances --------------------------------------------------------
        let root = s.object(root_class);
        s.set_static(root_class, "theMinecraft", Value::Object(root));

        let player_obj = s.object(local_player);
        let me = s.new_string("Me");
        s.set(player_obj, "name", Value::Object(me));
        s.set(player_obj, "health", Value::Float(20.0));
        s.set(player_obj, "armor", Value::Int(0));
        s.set(player_obj, "held", Value::Null);
        s.set(player_obj, "posX", Value::Double(0.5));
        s.set(player_obj, "posY", Value::Double(64.0));
        s.set(player_obj, "posZ", Value::Double(0.5));

        let world = s.object(world_class);
        let chunk = s.object(chunk_class);
        s.set(world, "chunk00", Value::Object(chunk));
        let tick = s.object(tick_entry);
        let tick_key = s.object(tick_entry);
        let ticks = s.hash_map(&[(tick_key, tick)], 4);
        s.set(chunk, "tickMap", Value::Object(ticks));

        let hit = s.object(hit_class);
        let miss = s.enum_value(hit_type, "MISS");
        s.set(hit, "typeOfHit", Value::Object(miss));
        let controller = s.object(controller_class);
        let settings = s.object(settings_class);
        s.set(settings, "fovSetting", Value::Float(70.0));
        let render_manager = s.object(manager_class);

        let modelview = s.object(float_buffer);
        let projection = s.object(float_buffer);
        s.set_static(render_info, "MODELVIEW", Value::Object(modelview));
        s.set_static(render_info, "PROJECTION", Value::Object(projection));

        s.set(root, "thePlayer", Value::Object(player_obj));
        s.set(root, "theWorld", Value::Object(world));
        s.set(root, "objectMouseOver", Value::Object(hit));
        s.set(root, "playerController", Value::Object(controller));
        s.set(root, "gameSettings", Value::Object(settings));
        s.set(root, "renderManager", Value::Object(render_manager));

        let mut game = Game {
            s,
            root_class,
            living_class: living,
            local_player_class: local_player,
            other_player_class: other_player,
            item_entity_class: item_entity,
            world_class,
            chunk_class,
            screen_class: screen,
            stack_class: stack,
            item_class: item,
            item_block_class: item_block,
            chest_class: chest,
            ender_chest_class: ender_chest,
            furnace_class: furnace,
            block_pos_class: block_pos,
            hit_type_class: hit_type,
            root,
            player: player_obj,
            world,
            chunk,
            hit,
            controller,
            settings,
            render_manager,
            modelview,
            projection,
            players: vec![player_obj],
            entities: vec![player_obj],
            tiles: Vec::new(),
            ticks,
        };
        game.set_matrices(&crate::math::Mat4::IDENTITY.0, &crate::math::Mat4::IDENTITY.0);
        game.spawn_item([4.0, 64.0, 4.0]);
        game.retile();
        game
    }

    fn relist(&mut self) {
        let players = self.s.list(&self.players);
        self.s.set(self.world, "playerEntities", Value::Object(players));
        let all = self.s.list(&self.entities);
        self.s.set(self.world, "loadedEntityList", Value::Object(all));
    }

    fn retile(&mut self) {
        let map = self.s.hash_map(&self.tiles, 4);
        self.s.set(self.chunk, "chunkTileEntityMap", Value::Object(map));
    }

    pub fn set_position(&mut self, entity: ObjId, pos: [f64; 3]) {
        self.s.set(entity, "posX", Value::Double(pos[0]));
        self.s.set(entity, "posY", Value::Double(pos[1]));
        self.s.set(entity, "posZ", Value::Double(pos[2]));
    }

    pub fn set_rotation(&mut self, yaw: f32, pitch: f32) {
        self.s.set(self.player, "rotationYaw", Value::Float(yaw));
        self.s.set(self.player, "rotationPitch", Value::Float(pitch));
    }

    pub fn spawn_player(&mut self, name: &str, pos: [f64; 3], health: f32) -> ObjId {
        let p = self.s.object(self.other_player_class);
        let n = self.s.new_string(name);
        self.s.set(p, "name", Value::Object(n));
        self.s.set(p, "health", Value::Float(health));
        self.s.set(p, "armor", Value::Int(0));
        self.s.set(p, "held", Value::Null);
        self.set_position(p, pos);
        self.players.push(p);
        self.entities.push(p);
        self.relist();
        p
    }

    pub fn spawn_item(&mut self, pos: [f64; 3]) -> ObjId {
        let e = self.s.object(self.item_entity_class);
        self.set_position(e, pos);
        self.entities.push(e);
        self.relist();
        e
    }

    /// Put a stack named `name` in `entity`'s hand; `placeable` picks a
    /// block item over a plain one.
    pub fn hold(&mut self, entity: ObjId, name: &str, placeable: bool) -> ObjId {
        self.hold_item(entity, name, "item.unnamed", placeable)
    }

    /// Like `hold`, with the item's unlocalized id.
    pub fn hold_item(&mut self, entity: ObjId, name: &str, unlocalized: &str, placeable: bool) -> ObjId {
        let item = self.s.object(if placeable { self.item_block_class } else { self.item_class });
        let id = self.s.new_string(unlocalized);
        self.s.set(item, "unlocalizedName", Value::Object(id));
        let stack = self.s.object(self.stack_class);
        let n = self.s.new_string(name);
        self.s.set(stack, "displayName", Value::Object(n));
        self.s.set(stack, "item", Value::Object(item));
        self.s.set(entity, "held", Value::Object(stack));
        stack
    }

    fn add_tile(&mut self, class: ClassId, pos: [i32; 3]) -> ObjId {
        let bp = self.s.object(self.block_pos_class);
        self.s.set(bp, "x", Value::Int(pos[0]));
        self.s.set(bp, "y", Value::Int(pos[1]));
        self.s.set(bp, "z", Value::Int(pos[2]));
        let te = self.s.object(class);
        self.s.set(te, "pos", Value::Object(bp));
        self.tiles.push((bp, te));
        self.retile();
        te
    }

    pub fn add_chest(&mut self, pos: [i32; 3]) -> ObjId {
        self.add_tile(self.chest_class, pos)
    }

    pub fn add_ender_chest(&mut self, pos: [i32; 3]) -> ObjId {
        self.add_tile(self.ender_chest_class, pos)
    }

    pub fn add_furnace(&mut self, pos: [i32; 3]) -> ObjId {
        self.add_tile(self.furnace_class, pos)
    }

    /// Open a screen of a new subclass named `name`.
    pub fn open_screen(&mut self, name: &str) -> ObjId {
        let class = self.s.class(name, Some(self.screen_class));
        let screen = self.s.object(class);
        self.s.set(self.root, "currentScreen", Value::Object(screen));
        screen
    }

    pub fn close_screen(&mut self) {
        self.s.set(self.root, "currentScreen", Value::Null);
    }

    pub fn leave_world(&mut self) {
        self.s.set(self.root, "theWorld", Value::Null);
        self.s.set(self.root, "thePlayer", Value::Null);
    }

    pub fn enter_world(&mut self) {
        self.s.set(self.root, "theWorld", Value::Object(self.world));
        self.s.set(self.root, "thePlayer", Value::Object(self.player));
    }

    /// Replace the world object, as a dimension change does.
    pub fn change_world(&mut self) -> ObjId {
        let world = self.s.object(self.world_class);
        self.s.set(world, "chunk00", Value::Object(self.chunk));
        self.world = world;
        self.s.set(self.root, "theWorld", Value::Object(world));
        self.relist();
        world
    }

    pub fn look_at(&mut self, kind: &str) {
        let v = self.s.enum_value(self.hit_type_class, kind);
        self.s.set(self.hit, "typeOfHit", Value::Object(v));
    }

    pub fn set_breaking(&mut self, breaking: bool) {
        self.s.set(self.controller, "isHittingBlock", Value::Bool(breaking));
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.s.set(self.settings, "fovSetting", Value::Float(fov));
    }

    pub fn set_viewer(&mut self, pos: [f64; 3]) {
        self.s.set(self.render_manager, "viewerPosX", Value::Double(pos[0]));
        self.s.set(self.render_manager, "viewerPosY", Value::Double(pos[1]));
        self.s.set(self.render_manager, "viewerPosZ", Value::Double(pos[2]));
    }

    pub fn set_matrices(&mut self, view: &[f32; 16], proj: &[f32; 16]) {
        for i in 0..16 {
            self.s.set(self.modelview, &format!("f{i}"), Value::Float(view[i]));
            self.s.set(self.projection, &format!("f{i}"), Value::Float(proj[i]));
        }
    }

    /// Tick-map contents, for telling the two chunk maps apart.
    pub fn ticks(&self) -> ObjId {
        self.ticks
    }
}
