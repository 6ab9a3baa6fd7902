// discovery/roots.rs - Game class loader and root singleton location.

use crate::host::Runtime;
use tracing::{debug, info};

/// Threads whose context loader is the game's, in preference order.
/// Matched as substrings of the live thread name.
pub const GAME_THREAD_NAMES: [&str; 3] = ["Render thread", "Client thread", "main"];

/// Package prefixes never considered as root candidates.
pub const EXCLUDED_PREFIXES: [&str; 12] = [
    "java.",
    "javax.",
    "sun.",
    "com.sun.",
    "jdk.",
    "org.",
    "com.google.",
    "io.",
    "com.moonsworth.",
    "com.lunarclient.",
    "lunar.",
    "[",
];

/// Root class names across mapping generations, tried before any scan.
pub const KNOWN_ROOT_NAMES: [&str; 4] = [
    "net.minecraft.client.Minecraft",
    "net.minecraft.client.MinecraftClient",
    "net.minecraft.class_310",
    "ave",
];

pub const PRIMARY_NAMESPACE: &str = "net.minecraft.";

/// A root must hold more instance fields than this.
pub const MIN_ROOT_FIELDS: usize = 15;

/// Context loader of the game thread, if one is running yet.
pub fn game_class_loader<R: Runtime>(rt: &R) -> Option<R::Object> {
    let threads = rt.live_threads();
    let found = GAME_THREAD_NAMES.iter().find_map(|wanted| {
        threads
            .iter()
            .filter(|t| t.name.contains(wanted))
            .find_map(|t| t.context_loader.clone().map(|l| (t.name.clone(), l)))
    });
    match found {
        Some((name, loader)) => {
            debug!(thread = %name, "game class loader found");
            Some(loader)
        }
        None => {
            debug!(threads = threads.len(), "no game thread with a context loader");
            None
        }
    }
}

#[derive(Debug)]
pub struct RootCandidate<C> {
    pub class: C,
    pub name: String,
    pub self_field: String,
    pub instance_fields: usize,
}

impl<C> RootCandidate<C> {
    fn in_primary_namespace(&self) -> bool {
        self.name.starts_with(PRIMARY_NAMESPACE)
    }

    /// Primary namespace wins, then more fields.
    fn beats(&self, other: &Self) -> bool {
        match (self.in_primary_namespace(), other.in_primary_namespace()) {
            (true, false) => true,
            (false, true) => false,
            _ => self.instance_fields > other.instance_fields,
        }
    }
}

/// A static field of the class's own type, plus a large instance state.
fn qualify<R: Runtime>(rt: &R, class: &R::Class) -> Option<RootCandidate<R::Class>> {
    let desc = rt.describe(class)?;
    if EXCLUDED_PREFIXES.iter().any(|p| desc.name.starts_with(p)) {
        return None;
    }
    let instance_fields = desc.instance_field_count();
    if instance_fields <= MIN_ROOT_FIELDS {
        return None;
    }
    let self_field = desc
        .fields
        .iter()
        .find(|f| f.is_static && f.type_name == desc.name)?
        .name
        .clone();
    Some(RootCandidate { class: class.clone(), name: desc.name, self_field, instance_fields })
}

/// Locate the root singleton class: known names through the game loader
/// first, then a scan of every loaded class.
pub fn find_root_class<R: Runtime>(rt: &R, loader: Option<&R::Object>) -> Option<RootCandidate<R::Class>> {
    for name in KNOWN_ROOT_NAMES {
        let Some(class) = rt.load_class(loader, name) else { continue };
        if let Some(candidate) = qualify(rt, &class) {
            info!(class = %candidate.name, "root class found by name");
            return Some(candidate);
        }
    }

    let classes = rt.loaded_classes();
    let mut best: Option<RootCandidate<R::Class>> = None;
    for class in &classes {
        let Some(candidate) = qualify(rt, class) else { continue };
        debug!(class = %candidate.name, fields = candidate.instance_fields, "root candidate");
        if best.as_ref().map_or(true, |b| candidate.beats(b)) {
            best = Some(candidate);
        }
    }
    if let Some(b) = &best {
        info!(class = %b.name, fields = b.instance_fields, scanned = classes.len(), "root class selected");
    }
    best
}

/// Current value of the root's self-typed static field; `None` until the
/// host has constructed it.
pub fn root_instance<R: Runtime>(rt: &R, class: &R::Class) -> Option<R::Object> {
    let desc = rt.describe(class)?;
    desc.fields
        .iter()
        .filter(|f| f.is_static && f.type_name == desc.name)
        .find_map(|f| {
            let field = rt.field(class, &f.name, &f.type_name, true)?;
            rt.read_static(class, field)?.object()
        })
}
