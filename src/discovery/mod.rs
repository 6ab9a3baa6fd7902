// discovery/mod.rs - Mapping discovery: pass sequencing, retry, live roles.
//
// A pass walks every role in dependency order and asks its resolution chain
// for an accessor. Roles already in the cache are skipped, so passes can be
// repeated freely; the root singleton gates everything else.

#[cfg(test)]
pub(crate) mod fixture;
pub mod probe;
pub mod roles;
pub mod roots;

use crate::accessors::{Accessor, AccessorCache, Role};
use crate::context::pause;
use crate::error::{BridgeError, Result};
use crate::host::Runtime;
use once_cell::unsync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// Outcome of one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub resolved: usize,
    pub newly_resolved: usize,
    pub missing: Vec<Role>,
}

impl PassReport {
    /// Nothing left except roles that need live objects.
    pub fn structurally_complete(&self) -> bool {
        self.missing.iter().all(|r| r.is_live())
    }
}

pub struct DiscoveryEngine<'a, R: Runtime> {
    rt: &'a R,
    cache: &'a AccessorCache<R>,
    loader: OnceCell<R::Object>,
}

impl<'a, R: Runtime> DiscoveryEngine<'a, R> {
    pub fn new(rt: &'a R, cache: &'a AccessorCache<R>) -> Self {
        Self { rt, cache, loader: OnceCell::new() }
    }

    pub fn runtime(&self) -> &'a R {
        self.rt
    }

    pub fn cache(&self) -> &'a AccessorCache<R> {
        self.cache
    }

    /// Game class loader, looked up until a game thread shows one.
    pub fn loader(&self) -> Option<&R::Object> {
        if let Some(l) = self.loader.get() {
            return Some(l);
        }
        let found = roots::game_class_loader(self.rt)?;
        Some(self.loader.get_or_init(|| found))
    }

    fn root(&self) -> Option<&R::Object> {
        self.cache.instance(Role::RootInstance)
    }

    fn player(&self) -> Option<R::Object> {
        let field = self.cache.field(Role::PlayerField)?;
        self.rt.read_object(self.root()?, field)
    }

    fn world(&self) -> Option<R::Object> {
        let field = self.cache.field(Role::WorldField)?;
        self.rt.read_object(self.root()?, field)
    }

    /// One full pass over every role.
    ///
    /// Fails with `RootUnavailable` when the root class or instance cannot be
    /// found; nothing past the root is attempted in that case.
    pub fn run_pass(&self) -> Result<PassReport> {
        let before = self.cache.resolved_count();
        for role in [Role::RootClass, Role::RootInstance] {
            if !self.cache.resolve(role, || self.probe(role)) {
                debug!(role = role.name(), "essential role unavailable");
                return Err(BridgeError::RootUnavailable);
            }
        }
        for role in Role::iter().filter(|r| !r.is_essential()) {
            self.cache.resolve(role, || self.probe(role));
        }
        let resolved = self.cache.resolved_count();
        Ok(PassReport {
            resolved,
            newly_resolved: resolved - before,
            missing: self.cache.unresolved().collect(),
        })
    }

    /// Repeat passes with a fixed back-off until the structural roles are
    /// all in or `attempts` runs out, then settle: structural roles still
    /// missing are failed permanently, live ones stay open.
    pub fn run_with_retry(&self, attempts: u32, backoff: Duration, running: &AtomicBool) -> Result<PassReport> {
        let attempts = attempts.max(1);
        let mut last = Err(BridgeError::RootUnavailable);
        for attempt in 1..=attempts {
            if !running.load(Ordering::Acquire) {
                break;
            }
            last = self.run_pass();
            match &last {
                Ok(report) if report.structurally_complete() => break,
                Ok(report) => info!(
                    attempt,
                    resolved = report.resolved,
                    missing = report.missing.len(),
                    "discovery pass incomplete"
                ),
                Err(e) => warn!(attempt, error = %e, "discovery pass failed"),
            }
            if attempt < attempts && !pause(running, backoff) {
                break;
            }
        }
        if let Ok(report) = &last {
            self.settle();
            info!(resolved = report.resolved, missing = ?report.missing, "discovery finished");
        }
        last
    }

    fn settle(&self) {
        let pending: Vec<Role> = self.cache.unresolved().filter(|r| !r.is_live()).collect();
        for role in pending {
            self.cache.mark_failed(role);
        }
    }

    // ============================================================
    // Live roles
    // ============================================================

    /// Retry the live roles that do not need a particular object.
    pub fn refresh_live(&self) {
        for role in [Role::HitKind, Role::ViewerPosition] {
            self.cache.resolve(role, || self.probe(role));
        }
    }

    /// Validate the entity list against `world`'s actual contents.
    pub fn refresh_entity_list(&self, world: &R::Object) -> bool {
        self.cache.resolve(Role::EntityList, || self.validate_entity_list(world).map(Accessor::Field))
    }

    /// Validate the block-entity map against a loaded chunk.
    pub fn refresh_block_entity_map(&self, chunk: &R::Object) -> bool {
        self.cache
            .resolve(Role::BlockEntityMap, || self.validate_block_entity_map(chunk).map(Accessor::Field))
    }
}
