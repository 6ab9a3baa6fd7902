// poller.rs - The background polling thread.
//
// The only thread that talks to the host runtime. It claims the polling
// capability, attaches to the VM for the rest of the session, runs discovery
// with retry, then builds and publishes one snapshot per tick until the
// running flag clears. It detaches on the way out.

use crate::accessors::AccessorCache;
use crate::context::{pause, BridgeContext};
use crate::discovery::DiscoveryEngine;
use crate::error::{BridgeError, Result};
use crate::host::jvm::JvmRuntime;
use crate::host::{PollThread, Runtime};
use crate::reader::StateReader;
use jni::JavaVM;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{error, info, warn};

pub fn spawn(ctx: Arc<BridgeContext>, vm: &'static JavaVM) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("bridge-poll".into())
        .spawn(move || run(&ctx, vm))
        .map_err(BridgeError::Io)
}

fn run(ctx: &BridgeContext, vm: &'static JavaVM) {
    let token = match PollThread::claim() {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "polling thread not started");
            return;
        }
    };
    let env = match vm.attach_current_thread_permanently() {
        Ok(env) => env,
        Err(e) => {
            error!(error = %BridgeError::Attach(e.to_string()), "polling thread not started");
            return;
        }
    };
    match JvmRuntime::new(env, &token) {
        Some(rt) => poll_session(ctx, &rt),
        None => error!("host runtime facade unavailable"),
    }
    // SAFETY: every local and global reference made on this thread was owned
    // by the runtime, which is gone by now.
    unsafe { vm.detach_current_thread() };
    info!("polling thread detached");
}

/// Discovery followed by the poll loop, against any runtime.
pub fn poll_session<R: Runtime>(ctx: &BridgeContext, rt: &R) {
    let settings = &ctx.settings;
    let cache = AccessorCache::new();
    let engine = DiscoveryEngine::new(rt, &cache);

    if let Err(e) = engine.run_with_retry(settings.discovery_attempts, settings.discovery_backoff(), ctx.running()) {
        warn!(error = %e, "discovery exhausted, all features unavailable");
    }

    let mut reader = StateReader::new(settings.clone());
    let mut published = 0u64;
    while ctx.is_running() {
        let config = ctx.config();
        let snapshot = reader.poll(&engine, &config, Instant::now());
        published = ctx.snapshots.publish(snapshot);
        if !pause(ctx.running(), settings.poll_interval()) {
            break;
        }
    }
    info!(published, "poll loop stopped");
}
