// lib.rs - DLL entry point for the client bridge.
//
// When the DLL is injected into the game process, DllMain fires with
// DLL_PROCESS_ATTACH and spawns a worker thread that:
//   1. Loads settings and starts the log file
//   2. Waits for the host to finish booting, then locates the running VM
//   3. Installs the wglSwapBuffers detour (overlay + key bindings)
//   4. Starts the polling thread and the control channel
//   5. Idles until the running flag clears, then tears everything down
//
// The `Detach` export does the same teardown on request and unloads the DLL.

#![allow(non_snake_case)]

pub mod accessors;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
#[cfg(windows)]
mod hook;
pub mod host;
pub mod input;
pub mod logging;
pub mod math;
pub mod net;
pub mod overlay;
pub mod poller;
pub mod projection;
pub mod reader;
pub mod settings;
pub mod snapshot;
pub mod text;

#[cfg(windows)]
pub use windows::Detach;

#[cfg(windows)]
mod windows {
    use crate::context::{join_all, pause, BridgeContext};
    use crate::settings::Settings;
    use crate::{hook, logging, net, poller};
    use jni::JavaVM;
    use once_cell::sync::OnceCell;
    use std::ptr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};
    use tracing::{error, info, warn};
    use winapi::shared::minwindef::{BOOL, DWORD, HINSTANCE, HMODULE, LPVOID, TRUE};
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::libloaderapi::{DisableThreadLibraryCalls, FreeLibraryAndExitThread};
    use winapi::um::processthreadsapi::CreateThread;
    use winapi::um::winnt::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    static CONTEXT: OnceCell<Arc<BridgeContext>> = OnceCell::new();
    static VM: OnceCell<JavaVM> = OnceCell::new();

    /// Set by the worker once threads are joined and hooks removed.
    static WORKER_DONE: AtomicBool = AtomicBool::new(false);
    static DETACHING: AtomicBool = AtomicBool::new(false);

    const IDLE_TICK: Duration = Duration::from_millis(50);
    /// Frames allowed to run after deactivation so GL objects are released
    /// in their own context.
    const UNLOAD_DELAY: Duration = Duration::from_millis(100);
    const WORKER_GRACE: Duration = Duration::from_secs(3);

    unsafe fn spawn_native(entry: unsafe extern "system" fn(LPVOID) -> DWORD) {
        let h = CreateThread(ptr::null_mut(), 0, Some(entry), ptr::null_mut(), 0, ptr::null_mut());
        if !h.is_null() {
            CloseHandle(h);
        }
    }

    unsafe extern "system" fn worker(_: LPVOID) -> DWORD {
        let (settings, settings_err) = Settings::load(&logging::module_dir());
        let log_path = logging::init(&settings.log_level);
        info!(?log_path, "bridge attached");
        if let Some(e) = settings_err {
            warn!(error = %e, "settings file ignored, using defaults");
        }

        let ctx = CONTEXT.get_or_init(|| Arc::new(BridgeContext::new(settings)));
        let code = match run(ctx) {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "bridge stopped");
                1
            }
        };
        WORKER_DONE.store(true, Ordering::Release);
        code
    }

    fn run(ctx: &Arc<BridgeContext>) -> crate::error::Result<()> {
        if !pause(ctx.running(), ctx.settings.startup_delay()) {
            return Ok(());
        }
        let vm: &'static JavaVM = VM.get_or_try_init(crate::host::jvm::locate_vm)?;
        info!("host VM located");

        let hooked = match unsafe { hook::install(Arc::clone(ctx)) } {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "overlay unavailable");
                false
            }
        };

        let mut threads: Vec<JoinHandle<()>> = Vec::new();
        match net::spawn(Arc::clone(ctx)) {
            Ok((addr, handle)) => {
                info!(%addr, "control channel listening");
                threads.push(handle);
            }
            Err(e) => warn!(error = %e, "control channel unavailable"),
        }
        let result = match poller::spawn(Arc::clone(ctx), vm) {
            Ok(handle) => {
                threads.push(handle);
                while ctx.is_running() {
                    std::thread::sleep(IDLE_TICK);
                }
                info!("shutting down");
                Ok(())
            }
            Err(e) => {
                ctx.stop();
                Err(e)
            }
        };
        teardown(threads, hooked);
        result
    }

    /// Stop drawing, let the last frames release GL objects, join the
    /// bridge threads, then remove the hook.
    fn teardown(threads: Vec<JoinHandle<()>>, hooked: bool) {
        unsafe { hook::deactivate() };
        std::thread::sleep(UNLOAD_DELAY);
        let panicked = join_all(threads);
        if panicked > 0 {
            warn!(panicked, "bridge threads ended abnormally");
        }
        if hooked {
            unsafe { hook::uninstall() };
        }
    }

    unsafe extern "system" fn unloader(_: LPVOID) -> DWORD {
        std::thread::sleep(UNLOAD_DELAY);
        let deadline = Instant::now() + WORKER_GRACE;
        while !WORKER_DONE.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(IDLE_TICK);
        }
        if !WORKER_DONE.load(Ordering::Acquire) {
            // Worker never started or is stuck; hooks must not outlive the code.
            hook::uninstall();
        }
        info!("unloading");
        FreeLibraryAndExitThread(logging::module_handle() as HMODULE, 0);
        0
    }

    /// Stop the bridge and unload the DLL. Input hooks are reversed before
    /// this returns; the unload itself happens on a helper thread.
    #[no_mangle]
    pub unsafe extern "system" fn Detach() {
        if DETACHING.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(ctx) = CONTEXT.get() {
            ctx.stop();
        }
        hook::deactivate();
        spawn_native(unloader);
    }

    #[no_mangle]
    pub unsafe extern "system" fn DllMain(hinst: HINSTANCE, reason: DWORD, _reserved: LPVOID) -> BOOL {
        match reason {
            DLL_PROCESS_ATTACH => {
                DisableThreadLibraryCalls(hinst);
                logging::set_module_handle(hinst as usize);
                spawn_native(worker);
            }
            DLL_PROCESS_DETACH => {
                if let Some(ctx) = CONTEXT.get() {
                    ctx.stop();
                }
            }
            _ => {}
        }
        TRUE
    }
}
