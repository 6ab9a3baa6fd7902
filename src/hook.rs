// hook.rs - wglSwapBuffers detour and window-procedure subclass.
//
// Every frame the game presents, the detour composes the overlay from the
// latest snapshot and draws it before calling the real swap. The first frame
// also subclasses the game window so key presses reach the input handler.
//
//   install()   -> MinHook init -> detour wglSwapBuffers
//   detour()    -> viewport, compose, render -> original wglSwapBuffers
//   uninstall() -> restore WndProc -> remove hook -> MinHook uninit

use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};
use crate::input::{self, KeyAction, Subclass};
use crate::overlay::gl::{self, GlBackend};
use crate::overlay::{ContextTracker, RenderComposer};
use minhook_sys::{MH_CreateHook, MH_DisableHook, MH_EnableHook, MH_Initialize, MH_RemoveHook, MH_Uninitialize, MH_OK};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use winapi::shared::minwindef::{BOOL, LPARAM, LRESULT, UINT, WPARAM};
use winapi::shared::windef::{HDC, HWND};
use winapi::um::libloaderapi::{GetModuleHandleA, GetProcAddress};
use winapi::um::winuser::{
    CallWindowProcA, DefWindowProcA, SetWindowLongPtrA, WindowFromDC, GWLP_WNDPROC, WM_KEYDOWN, WM_SYSKEYDOWN,
    WNDPROC,
};

type WglSwapBuffersFn = unsafe extern "system" fn(HDC) -> BOOL;

/// The real wglSwapBuffers.
static ORIGINAL: OnceCell<WglSwapBuffersFn> = OnceCell::new();

/// Address of the hooked function.
static TARGET: OnceCell<usize> = OnceCell::new();

static CONTEXT: OnceCell<Arc<BridgeContext>> = OnceCell::new();

/// Cleared at detach; the detour then only forwards.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Subclassed window and its previous procedure.
static SUBCLASS: Subclass = Subclass::new();

struct FrameState {
    composer: RenderComposer,
    tracker: ContextTracker<GlBackend>,
}

static FRAME: Lazy<Mutex<FrameState>> = Lazy::new(|| {
    Mutex::new(FrameState { composer: RenderComposer::new(), tracker: ContextTracker::new(GlBackend::new()) })
});

fn hook_err(stage: &'static str, status: i32) -> BridgeError {
    BridgeError::Hook { stage, status }
}

/// Install the swap detour. Frames are drawn from `ctx` from now on.
pub unsafe fn install(ctx: Arc<BridgeContext>) -> Result<()> {
    let _ = CONTEXT.set(ctx);

    let s = MH_Initialize();
    if s != MH_OK {
        return Err(hook_err("MH_Initialize", s));
    }

    let ogl = GetModuleHandleA(b"opengl32.dll\0".as_ptr() as _);
    if ogl.is_null() {
        return Err(hook_err("opengl32.dll", -1));
    }
    let swap = GetProcAddress(ogl, b"wglSwapBuffers\0".as_ptr() as _);
    if swap.is_null() {
        return Err(hook_err("wglSwapBuffers", -2));
    }

    let mut original = ptr::null_mut::<c_void>();
    let s = MH_CreateHook(swap as *mut c_void, detour as *mut c_void, &mut original);
    if s != MH_OK {
        return Err(hook_err("MH_CreateHook", s));
    }
    let _ = ORIGINAL.set(std::mem::transmute::<*mut c_void, WglSwapBuffersFn>(original));
    let _ = TARGET.set(swap as usize);

    ACTIVE.store(true, Ordering::Release);
    let s = MH_EnableHook(swap as *mut c_void);
    if s != MH_OK {
        ACTIVE.store(false, Ordering::Release);
        return Err(hook_err("MH_EnableHook", s));
    }
    info!("swap detour installed");
    Ok(())
}

/// Stop drawing and handing keys to the bridge. The detour stays in place
/// and forwards, releasing overlay GL objects on the next frame. Safe to call
/// more than once.
pub unsafe fn deactivate() {
    ACTIVE.store(false, Ordering::Release);
    restore_wndproc();
}

/// Remove all hooks and shut down MinHook.
pub unsafe fn uninstall() {
    deactivate();
    if let Some(&addr) = TARGET.get() {
        let p = addr as *mut c_void;
        MH_DisableHook(p);
        MH_RemoveHook(p);
    }
    MH_Uninitialize();
    info!("hooks removed");
}

// ============================================================
// Frame
// ============================================================

unsafe extern "system" fn detour(hdc: HDC) -> BOOL {
    if ACTIVE.load(Ordering::Acquire) {
        let _ = catch_unwind(|| on_frame(hdc));
    } else if let Some(mut frame) = FRAME.try_lock() {
        // Last frames after detach: release GL objects while their context
        // is still current.
        frame.tracker.shutdown(gl::current_context());
    }

    match ORIGINAL.get() {
        Some(f) => f(hdc),
        None => 1,
    }
}

fn on_frame(hdc: HDC) {
    let Some(ctx) = CONTEXT.get() else {
        return;
    };
    if !SUBCLASS.is_claimed() {
        unsafe { subclass_window(hdc) };
    }
    if let Some(vp) = gl::viewport() {
        ctx.set_viewport(vp.width as u32, vp.height as u32);
    }

    let mut frame = FRAME.lock();
    let FrameState { composer, tracker } = &mut *frame;
    let list = composer.compose_from(ctx, Instant::now());
    tracker.render(gl::current_context(), list, ctx.viewport());
}

// ============================================================
// Window procedure
// ============================================================

unsafe fn subclass_window(hdc: HDC) {
    let hwnd = WindowFromDC(hdc);
    if hwnd.is_null() {
        return;
    }
    if !SUBCLASS.claim(hwnd as usize) {
        return;
    }
    let prev = SetWindowLongPtrA(hwnd, GWLP_WNDPROC, wndproc as usize as _);
    if prev == 0 {
        warn!("window subclass failed, key bindings unavailable");
        return;
    }
    SUBCLASS.set_previous(prev as isize);
    debug!(hwnd = hwnd as usize, "window subclassed");
}

unsafe fn restore_wndproc() {
    SUBCLASS.release(|hwnd, prev| {
        SetWindowLongPtrA(hwnd as HWND, GWLP_WNDPROC, prev as _);
        debug!("window procedure restored");
    });
}

unsafe extern "system" fn wndproc(hwnd: HWND, msg: UINT, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if ACTIVE.load(Ordering::Acquire) && (msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN) {
        if let Some(ctx) = CONTEXT.get() {
            // Bit 30: key was already down.
            let repeat = (lparam >> 30) & 1 == 1;
            let action = catch_unwind(AssertUnwindSafe(|| input::on_key_down(ctx, wparam as u32, repeat)))
                .unwrap_or(KeyAction::Ignored);
            if let KeyAction::Overlay(visible) = action {
                info!(visible, "overlay toggled");
            }
            if action.consumed() {
                return 0;
            }
        }
    }

    match SUBCLASS.previous() {
        0 => DefWindowProcA(hwnd, msg, wparam, lparam),
        prev => CallWindowProcA(std::mem::transmute::<isize, WNDPROC>(prev), hwnd, msg, wparam, lparam),
    }
}
