// logging.rs - File logging next to the injected module.
//
// The host owns stdout/stderr, so everything goes to `bridge_debug.log` in
// the same directory as this DLL. The file is truncated on attach.

use crate::error::{BridgeError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "bridge_debug.log";

/// Module handle of this DLL (0 until DllMain records it).
static MODULE_HANDLE: AtomicUsize = AtomicUsize::new(0);

pub fn set_module_handle(h: usize) {
    MODULE_HANDLE.store(h, Ordering::Relaxed);
}

pub fn module_handle() -> usize {
    MODULE_HANDLE.load(Ordering::Relaxed)
}

/// Directory containing the injected module; current directory when the
/// handle is unknown (tests, or before DllMain ran).
pub fn module_dir() -> PathBuf {
    #[cfg(windows)]
    {
        use winapi::um::libloaderapi::GetModuleFileNameA;

        let hinst = module_handle();
        if hinst != 0 {
            let mut buf = [0u8; 512];
            let len = unsafe {
                GetModuleFileNameA(hinst as _, buf.as_mut_ptr() as _, buf.len() as u32)
            } as usize;
            if len > 0 {
                if let Ok(s) = std::str::from_utf8(&buf[..len]) {
                    if let Some(dir) = std::path::Path::new(s).parent() {
                        return dir.to_path_buf();
                    }
                }
            }
        }
    }
    PathBuf::from(".")
}

/// Install the global subscriber writing to the log file.
pub fn init(level: &str) -> Result<PathBuf> {
    let path = module_dir().join(LOG_FILE);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|_| BridgeError::LoggingInit)?;
    Ok(path)
}

/// Latch for messages that should appear once per state transition rather
/// than once per frame.
#[derive(Debug, Default)]
pub struct LogOnce(AtomicBool);

impl LogOnce {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// True the first time it is called after construction or `reset`.
    pub fn first(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
