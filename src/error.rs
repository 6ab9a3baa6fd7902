// error.rs - Setup and lifecycle errors for the bridge.
//
// Only failures that stop a component from starting end up here. Per-call
// host failures are swallowed at the call site and surface as `None`.

use thiserror::Error;

/// Errors raised while bringing the bridge up or tearing it down.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No running VM could be found in the host process.
    #[error("no host VM found in process")]
    VmNotFound,

    /// The polling thread could not attach to the host VM.
    #[error("failed to attach thread to host VM: {0}")]
    Attach(String),

    /// The current thread already holds the polling capability.
    #[error("polling capability already claimed on this thread")]
    PollThreadClaimed,

    /// The root singleton is not constructed yet (or could not be found).
    #[error("root singleton unavailable")]
    RootUnavailable,

    /// A MinHook call failed.
    #[error("hook install failed at {stage}: status {status}")]
    Hook {
        /// Which step of the install sequence failed.
        stage: &'static str,
        /// Raw MH_STATUS value.
        status: i32,
    },

    /// The overlay backend could not create its GL resources.
    #[error("overlay backend init failed: {0}")]
    Render(&'static str),

    /// Settings file exists but could not be parsed.
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// Socket or file I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Log subscriber was already installed.
    #[error("logging already initialised")]
    LoggingInit,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
