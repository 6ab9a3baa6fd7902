// net.rs - Control channel to the external controller.
//
// One TCP client at a time on localhost. Each tick the server writes one
// `state` line built from the latest snapshot, then any queued `cmd` lines,
// then drains whatever the controller sent. Inbound lines are JSON objects;
// `config` lines patch the shared Config, anything else is ignored.
//
// This thread only ever sees snapshot copies and the Config lock; it has no
// route to the host runtime.

use crate::context::{pause, BridgeContext};
use crate::error::{BridgeError, Result};
use crate::math::Vec3;
use crate::projection::{Projector, Viewport};
use crate::settings::Settings;
use crate::snapshot::WorldSnapshot;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inbound bytes held while waiting for a newline.
pub const MAX_PENDING: usize = 64 * 1024;
const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;
/// A stalled controller is dropped after this long without accepting bytes.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Height above the feet of the point reported as an entity's screen position.
const BODY_HEIGHT: f64 = 1.575;

// ============================================================
// Inbound framing
// ============================================================

/// Splits a byte stream into lines, holding at most `limit` bytes of an
/// unterminated line.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { pending: Vec::new(), limit }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append `bytes` and return every completed, non-empty line.
    ///
    /// A partial line longer than the limit is discarded whole.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw[..end]);
            let text = text.trim_end_matches('\r');
            if !text.trim().is_empty() {
                lines.push(text.to_string());
            }
        }
        if self.pending.len() > self.limit {
            warn!(bytes = self.pending.len(), "inbound line over limit, discarding");
            self.pending.clear();
        }
        lines
    }
}

/// Apply one inbound line. Returns whether it changed the Config.
pub fn handle_line(ctx: &BridgeContext, line: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(msg) => {
            let applied = ctx.apply_message(&msg);
            if !applied {
                debug!(kind = ?msg.get("type"), "ignored control message");
            }
            applied
        }
        Err(e) => {
            debug!(error = %e, "malformed control line");
            false
        }
    }
}

// ============================================================
// Outbound encoding
// ============================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateLine<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    pub gui_open: bool,
    pub screen_name: &'a str,
    pub holding_block: bool,
    pub looking_at_block: bool,
    pub breaking_block: bool,
    pub entities: Vec<EntityLine<'a>>,
    pub mapped: bool,
    pub in_world: bool,
    pub features: Vec<&'static str>,
}

/// One entity as the controller sees it. `sx`/`sy` are -1 when the entity
/// does not project onto the screen.
#[derive(Debug, Serialize)]
pub struct EntityLine<'a> {
    pub sx: f32,
    pub sy: f32,
    pub dist: f64,
    pub name: &'a str,
    pub hp: f32,
}

impl<'a> StateLine<'a> {
    pub fn new(snapshot: &'a WorldSnapshot, viewport: Viewport) -> Self {
        let projector = snapshot.camera.as_ref().map(|c| Projector::new(c, viewport));
        let entities = snapshot
            .entities
            .iter()
            .map(|e| {
                let screen = projector
                    .as_ref()
                    .and_then(|p| p.project(e.position + Vec3::new(0.0, BODY_HEIGHT, 0.0)));
                EntityLine {
                    sx: screen.map_or(-1.0, |s| s.x),
                    sy: screen.map_or(-1.0, |s| s.y),
                    dist: e.distance,
                    name: e.name.as_deref().unwrap_or_default(),
                    hp: e.health.unwrap_or(0.0),
                }
            })
            .collect();
        Self {
            kind: "state",
            gui_open: snapshot.gui_open,
            screen_name: snapshot.screen_name.as_deref().unwrap_or_default(),
            holding_block: snapshot.holding_block,
            looking_at_block: snapshot.looking_at_block,
            breaking_block: snapshot.breaking_block,
            entities,
            mapped: snapshot.mapped,
            in_world: snapshot.in_world,
            features: snapshot.features.iter().map(|f| f.name()).collect(),
        }
    }
}

/// The `state` line for `snapshot`, newline not included.
pub fn encode_state(snapshot: &WorldSnapshot, viewport: Viewport) -> serde_json::Result<String> {
    serde_json::to_string(&StateLine::new(snapshot, viewport))
}

/// Everything to send this tick: the state line plus queued commands, each
/// newline-terminated.
fn outbound(ctx: &BridgeContext) -> String {
    let snapshot = ctx.snapshots.latest();
    let mut out = String::with_capacity(1024);
    match encode_state(&snapshot, ctx.viewport()) {
        Ok(line) => {
            out.push_str(&line);
            out.push('\n');
        }
        Err(e) => warn!(error = %e, "state encoding failed"),
    }
    for cmd in ctx.drain_commands() {
        match cmd.to_line() {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(e) => warn!(error = %e, ?cmd, "command encoding failed"),
        }
    }
    out
}

// ============================================================
// Server loop
// ============================================================

pub fn bind(settings: &Settings) -> Result<TcpListener> {
    let listener = TcpListener::bind((settings.bind.as_str(), settings.port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Bind and start the network thread. Returns the bound address.
pub fn spawn(ctx: Arc<BridgeContext>) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = bind(&ctx.settings)?;
    let addr = listener.local_addr()?;
    let handle = thread::Builder::new()
        .name("bridge-net".into())
        .spawn(move || run(&ctx, listener))
        .map_err(BridgeError::Io)?;
    Ok((addr, handle))
}

/// Accept controllers one after another until the running flag clears.
pub fn run(ctx: &BridgeContext, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "control channel listening");
    }
    while ctx.is_running() {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "controller connected");
                match serve(ctx, stream) {
                    Ok(()) => info!(%peer, "controller disconnected"),
                    Err(e) => info!(%peer, error = %e, "controller dropped"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    info!("control channel closed");
}

fn serve(ctx: &BridgeContext, mut stream: TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; READ_CHUNK];
    while ctx.is_running() {
        send_all(&mut stream, outbound(ctx).as_bytes())?;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    for line in lines.push(&buf[..n]) {
                        handle_line(ctx, &line);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        pause(ctx.running(), ctx.settings.poll_interval());
    }
    Ok(())
}

/// `write_all` for a non-blocking socket.
fn send_all(stream: &mut TcpStream, mut bytes: &[u8]) -> io::Result<()> {
    let deadline = Instant::now() + WRITE_TIMEOUT;
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
