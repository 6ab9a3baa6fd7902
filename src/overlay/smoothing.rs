// overlay/smoothing.rs - Per-key exponential smoothing of projected positions.
//
// Owned by the render callback. An entry is created the first frame a key
// projects, blended toward each new projection, and dropped once it has not
// been refreshed for `EVICT_AFTER`. Large jumps (respawn, teleport) snap
// instead of sliding across the screen.
//
// Values are `N` floats read as `N / 2` screen points: a nametag anchor is
// one point, a container box is its min and max corners.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub const ALPHA_PER_SECOND: f32 = 14.0;
pub const MIN_ALPHA: f32 = 0.15;
pub const MAX_ALPHA: f32 = 0.65;
/// Above this target speed the blend runs at `MAX_ALPHA`.
pub const FAST_VELOCITY: f32 = 1500.0;
/// Squared pixel jump that snaps straight to the target.
pub const SNAP_DISTANCE_SQ: f32 = 24000.0;
pub const EVICT_AFTER: Duration = Duration::from_millis(1200);

/// Blend factor for a frame `dt` seconds long.
pub fn frame_alpha(dt: f32) -> f32 {
    if !dt.is_finite() {
        return MIN_ALPHA;
    }
    (dt * ALPHA_PER_SECOND).clamp(MIN_ALPHA, MAX_ALPHA)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingState<const N: usize> {
    pub value: [f32; N],
    target: [f32; N],
    /// Target speed in px/s, from the last two refreshes.
    pub velocity: f32,
    pub last_seen: Instant,
}

impl<const N: usize> SmoothingState<N> {
    fn new(target: [f32; N], now: Instant) -> Self {
        Self { value: target, target, velocity: 0.0, last_seen: now }
    }

    fn step(&mut self, target: [f32; N], dt: f32, now: Instant) {
        let moved = max_point_distance_sq(&self.target, &target).sqrt();
        self.velocity = if dt > 0.0 { moved / dt } else { 0.0 };
        self.target = target;
        self.last_seen = now;

        if max_point_distance_sq(&self.value, &target) > SNAP_DISTANCE_SQ {
            self.value = target;
            self.velocity = 0.0;
            return;
        }
        let alpha = if self.velocity > FAST_VELOCITY { MAX_ALPHA } else { frame_alpha(dt) };
        for (v, t) in self.value.iter_mut().zip(target) {
            *v += (t - *v) * alpha;
        }
    }
}

/// Largest squared distance between corresponding points of `a` and `b`.
fn max_point_distance_sq<const N: usize>(a: &[f32; N], b: &[f32; N]) -> f32 {
    a.chunks(2)
        .zip(b.chunks(2))
        .map(|(p, q)| p.iter().zip(q).map(|(x, y)| (y - x) * (y - x)).sum::<f32>())
        .fold(0.0, f32::max)
}

pub struct OverlaySmoothing<K, const N: usize> {
    entries: HashMap<K, SmoothingState<N>>,
}

impl<K: Eq + Hash, const N: usize> Default for OverlaySmoothing<K, N> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<K: Eq + Hash, const N: usize> OverlaySmoothing<K, N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this frame's projection for `key`; returns the smoothed value.
    pub fn update(&mut self, key: K, target: [f32; N], dt: f32, now: Instant) -> [f32; N] {
        let state = self
            .entries
            .entry(key)
            .and_modify(|s| s.step(target, dt, now))
            .or_insert_with(|| SmoothingState::new(target, now));
        state.value
    }

    /// Drop entries not refreshed within `EVICT_AFTER`.
    pub fn evict(&mut self, now: Instant) {
        self.entries
            .retain(|_, s| now.saturating_duration_since(s.last_seen) <= EVICT_AFTER);
    }

    pub fn get(&self, key: &K) -> Option<&SmoothingState<N>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn alpha_bounds() {
        assert_eq!(frame_alpha(0.0), MIN_ALPHA);
        assert_eq!(frame_alpha(1.0), MAX_ALPHA);
        assert!((frame_alpha(0.02) - 0.28).abs() < 1e-6);
        assert_eq!(frame_alpha(f32::NAN), MIN_ALPHA);
    }

    #[test]
    fn first_sighting_is_exact() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let now = Instant::now();
        assert_eq!(s.update(7, [100.0, 200.0], FRAME, now), [100.0, 200.0]);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn converges_on_a_fixed_point() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let start = Instant::now();
        s.update(1, [500.0, 500.0], FRAME, start);
        let target = [560.0, 530.0];
        let mut last = f32::MAX;
        for frame in 1..120u64 {
            let v = s.update(1, target, FRAME, at(start, frame * 16));
            let d = (v[0] - target[0]).hypot(v[1] - target[1]);
            assert!(d <= last, "frame {frame}: {d} > {last}");
            last = d;
        }
        assert!(last < 0.01, "{last}");
    }

    #[test]
    fn small_moves_are_blended() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let start = Instant::now();
        s.update(1, [100.0, 100.0], FRAME, start);
        let v = s.update(1, [110.0, 100.0], FRAME, at(start, 16));
        assert!((v[0] - (100.0 + 10.0 * frame_alpha(FRAME))).abs() < 1e-4, "{v:?}");
        assert!(v[0] < 105.0);
    }

    #[test]
    fn large_jump_snaps_in_one_frame() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let start = Instant::now();
        s.update(1, [100.0, 100.0], FRAME, start);
        // 160^2 = 25600 > 24000
        let v = s.update(1, [260.0, 100.0], FRAME, at(start, 16));
        assert_eq!(v, [260.0, 100.0]);
        assert_eq!(s.get(&1).unwrap().velocity, 0.0);
    }

    #[test]
    fn fast_targets_use_max_alpha() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let start = Instant::now();
        s.update(1, [100.0, 100.0], FRAME, start);
        // 40 px in one 60 Hz frame is 2400 px/s.
        let v = s.update(1, [140.0, 100.0], FRAME, at(start, 16));
        assert!((v[0] - (100.0 + 40.0 * MAX_ALPHA)).abs() < 1e-3, "{v:?}");
    }

    #[test]
    fn rect_snaps_on_either_corner() {
        let mut s = OverlaySmoothing::<[i32; 3], 4>::new();
        let start = Instant::now();
        s.update([0, 64, 0], [10.0, 10.0, 50.0, 50.0], FRAME, start);
        let v = s.update([0, 64, 0], [10.0, 10.0, 50.0, 250.0], FRAME, at(start, 16));
        assert_eq!(v, [10.0, 10.0, 50.0, 250.0]);
    }

    #[test]
    fn unseen_entries_are_evicted() {
        let mut s = OverlaySmoothing::<i32, 2>::new();
        let start = Instant::now();
        s.update(1, [0.0, 0.0], FRAME, start);
        s.update(2, [0.0, 0.0], FRAME, start);
        s.update(2, [0.0, 0.0], FRAME, at(start, 1000));

        s.evict(at(start, 1200));
        assert_eq!(s.len(), 2);
        s.evict(at(start, 1201));
        assert!(s.get(&1).is_none());
        assert!(s.get(&2).is_some());
        s.evict(at(start, 2300));
        assert!(s.is_empty());
    }
}
