// projection.rs - World to screen projection.
//
// Pure geometry, no host calls. Two strategies: the captured view and
// projection matrices when the poller has them, otherwise a camera basis
// rebuilt from yaw, pitch and FOV. Both reject anything at or behind the
// camera plane and map NDC to top-left-origin pixels the same way.

use crate::math::{Mat4, Vec3};
use crate::snapshot::CameraState;

/// Smallest clip-space w the matrix strategy draws.
pub const MIN_CLIP_W: f64 = 0.02;
/// Smallest forward depth the angle strategy draws.
pub const MIN_DEPTH: f64 = 0.1;

/// Right vector used when looking straight up or down.
const FALLBACK_RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const DEFAULT: Viewport = Viewport { width: 1920.0, height: 1080.0 };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// NDC to pixels, y flipped so the origin is top-left.
    pub fn to_pixels(&self, ndc_x: f64, ndc_y: f64) -> ScreenPoint {
        ScreenPoint {
            x: ((ndc_x + 1.0) * 0.5 * self.width as f64) as f32,
            y: ((1.0 - ndc_y) * 0.5 * self.height as f64) as f32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn distance_sq(&self, other: ScreenPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

// ============================================================
// Matrix strategy
// ============================================================

/// Project `world` through view then projection, relative to `origin`.
pub fn project_matrix(world: Vec3, origin: Vec3, view: &Mat4, proj: &Mat4, vp: Viewport) -> Option<ScreenPoint> {
    if !vp.is_valid() {
        return None;
    }
    let rel = world - origin;
    let eye = view.transform([rel.x as f32, rel.y as f32, rel.z as f32, 1.0]);
    let clip = proj.transform(eye);
    let w = clip[3] as f64;
    if !w.is_finite() || w < MIN_CLIP_W {
        return None;
    }
    let ndc_x = clip[0] as f64 / w;
    let ndc_y = clip[1] as f64 / w;
    if !ndc_x.is_finite() || !ndc_y.is_finite() {
        return None;
    }
    Some(vp.to_pixels(ndc_x, ndc_y))
}

// ============================================================
// Angle strategy
// ============================================================

/// Orthonormal camera basis. Yaw 0 faces +Z, positive pitch looks down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraBasis {
    pub fn from_angles(yaw_deg: f32, pitch_deg: f32) -> Self {
        let yaw = (yaw_deg as f64).to_radians();
        let pitch = (pitch_deg as f64).to_radians();
        let forward = Vec3::new(-yaw.sin() * pitch.cos(), -pitch.sin(), yaw.cos() * pitch.cos());
        let right = forward.cross(Vec3::UP).normalized().unwrap_or(FALLBACK_RIGHT);
        let up = right.cross(forward);
        Self { forward, right, up }
    }
}

pub fn project_angles(world: Vec3, eye: Vec3, yaw: f32, pitch: f32, fov_deg: f32, vp: Viewport) -> Option<ScreenPoint> {
    if !vp.is_valid() {
        return None;
    }
    let basis = CameraBasis::from_angles(yaw, pitch);
    let rel = world - eye;
    let depth = rel.dot(basis.forward);
    if !depth.is_finite() || depth < MIN_DEPTH {
        return None;
    }
    let tan_half = ((fov_deg as f64).to_radians() * 0.5).tan();
    if !tan_half.is_finite() || tan_half <= 0.0 {
        return None;
    }
    let ndc_x = rel.dot(basis.right) / (depth * tan_half * vp.aspect());
    let ndc_y = rel.dot(basis.up) / (depth * tan_half);
    if !ndc_x.is_finite() || !ndc_y.is_finite() {
        return None;
    }
    Some(vp.to_pixels(ndc_x, ndc_y))
}

// ============================================================
// Strategy selection
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Matrix,
    Angles,
}

/// Projects against one camera state for one frame.
pub struct Projector<'a> {
    camera: &'a CameraState,
    viewport: Viewport,
    matrices: Option<(&'a Mat4, &'a Mat4)>,
}

impl<'a> Projector<'a> {
    pub fn new(camera: &'a CameraState, viewport: Viewport) -> Self {
        let matrices = camera
            .matrices
            .as_ref()
            .filter(|(v, p)| v.is_finite() && p.is_finite() && !v.is_zero() && !p.is_zero())
            .map(|(v, p)| (v, p));
        Self { camera, viewport, matrices }
    }

    pub fn strategy(&self) -> Strategy {
        if self.matrices.is_some() {
            Strategy::Matrix
        } else {
            Strategy::Angles
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn project(&self, world: Vec3) -> Option<ScreenPoint> {
        match self.matrices {
            Some((view, proj)) => project_matrix(world, self.camera.origin, view, proj, self.viewport),
            None => project_angles(
                world,
                self.camera.eye,
                self.camera.yaw,
                self.camera.pitch,
                self.camera.fov,
                self.viewport,
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const VP: Viewport = Viewport::DEFAULT;

    /// View matrix with rows right, up, -forward (camera looks down -Z).
    pub(crate) fn view_from_basis(b: &CameraBasis) -> Mat4 {
        let (r, u, f) = (b.right, b.up, b.forward);
        Mat4([
            r.x as f32, u.x as f32, -f.x as f32, 0.0,
            r.y as f32, u.y as f32, -f.y as f32, 0.0,
            r.z as f32, u.z as f32, -f.z as f32, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub(crate) fn perspective(fov_deg: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let f = 1.0 / (fov_deg.to_radians() * 0.5).tan();
        let mut m = [0.0f32; 16];
        m[0] = f / aspect;
        m[5] = f;
        m[10] = (far + near) / (near - far);
        m[11] = -1.0;
        m[14] = 2.0 * far * near / (near - far);
        Mat4(m)
    }

    fn close(a: ScreenPoint, b: ScreenPoint, tol: f32) -> bool {
        (a.x - b.x).abs() <= tol && (a.y - b.y).abs() <= tol
    }

    #[test]
    fn straight_ahead_lands_on_screen_centre() {
        let p = project_angles(Vec3::new(0.0, 0.0, 10.0), Vec3::default(), 0.0, 0.0, 70.0, VP).unwrap();
        assert!(close(p, ScreenPoint { x: 960.0, y: 540.0 }, 0.5), "{p:?}");
    }

    #[test]
    fn straight_behind_is_rejected() {
        assert!(project_angles(Vec3::new(0.0, 0.0, -10.0), Vec3::default(), 0.0, 0.0, 70.0, VP).is_none());
    }

    #[test]
    fn basis_orientation() {
        let b = CameraBasis::from_angles(0.0, 0.0);
        assert!((b.forward.z - 1.0).abs() < 1e-9);
        assert!((b.right.x + 1.0).abs() < 1e-9);
        assert!((b.up.y - 1.0).abs() < 1e-9);

        // Yaw 90 faces -X.
        let b = CameraBasis::from_angles(90.0, 0.0);
        assert!((b.forward.x + 1.0).abs() < 1e-9);
    }

    #[test]
    fn looking_straight_down_uses_fallback_right() {
        let b = CameraBasis::from_angles(0.0, 90.0);
        assert_eq!(b.right, FALLBACK_RIGHT);
        let p = project_angles(Vec3::new(0.0, -10.0, 0.0), Vec3::default(), 0.0, 90.0, 70.0, VP).unwrap();
        assert!(close(p, ScreenPoint { x: 960.0, y: 540.0 }, 0.5));
    }

    #[test]
    fn above_and_right_of_centre() {
        // Facing +Z the camera's right is -X.
        let p = project_angles(Vec3::new(-2.0, 2.0, 10.0), Vec3::default(), 0.0, 0.0, 70.0, VP).unwrap();
        assert!(p.x > 960.0 && p.y < 540.0, "{p:?}");
    }

    #[test]
    fn strategies_agree() {
        let eye = Vec3::new(10.0, 65.62, -4.0);
        let cases = [
            (0.0f32, 0.0f32, Vec3::new(10.0, 65.62, 6.0)),
            (35.0, -10.0, Vec3::new(4.0, 68.0, 3.0)),
            (-120.0, 20.0, Vec3::new(18.0, 62.0, -8.0)),
            (200.0, 5.0, Vec3::new(11.0, 65.0, -12.0)),
        ];
        for (yaw, pitch, target) in cases {
            let basis = CameraBasis::from_angles(yaw, pitch);
            let view = view_from_basis(&basis);
            let proj = perspective(70.0, VP.aspect() as f32, 0.05, 256.0);
            let a = project_angles(target, eye, yaw, pitch, 70.0, VP);
            let m = project_matrix(target, eye, &view, &proj, VP);
            match (a, m) {
                (Some(a), Some(m)) => assert!(close(a, m, 1.0), "yaw {yaw}: {a:?} vs {m:?}"),
                other => panic!("yaw {yaw}: {other:?}"),
            }
        }
    }

    #[test]
    fn behind_is_rejected_by_both_strategies() {
        let eye = Vec3::new(0.0, 70.0, 0.0);
        for yaw in [0.0f32, 45.0, 90.0, 180.0, 270.0] {
            let basis = CameraBasis::from_angles(yaw, 0.0);
            let behind = eye - basis.forward * 5.0;
            let on_plane = eye + basis.right * 3.0;
            let view = view_from_basis(&basis);
            let proj = perspective(70.0, VP.aspect() as f32, 0.05, 256.0);
            for target in [behind, on_plane, eye] {
                assert!(project_angles(target, eye, yaw, 0.0, 70.0, VP).is_none());
                assert!(project_matrix(target, eye, &view, &proj, VP).is_none());
            }
        }
    }

    #[test]
    fn matrix_strategy_keeps_points_just_past_the_near_plane() {
        // Identity view; a projection whose w is the eye-space z.
        let view = Mat4::IDENTITY;
        let mut proj = Mat4::IDENTITY;
        proj.0[11] = 1.0;
        proj.0[15] = 0.0;
        let origin = Vec3::default();
        let near = project_matrix(Vec3::new(0.0, 0.0, 0.05), origin, &view, &proj, VP).unwrap();
        assert!(close(near, ScreenPoint { x: 960.0, y: 540.0 }, 0.01), "{near:?}");
        assert!(project_matrix(Vec3::new(0.0, 0.0, 0.01), origin, &view, &proj, VP).is_none());
        assert!(project_angles(Vec3::new(0.0, 0.0, 0.05), origin, 0.0, 0.0, 70.0, VP).is_none());
    }

    #[test]
    fn projector_prefers_usable_matrices() {
        let basis = CameraBasis::from_angles(0.0, 0.0);
        let mut camera = CameraState::default();
        assert_eq!(Projector::new(&camera, VP).strategy(), Strategy::Angles);

        camera.matrices = Some((Mat4([0.0; 16]), Mat4([0.0; 16])));
        assert_eq!(Projector::new(&camera, VP).strategy(), Strategy::Angles);

        camera.matrices = Some((view_from_basis(&basis), perspective(70.0, 16.0 / 9.0, 0.05, 256.0)));
        let projector = Projector::new(&camera, VP);
        assert_eq!(projector.strategy(), Strategy::Matrix);
        let p = projector.project(Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert!(close(p, ScreenPoint { x: 960.0, y: 540.0 }, 0.5));
    }

    #[test]
    fn degenerate_viewport_projects_nothing() {
        let vp = Viewport::new(0.0, 0.0);
        assert!(project_angles(Vec3::new(0.0, 0.0, 10.0), Vec3::default(), 0.0, 0.0, 70.0, vp).is_none());
    }
}
