use glam::{Mat4, Quat, Vec2, Vec3};

use super::bounds::Frustum;

/// Builds the projection matrix for a camera's clip range.
pub trait Projection: std::fmt::Debug {
    fn build_projection(&self, near: f32, far: f32) -> Mat4;

    /// Called when the back buffer changes shape. Projections that do not depend on
    /// the aspect ratio ignore it.
    fn set_aspect_ratio(&mut self, _aspect: f32) {}
}

#[derive(Clone, Copy, Debug)]
pub struct Perspective {
    pub fov_y_radians: f32,
    pub aspect: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_y_radians: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
        }
    }
}

impl Projection for Perspective {
    fn build_projection(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect.max(f32::EPSILON), near, far)
    }

    fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect;
    }
}

/// View-space rectangle projected without perspective.
#[derive(Clone, Copy, Debug)]
pub struct Orthographic {
    pub min: Vec2,
    pub max: Vec2,
}

impl Orthographic {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn centered(width: f32, height: f32) -> Self {
        let half = Vec2::new(width, height) * 0.5;
        Self {
            min: -half,
            max: half,
        }
    }
}

impl Projection for Orthographic {
    fn build_projection(&self, near: f32, far: f32) -> Mat4 {
        Mat4::orthographic_rh(self.min.x, self.max.x, self.min.y, self.max.y, near, far)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Camera<P: Projection = Perspective> {
    pub position: Vec3,
    /// Yaw (x) and pitch (y) in radians.
    pub rotation: Vec2,
    pub near: f32,
    pub far: f32,
    pub projection: P,
}

pub type PerspectiveCamera = Camera<Perspective>;
pub type OrthographicCamera = Camera<Orthographic>;

const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

impl<P: Projection> Camera<P> {
    pub fn new(projection: P, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec2::ZERO,
            near,
            far,
            projection,
        }
    }

    pub fn set_rotation(&mut self, rotation: Vec2) {
        self.rotation = Vec2::new(rotation.x, rotation.y.clamp(-MAX_PITCH, MAX_PITCH));
    }

    pub fn rotate(&mut self, delta: Vec2) {
        self.set_rotation(self.rotation + delta);
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.rotation.x) * Quat::from_rotation_x(self.rotation.y)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    pub fn proj(&self) -> Mat4 {
        self.projection.build_projection(self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.projection.set_aspect_ratio(aspect);
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(self.view_proj())
    }

    /// Frozen matrices for one frame.
    pub fn snapshot(&self) -> CameraView {
        CameraView::from_matrices(self.view(), self.proj(), self.near, self.far)
    }
}

impl Default for Camera<Perspective> {
    fn default() -> Self {
        let mut camera = Self::new(Perspective::default(), 0.1, 100.0);
        camera.position = Vec3::new(0.0, 2.0, 8.0);
        camera
    }
}

/// Matrices and derived data the renderer consumes, independent of projection type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    pub frustum: Frustum,
}

impl CameraView {
    pub fn from_matrices(view: Mat4, proj: Mat4, near: f32, far: f32) -> Self {
        let view_proj = proj * view;
        let inv_view = view.inverse();
        Self {
            view,
            proj,
            view_proj,
            inv_view,
            inv_proj: proj.inverse(),
            inv_view_proj: view_proj.inverse(),
            position: inv_view.w_axis.truncate(),
            near,
            far,
            frustum: Frustum::from_view_projection(view_proj),
        }
    }
}
