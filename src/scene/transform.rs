use glam::{Mat4, Quat, Vec3};

/// Placement of a model instance: uniform scale, then rotation, then translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
    pub orientation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, scale: f32, orientation: Quat) -> Self {
        Self {
            position,
            scale,
            orientation,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.orientation,
            self.position,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let m = Transform::default().matrix();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn scale_applies_before_translation() {
        let tr = Transform::new(Vec3::new(1.0, 2.0, 3.0), 2.0, Quat::IDENTITY);
        let p = tr.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        // (1,0,0) -> (2,0,0) -> (3,2,3)
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn rotation_applies_before_translation() {
        let tr = Transform::new(
            Vec3::new(0.0, 0.0, -5.0),
            1.0,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let p = tr.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -6.0), 1e-5));
    }
}
