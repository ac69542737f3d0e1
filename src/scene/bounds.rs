use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

/// Result of testing a bounding volume against a frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Disjoint,
    Intersects,
    Contains,
}

impl Containment {
    pub fn is_visible(self) -> bool {
        self != Containment::Disjoint
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        let extents = extents.abs();
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing all points; `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let closest = sphere.center.clamp(self.min, self.max);
        closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.extents().length())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Vec3,
    pub extents: Vec3,
    pub orientation: Quat,
}

impl OrientedBox {
    /// Places a local-space box under a uniform-scale rigid transform.
    pub fn from_aabb(local: &Aabb, scale: f32, orientation: Quat, translation: Vec3) -> Self {
        Self {
            center: orientation * (local.center() * scale) + translation,
            extents: local.extents() * scale.abs(),
            orientation,
        }
    }

    pub fn axes(&self) -> [Vec3; 3] {
        let m = Mat3::from_quat(self.orientation);
        [m.x_axis, m.y_axis, m.z_axis]
    }

    /// Conservative axis-aligned refit of the rotated box.
    pub fn to_aabb(&self) -> Aabb {
        let [x, y, z] = self.axes();
        let half = x.abs() * self.extents.x + y.abs() * self.extents.y + z.abs() * self.extents.z;
        Aabb::from_center_extents(self.center, half)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let local = Aabb::from_center_extents(Vec3::ZERO, self.extents).corners();
        local.map(|c| self.orientation * c + self.center)
    }

    /// Radius of the box projected onto `normal`.
    fn projected_radius(&self, normal: Vec3) -> f32 {
        let [x, y, z] = self.axes();
        normal.dot(x).abs() * self.extents.x
            + normal.dot(y).abs() * self.extents.y
            + normal.dot(z).abs() * self.extents.z
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }
}

/// Plane `n·p + d = 0` with a unit normal pointing into the frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let len = v.truncate().length();
        if len <= f32::EPSILON {
            return Self {
                normal: Vec3::ZERO,
                d: v.w,
            };
        }
        Self {
            normal: v.truncate() / len,
            d: v.w / len,
        }
    }

    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six clip planes: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts planes from a view-projection matrix using the [0, 1] clip depth range.
    pub fn from_view_projection(m: Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(p) >= 0.0)
    }

    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> Containment {
        self.classify(|plane| (plane.distance(sphere.center), sphere.radius))
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> Containment {
        let center = aabb.center();
        let extents = aabb.extents();
        self.classify(|plane| (plane.distance(center), plane.normal.abs().dot(extents)))
    }

    pub fn contains_oriented_box(&self, obb: &OrientedBox) -> Containment {
        self.classify(|plane| (plane.distance(obb.center), obb.projected_radius(plane.normal)))
    }

    /// Each plane yields (signed center distance, projected radius). Never reports
    /// `Disjoint` for a volume that overlaps the frustum.
    fn classify(&self, project: impl Fn(&Plane) -> (f32, f32)) -> Containment {
        let mut result = Containment::Contains;
        for plane in &self.planes {
            let (distance, radius) = project(plane);
            if distance < -radius {
                return Containment::Disjoint;
            }
            if distance < radius {
                result = Containment::Intersects;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(proj * view)
    }

    #[test]
    fn sphere_in_front_is_contained() {
        let f = test_frustum();
        let s = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0);
        assert_eq!(f.contains_sphere(&s), Containment::Contains);
    }

    #[test]
    fn sphere_behind_is_disjoint() {
        let f = test_frustum();
        let s = BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0);
        assert_eq!(f.contains_sphere(&s), Containment::Disjoint);
    }

    #[test]
    fn box_straddling_near_plane_intersects() {
        let f = test_frustum();
        let b = Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(0.5));
        assert_eq!(f.contains_aabb(&b), Containment::Intersects);
    }

    #[test]
    fn oriented_box_refit_encloses_corners() {
        let local = Aabb::new(Vec3::new(-1.0, -2.0, -0.5), Vec3::new(1.0, 2.0, 0.5));
        let obb = OrientedBox::from_aabb(
            &local,
            2.0,
            Quat::from_rotation_y(0.7) * Quat::from_rotation_x(0.3),
            Vec3::new(3.0, 0.0, -1.0),
        );
        let aabb = obb.to_aabb();
        for c in obb.corners() {
            assert!(aabb.contains_point(c + (aabb.center() - c) * 1e-4));
        }
    }

    #[test]
    fn union_covers_both() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(-2.0), Vec3::splat(-1.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::splat(-2.0));
        assert_eq!(u.max, Vec3::ONE);
    }
}
