use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use super::bounds::{Aabb, OrientedBox};
use super::model::Model;
use super::transform::Transform;

/// World-space state derived from a transform and a model's local bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedBounds {
    pub world: Mat4,
    pub oriented: OrientedBox,
    pub axis_aligned: Aabb,
    pub mesh_oriented: Vec<OrientedBox>,
    pub mesh_axis_aligned: Vec<Aabb>,
}

/// Places `model_bounds` and each entry of `mesh_bounds` under `transform`.
pub fn derive_bounds(transform: &Transform, model_bounds: &Aabb, mesh_bounds: &[Aabb]) -> DerivedBounds {
    let place = |local: &Aabb| {
        OrientedBox::from_aabb(local, transform.scale, transform.orientation, transform.position)
    };

    let mesh_oriented: Vec<OrientedBox> = mesh_bounds.iter().map(place).collect();
    let mesh_axis_aligned: Vec<Aabb> = mesh_oriented.iter().map(OrientedBox::to_aabb).collect();
    let oriented = place(model_bounds);
    let axis_aligned = mesh_axis_aligned
        .iter()
        .copied()
        .reduce(|a, b| a.union(&b))
        .unwrap_or_else(|| oriented.to_aabb());

    DerivedBounds {
        world: transform.matrix(),
        oriented,
        axis_aligned,
        mesh_oriented,
        mesh_axis_aligned,
    }
}

/// A model placed in the scene. Setters only mark the cached world state dirty; the
/// first read afterwards recomputes it once.
#[derive(Debug)]
pub struct ModelInstance {
    model: Arc<Model>,
    transform: Transform,
    dirty: bool,
    derived: DerivedBounds,
}

impl ModelInstance {
    pub fn new(model: Arc<Model>) -> Self {
        let transform = Transform::default();
        let mesh_bounds: Vec<Aabb> = model.meshes().iter().map(|m| m.bounds).collect();
        let derived = derive_bounds(&transform, &model.bounds(), &mesh_bounds);
        Self {
            model,
            transform,
            dirty: false,
            derived,
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale
    }

    pub fn orientation(&self) -> Quat {
        self.transform.orientation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.transform.scale = scale;
        self.dirty = true;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.transform.orientation = orientation;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clean(&mut self) {
        if !self.dirty {
            return;
        }
        let mesh_bounds: Vec<Aabb> = self.model.meshes().iter().map(|m| m.bounds).collect();
        self.derived = derive_bounds(&self.transform, &self.model.bounds(), &mesh_bounds);
        self.dirty = false;
    }

    pub fn world(&mut self) -> Mat4 {
        self.clean();
        self.derived.world
    }

    pub fn oriented_box(&mut self) -> OrientedBox {
        self.clean();
        self.derived.oriented
    }

    /// Union of the per-mesh world boxes.
    pub fn axis_aligned_box(&mut self) -> Aabb {
        self.clean();
        self.derived.axis_aligned
    }

    pub fn mesh_oriented_box(&mut self, mesh: usize) -> Option<OrientedBox> {
        self.clean();
        self.derived.mesh_oriented.get(mesh).copied()
    }

    pub fn mesh_axis_aligned_box(&mut self, mesh: usize) -> Option<Aabb> {
        self.clean();
        self.derived.mesh_axis_aligned.get(mesh).copied()
    }

    /// All derived state at once, cleaned.
    pub fn bounds(&mut self) -> &DerivedBounds {
        self.clean();
        &self.derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::{Material, MaterialProperties, Mesh, MeshPart};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn two_mesh_model() -> Arc<Model> {
        let part = MeshPart {
            index_start: 0,
            index_count: 36,
            material: 0,
        };
        Arc::new(
            Model::new(
                vec![
                    Mesh::without_buffers("a", Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)), vec![part]),
                    Mesh::without_buffers(
                        "b",
                        Aabb::new(Vec3::new(1.0, -0.5, -0.5), Vec3::new(2.0, 0.5, 0.5)),
                        vec![part],
                    ),
                ],
                vec![Material::without_binding("m", MaterialProperties::default())],
            )
            .unwrap(),
        )
    }

    #[test]
    fn setters_mark_dirty_and_getters_clean() {
        let mut instance = ModelInstance::new(two_mesh_model());
        assert!(!instance.is_dirty());
        instance.set_position(Vec3::X);
        assert!(instance.is_dirty());
        let world = instance.world();
        assert!(!instance.is_dirty());
        assert!(world.w_axis.truncate().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn aggregate_box_contains_mesh_boxes() {
        let mut instance = ModelInstance::new(two_mesh_model());
        instance.set_orientation(Quat::from_rotation_z(0.9));
        instance.set_scale(3.0);
        let total = instance.axis_aligned_box();
        for mesh in 0..2 {
            let b = instance.mesh_axis_aligned_box(mesh).unwrap();
            assert!(total.contains_point(b.min) && total.contains_point(b.max));
        }
        assert!(instance.mesh_axis_aligned_box(2).is_none());
    }

    #[test]
    fn interleaved_updates_match_a_fresh_transform() {
        let model = two_mesh_model();
        let mesh_bounds: Vec<Aabb> = model.meshes().iter().map(|m| m.bounds).collect();
        let mut rng = SmallRng::seed_from_u64(23);

        for _ in 0..50 {
            let mut instance = ModelInstance::new(model.clone());
            let (mut position, mut scale, mut orientation) = (Vec3::ZERO, 1.0, Quat::IDENTITY);

            for _ in 0..rng.gen_range(1..20) {
                match rng.gen_range(0..6) {
                    0 => {
                        position = Vec3::new(
                            rng.gen_range(-50.0..50.0),
                            rng.gen_range(-50.0..50.0),
                            rng.gen_range(-50.0..50.0),
                        );
                        instance.set_position(position);
                    }
                    1 => {
                        scale = rng.gen_range(0.1..10.0);
                        instance.set_scale(scale);
                    }
                    2 => {
                        orientation = Quat::from_euler(
                            glam::EulerRot::YXZ,
                            rng.gen_range(-3.0..3.0),
                            rng.gen_range(-1.5..1.5),
                            rng.gen_range(-3.0..3.0),
                        );
                        instance.set_orientation(orientation);
                    }
                    3 => {
                        instance.world();
                    }
                    4 => {
                        instance.oriented_box();
                    }
                    _ => {
                        instance.axis_aligned_box();
                    }
                }
            }

            let expected = derive_bounds(
                &Transform::new(position, scale, orientation),
                &model.bounds(),
                &mesh_bounds,
            );
            assert_eq!(instance.world(), expected.world);
            assert_eq!(instance.oriented_box(), expected.oriented);
            assert_eq!(instance.axis_aligned_box(), expected.axis_aligned);
            assert_eq!(instance.bounds(), &expected);
            assert!(!instance.is_dirty());
        }
    }
}
