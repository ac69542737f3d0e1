//! Bounding volume and frustum properties checked over seeded random inputs.

use deferred_renderer::scene::instance::derive_bounds;
use deferred_renderer::scene::{
    Aabb, BoundingSphere, Containment, Frustum, OrientedBox, PerspectiveCamera, Transform,
};
use glam::{Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EPSILON: f32 = 1e-3;

fn frustum() -> Frustum {
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    Frustum::from_view_projection(proj * view)
}

fn random_vec3(rng: &mut StdRng, range: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-range..range),
        rng.gen_range(-range..range),
        rng.gen_range(-range..range),
    )
}

fn random_orientation(rng: &mut StdRng) -> Quat {
    let axis = random_vec3(rng, 1.0).try_normalize().unwrap_or(Vec3::Y);
    Quat::from_axis_angle(axis, rng.gen_range(0.0..std::f32::consts::TAU))
}

fn point_in_sphere(rng: &mut StdRng, sphere: &BoundingSphere) -> Vec3 {
    loop {
        let offset = random_vec3(rng, 1.0);
        if offset.length_squared() <= 1.0 {
            return sphere.center + offset * sphere.radius;
        }
    }
}

fn aabb_encloses(aabb: &Aabb, p: Vec3) -> bool {
    let margin = Vec3::splat(EPSILON);
    p.cmpge(aabb.min - margin).all() && p.cmple(aabb.max + margin).all()
}

#[test]
fn sphere_classification_agrees_with_sampled_points() {
    let mut rng = StdRng::seed_from_u64(7);
    let frustum = frustum();
    let mut seen = [0usize; 3];

    for _ in 0..500 {
        let center = Vec3::new(
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-120.0..20.0),
        );
        let sphere = BoundingSphere::new(center, rng.gen_range(0.1..8.0));
        let containment = frustum.contains_sphere(&sphere);
        let samples: Vec<Vec3> = (0..32).map(|_| point_in_sphere(&mut rng, &sphere)).collect();

        match containment {
            Containment::Disjoint => {
                seen[0] += 1;
                assert!(samples.iter().all(|p| !frustum.contains_point(*p)));
            }
            Containment::Contains => {
                seen[2] += 1;
                assert!(samples.iter().all(|p| frustum.contains_point(*p)));
            }
            Containment::Intersects => seen[1] += 1,
        }
    }
    assert!(seen.iter().all(|&n| n > 0), "every outcome should occur: {seen:?}");
}

#[test]
fn disjoint_boxes_have_no_corner_inside() {
    let mut rng = StdRng::seed_from_u64(11);
    let frustum = frustum();

    for _ in 0..300 {
        let local = Aabb::from_center_extents(Vec3::ZERO, random_vec3(&mut rng, 3.0).abs());
        let obb = OrientedBox::from_aabb(
            &local,
            rng.gen_range(0.5..2.0),
            random_orientation(&mut rng),
            random_vec3(&mut rng, 60.0),
        );
        match frustum.contains_oriented_box(&obb) {
            Containment::Disjoint => {
                assert!(obb.corners().iter().all(|c| !frustum.contains_point(*c)));
            }
            Containment::Contains => {
                assert!(obb.corners().iter().all(|c| frustum.contains_point(*c)));
            }
            Containment::Intersects => {}
        }
    }
}

#[test]
fn refit_box_encloses_every_oriented_corner() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..200 {
        let local = Aabb::new(
            random_vec3(&mut rng, 2.0) - Vec3::splat(2.5),
            random_vec3(&mut rng, 2.0) + Vec3::splat(2.5),
        );
        let obb = OrientedBox::from_aabb(
            &local,
            rng.gen_range(0.1..4.0),
            random_orientation(&mut rng),
            random_vec3(&mut rng, 10.0),
        );
        let aabb = obb.to_aabb();
        assert!(obb.corners().iter().all(|c| aabb_encloses(&aabb, *c)));
    }
}

#[test]
fn aggregate_box_encloses_every_mesh_box() {
    let mut rng = StdRng::seed_from_u64(19);
    for _ in 0..100 {
        let meshes: Vec<Aabb> = (0..rng.gen_range(1..5))
            .map(|_| {
                let extents = random_vec3(&mut rng, 1.0).abs();
                Aabb::from_center_extents(random_vec3(&mut rng, 5.0), extents)
            })
            .collect();
        let model_bounds = meshes.iter().copied().reduce(|a, b| a.union(&b)).unwrap();
        let transform = Transform::new(
            random_vec3(&mut rng, 20.0),
            rng.gen_range(0.25..3.0),
            random_orientation(&mut rng),
        );

        let derived = derive_bounds(&transform, &model_bounds, &meshes);
        assert_eq!(derived.mesh_oriented.len(), meshes.len());
        for mesh_box in &derived.mesh_axis_aligned {
            assert!(aabb_encloses(&derived.axis_aligned, mesh_box.min));
            assert!(aabb_encloses(&derived.axis_aligned, mesh_box.max));
        }
        let center = derived.world.transform_point3(model_bounds.center());
        assert!((center - derived.oriented.center).length() < 1e-3 * (1.0 + center.length()));
    }
}

#[test]
fn camera_frustum_matches_snapshot() {
    let mut camera = PerspectiveCamera::default();
    camera.rotate(glam::Vec2::new(0.4, -0.2));
    let view = camera.snapshot();
    let probe = view.position + camera.forward() * 10.0;
    assert!(view.frustum.contains_point(probe));
    assert!(camera.frustum().contains_point(probe));
    assert!(!view.frustum.contains_point(view.position - camera.forward() * 10.0));
}
