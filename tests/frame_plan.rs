//! Frame planning scenarios on CPU-only models: culling, shadow slot assignment and
//! post-process chaining, without a device.

use std::sync::Arc;

use deferred_renderer::renderer::frame::{LightKind, VolumeFacing};
use deferred_renderer::renderer::light_buffer::ChainTarget;
use deferred_renderer::renderer::lights::point::MAX_POINT_SHADOW_MAPS;
use deferred_renderer::renderer::postprocess::{HdrPostProcess, SkyPostProcess, UiPostProcess};
use deferred_renderer::renderer::{
    AmbientLight, DeferredRenderer, DirectionalLight, Light, PointLight, SpotLight,
};
use deferred_renderer::scene::{
    Aabb, CameraView, Material, MaterialProperties, Mesh, MeshPart, Model, ModelInstance,
    PerspectiveCamera,
};
use deferred_renderer::settings::RenderSettings;
use glam::Vec3;

fn part() -> MeshPart {
    MeshPart {
        index_start: 0,
        index_count: 36,
        material: 0,
    }
}

fn model(mesh_bounds: &[Aabb]) -> Arc<Model> {
    let meshes = mesh_bounds
        .iter()
        .enumerate()
        .map(|(i, bounds)| Mesh::without_buffers(format!("mesh {i}"), *bounds, vec![part()]))
        .collect();
    let materials = vec![Material::without_binding("default", MaterialProperties::default())];
    let model = Model::new(meshes, materials).unwrap();
    assert!(model.meshes().iter().all(|mesh| !mesh.is_resident()));
    Arc::new(model)
}

fn unit_cube() -> Arc<Model> {
    model(&[Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))])
}

fn camera() -> CameraView {
    // At (0, 2, 8) looking down -Z.
    PerspectiveCamera::default().snapshot()
}

fn point(position: Vec3, radius: f32) -> Light {
    Light::Point(PointLight {
        position,
        radius,
        color: Vec3::ONE,
        intensity: 1.0,
    })
}

fn directional() -> Light {
    Light::Directional(DirectionalLight {
        direction: Vec3::new(0.3, 1.0, 0.2).normalize(),
        color: Vec3::ONE,
        intensity: 1.0,
    })
}

#[test]
fn instances_behind_the_camera_are_culled() {
    let cube = unit_cube();
    let mut front = ModelInstance::new(cube.clone());
    let mut behind = ModelInstance::new(cube);
    behind.set_position(Vec3::new(0.0, 2.0, 20.0));

    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_model(&mut front);
    frame.add_model(&mut behind);
    assert_eq!(frame.model_count(), 2);
    let plan = frame.plan(&camera()).unwrap();

    assert_eq!(plan.geometry.draws.len(), 1);
    assert_eq!(plan.geometry.draws[0].instance, 0);
    assert_eq!(plan.geometry.culled_instances, 1);
    assert_eq!(plan.geometry.fully_inside_instances, 1);
}

#[test]
fn straddling_instance_culls_individual_meshes() {
    let wide = model(&[
        Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
        Aabb::new(Vec3::new(199.5, -0.5, -0.5), Vec3::new(200.5, 0.5, 0.5)),
    ]);
    let mut instance = ModelInstance::new(wide);

    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_model(&mut instance);
    let plan = frame.plan(&camera()).unwrap();

    assert_eq!(plan.geometry.culled_instances, 0);
    assert_eq!(plan.geometry.culled_meshes, 1);
    assert_eq!(plan.geometry.draws.len(), 1);
    assert_eq!(plan.geometry.draws[0].mesh, 0);
}

#[test]
fn moving_an_instance_changes_its_culling() {
    let mut instance = ModelInstance::new(unit_cube());
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    {
        let mut frame = renderer.begin();
        frame.add_model(&mut instance);
        assert_eq!(frame.plan(&camera()).unwrap().geometry.draws.len(), 1);
    }

    instance.set_position(Vec3::new(0.0, -50.0, 0.0));
    let mut frame = renderer.begin();
    frame.add_model(&mut instance);
    let plan = frame.plan(&camera()).unwrap();
    assert!(plan.geometry.draws.is_empty());
    assert_eq!(plan.geometry.culled_instances, 1);
}

#[test]
fn excess_shadowed_point_lights_render_unshadowed() {
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    for i in 0..6 {
        frame.add_light(point(Vec3::new(i as f32 - 2.5, 1.0, 0.0), 1.0), true);
    }
    let plan = frame.plan(&camera()).unwrap();

    let passes = plan.shadow_maps_of(LightKind::Point);
    assert_eq!(passes.len(), MAX_POINT_SHADOW_MAPS);
    let mut slots: Vec<_> = passes.iter().map(|p| p.slot).collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1, 2, 3]);

    let draws = plan.lights_of(LightKind::Point);
    assert_eq!(draws.len(), 6);
    assert_eq!(draws.iter().filter(|d| d.shadow_slot.is_some()).count(), 4);
    assert!(draws.iter().all(|d| d.volume == Some(VolumeFacing::Outside)));
}

#[test]
fn shadow_slots_skip_lights_outside_the_frustum() {
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_light(point(Vec3::new(0.0, 2.0, 40.0), 1.0), true);
    frame.add_light(point(Vec3::new(1.0, 1.0, 0.0), 1.0), true);
    let plan = frame.plan(&camera()).unwrap();

    let passes = plan.shadow_maps_of(LightKind::Point);
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].slot, 0);
    assert_eq!(passes[0].light.index, 1);
    assert_eq!(plan.light_draws(LightKind::Point), 1);
}

#[test]
fn camera_inside_point_light_draws_back_faces() {
    let view = camera();
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_light(point(view.position, 3.0), false);
    let plan = frame.plan(&view).unwrap();
    let draws = plan.lights_of(LightKind::Point);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].volume, Some(VolumeFacing::Inside));
}

#[test]
fn mixed_scene_plans_every_light_kind() {
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_light(
        Light::Ambient(AmbientLight {
            color: Vec3::ONE,
            intensity: 0.1,
        }),
        false,
    );
    frame.add_light(directional(), true);
    frame.add_light(directional(), true);
    frame.add_light(directional(), true);
    frame.add_light(point(Vec3::new(0.0, 1.0, 0.0), 2.0), true);
    frame.add_light(
        Light::Spot(SpotLight {
            position: Vec3::new(0.0, 4.0, 0.0),
            direction: Vec3::NEG_Y,
            range: 6.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            color: Vec3::ONE,
            intensity: 1.0,
        }),
        false,
    );
    let plan = frame.plan(&camera()).unwrap();

    assert_eq!(plan.light_draws(LightKind::Ambient), 1);
    assert_eq!(plan.light_draws(LightKind::Directional), 3);
    assert_eq!(plan.light_draws(LightKind::Point), 1);
    assert_eq!(plan.light_draws(LightKind::Spot), 1);
    // Two directional maps at most; the third light is lit without shadows.
    assert_eq!(plan.shadow_map_passes(LightKind::Directional), 2);
    assert_eq!(plan.shadow_map_passes(LightKind::Point), 1);
    assert_eq!(plan.shadow_map_passes(LightKind::Spot), 0);
    let unshadowed = plan
        .lights_of(LightKind::Directional)
        .iter()
        .filter(|d| d.shadow_slot.is_none())
        .count();
    assert_eq!(unshadowed, 1);
}

#[test]
fn empty_frame_copies_light_buffer_to_back_buffer() {
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    let plan = frame.plan(&camera()).unwrap();
    assert!(plan.geometry.draws.is_empty());
    assert!(plan.lights.is_empty());
    assert!(plan.needs_present_copy());
}

#[test]
fn three_stage_chain_ping_pongs_then_presents() {
    let mut sky = SkyPostProcess::default();
    let mut hdr = HdrPostProcess::default();
    let mut ui = UiPostProcess::new();
    let mut renderer = DeferredRenderer::new(&RenderSettings::default());
    let mut frame = renderer.begin();
    frame.add_post_process(&mut sky);
    frame.add_post_process(&mut hdr);
    frame.add_post_process(&mut ui);
    let plan = frame.plan(&camera()).unwrap();

    let steps: Vec<_> = plan
        .post_processes
        .iter()
        .map(|s| (s.name, s.source, s.destination))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("sky", ChainTarget::LightBuffer, ChainTarget::PingPong(0)),
            ("hdr", ChainTarget::PingPong(0), ChainTarget::PingPong(1)),
            ("ui", ChainTarget::PingPong(1), ChainTarget::BackBuffer),
        ]
    );
    assert!(!plan.needs_present_copy());
}
