//! Screen-space ambient occlusion math shared by the CPU side and the occlusion shader.
//!
//! Conventions used in this codebase:
//! - Right-handed view space (camera looks down -Z).
//! - Clip/NDC depth range is [0, 1]. Near -> 0, Far -> 1.
//! - Fullscreen UVs have origin at top-left (v = 0 at top, v = 1 at bottom).
use deferred_renderer::renderer::postprocess::blur::gaussian_numerator;
use deferred_renderer::renderer::postprocess::ssao::{
    sample_directions, sample_occlusion, visibility, SsaoParams, SsaoPostProcess, MAX_SAMPLES,
    MIN_SAMPLE_LENGTH, OCCLUSION_BIAS, SAMPLE_COUNTS,
};
use deferred_renderer::renderer::postprocess::PARAM_EPSILON;
use glam::{Mat4, Vec2, Vec3, Vec4};

fn project_view_to_uv_depth(proj: Mat4, view_pos: Vec3) -> (Vec2, f32) {
    let clip: Vec4 = proj * view_pos.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    (uv, ndc.z)
}

fn reconstruct_view_position(uv: Vec2, depth: f32, proj_inv: Mat4) -> Vec3 {
    let ndc = Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth);
    let view = proj_inv * ndc.extend(1.0);
    view.truncate() / view.w
}

/// Occlusion of a flat surface at `center_z` whose neighbourhood is all at `scene_z`.
fn occlusion_sum(radius: f32, center_z: f32, scene_z: f32, sample_count: u32) -> f32 {
    sample_directions(1)
        .iter()
        .take(sample_count as usize)
        .map(|d| sample_occlusion(radius, center_z, center_z + d.z * radius, scene_z))
        .sum()
}

#[test]
fn reconstruct_view_position_roundtrips_through_projection() {
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 50.0);
    let proj_inv = proj.inverse();

    let points = [
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.2, -0.1, -2.5),
        Vec3::new(1.0, 0.5, -3.0),
        Vec3::new(-0.75, 0.25, -5.0),
    ];
    for &p_view in &points {
        let (uv, depth) = project_view_to_uv_depth(proj, p_view);
        assert!(depth > 0.0 && depth < 1.0, "depth out of range: {depth} for {p_view:?}");
        let recon = reconstruct_view_position(uv, depth, proj_inv);
        assert!(
            (recon - p_view).abs().max_element() < 1e-4,
            "orig={p_view:?}, recon={recon:?}"
        );
    }
}

#[test]
fn zero_radius_gives_full_visibility() {
    let count = SAMPLE_COUNTS[3];
    let sum = occlusion_sum(0.0, -5.0, -4.0, count);
    assert_eq!(sum, 0.0);
    assert_eq!(visibility(sum, count, 4.5), 1.0);
}

#[test]
fn nearby_occluder_darkens_and_distant_one_does_not() {
    let count = SAMPLE_COUNTS[5];
    // Larger z is nearer the camera, so -4.8 sits in front of the surface at -5.
    let near = occlusion_sum(0.5, -5.0, -4.8, count);
    let far = occlusion_sum(0.5, -5.0, -1.0, count);
    assert!(near > far, "near {near} far {far}");
    assert!(visibility(near, count, 4.5) < visibility(far, count, 4.5));
}

#[test]
fn samples_behind_the_surface_never_occlude() {
    for sample_z in [-5.0, -4.9, -4.5] {
        let scene_z = sample_z - OCCLUSION_BIAS * 2.0;
        assert_eq!(sample_occlusion(0.5, -5.0, sample_z, scene_z), 0.0);
    }
}

#[test]
fn visibility_stays_in_unit_range() {
    for sum in [-3.0, 0.0, 4.0, 8.0, 100.0] {
        let v = visibility(sum, 8, 4.5);
        assert!((0.0..=1.0).contains(&v), "sum {sum} -> {v}");
    }
    // A zero sample count does not divide by zero.
    assert!(visibility(0.5, 0, 2.0).is_finite());
}

#[test]
fn sample_directions_are_reproducible_per_seed() {
    let a = sample_directions(42);
    let b = sample_directions(42);
    let c = sample_directions(43);
    assert_eq!(a.len(), MAX_SAMPLES);
    assert_eq!(a, b);
    assert_ne!(a, c);
    for d in &a {
        let length = d.truncate().length();
        assert!(length >= MIN_SAMPLE_LENGTH - 1e-5 && length <= 1.0 + 1e-5);
        assert_eq!(d.w, 0.0);
    }
}

#[test]
fn setters_clamp_to_valid_ranges() {
    let mut ssao = SsaoPostProcess::new(SsaoParams::default());
    ssao.set_blur_sigma(-5.0);
    assert_eq!(ssao.blur_sigma(), PARAM_EPSILON);
    ssao.set_sample_power(0.0);
    assert_eq!(ssao.sample_power(), PARAM_EPSILON);
    ssao.set_sample_radius(-1.0);
    assert_eq!(ssao.sample_radius(), 0.0);
    ssao.set_sample_count_index(99);
    assert_eq!(ssao.sample_count(), *SAMPLE_COUNTS.last().unwrap());
}

#[test]
fn blur_numerator_uses_normal_density() {
    let sigma = 0.45f32;
    let expected = 1.0 / (2.0 * std::f32::consts::PI * sigma * sigma).sqrt();
    assert!((gaussian_numerator(sigma) - expected).abs() < 1e-6);
}
