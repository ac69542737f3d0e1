//! Back-buffer-sized targets depend only on the back buffer, so releasing and recreating
//! them for the same size yields identical descriptions.

use deferred_renderer::renderer::lifecycle::TargetDesc;
use deferred_renderer::renderer::postprocess::{
    DepthOfFieldPostProcess, HdrPostProcess, SsaoPostProcess,
};
use deferred_renderer::renderer::{BackBufferDesc, DeferredRenderer};
use deferred_renderer::scene::PerspectiveCamera;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

/// Every back-buffer-sized target the default demo chain owns.
fn all_targets(back_buffer: &BackBufferDesc, ssao_half_resolution: bool) -> Vec<TargetDesc> {
    let mut targets = DeferredRenderer::target_descriptors(back_buffer);
    targets.extend(SsaoPostProcess::target_descriptors(back_buffer, ssao_half_resolution));
    targets.extend(HdrPostProcess::target_descriptors(back_buffer));
    targets.extend(DepthOfFieldPostProcess::target_descriptors(back_buffer));
    targets
}

#[test]
fn resize_to_same_size_is_idempotent() {
    let bb = BackBufferDesc::new(1280, 720, FORMAT);
    assert_eq!(all_targets(&bb, true), all_targets(&bb, true));
}

#[test]
fn resize_round_trip_restores_targets() {
    let original = BackBufferDesc::new(1280, 720, FORMAT);
    let fullscreen = BackBufferDesc::new(2560, 1440, FORMAT);
    let before = all_targets(&original, true);
    let during = all_targets(&fullscreen, true);
    let after = all_targets(&original, true);
    assert_ne!(before, during);
    assert_eq!(before, after);
}

#[test]
fn labels_are_unique() {
    let bb = BackBufferDesc::new(800, 600, FORMAT);
    let targets = all_targets(&bb, true);
    let mut labels: Vec<_> = targets.iter().map(|t| t.label).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), targets.len());
}

#[test]
fn minimised_window_keeps_every_target_non_empty() {
    let bb = BackBufferDesc::new(0, 0, FORMAT);
    for target in all_targets(&bb, true) {
        assert!(target.width >= 1 && target.height >= 1, "{target:?}");
    }
}

#[test]
fn odd_sizes_round_down_for_reduced_targets() {
    let bb = BackBufferDesc::new(1001, 601, FORMAT);
    let hdr = HdrPostProcess::target_descriptors(&bb);
    assert_eq!((hdr[0].width, hdr[0].height), (500, 300));
    let ssao = SsaoPostProcess::target_descriptors(&bb, false);
    assert_eq!((ssao[0].width, ssao[0].height), (1001, 601));
    assert_eq!((ssao[1].width, ssao[1].height), (250, 150));
}

#[test]
fn ssao_half_resolution_changes_only_the_working_targets() {
    let bb = BackBufferDesc::new(1920, 1080, FORMAT);
    let half = SsaoPostProcess::target_descriptors(&bb, true);
    let full = SsaoPostProcess::target_descriptors(&bb, false);
    assert_eq!((half[0].width, half[0].height), (960, 540));
    assert_eq!((full[0].width, full[0].height), (1920, 1080));
    assert_eq!(half[1..5], full[1..5]);
    assert_eq!((half[5].width, half[5].height), (960, 540));
}

#[test]
fn full_resolution_ssao_composites_at_back_buffer_size() {
    let bb = BackBufferDesc::new(1280, 720, FORMAT);
    let source = SsaoPostProcess::composite_source(&bb, false);
    assert_eq!((source.width, source.height), (bb.width, bb.height));
}

#[test]
fn camera_aspect_follows_back_buffer() {
    let mut camera = PerspectiveCamera::default();
    let bb = BackBufferDesc::new(1000, 500, FORMAT);
    camera.set_aspect_ratio(bb.aspect_ratio());
    assert_eq!(camera.projection.aspect, 2.0);
}
