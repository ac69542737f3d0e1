use deferred_renderer::input::{
    InputState, KeyboardState, MouseButtons, MouseState, RawKeyboard, RawMouse,
};
use deferred_renderer::settings::{PresentModeSetting, RenderSettings};
use deferred_renderer::time::{FrameClock, MAX_FRAME_DELTA};
use glam::Vec2;
use std::time::{Duration, Instant};
use winit::keyboard::KeyCode;

#[test]
fn empty_settings_file_yields_defaults() {
    let settings = RenderSettings::from_json("{}").unwrap();
    assert_eq!(settings, RenderSettings::default());
}

#[test]
fn partial_settings_keep_remaining_defaults() {
    let json = r#"{
        "present_mode": "mailbox",
        "ssao": { "sample_radius": 1.25, "half_resolution": false },
        "motion_blur": { "enabled": true }
    }"#;
    let settings = RenderSettings::from_json(json).unwrap();
    let defaults = RenderSettings::default();

    assert_eq!(settings.present_mode, PresentModeSetting::Mailbox);
    assert_eq!(settings.ssao.sample_radius, 1.25);
    assert!(!settings.ssao.half_resolution);
    assert_eq!(settings.ssao.blur_sigma, defaults.ssao.blur_sigma);
    assert!(settings.motion_blur.enabled);
    assert_eq!(settings.motion_blur.sample_count, defaults.motion_blur.sample_count);
    assert_eq!(settings.hdr, defaults.hdr);
}

#[test]
fn invalid_values_are_replaced_while_parsing() {
    let json = r#"{
        "resolution": { "width": 0, "height": 720 },
        "point_shadow_map_size": 1,
        "ssao": { "sample_count_index": 42, "blur_sigma": -1.0 }
    }"#;
    let settings = RenderSettings::from_json(json).unwrap();
    let defaults = RenderSettings::default();
    assert_eq!(settings.resolution, defaults.resolution);
    assert_eq!(settings.point_shadow_map_size, defaults.point_shadow_map_size);
    assert_eq!(settings.ssao.sample_count_index, defaults.ssao.sample_count_index);
    assert_eq!(settings.ssao.blur_sigma, defaults.ssao.blur_sigma);
}

#[test]
fn malformed_json_is_an_error() {
    assert!(RenderSettings::from_json("{ \"ssao\": ").is_err());
    assert!(RenderSettings::from_json(r#"{ "present_mode": "sometimes" }"#).is_err());
}

#[test]
fn missing_or_broken_files_fall_back_to_defaults() {
    let missing = std::env::temp_dir().join("deferred-renderer-missing-settings.json");
    assert_eq!(RenderSettings::load_from_path(&missing), RenderSettings::default());

    let broken = std::env::temp_dir().join(format!(
        "deferred-renderer-broken-settings-{}.json",
        std::process::id()
    ));
    std::fs::write(&broken, "not json").unwrap();
    let settings = RenderSettings::load_from_path(&broken);
    let _ = std::fs::remove_file(&broken);
    assert_eq!(settings, RenderSettings::default());
}

fn keys(codes: &[KeyCode]) -> RawKeyboard {
    let mut raw = RawKeyboard::default();
    raw.down.extend(codes.iter().copied());
    raw
}

#[test]
fn key_lifecycle_across_frames() {
    let idle = KeyboardState::default();
    let pressed = KeyboardState::next(&idle, &keys(&[KeyCode::Digit1]));
    let held = KeyboardState::next(&pressed, &keys(&[KeyCode::Digit1]));
    let released = KeyboardState::next(&held, &keys(&[]));

    assert!(pressed.just_pressed(KeyCode::Digit1));
    assert!(held.is_down(KeyCode::Digit1) && !held.just_pressed(KeyCode::Digit1));
    assert!(released.just_released(KeyCode::Digit1));
    assert!(!released.is_down(KeyCode::Digit1));
}

#[test]
fn mouse_drag_reports_delta_and_button_edges() {
    let start = RawMouse {
        position: Some(Vec2::new(100.0, 100.0)),
        buttons: MouseButtons::LEFT,
        scroll: 0.0,
    };
    let moved = RawMouse {
        position: Some(Vec2::new(130.0, 90.0)),
        ..start
    };
    let first = MouseState::next(&MouseState::default(), &start);
    let second = MouseState::next(&first, &moved);

    assert!(first.pressed.contains(MouseButtons::LEFT));
    assert_eq!(second.delta, Vec2::new(30.0, -10.0));
    assert!(second.is_down(MouseButtons::LEFT));
    assert!(second.pressed.is_empty());

    let up = MouseState::next(&second, &RawMouse { buttons: MouseButtons::empty(), ..moved });
    assert!(up.released.contains(MouseButtons::LEFT));
    assert_eq!(up.delta, Vec2::ZERO);
}

#[test]
fn leaving_the_window_resets_cursor_delta() {
    let inside = RawMouse {
        position: Some(Vec2::new(10.0, 10.0)),
        ..RawMouse::default()
    };
    let first = MouseState::next(&MouseState::default(), &inside);
    let outside = MouseState::next(&first, &RawMouse::default());
    let back = MouseState::next(
        &outside,
        &RawMouse {
            position: Some(Vec2::new(500.0, 500.0)),
            ..RawMouse::default()
        },
    );
    assert_eq!(back.delta, Vec2::ZERO);
}

#[test]
fn input_state_combines_both_devices() {
    let state = InputState::next(
        &InputState::default(),
        &keys(&[KeyCode::KeyW]),
        &RawMouse {
            scroll: 3.0,
            ..RawMouse::default()
        },
    );
    assert!(state.keyboard.just_pressed(KeyCode::KeyW));
    assert_eq!(state.mouse.scroll, 3.0);
}

#[test]
fn clock_excludes_paused_time_and_clamps_stalls() {
    let start = Instant::now();
    let mut clock = FrameClock::new();
    clock.tick_at(start);
    let stalled = clock.tick_at(start + Duration::from_secs(2));
    assert_eq!(stalled.delta, MAX_FRAME_DELTA.as_secs_f32());

    clock.set_active(false);
    assert!(!clock.is_active());
    clock.tick_at(start + Duration::from_secs(30));
    clock.set_active(true);
    let resumed = clock.tick_at(start + Duration::from_secs(31));
    assert_eq!(resumed.delta, 0.0);
    assert!((resumed.total - MAX_FRAME_DELTA.as_secs_f64()).abs() < 1e-6);
}
