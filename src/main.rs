use deferred_renderer::demo::DemoScene;

/// `deferred-renderer [model.gltf [scale]]`; without arguments the primitive scene is shown.
fn scene_from_args() -> DemoScene {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(path) => DemoScene::Gltf {
            path: path.into(),
            scale: args.next().and_then(|s| s.parse().ok()).unwrap_or(1.0),
        },
        None => DemoScene::Primitives,
    }
}

fn main() {
    if let Err(err) = deferred_renderer::run(scene_from_args()) {
        eprintln!("Application error: {err}");
    }
}
