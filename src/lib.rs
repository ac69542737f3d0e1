pub mod app;
pub mod demo;
pub mod error;
pub mod input;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod time;

pub use error::{RenderError, Result};

use app::App;
use demo::DemoScene;
use winit::event_loop::EventLoop;

fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run(scene: DemoScene) -> std::result::Result<(), winit::error::EventLoopError> {
    init_logging();

    log::info!("Starting deferred renderer with {:?}", scene);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(scene);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
