pub mod bounds_renderer;
pub mod context;
pub mod deferred;
pub mod frame;
pub mod gbuffer;
pub mod lifecycle;
pub mod light_buffer;
pub mod lights;
pub mod material;
pub mod model_renderer;
pub mod pipeline_builder;
pub mod postprocess;
pub mod states;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use context::RenderContext;
pub use deferred::{DeferredRenderer, Frame};
pub use frame::{FramePlan, FrameStats, LightKind};
pub use lifecycle::{BackBufferDesc, DeviceLifecycle};
pub use lights::{AmbientLight, DirectionalLight, Light, PointLight, SpotLight};
pub use postprocess::{PostProcess, PostProcessContext};
pub use vertex::Vertex;
