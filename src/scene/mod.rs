pub mod bounds;
pub mod camera;
pub mod content;
pub mod instance;
pub mod model;
pub mod primitives;
pub mod transform;

pub use bounds::{Aabb, BoundingSphere, Containment, Frustum, OrientedBox};
pub use camera::{Camera, CameraView, Orthographic, Perspective, PerspectiveCamera, Projection};
pub use content::{
    ContentLoader, ContentManager, ModelLoader, ModelOptions, TextureLoader, TextureOptions,
};
pub use instance::ModelInstance;
pub use model::{Material, MaterialProperties, Mesh, MeshPart, Model};
pub use transform::Transform;
