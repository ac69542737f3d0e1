use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("No suitable graphics adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("Shader '{label}' failed to compile: {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("Failed to create '{label}': {message}")]
    ResourceCreation { label: String, message: String },

    #[error("'{0}' used before its device resources were created")]
    NotCreated(&'static str),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error(
        "Mesh {mesh} part {part} references material {material}, but the model has {material_count}"
    )]
    InvalidMaterialIndex {
        mesh: usize,
        part: usize,
        material: usize,
        material_count: usize,
    },

    #[error("Failed to load {path:?}: {message}")]
    Content { path: PathBuf, message: String },
}

impl RenderError {
    pub fn content(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Content {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for "feature not available" failures, as opposed to device or content faults.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_is_distinct() {
        assert!(RenderError::NotImplemented("spot light shadows").is_not_implemented());
        assert!(!RenderError::NotCreated("g-buffer").is_not_implemented());
    }

    #[test]
    fn content_error_mentions_path() {
        let err = RenderError::content("models/missing.gltf", "file not found");
        let text = err.to_string();
        assert!(text.contains("missing.gltf"));
        assert!(text.contains("file not found"));
    }
}
