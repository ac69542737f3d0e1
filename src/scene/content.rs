//! Content loading with a hash-keyed cache, and the glTF model loader.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use image::{DynamicImage, GrayImage, ImageBuffer, LumaA, Rgb, Rgba};

use super::model::{Material, MaterialProperties, Mesh, MeshPart, Model};
use crate::error::{RenderError, Result};
use crate::renderer::material::{MaterialLayout, MaterialTextures};
use crate::renderer::texture::Texture;
use crate::renderer::vertex::Vertex;

/// Loads one kind of content from a file.
pub trait ContentLoader {
    type Options: Hash;
    type Content: Send + Sync + 'static;

    /// Cache key. Equal keys must describe interchangeable content.
    fn content_hash(&self, path: &Path, options: &Self::Options) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::any::type_name::<Self::Content>().hash(&mut hasher);
        path.hash(&mut hasher);
        options.hash(&mut hasher);
        hasher.finish()
    }

    fn load(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        options: &Self::Options,
    ) -> Result<Self::Content>;
}

/// Resolves content paths against search directories and shares loaded content.
#[derive(Default)]
pub struct ContentManager {
    search_paths: Vec<PathBuf>,
    cache: HashMap<u64, Arc<dyn Any + Send + Sync>>,
}

impl ContentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// First existing match: the path as given, then each search path in order.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| RenderError::content(path, "not found in any search path"))
    }

    pub fn load<L: ContentLoader>(
        &mut self,
        loader: &L,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: impl AsRef<Path>,
        options: &L::Options,
    ) -> Result<Arc<L::Content>> {
        let resolved = self.resolve(path)?;
        let key = loader.content_hash(&resolved, options);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(content) = Arc::clone(cached).downcast::<L::Content>() {
                log::debug!("Content cache hit: {:?}", resolved);
                return Ok(content);
            }
        }

        let content = Arc::new(loader.load(device, queue, &resolved, options)?);
        self.cache.insert(key, content.clone());
        log::info!("Loaded content {:?}", resolved);
        Ok(content)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drops the cache's references; content still held elsewhere stays alive.
    pub fn release_all(&mut self) {
        self.cache.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    /// Uniform scale baked into vertex positions.
    pub scale: f32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Hash for ModelOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scale.to_bits().hash(state);
    }
}

/// Loads an image file as a sampled texture.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextureLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureOptions {
    /// Color maps are sRGB; normal and specular maps are linear.
    pub srgb: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self { srgb: true }
    }
}

impl ContentLoader for TextureLoader {
    type Options = TextureOptions;
    type Content = Texture;

    fn load(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        options: &TextureOptions,
    ) -> Result<Texture> {
        Texture::from_path(device, queue, path, options.srgb)
    }
}

/// Imports every mesh node of a glTF scene into one static `Model`, with node
/// transforms baked into the vertices.
pub struct ModelLoader<'a> {
    materials: &'a MaterialLayout,
}

impl<'a> ModelLoader<'a> {
    pub fn new(materials: &'a MaterialLayout) -> Self {
        Self { materials }
    }
}

impl ContentLoader for ModelLoader<'_> {
    type Options = ModelOptions;
    type Content = Model;

    fn load(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        options: &ModelOptions,
    ) -> Result<Model> {
        let (document, buffers, images) =
            gltf::import(path).map_err(|e| RenderError::content(path, e))?;
        log::info!(
            "{:?}: {} meshes, {} materials, {} images",
            path,
            document.meshes().len(),
            document.materials().len(),
            images.len()
        );

        let decoded: Vec<Option<DynamicImage>> = images.iter().map(decode_image).collect();
        let mut materials: Vec<Material> = document
            .materials()
            .map(|m| self.load_material(device, queue, &m, &decoded))
            .collect();
        // Primitives without a material use a trailing default.
        let default_material = materials.len();
        materials.push(Material::new(
            "Default",
            MaterialProperties::default(),
            self.materials.create_binding(
                device,
                "Default Material",
                &MaterialProperties::default(),
                MaterialTextures::default(),
            ),
        ));

        let mut meshes = Vec::new();
        let root = Mat4::from_scale(Vec3::splat(options.scale));
        let scenes = document
            .default_scene()
            .into_iter()
            .chain(document.scenes())
            .take(1);
        for scene in scenes {
            for node in scene.nodes() {
                collect_meshes(
                    device,
                    &node,
                    root,
                    &buffers,
                    default_material,
                    path,
                    &mut meshes,
                )?;
            }
        }

        Model::new(meshes, materials)
    }
}

impl ModelLoader<'_> {
    fn load_material(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material: &gltf::Material,
        images: &[Option<DynamicImage>],
    ) -> Material {
        let name = material.name().unwrap_or("Unnamed").to_string();
        let pbr = material.pbr_metallic_roughness();
        let properties = derive_properties(
            pbr.base_color_factor(),
            pbr.metallic_factor(),
            pbr.roughness_factor(),
        );

        let image_of = |texture: gltf::Texture| {
            images
                .get(texture.source().index())
                .and_then(|image| image.as_ref())
        };
        let upload = |image: &DynamicImage, srgb: bool, label: &str| {
            Texture::from_image(device, queue, image, srgb, Some(label))
        };

        let textures = MaterialTextures {
            diffuse: pbr
                .base_color_texture()
                .and_then(|info| image_of(info.texture()))
                .map(|image| upload(image, true, &format!("{name} Diffuse"))),
            normal: material
                .normal_texture()
                .and_then(|info| image_of(info.texture()))
                .map(|image| upload(image, false, &format!("{name} Normal"))),
            specular: pbr
                .metallic_roughness_texture()
                .and_then(|info| image_of(info.texture()))
                .map(|image| {
                    upload(
                        &specular_from_metallic_roughness(image),
                        false,
                        &format!("{name} Specular"),
                    )
                }),
        };

        log::debug!(
            "  Material '{}': specular power {:.1}",
            name,
            properties.specular_power
        );
        let binding = self
            .materials
            .create_binding(device, &name, &properties, textures);
        Material::new(name, properties, binding)
    }
}

fn collect_meshes(
    device: &wgpu::Device,
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    default_material: usize,
    path: &Path,
    meshes: &mut Vec<Mesh>,
) -> Result<()> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let name = mesh
            .name()
            .or(node.name())
            .unwrap_or("Unnamed")
            .to_string();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut parts = Vec::new();
        for primitive in mesh.primitives() {
            let (prim_vertices, prim_indices) = read_primitive(&primitive, buffers, world)
                .map_err(|message| RenderError::content(path, format!("{name}: {message}")))?;
            let base = vertices.len() as u32;
            parts.push(MeshPart {
                index_start: indices.len() as u32,
                index_count: prim_indices.len() as u32,
                material: primitive.material().index().unwrap_or(default_material),
            });
            indices.extend(prim_indices.into_iter().map(|i| i + base));
            vertices.extend(prim_vertices);
        }
        if !indices.is_empty() {
            meshes.push(Mesh::upload(device, name, &vertices, &indices, parts));
        }
    }
    for child in node.children() {
        collect_meshes(device, &child, world, buffers, default_material, path, meshes)?;
    }
    Ok(())
}

fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    world: Mat4,
) -> std::result::Result<(Vec<Vertex>, Vec<u32>), &'static str> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<[f32; 3]> = reader.read_positions().ok_or("missing positions")?.collect();
    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|n| n.collect())
        .unwrap_or_else(|| vec![[0.0, 1.0, 0.0]; positions.len()]);
    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|uv| uv.into_f32().collect())
        .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let tangents: Vec<[f32; 4]> = reader
        .read_tangents()
        .map(|t| t.collect())
        .unwrap_or_else(|| generate_tangents(&positions, &normals, &uvs, &indices));

    let normal_matrix = Mat4::from_mat3(glam::Mat3::from_mat4(world).inverse().transpose());
    let vertices = positions
        .iter()
        .zip(&normals)
        .zip(&uvs)
        .zip(&tangents)
        .map(|(((pos, normal), uv), tangent)| {
            let t = world.transform_vector3(Vec3::new(tangent[0], tangent[1], tangent[2]));
            Vertex {
                pos: world.transform_point3(Vec3::from(*pos)).to_array(),
                normal: normal_matrix
                    .transform_vector3(Vec3::from(*normal))
                    .normalize_or_zero()
                    .to_array(),
                uv: *uv,
                tangent: [t.x, t.y, t.z, tangent[3]],
            }
        })
        .collect();
    Ok((vertices, indices))
}

/// Per-vertex tangents from UV gradients, Gram-Schmidt orthogonalized against the normal.
pub fn generate_tangents(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    indices: &[u32],
) -> Vec<[f32; 4]> {
    let mut tangents = vec![Vec3::ZERO; positions.len()];
    let mut bitangents = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let e1 = Vec3::from(positions[i1]) - Vec3::from(positions[i0]);
        let e2 = Vec3::from(positions[i2]) - Vec3::from(positions[i0]);
        let du1 = uvs[i1][0] - uvs[i0][0];
        let dv1 = uvs[i1][1] - uvs[i0][1];
        let du2 = uvs[i2][0] - uvs[i0][0];
        let dv2 = uvs[i2][1] - uvs[i0][1];
        let det = du1 * dv2 - du2 * dv1;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * dv2 - e2 * dv1) * r;
        let bitangent = (e2 * du1 - e1 * du2) * r;
        for i in [i0, i1, i2] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    tangents
        .iter()
        .zip(&bitangents)
        .zip(normals)
        .map(|((t, b), n)| {
            let normal = Vec3::from(*n);
            let mut tangent = (*t - normal * normal.dot(*t)).normalize_or_zero();
            if tangent.length_squared() < 1e-4 {
                let axis = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::X };
                tangent = axis.cross(normal).normalize_or_zero();
            }
            let handedness = if normal.cross(tangent).dot(*b) < 0.0 { -1.0 } else { 1.0 };
            [tangent.x, tangent.y, tangent.z, handedness]
        })
        .collect()
}

/// Blinn-Phong parameters approximating a metallic-roughness material.
pub fn derive_properties(base_color: [f32; 4], metallic: f32, roughness: f32) -> MaterialProperties {
    let metallic = metallic.clamp(0.0, 1.0);
    let alpha = roughness.clamp(0.05, 1.0).powi(2);
    let dielectric = Vec3::splat(0.04);
    let specular_color = dielectric.lerp(Vec3::new(base_color[0], base_color[1], base_color[2]), metallic);
    MaterialProperties {
        diffuse_color: base_color,
        specular_color: specular_color.to_array(),
        specular_power: (2.0 / (alpha * alpha) - 2.0).clamp(1.0, 255.0),
    }
}

/// Grayscale specular mask: smooth texels (low roughness in green) are shiny.
pub fn specular_from_metallic_roughness(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mask = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        image::Luma([255 - rgba.get_pixel(x, y)[1]])
    });
    DynamicImage::ImageLuma8(mask)
}

fn decode_image(data: &gltf::image::Data) -> Option<DynamicImage> {
    use gltf::image::Format;

    let (w, h) = (data.width, data.height);
    let pixels = data.pixels.clone();
    let image = match data.format {
        Format::R8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        Format::R8G8 => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, pixels)
            .map(DynamicImage::ImageLumaA8),
        Format::R8G8B8 => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8)
        }
        Format::R8G8B8A8 => {
            ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8)
        }
        other => {
            log::warn!("Unsupported glTF image format {:?}, using default texture", other);
            return None;
        }
    };
    if image.is_none() {
        log::warn!("glTF image {}x{} has inconsistent pixel data", w, h);
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NameLoader;

    impl ContentLoader for NameLoader {
        type Options = u32;
        type Content = String;

        fn load(
            &self,
            _device: &wgpu::Device,
            _queue: &wgpu::Queue,
            path: &Path,
            options: &u32,
        ) -> Result<String> {
            Ok(format!("{}#{}", path.display(), options))
        }
    }

    #[test]
    fn hash_depends_on_options() {
        let path = Path::new("model.gltf");
        assert_ne!(
            NameLoader.content_hash(path, &1),
            NameLoader.content_hash(path, &2)
        );
        assert_eq!(
            NameLoader.content_hash(path, &1),
            NameLoader.content_hash(path, &1)
        );
    }

    #[test]
    fn texture_color_space_is_part_of_the_key() {
        let path = Path::new("albedo.png");
        let srgb = TextureLoader.content_hash(path, &TextureOptions { srgb: true });
        let linear = TextureLoader.content_hash(path, &TextureOptions { srgb: false });
        assert_ne!(srgb, linear);
        // Same path and options through a different loader never share a slot.
        assert_ne!(srgb, NameLoader.content_hash(path, &1));
    }

    #[test]
    fn resolve_searches_paths_in_order() {
        let dir = std::env::temp_dir().join("deferred_renderer_content_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("found.bin"), b"x").unwrap();

        let mut content = ContentManager::new();
        assert!(content.resolve("found.bin").is_err());
        content.add_search_path(&dir);
        assert_eq!(content.resolve("found.bin").unwrap(), dir.join("found.bin"));
    }

    #[test]
    fn smooth_texels_are_specular() {
        let mut image = image::RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        let mask = specular_from_metallic_roughness(&DynamicImage::ImageRgba8(image)).to_luma8();
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn rough_dielectric_has_low_power() {
        let rough = derive_properties([1.0; 4], 0.0, 1.0);
        let smooth = derive_properties([1.0; 4], 0.0, 0.2);
        assert!(rough.specular_power < smooth.specular_power);
        assert_eq!(rough.specular_color, [0.04; 3]);
    }

    #[test]
    fn tangents_follow_u_direction() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let tangents = generate_tangents(&positions, &normals, &uvs, &[0, 1, 2]);
        for t in tangents {
            assert!((t[0] - 1.0).abs() < 1e-5);
            assert_eq!(t[3], 1.0);
        }
    }
}
