//! Scenes the demo binary can show, and their per-frame animation.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};
use log::info;
use winit::keyboard::KeyCode;

use crate::error::Result;
use crate::input::{InputState, MouseButtons};
use crate::renderer::lights::{AmbientLight, DirectionalLight, Light, PointLight, SpotLight};
use crate::renderer::material::{MaterialLayout, MaterialTextures};
use crate::renderer::vertex::Vertex;
use crate::scene::camera::PerspectiveCamera;
use crate::scene::content::{ContentManager, ModelLoader, ModelOptions};
use crate::scene::instance::ModelInstance;
use crate::scene::model::{Material, MaterialProperties, Mesh, MeshPart, Model};
use crate::scene::primitives;
use crate::time::FrameTime;

pub const MOVE_SPEED: f32 = 5.0;
/// Radians per pixel of mouse drag.
pub const ROTATION_SPEED: f32 = 0.002;

#[derive(Clone, Debug)]
pub enum DemoScene {
    /// Floor, a grid of cubes and spheres, orbiting point lights.
    Primitives,
    Gltf { path: PathBuf, scale: f32 },
}

struct OrbitingLight {
    light: usize,
    radius: f32,
    height: f32,
    speed: f32,
    phase: f32,
}

pub struct DemoWorld {
    pub camera: PerspectiveCamera,
    pub instances: Vec<ModelInstance>,
    /// Light and whether it casts shadows.
    pub lights: Vec<(Light, bool)>,
    orbiting: Vec<OrbitingLight>,
    spinning: Vec<usize>,
}

impl DemoWorld {
    pub fn build(
        scene: &DemoScene,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &MaterialLayout,
        content: &mut ContentManager,
    ) -> Result<Self> {
        let mut world = Self {
            camera: PerspectiveCamera::default(),
            instances: Vec::new(),
            lights: Vec::new(),
            orbiting: Vec::new(),
            spinning: Vec::new(),
        };
        world.add_lights();

        match scene {
            DemoScene::Primitives => world.add_primitives(device, layout)?,
            DemoScene::Gltf { path, scale } => {
                let loader = ModelLoader::new(layout);
                let model =
                    content.load(&loader, device, queue, path, &ModelOptions { scale: *scale })?;
                info!("glTF model has {} meshes", model.mesh_count());
                world.instances.push(ModelInstance::new(model));
                world.add_floor(device, layout)?;
            }
        }
        info!(
            "Demo scene: {} instances, {} lights",
            world.instances.len(),
            world.lights.len()
        );
        Ok(world)
    }

    fn add_lights(&mut self) {
        self.lights.push((
            Light::Ambient(AmbientLight {
                color: Vec3::new(0.6, 0.7, 1.0),
                intensity: 0.15,
            }),
            false,
        ));
        self.lights.push((
            Light::Directional(DirectionalLight {
                direction: Vec3::new(0.4, 1.0, 0.3).normalize(),
                color: Vec3::new(1.0, 0.95, 0.85),
                intensity: 1.2,
            }),
            true,
        ));

        let colors = [
            Vec3::new(1.0, 0.3, 0.2),
            Vec3::new(0.2, 1.0, 0.3),
            Vec3::new(0.3, 0.4, 1.0),
            Vec3::new(1.0, 0.8, 0.2),
            Vec3::new(0.9, 0.2, 1.0),
            Vec3::new(0.2, 0.9, 1.0),
        ];
        for (i, color) in colors.into_iter().enumerate() {
            self.orbiting.push(OrbitingLight {
                light: self.lights.len(),
                radius: 3.0 + i as f32,
                height: 1.0 + 0.25 * i as f32,
                speed: 0.4 + 0.1 * i as f32,
                phase: i as f32 * std::f32::consts::TAU / 6.0,
            });
            self.lights.push((
                Light::Point(PointLight {
                    position: Vec3::ZERO,
                    radius: 6.0,
                    color,
                    intensity: 2.0,
                }),
                i % 2 == 0,
            ));
        }

        self.lights.push((
            Light::Spot(SpotLight {
                position: Vec3::new(-6.0, 5.0, 6.0),
                direction: Vec3::new(1.0, -1.0, -1.0).normalize(),
                range: 14.0,
                inner_angle: 0.3,
                outer_angle: 0.5,
                color: Vec3::ONE,
                intensity: 3.0,
            }),
            false,
        ));
    }

    fn add_floor(&mut self, device: &wgpu::Device, layout: &MaterialLayout) -> Result<()> {
        let floor = primitive_model(
            device,
            layout,
            "Floor",
            primitives::plane_mesh(30.0, 6.0),
            MaterialProperties {
                diffuse_color: [0.7, 0.7, 0.7, 1.0],
                specular_color: [0.2; 3],
                specular_power: 16.0,
            },
        )?;
        self.instances.push(ModelInstance::new(floor));
        Ok(())
    }

    fn add_primitives(&mut self, device: &wgpu::Device, layout: &MaterialLayout) -> Result<()> {
        self.add_floor(device, layout)?;
        let cube = primitive_model(
            device,
            layout,
            "Cube",
            primitives::cube_mesh(),
            MaterialProperties {
                diffuse_color: [0.8, 0.3, 0.2, 1.0],
                ..MaterialProperties::default()
            },
        )?;
        let sphere = primitive_model(
            device,
            layout,
            "Sphere",
            primitives::sphere_mesh(32, 16),
            MaterialProperties {
                diffuse_color: [0.9, 0.9, 0.95, 1.0],
                specular_color: [0.9; 3],
                specular_power: 96.0,
            },
        )?;

        for x in -2..=2 {
            for z in -2..=2 {
                let position = Vec3::new(x as f32 * 3.0, 0.5, z as f32 * 3.0);
                let (model, spins) = if (x + z) % 2 == 0 {
                    (cube.clone(), true)
                } else {
                    (sphere.clone(), false)
                };
                let mut instance = ModelInstance::new(model);
                instance.set_position(position);
                instance.set_scale(0.5);
                if spins {
                    self.spinning.push(self.instances.len());
                }
                self.instances.push(instance);
            }
        }
        Ok(())
    }

    /// Orbits the point lights and spins the cubes.
    pub fn update(&mut self, time: FrameTime) {
        let t = time.total as f32;
        for orbit in &self.orbiting {
            if let Some((Light::Point(point), _)) = self.lights.get_mut(orbit.light) {
                let angle = orbit.phase + t * orbit.speed;
                point.position = Vec3::new(
                    angle.cos() * orbit.radius,
                    orbit.height,
                    angle.sin() * orbit.radius,
                );
            }
        }
        for &index in &self.spinning {
            if let Some(instance) = self.instances.get_mut(index) {
                let spin = Quat::from_rotation_y(time.delta * 0.8);
                let orientation = spin * instance.orientation();
                instance.set_orientation(orientation.normalize());
            }
        }
    }

    /// WASD/arrows move, left drag looks around.
    pub fn move_camera(&mut self, input: &InputState, delta_time: f32) {
        let local = camera_motion(input);
        let camera = &mut self.camera;
        let motion = camera.right() * local.x + Vec3::Y * local.y + camera.forward() * local.z;
        camera.position += motion * MOVE_SPEED * delta_time;

        if input.mouse.is_down(MouseButtons::LEFT) {
            camera.rotate(look_delta(input.mouse.delta));
        }
    }

    /// World boxes of every instance, for the bounding box debug toggle.
    pub fn log_bounds(&mut self) {
        for (i, instance) in self.instances.iter_mut().enumerate() {
            let aabb = instance.axis_aligned_box();
            info!("instance {}: min {:?} max {:?}", i, aabb.min, aabb.max);
        }
    }
}

/// Movement direction in camera space: x right, y up, z forward.
pub fn camera_motion(input: &InputState) -> Vec3 {
    let keys = &input.keyboard;
    let axis = |positive: &[KeyCode], negative: &[KeyCode]| {
        let pos = positive.iter().any(|k| keys.is_down(*k)) as i32 as f32;
        let neg = negative.iter().any(|k| keys.is_down(*k)) as i32 as f32;
        pos - neg
    };
    Vec3::new(
        axis(&[KeyCode::KeyD, KeyCode::ArrowRight], &[KeyCode::KeyA, KeyCode::ArrowLeft]),
        axis(&[KeyCode::KeyE], &[KeyCode::KeyQ]),
        axis(&[KeyCode::KeyW, KeyCode::ArrowUp], &[KeyCode::KeyS, KeyCode::ArrowDown]),
    )
    .normalize_or_zero()
}

/// Yaw/pitch change for a cursor movement: dragging right turns right, dragging down
/// looks down.
pub fn look_delta(cursor_delta: Vec2) -> Vec2 {
    -cursor_delta * ROTATION_SPEED
}

fn primitive_model(
    device: &wgpu::Device,
    layout: &MaterialLayout,
    name: &str,
    (vertices, indices): (Vec<Vertex>, Vec<u32>),
    properties: MaterialProperties,
) -> Result<Arc<Model>> {
    let part = MeshPart {
        index_start: 0,
        index_count: indices.len() as u32,
        material: 0,
    };
    let mesh = Mesh::upload(device, name, &vertices, &indices, vec![part]);
    let binding = layout.create_binding(device, name, &properties, MaterialTextures::default());
    let material = Material::new(name, properties, binding);
    Ok(Arc::new(Model::new(vec![mesh], vec![material])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyboardState, MouseState, RawKeyboard, RawMouse};

    fn input_with_keys(keys: &[KeyCode]) -> InputState {
        let mut raw = RawKeyboard::default();
        raw.down.extend(keys.iter().copied());
        InputState {
            keyboard: KeyboardState::next(&KeyboardState::default(), &raw),
            mouse: MouseState::next(&MouseState::default(), &RawMouse::default()),
        }
    }

    #[test]
    fn opposing_keys_cancel() {
        let input = input_with_keys(&[KeyCode::KeyW, KeyCode::KeyS]);
        assert_eq!(camera_motion(&input), Vec3::ZERO);
    }

    #[test]
    fn diagonal_motion_is_normalized() {
        let input = input_with_keys(&[KeyCode::KeyW, KeyCode::KeyD]);
        assert!((camera_motion(&input).length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dragging_right_turns_right() {
        let delta = look_delta(Vec2::new(100.0, 0.0));
        assert!((delta.x + 0.2).abs() < 1e-6);
        let mut camera = PerspectiveCamera::default();
        let before = camera.forward();
        camera.rotate(delta);
        assert!(camera.forward().x > before.x);
    }
}
