//! GPU-free description of one frame, and the counters gathered while recording it.

use crate::renderer::light_buffer::ChainTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub const ALL: [LightKind; 4] = [
        LightKind::Ambient,
        LightKind::Directional,
        LightKind::Point,
        LightKind::Spot,
    ];

    pub fn index(self) -> usize {
        match self {
            LightKind::Ambient => 0,
            LightKind::Directional => 1,
            LightKind::Point => 2,
            LightKind::Spot => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDraw {
    pub instance: usize,
    pub mesh: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryPlan {
    pub draws: Vec<MeshDraw>,
    pub culled_instances: usize,
    pub culled_meshes: usize,
    /// Instances whose box was wholly inside the frustum, so no mesh was tested.
    pub fully_inside_instances: usize,
}

/// Which entry of a light collection a plan item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightRef {
    pub shadowed: bool,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapPass {
    pub kind: LightKind,
    pub light: LightRef,
    pub slot: usize,
}

/// How a light volume is rasterized relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFacing {
    /// Camera outside: front faces, back-face culling, normal depth test.
    Outside,
    /// Camera inside: back faces, front-face culling, reversed depth test.
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightDraw {
    pub kind: LightKind,
    pub light: LightRef,
    pub shadow_slot: Option<usize>,
    /// `None` for full-screen lights.
    pub volume: Option<VolumeFacing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessStep {
    pub name: &'static str,
    pub source: ChainTarget,
    pub destination: ChainTarget,
    pub additive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePlan {
    pub geometry: GeometryPlan,
    pub shadow_maps: Vec<ShadowMapPass>,
    pub lights: Vec<LightDraw>,
    /// Instances whose boxes are drawn as wireframes; empty unless enabled.
    pub bounding_boxes: Vec<usize>,
    pub post_processes: Vec<PostProcessStep>,
}

impl FramePlan {
    pub fn shadow_map_passes(&self, kind: LightKind) -> usize {
        self.shadow_maps.iter().filter(|p| p.kind == kind).count()
    }

    pub fn light_draws(&self, kind: LightKind) -> usize {
        self.lights.iter().filter(|d| d.kind == kind).count()
    }

    pub fn shadow_maps_of(&self, kind: LightKind) -> Vec<ShadowMapPass> {
        self.shadow_maps
            .iter()
            .filter(|p| p.kind == kind)
            .copied()
            .collect()
    }

    pub fn lights_of(&self, kind: LightKind) -> Vec<LightDraw> {
        self.lights.iter().filter(|d| d.kind == kind).copied().collect()
    }

    /// Shadow map passes grouped per light kind, skipping kinds with none. Recording binds
    /// one shadow render target per pass listed here and nothing else.
    pub fn shadow_map_batches(&self) -> Vec<(LightKind, Vec<ShadowMapPass>)> {
        LightKind::ALL
            .into_iter()
            .map(|kind| (kind, self.shadow_maps_of(kind)))
            .filter(|(_, passes)| !passes.is_empty())
            .collect()
    }

    /// With no post-processes the light buffer is copied straight to the back buffer.
    pub fn needs_present_copy(&self) -> bool {
        self.post_processes.is_empty()
    }
}

/// Source and destination for each of `count` chained stages: the first reads the light
/// buffer, intermediates alternate between the ping-pong targets, the last writes the
/// back buffer.
pub fn chain_targets(count: usize) -> Vec<(ChainTarget, ChainTarget)> {
    let mut source = ChainTarget::LightBuffer;
    (0..count)
        .map(|i| {
            let destination = if i + 1 == count {
                ChainTarget::BackBuffer
            } else {
                ChainTarget::PingPong(i % 2)
            };
            let step = (source, destination);
            source = destination;
            step
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub geometry_draws: u32,
    pub culled_instances: u32,
    pub culled_meshes: u32,
    /// Equals `FramePlan::shadow_map_passes` per kind for the recorded plan.
    pub shadow_target_binds: [u32; 4],
    pub shadow_draws: u32,
    pub light_draws: [u32; 4],
    pub bounding_boxes: u32,
    pub post_process_passes: u32,
}

impl FrameStats {
    pub fn record_shadow_target_bind(&mut self, kind: LightKind) {
        self.shadow_target_binds[kind.index()] += 1;
    }

    pub fn record_light_draw(&mut self, kind: LightKind) {
        self.light_draws[kind.index()] += 1;
    }

    pub fn shadow_target_binds(&self, kind: LightKind) -> u32 {
        self.shadow_target_binds[kind.index()]
    }

    pub fn light_draws(&self, kind: LightKind) -> u32 {
        self.light_draws[kind.index()]
    }

    pub fn total_light_draws(&self) -> u32 {
        self.light_draws.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_stage_reads_light_buffer_writes_back_buffer() {
        assert_eq!(
            chain_targets(1),
            vec![(ChainTarget::LightBuffer, ChainTarget::BackBuffer)]
        );
    }

    #[test]
    fn stages_alternate_ping_pong() {
        let targets = chain_targets(4);
        assert_eq!(targets[0], (ChainTarget::LightBuffer, ChainTarget::PingPong(0)));
        assert_eq!(targets[1], (ChainTarget::PingPong(0), ChainTarget::PingPong(1)));
        assert_eq!(targets[2], (ChainTarget::PingPong(1), ChainTarget::PingPong(0)));
        assert_eq!(targets[3], (ChainTarget::PingPong(0), ChainTarget::BackBuffer));
    }

    #[test]
    fn empty_chain_has_no_steps() {
        assert!(chain_targets(0).is_empty());
    }
}
