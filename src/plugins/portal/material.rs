use bevy::{
    pbr::{MaterialPipeline, MaterialPipelineKey},
    prelude::*,
    reflect::TypeUuid,
    render::{
        mesh::MeshVertexBufferLayout,
        render_resource::{
            AsBindGroup, RenderPipelineDescriptor, ShaderRef, ShaderType,
            SpecializedMeshPipelineError,
        },
    },
};

use super::pair::PortalId;

/// Rim colors, so both portals of the pair can be told apart.
pub const PORTAL_RIM_COLORS: [Color; 2] = [Color::rgb(1., 0.45, 0.), Color::rgb(0., 0.55, 1.)];
/// Rim width, in quad UV units.
pub const PORTAL_RIM_WIDTH: f32 = 0.03;

#[derive(Debug, Clone, ShaderType, Reflect)]
pub struct PortalRim {
    pub color: Color,
    pub width: f32,
}

/// Portal quad material. The texture is a full screen render of the view through the portal, so
/// it is sampled in screen space; the rim is drawn in quad space.
#[derive(AsBindGroup, Debug, Clone, TypeUuid, Reflect)]
#[uuid = "04901b22-de12-43a9-8e2e-79d333201b93"]
pub struct PortalSurfaceMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub texture: Handle<Image>,
    #[uniform(2)]
    pub rim: PortalRim,
}

impl PortalSurfaceMaterial {
    /// Material showing `texture`, one of the buffers of portal `id`.
    pub fn for_buffer(texture: Handle<Image>, id: PortalId) -> Self {
        PortalSurfaceMaterial {
            texture,
            rim: PortalRim {
                color: PORTAL_RIM_COLORS[id.index()],
                width: PORTAL_RIM_WIDTH,
            },
        }
    }
}

impl Material for PortalSurfaceMaterial {
    fn fragment_shader() -> ShaderRef {
        "shaders/portal_surface.wgsl".into()
    }

    // Portals are seen from both sides when a pass camera sits behind one.
    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayout,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        descriptor.primitive.cull_mode = None;
        Ok(())
    }
}
