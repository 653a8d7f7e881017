//! The `light` node: an EDF turned into a `lightshader`. Hardware only.

use anyhow::Result;

use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::{PIXEL_STAGE, ShaderStage, VERTEX_STAGE};

pub(super) fn create_variables(env: &Emitter, stages: &mut [ShaderStage]) -> Result<()> {
    env.hw_connector(stages, "$positionWorld", "positionWorld", "vector3")?;
    env.hw_uniform(stages, PIXEL_STAGE, "$viewPosition", "u_viewPosition", "vector3")
}

pub(super) fn emit(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    if stage.name == VERTEX_STAGE {
        return env.hw_assign_connector(stage, "positionWorld", "$positionWorld = hPositionWorld.xyz");
    }
    let edf = env.input_arg(node, "edf")?.expr;
    let intensity = env.input_arg(node, "intensity")?.expr;
    let exposure = env.input_arg(node, "exposure")?.expr;
    let ty = &env.node(node).outputs[0].ty;
    let value = env.struct_init(
        ty,
        &[
            format!("{edf} * {intensity} * exp2({exposure})"),
            "normalize($positionWorld - $viewPosition)".to_string(),
        ],
    )?;
    env.declare_output(node, 0, Some(&value), stage)
}
