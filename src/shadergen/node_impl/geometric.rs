//! Geometric inputs: position, normal, tangent, bitangent, texture
//! coordinates, vertex colors, primvars, time and view direction.
//!
//! On GLSL and MSL the vertex stage writes a connector once and the pixel
//! stage reads it. OSL and MDL read renderer state directly.

use anyhow::{Result, anyhow};

use crate::shadergen::context::GenContext;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::{PIXEL_STAGE, ShaderStage, VERTEX_STAGE};
use crate::shadergen::target::Target;
use crate::shadergen::utils::sanitize_ident;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometricKind {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Texcoord,
    GeomColor,
    GeomPropValue,
    Time,
    Frame,
    ViewDirection,
}

impl GeometricKind {
    pub fn from_category(category: &str) -> Option<Self> {
        Some(match category {
            "position" => Self::Position,
            "normal" => Self::Normal,
            "tangent" => Self::Tangent,
            "bitangent" => Self::Bitangent,
            "texcoord" => Self::Texcoord,
            "geomcolor" => Self::GeomColor,
            "geompropvalue" => Self::GeomPropValue,
            "time" => Self::Time,
            "frame" => Self::Frame,
            "viewdirection" => Self::ViewDirection,
            _ => return None,
        })
    }
}

fn world_space(env: &Emitter, node: NodeId) -> bool {
    !matches!(
        env.node(node).literal("space").and_then(|v| v.as_str()),
        Some("object") | Some("model")
    )
}

fn index(env: &Emitter, node: NodeId) -> i32 {
    env.node(node)
        .literal("index")
        .and_then(|v| v.as_i32())
        .unwrap_or(0)
}

fn geomprop(env: &Emitter, node: NodeId) -> Result<String> {
    let n = env.node(node);
    n.literal("geomprop")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("node '{}' needs a literal 'geomprop' name", n.path))
}

/// Suffix that keeps attributes of different types apart. Texture coordinates
/// keep the plain name for their usual `vector2` form.
fn type_suffix(kind: GeometricKind, env: &Emitter, node: NodeId) -> String {
    let ty = &env.node(node).outputs[0].ty.name;
    match kind {
        GeometricKind::Texcoord if ty == "vector2" => String::new(),
        GeometricKind::Texcoord | GeometricKind::GeomPropValue => format!("_{ty}"),
        _ => String::new(),
    }
}

/// Connector variable a hardware node reads in the pixel stage.
fn connector(kind: GeometricKind, env: &Emitter, node: NodeId) -> Result<Option<String>> {
    let space = if world_space(env, node) { "World" } else { "Object" };
    Ok(Some(match kind {
        GeometricKind::Position => format!("position{space}"),
        GeometricKind::Normal => format!("normal{space}"),
        GeometricKind::Tangent => format!("tangent{space}"),
        GeometricKind::Bitangent => format!("bitangent{space}"),
        GeometricKind::Texcoord => format!("texcoord_{}{}", index(env, node), type_suffix(kind, env, node)),
        GeometricKind::GeomColor => format!("color_{}", index(env, node)),
        GeometricKind::GeomPropValue => format!(
            "geomprop_{}{}",
            sanitize_ident(&geomprop(env, node)?),
            type_suffix(kind, env, node)
        ),
        GeometricKind::ViewDirection => "positionWorld".to_string(),
        GeometricKind::Time | GeometricKind::Frame => return Ok(None),
    }))
}

pub(super) fn create_variables(
    kind: GeometricKind,
    node: NodeId,
    env: &Emitter,
    ctx: &mut GenContext,
    stages: &mut [ShaderStage],
) -> Result<()> {
    if !env.target.is_hw() {
        return Ok(());
    }
    let world = world_space(env, node);
    let out_ty = env.node(node).outputs[0].ty.name.clone();
    match kind {
        GeometricKind::Normal => {
            env.hw_vertex_input(stages, "$inNormal", "i_normal", "vector3")?;
            if world {
                env.hw_uniform(stages, VERTEX_STAGE, "$worldInverseTransposeMatrix", "u_worldInverseTransposeMatrix", "matrix44")?;
            }
        }
        GeometricKind::Tangent => {
            env.hw_vertex_input(stages, "$inTangent", "i_tangent", "vector3")?;
        }
        GeometricKind::Bitangent => {
            if ctx.options.hw_implicit_bitangents {
                env.hw_vertex_input(stages, "$inNormal", "i_normal", "vector3")?;
                env.hw_vertex_input(stages, "$inTangent", "i_tangent", "vector3")?;
                if world {
                    env.hw_uniform(stages, VERTEX_STAGE, "$worldInverseTransposeMatrix", "u_worldInverseTransposeMatrix", "matrix44")?;
                }
            } else {
                env.hw_vertex_input(stages, "$inBitangent", "i_bitangent", "vector3")?;
            }
        }
        GeometricKind::Texcoord => {
            let i = index(env, node);
            let sfx = type_suffix(kind, env, node);
            env.hw_vertex_input(stages, &format!("$inTexcoord_{i}{sfx}"), &format!("i_texcoord_{i}{sfx}"), &out_ty)?;
        }
        GeometricKind::GeomColor => {
            let i = index(env, node);
            env.hw_vertex_input(stages, &format!("$inColor_{i}"), &format!("i_color_{i}"), "color4")?;
        }
        GeometricKind::GeomPropValue => {
            let name = format!("{}{}", sanitize_ident(&geomprop(env, node)?), type_suffix(kind, env, node));
            env.hw_vertex_input(
                stages,
                &format!("$inGeomprop_{name}"),
                &format!("i_geomprop_{name}"),
                &out_ty,
            )?;
        }
        GeometricKind::Time => {
            env.hw_uniform(stages, PIXEL_STAGE, "$time", "u_time", "float")?;
        }
        GeometricKind::Frame => {
            env.hw_uniform(stages, PIXEL_STAGE, "$frame", "u_frame", "float")?;
        }
        GeometricKind::ViewDirection => {
            env.hw_uniform(stages, PIXEL_STAGE, "$viewPosition", "u_viewPosition", "vector3")?;
        }
        GeometricKind::Position => {}
    }

    if let Some(var) = connector(kind, env, node)? {
        let ty = match kind {
            GeometricKind::Texcoord | GeometricKind::GeomPropValue => out_ty.as_str(),
            GeometricKind::GeomColor => "color4",
            _ => "vector3",
        };
        env.hw_connector(stages, &format!("${var}"), &var, ty)?;
    }
    Ok(())
}

pub(super) fn emit(
    kind: GeometricKind,
    node: NodeId,
    env: &Emitter,
    ctx: &mut GenContext,
    stage: &mut ShaderStage,
) -> Result<()> {
    match env.target {
        Target::Glsl | Target::Msl if stage.name == VERTEX_STAGE => emit_vertex(kind, node, env, ctx, stage),
        Target::Glsl | Target::Msl => emit_pixel(kind, node, env, stage),
        Target::Osl => emit_osl(kind, node, env, stage),
        Target::Mdl => emit_mdl(kind, node, env, stage),
    }
}

/// World-space transform of a vertex attribute direction.
fn to_world(env: &Emitter, matrix: &str, attr: &str) -> Result<String> {
    let v4 = env.syntax.type_name(&*env.types.get("vector4")?)?;
    Ok(format!("normalize(({matrix} * {v4}({attr}, 0.0)).xyz)"))
}

fn emit_vertex(
    kind: GeometricKind,
    node: NodeId,
    env: &Emitter,
    ctx: &GenContext,
    stage: &mut ShaderStage,
) -> Result<()> {
    let Some(var) = connector(kind, env, node)? else {
        return Ok(());
    };
    let world = world_space(env, node);
    let normal = || -> Result<String> {
        if world {
            to_world(env, "$worldInverseTransposeMatrix", "$inNormal")
        } else {
            Ok("normalize($inNormal)".to_string())
        }
    };
    let tangent = || -> Result<String> {
        if world {
            to_world(env, "$worldMatrix", "$inTangent")
        } else {
            Ok("normalize($inTangent)".to_string())
        }
    };
    let value = match kind {
        GeometricKind::ViewDirection => "hPositionWorld.xyz".to_string(),
        GeometricKind::Position if world => "hPositionWorld.xyz".to_string(),
        GeometricKind::Position => "$inPosition".to_string(),
        GeometricKind::Normal => normal()?,
        GeometricKind::Tangent => tangent()?,
        GeometricKind::Bitangent if ctx.options.hw_implicit_bitangents => {
            format!("normalize(cross({}, {}))", normal()?, tangent()?)
        }
        GeometricKind::Bitangent if world => to_world(env, "$worldMatrix", "$inBitangent")?,
        GeometricKind::Bitangent => "normalize($inBitangent)".to_string(),
        GeometricKind::Texcoord => format!("$inTexcoord_{}{}", index(env, node), type_suffix(kind, env, node)),
        GeometricKind::GeomColor => format!("$inColor_{}", index(env, node)),
        GeometricKind::GeomPropValue => format!(
            "$inGeomprop_{}{}",
            sanitize_ident(&geomprop(env, node)?),
            type_suffix(kind, env, node)
        ),
        GeometricKind::Time | GeometricKind::Frame => return Ok(()),
    };
    env.hw_assign_connector(stage, &var, &format!("${var} = {value}"))
}

fn emit_pixel(kind: GeometricKind, node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let out_ty = env.node(node).outputs[0].ty.name.as_str();
    let expr = match kind {
        GeometricKind::Time => "$time".to_string(),
        GeometricKind::Frame => "$frame".to_string(),
        GeometricKind::ViewDirection => "normalize($positionWorld - $viewPosition)".to_string(),
        _ => {
            let var = connector(kind, env, node)?.unwrap_or_default();
            match kind {
                GeometricKind::Normal | GeometricKind::Tangent | GeometricKind::Bitangent => {
                    format!("normalize(${var})")
                }
                GeometricKind::GeomColor => match out_ty {
                    "float" => format!("${var}.r"),
                    "color3" => format!("${var}.rgb"),
                    _ => format!("${var}"),
                },
                _ => format!("${var}"),
            }
        }
    };
    env.declare_output(node, 0, Some(&expr), stage)
}

fn emit_osl(kind: GeometricKind, node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let object = |e: &str| {
        if world_space(env, node) {
            e.to_string()
        } else {
            format!("transform(\"object\", {e})")
        }
    };
    let out_ty = env.node(node).outputs[0].ty.name.as_str();
    let expr = match kind {
        GeometricKind::Position => object("P"),
        GeometricKind::Normal => object("N"),
        GeometricKind::Tangent => object("normalize(dPdu)"),
        GeometricKind::Bitangent => object("normalize(dPdv)"),
        GeometricKind::Texcoord if out_ty == "vector3" => "vector(u, v, 0.0)".to_string(),
        GeometricKind::Texcoord => "vector2(u, v)".to_string(),
        GeometricKind::Time => "time".to_string(),
        GeometricKind::ViewDirection => "normalize(I)".to_string(),
        GeometricKind::GeomColor | GeometricKind::GeomPropValue | GeometricKind::Frame => {
            let attribute = match kind {
                GeometricKind::GeomColor => match index(env, node) {
                    0 => "color".to_string(),
                    i => format!("color{i}"),
                },
                GeometricKind::Frame => "frame".to_string(),
                _ => geomprop(env, node)?,
            };
            let init = match env.node(node).input("default") {
                Some(input) => Some(env.argument(input)?.expr),
                None => None,
            };
            env.declare_output(node, 0, init.as_deref(), stage)?;
            let out = env.output_var(node, 0);
            stage.add_line(&format!("getattribute(\"{attribute}\", {out})"), true);
            return Ok(());
        }
    };
    env.declare_output(node, 0, Some(&expr), stage)
}

fn emit_mdl(kind: GeometricKind, node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let coord = if world_space(env, node) {
        "state::coordinate_world"
    } else {
        "state::coordinate_object"
    };
    let out_ty = env.node(node).outputs[0].ty.name.clone();
    let expr = match kind {
        GeometricKind::Position => {
            format!("state::transform_point(state::coordinate_internal, {coord}, state::position())")
        }
        GeometricKind::Normal => {
            format!("state::transform_normal(state::coordinate_internal, {coord}, state::normal())")
        }
        GeometricKind::Tangent => {
            format!("state::transform_vector(state::coordinate_internal, {coord}, state::texture_tangent_u(0))")
        }
        GeometricKind::Bitangent => {
            format!("state::transform_vector(state::coordinate_internal, {coord}, state::texture_tangent_v(0))")
        }
        GeometricKind::Texcoord => {
            let i = index(env, node);
            if out_ty == "vector3" {
                format!("state::texture_coordinate({i})")
            } else {
                format!("float2(state::texture_coordinate({i}).x, state::texture_coordinate({i}).y)")
            }
        }
        GeometricKind::GeomColor => {
            let name = match index(env, node) {
                0 => "color".to_string(),
                i => format!("color{i}"),
            };
            match out_ty.as_str() {
                "float" => format!("scene::data_lookup_float(\"{name}\", 0.0)"),
                "color4" => format!("mk_color4(scene::data_lookup_float4(\"{name}\", float4(0.0)))"),
                _ => format!("scene::data_lookup_color(\"{name}\", color(0.0))"),
            }
        }
        GeometricKind::GeomPropValue => {
            let name = geomprop(env, node)?;
            let fallback = match env.node(node).input("default") {
                Some(input) => env.argument(input)?.expr,
                None => env.syntax.default_value(&env.node(node).outputs[0].ty, false)?,
            };
            match out_ty.as_str() {
                "integer" => format!("scene::data_lookup_int(\"{name}\", {fallback})"),
                "boolean" => format!("scene::data_lookup_int(\"{name}\", {fallback} ? 1 : 0) != 0"),
                "vector2" => format!("scene::data_lookup_float2(\"{name}\", {fallback})"),
                "vector3" => format!("scene::data_lookup_float3(\"{name}\", {fallback})"),
                "vector4" => format!("scene::data_lookup_float4(\"{name}\", {fallback})"),
                "color3" => format!("scene::data_lookup_color(\"{name}\", {fallback})"),
                _ => format!("scene::data_lookup_float(\"{name}\", {fallback})"),
            }
        }
        GeometricKind::Time => "state::animation_time()".to_string(),
        GeometricKind::Frame => "scene::data_lookup_float(\"frame\", 1.0)".to_string(),
        GeometricKind::ViewDirection => "state::direction()".to_string(),
    };
    env.declare_output(node, 0, Some(&expr), stage)
}
