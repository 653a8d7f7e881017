//! GLSL and Metal assembly.
//!
//! Both targets split the shader into a vertex stage, which only computes the
//! connectors geometric nodes ask for, and a pixel stage holding the rest of
//! the graph. Node code refers to stage variables through `$tokens`, resolved
//! per target when the stage is finalized.

use anyhow::Result;
use log::warn;

use super::{Emitter, Scope};
use crate::shadergen::context::{GenContext, GenOptions, SpecularEnvironmentMethod};
use crate::shadergen::error::GenError;
use crate::shadergen::shader_graph::Classification;
use crate::shadergen::stage::{
    BlockKind, Brackets, LIGHT_DATA, PIXEL_OUTPUTS, PIXEL_STAGE, PRIVATE_UNIFORMS, PUBLIC_UNIFORMS,
    ShaderPort, ShaderStage, VERTEX_DATA, VERTEX_INPUTS, VERTEX_STAGE, stage_mut,
};
use crate::schema::ImplementationSource;
use crate::shadergen::target::Target;
use crate::shadergen::types::TypeDesc;

/// How a stage variable is reached from code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwRef {
    VertexInput,
    Connector,
    Uniform,
}

const TOKENS: &[(&str, HwRef, &str)] = &[
    ("$inPosition", HwRef::VertexInput, "i_position"),
    ("$inNormal", HwRef::VertexInput, "i_normal"),
    ("$inTangent", HwRef::VertexInput, "i_tangent"),
    ("$inBitangent", HwRef::VertexInput, "i_bitangent"),
    ("$positionWorld", HwRef::Connector, "positionWorld"),
    ("$positionObject", HwRef::Connector, "positionObject"),
    ("$normalWorld", HwRef::Connector, "normalWorld"),
    ("$normalObject", HwRef::Connector, "normalObject"),
    ("$tangentWorld", HwRef::Connector, "tangentWorld"),
    ("$tangentObject", HwRef::Connector, "tangentObject"),
    ("$bitangentWorld", HwRef::Connector, "bitangentWorld"),
    ("$bitangentObject", HwRef::Connector, "bitangentObject"),
    ("$worldMatrix", HwRef::Uniform, "u_worldMatrix"),
    ("$worldInverseTransposeMatrix", HwRef::Uniform, "u_worldInverseTransposeMatrix"),
    ("$viewProjectionMatrix", HwRef::Uniform, "u_viewProjectionMatrix"),
    ("$viewPosition", HwRef::Uniform, "u_viewPosition"),
    ("$time", HwRef::Uniform, "u_time"),
    ("$frame", HwRef::Uniform, "u_frame"),
    ("$numActiveLightSources", HwRef::Uniform, "u_numActiveLightSources"),
    ("$lightData", HwRef::Uniform, "u_lightData"),
    ("$udimScaleAndOffset", HwRef::Uniform, "u_udimScaleAndOffset"),
    ("$envMatrix", HwRef::Uniform, "u_envMatrix"),
    ("$envRadiance", HwRef::Uniform, "u_envRadiance"),
    ("$envRadianceMips", HwRef::Uniform, "u_envRadianceMips"),
    ("$envRadianceSamples", HwRef::Uniform, "u_envRadianceSamples"),
    ("$envIrradiance", HwRef::Uniform, "u_envIrradiance"),
    ("$shadowMap", HwRef::Uniform, "u_shadowMap"),
    ("$shadowMatrix", HwRef::Uniform, "u_shadowMatrix"),
    ("$ambOcclMap", HwRef::Uniform, "u_ambOcclMap"),
    ("$ambOcclGain", HwRef::Uniform, "u_ambOcclGain"),
];

impl Emitter<'_> {
    /// Expression reaching `var` from node code on this target.
    pub fn hw_ref(&self, kind: HwRef, var: &str) -> String {
        match (self.target, kind) {
            (Target::Msl, HwRef::VertexInput) => format!("i_vs.{var}"),
            (Target::Msl, HwRef::Connector) => format!("vd.{var}"),
            _ => var.to_string(),
        }
    }

    /// Declare a vertex attribute reachable as `token` in the vertex stage.
    pub fn hw_vertex_input(&self, stages: &mut [ShaderStage], token: &str, var: &str, ty: &str) -> Result<()> {
        let ty = self.types.get(ty)?;
        let vs = stage_mut(stages, VERTEX_STAGE)?;
        vs.block_mut(VERTEX_INPUTS)?.add(ShaderPort::new(ty, var));
        vs.add_token(token, &self.hw_ref(HwRef::VertexInput, var));
        Ok(())
    }

    /// Declare a vertex-to-pixel connector reachable as `token` in both stages.
    pub fn hw_connector(&self, stages: &mut [ShaderStage], token: &str, var: &str, ty: &str) -> Result<()> {
        let ty = self.types.get(ty)?;
        for stage in stages.iter_mut() {
            stage.block_mut(VERTEX_DATA)?.add(ShaderPort::new(ty.clone(), var));
            stage.add_token(token, &self.hw_ref(HwRef::Connector, var));
        }
        Ok(())
    }

    /// Declare a generator-owned uniform in one stage.
    pub fn hw_uniform(
        &self,
        stages: &mut [ShaderStage],
        stage: &str,
        token: &str,
        var: &str,
        ty: &str,
    ) -> Result<()> {
        let ty = self.types.get(ty)?;
        let st = stage_mut(stages, stage)?;
        st.block_mut(PRIVATE_UNIFORMS)?.add(ShaderPort::new(ty, var));
        st.add_token(token, &self.hw_ref(HwRef::Uniform, var));
        Ok(())
    }

    /// Write `assignment` for the connector `var` in the vertex stage, once.
    pub fn hw_assign_connector(&self, stage: &mut ShaderStage, var: &str, assignment: &str) -> Result<()> {
        let port = stage
            .block_mut(VERTEX_DATA)?
            .get_mut(var)
            .ok_or_else(|| anyhow::anyhow!("connector '{var}' was not declared"))?;
        if port.emitted {
            return Ok(());
        }
        port.emitted = true;
        stage.add_line(assignment, true);
        Ok(())
    }

    fn type_of(&self, name: &str) -> Result<String> {
        Ok(self.syntax.type_name(&*self.types.get(name)?)?.to_string())
    }
}

pub(super) fn generate(_name: &str, env: &Emitter, ctx: &mut GenContext) -> Result<Vec<ShaderStage>> {
    let opts = ctx.options.clone();
    let msl = env.target == Target::Msl;
    let (vs_entry, ps_entry) = if msl {
        ("VertexMain", "FragmentMain")
    } else {
        ("main", "main")
    };

    let mut vs = ShaderStage::new(VERTEX_STAGE, vs_entry);
    let mut ps = ShaderStage::new(PIXEL_STAGE, ps_entry);
    for stage in [&mut vs, &mut ps] {
        stage.create_block(BlockKind::Uniform, PRIVATE_UNIFORMS, "u_prv");
        stage.create_block(BlockKind::Uniform, PUBLIC_UNIFORMS, "u_pub");
        for (token, kind, var) in TOKENS {
            stage.add_token(token, &env.hw_ref(*kind, var));
        }
    }
    vs.create_block(BlockKind::Input, VERTEX_INPUTS, "i_vs");
    vs.create_block(BlockKind::Output, VERTEX_DATA, "vd");
    ps.create_block(BlockKind::Input, VERTEX_DATA, "vd");
    ps.create_block(BlockKind::Output, PIXEL_OUTPUTS, if msl { "po" } else { "" });
    let mut stages = vec![vs, ps];

    env.hw_vertex_input(&mut stages, "$inPosition", "i_position", "vector3")?;
    env.hw_uniform(&mut stages, VERTEX_STAGE, "$worldMatrix", "u_worldMatrix", "matrix44")?;
    env.hw_uniform(&mut stages, VERTEX_STAGE, "$viewProjectionMatrix", "u_viewProjectionMatrix", "matrix44")?;
    if opts.texture_space_render {
        env.hw_vertex_input(&mut stages, "$inTexcoord_0", "i_texcoord_0", "vector2")?;
    }

    {
        let ps = stage_mut(&mut stages, PIXEL_STAGE)?;
        let public = ps.block_mut(PUBLIC_UNIFORMS)?;
        for (i, socket) in env.graph.input_sockets.iter().enumerate() {
            public.add(
                ShaderPort::new(socket.ty.clone(), env.socket_var(i))
                    .with_value(socket.value.clone())
                    .with_path(socket.path.clone()),
            );
        }
        let v4 = env.types.get("vector4")?;
        let outputs = ps.block_mut(PIXEL_OUTPUTS)?;
        for i in 0..env.graph.output_sockets.len() {
            outputs.add(ShaderPort::new(v4.clone(), env.graph_output_var(i)));
        }
    }

    let class = env.graph.classification;
    let lit = class.contains(Classification::SURFACE);
    if lit {
        let px = PIXEL_STAGE;
        env.hw_uniform(&mut stages, px, "$numActiveLightSources", "u_numActiveLightSources", "integer")?;
        if opts.hw_specular_environment_method != SpecularEnvironmentMethod::None {
            env.hw_uniform(&mut stages, px, "$envMatrix", "u_envMatrix", "matrix44")?;
            env.hw_uniform(&mut stages, px, "$envRadiance", "u_envRadiance", "filename")?;
            env.hw_uniform(&mut stages, px, "$envRadianceMips", "u_envRadianceMips", "integer")?;
            env.hw_uniform(&mut stages, px, "$envIrradiance", "u_envIrradiance", "filename")?;
            if opts.hw_specular_environment_method == SpecularEnvironmentMethod::Fis {
                env.hw_uniform(&mut stages, px, "$envRadianceSamples", "u_envRadianceSamples", "integer")?;
            }
        }
        if opts.hw_shadow_map {
            env.hw_uniform(&mut stages, px, "$shadowMap", "u_shadowMap", "filename")?;
            env.hw_uniform(&mut stages, px, "$shadowMatrix", "u_shadowMatrix", "matrix44")?;
        }
        if opts.hw_ambient_occlusion {
            env.hw_uniform(&mut stages, px, "$ambOcclMap", "u_ambOcclMap", "filename")?;
            env.hw_uniform(&mut stages, px, "$ambOcclGain", "u_ambOcclGain", "float")?;
        }
    }
    let udim = class.contains(Classification::TEXTURE) && opts.hw_normalize_udim_tex_coords;
    let udim = if udim && msl {
        warn!("UDIM texture coordinate normalization is not supported on {}; ignored", env.target);
        false
    } else {
        udim
    };
    if udim {
        env.hw_uniform(&mut stages, PIXEL_STAGE, "$udimScaleAndOffset", "u_udimScaleAndOffset", "vector4")?;
    }

    env.create_variables(ctx, &mut stages)?;

    let mut binding = 0u32;
    let (vs, ps) = stages.split_at_mut(1);
    emit_vertex(env, ctx, &mut vs[0], &opts, &mut binding)?;
    emit_pixel(env, ctx, &mut ps[0], &opts, &mut binding, lit, udim)?;
    Ok(stages)
}

fn emit_header(env: &Emitter, stage: &mut ShaderStage) {
    match env.target {
        Target::Msl => {
            stage.add_line("#include <metal_stdlib>", false);
            stage.add_line("#include <simd/simd.h>", false);
            stage.new_line();
            stage.add_line("using namespace metal", true);
        }
        _ => stage.add_line("#version 450", false),
    }
    stage.new_line();
}

fn ports(stage: &ShaderStage, block: &str) -> Vec<ShaderPort> {
    stage
        .block(block)
        .map(|b| b.iter().cloned().collect())
        .unwrap_or_default()
}

fn member(env: &Emitter, port: &ShaderPort) -> Result<String> {
    let ty = env.syntax.type_name(&port.ty)?;
    Ok(format!("{ty} {}", port.variable))
}

/// GLSL: std140 blocks plus separate samplers. Metal: plain structs, bound
/// later as entry point buffers.
fn emit_uniform_blocks(env: &Emitter, stage: &mut ShaderStage, binding: &mut u32) -> Result<()> {
    for block in [PRIVATE_UNIFORMS, PUBLIC_UNIFORMS] {
        let all = ports(stage, block);
        let (textures, values): (Vec<_>, Vec<_>) = all.into_iter().partition(|p| p.ty.is_filename());
        if !values.is_empty() {
            let name = format!("{block}_{}", stage.name);
            match env.target {
                Target::Msl => stage.add_line(&format!("struct {name}"), false),
                _ => {
                    stage.add_line(&format!("layout (std140, binding = {binding}) uniform {name}"), false);
                    *binding += 1;
                }
            }
            stage.begin_scope(Brackets::Braces);
            for port in &values {
                stage.add_line(&member(env, port)?, true);
            }
            stage.end_scope(true)?;
            stage.new_line();
        }
        if env.target != Target::Msl {
            for port in &textures {
                stage.add_line(
                    &format!("layout (binding = {binding}) uniform sampler2D {}", port.variable),
                    true,
                );
                *binding += 1;
            }
            if !textures.is_empty() {
                stage.new_line();
            }
        }
    }
    Ok(())
}

/// Metal entry point parameters and the local copies of every uniform.
fn msl_entry_params(env: &Emitter, stage: &ShaderStage, lit: bool) -> Result<(Vec<String>, Vec<String>)> {
    let mut params = Vec::new();
    let mut locals = Vec::new();
    let mut buffer = 0;
    let mut texture = 0;
    for block in [PRIVATE_UNIFORMS, PUBLIC_UNIFORMS] {
        let Some(b) = stage.block(block) else {
            continue;
        };
        let instance = b.instance.clone();
        let mut has_values = false;
        for port in b.iter() {
            if port.ty.is_filename() {
                let v = &port.variable;
                params.push(format!("texture2d<float> {v}_tex [[texture({texture})]]"));
                params.push(format!("sampler {v}_sampler [[sampler({texture})]]"));
                locals.push(format!("MetalTexture {v} = {{{v}_tex, {v}_sampler}}"));
                texture += 1;
            } else {
                has_values = true;
                locals.push(format!("{} = {instance}.{}", member(env, port)?, port.variable));
            }
        }
        if has_values {
            params.push(format!(
                "constant {block}_{}& {instance} [[buffer({buffer})]]",
                stage.name
            ));
            buffer += 1;
        }
    }
    if lit {
        params.push(format!("constant {LIGHT_DATA}* u_lightData [[buffer({buffer})]]"));
    }
    Ok((params, locals))
}

fn emit_vertex(
    env: &Emitter,
    ctx: &mut GenContext,
    stage: &mut ShaderStage,
    opts: &GenOptions,
    binding: &mut u32,
) -> Result<()> {
    emit_header(env, stage);
    emit_uniform_blocks(env, stage, binding)?;

    let inputs = ports(stage, VERTEX_INPUTS);
    let connectors = ports(stage, VERTEX_DATA);
    if env.target == Target::Msl {
        stage.add_line("struct VertexInputs", false);
        stage.begin_scope(Brackets::Braces);
        for (i, port) in inputs.iter().enumerate() {
            stage.add_line(&format!("{} [[attribute({i})]]", member(env, port)?), true);
        }
        stage.end_scope(true)?;
        stage.new_line();
        emit_msl_vertex_data(env, stage, &connectors)?;
    } else {
        for (i, port) in inputs.iter().enumerate() {
            stage.add_line(&format!("layout (location = {i}) in {}", member(env, port)?), true);
        }
        stage.new_line();
        for (i, port) in connectors.iter().enumerate() {
            stage.add_line(&format!("layout (location = {i}) out {}", member(env, port)?), true);
        }
        stage.new_line();
    }

    let v4 = env.type_of("vector4")?;
    let position = if env.target == Target::Msl {
        let (params, locals) = msl_entry_params(env, stage, false)?;
        let mut all = vec!["VertexInputs i_vs [[stage_in]]".to_string()];
        all.extend(params);
        stage.add_line(&format!("vertex VertexData {}({})", stage.function_name, all.join(", ")), false);
        stage.begin_scope(Brackets::Braces);
        for local in &locals {
            stage.add_line(local, true);
        }
        stage.add_line("VertexData vd", true);
        "vd.pos"
    } else {
        stage.add_line("void main()", false);
        stage.begin_scope(Brackets::Braces);
        "gl_Position"
    };
    stage.add_line(&format!("{v4} hPositionWorld = $worldMatrix * {v4}($inPosition, 1.0)"), true);
    if opts.texture_space_render {
        stage.add_line(&format!("{position} = {v4}($inTexcoord_0 * 2.0 - 1.0, 0.0, 1.0)"), true);
    } else {
        stage.add_line(&format!("{position} = $viewProjectionMatrix * hPositionWorld"), true);
    }
    env.emit_classified(Classification::GEOMETRIC | Classification::LIGHT, ctx, stage)?;
    if env.target == Target::Msl {
        stage.add_line("return vd", true);
    }
    stage.end_scope(false)
}

fn emit_msl_vertex_data(env: &Emitter, stage: &mut ShaderStage, connectors: &[ShaderPort]) -> Result<()> {
    stage.add_line("struct VertexData", false);
    stage.begin_scope(Brackets::Braces);
    stage.add_line("float4 pos [[position]]", true);
    for port in connectors {
        stage.add_line(&member(env, port)?, true);
    }
    stage.end_scope(true)?;
    stage.new_line();
    Ok(())
}

fn emit_pixel(
    env: &Emitter,
    ctx: &mut GenContext,
    stage: &mut ShaderStage,
    opts: &GenOptions,
    binding: &mut u32,
    lit: bool,
    udim: bool,
) -> Result<()> {
    let msl = env.target == Target::Msl;
    emit_header(env, stage);
    for def in env.syntax.type_definitions() {
        stage.add_line(&def, false);
    }
    stage.new_line();

    if lit {
        let v3 = env.type_of("vector3")?;
        stage.add_line(&format!("#define MAX_LIGHT_SOURCES {}", opts.hw_max_active_light_sources.max(1)), false);
        stage.new_line();
        stage.add_line(&format!("struct {LIGHT_DATA}"), false);
        stage.begin_scope(Brackets::Braces);
        stage.add_line("int type", true);
        stage.add_line(&format!("{v3} position"), true);
        stage.add_line(&format!("{v3} direction"), true);
        stage.add_line(&format!("{v3} color"), true);
        stage.add_line("float intensity", true);
        stage.end_scope(true)?;
        stage.new_line();
    }

    emit_uniform_blocks(env, stage, binding)?;
    if lit && !msl {
        stage.add_line(&format!("layout (std140, binding = {binding}) uniform {LIGHT_DATA}_{}", stage.name), false);
        *binding += 1;
        stage.begin_scope(Brackets::Braces);
        stage.add_line(&format!("{LIGHT_DATA} u_lightData[MAX_LIGHT_SOURCES]"), true);
        stage.end_scope(true)?;
        stage.new_line();
    }

    let connectors = ports(stage, VERTEX_DATA);
    let outputs = ports(stage, PIXEL_OUTPUTS);
    if msl {
        emit_msl_vertex_data(env, stage, &connectors)?;
        stage.add_line("struct PixelOutputs", false);
        stage.begin_scope(Brackets::Braces);
        for (i, port) in outputs.iter().enumerate() {
            stage.add_line(&format!("{} [[color({i})]]", member(env, port)?), true);
        }
        stage.end_scope(true)?;
        stage.new_line();
    } else {
        for (i, port) in connectors.iter().enumerate() {
            stage.add_line(&format!("layout (location = {i}) in {}", member(env, port)?), true);
        }
        if !connectors.is_empty() {
            stage.new_line();
        }
        for (i, port) in outputs.iter().enumerate() {
            stage.add_line(&format!("layout (location = {i}) out {}", member(env, port)?), true);
        }
        stage.new_line();
    }

    if env.graph.classification.contains(Classification::TEXTURE) {
        emit_transform_uv(env, stage, opts, udim)?;
    }
    if lit {
        emit_light_functions(env, ctx, stage)?;
    }
    if opts.hw_srgb_encode_output {
        emit_srgb_encode(env, stage)?;
    }
    if opts.hw_write_depth_moments {
        emit_depth_moments(env, stage)?;
    }
    env.emit_function_definitions(ctx, stage)?;

    if msl {
        let (params, locals) = msl_entry_params(env, stage, lit)?;
        let mut all = vec!["VertexData vd [[stage_in]]".to_string()];
        all.extend(params);
        stage.add_line(&format!("fragment PixelOutputs {}({})", stage.function_name, all.join(", ")), false);
        stage.begin_scope(Brackets::Braces);
        for local in &locals {
            stage.add_line(local, true);
        }
        stage.add_line("PixelOutputs po", true);
    } else {
        stage.add_line("void main()", false);
        stage.begin_scope(Brackets::Braces);
    }

    env.emit_scope(&Scope::Global, ctx, stage)?;

    let v4 = env.type_of("vector4")?;
    for (i, socket) in env.graph.output_sockets.iter().enumerate() {
        let var = env.graph_output_var(i);
        let target = if msl { format!("po.{var}") } else { var.to_string() };
        if opts.hw_write_depth_moments {
            let z = if msl { "vd.pos.z" } else { "gl_FragCoord.z" };
            stage.add_line(&format!("{target} = {v4}(mx_compute_depth_moments({z}), 0.0, 1.0)"), true);
            continue;
        }
        let expr = env.graph_output_expr(i)?;
        stage.add_line(&format!("{target} = {}", to_vec4(env, &socket.ty, &expr, opts)?), true);
        if opts.hw_srgb_encode_output {
            stage.add_line(
                &format!("{target} = {v4}(mx_srgb_encode({target}.rgb), {target}.a)"),
                true,
            );
        }
    }
    if msl {
        stage.add_line("return po", true);
    }
    stage.end_scope(false)
}

/// Widen an output value to the `vec4` written to the render target.
fn to_vec4(env: &Emitter, ty: &TypeDesc, expr: &str, opts: &GenOptions) -> Result<String> {
    let v3 = env.type_of("vector3")?;
    let v4 = env.type_of("vector4")?;
    Ok(match ty.name.as_str() {
        "float" => format!("{v4}({expr}, {expr}, {expr}, 1.0)"),
        "integer" | "boolean" => format!("{v4}({v3}(float({expr})), 1.0)"),
        "vector2" => format!("{v4}({expr}, 0.0, 1.0)"),
        "color3" | "vector3" | "EDF" => format!("{v4}({expr}, 1.0)"),
        "color4" | "vector4" => expr.to_string(),
        "BSDF" => format!("{v4}({expr}.response, 1.0)"),
        "surfaceshader" | "material" => {
            let alpha = if opts.hw_transparency {
                format!("clamp(1.0 - dot({expr}.transparency, {v3}(0.3333)), 0.0, 1.0)")
            } else {
                "1.0".to_string()
            };
            format!("{v4}({expr}.color, {alpha})")
        }
        _ => format!("{v4}(0.0, 0.0, 0.0, 1.0)"),
    })
}

fn emit_transform_uv(env: &Emitter, stage: &mut ShaderStage, opts: &GenOptions, udim: bool) -> Result<()> {
    if !stage.add_function_definition("mx_transform_uv") {
        return Ok(());
    }
    let v2 = env.type_of("vector2")?;
    stage.add_line(&format!("{v2} mx_transform_uv({v2} uv)"), false);
    stage.begin_scope(Brackets::Braces);
    stage.add_line(&format!("{v2} res = uv"), true);
    if udim {
        stage.add_line("res = res * $udimScaleAndOffset.xy + $udimScaleAndOffset.zw", true);
    }
    if opts.file_texture_vertical_flip {
        stage.add_line("res.y = 1.0 - res.y", true);
    }
    stage.add_line("return res", true);
    stage.end_scope(false)?;
    stage.new_line();
    Ok(())
}

/// Bound light functions and the `sampleLightSource` dispatcher.
fn emit_light_functions(env: &Emitter, ctx: &GenContext, stage: &mut ShaderStage) -> Result<()> {
    let bound = ctx.bound_light_shaders().to_vec();
    let mut calls = Vec::with_capacity(bound.len());
    for (type_id, nodedef) in &bound {
        let def = env.nodedef(nodedef)?;
        let Some(ImplementationSource::Function { name, source }) =
            env.library.implementation(def, env.target).map(|i| &i.source)
        else {
            return Err(GenError::MissingImplementation {
                node: format!("<light {type_id}>"),
                nodedef: nodedef.clone(),
                target: env.target.to_string(),
            }
            .into());
        };
        if stage.add_function_definition(name) {
            stage.add_block(source);
            stage.new_line();
        }
        calls.push((*type_id, name.clone()));
    }

    let v3 = env.type_of("vector3")?;
    let out = env.syntax.output_type_name(&*env.types.get("lightshader")?)?;
    stage.add_line(
        &format!("void sampleLightSource({LIGHT_DATA} light, {v3} position, {out} result)"),
        false,
    );
    stage.begin_scope(Brackets::Braces);
    stage.add_line(&format!("result.intensity = {v3}(0.0)"), true);
    stage.add_line(&format!("result.direction = {v3}(0.0)"), true);
    for (i, (type_id, name)) in calls.iter().enumerate() {
        let head = if i == 0 { "if" } else { "else if" };
        stage.add_line(&format!("{head} (light.type == {type_id})"), false);
        stage.begin_scope(Brackets::Braces);
        stage.add_line(&format!("{name}(light, position, result)"), true);
        stage.end_scope(false)?;
    }
    stage.end_scope(false)?;
    stage.new_line();
    Ok(())
}

fn emit_srgb_encode(env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let v3 = env.type_of("vector3")?;
    stage.add_line(&format!("{v3} mx_srgb_encode({v3} color)"), false);
    stage.begin_scope(Brackets::Braces);
    stage.add_line(&format!("{v3} isAbove = step({v3}(0.0031308), color)"), true);
    stage.add_line(&format!("{v3} linSeg = color * 12.92"), true);
    stage.add_line(
        &format!("{v3} powSeg = 1.055 * pow(max(color, {v3}(0.0)), {v3}(1.0 / 2.4)) - 0.055"),
        true,
    );
    stage.add_line("return mix(linSeg, powSeg, isAbove)", true);
    stage.end_scope(false)?;
    stage.new_line();
    Ok(())
}

fn emit_depth_moments(env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let v2 = env.type_of("vector2")?;
    stage.add_line(&format!("{v2} mx_compute_depth_moments(float z)"), false);
    stage.begin_scope(Brackets::Braces);
    stage.add_line("float depth = clamp(z, 0.0, 1.0)", true);
    stage.add_line(&format!("return {v2}(depth, depth * depth)"), true);
    stage.end_scope(false)?;
    stage.new_line();
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::dsl::parse_document;
    use crate::shadergen::context::{GenContext, GenOptions};
    use crate::shadergen::generator::ShaderGenerator;
    use crate::shadergen::target::Target;

    const SURFACE: &str = r#"{
        "nodes": [
            { "id": "bsdf", "category": "diffuse_bsdf", "type": "BSDF", "params": { "color": [0.8, 0.2, 0.2] } },
            { "id": "surf", "category": "surface", "type": "surfaceshader" }
        ],
        "connections": [ { "from": { "nodeId": "bsdf" }, "to": { "nodeId": "surf", "portId": "bsdf" } } ],
        "outputs": [ { "name": "shader", "type": "surfaceshader", "from": { "nodeId": "surf" } } ]
    }"#;

    fn run(target: Target, options: GenOptions, lights: bool) -> crate::shadergen::shader::Shader {
        let doc = parse_document(SURFACE).unwrap();
        let generator = ShaderGenerator::new(target).unwrap();
        let mut ctx = GenContext::new(options);
        if lights {
            ctx.bind_light_shader(1, "point_light");
            ctx.bind_light_shader(2, "directional_light");
        }
        generator.generate("lit", &doc, &mut ctx).unwrap()
    }

    #[test]
    fn test_glsl_surface_has_light_loop() {
        let shader = run(Target::Glsl, GenOptions::default(), true);
        let ps = shader.source("pixel").unwrap();
        assert!(ps.starts_with("#version 450"));
        assert!(ps.contains("#define MAX_LIGHT_SOURCES 3"));
        assert!(ps.contains("LightData u_lightData[MAX_LIGHT_SOURCES];"));
        assert!(ps.contains("if (light.type == 1)"));
        assert!(ps.contains("mx_directional_light(light, position, result);"));
        assert!(!ps.contains('$'), "unresolved token in:\n{ps}");

        let vs = shader.source("vertex").unwrap();
        assert!(vs.contains("gl_Position = u_viewProjectionMatrix * hPositionWorld;"));
        assert!(vs.contains("positionWorld = hPositionWorld.xyz;"));
        assert!(vs.contains("normalWorld = normalize((u_worldInverseTransposeMatrix * vec4(i_normal, 0.0)).xyz);"));
        assert!(!vs.contains('$'), "unresolved token in:\n{vs}");
    }

    #[test]
    fn test_transparency_drives_alpha() {
        let opaque = run(Target::Glsl, GenOptions::default(), false);
        assert!(opaque.source("pixel").unwrap().contains("shader = vec4(surf_out.color, 1.0);"));
        let transparent = run(
            Target::Glsl,
            GenOptions {
                hw_transparency: true,
                ..GenOptions::default()
            },
            false,
        );
        assert!(transparent
            .source("pixel")
            .unwrap()
            .contains("clamp(1.0 - dot(surf_out.transparency, vec3(0.3333)), 0.0, 1.0)"));
    }

    #[test]
    fn test_msl_entry_points_copy_uniforms() {
        let shader = run(Target::Msl, GenOptions::default(), true);
        let ps = shader.source("pixel").unwrap();
        assert!(ps.contains("fragment PixelOutputs FragmentMain(VertexData vd [[stage_in]]"), "{ps}");
        assert!(ps.contains("constant LightData* u_lightData"), "{ps}");
        assert!(ps.contains("int u_numActiveLightSources = u_prv.u_numActiveLightSources;"), "{ps}");
        assert!(ps.contains("float3 positionWorld;"), "{ps}");
        let vs = shader.source("vertex").unwrap();
        assert!(vs.contains("vd.positionWorld = hPositionWorld.xyz;"), "{vs}");
        assert!(vs.contains("float3 i_position [[attribute(0)]];"), "{vs}");
        assert!(vs.contains("return vd;"), "{vs}");
    }

    #[test]
    fn test_depth_moments_replace_color() {
        let shader = run(
            Target::Glsl,
            GenOptions {
                hw_write_depth_moments: true,
                ..GenOptions::default()
            },
            false,
        );
        let ps = shader.source("pixel").unwrap();
        assert!(ps.contains("vec4(mx_compute_depth_moments(gl_FragCoord.z), 0.0, 1.0)"), "{ps}");
    }

    #[test]
    fn test_texture_space_render_positions_from_uv() {
        let shader = run(
            Target::Glsl,
            GenOptions {
                texture_space_render: true,
                ..GenOptions::default()
            },
            false,
        );
        let vs = shader.source("vertex").unwrap();
        assert!(vs.contains("gl_Position = vec4(i_texcoord_0 * 2.0 - 1.0, 0.0, 1.0);"), "{vs}");
    }
}
