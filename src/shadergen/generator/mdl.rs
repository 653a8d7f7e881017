//! MDL assembly: one exported material whose parameters are the published
//! inputs and whose body is a `let` block of declarations.

use std::slice;

use anyhow::Result;
use log::warn;

use super::{Emitter, Scope};
use crate::shadergen::context::GenContext;
use crate::shadergen::shader_graph::Classification;
use crate::shadergen::stage::{BlockKind, Brackets, PIXEL_OUTPUTS, PIXEL_STAGE, PUBLIC_UNIFORMS, ShaderPort, ShaderStage};

const IMPORTS: &[&str] = &["df", "math", "state", "tex", "anno", "scene"];

const FINAL_OUTPUT: &str = "finalOutput__";

const COLOR4: &str = "\
struct color4
{
    color rgb = color(0.0);
    float a = 1.0;
};

color4 mk_color4(float v)
{
    return color4(color(v), v);
}

color4 mk_color4(float r, float g, float b, float a)
{
    return color4(color(r, g, b), a);
}

color4 mk_color4(color c, float a)
{
    return color4(c, a);
}

color4 mk_color4(float4 v)
{
    return color4(color(v.x, v.y, v.z), v.w);
}
";

/// Emission color for a non-shader output, so any value can be previewed as
/// a material.
fn emission_color(ty: &str, expr: &str) -> String {
    match ty {
        "color3" => expr.to_string(),
        "float" | "vector3" => format!("color({expr})"),
        "integer" => format!("color(float({expr}))"),
        "boolean" => format!("color({expr} ? 1.0 : 0.0)"),
        "color4" => format!("{expr}.rgb"),
        "vector2" => format!("color({expr}.x, {expr}.y, 0.0)"),
        "vector4" => format!("color({expr}.x, {expr}.y, {expr}.z)"),
        _ => "color(0.0)".to_string(),
    }
}

pub(super) fn generate(name: &str, env: &Emitter, ctx: &mut GenContext) -> Result<Vec<ShaderStage>> {
    let mut shader_name = name.to_string();
    env.syntax.make_valid_name(&mut shader_name);
    let mut stage = ShaderStage::new(PIXEL_STAGE, &shader_name);
    stage.create_block(BlockKind::Uniform, PUBLIC_UNIFORMS, "");
    stage.create_block(BlockKind::Output, PIXEL_OUTPUTS, "");
    {
        let public = stage.block_mut(PUBLIC_UNIFORMS)?;
        for (i, socket) in env.graph.input_sockets.iter().enumerate() {
            public.add(
                ShaderPort::new(socket.ty.clone(), env.socket_var(i))
                    .with_value(socket.value.clone())
                    .with_path(socket.path.clone()),
            );
        }
        let material = env.types.get("material")?;
        stage
            .block_mut(PIXEL_OUTPUTS)?
            .add(ShaderPort::new(material, FINAL_OUTPUT));
    }

    env.create_variables(ctx, slice::from_mut(&mut stage))?;

    stage.add_line("mdl 1.6", true);
    stage.new_line();
    for module in IMPORTS {
        stage.add_line(&format!("import ::{module}::*"), true);
    }
    stage.new_line();
    stage.add_block(COLOR4);
    stage.new_line();

    if env.graph.classification.contains(Classification::TEXTURE) {
        stage.add_function_definition("mx_transform_uv");
        stage.add_line("float2 mx_transform_uv(float2 uv)", false);
        stage.begin_scope(Brackets::Braces);
        if ctx.options.file_texture_vertical_flip {
            stage.add_line("return float2(uv.x, 1.0 - uv.y)", true);
        } else {
            stage.add_line("return uv", true);
        }
        stage.end_scope(false)?;
        stage.new_line();
    }
    env.emit_function_definitions(ctx, &mut stage)?;

    stage.add_line(&format!("export material {shader_name}"), false);
    stage.begin_scope(Brackets::Parens);
    let count = env.graph.input_sockets.len();
    for (i, socket) in env.graph.input_sockets.iter().enumerate() {
        let value = match &socket.value {
            Some(v) => env.syntax.value(&socket.ty, v, true)?,
            None => env.syntax.default_value(&socket.ty, true)?,
        };
        let qualifier = if socket.ty.is_filename() {
            format!("{} ", env.syntax.uniform_qualifier)
        } else {
            String::new()
        };
        let sep = if i + 1 < count { "," } else { "" };
        stage.add_line(
            &format!(
                "{qualifier}{} {} = {value}{sep}",
                env.syntax.type_name(&socket.ty)?,
                env.socket_var(i)
            ),
            false,
        );
    }
    stage.end_scope(false)?;

    stage.add_line("= let", false);
    stage.begin_scope(Brackets::Braces);
    env.emit_scope(&Scope::Global, ctx, &mut stage)?;

    if env.graph.output_sockets.len() > 1 {
        warn!(
            "MDL material '{shader_name}' exposes only its first output; {} ignored",
            env.graph.output_sockets.len() - 1
        );
    }
    let final_expr = match env.graph.output_sockets.first() {
        Some(socket) => {
            let expr = env.graph_output_expr(0)?;
            if socket.ty.is_closure() || env.syntax.type_name(&socket.ty)? == "material" {
                expr
            } else {
                let color = emission_color(&socket.ty.name, &expr);
                format!(
                    "material(surface: material_surface(emission: material_emission(emission: df::diffuse_edf(), intensity: {color} * math::PI)))"
                )
            }
        }
        None => "material()".to_string(),
    };
    stage.add_line(&format!("material {FINAL_OUTPUT} = {final_expr}"), true);
    stage.end_scope(false)?;
    stage.add_line(&format!("in material({FINAL_OUTPUT})"), true);

    Ok(vec![stage])
}

#[cfg(test)]
mod tests {
    use crate::shadergen::node_impl::test_support::{generate, pixel};
    use crate::shadergen::target::Target;

    #[test]
    fn test_exported_material_layout() {
        let shader = generate(
            r#"{
                "inputs": [ { "name": "tex", "type": "filename", "value": "wood.png" } ],
                "nodes": [ { "id": "img", "category": "image", "type": "color3", "interface": { "file": "tex" } } ],
                "outputs": [ { "name": "result", "type": "color3", "from": { "nodeId": "img" } } ]
            }"#,
            Target::Mdl,
        )
        .unwrap();
        let src = shader.source("pixel").unwrap();
        assert!(src.starts_with("mdl 1.6;\n"), "{src}");
        assert!(src.contains("import ::df::*;"), "{src}");
        assert!(src.contains("color4 mk_color4(float v)"), "{src}");
        assert!(src.contains("float2 mx_transform_uv(float2 uv)"), "{src}");
        assert!(src.contains("export material test\n(\n"), "{src}");
        assert!(src.contains("uniform texture_2d tex = texture_2d(\"wood.png\", ::tex::gamma_default)"), "{src}");
        assert!(src.contains("= let\n{\n"), "{src}");
        assert!(src.contains("intensity: img_out * math::PI"), "{src}");
        assert!(src.trim_end().ends_with("in material(finalOutput__);"), "{src}");
    }

    #[test]
    fn test_shader_output_is_used_directly() {
        let src = pixel(
            r#"{
                "nodes": [
                    { "id": "bsdf", "category": "diffuse_bsdf", "type": "BSDF" },
                    { "id": "surf", "category": "surface", "type": "surfaceshader" }
                ],
                "connections": [ { "from": { "nodeId": "bsdf" }, "to": { "nodeId": "surf", "portId": "bsdf" } } ],
                "outputs": [ { "name": "result", "type": "surfaceshader", "from": { "nodeId": "surf" } } ]
            }"#,
            Target::Mdl,
        );
        assert!(src.contains("material finalOutput__ = surf_out;"), "{src}");
    }
}
