//! OSL assembly: a single `surface`/`volume`/`shader` with one parameter per
//! published input and one `output` parameter per graph output.

use std::slice;

use anyhow::Result;

use super::{Emitter, Scope};
use crate::shadergen::context::GenContext;
use crate::shadergen::shader_graph::Classification;
use crate::shadergen::stage::{BlockKind, Brackets, PIXEL_OUTPUTS, PIXEL_STAGE, PUBLIC_UNIFORMS, ShaderPort, ShaderStage};
use crate::shadergen::types::TypeRef;

/// OSL shader parameters cannot be structs. These outputs are written as a
/// `color` through a swizzle.
fn remapped_output(ty: &str) -> Option<&'static str> {
    match ty {
        "color4" => Some("rgb"),
        "vector2" => Some("xy0"),
        "vector4" => Some("xyz"),
        _ => None,
    }
}

pub(super) fn generate(name: &str, env: &Emitter, ctx: &mut GenContext) -> Result<Vec<ShaderStage>> {
    let mut shader_name = name.to_string();
    env.syntax.make_valid_name(&mut shader_name);
    let mut stage = ShaderStage::new(PIXEL_STAGE, &shader_name);
    stage.create_block(BlockKind::Uniform, PUBLIC_UNIFORMS, "");
    stage.create_block(BlockKind::Output, PIXEL_OUTPUTS, "");

    let color3 = env.types.get("color3")?;
    let mut output_types: Vec<TypeRef> = Vec::with_capacity(env.graph.output_sockets.len());
    {
        let public = stage.block_mut(PUBLIC_UNIFORMS)?;
        for (i, socket) in env.graph.input_sockets.iter().enumerate() {
            public.add(
                ShaderPort::new(socket.ty.clone(), env.socket_var(i))
                    .with_value(socket.value.clone())
                    .with_path(socket.path.clone()),
            );
        }
        let outputs = stage.block_mut(PIXEL_OUTPUTS)?;
        for (i, socket) in env.graph.output_sockets.iter().enumerate() {
            let ty = match remapped_output(&socket.ty.name) {
                Some(_) => color3.clone(),
                None => socket.ty.clone(),
            };
            outputs.add(ShaderPort::new(ty.clone(), env.graph_output_var(i)));
            output_types.push(ty);
        }
    }

    env.create_variables(ctx, slice::from_mut(&mut stage))?;

    stage.add_line("#include \"mx_funcs.h\"", false);
    stage.new_line();
    stage.add_line("#define M_FLOAT_EPS 0.000001", false);
    stage.new_line();

    let class = env.graph.classification;
    if class.contains(Classification::TEXTURE) {
        stage.add_function_definition("mx_transform_uv");
        stage.add_line("vector2 mx_transform_uv(vector2 texcoord)", false);
        stage.begin_scope(Brackets::Braces);
        if ctx.options.file_texture_vertical_flip {
            stage.add_line("return vector2(texcoord.x, 1.0 - texcoord.y)", true);
        } else {
            stage.add_line("return texcoord", true);
        }
        stage.end_scope(false)?;
        stage.new_line();
    }
    env.emit_function_definitions(ctx, &mut stage)?;

    let kind = match env.graph.output_sockets.first().map(|s| s.ty.name.as_str()) {
        Some("surfaceshader") | Some("material") => "surface",
        Some("volumeshader") => "volume",
        _ => "shader",
    };
    stage.add_line(&format!("{kind} {shader_name}"), false);
    stage.begin_scope(Brackets::Parens);
    let mut params = Vec::new();
    for i in 0..env.graph.input_sockets.len() {
        let socket = &env.graph.input_sockets[i];
        let value = match &socket.value {
            Some(v) => env.syntax.value(&socket.ty, v, true)?,
            None => env.syntax.default_value(&socket.ty, true)?,
        };
        params.push(format!(
            "{} {} = {value}",
            env.syntax.type_name(&socket.ty)?,
            env.socket_var(i)
        ));
    }
    for (i, ty) in output_types.iter().enumerate() {
        params.push(format!(
            "{} {} = {}",
            env.syntax.output_type_name(ty)?,
            env.graph_output_var(i),
            env.syntax.default_value(ty, true)?
        ));
    }
    let last = params.len().saturating_sub(1);
    for (i, param) in params.iter().enumerate() {
        if i == last {
            stage.add_line(param, false);
        } else {
            stage.add_line(&format!("{param},"), false);
        }
    }
    stage.end_scope(false)?;

    stage.begin_scope(Brackets::Braces);
    if class.contains(Classification::CLOSURE) {
        stage.add_line("closure color null_closure = 0", true);
    }
    env.emit_scope(&Scope::Global, ctx, &mut stage)?;
    for (i, socket) in env.graph.output_sockets.iter().enumerate() {
        let mut expr = env.graph_output_expr(i)?;
        if let Some(channels) = remapped_output(&socket.ty.name) {
            expr = env
                .syntax
                .swizzled_variable(&expr, &socket.ty, channels, &color3)?;
        }
        stage.add_line(&format!("{} = {expr}", env.graph_output_var(i)), true);
    }
    stage.end_scope(false)?;

    Ok(vec![stage])
}

#[cfg(test)]
mod tests {
    use crate::shadergen::node_impl::test_support::{generate, pixel};
    use crate::shadergen::target::Target;

    #[test]
    fn test_parameters_and_outputs() {
        let shader = generate(
            r#"{
                "inputs": [ { "name": "base", "type": "color3", "value": [0.5, 0.25, 1] } ],
                "nodes": [ { "id": "m", "category": "multiply", "type": "color3", "interface": { "in1": "base" },
                             "params": { "in2": [2, 2, 2] } } ],
                "outputs": [ { "name": "result", "type": "color3", "from": { "nodeId": "m" } } ]
            }"#,
            Target::Osl,
        )
        .unwrap();
        let src = shader.source("pixel").unwrap();
        assert!(src.starts_with("#include \"mx_funcs.h\""), "{src}");
        assert!(src.contains("shader test\n(\n"), "{src}");
        assert!(src.contains("    color base = color(0.5, 0.25, 1.0),\n"), "{src}");
        assert!(src.contains("    output color result = color(0.0)\n)"), "{src}");
        assert!(src.contains("    result = m_out;\n"), "{src}");
        let stage = shader.stage("pixel").unwrap();
        assert_eq!(stage.entry_point, "test");
        assert!(stage.uniforms.iter().any(|u| u.name == "base" && u.path == "base"));
    }

    #[test]
    fn test_struct_output_remapped_to_color() {
        let src = pixel(
            r#"{
                "nodes": [ { "id": "c", "category": "constant", "type": "color4", "params": { "value": [1, 0, 0, 1] } } ],
                "outputs": [ { "name": "result", "type": "color4", "from": { "nodeId": "c" } } ]
            }"#,
            Target::Osl,
        );
        assert!(src.contains("output color result = color(0.0)"), "{src}");
        assert!(src.contains("result = color(c_out.rgb[0], c_out.rgb[1], c_out.rgb[2]);"), "{src}");
    }
}
