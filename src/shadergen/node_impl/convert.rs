//! Channel plumbing: swizzle, extract, convert, combine and separate.
//!
//! These are written from the type tables rather than library source, so one
//! implementation serves every type pair.

use anyhow::{Result, anyhow};

use crate::shadergen::error::GenError;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::ShaderStage;

fn static_str<'a>(env: &'a Emitter, node: NodeId, name: &str) -> Result<&'a str> {
    let n = env.node(node);
    n.literal(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("node '{}' needs a literal string for '{name}'", n.path))
}

pub(super) fn emit_swizzle(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let input = env.input_arg(node, "in")?;
    let channels = static_str(env, node, "channels")?;
    let out_ty = &env.node(node).outputs[0].ty;
    let expr = if channels.is_empty() && input.ty == *out_ty {
        input.expr
    } else {
        env.syntax
            .swizzled_variable(&input.expr, &input.ty, channels, out_ty)?
    };
    env.declare_output(node, 0, Some(&expr), stage)
}

pub(super) fn emit_extract(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let n = env.node(node);
    let input = env.input_arg(node, "in")?;
    let index = n
        .literal("index")
        .and_then(|v| v.as_i32())
        .ok_or_else(|| anyhow!("node '{}' needs a literal integer for 'index'", n.path))?;
    let index = usize::try_from(index)
        .ok()
        .filter(|&i| i < input.ty.size.max(1))
        .ok_or_else(|| anyhow!("extract index {index} is out of range for {}", input.ty.name))?;
    let expr = env.syntax.member(&input.expr, &input.ty, index)?;
    env.declare_output(node, 0, Some(&expr), stage)
}

pub(super) fn emit_convert(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let input = env.input_arg(node, "in")?;
    let out_ty = &env.node(node).outputs[0].ty;
    let expr = if input.ty == *out_ty {
        input.expr
    } else {
        let conv = env
            .types
            .conversion(&input.ty, out_ty)
            .ok_or_else(|| GenError::InvalidConversion {
                from: input.ty.name.clone(),
                to: out_ty.name.clone(),
            })?;
        env.syntax.convert(conv, &input.ty, out_ty, &input.expr)?
    };
    env.declare_output(node, 0, Some(&expr), stage)
}

pub(super) fn emit_combine(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let n = env.node(node);
    let mut comps = Vec::with_capacity(n.inputs.len());
    for input in &n.inputs {
        comps.push(env.argument(input)?.expr);
    }
    let expr = env.syntax.construct(&n.outputs[0].ty, &comps)?;
    env.declare_output(node, 0, Some(&expr), stage)
}

pub(super) fn emit_separate(node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let n = env.node(node);
    let input = env.input_arg(node, "in")?;
    for i in 0..n.outputs.len() {
        let expr = env.syntax.member(&input.expr, &input.ty, i)?;
        env.declare_output(node, i, Some(&expr), stage)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::shadergen::node_impl::test_support::pixel;
    use crate::shadergen::target::Target;

    const SEPARATE: &str = r#"{
        "inputs": [ { "name": "c", "type": "color3", "value": [0.1, 0.2, 0.3] } ],
        "nodes": [
            { "id": "sep", "category": "separate3", "type": "multioutput", "nodedef": "separate3_color3",
              "interface": { "in": "c" } },
            { "id": "comb", "category": "combine3", "type": "vector3" }
        ],
        "connections": [
            { "from": { "nodeId": "sep", "portId": "outb" }, "to": { "nodeId": "comb", "portId": "in1" } },
            { "from": { "nodeId": "sep", "portId": "outg" }, "to": { "nodeId": "comb", "portId": "in2" } },
            { "from": { "nodeId": "sep", "portId": "outr" }, "to": { "nodeId": "comb", "portId": "in3" } }
        ],
        "outputs": [ { "name": "result", "type": "vector3", "from": { "nodeId": "comb" } } ]
    }"#;

    #[test]
    fn test_separate_and_combine_glsl() {
        let src = pixel(SEPARATE, Target::Glsl);
        assert!(src.contains("float sep_outr = c.x;"), "{src}");
        assert!(src.contains("float sep_outb = c.z;"), "{src}");
        assert!(src.contains("vec3 comb_out = vec3(sep_outb, sep_outg, sep_outr);"), "{src}");
    }

    #[test]
    fn test_separate_mdl_goes_through_float3() {
        let src = pixel(SEPARATE, Target::Mdl);
        assert!(src.contains("float sep_outg = float3(c).y;"), "{src}");
    }

    #[test]
    fn test_swizzle_and_extract() {
        let src = pixel(
            r#"{
                "inputs": [ { "name": "c", "type": "color4", "value": [0.1, 0.2, 0.3, 1.0] } ],
                "nodes": [
                    { "id": "sw", "category": "swizzle", "type": "color3", "inputTypes": { "in": "color4" },
                      "interface": { "in": "c" }, "params": { "channels": "bgr" } },
                    { "id": "ex", "category": "extract", "type": "float", "inputTypes": { "in": "color3" },
                      "params": { "index": 1 } }
                ],
                "connections": [ { "from": { "nodeId": "sw" }, "to": { "nodeId": "ex", "portId": "in" } } ],
                "outputs": [ { "name": "result", "type": "float", "from": { "nodeId": "ex" } } ]
            }"#,
            Target::Glsl,
        );
        assert!(src.contains("vec3 sw_out = vec3(c.z, c.y, c.x);"), "{src}");
        assert!(src.contains("float ex_out = sw_out.y;"), "{src}");
    }

    #[test]
    fn test_convert_node_on_osl() {
        let src = pixel(
            r#"{
                "inputs": [ { "name": "v", "type": "vector3", "value": [1, 2, 3] } ],
                "nodes": [ { "id": "cv", "category": "convert", "type": "color3", "inputTypes": { "in": "vector3" },
                             "interface": { "in": "v" } } ],
                "outputs": [ { "name": "result", "type": "color3", "from": { "nodeId": "cv" } } ]
            }"#,
            Target::Osl,
        );
        assert!(src.contains("color cv_out = color(v);"), "{src}");
    }
}
