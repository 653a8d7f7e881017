//! Closure algebra: add, multiply, mix and layer over BSDF, EDF, VDF and
//! surface shaders.
//!
//! Hardware targets carry closures as plain structs (`BSDF` is a response and a
//! throughput, `EDF` a radiance, `VDF` absorption and scattering), so the
//! operators are written member-wise. OSL has native closure arithmetic. MDL
//! closures are `material` values combined through the `df::` modifiers.

use anyhow::Result;

use super::Argument;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::ShaderStage;
use crate::shadergen::target::Target;
use crate::shadergen::types::TypeDesc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosureOp {
    Add,
    Multiply,
    Mix,
    Layer,
}

impl ClosureOp {
    fn inputs(self) -> [&'static str; 2] {
        match self {
            ClosureOp::Add => ["in1", "in2"],
            ClosureOp::Multiply => ["in1", "in2"],
            ClosureOp::Mix => ["fg", "bg"],
            ClosureOp::Layer => ["top", "base"],
        }
    }
}

pub(super) fn emit(op: ClosureOp, node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
    let n = env.node(node);
    let out_ty = &n.outputs[0].ty;
    let [first, second] = op.inputs();

    if op == ClosureOp::Layer && n.input("top").is_some_and(|i| i.upstream.is_none()) {
        return env.declare_output(node, 0, None, stage);
    }

    let a = env.input_arg(node, first)?;
    let b = env.input_arg(node, second)?;
    let w = match op {
        ClosureOp::Mix => Some(env.input_arg(node, "mix")?),
        _ => None,
    };
    let expr = match env.target {
        Target::Glsl | Target::Msl => hw_expr(op, env, out_ty, &a, &b, w.as_ref())?,
        Target::Osl => osl_expr(op, &a, &b, w.as_ref()),
        Target::Mdl => mdl_expr(op, out_ty, &a, &b, w.as_ref()),
    };
    env.declare_output(node, 0, Some(&expr), stage)
}

fn hw_expr(
    op: ClosureOp,
    env: &Emitter,
    ty: &TypeDesc,
    a: &Argument,
    b: &Argument,
    w: Option<&Argument>,
) -> Result<String> {
    let base_is_vdf = b.ty.name == "VDF";
    let (a, b) = (a.expr.as_str(), b.expr.as_str());
    let w = w.map(|w| w.expr.as_str()).unwrap_or("1.0");
    let members: &[&str] = match ty.name.as_str() {
        "BSDF" => &["response", "throughput"],
        "VDF" => &["absorption", "scattering"],
        "surfaceshader" => &["color", "transparency"],
        // EDF is a bare radiance.
        _ => {
            return Ok(match op {
                ClosureOp::Add => format!("{a} + {b}"),
                ClosureOp::Multiply => format!("{a} * {b}"),
                ClosureOp::Mix => format!("mix({b}, {a}, {w})"),
                ClosureOp::Layer => a.to_string(),
            });
        }
    };
    let (m0, m1) = (members[0], members[1]);
    let fields = match op {
        ClosureOp::Add if ty.name == "BSDF" => vec![
            format!("{a}.{m0} + {b}.{m0}"),
            format!("{a}.{m1} * {b}.{m1}"),
        ],
        ClosureOp::Add => vec![format!("{a}.{m0} + {b}.{m0}"), format!("{a}.{m1} + {b}.{m1}")],
        ClosureOp::Multiply if ty.name == "VDF" => {
            vec![format!("{a}.{m0} * {b}"), format!("{a}.{m1} * {b}")]
        }
        // Weighting scales what is reflected, not what passes through.
        ClosureOp::Multiply => vec![format!("{a}.{m0} * {b}"), format!("{a}.{m1}")],
        ClosureOp::Mix => vec![
            format!("mix({b}.{m0}, {a}.{m0}, {w})"),
            format!("mix({b}.{m1}, {a}.{m1}, {w})"),
        ],
        ClosureOp::Layer => {
            if base_is_vdf {
                let one = env.syntax.type_name(&*env.types.get("vector3")?)?;
                vec![
                    format!("{a}.response"),
                    format!("{a}.throughput * ({one}(1.0) - {b}.absorption)"),
                ]
            } else {
                vec![
                    format!("{a}.response + {b}.response * {a}.throughput"),
                    format!("{a}.throughput * {b}.throughput"),
                ]
            }
        }
    };
    env.struct_init(ty, &fields)
}

fn osl_expr(op: ClosureOp, a: &Argument, b: &Argument, w: Option<&Argument>) -> String {
    let (a, b) = (a.expr.as_str(), b.expr.as_str());
    match op {
        ClosureOp::Add => format!("{a} + {b}"),
        ClosureOp::Multiply => format!("{a} * {b}"),
        ClosureOp::Mix => {
            let w = w.map(|w| w.expr.as_str()).unwrap_or("1.0");
            format!("({b} * (1.0 - {w})) + ({a} * {w})")
        }
        ClosureOp::Layer => format!("layer({a}, {b})"),
    }
}

fn mdl_expr(op: ClosureOp, ty: &TypeDesc, a: &Argument, b: &Argument, w: Option<&Argument>) -> String {
    let b_ty = b.ty.name.as_str();
    let (a, b) = (a.expr.as_str(), b.expr.as_str());
    let w = w.map(|w| w.expr.as_str()).unwrap_or("1.0");
    let surface = |scattering: String| format!("material(surface: material_surface(scattering: {scattering}))");
    match (ty.name.as_str(), op) {
        (_, ClosureOp::Layer) if b_ty == "VDF" => {
            format!("material(surface: {a}.surface, volume: {b}.volume)")
        }
        (_, ClosureOp::Layer) => surface(format!(
            "df::weighted_layer(weight: 1.0, layer: {a}.surface.scattering, base: {b}.surface.scattering)"
        )),
        ("EDF", op) => {
            let (wa, wb) = match op {
                ClosureOp::Mix => (w.to_string(), format!("1.0 - {w}")),
                _ => ("1.0".to_string(), "1.0".to_string()),
            };
            if op == ClosureOp::Multiply {
                return format!(
                    "material(surface: material_surface(emission: material_emission(emission: {a}.surface.emission.emission, intensity: {a}.surface.emission.intensity * {b})))"
                );
            }
            format!(
                "material(surface: material_surface(emission: material_emission(\
                 emission: df::clamped_mix(df::edf_component[](df::edf_component({wb}, {b}.surface.emission.emission), df::edf_component({wa}, {a}.surface.emission.emission))), \
                 intensity: {b}.surface.emission.intensity * ({wb}) + {a}.surface.emission.intensity * ({wa}))))"
            )
        }
        ("VDF", op) => {
            let field = |f: &str| match op {
                ClosureOp::Add => format!("{a}.volume.{f} + {b}.volume.{f}"),
                ClosureOp::Multiply => format!("{a}.volume.{f} * {b}"),
                _ => format!("math::lerp({b}.volume.{f}, {a}.volume.{f}, {w})"),
            };
            format!(
                "material(volume: material_volume(absorption_coefficient: {}, scattering_coefficient: {}))",
                field("absorption_coefficient"),
                field("scattering_coefficient")
            )
        }
        (_, ClosureOp::Mix) => surface(format!(
            "df::weighted_layer(weight: {w}, layer: {a}.surface.scattering, base: {b}.surface.scattering)"
        )),
        (_, ClosureOp::Multiply) => {
            let tint = if b_ty == "float" { format!("color({b})") } else { b.to_string() };
            surface(format!("df::tint({tint}, {a}.surface.scattering)"))
        }
        (_, ClosureOp::Add) => surface(format!(
            "df::clamped_mix(df::bsdf_component[](df::bsdf_component(1.0, {a}.surface.scattering), df::bsdf_component(1.0, {b}.surface.scattering)))"
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::shadergen::node_impl::test_support::pixel;
    use crate::shadergen::target::Target;

    const MIX: &str = r#"{
        "nodes": [
            { "id": "d1", "category": "diffuse_bsdf", "type": "BSDF", "params": { "color": [1, 0, 0] } },
            { "id": "d2", "category": "diffuse_bsdf", "type": "BSDF", "params": { "color": [0, 0, 1] } },
            { "id": "m", "category": "mix", "type": "BSDF", "params": { "mix": 0.25 } }
        ],
        "connections": [
            { "from": { "nodeId": "d1" }, "to": { "nodeId": "m", "portId": "fg" } },
            { "from": { "nodeId": "d2" }, "to": { "nodeId": "m", "portId": "bg" } }
        ],
        "outputs": [ { "name": "result", "type": "BSDF", "from": { "nodeId": "m" } } ]
    }"#;

    #[test]
    fn test_bsdf_mix_per_target() {
        let glsl = pixel(MIX, Target::Glsl);
        assert!(
            glsl.contains(
                "BSDF m_out = BSDF(mix(d2_out.response, d1_out.response, m_mix), mix(d2_out.throughput, d1_out.throughput, m_mix));"
            ),
            "{glsl}"
        );
        let msl = pixel(MIX, Target::Msl);
        assert!(msl.contains("BSDF m_out = BSDF{mix("), "{msl}");
        let osl = pixel(MIX, Target::Osl);
        assert!(
            osl.contains("closure color m_out = (d2_out * (1.0 - m_mix)) + (d1_out * m_mix);"),
            "{osl}"
        );
        let mdl = pixel(MIX, Target::Mdl);
        assert!(
            mdl.contains("df::weighted_layer(weight: m_mix, layer: d1_out.surface.scattering, base: d2_out.surface.scattering)"),
            "{mdl}"
        );
    }

    #[test]
    fn test_layer_without_top_is_empty() {
        let json = r#"{
            "nodes": [
                { "id": "base", "category": "diffuse_bsdf", "type": "BSDF" },
                { "id": "l", "category": "layer", "type": "BSDF", "nodedef": "layer_bsdf" }
            ],
            "connections": [ { "from": { "nodeId": "base" }, "to": { "nodeId": "l", "portId": "base" } } ],
            "outputs": [ { "name": "result", "type": "BSDF", "from": { "nodeId": "l" } } ]
        }"#;
        assert!(pixel(json, Target::Glsl).contains("BSDF l_out = BSDF(vec3(0.0), vec3(1.0));"));
        assert!(pixel(json, Target::Osl).contains("closure color l_out = null_closure;"));
        assert!(pixel(json, Target::Mdl).contains("material l_out = material();"));
    }

    #[test]
    fn test_layer_over_vdf() {
        let json = r#"{
            "nodes": [
                { "id": "top", "category": "dielectric_bsdf", "type": "BSDF" },
                { "id": "vol", "category": "absorption_vdf", "type": "VDF" },
                { "id": "l", "category": "layer", "type": "BSDF", "nodedef": "layer_vdf" }
            ],
            "connections": [
                { "from": { "nodeId": "top" }, "to": { "nodeId": "l", "portId": "top" } },
                { "from": { "nodeId": "vol" }, "to": { "nodeId": "l", "portId": "base" } }
            ],
            "outputs": [ { "name": "result", "type": "BSDF", "from": { "nodeId": "l" } } ]
        }"#;
        let glsl = pixel(json, Target::Glsl);
        assert!(
            glsl.contains("top_out.throughput * (vec3(1.0) - vol_out.absorption)"),
            "{glsl}"
        );
        let mdl = pixel(json, Target::Mdl);
        assert!(
            mdl.contains("material l_out = material(surface: top_out.surface, volume: vol_out.volume);"),
            "{mdl}"
        );
    }

    #[test]
    fn test_edf_algebra_on_glsl() {
        let src = pixel(
            r#"{
                "nodes": [
                    { "id": "e1", "category": "uniform_edf", "type": "EDF" },
                    { "id": "e2", "category": "uniform_edf", "type": "EDF" },
                    { "id": "sum", "category": "add", "type": "EDF" },
                    { "id": "scaled", "category": "multiply", "type": "EDF", "nodedef": "multiply_edff",
                      "params": { "in2": 0.5 } }
                ],
                "connections": [
                    { "from": { "nodeId": "e1" }, "to": { "nodeId": "sum", "portId": "in1" } },
                    { "from": { "nodeId": "e2" }, "to": { "nodeId": "sum", "portId": "in2" } },
                    { "from": { "nodeId": "sum" }, "to": { "nodeId": "scaled", "portId": "in1" } }
                ],
                "outputs": [ { "name": "result", "type": "EDF", "from": { "nodeId": "scaled" } } ]
            }"#,
            Target::Glsl,
        );
        assert!(src.contains("EDF sum_out = e1_out + e2_out;"), "{src}");
        assert!(src.contains("EDF scaled_out = sum_out * scaled_in2;"), "{src}");
    }
}
