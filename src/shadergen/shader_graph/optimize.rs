//! Constant folding.
//!
//! A foldable node is bypassed: its consumers are rewired to one of its inputs
//! or to a computed literal. The node itself is left without consumers and is
//! removed by the next pruning pass.

use anyhow::Result;

use super::{CONDITIONAL_CATEGORIES, ShaderGraph, ShaderNode, Upstream};
use crate::shadergen::types::{Conversion, Semantic, TypeDesc, TypeRegistry};
use crate::shadergen::value::Value;

/// What a bypassed node's consumers read instead.
struct Source {
    upstream: Option<Upstream>,
    value: Option<Value>,
}

/// Fold until nothing changes. Returns the number of bypassed nodes.
///
/// `literal_math` also evaluates arithmetic and conversions over literal
/// inputs. Those inputs are published uniforms under the complete interface,
/// so callers only enable it for the reduced one.
pub(super) fn fold_constants(graph: &mut ShaderGraph, types: &TypeRegistry, literal_math: bool) -> Result<usize> {
    let mut bypassed = vec![false; graph.nodes.len()];
    let mut count = 0;
    loop {
        let mut changed = false;
        for id in graph.order.clone() {
            if bypassed[id] {
                continue;
            }
            if let Some(src) = fold_node(&graph.nodes[id], types, literal_math) {
                graph.bypass(id, src.upstream, src.value);
                bypassed[id] = true;
                count += 1;
                changed = true;
            }
        }
        if !changed {
            return Ok(count);
        }
    }
}

fn fold_node(node: &ShaderNode, types: &TypeRegistry, literal_math: bool) -> Option<Source> {
    let [out] = node.outputs.as_slice() else {
        return None;
    };
    let out_ty = &out.ty;
    let pass = |name: &str| -> Option<Source> {
        node.input(name).filter(|i| i.ty == *out_ty).map(|i| Source {
            upstream: i.upstream,
            value: i.value.clone(),
        })
    };
    let literal_f32 = |name: &str| node.literal(name).and_then(Value::as_f32);

    match node.category.as_str() {
        "constant" => pass("value"),
        "dot" => pass("in"),
        cat if CONDITIONAL_CATEGORIES.contains(&cat) => fold_conditional(node, &pass, &literal_f32),
        "mix" => match literal_f32("mix")? {
            w if w == 0.0 => pass("bg"),
            w if w == 1.0 => pass("fg"),
            _ => None,
        },
        "convert" if literal_math => {
            let input = node.input("in")?;
            let value = node.literal("in")?;
            let conv = types.conversion(&input.ty, out_ty)?;
            convert_value(value, conv, out_ty).map(literal)
        }
        "add" | "subtract" | "multiply" | "divide" | "min" | "max"
            if literal_math && out_ty.is_float_based() && out_ty.semantic != Semantic::Matrix =>
        {
            let a = node.literal("in1")?.as_floats()?;
            let b = node.literal("in2")?.as_floats()?;
            arithmetic(&node.category, &a, &b, out_ty).map(literal)
        }
        _ => None,
    }
}

fn literal(value: Value) -> Source {
    Source {
        upstream: None,
        value: Some(value),
    }
}

fn fold_conditional(
    node: &ShaderNode,
    pass: &dyn Fn(&str) -> Option<Source>,
    literal_f32: &dyn Fn(&str) -> Option<f32>,
) -> Option<Source> {
    match node.category.as_str() {
        "switch" => {
            let which = literal_f32("which")?;
            let branches = node
                .inputs
                .iter()
                .filter(|i| i.name.starts_with("in"))
                .count()
                .max(1);
            let k = (which.floor().max(0.0) as usize).min(branches - 1);
            pass(&format!("in{}", k + 1))
        }
        "compare" => {
            let take_first = literal_f32("intest")? <= literal_f32("cutoff")?;
            pass(if take_first { "in1" } else { "in2" })
        }
        "ifgreater" => {
            let take_first = literal_f32("value1")? > literal_f32("value2")?;
            pass(if take_first { "in1" } else { "in2" })
        }
        _ => None,
    }
}

fn convert_value(value: &Value, conv: &Conversion, to: &TypeDesc) -> Option<Value> {
    let comps = value.as_floats()?;
    let out = match conv {
        Conversion::Splat => vec![*comps.first()?; to.size],
        Conversion::Cast | Conversion::Reinterpret => comps,
        Conversion::Swizzle(channels) => channels
            .chars()
            .map(|c| match c {
                '0' => Some(0.0),
                '1' => Some(1.0),
                'r' | 'x' => comps.first().copied(),
                'g' | 'y' => comps.get(1).copied(),
                'b' | 'z' => comps.get(2).copied(),
                'a' | 'w' => comps.get(3).copied(),
                _ => None,
            })
            .collect::<Option<Vec<f32>>>()?,
    };
    Value::from_floats(to, out).ok()
}

/// Component-wise arithmetic; a single-component operand is broadcast.
fn arithmetic(op: &str, a: &[f32], b: &[f32], ty: &TypeDesc) -> Option<Value> {
    let n = a.len().max(b.len());
    if n != ty.size || (a.len() != n && a.len() != 1) || (b.len() != n && b.len() != 1) {
        return None;
    }
    let at = |v: &[f32], i: usize| if v.len() == 1 { v[0] } else { v[i] };
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (x, y) = (at(a, i), at(b, i));
        out.push(match op {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "divide" if y != 0.0 => x / y,
            "min" => x.min(y),
            "max" => x.max(y),
            _ => return None,
        });
    }
    Value::from_floats(ty, out).ok()
}
