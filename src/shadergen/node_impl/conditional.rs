//! `switch`, `compare` and `ifgreater`.
//!
//! On targets with statements the output is declared first and each branch
//! assigns it, so nodes feeding only one branch are evaluated only when that
//! branch is taken. MDL gets a ternary chain.

use anyhow::Result;

use crate::shadergen::context::GenContext;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::{Brackets, ShaderStage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionalOp {
    Switch,
    Compare,
    IfGreater,
}

/// Branch conditions in order; the last branch has none.
fn conditions(op: ConditionalOp, node: NodeId, env: &Emitter) -> Result<(Vec<String>, usize)> {
    Ok(match op {
        ConditionalOp::Switch => {
            let which = env.input_arg(node, "which")?.expr;
            let branches = env
                .node(node)
                .inputs
                .iter()
                .filter(|i| i.name.starts_with("in"))
                .count()
                .max(1);
            let conds = (1..branches)
                .map(|k| format!("{which} < {}.0", k))
                .collect();
            (conds, branches)
        }
        ConditionalOp::Compare => {
            let intest = env.input_arg(node, "intest")?.expr;
            let cutoff = env.input_arg(node, "cutoff")?.expr;
            (vec![format!("{intest} <= {cutoff}")], 2)
        }
        ConditionalOp::IfGreater => {
            let v1 = env.input_arg(node, "value1")?.expr;
            let v2 = env.input_arg(node, "value2")?.expr;
            (vec![format!("{v1} > {v2}")], 2)
        }
    })
}

pub(super) fn emit(
    op: ConditionalOp,
    node: NodeId,
    env: &Emitter,
    ctx: &mut GenContext,
    stage: &mut ShaderStage,
) -> Result<()> {
    let (conds, branches) = conditions(op, node, env)?;
    let branch_value = |k: usize| -> Result<String> { Ok(env.input_arg(node, &format!("in{}", k + 1))?.expr) };

    if !env.target.supports_branching() {
        let mut expr = branch_value(branches - 1)?;
        for k in (0..branches - 1).rev() {
            expr = format!("({}) ? {} : {expr}", conds[k], branch_value(k)?);
        }
        return env.declare_output(node, 0, Some(&expr), stage);
    }

    env.declare_output(node, 0, None, stage)?;
    let out = env.output_var(node, 0).to_string();
    for k in 0..branches {
        let head = match (k, conds.get(k)) {
            (0, Some(c)) => format!("if ({c})"),
            (_, Some(c)) => format!("else if ({c})"),
            (_, None) => "else".to_string(),
        };
        stage.add_line(&head, false);
        stage.begin_scope(Brackets::Braces);
        env.emit_branch(node, k, ctx, stage)?;
        stage.add_line(&format!("{out} = {}", branch_value(k)?), true);
        stage.end_scope(false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::shadergen::node_impl::test_support::pixel;
    use crate::shadergen::target::Target;

    const IFGREATER: &str = r#"{
        "inputs": [ { "name": "x", "type": "float", "value": 0.5 } ],
        "nodes": [
            { "id": "hi", "category": "multiply", "type": "float", "interface": { "in1": "x" }, "params": { "in2": 2.0 } },
            { "id": "lo", "category": "add", "type": "float", "interface": { "in1": "x" }, "params": { "in2": 1.0 } },
            { "id": "c", "category": "ifgreater", "type": "float", "interface": { "value1": "x" }, "params": { "value2": 0.25 } }
        ],
        "connections": [
            { "from": { "nodeId": "hi" }, "to": { "nodeId": "c", "portId": "in1" } },
            { "from": { "nodeId": "lo" }, "to": { "nodeId": "c", "portId": "in2" } }
        ],
        "outputs": [ { "name": "result", "type": "float", "from": { "nodeId": "c" } } ]
    }"#;

    #[test]
    fn test_branch_nodes_emitted_inside_branches() {
        let src = pixel(IFGREATER, Target::Glsl);
        let decl = src.find("float c_out = 0.0;").expect("declaration");
        let cond = src.find("if (x > c_value2)").expect("condition");
        let hi = src.find("float hi_out").expect("hi");
        let els = cond + src[cond..].find("else").expect("else");
        let lo = src.find("float lo_out").expect("lo");
        assert!(decl < cond && cond < hi && hi < els && els < lo, "{src}");
        assert!(src.contains("c_out = hi_out;"));
        assert!(src.contains("c_out = lo_out;"));
    }

    #[test]
    fn test_mdl_conditional_is_ternary() {
        let src = pixel(IFGREATER, Target::Mdl);
        assert!(src.contains("float c_out = (x > c_value2) ? hi_out : lo_out;"), "{src}");
    }

    #[test]
    fn test_switch_chain_on_osl() {
        let src = pixel(
            r#"{
                "nodes": [ { "id": "s", "category": "switch", "type": "float",
                             "params": { "in1": 1.0, "in2": 2.0, "which": 1.0 } } ],
                "outputs": [ { "name": "result", "type": "float", "from": { "nodeId": "s" } } ]
            }"#,
            Target::Osl,
        );
        assert!(src.contains("if (s_which < 1.0)"), "{src}");
        assert!(src.contains("else if (s_which < 4.0)"), "{src}");
        assert!(src.contains("s_out = s_in5;"), "{src}");
    }
}
