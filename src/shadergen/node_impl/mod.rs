//! Node implementations: how each node category becomes shader code.
//!
//! Most nodes are [`SourceCode`] from the node library. Categories whose code
//! depends on types, stages or the graph around them (closure algebra,
//! conditionals, channel plumbing, geometry, lights) are built in.

mod closure;
mod conditional;
mod convert;
mod geometric;
mod light;
mod source_code;

use anyhow::Result;

use crate::schema::NodeDef;
use crate::shadergen::context::GenContext;
use crate::shadergen::error::GenError;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::ShaderStage;
use crate::shadergen::target::Target;
use crate::shadergen::types::TypeRef;

pub use closure::ClosureOp;
pub use conditional::ConditionalOp;
pub use geometric::GeometricKind;
pub use source_code::SourceCode;

/// A typed expression passed to a node call.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub ty: TypeRef,
    pub expr: String,
}

#[derive(Clone, Debug)]
pub enum NodeImpl {
    SourceCode(SourceCode),
    Closure(ClosureOp),
    Conditional(ConditionalOp),
    Swizzle,
    Extract,
    Convert,
    Combine,
    Separate,
    Geometric(GeometricKind),
    Light,
    /// The category exists but cannot be expressed on this target.
    Unsupported,
}

const CLOSURE_OUTPUTS: &[&str] = &["BSDF", "EDF", "VDF", "surfaceshader"];

impl NodeImpl {
    /// Built-in implementation for `def`, with whether it is specific to
    /// `target`. `None` means the library provides the code.
    pub fn builtin(def: &NodeDef, target: Target) -> Option<(NodeImpl, bool)> {
        let closure_out = CLOSURE_OUTPUTS.contains(&def.output_type());
        let any = |imp| Some((imp, false));
        match def.node.as_str() {
            "add" if closure_out => any(NodeImpl::Closure(ClosureOp::Add)),
            "multiply" if closure_out => any(NodeImpl::Closure(ClosureOp::Multiply)),
            "mix" if closure_out => any(NodeImpl::Closure(ClosureOp::Mix)),
            "layer" => any(NodeImpl::Closure(ClosureOp::Layer)),
            "switch" => any(NodeImpl::Conditional(ConditionalOp::Switch)),
            "compare" => any(NodeImpl::Conditional(ConditionalOp::Compare)),
            "ifgreater" => any(NodeImpl::Conditional(ConditionalOp::IfGreater)),
            "swizzle" => any(NodeImpl::Swizzle),
            "extract" => any(NodeImpl::Extract),
            "convert" => any(NodeImpl::Convert),
            "combine2" | "combine3" | "combine4" => any(NodeImpl::Combine),
            "separate2" | "separate3" | "separate4" => any(NodeImpl::Separate),
            "light" if target.is_hw() => Some((NodeImpl::Light, true)),
            "light" => Some((NodeImpl::Unsupported, true)),
            cat => GeometricKind::from_category(cat).map(|k| (NodeImpl::Geometric(k), false)),
        }
    }

    /// Declare stage variables (uniforms, vertex inputs, connectors) the node
    /// reads. Called for every node before any code is written.
    pub fn create_variables(
        &self,
        node: NodeId,
        env: &Emitter,
        ctx: &mut GenContext,
        stages: &mut [ShaderStage],
    ) -> Result<()> {
        match self {
            NodeImpl::Geometric(kind) => geometric::create_variables(*kind, node, env, ctx, stages),
            NodeImpl::Light => light::create_variables(env, stages),
            _ => Ok(()),
        }
    }

    pub fn emit_function_definition(
        &self,
        node: NodeId,
        env: &Emitter,
        _ctx: &mut GenContext,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        match self {
            NodeImpl::SourceCode(sc) => sc.emit_function_definition(node, env, stage),
            _ => Ok(()),
        }
    }

    pub fn emit_function_call(
        &self,
        node: NodeId,
        env: &Emitter,
        ctx: &mut GenContext,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        match self {
            NodeImpl::SourceCode(sc) => sc.emit_function_call(node, env, stage),
            NodeImpl::Closure(op) => closure::emit(*op, node, env, stage),
            NodeImpl::Conditional(op) => conditional::emit(*op, node, env, ctx, stage),
            NodeImpl::Swizzle => convert::emit_swizzle(node, env, stage),
            NodeImpl::Extract => convert::emit_extract(node, env, stage),
            NodeImpl::Convert => convert::emit_convert(node, env, stage),
            NodeImpl::Combine => convert::emit_combine(node, env, stage),
            NodeImpl::Separate => convert::emit_separate(node, env, stage),
            NodeImpl::Geometric(kind) => geometric::emit(*kind, node, env, ctx, stage),
            NodeImpl::Light => light::emit(node, env, stage),
            NodeImpl::Unsupported => {
                let n = env.node(node);
                Err(GenError::Unsupported {
                    node: n.path.clone(),
                    category: n.category.clone(),
                    target: env.target.to_string(),
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::dsl::parse_document;
    use crate::shadergen::context::{GenContext, GenOptions};
    use crate::shadergen::generator::ShaderGenerator;
    use crate::shadergen::shader::Shader;
    use crate::shadergen::target::Target;

    /// Generate `json` for `target` with folding off, so every node is emitted.
    pub fn generate(json: &str, target: Target) -> anyhow::Result<Shader> {
        let doc = parse_document(json)?;
        let generator = ShaderGenerator::new(target)?;
        let mut ctx = GenContext::new(GenOptions {
            constant_folding: false,
            ..GenOptions::default()
        });
        generator.generate("test", &doc, &mut ctx)
    }

    pub fn pixel(json: &str, target: Target) -> String {
        let shader = generate(json, target).unwrap();
        shader.source("pixel").unwrap().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeLibrary;

    #[test]
    fn test_builtin_routing() {
        let lib = NodeLibrary::load_default().unwrap();
        let def = |name: &str| lib.nodedef(name).unwrap();
        assert!(matches!(
            NodeImpl::builtin(def("add_BSDF"), Target::Glsl),
            Some((NodeImpl::Closure(ClosureOp::Add), false))
        ));
        // Numeric add comes from the library.
        assert!(NodeImpl::builtin(def("add_float"), Target::Glsl).is_none());
        assert!(matches!(
            NodeImpl::builtin(def("light"), Target::Osl),
            Some((NodeImpl::Unsupported, true))
        ));
        assert!(matches!(
            NodeImpl::builtin(def("position_vector3"), Target::Mdl),
            Some((NodeImpl::Geometric(GeometricKind::Position), false))
        ));
    }
}
