//! The shader generator: one type, parameterised by [`Target`].
//!
//! A generator owns its syntax, type registry, node library and
//! implementation table, and is read-only after construction. Each
//! `generate` call builds an [`Emitter`] holding the per-run state derived
//! from the graph (names, branch scopes, resolved implementations) and hands
//! it to the target's stage assembler.

mod hw;
mod mdl;
mod osl;

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use crate::dsl::MaterialDocument;
use crate::schema::NodeLibrary;
use crate::shadergen::context::GenContext;
use crate::shadergen::error::GenError;
use crate::shadergen::node_impl::{Argument, NodeImpl, SourceCode};
use crate::shadergen::shader::{Shader, StageOutput};
use crate::shadergen::shader_graph::{
    CONDITIONAL_CATEGORIES, Classification, NodeId, ShaderGraph, ShaderInput, ShaderNode, Upstream,
};
use crate::shadergen::stage::ShaderStage;
use crate::shadergen::syntax::{self, IdentifierMap, Syntax};
use crate::shadergen::target::Target;
use crate::shadergen::types::{TypeDesc, TypeRegistry};

pub use hw::HwRef;

/// Identifiers the assemblers use themselves.
const RESERVED_WORDS: &[&str] = &[
    "main",
    "VertexMain",
    "FragmentMain",
    "hPositionWorld",
    "i_position",
    "i_normal",
    "i_tangent",
    "i_bitangent",
    "vd",
    "i_vs",
    "u_prv",
    "u_pub",
    "po",
    "outAlpha",
    "finalOutput__",
    "LightData",
    "sampleLightSource",
    "mx_transform_uv",
    "mk_color4",
    "MAX_LIGHT_SOURCES",
    "positionWorld",
    "positionObject",
    "normalWorld",
    "normalObject",
    "tangentWorld",
    "tangentObject",
    "bitangentWorld",
    "bitangentObject",
    "u_worldMatrix",
    "u_worldInverseTransposeMatrix",
    "u_viewProjectionMatrix",
    "u_viewPosition",
    "u_time",
    "u_frame",
    "u_numActiveLightSources",
    "u_lightData",
    "u_udimScaleAndOffset",
    "u_envMatrix",
    "u_envRadiance",
    "u_envRadianceMips",
    "u_envRadianceSamples",
    "u_envIrradiance",
    "u_shadowMap",
    "u_shadowMatrix",
    "u_ambOcclMap",
    "u_ambOcclGain",
];

/// Node implementations keyed by nodedef and target. A `None` target entry
/// applies to every target without a specific one.
#[derive(Clone, Debug, Default)]
pub struct ImplementationTable {
    entries: HashMap<(String, Option<Target>), NodeImpl>,
}

impl ImplementationTable {
    /// Builtins for every nodedef of `lib`, falling back to the library's
    /// source implementation for `target`.
    pub fn for_library(lib: &NodeLibrary, target: Target) -> Self {
        let mut table = Self::default();
        for def in lib.nodedefs() {
            if let Some((imp, specific)) = NodeImpl::builtin(def, target) {
                table.register(&def.name, specific.then_some(target), imp);
            } else if let Some(source) = lib.implementation(def, target) {
                table.register(
                    &def.name,
                    Some(target),
                    NodeImpl::SourceCode(SourceCode::new(source, def)),
                );
            }
        }
        table
    }

    pub fn register(&mut self, nodedef: &str, target: Option<Target>, imp: NodeImpl) {
        self.entries.insert((nodedef.to_string(), target), imp);
    }

    pub fn get(&self, nodedef: &str, target: Target) -> Option<&NodeImpl> {
        self.entries
            .get(&(nodedef.to_string(), Some(target)))
            .or_else(|| self.entries.get(&(nodedef.to_string(), None)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ShaderGenerator {
    target: Target,
    syntax: Syntax,
    types: TypeRegistry,
    library: NodeLibrary,
    impls: ImplementationTable,
}

impl ShaderGenerator {
    /// A generator using the bundled node library.
    pub fn new(target: Target) -> Result<Self> {
        Self::with_library(target, NodeLibrary::load_default()?)
    }

    pub fn with_library(target: Target, library: NodeLibrary) -> Result<Self> {
        let types = TypeRegistry::standard()?;
        library.validate(&types)?;
        let syntax = match target {
            Target::Glsl => syntax::glsl(),
            Target::Osl => syntax::osl(),
            Target::Mdl => syntax::mdl(),
            Target::Msl => syntax::msl(),
        };
        let impls = ImplementationTable::for_library(&library, target);
        debug!(
            "{target} generator ready: {} nodedefs, {} implementations",
            library.nodedefs().count(),
            impls.len()
        );
        Ok(Self {
            target,
            syntax,
            types,
            library,
            impls,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn library(&self) -> &NodeLibrary {
        &self.library
    }

    /// Override or add an implementation. `None` applies to every target.
    pub fn register_implementation(&mut self, nodedef: &str, target: Option<Target>, imp: NodeImpl) {
        self.impls.register(nodedef, target, imp);
    }

    pub fn build_graph(&self, doc: &MaterialDocument, ctx: &GenContext) -> Result<ShaderGraph> {
        ShaderGraph::build(doc, &self.library, &self.types, &ctx.options)
    }

    pub fn generate(&self, name: &str, doc: &MaterialDocument, ctx: &mut GenContext) -> Result<Shader> {
        let graph = self
            .build_graph(doc, ctx)
            .with_context(|| format!("failed to build shader graph for '{name}'"))?;
        self.generate_from_graph(name, &graph, ctx)
    }

    pub fn generate_from_graph(&self, name: &str, graph: &ShaderGraph, ctx: &mut GenContext) -> Result<Shader> {
        ctx.begin_run(self.target);

        let mut impls = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let imp = self.impls.get(&node.nodedef, self.target).ok_or_else(|| {
                GenError::MissingImplementation {
                    node: node.path.clone(),
                    nodedef: node.nodedef.clone(),
                    target: self.target.to_string(),
                }
            })?;
            if matches!(imp, NodeImpl::Unsupported) {
                return Err(GenError::Unsupported {
                    node: node.path.clone(),
                    category: node.category.clone(),
                    target: self.target.to_string(),
                }
                .into());
            }
            impls.push(imp);
        }

        let scopes = if self.target.supports_branching() {
            compute_scopes(graph)
        } else {
            vec![Scope::Global; graph.nodes.len()]
        };
        let env = Emitter {
            target: self.target,
            syntax: &self.syntax,
            types: &self.types,
            library: &self.library,
            graph,
            names: RunNames::new(graph, &self.syntax),
            scopes,
            impls,
        };

        let stages = match self.target {
            Target::Glsl | Target::Msl => hw::generate(name, &env, ctx)?,
            Target::Osl => osl::generate(name, &env, ctx)?,
            Target::Mdl => mdl::generate(name, &env, ctx)?,
        };

        let mut outputs = Vec::with_capacity(stages.len());
        for stage in &stages {
            let out = StageOutput::from_stage(stage, &self.syntax)?;
            debug!(
                "{} stage '{}' of '{name}': {} bytes, {} uniform(s)",
                self.target,
                out.name,
                out.source.len(),
                out.uniforms.len()
            );
            outputs.push(out);
        }
        info!(
            "generated {} shader '{name}' ({} nodes, {} stage(s))",
            self.target,
            graph.nodes.len(),
            outputs.len()
        );
        Ok(Shader {
            name: name.to_string(),
            target: self.target,
            stages: outputs,
        })
    }
}

/// Variable names for one run, made valid and unique for the target.
#[derive(Clone, Debug)]
pub struct RunNames {
    outputs: Vec<Vec<String>>,
    sockets: Vec<String>,
    graph_outputs: Vec<String>,
}

impl RunNames {
    fn new(graph: &ShaderGraph, syntax: &Syntax) -> Self {
        let mut ids = IdentifierMap::new();
        for word in RESERVED_WORDS {
            ids.insert(word.to_string(), 1);
        }
        let mut unique = |name: &str| {
            let mut n = name.to_string();
            syntax.make_unique(&mut n, &mut ids);
            n
        };
        let sockets = graph.input_sockets.iter().map(|s| unique(&s.name)).collect();
        let mut outputs = vec![Vec::new(); graph.nodes.len()];
        for &id in &graph.order {
            outputs[id] = graph.nodes[id]
                .outputs
                .iter()
                .map(|o| unique(&o.variable))
                .collect();
        }
        let graph_outputs = graph.output_sockets.iter().map(|s| unique(&s.name)).collect();
        Self {
            outputs,
            sockets,
            graph_outputs,
        }
    }
}

/// Where a node's code is emitted on targets with statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Unknown,
    Global,
    /// Only used inside branch `branch` of conditional `cond`.
    Branch { cond: NodeId, branch: usize },
}

/// Index of the branch an input feeds, for conditional nodes.
fn branch_of(node: &ShaderNode, input: &ShaderInput) -> Option<usize> {
    if !CONDITIONAL_CATEGORIES.contains(&node.category.as_str()) {
        return None;
    }
    input
        .name
        .strip_prefix("in")
        .and_then(|k| k.parse::<usize>().ok())
        .filter(|&k| k >= 1)
        .map(|k| k - 1)
}

/// Propagate scopes from the outputs upstream. A node read from two
/// different scopes is emitted globally.
fn compute_scopes(graph: &ShaderGraph) -> Vec<Scope> {
    let mut scopes = vec![Scope::Unknown; graph.nodes.len()];
    let merge = |slot: &mut Scope, s: Scope| {
        *slot = match (&*slot, &s) {
            (Scope::Unknown, _) => s,
            (a, b) if a == b => s,
            _ => Scope::Global,
        };
    };
    for socket in &graph.output_sockets {
        if let Some(Upstream::Node { node, .. }) = socket.upstream {
            merge(&mut scopes[node], Scope::Global);
        }
    }
    for &id in graph.order.iter().rev() {
        let node = &graph.nodes[id];
        let own = match &scopes[id] {
            Scope::Unknown => Scope::Global,
            s => s.clone(),
        };
        for input in &node.inputs {
            let Some(Upstream::Node { node: up, .. }) = input.upstream else {
                continue;
            };
            let s = match branch_of(node, input) {
                Some(branch) => Scope::Branch { cond: id, branch },
                None => own.clone(),
            };
            merge(&mut scopes[up], s);
        }
    }
    scopes
        .into_iter()
        .map(|s| if s == Scope::Unknown { Scope::Global } else { s })
        .collect()
}

/// Per-run emission environment handed to node implementations.
pub struct Emitter<'a> {
    pub target: Target,
    pub syntax: &'a Syntax,
    pub types: &'a TypeRegistry,
    pub library: &'a NodeLibrary,
    pub graph: &'a ShaderGraph,
    names: RunNames,
    scopes: Vec<Scope>,
    impls: Vec<&'a NodeImpl>,
}

impl<'a> Emitter<'a> {
    pub fn node(&self, id: NodeId) -> &'a ShaderNode {
        &self.graph.nodes[id]
    }

    pub fn output_var(&self, node: NodeId, output: usize) -> &str {
        &self.names.outputs[node][output]
    }

    pub fn socket_var(&self, socket: usize) -> &str {
        &self.names.sockets[socket]
    }

    pub fn graph_output_var(&self, index: usize) -> &str {
        &self.names.graph_outputs[index]
    }

    pub fn scope(&self, node: NodeId) -> &Scope {
        &self.scopes[node]
    }

    /// Expression for an input: upstream variable, socket, literal or default.
    pub fn argument(&self, input: &ShaderInput) -> Result<Argument> {
        let expr = match input.upstream {
            Some(Upstream::Node { node, output }) => self.output_var(node, output).to_string(),
            Some(Upstream::Socket(s)) => self.socket_var(s).to_string(),
            None => match &input.value {
                Some(v) => self.syntax.value(&input.ty, v, false)?,
                None => self.syntax.default_value(&input.ty, false)?,
            },
        };
        Ok(Argument {
            ty: input.ty.clone(),
            expr,
        })
    }

    pub fn input_arg(&self, node: NodeId, name: &str) -> Result<Argument> {
        let n = self.node(node);
        let input = n.input(name).ok_or_else(|| GenError::UnknownPort {
            node: n.path.clone(),
            port: name.to_string(),
        })?;
        self.argument(input)
    }

    /// Expression feeding graph output `index`.
    pub fn graph_output_expr(&self, index: usize) -> Result<String> {
        let socket = &self.graph.output_sockets[index];
        Ok(match socket.upstream {
            Some(Upstream::Node { node, output }) => self.output_var(node, output).to_string(),
            Some(Upstream::Socket(s)) => self.socket_var(s).to_string(),
            None => match &socket.value {
                Some(v) => self.syntax.value(&socket.ty, v, false)?,
                None => self.syntax.default_value(&socket.ty, false)?,
            },
        })
    }

    /// `type var = init`, with the type's default when `init` is `None`.
    pub fn declaration(&self, ty: &TypeDesc, var: &str, init: Option<&str>) -> Result<String> {
        let init = match init {
            Some(i) => i.to_string(),
            None => self.syntax.default_value(ty, false)?,
        };
        Ok(format!("{} {var} = {init}", self.syntax.type_name(ty)?))
    }

    /// Declare output `output` of `node` as a statement.
    pub fn declare_output(
        &self,
        node: NodeId,
        output: usize,
        init: Option<&str>,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        let out = &self.node(node).outputs[output];
        let line = self.declaration(&out.ty, self.output_var(node, output), init)?;
        stage.add_line(&line, true);
        Ok(())
    }

    /// Struct value from member expressions. Metal needs aggregate braces.
    pub fn struct_init(&self, ty: &TypeDesc, fields: &[String]) -> Result<String> {
        let name = self.syntax.type_name(ty)?;
        Ok(match self.target {
            Target::Msl => format!("{name}{{{}}}", fields.join(", ")),
            _ => format!("{name}({})", fields.join(", ")),
        })
    }

    /// Emit the call for `id` unless already emitted in this stage.
    pub fn emit_node(&self, id: NodeId, ctx: &mut GenContext, stage: &mut ShaderStage) -> Result<()> {
        if !ctx.mark_emitted(&stage.name, id) {
            return Ok(());
        }
        self.impls[id]
            .emit_function_call(id, self, ctx, stage)
            .with_context(|| format!("while emitting node '{}'", self.node(id).path))
    }

    /// Emit every node of `scope`, in order.
    pub fn emit_scope(&self, scope: &Scope, ctx: &mut GenContext, stage: &mut ShaderStage) -> Result<()> {
        for &id in &self.graph.order {
            if self.scopes[id] == *scope {
                self.emit_node(id, ctx, stage)?;
            }
        }
        Ok(())
    }

    /// Emit the nodes used only by branch `branch` of conditional `cond`.
    pub fn emit_branch(
        &self,
        cond: NodeId,
        branch: usize,
        ctx: &mut GenContext,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        self.emit_scope(&Scope::Branch { cond, branch }, ctx, stage)
    }

    pub fn create_variables(&self, ctx: &mut GenContext, stages: &mut [ShaderStage]) -> Result<()> {
        for &id in &self.graph.order {
            self.impls[id]
                .create_variables(id, self, ctx, stages)
                .with_context(|| format!("while declaring variables of '{}'", self.node(id).path))?;
        }
        Ok(())
    }

    pub fn emit_function_definitions(&self, ctx: &mut GenContext, stage: &mut ShaderStage) -> Result<()> {
        for &id in &self.graph.order {
            self.impls[id].emit_function_definition(id, self, ctx, stage)?;
        }
        Ok(())
    }

    /// Emit nodes with the given classification into `stage`, ignoring scopes.
    pub fn emit_classified(
        &self,
        class: Classification,
        ctx: &mut GenContext,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        for &id in &self.graph.order {
            if self.node(id).classification.intersects(class) {
                self.emit_node(id, ctx, stage)?;
            }
        }
        Ok(())
    }

    /// Look up a nodedef by name.
    pub fn nodedef(&self, name: &str) -> Result<&'a crate::schema::NodeDef> {
        self.library
            .nodedef(name)
            .ok_or_else(|| anyhow!("nodedef '{name}' is not in the library"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_document;
    use crate::shadergen::context::GenOptions;

    fn graph(json: &str) -> ShaderGraph {
        let doc = parse_document(json).unwrap();
        let lib = NodeLibrary::load_default().unwrap();
        let types = TypeRegistry::standard().unwrap();
        let options = GenOptions {
            constant_folding: false,
            ..GenOptions::default()
        };
        ShaderGraph::build(&doc, &lib, &types, &options).unwrap()
    }

    #[test]
    fn test_branch_only_nodes_are_scoped() {
        let g = graph(
            r#"{
                "nodes": [
                    { "id": "a", "category": "multiply", "type": "float" },
                    { "id": "b", "category": "add", "type": "float" },
                    { "id": "shared", "category": "add", "type": "float" },
                    { "id": "c", "category": "ifgreater", "type": "float" }
                ],
                "connections": [
                    { "from": { "nodeId": "a" }, "to": { "nodeId": "c", "portId": "in1" } },
                    { "from": { "nodeId": "b" }, "to": { "nodeId": "c", "portId": "in2" } },
                    { "from": { "nodeId": "shared" }, "to": { "nodeId": "a", "portId": "in1" } },
                    { "from": { "nodeId": "shared" }, "to": { "nodeId": "b", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "c" } } ]
            }"#,
        );
        let scopes = compute_scopes(&g);
        let id = |p: &str| g.nodes.iter().position(|n| n.path == p).unwrap();
        let c = id("c");
        assert_eq!(scopes[id("a")], Scope::Branch { cond: c, branch: 0 });
        assert_eq!(scopes[id("b")], Scope::Branch { cond: c, branch: 1 });
        assert_eq!(scopes[id("shared")], Scope::Global);
        assert_eq!(scopes[c], Scope::Global);
    }

    #[test]
    fn test_restricted_names_renamed_per_target() {
        let g = graph(
            r#"{
                "nodes": [ { "id": "vec3", "category": "add", "type": "float" } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "vec3" } } ]
            }"#,
        );
        let glsl = RunNames::new(&g, &syntax::glsl());
        assert_eq!(glsl.outputs[0], ["vec3_out"]);
        // `out` is a GLSL keyword, `output` is not.
        assert_eq!(glsl.graph_outputs, ["out1"]);
        let osl = RunNames::new(&g, &syntax::osl());
        assert_eq!(osl.graph_outputs, ["out"]);
    }

    #[test]
    fn test_builtin_function_names_are_not_shadowed() {
        let g = graph(
            r#"{
                "inputs": [ { "name": "normalize", "type": "float", "value": 0.5 } ],
                "nodes": [ { "id": "a", "category": "add", "type": "float", "interface": { "in1": "normalize" } } ],
                "outputs": [ { "name": "mix", "type": "float", "from": { "nodeId": "a" } } ]
            }"#,
        );
        for syntax in [syntax::glsl(), syntax::msl()] {
            let names = RunNames::new(&g, &syntax);
            assert!(names.sockets.iter().any(|s| s == "normalize1"), "{:?}", names.sockets);
            assert!(!names.sockets.iter().any(|s| s == "normalize"), "{:?}", names.sockets);
            assert_eq!(names.graph_outputs, ["mix1"]);
        }
    }

    #[test]
    fn test_implementation_table_falls_back_to_any_target() {
        let mut table = ImplementationTable::default();
        table.register("swizzle_color3", None, NodeImpl::Swizzle);
        table.register("swizzle_color3", Some(Target::Mdl), NodeImpl::Unsupported);
        assert!(matches!(table.get("swizzle_color3", Target::Glsl), Some(NodeImpl::Swizzle)));
        assert!(matches!(table.get("swizzle_color3", Target::Mdl), Some(NodeImpl::Unsupported)));
        assert!(table.get("swizzle_float", Target::Glsl).is_none());
    }
}
