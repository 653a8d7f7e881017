//! The shader graph: a flattened, typed and ordered DAG ready for emission.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Construction
//! binds every input, inserts implicit conversions and default geometric
//! nodes, rejects cycles, prunes dead nodes, folds constants and assigns
//! collision-free names. The result is target neutral: target-specific naming
//! happens per generation run.

mod flatten;
mod optimize;

use std::collections::HashMap;
use std::ops::{BitOr, BitOrAssign};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};

use crate::dsl::MaterialDocument;
use crate::graph::{topo_sort, upstream_reachable};
use crate::schema::{ANY_TYPE, NodeDef, NodeLibrary};
use crate::shadergen::context::{GenOptions, ShaderInterfaceType};
use crate::shadergen::error::GenError;
use crate::shadergen::types::{BaseType, TypeRef, TypeRegistry};
use crate::shadergen::utils::sanitize_ident;
use crate::shadergen::value::Value;

use flatten::Binding;

pub type NodeId = usize;

/// Node classification bit set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Classification(u32);

impl Classification {
    pub const NONE: Self = Self(0);
    pub const CONSTANT: Self = Self(1 << 0);
    pub const CLOSURE: Self = Self(1 << 1);
    pub const SHADER: Self = Self(1 << 2);
    pub const SURFACE: Self = Self(1 << 3);
    pub const BSDF: Self = Self(1 << 4);
    pub const EDF: Self = Self(1 << 5);
    pub const VDF: Self = Self(1 << 6);
    pub const CONDITIONAL: Self = Self(1 << 7);
    pub const TEXTURE: Self = Self(1 << 8);
    pub const GEOMETRIC: Self = Self(1 << 9);
    pub const LIGHT: Self = Self(1 << 10);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Classification {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Classification {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Categories whose nodes read geometric state.
pub const GEOMETRIC_CATEGORIES: &[&str] = &[
    "position",
    "normal",
    "tangent",
    "bitangent",
    "texcoord",
    "geomcolor",
    "geompropvalue",
    "time",
    "frame",
    "viewdirection",
];

pub const CONDITIONAL_CATEGORIES: &[&str] = &["switch", "compare", "ifgreater"];

/// Where a connected input reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Upstream {
    Node { node: NodeId, output: usize },
    /// A published input socket of the graph.
    Socket(usize),
}

#[derive(Clone, Debug)]
pub struct ShaderInput {
    pub name: String,
    pub ty: TypeRef,
    /// Literal value; kept for reference when the input is published.
    pub value: Option<Value>,
    pub upstream: Option<Upstream>,
    pub is_static: bool,
    /// `node/input` document path.
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct ShaderOutput {
    pub name: String,
    pub ty: TypeRef,
    /// Target-neutral variable name, `<node>_<output>`.
    pub variable: String,
}

#[derive(Clone, Debug)]
pub struct ShaderNode {
    /// Unique identifier derived from the path.
    pub name: String,
    /// Document path, `instance/inner` for inlined nodes.
    pub path: String,
    pub category: String,
    pub nodedef: String,
    pub classification: Classification,
    pub inputs: Vec<ShaderInput>,
    pub outputs: Vec<ShaderOutput>,
}

impl ShaderNode {
    pub fn input(&self, name: &str) -> Option<&ShaderInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&ShaderOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Literal value of a static (or otherwise unconnected) input.
    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.input(name)
            .filter(|i| i.upstream.is_none())
            .and_then(|i| i.value.as_ref())
    }
}

/// A published graph input, emitted as a uniform or shader parameter.
#[derive(Clone, Debug)]
pub struct InputSocket {
    pub name: String,
    pub ty: TypeRef,
    pub value: Option<Value>,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct OutputSocket {
    pub name: String,
    pub ty: TypeRef,
    pub upstream: Option<Upstream>,
    /// Set when folding reduced the output to a literal.
    pub value: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct ShaderGraph {
    pub nodes: Vec<ShaderNode>,
    pub input_sockets: Vec<InputSocket>,
    pub output_sockets: Vec<OutputSocket>,
    /// Topological order of `nodes`.
    pub order: Vec<NodeId>,
    /// Union of all node classifications.
    pub classification: Classification,
}

impl ShaderGraph {
    /// Build the graph for `doc` against `lib`.
    pub fn build(
        doc: &MaterialDocument,
        lib: &NodeLibrary,
        types: &TypeRegistry,
        options: &GenOptions,
    ) -> Result<Self> {
        let flat = flatten::flatten(doc, lib)?;

        let mut b = Builder {
            lib,
            types,
            nodes: Vec::new(),
            index: HashMap::new(),
            sockets: Vec::new(),
            socket_index: HashMap::new(),
            geomprops: HashMap::new(),
            converts: HashMap::new(),
        };

        for input in &doc.inputs {
            let ty = types
                .get(&input.ty)
                .with_context(|| format!("graph input '{}'", input.name))?;
            let value = match &input.value {
                Some(json) => Some(
                    Value::from_json(json, &ty)
                        .with_context(|| format!("graph input '{}'", input.name))?,
                ),
                None => None,
            };
            b.socket_index.insert(input.name.clone(), b.sockets.len());
            b.sockets.push(InputSocket {
                name: input.name.clone(),
                ty,
                value,
                path: input.name.clone(),
            });
        }

        // Shells first so connections may point forward in document order.
        let mut defs: Vec<&NodeDef> = Vec::with_capacity(flat.nodes.len());
        for f in &flat.nodes {
            let def = lib.resolve_nodedef(&f.path, &f.node)?;
            let id = b.add_shell(&f.path, def)?;
            b.index.insert(f.path.clone(), id);
            defs.push(def);
        }
        for (id, (f, def)) in flat.nodes.iter().zip(&defs).enumerate() {
            b.bind_inputs(id, def, &f.bindings, &f.node.input_types)?;
        }

        let mut output_sockets = Vec::with_capacity(flat.outputs.len());
        for out in &flat.outputs {
            let ty = types
                .get(&out.ty)
                .with_context(|| format!("graph output '{}'", out.name))?;
            let consumer = format!("<output {}>", out.name);
            let (upstream, value) = match &out.binding {
                Binding::Node { node, port } => {
                    let up = b.node_output(node, port)?;
                    (Some(b.connect(up, &ty, &consumer, "in")?), None)
                }
                Binding::Interface(name) => {
                    let s = b.socket(&consumer, name)?;
                    (Some(b.connect(Upstream::Socket(s), &ty, &consumer, "in")?), None)
                }
                Binding::Literal(json) => (
                    None,
                    Some(
                        Value::from_json(json, &ty)
                            .with_context(|| format!("graph output '{}'", out.name))?,
                    ),
                ),
            };
            output_sockets.push(OutputSocket {
                name: out.name.clone(),
                ty,
                upstream,
                value,
            });
        }

        let mut graph = ShaderGraph {
            nodes: b.nodes,
            input_sockets: b.sockets,
            output_sockets,
            order: Vec::new(),
            classification: Classification::NONE,
        };

        graph.sort()?;
        for path in graph.prune_unreachable() {
            warn!("dropping node '{path}': not connected to any output");
        }
        graph.sort()?;
        for node in &mut graph.nodes {
            node.classification = classify(node);
        }

        if options.constant_folding {
            let literal_math = options.shader_interface_type == ShaderInterfaceType::Reduced;
            let folded = optimize::fold_constants(&mut graph, types, literal_math)?;
            if folded > 0 {
                for path in graph.prune_unreachable() {
                    debug!("constant folding removed '{path}'");
                }
                graph.sort()?;
            }
        }

        graph.assign_names(options.shader_interface_type);
        graph.classification = graph
            .nodes
            .iter()
            .fold(Classification::NONE, |acc, n| acc | n.classification);
        Ok(graph)
    }

    pub fn node(&self, id: NodeId) -> &ShaderNode {
        &self.nodes[id]
    }

    /// Type carried by an upstream reference.
    pub fn upstream_type(&self, up: Upstream) -> &TypeRef {
        match up {
            Upstream::Node { node, output } => &self.nodes[node].outputs[output].ty,
            Upstream::Socket(s) => &self.input_sockets[s].ty,
        }
    }

    /// Nodes feeding `id` directly.
    pub fn upstream_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id].inputs.iter().filter_map(|i| match i.upstream {
            Some(Upstream::Node { node, .. }) => Some(node),
            _ => None,
        })
    }

    /// Number of input connections reading `node`'s outputs, output sockets included.
    pub fn consumer_count(&self, node: NodeId) -> usize {
        let reads = |u: &Option<Upstream>| matches!(u, Some(Upstream::Node { node: n, .. }) if *n == node);
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .filter(|i| reads(&i.upstream))
            .count()
            + self
                .output_sockets
                .iter()
                .filter(|s| reads(&s.upstream))
                .count()
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (id, _) in self.nodes.iter().enumerate() {
            for from in self.upstream_nodes(id) {
                edges.push((from, id));
            }
        }
        edges
    }

    fn sort(&mut self) -> Result<()> {
        match topo_sort(self.nodes.len(), &self.edges()) {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(cyclic) => Err(GenError::Cycle(
                cyclic.iter().map(|&i| self.nodes[i].path.clone()).collect(),
            )
            .into()),
        }
    }

    /// Remove nodes no output depends on. Returns the removed paths.
    fn prune_unreachable(&mut self) -> Vec<String> {
        let roots: Vec<NodeId> = self
            .output_sockets
            .iter()
            .filter_map(|s| match s.upstream {
                Some(Upstream::Node { node, .. }) => Some(node),
                _ => None,
            })
            .collect();
        let keep = upstream_reachable(self.nodes.len(), &self.edges(), &roots);
        if keep.iter().all(|&k| k) {
            return Vec::new();
        }

        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for (i, node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if keep[i] {
                remap[i] = Some(kept.len());
                kept.push(node);
            } else {
                removed.push(node.path);
            }
        }
        let fix = |u: &mut Option<Upstream>| {
            if let Some(Upstream::Node { node, .. }) = u {
                // Kept nodes only read kept nodes.
                if let Some(n) = remap[*node] {
                    *node = n;
                }
            }
        };
        for node in &mut kept {
            for input in &mut node.inputs {
                fix(&mut input.upstream);
            }
        }
        for socket in &mut self.output_sockets {
            fix(&mut socket.upstream);
        }
        self.nodes = kept;
        removed
    }

    /// Replace every read of `node`'s first output with `upstream`/`value`.
    pub(crate) fn bypass(&mut self, node: NodeId, upstream: Option<Upstream>, value: Option<Value>) {
        let target = Some(Upstream::Node { node, output: 0 });
        for n in &mut self.nodes {
            for input in &mut n.inputs {
                if input.upstream == target {
                    input.upstream = upstream;
                    input.value = value.clone();
                }
            }
        }
        for socket in &mut self.output_sockets {
            if socket.upstream == target {
                socket.upstream = upstream;
                socket.value = value.clone();
            }
        }
    }

    /// Give nodes and outputs unique identifiers in topological order, then
    /// publish the interface.
    fn assign_names(&mut self, interface: ShaderInterfaceType) {
        let mut ids: HashMap<String, usize> = HashMap::new();
        for socket in &self.input_sockets {
            ids.insert(sanitize_ident(&socket.name), 1);
        }
        for &id in &self.order {
            let node = &mut self.nodes[id];
            node.name = unique_name(sanitize_ident(&node.path), &mut ids);
            for out in &mut node.outputs {
                out.variable = unique_name(format!("{}_{}", node.name, out.name), &mut ids);
            }
        }

        for &id in &self.order {
            let node = &mut self.nodes[id];
            for input in &mut node.inputs {
                if input.upstream.is_some() || input.is_static || input.ty.is_closure() || !input.ty.editable {
                    continue;
                }
                let Some(value) = &input.value else {
                    continue;
                };
                let publish = input.ty.is_filename()
                    || (interface == ShaderInterfaceType::Complete && input.ty.base != BaseType::String);
                if !publish {
                    continue;
                }
                let name = unique_name(format!("{}_{}", node.name, input.name), &mut ids);
                input.upstream = Some(Upstream::Socket(self.input_sockets.len()));
                self.input_sockets.push(InputSocket {
                    name,
                    ty: input.ty.clone(),
                    value: Some(value.clone()),
                    path: input.path.clone(),
                });
            }
        }
    }
}

/// `name`, or `name<N>` with the next free counter when taken.
fn unique_name(name: String, ids: &mut HashMap<String, usize>) -> String {
    let Some(&seen) = ids.get(&name) else {
        ids.insert(name.clone(), 1);
        return name;
    };
    let mut counter = seen;
    let mut candidate = format!("{name}{counter}");
    while ids.contains_key(&candidate) {
        counter += 1;
        candidate = format!("{name}{counter}");
    }
    ids.insert(name, counter + 1);
    ids.insert(candidate.clone(), 1);
    candidate
}

fn classify(node: &ShaderNode) -> Classification {
    let mut c = Classification::NONE;
    let cat = node.category.as_str();
    if cat == "constant" {
        c |= Classification::CONSTANT;
    }
    if CONDITIONAL_CATEGORIES.contains(&cat) {
        c |= Classification::CONDITIONAL;
    }
    if cat == "image" {
        c |= Classification::TEXTURE;
    }
    if GEOMETRIC_CATEGORIES.contains(&cat) {
        c |= Classification::GEOMETRIC;
    }
    for out in &node.outputs {
        c |= match out.ty.name.as_str() {
            "BSDF" => Classification::CLOSURE | Classification::BSDF,
            "EDF" => Classification::CLOSURE | Classification::EDF,
            "VDF" => Classification::CLOSURE | Classification::VDF,
            "surfaceshader" | "material" => {
                Classification::CLOSURE | Classification::SHADER | Classification::SURFACE
            }
            "lightshader" => Classification::CLOSURE | Classification::SHADER | Classification::LIGHT,
            "volumeshader" => Classification::CLOSURE | Classification::SHADER,
            "displacementshader" => Classification::SHADER,
            _ => Classification::NONE,
        };
    }
    c
}

struct Builder<'a> {
    lib: &'a NodeLibrary,
    types: &'a TypeRegistry,
    nodes: Vec<ShaderNode>,
    index: HashMap<String, NodeId>,
    sockets: Vec<InputSocket>,
    socket_index: HashMap<String, usize>,
    geomprops: HashMap<String, NodeId>,
    converts: HashMap<(Upstream, String), NodeId>,
}

impl<'a> Builder<'a> {
    fn add_shell(&mut self, path: &str, def: &NodeDef) -> Result<NodeId> {
        let mut outputs = Vec::with_capacity(def.outputs.len());
        for o in &def.outputs {
            outputs.push(ShaderOutput {
                name: o.name.clone(),
                ty: self
                    .types
                    .get(&o.ty)
                    .with_context(|| format!("output '{}' of nodedef '{}'", o.name, def.name))?,
                variable: String::new(),
            });
        }
        self.nodes.push(ShaderNode {
            name: String::new(),
            path: path.to_string(),
            category: def.node.clone(),
            nodedef: def.name.clone(),
            classification: Classification::NONE,
            inputs: Vec::new(),
            outputs,
        });
        Ok(self.nodes.len() - 1)
    }

    fn node_output(&self, node: &str, port: &str) -> Result<Upstream> {
        let id = *self
            .index
            .get(node)
            .ok_or_else(|| GenError::UnknownNode(node.to_string()))?;
        let output = self.nodes[id]
            .outputs
            .iter()
            .position(|o| o.name == port)
            .ok_or_else(|| GenError::UnknownPort {
                node: node.to_string(),
                port: port.to_string(),
            })?;
        Ok(Upstream::Node { node: id, output })
    }

    fn socket(&self, consumer: &str, name: &str) -> Result<usize> {
        self.socket_index.get(name).copied().ok_or_else(|| {
            GenError::UnknownPort {
                node: consumer.to_string(),
                port: format!("interface input '{name}'"),
            }
            .into()
        })
    }

    fn upstream_info(&self, up: Upstream) -> (TypeRef, String, String) {
        match up {
            Upstream::Node { node, output } => {
                let n = &self.nodes[node];
                (
                    n.outputs[output].ty.clone(),
                    n.path.clone(),
                    n.outputs[output].name.clone(),
                )
            }
            Upstream::Socket(s) => (
                self.sockets[s].ty.clone(),
                format!("<input {}>", self.sockets[s].name),
                "value".to_string(),
            ),
        }
    }

    /// Connect `up` to an input of type `to`, inserting a conversion when the
    /// types differ and one is registered.
    fn connect(&mut self, up: Upstream, to: &TypeRef, consumer: &str, input: &str) -> Result<Upstream> {
        let (from, from_node, from_output) = self.upstream_info(up);
        if from == *to {
            return Ok(up);
        }
        if !from.is_closure() && !to.is_closure() && self.types.conversion(&from, to).is_some() {
            let conv = self.convert_node(up, &from, to, &from_node, &from_output)?;
            return Ok(Upstream::Node {
                node: conv,
                output: 0,
            });
        }
        Err(GenError::TypeMismatch {
            from_node,
            from_output,
            from_type: from.name.clone(),
            to_node: consumer.to_string(),
            to_input: input.to_string(),
            to_type: to.name.clone(),
        }
        .into())
    }

    fn convert_node(
        &mut self,
        up: Upstream,
        from: &TypeRef,
        to: &TypeRef,
        from_node: &str,
        from_output: &str,
    ) -> Result<NodeId> {
        let key = (up, to.name.clone());
        if let Some(&id) = self.converts.get(&key) {
            return Ok(id);
        }
        let lib = self.lib;
        let def = lib
            .nodedef(&format!("convert_{}", to.name))
            .ok_or_else(|| anyhow!("node library has no convert nodedef producing {}", to.name))?;
        let path = format!("{from_node}_{from_output}_to_{}", to.name);
        let id = self.add_shell(&path, def)?;
        self.nodes[id].inputs.push(ShaderInput {
            name: "in".to_string(),
            ty: from.clone(),
            value: None,
            upstream: Some(up),
            is_static: false,
            path: format!("{path}/in"),
        });
        self.converts.insert(key, id);
        Ok(id)
    }

    /// The shared node providing a default geometric property.
    fn geomprop_node(&mut self, geomprop: &str) -> Result<NodeId> {
        if let Some(&id) = self.geomprops.get(geomprop) {
            return Ok(id);
        }
        let (nodedef, port, value) = match geomprop {
            "UV0" => ("texcoord_vector2", "index", serde_json::json!(0)),
            "Pworld" => ("position_vector3", "space", serde_json::json!("world")),
            "Pobject" => ("position_vector3", "space", serde_json::json!("object")),
            "Nworld" => ("normal_vector3", "space", serde_json::json!("world")),
            "Nobject" => ("normal_vector3", "space", serde_json::json!("object")),
            "Tworld" => ("tangent_vector3", "space", serde_json::json!("world")),
            "Bworld" => ("bitangent_vector3", "space", serde_json::json!("world")),
            other => return Err(anyhow!("unknown default geometric property '{other}'")),
        };
        let lib = self.lib;
        let def = lib
            .nodedef(nodedef)
            .ok_or_else(|| anyhow!("node library has no '{nodedef}' for geomprop {geomprop}"))?;
        let id = self.add_shell(&format!("geomprop_{geomprop}"), def)?;
        self.geomprops.insert(geomprop.to_string(), id);
        let bindings = HashMap::from([(port.to_string(), Binding::Literal(value))]);
        self.bind_inputs(id, def, &bindings, &HashMap::new())?;
        Ok(id)
    }

    /// Type of an untyped `any` input, taken from its producer. A closure may
    /// only feed an `any` input of a node that itself produces a closure.
    fn infer_any(&self, up: Upstream, def: &NodeDef, consumer: &str, input: &str) -> Result<TypeRef> {
        let (from, from_node, from_output) = self.upstream_info(up);
        if from.is_closure() {
            let closure_out = def
                .outputs
                .iter()
                .any(|o| self.types.get(&o.ty).is_ok_and(|t| t.is_closure()));
            if !closure_out {
                return Err(GenError::TypeMismatch {
                    from_node,
                    from_output,
                    from_type: from.name.clone(),
                    to_node: consumer.to_string(),
                    to_input: input.to_string(),
                    to_type: ANY_TYPE.to_string(),
                }
                .into());
            }
        }
        Ok(from)
    }

    fn bind_inputs(
        &mut self,
        id: NodeId,
        def: &NodeDef,
        bindings: &HashMap<String, Binding>,
        input_types: &HashMap<String, String>,
    ) -> Result<()> {
        let path = self.nodes[id].path.clone();
        let mut bound: Vec<&String> = bindings.keys().collect();
        bound.sort();
        if let Some(port) = bound.into_iter().find(|p| def.input(p).is_none()) {
            return Err(GenError::UnknownPort {
                node: path,
                port: port.clone(),
            }
            .into());
        }

        let mut inputs = Vec::with_capacity(def.inputs.len());
        for port in &def.inputs {
            let declared = if port.ty == ANY_TYPE {
                match input_types.get(&port.name) {
                    Some(t) => Some(self.types.get(t)?),
                    None => None,
                }
            } else {
                Some(
                    self.types
                        .get(&port.ty)
                        .with_context(|| format!("input '{}' of node '{path}'", port.name))?,
                )
            };
            let missing = || -> anyhow::Error {
                GenError::MissingInput {
                    node: path.clone(),
                    category: def.node.clone(),
                    input: port.name.clone(),
                }
                .into()
            };

            let (ty, value, upstream) = match bindings.get(&port.name) {
                Some(Binding::Node { node, port: out }) => {
                    let up = self.node_output(node, out)?;
                    let ty = match declared {
                        Some(t) => t,
                        None => self.infer_any(up, def, &path, &port.name)?,
                    };
                    let up = self.connect(up, &ty, &path, &port.name)?;
                    (ty, None, Some(up))
                }
                Some(Binding::Interface(name)) => {
                    let s = self.socket(&path, name)?;
                    let ty = match declared {
                        Some(t) => t,
                        None => self.infer_any(Upstream::Socket(s), def, &path, &port.name)?,
                    };
                    let up = self.connect(Upstream::Socket(s), &ty, &path, &port.name)?;
                    (ty, None, Some(up))
                }
                Some(Binding::Literal(json)) => {
                    let ty = declared.ok_or_else(missing)?;
                    let v = Value::from_json(json, &ty)
                        .with_context(|| format!("input '{}' of node '{path}'", port.name))?;
                    (ty, Some(v), None)
                }
                None => {
                    let ty = declared.ok_or_else(missing)?;
                    if ty.is_closure() {
                        (ty, None, None)
                    } else if let Some(json) = &port.value {
                        let v = Value::from_json(json, &ty).with_context(|| {
                            format!("default of input '{}' in nodedef '{}'", port.name, def.name)
                        })?;
                        (ty, Some(v), None)
                    } else if let Some(gp) = &port.defaultgeomprop {
                        let g = self.geomprop_node(gp)?;
                        let up = self.connect(Upstream::Node { node: g, output: 0 }, &ty, &path, &port.name)?;
                        (ty, None, Some(up))
                    } else {
                        return Err(missing());
                    }
                }
            };

            if port.is_static && upstream.is_some() {
                return Err(GenError::InvalidValue {
                    ty: ty.name.clone(),
                    reason: format!(
                        "static input '{}' of node '{path}' must be a literal",
                        port.name
                    ),
                }
                .into());
            }
            inputs.push(ShaderInput {
                name: port.name.clone(),
                ty,
                value,
                upstream,
                is_static: port.is_static,
                path: format!("{path}/{}", port.name),
            });
        }
        self.nodes[id].inputs = inputs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_document;

    fn build_with(json: &str, options: &GenOptions) -> Result<ShaderGraph> {
        let doc = parse_document(json).unwrap();
        let lib = NodeLibrary::load_default().unwrap();
        let types = TypeRegistry::standard().unwrap();
        ShaderGraph::build(&doc, &lib, &types, options)
    }

    fn build(json: &str) -> Result<ShaderGraph> {
        build_with(
            json,
            &GenOptions {
                constant_folding: false,
                ..GenOptions::default()
            },
        )
    }

    fn find<'g>(graph: &'g ShaderGraph, path: &str) -> &'g ShaderNode {
        graph
            .nodes
            .iter()
            .find(|n| n.path == path)
            .unwrap_or_else(|| panic!("no node '{path}'"))
    }

    #[test]
    fn test_implicit_convert_inserted() {
        let g = build(
            r#"{
                "nodes": [
                    { "id": "f", "category": "multiply", "type": "float", "params": { "in1": 0.5, "in2": 2.0 } },
                    { "id": "c", "category": "add", "type": "color3" }
                ],
                "connections": [
                    { "from": { "nodeId": "f" }, "to": { "nodeId": "c", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "c" } } ]
            }"#,
        )
        .unwrap();
        let conv = find(&g, "f_out_to_color3");
        assert_eq!(conv.category, "convert");
        assert_eq!(conv.inputs[0].ty.name, "float");
        let c = find(&g, "c");
        let Some(Upstream::Node { node, .. }) = c.input("in1").unwrap().upstream else {
            panic!("in1 should be connected");
        };
        assert_eq!(g.nodes[node].path, "f_out_to_color3");
    }

    #[test]
    fn test_closure_to_numeric_is_type_mismatch() {
        let err = build(
            r#"{
                "nodes": [
                    { "id": "brdf", "category": "diffuse_bsdf", "type": "BSDF" },
                    { "id": "sum", "category": "add", "type": "color3" }
                ],
                "connections": [
                    { "from": { "nodeId": "brdf" }, "to": { "nodeId": "sum", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "sum" } } ]
            }"#,
        )
        .unwrap_err();
        let gen_err = err.downcast_ref::<GenError>().unwrap();
        assert!(gen_err.is_type_error());
        let msg = gen_err.to_string();
        assert!(msg.contains("'brdf'") && msg.contains("'sum'"), "{msg}");
    }

    #[test]
    fn test_closure_into_untyped_input_is_type_mismatch() {
        for (category, extra) in [("convert", ""), ("swizzle", r#", "params": { "channels": "rgb" }"#)] {
            let json = format!(
                r#"{{
                    "nodes": [
                        {{ "id": "brdf", "category": "diffuse_bsdf", "type": "BSDF" }},
                        {{ "id": "cv", "category": "{category}", "type": "color3"{extra} }}
                    ],
                    "connections": [
                        {{ "from": {{ "nodeId": "brdf" }}, "to": {{ "nodeId": "cv", "portId": "in" }} }}
                    ],
                    "outputs": [ {{ "name": "out", "type": "color3", "from": {{ "nodeId": "cv" }} }} ]
                }}"#
            );
            let err = build(&json).unwrap_err();
            match err.downcast_ref::<GenError>() {
                Some(GenError::TypeMismatch { from_node, to_node, to_input, .. }) => {
                    assert_eq!(from_node, "brdf", "{category}");
                    assert_eq!(to_node, "cv", "{category}");
                    assert_eq!(to_input, "in", "{category}");
                }
                other => panic!("{category}: unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let err = build(
            r#"{
                "nodes": [
                    { "id": "a", "category": "add", "type": "float" },
                    { "id": "b", "category": "add", "type": "float" }
                ],
                "connections": [
                    { "from": { "nodeId": "a" }, "to": { "nodeId": "b", "portId": "in1" } },
                    { "from": { "nodeId": "b" }, "to": { "nodeId": "a", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "b" } } ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GenError>(),
            Some(&GenError::Cycle(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_unreachable_nodes_pruned() {
        let g = build(
            r#"{
                "nodes": [
                    { "id": "used", "category": "add", "type": "float" },
                    { "id": "unused", "category": "add", "type": "float" }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "used" } } ]
            }"#,
        )
        .unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert_eq!(g.nodes[0].path, "used");
        assert_eq!(g.order, vec![0]);
    }

    #[test]
    fn test_defaultgeomprop_node_is_shared() {
        let g = build(
            r#"{
                "nodes": [
                    { "id": "img1", "category": "image", "type": "color3", "params": { "file": "a.png" } },
                    { "id": "img2", "category": "image", "type": "color3", "params": { "file": "b.png" } },
                    { "id": "sum", "category": "add", "type": "color3" }
                ],
                "connections": [
                    { "from": { "nodeId": "img1" }, "to": { "nodeId": "sum", "portId": "in1" } },
                    { "from": { "nodeId": "img2" }, "to": { "nodeId": "sum", "portId": "in2" } }
                ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "sum" } } ]
            }"#,
        )
        .unwrap();
        let uv: Vec<_> = g.nodes.iter().filter(|n| n.category == "texcoord").collect();
        assert_eq!(uv.len(), 1);
        assert_eq!(uv[0].path, "geomprop_UV0");
        let uv_id = g.nodes.iter().position(|n| n.category == "texcoord").unwrap();
        assert_eq!(g.consumer_count(uv_id), 2);
        assert!(g.classification.contains(Classification::TEXTURE | Classification::GEOMETRIC));
    }

    #[test]
    fn test_static_input_must_be_literal() {
        let err = build(
            r#"{
                "nodes": [
                    { "id": "i", "category": "constant", "type": "integer", "params": { "value": 1 } },
                    { "id": "uv", "category": "texcoord", "type": "vector2" }
                ],
                "connections": [
                    { "from": { "nodeId": "i" }, "to": { "nodeId": "uv", "portId": "index" } }
                ],
                "outputs": [ { "name": "out", "type": "vector2", "from": { "nodeId": "uv" } } ]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenError>(),
            Some(GenError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_required_input() {
        let err = build(
            r#"{
                "nodes": [ { "id": "cv", "category": "convert", "type": "color3" } ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "cv" } } ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GenError>(),
            Some(&GenError::MissingInput {
                node: "cv".to_string(),
                category: "convert".to_string(),
                input: "in".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_input_name_rejected() {
        let err = build(
            r#"{
                "nodes": [ { "id": "a", "category": "add", "type": "float", "params": { "in3": 1.0 } } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "a" } } ]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenError>(),
            Some(GenError::UnknownPort { port, .. }) if port == "in3"
        ));
    }

    #[test]
    fn test_names_unique_after_sanitizing() {
        let g = build(
            r#"{
                "nodes": [
                    { "id": "a_b", "category": "add", "type": "float" },
                    { "id": "a.b", "category": "add", "type": "float" }
                ],
                "connections": [
                    { "from": { "nodeId": "a_b" }, "to": { "nodeId": "a.b", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "a.b" } } ]
            }"#,
        )
        .unwrap();
        assert_eq!(find(&g, "a_b").name, "a_b");
        assert_eq!(find(&g, "a.b").name, "a_b1");
        assert_eq!(find(&g, "a.b").outputs[0].variable, "a_b1_out");
    }

    #[test]
    fn test_complete_and_reduced_interfaces() {
        let json = r#"{
            "nodes": [ { "id": "m", "category": "multiply", "type": "color3", "params": { "in1": [1, 0, 0] } } ],
            "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "m" } } ]
        }"#;
        let complete = build(json).unwrap();
        let names: Vec<_> = complete.input_sockets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["m_in1", "m_in2"]);
        assert_eq!(complete.input_sockets[0].path, "m/in1");

        let reduced = build_with(
            json,
            &GenOptions {
                shader_interface_type: ShaderInterfaceType::Reduced,
                constant_folding: false,
                ..GenOptions::default()
            },
        )
        .unwrap();
        assert!(reduced.input_sockets.is_empty());
    }

    #[test]
    fn test_folding_reduces_constants_to_literal() {
        let g = build_with(
            r#"{
                "nodes": [
                    { "id": "k", "category": "constant", "type": "color3", "params": { "value": [0.5, 0.5, 0.5] } },
                    { "id": "m", "category": "multiply", "type": "color3", "params": { "in2": 2.0 } },
                    { "id": "d", "category": "dot", "type": "color3" }
                ],
                "connections": [
                    { "from": { "nodeId": "k" }, "to": { "nodeId": "m", "portId": "in1" } },
                    { "from": { "nodeId": "m" }, "to": { "nodeId": "d", "portId": "in" } }
                ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "d" } } ]
            }"#,
            &GenOptions {
                shader_interface_type: ShaderInterfaceType::Reduced,
                ..GenOptions::default()
            },
        )
        .unwrap();
        assert!(g.nodes.is_empty());
        assert!(g.input_sockets.is_empty());
        assert_eq!(g.output_sockets[0].upstream, None);
        assert_eq!(g.output_sockets[0].value, Some(Value::Floats(vec![1.0, 1.0, 1.0])));
    }

    #[test]
    fn test_complete_interface_keeps_literal_arithmetic() {
        let g = build_with(
            r#"{
                "nodes": [ { "id": "m", "category": "multiply", "type": "float", "params": { "in1": 0.5, "in2": 2.0 } } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "m" } } ]
            }"#,
            &GenOptions::default(),
        )
        .unwrap();
        assert_eq!(g.nodes.len(), 1);
        let names: Vec<_> = g.input_sockets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["m_in1", "m_in2"]);
        assert_eq!(g.input_sockets[1].value, Some(Value::Float(2.0)));
    }

    #[test]
    fn test_socket_binding_through_interface() {
        let g = build(
            r#"{
                "inputs": [ { "name": "base", "type": "float", "value": 0.25 } ],
                "nodes": [ { "id": "a", "category": "add", "type": "color3", "interface": { "in1": "base" } } ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "a" } } ]
            }"#,
        )
        .unwrap();
        // float socket -> color3 input goes through a convert node.
        let conv = find(&g, "<input base>_value_to_color3");
        assert_eq!(conv.inputs[0].upstream, Some(Upstream::Socket(0)));
    }
}
