//! Inlining of node graph instances.
//!
//! A document node whose category is implemented by a node graph (local to the
//! document or from the library) is replaced by the graph's nodes, renamed
//! `<instance>/<inner>`. References to the instance's outputs are redirected to
//! the inner nodes that produce them.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};

use crate::dsl::{Connection, MaterialDocument, Node, NodeGraphDef};
use crate::schema::NodeLibrary;
use crate::shadergen::error::GenError;

pub(crate) const MAX_NESTING: usize = 64;

/// What a node input is bound to after flattening.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Binding {
    Literal(serde_json::Value),
    Node { node: String, port: String },
    /// A document-level input socket.
    Interface(String),
}

#[derive(Clone, Debug)]
pub(crate) struct FlatNode {
    /// Unique path, `instance/inner` for inlined nodes.
    pub path: String,
    pub node: Node,
    pub bindings: HashMap<String, Binding>,
}

#[derive(Clone, Debug)]
pub(crate) struct FlatOutput {
    pub name: String,
    pub ty: String,
    pub binding: Binding,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FlatGraph {
    pub nodes: Vec<FlatNode>,
    pub outputs: Vec<FlatOutput>,
}

/// Interface inputs visible at one nesting level. `None` marks an input that
/// is declared but bound to nothing, so the inner nodedef default applies.
type Interface = HashMap<String, Option<Binding>>;

struct Flattener<'a> {
    doc: &'a MaterialDocument,
    lib: &'a NodeLibrary,
    nodes: Vec<FlatNode>,
    redirects: HashMap<(String, String), Binding>,
}

pub(crate) fn flatten(doc: &MaterialDocument, lib: &NodeLibrary) -> Result<FlatGraph> {
    let mut f = Flattener {
        doc,
        lib,
        nodes: Vec::new(),
        redirects: HashMap::new(),
    };
    let top: Interface = doc
        .inputs
        .iter()
        .map(|i| (i.name.clone(), Some(Binding::Interface(i.name.clone()))))
        .collect();
    f.expand(&doc.nodes, &doc.connections, "", &top, 0)?;

    let mut nodes = std::mem::take(&mut f.nodes);
    for node in &mut nodes {
        for binding in node.bindings.values_mut() {
            *binding = f.resolve(binding)?;
        }
    }
    let mut outputs = Vec::with_capacity(doc.outputs.len());
    for out in &doc.outputs {
        let binding = f.resolve(&Binding::Node {
            node: out.from.node_id.clone(),
            port: out.from.port_id.clone(),
        })?;
        outputs.push(FlatOutput {
            name: out.name.clone(),
            ty: out.ty.clone(),
            binding,
        });
    }
    Ok(FlatGraph { nodes, outputs })
}

impl<'a> Flattener<'a> {
    fn nodegraph(&self, node: &Node) -> Option<&'a NodeGraphDef> {
        if node.nodedef.is_some() {
            return None;
        }
        self.doc
            .nodegraphs
            .iter()
            .find(|g| g.node == node.category && g.ty == node.output_type)
            .or_else(|| self.lib.nodegraph(&node.category, &node.output_type))
    }

    fn expand(
        &mut self,
        nodes: &'a [Node],
        connections: &'a [Connection],
        prefix: &str,
        iface: &Interface,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_NESTING {
            bail!("node graph nesting exceeds {MAX_NESTING} levels at '{prefix}'");
        }
        for node in nodes {
            let path = format!("{prefix}{}", node.id);

            // Precedence, lowest first: interface, literal, connection.
            let mut bindings: HashMap<String, Binding> = HashMap::new();
            for (port, name) in &node.interface {
                match iface.get(name) {
                    Some(Some(b)) => {
                        bindings.insert(port.clone(), b.clone());
                    }
                    Some(None) => {}
                    None => {
                        return Err(GenError::UnknownPort {
                            node: path,
                            port: format!("interface input '{name}'"),
                        }
                        .into());
                    }
                }
            }
            for (port, value) in &node.params {
                bindings.insert(port.clone(), Binding::Literal(value.clone()));
            }
            for c in connections.iter().filter(|c| c.to.node_id == node.id) {
                bindings.insert(
                    c.to.port_id.clone(),
                    Binding::Node {
                        node: format!("{prefix}{}", c.from.node_id),
                        port: c.from.port_id.clone(),
                    },
                );
            }

            let Some(ng) = self.nodegraph(node) else {
                self.nodes.push(FlatNode {
                    path,
                    node: node.clone(),
                    bindings,
                });
                continue;
            };

            let inner_prefix = format!("{path}/");
            let inner: Interface = ng
                .inputs
                .iter()
                .map(|input| {
                    let b = bindings
                        .get(&input.name)
                        .cloned()
                        .or_else(|| input.value.clone().map(Binding::Literal));
                    (input.name.clone(), b)
                })
                .collect();
            self.expand(&ng.nodes, &ng.connections, &inner_prefix, &inner, depth + 1)
                .with_context(|| format!("while inlining node graph '{}' at '{path}'", ng.name))?;
            for out in &ng.outputs {
                self.redirects.insert(
                    (path.clone(), out.name.clone()),
                    Binding::Node {
                        node: format!("{inner_prefix}{}", out.from.node_id),
                        port: out.from.port_id.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Follow instance-output redirects until a real node output is reached.
    fn resolve(&self, binding: &Binding) -> Result<Binding> {
        let mut cur = binding.clone();
        for _ in 0..=MAX_NESTING {
            let Binding::Node { node, port } = &cur else {
                return Ok(cur);
            };
            match self.redirects.get(&(node.clone(), port.clone())) {
                Some(next) => cur = next.clone(),
                None => return Ok(cur),
            }
        }
        bail!("node graph output chain too deep starting at {binding:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_document;

    fn lib() -> NodeLibrary {
        NodeLibrary::load_default().unwrap()
    }

    #[test]
    fn test_inline_local_nodegraph() {
        let doc = parse_document(
            r#"{
                "nodes": [
                    { "id": "g", "category": "double_it", "type": "float", "params": { "x": 0.25 } },
                    { "id": "m", "category": "multiply", "type": "float", "params": { "in2": 3.0 } }
                ],
                "connections": [
                    { "from": { "nodeId": "g", "portId": "out" }, "to": { "nodeId": "m", "portId": "in1" } }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "m" } } ],
                "nodegraphs": [
                    {
                        "name": "NG_double_it", "node": "double_it", "type": "float",
                        "inputs": [ { "name": "x", "type": "float", "value": 1.0 } ],
                        "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "a" } } ],
                        "nodes": [
                            { "id": "a", "category": "add", "type": "float", "interface": { "in1": "x", "in2": "x" } }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();
        let flat = flatten(&doc, &lib()).unwrap();
        let paths: Vec<_> = flat.nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, ["g/a", "m"]);
        assert_eq!(
            flat.nodes[0].bindings["in1"],
            Binding::Literal(serde_json::json!(0.25))
        );
        assert_eq!(
            flat.nodes[1].bindings["in1"],
            Binding::Node {
                node: "g/a".to_string(),
                port: "out".to_string()
            }
        );
    }

    #[test]
    fn test_nodegraph_default_when_instance_unbound() {
        let doc = parse_document(
            r#"{
                "inputs": [ { "name": "tint", "type": "color3", "value": [1, 0, 0] } ],
                "nodes": [ { "id": "lum", "category": "luminance", "type": "color3", "interface": { "in": "tint" } } ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "lum" } } ]
            }"#,
        )
        .unwrap();
        let flat = flatten(&doc, &lib()).unwrap();
        assert!(flat.nodes.iter().all(|n| n.path.starts_with("lum/")));
        assert!(
            flat.nodes
                .iter()
                .flat_map(|n| n.bindings.values())
                .any(|b| *b == Binding::Interface("tint".to_string()))
        );
        assert!(matches!(flat.outputs[0].binding, Binding::Node { ref node, .. } if node.starts_with("lum/")));
    }

    #[test]
    fn test_recursive_nodegraph_hits_nesting_limit() {
        let doc = parse_document(
            r#"{
                "nodes": [ { "id": "r", "category": "forever", "type": "float" } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "r" } } ],
                "nodegraphs": [
                    {
                        "name": "NG_forever", "node": "forever", "type": "float",
                        "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "again" } } ],
                        "nodes": [ { "id": "again", "category": "forever", "type": "float" } ]
                    }
                ]
            }"#,
        )
        .unwrap();
        let err = flatten(&doc, &lib()).unwrap_err();
        assert!(format!("{err:#}").contains("nesting exceeds 64"));
    }

    #[test]
    fn test_unknown_interface_name() {
        let doc = parse_document(
            r#"{
                "nodes": [ { "id": "a", "category": "add", "type": "float", "interface": { "in1": "nope" } } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "a" } } ]
            }"#,
        )
        .unwrap();
        let err = flatten(&doc, &lib()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenError>(),
            Some(GenError::UnknownPort { .. })
        ));
    }
}
