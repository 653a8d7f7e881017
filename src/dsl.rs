//! The material document: a JSON description of a node graph with resolved
//! nodes, connections, published inputs and named outputs.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MaterialDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Graph-level inputs; nodes bind to them through `interface`.
    #[serde(default)]
    pub inputs: Vec<GraphInput>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    pub outputs: Vec<GraphOutput>,
    /// Node graph definitions local to this document. They take precedence
    /// over library node graphs implementing the same category.
    #[serde(default)]
    pub nodegraphs: Vec<NodeGraphDef>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub from: Endpoint,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Node {
    pub id: String,
    /// Node category (`add`, `image`, `surface`, ...).
    pub category: String,
    /// Output type; `multioutput` for nodes with several outputs.
    #[serde(rename = "type")]
    pub output_type: String,
    /// Explicit nodedef name, bypassing lookup by category and types.
    #[serde(default)]
    pub nodedef: Option<String>,
    /// Literal input values by input name.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Inputs bound to an enclosing interface input: input name -> interface name.
    #[serde(default)]
    pub interface: HashMap<String, String>,
    /// Input types, used to pick between nodedefs and to type `any` inputs.
    #[serde(default, rename = "inputTypes")]
    pub input_types: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "portId", default = "default_port")]
    pub port_id: String,
}

fn default_port() -> String {
    "out".to_string()
}

/// A node graph implementing a node category by composition.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeGraphDef {
    pub name: String,
    /// Category this graph implements.
    pub node: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub inputs: Vec<GraphInput>,
    pub outputs: Vec<GraphOutput>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

pub fn load_document_from_path(path: impl AsRef<std::path::Path>) -> Result<MaterialDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read material json at {}", path.display()))?;
    parse_document(&text).with_context(|| format!("in {}", path.display()))
}

pub fn parse_document(text: &str) -> Result<MaterialDocument> {
    serde_json::from_str(text).context("failed to parse material json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let doc = parse_document(
            r#"{
                "nodes": [
                    { "id": "c1", "category": "constant", "type": "color3", "params": { "value": [1, 0.5, 0] } }
                ],
                "outputs": [ { "name": "out", "type": "color3", "from": { "nodeId": "c1" } } ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.version, "1.0");
        assert_eq!(doc.outputs[0].from.port_id, "out");
        let node = &doc.nodes[0];
        assert_eq!(node.output_type, "color3");
        assert!(node.params["value"].is_array());
        assert!(node.interface.is_empty());
    }

    #[test]
    fn test_local_nodegraph_and_ports() {
        let doc = parse_document(
            r#"{
                "nodes": [ { "id": "n", "category": "halve", "type": "float", "inputTypes": { "in": "float" } } ],
                "connections": [
                    { "from": { "nodeId": "a" }, "to": { "nodeId": "n", "portId": "in" } }
                ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "n", "portId": "out" } } ],
                "nodegraphs": [
                    {
                        "name": "NG_halve_float", "node": "halve", "type": "float",
                        "inputs": [ { "name": "in", "type": "float", "value": 0.0 } ],
                        "nodes": [ { "id": "m", "category": "multiply", "type": "float",
                                     "interface": { "in1": "in" }, "params": { "in2": 0.5 } } ],
                        "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "m" } } ]
                    }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.connections[0].id, "");
        assert_eq!(doc.connections[0].to.port_id, "in");
        assert_eq!(doc.nodes[0].input_types["in"], "float");
        let ng = &doc.nodegraphs[0];
        assert_eq!(ng.node, "halve");
        assert_eq!(ng.nodes[0].interface["in1"], "in");
    }
}
