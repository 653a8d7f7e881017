//! Node library: nodedefs, per-target implementations and library node graphs.
//!
//! The bundled library lives in `assets/stdlib.json`. A nodedef may declare
//! `types`, in which case it is expanded once per type: the placeholder `T` in
//! its port types is substituted and the expanded name is `<name>_<type>`.
//! Implementations referring to the template name apply to every expansion.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

use crate::dsl::{MaterialDocument, Node, NodeGraphDef};
use crate::shadergen::error::GenError;
use crate::shadergen::target::Target;
use crate::shadergen::types::TypeRegistry;

const DEFAULT_LIBRARY_JSON: &str = include_str!("../assets/stdlib.json");

/// Port type accepting any type; the concrete type comes from the document.
pub const ANY_TYPE: &str = "any";
pub const MULTI_OUTPUT: &str = "multioutput";
const TYPE_PLACEHOLDER: &str = "T";

#[derive(Debug, Clone, Deserialize)]
struct RawLibrary {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    #[serde(default)]
    nodedefs: Vec<RawNodeDef>,
    #[serde(default)]
    implementations: Vec<RawImplementation>,
    #[serde(default)]
    nodegraphs: Vec<NodeGraphDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNodeDef {
    name: String,
    node: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    inputs: Vec<PortDef>,
    outputs: Vec<PortDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawImplementation {
    nodedef: String,
    targets: Vec<Target>,
    #[serde(default)]
    inline: Option<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, rename = "extraArgs")]
    extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Geometric property bound when the input is left unconnected (`UV0`, `Nworld`, ...).
    #[serde(default)]
    pub defaultgeomprop: Option<String>,
    /// The input selects code paths and must carry a literal.
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct NodeDef {
    pub name: String,
    /// Category implemented by this nodedef.
    pub node: String,
    /// Template this nodedef was expanded from, and the type it was expanded with.
    pub template: Option<(String, String)>,
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl NodeDef {
    pub fn input(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// The node-level type: the single output's type, or `multioutput`.
    pub fn output_type(&self) -> &str {
        match self.outputs.as_slice() {
            [single] => &single.ty,
            _ => MULTI_OUTPUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImplementationSource {
    /// Expression template with `{{input}}` placeholders.
    Inline(String),
    /// A named function whose definition is emitted once per stage.
    Function { name: String, source: String },
}

#[derive(Debug, Clone)]
pub struct Implementation {
    pub nodedef: String,
    pub targets: Vec<Target>,
    pub source: ImplementationSource,
    /// Extra call arguments placed after the inputs (may contain tokens).
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeLibrary {
    nodedefs: Vec<NodeDef>,
    by_name: HashMap<String, usize>,
    implementations: Vec<Implementation>,
    nodegraphs: Vec<NodeGraphDef>,
}

impl NodeLibrary {
    pub fn load_default() -> Result<Self> {
        Self::from_json_str(DEFAULT_LIBRARY_JSON)
            .map_err(|e| anyhow!("failed to load assets/stdlib.json: {e:#}"))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawLibrary =
            serde_json::from_str(text).map_err(|e| anyhow!("failed to parse node library: {e}"))?;
        let mut lib = NodeLibrary::default();
        lib.add_raw(raw)?;
        Ok(lib)
    }

    /// Merge another library document on top of this one. Nodedefs with an
    /// existing name replace the earlier definition.
    pub fn merge_json_str(&mut self, text: &str) -> Result<()> {
        let raw: RawLibrary =
            serde_json::from_str(text).map_err(|e| anyhow!("failed to parse node library: {e}"))?;
        self.add_raw(raw)
    }

    fn add_raw(&mut self, raw: RawLibrary) -> Result<()> {
        for def in raw.nodedefs {
            if def.types.is_empty() {
                self.insert_nodedef(NodeDef {
                    name: def.name,
                    node: def.node,
                    template: None,
                    inputs: def.inputs,
                    outputs: def.outputs,
                });
                continue;
            }
            for ty in &def.types {
                let subst = |ports: &[PortDef]| -> Vec<PortDef> {
                    ports
                        .iter()
                        .map(|p| PortDef {
                            ty: if p.ty == TYPE_PLACEHOLDER {
                                ty.clone()
                            } else {
                                p.ty.clone()
                            },
                            ..p.clone()
                        })
                        .collect()
                };
                self.insert_nodedef(NodeDef {
                    name: format!("{}_{ty}", def.name),
                    node: def.node.clone(),
                    template: Some((def.name.clone(), ty.clone())),
                    inputs: subst(&def.inputs),
                    outputs: subst(&def.outputs),
                });
            }
        }

        for imp in raw.implementations {
            let source = match (imp.inline, imp.function, imp.source) {
                (Some(inline), None, _) => ImplementationSource::Inline(inline),
                (None, Some(name), Some(source)) => ImplementationSource::Function { name, source },
                _ => bail!(
                    "implementation of '{}' must have either 'inline' or 'function' + 'source'",
                    imp.nodedef
                ),
            };
            // Later implementations for the same nodedef and target win.
            self.implementations.insert(
                0,
                Implementation {
                    nodedef: imp.nodedef,
                    targets: imp.targets,
                    source,
                    extra_args: imp.extra_args,
                },
            );
        }

        for ng in raw.nodegraphs.into_iter().rev() {
            self.nodegraphs.insert(0, ng);
        }
        Ok(())
    }

    fn insert_nodedef(&mut self, def: NodeDef) {
        match self.by_name.get(&def.name) {
            Some(&i) => self.nodedefs[i] = def,
            None => {
                self.by_name.insert(def.name.clone(), self.nodedefs.len());
                self.nodedefs.push(def);
            }
        }
    }

    pub fn nodedef(&self, name: &str) -> Option<&NodeDef> {
        self.by_name.get(name).map(|&i| &self.nodedefs[i])
    }

    pub fn nodedefs(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodedefs.iter()
    }

    /// Pick the nodedef for a document node: the explicit `nodedef` if given,
    /// otherwise the first nodedef of the category whose output type matches
    /// and whose inputs accept every declared `inputTypes` entry.
    pub fn resolve_nodedef(&self, node_path: &str, node: &Node) -> Result<&NodeDef> {
        if let Some(name) = &node.nodedef {
            return self.nodedef(name).ok_or_else(|| {
                anyhow::Error::from(GenError::UnknownCategory {
                    node: node_path.to_string(),
                    category: node.category.clone(),
                })
                .context(format!("nodedef '{name}' is not in the library"))
            });
        }
        self.nodedefs
            .iter()
            .filter(|d| d.node == node.category && d.output_type() == node.output_type)
            .find(|d| {
                node.input_types.iter().all(|(port, ty)| {
                    d.input(port)
                        .is_some_and(|p| p.ty == *ty || p.ty == ANY_TYPE)
                })
            })
            .ok_or_else(|| {
                GenError::UnknownCategory {
                    node: node_path.to_string(),
                    category: format!("{}<{}>", node.category, node.output_type),
                }
                .into()
            })
    }

    /// The implementation of `nodedef` for `target`: an implementation naming the
    /// nodedef itself wins over one naming its template.
    pub fn implementation(&self, nodedef: &NodeDef, target: Target) -> Option<&Implementation> {
        let for_name = |name: &str| {
            self.implementations
                .iter()
                .find(|i| i.nodedef == name && i.targets.contains(&target))
        };
        for_name(&nodedef.name).or_else(|| {
            nodedef
                .template
                .as_ref()
                .and_then(|(template, _)| for_name(template))
        })
    }

    /// A library node graph implementing `category` with output `ty`.
    pub fn nodegraph(&self, category: &str, ty: &str) -> Option<&NodeGraphDef> {
        self.nodegraphs
            .iter()
            .find(|g| g.node == category && g.ty == ty)
    }

    /// Check that every port type is registered and every implementation refers
    /// to a known nodedef or template. All problems are reported at once.
    pub fn validate(&self, types: &TypeRegistry) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        for def in &self.nodedefs {
            for port in def.inputs.iter().chain(def.outputs.iter()) {
                if port.ty != ANY_TYPE && !types.contains(&port.ty) {
                    errors.push(format!(
                        "nodedef '{}' port '{}' has unknown type '{}'",
                        def.name, port.name, port.ty
                    ));
                }
            }
        }
        for imp in &self.implementations {
            let known = self.by_name.contains_key(&imp.nodedef)
                || self
                    .nodedefs
                    .iter()
                    .any(|d| d.template.as_ref().is_some_and(|(t, _)| *t == imp.nodedef));
            if !known {
                errors.push(format!(
                    "implementation refers to unknown nodedef '{}'",
                    imp.nodedef
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "node library failed validation ({} error(s)):\n- {}",
                errors.len(),
                errors.join("\n- ")
            )
        }
    }
}

/// Report every unknown category and dangling reference in `doc` at once.
///
/// Graph construction stops at the first problem; this pass is for tools that
/// want the full list.
pub fn validate_document(doc: &MaterialDocument, lib: &NodeLibrary) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();
    let local_graph = |n: &Node| {
        doc.nodegraphs
            .iter()
            .any(|g| g.node == n.category && g.ty == n.output_type)
    };
    let ids: HashMap<&str, &Node> = doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for n in &doc.nodes {
        if local_graph(n) || lib.nodegraph(&n.category, &n.output_type).is_some() {
            continue;
        }
        if let Err(e) = lib.resolve_nodedef(&n.id, n) {
            errors.push(format!("{e}"));
        }
    }
    for c in &doc.connections {
        for end in [&c.from, &c.to] {
            if !ids.contains_key(end.node_id.as_str()) {
                errors.push(format!(
                    "connection '{}' references missing node '{}'",
                    c.id, end.node_id
                ));
            }
        }
    }
    for out in &doc.outputs {
        if !ids.contains_key(out.from.node_id.as_str()) {
            errors.push(format!(
                "output '{}' references missing node '{}'",
                out.name, out.from.node_id
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "document failed validation ({} error(s)):\n- {}",
            errors.len(),
            errors.join("\n- ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_document;

    #[test]
    fn test_default_library_validates() {
        let lib = NodeLibrary::load_default().unwrap();
        let types = TypeRegistry::standard().unwrap();
        lib.validate(&types).unwrap();
    }

    #[test]
    fn test_template_expansion() {
        let lib = NodeLibrary::load_default().unwrap();
        let add = lib.nodedef("add_color3").unwrap();
        assert_eq!(add.node, "add");
        assert_eq!(add.input("in1").unwrap().ty, "color3");
        assert_eq!(add.output_type(), "color3");
        assert_eq!(
            add.template,
            Some(("add".to_string(), "color3".to_string()))
        );
        assert!(lib.implementation(add, Target::Glsl).is_some());
    }

    #[test]
    fn test_resolve_by_input_types() {
        let lib = NodeLibrary::load_default().unwrap();
        let doc = parse_document(
            r#"{
                "nodes": [
                    { "id": "sep", "category": "separate3", "type": "multioutput", "inputTypes": { "in": "vector3" } }
                ],
                "outputs": []
            }"#,
        )
        .unwrap();
        let def = lib.resolve_nodedef("sep", &doc.nodes[0]).unwrap();
        assert_eq!(def.name, "separate3_vector3");
    }

    #[test]
    fn test_unknown_category() {
        let lib = NodeLibrary::load_default().unwrap();
        let doc = parse_document(
            r#"{
                "nodes": [ { "id": "n", "category": "no_such_node", "type": "float" } ],
                "outputs": [ { "name": "out", "type": "float", "from": { "nodeId": "missing" } } ]
            }"#,
        )
        .unwrap();
        let err = lib.resolve_nodedef("n", &doc.nodes[0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenError>(),
            Some(GenError::UnknownCategory { .. })
        ));
        let err = validate_document(&doc, &lib).unwrap_err().to_string();
        assert!(err.contains("2 error(s)"), "{err}");
    }

    #[test]
    fn test_merge_overrides_implementation() {
        let mut lib = NodeLibrary::load_default().unwrap();
        lib.merge_json_str(
            r#"{ "implementations": [ { "nodedef": "add", "targets": ["genglsl"], "inline": "({{in1}}) + ({{in2}})" } ] }"#,
        )
        .unwrap();
        let def = lib.nodedef("add_float").unwrap();
        assert_eq!(
            lib.implementation(def, Target::Glsl).unwrap().source,
            ImplementationSource::Inline("({{in1}}) + ({{in2}})".to_string())
        );
    }
}
