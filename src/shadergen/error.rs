//! Error taxonomy for shader generation.
//!
//! Every failure is fatal for the run. The variants are grouped the way callers
//! tend to react to them: type errors and graph-structure errors are authoring
//! problems in the input document, capability errors mean the requested target
//! cannot express some node.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenError {
    // Type errors
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error(
        "type mismatch: node '{from_node}' output '{from_output}' has type {from_type}, \
         but node '{to_node}' input '{to_input}' expects {to_type}"
    )]
    TypeMismatch {
        from_node: String,
        from_output: String,
        from_type: String,
        to_node: String,
        to_input: String,
        to_type: String,
    },

    #[error("no conversion may be registered between {from} and {to}")]
    InvalidConversion { from: String, to: String },

    #[error("invalid value for type {ty}: {reason}")]
    InvalidValue { ty: String, reason: String },

    // Graph-structure errors
    #[error("encountered a cycle in graph through nodes: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("node '{node}' ({category}) is missing required input '{input}'")]
    MissingInput {
        node: String,
        category: String,
        input: String,
    },

    #[error("node '{node}' has unresolved category '{category}'")]
    UnknownCategory { node: String, category: String },

    #[error("reference to missing node '{0}'")]
    UnknownNode(String),

    #[error("node '{node}' has no port named '{port}'")]
    UnknownPort { node: String, port: String },

    // Capability errors
    #[error("node '{node}' ({category}) is not supported on target {target}")]
    Unsupported {
        node: String,
        category: String,
        target: String,
    },

    #[error("no implementation of '{nodedef}' for node '{node}' on target {target}")]
    MissingImplementation {
        node: String,
        nodedef: String,
        target: String,
    },

    #[error("malformed source template for node '{node}': {reason}")]
    Template { node: String, reason: String },

    // Emitter state
    #[error("{0}")]
    Scope(String),
}

impl GenError {
    /// True for errors raised by the type system.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            GenError::UnknownType(_)
                | GenError::DuplicateType(_)
                | GenError::TypeMismatch { .. }
                | GenError::InvalidConversion { .. }
                | GenError::InvalidValue { .. }
        )
    }
}
