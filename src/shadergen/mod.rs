//! Material graph to shader source generation.
//!
//! A [`MaterialDocument`](crate::dsl::MaterialDocument) is built into a
//! [`ShaderGraph`](shader_graph::ShaderGraph) against the node library, then a
//! [`ShaderGenerator`] for one [`Target`] turns the graph into a [`Shader`]
//! with one source text per stage.

pub mod context;
pub mod error;
pub mod generator;
pub mod node_impl;
pub mod shader;
pub mod shader_graph;
pub mod stage;
pub mod syntax;
pub mod target;
pub mod types;
pub mod utils;
pub mod validation;
pub mod value;

pub use context::{GenContext, GenOptions, ShaderInterfaceType, SpecularEnvironmentMethod};
pub use error::GenError;
pub use generator::ShaderGenerator;
pub use shader::{PortInfo, Shader, StageOutput};
pub use shader_graph::ShaderGraph;
pub use target::Target;
pub use types::{TypeDesc, TypeRegistry};
pub use value::Value;
