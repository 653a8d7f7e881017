pub mod dsl;
pub mod graph;
pub mod schema;
pub mod shadergen;
