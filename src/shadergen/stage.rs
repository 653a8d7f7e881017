//! Source accumulation for one shader stage.
//!
//! A [`ShaderStage`] owns the text being generated, the named variable blocks
//! declared for the stage, the scope/indentation cursor and the set of function
//! definitions already written. Hardware targets create a `vertex` and a
//! `pixel` stage; OSL and MDL generate into a single `pixel` stage.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, anyhow};

use super::error::GenError;
use super::types::TypeRef;
use super::utils::replace_tokens;
use super::value::Value;

pub const VERTEX_STAGE: &str = "vertex";
pub const PIXEL_STAGE: &str = "pixel";

pub const VERTEX_INPUTS: &str = "VertexInputs";
pub const VERTEX_DATA: &str = "VertexData";
pub const PRIVATE_UNIFORMS: &str = "PrivateUniforms";
pub const PUBLIC_UNIFORMS: &str = "PublicUniforms";
pub const LIGHT_DATA: &str = "LightData";
pub const PIXEL_OUTPUTS: &str = "PixelOutputs";

const INDENT: &str = "    ";

/// A declared stage variable: uniform, vertex input, connector or output.
#[derive(Clone, Debug)]
pub struct ShaderPort {
    pub ty: TypeRef,
    /// Identifier as declared in the stage.
    pub variable: String,
    pub value: Option<Value>,
    /// Document path this port was published from, empty for generator ports.
    pub path: String,
    /// Set once the producing code has been written (vertex connectors).
    pub emitted: bool,
}

impl ShaderPort {
    pub fn new(ty: TypeRef, variable: impl Into<String>) -> Self {
        Self {
            ty,
            variable: variable.into(),
            value: None,
            path: String::new(),
            emitted: false,
        }
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Uniform,
    Input,
    Output,
    Constant,
}

/// An insertion-ordered set of ports, unique by variable name.
#[derive(Clone, Debug)]
pub struct VariableBlock {
    pub kind: BlockKind,
    pub name: String,
    /// Instance name used to reach members (`vd` for vertex data), may be empty.
    pub instance: String,
    ports: Vec<ShaderPort>,
    index: HashMap<String, usize>,
}

impl VariableBlock {
    pub fn new(kind: BlockKind, name: &str, instance: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            instance: instance.to_string(),
            ports: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add `port` unless a port with the same variable exists; either way the
    /// stored port is returned.
    pub fn add(&mut self, port: ShaderPort) -> &mut ShaderPort {
        let i = match self.index.get(&port.variable) {
            Some(&i) => i,
            None => {
                let i = self.ports.len();
                self.index.insert(port.variable.clone(), i);
                self.ports.push(port);
                i
            }
        };
        &mut self.ports[i]
    }

    pub fn get(&self, variable: &str) -> Option<&ShaderPort> {
        self.index.get(variable).map(|&i| &self.ports[i])
    }

    pub fn get_mut(&mut self, variable: &str) -> Option<&mut ShaderPort> {
        self.index.get(variable).map(|&i| &mut self.ports[i])
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.index.contains_key(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaderPort> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Brackets {
    None,
    Braces,
    Parens,
    Squares,
}

impl Brackets {
    fn open(self) -> &'static str {
        match self {
            Brackets::None => "",
            Brackets::Braces => "{",
            Brackets::Parens => "(",
            Brackets::Squares => "[",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Brackets::None => "",
            Brackets::Braces => "}",
            Brackets::Parens => ")",
            Brackets::Squares => "]",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderStage {
    pub name: String,
    /// Entry point name (`main`, `VertexMain`, the shader name for OSL).
    pub function_name: String,
    source: String,
    indent: usize,
    scopes: Vec<Brackets>,
    blocks: Vec<VariableBlock>,
    function_definitions: HashSet<String>,
    tokens: BTreeMap<String, String>,
}

impl ShaderStage {
    pub fn new(name: &str, function_name: &str) -> Self {
        Self {
            name: name.to_string(),
            function_name: function_name.to_string(),
            source: String::new(),
            indent: 0,
            scopes: Vec::new(),
            blocks: Vec::new(),
            function_definitions: HashSet::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Create a block, or return the existing block of that name.
    pub fn create_block(&mut self, kind: BlockKind, name: &str, instance: &str) -> &mut VariableBlock {
        let i = match self.blocks.iter().position(|b| b.name == name) {
            Some(i) => i,
            None => {
                self.blocks.push(VariableBlock::new(kind, name, instance));
                self.blocks.len() - 1
            }
        };
        &mut self.blocks[i]
    }

    pub fn block(&self, name: &str) -> Option<&VariableBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn block_mut(&mut self, name: &str) -> Result<&mut VariableBlock> {
        let stage = self.name.clone();
        self.blocks
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| anyhow!("stage '{stage}' has no variable block '{name}'"))
    }

    pub fn blocks(&self, kind: BlockKind) -> impl Iterator<Item = &VariableBlock> {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    pub fn add_token(&mut self, token: &str, replacement: &str) {
        self.tokens
            .insert(token.to_string(), replacement.to_string());
    }

    pub fn begin_scope(&mut self, brackets: Brackets) {
        if brackets != Brackets::None {
            self.begin_line();
            self.source.push_str(brackets.open());
            self.source.push('\n');
        }
        self.scopes.push(brackets);
        self.indent += 1;
    }

    pub fn end_scope(&mut self, semicolon: bool) -> Result<()> {
        let brackets = self.scopes.pop().ok_or_else(|| {
            GenError::Scope(format!(
                "end_scope called with no open scope in stage '{}'",
                self.name
            ))
        })?;
        self.indent -= 1;
        if brackets != Brackets::None {
            self.begin_line();
            self.source.push_str(brackets.close());
            if semicolon {
                self.source.push(';');
            }
            self.source.push('\n');
        }
        Ok(())
    }

    pub fn begin_line(&mut self) {
        for _ in 0..self.indent {
            self.source.push_str(INDENT);
        }
    }

    pub fn end_line(&mut self, semicolon: bool) {
        if semicolon {
            self.source.push(';');
        }
        self.source.push('\n');
    }

    pub fn new_line(&mut self) {
        self.source.push('\n');
    }

    pub fn add_string(&mut self, s: &str) {
        self.source.push_str(s);
    }

    pub fn add_line(&mut self, line: &str, semicolon: bool) {
        self.begin_line();
        self.source.push_str(line);
        self.end_line(semicolon);
    }

    pub fn add_comment(&mut self, comment: &str) {
        self.add_line(&format!("// {comment}"), false);
    }

    /// Add multi-line text, indenting every non-empty line to the current level.
    pub fn add_block(&mut self, text: &str) {
        for line in text.trim_end_matches('\n').lines() {
            if line.trim().is_empty() {
                self.new_line();
            } else {
                self.add_line(line, false);
            }
        }
    }

    /// Record a function definition key. Returns `true` the first time, meaning
    /// the caller should write the definition.
    pub fn add_function_definition(&mut self, key: &str) -> bool {
        self.function_definitions.insert(key.to_string())
    }

    pub fn has_function_definition(&self, key: &str) -> bool {
        self.function_definitions.contains(key)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Close the stage: every scope must be balanced. Returns the source with
    /// tokens substituted.
    pub fn finalize(&self) -> Result<String> {
        if !self.scopes.is_empty() {
            return Err(GenError::Scope(format!(
                "stage '{}' finished with {} open scope(s)",
                self.name,
                self.scopes.len()
            ))
            .into());
        }
        Ok(replace_tokens(&self.source, &self.tokens))
    }
}

/// Find a stage by name.
pub fn stage_mut<'s>(stages: &'s mut [ShaderStage], name: &str) -> Result<&'s mut ShaderStage> {
    stages
        .iter_mut()
        .find(|s| s.name == name)
        .ok_or_else(|| anyhow!("shader has no '{name}' stage"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadergen::types::TypeRegistry;

    #[test]
    fn test_scopes_indent_and_balance() {
        let mut stage = ShaderStage::new(PIXEL_STAGE, "main");
        stage.add_line("void main()", false);
        stage.begin_scope(Brackets::Braces);
        stage.add_line("float x = 1.0", true);
        stage.end_scope(false).unwrap();
        assert_eq!(
            stage.finalize().unwrap(),
            "void main()\n{\n    float x = 1.0;\n}\n"
        );
    }

    #[test]
    fn test_unbalanced_scope_is_error() {
        let mut stage = ShaderStage::new(PIXEL_STAGE, "main");
        let err = stage.end_scope(false).unwrap_err();
        assert!(matches!(err.downcast_ref::<GenError>(), Some(GenError::Scope(_))));

        stage.begin_scope(Brackets::Braces);
        assert!(stage.finalize().is_err());
    }

    #[test]
    fn test_block_dedupes_by_variable() {
        let reg = TypeRegistry::standard().unwrap();
        let mut stage = ShaderStage::new(VERTEX_STAGE, "main");
        let block = stage.create_block(BlockKind::Input, VERTEX_INPUTS, "");
        block.add(ShaderPort::new(reg.get("vector3").unwrap(), "i_position"));
        block.add(ShaderPort::new(reg.get("vector3").unwrap(), "i_normal"));
        block.add(ShaderPort::new(reg.get("vector3").unwrap(), "i_position"));
        let names: Vec<_> = stage
            .block(VERTEX_INPUTS)
            .unwrap()
            .iter()
            .map(|p| p.variable.as_str())
            .collect();
        assert_eq!(names, ["i_position", "i_normal"]);
    }

    #[test]
    fn test_function_definitions_once() {
        let mut stage = ShaderStage::new(PIXEL_STAGE, "main");
        assert!(stage.add_function_definition("mx_image_color3"));
        assert!(!stage.add_function_definition("mx_image_color3"));
    }

    #[test]
    fn test_tokens_substituted_at_finalize() {
        let mut stage = ShaderStage::new(VERTEX_STAGE, "main");
        stage.add_token("$inPosition", "i_position");
        stage.add_line("vec3 p = $inPosition", true);
        assert_eq!(stage.source(), "vec3 p = $inPosition;\n");
        assert_eq!(stage.finalize().unwrap(), "vec3 p = i_position;\n");
    }
}
