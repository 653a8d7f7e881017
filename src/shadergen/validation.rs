//! GLSL validation of generated stages using the naga library.

use anyhow::{Context, Result, anyhow, bail};

use super::shader::Shader;
use super::stage::{PIXEL_STAGE, VERTEX_STAGE};
use super::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslShaderStage {
    Vertex,
    Fragment,
}

impl GlslShaderStage {
    /// Stage for a generated stage name (`vertex` or `pixel`).
    pub fn from_stage_name(name: &str) -> Option<Self> {
        match name {
            VERTEX_STAGE => Some(Self::Vertex),
            PIXEL_STAGE => Some(Self::Fragment),
            _ => None,
        }
    }

    fn naga(self) -> naga::ShaderStage {
        match self {
            GlslShaderStage::Vertex => naga::ShaderStage::Vertex,
            GlslShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

fn parse_and_validate(
    source: &str,
    stage: GlslShaderStage,
) -> Result<(naga::Module, naga::valid::ModuleInfo)> {
    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: stage.naga(),
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}\n{}", numbered(source)))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered(source)))?;

    Ok((module, info))
}

/// Parse and validate GLSL 4.50 source for one stage.
pub fn validate_glsl(source: &str, stage: GlslShaderStage) -> Result<naga::Module> {
    parse_and_validate(source, stage).map(|(module, _)| module)
}

/// Validate every stage of a generated GLSL shader.
pub fn validate_shader(shader: &Shader) -> Result<()> {
    if shader.target != Target::Glsl {
        bail!("only {} shaders can be validated, got {}", Target::Glsl, shader.target);
    }
    for stage in &shader.stages {
        let kind = GlslShaderStage::from_stage_name(&stage.name)
            .ok_or_else(|| anyhow!("unknown stage '{}'", stage.name))?;
        validate_glsl(&stage.source, kind)
            .with_context(|| format!("{} stage of '{}' is not valid GLSL", stage.name, shader.name))?;
    }
    Ok(())
}

/// Translate a validated GLSL stage to WGSL.
pub fn glsl_to_wgsl(source: &str, stage: GlslShaderStage) -> Result<String> {
    let (module, info) = parse_and_validate(source, stage)?;
    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::EXPLICIT_TYPES)
        .map_err(|e| anyhow!("WGSL writer failed: {e:?}"))
}

/// Source with line numbers, for error messages.
fn numbered(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}
