//! Generated shader output and its interface manifest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::stage::{BlockKind, ShaderStage};
use super::syntax::Syntax;
use super::target::Target;

/// One declared variable in a stage interface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortInfo {
    /// Block the variable belongs to (`PublicUniforms`, `VertexData`, ...).
    pub block: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Default value rendered as a target literal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Document path of the input this variable was published from.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutput {
    pub name: String,
    pub entry_point: String,
    pub source: String,
    pub uniforms: Vec<PortInfo>,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
}

impl StageOutput {
    /// Finalize `stage` into text plus its manifest.
    pub fn from_stage(stage: &ShaderStage, syntax: &Syntax) -> Result<Self> {
        let source = stage
            .finalize()
            .with_context(|| format!("failed to finalize {} stage", stage.name))?;
        let ports = |kind: BlockKind| -> Result<Vec<PortInfo>> {
            let mut out = Vec::new();
            for block in stage.blocks(kind) {
                for port in block.iter() {
                    let value = match &port.value {
                        Some(v) => Some(syntax.value(&port.ty, v, true)?),
                        None => None,
                    };
                    out.push(PortInfo {
                        block: block.name.clone(),
                        name: port.variable.clone(),
                        ty: port.ty.name.clone(),
                        value,
                        path: port.path.clone(),
                    });
                }
            }
            Ok(out)
        };
        Ok(Self {
            name: stage.name.clone(),
            entry_point: stage.function_name.clone(),
            uniforms: ports(BlockKind::Uniform)?,
            inputs: ports(BlockKind::Input)?,
            outputs: ports(BlockKind::Output)?,
            source,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Shader {
    pub name: String,
    pub target: Target,
    pub stages: Vec<StageOutput>,
}

impl Shader {
    pub fn stage(&self, name: &str) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn source(&self, stage: &str) -> Option<&str> {
        self.stage(stage).map(|s| s.source.as_str())
    }

    /// Write `<name>.<stage>.<ext>` per stage plus `<name>.json` with the
    /// manifest. Returns the written paths.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        let mut written = Vec::new();
        for stage in &self.stages {
            let path = dir.join(format!(
                "{}.{}.{}",
                self.name,
                stage.name,
                self.target.file_extension()
            ));
            std::fs::write(&path, &stage.source)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
        let manifest = dir.join(format!("{}.json", self.name));
        let json = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        std::fs::write(&manifest, json)
            .with_context(|| format!("failed to write {}", manifest.display()))?;
        written.push(manifest);
        Ok(written)
    }
}
