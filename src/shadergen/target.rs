//! Target shading languages.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "genglsl")]
    Glsl,
    #[serde(rename = "genosl")]
    Osl,
    #[serde(rename = "genmdl")]
    Mdl,
    #[serde(rename = "genmsl")]
    Msl,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::Glsl, Target::Osl, Target::Mdl, Target::Msl];

    /// Implementation key used by the node library (`genglsl`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Target::Glsl => "genglsl",
            Target::Osl => "genosl",
            Target::Mdl => "genmdl",
            Target::Msl => "genmsl",
        }
    }

    /// Hardware targets split output into vertex and pixel stages.
    pub fn is_hw(self) -> bool {
        matches!(self, Target::Glsl | Target::Msl)
    }

    /// Whether the language has statements, so conditionals can branch.
    /// MDL bodies are `let` expressions and must stay branch-free.
    pub fn supports_branching(self) -> bool {
        !matches!(self, Target::Mdl)
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Target::Glsl => "glsl",
            Target::Osl => "osl",
            Target::Mdl => "mdl",
            Target::Msl => "metal",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "genglsl" | "glsl" => Ok(Target::Glsl),
            "genosl" | "osl" => Ok(Target::Osl),
            "genmdl" | "mdl" => Ok(Target::Mdl),
            "genmsl" | "msl" | "metal" => Ok(Target::Msl),
            other => bail!("unknown target '{other}' (supported: genglsl, genosl, genmdl, genmsl)"),
        }
    }
}
