//! Library source implementations: inline expression templates and named
//! functions.

use anyhow::Result;

use super::Argument;
use crate::schema::{Implementation, ImplementationSource, NodeDef};
use crate::shadergen::error::GenError;
use crate::shadergen::generator::Emitter;
use crate::shadergen::shader_graph::NodeId;
use crate::shadergen::stage::ShaderStage;
use crate::shadergen::target::Target;

#[derive(Clone, Debug)]
pub struct SourceCode {
    source: ImplementationSource,
    extra_args: Vec<String>,
    /// Type the nodedef was expanded with, for `$type` / `$suffix` / `$channels`.
    template_type: Option<String>,
}

impl SourceCode {
    pub fn new(imp: &Implementation, def: &NodeDef) -> Self {
        Self {
            source: imp.source.clone(),
            extra_args: imp.extra_args.clone(),
            template_type: def.template.as_ref().map(|(_, ty)| ty.clone()),
        }
    }

    /// An inline expression template such as `{{in1}} + {{in2}}`.
    pub fn inline(template: &str) -> Self {
        Self {
            source: ImplementationSource::Inline(template.to_string()),
            extra_args: Vec::new(),
            template_type: None,
        }
    }

    pub fn function(name: &str, source: &str) -> Self {
        Self {
            source: ImplementationSource::Function {
                name: name.to_string(),
                source: source.to_string(),
            },
            extra_args: Vec::new(),
            template_type: None,
        }
    }

    fn substitute(&self, text: &str, env: &Emitter) -> Result<String> {
        let Some(ty) = &self.template_type else {
            return Ok(text.to_string());
        };
        if !text.contains('$') {
            return Ok(text.to_string());
        }
        let desc = env.types.get(ty)?;
        let channels = &"rgba"[..desc.size.clamp(1, 4)];
        Ok(text
            .replace("$type", env.syntax.type_name(&desc)?)
            .replace("$suffix", ty)
            .replace("$channels", channels))
    }

    pub fn emit_function_definition(&self, _node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
        let ImplementationSource::Function { name, source } = &self.source else {
            return Ok(());
        };
        if source.trim().is_empty() {
            return Ok(());
        }
        let name = self.substitute(name, env)?;
        if stage.add_function_definition(&name) {
            stage.add_block(&self.substitute(source, env)?);
            stage.new_line();
        }
        Ok(())
    }

    pub fn emit_function_call(&self, node: NodeId, env: &Emitter, stage: &mut ShaderStage) -> Result<()> {
        let n = env.node(node);
        let template_error = |reason: String| GenError::Template {
            node: n.path.clone(),
            reason,
        };
        match &self.source {
            ImplementationSource::Inline(template) => {
                if n.outputs.len() != 1 {
                    return Err(template_error(format!(
                        "inline implementations need a single output, node has {}",
                        n.outputs.len()
                    ))
                    .into());
                }
                let template = self.substitute(template, env)?;
                let expr = expand_inline(&template, |name| env.input_arg(node, name).ok())
                    .map_err(template_error)?;
                env.declare_output(node, 0, Some(&expr), stage)
            }
            ImplementationSource::Function { name, .. } => {
                let name = self.substitute(name, env)?;
                let mut args = Vec::with_capacity(n.inputs.len() + self.extra_args.len() + n.outputs.len());
                for input in &n.inputs {
                    args.push(env.argument(input)?.expr);
                }
                for extra in &self.extra_args {
                    args.push(self.substitute(extra, env)?);
                }
                if env.target == Target::Mdl {
                    // MDL functions return their single result.
                    if n.outputs.len() != 1 {
                        return Err(template_error(format!(
                            "MDL function '{name}' must have a single output, node has {}",
                            n.outputs.len()
                        ))
                        .into());
                    }
                    let call = format!("{name}({})", args.join(", "));
                    return env.declare_output(node, 0, Some(&call), stage);
                }
                for i in 0..n.outputs.len() {
                    env.declare_output(node, i, None, stage)?;
                    args.push(env.output_var(node, i).to_string());
                }
                stage.add_line(&format!("{name}({})", args.join(", ")), true);
                Ok(())
            }
        }
    }
}

/// Replace every `{{input}}` with its argument expression.
fn expand_inline(
    template: &str,
    arg: impl Fn(&str) -> Option<Argument>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| format!("unterminated '{{{{' in '{template}'"))?;
        let name = after[..end].trim();
        let a = arg(name).ok_or_else(|| format!("unknown input '{name}' in '{template}'"))?;
        out.push_str(&a.expr);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
