//! Per-target rendering rules for type names, literals, qualifiers and identifiers.
//!
//! A single table-driven [`Syntax`] serves every target; the `glsl`, `osl`, `mdl`
//! and `msl` submodules only fill in the tables that differ.

mod glsl;
mod mdl;
mod msl;
mod osl;

pub use glsl::glsl;
pub use mdl::mdl;
pub use msl::msl;
pub use osl::osl;

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use super::error::GenError;
use super::target::Target;
use super::types::{BaseType, Conversion, TypeDesc};
use super::utils::{fmt_f32, sanitize_ident};
use super::value::Value;

/// How literal values of a type are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueFormat {
    /// `1.0`, `3`, `true`.
    Scalar,
    /// Booleans written as `1` / `0` for languages without a bool type.
    IntBool,
    /// `"text"`.
    Quoted,
    /// `ctor(a, b, c)`; with `uniform_braces` uniform initializers use `{a, b, c}`.
    Constructor { uniform_braces: bool },
    /// Four components written as `outer(inner(r, g, b), a)`.
    NestedColor4 { inner: String, uniform_braces: bool },
    /// A 3x3 matrix padded into a 4x4 constructor.
    PaddedMatrix33,
    /// Array constructor `prefix a, b close`, declared with a `[N]` suffix.
    Array { open: String, close: String },
    /// Resource handle built from a quoted path, `open"path"close`. An empty
    /// path renders the default value.
    Resource { open: String, close: String },
    /// No literal form, always the default value.
    Fixed,
}

/// Syntax of one type in one target language.
#[derive(Clone, Debug)]
pub struct TypeSyntax {
    pub name: String,
    /// Constructor name when it differs from the type name (`mk_color4`).
    pub constructor: Option<String>,
    pub default_value: String,
    pub uniform_default_value: String,
    pub type_alias: Option<String>,
    /// Source emitted once per stage ahead of any use (struct definitions).
    pub type_definition: Option<String>,
    /// Per-component access templates, `{}` is the variable.
    pub members: Vec<String>,
    pub format: ValueFormat,
}

impl TypeSyntax {
    pub fn scalar(name: &str, default: &str) -> Self {
        Self {
            name: name.to_string(),
            constructor: None,
            default_value: default.to_string(),
            uniform_default_value: default.to_string(),
            type_alias: None,
            type_definition: None,
            members: Vec::new(),
            format: ValueFormat::Scalar,
        }
    }

    pub fn aggregate(name: &str, default: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            constructor: None,
            default_value: default.to_string(),
            uniform_default_value: default.to_string(),
            type_alias: None,
            type_definition: None,
            members: members.iter().map(|m| m.to_string()).collect(),
            format: ValueFormat::Constructor {
                uniform_braces: false,
            },
        }
    }

    pub fn fixed(name: &str, default: &str) -> Self {
        Self {
            format: ValueFormat::Fixed,
            ..Self::scalar(name, default)
        }
    }

    pub fn with_uniform_default(mut self, v: &str) -> Self {
        self.uniform_default_value = v.to_string();
        self
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_constructor(mut self, ctor: &str) -> Self {
        self.constructor = Some(ctor.to_string());
        self
    }

    pub fn with_definition(mut self, def: &str) -> Self {
        self.type_definition = Some(def.to_string());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.type_alias = Some(alias.to_string());
        self
    }

    fn ctor(&self) -> &str {
        self.constructor.as_deref().unwrap_or(&self.name)
    }
}

/// Identifier bookkeeping for one naming scope: name -> times seen.
pub type IdentifierMap = HashMap<String, usize>;

#[derive(Clone, Debug)]
enum TokenRule {
    Substring(String, String),
    Prefix(String, String),
}

#[derive(Clone, Debug)]
pub struct Syntax {
    target: Target,
    types: HashMap<String, TypeSyntax>,
    type_order: Vec<String>,
    restricted: HashSet<String>,
    invalid_tokens: Vec<TokenRule>,
    pub input_qualifier: String,
    pub output_qualifier: String,
    pub uniform_qualifier: String,
    pub constant_qualifier: String,
    /// Output parameters are references (`thread float3&`) rather than
    /// qualified values (`out vec3`).
    pub output_by_reference: bool,
}

impl Syntax {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            types: HashMap::new(),
            type_order: Vec::new(),
            restricted: HashSet::new(),
            invalid_tokens: Vec::new(),
            input_qualifier: String::new(),
            output_qualifier: String::new(),
            uniform_qualifier: String::new(),
            constant_qualifier: String::new(),
            output_by_reference: false,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Register the syntax for `type_name`. The language-side name becomes
    /// restricted so no variable can shadow it.
    pub fn register_type_syntax(&mut self, type_name: &str, syntax: TypeSyntax) {
        self.restricted.insert(syntax.name.clone());
        if self.types.insert(type_name.to_string(), syntax).is_none() {
            self.type_order.push(type_name.to_string());
        }
    }

    pub fn register_restricted_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted.extend(names.into_iter().map(Into::into));
    }

    /// Substrings rewritten anywhere in an identifier.
    pub fn register_invalid_tokens(&mut self, tokens: &[(&str, &str)]) {
        for (from, to) in tokens {
            self.invalid_tokens
                .push(TokenRule::Substring(from.to_string(), to.to_string()));
        }
    }

    /// Identifier prefixes rewritten at the start of a name.
    pub fn register_invalid_prefixes(&mut self, tokens: &[(&str, &str)]) {
        for (from, to) in tokens {
            self.invalid_tokens
                .push(TokenRule::Prefix(from.to_string(), to.to_string()));
        }
    }

    pub fn is_restricted(&self, name: &str) -> bool {
        self.restricted.contains(name)
    }

    pub fn type_syntax(&self, ty: &TypeDesc) -> Result<&TypeSyntax> {
        self.types.get(&ty.name).ok_or_else(|| {
            anyhow::Error::from(GenError::UnknownType(ty.name.clone()))
                .context(format!("no {} syntax for type '{}'", self.target, ty.name))
        })
    }

    pub fn type_name(&self, ty: &TypeDesc) -> Result<&str> {
        Ok(&self.type_syntax(ty)?.name)
    }

    /// Type name with the output qualifier, for function parameters.
    pub fn output_type_name(&self, ty: &TypeDesc) -> Result<String> {
        let name = self.type_name(ty)?;
        if self.output_by_reference {
            Ok(format!("{} {}&", self.output_qualifier, name))
        } else if self.output_qualifier.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{} {}", self.output_qualifier, name))
        }
    }

    pub fn default_value(&self, ty: &TypeDesc, uniform: bool) -> Result<String> {
        let ts = self.type_syntax(ty)?;
        Ok(if uniform {
            ts.uniform_default_value.clone()
        } else {
            ts.default_value.clone()
        })
    }

    /// Render `value` as a literal of type `ty`.
    pub fn value(&self, ty: &TypeDesc, value: &Value, uniform: bool) -> Result<String> {
        let ts = self.type_syntax(ty)?;
        let comps = || -> Result<Vec<String>> {
            let floats = value.as_floats().ok_or_else(|| GenError::InvalidValue {
                ty: ty.name.clone(),
                reason: format!("expected numeric components, got '{value}'"),
            })?;
            if floats.len() != ty.size {
                return Err(GenError::InvalidValue {
                    ty: ty.name.clone(),
                    reason: format!("expected {} components, got {}", ty.size, floats.len()),
                }
                .into());
            }
            Ok(floats.into_iter().map(fmt_f32).collect())
        };

        match &ts.format {
            ValueFormat::Fixed => Ok(if uniform {
                ts.uniform_default_value.clone()
            } else {
                ts.default_value.clone()
            }),
            ValueFormat::Quoted => Ok(format!("\"{value}\"")),
            ValueFormat::Resource { open, close } => match value.as_str() {
                Some(path) if !path.is_empty() => Ok(format!("{open}\"{path}\"{close}")),
                _ => Ok(ts.default_value.clone()),
            },
            ValueFormat::IntBool => Ok(match value {
                Value::Boolean(true) => "1".to_string(),
                Value::Boolean(false) => "0".to_string(),
                other => other.to_string(),
            }),
            ValueFormat::Scalar => Ok(match (ty.base, value) {
                (BaseType::Float, v) => fmt_f32(v.as_f32().unwrap_or(0.0)),
                (BaseType::Integer, v) => v.as_i32().unwrap_or(0).to_string(),
                (_, v) => v.to_string(),
            }),
            ValueFormat::Array { open, close } => {
                let items: Vec<String> = match value {
                    Value::FloatArray(v) => v.iter().map(|x| fmt_f32(*x)).collect(),
                    Value::IntegerArray(v) => v.iter().map(|x| x.to_string()).collect(),
                    other => bail!("expected an array value for {}, got '{other}'", ty.name),
                };
                Ok(format!("{open}{}{close}", items.join(", ")))
            }
            ValueFormat::Constructor { uniform_braces } => {
                let c = comps()?;
                if uniform && *uniform_braces {
                    Ok(format!("{{{}}}", c.join(", ")))
                } else {
                    Ok(format!("{}({})", ts.ctor(), c.join(", ")))
                }
            }
            ValueFormat::NestedColor4 {
                inner,
                uniform_braces,
            } => {
                let c = comps()?;
                let rgb = format!("{inner}({}, {}, {})", c[0], c[1], c[2]);
                if uniform && *uniform_braces {
                    Ok(format!("{{{rgb}, {}}}", c[3]))
                } else {
                    Ok(format!("{}({rgb}, {})", ts.ctor(), c[3]))
                }
            }
            ValueFormat::PaddedMatrix33 => {
                let c = comps()?;
                let z = "0.0".to_string();
                let one = "1.0".to_string();
                let padded = [
                    &c[0], &c[1], &c[2], &z, &c[3], &c[4], &c[5], &z, &c[6], &c[7], &c[8], &z, &z, &z,
                    &z, &one,
                ];
                Ok(format!(
                    "{}({})",
                    ts.ctor(),
                    padded.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ))
            }
        }
    }

    /// Construct an aggregate of `ty` from component expressions.
    pub fn construct(&self, ty: &TypeDesc, comps: &[String]) -> Result<String> {
        let ts = self.type_syntax(ty)?;
        if comps.len() != ty.size {
            bail!(
                "cannot construct {} from {} components (expected {})",
                ty.name,
                comps.len(),
                ty.size
            );
        }
        match &ts.format {
            ValueFormat::Scalar | ValueFormat::IntBool => Ok(comps[0].clone()),
            ValueFormat::NestedColor4 { inner, .. } => Ok(format!(
                "{}({inner}({}, {}, {}), {})",
                ts.ctor(),
                comps[0],
                comps[1],
                comps[2],
                comps[3]
            )),
            ValueFormat::Constructor { .. } => Ok(format!("{}({})", ts.ctor(), comps.join(", "))),
            other => bail!("type {} cannot be constructed ({other:?})", ty.name),
        }
    }

    /// Access component `index` of `var`.
    pub fn member(&self, var: &str, ty: &TypeDesc, index: usize) -> Result<String> {
        if ty.is_scalar() {
            return Ok(var.to_string());
        }
        let ts = self.type_syntax(ty)?;
        let tpl = ts
            .members
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("type {} has no component {index}", ty.name))?;
        Ok(tpl.replace("{}", var))
    }

    /// Remap the channels of `src` (of `src_ty`) into `dst_ty`.
    ///
    /// Channels are `r/x`, `g/y`, `b/z`, `a/w` plus the literals `0` and `1`.
    pub fn swizzled_variable(
        &self,
        src: &str,
        src_ty: &TypeDesc,
        channels: &str,
        dst_ty: &TypeDesc,
    ) -> Result<String> {
        let mut comps = Vec::with_capacity(channels.len());
        for ch in channels.chars() {
            let index = match ch {
                '0' => {
                    comps.push("0.0".to_string());
                    continue;
                }
                '1' => {
                    comps.push("1.0".to_string());
                    continue;
                }
                'r' | 'x' => 0,
                'g' | 'y' => 1,
                'b' | 'z' => 2,
                'a' | 'w' => 3,
                other => bail!("invalid swizzle channel '{other}' in '{channels}'"),
            };
            if !src_ty.is_scalar() && index >= src_ty.size {
                bail!(
                    "swizzle channel '{ch}' is out of range for type {}",
                    src_ty.name
                );
            }
            comps.push(self.member(src, src_ty, index)?);
        }
        if dst_ty.is_scalar() {
            if comps.len() != 1 {
                bail!(
                    "swizzle '{channels}' yields {} channels, {} expects 1",
                    comps.len(),
                    dst_ty.name
                );
            }
            return Ok(comps.remove(0));
        }
        self.construct(dst_ty, &comps)
    }

    /// Expression converting `expr` from `from` to `to`.
    pub fn convert(
        &self,
        conv: &Conversion,
        from: &TypeDesc,
        to: &TypeDesc,
        expr: &str,
    ) -> Result<String> {
        match conv {
            Conversion::Splat => {
                let comps = vec![expr.to_string(); to.size];
                self.construct(to, &comps)
            }
            Conversion::Cast => Ok(format!("{}({expr})", self.type_name(to)?)),
            Conversion::Reinterpret => {
                let from_name = self.type_name(from)?;
                let to_ts = self.type_syntax(to)?;
                if from_name == to_ts.name {
                    Ok(expr.to_string())
                } else if matches!(to_ts.format, ValueFormat::Constructor { .. }) && from.is_float3() {
                    Ok(format!("{}({expr})", to_ts.ctor()))
                } else {
                    let channels = &"xyzw"[..to.size.min(4)];
                    self.swizzled_variable(expr, from, channels, to)
                }
            }
            Conversion::Swizzle(channels) => self.swizzled_variable(expr, from, channels, to),
        }
    }

    /// `type name` declaration, with an array suffix where the type needs one.
    pub fn declaration(&self, ty: &TypeDesc, name: &str, value: Option<&Value>) -> Result<String> {
        let ts = self.type_syntax(ty)?;
        if let ValueFormat::Array { .. } = ts.format {
            let n = match value {
                Some(Value::FloatArray(v)) => v.len(),
                Some(Value::IntegerArray(v)) => v.len(),
                _ => bail!("array variable '{name}' needs a value to size it"),
            };
            return Ok(format!("{} {name}[{n}]", ts.name));
        }
        Ok(format!("{} {name}", ts.name))
    }

    /// Struct and alias definitions in registration order.
    pub fn type_definitions(&self) -> Vec<String> {
        let mut out = Vec::new();
        for t in &self.type_order {
            let Some(ts) = self.types.get(t) else {
                continue;
            };
            if let Some(def) = &ts.type_definition {
                out.push(def.clone());
            }
            if let Some(alias) = &ts.type_alias {
                out.push(alias.clone());
            }
        }
        out
    }

    /// Sanitize `name` and rewrite target-invalid tokens.
    pub fn make_valid_name(&self, name: &mut String) {
        let mut out = sanitize_ident(name);
        for rule in &self.invalid_tokens {
            match rule {
                TokenRule::Substring(from, to) => {
                    while out.contains(from.as_str()) {
                        out = out.replace(from.as_str(), to);
                    }
                }
                TokenRule::Prefix(from, to) => {
                    if let Some(rest) = out.strip_prefix(from.as_str()) {
                        out = format!("{to}{rest}");
                    }
                }
            }
        }
        *name = out;
    }

    /// Make `name` valid and unique within `ids`, recording the result.
    ///
    /// A name already taken (or restricted) gets the next free counter suffix,
    /// so `add`, `add`, `add` become `add`, `add1`, `add2`.
    pub fn make_unique(&self, name: &mut String, ids: &mut IdentifierMap) {
        self.make_valid_name(name);
        if ids.contains_key(name.as_str()) || self.is_restricted(name) {
            let mut counter = ids.get(name.as_str()).copied().unwrap_or(1);
            let mut candidate = format!("{name}{counter}");
            while ids.contains_key(&candidate) || self.is_restricted(&candidate) {
                counter += 1;
                candidate = format!("{name}{counter}");
            }
            ids.insert(name.clone(), counter + 1);
            *name = candidate;
        }
        ids.insert(name.clone(), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadergen::types::TypeRegistry;

    #[test]
    fn test_make_unique_counts_collisions() {
        let syntax = glsl();
        let mut ids = IdentifierMap::new();
        let mut a = "add".to_string();
        let mut b = "add".to_string();
        let mut c = "add".to_string();
        syntax.make_unique(&mut a, &mut ids);
        syntax.make_unique(&mut b, &mut ids);
        syntax.make_unique(&mut c, &mut ids);
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("add", "add1", "add2"));
    }

    #[test]
    fn test_make_unique_restricted_word() {
        let syntax = glsl();
        let mut ids = IdentifierMap::new();
        let mut n = "mixer".to_string();
        let mut v = "vec3".to_string();
        let mut w = "vec3".to_string();
        syntax.make_unique(&mut n, &mut ids);
        syntax.make_unique(&mut v, &mut ids);
        syntax.make_unique(&mut w, &mut ids);
        assert_eq!(n, "mixer");
        assert_eq!(v, "vec31");
        assert_eq!(w, "vec32");
    }

    #[test]
    fn test_swizzle_channels() {
        let syntax = glsl();
        let reg = TypeRegistry::standard().unwrap();
        let c3 = reg.get("color3").unwrap();
        let c4 = reg.get("color4").unwrap();
        let f = reg.get("float").unwrap();
        assert_eq!(
            syntax.swizzled_variable("c", &c3, "bgr1", &c4).unwrap(),
            "vec4(c.z, c.y, c.x, 1.0)"
        );
        assert_eq!(syntax.swizzled_variable("c", &c3, "g", &f).unwrap(), "c.y");
        assert_eq!(
            syntax.swizzled_variable("s", &f, "xx0", &c3).unwrap(),
            "vec3(s, s, 0.0)"
        );
        assert!(syntax.swizzled_variable("c", &c3, "a", &f).is_err());
    }

    #[test]
    fn test_value_rendering_per_target() {
        let reg = TypeRegistry::standard().unwrap();
        let c3 = reg.get("color3").unwrap();
        let v = Value::Floats(vec![1.0, 0.5, 0.0]);
        assert_eq!(glsl().value(&c3, &v, false).unwrap(), "vec3(1.0, 0.5, 0.0)");
        assert_eq!(osl().value(&c3, &v, false).unwrap(), "color(1.0, 0.5, 0.0)");
        assert_eq!(mdl().value(&c3, &v, false).unwrap(), "color(1.0, 0.5, 0.0)");
        assert_eq!(msl().value(&c3, &v, false).unwrap(), "float3(1.0, 0.5, 0.0)");
    }

    #[test]
    fn test_invalid_tokens() {
        let mut n = "_private".to_string();
        mdl().make_valid_name(&mut n);
        assert_eq!(n, "uprivate");
        let mut m = "gl_a__b".to_string();
        msl().make_valid_name(&mut m);
        assert_eq!(m, "glla_b");
    }

    #[test]
    fn test_conversions_render() {
        let reg = TypeRegistry::standard().unwrap();
        let f = reg.get("float").unwrap();
        let i = reg.get("integer").unwrap();
        let c3 = reg.get("color3").unwrap();
        let v3 = reg.get("vector3").unwrap();
        let s = glsl();
        assert_eq!(s.convert(&Conversion::Splat, &f, &c3, "x").unwrap(), "vec3(x, x, x)");
        assert_eq!(s.convert(&Conversion::Cast, &i, &f, "n").unwrap(), "float(n)");
        assert_eq!(s.convert(&Conversion::Reinterpret, &c3, &v3, "c").unwrap(), "c");
        assert_eq!(
            osl().convert(&Conversion::Reinterpret, &c3, &v3, "c").unwrap(),
            "vector(c)"
        );
    }
}
