//! Type descriptors, the type registry and the implicit conversion table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::error::GenError;
use super::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    None,
    Boolean,
    Integer,
    Float,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Semantic {
    None,
    Color,
    Vector,
    Matrix,
    Filename,
    Closure,
    Shader,
    Material,
}

/// Immutable type descriptor. Identity is by name.
#[derive(Clone, Debug)]
pub struct TypeDesc {
    pub name: String,
    pub base: BaseType,
    pub semantic: Semantic,
    /// Component count. Zero marks an array type.
    pub size: usize,
    pub editable: bool,
    pub default: Value,
}

pub type TypeRef = Arc<TypeDesc>;

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeDesc {}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TypeDesc {
    pub fn new(
        name: &str,
        base: BaseType,
        semantic: Semantic,
        size: usize,
        editable: bool,
        default: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            base,
            semantic,
            size,
            editable,
            default,
        }
    }

    pub fn is_closure(&self) -> bool {
        matches!(
            self.semantic,
            Semantic::Closure | Semantic::Shader | Semantic::Material
        )
    }

    pub fn is_scalar(&self) -> bool {
        self.size == 1 && self.base != BaseType::None
    }

    pub fn is_aggregate(&self) -> bool {
        self.size > 1
    }

    pub fn is_array(&self) -> bool {
        self.size == 0 && self.base != BaseType::None
    }

    /// Scalar or aggregate made of floats (float, vectors, colors, matrices).
    pub fn is_float_based(&self) -> bool {
        self.base == BaseType::Float && self.size > 0 && !self.is_closure()
    }

    pub fn is_float3(&self) -> bool {
        self.is_float_based() && self.size == 3
    }

    pub fn is_float4(&self) -> bool {
        self.is_float_based() && self.size == 4
    }

    pub fn is_filename(&self) -> bool {
        self.semantic == Semantic::Filename
    }
}

/// How a value of one type is turned into another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// Broadcast a scalar into every component.
    Splat,
    /// Scalar cast between base types (integer -> float).
    Cast,
    /// Same components, different semantic (color3 <-> vector3).
    Reinterpret,
    /// Channel remap, using swizzle channels (`rgb1`).
    Swizzle(String),
}

/// Explicit registry of types and conversions, owned by a generator.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeRef>,
    order: Vec<String>,
    conversions: HashMap<(String, String), Conversion>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&mut self, desc: TypeDesc) -> Result<TypeRef> {
        if self.types.contains_key(&desc.name) {
            return Err(GenError::DuplicateType(desc.name).into());
        }
        let name = desc.name.clone();
        let ty = Arc::new(desc);
        self.types.insert(name.clone(), ty.clone());
        self.order.push(name);
        Ok(ty)
    }

    pub fn get(&self, name: &str) -> Result<TypeRef> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| GenError::UnknownType(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeRef> {
        self.order.iter().filter_map(|n| self.types.get(n))
    }

    pub fn register_conversion(&mut self, from: &str, to: &str, conv: Conversion) -> Result<()> {
        let from_ty = self.get(from)?;
        let to_ty = self.get(to)?;
        if from_ty.is_closure() || to_ty.is_closure() || from_ty == to_ty {
            return Err(GenError::InvalidConversion {
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.conversions
            .insert((from.to_string(), to.to_string()), conv);
        Ok(())
    }

    pub fn conversion(&self, from: &TypeDesc, to: &TypeDesc) -> Option<&Conversion> {
        self.conversions
            .get(&(from.name.clone(), to.name.clone()))
    }

    /// The standard library types plus their implicit conversions.
    pub fn standard() -> Result<Self> {
        use BaseType as B;
        use Semantic as S;

        let mut reg = TypeRegistry::new();
        let floats = |n: usize| Value::Floats(vec![0.0; n]);
        let identity = |n: usize| {
            let mut m = vec![0.0; n * n];
            for i in 0..n {
                m[i * n + i] = 1.0;
            }
            Value::Floats(m)
        };

        reg.register_type(TypeDesc::new("none", B::None, S::None, 1, false, Value::Integer(0)))?;
        reg.register_type(TypeDesc::new("boolean", B::Boolean, S::None, 1, true, Value::Boolean(false)))?;
        reg.register_type(TypeDesc::new("integer", B::Integer, S::None, 1, true, Value::Integer(0)))?;
        reg.register_type(TypeDesc::new("integerarray", B::Integer, S::None, 0, true, Value::IntegerArray(Vec::new())))?;
        reg.register_type(TypeDesc::new("float", B::Float, S::None, 1, true, Value::Float(0.0)))?;
        reg.register_type(TypeDesc::new("floatarray", B::Float, S::None, 0, true, Value::FloatArray(Vec::new())))?;
        reg.register_type(TypeDesc::new("vector2", B::Float, S::Vector, 2, true, floats(2)))?;
        reg.register_type(TypeDesc::new("vector3", B::Float, S::Vector, 3, true, floats(3)))?;
        reg.register_type(TypeDesc::new("vector4", B::Float, S::Vector, 4, true, floats(4)))?;
        reg.register_type(TypeDesc::new("color3", B::Float, S::Color, 3, true, floats(3)))?;
        reg.register_type(TypeDesc::new("color4", B::Float, S::Color, 4, true, floats(4)))?;
        reg.register_type(TypeDesc::new("matrix33", B::Float, S::Matrix, 9, true, identity(3)))?;
        reg.register_type(TypeDesc::new("matrix44", B::Float, S::Matrix, 16, true, identity(4)))?;
        reg.register_type(TypeDesc::new("string", B::String, S::None, 1, true, Value::String(String::new())))?;
        reg.register_type(TypeDesc::new("filename", B::String, S::Filename, 1, true, Value::String(String::new())))?;
        for closure in ["BSDF", "EDF", "VDF"] {
            reg.register_type(TypeDesc::new(closure, B::None, S::Closure, 1, false, Value::Integer(0)))?;
        }
        for shader in [
            "surfaceshader",
            "volumeshader",
            "displacementshader",
            "lightshader",
        ] {
            reg.register_type(TypeDesc::new(shader, B::None, S::Shader, 1, false, Value::Integer(0)))?;
        }
        reg.register_type(TypeDesc::new("material", B::None, S::Material, 1, false, Value::Integer(0)))?;

        for to in ["vector2", "vector3", "vector4", "color3", "color4"] {
            reg.register_conversion("float", to, Conversion::Splat)?;
        }
        reg.register_conversion("integer", "float", Conversion::Cast)?;
        reg.register_conversion("boolean", "float", Conversion::Cast)?;
        reg.register_conversion("color3", "vector3", Conversion::Reinterpret)?;
        reg.register_conversion("vector3", "color3", Conversion::Reinterpret)?;
        reg.register_conversion("color4", "vector4", Conversion::Reinterpret)?;
        reg.register_conversion("vector4", "color4", Conversion::Reinterpret)?;
        reg.register_conversion("color3", "color4", Conversion::Swizzle("rgb1".to_string()))?;
        reg.register_conversion("color4", "color3", Conversion::Swizzle("rgb".to_string()))?;

        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_types_registered() {
        let reg = TypeRegistry::standard().unwrap();
        let m = reg.get("matrix33").unwrap();
        assert_eq!(m.size, 9);
        assert_eq!(m.semantic, Semantic::Matrix);
        assert!(reg.get("BSDF").unwrap().is_closure());
        assert!(!reg.get("BSDF").unwrap().editable);
        assert!(reg.get("floatarray").unwrap().is_array());
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let mut reg = TypeRegistry::standard().unwrap();
        let err = reg
            .register_type(TypeDesc::new("float", BaseType::Float, Semantic::None, 1, true, Value::Float(0.0)))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GenError>(),
            Some(&GenError::DuplicateType("float".to_string()))
        );
    }

    #[test]
    fn test_unknown_type_is_type_error() {
        let reg = TypeRegistry::standard().unwrap();
        let err = reg.get("float5").unwrap_err();
        assert!(err.downcast_ref::<GenError>().unwrap().is_type_error());
    }

    #[test]
    fn test_closure_conversions_rejected() {
        let mut reg = TypeRegistry::standard().unwrap();
        assert!(reg.register_conversion("BSDF", "color3", Conversion::Cast).is_err());
        assert!(reg.register_conversion("float", "EDF", Conversion::Splat).is_err());
    }

    #[test]
    fn test_conversion_lookup() {
        let reg = TypeRegistry::standard().unwrap();
        let f = reg.get("float").unwrap();
        let c3 = reg.get("color3").unwrap();
        let c4 = reg.get("color4").unwrap();
        assert_eq!(reg.conversion(&f, &c3), Some(&Conversion::Splat));
        assert_eq!(
            reg.conversion(&c3, &c4),
            Some(&Conversion::Swizzle("rgb1".to_string()))
        );
        assert_eq!(reg.conversion(&c3, &f), None);
    }
}
