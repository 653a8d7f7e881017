use super::glsl::{HW_BUILTIN_FUNCTIONS, register_hw_types};
use super::{Syntax, TypeSyntax, ValueFormat};
use crate::shadergen::target::Target;

const MSL_KEYWORDS: &[&str] = &[
    "centroid", "flat", "smooth", "noperspective", "patch", "sample", "break", "continue", "do",
    "for", "while", "switch", "case", "default", "if", "else", "subroutine", "in", "out", "inout",
    "float", "double", "int", "void", "bool", "true", "false", "invariant", "discard_fragment",
    "return", "float2x2", "float2x3", "float2x4", "float3x2", "float3x3", "float3x4", "float4x2",
    "float4x3", "float4x4", "float2", "float3", "float4", "int2", "int3", "int4", "bool2", "bool3",
    "bool4", "uint", "uint2", "uint3", "uint4", "lowp", "mediump", "highp", "precision", "common",
    "partition", "active", "asm", "struct", "class", "union", "enum", "typedef", "template", "this",
    "packed", "inline", "noinline", "volatile", "public", "static", "extern", "external",
    "interface", "long", "short", "half", "fixed", "unsigned", "superp", "input", "output", "half2",
    "half3", "half4", "sampler3DRect", "filter", "texture1d", "texture2d", "texture3d",
    "textureCube", "buffer", "sizeof", "cast", "namespace", "using", "row_major", "mix", "sampler",
    "thread", "device", "constant", "vertex", "fragment",
];

/// Metal Shading Language syntax. Shares the hardware type tables with GLSL
/// under `floatN` names; textures travel with their sampler.
pub fn msl() -> Syntax {
    let mut s = Syntax::new(Target::Msl);
    s.register_restricted_names(MSL_KEYWORDS.iter().copied());
    s.register_restricted_names(HW_BUILTIN_FUNCTIONS.iter().copied());
    s.register_invalid_tokens(&[
        ("__", "_"),
        ("gl_", "gll"),
        ("webgl_", "webgll"),
        ("_webgl", "wwebgl"),
    ]);
    s.output_qualifier = "thread".to_string();
    s.output_by_reference = true;
    s.uniform_qualifier = "constant".to_string();
    s.constant_qualifier = "constant".to_string();
    register_hw_types(&mut s, "float", "float", "MetalTexture");

    for (name, ty) in [("floatarray", "float"), ("integerarray", "int")] {
        s.register_type_syntax(
            name,
            TypeSyntax::scalar(ty, "0").with_format(ValueFormat::Array {
                open: "{".to_string(),
                close: "}".to_string(),
            }),
        );
    }
    s.register_type_syntax(
        "filename",
        TypeSyntax::fixed("MetalTexture", "")
            .with_definition("struct MetalTexture { texture2d<float> tex; sampler s; };"),
    );

    // Structs have no constructors in Metal; values use aggregate braces.
    for (name, fields, default) in [
        ("BSDF", "float3 response; float3 throughput;", "{float3(0.0), float3(1.0)}"),
        ("VDF", "float3 absorption; float3 scattering;", "{float3(0.0), float3(0.0)}"),
        ("surfaceshader", "float3 color; float3 transparency;", "{float3(0.0), float3(0.0)}"),
        ("volumeshader", "float3 color; float3 transparency;", "{float3(0.0), float3(0.0)}"),
        ("displacementshader", "float3 offset; float scale;", "{float3(0.0), 1.0}"),
        ("lightshader", "float3 intensity; float3 direction;", "{float3(0.0), float3(0.0)}"),
    ] {
        s.register_type_syntax(
            name,
            TypeSyntax::fixed(name, &format!("{name}{default}"))
                .with_definition(&format!("struct {name} {{ {fields} }};")),
        );
    }
    s.register_type_syntax(
        "material",
        TypeSyntax::fixed("material", "material{float3(0.0), float3(0.0)}")
            .with_alias("#define material surfaceshader"),
    );
    s
}
