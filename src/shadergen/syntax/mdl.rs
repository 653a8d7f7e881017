use super::{Syntax, TypeSyntax, ValueFormat};
use crate::shadergen::target::Target;

const MDL_KEYWORDS: &[&str] = &[
    "annotation", "bool", "bool2", "bool3", "bool4", "break", "bsdf", "bsdf_measurement", "case",
    "cast", "color", "const", "continue", "default", "do", "double", "double2", "double2x2",
    "double2x3", "double3", "double3x2", "double3x3", "double3x4", "double4", "double4x3",
    "double4x4", "double4x2", "double2x4", "edf", "else", "enum", "export", "false", "float",
    "float2", "float2x2", "float2x3", "float3", "float3x2", "float3x3", "float3x4", "float4",
    "float4x3", "float4x4", "float4x2", "float2x4", "for", "hair_bsdf", "if", "import", "in",
    "int", "int2", "int3", "int4", "intensity_mode", "intensity_power",
    "intensity_radiant_exitance", "let", "light_profile", "material", "material_emission",
    "material_geometry", "material_surface", "material_volume", "mdl", "module", "package",
    "return", "string", "struct", "switch", "texture_2d", "texture_3d", "texture_cube",
    "texture_ptex", "true", "typedef", "uniform", "using", "varying", "vdf", "while",
    // reserved for future use
    "auto", "catch", "char", "class", "const_cast", "delete", "dynamic_cast", "explicit", "extern",
    "external", "foreach", "friend", "goto", "graph", "half", "half2", "half2x2", "half2x3",
    "half3", "half3x2", "half3x3", "half3x4", "half4", "half4x3", "half4x4", "half4x2", "half2x4",
    "inline", "inout", "lambda", "long", "mutable", "namespace", "native", "new", "operator", "out",
    "phenomenon", "private", "protected", "public", "reinterpret_cast", "sampler", "shader",
    "short", "signed", "sizeof", "static", "static_cast", "technique", "template", "this", "throw",
    "try", "typeid", "typename", "union", "unsigned", "virtual", "void", "volatile", "wchar_t",
];

/// NVIDIA Material Definition Language syntax. Every closure and shader type
/// is a `material`.
pub fn mdl() -> Syntax {
    let mut s = Syntax::new(Target::Mdl);
    s.register_restricted_names(MDL_KEYWORDS.iter().copied());
    // Identifiers may not begin with an underscore.
    s.register_invalid_prefixes(&[("_", "u")]);
    s.uniform_qualifier = "uniform".to_string();

    let array = |ty: &str, default: &str| {
        TypeSyntax::scalar(ty, default).with_format(ValueFormat::Array {
            open: format!("{ty}[]("),
            close: ")".to_string(),
        })
    };

    s.register_type_syntax("float", TypeSyntax::scalar("float", "0.0"));
    s.register_type_syntax("floatarray", array("float", "0.0"));
    s.register_type_syntax("integer", TypeSyntax::scalar("int", "0"));
    s.register_type_syntax("integerarray", array("int", "0"));
    s.register_type_syntax("boolean", TypeSyntax::scalar("bool", "false"));
    // Colors cannot be indexed, components go through float3.
    s.register_type_syntax(
        "color3",
        TypeSyntax::aggregate(
            "color",
            "color(0.0)",
            &["float3({}).x", "float3({}).y", "float3({}).z"],
        ),
    );
    s.register_type_syntax(
        "color4",
        TypeSyntax::aggregate(
            "color4",
            "mk_color4(0.0)",
            &[
                "float3({}.rgb).x",
                "float3({}.rgb).y",
                "float3({}.rgb).z",
                "{}.a",
            ],
        )
        .with_constructor("mk_color4"),
    );
    s.register_type_syntax(
        "vector2",
        TypeSyntax::aggregate("float2", "float2(0.0)", &["{}.x", "{}.y"]),
    );
    s.register_type_syntax(
        "vector3",
        TypeSyntax::aggregate("float3", "float3(0.0)", &["{}.x", "{}.y", "{}.z"]),
    );
    s.register_type_syntax(
        "vector4",
        TypeSyntax::aggregate("float4", "float4(0.0)", &["{}.x", "{}.y", "{}.z", "{}.w"]),
    );
    s.register_type_syntax(
        "matrix33",
        TypeSyntax::aggregate("float3x3", "float3x3(1.0)", &[]),
    );
    s.register_type_syntax(
        "matrix44",
        TypeSyntax::aggregate("float4x4", "float4x4(1.0)", &[]),
    );
    s.register_type_syntax(
        "string",
        TypeSyntax::scalar("string", "\"\"").with_format(ValueFormat::Quoted),
    );
    s.register_type_syntax(
        "filename",
        TypeSyntax::scalar("texture_2d", "texture_2d()").with_format(ValueFormat::Resource {
            open: "texture_2d(".to_string(),
            close: ", ::tex::gamma_default)".to_string(),
        }),
    );

    for ty in [
        "BSDF",
        "EDF",
        "VDF",
        "surfaceshader",
        "volumeshader",
        "displacementshader",
        "lightshader",
        "material",
    ] {
        s.register_type_syntax(ty, TypeSyntax::fixed("material", "material()"));
    }
    s
}
