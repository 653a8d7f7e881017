use super::{Syntax, TypeSyntax, ValueFormat};
use crate::shadergen::target::Target;

const VEC2: &[&str] = &["{}.x", "{}.y"];
const VEC3: &[&str] = &["{}.x", "{}.y", "{}.z"];
const VEC4: &[&str] = &["{}.x", "{}.y", "{}.z", "{}.w"];

pub(super) const GLSL_KEYWORDS: &[&str] = &[
    "centroid", "flat", "smooth", "noperspective", "patch", "sample", "break", "continue", "do",
    "for", "while", "switch", "case", "default", "if", "else", "subroutine", "in", "out", "inout",
    "float", "double", "int", "void", "bool", "true", "false", "invariant", "discard", "return",
    "mat2", "mat3", "mat4", "dmat2", "dmat3", "dmat4", "mat2x2", "mat2x3", "mat2x4", "dmat2x2",
    "dmat2x3", "dmat2x4", "mat3x2", "mat3x3", "mat3x4", "dmat3x2", "dmat3x3", "dmat3x4", "mat4x2",
    "mat4x3", "mat4x4", "dmat4x2", "dmat4x3", "dmat4x4", "vec2", "vec3", "vec4", "ivec2", "ivec3",
    "ivec4", "bvec2", "bvec3", "bvec4", "dvec2", "dvec3", "dvec4", "uint", "uvec2", "uvec3",
    "uvec4", "lowp", "mediump", "highp", "precision", "sampler1D", "sampler2D", "sampler3D",
    "samplerCube", "sampler1DShadow", "sampler2DShadow", "samplerCubeShadow", "sampler1DArray",
    "sampler2DArray", "sampler1DArrayShadow", "sampler2DArrayShadow", "isampler1D", "isampler2D",
    "isampler3D", "isamplerCube", "isampler1DArray", "isampler2DArray", "usampler1D", "usampler2D",
    "usampler3D", "usamplerCube", "usampler1DArray", "usampler2DArray", "sampler2DRect",
    "sampler2DRectShadow", "isampler2DRect", "usampler2DRect", "samplerBuffer", "isamplerBuffer",
    "usamplerBuffer", "sampler2DMS", "isampler2DMS", "usampler2DMS", "sampler2DMSArray",
    "isampler2DMSArray", "usampler2DMSArray", "samplerCubeArray", "samplerCubeArrayShadow",
    "isamplerCubeArray", "usamplerCubeArray", "common", "partition", "active", "asm", "struct",
    "class", "union", "enum", "typedef", "template", "this", "packed", "goto", "inline", "noinline",
    "volatile", "public", "static", "extern", "external", "interface", "long", "short", "half",
    "fixed", "unsigned", "superp", "input", "output", "hvec2", "hvec3", "hvec4", "fvec2", "fvec3",
    "fvec4", "sampler3DRect", "filter", "image1D", "image2D", "image3D", "imageCube", "iimage1D",
    "iimage2D", "iimage3D", "iimageCube", "uimage1D", "uimage2D", "uimage3D", "uimageCube",
    "image1DArray", "image2DArray", "iimage1DArray", "iimage2DArray", "uimage1DArray",
    "uimage2DArray", "image1DShadow", "image2DShadow", "image1DArrayShadow", "image2DArrayShadow",
    "imageBuffer", "iimageBuffer", "uimageBuffer", "sizeof", "cast", "namespace", "using",
    "row_major",
];

/// Built-in functions the hardware targets call from generated code. A
/// variable with one of these names would shadow the function.
pub(super) const HW_BUILTIN_FUNCTIONS: &[&str] = &[
    "radians", "degrees", "sin", "cos", "tan", "asin", "acos", "atan", "pow", "exp", "log", "exp2",
    "log2", "sqrt", "inversesqrt", "abs", "sign", "floor", "ceil", "fract", "mod", "fmod", "min",
    "max", "clamp", "mix", "step", "smoothstep", "length", "distance", "dot", "cross", "normalize",
    "faceforward", "reflect", "refract", "transpose", "determinant", "inverse", "texture",
    "textureSize", "textureLod", "dFdx", "dFdy", "fwidth", "any", "all", "not",
];

/// GLSL 4.50 syntax.
pub fn glsl() -> Syntax {
    let mut s = Syntax::new(Target::Glsl);
    s.register_restricted_names(GLSL_KEYWORDS.iter().copied());
    s.register_restricted_names(HW_BUILTIN_FUNCTIONS.iter().copied());
    s.register_invalid_tokens(&[
        ("__", "_"),
        ("gl_", "gll"),
        ("webgl_", "webgll"),
        ("_webgl", "wwebgl"),
    ]);
    s.input_qualifier = "in".to_string();
    s.output_qualifier = "out".to_string();
    s.uniform_qualifier = "uniform".to_string();
    s.constant_qualifier = "const".to_string();
    register_hw_types(&mut s, "vec", "mat", "sampler2D");
    s
}

/// Type tables shared by the GLSL-family hardware targets. `vec`/`mat` are the
/// vector and matrix prefixes (`vec3`, `mat4` or `float3`, `float4x4`).
pub(super) fn register_hw_types(s: &mut Syntax, vec: &str, mat: &str, sampler: &str) {
    let v2 = format!("{vec}2");
    let v3 = format!("{vec}3");
    let v4 = format!("{vec}4");
    let (m3, m4) = if mat == "mat" {
        ("mat3".to_string(), "mat4".to_string())
    } else {
        (format!("{mat}3x3"), format!("{mat}4x4"))
    };

    s.register_type_syntax("float", TypeSyntax::scalar("float", "0.0"));
    s.register_type_syntax(
        "floatarray",
        TypeSyntax::scalar("float", "0.0").with_format(ValueFormat::Array {
            open: "float[](".to_string(),
            close: ")".to_string(),
        }),
    );
    s.register_type_syntax("integer", TypeSyntax::scalar("int", "0"));
    s.register_type_syntax(
        "integerarray",
        TypeSyntax::scalar("int", "0").with_format(ValueFormat::Array {
            open: "int[](".to_string(),
            close: ")".to_string(),
        }),
    );
    s.register_type_syntax("boolean", TypeSyntax::scalar("bool", "false"));
    s.register_type_syntax(
        "color3",
        TypeSyntax::aggregate(&v3, &format!("{v3}(0.0)"), VEC3),
    );
    s.register_type_syntax(
        "color4",
        TypeSyntax::aggregate(&v4, &format!("{v4}(0.0)"), VEC4),
    );
    s.register_type_syntax(
        "vector2",
        TypeSyntax::aggregate(&v2, &format!("{v2}(0.0)"), VEC2),
    );
    s.register_type_syntax(
        "vector3",
        TypeSyntax::aggregate(&v3, &format!("{v3}(0.0)"), VEC3),
    );
    s.register_type_syntax(
        "vector4",
        TypeSyntax::aggregate(&v4, &format!("{v4}(0.0)"), VEC4),
    );
    s.register_type_syntax(
        "matrix33",
        TypeSyntax::aggregate(&m3, &format!("{m3}(1.0)"), &[]),
    );
    s.register_type_syntax(
        "matrix44",
        TypeSyntax::aggregate(&m4, &format!("{m4}(1.0)"), &[]),
    );
    // Strings have no hardware representation.
    s.register_type_syntax("string", TypeSyntax::fixed("int", "0"));
    s.register_type_syntax("filename", TypeSyntax::fixed(sampler, ""));

    s.register_type_syntax(
        "BSDF",
        TypeSyntax::fixed("BSDF", &format!("BSDF({v3}(0.0), {v3}(1.0))")).with_definition(&format!(
            "struct BSDF {{ {v3} response; {v3} throughput; }};"
        )),
    );
    s.register_type_syntax(
        "EDF",
        TypeSyntax::fixed("EDF", "EDF(0.0)").with_alias(&format!("#define EDF {v3}")),
    );
    s.register_type_syntax(
        "VDF",
        TypeSyntax::fixed("VDF", &format!("VDF({v3}(0.0), {v3}(0.0))")).with_definition(&format!(
            "struct VDF {{ {v3} absorption; {v3} scattering; }};"
        )),
    );
    s.register_type_syntax(
        "surfaceshader",
        TypeSyntax::fixed(
            "surfaceshader",
            &format!("surfaceshader({v3}(0.0), {v3}(0.0))"),
        )
        .with_definition(&format!(
            "struct surfaceshader {{ {v3} color; {v3} transparency; }};"
        )),
    );
    s.register_type_syntax(
        "volumeshader",
        TypeSyntax::fixed(
            "volumeshader",
            &format!("volumeshader({v3}(0.0), {v3}(0.0))"),
        )
        .with_definition(&format!(
            "struct volumeshader {{ {v3} color; {v3} transparency; }};"
        )),
    );
    s.register_type_syntax(
        "displacementshader",
        TypeSyntax::fixed(
            "displacementshader",
            &format!("displacementshader({v3}(0.0), 1.0)"),
        )
        .with_definition(&format!(
            "struct displacementshader {{ {v3} offset; float scale; }};"
        )),
    );
    s.register_type_syntax(
        "lightshader",
        TypeSyntax::fixed("lightshader", &format!("lightshader({v3}(0.0), {v3}(0.0))"))
            .with_definition(&format!(
                "struct lightshader {{ {v3} intensity; {v3} direction; }};"
            )),
    );
    s.register_type_syntax(
        "material",
        TypeSyntax::fixed("material", &format!("material({v3}(0.0), {v3}(0.0))"))
            .with_alias("#define material surfaceshader"),
    );
}
