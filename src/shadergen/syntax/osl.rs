use super::{Syntax, TypeSyntax, ValueFormat};
use crate::shadergen::target::Target;

const OSL_KEYWORDS: &[&str] = &[
    "and", "break", "closure", "color", "continue", "do", "else", "emit", "float", "for", "if",
    "illuminance", "illuminate", "int", "matrix", "normal", "not", "or", "output", "point",
    "public", "return", "string", "struct", "vector", "void", "while", "bool", "case", "catch",
    "char", "class", "const", "delete", "default", "double", "enum", "extern", "false", "friend",
    "goto", "inline", "long", "new", "operator", "private", "protected", "short", "signed",
    "sizeof", "static", "switch", "template", "this", "throw", "true", "try", "typedef", "uniform",
    "union", "unsigned", "varying", "virtual", "volatile", "emission", "background", "diffuse",
    "oren_nayer", "translucent", "phong", "ward", "microfacet", "reflection", "transparent",
    "debug", "holdout", "subsurface",
];

fn closure(default: &str) -> TypeSyntax {
    TypeSyntax::fixed("closure color", default).with_uniform_default("0")
}

/// Open Shading Language syntax. `vector2`, `vector4` and `color4` are structs
/// provided by the `mx_funcs.h` support header.
pub fn osl() -> Syntax {
    let mut s = Syntax::new(Target::Osl);
    s.register_restricted_names(OSL_KEYWORDS.iter().copied());
    s.output_qualifier = "output".to_string();

    let struct_braces = ValueFormat::Constructor {
        uniform_braces: true,
    };
    let array = |ty: &str, default: &str| {
        TypeSyntax::scalar(ty, default).with_format(ValueFormat::Array {
            open: "{".to_string(),
            close: "}".to_string(),
        })
    };

    s.register_type_syntax("float", TypeSyntax::scalar("float", "0.0"));
    s.register_type_syntax("floatarray", array("float", "0.0"));
    s.register_type_syntax("integer", TypeSyntax::scalar("int", "0"));
    s.register_type_syntax("integerarray", array("int", "0"));
    s.register_type_syntax(
        "boolean",
        TypeSyntax::scalar("int", "0").with_format(ValueFormat::IntBool),
    );
    s.register_type_syntax(
        "color3",
        TypeSyntax::aggregate("color", "color(0.0)", &["{}[0]", "{}[1]", "{}[2]"]),
    );
    s.register_type_syntax(
        "color4",
        TypeSyntax::aggregate(
            "color4",
            "color4(color(0.0), 0.0)",
            &["{}.rgb[0]", "{}.rgb[1]", "{}.rgb[2]", "{}.a"],
        )
        .with_uniform_default("{color(0.0), 0.0}")
        .with_format(ValueFormat::NestedColor4 {
            inner: "color".to_string(),
            uniform_braces: true,
        }),
    );
    s.register_type_syntax(
        "vector2",
        TypeSyntax::aggregate("vector2", "vector2(0.0, 0.0)", &["{}.x", "{}.y"])
            .with_uniform_default("{0.0, 0.0}")
            .with_format(struct_braces.clone()),
    );
    s.register_type_syntax(
        "vector3",
        TypeSyntax::aggregate("vector", "vector(0.0)", &["{}[0]", "{}[1]", "{}[2]"]),
    );
    s.register_type_syntax(
        "vector4",
        TypeSyntax::aggregate(
            "vector4",
            "vector4(0.0, 0.0, 0.0, 0.0)",
            &["{}.x", "{}.y", "{}.z", "{}.w"],
        )
        .with_uniform_default("{0.0, 0.0, 0.0, 0.0}")
        .with_format(struct_braces),
    );
    // OSL has a single 4x4 matrix type.
    s.register_type_syntax(
        "matrix33",
        TypeSyntax::aggregate("matrix", "matrix(1.0)", &[]).with_format(ValueFormat::PaddedMatrix33),
    );
    s.register_type_syntax(
        "matrix44",
        TypeSyntax::aggregate("matrix", "matrix(1.0)", &[]),
    );
    s.register_type_syntax(
        "string",
        TypeSyntax::scalar("string", "\"\"").with_format(ValueFormat::Quoted),
    );
    s.register_type_syntax(
        "filename",
        TypeSyntax::scalar("string", "\"\"").with_format(ValueFormat::Quoted),
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
        s.register_type_syntax(ty, closure("null_closure"));
    }
    s
}
