//! Small formatting helpers shared by the syntax tables and the generators.

use std::collections::BTreeMap;

/// Format a float literal in fixed notation with at least one fractional digit.
///
/// Trailing zeros are trimmed (`0.250000000` -> `0.25`) but `1` stays `1.0`, so
/// the literal is a float in every target language. Non-finite values map to 0.
pub fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v:.9}");
    let trimmed = s.trim_end_matches('0');
    let out = if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    };
    if out == "-0.0" { "0.0".to_string() } else { out }
}

/// Replace every character that is not `[A-Za-z0-9_]` with `_`, and prefix an
/// underscore when the result would start with a digit.
pub fn sanitize_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Substitute `$token`s in `source`. Longer tokens are replaced first so a token
/// that prefixes another cannot clobber it.
pub fn replace_tokens(source: &str, tokens: &BTreeMap<String, String>) -> String {
    if tokens.is_empty() || !source.contains('$') {
        return source.to_string();
    }
    let mut ordered: Vec<(&String, &String)> = tokens.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    let mut out = source.to_string();
    for (token, replacement) in ordered {
        if out.contains(token.as_str()) {
            out = out.replace(token.as_str(), replacement);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_f32_keeps_decimal_point() {
        assert_eq!(fmt_f32(1.0), "1.0");
        assert_eq!(fmt_f32(0.25), "0.25");
        assert_eq!(fmt_f32(-2.5), "-2.5");
        assert_eq!(fmt_f32(0.0), "0.0");
        assert_eq!(fmt_f32(-0.0), "0.0");
        assert_eq!(fmt_f32(f32::NAN), "0.0");
    }

    #[test]
    fn test_sanitize_ident() {
        assert_eq!(sanitize_ident("group/inner.node"), "group_inner_node");
        assert_eq!(sanitize_ident("2d"), "_2d");
        assert_eq!(sanitize_ident(""), "_");
    }

    #[test]
    fn test_replace_tokens_longest_first() {
        let mut tokens = BTreeMap::new();
        tokens.insert("$pos".to_string(), "p".to_string());
        tokens.insert("$posWorld".to_string(), "positionWorld".to_string());
        assert_eq!(
            replace_tokens("$posWorld + $pos", &tokens),
            "positionWorld + p"
        );
    }
}
