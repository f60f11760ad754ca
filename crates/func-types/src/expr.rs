//! Type expression parser
//!
//! Turns the informal annotations found in documentation comments and export
//! declarations into a [`Type`] tree. The grammar is deliberately small:
//!
//! - primitives: `boolean` (or `bool`), `number`, `string`, `any`
//! - lists: `T[]`
//! - tuples: `[T, U, ...]`
//! - wrappers: `Set<T>`, `Map<T>` (and `Map<string, T>`)
//! - objects: `{ key: T; other: U }`, with nested object members
//! - index signatures: `{ [key: string]: T }`, which become `Map<T>`
//!
//! Unions and intersections are rejected. Any other text is accepted as
//! [`Type::Dynamic`].

use crate::error::{PathStep, Result, TypeError};
use crate::types::Type;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Parse a type expression.
///
/// # Examples
///
/// ```
/// use func_types::{parse_type, Type};
///
/// assert_eq!(parse_type("number[]").unwrap(), Type::list(Type::Number));
/// assert_eq!(
///     parse_type("{ [key: string]: boolean }").unwrap(),
///     Type::map(Type::Bool)
/// );
/// assert!(parse_type("string | number").is_err());
/// ```
pub fn parse_type(expr: &str) -> Result<Type> {
    let expr = expr.trim();

    if let Some(&pos) = top_level_positions(expr, &['|', '&']).first() {
        let reason = if expr[pos..].starts_with('|') {
            "union types are not supported"
        } else {
            "intersection types are not supported"
        };
        return Err(TypeError::unsupported(expr, reason));
    }

    match expr {
        "boolean" | "bool" => return Ok(Type::Bool),
        "number" => return Ok(Type::Number),
        "string" => return Ok(Type::String),
        "any" | "" => return Ok(Type::Dynamic),
        _ => {}
    }

    if let Some(prefix) = expr.strip_suffix("[]") {
        if !prefix.trim().is_empty() {
            let element = parse_type(prefix).map_err(|e| e.at(PathStep::Element))?;
            return Ok(Type::list(element));
        }
    }

    if let Some(inner) = enclosed(expr).filter(|_| expr.starts_with('[')) {
        return parse_tuple(inner);
    }

    if let Some(inner) = expr.strip_prefix("Set").and_then(enclosed_angle) {
        let element = parse_type(inner).map_err(|e| e.at(PathStep::Element))?;
        return Ok(Type::set(element));
    }

    if let Some(inner) = expr.strip_prefix("Map").and_then(enclosed_angle) {
        return parse_map(expr, inner);
    }

    if let Some(inner) = enclosed(expr).filter(|_| expr.starts_with('{')) {
        return parse_object(expr, inner);
    }

    Ok(Type::Dynamic)
}

impl FromStr for Type {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self> {
        parse_type(s)
    }
}

fn parse_tuple(inner: &str) -> Result<Type> {
    if inner.trim().is_empty() {
        return Ok(Type::tuple([]));
    }

    let mut parts = split_top_level(inner, &[',']);
    // Tolerate a trailing comma
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }

    let mut elements = Vec::with_capacity(parts.len());
    for (i, part) in parts.into_iter().enumerate() {
        if part.trim().is_empty() {
            return Err(TypeError::unsupported(inner, "empty tuple element").at(PathStep::Index(i)));
        }
        elements.push(parse_type(part).map_err(|e| e.at(PathStep::Index(i)))?);
    }
    Ok(Type::Tuple { elements })
}

fn parse_map(expr: &str, inner: &str) -> Result<Type> {
    let parts = split_top_level(inner, &[',']);
    let value = match parts.as_slice() {
        [value] => value,
        [key, value] => {
            if parse_type(key)? != Type::String {
                return Err(TypeError::unsupported(expr, "map keys must be strings"));
            }
            value
        }
        _ => return Err(TypeError::unsupported(expr, "too many type arguments for Map")),
    };
    let element = parse_type(value).map_err(|e| e.at(PathStep::Element))?;
    Ok(Type::map(element))
}

fn parse_object(expr: &str, inner: &str) -> Result<Type> {
    let mut fields = BTreeMap::new();
    let mut index_signature: Option<Type> = None;
    let mut index_count = 0usize;

    for member in split_top_level(inner, &[';', ',', '\n']) {
        let member = member.trim();
        if member.is_empty() {
            continue;
        }

        if member.starts_with('[') {
            index_count += 1;
            index_signature = Some(parse_index_signature(member)?);
            continue;
        }

        let Some(&colon) = top_level_positions(member, &[':']).first() else {
            return Err(TypeError::unsupported(member, "expected a 'key: type' member"));
        };
        let key = member_key(&member[..colon]);
        if key.is_empty() {
            return Err(TypeError::unsupported(member, "object member has an empty key"));
        }

        let ty = parse_type(&member[colon + 1..]).map_err(|e| e.at(PathStep::Key(key.clone())))?;
        fields.insert(key, ty);
    }

    match (index_signature, index_count, fields.is_empty()) {
        (None, _, _) => Ok(Type::Object { fields }),
        (Some(value), 1, true) => Ok(Type::map(value)),
        (Some(_), 1, false) => Err(TypeError::unsupported(
            expr,
            "index signatures cannot be mixed with named members",
        )),
        (Some(_), _, _) => Err(TypeError::unsupported(
            expr,
            "only one index signature is supported",
        )),
    }
}

/// Parse `[name: string]: T` into the value type `T`.
fn parse_index_signature(member: &str) -> Result<Type> {
    let (head, rest) = match split_leading_group(member) {
        Some(parts) => parts,
        None => return Err(TypeError::unsupported(member, "unterminated index signature")),
    };

    let Some(value) = rest.trim_start().strip_prefix(':') else {
        return Err(TypeError::unsupported(member, "index signature has no value type"));
    };

    let key_type = match head.split_once(':') {
        Some((_, key_type)) => key_type.trim(),
        None => return Err(TypeError::unsupported(member, "index signature has no key type")),
    };
    if key_type != "string" {
        return Err(TypeError::unsupported(
            member,
            format!("index signature keys must be 'string', found '{}'", key_type),
        ));
    }

    parse_type(value).map_err(|e| e.at(PathStep::Element))
}

/// Unquote and strip the optional marker from an object member key.
fn member_key(raw: &str) -> String {
    let key = raw.trim();
    let key = key.strip_suffix('?').unwrap_or(key).trim_end();
    for quote in ['"', '\''] {
        if let Some(unquoted) = key
            .strip_prefix(quote)
            .and_then(|k| k.strip_suffix(quote))
        {
            return unquoted.to_string();
        }
    }
    key.to_string()
}

/// Byte offsets of `targets` outside any bracket pair or quoted string.
fn top_level_positions(s: &str, targets: &[char]) -> Vec<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut positions = Vec::new();

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' | '(' | '<' => depth += 1,
            ']' | '}' | ')' | '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 && targets.contains(&c) => positions.push(i),
            _ => {}
        }
    }
    positions
}

fn split_top_level<'a>(s: &'a str, separators: &[char]) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(s, separators) {
        parts.push(&s[start..pos]);
        start = pos + 1;
    }
    parts.push(&s[start..]);
    parts
}

/// Split `s` after the bracket group that opens at its first character.
///
/// Returns the group's inner text and everything after the closing bracket.
fn split_leading_group(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with(['[', '{', '(', '<']) {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' | '(' | '<' => depth += 1,
            ']' | '}' | ')' | '>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = i + c.len_utf8();
                    return Some((&s[1..i], &s[end..]));
                }
            }
            _ if depth == 0 => return None,
            _ => {}
        }
    }
    None
}

/// Inner text when the group opening at the first character closes at the last.
fn enclosed(s: &str) -> Option<&str> {
    match split_leading_group(s) {
        Some((inner, "")) => Some(inner),
        _ => None,
    }
}

fn enclosed_angle(s: &str) -> Option<&str> {
    enclosed(s.trim_start()).filter(|_| s.trim_start().starts_with('<'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(s: &str) -> Type {
        parse_type(s).unwrap()
    }

    #[test]
    fn test_primitives() {
        assert_eq!(parse("boolean"), Type::Bool);
        assert_eq!(parse("bool"), Type::Bool);
        assert_eq!(parse("number"), Type::Number);
        assert_eq!(parse("string"), Type::String);
        assert_eq!(parse("any"), Type::Dynamic);
        assert_eq!(parse(""), Type::Dynamic);
        assert_eq!(parse("  number  "), Type::Number);
    }

    #[test]
    fn test_containers() {
        assert_eq!(parse("number[]"), Type::list(Type::Number));
        assert_eq!(parse("Set<string>"), Type::set(Type::String));
        assert_eq!(parse("Map<string[]>"), Type::map(Type::list(Type::String)));
        assert_eq!(parse("Map<string, number>"), Type::map(Type::Number));
        assert_eq!(
            parse("[number, string, boolean]"),
            Type::tuple([Type::Number, Type::String, Type::Bool])
        );
        assert_eq!(parse("string[][]"), Type::list(Type::list(Type::String)));
        assert_eq!(parse("[]"), Type::tuple([]));
        assert_eq!(parse("[number, string,]"), Type::tuple([Type::Number, Type::String]));
    }

    #[test]
    fn test_tuple_split_respects_nesting() {
        assert_eq!(
            parse("[{ a: number, b: string }, [number, number], Map<string, boolean>]"),
            Type::tuple([
                Type::object([("a", Type::Number), ("b", Type::String)]),
                Type::tuple([Type::Number, Type::Number]),
                Type::map(Type::Bool),
            ])
        );
    }

    #[test]
    fn test_objects() {
        assert_eq!(
            parse("{ name: string; age: number }"),
            Type::object([("name", Type::String), ("age", Type::Number)])
        );
        assert_eq!(parse("{}"), Type::object::<String>([]));
        assert_eq!(
            parse("{ \"first name\": string; 'x': number; nick?: string }"),
            Type::object([
                ("first name", Type::String),
                ("x", Type::Number),
                ("nick", Type::String),
            ])
        );
        // Last duplicate wins
        assert_eq!(
            parse("{ a: string; a: number }"),
            Type::object([("a", Type::Number)])
        );
    }

    #[test]
    fn test_nested_objects() {
        let expected = Type::object([
            ("user", Type::object([("name", Type::String), ("tags", Type::list(Type::String))])),
            ("score", Type::Number),
        ]);
        assert_eq!(
            parse("{ user: { name: string; tags: string[]; }; score: number; }"),
            expected
        );
        assert_eq!(
            parse("{\n  user: {\n    name: string\n    tags: string[]\n  }\n  score: number\n}"),
            expected
        );
    }

    #[test]
    fn test_index_signature_becomes_map() {
        assert_eq!(
            parse("{ [key: string]: { name: string; age: number; } }"),
            Type::map(Type::object([("name", Type::String), ("age", Type::Number)]))
        );
        assert_eq!(
            parse("{ [k: string]: number[] }"),
            Type::map(Type::list(Type::Number))
        );
    }

    #[test]
    fn test_unsupported_index_signatures() {
        let err = parse_type("{ [key: number]: string }").unwrap_err();
        assert!(err.is_unsupported_type());

        let err = parse_type("{ [key: string]: string; extra: number }").unwrap_err();
        assert!(err.is_unsupported_type());

        let err = parse_type("{ [a: string]: string; [b: string]: number }").unwrap_err();
        assert!(err.is_unsupported_type());

        let err = parse_type("Map<number, string>").unwrap_err();
        assert!(err.is_unsupported_type());
    }

    #[test]
    fn test_unions_rejected() {
        let err = parse_type("string | number").unwrap_err();
        match err {
            TypeError::UnsupportedType { fragment, .. } => assert_eq!(fragment, "string | number"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse_type("A & B").unwrap_err().is_unsupported_type());
    }

    #[test]
    fn test_inner_errors_carry_position() {
        let err = parse_type("[number, string | boolean]").unwrap_err();
        assert_eq!(err.path().map(|p| p.to_string()).as_deref(), Some("$[1]"));

        let err = parse_type("{ user: { id: number | string } }").unwrap_err();
        assert_eq!(err.path().map(|p| p.to_string()).as_deref(), Some("$.user.id"));

        let err = parse_type("Set<{ a: x | y }>").unwrap_err();
        assert_eq!(err.path().map(|p| p.to_string()).as_deref(), Some("$[*].a"));
    }

    #[test]
    fn test_malformed_member_rejected() {
        let err = parse_type("{ name string }").unwrap_err();
        assert!(err.is_unsupported_type());
    }

    #[test]
    fn test_unknown_text_is_dynamic() {
        assert_eq!(parse("Date"), Type::Dynamic);
        assert_eq!(parse("Promise<number>"), Type::Dynamic);
        assert_eq!(parse("object"), Type::Dynamic);
    }

    #[test]
    fn test_stray_closing_brackets() {
        for s in [")", "]", "}", ">", ") x", "]number", "{ a: ) }", "[)]"] {
            let _ = parse_type(s);
        }
        assert_eq!(parse(")"), Type::Dynamic);
        assert_eq!(parse("> x"), Type::Dynamic);
    }

    #[test]
    fn test_from_str() {
        let ty: Type = "Set<number>".parse().unwrap();
        assert_eq!(ty, Type::set(Type::Number));
    }

    fn arb_type() -> impl Strategy<Value = Type> {
        let leaf = prop_oneof![
            Just(Type::Bool),
            Just(Type::Number),
            Just(Type::String),
            Just(Type::Dynamic),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(Type::list),
                inner.clone().prop_map(Type::set),
                inner.clone().prop_map(Type::map),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Type::tuple),
                prop::collection::btree_map("[a-z][a-z0-9_]{0,6}", inner, 0..4)
                    .prop_map(|fields| Type::Object { fields }),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_render_then_parse_is_identity(ty in arb_type()) {
            let rendered = ty.to_string();
            prop_assert_eq!(parse_type(&rendered).unwrap(), ty);
        }

        #[test]
        fn test_parse_never_panics(s in "\\PC{0,40}") {
            let _ = parse_type(&s);
        }

        #[test]
        fn test_bracket_soup_never_panics(s in "[\\[\\]{}()<>:;,|? a-z]{0,24}") {
            let _ = parse_type(&s);
        }
    }
}
