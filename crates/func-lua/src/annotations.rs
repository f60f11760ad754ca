//! Documentation block extraction for Lua sources
//!
//! Parses LDoc-style blocks and keys them by the fingerprint of the
//! declaration line that follows each block.
//!
//! ## Format
//!
//! ```lua
//! --- Add two numbers
//! -- Longer description of what adding does.
//! -- @param a number The left operand
//! -- @param b number The right operand
//! -- @return number The sum
//! function add(a, b)
//!     return a + b
//! end
//! ```
//!
//! JSDoc ordering is accepted as well: `@param {number} a - The left operand`.
//! A type written in braces is unwrapped unless the braces are an object type
//! (`{number}` is `number`, `{ a: string }` stays an object).

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static FUNCTION_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:local\s+)?function\s+(?:\w+[.:])*(\w+)\s*\(")
        .expect("function declaration regex")
});

static ASSIGNED_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:local\s+)?(?:\w+\.)*(\w+)\s*=\s*function\s*\(")
        .expect("assigned function regex")
});

static PARAMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s*([\w.:]*)\s*\(([^)]*)\)").expect("parameter list regex")
});

/// Documentation attached to one function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionMetadata {
    /// First free-text line of the block
    pub summary: String,
    /// Remaining free-text lines
    pub description: String,
    pub params: Vec<ParamMetadata>,
    pub returns: Option<ReturnMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMetadata {
    pub name: String,
    /// Type expression as written, without braces or optional marker
    pub type_expr: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnMetadata {
    pub type_expr: Option<String>,
    pub description: String,
}

/// Normalize declaration text so that only whitespace differences are ignored.
pub fn fingerprint(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Name declared on a function declaration line, if any.
///
/// Recognizes `function name(`, `local function name(`, `function M.name(`,
/// `function M:name(` and `name = function(`.
pub fn function_name(line: &str) -> Option<String> {
    FUNCTION_DECL_RE
        .captures(line)
        .or_else(|| ASSIGNED_FUNCTION_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parameter names of the first function declared in `text`.
///
/// Methods declared with `:` get their implicit `self` parameter first.
/// Varargs are not named parameters and are skipped.
pub fn param_names(text: &str) -> Option<Vec<String>> {
    let captures = PARAMS_RE.captures(text)?;
    let is_method = captures.get(1).is_some_and(|m| m.as_str().contains(':'));

    let mut names = Vec::new();
    if is_method {
        names.push("self".to_string());
    }
    names.extend(
        captures
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != "...")
            .map(str::to_string),
    );
    Some(names)
}

/// Parse every documentation block in `source`.
///
/// The map is keyed by the [`fingerprint`] of the declaration line that
/// follows each block. Blocks that are not followed by a function are
/// dropped.
pub fn parse_doc_blocks(source: &str) -> HashMap<String, FunctionMetadata> {
    let mut blocks = HashMap::new();
    let lines: Vec<&str> = source.lines().collect();

    let mut i = 0;
    while i < lines.len() {
        let Some(first) = lines[i].trim().strip_prefix("---") else {
            i += 1;
            continue;
        };

        let mut text_lines = Vec::new();
        let mut tags = Vec::new();
        classify_line(first.trim_start_matches('-').trim(), &mut text_lines, &mut tags);
        i += 1;

        while i < lines.len() {
            let line = lines[i].trim();
            if !line.starts_with("--") || line.starts_with("---") {
                break;
            }
            classify_line(line.trim_start_matches('-').trim(), &mut text_lines, &mut tags);
            i += 1;
        }

        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }

        let Some(declaration) = lines.get(i) else {
            debug!("Documentation block at end of source has no function");
            break;
        };
        if !PARAMS_RE.is_match(declaration) {
            debug!("Documentation block is not followed by a function: {}", declaration.trim());
            continue;
        }

        blocks.insert(fingerprint(declaration), build_metadata(text_lines, tags));
    }

    blocks
}

fn classify_line(content: &str, text_lines: &mut Vec<String>, tags: &mut Vec<String>) {
    if content.starts_with('@') {
        tags.push(content.to_string());
    } else if let Some(last) = tags.last_mut().filter(|_| !content.is_empty()) {
        // Continuation of a multi-line tag description
        last.push(' ');
        last.push_str(content);
    } else {
        text_lines.push(content.to_string());
    }
}

fn build_metadata(text_lines: Vec<String>, tags: Vec<String>) -> FunctionMetadata {
    let mut text = text_lines.into_iter().skip_while(|l| l.is_empty());
    let summary = text.next().unwrap_or_default();
    let description = text.collect::<Vec<_>>().join("\n").trim().to_string();

    let mut metadata = FunctionMetadata {
        summary,
        description,
        ..Default::default()
    };

    for tag in tags {
        let (name, rest) = tag.split_once(char::is_whitespace).unwrap_or((tag.as_str(), ""));
        match name {
            "@param" | "@arg" => {
                if let Some(param) = parse_param_tag(rest.trim()) {
                    metadata.params.push(param);
                }
            }
            "@return" | "@returns" => {
                let (type_expr, description) = scan_type(rest.trim());
                metadata.returns = Some(ReturnMetadata {
                    type_expr,
                    description: description.to_string(),
                });
            }
            other => debug!("Ignoring documentation tag {}", other),
        }
    }

    metadata
}

/// Parse `name type description` or `{type} name [-] description`.
fn parse_param_tag(text: &str) -> Option<ParamMetadata> {
    if text.starts_with('{') {
        let (type_expr, rest) = scan_type(text);
        let (name, description) = split_word(rest);
        let name = name.trim_matches(|c| c == '[' || c == ']');
        let name = name.split('=').next().unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        let description = description.strip_prefix('-').unwrap_or(description).trim();
        return Some(ParamMetadata {
            name: name.to_string(),
            type_expr,
            description: description.to_string(),
        });
    }

    let (name, rest) = split_word(text);
    if name.is_empty() {
        return None;
    }
    let (type_expr, description) = scan_type(rest);
    Some(ParamMetadata {
        name: name.to_string(),
        type_expr,
        description: description.to_string(),
    })
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

/// Scan one type token, balancing brackets so that spaces inside
/// `Map<string, number>` or `{ a: string }` do not end it.
fn scan_type(text: &str) -> (Option<String>, &str) {
    let text = text.trim_start();
    let mut depth = 0usize;
    let mut end = text.len();

    for (i, c) in text.char_indices() {
        match c {
            '[' | '{' | '(' | '<' => depth += 1,
            ']' | '}' | ')' | '>' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let token = &text[..end];
    let rest = text[end..].trim_start();
    if token.is_empty() {
        return (None, rest);
    }

    let token = unwrap_braces(token);
    let token = token.strip_suffix('?').unwrap_or(token);
    (Some(token.to_string()), rest)
}

/// `{number}` is a JSDoc type wrapper; `{ a: number }` is an object type.
fn unwrap_braces(token: &str) -> &str {
    let Some(inner) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) else {
        return token;
    };

    let mut depth = 0usize;
    for c in inner.chars() {
        match c {
            '[' | '{' | '(' | '<' => depth += 1,
            ']' | '}' | ')' | '>' => {
                if depth == 0 {
                    // The leading brace closes early: `{a}[]` style token
                    return token;
                }
                depth -= 1;
            }
            ':' if depth == 0 => return token,
            _ => {}
        }
    }
    inner.trim()
}
