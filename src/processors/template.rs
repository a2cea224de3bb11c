//! Interpolated strings evaluated against a message.
//!
//! Literal text mixed with `${! <expr> }` blocks. Supported expressions:
//!
//! - `content()`: the payload, decoded lossily
//! - `meta("key")`: a metadata value; missing keys are an error
//! - `json("a.b.0")`: a value from the JSON payload; `json()` or `json("")`
//!   is the whole document. Strings interpolate unquoted, everything else as
//!   compact JSON.
//! - `"text"`: a quoted string literal
//!
//! `$${!` produces a literal `${!`. Templates are compiled once; syntax
//! errors surface at construction, never per message.

use thiserror::Error;

use crate::pipeline::message::Message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid template '{template}': {reason}")]
    Compile { template: String, reason: String },
    #[error("template evaluation failed: {0}")]
    Eval(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Content,
    Meta(String),
    Json(Vec<String>),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let fail = |reason: String| TemplateError::Compile { template: source.to_string(), reason };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("$${!") {
                literal.push_str("${!");
                rest = after;
            } else if let Some(after) = rest.strip_prefix("${!") {
                let end = block_end(after).ok_or_else(|| fail("unterminated '${!' block".into()))?;
                let segment = parse_expr(after[..end].trim()).map_err(fail)?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(segment);
                rest = &after[end + 1..];
            } else {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    literal.push(c);
                }
                rest = chars.as_str();
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Evaluate against `msg`.
    pub fn render(&self, msg: &Message) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut doc: Option<serde_json::Value> = None;

        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Content => out.push_str(&String::from_utf8_lossy(msg.as_bytes())),
                Segment::Meta(key) => {
                    let value = msg
                        .meta_get(key)
                        .ok_or_else(|| TemplateError::Eval(format!("metadata key '{key}' not found")))?;
                    out.push_str(value);
                }
                Segment::Json(path) => {
                    if doc.is_none() {
                        let parsed = serde_json::from_slice(msg.as_bytes()).map_err(|e| {
                            TemplateError::Eval(format!("payload is not valid JSON: {e}"))
                        })?;
                        doc = Some(parsed);
                    }
                    if let Some(root) = &doc {
                        let value = lookup(root, path).ok_or_else(|| {
                            TemplateError::Eval(format!("json path '{}' not found", path.join(".")))
                        })?;
                        match value {
                            serde_json::Value::String(s) => out.push_str(s),
                            other => out.push_str(&other.to_string()),
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Byte offset of the `}` closing a block, skipping braces inside quotes.
fn block_end(s: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '}' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_expr(expr: &str) -> Result<Segment, String> {
    if expr.is_empty() {
        return Err("empty expression".into());
    }
    if expr.starts_with('"') {
        let (value, rest) = parse_string(expr)?;
        if !rest.trim().is_empty() {
            return Err(format!("unexpected trailing input '{}'", rest.trim()));
        }
        return Ok(Segment::Literal(value));
    }

    let open = expr.find('(').ok_or_else(|| format!("expected a function call, found '{expr}'"))?;
    let name = expr[..open].trim();
    let args = expr[open + 1..]
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| format!("missing ')' in '{expr}'"))?
        .trim();

    let arg = if args.is_empty() {
        None
    } else {
        let (value, rest) = parse_string(args)?;
        if !rest.trim().is_empty() {
            return Err(format!("{name}() takes at most one string argument"));
        }
        Some(value)
    };

    match (name, arg) {
        ("content", None) => Ok(Segment::Content),
        ("content", Some(_)) => Err("content() takes no arguments".into()),
        ("meta", Some(key)) => Ok(Segment::Meta(key)),
        ("meta", None) => Err("meta() requires a key argument".into()),
        ("json", arg) => {
            let path = arg.unwrap_or_default();
            let segments = if path.is_empty() {
                Vec::new()
            } else {
                path.split('.').map(str::to_string).collect()
            };
            Ok(Segment::Json(segments))
        }
        (other, _) => Err(format!("unknown function '{other}'")),
    }
}

/// Parse a leading double-quoted string; returns the value and the remainder.
fn parse_string(s: &str) -> Result<(String, &str), String> {
    let body = s
        .strip_prefix('"')
        .ok_or_else(|| format!("expected a quoted string, found '{s}'"))?;
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &body[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c => value.push(c),
        }
    }
    Err("unterminated string literal".into())
}

fn lookup<'v>(root: &'v serde_json::Value, path: &[String]) -> Option<&'v serde_json::Value> {
    path.iter().try_fold(root, |value, key| match value {
        serde_json::Value::Object(map) => map.get(key),
        serde_json::Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
