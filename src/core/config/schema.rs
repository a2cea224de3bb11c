//! Config schema: the set of keys a config document may contain.
//!
//! The host engine owns the base schema; components that claim a top-level
//! object (the topic logger) register it with [`Schema::field`]. `lint` walks
//! a parsed document against the schema and reports unknown keys and
//! type mismatches. Value validation stays with the loaders.

use std::fmt;

use crate::processors::ollama_chat;

/// Shape of a single config field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Any non-table value.
    Scalar,
    /// A table whose keys must be among the listed fields.
    Object(Vec<Field>),
    /// A table with free-form keys (e.g. a tagged union).
    Map,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub fn scalar(name: &'static str, description: &'static str) -> Self {
        Self { name, description, kind: FieldKind::Scalar }
    }

    pub fn object(name: &'static str, description: &'static str, fields: Vec<Field>) -> Self {
        Self { name, description, kind: FieldKind::Object(fields) }
    }

    pub fn map(name: &'static str, description: &'static str) -> Self {
        Self { name, description, kind: FieldKind::Map }
    }
}

/// A single problem found by [`Schema::lint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintIssue {
    /// Dotted path of the offending key.
    pub path: String,
    pub message: String,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The full set of top-level fields a config document may contain.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Fields owned by the host engine itself.
    pub fn base() -> Self {
        Self {
            fields: vec![
                Field::object(
                    "meta",
                    "Document metadata.",
                    vec![Field::scalar("base", "Path of a config this file overlays.")],
                ),
                Field::object(
                    "logger",
                    "Primary logger settings.",
                    vec![Field::scalar("level", "Log level: error, warn, info, debug, trace.")],
                ),
                Field::object(
                    "pipeline",
                    "Processing pipeline.",
                    vec![
                        Field::scalar(
                            "max_in_flight",
                            "Maximum number of messages processed concurrently.",
                        ),
                        ollama_chat::config_field(),
                    ],
                ),
            ],
        }
    }

    /// Register a top-level field, replacing any existing field of the same name.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn top_level_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Check `root` against the schema. Issues are sorted by path.
    pub fn lint(&self, root: &toml::Value) -> Vec<LintIssue> {
        let mut issues = Vec::new();
        match root.as_table() {
            Some(table) => lint_table(&self.fields, table, "", &mut issues),
            None => issues.push(LintIssue {
                path: "<root>".into(),
                message: "expected a table".into(),
            }),
        }
        issues.sort_by(|a, b| a.path.cmp(&b.path));
        issues
    }
}

fn lint_table(fields: &[Field], table: &toml::Table, prefix: &str, issues: &mut Vec<LintIssue>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let Some(field) = fields.iter().find(|f| f.name == key) else {
            issues.push(LintIssue { path, message: "unknown field".into() });
            continue;
        };
        match (&field.kind, value) {
            (FieldKind::Object(children), toml::Value::Table(inner)) => {
                lint_table(children, inner, &path, issues);
            }
            (FieldKind::Map, toml::Value::Table(_)) => {}
            (FieldKind::Object(_) | FieldKind::Map, _) => {
                issues.push(LintIssue { path, message: "expected an object".into() });
            }
            (FieldKind::Scalar, toml::Value::Table(_)) => {
                issues.push(LintIssue { path, message: "expected a value, found an object".into() });
            }
            (FieldKind::Scalar, _) => {}
        }
    }
}
