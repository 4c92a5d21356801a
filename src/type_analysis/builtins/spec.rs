// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::string::String;
use alloc::vec::Vec;

use indexmap::IndexMap;

use crate::type_analysis::model::{KeyName, KeyValue, MultiType, Type, TypeKind};

use super::catalog::{FunctionConfig, MethodConfig, ReturnConfig, UsageConfig};

/// How a built-in's return shape is computed from its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnTemplate {
    /// Union of every argument's shape.
    MergeArgs,
    /// Fixed shape from the schema table.
    Schema(String),
    /// Object of `class` carrying the rows selected by the SQL text at `arg`.
    SqlStatement { class: String, arg: u8 },
    /// Like `SqlStatement`, and iterable over those rows.
    SqlResult { class: String, arg: u8 },
    /// One row attached to the receiver or first argument.
    FetchRow,
    /// List of the rows attached to the receiver or first argument.
    FetchAll,
    /// List of rows keyed by the model class's `$fields`.
    ModelRows,
    /// List of the callback's return values given the array's elements.
    MapCallback { callback: u8, array: u8 },
    SameAsArgument(u8),
    CollectionElement(u8),
    ValuesOf(u8),
    KeysOf(u8),
    ListOfArgument(u8),
    Int,
    String,
    Bool,
    Float,
    Array,
    Mixed,
    Object(String),
}

/// Shape a built-in expects of one of its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageTemplate {
    /// Keys of the arguments before this one (`array_merge($defaults, [...])`).
    PrecedingArgs,
    Schema(String),
    /// Whatever the callback at the given position reads from its parameter.
    CallbackParam(u8),
    /// Named placeholders of the receiver's SQL statement.
    BindVars,
    /// Columns listed in the model class's `$fields`.
    ModelFields,
    /// Non-private properties declared by the class itself.
    DeclaredProperties,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageSpec {
    pub arg: Option<u8>,
    pub template: UsageTemplate,
}

#[derive(Clone, Debug, Default)]
pub struct BuiltinSpec {
    return_template: Option<ReturnTemplate>,
    usage: Vec<UsageSpec>,
    loose: bool,
}

impl BuiltinSpec {
    fn from_parts(
        name: &str,
        return_template: Option<ReturnConfig>,
        usage: &[UsageConfig],
        loose: bool,
    ) -> Result<Self, BuiltinTableError> {
        let spec = BuiltinSpec {
            return_template: return_template.map(ReturnConfig::into_template),
            usage: usage
                .iter()
                .cloned()
                .map(|u| UsageSpec {
                    arg: u.arg,
                    template: u.template.into_template(),
                })
                .collect(),
            loose,
        };
        spec.validate(name)?;
        Ok(spec)
    }

    pub(super) fn from_function(cfg: &FunctionConfig) -> Result<Self, BuiltinTableError> {
        Self::from_parts(&cfg.name, cfg.return_template.clone(), &cfg.usage, false)
    }

    pub(super) fn from_method(cfg: &MethodConfig) -> Result<Self, BuiltinTableError> {
        let name = format!("{}::{}", cfg.class, cfg.name);
        Self::from_parts(&name, cfg.return_template.clone(), &cfg.usage, cfg.loose)
    }

    fn validate(&self, name: &str) -> Result<(), BuiltinTableError> {
        if let Some(ReturnTemplate::MapCallback { callback, array }) = &self.return_template {
            if callback == array {
                return Err(BuiltinTableError::InvalidTemplate {
                    builtin: name.to_string(),
                    detail: format!("callback and array both reference argument {callback}"),
                });
            }
        }
        for usage in &self.usage {
            if let (UsageTemplate::CallbackParam(callback), Some(arg)) = (&usage.template, usage.arg) {
                if *callback == arg {
                    return Err(BuiltinTableError::InvalidTemplate {
                        builtin: name.to_string(),
                        detail: format!("argument {arg} cannot be its own callback"),
                    });
                }
            }
        }
        Ok(())
    }

    pub(super) fn schema_references(&self) -> impl Iterator<Item = &str> {
        let ret = match &self.return_template {
            Some(ReturnTemplate::Schema(schema)) => Some(schema.as_str()),
            _ => None,
        };
        let usage = self.usage.iter().filter_map(|u| match &u.template {
            UsageTemplate::Schema(schema) => Some(schema.as_str()),
            _ => None,
        });
        ret.into_iter().chain(usage)
    }

    pub fn return_template(&self) -> Option<&ReturnTemplate> {
        self.return_template.as_ref()
    }

    /// Usage templates applying to the argument at `position`.
    pub fn usage_for(&self, position: usize) -> impl Iterator<Item = &UsageTemplate> {
        self.usage
            .iter()
            .filter(move |u| u.arg.is_none_or(|a| a as usize == position))
            .map(|u| &u.template)
    }

    pub fn is_loose(&self) -> bool {
        self.loose
    }
}

/// Node of a schema: a kind, a literal example, a union or nested keys.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaNode {
    Kind(TypeKind),
    Literal(String),
    Union(Vec<SchemaNode>),
    Keys(IndexMap<String, SchemaNode>),
}

impl SchemaNode {
    pub(super) fn from_json(
        schema: &str,
        value: &serde_json::Value,
    ) -> Result<SchemaNode, BuiltinTableError> {
        let invalid = |detail: String| BuiltinTableError::InvalidSchema {
            schema: schema.to_string(),
            detail,
        };
        match value {
            serde_json::Value::String(text) => {
                if let Some(literal) = text
                    .strip_prefix('\'')
                    .and_then(|t| t.strip_suffix('\''))
                {
                    return Ok(SchemaNode::Literal(literal.to_string()));
                }
                match TypeKind::from_hint(text) {
                    Some(kind) if !matches!(kind, TypeKind::Object(_)) => Ok(SchemaNode::Kind(kind)),
                    _ => Err(invalid(format!("unknown kind `{text}`"))),
                }
            }
            serde_json::Value::Array(items) => Ok(SchemaNode::Union(
                items
                    .iter()
                    .map(|i| SchemaNode::from_json(schema, i))
                    .collect::<Result<_, _>>()?,
            )),
            serde_json::Value::Object(map) => {
                let mut keys = IndexMap::new();
                for (key, node) in map {
                    keys.insert(key.clone(), SchemaNode::from_json(schema, node)?);
                }
                Ok(SchemaNode::Keys(keys))
            }
            other => Err(invalid(format!("unexpected value {other}"))),
        }
    }

    pub fn to_types(&self) -> MultiType {
        match self {
            SchemaNode::Kind(kind) => MultiType::of(Type::new(kind.clone())),
            SchemaNode::Literal(text) => MultiType::of(Type::string(text)),
            SchemaNode::Union(nodes) => {
                let mut types = MultiType::empty();
                for node in nodes {
                    types.extend(node.to_types());
                }
                types
            }
            SchemaNode::Keys(keys) => {
                let mut ty = Type::array();
                for (name, node) in keys {
                    ty.add_key(
                        KeyName::Named(name.clone()),
                        KeyValue::Ready(node.to_types()),
                        None,
                    );
                }
                MultiType::of(ty)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuiltinTableError {
    #[error("failed to parse builtin table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate builtin entry `{0}` in table")]
    DuplicateBuiltin(String),
    #[error("builtin `{builtin}` references unknown schema `{schema}`")]
    UnknownSchema { builtin: String, schema: String },
    #[error("schema `{schema}` is invalid: {detail}")]
    InvalidSchema { schema: String, detail: String },
    #[error("builtin `{builtin}` has invalid template: {detail}")]
    InvalidTemplate { builtin: String, detail: String },
}
