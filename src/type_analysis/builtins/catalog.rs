// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;

use super::spec::{ReturnTemplate, UsageTemplate};

#[derive(Debug, Deserialize, Default)]
pub(super) struct BuiltinCatalog {
    /// Named shape schemas referenced by `schema` templates.
    #[serde(default)]
    pub(super) schemas: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub(super) functions: Vec<FunctionConfig>,
    #[serde(default)]
    pub(super) methods: Vec<MethodConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub(super) struct FunctionConfig {
    pub(super) name: String,
    #[serde(default, rename = "return")]
    pub(super) return_template: Option<ReturnConfig>,
    #[serde(default)]
    pub(super) usage: Vec<UsageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub(super) struct MethodConfig {
    pub(super) class: String,
    pub(super) name: String,
    /// Also applies when the receiver class is unknown.
    #[serde(default)]
    pub(super) loose: bool,
    #[serde(default, rename = "return")]
    pub(super) return_template: Option<ReturnConfig>,
    #[serde(default)]
    pub(super) usage: Vec<UsageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub(super) struct UsageConfig {
    /// Argument position the template applies to; any position when absent.
    #[serde(default)]
    pub(super) arg: Option<u8>,
    #[serde(flatten)]
    pub(super) template: UsageTemplateConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(super) enum ReturnConfig {
    MergeArgs,
    Schema { schema: String },
    SqlStatement { class: String, arg: u8 },
    SqlResult { class: String, arg: u8 },
    FetchRow,
    FetchAll,
    ModelRows,
    MapCallback { callback: u8, array: u8 },
    SameAsArgument { index: u8 },
    CollectionElement { index: u8 },
    ValuesOf { index: u8 },
    KeysOf { index: u8 },
    ListOfArgument { index: u8 },
    Int,
    String,
    Bool,
    Float,
    Array,
    Mixed,
    Object { class: String },
}

impl ReturnConfig {
    pub(super) fn into_template(self) -> ReturnTemplate {
        match self {
            ReturnConfig::MergeArgs => ReturnTemplate::MergeArgs,
            ReturnConfig::Schema { schema } => ReturnTemplate::Schema(schema),
            ReturnConfig::SqlStatement { class, arg } => ReturnTemplate::SqlStatement { class, arg },
            ReturnConfig::SqlResult { class, arg } => ReturnTemplate::SqlResult { class, arg },
            ReturnConfig::FetchRow => ReturnTemplate::FetchRow,
            ReturnConfig::FetchAll => ReturnTemplate::FetchAll,
            ReturnConfig::ModelRows => ReturnTemplate::ModelRows,
            ReturnConfig::MapCallback { callback, array } => {
                ReturnTemplate::MapCallback { callback, array }
            }
            ReturnConfig::SameAsArgument { index } => ReturnTemplate::SameAsArgument(index),
            ReturnConfig::CollectionElement { index } => ReturnTemplate::CollectionElement(index),
            ReturnConfig::ValuesOf { index } => ReturnTemplate::ValuesOf(index),
            ReturnConfig::KeysOf { index } => ReturnTemplate::KeysOf(index),
            ReturnConfig::ListOfArgument { index } => ReturnTemplate::ListOfArgument(index),
            ReturnConfig::Int => ReturnTemplate::Int,
            ReturnConfig::String => ReturnTemplate::String,
            ReturnConfig::Bool => ReturnTemplate::Bool,
            ReturnConfig::Float => ReturnTemplate::Float,
            ReturnConfig::Array => ReturnTemplate::Array,
            ReturnConfig::Mixed => ReturnTemplate::Mixed,
            ReturnConfig::Object { class } => ReturnTemplate::Object(class),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(super) enum UsageTemplateConfig {
    PrecedingArgs,
    Schema { schema: String },
    CallbackParam { callback: u8 },
    BindVars,
    ModelFields,
    DeclaredProperties,
}

impl UsageTemplateConfig {
    pub(super) fn into_template(self) -> UsageTemplate {
        match self {
            UsageTemplateConfig::PrecedingArgs => UsageTemplate::PrecedingArgs,
            UsageTemplateConfig::Schema { schema } => UsageTemplate::Schema(schema),
            UsageTemplateConfig::CallbackParam { callback } => UsageTemplate::CallbackParam(callback),
            UsageTemplateConfig::BindVars => UsageTemplate::BindVars,
            UsageTemplateConfig::ModelFields => UsageTemplate::ModelFields,
            UsageTemplateConfig::DeclaredProperties => UsageTemplate::DeclaredProperties,
        }
    }
}
