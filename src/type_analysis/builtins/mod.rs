// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod catalog;
mod spec;
pub mod sql;
mod table;

pub use spec::{BuiltinSpec, BuiltinTableError, ReturnTemplate, SchemaNode, UsageTemplate};
pub use table::{
    lookup_function, lookup_loose_method, lookup_method, override_builtin_table,
    reset_builtin_table, schema,
};
