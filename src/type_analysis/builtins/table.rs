// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use lazy_static::lazy_static;

use super::catalog::BuiltinCatalog;
use super::spec::{BuiltinSpec, BuiltinTableError, SchemaNode};

const DEFAULT_BUILTINS_JSON: &str = include_str!("./builtins.json");

#[derive(Default)]
pub(super) struct BuiltinTable {
    functions: BTreeMap<String, BuiltinSpec>,
    /// Keyed by lowercase `(class, method)`.
    methods: BTreeMap<(String, String), BuiltinSpec>,
    /// Loose method entries by lowercase method name.
    loose: BTreeMap<String, Vec<BuiltinSpec>>,
    schemas: BTreeMap<String, SchemaNode>,
}

impl BuiltinTable {
    fn from_json(json: &str) -> Result<Self, BuiltinTableError> {
        let catalog: BuiltinCatalog = serde_json::from_str(json)?;
        let mut table = BuiltinTable::default();

        for (name, value) in catalog.schemas.iter() {
            table
                .schemas
                .insert(name.clone(), SchemaNode::from_json(name, value)?);
        }

        for function in catalog.functions.iter() {
            let spec = BuiltinSpec::from_function(function)?;
            table.check_schemas(&function.name, &spec)?;
            let key = function.name.to_ascii_lowercase();
            if table.functions.insert(key, spec).is_some() {
                return Err(BuiltinTableError::DuplicateBuiltin(function.name.clone()));
            }
        }

        for method in catalog.methods.iter() {
            let spec = BuiltinSpec::from_method(method)?;
            let display = format!("{}::{}", method.class, method.name);
            table.check_schemas(&display, &spec)?;
            let name = method.name.to_ascii_lowercase();
            if spec.is_loose() {
                table.loose.entry(name.clone()).or_default().push(spec.clone());
            }
            let key = (method.class.to_ascii_lowercase(), name);
            if table.methods.insert(key, spec).is_some() {
                return Err(BuiltinTableError::DuplicateBuiltin(display));
            }
        }

        Ok(table)
    }

    fn check_schemas(&self, builtin: &str, spec: &BuiltinSpec) -> Result<(), BuiltinTableError> {
        for schema in spec.schema_references() {
            if !self.schemas.contains_key(schema) {
                return Err(BuiltinTableError::UnknownSchema {
                    builtin: builtin.to_string(),
                    schema: schema.to_string(),
                });
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref DEFAULT_TABLE: BuiltinTable = BuiltinTable::from_json(DEFAULT_BUILTINS_JSON)
        .unwrap_or_else(|err| {
            log::error!("failed to load default builtin specifications: {err}");
            BuiltinTable::default()
        });
}

static CUSTOM_TABLE: AtomicPtr<BuiltinTable> = AtomicPtr::new(ptr::null_mut());

/// Replaces the built-in table for every subsequent session.
pub fn override_builtin_table(json: &str) -> Result<(), BuiltinTableError> {
    let table = Box::new(BuiltinTable::from_json(json)?);
    set_custom_table(Some(table));
    Ok(())
}

pub fn reset_builtin_table() {
    set_custom_table(None);
}

fn set_custom_table(table: Option<Box<BuiltinTable>>) {
    let new_ptr = match table {
        Some(table) => Box::into_raw(table),
        None => ptr::null_mut(),
    };

    // The previous table is leaked: sessions on other threads may still hold
    // references into it.
    let _ = CUSTOM_TABLE.swap(new_ptr, Ordering::SeqCst);
}

fn active_table() -> &'static BuiltinTable {
    let custom_ptr = CUSTOM_TABLE.load(Ordering::SeqCst);
    if custom_ptr.is_null() {
        &DEFAULT_TABLE
    } else {
        // Safety: pointer originates from Box::into_raw and is never freed.
        unsafe { &*custom_ptr }
    }
}

pub fn lookup_function(name: &str) -> Option<BuiltinSpec> {
    let name = name.trim_start_matches('\\').to_ascii_lowercase();
    active_table().functions.get(&name).cloned()
}

/// Entry for `class::method`, `class` being one class of the receiver's
/// lineage.
pub fn lookup_method(class: &str, method: &str) -> Option<BuiltinSpec> {
    let class = class
        .rsplit('\\')
        .next()
        .unwrap_or(class)
        .to_ascii_lowercase();
    active_table()
        .methods
        .get(&(class, method.to_ascii_lowercase()))
        .cloned()
}

/// Loose entries for a method called on a receiver of unknown class.
pub fn lookup_loose_method(method: &str) -> Vec<BuiltinSpec> {
    active_table()
        .loose
        .get(&method.to_ascii_lowercase())
        .cloned()
        .unwrap_or_default()
}

pub fn schema(name: &str) -> Option<SchemaNode> {
    active_table().schemas.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_analysis::builtins::{ReturnTemplate, UsageTemplate};

    #[test]
    fn default_table_loads() -> Result<(), BuiltinTableError> {
        let table = BuiltinTable::from_json(DEFAULT_BUILTINS_JSON)?;
        assert!(table.functions.contains_key("array_merge"));
        assert!(table.schemas.contains_key("stream_context"));
        assert!(table.loose.contains_key("fetch"));
        assert_eq!(table.loose.get("query").map(Vec::len), Some(2));
        assert!(table.loose.contains_key("prepare"));
        Ok(())
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let merge = lookup_function("\\Array_Merge");
        assert_eq!(
            merge.as_ref().and_then(|s| s.return_template()),
            Some(&ReturnTemplate::MergeArgs)
        );
        let execute = lookup_method("\\PDOStatement", "EXECUTE");
        let usage: Vec<_> = execute
            .iter()
            .flat_map(|s| s.usage_for(0).cloned().collect::<Vec<_>>())
            .collect();
        assert_eq!(usage, vec![UsageTemplate::BindVars]);
    }

    #[test]
    fn rejects_unknown_schema_and_duplicates() {
        let unknown = r#"{ "functions": [ { "name": "f", "return": { "kind": "schema", "schema": "nope" } } ] }"#;
        assert!(matches!(
            BuiltinTable::from_json(unknown),
            Err(BuiltinTableError::UnknownSchema { .. })
        ));
        let duplicate = r#"{ "functions": [ { "name": "f" }, { "name": "F" } ] }"#;
        assert!(matches!(
            BuiltinTable::from_json(duplicate),
            Err(BuiltinTableError::DuplicateBuiltin(_))
        ));
        let bad_schema = r#"{ "schemas": { "s": { "a": "Nope" } } }"#;
        assert!(matches!(
            BuiltinTable::from_json(bad_schema),
            Err(BuiltinTableError::InvalidSchema { .. })
        ));
    }
}
