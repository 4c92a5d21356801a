// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Debug rendering of shapes as JSON.
//!
//! Arrays with named keys become objects (keys in first-seen order),
//! lists and dynamically keyed arrays become `[ <element> ]`, string literals become
//! `"'text'"` and everything else the brief kind names (`"int|string"`).
//! `"unknown"` stands for an empty union.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Serializer, Value as JsonValue};

use super::context::SearchSession;
use super::model::{Deferred, ForceDeferred, KeyName, MultiType};

/// Forces deferred key values one nesting level below the rendered value,
/// so that rendering deep shapes stays within the session depth limit.
struct AtLevel<'s, 'a> {
    session: &'s mut SearchSession<'a>,
    level: u32,
}

impl ForceDeferred for AtLevel<'_, '_> {
    fn force(&mut self, deferred: &Deferred) -> MultiType {
        self.session.force_at(deferred, self.level)
    }
}

/// Values of key `name`, forced as if nested `level` keys deep.
pub fn key_values_at(
    session: &mut SearchSession<'_>,
    types: &MultiType,
    name: &str,
    level: u32,
) -> MultiType {
    types.get_key(name, &mut AtLevel { session, level })
}

pub fn to_json_value(session: &mut SearchSession<'_>, types: &MultiType, level: u32) -> JsonValue {
    if types.is_empty() {
        return JsonValue::String("unknown".to_string());
    }

    let names = types.key_names();
    if !names.is_empty() {
        let mut object = Map::new();
        for name in names {
            let values = key_values_at(session, types, &name, level + 1);
            let rendered = to_json_value(session, &values, level + 1);
            object.insert(name, rendered);
        }
        return JsonValue::Object(object);
    }

    // Keys that could not be named render like list elements.
    let dynamic = types.iter().any(|t| t.keys.contains_key(&KeyName::Unknown));
    if types.has_element_types() || dynamic {
        let elements = types.all_values(&mut AtLevel {
            session: &mut *session,
            level: level + 1,
        });
        return JsonValue::Array(vec![to_json_value(session, &elements, level + 1)]);
    }

    let literals = types.string_literals();
    if !literals.is_empty() {
        let quoted: Vec<String> = literals.iter().map(|l| format!("'{l}'")).collect();
        return JsonValue::String(quoted.join("|"));
    }
    JsonValue::String(types.brief_description(usize::MAX))
}

/// Renders `types` with `indent` spaces per level, or on one line when
/// `indent` is zero.
pub fn to_debug_json(session: &mut SearchSession<'_>, types: &MultiType, indent: usize) -> String {
    let value = to_json_value(session, types, 0);
    if indent == 0 {
        return value.to_string();
    }

    let indent = " ".repeat(indent);
    let mut out = Vec::new();
    let mut serializer =
        Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(err) => {
            log::debug!("failed to render shape: {err}");
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Source;
    use crate::program::Program;
    use crate::type_analysis::context::CallCtxId;
    use crate::type_analysis::options::TypeAnalysisOptions;

    fn last_statement_expr(program: &Program) -> Option<crate::program::ExprId> {
        let module = program.modules().first()?;
        let last = module.stmts.last()?;
        match last.as_ref() {
            crate::ast::Stmt::Expr { expr, .. } => Some(crate::program::ExprId {
                module: 0,
                eidx: expr.eidx(),
            }),
            _ => None,
        }
    }

    #[test]
    fn renders_nested_objects_and_lists() -> anyhow::Result<()> {
        let source = Source::from_contents(
            "render.php".to_string(),
            "<?php $a = ['id' => 5, 'tags' => ['x', 'y'], 'owner' => ['name' => 'Bob']]; $a;"
                .to_string(),
        )?;
        let program = Program::from_sources(&[source])?;
        let expr = last_statement_expr(&program).ok_or_else(|| anyhow::anyhow!("no expr"))?;
        let mut session = SearchSession::new(&program, TypeAnalysisOptions::default());
        let types = session.resolve(expr, CallCtxId::EMPTY);

        let json = to_debug_json(&mut session, &types, 0);
        assert_eq!(
            json,
            r#"{"id":"int","tags":{"0":"'x'","1":"'y'"},"owner":{"name":"'Bob'"}}"#
        );

        let pretty = to_debug_json(&mut session, &types, 2);
        assert!(pretty.starts_with("{\n  \"id\": \"int\","));
        Ok(())
    }

    #[test]
    fn empty_union_is_unknown() -> anyhow::Result<()> {
        let program = Program::from_sources(&[Source::from_contents(
            "e.php".to_string(),
            "<?php".to_string(),
        )?])?;
        let mut session = SearchSession::new(&program, TypeAnalysisOptions::default());
        assert_eq!(to_debug_json(&mut session, &MultiType::empty(), 0), "\"unknown\"");
        Ok(())
    }
}
