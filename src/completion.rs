// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::program::{ExprId, Program};
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::model::MultiType;
use crate::type_analysis::options::TypeAnalysisOptions;
use crate::type_analysis::render;
use crate::utils::limits::{monotonic_now, LimitError};

use core::time::Duration;

// Positions offered for list-like arrays.
const LIST_POSITIONS: u32 = 5;

// Sessions resolving more expressions than this are logged at info level.
const NOISY_RESOLUTION: u64 = 100;

/// Source position of a key declaration. `line` and `col` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

/// One suggested key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCompletion {
    pub name: String,
    /// Brief kinds of the key's values, e.g. `int|string`.
    pub type_text: String,
    /// Literal values when known, otherwise the kinds.
    pub brief_value: String,
    pub definition: Option<Location>,
}

impl KeyCompletion {
    /// Text shown after the key name in a completion popup.
    pub fn tail_text(&self) -> String {
        format!(" = {}", self.brief_value)
    }
}

/// Key completion for one editor query.
///
/// Owns a [`SearchSession`], so deferred values found while answering the
/// query are forced against the same cache and call contexts that produced
/// them. Create a new `Completion` per query.
pub struct Completion<'a> {
    session: SearchSession<'a>,
}

impl<'a> Completion<'a> {
    pub fn new(program: &'a Program, options: TypeAnalysisOptions) -> Self {
        Self {
            session: SearchSession::new(program, options),
        }
    }

    /// Completion popping up while typing.
    pub fn auto_popup(program: &'a Program) -> Self {
        Self::new(program, TypeAnalysisOptions::auto_popup())
    }

    /// Completion invoked explicitly by the user.
    pub fn explicit(program: &'a Program) -> Self {
        Self::new(program, TypeAnalysisOptions::explicit())
    }

    pub fn program(&self) -> &'a Program {
        self.session.program()
    }

    /// Budget or timeout exhaustion observed while answering the query.
    pub fn limit_hit(&self) -> Option<&LimitError> {
        self.session.limit_hit()
    }

    pub fn session(&mut self) -> &mut SearchSession<'a> {
        &mut self.session
    }

    /// Possible types of `expr` as a top-level query.
    pub fn resolve(&mut self, expr: ExprId) -> MultiType {
        let started = monotonic_now();
        let before = self.session.expressions_resolved();
        let types = self.session.resolve(expr, CallCtxId::EMPTY);
        self.log_resolution(before, started);
        types
    }

    fn log_resolution(&self, before: u64, started: Option<Duration>) {
        let resolved = self.session.expressions_resolved().saturating_sub(before);
        let seconds = match (started, monotonic_now()) {
            (Some(start), Some(end)) => end.saturating_sub(start).as_secs_f64(),
            _ => 0.0,
        };
        if resolved > NOISY_RESOLUTION {
            log::info!("Resolved {resolved} expressions in {seconds:.3} seconds");
        } else {
            log::debug!("Resolved {resolved} expressions in {seconds:.3} seconds");
        }
    }

    pub fn list_key_names(&mut self, expr: ExprId) -> Vec<String> {
        self.resolve(expr).key_names()
    }

    pub fn brief_shape_of(&mut self, expr: ExprId) -> String {
        let max_len = self.session.options().brief_max_len;
        self.resolve(expr).brief_description(max_len)
    }

    /// Where `key` of the array `expr` evaluates to was declared.
    pub fn definition_location_of(&mut self, expr: ExprId, key: &str) -> Option<Location> {
        let types = self.resolve(expr);
        let definition = types.key_entries(key).find_map(|entry| entry.definition)?;
        self.location(definition)
    }

    fn location(&self, id: ExprId) -> Option<Location> {
        let span = self.session.program().expr(id)?.span();
        Some(Location {
            file: span.source.file().clone(),
            line: span.line,
            col: span.col,
        })
    }

    /// Keys to offer after `expr[`, named keys first in declaration order.
    pub fn key_completions(&mut self, expr: ExprId) -> Vec<KeyCompletion> {
        let types = self.resolve(expr);
        let mut names = types.key_names();
        if types.has_element_types() {
            if names.is_empty() || types.has_number_indexes() {
                for position in 0..LIST_POSITIONS {
                    let name = position.to_string();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            } else if !names.iter().any(String::is_empty) {
                names.push(String::new());
            }
        }
        names
            .into_iter()
            .map(|name| self.completion_for(&types, name))
            .collect()
    }

    /// Keys expected of an array literal by the code consuming it that the
    /// literal does not declare yet.
    pub fn used_keys(&mut self, array_literal: ExprId) -> Vec<KeyCompletion> {
        let started = monotonic_now();
        let before = self.session.expressions_resolved();
        let depth = self.session.options().usage_depth;
        let expected = self
            .session
            .probe(|s| s.expected_shape_of(array_literal, depth));
        let present = self.session.resolve(array_literal, CallCtxId::EMPTY).key_names();
        self.log_resolution(before, started);

        expected
            .key_names()
            .into_iter()
            .filter(|name| !present.contains(name))
            .map(|name| self.completion_for(&expected, name))
            .collect()
    }

    fn completion_for(&mut self, types: &MultiType, name: String) -> KeyCompletion {
        let max_len = self.session.options().brief_max_len;
        let values = render::key_values_at(&mut self.session, types, &name, 1);
        let definition = types
            .key_entries(&name)
            .find_map(|entry| entry.definition)
            .and_then(|id| self.location(id));
        KeyCompletion {
            type_text: values.brief_description(max_len),
            brief_value: values.brief_value(max_len),
            definition,
            name,
        }
    }

    /// Renders `types` as debug JSON, `indent` spaces per level or compact
    /// when zero.
    pub fn to_debug_json(&mut self, types: &MultiType, indent: usize) -> String {
        render::to_debug_json(&mut self.session, types, indent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Source;

    fn program(src: &str) -> anyhow::Result<Program> {
        Program::from_sources(&[Source::from_contents(
            "completion.php".to_string(),
            src.to_string(),
        )?])
    }

    fn expr_at(program: &Program, src: &str, needle: &str) -> anyhow::Result<ExprId> {
        let offset = src
            .rfind(needle)
            .ok_or_else(|| anyhow::anyhow!("`{needle}` not in source"))?;
        program
            .expr_at(0, u32::try_from(offset)?)
            .ok_or_else(|| anyhow::anyhow!("no expression at `{needle}`"))
    }

    #[test]
    fn completes_keys_with_values_and_locations() -> anyhow::Result<()> {
        let src = "<?php\n$user = ['id' => 5, 'name' => 'Bob'];\n$user;\n";
        let program = program(src)?;
        let expr = expr_at(&program, src, "$user;")?;
        let mut completion = Completion::explicit(&program);

        let keys = completion.key_completions(expr);
        let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(keys[0].type_text, "int");
        assert_eq!(keys[1].tail_text(), " = 'Bob'");

        let location = completion.definition_location_of(expr, "name");
        assert_eq!(
            location,
            Some(Location {
                file: "completion.php".to_string(),
                line: 2,
                col: 21,
            })
        );
        assert_eq!(completion.definition_location_of(expr, "missing"), None);
        Ok(())
    }

    #[test]
    fn lists_offer_positions() -> anyhow::Result<()> {
        let src = "<?php\n$rows = [];\n$rows[] = ['a' => 1];\n$rows;\n";
        let program = program(src)?;
        let expr = expr_at(&program, src, "$rows;")?;
        let mut completion = Completion::auto_popup(&program);
        let names: Vec<String> = completion
            .key_completions(expr)
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, ["0", "1", "2", "3", "4"]);
        Ok(())
    }

    #[test]
    fn used_keys_skip_declared_ones() -> anyhow::Result<()> {
        let src = "<?php\nfunction show($p) { return $p['title'] . $p['body']; }\nshow(['title' => 'x']);\n";
        let program = program(src)?;
        let literal = expr_at(&program, src, "['title' => 'x']")?;
        let mut completion = Completion::explicit(&program);
        let names: Vec<String> = completion
            .used_keys(literal)
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, ["body"]);
        Ok(())
    }
}
