// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::completion::Completion;
use crate::lexer::Source;
use crate::program::{ExprId, ParentNode, Program};
use crate::type_analysis::TypeAnalysisOptions;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use test_generator::test_resources;

#[derive(Debug, Deserialize)]
struct ShapeYamlTest {
    cases: Vec<ShapeCase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShapeCase {
    note: String,
    modules: Vec<String>,
    #[serde(default)]
    options: Option<TypeAnalysisOptions>,
    exprs: Vec<ExprExpectation>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExprExpectation {
    /// Source text of the expression. The last occurrence is used unless
    /// `occurrence` picks another one (0-based).
    expr: String,
    #[serde(default)]
    module: u32,
    #[serde(default)]
    occurrence: Option<usize>,
    #[serde(default)]
    keys: Option<Vec<String>>,
    #[serde(default)]
    shape: Option<serde_json::Value>,
    #[serde(default)]
    brief: Option<String>,
    #[serde(default)]
    completions: Option<Vec<CompletionExpectation>>,
    #[serde(default)]
    used_keys: Option<Vec<String>>,
    #[serde(default)]
    definition: Option<DefinitionExpectation>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompletionExpectation {
    name: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    tail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionExpectation {
    key: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    col: Option<u32>,
}

fn yaml_test_impl(path: &str) -> Result<()> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read yaml test file {path}"))?;
    let test: ShapeYamlTest = serde_yaml::from_str(&yaml)
        .with_context(|| format!("failed to parse yaml test file {path}"))?;

    for case in test.cases.iter() {
        run_case(case).with_context(|| format!("case `{}`", case.note))?;
    }

    Ok(())
}

fn run_case(case: &ShapeCase) -> Result<()> {
    let mut sources = Vec::with_capacity(case.modules.len());
    for (idx, module_src) in case.modules.iter().enumerate() {
        sources.push(Source::from_contents(
            format!("module_{idx}.php"),
            module_src.clone(),
        )?);
    }
    let program = Program::from_sources(&sources)?;
    let options = case.options.clone().unwrap_or_default();

    for expectation in &case.exprs {
        check_expr(&program, &options, expectation)
            .with_context(|| format!("expression `{}`", expectation.expr))?;
    }
    Ok(())
}

/// Expression whose source text is exactly the `nth` occurrence of `text`.
fn locate(program: &Program, module: u32, text: &str, nth: Option<usize>) -> Result<ExprId> {
    let source = program
        .source(module)
        .ok_or_else(|| anyhow!("no module {module}"))?;
    let contents = source.contents();
    let offsets: Vec<usize> = contents.match_indices(text).map(|(o, _)| o).collect();
    let offset = match nth {
        Some(n) => offsets.get(n).copied(),
        None => offsets.last().copied(),
    }
    .ok_or_else(|| anyhow!("`{text}` not found in module {module}"))?;
    let start = u32::try_from(offset)?;

    let mut id = program
        .expr_at(module, start)
        .ok_or_else(|| anyhow!("no expression at offset {start}"))?;
    loop {
        let expr = program
            .expr(id)
            .ok_or_else(|| anyhow!("dangling expression {id:?}"))?;
        if expr.span().start == start && expr.span().text() == text {
            return Ok(id);
        }
        match program.parent(id).map(|p| &p.node) {
            Some(ParentNode::Expr(parent)) => id = *parent,
            _ => bail!("no expression spans exactly `{text}`"),
        }
    }
}

fn check_expr(program: &Program, options: &TypeAnalysisOptions, e: &ExprExpectation) -> Result<()> {
    let id = locate(program, e.module, &e.expr, e.occurrence)?;

    if let Some(expected) = &e.keys {
        let mut completion = Completion::new(program, options.clone());
        let keys = completion.list_key_names(id);
        if &keys != expected {
            bail!("keys: expected {expected:?}, got {keys:?}");
        }
    }

    if let Some(expected) = &e.shape {
        let mut completion = Completion::new(program, options.clone());
        let types = completion.resolve(id);
        let json = completion.to_debug_json(&types, 0);
        let actual: serde_json::Value = serde_json::from_str(&json)?;
        if &actual != expected {
            bail!(
                "shape mismatch\nexpected: {}\n     got: {}",
                serde_json::to_string_pretty(expected)?,
                completion.to_debug_json(&types, 2)
            );
        }
    }

    if let Some(expected) = &e.brief {
        let mut completion = Completion::new(program, options.clone());
        let brief = completion.brief_shape_of(id);
        if &brief != expected {
            bail!("brief: expected `{expected}`, got `{brief}`");
        }
    }

    if let Some(expected) = &e.completions {
        let mut completion = Completion::new(program, options.clone());
        let actual = completion.key_completions(id);
        let names: Vec<&str> = actual.iter().map(|c| c.name.as_str()).collect();
        let expected_names: Vec<&str> = expected.iter().map(|c| c.name.as_str()).collect();
        if names != expected_names {
            bail!("completions: expected {expected_names:?}, got {names:?}");
        }
        for (want, got) in expected.iter().zip(actual.iter()) {
            if let Some(ty) = &want.r#type {
                if ty != &got.type_text {
                    bail!("type of `{}`: expected `{ty}`, got `{}`", want.name, got.type_text);
                }
            }
            if let Some(tail) = &want.tail {
                if tail != &got.tail_text() {
                    bail!("tail of `{}`: expected `{tail}`, got `{}`", want.name, got.tail_text());
                }
            }
        }
    }

    if let Some(expected) = &e.used_keys {
        let mut completion = Completion::new(program, options.clone());
        let used: Vec<String> = completion.used_keys(id).into_iter().map(|c| c.name).collect();
        if &used != expected {
            bail!("used keys: expected {expected:?}, got {used:?}");
        }
    }

    if let Some(expected) = &e.definition {
        let mut completion = Completion::new(program, options.clone());
        let location = completion
            .definition_location_of(id, &expected.key)
            .ok_or_else(|| anyhow!("no definition for key `{}`", expected.key))?;
        if let Some(line) = expected.line {
            if location.line != line {
                bail!("definition line: expected {line}, got {}", location.line);
            }
        }
        if let Some(col) = expected.col {
            if location.col != col {
                bail!("definition col: expected {col}, got {}", location.col);
            }
        }
    }

    Ok(())
}

#[test_resources("tests/type_analysis/**/*.yaml")]
fn run(path: &str) {
    yaml_test_impl(path).unwrap();
}
