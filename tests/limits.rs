// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use anyhow::{anyhow, Result};
use deepkeys::*;

fn program(src: &str) -> Result<Program> {
    Program::from_sources(&[Source::from_contents(
        "limits.php".to_string(),
        src.to_string(),
    )?])
}

fn last_expr(program: &Program, src: &str, needle: &str) -> Result<ExprId> {
    let offset = src
        .rfind(needle)
        .ok_or_else(|| anyhow!("`{needle}` not in source"))?;
    program
        .expr_at(0, u32::try_from(offset)?)
        .ok_or_else(|| anyhow!("no expression at `{needle}`"))
}

/// `$a0 = ['k' => 1]; $a1 = $a0; ... $a{n} = $a{n-1};` followed by `$a{n};`.
fn chain(n: usize) -> String {
    let mut src = String::from("<?php\n$a0 = ['k' => 1];\n");
    for i in 1..=n {
        src.push_str(&format!("$a{i} = $a{};\n", i - 1));
    }
    src.push_str(&format!("$a{n};\n"));
    src
}

fn options() -> TypeAnalysisOptions {
    TypeAnalysisOptions::explicit()
}

#[test]
fn chain_within_limits_resolves() -> Result<()> {
    let src = chain(8);
    let program = program(&src)?;
    let expr = last_expr(&program, &src, "$a8;")?;
    let mut completion = Completion::new(&program, options());
    assert_eq!(completion.list_key_names(expr), vec!["k"]);
    assert!(completion.limit_hit().is_none());
    Ok(())
}

#[test]
fn depth_limit_truncates() -> Result<()> {
    let src = chain(8);
    let program = program(&src)?;
    let expr = last_expr(&program, &src, "$a8;")?;
    let mut shallow = options();
    shallow.max_depth = 4;
    let mut completion = Completion::new(&program, shallow);
    assert!(completion.resolve(expr).key_names().is_empty());
    // Depth truncation is not a budget failure.
    assert!(completion.limit_hit().is_none());
    Ok(())
}

#[test]
fn depth_limit_keeps_shallow_keys() -> Result<()> {
    let src = "<?php\n['a' => ['b' => ['c' => ['d' => ['e' => 1]]]]];\n";
    let program = program(src)?;
    let expr = last_expr(&program, src, "['a'")?;
    let mut shallow = options();
    shallow.max_depth = 3;
    let mut completion = Completion::new(&program, shallow);
    let types = completion.resolve(expr);
    assert_eq!(types.key_names(), vec!["a"]);
    assert_eq!(
        completion.to_debug_json(&types, 0),
        r#"{"a":{"b":{"c":{"d":"unknown"}}}}"#
    );
    assert!(completion.limit_hit().is_none());
    Ok(())
}

#[test]
fn repeated_resolution_hits_the_cache() -> Result<()> {
    let src = "<?php\nfunction make($n) {\n    return ['n' => $n, 'tags' => ['x']];\n}\n$m = make(1);\n$m['extra'] = true;\n$m;\n";
    let program = program(src)?;
    let expr = last_expr(&program, src, "$m;")?;
    let mut completion = Completion::explicit(&program);

    let first = completion.resolve(expr);
    let first_json = completion.to_debug_json(&first, 0);
    let before = completion.session().expressions_resolved();
    let second = completion.resolve(expr);
    // Only the lookup itself is counted.
    assert_eq!(completion.session().expressions_resolved(), before + 1);
    assert_eq!(completion.to_debug_json(&second, 0), first_json);
    assert_eq!(second.key_names(), vec!["n", "tags", "extra"]);
    Ok(())
}

#[test]
fn expression_budget_is_enforced() -> Result<()> {
    let src = chain(20);
    let program = program(&src)?;
    let expr = last_expr(&program, &src, "$a20;")?;
    let mut tight = options();
    tight.max_total_expressions = 10;
    let mut completion = Completion::new(&program, tight);
    assert!(completion.resolve(expr).key_names().is_empty());
    match completion.limit_hit() {
        Some(LimitError::ExpressionLimitExceeded { limit, .. }) => assert_eq!(*limit, 10),
        other => panic!("expected expression limit, got {other:?}"),
    }
    assert!(completion.session().expressions_resolved() > 10);
    Ok(())
}

#[test]
fn recursion_terminates() -> Result<()> {
    let src = "<?php\nfunction f($x) {\n    return f($x);\n}\n$r = f(1);\n$a = $b;\n$b = $a;\n$r;\n$a;\n";
    let program = program(src)?;
    let mut unbounded = options();
    unbounded.max_depth = u32::MAX;
    let mut completion = Completion::new(&program, unbounded);
    let r = last_expr(&program, src, "$r;")?;
    assert!(completion.resolve(r).is_empty());
    let a = last_expr(&program, src, "$a;")?;
    assert!(completion.list_key_names(a).is_empty());
    // Cycles stop on their own, not through the expression budget.
    assert!(completion.limit_hit().is_none());
    Ok(())
}

#[test]
fn mutual_recursion_terminates() -> Result<()> {
    let src = "<?php\nfunction ping($x) {\n    return pong($x);\n}\nfunction pong($x) {\n    if ($x) {\n        return ping($x);\n    }\n    return ['done' => true];\n}\n$p = ping(1);\n$p;\n";
    let program = program(src)?;
    let expr = last_expr(&program, src, "$p;")?;
    let mut unbounded = options();
    unbounded.max_depth = u32::MAX;
    let mut completion = Completion::new(&program, unbounded);
    assert_eq!(completion.list_key_names(expr), vec!["done"]);
    assert!(completion.limit_hit().is_none());
    Ok(())
}

#[test]
fn recursive_shapes_keep_the_base_case() -> Result<()> {
    let src = "<?php\nfunction tree($n) {\n    if ($n > 0) {\n        return ['child' => tree($n - 1)];\n    }\n    return ['leaf' => true];\n}\n$t = tree(3);\n$t;\n";
    let program = program(src)?;
    let expr = last_expr(&program, src, "$t;")?;
    let mut completion = Completion::explicit(&program);
    assert_eq!(completion.list_key_names(expr), vec!["child", "leaf"]);
    Ok(())
}

/// Clock advancing one second per reading.
struct SteppingClock(AtomicU64);

impl TimeSource for SteppingClock {
    fn now(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.0.fetch_add(1, Ordering::SeqCst)))
    }
}

static CLOCK: SteppingClock = SteppingClock(AtomicU64::new(0));

#[test]
fn timeout_returns_partial_results() -> Result<()> {
    let src = chain(4);
    let program = program(&src)?;
    let expr = last_expr(&program, &src, "$a4;")?;

    set_time_source(&CLOCK).map_err(|e| anyhow!("{e}"))?;
    let mut timed = options().with_timeout(0.5);
    timed.timer_check_interval = 1;
    let mut completion = Completion::new(&program, timed);
    let names = completion.list_key_names(expr);
    let hit = completion.limit_hit().copied();
    clear_time_source();

    assert!(names.is_empty());
    assert!(matches!(hit, Some(LimitError::TimeLimitExceeded { .. })));
    Ok(())
}
