// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Search session: per-query state of a resolution walk.
//!
//! A session owns the result cache, the stack of expression contexts being
//! resolved and the arena of call contexts. Every resolution goes through
//! [`SearchSession::resolve`], which applies the depth, budget, timeout,
//! cache and recursion guards before dispatching on the expression kind.

use alloc::collections::BTreeMap;
use core::time::Duration;

use crate::program::{ExprId, Program};
use crate::utils::limits::{monotonic_now, ExecutionTimer, LimitError};

use super::model::{Deferred, ForceDeferred, MultiType};
use super::options::TypeAnalysisOptions;

/// Index of a call context in the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallCtxId(pub u32);

impl CallCtxId {
    /// Context with no arguments and no bound class.
    pub const EMPTY: CallCtxId = CallCtxId(0);
}

/// Index of an expression context on the session stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprCtxId(pub u32);

#[derive(Debug, Clone)]
pub enum ArgBinding {
    /// Argument expression, resolved under the caller's context.
    Expr(ExprId),
    /// Argument type computed by a built-in, e.g. `array_map` elements.
    Resolved(MultiType),
}

/// Arguments and `$this` class for one invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub call_site: Option<ExprId>,
    pub caller: CallCtxId,
    pub args: Vec<ArgBinding>,
    pub this_class: Option<String>,
    /// Context the invoked closure was created in.
    pub enclosing: Option<CallCtxId>,
}

impl Default for CallCtxId {
    fn default() -> Self {
        CallCtxId::EMPTY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CallKey {
    call_site: Option<ExprId>,
    caller: CallCtxId,
    args: Vec<ExprId>,
    this_class: Option<String>,
    enclosing: Option<CallCtxId>,
}

/// One expression being resolved.
#[derive(Debug, Clone)]
pub struct ExprContext {
    pub expr: ExprId,
    pub call_ctx: CallCtxId,
    pub depth: u32,
    pub parent: Option<ExprCtxId>,
    pub do_not_cache: bool,
}

pub struct SearchSession<'a> {
    program: &'a Program,
    options: TypeAnalysisOptions,
    timer: ExecutionTimer,
    expressions_resolved: u64,
    limit_hit: Option<LimitError>,
    cache: BTreeMap<(CallCtxId, ExprId), MultiType>,
    frames: Vec<ExprContext>,
    call_contexts: Vec<CallContext>,
    interned: BTreeMap<CallKey, CallCtxId>,
    probe_depth: u32,
    force_level: u32,
    empty_context: CallContext,
}

impl<'a> SearchSession<'a> {
    pub fn new(program: &'a Program, options: TypeAnalysisOptions) -> Self {
        let mut timer = ExecutionTimer::new(options.timer_config());
        if timer.limit().is_some() {
            timer.start(monotonic_now().unwrap_or(Duration::ZERO));
        }
        Self {
            program,
            options,
            timer,
            expressions_resolved: 0,
            limit_hit: None,
            cache: BTreeMap::new(),
            frames: vec![],
            call_contexts: vec![CallContext::default()],
            interned: BTreeMap::new(),
            probe_depth: 0,
            force_level: 0,
            empty_context: CallContext::default(),
        }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn options(&self) -> &TypeAnalysisOptions {
        &self.options
    }

    pub fn expressions_resolved(&self) -> u64 {
        self.expressions_resolved
    }

    /// Budget or timeout exhaustion observed by this session, if any.
    pub fn limit_hit(&self) -> Option<&LimitError> {
        self.limit_hit.as_ref()
    }

    pub fn call_context(&self, id: CallCtxId) -> &CallContext {
        self.call_contexts
            .get(id.0 as usize)
            .unwrap_or(&self.empty_context)
    }

    /// Registers a call context. Contexts binding only argument expressions
    /// are shared so that the cache is reused across identical calls.
    pub fn new_call_context(&mut self, context: CallContext) -> CallCtxId {
        let key = context
            .args
            .iter()
            .map(|a| match a {
                ArgBinding::Expr(e) => Some(*e),
                ArgBinding::Resolved(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|args| CallKey {
                call_site: context.call_site,
                caller: context.caller,
                args,
                this_class: context.this_class.clone(),
                enclosing: context.enclosing,
            });
        if let Some(id) = key.as_ref().and_then(|k| self.interned.get(k)) {
            return *id;
        }
        let id = CallCtxId(u32::try_from(self.call_contexts.len()).unwrap_or(u32::MAX));
        self.call_contexts.push(context);
        if let Some(key) = key {
            self.interned.insert(key, id);
        }
        id
    }

    /// Innermost expression context, if a resolution is in progress.
    pub fn current(&self) -> Option<&ExprContext> {
        self.frames.last()
    }

    /// Expression contexts being resolved, outermost first.
    pub fn frames(&self) -> &[ExprContext] {
        &self.frames
    }

    /// Runs `f` as a disposable probe whose resolutions are not cached.
    pub fn probe<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.probe_depth += 1;
        let result = f(self);
        self.probe_depth -= 1;
        result
    }

    /// Forces a deferred value as if it were nested `level` keys deep.
    pub fn force_at(&mut self, deferred: &Deferred, level: u32) -> MultiType {
        let saved = self.force_level;
        self.force_level = level;
        let result = self.force(deferred);
        self.force_level = saved;
        result
    }

    /// Resolves the possible types of `expr` under call context `call_ctx`.
    pub fn resolve(&mut self, expr: ExprId, call_ctx: CallCtxId) -> MultiType {
        let (depth, parent, inherited_no_cache) = match self.frames.last() {
            Some(top) => (
                top.depth + 1,
                Some(ExprCtxId(u32::try_from(self.frames.len() - 1).unwrap_or(u32::MAX))),
                top.do_not_cache,
            ),
            None => (self.force_level, None, false),
        };
        if depth > self.options.max_depth {
            log::trace!("depth limit reached at {expr:?}");
            return MultiType::empty();
        }

        self.expressions_resolved += 1;
        if self.expressions_resolved > self.options.max_total_expressions {
            if self.limit_hit.is_none() {
                let err = LimitError::ExpressionLimitExceeded {
                    resolved: self.expressions_resolved,
                    limit: self.options.max_total_expressions,
                };
                log::warn!("{err}, results are partial");
                self.limit_hit = Some(err);
            }
            return MultiType::empty();
        }

        let now = if self.timer.check_due(1) {
            monotonic_now()
        } else {
            None
        };
        if let Err(err) = self.timer.tick(1, now.unwrap_or(Duration::ZERO)) {
            if self.limit_hit.is_none() {
                log::warn!("{err}, results are partial");
                self.limit_hit = Some(err);
            }
            return MultiType::empty();
        }
        if matches!(self.limit_hit, Some(LimitError::TimeLimitExceeded { .. })) {
            return MultiType::empty();
        }

        let key = (call_ctx, expr);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let do_not_cache = inherited_no_cache || self.probe_depth > 0;
        self.frames.push(ExprContext {
            expr,
            call_ctx,
            depth,
            parent,
            do_not_cache,
        });
        if self.is_recursion() {
            log::debug!("recursion detected at {expr:?}");
            self.frames.pop();
            return MultiType::empty();
        }

        if !do_not_cache {
            self.cache.insert(key, MultiType::empty());
        }
        let result = self.dispatch(expr, call_ctx);
        self.frames.pop();
        if !do_not_cache {
            self.cache.insert(key, result.clone());
        }
        result
    }

    /// Whether the innermost frame re-enters an expression through a call
    /// site already being resolved, or the chain of expressions on the stack
    /// ends with a repetition: its last k entries equal the k entries before
    /// them.
    fn is_recursion(&self) -> bool {
        if let Some((top, rest)) = self.frames.split_last() {
            if let Some(site) = self.call_context(top.call_ctx).call_site {
                let reentered = rest.iter().any(|f| {
                    f.expr == top.expr && self.call_context(f.call_ctx).call_site == Some(site)
                });
                if reentered {
                    return true;
                }
            }
        }

        let mut chain: Vec<ExprId> = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            if chain.last() != Some(&frame.expr) {
                chain.push(frame.expr);
            }
        }
        let n = chain.len();
        (1..=n / 2).any(|k| chain[n - k..] == chain[n - 2 * k..n - k])
    }
}

impl ForceDeferred for SearchSession<'_> {
    fn force(&mut self, deferred: &Deferred) -> MultiType {
        match deferred {
            Deferred::Expr { expr, call_ctx } => self.resolve(*expr, *call_ctx),
            Deferred::Usage { expr, depth_left } => {
                let (expr, depth_left) = (*expr, *depth_left);
                self.probe(|s| s.expr_type_from_usage(expr, depth_left))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Source;

    fn program(src: &str) -> anyhow::Result<Program> {
        let source = Source::from_contents("ctx.php".to_string(), src.to_string())?;
        Program::from_sources(&[source])
    }

    #[test]
    fn call_contexts_with_expression_args_are_shared() -> anyhow::Result<()> {
        let p = program("<?php f(1);")?;
        let mut session = SearchSession::new(&p, TypeAnalysisOptions::default());
        let arg = ExprId { module: 0, eidx: 1 };
        let make = || CallContext {
            call_site: Some(ExprId { module: 0, eidx: 0 }),
            args: vec![ArgBinding::Expr(arg)],
            ..CallContext::default()
        };
        let a = session.new_call_context(make());
        let b = session.new_call_context(make());
        assert_eq!(a, b);
        assert_ne!(a, CallCtxId::EMPTY);

        let resolved = CallContext {
            args: vec![ArgBinding::Resolved(MultiType::empty())],
            ..CallContext::default()
        };
        let c = session.new_call_context(resolved.clone());
        let d = session.new_call_context(resolved);
        assert_ne!(c, d);
        Ok(())
    }

    #[test]
    fn recursion_detects_repeated_tail() -> anyhow::Result<()> {
        let p = program("<?php $a = 1;")?;
        let mut session = SearchSession::new(&p, TypeAnalysisOptions::default());
        let id = |eidx| ExprId { module: 0, eidx };
        for eidx in [1, 2, 3, 2] {
            session.frames.push(ExprContext {
                expr: id(eidx),
                call_ctx: CallCtxId::EMPTY,
                depth: 0,
                parent: None,
                do_not_cache: false,
            });
        }
        assert!(!session.is_recursion());
        session.frames.push(ExprContext {
            expr: id(3),
            call_ctx: CallCtxId::EMPTY,
            depth: 0,
            parent: None,
            do_not_cache: false,
        });
        assert!(session.is_recursion());
        Ok(())
    }

    #[test]
    fn recursion_through_the_same_call_site() -> anyhow::Result<()> {
        let p = program("<?php $a = 1;")?;
        let mut session = SearchSession::new(&p, TypeAnalysisOptions::default());
        let id = |eidx| ExprId { module: 0, eidx };
        let frame = |expr, call_ctx| ExprContext {
            expr,
            call_ctx,
            depth: 0,
            parent: None,
            do_not_cache: false,
        };
        let outer = session.new_call_context(CallContext {
            call_site: Some(id(1)),
            ..CallContext::default()
        });
        let first = session.new_call_context(CallContext {
            call_site: Some(id(2)),
            caller: outer,
            ..CallContext::default()
        });
        let second = session.new_call_context(CallContext {
            call_site: Some(id(2)),
            caller: first,
            ..CallContext::default()
        });

        session.frames.push(frame(id(2), outer));
        session.frames.push(frame(id(2), first));
        assert!(!session.is_recursion());
        session.frames.push(frame(id(2), second));
        assert!(session.is_recursion());
        Ok(())
    }

    #[test]
    fn budget_exhaustion_returns_empty() -> anyhow::Result<()> {
        let p = program("<?php $a = ['x' => 1]; $a;")?;
        let options = TypeAnalysisOptions {
            max_total_expressions: 0,
            ..TypeAnalysisOptions::default()
        };
        let mut session = SearchSession::new(&p, options);
        let result = session.resolve(ExprId { module: 0, eidx: 1 }, CallCtxId::EMPTY);
        assert!(result.is_empty());
        assert!(matches!(
            session.limit_hit(),
            Some(LimitError::ExpressionLimitExceeded { .. })
        ));
        Ok(())
    }
}
