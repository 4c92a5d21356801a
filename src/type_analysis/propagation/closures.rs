// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Closures and the invocation of callable values.

use crate::ast::{Expr, FunctionDecl, Ref};
use crate::program::{ExprId, ScopeId};
use crate::type_analysis::context::{ArgBinding, CallContext, CallCtxId, SearchSession};
use crate::type_analysis::model::{MultiType, ReturnThunk, Type, TypeKind};

use super::calls::Callee;

impl SearchSession<'_> {
    /// A closure value carries one thunk per `return` of its body. The thunks
    /// remember `ctx` so that captured variables resolve where the closure was
    /// created.
    pub(crate) fn resolve_closure(
        &mut self,
        id: ExprId,
        func: &Ref<FunctionDecl>,
        ctx: CallCtxId,
    ) -> MultiType {
        let mut ty = Type::new(TypeKind::Closure).with_definition(Some(id));
        let scope = ScopeId {
            module: id.module,
            func: Some(func.fidx),
        };
        if let Some(scope) = self.program().scope(scope) {
            for ret in &scope.returns {
                ty.return_thunks.push(ReturnThunk::Expr {
                    expr: *ret,
                    enclosing: ctx,
                });
            }
        }
        MultiType::of(ty)
    }

    /// Return types of a callable value called with `args`.
    pub(crate) fn invoke_thunk(
        &mut self,
        thunk: &ReturnThunk,
        call_site: Option<ExprId>,
        caller: CallCtxId,
        args: Vec<ArgBinding>,
    ) -> MultiType {
        match thunk {
            ReturnThunk::Expr { expr, enclosing } => {
                let this_class = self.call_context(*enclosing).this_class.clone();
                let ctx = self.new_call_context(CallContext {
                    call_site,
                    caller,
                    args,
                    this_class,
                    enclosing: Some(*enclosing),
                });
                self.resolve(*expr, ctx)
            }
            ReturnThunk::Method { class, method } => {
                let program = self.program();
                let Some((entry, decl)) = program.find_method(class, method) else {
                    return MultiType::empty();
                };
                let callee = Callee {
                    scope: entry.method_scope(decl),
                    decl: decl.clone(),
                    this_class: Some(class.clone()),
                };
                let ctx = self.new_call_context(CallContext {
                    call_site,
                    caller,
                    args,
                    this_class: Some(class.clone()),
                    enclosing: None,
                });
                self.function_return(&callee, ctx)
            }
        }
    }

    /// Scopes whose parameters receive the arguments when a value of
    /// `types` is called.
    pub(crate) fn callable_scopes(&self, types: &MultiType) -> Vec<ScopeId> {
        let program = self.program();
        let mut scopes = vec![];
        for ty in types.iter() {
            if let (TypeKind::Closure, Some(def)) = (&ty.kind, ty.definition) {
                if let Some(Expr::Closure { func, .. }) = program.expr(def).map(|e| e.as_ref()) {
                    scopes.push(ScopeId {
                        module: def.module,
                        func: Some(func.fidx),
                    });
                }
            }
            for thunk in &ty.return_thunks {
                if let ReturnThunk::Method { class, method } = thunk {
                    if let Some((entry, decl)) = program.find_method(class, method) {
                        scopes.push(entry.method_scope(decl));
                    }
                }
            }
        }
        scopes.dedup();
        scopes
    }
}
