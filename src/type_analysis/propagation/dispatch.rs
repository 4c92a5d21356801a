// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Ref};
use crate::program::ExprId;
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::model::{MultiType, Type};
use crate::value::Value;

/// Id of a sub-expression of `parent`. Children share their parent's module.
pub(crate) fn child_id(parent: ExprId, expr: &Ref<Expr>) -> ExprId {
    ExprId {
        module: parent.module,
        eidx: expr.eidx(),
    }
}

impl SearchSession<'_> {
    /// Forward resolution of one expression, by kind.
    pub(crate) fn dispatch(&mut self, id: ExprId, ctx: CallCtxId) -> MultiType {
        let Some(expr) = self.program().expr(id).cloned() else {
            log::debug!("no expression at {id:?}");
            return MultiType::empty();
        };

        match expr.as_ref() {
            Expr::String { value, .. } | Expr::Number { value, .. } | Expr::Bool { value, .. } => {
                MultiType::of(Type::literal(value.clone()).with_definition(Some(id)))
            }
            Expr::Null { .. } => MultiType::of(Type::literal(Value::Null).with_definition(Some(id))),
            // Global constants are not tracked.
            Expr::Name { .. } => MultiType::empty(),
            Expr::Var { name, .. } => self.resolve_var(id, name.text(), ctx),
            Expr::Array { items, .. } => self.resolve_array_literal(id, items, ctx),
            Expr::Index { refr, index, .. } => self.resolve_index(id, refr, index.as_ref(), ctx),
            Expr::Property { refr, name, .. } => self.resolve_property(id, refr, name.text(), ctx),
            Expr::StaticProperty { class, name, .. } => {
                self.resolve_static_property(id, class, name.text(), ctx)
            }
            Expr::ClassConst { class, name, .. } => {
                self.resolve_class_const(id, class, name.text(), ctx)
            }
            Expr::MethodCall { .. } | Expr::StaticCall { .. } | Expr::Call { .. } | Expr::New { .. } => {
                self.resolve_call(id, ctx)
            }
            Expr::Closure { func, .. } => self.resolve_closure(id, func, ctx),
            Expr::Assign { op, lhs, rhs, .. } => self.resolve_assign(id, *op, lhs, rhs, ctx),
            Expr::ArithExpr { op, lhs, rhs, .. } => self.resolve_arith(id, *op, lhs, rhs, ctx),
            Expr::BoolExpr { op, .. } => self.resolve_bool_expr(id, *op),
            Expr::Coalesce { lhs, rhs, .. } => {
                let mut result = self.resolve(child_id(id, lhs), ctx);
                result.extend(self.resolve(child_id(id, rhs), ctx));
                result
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                let first = then.as_ref().unwrap_or(cond);
                let mut result = self.resolve(child_id(id, first), ctx);
                result.extend(self.resolve(child_id(id, otherwise), ctx));
                result
            }
            Expr::Unary { op, expr, .. } => self.resolve_unary(id, *op, expr, ctx),
            Expr::Cast { kind, expr, .. } => self.resolve_cast(id, *kind, expr, ctx),
            Expr::InstanceOf { .. } => self.resolve_bool_expr(id, crate::ast::BoolOp::Eq),
        }
    }

    /// `$a['k']`, `$a[$k]` and `$a[]`.
    fn resolve_index(
        &mut self,
        id: ExprId,
        refr: &Ref<Expr>,
        index: Option<&Ref<Expr>>,
        ctx: CallCtxId,
    ) -> MultiType {
        let base = self.resolve(child_id(id, refr), ctx);
        if base.is_empty() {
            return base;
        }
        let Some(index) = index else {
            return base.element_types();
        };
        let names = self.key_names_of(child_id(id, index), ctx);
        if names.is_empty() {
            return base.all_values(self);
        }
        let mut result = MultiType::empty();
        for name in names {
            result.extend(base.get_key(&name, self));
        }
        result
    }
}
