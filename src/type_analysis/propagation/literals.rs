// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Array literals.

use crate::ast::{ArrayItem, ClassRef, Expr};
use crate::program::ExprId;
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::model::{
    Deferred, KeyName, KeyValue, MultiType, ReturnThunk, Type, TypeKind,
};

use super::dispatch::child_id;

impl SearchSession<'_> {
    /// Keys of an array literal. Values stay deferred until a consumer asks
    /// for them so that wide literals cost one resolve per key read.
    pub(crate) fn resolve_array_literal(
        &mut self,
        id: ExprId,
        items: &[ArrayItem],
        ctx: CallCtxId,
    ) -> MultiType {
        let mut ty = Type::array().with_definition(Some(id));
        let mut next_position: i64 = 0;

        for item in items {
            let value_id = child_id(id, &item.value);
            if item.spread {
                let spread = self.resolve(value_id, ctx);
                for spread_ty in spread.types() {
                    for entry in spread_ty.keys.values() {
                        ty.add_key_entry(entry.clone());
                    }
                    ty.element_types.extend(spread_ty.element_types.clone());
                }
                continue;
            }

            let value = KeyValue::Deferred(Deferred::Expr {
                expr: value_id,
                call_ctx: ctx,
            });
            let Some(key) = &item.key else {
                ty.add_key(
                    KeyName::Named(next_position.to_string()),
                    value,
                    Some(value_id),
                );
                next_position += 1;
                continue;
            };

            let key_id = child_id(id, key);
            let names = self.key_names_of(key_id, ctx);
            if names.is_empty() {
                ty.add_key(KeyName::Unknown, value, Some(key_id));
                continue;
            }
            for name in names {
                if let Ok(position) = name.parse::<i64>() {
                    next_position = next_position.max(position.saturating_add(1));
                }
                ty.add_key(KeyName::Named(name), value.clone(), Some(key_id));
            }
        }

        for thunk in self.callable_tuple(id, items, ctx) {
            ty.return_thunks.push(thunk);
        }
        MultiType::of(ty)
    }

    /// Names a key expression may evaluate to. Literal keys are read from the
    /// tree, so they survive a truncated resolution.
    pub(crate) fn key_names_of(&mut self, key: ExprId, ctx: CallCtxId) -> Vec<String> {
        let literal = self
            .program()
            .expr(key)
            .and_then(|e| e.literal())
            .and_then(|v| v.as_key());
        match literal {
            Some(name) => vec![name],
            None => self.resolve(key, ctx).key_literals(),
        }
    }

    /// `[Foo::class, 'method']`, `['Foo', 'method']` and `[$this, 'method']`.
    fn callable_tuple(&mut self, id: ExprId, items: &[ArrayItem], ctx: CallCtxId) -> Vec<ReturnThunk> {
        let [target, method] = items else {
            return vec![];
        };
        if target.key.is_some() || method.key.is_some() || target.spread || method.spread {
            return vec![];
        }
        let Some(method) = method.value.literal().and_then(|v| v.as_string()) else {
            return vec![];
        };

        let classes: Vec<String> = match target.value.as_ref() {
            Expr::ClassConst {
                class: ClassRef::Name(name),
                name: constant,
                ..
            } if constant.text().eq_ignore_ascii_case("class") => {
                self.class_names_of(id, name.text(), ctx)
            }
            Expr::String { .. } => target
                .value
                .literal()
                .and_then(|v| v.as_string())
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            _ => {
                let types = self.resolve(child_id(id, &target.value), ctx);
                types
                    .iter()
                    .filter_map(|t| match &t.kind {
                        TypeKind::Object(class) => Some(class.clone()),
                        _ => None,
                    })
                    .collect()
            }
        };

        classes
            .into_iter()
            .filter(|class| self.program().find_method(class, method).is_some())
            .map(|class| ReturnThunk::Method {
                class,
                method: method.to_string(),
            })
            .collect()
    }
}
