// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Variables: `$this`, assignments, destructuring, parameters and variables
//! captured by closures.

use crate::program::{ExprId, OccurrenceKind, ScopeId, Step};
use crate::type_analysis::context::{ArgBinding, CallCtxId, SearchSession};
use crate::type_analysis::docs;
use crate::type_analysis::model::{
    Deferred, ForceDeferred, KeyName, KeyValue, MultiType, Type, TypeKind,
};

use super::calls::hint_types;

impl SearchSession<'_> {
    pub(crate) fn resolve_var(&mut self, id: ExprId, name: &str, ctx: CallCtxId) -> MultiType {
        if name == "this" {
            return self
                .this_class(id, ctx)
                .map(|class| MultiType::of(Type::object(&class)))
                .unwrap_or_default();
        }
        let program = self.program();
        let Some(scope) = program.scope_id_of(id) else {
            return MultiType::empty();
        };
        let offset = program.expr(id).map(|e| e.span().start).unwrap_or(0);

        let is_param = program
            .scope(scope)
            .and_then(|s| s.param_index(name))
            .is_some();

        let mut result = self.var_at(scope, name, offset, ctx);
        // Parameters already fall back to usage of the parameter itself.
        // Other variables look at the reads from this one onwards.
        if !result.is_informative() && !is_param {
            let depth = self.options().usage_depth;
            let usage = self.probe(|s| s.var_type_from_usage(scope, name, offset, depth));
            result.extend(usage);
        }
        result
    }

    /// Types of `name` as visible at `offset` of `scope_id`: parameter
    /// bindings, captured values and every assignment before the offset.
    fn var_at(&mut self, scope_id: ScopeId, name: &str, offset: u32, ctx: CallCtxId) -> MultiType {
        let program = self.program();
        let Some(scope) = program.scope(scope_id) else {
            return MultiType::empty();
        };
        let mut result = MultiType::empty();

        if let Some(index) = scope.param_index(name) {
            result.extend(self.param_types(scope_id, index, ctx));
        } else if scope.captures(name) {
            if let (Some(parent), Some(closure)) = (scope.parent, scope.closure) {
                let enclosing = self.call_context(ctx).enclosing.unwrap_or(CallCtxId::EMPTY);
                let closure_offset = program.expr(closure).map(|e| e.span().start).unwrap_or(0);
                result.extend(self.var_at(parent, name, closure_offset, enclosing));
            }
        }

        for occurrence in scope.occurrences(name) {
            if occurrence.offset > offset {
                continue;
            }
            match &occurrence.kind {
                OccurrenceKind::Read | OccurrenceKind::MemberName => (),
                OccurrenceKind::Assign {
                    assign,
                    value,
                    path,
                } => {
                    if let Some(doc) = program
                        .statement_doc(*assign)
                        .and_then(|d| docs::var_doc(d.text(), name))
                    {
                        let this_class = self.this_class(*assign, ctx);
                        result.extend(self.declared_types(&doc, this_class.as_deref()));
                    }
                    result.extend(self.assignment_types(*assign, *value, path, ctx));
                }
                OccurrenceKind::Extract { source, steps } => {
                    result.extend(self.extracted_types(*source, steps, ctx));
                }
            }
        }
        result
    }

    /// Value stored by an assignment, wrapped in one array level per index
    /// of `path` (`$v['a'][] = value`).
    pub(crate) fn assignment_types(
        &mut self,
        assign: ExprId,
        value: ExprId,
        path: &[Option<ExprId>],
        ctx: CallCtxId,
    ) -> MultiType {
        if path.is_empty() {
            return self.resolve(assign, ctx);
        }
        let mut current = KeyValue::Deferred(Deferred::Expr {
            expr: value,
            call_ctx: ctx,
        });
        for step in path.iter().rev() {
            let mut ty = Type::array().with_definition(Some(assign));
            match step {
                Some(key) => {
                    let names = self.key_names_of(*key, ctx);
                    if names.is_empty() {
                        ty.add_key(KeyName::Unknown, current, Some(*key));
                    } else {
                        for name in names {
                            ty.add_key(KeyName::Named(name), current.clone(), Some(*key));
                        }
                    }
                }
                None => ty.element_types = self.force_value(current),
            }
            current = KeyValue::Ready(MultiType::of(ty));
        }
        self.force_value(current)
    }

    fn force_value(&mut self, value: KeyValue) -> MultiType {
        match value {
            KeyValue::Ready(types) => types,
            KeyValue::Deferred(deferred) => self.force(&deferred),
        }
    }

    fn extracted_types(&mut self, source: ExprId, steps: &[Step], ctx: CallCtxId) -> MultiType {
        let mut types = self.resolve(source, ctx);
        for step in steps {
            types = match step {
                Step::Key(key) => {
                    let names = self.key_names_of(*key, ctx);
                    if names.is_empty() {
                        types.all_values(self)
                    } else {
                        let mut values = MultiType::empty();
                        for name in names {
                            values.extend(types.get_key(&name, self));
                        }
                        values
                    }
                }
                Step::Position(position) => types.get_key(&position.to_string(), self),
                Step::Element => types.all_values(self),
                Step::KeyOf => {
                    let mut keys = MultiType::empty();
                    for name in types.key_names() {
                        keys.push(Type::string(&name));
                    }
                    if types.has_element_types() {
                        keys.push(Type::new(TypeKind::Int));
                    }
                    keys
                }
            };
        }
        types
    }

    /// Bound argument, default value, `@param` doc and hint of a parameter,
    /// falling back to how the body uses it.
    fn param_types(&mut self, scope_id: ScopeId, index: usize, ctx: CallCtxId) -> MultiType {
        let program = self.program();
        let Some(scope) = program.scope(scope_id) else {
            return MultiType::empty();
        };
        let Some(func) = scope.func.clone() else {
            return MultiType::empty();
        };
        let Some(param) = func.params.get(index) else {
            return MultiType::empty();
        };
        let context = self.call_context(ctx).clone();
        let mut result = MultiType::empty();

        if param.variadic {
            if context.args.len() > index {
                let mut list = Type::array();
                for arg in &context.args[index..] {
                    list.element_types.extend(self.bound_arg(arg, context.caller));
                }
                result.push(list);
            }
        } else if let Some(arg) = context.args.get(index) {
            result.extend(self.bound_arg(arg, context.caller));
        }
        if let Some(default) = &param.default {
            let default = ExprId {
                module: scope_id.module,
                eidx: default.eidx(),
            };
            result.extend(self.resolve(default, ctx));
        }

        let this_class = context
            .this_class
            .clone()
            .or_else(|| scope.class_name().map(str::to_string));
        if let Some(doc) = func
            .doc
            .as_ref()
            .and_then(|d| docs::param_doc(d.text(), param.name.text()))
        {
            result.extend(self.declared_types(&doc, this_class.as_deref()));
        }
        if let Some(hint) = &param.type_hint {
            result.extend(hint_types(hint.text(), this_class.as_deref()));
        }

        if !result.is_informative() {
            let depth = self.options().usage_depth;
            result.extend(self.probe(|s| s.arg_type_from_usage(scope_id, index, depth)));
        }
        result
    }

    fn bound_arg(&mut self, arg: &ArgBinding, caller: CallCtxId) -> MultiType {
        match arg {
            ArgBinding::Expr(expr) => self.resolve(*expr, caller),
            ArgBinding::Resolved(types) => types.clone(),
        }
    }
}
