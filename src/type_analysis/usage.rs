// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Backward inference: the shape an expression is expected to have, judged
//! from how it is used afterwards.
//!
//! * `$x['k']` tells that `$x` has a key `k`, whose own shape is in turn
//!   inferred from the usage of `$x['k']`.
//! * Passing a value to a function tells whatever the function's body does
//!   with the parameter, or what the built-in table expects of it.
//! * Returning a value tells what the callers do with the result.
//!
//! Every hop consumes one unit of `depth_left`. Nested key values stay
//! deferred so that a shape is only explored as deep as it is read.

use crate::ast::{ArithOp, AssignOp, Expr, FunctionBody, Stmt};
use crate::program::{ExprId, OccurrenceKind, ParentNode, Role, ScopeId};
use crate::type_analysis::builtins::{self, UsageTemplate};
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::docs;
use crate::type_analysis::model::{Deferred, KeyName, KeyValue, MultiType, Type};
use crate::type_analysis::propagation::{child_id, CallTargets};

impl SearchSession<'_> {
    /// Shape expected of the value of `id` by the code consuming it.
    pub fn expr_type_from_usage(&mut self, id: ExprId, depth_left: u32) -> MultiType {
        if depth_left == 0 {
            return MultiType::empty();
        }
        let Some(parent) = self.program().parent(id).cloned() else {
            return MultiType::empty();
        };
        match (parent.node, parent.role) {
            (ParentNode::Expr(pid), role) => self.usage_in_expr(id, pid, role, depth_left),
            (ParentNode::Stmt(stmt), Role::Collection) => {
                self.foreach_usage(id.module, &stmt, depth_left - 1)
            }
            (ParentNode::Stmt(_) | ParentNode::ArrowBody(_), Role::Returned) => {
                self.return_usage(id, depth_left - 1)
            }
            _ => MultiType::empty(),
        }
    }

    fn usage_in_expr(&mut self, id: ExprId, pid: ExprId, role: Role, depth_left: u32) -> MultiType {
        let Some(parent) = self.program().expr(pid).cloned() else {
            return MultiType::empty();
        };
        let depth = depth_left - 1;
        match (parent.as_ref(), role) {
            (Expr::Index { index: Some(index), .. }, Role::Base) => {
                let names = self.key_names_of(child_id(pid, index), CallCtxId::EMPTY);
                if names.is_empty() {
                    return MultiType::empty();
                }
                let mut ty = Type::array().with_definition(Some(pid));
                let value = KeyValue::Deferred(Deferred::Usage {
                    expr: pid,
                    depth_left: depth,
                });
                for name in names {
                    ty.add_key(KeyName::Named(name), value.clone(), Some(pid));
                }
                MultiType::of(ty)
            }
            (
                Expr::Call { .. } | Expr::MethodCall { .. } | Expr::StaticCall { .. } | Expr::New { .. },
                Role::Arg(position),
            ) => self.call_arg_usage(pid, position, depth_left),
            (Expr::Assign { op: AssignOp::Eq, lhs, span, .. }, Role::Rhs) => {
                match (lhs.var_name(), self.program().scope_id_of(pid)) {
                    (Some(name), Some(scope)) if name != "this" => {
                        let name = name.to_string();
                        self.var_type_from_usage(scope, &name, span.end, depth)
                    }
                    _ => MultiType::empty(),
                }
            }
            // Transparent wrappers pass the expectation on their own usage.
            (Expr::Ternary { .. }, Role::Then | Role::Otherwise)
            | (Expr::Coalesce { .. }, Role::Lhs | Role::Rhs)
            | (Expr::ArithExpr { op: ArithOp::Add, .. }, Role::Lhs | Role::Rhs)
            | (Expr::Unary { .. } | Expr::Cast { .. }, Role::Operand) => {
                self.expr_type_from_usage(pid, depth_left)
            }
            (Expr::Array { items, .. }, Role::ArrayValue) => {
                let Some(names) = self.item_key_names(pid, items, id) else {
                    return MultiType::empty();
                };
                let expected = self.expected_shape_of(pid, depth);
                let mut result = MultiType::empty();
                for name in names {
                    result.extend(expected.get_key(&name, self));
                }
                result
            }
            _ => MultiType::empty(),
        }
    }

    /// Key names under which the item holding `value` is stored.
    fn item_key_names(
        &mut self,
        array: ExprId,
        items: &[crate::ast::ArrayItem],
        value: ExprId,
    ) -> Option<Vec<String>> {
        let mut position = 0usize;
        for item in items {
            let is_target = item.value.eidx() == value.eidx;
            match &item.key {
                Some(key) if is_target => {
                    let names = self.key_names_of(child_id(array, key), CallCtxId::EMPTY);
                    return (!names.is_empty()).then_some(names);
                }
                None if is_target => return Some(vec![position.to_string()]),
                None if !item.spread => position += 1,
                _ => (),
            }
        }
        None
    }

    /// `foreach ($collection as $v)`: the collection holds whatever `$v` is
    /// expected to be, under any key.
    fn foreach_usage(&mut self, module: u32, stmt: &Stmt, depth_left: u32) -> MultiType {
        let Stmt::Foreach { value, .. } = stmt else {
            return MultiType::empty();
        };
        let Some(name) = value.var_name() else {
            return MultiType::empty();
        };
        let value_id = ExprId {
            module,
            eidx: value.eidx(),
        };
        let Some(scope) = self.program().scope_id_of(value_id) else {
            return MultiType::empty();
        };
        let element = self.var_type_from_usage(scope, name, value.span().start, depth_left);
        if element.is_empty() {
            return MultiType::empty();
        }
        let mut ty = Type::array();
        ty.add_key(KeyName::Unknown, KeyValue::Ready(element), None);
        MultiType::of(ty)
    }

    /// A returned value is expected to have what callers of the function
    /// read from the call.
    fn return_usage(&mut self, id: ExprId, depth_left: u32) -> MultiType {
        let program = self.program();
        let Some(func) = program.scope_of(id).and_then(|s| s.func.clone()) else {
            return MultiType::empty();
        };
        if func.name.is_none() {
            return MultiType::empty();
        }
        let mut result = MultiType::empty();
        for site in program.call_sites(func.name()) {
            result.extend(self.expr_type_from_usage(*site, depth_left));
        }
        result
    }

    /// Shape expected of argument `position` of a call, from built-in usage
    /// templates and from the bodies of the functions it may reach.
    fn call_arg_usage(&mut self, call: ExprId, position: usize, depth_left: u32) -> MultiType {
        let depth = depth_left - 1;
        let targets = self.call_targets(call, CallCtxId::EMPTY);
        let mut result = MultiType::empty();
        for builtin in &targets.builtins {
            let templates: Vec<UsageTemplate> = builtin.spec.usage_for(position).cloned().collect();
            for template in templates {
                result.extend(self.builtin_usage(
                    &template,
                    position,
                    builtin.class.as_deref(),
                    &targets,
                    depth,
                ));
            }
        }
        let scopes: Vec<ScopeId> = targets
            .callees
            .iter()
            .map(|c| c.scope)
            .chain(targets.callable_scopes.iter().copied())
            .collect();
        for scope in scopes {
            result.extend(self.arg_type_from_usage(scope, position, depth));
        }
        result
    }

    fn builtin_usage(
        &mut self,
        template: &UsageTemplate,
        position: usize,
        class: Option<&str>,
        targets: &CallTargets,
        depth_left: u32,
    ) -> MultiType {
        match template {
            UsageTemplate::PrecedingArgs => {
                let mut result = MultiType::empty();
                for arg in targets.args.iter().take(position) {
                    result.extend(self.resolve(*arg, CallCtxId::EMPTY));
                }
                result
            }
            UsageTemplate::Schema(name) => builtins::schema(name)
                .map(|s| s.to_types())
                .unwrap_or_default(),
            UsageTemplate::CallbackParam(callback) => {
                let Some(callback) = targets.args.get(usize::from(*callback)) else {
                    return MultiType::empty();
                };
                let callable = self.resolve(*callback, CallCtxId::EMPTY);
                let mut element = MultiType::empty();
                for scope in self.callable_scopes(&callable) {
                    element.extend(self.arg_type_from_usage(scope, 0, depth_left));
                }
                if element.is_empty() {
                    return MultiType::empty();
                }
                let mut ty = Type::array();
                ty.add_key(KeyName::Unknown, KeyValue::Ready(element), None);
                MultiType::of(ty)
            }
            UsageTemplate::BindVars => {
                let vars = targets
                    .receiver
                    .as_ref()
                    .map(|r| r.bind_vars())
                    .unwrap_or_default();
                if vars.is_empty() {
                    return MultiType::empty();
                }
                let mut ty = Type::array();
                for var in vars {
                    ty.add_key(KeyName::Named(var), KeyValue::Ready(MultiType::empty()), None);
                }
                MultiType::of(ty)
            }
            UsageTemplate::ModelFields => class
                .and_then(|c| self.model_row(c))
                .map(MultiType::of)
                .unwrap_or_default(),
            UsageTemplate::DeclaredProperties => class
                .and_then(|c| self.declared_properties(c))
                .map(MultiType::of)
                .unwrap_or_default(),
        }
    }

    /// Shape expected of parameter `position` of a function: its `@param`
    /// doc, its default, what its body reads from it and, for abstract
    /// methods, what the implementations read.
    pub fn arg_type_from_usage(&mut self, scope_id: ScopeId, position: usize, depth_left: u32) -> MultiType {
        if depth_left == 0 {
            return MultiType::empty();
        }
        let program = self.program();
        let Some(scope) = program.scope(scope_id) else {
            return MultiType::empty();
        };
        let Some(func) = scope.func.clone() else {
            return MultiType::empty();
        };
        let param = match func.params.get(position) {
            Some(param) => param,
            None => match func.params.last() {
                Some(last) if last.variadic => last,
                _ => return MultiType::empty(),
            },
        };

        let mut result = MultiType::empty();
        if let Some(doc) = func
            .doc
            .as_ref()
            .and_then(|d| docs::param_doc(d.text(), param.name.text()))
        {
            result.extend(self.declared_types(&doc, scope.class_name()));
        }
        if let Some(default) = &param.default {
            let default = ExprId {
                module: scope_id.module,
                eidx: default.eidx(),
            };
            result.extend(self.resolve(default, CallCtxId::EMPTY));
        }
        result.extend(self.var_type_from_usage(
            scope_id,
            param.name.text(),
            param.span.start,
            depth_left,
        ));

        if matches!(func.body, FunctionBody::None) {
            if let Some(class) = scope.class_name() {
                for (entry, method) in program.implementations(class, func.name()) {
                    result.extend(self.arg_type_from_usage(
                        entry.method_scope(method),
                        position,
                        depth_left - 1,
                    ));
                }
            }
        }
        result
    }

    /// Shape expected of variable `name` from its reads at or after `after`.
    pub fn var_type_from_usage(
        &mut self,
        scope_id: ScopeId,
        name: &str,
        after: u32,
        depth_left: u32,
    ) -> MultiType {
        if depth_left == 0 {
            return MultiType::empty();
        }
        let Some(scope) = self.program().scope(scope_id) else {
            return MultiType::empty();
        };
        let uses: Vec<(ExprId, bool)> = scope
            .occurrences(name)
            .iter()
            .filter(|o| o.offset >= after)
            .filter_map(|o| match o.kind {
                OccurrenceKind::Read => Some((o.expr, false)),
                OccurrenceKind::MemberName => Some((o.expr, true)),
                _ => None,
            })
            .collect();

        let mut result = MultiType::empty();
        for (expr, member) in uses {
            if member {
                result.extend(self.member_name_usage(expr));
            } else {
                result.extend(self.expr_type_from_usage(expr, depth_left));
                result.extend(self.index_key_usage(expr));
            }
        }
        result
    }

    /// `$obj->$var`: `$var` is one of the property names of `$obj`.
    fn member_name_usage(&mut self, property: ExprId) -> MultiType {
        let program = self.program();
        let Some(Expr::Property { refr, .. }) = program.expr(property).map(|e| e.as_ref()) else {
            return MultiType::empty();
        };
        let receiver = self.resolve(child_id(property, refr), CallCtxId::EMPTY);
        let mut names = receiver.key_names();
        for class in receiver.classes() {
            for entry in program.ancestry(&class) {
                for field in entry.decl.fields.iter().filter(|f| !f.modifiers.is_static) {
                    let field = field.name.text();
                    if !names.iter().any(|n| n == field) {
                        names.push(field.to_string());
                    }
                }
            }
        }
        let mut result = MultiType::empty();
        for name in names {
            result.push(Type::string(&name));
        }
        result
    }

    /// `$arr[$var]`: `$var` is one of the key names of `$arr`.
    fn index_key_usage(&mut self, read: ExprId) -> MultiType {
        let program = self.program();
        let Some(parent) = program.parent(read) else {
            return MultiType::empty();
        };
        let (ParentNode::Expr(pid), Role::Index) = (&parent.node, parent.role) else {
            return MultiType::empty();
        };
        let Some(Expr::Index { refr, .. }) = program.expr(*pid).map(|e| e.as_ref()) else {
            return MultiType::empty();
        };
        let base = self.resolve(child_id(*pid, refr), CallCtxId::EMPTY);
        let mut result = MultiType::empty();
        for name in base.key_names() {
            result.push(Type::string(&name));
        }
        result
    }

    /// Shape an array literal is expected to have: its usage, the left
    /// operand of a `+` it is the right operand of, the `@var` doc of the
    /// assignment it is stored by and the `@return` doc of the function it
    /// is returned from.
    pub fn expected_shape_of(&mut self, array: ExprId, depth_left: u32) -> MultiType {
        let mut result = self.expr_type_from_usage(array, depth_left);
        let program = self.program();
        let Some(parent) = program.parent(array).cloned() else {
            return result;
        };
        match (&parent.node, parent.role) {
            (ParentNode::Expr(pid), Role::Rhs) => match program.expr(*pid).map(|e| e.as_ref()) {
                Some(Expr::ArithExpr { op: ArithOp::Add, lhs, .. }) => {
                    result.extend(self.resolve(child_id(*pid, lhs), CallCtxId::EMPTY));
                }
                Some(Expr::Assign { op: AssignOp::Eq, lhs, .. }) => {
                    let doc = lhs.var_name().and_then(|name| {
                        program
                            .statement_doc(*pid)
                            .and_then(|d| docs::var_doc(d.text(), name))
                    });
                    if let Some(doc) = doc {
                        let this_class = self.this_class(*pid, CallCtxId::EMPTY);
                        result.extend(self.declared_types(&doc, this_class.as_deref()));
                    }
                }
                _ => (),
            },
            (ParentNode::Stmt(_) | ParentNode::ArrowBody(_), Role::Returned) => {
                let scope = program.scope_of(array);
                let doc = scope
                    .and_then(|s| s.func.as_ref())
                    .and_then(|f| f.doc.as_ref())
                    .and_then(|d| docs::return_doc(d.text()));
                if let Some(doc) = doc {
                    result.extend(self.declared_types(&doc, scope.and_then(|s| s.class_name())));
                }
            }
            _ => (),
        }
        result
    }
}
