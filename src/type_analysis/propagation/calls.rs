// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Function, method and constructor calls: user callees, callable values and
//! built-in return templates.

use crate::ast::{ClassRef, Expr, FunctionBody, FunctionDecl, Ref};
use crate::program::{ExprId, ScopeId};
use crate::type_analysis::builtins::{self, sql, BuiltinSpec, ReturnTemplate};
use crate::type_analysis::context::{ArgBinding, CallContext, CallCtxId, SearchSession};
use crate::type_analysis::docs::{self, DocType};
use crate::type_analysis::model::{KeyName, KeyValue, MultiType, ReturnThunk, Type, TypeKind};

use super::dispatch::child_id;

/// A user-defined function or method a call may reach.
#[derive(Debug, Clone)]
pub(crate) struct Callee {
    pub scope: ScopeId,
    pub decl: Ref<FunctionDecl>,
    /// Class bound to `$this` and `static` inside the callee.
    pub this_class: Option<String>,
}

/// Built-in entry matched by a call. `class` is the receiver class the entry
/// was found through.
#[derive(Debug, Clone)]
pub(crate) struct BuiltinMatch {
    pub spec: BuiltinSpec,
    pub class: Option<String>,
}

/// Everything one call expression may invoke.
#[derive(Debug, Default)]
pub(crate) struct CallTargets {
    pub callees: Vec<Callee>,
    pub builtins: Vec<BuiltinMatch>,
    /// Return thunks of a called closure or callable array.
    pub thunks: Vec<ReturnThunk>,
    /// Parameter scopes of a called closure or callable array.
    pub callable_scopes: Vec<ScopeId>,
    /// Classes instantiated by `new`.
    pub instantiated: Vec<String>,
    pub receiver: Option<MultiType>,
    pub args: Vec<ExprId>,
}

impl SearchSession<'_> {
    pub(crate) fn resolve_call(&mut self, id: ExprId, ctx: CallCtxId) -> MultiType {
        let targets = self.call_targets(id, ctx);
        let mut result = MultiType::empty();
        for class in &targets.instantiated {
            result.push(Type::object(class).with_definition(Some(id)));
        }

        let bindings: Vec<ArgBinding> = targets.args.iter().map(|a| ArgBinding::Expr(*a)).collect();
        // Constructors return nothing of interest.
        if targets.instantiated.is_empty() {
            for callee in &targets.callees {
                let call_ctx = self.new_call_context(CallContext {
                    call_site: Some(id),
                    caller: ctx,
                    args: bindings.clone(),
                    this_class: callee.this_class.clone(),
                    enclosing: None,
                });
                result.extend(self.function_return(callee, call_ctx));
            }
        }
        for thunk in &targets.thunks {
            result.extend(self.invoke_thunk(thunk, Some(id), ctx, bindings.clone()));
        }
        for builtin in &targets.builtins {
            if let Some(template) = builtin.spec.return_template().cloned() {
                result.extend(self.apply_return_template(
                    &template,
                    id,
                    builtin.class.as_deref(),
                    &targets,
                    ctx,
                ));
            }
        }
        result
    }

    /// Callees, built-ins and callable values reachable from a call.
    pub(crate) fn call_targets(&mut self, id: ExprId, ctx: CallCtxId) -> CallTargets {
        let mut targets = CallTargets::default();
        let Some(expr) = self.program().expr(id).cloned() else {
            return targets;
        };
        if let Some(args) = expr.call_args() {
            targets.args = args.iter().map(|a| child_id(id, a)).collect();
        }

        match expr.as_ref() {
            Expr::Call { fcn, .. } => match fcn.as_ref() {
                Expr::Name { span, .. } => self.function_targets(span.text(), &mut targets),
                _ => {
                    let callable = self.resolve(child_id(id, fcn), ctx);
                    targets.thunks = callable.return_thunks();
                    targets.callable_scopes = self.callable_scopes(&callable);
                    for name in callable.string_literals() {
                        match name.split_once("::") {
                            Some((class, method)) => {
                                self.method_targets(&[class.to_string()], method, None, &mut targets)
                            }
                            None => self.function_targets(&name, &mut targets),
                        }
                    }
                }
            },
            Expr::MethodCall { refr, name, .. } => {
                let receiver = self.resolve(child_id(id, refr), ctx);
                let classes = receiver.classes();
                self.method_targets(&classes, name.text(), None, &mut targets);
                if classes.is_empty() {
                    for spec in builtins::lookup_loose_method(name.text()) {
                        targets.builtins.push(BuiltinMatch { spec, class: None });
                    }
                }
                targets.receiver = Some(receiver);
            }
            Expr::StaticCall { class, name, .. } => {
                let classes = self.class_ref_names(id, class, ctx);
                let bound = match class {
                    ClassRef::Name(span)
                        if matches!(
                            span.text().to_ascii_lowercase().as_str(),
                            "self" | "static" | "parent"
                        ) =>
                    {
                        self.this_class(id, ctx)
                    }
                    _ => None,
                };
                self.method_targets(&classes, name.text(), bound, &mut targets);
            }
            Expr::New { class, .. } => {
                let classes = self.class_ref_names(id, class, ctx);
                self.method_targets(&classes, "__construct", None, &mut targets);
                targets.instantiated = classes;
            }
            _ => (),
        }
        targets
    }

    fn function_targets(&self, name: &str, targets: &mut CallTargets) {
        if let Some(entry) = self.program().function(name) {
            targets.callees.push(Callee {
                scope: entry.scope(),
                decl: entry.decl.clone(),
                this_class: None,
            });
        }
        if let Some(spec) = builtins::lookup_function(name) {
            targets.builtins.push(BuiltinMatch { spec, class: None });
        }
    }

    /// User methods found through each class's ancestry, and the first
    /// built-in entry along its lineage.
    fn method_targets(
        &self,
        classes: &[String],
        method: &str,
        bound: Option<String>,
        targets: &mut CallTargets,
    ) {
        let program = self.program();
        for class in classes {
            if let Some((entry, decl)) = program.find_method(class, method) {
                targets.callees.push(Callee {
                    scope: entry.method_scope(decl),
                    decl: decl.clone(),
                    this_class: Some(bound.clone().unwrap_or_else(|| class.clone())),
                });
            }
            let builtin = program
                .lineage(class)
                .iter()
                .find_map(|name| builtins::lookup_method(name, method));
            if let Some(spec) = builtin {
                targets.builtins.push(BuiltinMatch {
                    spec,
                    class: Some(class.clone()),
                });
            }
        }
    }

    /// Class bound to `$this` for expressions resolved under `ctx`.
    pub(crate) fn this_class(&self, id: ExprId, ctx: CallCtxId) -> Option<String> {
        self.call_context(ctx).this_class.clone().or_else(|| {
            self.program()
                .scope_of(id)
                .and_then(|s| s.class_name())
                .map(str::to_string)
        })
    }

    /// Classes named by `self`, `static`, `parent` or a plain name.
    pub(crate) fn class_names_of(&self, id: ExprId, name: &str, ctx: CallCtxId) -> Vec<String> {
        let program = self.program();
        let lexical = || program.scope_of(id).and_then(|s| s.class_name());
        match name.to_ascii_lowercase().as_str() {
            "self" => lexical().map(str::to_string).into_iter().collect(),
            "static" => self.this_class(id, ctx).into_iter().collect(),
            "parent" => lexical()
                .and_then(|c| program.class(c))
                .and_then(|c| c.decl.parent.as_ref())
                .map(|p| p.text().trim_start_matches('\\').to_string())
                .into_iter()
                .collect(),
            _ => vec![name.trim_start_matches('\\').to_string()],
        }
    }

    pub(crate) fn class_ref_names(&mut self, id: ExprId, class: &ClassRef, ctx: CallCtxId) -> Vec<String> {
        match class {
            ClassRef::Name(span) => self.class_names_of(id, span.text(), ctx),
            ClassRef::Expr(expr) => {
                let types = self.resolve(child_id(id, expr), ctx);
                let mut names = types.classes();
                for name in types.string_literals() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
        }
    }

    /// Return types of a user function: declared doc and hint types, then the
    /// `return` expressions of its body, or of every implementation when
    /// the method is abstract.
    pub(crate) fn function_return(&mut self, callee: &Callee, ctx: CallCtxId) -> MultiType {
        let decl = callee.decl.clone();
        let this_class = callee.this_class.as_deref();
        let mut result = MultiType::empty();
        if let Some(doc) = decl.doc.as_ref().and_then(|d| docs::return_doc(d.text())) {
            result.extend(self.declared_types(&doc, this_class));
        }
        if let Some(hint) = &decl.return_hint {
            result.extend(hint_types(hint.text(), this_class));
        }

        if matches!(decl.body, FunctionBody::None) {
            result.extend(self.implementations_return(callee, ctx));
            return result;
        }
        let returns = self
            .program()
            .scope(callee.scope)
            .map(|s| s.returns.clone())
            .unwrap_or_default();
        for ret in returns {
            result.extend(self.resolve(ret, ctx));
        }
        result
    }

    fn implementations_return(&mut self, callee: &Callee, ctx: CallCtxId) -> MultiType {
        let program = self.program();
        let Some(class) = program.scope(callee.scope).and_then(|s| s.class_name()) else {
            return MultiType::empty();
        };
        let implementations: Vec<Callee> = program
            .implementations(class, callee.decl.name())
            .into_iter()
            .map(|(entry, method)| Callee {
                scope: entry.method_scope(method),
                decl: method.clone(),
                this_class: Some(entry.name().to_string()),
            })
            .collect();
        log::trace!(
            "{} implementations of {class}::{}",
            implementations.len(),
            callee.decl.name()
        );

        let mut result = MultiType::empty();
        for implementation in implementations {
            let impl_ctx = if self.options().pass_args_to_implementations {
                let mut context = self.call_context(ctx).clone();
                context.this_class = implementation.this_class.clone();
                self.new_call_context(context)
            } else {
                CallCtxId::EMPTY
            };
            result.extend(self.function_return(&implementation, impl_ctx));
        }
        result
    }

    /// Types of a doc tag, with `self`, `static` and `$this` bound to
    /// `this_class`.
    pub(crate) fn declared_types(&self, doc: &DocType, this_class: Option<&str>) -> MultiType {
        let mut result = docs::doc_types(doc);
        for alt in &doc.alternatives {
            if is_self_reference(alt) {
                if let Some(class) = this_class {
                    result.push(Type::object(class));
                }
            }
        }
        result
    }

    fn apply_return_template(
        &mut self,
        template: &ReturnTemplate,
        id: ExprId,
        class: Option<&str>,
        targets: &CallTargets,
        ctx: CallCtxId,
    ) -> MultiType {
        let arg = |index: &u8| targets.args.get(usize::from(*index)).copied();
        match template {
            ReturnTemplate::MergeArgs => {
                let mut result = MultiType::empty();
                for arg in &targets.args {
                    result.extend(self.resolve(*arg, ctx));
                }
                result
            }
            ReturnTemplate::Schema(name) => builtins::schema(name)
                .map(|s| s.to_types())
                .unwrap_or_default(),
            ReturnTemplate::SqlStatement { class, arg: index }
            | ReturnTemplate::SqlResult { class, arg: index } => {
                let Some(sql_id) = arg(index) else {
                    return MultiType::of(Type::object(class).with_definition(Some(id)));
                };
                let mut statement = Type::object(class).with_definition(Some(id));
                for text in self.resolve(sql_id, ctx).string_literals() {
                    if let Some(row) = self.sql_row(&text, sql_id) {
                        statement.fetch_rows.push(row);
                    }
                    for var in sql::bind_vars(&text) {
                        if !statement.bind_vars.contains(&var) {
                            statement.bind_vars.push(var);
                        }
                    }
                }
                let rows = statement.fetch_rows.clone();
                let mut result = MultiType::of(statement);
                if matches!(template, ReturnTemplate::SqlResult { .. }) {
                    result.extend(list_of(id, rows));
                }
                result
            }
            ReturnTemplate::FetchRow => self.fetched_rows(targets, ctx),
            ReturnTemplate::FetchAll => {
                let rows = self.fetched_rows(targets, ctx);
                list_of(id, rows)
            }
            ReturnTemplate::ModelRows => {
                let Some(class) = class else {
                    return MultiType::empty();
                };
                let mut elements = MultiType::of(Type::object(class));
                if let Some(row) = self.model_row(class) {
                    elements.push(row);
                }
                list_of(id, elements)
            }
            ReturnTemplate::MapCallback { callback, array } => {
                let (Some(callback), Some(array)) = (arg(callback), arg(array)) else {
                    return MultiType::empty();
                };
                let callable = self.resolve(callback, ctx);
                let array = self.resolve(array, ctx);
                let elements = array.all_values(self);
                let mut results = MultiType::empty();
                for thunk in callable.return_thunks() {
                    results.extend(self.invoke_thunk(
                        &thunk,
                        Some(id),
                        ctx,
                        vec![ArgBinding::Resolved(elements.clone())],
                    ));
                }
                list_of(id, results)
            }
            ReturnTemplate::SameAsArgument(index) => match arg(index) {
                Some(arg) => self.resolve(arg, ctx),
                None => MultiType::empty(),
            },
            ReturnTemplate::CollectionElement(index) => match arg(index) {
                Some(arg) => self.resolve(arg, ctx).all_values(self),
                None => MultiType::empty(),
            },
            ReturnTemplate::ValuesOf(index) => {
                let values = match arg(index) {
                    Some(arg) => self.resolve(arg, ctx).all_values(self),
                    None => MultiType::empty(),
                };
                list_of(id, values)
            }
            ReturnTemplate::KeysOf(index) => {
                let mut keys = MultiType::empty();
                if let Some(arg) = arg(index) {
                    let source = self.resolve(arg, ctx);
                    for name in source.key_names() {
                        keys.push(Type::string(&name));
                    }
                    if source.has_element_types() {
                        keys.push(Type::new(TypeKind::Int));
                    }
                }
                list_of(id, keys)
            }
            ReturnTemplate::ListOfArgument(index) => {
                let element = match arg(index) {
                    Some(arg) => self.resolve(arg, ctx),
                    None => MultiType::empty(),
                };
                list_of(id, element)
            }
            ReturnTemplate::Int => MultiType::of(Type::new(TypeKind::Int)),
            ReturnTemplate::String => MultiType::of(Type::new(TypeKind::String)),
            ReturnTemplate::Bool => MultiType::of(Type::new(TypeKind::Bool)),
            ReturnTemplate::Float => MultiType::of(Type::new(TypeKind::Float)),
            ReturnTemplate::Array => MultiType::of(Type::array()),
            ReturnTemplate::Mixed => MultiType::of(Type::new(TypeKind::Mixed)),
            ReturnTemplate::Object(class) => MultiType::of(Type::object(class)),
        }
    }

    /// Rows attached to the receiver, or to the first argument of the
    /// procedural `mysqli_fetch_*` functions.
    fn fetched_rows(&mut self, targets: &CallTargets, ctx: CallCtxId) -> MultiType {
        let source = match (&targets.receiver, targets.args.first()) {
            (Some(receiver), _) => receiver.clone(),
            (None, Some(first)) => self.resolve(*first, ctx),
            (None, None) => MultiType::empty(),
        };
        source.fetch_rows()
    }

    /// Row selected by SQL text; `SELECT *` takes the configured columns of
    /// the table.
    fn sql_row(&self, text: &str, definition: ExprId) -> Option<Type> {
        let selection = sql::parse_select(text)?;
        let mut columns = selection.columns;
        if selection.star {
            let configured = selection
                .table
                .as_ref()
                .and_then(|t| self.options().table_columns.get(t));
            for column in configured.into_iter().flatten() {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut row = Type::array().with_definition(Some(definition));
        for column in columns {
            row.add_key(
                KeyName::Named(column),
                KeyValue::Ready(MultiType::of(Type::new(TypeKind::String))),
                Some(definition),
            );
        }
        Some(row)
    }
}

fn is_self_reference(name: &str) -> bool {
    matches!(
        name.trim().trim_start_matches('?').to_ascii_lowercase().as_str(),
        "self" | "static" | "$this"
    )
}

/// Types named by a declared hint such as `?array` or `int|string`.
pub(crate) fn hint_types(hint: &str, this_class: Option<&str>) -> MultiType {
    let mut result = MultiType::empty();
    for alt in hint.split('|') {
        if is_self_reference(alt) {
            if let Some(class) = this_class {
                result.push(Type::object(class));
            }
        } else if let Some(kind) = TypeKind::from_hint(alt) {
            result.push(Type::new(kind));
        }
    }
    result
}

fn list_of(id: ExprId, elements: MultiType) -> MultiType {
    let mut list = Type::array().with_definition(Some(id));
    list.element_types = elements;
    MultiType::of(list)
}
