// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Program index: expression ids, parent links, variable scopes and
//! declaration tables built once from the parsed modules.

use alloc::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::ast::*;
use crate::lexer::{Source, Span};
use crate::lookup::Lookup;
use crate::parser::Parser;

/// Identifies an expression by module index and per-module expression index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId {
    pub module: u32,
    pub eidx: u32,
}

/// A variable scope: module top level (`func == None`) or a function,
/// method or closure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId {
    pub module: u32,
    pub func: Option<u32>,
}

/// Position of an expression relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receiver of `[]`, `->` or `::`.
    Base,
    Index,
    Arg(usize),
    Callee,
    Lhs,
    Rhs,
    ArrayKey,
    ArrayValue,
    Operand,
    Condition,
    Then,
    Otherwise,
    Collection,
    LoopKey,
    LoopValue,
    Default,
    Returned,
    Statement,
}

#[derive(Debug, Clone)]
pub enum ParentNode {
    Expr(ExprId),
    Stmt(Ref<Stmt>),
    /// Default value of a parameter.
    Param { scope: ScopeId, index: usize },
    /// Default value of a property.
    Field,
    /// Value of a class constant.
    Const,
    /// Body of an arrow function.
    ArrowBody(ScopeId),
}

#[derive(Debug, Clone)]
pub struct Parent {
    pub node: ParentNode,
    pub role: Role,
}

/// One step from a container to a destructured or iterated variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `['k' => $v] = ...`
    Key(ExprId),
    /// `[$a, $b] = ...`
    Position(usize),
    /// `foreach ($c as $v)`
    Element,
    /// `foreach ($c as $k => ...)`
    KeyOf,
}

#[derive(Debug, Clone)]
pub enum OccurrenceKind {
    Read,
    /// `$obj->$v`: the variable names a member of `expr`'s receiver.
    MemberName,
    /// `$v = value`, or `$v['a'][] = value` with a non empty `path`.
    Assign {
        assign: ExprId,
        value: ExprId,
        path: Vec<Option<ExprId>>,
    },
    /// Destructuring and foreach bindings.
    Extract { source: ExprId, steps: Vec<Step> },
}

#[derive(Debug, Clone)]
pub struct VarOccurrence {
    pub expr: ExprId,
    /// Offset from which the occurrence is visible.
    pub offset: u32,
    pub kind: OccurrenceKind,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub func: Option<Ref<FunctionDecl>>,
    pub class: Option<Ref<ClassDecl>>,
    /// Scope enclosing a closure.
    pub parent: Option<ScopeId>,
    /// Closure expression owning this scope.
    pub closure: Option<ExprId>,
    pub vars: BTreeMap<String, Vec<VarOccurrence>>,
    pub returns: Vec<ExprId>,
}

impl Scope {
    pub fn occurrences(&self, name: &str) -> &[VarOccurrence] {
        self.vars.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.func.as_ref().and_then(|f| f.param_index(name))
    }

    /// Whether a read of `name` in this closure refers to the enclosing scope.
    pub fn captures(&self, name: &str) -> bool {
        match (&self.func, self.closure) {
            (Some(func), Some(_)) => {
                func.is_arrow() || func.uses.iter().any(|u| u.text() == name)
            }
            _ => false,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.name.text())
    }
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub module: u32,
    pub decl: Ref<FunctionDecl>,
}

impl FunctionEntry {
    pub fn scope(&self) -> ScopeId {
        ScopeId {
            module: self.module,
            func: Some(self.decl.fidx),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub module: u32,
    pub decl: Ref<ClassDecl>,
}

impl ClassEntry {
    pub fn name(&self) -> &str {
        self.decl.name.text()
    }

    pub fn method_scope(&self, method: &FunctionDecl) -> ScopeId {
        ScopeId {
            module: self.module,
            func: Some(method.fidx),
        }
    }
}

/// `$this->field = value` or `$obj->field['k'] = value`.
#[derive(Debug, Clone)]
pub struct FieldAssignment {
    /// Class of the receiver when it is `$this`, `self` or `static`.
    pub class: Option<String>,
    pub assign: ExprId,
    pub value: ExprId,
    pub path: Vec<Option<ExprId>>,
}

/// Lowercased name without namespace qualifier.
pub fn short_name(name: &str) -> String {
    name.rsplit('\\').next().unwrap_or(name).to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub struct Program {
    modules: Vec<Ref<Module>>,
    exprs: Lookup<Ref<Expr>>,
    parents: Lookup<Parent>,
    expr_scopes: Lookup<ScopeId>,
    statement_docs: Lookup<Span>,
    scopes: BTreeMap<ScopeId, Scope>,
    functions: BTreeMap<String, FunctionEntry>,
    classes: BTreeMap<String, ClassEntry>,
    subclasses: BTreeMap<String, Vec<String>>,
    field_assignments: BTreeMap<String, Vec<FieldAssignment>>,
    call_sites: BTreeMap<String, Vec<ExprId>>,
    instantiations: BTreeMap<String, Vec<ExprId>>,
}

#[derive(Clone, Copy)]
struct Walk {
    module: u32,
    scope: ScopeId,
}

impl Walk {
    fn id(&self, expr: &Expr) -> ExprId {
        ExprId {
            module: self.module,
            eidx: expr.eidx(),
        }
    }
}

impl Program {
    pub fn from_sources(sources: &[Source]) -> Result<Program> {
        let mut modules = Vec::with_capacity(sources.len());
        for source in sources {
            let mut parser = Parser::new(source)?;
            modules.push(Ref::new(parser.parse()?));
        }
        Self::from_modules(modules)
    }

    pub fn from_modules(modules: Vec<Ref<Module>>) -> Result<Program> {
        let mut program = Program::default();
        for (idx, module) in modules.iter().enumerate() {
            let module_idx = u32::try_from(idx).map_err(|_| anyhow!("too many modules"))?;
            program.exprs.push_module(module.num_expressions);
            program.parents.push_module(module.num_expressions);
            program.expr_scopes.push_module(module.num_expressions);
            program.statement_docs.push_module(module.num_expressions);

            let scope = ScopeId {
                module: module_idx,
                func: None,
            };
            program.open_scope(scope, None, None, None, None);
            let walk = Walk {
                module: module_idx,
                scope,
            };
            program.walk_stmts(&module.stmts, &walk)?;
        }
        program.modules = modules;

        for (name, class) in &program.classes {
            if let Some(parent) = &class.decl.parent {
                program
                    .subclasses
                    .entry(short_name(parent.text()))
                    .or_default()
                    .push(name.clone());
            }
            for iface in &class.decl.interfaces {
                program
                    .subclasses
                    .entry(short_name(iface.text()))
                    .or_default()
                    .push(name.clone());
            }
        }

        log::debug!(
            "indexed {} modules, {} scopes, {} classes, {} functions",
            program.modules.len(),
            program.scopes.len(),
            program.classes.len(),
            program.functions.len()
        );
        Ok(program)
    }

    fn open_scope(
        &mut self,
        id: ScopeId,
        func: Option<Ref<FunctionDecl>>,
        class: Option<Ref<ClassDecl>>,
        parent: Option<ScopeId>,
        closure: Option<ExprId>,
    ) {
        self.scopes.insert(
            id,
            Scope {
                id,
                func,
                class,
                parent,
                closure,
                vars: BTreeMap::new(),
                returns: vec![],
            },
        );
    }

    fn add_occurrence(&mut self, scope: ScopeId, name: &str, occurrence: VarOccurrence) {
        if let Some(scope) = self.scopes.get_mut(&scope) {
            scope
                .vars
                .entry(name.to_string())
                .or_default()
                .push(occurrence);
        }
    }

    fn walk_stmts(&mut self, stmts: &[Ref<Stmt>], w: &Walk) -> Result<()> {
        for stmt in stmts {
            self.walk_stmt(stmt, w)?;
        }
        Ok(())
    }

    fn walk_stmt(&mut self, stmt: &Ref<Stmt>, w: &Walk) -> Result<()> {
        let parent = |role| {
            Some(Parent {
                node: ParentNode::Stmt(stmt.clone()),
                role,
            })
        };
        match stmt.as_ref() {
            Stmt::Expr { expr, doc, .. } => {
                self.walk_expr(expr, parent(Role::Statement), w)?;
                if let Some(doc) = doc {
                    self.statement_docs.set(w.id(expr), doc.clone())?;
                }
            }
            Stmt::Echo { exprs, .. } => {
                for expr in exprs {
                    self.walk_expr(expr, parent(Role::Statement), w)?;
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, parent(Role::Returned), w)?;
                    let id = w.id(value);
                    if let Some(scope) = self.scopes.get_mut(&w.scope) {
                        scope.returns.push(id);
                    }
                }
            }
            Stmt::Block { stmts, .. } => self.walk_stmts(stmts, w)?,
            Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.walk_expr(cond, parent(Role::Condition), w)?;
                self.walk_stmts(then, w)?;
                self.walk_stmts(otherwise, w)?;
            }
            Stmt::While { cond, body, .. } => {
                self.walk_expr(cond, parent(Role::Condition), w)?;
                self.walk_stmts(body, w)?;
            }
            Stmt::Foreach {
                collection,
                key,
                value,
                body,
                ..
            } => {
                self.walk_expr(collection, parent(Role::Collection), w)?;
                let source = w.id(collection);
                if let Some(key) = key {
                    self.walk_expr(key, parent(Role::LoopKey), w)?;
                    if let Expr::Var { name, span, .. } = key.as_ref() {
                        self.add_occurrence(
                            w.scope,
                            name.text(),
                            VarOccurrence {
                                expr: w.id(key),
                                offset: span.start,
                                kind: OccurrenceKind::Extract {
                                    source,
                                    steps: vec![Step::KeyOf],
                                },
                            },
                        );
                    }
                }
                self.walk_expr(value, parent(Role::LoopValue), w)?;
                let offset = value.span().start;
                match value.as_ref() {
                    Expr::Var { name, .. } => self.add_occurrence(
                        w.scope,
                        name.text(),
                        VarOccurrence {
                            expr: w.id(value),
                            offset,
                            kind: OccurrenceKind::Extract {
                                source,
                                steps: vec![Step::Element],
                            },
                        },
                    ),
                    Expr::Array { items, .. } => {
                        self.destructure(items, source, vec![Step::Element], offset, w)
                    }
                    _ => (),
                }
                self.walk_stmts(body, w)?;
            }
            Stmt::Function(func) => {
                self.walk_function(func, None, None, w)?;
                self.functions
                    .entry(short_name(func.name()))
                    .or_insert_with(|| FunctionEntry {
                        module: w.module,
                        decl: func.clone(),
                    });
            }
            Stmt::Class(class) => self.walk_class(class, w)?,
            Stmt::Nop { .. } => (),
        }
        Ok(())
    }

    fn walk_class(&mut self, class: &Ref<ClassDecl>, w: &Walk) -> Result<()> {
        let key = short_name(class.name.text());
        if self.classes.contains_key(&key) {
            log::debug!("duplicate declaration of class {key}, keeping the first");
        } else {
            self.classes.insert(
                key,
                ClassEntry {
                    module: w.module,
                    decl: class.clone(),
                },
            );
        }
        for field in &class.fields {
            if let Some(default) = &field.default {
                let parent = Parent {
                    node: ParentNode::Field,
                    role: Role::Default,
                };
                self.walk_expr(default, Some(parent), w)?;
            }
        }
        for constant in &class.consts {
            let parent = Parent {
                node: ParentNode::Const,
                role: Role::Default,
            };
            self.walk_expr(&constant.value, Some(parent), w)?;
        }
        for method in &class.methods {
            self.walk_function(method, None, Some(class.clone()), w)?;
        }
        Ok(())
    }

    fn walk_function(
        &mut self,
        func: &Ref<FunctionDecl>,
        closure: Option<ExprId>,
        class: Option<Ref<ClassDecl>>,
        w: &Walk,
    ) -> Result<()> {
        let scope = ScopeId {
            module: w.module,
            func: Some(func.fidx),
        };
        // Closures see the class of the method they are written in.
        let class = match (class, closure) {
            (Some(class), _) => Some(class),
            (None, Some(_)) => self.scopes.get(&w.scope).and_then(|s| s.class.clone()),
            (None, None) => None,
        };
        self.open_scope(
            scope,
            Some(func.clone()),
            class,
            closure.map(|_| w.scope),
            closure,
        );
        let inner = Walk {
            module: w.module,
            scope,
        };

        for (index, param) in func.params.iter().enumerate() {
            if let Some(default) = &param.default {
                let parent = Parent {
                    node: ParentNode::Param { scope, index },
                    role: Role::Default,
                };
                self.walk_expr(default, Some(parent), &inner)?;
            }
        }

        match &func.body {
            FunctionBody::Block(stmts) => self.walk_stmts(stmts, &inner)?,
            FunctionBody::Arrow(expr) => {
                let parent = Parent {
                    node: ParentNode::ArrowBody(scope),
                    role: Role::Returned,
                };
                self.walk_expr(expr, Some(parent), &inner)?;
                let id = inner.id(expr);
                if let Some(scope) = self.scopes.get_mut(&scope) {
                    scope.returns.push(id);
                }
            }
            FunctionBody::None => (),
        }
        Ok(())
    }

    fn walk_class_ref(&mut self, class: &ClassRef, id: ExprId, w: &Walk) -> Result<()> {
        if let ClassRef::Expr(expr) = class {
            let parent = Parent {
                node: ParentNode::Expr(id),
                role: Role::Base,
            };
            self.walk_expr(expr, Some(parent), w)?;
        }
        Ok(())
    }

    fn walk_args(&mut self, args: &[Ref<Expr>], id: ExprId, w: &Walk) -> Result<()> {
        for (idx, arg) in args.iter().enumerate() {
            let parent = Parent {
                node: ParentNode::Expr(id),
                role: Role::Arg(idx),
            };
            self.walk_expr(arg, Some(parent), w)?;
        }
        Ok(())
    }

    fn walk_expr(&mut self, expr: &Ref<Expr>, parent: Option<Parent>, w: &Walk) -> Result<()> {
        let id = w.id(expr);
        self.exprs.set(id, expr.clone())?;
        self.expr_scopes.set(id, w.scope)?;
        if let Some(parent) = parent {
            self.parents.set(id, parent)?;
        }
        let child = move |role| {
            Some(Parent {
                node: ParentNode::Expr(id),
                role,
            })
        };

        match expr.as_ref() {
            Expr::String { .. }
            | Expr::Number { .. }
            | Expr::Bool { .. }
            | Expr::Null { .. }
            | Expr::Name { .. } => (),
            Expr::Var { name, span, .. } => self.add_occurrence(
                w.scope,
                name.text(),
                VarOccurrence {
                    expr: id,
                    offset: span.start,
                    kind: OccurrenceKind::Read,
                },
            ),
            Expr::Array { items, .. } => {
                for item in items {
                    if let Some(key) = &item.key {
                        self.walk_expr(key, child(Role::ArrayKey), w)?;
                    }
                    self.walk_expr(&item.value, child(Role::ArrayValue), w)?;
                }
            }
            Expr::Index { refr, index, .. } => {
                self.walk_expr(refr, child(Role::Base), w)?;
                if let Some(index) = index {
                    self.walk_expr(index, child(Role::Index), w)?;
                }
            }
            Expr::Property { refr, name, .. } => {
                self.walk_expr(refr, child(Role::Base), w)?;
                if let Some(var) = name.text().strip_prefix('$') {
                    self.add_occurrence(
                        w.scope,
                        var,
                        VarOccurrence {
                            expr: id,
                            offset: name.start,
                            kind: OccurrenceKind::MemberName,
                        },
                    );
                }
            }
            Expr::StaticProperty { class, .. } | Expr::ClassConst { class, .. } => {
                self.walk_class_ref(class, id, w)?
            }
            Expr::MethodCall {
                refr, name, args, ..
            } => {
                self.walk_expr(refr, child(Role::Base), w)?;
                self.walk_args(args, id, w)?;
                self.call_sites
                    .entry(name.text().to_ascii_lowercase())
                    .or_default()
                    .push(id);
            }
            Expr::StaticCall {
                class, name, args, ..
            } => {
                self.walk_class_ref(class, id, w)?;
                self.walk_args(args, id, w)?;
                self.call_sites
                    .entry(name.text().to_ascii_lowercase())
                    .or_default()
                    .push(id);
            }
            Expr::Call { fcn, args, .. } => {
                self.walk_expr(fcn, child(Role::Callee), w)?;
                self.walk_args(args, id, w)?;
                if let Expr::Name { span, .. } = fcn.as_ref() {
                    self.call_sites
                        .entry(short_name(span.text()))
                        .or_default()
                        .push(id);
                }
            }
            Expr::New { class, args, .. } => {
                self.walk_class_ref(class, id, w)?;
                self.walk_args(args, id, w)?;
                if let ClassRef::Name(span) = class {
                    self.instantiations
                        .entry(short_name(span.text()))
                        .or_default()
                        .push(id);
                }
            }
            Expr::Closure { func, .. } => self.walk_function(func, Some(id), None, w)?,
            Expr::Assign { lhs, rhs, span, .. } => {
                self.walk_expr(lhs, child(Role::Lhs), w)?;
                self.walk_expr(rhs, child(Role::Rhs), w)?;
                self.record_assignment(id, span.end, lhs, rhs, w);
            }
            Expr::ArithExpr { lhs, rhs, .. }
            | Expr::BoolExpr { lhs, rhs, .. }
            | Expr::Coalesce { lhs, rhs, .. } => {
                self.walk_expr(lhs, child(Role::Lhs), w)?;
                self.walk_expr(rhs, child(Role::Rhs), w)?;
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.walk_expr(cond, child(Role::Condition), w)?;
                if let Some(then) = then {
                    self.walk_expr(then, child(Role::Then), w)?;
                }
                self.walk_expr(otherwise, child(Role::Otherwise), w)?;
            }
            Expr::Unary { expr, .. } | Expr::Cast { expr, .. } => {
                self.walk_expr(expr, child(Role::Operand), w)?
            }
            Expr::InstanceOf { expr, class, .. } => {
                self.walk_expr(expr, child(Role::Operand), w)?;
                self.walk_class_ref(class, id, w)?;
            }
        }
        Ok(())
    }

    fn record_assignment(
        &mut self,
        assign: ExprId,
        offset: u32,
        lhs: &Ref<Expr>,
        rhs: &Ref<Expr>,
        w: &Walk,
    ) {
        let value = w.id(rhs);
        let mut path = vec![];
        let mut target = lhs.clone();
        while let Expr::Index { refr, index, .. } = target.as_ref() {
            path.push(index.as_ref().map(|i| w.id(i)));
            let next = refr.clone();
            target = next;
        }
        path.reverse();

        match target.as_ref() {
            Expr::Var { name, .. } => self.add_occurrence(
                w.scope,
                name.text(),
                VarOccurrence {
                    expr: w.id(&target),
                    offset,
                    kind: OccurrenceKind::Assign {
                        assign,
                        value,
                        path,
                    },
                },
            ),
            Expr::Property { refr, name, .. } => {
                let class = match refr.var_name() {
                    Some("this") => self
                        .scopes
                        .get(&w.scope)
                        .and_then(|s| s.class_name())
                        .map(short_name),
                    _ => None,
                };
                self.push_field_assignment(name.text(), class, assign, value, path);
            }
            Expr::StaticProperty { class, name, .. } => {
                let class = match class {
                    ClassRef::Name(span) => match span.text().to_ascii_lowercase().as_str() {
                        "self" | "static" => self
                            .scopes
                            .get(&w.scope)
                            .and_then(|s| s.class_name())
                            .map(short_name),
                        other => Some(short_name(other)),
                    },
                    ClassRef::Expr(_) => None,
                };
                self.push_field_assignment(name.text(), class, assign, value, path);
            }
            Expr::Array { items, .. } if path.is_empty() => {
                self.destructure(items, value, vec![], offset, w)
            }
            _ => (),
        }
    }

    fn push_field_assignment(
        &mut self,
        field: &str,
        class: Option<String>,
        assign: ExprId,
        value: ExprId,
        path: Vec<Option<ExprId>>,
    ) {
        self.field_assignments
            .entry(field.to_string())
            .or_default()
            .push(FieldAssignment {
                class,
                assign,
                value,
                path,
            });
    }

    fn destructure(
        &mut self,
        items: &[ArrayItem],
        source: ExprId,
        steps: Vec<Step>,
        offset: u32,
        w: &Walk,
    ) {
        for (pos, item) in items.iter().enumerate() {
            let mut steps = steps.clone();
            steps.push(match &item.key {
                Some(key) => Step::Key(w.id(key)),
                None => Step::Position(pos),
            });
            match item.value.as_ref() {
                Expr::Var { name, .. } => self.add_occurrence(
                    w.scope,
                    name.text(),
                    VarOccurrence {
                        expr: w.id(&item.value),
                        offset,
                        kind: OccurrenceKind::Extract { source, steps },
                    },
                ),
                Expr::Array { items, .. } => self.destructure(items, source, steps, offset, w),
                _ => (),
            }
        }
    }

    pub fn modules(&self) -> &[Ref<Module>] {
        &self.modules
    }

    pub fn source(&self, module: u32) -> Option<&Source> {
        self.modules.get(module as usize).map(|m| &m.source)
    }

    pub fn module_of_file(&self, file: &str) -> Option<u32> {
        self.modules
            .iter()
            .position(|m| m.source.file() == file)
            .and_then(|idx| u32::try_from(idx).ok())
    }

    pub fn expr(&self, id: ExprId) -> Option<&Ref<Expr>> {
        self.exprs.get(id)
    }

    pub fn parent(&self, id: ExprId) -> Option<&Parent> {
        self.parents.get(id)
    }

    pub fn statement_doc(&self, id: ExprId) -> Option<&Span> {
        self.statement_docs.get(id)
    }

    pub fn scope_id_of(&self, id: ExprId) -> Option<ScopeId> {
        self.expr_scopes.get(id).copied()
    }

    pub fn scope_of(&self, id: ExprId) -> Option<&Scope> {
        self.scope_id_of(id).and_then(|s| self.scopes.get(&s))
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(&short_name(name))
    }

    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(&short_name(name))
    }

    /// Parent class entry, if declared in the program.
    pub fn parent_class(&self, class: &ClassEntry) -> Option<&ClassEntry> {
        class.decl.parent.as_ref().and_then(|p| self.class(p.text()))
    }

    /// Class and its declared ancestors, nearest first.
    pub fn ancestry(&self, name: &str) -> Vec<&ClassEntry> {
        let mut chain: Vec<&ClassEntry> = vec![];
        let mut current = self.class(name);
        while let Some(class) = current {
            if chain.iter().any(|c| c.decl == class.decl) {
                break;
            }
            chain.push(class);
            current = self.parent_class(class);
        }
        chain
    }

    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let ancestor = short_name(ancestor);
        if short_name(class) == ancestor {
            return true;
        }
        let mut pending = vec![short_name(class)];
        let mut seen = alloc::collections::BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(entry) = self.classes.get(&name) else {
                continue;
            };
            let supers = entry.decl.parent.iter().chain(entry.decl.interfaces.iter());
            for sup in supers {
                let sup = short_name(sup.text());
                if sup == ancestor {
                    return true;
                }
                pending.push(sup);
            }
        }
        false
    }

    /// Class name followed by every ancestor and interface name reachable
    /// from it, including names not declared in the program.
    pub fn lineage(&self, name: &str) -> Vec<String> {
        let mut names = vec![name.trim_start_matches('\\').to_string()];
        let mut pending = vec![short_name(name)];
        let mut seen = alloc::collections::BTreeSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.classes.get(&current) else {
                continue;
            };
            for sup in entry.decl.parent.iter().chain(entry.decl.interfaces.iter()) {
                let text = sup.text().trim_start_matches('\\');
                if !names.iter().any(|n| n.eq_ignore_ascii_case(text)) {
                    names.push(text.to_string());
                }
                pending.push(short_name(text));
            }
        }
        names
    }

    pub fn find_method(&self, class: &str, method: &str) -> Option<(&ClassEntry, &Ref<FunctionDecl>)> {
        self.ancestry(class)
            .into_iter()
            .find_map(|c| c.decl.method(method).map(|m| (c, m)))
    }

    pub fn find_field(&self, class: &str, field: &str) -> Option<(&ClassEntry, &Ref<FieldDecl>)> {
        self.ancestry(class)
            .into_iter()
            .find_map(|c| c.decl.field(field).map(|f| (c, f)))
    }

    pub fn find_const(&self, class: &str, name: &str) -> Option<(&ClassEntry, &Ref<ConstDecl>)> {
        self.ancestry(class).into_iter().find_map(|c| {
            c.decl
                .consts
                .iter()
                .find(|k| k.name.text() == name)
                .map(|k| (c, k))
        })
    }

    /// Implementations of `method` in classes deriving from `class`.
    pub fn implementations(&self, class: &str, method: &str) -> Vec<(&ClassEntry, &Ref<FunctionDecl>)> {
        let mut found = vec![];
        let mut pending = vec![short_name(class)];
        let mut seen = alloc::collections::BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            for sub in self.subclasses.get(&name).into_iter().flatten() {
                if let Some(entry) = self.classes.get(sub) {
                    if let Some(m) = entry.decl.method(method) {
                        if !matches!(m.body, FunctionBody::None) {
                            found.push((entry, m));
                        }
                    }
                }
                pending.push(sub.clone());
            }
        }
        found
    }

    pub fn field_assignments(&self, field: &str) -> &[FieldAssignment] {
        self.field_assignments
            .get(field)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Calls of functions or methods with the given name.
    pub fn call_sites(&self, name: &str) -> &[ExprId] {
        self.call_sites
            .get(&short_name(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn instantiations(&self, class: &str) -> &[ExprId] {
        self.instantiations
            .get(&short_name(class))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Innermost expression whose span contains `offset`.
    pub fn expr_at(&self, module: u32, offset: u32) -> Option<ExprId> {
        self.exprs
            .iter_module(module)
            .filter(|(_, e)| e.span().contains(offset))
            .min_by_key(|(eidx, e)| (e.span().end - e.span().start, *eidx))
            .map(|(eidx, _)| ExprId { module, eidx })
    }

    /// Innermost expression at a 1-based line and column of a file.
    pub fn expr_at_line_col(&self, file: &str, line: u32, col: u32) -> Option<ExprId> {
        let module = self.module_of_file(file)?;
        let offset = self.source(module)?.offset_of(line, col)?;
        self.expr_at(module, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Result<Program> {
        let source = Source::from_contents("test.php".to_string(), src.to_string())?;
        Program::from_sources(&[source])
    }

    fn find_var(program: &Program, name: &str, nth: usize) -> Option<ExprId> {
        program
            .exprs
            .iter_module(0)
            .filter(|(_, e)| e.var_name() == Some(name))
            .map(|(eidx, _)| ExprId { module: 0, eidx })
            .nth(nth)
    }

    #[test]
    fn records_assignments_with_paths() -> Result<()> {
        let p = program("<?php $x = []; $x['a']['b'] = 1; $x[] = 2; echo $x;")?;
        let scope = p
            .scope(ScopeId {
                module: 0,
                func: None,
            })
            .ok_or_else(|| anyhow!("missing scope"))?;
        let paths: Vec<usize> = scope
            .occurrences("x")
            .iter()
            .filter_map(|o| match &o.kind {
                OccurrenceKind::Assign { path, .. } => Some(path.len()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec![0, 2, 1]);
        Ok(())
    }

    #[test]
    fn closure_scope_captures_use_variables() -> Result<()> {
        let p = program("<?php $cfg = ['a' => 1]; $f = function ($k) use ($cfg) { return $cfg[$k]; };")?;
        let read = find_var(&p, "cfg", 1).ok_or_else(|| anyhow!("missing read"))?;
        let scope = p.scope_of(read).ok_or_else(|| anyhow!("missing scope"))?;
        assert!(scope.closure.is_some());
        assert!(scope.captures("cfg"));
        assert!(!scope.captures("k"));
        assert_eq!(scope.param_index("k"), Some(0));
        assert_eq!(scope.returns.len(), 1);
        Ok(())
    }

    #[test]
    fn indexes_classes_and_hierarchy() -> Result<()> {
        let p = program(
            r#"<?php
            interface Repo { function all(); }
            class Base implements Repo { function all() { return []; } }
            class Users extends Base { protected $fields = ['id']; }
            "#,
        )?;
        assert!(p.is_subclass_of("Users", "Repo"));
        assert!(p.find_method("users", "ALL").is_some());
        assert!(p.find_field("Users", "fields").is_some());
        assert_eq!(p.implementations("Repo", "all").len(), 1);
        Ok(())
    }

    #[test]
    fn finds_innermost_expression() -> Result<()> {
        let p = program("<?php\n$row = $rows[0]['id'];")?;
        let id = p
            .expr_at_line_col("test.php", 2, 10)
            .ok_or_else(|| anyhow!("no expression"))?;
        assert_eq!(p.expr(id).and_then(|e| e.var_name()), Some("rows"));
        Ok(())
    }

    #[test]
    fn records_field_assignments_of_this() -> Result<()> {
        let p = program("<?php class A { function f() { $this->opts['k'] = 1; } }")?;
        let assignments = p.field_assignments("opts");
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].class.as_deref(), Some("a"));
        assert_eq!(assignments[0].path.len(), 1);
        Ok(())
    }
}
