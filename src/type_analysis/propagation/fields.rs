// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Properties, static properties and class constants.

use crate::ast::{ClassRef, Expr, Ref, Visibility};
use crate::program::{ExprId, FieldAssignment};
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::docs;
use crate::type_analysis::model::{Deferred, KeyName, KeyValue, MultiType, Type};

use super::dispatch::child_id;

impl SearchSession<'_> {
    pub(crate) fn resolve_property(
        &mut self,
        id: ExprId,
        refr: &Ref<Expr>,
        name: &str,
        ctx: CallCtxId,
    ) -> MultiType {
        if self.field_pending(name) {
            return MultiType::empty();
        }
        let classes = self.resolve(child_id(id, refr), ctx).classes();
        self.field_types(id, &classes, name)
    }

    pub(crate) fn resolve_static_property(
        &mut self,
        id: ExprId,
        class: &ClassRef,
        name: &str,
        ctx: CallCtxId,
    ) -> MultiType {
        if self.field_pending(name) {
            return MultiType::empty();
        }
        let classes = self.class_ref_names(id, class, ctx);
        self.field_types(id, &classes, name)
    }

    pub(crate) fn resolve_class_const(
        &mut self,
        id: ExprId,
        class: &ClassRef,
        name: &str,
        ctx: CallCtxId,
    ) -> MultiType {
        let classes = self.class_ref_names(id, class, ctx);
        let mut result = MultiType::empty();
        if name.eq_ignore_ascii_case("class") {
            for class in classes {
                result.push(Type::string(&class).with_definition(Some(id)));
            }
            return result;
        }

        let program = self.program();
        let values: Vec<ExprId> = classes
            .iter()
            .filter_map(|class| program.find_const(class, name))
            .map(|(entry, constant)| ExprId {
                module: entry.module,
                eidx: constant.value.eidx(),
            })
            .collect();
        for value in values {
            result.extend(self.resolve(value, CallCtxId::EMPTY));
        }
        result
    }

    /// Whether an access to a field of the same name is already being
    /// resolved further up the stack.
    fn field_pending(&self, name: &str) -> bool {
        let program = self.program();
        let frames = self.frames();
        let ancestors = &frames[..frames.len().saturating_sub(1)];
        ancestors.iter().any(|frame| {
            matches!(
                program.expr(frame.expr).map(|e| e.as_ref()),
                Some(Expr::Property { name: n, .. } | Expr::StaticProperty { name: n, .. })
                    if n.text() == name
            )
        })
    }

    /// Declared default, `@var` doc and every assignment of field `name` on
    /// any of `classes`. With no known class, class-less assignments of the
    /// same module are used.
    fn field_types(&mut self, id: ExprId, classes: &[String], name: &str) -> MultiType {
        let program = self.program();
        let mut result = MultiType::empty();
        let mut defaults = vec![];
        for class in classes {
            let Some((entry, field)) = program.find_field(class, name) else {
                continue;
            };
            if let Some(default) = &field.default {
                defaults.push(ExprId {
                    module: entry.module,
                    eidx: default.eidx(),
                });
            }
            if let Some(doc) = field.doc.as_ref().and_then(|d| docs::var_doc(d.text(), name)) {
                result.extend(self.declared_types(&doc, Some(class)));
            }
        }
        for default in defaults {
            result.extend(self.resolve(default, CallCtxId::EMPTY));
        }

        let assignments: Vec<FieldAssignment> = program
            .field_assignments(name)
            .iter()
            .filter(|fa| match &fa.class {
                Some(owner) => {
                    classes.is_empty()
                        || classes.iter().any(|c| {
                            program.is_subclass_of(c, owner) || program.is_subclass_of(owner, c)
                        })
                }
                None => fa.assign.module == id.module,
            })
            .cloned()
            .collect();
        for assignment in assignments {
            result.extend(self.assignment_types(
                assignment.assign,
                assignment.value,
                &assignment.path,
                CallCtxId::EMPTY,
            ));
        }
        result
    }

    /// Row of a model class: keys of its `$fields` default when they are
    /// names, otherwise its string values.
    pub(crate) fn model_row(&mut self, class: &str) -> Option<Type> {
        let program = self.program();
        let (entry, field) = program.find_field(class, "fields")?;
        let default = field.default.as_ref()?;
        let default_id = ExprId {
            module: entry.module,
            eidx: default.eidx(),
        };
        let fields = self.resolve(default_id, CallCtxId::EMPTY);

        let mut row = Type::array().with_definition(Some(default_id));
        let names = fields.key_names();
        if names.iter().any(|n| n.parse::<i64>().is_err()) {
            for name in names {
                let definition = fields.key_entries(&name).find_map(|e| e.definition);
                row.add_key(KeyName::Named(name), KeyValue::Ready(MultiType::empty()), definition);
            }
        } else {
            for column in fields.all_values(self).string_literals() {
                row.add_key(
                    KeyName::Named(column),
                    KeyValue::Ready(MultiType::empty()),
                    Some(default_id),
                );
            }
        }
        Some(row)
    }

    /// Non-private instance properties declared by `class` itself.
    pub(crate) fn declared_properties(&self, class: &str) -> Option<Type> {
        let entry = self.program().class(class)?;
        let mut ty = Type::array();
        for field in &entry.decl.fields {
            if field.modifiers.visibility == Visibility::Private || field.modifiers.is_static {
                continue;
            }
            let definition = field.default.as_ref().map(|d| ExprId {
                module: entry.module,
                eidx: d.eidx(),
            });
            let value = match definition {
                Some(expr) => KeyValue::Deferred(Deferred::Expr {
                    expr,
                    call_ctx: CallCtxId::EMPTY,
                }),
                None => KeyValue::Ready(MultiType::empty()),
            };
            ty.add_key(KeyName::Named(field.name.text().to_string()), value, definition);
        }
        Some(ty)
    }
}
