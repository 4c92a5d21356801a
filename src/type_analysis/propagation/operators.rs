// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{ArithOp, AssignOp, BoolOp, CastKind, Expr, Ref, UnaryOp};
use crate::program::ExprId;
use crate::type_analysis::context::{CallCtxId, SearchSession};
use crate::type_analysis::model::{MultiType, Type, TypeKind};
use crate::value::Value;

use super::dispatch::child_id;

// Literal concatenations are expanded up to this many combinations.
const MAX_CONCAT_LITERALS: usize = 16;

impl SearchSession<'_> {
    pub(crate) fn resolve_assign(
        &mut self,
        id: ExprId,
        op: AssignOp,
        lhs: &Ref<Expr>,
        rhs: &Ref<Expr>,
        ctx: CallCtxId,
    ) -> MultiType {
        match op {
            AssignOp::Eq => self.resolve(child_id(id, rhs), ctx),
            AssignOp::Coalesce => {
                let mut result = self.resolve(child_id(id, lhs), ctx);
                result.extend(self.resolve(child_id(id, rhs), ctx));
                result
            }
            AssignOp::Arith(op) => self.resolve_arith(id, op, lhs, rhs, ctx),
        }
    }

    pub(crate) fn resolve_arith(
        &mut self,
        id: ExprId,
        op: ArithOp,
        lhs: &Ref<Expr>,
        rhs: &Ref<Expr>,
        ctx: CallCtxId,
    ) -> MultiType {
        let left = self.resolve(child_id(id, lhs), ctx);
        let right = self.resolve(child_id(id, rhs), ctx);
        let has_kind = |types: &MultiType, kind: &TypeKind| types.iter().any(|t| &t.kind == kind);

        match op {
            // Array union keeps the keys of both operands.
            ArithOp::Add if has_kind(&left, &TypeKind::Array) || has_kind(&right, &TypeKind::Array) => {
                let mut result = MultiType::empty();
                for ty in left.into_types().into_iter().chain(right.into_types()) {
                    if ty.kind == TypeKind::Array {
                        result.push(ty);
                    }
                }
                result
            }
            ArithOp::Concat => concat(&left, &right, id),
            ArithOp::Mod | ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor => {
                MultiType::of(Type::new(TypeKind::Int))
            }
            ArithOp::Div => {
                let mut result = MultiType::of(Type::new(TypeKind::Int));
                result.push(Type::new(TypeKind::Float));
                result
            }
            ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Pow => {
                if has_kind(&left, &TypeKind::Float) || has_kind(&right, &TypeKind::Float) {
                    MultiType::of(Type::new(TypeKind::Float))
                } else {
                    MultiType::of(Type::new(TypeKind::Int))
                }
            }
        }
    }

    pub(crate) fn resolve_bool_expr(&mut self, _id: ExprId, op: BoolOp) -> MultiType {
        match op {
            BoolOp::Spaceship => MultiType::of(Type::new(TypeKind::Int)),
            _ => MultiType::of(Type::new(TypeKind::Bool)),
        }
    }

    pub(crate) fn resolve_unary(
        &mut self,
        id: ExprId,
        op: UnaryOp,
        operand: &Ref<Expr>,
        ctx: CallCtxId,
    ) -> MultiType {
        match op {
            UnaryOp::Not => MultiType::of(Type::new(TypeKind::Bool)),
            UnaryOp::BitNot => MultiType::of(Type::new(TypeKind::Int)),
            UnaryOp::Silence => self.resolve(child_id(id, operand), ctx),
            UnaryOp::Neg
            | UnaryOp::Plus
            | UnaryOp::PreInc
            | UnaryOp::PreDec
            | UnaryOp::PostInc
            | UnaryOp::PostDec => {
                let operand = self.resolve(child_id(id, operand), ctx);
                if operand.iter().any(|t| t.kind == TypeKind::Float) {
                    MultiType::of(Type::new(TypeKind::Float))
                } else {
                    MultiType::of(Type::new(TypeKind::Int))
                }
            }
        }
    }

    pub(crate) fn resolve_cast(
        &mut self,
        id: ExprId,
        kind: CastKind,
        operand: &Ref<Expr>,
        ctx: CallCtxId,
    ) -> MultiType {
        let kind = match kind {
            CastKind::Array => {
                let mut arrays = MultiType::empty();
                for ty in self.resolve(child_id(id, operand), ctx).into_types() {
                    if ty.kind == TypeKind::Array {
                        arrays.push(ty);
                    }
                }
                if arrays.is_empty() {
                    arrays.push(Type::array());
                }
                return arrays;
            }
            CastKind::Int => TypeKind::Int,
            CastKind::Float => TypeKind::Float,
            CastKind::String => TypeKind::String,
            CastKind::Bool => TypeKind::Bool,
            CastKind::Object => TypeKind::Object("stdClass".to_string()),
        };
        MultiType::of(Type::new(kind))
    }
}

/// `'user_' . $id` keeps literal keys when both sides are known literals.
fn concat(left: &MultiType, right: &MultiType, id: ExprId) -> MultiType {
    let lhs = left.key_literals();
    let rhs = right.key_literals();
    let known = left.iter().all(|t| t.literal.is_some()) && right.iter().all(|t| t.literal.is_some());
    if !known || lhs.is_empty() || rhs.is_empty() || lhs.len() * rhs.len() > MAX_CONCAT_LITERALS {
        return MultiType::of(Type::new(TypeKind::String));
    }
    let mut result = MultiType::empty();
    for l in &lhs {
        for r in &rhs {
            let value = Value::from(format!("{l}{r}").as_str());
            result.push(Type::literal(value).with_definition(Some(id)));
        }
    }
    result
}
