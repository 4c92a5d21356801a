// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Forward resolution: the types an expression may evaluate to, computed by
//! following its definitions. Each file extends [`SearchSession`] with the
//! resolvers of one family of expressions.
//!
//! [`SearchSession`]: crate::type_analysis::context::SearchSession

mod calls;
mod closures;
mod dispatch;
mod fields;
mod literals;
mod operators;
mod variables;

pub(crate) use calls::CallTargets;
pub(crate) use dispatch::child_id;
