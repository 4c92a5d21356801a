// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Static shape inference for PHP associative arrays.
//!
//! A [`SearchSession`] answers "which keys may this expression have" by
//! walking definitions backwards from the expression: assignments, array
//! literals, function returns, closures, fields and built-in functions.
//! When the definitions say nothing useful, the session looks at how the
//! value is consumed instead (`$row['id']` implies a key `id`).
//!
//! The module is split across a couple of dedicated files:
//!
//! * `model.rs` contains the shape representation: [`Type`], [`MultiType`]
//!   and deferred key values.
//! * `context.rs` holds the session with its cache, call contexts and the
//!   depth, budget, timeout and recursion guards.
//! * `propagation/` contains the forward resolvers, one file per family of
//!   expressions.
//! * `usage.rs` infers shapes from the way values are used.
//! * `builtins/` describes what PHP and library functions return or expect.
//! * `docs.rs` reads `@param`, `@return` and `@var` annotations.
//! * `render.rs` prints shapes as debug JSON.

pub mod builtins;
pub mod context;
pub mod docs;
pub mod model;
pub mod options;
pub(crate) mod propagation;
pub mod render;
pub mod usage;

pub use context::{ArgBinding, CallContext, CallCtxId, ExprContext, SearchSession};
pub use model::{
    Deferred, ForceDeferred, KeyEntry, KeyName, KeyValue, MultiType, ReturnThunk, Type, TypeKind,
};
pub use options::{OptionsError, TypeAnalysisOptions};
