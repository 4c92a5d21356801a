// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

extern crate alloc;

mod ast;
pub mod completion;
mod lexer;
mod lookup;
mod parser;
mod program;
pub mod type_analysis;
mod utils;
mod value;

pub use completion::{Completion, KeyCompletion, Location};
pub use lexer::Source;
pub use program::{ExprId, Program, ScopeId};
pub use type_analysis::{MultiType, SearchSession, TypeAnalysisOptions};
pub use utils::limits::{
    clear_time_source, monotonic_now, set_time_source, LimitError, TimeSource,
    TimeSourceRegistrationError,
};
pub use value::Value;

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::ast::*;
    pub use crate::lexer::*;
    pub use crate::parser::*;
    pub use crate::program::*;
}

#[cfg(test)]
mod tests;
