// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::as_conversions
)]

//! Lookup table for associating data with AST nodes.
//!
//! Nodes are addressed by the index of their module within the program and the
//! per-module index assigned by the parser (`eidx` for expressions, `fidx` for
//! function declarations).

use core::fmt;

use crate::program::ExprId;

/// Error indicating that lookup indices are out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupIndexError {
    /// The requested module index exceeds the available modules.
    ModuleOutOfBounds { module_idx: u32, modules: usize },
    /// The requested node index exceeds the available nodes for the module.
    NodeOutOfBounds {
        module_idx: u32,
        node_idx: u32,
        nodes: usize,
    },
}

impl fmt::Display for LookupIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupIndexError::ModuleOutOfBounds {
                module_idx,
                modules,
            } => {
                write!(
                    f,
                    "module_idx {module_idx} out of bounds (modules={modules})"
                )
            }
            LookupIndexError::NodeOutOfBounds {
                module_idx,
                node_idx,
                nodes,
            } => write!(
                f,
                "node_idx {node_idx} out of bounds for module {module_idx} (nodes={nodes})"
            ),
        }
    }
}

impl std::error::Error for LookupIndexError {}

pub type LookupResult<T> = core::result::Result<T, LookupIndexError>;

/// Lookup table that stores data indexed by module and node indices.
#[derive(Debug, Clone)]
pub struct Lookup<T: Clone> {
    slots: Vec<Vec<Option<T>>>,
}

impl<T: Clone> Default for Lookup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Lookup<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Reserve slots for a module with `nodes` entries.
    pub fn push_module(&mut self, nodes: u32) {
        self.slots.push(vec![None; nodes as usize]);
    }

    /// Set data using direct indices with bounds checking.
    pub fn set_checked(&mut self, module_idx: u32, node_idx: u32, value: T) -> LookupResult<()> {
        let (m, n) = self.validate_indices(module_idx, node_idx)?;
        self.slots[m][n] = Some(value);
        Ok(())
    }

    pub fn set(&mut self, id: ExprId, value: T) -> LookupResult<()> {
        self.set_checked(id.module, id.eidx, value)
    }

    /// Entry for an expression. Out of range ids read as unset.
    pub fn get(&self, id: ExprId) -> Option<&T> {
        self.slots
            .get(id.module as usize)
            .and_then(|m| m.get(id.eidx as usize))
            .and_then(|slot| slot.as_ref())
    }

    /// Iterate over the set entries of a module.
    pub fn iter_module(&self, module_idx: u32) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .get(module_idx as usize)
            .into_iter()
            .flat_map(|m| m.iter().enumerate())
            .filter_map(|(idx, slot)| slot.as_ref().map(|v| (idx as u32, v)))
    }

    fn validate_indices(&self, module_idx: u32, node_idx: u32) -> LookupResult<(usize, usize)> {
        let m = module_idx as usize;
        if m >= self.slots.len() {
            return Err(LookupIndexError::ModuleOutOfBounds {
                module_idx,
                modules: self.slots.len(),
            });
        }

        let n = node_idx as usize;
        if n >= self.slots[m].len() {
            return Err(LookupIndexError::NodeOutOfBounds {
                module_idx,
                node_idx,
                nodes: self.slots[m].len(),
            });
        }

        Ok((m, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_access_reports_bounds() {
        let mut lookup: Lookup<u32> = Lookup::new();
        lookup.push_module(2);
        assert!(lookup.set_checked(0, 1, 7).is_ok());
        assert_eq!(lookup.get(ExprId { module: 0, eidx: 1 }), Some(&7));
        assert_eq!(lookup.get(ExprId { module: 0, eidx: 0 }), None);
        assert!(matches!(
            lookup.set_checked(0, 2, 1),
            Err(LookupIndexError::NodeOutOfBounds { .. })
        ));
        assert!(matches!(
            lookup.set(ExprId { module: 3, eidx: 0 }, 1),
            Err(LookupIndexError::ModuleOutOfBounds { .. })
        ));
        assert_eq!(lookup.get(ExprId { module: 5, eidx: 0 }), None);
    }

    #[test]
    fn iterates_set_entries_of_a_module() -> LookupResult<()> {
        let mut lookup: Lookup<&str> = Lookup::new();
        lookup.push_module(1);
        lookup.push_module(5);
        lookup.set_checked(1, 4, "x")?;
        assert_eq!(lookup.iter_module(1).collect::<Vec<_>>(), vec![(4, &"x")]);
        assert_eq!(lookup.iter_module(0).count(), 0);
        Ok(())
    }
}
