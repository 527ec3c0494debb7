//! Minimal syntax tree consumed by the analysis
//!
//! Handles ([`VarId`], [`ExprId`], [`StmtId`], [`ScopeId`]) index into a
//! single [`Ast`] arena.

pub mod arena;
pub mod nodes;
pub mod types;

pub use arena::{Ast, Bindings};
pub use nodes::*;
pub use types::{IntType, VarType};
