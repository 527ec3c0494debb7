//! # ompsema - Semantic Analysis for OpenMP-Style Directives
//!
//! The analysis core a compiler front end runs after parsing a `#pragma omp`
//! directive and before generating code for it. Given a syntax tree it
//! decides, for every variable a construct touches, whether that variable is
//! shared, private, firstprivate, lastprivate, linear, a reduction item or
//! threadprivate; it rejects illegally nested directives; and it turns the
//! canonical `for` loops under a loop directive (several of them, with
//! `collapse(N)`) into one flattened iteration space with a single induction
//! variable.
//!
//! ## Quick Start
//!
//! ```rust
//! use ompsema::{
//!     AnalysisOptions, Ast, AttributeKind, BinaryOp, DeclKind, DiagnosticBuffer,
//!     DirectiveAnalyzer, DirectiveKind, DirectiveStmt, ScopeKind, SourceLoc, UnaryOp, VarType,
//! };
//!
//! let loc = SourceLoc::new(1, 1);
//! let mut ast = Ast::new();
//! let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
//! let region = ast.add_scope(func, ScopeKind::Directive(DirectiveKind::ParallelFor));
//! let i = ast.declare("i", VarType::INT, DeclKind::Local, func, loc);
//!
//! // for (i = 0; i < 100; ++i) ;
//! let lhs = ast.var_ref(i, loc);
//! let zero = ast.int(0, loc);
//! let init = ast.assign(lhs, zero, loc);
//! let init = ast.expr_stmt(init);
//! let r = ast.var_ref(i, loc);
//! let bound = ast.int(100, loc);
//! let cond = ast.binary(BinaryOp::Lt, r, bound, loc);
//! let r = ast.var_ref(i, loc);
//! let inc = ast.unary(UnaryOp::PreInc, r, loc);
//! let body = ast.null_stmt(loc);
//! let for_stmt = ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc);
//!
//! // #pragma omp parallel for
//! let directive = ast.directive(
//!     DirectiveStmt {
//!         kind: DirectiveKind::ParallelFor,
//!         name: None,
//!         cancel_region: None,
//!         clauses: Vec::new(),
//!         vars: Vec::new(),
//!         body: Some(for_stmt),
//!         scope: region,
//!     },
//!     loc,
//! );
//!
//! let options = AnalysisOptions::default();
//! let mut diagnostics = DiagnosticBuffer::new();
//! let results = DirectiveAnalyzer::new(&ast, &options).analyze(&mut diagnostics, directive);
//!
//! assert!(diagnostics.is_empty());
//! assert!(results[0].is_success());
//! assert_eq!(results[0].attribute(i), Some(AttributeKind::Private));
//!
//! let nest = results[0].loop_nest.as_ref().unwrap();
//! assert_eq!(nest.total_trip_count.constant_value(&ast), Some(100));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! NestingValidator → DirectiveRegionStack::push → ClauseProcessor
//!     → nested directives → RegionBodyScanner
//!     → CollapseLinearizer (LoopFormChecker + IterationSpaceBuilder)
//!     → DirectiveRegionStack::pop → DirectiveAnalysis
//! ```
//!
//! ### Main Components
//!
//! - [`DirectiveRegionStack`] - One attribute frame per open construct
//! - [`AttributeResolver`] - Attribute queries over the stack
//! - [`ClauseProcessor`] - Checks and registers explicit clauses
//! - [`NestingValidator`] - Directive nesting rules
//! - [`LoopFormChecker`] - Canonical loop recognition
//! - [`IterationSpaceBuilder`] / [`CollapseLinearizer`] - Trip counts and
//!   collapse linearization
//! - [`RegionBodyScanner`] - Implicit attributes from the construct body
//! - [`DirectiveAnalyzer`] - Drives all of the above over a statement tree
//!
//! ## Error Handling
//!
//! Problems in the analysed program are [`Diagnostic`] records sent to a
//! [`DiagnosticSink`]; the failing operation returns `None` or a failed
//! outcome. [`Error`] is reserved for API misuse such as popping the
//! sentinel frame or an invalid options document.

pub mod analyzer;
pub mod ast;
pub mod context;
pub mod diagnostics;
pub mod directive;
pub mod dsa;
pub mod error;
pub mod loops;
pub mod nesting;
pub mod options;
pub mod scan;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types
pub use analyzer::{AnalysisOutcome, AttributeRecord, DirectiveAnalysis, DirectiveAnalyzer};
pub use ast::{
    Ast, BinaryOp, Bindings, DeclKind, DirectiveStmt, ExprId, ExprKind, IntType, OverloadedOp,
    ScopeId, ScopeKind, SourceLoc, SourceRange, StmtId, StmtKind, StorageClass, UnaryOp, VarDecl,
    VarId, VarType,
};
pub use context::AnalysisContext;
pub use diagnostics::{Diagnostic, DiagnosticBuffer, DiagnosticKind, DiagnosticSink, Severity};
pub use directive::{Clause, ClauseKind, DefaultKind, DirectiveKind, ReductionOp};
pub use dsa::{
    AttributeKind, AttributeResolver, ClauseOutcome, ClauseProcessor, DefaultAttribute,
    DirectiveRegionStack, DsaEntry, DsaResolution, SharingMap,
};
pub use error::{Error, Result};
pub use loops::{
    CollapseLinearizer, IterEnv, IterExpr, IterOp, IterationSpaceBuilder, LinearizedLoop,
    LoopForm, LoopFormChecker, LoopIterationSpace, WorksharingBounds,
};
pub use nesting::{
    NestingCandidate, NestingRule, NestingValidator, NestingViolation, Recommendation,
};
pub use options::AnalysisOptions;
pub use scan::{RegionBodyScanner, ScanResult};
