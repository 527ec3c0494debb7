//! Directive and clause vocabulary
//!
//! Directive kinds follow the OpenMP 4.0 construct set. The classification
//! predicates (`is_parallel`, `is_worksharing`, ...) are the ones every
//! nesting and data-sharing rule is phrased in.

use crate::ast::{ExprId, SourceLoc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directive kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectiveKind {
    /// No directive (file scope, or the sentinel frame)
    Unknown,
    Parallel,
    Simd,
    For,
    ForSimd,
    Sections,
    Section,
    Single,
    Master,
    Critical,
    ParallelFor,
    ParallelForSimd,
    ParallelSections,
    Task,
    Taskyield,
    Barrier,
    Taskwait,
    Taskgroup,
    Flush,
    Ordered,
    Atomic,
    Target,
    Teams,
    Cancel,
    CancellationPoint,
    ThreadPrivate,
}

impl DirectiveKind {
    /// Source spelling
    pub fn name(self) -> &'static str {
        match self {
            DirectiveKind::Unknown => "unknown",
            DirectiveKind::Parallel => "parallel",
            DirectiveKind::Simd => "simd",
            DirectiveKind::For => "for",
            DirectiveKind::ForSimd => "for simd",
            DirectiveKind::Sections => "sections",
            DirectiveKind::Section => "section",
            DirectiveKind::Single => "single",
            DirectiveKind::Master => "master",
            DirectiveKind::Critical => "critical",
            DirectiveKind::ParallelFor => "parallel for",
            DirectiveKind::ParallelForSimd => "parallel for simd",
            DirectiveKind::ParallelSections => "parallel sections",
            DirectiveKind::Task => "task",
            DirectiveKind::Taskyield => "taskyield",
            DirectiveKind::Barrier => "barrier",
            DirectiveKind::Taskwait => "taskwait",
            DirectiveKind::Taskgroup => "taskgroup",
            DirectiveKind::Flush => "flush",
            DirectiveKind::Ordered => "ordered",
            DirectiveKind::Atomic => "atomic",
            DirectiveKind::Target => "target",
            DirectiveKind::Teams => "teams",
            DirectiveKind::Cancel => "cancel",
            DirectiveKind::CancellationPoint => "cancellation point",
            DirectiveKind::ThreadPrivate => "threadprivate",
        }
    }

    /// Creates a team of threads
    pub fn is_parallel(self) -> bool {
        matches!(
            self,
            DirectiveKind::Parallel
                | DirectiveKind::ParallelFor
                | DirectiveKind::ParallelForSimd
                | DirectiveKind::ParallelSections
        )
    }

    /// Distributes work across an existing team
    pub fn is_worksharing(self) -> bool {
        matches!(
            self,
            DirectiveKind::For
                | DirectiveKind::ForSimd
                | DirectiveKind::Sections
                | DirectiveKind::Section
                | DirectiveKind::Single
                | DirectiveKind::ParallelFor
                | DirectiveKind::ParallelForSimd
                | DirectiveKind::ParallelSections
        )
    }

    /// Vectorized loop
    pub fn is_simd(self) -> bool {
        matches!(
            self,
            DirectiveKind::Simd | DirectiveKind::ForSimd | DirectiveKind::ParallelForSimd
        )
    }

    /// League of teams
    pub fn is_teams(self) -> bool {
        self == DirectiveKind::Teams
    }

    /// Has associated for-loops
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            DirectiveKind::Simd
                | DirectiveKind::For
                | DirectiveKind::ForSimd
                | DirectiveKind::ParallelFor
                | DirectiveKind::ParallelForSimd
        )
    }

    /// Boundary of implicit-attribute inheritance
    pub fn is_parallel_or_task(self) -> bool {
        self.is_parallel() || self.is_teams() || self == DirectiveKind::Task
    }

    /// Worksharing loop that needs lower/upper/stride/is-last bookkeeping
    pub fn needs_worksharing_bounds(self) -> bool {
        self.is_loop() && self.is_worksharing()
    }

    /// Stand-alone directive without an associated statement
    pub fn is_standalone(self) -> bool {
        matches!(
            self,
            DirectiveKind::Taskyield
                | DirectiveKind::Barrier
                | DirectiveKind::Taskwait
                | DirectiveKind::Flush
                | DirectiveKind::Cancel
                | DirectiveKind::CancellationPoint
                | DirectiveKind::ThreadPrivate
        )
    }

    /// Clause applicability table
    pub fn allows_clause(self, clause: &ClauseKind) -> bool {
        use ClauseKind as C;
        use DirectiveKind as D;
        match self {
            D::Parallel => matches!(
                clause,
                C::If | C::NumThreads | C::Default(_) | C::Private | C::FirstPrivate | C::Shared
                    | C::Reduction(_) | C::Copyin | C::ProcBind
            ),
            D::Simd => matches!(
                clause,
                C::Private | C::LastPrivate | C::Linear | C::Aligned | C::Safelen | C::Collapse
                    | C::Reduction(_)
            ),
            D::For => matches!(
                clause,
                C::Private | C::FirstPrivate | C::LastPrivate | C::Reduction(_) | C::Schedule
                    | C::Collapse | C::Ordered | C::Nowait
            ),
            D::ForSimd => matches!(
                clause,
                C::Private | C::FirstPrivate | C::LastPrivate | C::Reduction(_) | C::Schedule
                    | C::Collapse | C::Nowait | C::Safelen | C::Linear | C::Aligned
            ),
            D::Sections => matches!(
                clause,
                C::Private | C::FirstPrivate | C::LastPrivate | C::Reduction(_) | C::Nowait
            ),
            D::Single => matches!(
                clause,
                C::Private | C::FirstPrivate | C::Copyprivate | C::Nowait
            ),
            D::ParallelFor => matches!(
                clause,
                C::If | C::NumThreads | C::Default(_) | C::ProcBind | C::Private
                    | C::FirstPrivate | C::Shared | C::Reduction(_) | C::Copyin
                    | C::LastPrivate | C::Collapse | C::Schedule | C::Ordered
            ),
            D::ParallelForSimd => matches!(
                clause,
                C::If | C::NumThreads | C::Default(_) | C::ProcBind | C::Private
                    | C::FirstPrivate | C::Shared | C::Reduction(_) | C::Copyin
                    | C::LastPrivate | C::Collapse | C::Schedule | C::Safelen | C::Linear
                    | C::Aligned
            ),
            D::ParallelSections => matches!(
                clause,
                C::If | C::NumThreads | C::Default(_) | C::ProcBind | C::Private
                    | C::FirstPrivate | C::Shared | C::Reduction(_) | C::Copyin
                    | C::LastPrivate
            ),
            D::Task => matches!(
                clause,
                C::If | C::Final | C::Untied | C::Mergeable | C::Default(_) | C::Private
                    | C::FirstPrivate | C::Shared
            ),
            D::Target => matches!(clause, C::If),
            D::Teams => matches!(
                clause,
                C::Default(_) | C::Private | C::FirstPrivate | C::Shared | C::Reduction(_)
            ),
            D::Flush => matches!(clause, C::Flush),
            D::Atomic => matches!(clause, C::AtomicKind),
            _ => false,
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Argument of a `default` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefaultKind {
    /// `default(none)`
    None,
    /// `default(shared)`
    Shared,
}

/// Reduction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReductionOp {
    Add,
    Mul,
    Sub,
    BitAnd,
    BitOr,
    BitXor,
    LAnd,
    LOr,
    Min,
    Max,
}

/// Clause kind with its non-list payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseKind {
    Private,
    FirstPrivate,
    LastPrivate,
    Shared,
    Reduction(ReductionOp),
    Linear,
    Aligned,
    Copyin,
    Copyprivate,
    Default(DefaultKind),
    Collapse,
    Ordered,
    Nowait,
    If,
    NumThreads,
    ProcBind,
    Schedule,
    Safelen,
    Final,
    Untied,
    Mergeable,
    Flush,
    AtomicKind,
}

impl ClauseKind {
    /// Source spelling
    pub fn name(self) -> &'static str {
        match self {
            ClauseKind::Private => "private",
            ClauseKind::FirstPrivate => "firstprivate",
            ClauseKind::LastPrivate => "lastprivate",
            ClauseKind::Shared => "shared",
            ClauseKind::Reduction(_) => "reduction",
            ClauseKind::Linear => "linear",
            ClauseKind::Aligned => "aligned",
            ClauseKind::Copyin => "copyin",
            ClauseKind::Copyprivate => "copyprivate",
            ClauseKind::Default(_) => "default",
            ClauseKind::Collapse => "collapse",
            ClauseKind::Ordered => "ordered",
            ClauseKind::Nowait => "nowait",
            ClauseKind::If => "if",
            ClauseKind::NumThreads => "num_threads",
            ClauseKind::ProcBind => "proc_bind",
            ClauseKind::Schedule => "schedule",
            ClauseKind::Safelen => "safelen",
            ClauseKind::Final => "final",
            ClauseKind::Untied => "untied",
            ClauseKind::Mergeable => "mergeable",
            ClauseKind::Flush => "flush",
            ClauseKind::AtomicKind => "atomic",
        }
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Kind and payload
    pub kind: ClauseKind,
    /// Variable list, as written (usually `VarRef` expressions)
    pub vars: Vec<ExprId>,
    /// Extra expression (`collapse(N)`, `linear(x: step)`, `aligned(p: a)`)
    pub aux: Option<ExprId>,
    /// Location of the clause keyword
    pub loc: SourceLoc,
}

impl Clause {
    /// Clause with a variable list
    pub fn with_vars(kind: ClauseKind, vars: Vec<ExprId>, loc: SourceLoc) -> Self {
        Clause {
            kind,
            vars,
            aux: None,
            loc,
        }
    }

    /// Clause with a single expression argument
    pub fn with_arg(kind: ClauseKind, arg: ExprId, loc: SourceLoc) -> Self {
        Clause {
            kind,
            vars: Vec::new(),
            aux: Some(arg),
            loc,
        }
    }

    /// Clause without arguments
    pub fn bare(kind: ClauseKind, loc: SourceLoc) -> Self {
        Clause {
            kind,
            vars: Vec::new(),
            aux: None,
            loc,
        }
    }
}
