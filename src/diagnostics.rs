//! Diagnostics reported about the analysed program
//!
//! The analysis never renders messages itself beyond the default text carried
//! by each [`DiagnosticKind`]; a front end turns [`Diagnostic`] records into
//! user-facing output. Reporting is fire-and-continue: nothing in the core
//! inspects the sink to decide control flow.

use crate::ast::SourceLoc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Construct analysis fails
    Error,
    /// Analysis continues with an adjusted result
    Warning,
    /// Extra context for a preceding diagnostic
    Note,
}

/// Classified problem found in the analysed program
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    // === Loop form ===
    /// Initialization is not `var = lb` or a single initialized declaration
    #[error("initialization clause of OpenMP for loop must be of the form 'var = init' or 'T var = init'")]
    LoopNotCanonicalInit,

    /// Condition is not a relational comparison against the loop variable
    #[error("condition of OpenMP for loop must be a relational comparison ('<', '<=', '>', or '>=') of loop variable")]
    LoopNotCanonicalCond,

    /// Increment is not one of the canonical update forms
    #[error("increment clause of OpenMP for loop must perform simple addition or subtraction on loop variable")]
    LoopNotCanonicalIncr,

    /// Step direction contradicts the comparison
    #[error("increment expression must cause loop variable to increase or decrease consistently with the loop condition")]
    LoopIncrNotCompatible,

    /// Loop variable is neither integer nor pointer
    #[error("variable must be of integer or pointer type")]
    LoopVarInvalidType,

    /// Worksharing trip count narrowed to 64 bits
    #[error("OpenMP loop iteration variable cannot have more than 64 bits size and will be narrowed")]
    LoopVarNarrowed,

    /// Fewer perfectly nested loops than `collapse` asked for
    #[error("statement after directive must be a for loop")]
    NotAForLoop,

    /// `collapse` argument is not a positive integer constant
    #[error("argument to 'collapse' clause must be a positive integer constant")]
    CollapseNotPositive,

    /// `collapse` argument exceeds the configured maximum depth
    #[error("argument to 'collapse' clause exceeds the maximum supported depth")]
    CollapseTooDeep,

    // === Nesting ===
    /// Any construct nested in a `simd` region
    #[error("OpenMP constructs may not be nested inside a simd region")]
    ProhibitedRegionSimd,

    /// Any construct nested in an `atomic` region
    #[error("OpenMP constructs may not be nested inside an atomic region")]
    ProhibitedRegionAtomic,

    /// `section` outside `sections`
    #[error("orphaned 'omp section' directives are prohibited; perhaps you forget to enclose the directive into a sections region?")]
    OrphanedSection,

    /// Nested `critical` with the same name
    #[error("cannot nest 'critical' regions having the same name")]
    CriticalSameName,

    /// Directive-class nesting rule violated
    #[error("region cannot be closely nested inside this region")]
    ProhibitedRegion,

    /// `cancel` / `cancellation point` names a construct it is not nested in
    #[error("region cannot be closely nested inside this region; perhaps the cancel construct type does not match")]
    CancelRegionMismatch,

    /// Cancellation of a `nowait` region
    #[error("parent region for cancellation cannot be nowait")]
    ParentCancelRegionNowait,

    /// Cancellation of an `ordered` region
    #[error("parent region for cancellation cannot be ordered")]
    ParentCancelRegionOrdered,

    /// `target` region with a `teams` construct and other statements
    #[error("target construct with nested teams region contains statements outside of the teams construct")]
    TargetTeamsNotAlone,

    // === Attributes ===
    /// Variable already has a conflicting attribute
    #[error("variable must have a data-sharing attribute compatible with this clause")]
    DsaConflict,

    /// Worksharing item is not shared in the enclosing parallel region
    #[error("variable must be shared in the enclosing parallel region")]
    RequiredSharedAccess,

    /// Reduction item of an enclosing region referenced in a task
    #[error("variable in 'task' region cannot be a reduction item of an enclosing region")]
    ReductionInTask,

    /// Task firstprivate of an enclosing reduction item
    #[error("firstprivate variable in 'task' cannot be a reduction item of an enclosing region")]
    FirstPrivateOfReduction,

    /// Reference without an attribute under `default(none)`
    #[error("variable must have explicitly specified data sharing attributes")]
    DefaultNoneUnresolved,

    /// Variable listed in `aligned` more than once
    #[error("variable used in more than one 'aligned' clause")]
    AlignedUsedTwice,

    /// `aligned` item is not a pointer or array
    #[error("argument of 'aligned' clause must be of pointer or array type")]
    AlignedNotPointer,

    /// `const` variable in a clause that writes it
    #[error("const-qualified variable cannot be used in this clause")]
    ConstVariableInClause,

    /// `copyin` item is not threadprivate
    #[error("copyin variable must be threadprivate")]
    CopyinNotThreadPrivate,

    /// `threadprivate` variable with automatic storage
    #[error("threadprivate variable must have static storage duration")]
    ThreadPrivateLocal,

    /// Clause list item is not a variable name
    #[error("expected variable name")]
    ExpectedVariableName,

    /// Clause not accepted by the directive
    #[error("unexpected clause for this directive")]
    ClauseNotAllowed,

    /// Loop-control variable with an incompatible explicit attribute
    #[error("loop iteration variable may not have this data-sharing attribute")]
    LoopVarDsa,
}

impl DiagnosticKind {
    /// Default severity of this kind
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::LoopVarNarrowed => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Classification
    pub kind: DiagnosticKind,
    /// Severity
    pub severity: Severity,
    /// Primary location
    pub primary: SourceLoc,
    /// Related locations (previous declaration, enclosing construct, clause)
    pub aux: Vec<SourceLoc>,
    /// Rendered arguments (directive names, variable names, counts)
    pub args: Vec<String>,
}

impl Diagnostic {
    /// Diagnostic with the kind's default severity
    pub fn new(kind: DiagnosticKind, primary: SourceLoc) -> Self {
        Diagnostic {
            kind,
            severity: kind.severity(),
            primary,
            aux: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Adds a related location.
    pub fn with_aux(mut self, loc: SourceLoc) -> Self {
        self.aux.push(loc);
        self
    }

    /// Adds a rendered argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns true for error severity.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Receiver of diagnostics
pub trait DiagnosticSink {
    /// Accepts a diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Sink that keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBuffer {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBuffer {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected diagnostics, in report order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Kinds in report order
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.diagnostics.iter().map(|d| d.kind).collect()
    }

    /// Returns true if any error was reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Number of diagnostics
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl DiagnosticSink for DiagnosticBuffer {
    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(kind = ?diagnostic.kind, at = %diagnostic.primary, "diagnostic");
        self.diagnostics.push(diagnostic);
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}
