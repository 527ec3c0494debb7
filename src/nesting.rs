//! Directive nesting rules
//!
//! A candidate directive is checked against the innermost open construct
//! before its own frame is pushed. Rules apply in a fixed order and the first
//! one that fires decides.

use crate::ast::SourceLoc;
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::directive::DirectiveKind;
use crate::dsa::DirectiveRegionStack;
use serde::Serialize;
use std::fmt;

/// Which nesting rule rejected a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NestingRule {
    /// Nothing nests inside `simd`
    InsideSimd,
    /// Nothing nests inside `atomic`
    InsideAtomic,
    /// `section` outside `sections` / `parallel sections`
    OrphanedSection,
    /// Cancelled construct type does not match the parent
    CancelRegion,
    /// Cancelled region is `nowait`
    CancelNowait,
    /// Cancelled region is `ordered`
    CancelOrdered,
    /// `master` inside worksharing or task
    Master,
    /// Nested `critical` with the same name
    CriticalSameName,
    /// `barrier` placement
    Barrier,
    /// Non-parallel worksharing placement
    Worksharing,
    /// `ordered` outside an ordered loop region
    Ordered,
    /// `teams` outside `target`
    TeamsOutsideTarget,
    /// Only parallel constructs nest inside `teams`
    InsideTeams,
}

/// Region the directive should have been nested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    ParallelRegion,
    OrderedRegion,
    TargetRegion,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::ParallelRegion => f.write_str("a parallel region"),
            Recommendation::OrderedRegion => f.write_str("an ordered region"),
            Recommendation::TargetRegion => f.write_str("a target region"),
        }
    }
}

/// Structured rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestingViolation {
    /// Rule that fired
    pub rule: NestingRule,
    /// Innermost enclosing directive
    pub parent: DirectiveKind,
    /// Rejected directive
    pub current: DirectiveKind,
    /// Suggested enclosing region
    pub recommend: Option<Recommendation>,
    /// Location of the same-name `critical` construct
    pub previous_critical: Option<SourceLoc>,
}

/// Directive about to be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestingCandidate<'n> {
    /// Directive kind
    pub kind: DirectiveKind,
    /// Name of a `critical` construct
    pub name: Option<&'n str>,
    /// Construct type named by `cancel` / `cancellation point`
    pub cancel_region: Option<DirectiveKind>,
    /// Directive location
    pub loc: SourceLoc,
}

/// Nesting checks over the current region stack
pub struct NestingValidator<'s> {
    stack: &'s DirectiveRegionStack,
}

impl<'s> NestingValidator<'s> {
    /// Validator reading `stack`; the candidate is not pushed yet.
    pub fn new(stack: &'s DirectiveRegionStack) -> Self {
        NestingValidator { stack }
    }

    /// Checks `candidate` and reports any violation to the sink.
    pub fn check(
        &self,
        cx: &mut AnalysisContext<'_>,
        candidate: &NestingCandidate<'_>,
    ) -> Result<(), NestingViolation> {
        match self.evaluate(candidate) {
            Ok(()) => Ok(()),
            Err(violation) => {
                tracing::debug!(
                    rule = ?violation.rule,
                    parent = %violation.parent,
                    current = %violation.current,
                    "nesting rejected"
                );
                cx.report(self.diagnostic(&violation, candidate.loc));
                Err(violation)
            }
        }
    }

    /// Rule evaluation without reporting.
    pub fn evaluate(&self, candidate: &NestingCandidate<'_>) -> Result<(), NestingViolation> {
        let parent_frame = self.stack.top();
        let parent = parent_frame.directive;
        let current = candidate.kind;
        let violation = |rule: NestingRule, recommend: Option<Recommendation>| NestingViolation {
            rule,
            parent,
            current,
            recommend,
            previous_critical: None,
        };

        if parent.is_simd() {
            return Err(violation(NestingRule::InsideSimd, None));
        }
        if parent == DirectiveKind::Atomic {
            return Err(violation(NestingRule::InsideAtomic, None));
        }
        if current == DirectiveKind::Section {
            return match parent {
                DirectiveKind::Sections | DirectiveKind::ParallelSections => Ok(()),
                _ => Err(violation(NestingRule::OrphanedSection, None)),
            };
        }
        if current == DirectiveKind::Teams && parent != DirectiveKind::Target {
            return Err(violation(
                NestingRule::TeamsOutsideTarget,
                Some(Recommendation::TargetRegion),
            ));
        }
        // Orphaned constructs may be called from a region satisfying their needs
        if parent == DirectiveKind::Unknown {
            return Ok(());
        }

        let (prohibited, recommend) = match current {
            DirectiveKind::Cancel | DirectiveKind::CancellationPoint => {
                if !cancel_matches(candidate.cancel_region, parent) {
                    return Err(violation(NestingRule::CancelRegion, None));
                }
                if parent_frame.nowait_region {
                    return Err(violation(NestingRule::CancelNowait, None));
                }
                if parent_frame.ordered_region {
                    return Err(violation(NestingRule::CancelOrdered, None));
                }
                (None, None)
            }
            DirectiveKind::Master => (
                (parent.is_worksharing() || parent == DirectiveKind::Task)
                    .then_some(NestingRule::Master),
                None,
            ),
            DirectiveKind::Critical => {
                if let Some(name) = candidate.name {
                    let previous = self.stack.find_enclosing(|f| {
                        f.directive == DirectiveKind::Critical && f.name.as_deref() == Some(name)
                    });
                    if let Some(frame) = previous {
                        return Err(NestingViolation {
                            previous_critical: Some(frame.construct_loc),
                            ..violation(NestingRule::CriticalSameName, None)
                        });
                    }
                }
                (None, None)
            }
            DirectiveKind::Barrier => (
                blocks_synchronization(parent).then_some(NestingRule::Barrier),
                None,
            ),
            kind if kind.is_worksharing() && !kind.is_parallel() => (
                (blocks_synchronization(parent) || parent.is_teams())
                    .then_some(NestingRule::Worksharing),
                Some(Recommendation::ParallelRegion),
            ),
            DirectiveKind::Ordered => (
                (parent == DirectiveKind::Critical
                    || parent == DirectiveKind::Task
                    || !parent_frame.ordered_region)
                    .then_some(NestingRule::Ordered),
                Some(Recommendation::OrderedRegion),
            ),
            _ => (None, None),
        };

        if let Some(rule) = prohibited {
            return Err(violation(rule, recommend));
        }
        if parent.is_teams() && !current.is_parallel() {
            return Err(violation(NestingRule::InsideTeams, None));
        }
        Ok(())
    }

    fn diagnostic(&self, violation: &NestingViolation, loc: SourceLoc) -> Diagnostic {
        let kind = match violation.rule {
            NestingRule::InsideSimd => DiagnosticKind::ProhibitedRegionSimd,
            NestingRule::InsideAtomic => DiagnosticKind::ProhibitedRegionAtomic,
            NestingRule::OrphanedSection => DiagnosticKind::OrphanedSection,
            NestingRule::CriticalSameName => DiagnosticKind::CriticalSameName,
            NestingRule::CancelRegion => DiagnosticKind::CancelRegionMismatch,
            NestingRule::CancelNowait => DiagnosticKind::ParentCancelRegionNowait,
            NestingRule::CancelOrdered => DiagnosticKind::ParentCancelRegionOrdered,
            _ => DiagnosticKind::ProhibitedRegion,
        };
        let mut diag = Diagnostic::new(kind, loc)
            .with_arg(violation.parent.name())
            .with_arg(violation.current.name());
        if let Some(recommend) = violation.recommend {
            diag = diag.with_arg(recommend.to_string());
        }
        if let Some(previous) = violation.previous_critical {
            diag = diag.with_aux(previous);
        } else if !self.stack.at_sentinel() {
            diag = diag.with_aux(self.stack.top().construct_loc);
        }
        diag
    }
}

/// Regions in which `barrier` and non-parallel worksharing may not be
/// closely nested
fn blocks_synchronization(parent: DirectiveKind) -> bool {
    parent.is_worksharing()
        || matches!(
            parent,
            DirectiveKind::Task
                | DirectiveKind::Master
                | DirectiveKind::Critical
                | DirectiveKind::Ordered
        )
}

fn cancel_matches(region: Option<DirectiveKind>, parent: DirectiveKind) -> bool {
    match region {
        Some(DirectiveKind::Parallel) => parent == DirectiveKind::Parallel,
        Some(DirectiveKind::For) => {
            matches!(parent, DirectiveKind::For | DirectiveKind::ParallelFor)
        }
        Some(DirectiveKind::Taskgroup) => parent == DirectiveKind::Task,
        Some(DirectiveKind::Sections) => matches!(
            parent,
            DirectiveKind::Section | DirectiveKind::Sections | DirectiveKind::ParallelSections
        ),
        _ => false,
    }
}
