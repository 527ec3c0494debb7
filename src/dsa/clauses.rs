//! Explicit clause processing
//!
//! Every clause item is checked against the attributes already visible
//! through the resolver before it is registered with
//! [`DirectiveRegionStack::add_dsa`]. Errors are reported per item and the
//! whole list is always processed; the construct fails afterwards if any item
//! failed.

use super::resolver::{AttributeResolver, DsaResolution};
use super::stack::DirectiveRegionStack;
use super::AttributeKind;
use crate::ast::{DirectiveStmt, ExprId, SourceLoc, VarId, VarType};
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::directive::{Clause, ClauseKind, DefaultKind, DirectiveKind};

/// Result of processing a clause list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClauseOutcome {
    /// Validated `collapse` count and the clause location
    pub collapse: Option<(u32, SourceLoc)>,
    /// At least one clause item was rejected
    pub failed: bool,
}

/// Registers the explicit attributes of one directive in the innermost frame
pub struct ClauseProcessor<'s, 'c, 'a> {
    stack: &'s mut DirectiveRegionStack,
    cx: &'c mut AnalysisContext<'a>,
    directive: DirectiveKind,
}

impl<'s, 'c, 'a> ClauseProcessor<'s, 'c, 'a> {
    /// Processor for clauses of a `directive` whose frame is on top of `stack`.
    pub fn new(
        stack: &'s mut DirectiveRegionStack,
        cx: &'c mut AnalysisContext<'a>,
        directive: DirectiveKind,
    ) -> Self {
        ClauseProcessor {
            stack,
            cx,
            directive,
        }
    }

    /// Processes every clause in order.
    pub fn process(&mut self, clauses: &[Clause]) -> ClauseOutcome {
        let mut outcome = ClauseOutcome::default();
        for clause in clauses {
            if self.cx.options.check_clause_applicability
                && !self.directive.allows_clause(&clause.kind)
            {
                let diag = Diagnostic::new(DiagnosticKind::ClauseNotAllowed, clause.loc)
                    .with_arg(clause.kind.name())
                    .with_arg(self.directive.name());
                self.cx.report(diag);
                outcome.failed = true;
                continue;
            }
            let ok = match clause.kind {
                ClauseKind::Private => self.each_var(clause, Self::private),
                ClauseKind::FirstPrivate => self.each_var(clause, Self::firstprivate),
                ClauseKind::LastPrivate => self.each_var(clause, Self::lastprivate),
                ClauseKind::Shared => self.each_var(clause, Self::shared),
                ClauseKind::Reduction(_) => self.each_var(clause, Self::reduction),
                ClauseKind::Linear => self.each_var(clause, Self::linear),
                ClauseKind::Aligned => self.each_var(clause, Self::aligned),
                ClauseKind::Copyin => self.each_var(clause, Self::copyin),
                ClauseKind::Default(DefaultKind::None) => {
                    self.stack.set_default_dsa_none(clause.loc);
                    true
                }
                ClauseKind::Default(DefaultKind::Shared) => {
                    self.stack.set_default_dsa_shared(clause.loc);
                    true
                }
                ClauseKind::Collapse => match self.collapse_count(clause) {
                    Some(n) => {
                        outcome.collapse = Some((n, clause.loc));
                        true
                    }
                    None => false,
                },
                ClauseKind::Ordered => {
                    self.stack.set_ordered_region(true);
                    true
                }
                ClauseKind::Nowait => {
                    self.stack.set_nowait_region(true);
                    true
                }
                _ => true,
            };
            if !ok {
                outcome.failed = true;
            }
        }
        tracing::debug!(
            directive = %self.directive,
            clauses = clauses.len(),
            failed = outcome.failed,
            "processed clauses"
        );
        outcome
    }

    /// Registers the variables of a `threadprivate` directive.
    pub fn process_threadprivate(&mut self, directive: &DirectiveStmt) -> bool {
        let mut ok = true;
        for &item in &directive.vars {
            let Some(var) = self.cx.ast.as_var_ref(item) else {
                self.report_item(DiagnosticKind::ExpectedVariableName, item);
                ok = false;
                continue;
            };
            if self.cx.ast.var(var).has_local_storage() {
                let decl = self.cx.ast.var(var);
                let diag = Diagnostic::new(DiagnosticKind::ThreadPrivateLocal, self.loc_of(item))
                    .with_aux(decl.loc)
                    .with_arg(decl.name.clone());
                self.cx.report(diag);
                ok = false;
                continue;
            }
            self.stack.add_dsa(var, Some(item), AttributeKind::ThreadPrivate);
        }
        ok
    }

    fn each_var<F>(&mut self, clause: &Clause, mut check: F) -> bool
    where
        F: FnMut(&mut Self, &Clause, ExprId, VarId) -> bool,
    {
        let mut ok = true;
        for &item in &clause.vars {
            match self.cx.ast.as_var_ref(item) {
                Some(var) => ok &= check(self, clause, item, var),
                None => {
                    self.report_item(DiagnosticKind::ExpectedVariableName, item);
                    ok = false;
                }
            }
        }
        ok
    }

    fn loc_of(&self, item: ExprId) -> SourceLoc {
        self.cx.ast.expr(item).loc
    }

    fn report_item(&mut self, kind: DiagnosticKind, item: ExprId) {
        let loc = self.loc_of(item);
        self.cx.report(Diagnostic::new(kind, loc));
    }

    fn resolver(&self) -> AttributeResolver<'_> {
        AttributeResolver::new(&*self.stack, self.cx.ast)
    }

    /// Attribute already given to `var` by a clause of this construct, or
    /// threadprivate
    fn explicit_dsa(&self, var: VarId) -> Option<DsaResolution> {
        let top = self.resolver().get_top_dsa(var, false);
        let innermost = self.stack.size() - 1;
        let is_explicit = top.kind == AttributeKind::ThreadPrivate
            || (top.source_ref.is_some() && top.frame == innermost);
        is_explicit.then_some(top)
    }

    fn report_conflict(
        &mut self,
        clause: &Clause,
        item: ExprId,
        var: VarId,
        existing: DsaResolution,
    ) {
        let mut diag = Diagnostic::new(DiagnosticKind::DsaConflict, self.loc_of(item))
            .with_arg(self.cx.ast.var(var).name.clone())
            .with_arg(existing.kind.name())
            .with_arg(clause.kind.name());
        if let Some(previous) = existing.source_ref {
            diag = diag.with_aux(self.loc_of(previous));
        }
        self.cx.report(diag);
    }

    fn check_not_const(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        let decl = self.cx.ast.var(var);
        if decl.is_const && !decl.ty.has_mutable_fields() {
            let diag = Diagnostic::new(DiagnosticKind::ConstVariableInClause, self.loc_of(item))
                .with_aux(decl.loc)
                .with_arg(decl.name.clone())
                .with_arg(clause.kind.name());
            self.cx.report(diag);
            return false;
        }
        true
    }

    /// Worksharing items must be shared in the binding parallel region.
    fn check_shared_in_parallel(&mut self, item: ExprId, var: VarId) -> bool {
        if !self.directive.is_worksharing() || self.directive.is_parallel() {
            return true;
        }
        let outer = self.resolver().get_implicit_dsa(var, true);
        if outer.kind != AttributeKind::Shared && outer.directive.is_parallel() {
            let mut diag = Diagnostic::new(DiagnosticKind::RequiredSharedAccess, self.loc_of(item))
                .with_arg(self.cx.ast.var(var).name.clone())
                .with_arg(outer.kind.name());
            if let Some(previous) = outer.source_ref {
                diag = diag.with_aux(self.loc_of(previous));
            }
            self.cx.report(diag);
            return false;
        }
        true
    }

    fn private(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if !self.check_not_const(clause, item, var) {
            return false;
        }
        if let Some(existing) = self.explicit_dsa(var) {
            if existing.kind != AttributeKind::Private {
                self.report_conflict(clause, item, var, existing);
                return false;
            }
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::Private);
        true
    }

    fn firstprivate(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if let Some(existing) = self.explicit_dsa(var) {
            let paired_lastprivate =
                existing.kind == AttributeKind::LastPrivate && self.directive.is_worksharing();
            if existing.kind != AttributeKind::FirstPrivate && !paired_lastprivate {
                self.report_conflict(clause, item, var, existing);
                return false;
            }
        }
        if !self.check_shared_in_parallel(item, var) {
            return false;
        }
        if self.directive == DirectiveKind::Task {
            let reduction = self.resolver().has_innermost_dsa(
                var,
                |kind| kind == AttributeKind::Reduction,
                |d| d.is_parallel() || d.is_worksharing(),
                false,
            );
            if reduction.kind == AttributeKind::Reduction {
                let mut diag =
                    Diagnostic::new(DiagnosticKind::FirstPrivateOfReduction, self.loc_of(item))
                        .with_arg(self.cx.ast.var(var).name.clone());
                if let Some(previous) = reduction.source_ref {
                    diag = diag.with_aux(self.loc_of(previous));
                }
                self.cx.report(diag);
                return false;
            }
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::FirstPrivate);
        true
    }

    fn lastprivate(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if !self.check_not_const(clause, item, var) {
            return false;
        }
        if let Some(existing) = self.explicit_dsa(var) {
            if !matches!(
                existing.kind,
                AttributeKind::LastPrivate | AttributeKind::FirstPrivate
            ) {
                self.report_conflict(clause, item, var, existing);
                return false;
            }
        }
        if !self.check_shared_in_parallel(item, var) {
            return false;
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::LastPrivate);
        true
    }

    fn shared(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if let Some(existing) = self.explicit_dsa(var) {
            if existing.kind != AttributeKind::Shared {
                self.report_conflict(clause, item, var, existing);
                return false;
            }
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::Shared);
        true
    }

    fn reduction(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if !self.check_not_const(clause, item, var) {
            return false;
        }
        if let Some(existing) = self.explicit_dsa(var) {
            self.report_conflict(clause, item, var, existing);
            return false;
        }
        if !self.check_shared_in_parallel(item, var) {
            return false;
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::Reduction);
        true
    }

    fn linear(&mut self, clause: &Clause, item: ExprId, var: VarId) -> bool {
        if !self.check_not_const(clause, item, var) {
            return false;
        }
        if let Some(existing) = self.explicit_dsa(var) {
            self.report_conflict(clause, item, var, existing);
            return false;
        }
        self.stack.add_dsa(var, Some(item), AttributeKind::Linear);
        true
    }

    fn aligned(&mut self, _clause: &Clause, item: ExprId, var: VarId) -> bool {
        let decl = self.cx.ast.var(var);
        if !matches!(decl.ty, VarType::Pointer | VarType::Array { .. }) {
            let diag = Diagnostic::new(DiagnosticKind::AlignedNotPointer, self.loc_of(item))
                .with_aux(decl.loc)
                .with_arg(decl.name.clone());
            self.cx.report(diag);
            return false;
        }
        if let Some(previous) = self.stack.add_unique_aligned(var, item) {
            let diag = Diagnostic::new(DiagnosticKind::AlignedUsedTwice, self.loc_of(item))
                .with_aux(self.loc_of(previous))
                .with_arg(self.cx.ast.var(var).name.clone());
            self.cx.report(diag);
            return false;
        }
        true
    }

    fn copyin(&mut self, _clause: &Clause, item: ExprId, var: VarId) -> bool {
        if self.resolver().get_top_dsa(var, false).kind != AttributeKind::ThreadPrivate {
            let diag = Diagnostic::new(DiagnosticKind::CopyinNotThreadPrivate, self.loc_of(item))
                .with_arg(self.cx.ast.var(var).name.clone());
            self.cx.report(diag);
            return false;
        }
        true
    }

    fn collapse_count(&mut self, clause: &Clause) -> Option<u32> {
        let value = clause.aux.and_then(|arg| self.cx.ast.eval_constant(arg));
        let n = match value {
            Some(n) if n > 0 => n,
            _ => {
                self.cx
                    .report(Diagnostic::new(DiagnosticKind::CollapseNotPositive, clause.loc));
                return None;
            }
        };
        let max = self.cx.options.max_collapse_depth;
        if n > max as i128 {
            self.cx.report(
                Diagnostic::new(DiagnosticKind::CollapseTooDeep, clause.loc)
                    .with_arg(n.to_string())
                    .with_arg(max.to_string()),
            );
            return None;
        }
        let n = n as u32;
        self.stack.set_collapse_number(n);
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, DeclKind, ScopeKind};
    use crate::diagnostics::DiagnosticBuffer;
    use crate::options::AnalysisOptions;

    fn loc(line: u32, column: u32) -> SourceLoc {
        SourceLoc::new(line, column)
    }

    fn setup() -> (Ast, VarId, VarId) {
        let mut ast = Ast::new();
        let tu = ast.tu_scope();
        let func = ast.add_scope(tu, ScopeKind::Function);
        let x = ast.declare("x", VarType::INT, DeclKind::Local, func, loc(1, 5));
        let p = ast.declare("p", VarType::Pointer, DeclKind::Local, func, loc(2, 5));
        (ast, x, p)
    }

    #[test]
    fn test_private_then_shared_conflicts() {
        let (mut ast, x, _) = setup();
        let a = ast.var_ref(x, loc(3, 30));
        let b = ast.var_ref(x, loc(3, 40));
        let clauses = vec![
            Clause::with_vars(ClauseKind::Private, vec![a], loc(3, 22)),
            Clause::with_vars(ClauseKind::Shared, vec![b], loc(3, 33)),
        ];
        let options = AnalysisOptions::default();
        let mut sink = DiagnosticBuffer::new();
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, None, loc(3, 1));
        let mut cx = AnalysisContext::new(&ast, &mut sink, &options);
        let outcome =
            ClauseProcessor::new(&mut stack, &mut cx, DirectiveKind::Parallel).process(&clauses);
        assert!(outcome.failed);
        assert_eq!(sink.kinds(), vec![DiagnosticKind::DsaConflict]);
        assert_eq!(sink.diagnostics()[0].aux, vec![loc(3, 30)]);
        assert_eq!(stack.top().entry(x).map(|e| e.kind), Some(AttributeKind::Private));
    }

    #[test]
    fn test_duplicate_aligned() {
        let (mut ast, _, p) = setup();
        let a = ast.var_ref(p, loc(4, 20));
        let b = ast.var_ref(p, loc(4, 35));
        let clauses = vec![
            Clause::with_vars(ClauseKind::Aligned, vec![a], loc(4, 12)),
            Clause::with_vars(ClauseKind::Aligned, vec![b], loc(4, 27)),
        ];
        let options = AnalysisOptions::default();
        let mut sink = DiagnosticBuffer::new();
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Simd, None, None, loc(4, 1));
        let mut cx = AnalysisContext::new(&ast, &mut sink, &options);
        let outcome =
            ClauseProcessor::new(&mut stack, &mut cx, DirectiveKind::Simd).process(&clauses);
        assert!(outcome.failed);
        assert_eq!(sink.kinds(), vec![DiagnosticKind::AlignedUsedTwice]);
        assert_eq!(sink.diagnostics()[0].aux, vec![loc(4, 20)]);
    }

    #[test]
    fn test_collapse_argument_validation() {
        let (mut ast, _, _) = setup();
        let zero = ast.int(0, loc(5, 25));
        let two = ast.int(2, loc(5, 25));
        let options = AnalysisOptions::default();

        let mut sink = DiagnosticBuffer::new();
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::For, None, None, loc(5, 1));
        let mut cx = AnalysisContext::new(&ast, &mut sink, &options);
        let bad = [Clause::with_arg(ClauseKind::Collapse, zero, loc(5, 16))];
        let outcome = ClauseProcessor::new(&mut stack, &mut cx, DirectiveKind::For).process(&bad);
        assert!(outcome.failed);
        assert_eq!(outcome.collapse, None);

        let good = [Clause::with_arg(ClauseKind::Collapse, two, loc(5, 16))];
        let outcome = ClauseProcessor::new(&mut stack, &mut cx, DirectiveKind::For).process(&good);
        assert_eq!(outcome.collapse, Some((2, loc(5, 16))));
        assert_eq!(stack.collapse_number(), 2);
        assert_eq!(sink.kinds(), vec![DiagnosticKind::CollapseNotPositive]);
    }

    #[test]
    fn test_clause_not_allowed() {
        let (mut ast, x, _) = setup();
        let a = ast.var_ref(x, loc(6, 30));
        let clauses = [Clause::with_vars(ClauseKind::LastPrivate, vec![a], loc(6, 18))];
        let options = AnalysisOptions::default();
        let mut sink = DiagnosticBuffer::new();
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Task, None, None, loc(6, 1));
        let mut cx = AnalysisContext::new(&ast, &mut sink, &options);
        let outcome =
            ClauseProcessor::new(&mut stack, &mut cx, DirectiveKind::Task).process(&clauses);
        assert!(outcome.failed);
        assert_eq!(sink.kinds(), vec![DiagnosticKind::ClauseNotAllowed]);
    }
}
