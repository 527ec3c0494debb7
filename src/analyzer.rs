//! Depth-first driver over a statement tree
//!
//! For every directive statement the analyzer runs, in order: the nesting
//! check, frame push, explicit clauses, nested directives, the body scan,
//! loop linearization with loop-control attributes, the `default(none)`
//! report, implicit firstprivate registration and finally the frame pop.
//! A construct rejected by the nesting check is not entered; its siblings
//! are still analysed.

use crate::ast::{Ast, ExprId, SourceLoc, StmtId, StmtKind, VarId};
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::directive::DirectiveKind;
use crate::dsa::{
    AttributeKind, AttributeResolver, ClauseProcessor, DirectiveRegionStack, SharingMap,
};
use crate::error::Result;
use crate::loops::{CollapseLinearizer, LinearizedLoop};
use crate::nesting::{NestingCandidate, NestingValidator};
use crate::options::AnalysisOptions;
use crate::scan::RegionBodyScanner;
use serde::Serialize;

/// How the analysis of one construct ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisOutcome {
    /// Everything checked out
    Success,
    /// The construct may not appear here; it was not entered
    NestingRejected,
    /// Entered, but at least one error was reported
    Failed,
}

/// Attribute registered in a construct's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeRecord {
    pub var: VarId,
    pub kind: AttributeKind,
    /// Clause item (or loop init reference) that set it
    pub source_ref: Option<ExprId>,
}

/// Result for one directive statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveAnalysis {
    pub stmt: StmtId,
    pub kind: DirectiveKind,
    pub loc: SourceLoc,
    pub outcome: AnalysisOutcome,
    /// Final attributes of the construct's frame, ordered by variable
    pub attributes: Vec<AttributeRecord>,
    /// References that became implicitly firstprivate (`task` only)
    pub implicit_firstprivate: Vec<ExprId>,
    /// Flattened loop nest of a loop directive
    pub loop_nest: Option<LinearizedLoop>,
}

impl DirectiveAnalysis {
    fn new(stmt: StmtId, kind: DirectiveKind, loc: SourceLoc) -> Self {
        DirectiveAnalysis {
            stmt,
            kind,
            loc,
            outcome: AnalysisOutcome::Success,
            attributes: Vec::new(),
            implicit_firstprivate: Vec::new(),
            loop_nest: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AnalysisOutcome::Success
    }

    /// Attribute of `var` in this construct's frame
    pub fn attribute(&self, var: VarId) -> Option<AttributeKind> {
        self.attributes.iter().find(|r| r.var == var).map(|r| r.kind)
    }

    /// JSON hand-off for a code generator.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Walks statements and analyses every directive it meets
pub struct DirectiveAnalyzer<'a> {
    ast: &'a Ast,
    options: &'a AnalysisOptions,
    stack: DirectiveRegionStack,
}

impl<'a> DirectiveAnalyzer<'a> {
    pub fn new(ast: &'a Ast, options: &'a AnalysisOptions) -> Self {
        DirectiveAnalyzer {
            ast,
            options,
            stack: DirectiveRegionStack::new(),
        }
    }

    /// Region stack; only the sentinel remains between calls to
    /// [`analyze`](Self::analyze), holding `threadprivate` registrations.
    pub fn stack(&self) -> &DirectiveRegionStack {
        &self.stack
    }

    /// Analyses every directive under `root`. Results are in source order,
    /// enclosing constructs before the ones nested in them.
    pub fn analyze(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        root: StmtId,
    ) -> Vec<DirectiveAnalysis> {
        let mut cx = AnalysisContext::new(self.ast, sink, self.options);
        let mut results = Vec::new();
        self.walk(&mut cx, root, &mut results);
        results
    }

    fn walk(
        &mut self,
        cx: &mut AnalysisContext<'_>,
        stmt: StmtId,
        out: &mut Vec<DirectiveAnalysis>,
    ) {
        let ast = cx.ast;
        match &ast.stmt(stmt).kind {
            StmtKind::Directive(_) => self.analyze_directive(cx, stmt, out),
            StmtKind::Compound(stmts) => {
                for &s in stmts {
                    self.walk(cx, s, out);
                }
            }
            StmtKind::For { body, .. } => self.walk(cx, *body, out),
            StmtKind::Expr(_) | StmtKind::Decl(_) | StmtKind::Null => {}
        }
    }

    fn analyze_directive(
        &mut self,
        cx: &mut AnalysisContext<'_>,
        stmt: StmtId,
        out: &mut Vec<DirectiveAnalysis>,
    ) {
        let ast = cx.ast;
        let node = ast.stmt(stmt);
        let StmtKind::Directive(d) = &node.kind else {
            return;
        };
        let loc = node.loc;
        let mut analysis = DirectiveAnalysis::new(stmt, d.kind, loc);

        let candidate = NestingCandidate {
            kind: d.kind,
            name: d.name.as_deref(),
            cancel_region: d.cancel_region,
            loc,
        };
        if NestingValidator::new(&self.stack).check(cx, &candidate).is_err() {
            analysis.outcome = AnalysisOutcome::NestingRejected;
            out.push(analysis);
            return;
        }

        if d.kind == DirectiveKind::ThreadPrivate {
            let ok = ClauseProcessor::new(&mut self.stack, cx, d.kind).process_threadprivate(d);
            let sentinel = &self.stack.frames()[0];
            analysis.attributes = d
                .vars
                .iter()
                .filter_map(|&item| ast.as_var_ref(item))
                .filter_map(|var| {
                    sentinel.entry(var).map(|e| AttributeRecord {
                        var,
                        kind: e.kind,
                        source_ref: e.source_ref,
                    })
                })
                .collect();
            if !ok {
                analysis.outcome = AnalysisOutcome::Failed;
            }
            out.push(analysis);
            return;
        }

        let slot = out.len();
        out.push(analysis.clone());

        let saved_scope = cx.current_scope;
        cx.current_scope = d.scope;
        self.stack.push(d.kind, d.name.clone(), Some(d.scope), loc);
        if d.kind.is_teams() {
            self.stack.set_parent_teams_region_loc(loc);
        }

        let clauses = ClauseProcessor::new(&mut self.stack, cx, d.kind).process(&d.clauses);
        let mut failed = clauses.failed;
        if let Some((n, _)) = clauses.collapse {
            self.stack.set_collapse_number(n);
        }

        if let Some(body) = d.body {
            self.walk(cx, body, out);

            let scan = RegionBodyScanner::new(&self.stack).scan(cx, body);
            failed |= scan.failed;
            let mut unresolved = scan.unresolved;

            if d.kind.is_loop() {
                match CollapseLinearizer::new(d.kind, clauses.collapse).check_loop(cx, body) {
                    Some(nest) => {
                        failed |= !self.register_loop_controls(cx, d.kind, &nest);
                        unresolved.retain(|(var, _)| !self.stack.is_loop_control_variable(*var));
                        analysis.loop_nest = Some(nest);
                    }
                    None => failed = true,
                }
            }

            for (var, item) in unresolved {
                let loc = ast.expr(item).loc;
                let diag = Diagnostic::new(DiagnosticKind::DefaultNoneUnresolved, loc)
                    .with_aux(self.stack.top().default_loc)
                    .with_arg(ast.var(var).name.clone());
                cx.report(diag);
                failed = true;
            }

            for &item in &scan.implicit_firstprivate {
                if let Some(var) = ast.as_var_ref(item) {
                    self.stack.add_dsa(var, Some(item), AttributeKind::FirstPrivate);
                }
            }
            analysis.implicit_firstprivate = scan.implicit_firstprivate;

            if d.kind == DirectiveKind::Target && !self.check_target_teams(cx, body, loc) {
                failed = true;
            }
        }

        match self.stack.pop() {
            Ok(frame) => analysis.attributes = records(&frame),
            Err(err) => {
                tracing::warn!(%err, "region stack out of balance");
                failed = true;
            }
        }
        cx.current_scope = saved_scope;

        if failed {
            analysis.outcome = AnalysisOutcome::Failed;
        }
        tracing::debug!(
            directive = %analysis.kind,
            outcome = ?analysis.outcome,
            attributes = analysis.attributes.len(),
            "analysed directive"
        );
        out[slot] = analysis;
    }

    /// Gives every loop variable its predetermined attribute. Returns false if
    /// an explicit attribute contradicts it.
    fn register_loop_controls(
        &mut self,
        cx: &mut AnalysisContext<'_>,
        kind: DirectiveKind,
        nest: &LinearizedLoop,
    ) -> bool {
        let ast = cx.ast;
        let predetermined = if !kind.is_simd() {
            AttributeKind::Private
        } else if nest.level_count() == 1 {
            AttributeKind::Linear
        } else {
            AttributeKind::LastPrivate
        };
        let top = self.stack.size() - 1;
        let mut ok = true;

        for level in &nest.levels {
            let var = level.counter_var;
            self.stack.add_loop_control_variable(var);
            let current = AttributeResolver::new(&self.stack, ast).get_top_dsa(var, false);

            let allowed = match current.kind {
                AttributeKind::Unknown | AttributeKind::ThreadPrivate => true,
                k if kind.is_simd() => k == predetermined,
                AttributeKind::Private | AttributeKind::LastPrivate => true,
                _ => false,
            };
            // Only a clause on this construct can conflict; attributes
            // inherited from enclosing constructs are replaced
            let explicit_here = current.source_ref.is_some() && current.frame == top;
            if !allowed && explicit_here {
                let decl = ast.var(var);
                let mut diag = Diagnostic::new(DiagnosticKind::LoopVarDsa, level.init_range.begin)
                    .with_arg(decl.name.clone())
                    .with_arg(current.kind.name())
                    .with_arg(kind.name())
                    .with_arg(predetermined.name());
                if let Some(original) = current.source_ref {
                    diag = diag.with_aux(ast.expr(original).loc);
                }
                cx.report(diag);
                ok = false;
                continue;
            }

            if let (Some(var_ref), false) = (level.counter_ref, explicit_here) {
                self.stack.add_dsa(var, Some(var_ref), predetermined);
            }
        }
        ok
    }

    /// A `target` region holding a `teams` construct holds nothing else.
    fn check_target_teams(
        &self,
        cx: &mut AnalysisContext<'_>,
        body: StmtId,
        loc: SourceLoc,
    ) -> bool {
        let Some(teams_loc) = self.stack.inner_teams_region_loc() else {
            return true;
        };
        let ast = cx.ast;
        let is_teams =
            |s: StmtId| matches!(&ast.stmt(s).kind, StmtKind::Directive(d) if d.kind.is_teams());
        let inner = ast.ignore_containers(body);
        let offending = match &ast.stmt(inner).kind {
            StmtKind::Compound(stmts) => stmts.iter().copied().find(|&s| !is_teams(s)),
            _ if is_teams(inner) => None,
            _ => Some(inner),
        };
        match offending {
            Some(s) => {
                let diag = Diagnostic::new(DiagnosticKind::TargetTeamsNotAlone, loc)
                    .with_aux(teams_loc)
                    .with_aux(ast.stmt(s).loc);
                cx.report(diag);
                false
            }
            None => true,
        }
    }
}

fn records(frame: &SharingMap) -> Vec<AttributeRecord> {
    let mut records: Vec<_> = frame
        .entries
        .iter()
        .map(|(&var, entry)| AttributeRecord {
            var,
            kind: entry.kind,
            source_ref: entry.source_ref,
        })
        .collect();
    records.sort_by_key(|r| r.var);
    records
}
