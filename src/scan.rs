//! Implicit attribute discovery over a construct body
//!
//! The scanner runs with the construct's own frame on top of the stack. Each
//! variable reference without an explicit attribute is classified once, in
//! source order.

use crate::ast::{ExprId, ExprKind, StmtId, StmtKind, VarId};
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::directive::DirectiveKind;
use crate::dsa::{AttributeKind, AttributeResolver, DefaultAttribute, DirectiveRegionStack};
use std::collections::HashSet;

/// What the scan found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// First reference of each variable that becomes implicitly firstprivate
    pub implicit_firstprivate: Vec<ExprId>,
    /// Variables without an attribute under `default(none)`, with their
    /// first reference
    pub unresolved: Vec<(VarId, ExprId)>,
    /// A reference was rejected
    pub failed: bool,
}

enum Node {
    Stmt(StmtId),
    Expr(ExprId),
}

/// Walks a construct body and classifies every referenced variable
pub struct RegionBodyScanner<'s> {
    stack: &'s DirectiveRegionStack,
}

impl<'s> RegionBodyScanner<'s> {
    pub fn new(stack: &'s DirectiveRegionStack) -> Self {
        RegionBodyScanner { stack }
    }

    /// Scans `body` of the innermost construct.
    pub fn scan(&self, cx: &mut AnalysisContext<'_>, body: StmtId) -> ScanResult {
        let ast = cx.ast;
        let mut result = ScanResult::default();
        let mut seen = HashSet::new();
        let mut work = vec![Node::Stmt(body)];

        while let Some(node) = work.pop() {
            let mut children = Vec::new();
            match node {
                Node::Stmt(id) => match &ast.stmt(id).kind {
                    StmtKind::Expr(e) => children.push(Node::Expr(*e)),
                    StmtKind::Decl(vars) => children.extend(
                        vars.iter()
                            .filter_map(|&v| ast.var(v).init)
                            .map(Node::Expr),
                    ),
                    StmtKind::For {
                        init,
                        cond,
                        inc,
                        body,
                    } => {
                        children.extend(init.map(Node::Stmt));
                        children.extend(cond.map(Node::Expr));
                        children.extend(inc.map(Node::Expr));
                        children.push(Node::Stmt(*body));
                    }
                    StmtKind::Compound(stmts) => {
                        children.extend(stmts.iter().copied().map(Node::Stmt))
                    }
                    StmtKind::Directive(d) => {
                        if cx.options.scan_nested_directives {
                            for clause in &d.clauses {
                                children.extend(clause.vars.iter().copied().map(Node::Expr));
                                children.extend(clause.aux.map(Node::Expr));
                            }
                            children.extend(d.vars.iter().copied().map(Node::Expr));
                            children.extend(d.body.map(Node::Stmt));
                        }
                    }
                    StmtKind::Null => {}
                },
                Node::Expr(id) => {
                    if let ExprKind::VarRef(var) = ast.expr(id).kind {
                        if seen.insert(var) {
                            self.visit_ref(cx, var, id, &mut result);
                        }
                    }
                    children.extend(ast.children(id).into_iter().map(Node::Expr));
                }
            }
            work.extend(children.into_iter().rev());
        }

        tracing::debug!(
            directive = %self.stack.current_directive(),
            vars = seen.len(),
            firstprivate = result.implicit_firstprivate.len(),
            unresolved = result.unresolved.len(),
            "scanned region body"
        );
        result
    }

    fn visit_ref(
        &self,
        cx: &mut AnalysisContext<'_>,
        var: VarId,
        item: ExprId,
        result: &mut ScanResult,
    ) {
        let ast = cx.ast;
        let decl = ast.var(var);
        let top = self.stack.top();
        if decl.is_function_local()
            && top
                .scope
                .is_some_and(|scope| ast.is_scope_within(decl.scope, scope))
        {
            return;
        }

        let resolver = AttributeResolver::new(self.stack, ast);
        let resolution = resolver.get_top_dsa(var, false);
        if resolution.source_ref.is_some() {
            return;
        }

        let directive = top.directive;
        if resolution.kind == AttributeKind::Unknown
            && top.default_attr == DefaultAttribute::None
            && directive.is_parallel_or_task()
        {
            result.unresolved.push((var, item));
            return;
        }

        let reduction = resolver.has_innermost_dsa(
            var,
            |kind| kind == AttributeKind::Reduction,
            |d| d.is_parallel() || d.is_worksharing() || d.is_teams(),
            false,
        );
        if directive == DirectiveKind::Task && reduction.kind == AttributeKind::Reduction {
            let mut diag = Diagnostic::new(DiagnosticKind::ReductionInTask, ast.expr(item).loc)
                .with_arg(decl.name.clone());
            if let Some(original) = reduction.source_ref {
                diag = diag.with_aux(ast.expr(original).loc);
            }
            cx.report(diag);
            result.failed = true;
            return;
        }

        if directive == DirectiveKind::Task
            && resolver.get_implicit_dsa(var, false).kind != AttributeKind::Shared
        {
            result.implicit_firstprivate.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, DeclKind, ScopeKind, SourceLoc, VarType};
    use crate::diagnostics::Diagnostic;
    use crate::options::AnalysisOptions;

    fn loc(line: u32) -> SourceLoc {
        SourceLoc::new(line, 1)
    }

    #[test]
    fn test_default_none_collects_unlisted_vars_once() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let x = ast.declare("x", VarType::INT, DeclKind::Local, func, loc(1));
        let region = ast.add_scope(func, ScopeKind::Directive(DirectiveKind::Parallel));
        let a = ast.var_ref(x, loc(3));
        let b = ast.var_ref(x, loc(4));
        let s1 = ast.expr_stmt(a);
        let s2 = ast.expr_stmt(b);
        let body = ast.compound(vec![s1, s2], loc(2));

        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, Some(region), loc(2));
        stack.set_default_dsa_none(loc(2));

        let options = AnalysisOptions::default();
        let mut diags: Vec<Diagnostic> = Vec::new();
        let mut cx = AnalysisContext::new(&ast, &mut diags, &options);
        let result = RegionBodyScanner::new(&stack).scan(&mut cx, body);
        assert_eq!(result.unresolved, vec![(x, a)]);
        assert!(result.implicit_firstprivate.is_empty());
    }

    #[test]
    fn test_region_locals_are_skipped() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let region = ast.add_scope(func, ScopeKind::Directive(DirectiveKind::Task));
        let block = ast.add_scope(region, ScopeKind::Block);
        let t = ast.declare("t", VarType::INT, DeclKind::Local, block, loc(3));
        let r = ast.var_ref(t, loc(4));
        let body = ast.expr_stmt(r);

        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Task, None, Some(region), loc(2));
        stack.set_default_dsa_none(loc(2));

        let options = AnalysisOptions::default();
        let mut diags: Vec<Diagnostic> = Vec::new();
        let mut cx = AnalysisContext::new(&ast, &mut diags, &options);
        let result = RegionBodyScanner::new(&stack).scan(&mut cx, body);
        assert_eq!(result, ScanResult::default());
    }

    #[test]
    fn test_task_local_becomes_firstprivate() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let x = ast.declare("x", VarType::INT, DeclKind::Local, func, loc(1));
        let region = ast.add_scope(func, ScopeKind::Directive(DirectiveKind::Task));
        let r = ast.var_ref(x, loc(3));
        let body = ast.expr_stmt(r);

        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Task, None, Some(region), loc(2));

        let options = AnalysisOptions::default();
        let mut diags: Vec<Diagnostic> = Vec::new();
        let mut cx = AnalysisContext::new(&ast, &mut diags, &options);
        let result = RegionBodyScanner::new(&stack).scan(&mut cx, body);
        assert_eq!(result.implicit_firstprivate, vec![r]);
    }
}
