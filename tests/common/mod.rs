//! Shared builders for integration tests

#![allow(dead_code)]

use ompsema::{
    AnalysisOptions, Ast, BinaryOp, Clause, ClauseKind, DeclKind, DiagnosticBuffer,
    DiagnosticKind, DirectiveAnalysis, DirectiveAnalyzer, DirectiveKind, DirectiveStmt, ScopeId,
    ScopeKind, SourceLoc, StmtId, VarId, VarType,
};

pub fn loc(line: u32) -> SourceLoc {
    SourceLoc::new(line, 1)
}

/// One function body under construction
pub struct Program {
    pub ast: Ast,
    pub func: ScopeId,
}

impl Program {
    pub fn new() -> Self {
        let mut ast = Ast::new();
        let tu = ast.tu_scope();
        let func = ast.add_scope(tu, ScopeKind::Function);
        Program { ast, func }
    }

    /// `int name;` in the function body
    pub fn local(&mut self, name: &str) -> VarId {
        self.ast.declare(name, VarType::INT, DeclKind::Local, self.func, loc(1))
    }

    pub fn local_typed(&mut self, name: &str, ty: VarType) -> VarId {
        self.ast.declare(name, ty, DeclKind::Local, self.func, loc(1))
    }

    /// `int name;` at file scope
    pub fn global(&mut self, name: &str) -> VarId {
        let tu = self.ast.tu_scope();
        self.ast.declare(name, VarType::INT, DeclKind::Global, tu, loc(1))
    }

    /// `var;`
    pub fn use_var(&mut self, var: VarId, line: u32) -> StmtId {
        let r = self.ast.var_ref(var, loc(line));
        self.ast.expr_stmt(r)
    }

    pub fn block(&mut self, stmts: Vec<StmtId>, line: u32) -> StmtId {
        self.ast.compound(stmts, loc(line))
    }

    /// `for (var = lb; var < ub; var += step) body`
    pub fn counted_loop(
        &mut self,
        var: VarId,
        lb: i128,
        ub: i128,
        step: i128,
        body: StmtId,
        line: u32,
    ) -> StmtId {
        let at = loc(line);
        let lhs = self.ast.var_ref(var, at);
        let lb = self.ast.int(lb, at);
        let init = self.ast.assign(lhs, lb, at);
        let init = self.ast.expr_stmt(init);
        let r = self.ast.var_ref(var, at);
        let ub = self.ast.int(ub, at);
        let cond = self.ast.binary(BinaryOp::Lt, r, ub, at);
        let r = self.ast.var_ref(var, at);
        let step = self.ast.int(step, at);
        let inc = self.ast.compound_assign(BinaryOp::Add, r, step, at);
        self.ast.for_stmt(Some(init), Some(cond), Some(inc), body, at)
    }

    /// Clause listing `vars`
    pub fn clause(&mut self, kind: ClauseKind, vars: &[VarId], line: u32) -> Clause {
        let refs = vars.iter().map(|&v| self.ast.var_ref(v, loc(line))).collect();
        Clause::with_vars(kind, refs, loc(line))
    }

    /// `collapse(n)`
    pub fn collapse(&mut self, n: i128, line: u32) -> Clause {
        let arg = self.ast.int(n, loc(line));
        Clause::with_arg(ClauseKind::Collapse, arg, loc(line))
    }

    /// Directive with its own region scope under the function scope
    pub fn directive(
        &mut self,
        kind: DirectiveKind,
        clauses: Vec<Clause>,
        body: Option<StmtId>,
        line: u32,
    ) -> StmtId {
        let scope = self.ast.add_scope(self.func, ScopeKind::Directive(kind));
        self.directive_in(scope, kind, clauses, body, line)
    }

    pub fn directive_in(
        &mut self,
        scope: ScopeId,
        kind: DirectiveKind,
        clauses: Vec<Clause>,
        body: Option<StmtId>,
        line: u32,
    ) -> StmtId {
        let stmt = DirectiveStmt {
            kind,
            name: None,
            cancel_region: None,
            clauses,
            vars: Vec::new(),
            body,
            scope,
        };
        self.ast.directive(stmt, loc(line))
    }

    pub fn analyze(&self, root: StmtId) -> (Vec<DirectiveAnalysis>, DiagnosticBuffer) {
        self.analyze_with(root, &AnalysisOptions::default())
    }

    pub fn analyze_with(
        &self,
        root: StmtId,
        options: &AnalysisOptions,
    ) -> (Vec<DirectiveAnalysis>, DiagnosticBuffer) {
        let mut diagnostics = DiagnosticBuffer::new();
        let results = DirectiveAnalyzer::new(&self.ast, options).analyze(&mut diagnostics, root);
        (results, diagnostics)
    }
}

pub fn kinds(diagnostics: &DiagnosticBuffer) -> Vec<DiagnosticKind> {
    diagnostics.kinds()
}
