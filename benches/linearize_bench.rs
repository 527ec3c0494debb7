use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ompsema::{
    AnalysisContext, AnalysisOptions, Ast, BinaryOp, Clause, ClauseKind, CollapseLinearizer,
    DeclKind, DiagnosticBuffer, DirectiveAnalyzer, DirectiveKind, DirectiveStmt, ScopeKind,
    SourceLoc, StmtId, VarId, VarType,
};

fn counted_loop(ast: &mut Ast, var: VarId, ub: i128, body: StmtId) -> StmtId {
    let loc = SourceLoc::new(1, 1);
    let lhs = ast.var_ref(var, loc);
    let zero = ast.int(0, loc);
    let init = ast.assign(lhs, zero, loc);
    let init = ast.expr_stmt(init);
    let r = ast.var_ref(var, loc);
    let ub = ast.int(ub, loc);
    let cond = ast.binary(BinaryOp::Lt, r, ub, loc);
    let r = ast.var_ref(var, loc);
    let one = ast.int(1, loc);
    let inc = ast.compound_assign(BinaryOp::Add, r, one, loc);
    ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc)
}

/// `parallel for collapse(3)` over a 3-level nest
fn collapsed_nest() -> (Ast, StmtId, StmtId) {
    let loc = SourceLoc::new(1, 1);
    let mut ast = Ast::new();
    let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
    let region = ast.add_scope(func, ScopeKind::Directive(DirectiveKind::ParallelFor));
    let i = ast.declare("i", VarType::INT, DeclKind::Local, func, loc);
    let j = ast.declare("j", VarType::INT, DeclKind::Local, func, loc);
    let k = ast.declare("k", VarType::INT, DeclKind::Local, func, loc);

    let body = ast.null_stmt(loc);
    let inner = counted_loop(&mut ast, k, 64, body);
    let middle = counted_loop(&mut ast, j, 32, inner);
    let outer = counted_loop(&mut ast, i, 16, middle);
    let count = ast.int(3, loc);
    let directive = ast.directive(
        DirectiveStmt {
            kind: DirectiveKind::ParallelFor,
            name: None,
            cancel_region: None,
            clauses: vec![Clause::with_arg(ClauseKind::Collapse, count, loc)],
            vars: Vec::new(),
            body: Some(outer),
            scope: region,
        },
        loc,
    );
    (ast, directive, outer)
}

fn linearize_benchmark(c: &mut Criterion) {
    let (ast, directive, outer) = collapsed_nest();
    let options = AnalysisOptions::default();

    c.bench_function("linearize collapse(3) nest", |b| {
        b.iter(|| {
            let mut sink = DiagnosticBuffer::new();
            let mut cx = AnalysisContext::new(&ast, &mut sink, &options);
            let collapse = Some((3, SourceLoc::new(1, 1)));
            let linearizer = CollapseLinearizer::new(DirectiveKind::ParallelFor, collapse);
            linearizer.check_loop(&mut cx, black_box(outer))
        })
    });

    c.bench_function("analyze parallel for collapse(3)", |b| {
        b.iter(|| {
            let mut sink = DiagnosticBuffer::new();
            DirectiveAnalyzer::new(&ast, &options).analyze(&mut sink, black_box(directive))
        })
    });
}

criterion_group!(benches, linearize_benchmark);
criterion_main!(benches);
