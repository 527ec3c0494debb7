//! Collapse linearization
//!
//! `N` perfectly nested loops become one loop over a single induction
//! variable `IV` in `[0, total)`. Each original counter is recovered from
//! `IV`, innermost level first:
//!
//! ```text
//! idx(k)  = (IV / Div(k)) % count(k)      (no division at the innermost
//!                                          level, no modulo at the outermost)
//! Div(k)  = count(k+1) * ... * count(N-1)
//! var(k)  = init(k) +/- idx(k) * step(k)
//! ```

use super::expr::{IterExpr, IterOp, WorksharingBound};
use super::form::LoopFormChecker;
use super::space::{IterationSpaceBuilder, LoopIterationSpace};
use crate::ast::{IntType, SourceLoc, StmtId, StmtKind, VarId};
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::directive::DirectiveKind;
use serde::Serialize;

/// Bookkeeping for statically scheduled worksharing loops
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorksharingBounds {
    /// `LB`, initialised to 0
    pub lower: IterExpr,
    /// `UB`, initialised to the last iteration
    pub upper: IterExpr,
    /// `ST`, initialised to 1
    pub stride: IterExpr,
    /// `IL`, initialised to 0
    pub is_last: IterExpr,
    /// Initial values of `LB`, `UB`, `ST`, `IL`
    pub init: [IterExpr; 4],
    /// New `UB`: `UB > last ? last : UB`
    pub ensure_upper_bound: IterExpr,
    /// New `LB` for the next chunk: `LB + ST`
    pub next_lower: IterExpr,
    /// New `UB` for the next chunk: `UB + ST`
    pub next_upper: IterExpr,
}

/// Flattened iteration space of a loop-bearing directive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearizedLoop {
    /// Per-level spaces, outermost first
    pub levels: Vec<LoopIterationSpace>,
    /// Type of the induction variable and total trip count
    pub iteration_type: IntType,
    /// All per-level preconditions combined
    pub precondition: IterExpr,
    /// Total number of iterations
    pub total_trip_count: IterExpr,
    /// `total - 1`, or a reference to the saved temporary holding it
    pub last_iteration: IterExpr,
    /// Saved temporaries; `Temp { id }` indexes here
    pub temps: Vec<IterExpr>,
    /// Induction variable
    pub induction_var: IterExpr,
    /// Initial induction value (`0`, or `LB` for worksharing)
    pub iv_init: IterExpr,
    /// Loop condition (`IV < total`, or `IV <= UB` for worksharing)
    pub iv_cond: IterExpr,
    /// Next induction value (`IV + 1`)
    pub iv_inc: IterExpr,
    /// Value assigned to each level's counter per iteration, outermost first
    pub updates: Vec<IterExpr>,
    /// Value of each level's counter after the loop, outermost first
    pub finals: Vec<IterExpr>,
    /// Worksharing bookkeeping
    pub worksharing: Option<WorksharingBounds>,
}

impl LinearizedLoop {
    /// Number of collapsed levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Loop variables, outermost first
    pub fn counters(&self) -> Vec<VarId> {
        self.levels.iter().map(|l| l.counter_var).collect()
    }
}

/// Walks the loop nest of a directive and flattens it
pub struct CollapseLinearizer {
    directive: DirectiveKind,
    collapse: Option<(u32, SourceLoc)>,
}

impl CollapseLinearizer {
    /// Linearizer for `directive` with the validated `collapse` count and the
    /// clause location, if any.
    pub fn new(directive: DirectiveKind, collapse: Option<(u32, SourceLoc)>) -> Self {
        CollapseLinearizer {
            directive,
            collapse,
        }
    }

    fn nested_count(&self) -> u32 {
        self.collapse.map_or(1, |(n, _)| n)
    }

    /// Analyses the statement associated with the directive. Any failure at
    /// any level abandons the whole linearization.
    pub fn check_loop(&self, cx: &mut AnalysisContext<'_>, body: StmtId) -> Option<LinearizedLoop> {
        let levels = self.collect_levels(cx, body)?;
        Some(self.linearize(cx, levels))
    }

    fn collect_levels(
        &self,
        cx: &mut AnalysisContext<'_>,
        body: StmtId,
    ) -> Option<Vec<LoopIterationSpace>> {
        let ast = cx.ast;
        let count = self.nested_count();
        let limited = self.directive.needs_worksharing_bounds();
        let mut levels = Vec::with_capacity(count as usize);
        let mut current = body;
        for level in 0..count {
            current = ast.ignore_containers(current);
            let stmt = ast.stmt(current);
            let (cond, next) = match &stmt.kind {
                StmtKind::For { cond, body, .. } => (*cond, *body),
                _ => {
                    let mut diag = Diagnostic::new(DiagnosticKind::NotAForLoop, stmt.loc)
                        .with_arg(self.directive.name())
                        .with_arg(count.to_string())
                        .with_arg(level.to_string());
                    if let Some((_, collapse_loc)) = self.collapse {
                        diag = diag.with_aux(collapse_loc);
                    }
                    cx.report(diag);
                    return None;
                }
            };
            let form = match LoopFormChecker::new(ast).check(current) {
                Ok(form) => form,
                Err(diag) => {
                    cx.report(diag);
                    return None;
                }
            };
            let space = IterationSpaceBuilder::new(&form, cond).build(cx, limited)?;
            tracing::debug!(level, var = form.var.0, "loop level");
            levels.push(space);
            current = next;
        }
        Some(levels)
    }

    fn linearize(
        &self,
        cx: &AnalysisContext<'_>,
        levels: Vec<LoopIterationSpace>,
    ) -> LinearizedLoop {
        let n = levels.len();

        let mut precondition = levels[0].precondition.clone();
        for level in &levels[1..] {
            precondition = IterExpr::and(precondition, level.precondition.clone());
        }

        // Total trip count in 32 and 64 bits
        let first = &levels[0].trip_count;
        let mut all_counts_below_32 = first.ty().bits < 32;
        let mut total32 = widen(first.clone(), 32);
        let mut total64 = widen(first.clone(), 64);
        for level in &levels[1..] {
            let count = &level.trip_count;
            all_counts_below_32 &= count.ty().bits < 32;
            total32 = IterExpr::arith(IterOp::Mul, total32, count.clone());
            total64 = IterExpr::arith(IterOp::Mul, total64, count.clone());
        }
        let use_32 = total32.ty().bits == 32
            && (all_counts_below_32 || n == 1 || fits_into(32, total32.ty().signed, &total64, cx));
        let total = if use_32 { total32 } else { total64 };
        let ty = total.ty();
        tracing::debug!(levels = n, bits = ty.bits, "iteration count width");

        let one = IterExpr::constant(1, ty);
        let mut last_iteration = IterExpr::arith_in(IterOp::Sub, total.clone(), one.clone(), ty);
        let mut num_iterations = total.clone();
        let mut temps = Vec::new();
        if last_iteration.constant_value(cx.ast).is_none() {
            temps.push(last_iteration);
            last_iteration = IterExpr::Temp { id: 0, ty };
            num_iterations = IterExpr::arith_in(IterOp::Add, last_iteration.clone(), one, ty);
        }

        let worksharing = self
            .directive
            .needs_worksharing_bounds()
            .then(|| worksharing_bounds(ty, &last_iteration));

        let iv = IterExpr::Induction { ty };
        let (iv_init, iv_cond) = match &worksharing {
            Some(ws) => (
                ws.lower.clone(),
                IterExpr::compare(IterOp::Le, iv.clone(), ws.upper.clone()),
            ),
            None => (
                IterExpr::constant(0, ty),
                IterExpr::compare(IterOp::Lt, iv.clone(), num_iterations),
            ),
        };
        let iv_inc = IterExpr::arith_in(IterOp::Add, iv.clone(), IterExpr::constant(1, ty), ty);

        // Counter recovery, innermost level first
        let mut updates = vec![IterExpr::constant(0, ty); n];
        let mut finals = vec![IterExpr::constant(0, ty); n];
        let mut div: Option<IterExpr> = None;
        for k in (0..n).rev() {
            let space = &levels[k];
            let mut index = match &div {
                Some(d) => IterExpr::arith(IterOp::Div, iv.clone(), d.clone()),
                None => iv.clone(),
            };
            if k != 0 {
                index = IterExpr::arith(IterOp::Rem, index, space.trip_count.clone());
            }
            updates[k] = counter_update(space, index);
            finals[k] = counter_update(space, space.trip_count.clone());
            if k != 0 {
                div = Some(match div {
                    Some(d) => IterExpr::arith(IterOp::Mul, d, space.trip_count.clone()),
                    None => space.trip_count.clone(),
                });
            }
        }

        LinearizedLoop {
            levels,
            iteration_type: ty,
            precondition,
            total_trip_count: total,
            last_iteration,
            temps,
            induction_var: iv,
            iv_init,
            iv_cond,
            iv_inc,
            updates,
            finals,
            worksharing,
        }
    }
}

/// `init +/- index * step`, in the loop variable's type
fn counter_update(space: &LoopIterationSpace, index: IterExpr) -> IterExpr {
    let ty = space.var_type;
    let offset = IterExpr::arith_in(IterOp::Mul, index, space.counter_step.clone(), ty);
    let op = if space.subtract_step { IterOp::Sub } else { IterOp::Add };
    IterExpr::arith_in(op, space.counter_init.clone(), offset, ty)
}

fn worksharing_bounds(ty: IntType, last_iteration: &IterExpr) -> WorksharingBounds {
    let lower = IterExpr::Bound {
        bound: WorksharingBound::Lower,
        ty,
    };
    let upper = IterExpr::Bound {
        bound: WorksharingBound::Upper,
        ty,
    };
    let stride = IterExpr::Bound {
        bound: WorksharingBound::Stride,
        ty,
    };
    let is_last = IterExpr::Bound {
        bound: WorksharingBound::IsLast,
        ty: IntType::I32,
    };
    let ensure_upper_bound = IterExpr::select(
        IterExpr::compare(IterOp::Gt, upper.clone(), last_iteration.clone()),
        last_iteration.clone(),
        upper.clone(),
    );
    WorksharingBounds {
        init: [
            IterExpr::constant(0, ty),
            last_iteration.clone(),
            IterExpr::constant(1, ty),
            IterExpr::constant(0, IntType::I32),
        ],
        next_lower: IterExpr::arith_in(IterOp::Add, lower.clone(), stride.clone(), ty),
        next_upper: IterExpr::arith_in(IterOp::Add, upper.clone(), stride.clone(), ty),
        ensure_upper_bound,
        lower,
        upper,
        stride,
        is_last,
    }
}

/// Converts to a signed `bits`-bit type if the expression is narrower.
fn widen(e: IterExpr, bits: u32) -> IterExpr {
    if e.ty().bits < bits {
        e.cast(IntType::new(bits, true))
    } else {
        e
    }
}

/// The expression is a constant representable in `bits` bits.
fn fits_into(bits: u32, signed: bool, e: &IterExpr, cx: &AnalysisContext<'_>) -> bool {
    e.constant_value(cx.ast)
        .is_some_and(|v| IntType::new(bits, signed).fits(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Ast, BinaryOp, Bindings, DeclKind, ExprId, ScopeId, ScopeKind, UnaryOp, VarType,
    };
    use crate::diagnostics::Diagnostic;
    use crate::loops::expr::{BoundValues, IterEnv};
    use crate::options::AnalysisOptions;

    fn loc(l: u32) -> SourceLoc {
        SourceLoc::new(l, 1)
    }

    /// `for (name = lb; name < ub; name += step) body`
    fn counted(
        ast: &mut Ast,
        scope: ScopeId,
        name: &str,
        lb: i128,
        ub: ExprId,
        step: i128,
        body: StmtId,
    ) -> (StmtId, VarId) {
        let var = ast.declare(name, VarType::INT, DeclKind::Local, scope, loc(1));
        let lhs = ast.var_ref(var, loc(2));
        let init_value = ast.int(lb, loc(2));
        let init = ast.assign(lhs, init_value, loc(2));
        let init = ast.expr_stmt(init);
        let r = ast.var_ref(var, loc(2));
        let cond = ast.binary(BinaryOp::Lt, r, ub, loc(2));
        let r = ast.var_ref(var, loc(2));
        let step = ast.int(step, loc(2));
        let inc = ast.compound_assign(BinaryOp::Add, r, step, loc(2));
        (ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc(2)), var)
    }

    fn run(
        ast: &Ast,
        directive: DirectiveKind,
        collapse: Option<(u32, SourceLoc)>,
        body: StmtId,
    ) -> (Option<LinearizedLoop>, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let options = AnalysisOptions::default();
        let result = {
            let mut cx = AnalysisContext::new(ast, &mut diags, &options);
            CollapseLinearizer::new(directive, collapse).check_loop(&mut cx, body)
        };
        (result, diags)
    }

    #[test]
    fn test_single_level_trip_count() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let ub = ast.int(10, loc(2));
        let body = ast.null_stmt(loc(3));
        let (stmt, _) = counted(&mut ast, func, "i", 0, ub, 3, body);

        let (lin, diags) = run(&ast, DirectiveKind::Simd, None, stmt);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.level_count(), 1);
        assert_eq!(lin.iteration_type, IntType::I32);
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(4));
        assert_eq!(lin.last_iteration.constant_value(&ast), Some(3));
        assert!(lin.temps.is_empty());
        assert!(lin.worksharing.is_none());

        let bindings = Bindings::new();
        let env = IterEnv::new(&ast, &bindings);
        let values: Vec<_> = (0..4)
            .map(|iv| lin.updates[0].evaluate(&env.with_iv(iv)).unwrap())
            .collect();
        assert_eq!(values, vec![0, 3, 6, 9]);
        assert_eq!(lin.finals[0].constant_value(&ast), Some(12));
    }

    #[test]
    fn test_two_level_collapse_recovers_counters() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let inner_ub = ast.int(4, loc(3));
        let body = ast.null_stmt(loc(4));
        let (inner, _) = counted(&mut ast, func, "j", 0, inner_ub, 1, body);
        let outer_ub = ast.int(3, loc(2));
        let (outer, _) = counted(&mut ast, func, "i", 0, outer_ub, 1, inner);

        let (lin, diags) = run(&ast, DirectiveKind::For, Some((2, loc(1))), outer);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(12));

        let bindings = Bindings::new();
        let env = IterEnv::new(&ast, &bindings);
        for iv in 0..12 {
            let env = env.with_iv(iv);
            assert_eq!(lin.updates[0].evaluate(&env), Some(iv / 4));
            assert_eq!(lin.updates[1].evaluate(&env), Some(iv % 4));
        }

        let ws = lin.worksharing.as_ref().unwrap();
        assert_eq!(ws.init[1].constant_value(&ast), Some(11));
        let bounds = BoundValues {
            lower: Some(8),
            upper: Some(15),
            stride: Some(8),
            is_last: Some(0),
        };
        let env = env.with_bounds(bounds);
        assert_eq!(ws.ensure_upper_bound.evaluate(&env), Some(11));
        assert_eq!(ws.next_lower.evaluate(&env), Some(16));
        assert_eq!(lin.iv_init.evaluate(&env), Some(8));
    }

    #[test]
    fn test_runtime_bound_saves_last_iteration() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let n = ast.declare("n", VarType::INT, DeclKind::Param, func, loc(1));
        let ub = ast.var_ref(n, loc(2));
        let body = ast.null_stmt(loc(3));
        let (stmt, _) = counted(&mut ast, func, "i", 0, ub, 1, body);

        let (lin, _) = run(&ast, DirectiveKind::Simd, None, stmt);
        let lin = lin.unwrap();
        assert_eq!(lin.temps.len(), 1);
        assert!(matches!(lin.last_iteration, IterExpr::Temp { id: 0, .. }));

        let mut bindings = Bindings::new();
        bindings.insert(n, 7);
        let env = IterEnv::new(&ast, &bindings).with_temps(&lin.temps);
        assert_eq!(lin.last_iteration.evaluate(&env), Some(6));
        assert_eq!(lin.iv_cond.evaluate(&env.with_iv(6)), Some(1));
        assert_eq!(lin.iv_cond.evaluate(&env.with_iv(7)), Some(0));
    }

    #[test]
    fn test_too_few_loops_for_collapse() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let ub = ast.int(4, loc(3));
        let inner_body = ast.null_stmt(loc(4));
        let (inner, _) = counted(&mut ast, func, "j", 0, ub, 1, inner_body);
        let ub = ast.int(4, loc(2));
        let (outer, _) = counted(&mut ast, func, "i", 0, ub, 1, inner);

        let (lin, diags) = run(&ast, DirectiveKind::For, Some((3, loc(1))), outer);
        assert!(lin.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::NotAForLoop);
        assert_eq!(diags[0].primary, loc(4));
        assert_eq!(diags[0].aux, vec![loc(1)]);
    }

    #[test]
    fn test_single_statement_compound_is_transparent() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let ub = ast.int(2, loc(3));
        let body = ast.null_stmt(loc(4));
        let (inner, j) = counted(&mut ast, func, "j", 0, ub, 1, body);
        let block = ast.compound(vec![inner], loc(2));
        let ub = ast.int(2, loc(2));
        let (outer, i) = counted(&mut ast, func, "i", 0, ub, 1, block);

        let (lin, diags) = run(&ast, DirectiveKind::Simd, Some((2, loc(1))), outer);
        assert!(diags.is_empty());
        assert_eq!(lin.unwrap().counters(), vec![i, j]);
    }

    #[test]
    fn test_decrementing_loop() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let i = ast.declare("i", VarType::INT, DeclKind::Local, func, loc(1));
        let lhs = ast.var_ref(i, loc(2));
        let ten = ast.int(10, loc(2));
        let init = ast.assign(lhs, ten, loc(2));
        let init = ast.expr_stmt(init);
        let r = ast.var_ref(i, loc(2));
        let zero = ast.int(0, loc(2));
        let cond = ast.binary(BinaryOp::Gt, r, zero, loc(2));
        let r = ast.var_ref(i, loc(2));
        let inc = ast.unary(UnaryOp::PostDec, r, loc(2));
        let body = ast.null_stmt(loc(3));
        let stmt = ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc(2));

        let (lin, diags) = run(&ast, DirectiveKind::Simd, None, stmt);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(10));
        let bindings = Bindings::new();
        let env = IterEnv::new(&ast, &bindings);
        assert_eq!(lin.updates[0].evaluate(&env.with_iv(0)), Some(10));
        assert_eq!(lin.updates[0].evaluate(&env.with_iv(9)), Some(1));
    }

    /// `for (name = 0; name < ub; name += 1)` with the variable and literals of `ty`
    fn typed_counted(
        ast: &mut Ast,
        scope: ScopeId,
        name: &str,
        ty: IntType,
        ub: i128,
        body: StmtId,
    ) -> StmtId {
        let var = ast.declare(name, VarType::Integer(ty), DeclKind::Local, scope, loc(1));
        let lhs = ast.var_ref(var, loc(2));
        let zero = ast.int_typed(0, ty, loc(2));
        let init = ast.assign(lhs, zero, loc(2));
        let init = ast.expr_stmt(init);
        let r = ast.var_ref(var, loc(2));
        let ub = ast.int_typed(ub, ty, loc(2));
        let cond = ast.binary(BinaryOp::Lt, r, ub, loc(2));
        let r = ast.var_ref(var, loc(2));
        let one = ast.int_typed(1, ty, loc(2));
        let inc = ast.compound_assign(BinaryOp::Add, r, one, loc(2));
        ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc(2))
    }

    fn unsigned_nest(outer_count: i128, inner_count: i128) -> (Ast, StmtId) {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let body = ast.null_stmt(loc(4));
        let inner = typed_counted(&mut ast, func, "j", IntType::U32, inner_count, body);
        let outer = typed_counted(&mut ast, func, "i", IntType::U32, outer_count, inner);
        (ast, outer)
    }

    #[test]
    fn test_64_bit_variable_selects_64_bit_iteration() {
        let mut ast = Ast::new();
        let func = ast.add_scope(ast.tu_scope(), ScopeKind::Function);
        let body = ast.null_stmt(loc(3));
        let stmt = typed_counted(&mut ast, func, "i", IntType::I64, 100, body);

        let (lin, diags) = run(&ast, DirectiveKind::For, None, stmt);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.iteration_type, IntType::I64);
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(100));
        assert_eq!(lin.worksharing.unwrap().upper.ty(), IntType::I64);
    }

    #[test]
    fn test_unsigned_product_fitting_32_bits() {
        let (ast, stmt) = unsigned_nest(1000, 1000);
        let (lin, diags) = run(&ast, DirectiveKind::Simd, Some((2, loc(1))), stmt);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.iteration_type, IntType::U32);
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(1_000_000));
    }

    #[test]
    fn test_unsigned_product_overflowing_32_bits() {
        let (ast, stmt) = unsigned_nest(100_000, 100_000);
        let (lin, diags) = run(&ast, DirectiveKind::Simd, Some((2, loc(1))), stmt);
        assert!(diags.is_empty());
        let lin = lin.unwrap();
        assert_eq!(lin.iteration_type, IntType::I64);
        assert_eq!(lin.total_trip_count.constant_value(&ast), Some(10_000_000_000));

        let bindings = Bindings::new();
        let env = IterEnv::new(&ast, &bindings).with_iv(9_999_999_999);
        assert_eq!(lin.updates[0].evaluate(&env), Some(99_999));
        assert_eq!(lin.updates[1].evaluate(&env), Some(99_999));
    }

    #[test]
    fn test_widen_is_signed() {
        let narrow = IterExpr::Source {
            expr: ExprId(0),
            ty: IntType::U32,
        };
        assert_eq!(widen(narrow.clone(), 64).ty(), IntType::I64);
        assert_eq!(widen(narrow, 32).ty(), IntType::U32);
    }
}
