//! Canonical loop form recognition
//!
//! Accepted shapes, with `var` the loop variable:
//!
//! ```text
//! init: var = lb | T var = lb | operator=(var, lb)
//! cond: var op ub | ub op var                    op in <, <=, >, >=
//! incr: ++var | var++ | --var | var--
//!       var += step | var -= step
//!       var = var + step | var = step + var | var = var - step
//! ```

use super::expr::IterExpr;
use crate::ast::{
    Ast, BinaryOp, ExprId, ExprKind, IntType, OverloadedOp, SourceLoc, SourceRange, StmtId,
    StmtKind, UnaryOp, VarId, VarType,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use serde::Serialize;

/// Validated loop header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopForm {
    /// Loop variable
    pub var: VarId,
    /// Reference to the variable in an assignment init; `None` when the
    /// init declares it
    pub var_ref: Option<ExprId>,
    /// Declared type of the loop variable
    pub var_type: VarType,
    /// Initial value
    pub lower: ExprId,
    /// Bound from the condition
    pub upper: ExprId,
    /// Step, normalised so that `subtract` is set exactly for decreasing loops
    pub step: IterExpr,
    /// Variable compared with `<` or `<=` (as seen from the variable)
    pub is_less: bool,
    /// `<` or `>`
    pub is_strict: bool,
    /// Step is subtracted from the variable
    pub subtract: bool,
    /// Span of the init statement
    pub init_range: SourceRange,
    /// Span of the condition
    pub cond_range: SourceRange,
    /// Span of the increment
    pub inc_range: SourceRange,
}

/// Extracted condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondForm {
    /// Bound compared against
    pub upper: ExprId,
    /// Variable on the smaller side
    pub is_less: bool,
    /// Strict comparison
    pub is_strict: bool,
    /// Operator location
    pub loc: SourceLoc,
}

/// Extracted increment before normalisation
#[derive(Debug, Clone, PartialEq)]
pub struct IncForm {
    /// Normalised step
    pub step: IterExpr,
    /// Normalised subtract flag
    pub subtract: bool,
}

/// Three independent checks on one `for` statement
pub struct LoopFormChecker<'a> {
    ast: &'a Ast,
}

impl<'a> LoopFormChecker<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        LoopFormChecker { ast }
    }

    /// Runs init, condition and increment checks on a `for` statement.
    pub fn check(&self, stmt: StmtId) -> Result<LoopForm, Diagnostic> {
        let for_loc = self.ast.stmt(stmt).loc;
        let StmtKind::For { init, cond, inc, .. } = self.ast.stmt(stmt).kind else {
            return Err(Diagnostic::new(DiagnosticKind::NotAForLoop, for_loc));
        };

        let (var, lower) = self.check_init(init, for_loc)?;
        let decl = self.ast.var(var);
        if !decl.ty.is_loop_capable() {
            let loc = init.map_or(for_loc, |s| self.ast.stmt(s).loc);
            return Err(Diagnostic::new(DiagnosticKind::LoopVarInvalidType, loc)
                .with_aux(decl.loc)
                .with_arg(decl.name.clone())
                .with_arg(decl.ty.to_string()));
        }
        let cond_form = self.check_cond(var, cond, for_loc)?;
        let inc_form = self.check_inc(var, inc, for_loc, &cond_form)?;

        tracing::trace!(
            var = %decl.name,
            is_less = cond_form.is_less,
            is_strict = cond_form.is_strict,
            subtract = inc_form.subtract,
            "canonical loop"
        );

        Ok(LoopForm {
            var,
            var_ref: init.and_then(|s| self.assigned_ref(s)),
            var_type: decl.ty,
            lower,
            upper: cond_form.upper,
            step: inc_form.step,
            is_less: cond_form.is_less,
            is_strict: cond_form.is_strict,
            subtract: inc_form.subtract,
            init_range: init.map_or(SourceRange::point(for_loc), |s| self.ast.stmt_range(s)),
            cond_range: cond.map_or(SourceRange::point(for_loc), |e| self.ast.expr_range(e)),
            inc_range: inc.map_or(SourceRange::point(for_loc), |e| self.ast.expr_range(e)),
        })
    }

    /// Extracts `(var, lb)` from the init statement.
    pub fn check_init(
        &self,
        init: Option<StmtId>,
        for_loc: SourceLoc,
    ) -> Result<(VarId, ExprId), Diagnostic> {
        let not_canonical = |loc| Err(Diagnostic::new(DiagnosticKind::LoopNotCanonicalInit, loc));
        let Some(init) = init else {
            return not_canonical(for_loc);
        };
        let stmt = self.ast.stmt(init);
        let found = match &stmt.kind {
            StmtKind::Expr(e) => {
                let e = self.ignore_parens(*e);
                match &self.ast.expr(e).kind {
                    ExprKind::Assign { lhs, rhs } => self.ast.as_var_ref(*lhs).map(|v| (v, *rhs)),
                    ExprKind::OperatorCall {
                        op: OverloadedOp::Assign,
                        args,
                    } if args.len() == 2 => self.ast.as_var_ref(args[0]).map(|v| (v, args[1])),
                    _ => None,
                }
            }
            StmtKind::Decl(vars) if vars.len() == 1 => {
                let var = vars[0];
                self.ast.var(var).init.map(|lb| (var, lb))
            }
            _ => None,
        };
        match found {
            Some((var, lb)) if self.ast.int_type_of(lb).is_some() => Ok((var, lb)),
            _ => not_canonical(stmt.loc),
        }
    }

    /// Extracts the bound and comparison sense from the condition.
    pub fn check_cond(
        &self,
        var: VarId,
        cond: Option<ExprId>,
        for_loc: SourceLoc,
    ) -> Result<CondForm, Diagnostic> {
        let not_canonical = |loc| {
            Err(Diagnostic::new(DiagnosticKind::LoopNotCanonicalCond, loc)
                .with_arg(self.ast.var(var).name.clone()))
        };
        let Some(cond) = cond else {
            return not_canonical(for_loc);
        };
        let e = self.ast.ignore_implicit(cond);
        let expr = self.ast.expr(e);
        let relational = match &expr.kind {
            ExprKind::Binary { op, lhs, rhs } if op.is_relational() => Some((*op, *lhs, *rhs)),
            ExprKind::OperatorCall { op, args } if args.len() == 2 => {
                op.as_relational().map(|rel| (rel, args[0], args[1]))
            }
            _ => None,
        };
        let strict = |op: BinaryOp| matches!(op, BinaryOp::Lt | BinaryOp::Gt);
        let form = relational.and_then(|(op, lhs, rhs)| {
            let less = matches!(op, BinaryOp::Lt | BinaryOp::Le);
            let greater = matches!(op, BinaryOp::Gt | BinaryOp::Ge);
            if self.ast.refers_to(lhs, var) {
                Some((rhs, less, strict(op)))
            } else if self.ast.refers_to(rhs, var) {
                Some((lhs, greater, strict(op)))
            } else {
                None
            }
        });
        match form {
            Some((upper, is_less, is_strict)) if self.ast.int_type_of(upper).is_some() => {
                Ok(CondForm {
                    upper,
                    is_less,
                    is_strict,
                    loc: expr.loc,
                })
            }
            _ => not_canonical(expr.loc),
        }
    }

    /// Extracts and normalises the step, rejecting steps whose direction
    /// contradicts the condition.
    pub fn check_inc(
        &self,
        var: VarId,
        inc: Option<ExprId>,
        for_loc: SourceLoc,
        cond: &CondForm,
    ) -> Result<IncForm, Diagnostic> {
        let not_canonical = |loc| {
            Err(Diagnostic::new(DiagnosticKind::LoopNotCanonicalIncr, loc)
                .with_arg(self.ast.var(var).name.clone()))
        };
        let Some(inc) = inc else {
            return not_canonical(for_loc);
        };
        let e = self.ignore_parens(inc);
        let expr = self.ast.expr(e);
        let unit = |decrement: bool| {
            let step = if decrement { -1 } else { 1 };
            Some((IterExpr::constant(step, IntType::I32), false, expr.loc))
        };
        let extracted = match &expr.kind {
            ExprKind::Unary { op, operand }
                if op.is_inc_dec() && self.ast.refers_to(*operand, var) =>
            {
                unit(op.is_decrement())
            }
            ExprKind::CompoundAssign { op, lhs, rhs }
                if matches!(op, BinaryOp::Add | BinaryOp::Sub) && self.ast.refers_to(*lhs, var) =>
            {
                self.step_of(*rhs, *op == BinaryOp::Sub)
            }
            ExprKind::Assign { lhs, rhs } if self.ast.refers_to(*lhs, var) => {
                self.check_inc_rhs(var, *rhs)
            }
            ExprKind::OperatorCall { op, args }
                if !args.is_empty() && self.ast.refers_to(args[0], var) =>
            {
                match (op, args.len()) {
                    (OverloadedOp::PlusPlus, _) => unit(false),
                    (OverloadedOp::MinusMinus, _) => unit(true),
                    (OverloadedOp::PlusEqual, 2) => self.step_of(args[1], false),
                    (OverloadedOp::MinusEqual, 2) => self.step_of(args[1], true),
                    (OverloadedOp::Assign, 2) => self.check_inc_rhs(var, args[1]),
                    _ => None,
                }
            }
            _ => None,
        };
        let Some((step, subtract, step_loc)) = extracted else {
            return not_canonical(expr.loc);
        };
        self.set_step(var, step, subtract, step_loc, cond)
    }

    /// `var + step`, `step + var`, `var - step`
    fn check_inc_rhs(&self, var: VarId, rhs: ExprId) -> Option<(IterExpr, bool, SourceLoc)> {
        let rhs = self.ast.ignore_implicit(rhs);
        match &self.ast.expr(rhs).kind {
            ExprKind::Binary { op, lhs, rhs } if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
                let is_add = *op == BinaryOp::Add;
                if self.ast.refers_to(*lhs, var) {
                    self.step_of(*rhs, !is_add)
                } else if is_add && self.ast.refers_to(*rhs, var) {
                    self.step_of(*lhs, false)
                } else {
                    None
                }
            }
            ExprKind::OperatorCall { op, args }
                if matches!(op, OverloadedOp::Plus | OverloadedOp::Minus) && args.len() == 2 =>
            {
                let is_add = *op == OverloadedOp::Plus;
                if self.ast.refers_to(args[0], var) {
                    self.step_of(args[1], !is_add)
                } else if is_add && self.ast.refers_to(args[1], var) {
                    self.step_of(args[0], false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn step_of(&self, step: ExprId, subtract: bool) -> Option<(IterExpr, bool, SourceLoc)> {
        let ty = self.ast.int_type_of(step)?;
        let step_expr = self.ast.ignore_implicit(step);
        Some((
            IterExpr::source(step_expr, ty),
            subtract,
            self.ast.expr(step).loc,
        ))
    }

    fn set_step(
        &self,
        var: VarId,
        step: IterExpr,
        subtract: bool,
        step_loc: SourceLoc,
        cond: &CondForm,
    ) -> Result<IncForm, Diagnostic> {
        let value = step.constant_value(self.ast);
        let is_unsigned = !step.ty().signed;
        let signed_value = value.filter(|_| !is_unsigned);
        let is_const_neg = signed_value.is_some_and(|v| subtract != (v < 0));
        let is_const_pos = signed_value.is_some_and(|v| subtract == (v < 0));
        let is_const_zero = value == Some(0);

        let incompatible = is_const_zero
            || if cond.is_less {
                is_const_neg || (is_unsigned && subtract)
            } else {
                is_const_pos || (is_unsigned && !subtract)
            };
        if incompatible {
            return Err(Diagnostic::new(DiagnosticKind::LoopIncrNotCompatible, step_loc)
                .with_aux(cond.loc)
                .with_arg(self.ast.var(var).name.clone())
                .with_arg(if cond.is_less { "increase" } else { "decrease" }));
        }

        // Express the step relative to the direction of the comparison
        let (step, subtract) = if cond.is_less == subtract {
            (step.negate(), !subtract)
        } else {
            (step, subtract)
        };
        Ok(IncForm { step, subtract })
    }

    fn assigned_ref(&self, init: StmtId) -> Option<ExprId> {
        let StmtKind::Expr(e) = self.ast.stmt(init).kind else {
            return None;
        };
        match &self.ast.expr(self.ignore_parens(e)).kind {
            ExprKind::Assign { lhs, .. } => Some(*lhs),
            ExprKind::OperatorCall {
                op: OverloadedOp::Assign,
                args,
            } => args.first().copied(),
            _ => None,
        }
    }

    fn ignore_parens(&self, mut e: ExprId) -> ExprId {
        while let ExprKind::Paren(inner) = self.ast.expr(e).kind {
            e = inner;
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclKind, ScopeKind};

    fn loc(c: u32) -> SourceLoc {
        SourceLoc::new(1, c)
    }

    struct Loop {
        ast: Ast,
        i: VarId,
    }

    fn setup(ty: VarType) -> Loop {
        let mut ast = Ast::new();
        let tu = ast.tu_scope();
        let func = ast.add_scope(tu, ScopeKind::Function);
        let i = ast.declare("i", ty, DeclKind::Local, func, loc(1));
        Loop { ast, i }
    }

    fn assign_init(l: &mut Loop, value: i128) -> StmtId {
        let lhs = l.ast.var_ref(l.i, loc(6));
        let rhs = l.ast.int(value, loc(10));
        let a = l.ast.assign(lhs, rhs, loc(8));
        l.ast.expr_stmt(a)
    }

    fn less_than(l: &mut Loop, bound: i128) -> ExprId {
        let lhs = l.ast.var_ref(l.i, loc(13));
        let rhs = l.ast.int(bound, loc(17));
        l.ast.binary(BinaryOp::Lt, lhs, rhs, loc(15))
    }

    fn build_for(l: &mut Loop, init: StmtId, cond: ExprId, inc: ExprId) -> StmtId {
        let body = l.ast.null_stmt(loc(30));
        l.ast.for_stmt(Some(init), Some(cond), Some(inc), body, loc(1))
    }

    #[test]
    fn test_simple_increment_loop() {
        let mut l = setup(VarType::INT);
        let init = assign_init(&mut l, 0);
        let cond = less_than(&mut l, 4);
        let r = l.ast.var_ref(l.i, loc(22));
        let inc = l.ast.unary(UnaryOp::PreInc, r, loc(20));
        let stmt = build_for(&mut l, init, cond, inc);

        let form = LoopFormChecker::new(&l.ast).check(stmt).unwrap();
        assert_eq!(form.var, l.i);
        assert!(form.is_less && form.is_strict && !form.subtract);
        assert_eq!(form.step.constant_value(&l.ast), Some(1));
    }

    #[test]
    fn test_decrement_against_less_is_incompatible() {
        let mut l = setup(VarType::INT);
        let init = assign_init(&mut l, 0);
        let cond = less_than(&mut l, 4);
        let lhs = l.ast.var_ref(l.i, loc(20));
        let a = l.ast.var_ref(l.i, loc(24));
        let one = l.ast.int(1, loc(28));
        let sub = l.ast.binary(BinaryOp::Sub, a, one, loc(26));
        let inc = l.ast.assign(lhs, sub, loc(22));
        let stmt = build_for(&mut l, init, cond, inc);

        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopIncrNotCompatible);
        assert_eq!(err.primary, loc(28));
        assert_eq!(err.aux, vec![loc(15)]);
    }

    #[test]
    fn test_reversed_condition_and_decrement() {
        // for (int i = 10; 0 < i; i--)
        let mut l = setup(VarType::INT);
        let decl_init = l.ast.int(10, loc(10));
        l.ast.var_mut(l.i).init = Some(decl_init);
        let init = l.ast.decl_stmt(vec![l.i], loc(6));
        let zero = l.ast.int(0, loc(13));
        let r = l.ast.var_ref(l.i, loc(17));
        let cond = l.ast.binary(BinaryOp::Lt, zero, r, loc(15));
        let r2 = l.ast.var_ref(l.i, loc(20));
        let inc = l.ast.unary(UnaryOp::PostDec, r2, loc(21));
        let stmt = build_for(&mut l, init, cond, inc);

        let form = LoopFormChecker::new(&l.ast).check(stmt).unwrap();
        assert!(!form.is_less);
        assert!(form.is_strict);
        assert!(form.subtract);
        assert_eq!(form.step.constant_value(&l.ast), Some(1));
        assert_eq!(form.upper, zero);
    }

    #[test]
    fn test_unsigned_subtract_with_less_rejected() {
        let mut l = setup(VarType::Integer(IntType::U32));
        let init = assign_init(&mut l, 0);
        let cond = less_than(&mut l, 8);
        let lhs = l.ast.var_ref(l.i, loc(20));
        let scope = l.ast.tu_scope();
        let n = l.ast.declare("n", VarType::Integer(IntType::U32), DeclKind::Global, scope, loc(1));
        let step = l.ast.var_ref(n, loc(25));
        let inc = l.ast.compound_assign(BinaryOp::Sub, lhs, step, loc(22));
        let stmt = build_for(&mut l, init, cond, inc);
        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopIncrNotCompatible);
    }

    #[test]
    fn test_non_canonical_parts() {
        let mut l = setup(VarType::INT);
        let checker_init = {
            let call = l.ast.call("f", vec![], VarType::INT, loc(6));
            l.ast.expr_stmt(call)
        };
        let cond = less_than(&mut l, 4);
        let r = l.ast.var_ref(l.i, loc(22));
        let inc = l.ast.unary(UnaryOp::PreInc, r, loc(20));
        let stmt = build_for(&mut l, checker_init, cond, inc);
        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopNotCanonicalInit);

        let init = assign_init(&mut l, 0);
        let a = l.ast.var_ref(l.i, loc(13));
        let b = l.ast.int(4, loc(17));
        let eq = l.ast.binary(BinaryOp::Ne, a, b, loc(15));
        let r = l.ast.var_ref(l.i, loc(22));
        let inc = l.ast.unary(UnaryOp::PreInc, r, loc(20));
        let stmt = build_for(&mut l, init, eq, inc);
        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopNotCanonicalCond);

        let init = assign_init(&mut l, 0);
        let cond = less_than(&mut l, 4);
        let r = l.ast.var_ref(l.i, loc(22));
        let two = l.ast.int(2, loc(26));
        let mul = l.ast.compound_assign(BinaryOp::Mul, r, two, loc(24));
        let stmt = build_for(&mut l, init, cond, mul);
        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopNotCanonicalIncr);
    }

    #[test]
    fn test_float_loop_variable_rejected() {
        let mut l = setup(VarType::Float);
        let init = assign_init(&mut l, 0);
        let cond = less_than(&mut l, 4);
        let r = l.ast.var_ref(l.i, loc(22));
        let inc = l.ast.unary(UnaryOp::PreInc, r, loc(20));
        let stmt = build_for(&mut l, init, cond, inc);
        let err = LoopFormChecker::new(&l.ast).check(stmt).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::LoopVarInvalidType);
    }
}
