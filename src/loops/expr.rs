//! Typed iteration-space expressions
//!
//! Everything the loop analysis derives (trip counts, preconditions, counter
//! updates) is an owned [`IterExpr`] tree. Leaves refer back to AST
//! expressions by handle; every node carries the integer type it is computed
//! in, so evaluation reproduces the wrapping behaviour of the generated code.

use crate::ast::arena::apply_binary;
use crate::ast::{Ast, BinaryOp, Bindings, ExprId, IntType, VarId};
use serde::Serialize;

/// Operators of derived expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IterOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    LAnd,
}

impl IterOp {
    fn is_comparison(self) -> bool {
        matches!(self, IterOp::Lt | IterOp::Le | IterOp::Gt | IterOp::Ge | IterOp::LAnd)
    }

    fn as_binary(self) -> BinaryOp {
        match self {
            IterOp::Add => BinaryOp::Add,
            IterOp::Sub => BinaryOp::Sub,
            IterOp::Mul => BinaryOp::Mul,
            IterOp::Div => BinaryOp::Div,
            IterOp::Rem => BinaryOp::Rem,
            IterOp::Lt => BinaryOp::Lt,
            IterOp::Le => BinaryOp::Le,
            IterOp::Gt => BinaryOp::Gt,
            IterOp::Ge => BinaryOp::Ge,
            IterOp::LAnd => BinaryOp::LAnd,
        }
    }

    /// Relational operator for a comparison sense.
    pub fn relational(is_less: bool, is_strict: bool) -> IterOp {
        match (is_less, is_strict) {
            (true, true) => IterOp::Lt,
            (true, false) => IterOp::Le,
            (false, true) => IterOp::Gt,
            (false, false) => IterOp::Ge,
        }
    }
}

/// Bookkeeping variables of statically scheduled worksharing loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorksharingBound {
    Lower,
    Upper,
    Stride,
    IsLast,
}

/// Derived expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IterExpr {
    /// Literal
    Const { value: i128, ty: IntType },
    /// AST expression converted to `ty`
    Source { expr: ExprId, ty: IntType },
    /// Current value of a loop counter
    Var { var: VarId, ty: IntType },
    /// Synthesized induction variable
    Induction { ty: IntType },
    /// Saved temporary (index into the owning loop's temporaries)
    Temp { id: usize, ty: IntType },
    /// Worksharing bound variable
    Bound { bound: WorksharingBound, ty: IntType },
    /// Binary operation; comparison operands share one type
    Binary {
        op: IterOp,
        lhs: Box<IterExpr>,
        rhs: Box<IterExpr>,
        ty: IntType,
    },
    /// Conversion
    Cast { operand: Box<IterExpr>, ty: IntType },
    /// `cond ? then : otherwise`
    Select {
        cond: Box<IterExpr>,
        then: Box<IterExpr>,
        otherwise: Box<IterExpr>,
        ty: IntType,
    },
}

/// Values available while evaluating an [`IterExpr`]
#[derive(Debug, Clone, Copy)]
pub struct IterEnv<'e> {
    /// Syntax tree the `Source` leaves point into
    pub ast: &'e Ast,
    /// Variable values
    pub bindings: &'e Bindings,
    /// Induction variable value
    pub iv: Option<i128>,
    /// Saved temporaries
    pub temps: &'e [IterExpr],
    /// Worksharing bound values
    pub bounds: BoundValues,
}

/// Values of the worksharing bound variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundValues {
    pub lower: Option<i128>,
    pub upper: Option<i128>,
    pub stride: Option<i128>,
    pub is_last: Option<i128>,
}

impl<'e> IterEnv<'e> {
    /// Environment with variable bindings only.
    pub fn new(ast: &'e Ast, bindings: &'e Bindings) -> Self {
        IterEnv {
            ast,
            bindings,
            iv: None,
            temps: &[],
            bounds: BoundValues::default(),
        }
    }

    /// Sets the induction variable.
    pub fn with_iv(mut self, iv: i128) -> Self {
        self.iv = Some(iv);
        self
    }

    /// Makes saved temporaries readable.
    pub fn with_temps(mut self, temps: &'e [IterExpr]) -> Self {
        self.temps = temps;
        self
    }

    /// Sets worksharing bound values.
    pub fn with_bounds(mut self, bounds: BoundValues) -> Self {
        self.bounds = bounds;
        self
    }
}

impl IterExpr {
    /// Literal of type `ty`
    pub fn constant(value: i128, ty: IntType) -> Self {
        IterExpr::Const {
            value: ty.wrap(value),
            ty,
        }
    }

    /// AST expression converted to `ty`
    pub fn source(expr: ExprId, ty: IntType) -> Self {
        IterExpr::Source { expr, ty }
    }

    /// Type the node is computed in
    pub fn ty(&self) -> IntType {
        match self {
            IterExpr::Const { ty, .. }
            | IterExpr::Source { ty, .. }
            | IterExpr::Var { ty, .. }
            | IterExpr::Induction { ty }
            | IterExpr::Temp { ty, .. }
            | IterExpr::Bound { ty, .. }
            | IterExpr::Binary { ty, .. }
            | IterExpr::Cast { ty, .. }
            | IterExpr::Select { ty, .. } => *ty,
        }
    }

    /// Converts to `ty`; literals are folded.
    pub fn cast(self, ty: IntType) -> Self {
        match self {
            e if e.ty() == ty => e,
            IterExpr::Const { value, .. } => IterExpr::constant(value, ty),
            IterExpr::Source { expr, .. } => IterExpr::Source { expr, ty },
            e => IterExpr::Cast {
                operand: Box::new(e),
                ty,
            },
        }
    }

    /// Arithmetic in the common type of the operands.
    pub fn arith(op: IterOp, lhs: IterExpr, rhs: IterExpr) -> Self {
        let ty = lhs.ty().common(rhs.ty());
        IterExpr::arith_in(op, lhs, rhs, ty)
    }

    /// Arithmetic in an explicit type.
    pub fn arith_in(op: IterOp, lhs: IterExpr, rhs: IterExpr, ty: IntType) -> Self {
        let lhs = lhs.cast(ty);
        let rhs = rhs.cast(ty);
        if let (IterExpr::Const { value: l, .. }, IterExpr::Const { value: r, .. }) = (&lhs, &rhs) {
            if let Some(v) = apply_binary(op.as_binary(), *l, *r) {
                return IterExpr::constant(v, ty);
            }
        }
        IterExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// Relational comparison after converting both sides to their common type.
    pub fn compare(op: IterOp, lhs: IterExpr, rhs: IterExpr) -> Self {
        let common = lhs.ty().common(rhs.ty());
        IterExpr::Binary {
            op,
            lhs: Box::new(lhs.cast(common)),
            rhs: Box::new(rhs.cast(common)),
            ty: IntType::I32,
        }
    }

    /// Logical and.
    pub fn and(lhs: IterExpr, rhs: IterExpr) -> Self {
        IterExpr::Binary {
            op: IterOp::LAnd,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: IntType::I32,
        }
    }

    /// `cond ? then : otherwise` in the common type of the arms.
    pub fn select(cond: IterExpr, then: IterExpr, otherwise: IterExpr) -> Self {
        let ty = then.ty().common(otherwise.ty());
        IterExpr::Select {
            cond: Box::new(cond),
            then: Box::new(then.cast(ty)),
            otherwise: Box::new(otherwise.cast(ty)),
            ty,
        }
    }

    /// `-self`
    pub fn negate(self) -> Self {
        let ty = self.ty();
        IterExpr::arith_in(IterOp::Sub, IterExpr::constant(0, ty), self, ty)
    }

    /// Value when no variable, induction or temporary is involved
    pub fn constant_value(&self, ast: &Ast) -> Option<i128> {
        let bindings = Bindings::new();
        self.evaluate(&IterEnv::new(ast, &bindings))
    }

    /// Evaluates with the given environment; `None` if a needed value is
    /// missing or the arithmetic is undefined (division by zero).
    pub fn evaluate(&self, env: &IterEnv<'_>) -> Option<i128> {
        match self {
            IterExpr::Const { value, .. } => Some(*value),
            IterExpr::Source { expr, ty } => {
                env.ast.eval_int(*expr, env.bindings).map(|v| ty.wrap(v))
            }
            IterExpr::Var { var, ty } => env.bindings.get(var).map(|v| ty.wrap(*v)),
            IterExpr::Induction { ty } => env.iv.map(|v| ty.wrap(v)),
            IterExpr::Temp { id, ty } => env.temps.get(*id)?.evaluate(env).map(|v| ty.wrap(v)),
            IterExpr::Bound { bound, ty } => {
                let value = match bound {
                    WorksharingBound::Lower => env.bounds.lower,
                    WorksharingBound::Upper => env.bounds.upper,
                    WorksharingBound::Stride => env.bounds.stride,
                    WorksharingBound::IsLast => env.bounds.is_last,
                };
                value.map(|v| ty.wrap(v))
            }
            IterExpr::Binary { op, lhs, rhs, ty } => {
                let l = lhs.evaluate(env)?;
                if *op == IterOp::LAnd && l == 0 {
                    return Some(0);
                }
                let r = rhs.evaluate(env)?;
                if op.is_comparison() {
                    return apply_binary(op.as_binary(), l, r);
                }
                apply_binary(op.as_binary(), ty.wrap(l), ty.wrap(r)).map(|v| ty.wrap(v))
            }
            IterExpr::Cast { operand, ty } => operand.evaluate(env).map(|v| ty.wrap(v)),
            IterExpr::Select {
                cond,
                then,
                otherwise,
                ty,
            } => {
                let chosen = if cond.evaluate(env)? != 0 { then } else { otherwise };
                chosen.evaluate(env).map(|v| ty.wrap(v))
            }
        }
    }
}
