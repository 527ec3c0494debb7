//! Per-level iteration space

use super::expr::{IterExpr, IterOp};
use super::form::LoopForm;
use crate::ast::{ExprId, IntType, SourceRange, VarId, VarType};
use crate::context::AnalysisContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use serde::Serialize;

/// Iteration space of one nesting level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopIterationSpace {
    /// `lb op ub`: the loop runs at least once
    pub precondition: IterExpr,
    /// Number of iterations
    pub trip_count: IterExpr,
    /// Loop variable
    pub counter_var: VarId,
    /// Reference to the loop variable in the init, if it is assigned there
    pub counter_ref: Option<ExprId>,
    /// Initial value of the loop variable
    pub counter_init: IterExpr,
    /// Direction-relative step
    pub counter_step: IterExpr,
    /// Step is subtracted
    pub subtract_step: bool,
    /// Integer view of the loop variable's type
    pub var_type: IntType,
    /// Span of the init statement
    pub init_range: SourceRange,
    /// Span of the condition
    pub cond_range: SourceRange,
    /// Span of the increment
    pub inc_range: SourceRange,
}

/// Derives trip count, precondition and counter pieces from a [`LoopForm`]
pub struct IterationSpaceBuilder<'f> {
    form: &'f LoopForm,
    cond: Option<ExprId>,
}

impl<'f> IterationSpaceBuilder<'f> {
    /// Builder over a validated loop header; `cond` is the written condition
    /// used when the precondition cannot be rebuilt.
    pub fn new(form: &'f LoopForm, cond: Option<ExprId>) -> Self {
        IterationSpaceBuilder { form, cond }
    }

    /// Builds the full level description. `limited` requests a 32- or 64-bit
    /// trip count (worksharing loops).
    pub fn build(&self, cx: &mut AnalysisContext<'_>, limited: bool) -> Option<LoopIterationSpace> {
        let var_type = self.form.var_type.arithmetic()?;
        let trip_count = self.build_num_iterations(cx, limited)?;
        let precondition = self.build_precondition(cx)?;
        Some(LoopIterationSpace {
            precondition,
            trip_count,
            counter_var: self.form.var,
            counter_ref: self.form.var_ref,
            counter_init: self.build_counter_init(cx)?,
            counter_step: self.build_counter_step(),
            subtract_step: self.form.subtract,
            var_type,
            init_range: self.form.init_range,
            cond_range: self.form.cond_range,
            inc_range: self.form.inc_range,
        })
    }

    /// `(Upper - Lower [- 1] + Step) / Step` with Upper/Lower swapped for
    /// decreasing loops, then width-normalised.
    pub fn build_num_iterations(
        &self,
        cx: &mut AnalysisContext<'_>,
        limited: bool,
    ) -> Option<IterExpr> {
        let form = self.form;
        let (upper, lower) = if form.is_less {
            (form.upper, form.lower)
        } else {
            (form.lower, form.upper)
        };
        let upper_ty = cx.ast.int_type_of(upper)?;
        let lower_ty = cx.ast.int_type_of(lower)?;
        let natural = upper_ty.common(lower_ty).common(form.step.ty());

        let mut diff = IterExpr::arith_in(
            IterOp::Sub,
            IterExpr::source(upper, upper_ty),
            IterExpr::source(lower, lower_ty),
            natural,
        );
        if form.is_strict {
            diff = IterExpr::arith_in(IterOp::Sub, diff, IterExpr::constant(1, natural), natural);
        }
        diff = IterExpr::arith_in(IterOp::Add, diff, form.step.clone(), natural);
        let mut count = IterExpr::arith_in(IterOp::Div, diff, form.step.clone(), natural);

        let mut ty = natural;
        if let VarType::Integer(var_ty) = form.var_type {
            if var_ty.bits >= natural.bits {
                ty = var_ty;
                count = count.cast(ty);
            }
        }

        if limited {
            let bits = if ty.bits > 32 { 64 } else { 32 };
            if bits != ty.bits {
                if bits < ty.bits && cx.options.narrowing_warnings {
                    cx.report(
                        Diagnostic::new(DiagnosticKind::LoopVarNarrowed, form.init_range.begin)
                            .with_aux(form.cond_range.begin)
                            .with_arg(ty.to_string()),
                    );
                }
                let signed = ty.signed || ty.bits < bits;
                ty = IntType::new(bits, signed);
                count = count.cast(ty);
            }
        }

        tracing::trace!(natural = %natural, selected = %ty, limited, "trip count type");
        Some(count)
    }

    /// `lb op ub` in the source comparison sense; the written condition when
    /// the bounds cannot be compared directly.
    pub fn build_precondition(&self, cx: &AnalysisContext<'_>) -> Option<IterExpr> {
        let form = self.form;
        let lower = cx.ast.expr(form.lower).ty;
        let upper = cx.ast.expr(form.upper).ty;
        let mixed = matches!(
            (lower, upper),
            (VarType::Pointer, VarType::Integer(_)) | (VarType::Integer(_), VarType::Pointer)
        );
        match (lower.arithmetic(), upper.arithmetic()) {
            (Some(lower_ty), Some(upper_ty)) if !mixed => Some(IterExpr::compare(
                IterOp::relational(form.is_less, form.is_strict),
                IterExpr::source(form.lower, lower_ty),
                IterExpr::source(form.upper, upper_ty),
            )),
            _ => {
                let cond = self.cond?;
                let ty = cx.ast.int_type_of(cond).unwrap_or(IntType::I32);
                Some(IterExpr::source(cond, ty))
            }
        }
    }

    /// Initial value of the loop variable.
    pub fn build_counter_init(&self, cx: &AnalysisContext<'_>) -> Option<IterExpr> {
        let ty = cx.ast.int_type_of(self.form.lower)?;
        Some(IterExpr::source(self.form.lower, ty))
    }

    /// Direction-relative step.
    pub fn build_counter_step(&self) -> IterExpr {
        self.form.step.clone()
    }

    /// Loop variable.
    pub fn build_counter_var(&self) -> VarId {
        self.form.var
    }
}
