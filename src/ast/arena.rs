//! AST arena
//!
//! The host front end owns the real syntax tree; this arena is the shape the
//! analysis core reads. Every node is addressed by a stable handle, and the
//! analysis only ever borrows the arena immutably.

use super::nodes::*;
use super::types::{IntType, VarType};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Values bound to variables for evaluation (loop-invariant bounds such as `n`)
pub type Bindings = HashMap<VarId, i128>;

/// Arena of declarations, expressions, statements and scopes
#[derive(Debug, Clone, Default)]
pub struct Ast {
    vars: Vec<VarDecl>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    scopes: Vec<Scope>,
}

impl Ast {
    /// Creates an arena holding only the translation-unit scope.
    pub fn new() -> Self {
        Ast {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::TranslationUnit,
            }],
            ..Default::default()
        }
    }

    /// The translation-unit scope
    pub fn tu_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    // === Scopes ===

    /// Opens a scope nested in `parent`.
    pub fn add_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    /// Scope node
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Returns true if `inner` is `outer` or nested anywhere inside it.
    pub fn is_scope_within(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                return true;
            }
            current = self.scopes.get(id.index()).and_then(|s| s.parent);
        }
        false
    }

    // === Declarations ===

    /// Declares an automatic, non-const variable.
    pub fn declare(
        &mut self,
        name: &str,
        ty: VarType,
        kind: DeclKind,
        scope: ScopeId,
        loc: SourceLoc,
    ) -> VarId {
        self.declare_var(VarDecl {
            name: name.to_string(),
            ty,
            storage: StorageClass::Auto,
            kind,
            is_const: false,
            scope,
            init: None,
            loc,
        })
    }

    /// Adds a fully specified declaration.
    pub fn declare_var(&mut self, decl: VarDecl) -> VarId {
        self.vars.push(decl);
        VarId(self.vars.len() as u32 - 1)
    }

    /// Variable declaration
    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.index()]
    }

    /// Mutable variable declaration (initializers are attached after the
    /// initializer expression is built)
    pub fn var_mut(&mut self, id: VarId) -> &mut VarDecl {
        &mut self.vars[id.index()]
    }

    /// Checked variable lookup
    pub fn try_var(&self, id: VarId) -> Result<&VarDecl> {
        self.vars.get(id.index()).ok_or(Error::UnknownHandle {
            kind: "var",
            index: id.0,
        })
    }

    /// Number of declared variables
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    // === Expressions ===

    /// Adds an expression node.
    pub fn add_expr(&mut self, kind: ExprKind, ty: VarType, loc: SourceLoc) -> ExprId {
        self.exprs.push(Expr { kind, ty, loc });
        ExprId(self.exprs.len() as u32 - 1)
    }

    /// `int` literal
    pub fn int(&mut self, value: i128, loc: SourceLoc) -> ExprId {
        self.int_typed(value, IntType::I32, loc)
    }

    /// Literal of an explicit integer type
    pub fn int_typed(&mut self, value: i128, ty: IntType, loc: SourceLoc) -> ExprId {
        self.add_expr(ExprKind::IntLiteral(value), VarType::Integer(ty), loc)
    }

    /// Reference to `var`
    pub fn var_ref(&mut self, var: VarId, loc: SourceLoc) -> ExprId {
        let ty = self.var(var).ty;
        self.add_expr(ExprKind::VarRef(var), ty, loc)
    }

    /// `( e )`
    pub fn paren(&mut self, operand: ExprId) -> ExprId {
        let (ty, loc) = (self.expr(operand).ty, self.expr(operand).loc);
        self.add_expr(ExprKind::Paren(operand), ty, loc)
    }

    /// Conversion inserted by the front end
    pub fn implicit_cast(&mut self, operand: ExprId, ty: VarType) -> ExprId {
        let loc = self.expr(operand).loc;
        self.add_expr(
            ExprKind::Cast {
                operand,
                implicit: true,
            },
            ty,
            loc,
        )
    }

    /// Written cast
    pub fn cast(&mut self, operand: ExprId, ty: VarType, loc: SourceLoc) -> ExprId {
        self.add_expr(
            ExprKind::Cast {
                operand,
                implicit: false,
            },
            ty,
            loc,
        )
    }

    /// Built-in unary operator
    pub fn unary(&mut self, op: UnaryOp, operand: ExprId, loc: SourceLoc) -> ExprId {
        let operand_ty = self.expr(operand).ty;
        let ty = match op {
            UnaryOp::LNot => VarType::INT,
            _ => operand_ty,
        };
        self.add_expr(ExprKind::Unary { op, operand }, ty, loc)
    }

    /// Built-in binary operator; the result type follows the usual
    /// arithmetic conversions
    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, loc: SourceLoc) -> ExprId {
        let ty = binary_result_type(op, self.expr(lhs).ty, self.expr(rhs).ty);
        self.add_expr(ExprKind::Binary { op, lhs, rhs }, ty, loc)
    }

    /// `lhs = rhs`
    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId, loc: SourceLoc) -> ExprId {
        let ty = self.expr(lhs).ty;
        self.add_expr(ExprKind::Assign { lhs, rhs }, ty, loc)
    }

    /// `lhs op= rhs`
    pub fn compound_assign(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        loc: SourceLoc,
    ) -> ExprId {
        let ty = self.expr(lhs).ty;
        self.add_expr(ExprKind::CompoundAssign { op, lhs, rhs }, ty, loc)
    }

    /// Overloaded operator call; the result has the first operand's type
    /// except for relational operators
    pub fn operator_call(&mut self, op: OverloadedOp, args: Vec<ExprId>, loc: SourceLoc) -> ExprId {
        let ty = if op.as_relational().is_some() {
            VarType::INT
        } else {
            args.first().map(|a| self.expr(*a).ty).unwrap_or(VarType::INT)
        };
        self.add_expr(ExprKind::OperatorCall { op, args }, ty, loc)
    }

    /// Opaque call
    pub fn call(&mut self, callee: &str, args: Vec<ExprId>, ty: VarType, loc: SourceLoc) -> ExprId {
        self.add_expr(
            ExprKind::Call {
                callee: callee.to_string(),
                args,
            },
            ty,
            loc,
        )
    }

    /// Expression node
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Checked expression lookup
    pub fn try_expr(&self, id: ExprId) -> Result<&Expr> {
        self.exprs.get(id.index()).ok_or(Error::UnknownHandle {
            kind: "expr",
            index: id.0,
        })
    }

    // === Statements ===

    /// Adds a statement node.
    pub fn add_stmt(&mut self, kind: StmtKind, loc: SourceLoc) -> StmtId {
        self.stmts.push(Stmt { kind, loc });
        StmtId(self.stmts.len() as u32 - 1)
    }

    /// Expression statement
    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        let loc = self.expr(expr).loc;
        self.add_stmt(StmtKind::Expr(expr), loc)
    }

    /// Declaration statement
    pub fn decl_stmt(&mut self, vars: Vec<VarId>, loc: SourceLoc) -> StmtId {
        self.add_stmt(StmtKind::Decl(vars), loc)
    }

    /// `for` statement
    pub fn for_stmt(
        &mut self,
        init: Option<StmtId>,
        cond: Option<ExprId>,
        inc: Option<ExprId>,
        body: StmtId,
        loc: SourceLoc,
    ) -> StmtId {
        self.add_stmt(
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            },
            loc,
        )
    }

    /// Compound statement
    pub fn compound(&mut self, stmts: Vec<StmtId>, loc: SourceLoc) -> StmtId {
        self.add_stmt(StmtKind::Compound(stmts), loc)
    }

    /// Empty statement
    pub fn null_stmt(&mut self, loc: SourceLoc) -> StmtId {
        self.add_stmt(StmtKind::Null, loc)
    }

    /// Directive statement
    pub fn directive(&mut self, directive: DirectiveStmt, loc: SourceLoc) -> StmtId {
        self.add_stmt(StmtKind::Directive(directive), loc)
    }

    /// Statement node
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    /// Checked statement lookup
    pub fn try_stmt(&self, id: StmtId) -> Result<&Stmt> {
        self.stmts.get(id.index()).ok_or(Error::UnknownHandle {
            kind: "stmt",
            index: id.0,
        })
    }

    /// Directive payload of a statement
    pub fn directive_of(&self, id: StmtId) -> Result<&DirectiveStmt> {
        match &self.try_stmt(id)?.kind {
            StmtKind::Directive(d) => Ok(d),
            _ => Err(Error::NotADirective { index: id.0 }),
        }
    }

    // === Queries ===

    /// Strips compound statements holding exactly one statement.
    pub fn ignore_containers(&self, mut id: StmtId) -> StmtId {
        while let StmtKind::Compound(body) = &self.stmt(id).kind {
            match body.as_slice() {
                [only] => id = *only,
                _ => break,
            }
        }
        id
    }

    /// Strips parentheses and implicit conversions.
    pub fn ignore_implicit(&self, mut id: ExprId) -> ExprId {
        loop {
            match self.expr(id).kind {
                ExprKind::Paren(inner)
                | ExprKind::Cast {
                    operand: inner,
                    implicit: true,
                } => id = inner,
                _ => return id,
            }
        }
    }

    /// Variable named by `id`, looking through implicit wrappers
    pub fn as_var_ref(&self, id: ExprId) -> Option<VarId> {
        match self.expr(self.ignore_implicit(id)).kind {
            ExprKind::VarRef(var) => Some(var),
            _ => None,
        }
    }

    /// Returns true if `id` names `var`.
    pub fn refers_to(&self, id: ExprId, var: VarId) -> bool {
        self.as_var_ref(id) == Some(var)
    }

    /// Integer view of the expression's type
    pub fn int_type_of(&self, id: ExprId) -> Option<IntType> {
        self.expr(id).ty.arithmetic()
    }

    /// Direct operands of an expression
    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        match &self.expr(id).kind {
            ExprKind::IntLiteral(_) | ExprKind::VarRef(_) => Vec::new(),
            ExprKind::Paren(e) => vec![*e],
            ExprKind::Cast { operand, .. } | ExprKind::Unary { operand, .. } => vec![*operand],
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs }
            | ExprKind::CompoundAssign { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::OperatorCall { args, .. } | ExprKind::Call { args, .. } => args.clone(),
        }
    }

    /// Span of all locations in the expression subtree
    pub fn expr_range(&self, id: ExprId) -> SourceRange {
        let mut range = SourceRange::point(self.expr(id).loc);
        let mut work = self.children(id);
        while let Some(next) = work.pop() {
            range = range.join(SourceRange::point(self.expr(next).loc));
            work.extend(self.children(next));
        }
        range
    }

    /// Span of a statement: its own location joined with any expressions it holds
    pub fn stmt_range(&self, id: StmtId) -> SourceRange {
        let stmt = self.stmt(id);
        let own = SourceRange::point(stmt.loc);
        match &stmt.kind {
            StmtKind::Expr(e) => own.join(self.expr_range(*e)),
            StmtKind::Decl(vars) => vars
                .iter()
                .filter_map(|v| self.var(*v).init)
                .fold(own, |r, init| r.join(self.expr_range(init))),
            _ => own,
        }
    }

    // === Constant evaluation ===

    /// Evaluates an integer constant expression.
    pub fn eval_constant(&self, id: ExprId) -> Option<i128> {
        self.eval_int(id, &Bindings::new())
    }

    /// Evaluates an integer expression, reading variables from `bindings`.
    /// `const` variables with evaluable initializers are folded. Results are
    /// wrapped to the expression's type; side effects are not evaluable.
    pub fn eval_int(&self, id: ExprId, bindings: &Bindings) -> Option<i128> {
        let expr = self.expr(id);
        let ty = expr.ty.arithmetic();
        let wrap = |v: i128| ty.map_or(v, |t| t.wrap(v));
        match &expr.kind {
            ExprKind::IntLiteral(v) => Some(wrap(*v)),
            ExprKind::VarRef(var) => {
                if let Some(v) = bindings.get(var) {
                    return Some(wrap(*v));
                }
                let decl = self.var(*var);
                match (decl.is_const, decl.init) {
                    (true, Some(init)) => self.eval_int(init, bindings).map(wrap),
                    _ => None,
                }
            }
            ExprKind::Paren(inner) => self.eval_int(*inner, bindings),
            ExprKind::Cast { operand, .. } => ty.and_then(|t| {
                self.eval_int(*operand, bindings).map(|v| t.wrap(v))
            }),
            ExprKind::Unary { op, operand } => {
                let v = self.eval_int(*operand, bindings)?;
                match op {
                    UnaryOp::Neg => Some(wrap(v.checked_neg()?)),
                    UnaryOp::Plus => Some(v),
                    UnaryOp::BitNot => Some(wrap(!v)),
                    UnaryOp::LNot => Some((v == 0) as i128),
                    _ => None,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let operand_ty = self
                    .int_type_of(*lhs)
                    .zip(self.int_type_of(*rhs))
                    .map(|(a, b)| a.common(b));
                let conv = |v: i128| operand_ty.map_or(v, |t| t.wrap(v));
                match op {
                    BinaryOp::LAnd => {
                        let l = self.eval_int(*lhs, bindings)?;
                        if l == 0 {
                            return Some(0);
                        }
                        Some((self.eval_int(*rhs, bindings)? != 0) as i128)
                    }
                    BinaryOp::LOr => {
                        let l = self.eval_int(*lhs, bindings)?;
                        if l != 0 {
                            return Some(1);
                        }
                        Some((self.eval_int(*rhs, bindings)? != 0) as i128)
                    }
                    _ => {
                        let l = conv(self.eval_int(*lhs, bindings)?);
                        let r = conv(self.eval_int(*rhs, bindings)?);
                        let raw = apply_binary(*op, l, r)?;
                        Some(if op.is_comparison() { raw } else { wrap(raw) })
                    }
                }
            }
            ExprKind::Assign { .. }
            | ExprKind::CompoundAssign { .. }
            | ExprKind::OperatorCall { .. }
            | ExprKind::Call { .. } => None,
        }
    }
}

/// Applies a built-in operator to already converted operands.
pub(crate) fn apply_binary(op: BinaryOp, l: i128, r: i128) -> Option<i128> {
    Some(match op {
        BinaryOp::Add => l.checked_add(r)?,
        BinaryOp::Sub => l.checked_sub(r)?,
        BinaryOp::Mul => l.checked_mul(r)?,
        BinaryOp::Div => l.checked_div(r)?,
        BinaryOp::Rem => l.checked_rem(r)?,
        BinaryOp::Shl => l.checked_shl(u32::try_from(r).ok()?)?,
        BinaryOp::Shr => l.checked_shr(u32::try_from(r).ok()?)?,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Lt => (l < r) as i128,
        BinaryOp::Le => (l <= r) as i128,
        BinaryOp::Gt => (l > r) as i128,
        BinaryOp::Ge => (l >= r) as i128,
        BinaryOp::Eq => (l == r) as i128,
        BinaryOp::Ne => (l != r) as i128,
        BinaryOp::LAnd => (l != 0 && r != 0) as i128,
        BinaryOp::LOr => (l != 0 || r != 0) as i128,
    })
}

fn binary_result_type(op: BinaryOp, lhs: VarType, rhs: VarType) -> VarType {
    if op.is_comparison() {
        return VarType::INT;
    }
    match (op, lhs, rhs) {
        (BinaryOp::Shl | BinaryOp::Shr, l, _) => l,
        (_, VarType::Integer(a), VarType::Integer(b)) => VarType::Integer(a.common(b)),
        (BinaryOp::Sub, VarType::Pointer, VarType::Pointer) => VarType::Integer(IntType::I64),
        (BinaryOp::Add | BinaryOp::Sub, VarType::Pointer, VarType::Integer(_)) => VarType::Pointer,
        (BinaryOp::Add, VarType::Integer(_), VarType::Pointer) => VarType::Pointer,
        (_, l, _) => l,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLoc {
        SourceLoc::new(1, 1)
    }

    #[test]
    fn test_constant_arithmetic() {
        let mut ast = Ast::new();
        let a = ast.int(10, loc());
        let b = ast.int(3, loc());
        let sum = ast.binary(BinaryOp::Add, a, b, loc());
        let div = ast.binary(BinaryOp::Div, sum, b, loc());
        assert_eq!(ast.eval_constant(div), Some(4));

        let neg = ast.int(-7, loc());
        let rem = ast.binary(BinaryOp::Rem, neg, b, loc());
        assert_eq!(ast.eval_constant(rem), Some(-1));
    }

    #[test]
    fn test_unsigned_comparison_converts_operands() {
        let mut ast = Ast::new();
        let minus_one = ast.int(-1, loc());
        let zero = ast.int_typed(0, IntType::U32, loc());
        // -1 < 0u is false after conversion to unsigned
        let lt = ast.binary(BinaryOp::Lt, minus_one, zero, loc());
        assert_eq!(ast.eval_constant(lt), Some(0));
    }

    #[test]
    fn test_variable_bindings_and_const_folding() {
        let mut ast = Ast::new();
        let tu = ast.tu_scope();
        let n = ast.declare("n", VarType::INT, DeclKind::Global, tu, loc());
        let k = ast.declare("k", VarType::INT, DeclKind::Global, tu, loc());
        let five = ast.int(5, loc());
        ast.var_mut(k).is_const = true;
        ast.var_mut(k).init = Some(five);

        let n_ref = ast.var_ref(n, loc());
        let k_ref = ast.var_ref(k, loc());
        let mul = ast.binary(BinaryOp::Mul, n_ref, k_ref, loc());

        assert_eq!(ast.eval_constant(mul), None);
        let mut bindings = Bindings::new();
        bindings.insert(n, 4);
        assert_eq!(ast.eval_int(mul, &bindings), Some(20));
    }

    #[test]
    fn test_division_by_zero_is_not_constant() {
        let mut ast = Ast::new();
        let a = ast.int(1, loc());
        let z = ast.int(0, loc());
        let div = ast.binary(BinaryOp::Div, a, z, loc());
        assert_eq!(ast.eval_constant(div), None);
    }

    #[test]
    fn test_ignore_implicit_and_scopes() {
        let mut ast = Ast::new();
        let tu = ast.tu_scope();
        let func = ast.add_scope(tu, ScopeKind::Function);
        let block = ast.add_scope(func, ScopeKind::Block);
        let i = ast.declare("i", VarType::INT, DeclKind::Local, block, loc());
        let r = ast.var_ref(i, loc());
        let p = ast.paren(r);
        let c = ast.implicit_cast(p, VarType::Integer(IntType::I64));
        assert_eq!(ast.ignore_implicit(c), r);
        assert!(ast.refers_to(c, i));

        assert!(ast.is_scope_within(block, func));
        assert!(ast.is_scope_within(block, block));
        assert!(!ast.is_scope_within(func, block));
    }

    #[test]
    fn test_wrapping_to_expression_type() {
        let mut ast = Ast::new();
        let big = ast.int_typed(i32::MAX as i128, IntType::I32, loc());
        let one = ast.int(1, loc());
        let sum = ast.binary(BinaryOp::Add, big, one, loc());
        assert_eq!(ast.eval_constant(sum), Some(i32::MIN as i128));
    }
}
