//! Arena handles and node shapes

use super::types::VarType;
use crate::directive::{Clause, DirectiveKind};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning arena
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Variable declaration handle
    VarId
);
arena_id!(
    /// Expression handle
    ExprId
);
arena_id!(
    /// Statement handle
    StmtId
);
arena_id!(
    /// Lexical scope handle
    ScopeId
);

/// Line/column position in the translation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SourceLoc {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourceLoc {
    /// Creates a location.
    pub const fn new(line: u32, column: u32) -> Self {
        SourceLoc { line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Inclusive span between two locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRange {
    /// First location covered
    pub begin: SourceLoc,
    /// Last location covered
    pub end: SourceLoc,
}

impl SourceRange {
    /// Single-location range
    pub fn point(loc: SourceLoc) -> Self {
        SourceRange {
            begin: loc,
            end: loc,
        }
    }

    /// Smallest range covering both.
    pub fn join(self, other: SourceRange) -> Self {
        SourceRange {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

/// Storage class written on a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// No specifier / `auto`
    Auto,
    /// `register`
    Register,
    /// `static`
    Static,
    /// `extern`
    Extern,
    /// `thread_local` / `__thread`
    ThreadLocal,
}

/// Where a variable is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    /// Block-scope variable inside a function
    Local,
    /// Function parameter
    Param,
    /// File or namespace scope variable
    Global,
    /// `static` data member of a class
    StaticMember,
}

/// Variable declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    /// Spelling
    pub name: String,
    /// Type category
    pub ty: VarType,
    /// Storage class
    pub storage: StorageClass,
    /// Declaration context
    pub kind: DeclKind,
    /// `const` qualified
    pub is_const: bool,
    /// Declaring scope
    pub scope: ScopeId,
    /// Initializer, if any
    pub init: Option<ExprId>,
    /// Declaration location
    pub loc: SourceLoc,
}

impl VarDecl {
    /// Local or parameter declaration of a function
    pub fn is_function_local(&self) -> bool {
        matches!(self.kind, DeclKind::Local | DeclKind::Param)
    }

    /// Automatic storage duration
    pub fn has_local_storage(&self) -> bool {
        self.is_function_local()
            && matches!(self.storage, StorageClass::Auto | StorageClass::Register)
    }

    /// Static storage duration
    pub fn has_global_storage(&self) -> bool {
        !self.has_local_storage()
    }

    /// Block-scope automatic variable (not a parameter)
    pub fn is_local_auto(&self) -> bool {
        self.kind == DeclKind::Local && self.has_local_storage()
    }
}

/// Kind of lexical scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// File scope; always `ScopeId(0)`
    TranslationUnit,
    /// Function body
    Function,
    /// Compound statement
    Block,
    /// `for` statement (covers its init declaration)
    For,
    /// Region of a directive
    Directive(DirectiveKind),
}

/// Lexical scope node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Enclosing scope; `None` only for the translation unit
    pub parent: Option<ScopeId>,
    /// Scope kind
    pub kind: ScopeKind,
}

/// Built-in unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `++x`
    PreInc,
    /// `x++`
    PostInc,
    /// `--x`
    PreDec,
    /// `x--`
    PostDec,
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `~x`
    BitNot,
    /// `!x`
    LNot,
}

impl UnaryOp {
    /// Increment or decrement of any form
    pub fn is_inc_dec(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PostInc | UnaryOp::PreDec | UnaryOp::PostDec
        )
    }

    /// Decrement of any form
    pub fn is_decrement(self) -> bool {
        matches!(self, UnaryOp::PreDec | UnaryOp::PostDec)
    }
}

/// Built-in binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LAnd,
    LOr,
}

impl BinaryOp {
    /// `<`, `<=`, `>`, `>=`
    pub fn is_relational(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    /// Produces a truth value
    pub fn is_comparison(self) -> bool {
        self.is_relational()
            || matches!(self, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::LAnd | BinaryOp::LOr)
    }

    /// Spelling
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::LAnd => "&&",
            BinaryOp::LOr => "||",
        }
    }
}

/// Overloaded operators that appear as explicit operator calls on class
/// typed loop variables (iterators)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverloadedOp {
    /// `operator=`
    Assign,
    /// `operator++`
    PlusPlus,
    /// `operator--`
    MinusMinus,
    /// `operator+=`
    PlusEqual,
    /// `operator-=`
    MinusEqual,
    /// `operator+`
    Plus,
    /// `operator-`
    Minus,
    /// `operator<`
    Less,
    /// `operator<=`
    LessEqual,
    /// `operator>`
    Greater,
    /// `operator>=`
    GreaterEqual,
}

impl OverloadedOp {
    /// Relational equivalent, if any
    pub fn as_relational(self) -> Option<BinaryOp> {
        match self {
            OverloadedOp::Less => Some(BinaryOp::Lt),
            OverloadedOp::LessEqual => Some(BinaryOp::Le),
            OverloadedOp::Greater => Some(BinaryOp::Gt),
            OverloadedOp::GreaterEqual => Some(BinaryOp::Ge),
            _ => None,
        }
    }
}

/// Expression shapes consumed by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLiteral(i128),
    /// Reference to a declared variable
    VarRef(VarId),
    /// `( e )`
    Paren(ExprId),
    /// Conversion to the node's type
    Cast {
        /// Converted operand
        operand: ExprId,
        /// Inserted by the front end rather than written
        implicit: bool,
    },
    /// Built-in unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: ExprId,
    },
    /// Built-in binary operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: ExprId,
        /// Right operand
        rhs: ExprId,
    },
    /// `lhs = rhs`
    Assign {
        /// Assigned place
        lhs: ExprId,
        /// Value
        rhs: ExprId,
    },
    /// `lhs op= rhs`
    CompoundAssign {
        /// Arithmetic part of the operator
        op: BinaryOp,
        /// Updated place
        lhs: ExprId,
        /// Operand
        rhs: ExprId,
    },
    /// Overloaded operator call; operands in source order
    OperatorCall {
        /// Operator
        op: OverloadedOp,
        /// Operands
        args: Vec<ExprId>,
    },
    /// Opaque function call
    Call {
        /// Callee spelling
        callee: String,
        /// Arguments
        args: Vec<ExprId>,
    },
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Shape
    pub kind: ExprKind,
    /// Result type
    pub ty: VarType,
    /// Location of the operator or primary token
    pub loc: SourceLoc,
}

/// Directive statement with its already-parsed clauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveStmt {
    /// Directive kind
    pub kind: DirectiveKind,
    /// Name of a `critical` construct
    pub name: Option<String>,
    /// Construct type named by `cancel` / `cancellation point`
    pub cancel_region: Option<DirectiveKind>,
    /// Clauses in source order
    pub clauses: Vec<Clause>,
    /// Variables listed by a `threadprivate` directive
    pub vars: Vec<ExprId>,
    /// Associated statement
    pub body: Option<StmtId>,
    /// Region scope opened by the directive
    pub scope: ScopeId,
}

/// Statement shapes consumed by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement
    Expr(ExprId),
    /// Declaration of one or more variables (initializers live on the decls)
    Decl(Vec<VarId>),
    /// `for (init; cond; inc) body`
    For {
        /// Init statement
        init: Option<StmtId>,
        /// Condition
        cond: Option<ExprId>,
        /// Increment
        inc: Option<ExprId>,
        /// Body
        body: StmtId,
    },
    /// `{ ... }`
    Compound(Vec<StmtId>),
    /// Executable or declarative directive
    Directive(DirectiveStmt),
    /// `;`
    Null,
}

/// Statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    /// Shape
    pub kind: StmtKind,
    /// Location of the first token
    pub loc: SourceLoc,
}
