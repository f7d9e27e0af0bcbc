use crate::semantic::ids::{FnId, NodeId, PolyId, ScopeId, TypeId, VarId};
use crate::span::{Span, Spanned};

// ══════════════════════════════════════════════════════════════
// Top-Level
// ══════════════════════════════════════════════════════════════

/// A complete source file.
#[derive(Debug, Clone)]
pub struct Module {
    pub items: Vec<Item>,
    pub span: Span,
}

/// A top-level item in a module.
#[derive(Debug, Clone)]
pub enum Item {
    Function(FunctionDef),
    Extern(ExternFn),
    TypeDecl(TypeDecl),
    Impl(ImplBlock),
    Use(UseDecl),
    /// Package-level variable declaration.
    Global(Stmt),
}

#[derive(Debug, Clone)]
pub struct UseDecl {
    pub package: Spanned<String>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Spanned<String>,
    /// Names listed in `<$T, $U>`; placeholders may also appear only in
    /// parameter types.
    pub poly_params: Vec<Spanned<String>>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: TypeExpr,
    /// `rest ...T`; only the last parameter may be variadic.
    pub variadic: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExternFn {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImplBlock {
    pub target: TypeExpr,
    pub methods: Vec<FunctionDef>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Spanned<String>,
    pub value: TypeExpr,
    pub span: Span,
}

/// A type as written in source.
#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    Named(String),
    /// `$T`
    Poly(String),
    /// `pkg.Name`
    External { package: String, name: String },
    /// `&T` or `'T`
    Ref { inner: Box<TypeExpr>, owned: bool },
    /// `[]T` or `'[]T`
    Array { inner: Box<TypeExpr>, owned: bool },
    /// `[N]T`
    StaticArray { inner: Box<TypeExpr>, length: u64 },
    Func {
        args: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        variadic: bool,
    },
    /// `struct { .. }` or `struct($T) { .. }`
    Struct {
        params: Vec<Spanned<String>>,
        fields: Vec<(Spanned<String>, TypeExpr)>,
    },
    /// `enum { A, B = 5 }` with an optional backing type.
    Enum {
        inner: Option<Box<TypeExpr>>,
        members: Vec<(Spanned<String>, Option<i64>)>,
    },
    /// `Name(T, U)`: a generic struct applied to arguments.
    Params { base: Box<TypeExpr>, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn named(name: &str, span: Span) -> Self {
        TypeExpr {
            kind: TypeExprKind::Named(name.to_string()),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
    /// Set by the checker.
    pub scope: Option<ScopeId>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self {
            stmts,
            span,
            scope: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    /// `x T = e;`, `x := e;`, `x T;`
    Decl {
        name: Spanned<String>,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        var: Option<VarId>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Stmt>>,
    },
    /// The condition is checked inside the body's loop scope.
    While {
        cond: Expr,
        body: Block,
    },
    For {
        index: Option<Spanned<String>>,
        item: Spanned<String>,
        iter: Expr,
        body: Block,
        index_var: Option<VarId>,
        item_var: Option<VarId>,
    },
    Block(Block),
    /// Nested function; hoisted to the top level during emission.
    Fn {
        def: Box<FunctionDef>,
        func: Option<FnId>,
    },
    TypeDecl(TypeDecl),
}

// ══════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
    /// Resolved type, filled in by the checker.
    pub ty: Option<TypeId>,
    /// Fresh dynamic value in a borrowing position; the generator stores it
    /// in a temporary so it can be released at scope exit.
    pub needs_temp: bool,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self {
            id,
            kind,
            span,
            ty: None,
            needs_temp: false,
        }
    }

    /// Expressions that denote storage and can have their address taken.
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Ident { .. } => true,
            ExprKind::Dot { object, access, .. } => match access {
                Access::Field { deref } => *deref || object.needs_temp || object.is_lvalue(),
                _ => false,
            },
            ExprKind::Index { .. } => true,
            ExprKind::Unary {
                op: UnaryOp::Deref, ..
            } => true,
            _ => false,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Str(_)
        )
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ident {
        name: String,
        var: Option<VarId>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Dot {
        object: Box<Expr>,
        field: Spanned<String>,
        access: Access,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// `f(xs...)`: the last argument is forwarded as the variadic array.
        spread: bool,
        target: CallTarget,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        to: TypeExpr,
    },
    StructLit {
        ty: TypeExpr,
        fields: Vec<(Spanned<String>, Expr)>,
    },
    ArrayLit {
        elems: Vec<Expr>,
    },
    /// `new T`: an owned reference to zeroed storage.
    New {
        ty: TypeExpr,
        target: Option<TypeId>,
    },
    /// `#type(T)`
    TypeInfo {
        ty: TypeExpr,
        target: Option<TypeId>,
    },
    FnLit {
        def: Box<FunctionDef>,
        func: Option<FnId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Ref,
    Deref,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Ref => "&",
            UnaryOp::Deref => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logic(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// How a `.field` access was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Unresolved,
    /// Struct member; `deref` when reached through a reference (`->`).
    Field { deref: bool },
    /// `Color.Red`
    EnumValue(i64),
    /// `Color.Red.name`
    EnumName(String),
    /// `.length` on strings and arrays.
    Length,
}

/// How a call was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Unresolved,
    /// Statically known function, extern or builtin.
    Direct,
    /// Computed function value; emitted through a function-pointer cast.
    Indirect,
    Polymorph { func: FnId, poly: PolyId },
    /// `recv.m(..)`; the receiver is passed as the first argument.
    /// `auto_ref` when the receiver is a value rather than a reference.
    Method {
        func: FnId,
        poly: Option<PolyId>,
        auto_ref: bool,
    },
}
