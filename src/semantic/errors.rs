use thiserror::Error;

use crate::span::Span;

/// A user-facing semantic diagnostic.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticErrorKind {
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Unknown package '{0}'")]
    UnknownPackage(String),

    #[error("Variable '{0}' already declared within this scope")]
    Redeclared(String),

    #[error("Type '{0}' already declared within this scope")]
    TypeRedeclared(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Operator '{op}' is not valid for type {ty}")]
    InvalidOperator { op: String, ty: String },

    #[error("Invalid operands for '{op}': {left} and {right}")]
    OperandMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("Cannot call a value of type {0}")]
    NotCallable(String),

    #[error("Wrong number of arguments to '{name}': expected {expected}, got {got}")]
    ArgCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Argument of type {got} does not match polymorphic parameter {expected}")]
    PolymorphMismatch { expected: String, got: String },

    #[error("Type {ty} has no member '{name}'")]
    UnknownMember { ty: String, name: String },

    #[error("No method '{name}' for type {ty}")]
    NoMethod { ty: String, name: String },

    #[error("Cannot index into a value of type {0}")]
    NotIndexable(String),

    #[error("Cannot slice a value of type {0}")]
    NotSliceable(String),

    #[error("Cannot iterate over a value of type {0}")]
    NotIterable(String),

    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Return value of type {got} in function returning {expected}")]
    ReturnMismatch { expected: String, got: String },

    #[error("Missing return value in function returning {0}")]
    MissingReturnValue(String),

    #[error("'{0}' outside of a loop")]
    OutsideLoop(&'static str),

    #[error("Cannot assign to this expression")]
    NotAssignable,

    #[error("Cannot copy owned reference of type {0}")]
    OwnedRefCopy(String),

    #[error("Cannot dereference a value of type {0}")]
    NotDereferenceable(String),

    #[error("Cannot take the address of a temporary value")]
    AddressOfRvalue,

    #[error("Struct {ty} has no field '{name}'")]
    UnknownField { ty: String, name: String },

    #[error("Field '{0}' given more than once")]
    DuplicateField(String),

    #[error("Enum {0} has no value '{1}'")]
    UnknownEnumValue(String, String),

    #[error("'.name' requires a constant enum value")]
    EnumNameNotConstant,

    #[error("Static arrays cannot be returned from functions")]
    StaticArrayReturn,

    #[error("Cannot declare a variable of type void")]
    VoidVariable,

    #[error("Cannot infer the type of '{0}'")]
    CannotInfer(String),

    #[error("Spread argument must be an array, got {0}")]
    BadSpread(String),

    #[error("Spread argument used on non-variadic function '{0}'")]
    SpreadNotVariadic(String),

    #[error("No main function defined")]
    NoMain,

    #[error("'{0}' is not a generic struct")]
    NotGeneric(String),

    #[error("'{0}' expects {1} type arguments")]
    GenericArgCount(String, usize),

    #[error("Cannot define methods on a polymorphic placeholder")]
    MethodOnPlaceholder,
}

pub type SemResult<T> = Result<T, SemanticError>;
