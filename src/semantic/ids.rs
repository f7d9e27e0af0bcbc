/// Index into the type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Index into the scope table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Index into the variable table. Also the numeric part of the emitted
/// C name (`_vs_<id>` / `_tmp<id>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

/// Index into the program's function list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(pub u32);

/// Index into the program's polymorph list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolyId(pub u32);

/// Identity of an expression node; keys generator temporaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u32);
