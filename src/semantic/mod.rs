mod calls;
pub mod errors;
mod exprs;
pub mod ids;
pub mod methods;
pub mod polymorph;
pub mod resolve;
pub mod scope;
pub mod typecheck;
pub mod types;

use crate::errors::CompileResult;
use crate::parser::ast::{Block, FunctionDef, Item, Stmt, TypeDecl};
use crate::parser::parse_source;
use crate::span::FileId;
use ids::{FnId, PolyId, ScopeId, TypeId, VarId};
use methods::MethodRegistry;
use scope::{ScopeKind, ScopeTable};
use types::{BaseKind, Shape, TypeArena};

/// Reflection structs and `Any`, declared in the builtin scope.
const BUILTIN_SOURCE: &str = "
type Type struct { id int; base int; name string }
type NumType struct { id int; base int; name string; size int; is_signed bool }
type RefType struct { id int; base int; name string; inner &Type; owned bool }
type StructMember struct { name string; type &Type }
type StructType struct { id int; base int; name string; members []StructMember }
type EnumType struct { id int; base int; name string; inner &Type; names []string; values []int }
type ArrayType struct { id int; base int; name string; inner &Type; size int; is_static bool }
type FnType struct { id int; base int; name string; args []&Type; ret &Type; is_variadic bool }
type Any struct { value_pointer ptr; type &Type }
";

/// File id used for spans inside builtin declarations.
pub const BUILTIN_FILE: FileId = FileId(u32::MAX);

/// Handles to builtin types.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub void: TypeId,
    pub bool_: TypeId,
    pub int: TypeId,
    pub uint: TypeId,
    pub float: TypeId,
    pub float64: TypeId,
    pub string: TypeId,
    pub ptr: TypeId,
    pub u8: TypeId,
    pub type_: TypeId,
    pub num_type: TypeId,
    pub ref_type: TypeId,
    pub struct_member: TypeId,
    pub struct_type: TypeId,
    pub enum_type: TypeId,
    pub array_type: TypeId,
    pub fn_type: TypeId,
    pub any: TypeId,
}

/// Reified instance of a generic struct template.
#[derive(Debug, Clone)]
pub struct Reified {
    pub template: TypeId,
    pub args: Vec<TypeId>,
    pub result: TypeId,
}

/// Mutable state of one compilation run.
pub struct Session {
    pub types: TypeArena,
    pub scopes: ScopeTable,
    pub methods: MethodRegistry,
    /// Structurally distinct types to emit, in first-registration order.
    pub registry: Vec<TypeId>,
    pub reified: Vec<Reified>,
    pub builtins: Builtins,
}

/// A function definition: user function, nested function, function
/// literal or method.
#[derive(Debug, Clone)]
pub struct FnDef {
    pub name: String,
    /// Constant naming the function; emitted as `_vs_<id>`.
    pub var: VarId,
    pub def: FunctionDef,
    /// Scope the function was declared in.
    pub def_scope: ScopeId,
    /// Function scope holding the parameters.
    pub scope: ScopeId,
    pub ty: TypeId,
    pub params: Vec<VarId>,
    pub ret: TypeId,
    /// Signature contains placeholders; only its polymorphs are emitted.
    pub generic: bool,
    pub polymorphs: Vec<PolyId>,
    /// Declaring type for methods.
    pub method_of: Option<TypeId>,
}

/// Concrete specialization of a generic function or method.
#[derive(Debug, Clone)]
pub struct Polymorph {
    pub id: PolyId,
    pub func: FnId,
    /// Function scope carrying the binding.
    pub scope: ScopeId,
    /// Concrete parameter types.
    pub args: Vec<TypeId>,
    pub ret: TypeId,
    pub params: Vec<VarId>,
    pub body: Block,
}

/// Package-level variable declaration with the root scope it lives in.
#[derive(Debug, Clone)]
pub struct Global {
    pub scope: ScopeId,
    pub stmt: Stmt,
}

/// Fully checked program handed to the code generator.
pub struct Program {
    pub session: Session,
    pub functions: Vec<FnDef>,
    pub polymorphs: Vec<Polymorph>,
    pub globals: Vec<Global>,
    pub externs: Vec<VarId>,
    pub main: Option<FnId>,
}

impl Program {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            functions: Vec::new(),
            polymorphs: Vec::new(),
            globals: Vec::new(),
            externs: Vec::new(),
            main: None,
        }
    }

    pub fn function(&self, id: FnId) -> &FnDef {
        &self.functions[id.0 as usize]
    }

    pub fn polymorph(&self, id: PolyId) -> &Polymorph {
        &self.polymorphs[id.0 as usize]
    }
}

impl Session {
    /// Fresh session with builtin types and functions defined.
    pub fn new() -> CompileResult<Self> {
        let mut types = TypeArena::new();
        let mut scopes = ScopeTable::new();
        let b = scopes.builtins();

        let basic = |types: &mut TypeArena, scopes: &mut ScopeTable, name: &str, base, size| {
            let id = types.make_def(name, b, Some(Shape::Basic { base, size }));
            scopes.bind_type(b, name, id);
            id
        };
        let int = basic(&mut types, &mut scopes, "int", BaseKind::Int, 8);
        let s8 = basic(&mut types, &mut scopes, "s8", BaseKind::Int, 1);
        let s16 = basic(&mut types, &mut scopes, "s16", BaseKind::Int, 2);
        let s32 = basic(&mut types, &mut scopes, "s32", BaseKind::Int, 4);
        let uint = basic(&mut types, &mut scopes, "uint", BaseKind::Uint, 8);
        let u8 = basic(&mut types, &mut scopes, "u8", BaseKind::Uint, 1);
        let u16 = basic(&mut types, &mut scopes, "u16", BaseKind::Uint, 2);
        let u32 = basic(&mut types, &mut scopes, "u32", BaseKind::Uint, 4);
        let float = basic(&mut types, &mut scopes, "float", BaseKind::Float, 4);
        let float64 = basic(&mut types, &mut scopes, "float64", BaseKind::Float, 8);
        let bool_ = basic(&mut types, &mut scopes, "bool", BaseKind::Bool, 1);
        let string = basic(&mut types, &mut scopes, "string", BaseKind::String, 16);
        let void = basic(&mut types, &mut scopes, "void", BaseKind::Void, 0);
        let ptr = basic(&mut types, &mut scopes, "ptr", BaseKind::Ptr, 8);

        for (alias, target) in [("s64", int), ("u64", uint), ("float32", float)] {
            let id = types.make_def(alias, b, None);
            types.get_mut(id).target = Some(target);
            scopes.bind_type(b, alias, id);
        }

        let placeholder = Builtins {
            void,
            bool_,
            int,
            uint,
            float,
            float64,
            string,
            ptr,
            u8,
            type_: void,
            num_type: void,
            ref_type: void,
            struct_member: void,
            struct_type: void,
            enum_type: void,
            array_type: void,
            fn_type: void,
            any: void,
        };
        let mut session = Session {
            types,
            scopes,
            methods: MethodRegistry::default(),
            registry: Vec::new(),
            reified: Vec::new(),
            builtins: placeholder,
        };

        for t in [int, s8, s16, s32, uint, u8, u16, u32, float, float64, bool_, string, ptr] {
            session.register(t);
        }

        let (module, _) = parse_source(BUILTIN_SOURCE, BUILTIN_FILE, 0)?;
        let decls: Vec<&TypeDecl> = module
            .items
            .iter()
            .filter_map(|item| match item {
                Item::TypeDecl(decl) => Some(decl),
                _ => None,
            })
            .collect();
        session.define_types(b, &decls)?;

        let lookup = |s: &Session, name: &str| s.scopes.lookup_local_type(b, name).unwrap_or(void);
        session.builtins.type_ = lookup(&session, "Type");
        session.builtins.num_type = lookup(&session, "NumType");
        session.builtins.ref_type = lookup(&session, "RefType");
        session.builtins.struct_member = lookup(&session, "StructMember");
        session.builtins.struct_type = lookup(&session, "StructType");
        session.builtins.enum_type = lookup(&session, "EnumType");
        session.builtins.array_type = lookup(&session, "ArrayType");
        session.builtins.fn_type = lookup(&session, "FnType");
        session.builtins.any = lookup(&session, "Any");

        let builtin_fns: [(&str, Vec<TypeId>, TypeId); 4] = [
            ("println", vec![string], void),
            ("print", vec![string], void),
            ("itoa", vec![int], string),
            ("validptr", vec![ptr], bool_),
        ];
        for (name, args, ret) in builtin_fns {
            let fty = session.types.make_func(args, ret, false);
            session.register(fty);
            let v = session.scopes.define_var(b, name, fty);
            let var = session.scopes.var_mut(v);
            var.ext = true;
            var.constant = true;
            var.initialized = true;
        }
        Ok(session)
    }

    pub fn is_any(&self, ty: TypeId) -> bool {
        self.types.follow(ty) == self.types.follow(self.builtins.any)
    }

    /// Fresh package root scope.
    pub fn new_package_scope(&mut self) -> ScopeId {
        self.scopes.new_scope(None, ScopeKind::Root)
    }
}

/// A parsed package ready for analysis.
#[derive(Debug, Clone)]
pub struct PackageUnit {
    pub name: String,
    pub module: crate::parser::ast::Module,
}

/// Run semantic analysis over packages given in dependency order (the
/// entry package last).
pub fn analyze(packages: Vec<PackageUnit>) -> CompileResult<Program> {
    let session = Session::new()?;
    typecheck::check_program(session, packages)
}
