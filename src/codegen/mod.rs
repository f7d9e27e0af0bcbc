/// C code generation backend for the vs compiler.
pub mod c_emitter;
pub mod c_expr;
pub mod c_item;
pub mod c_lifetime;
pub mod c_mangle;
pub mod c_runtime;
pub mod c_stmt;
pub mod c_typeinfo;
pub mod c_types;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::errors::InternalError;
use crate::semantic::ids::{ScopeId, TypeId, VarId};
use crate::semantic::scope::ScopeTable;
use crate::semantic::types::TypeArena;
use crate::semantic::Program;

use c_emitter::CEmitter;

pub type CResult<T> = Result<T, InternalError>;

/// Context threaded through all codegen functions.
pub struct CodegenContext<'a> {
    pub prog: &'a Program,
    pub types: &'a TypeArena,
    pub scopes: &'a ScopeTable,
    /// Variables holding a value at the current emission point.
    initialized: FxHashSet<VarId>,
    /// Local whose value the return being emitted moves out.
    moved: Option<VarId>,
    /// Scope the statements being emitted were checked in.
    scope: ScopeId,
    /// Return type of the function being emitted.
    ret: TypeId,
}

impl<'a> CodegenContext<'a> {
    pub fn new(prog: &'a Program) -> Self {
        let scopes = &prog.session.scopes;
        Self {
            prog,
            types: &prog.session.types,
            scopes,
            initialized: FxHashSet::default(),
            moved: None,
            scope: scopes.builtins(),
            ret: prog.session.builtins.void,
        }
    }

    fn is_initialized(&self, v: VarId) -> bool {
        self.scopes.var(v).initialized || self.initialized.contains(&v)
    }

    fn mark_initialized(&mut self, v: VarId) {
        self.initialized.insert(v);
    }
}

/// Generate C source code from a checked program.
pub fn generate_c(prog: &Program) -> CResult<String> {
    let mut ctx = CodegenContext::new(prog);
    let mut emitter = CEmitter::new();

    // 1. Runtime prelude
    emitter.emit(c_runtime::RUNTIME);
    emitter.blank_line();

    // 2. Struct tags and function prototypes
    let structs = ctx.struct_order();
    ctx.emit_struct_tags(&structs, &mut emitter);
    ctx.emit_function_prototypes(&mut emitter)?;

    // 3. Type descriptor declarations
    let infos = ctx.type_info_order();
    ctx.emit_type_info_declarations(&infos, &mut emitter)?;

    // 4. Struct definitions with init/copy/free helpers
    ctx.emit_struct_definitions(&structs, &mut emitter)?;
    ctx.emit_externs(&mut emitter)?;
    ctx.emit_global_storage(&mut emitter)?;
    debug!(structs = structs.len(), descriptors = infos.len(), "emitted declarations");

    // 5. Function bodies
    ctx.emit_function_definitions(&mut emitter)?;

    // 6. Descriptor and global initialisation
    ctx.emit_type_info_init(&infos, &mut emitter)?;
    ctx.emit_globals_init(&mut emitter)?;

    // 7. Entry point
    ctx.emit_entry(&mut emitter)?;
    debug!("emitted entry point");

    Ok(emitter.finish())
}
