use rustc_hash::FxHashMap;

use crate::errors::InternalError;

use super::ids::{FnId, NodeId, PolyId, ScopeId, TypeId, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Function,
    Loop,
    Simple,
}

/// A variable, user-declared or generator-introduced.
#[derive(Debug, Clone)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: TypeId,
    pub scope: ScopeId,
    /// Generator-introduced storage, emitted as `_tmp<id>`.
    pub temp: bool,
    /// A value has been stored; gates release at scope exit.
    pub initialized: bool,
    /// Visible across function boundaries (functions, builtins).
    pub constant: bool,
    /// Foreign symbol; bypasses ownership handling.
    pub ext: bool,
    /// Views storage owned elsewhere (loop items, static-array
    /// parameters); never released.
    pub borrowed: bool,
    /// Function this constant names, if any.
    pub func: Option<FnId>,
}

/// Generator temporary keyed by the expression that produced it.
#[derive(Debug, Clone, Copy)]
pub struct TempVar {
    pub var: VarId,
    pub origin: NodeId,
}

/// Placeholder substitutions of one polymorph.
#[derive(Debug, Clone)]
pub struct Binding {
    pub poly: PolyId,
    pub defs: Vec<(String, TypeId)>,
}

impl Binding {
    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.defs.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }
}

pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub vars: Vec<VarId>,
    pub temp_vars: Vec<TempVar>,
    pub types: FxHashMap<String, TypeId>,
    pub polymorph: Option<Binding>,
    /// Block ended in an explicit `return`; its scope exit emits no frees.
    pub has_return: bool,
    /// `use`d packages, on package roots only.
    pub imports: FxHashMap<String, ScopeId>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, kind: ScopeKind) -> Self {
        Self {
            parent,
            kind,
            vars: Vec::new(),
            temp_vars: Vec::new(),
            types: FxHashMap::default(),
            polymorph: None,
            has_return: false,
            imports: FxHashMap::default(),
        }
    }
}

/// The scope tree plus every variable, addressed by id.
pub struct ScopeTable {
    scopes: Vec<Scope>,
    vars: Vec<Var>,
    builtins: ScopeId,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(None, ScopeKind::Root)],
            vars: Vec::new(),
            builtins: ScopeId(0),
        }
    }

    /// Scope holding builtin types and functions; consulted last.
    pub fn builtins(&self) -> ScopeId {
        self.builtins
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0 as usize]
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(parent, kind));
        id
    }

    pub fn root_of(&self, mut scope: ScopeId) -> ScopeId {
        while let Some(parent) = self.get(scope).parent {
            scope = parent;
        }
        scope
    }

    pub fn closest_fn_scope(&self, mut scope: ScopeId) -> Option<ScopeId> {
        loop {
            let s = self.get(scope);
            if s.kind == ScopeKind::Function {
                return Some(scope);
            }
            scope = s.parent?;
        }
    }

    pub fn closest_loop_scope(&self, mut scope: ScopeId) -> Option<ScopeId> {
        loop {
            let s = self.get(scope);
            match s.kind {
                ScopeKind::Loop => return Some(scope),
                ScopeKind::Function | ScopeKind::Root => return None,
                ScopeKind::Simple => scope = s.parent?,
            }
        }
    }

    // ── Variables ─────────────────────────────────────────────

    fn push_var(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var {
            id,
            name: name.to_string(),
            ty,
            scope,
            temp: false,
            initialized: false,
            constant: false,
            ext: false,
            borrowed: false,
            func: None,
        });
        id
    }

    /// Create a variable and attach it to `scope`.
    pub fn define_var(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> VarId {
        let id = self.push_var(scope, name, ty);
        self.get_mut(scope).vars.push(id);
        id
    }

    /// Create a variable that belongs to no scope's release list
    /// (anonymous function constants).
    pub fn detached_var(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> VarId {
        self.push_var(scope, name, ty)
    }

    pub fn lookup_local_var(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        self.get(scope)
            .vars
            .iter()
            .rev()
            .copied()
            .find(|v| {
                let var = self.var(*v);
                !var.temp && var.name == name
            })
    }

    /// Walk the scope chain. Once a function boundary has been crossed only
    /// constants are visible; package globals and builtins are always
    /// visible.
    pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        let mut current = Some(scope);
        let mut crossed_fn = false;
        while let Some(s) = current {
            if let Some(v) = self.lookup_local_var(s, name) {
                if !crossed_fn || self.var(v).constant {
                    return Some(v);
                }
            }
            let sc = self.get(s);
            if sc.kind == ScopeKind::Function {
                crossed_fn = true;
            }
            current = sc.parent;
        }
        let root = self.root_of(scope);
        self.lookup_local_var(root, name)
            .or_else(|| self.lookup_local_var(self.builtins, name))
    }

    /// Attach a temporary for the expression `origin` to `scope`.
    pub fn make_temp_var(&mut self, scope: ScopeId, ty: TypeId, origin: NodeId) -> VarId {
        let id = self.define_var(scope, "", ty);
        self.var_mut(id).temp = true;
        self.get_mut(scope).temp_vars.push(TempVar { var: id, origin });
        id
    }

    /// Most recent temporary for `origin`, searching `scope` then its
    /// parents.
    pub fn find_temp_var(&self, scope: ScopeId, origin: NodeId) -> Option<VarId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let sc = self.get(s);
            if let Some(tv) = sc.temp_vars.iter().rev().find(|t| t.origin == origin) {
                return Some(tv.var);
            }
            current = sc.parent;
        }
        None
    }

    // ── Types ─────────────────────────────────────────────────

    pub fn lookup_local_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let s = self.get(scope);
        if let Some(binding) = &s.polymorph {
            if let Some(t) = binding.get(name) {
                return Some(t);
            }
        }
        s.types.get(name).copied()
    }

    /// Polymorph bindings win over ordinary definitions at every level;
    /// builtins are consulted last.
    pub fn lookup_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(t) = self.lookup_local_type(s, name) {
                return Some(t);
            }
            current = self.get(s).parent;
        }
        self.lookup_local_type(self.builtins, name)
    }

    /// Nearest polymorph binding of `name`, if any.
    pub fn lookup_polymorph(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let sc = self.get(s);
            if let Some(t) = sc.polymorph.as_ref().and_then(|b| b.get(name)) {
                return Some(t);
            }
            current = sc.parent;
        }
        None
    }

    /// Whether `scope` or an ancestor carries a polymorph binding.
    pub fn in_polymorph(&self, scope: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(s) = current {
            let sc = self.get(s);
            if sc.polymorph.is_some() {
                return true;
            }
            current = sc.parent;
        }
        false
    }

    /// Record `name -> ty` in `scope`. Returns false on a local conflict.
    pub fn bind_type(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> bool {
        if self.lookup_local_type(scope, name).is_some() {
            return false;
        }
        self.get_mut(scope).types.insert(name.to_string(), ty);
        true
    }

    /// Bind a placeholder in the polymorph carried by `scope`.
    pub fn define_polymorph(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: TypeId,
    ) -> Result<(), InternalError> {
        if self.lookup_local_type(scope, name).is_some() {
            return Err(InternalError::new(format!(
                "Type '{name}' already declared within this scope."
            )));
        }
        match &mut self.get_mut(scope).polymorph {
            Some(binding) => {
                binding.defs.push((name.to_string(), ty));
                Ok(())
            }
            None => Err(InternalError::new(format!(
                "binding '{name}' outside of a polymorph scope"
            ))),
        }
    }

    pub fn package_import(&self, scope: ScopeId, package: &str) -> Option<ScopeId> {
        let root = self.root_of(scope);
        self.get(root).imports.get(package).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_boundary_hides_locals() {
        let mut t = ScopeTable::new();
        let root = t.new_scope(None, ScopeKind::Root);
        let outer_fn = t.new_scope(Some(root), ScopeKind::Function);
        let local = t.define_var(outer_fn, "x", TypeId(0));
        let konst = t.define_var(outer_fn, "helper", TypeId(0));
        t.var_mut(konst).constant = true;
        let inner_fn = t.new_scope(Some(outer_fn), ScopeKind::Function);
        let block = t.new_scope(Some(inner_fn), ScopeKind::Simple);

        assert_eq!(t.lookup_var(outer_fn, "x"), Some(local));
        assert_eq!(t.lookup_var(block, "x"), None);
        assert_eq!(t.lookup_var(block, "helper"), Some(konst));
    }

    #[test]
    fn globals_and_builtins_are_visible_everywhere() {
        let mut t = ScopeTable::new();
        let builtin = t.define_var(t.builtins(), "println", TypeId(0));
        let root = t.new_scope(None, ScopeKind::Root);
        let global = t.define_var(root, "count", TypeId(0));
        let f = t.new_scope(Some(root), ScopeKind::Function);
        let block = t.new_scope(Some(f), ScopeKind::Loop);
        assert_eq!(t.lookup_var(block, "count"), Some(global));
        assert_eq!(t.lookup_var(block, "println"), Some(builtin));
    }

    #[test]
    fn shadowing_prefers_innermost() {
        let mut t = ScopeTable::new();
        let root = t.new_scope(None, ScopeKind::Root);
        let f = t.new_scope(Some(root), ScopeKind::Function);
        let a = t.define_var(f, "x", TypeId(0));
        let block = t.new_scope(Some(f), ScopeKind::Simple);
        let b = t.define_var(block, "x", TypeId(0));
        assert_eq!(t.lookup_var(block, "x"), Some(b));
        assert_eq!(t.lookup_var(f, "x"), Some(a));
    }

    #[test]
    fn temp_vars_are_found_most_recent_first() {
        let mut t = ScopeTable::new();
        let root = t.new_scope(None, ScopeKind::Root);
        let f = t.new_scope(Some(root), ScopeKind::Function);
        let first = t.make_temp_var(f, TypeId(0), NodeId(7));
        let inner = t.new_scope(Some(f), ScopeKind::Simple);
        assert_eq!(t.find_temp_var(inner, NodeId(7)), Some(first));
        let second = t.make_temp_var(inner, TypeId(0), NodeId(7));
        assert_eq!(t.find_temp_var(inner, NodeId(7)), Some(second));
        assert_eq!(t.find_temp_var(f, NodeId(7)), Some(first));
        assert!(t.var(first).temp);
        assert_eq!(t.lookup_local_var(f, ""), None);
    }

    #[test]
    fn polymorph_bindings_shadow_types() {
        let mut t = ScopeTable::new();
        let root = t.new_scope(None, ScopeKind::Root);
        assert!(t.bind_type(root, "T", TypeId(1)));
        assert!(!t.bind_type(root, "T", TypeId(2)));
        let poly = t.new_scope(Some(root), ScopeKind::Function);
        assert!(t.define_polymorph(poly, "T", TypeId(3)).is_err());
        t.get_mut(poly).polymorph = Some(Binding {
            poly: PolyId(0),
            defs: Vec::new(),
        });
        t.define_polymorph(poly, "T", TypeId(3)).expect("binds");
        assert!(t.define_polymorph(poly, "T", TypeId(4)).is_err());
        let block = t.new_scope(Some(poly), ScopeKind::Simple);
        assert_eq!(t.lookup_type(block, "T"), Some(TypeId(3)));
        assert_eq!(t.lookup_polymorph(block, "T"), Some(TypeId(3)));
        assert_eq!(t.lookup_type(root, "T"), Some(TypeId(1)));
    }
}
