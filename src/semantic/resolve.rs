use rustc_hash::FxHashSet;
use tracing::trace;

use crate::parser::ast::{TypeDecl, TypeExpr, TypeExprKind};
use crate::span::Span;

use super::errors::{SemResult, SemanticError, SemanticErrorKind};
use super::ids::{ScopeId, TypeId};
use super::scope::ScopeKind;
use super::types::{Shape, StructShape};
use super::Session;

/// Why a type graph could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    Unknown(String),
    NotGeneric(String),
    ArgCount(String, usize),
}

impl ResolveFailure {
    pub fn at(self, span: Span) -> SemanticError {
        let kind = match self {
            ResolveFailure::Unknown(name) => SemanticErrorKind::UnknownType(name),
            ResolveFailure::NotGeneric(name) => SemanticErrorKind::NotGeneric(name),
            ResolveFailure::ArgCount(name, n) => SemanticErrorKind::GenericArgCount(name, n),
        };
        SemanticError::new(kind, span)
    }
}

impl Session {
    // ─── Lowering ──────────────────────────────────────────────

    /// Build the type graph of a type expression as seen from `scope`.
    /// Names stay unresolved until [`Session::resolve`].
    pub fn lower_type(&mut self, scope: ScopeId, expr: &TypeExpr) -> SemResult<TypeId> {
        let ty = match &expr.kind {
            TypeExprKind::Named(name) => match self.scopes.lookup_polymorph(scope, name) {
                Some(bound) => self.types.make_bound(name, scope, bound),
                None => self.types.make_named(name, scope),
            },
            TypeExprKind::Poly(name) => self.lower_placeholder(scope, name),
            TypeExprKind::External { package, name } => {
                self.types.make_external(package, name, scope)
            }
            TypeExprKind::Ref { inner, owned } => {
                let inner = self.lower_type(scope, inner)?;
                self.types.make_ref(inner, *owned)
            }
            TypeExprKind::Array { inner, owned } => {
                let inner = self.lower_type(scope, inner)?;
                self.types.make_array(inner, *owned)
            }
            TypeExprKind::StaticArray { inner, length } => {
                let inner = self.lower_type(scope, inner)?;
                self.types.make_static_array(inner, *length)
            }
            TypeExprKind::Func {
                args,
                ret,
                variadic,
            } => {
                let mut lowered = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    let t = self.lower_type(scope, arg)?;
                    // The variadic tail arrives in the callee as an array.
                    if *variadic && i + 1 == args.len() {
                        lowered.push(self.types.make_array(t, false));
                    } else {
                        lowered.push(t);
                    }
                }
                let ret = match ret {
                    Some(r) => self.lower_type(scope, r)?,
                    None => self.builtins.void,
                };
                self.types.make_func(lowered, ret, *variadic)
            }
            TypeExprKind::Struct { params, fields } => {
                let (inner_scope, placeholders) = if params.is_empty() {
                    (scope, Vec::new())
                } else {
                    let inner = self.scopes.new_scope(Some(scope), ScopeKind::Simple);
                    let mut ps = Vec::with_capacity(params.len());
                    for p in params {
                        let t = self.types.make_polydef(&p.node);
                        if !self.scopes.bind_type(inner, &p.node, t) {
                            return Err(SemanticError::new(
                                SemanticErrorKind::TypeRedeclared(p.node.clone()),
                                p.span,
                            ));
                        }
                        ps.push(t);
                    }
                    (inner, ps)
                };
                let mut members: Vec<(String, TypeId)> = Vec::with_capacity(fields.len());
                for (name, fty) in fields {
                    if members.iter().any(|(n, _)| *n == name.node) {
                        return Err(SemanticError::new(
                            SemanticErrorKind::DuplicateField(name.node.clone()),
                            name.span,
                        ));
                    }
                    let t = self.lower_type(inner_scope, fty)?;
                    members.push((name.node.clone(), t));
                }
                let generic = !placeholders.is_empty();
                self.types.make(Shape::Struct(StructShape {
                    members,
                    generic,
                    params: placeholders,
                    generic_base: None,
                }))
            }
            TypeExprKind::Enum { inner, members } => {
                let inner = match inner {
                    Some(t) => self.lower_type(scope, t)?,
                    None => self.builtins.int,
                };
                let mut next = 0i64;
                let mut values = Vec::with_capacity(members.len());
                for (name, value) in members {
                    let v = value.unwrap_or(next);
                    next = v.wrapping_add(1);
                    values.push((name.node.clone(), v));
                }
                self.types.make(Shape::Enum {
                    inner,
                    members: values,
                })
            }
            TypeExprKind::Params { base, args } => {
                let base = self.lower_type(scope, base)?;
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_type(scope, arg)?);
                }
                self.types.make_params(base, lowered)
            }
        };
        Ok(ty)
    }

    /// `$T`: the bound type inside a polymorph, the signature's own
    /// placeholder, or a fresh one.
    fn lower_placeholder(&mut self, scope: ScopeId, name: &str) -> TypeId {
        if let Some(bound) = self.scopes.lookup_polymorph(scope, name) {
            return self.types.make_bound(name, scope, bound);
        }
        if let Some(existing) = self.scopes.lookup_type(scope, name) {
            if matches!(self.types.shape(existing), Some(Shape::Polydef(_))) {
                return existing;
            }
        }
        self.types.make_polydef(name)
    }

    // ─── Resolution ────────────────────────────────────────────

    /// Bind every named reference reachable from `ty` to its definition and
    /// reify generic struct applications whose arguments are concrete.
    pub fn resolve(&mut self, ty: TypeId) -> Result<TypeId, ResolveFailure> {
        let mut visited = FxHashSet::default();
        self.resolve_inner(ty, &mut visited)?;
        Ok(ty)
    }

    fn resolve_inner(
        &mut self,
        ty: TypeId,
        visited: &mut FxHashSet<TypeId>,
    ) -> Result<(), ResolveFailure> {
        if !visited.insert(ty) {
            return Ok(());
        }
        let node = self.types.get(ty).clone();
        if let Some(target) = node.target {
            return self.resolve_inner(target, visited);
        }
        let Some(shape) = node.shape else {
            let name = node.name.unwrap_or_default();
            let scope = node.scope.unwrap_or(self.scopes.builtins());
            let found = self
                .scopes
                .lookup_type(scope, &name)
                .ok_or_else(|| ResolveFailure::Unknown(name.clone()))?;
            // A declared definition still waiting for its body.
            if found == ty {
                return Ok(());
            }
            self.types.get_mut(ty).target = Some(found);
            return self.resolve_inner(found, visited);
        };
        match shape {
            Shape::Basic { .. } | Shape::Polydef(_) => Ok(()),
            Shape::External { package, name } => {
                let scope = node.scope.unwrap_or(self.scopes.builtins());
                let unknown = || ResolveFailure::Unknown(format!("{package}.{name}"));
                let root = self.scopes.package_import(scope, &package).ok_or_else(unknown)?;
                let found = self
                    .scopes
                    .get(root)
                    .types
                    .get(&name)
                    .copied()
                    .ok_or_else(unknown)?;
                self.types.get_mut(ty).target = Some(found);
                self.resolve_inner(found, visited)
            }
            Shape::Ref { inner, .. }
            | Shape::Array { inner, .. }
            | Shape::StaticArray { inner, .. }
            | Shape::Enum { inner, .. } => self.resolve_inner(inner, visited),
            Shape::Struct(st) => {
                for (_, m) in st.members {
                    self.resolve_inner(m, visited)?;
                }
                Ok(())
            }
            Shape::Func { args, ret, .. } => {
                for a in args {
                    self.resolve_inner(a, visited)?;
                }
                self.resolve_inner(ret, visited)
            }
            Shape::Params { inner, args } => {
                self.resolve_inner(inner, visited)?;
                for a in &args {
                    self.resolve_inner(*a, visited)?;
                }
                if args.iter().any(|a| self.types.is_polydef(*a)) {
                    return Ok(());
                }
                let instance = self.reify_struct(inner, &args)?;
                self.types.alias_to(ty, instance);
                Ok(())
            }
        }
    }

    /// Lower, resolve and register a type expression.
    pub fn resolve_type_expr(&mut self, scope: ScopeId, expr: &TypeExpr) -> SemResult<TypeId> {
        let ty = self.lower_type(scope, expr)?;
        self.resolve(ty).map_err(|f| f.at(expr.span))?;
        self.register(ty);
        Ok(ty)
    }

    // ─── Registry ──────────────────────────────────────────────

    /// Record a concrete type for emission. Anonymous types structurally
    /// equal to an already registered anonymous type adopt its identity.
    pub fn register(&mut self, ty: TypeId) {
        let canon = self.types.follow(ty);
        let Some(shape) = self.types.shape(canon).cloned() else {
            return;
        };
        if self.registry.contains(&canon)
            || self.types.is_polydef(canon)
            || self.types.contains_generic_struct(canon)
        {
            return;
        }
        if self.types.get(canon).name.is_none() {
            let twin = self.registry.iter().copied().find(|r| {
                self.types.get(*r).name.is_none() && self.types.check_type(*r, canon)
            });
            if let Some(existing) = twin {
                trace!(ty = canon.0, existing = existing.0, "aliasing registered twin");
                self.types.alias_to(canon, existing);
                return;
            }
        }
        trace!(ty = canon.0, "registering type");
        self.registry.push(canon);
        let children: Vec<TypeId> = match shape {
            Shape::Ref { inner, .. }
            | Shape::Array { inner, .. }
            | Shape::StaticArray { inner, .. }
            | Shape::Enum { inner, .. } => vec![inner],
            Shape::Struct(st) => st.members.into_iter().map(|(_, m)| m).collect(),
            Shape::Func { mut args, ret, .. } => {
                args.push(ret);
                args
            }
            _ => Vec::new(),
        };
        for child in children {
            self.register(child);
        }
    }

    // ─── Definitions ───────────────────────────────────────────

    /// Bind `name` in `scope` to a definition whose body comes later.
    pub fn declare_type(&mut self, scope: ScopeId, name: &str, span: Span) -> SemResult<TypeId> {
        if self.scopes.get(scope).types.contains_key(name) {
            return Err(SemanticError::new(
                SemanticErrorKind::TypeRedeclared(name.to_string()),
                span,
            ));
        }
        let def = self.types.make_def(name, scope, None);
        self.scopes.bind_type(scope, name, def);
        Ok(def)
    }

    /// Attach the value of a declared definition. Struct and enum bodies
    /// become the definition's own shape; anything else makes it an alias.
    pub fn complete_type(&mut self, scope: ScopeId, def: TypeId, value: &TypeExpr) -> SemResult<()> {
        let lowered = self.lower_type(scope, value)?;
        if matches!(
            value.kind,
            TypeExprKind::Struct { .. } | TypeExprKind::Enum { .. }
        ) {
            let shape = self.types.get(lowered).shape.clone();
            self.types.get_mut(def).shape = shape;
        } else {
            self.types.get_mut(def).target = Some(lowered);
        }
        self.resolve(def).map_err(|f| f.at(value.span))?;
        self.register(def);
        Ok(())
    }

    /// Declare and complete a single local type.
    pub fn define_type(&mut self, scope: ScopeId, decl: &TypeDecl) -> SemResult<TypeId> {
        let def = self.declare_type(scope, &decl.name.node, decl.name.span)?;
        self.complete_type(scope, def, &decl.value)?;
        Ok(def)
    }

    /// Declare every type first so bodies may refer to each other.
    pub fn define_types(&mut self, scope: ScopeId, decls: &[&TypeDecl]) -> SemResult<()> {
        let mut defs = Vec::with_capacity(decls.len());
        for decl in decls {
            defs.push(self.declare_type(scope, &decl.name.node, decl.name.span)?);
        }
        for (decl, def) in decls.iter().zip(defs) {
            self.complete_type(scope, def, &decl.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Item;
    use crate::parser::parse_source;
    use crate::span::FileId;

    fn with_types(src: &str) -> (Session, ScopeId) {
        let mut session = Session::new().expect("builtins");
        let scope = session.new_package_scope();
        let (module, _) = parse_source(src, FileId(0), 0).expect("parses");
        let decls: Vec<&TypeDecl> = module
            .items
            .iter()
            .filter_map(|i| match i {
                Item::TypeDecl(d) => Some(d),
                _ => None,
            })
            .collect();
        session.define_types(scope, &decls).expect("types resolve");
        (session, scope)
    }

    fn ty(session: &mut Session, scope: ScopeId, src: &str) -> SemResult<TypeId> {
        let wrapped = format!("type __subject {src}");
        let (module, _) = parse_source(&wrapped, FileId(0), 1000).expect("parses");
        let Item::TypeDecl(decl) = &module.items[0] else {
            panic!("expected a type declaration");
        };
        session.resolve_type_expr(scope, &decl.value)
    }

    #[test]
    fn builtin_aliases_share_definitions() {
        let (mut s, scope) = with_types("");
        let a = ty(&mut s, scope, "s64").unwrap();
        let b = ty(&mut s, scope, "int").unwrap();
        assert_eq!(s.types.follow(a), s.types.follow(b));
    }

    #[test]
    fn unknown_type_is_reported() {
        let (mut s, scope) = with_types("");
        let err = ty(&mut s, scope, "&Missing").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::UnknownType("Missing".into()));
    }

    #[test]
    fn mutually_recursive_declarations() {
        let (mut s, scope) = with_types(
            "type A struct { b &B }
             type B struct { a &A; n int }",
        );
        let a = ty(&mut s, scope, "A").unwrap();
        assert!(s.types.is_struct(a));
    }

    #[test]
    fn redeclaration_is_fatal() {
        let mut session = Session::new().unwrap();
        let scope = session.new_package_scope();
        session.declare_type(scope, "P", Span::dummy()).unwrap();
        let err = session.declare_type(scope, "P", Span::dummy()).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TypeRedeclared("P".into()));
    }

    #[test]
    fn repeated_struct_parameter_is_rejected() {
        let (mut s, scope) = with_types("");
        let err = ty(&mut s, scope, "struct($T, $T) { a $T }").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TypeRedeclared("T".into()));
        assert!(ty(&mut s, scope, "struct($T, $U) { a $T; b $U }").is_ok());
    }

    #[test]
    fn structural_twins_share_registry_entry() {
        let (mut s, scope) = with_types("");
        let before = s.registry.len();
        let a = ty(&mut s, scope, "struct { x int; y string }").unwrap();
        let b = ty(&mut s, scope, "struct { x int; y string }").unwrap();
        assert_eq!(s.types.emit_id(a), s.types.emit_id(b));
        assert_eq!(s.registry.len(), before + 1);
    }

    #[test]
    fn generic_instances_are_cached() {
        let (mut s, scope) = with_types("type Box struct($T) { item $T; next &Box($T) }");
        let a = ty(&mut s, scope, "Box(int)").unwrap();
        let b = ty(&mut s, scope, "Box(s64)").unwrap();
        assert_eq!(s.types.follow(a), s.types.follow(b));
        let st = s.types.struct_shape(a).unwrap().clone();
        let next = st.member("next").unwrap();
        let inner = s.types.inner(next).unwrap();
        assert_eq!(s.types.follow(inner), s.types.follow(a));
        let c = ty(&mut s, scope, "Box(string)").unwrap();
        assert_ne!(s.types.follow(a), s.types.follow(c));
        assert_eq!(s.types.type_to_string(s.types.follow(c)), "Box(string)");
    }

    #[test]
    fn generic_argument_count_is_checked() {
        let (mut s, scope) = with_types("type Pair struct($A, $B) { a $A; b $B }");
        let err = ty(&mut s, scope, "Pair(int)").unwrap_err();
        assert_eq!(
            err.kind,
            SemanticErrorKind::GenericArgCount("Pair".into(), 2)
        );
        let err = ty(&mut s, scope, "int(int)").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::NotGeneric("int".into()));
    }

    #[test]
    fn enum_values_continue_from_explicit_ones() {
        let (mut s, scope) = with_types("type Color enum { Red, Green = 5, Blue }");
        let c = ty(&mut s, scope, "Color").unwrap();
        let Some(Shape::Enum { members, .. }) = s.types.shape(c) else {
            panic!("expected enum");
        };
        assert_eq!(
            members.clone(),
            vec![("Red".into(), 0), ("Green".into(), 5), ("Blue".into(), 6)]
        );
    }
}
