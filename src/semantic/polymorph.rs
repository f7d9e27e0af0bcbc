use tracing::debug;

use crate::errors::{CompileResult, InternalError};
use crate::span::Span;

use super::errors::{SemanticError, SemanticErrorKind};
use super::ids::{FnId, PolyId, ScopeId, TypeId};
use super::resolve::ResolveFailure;
use super::scope::{Binding, ScopeKind};
use super::typecheck::Checker;
use super::types::{Shape, StructShape, TypeArena};
use super::{Polymorph, Reified, Session};

/// Placeholder bindings gathered while matching a signature.
pub type Bindings = Vec<(String, TypeId)>;

// ─── Unification ───────────────────────────────────────────────

/// Match `got` against the placeholders in `expected`. Parts of
/// `expected` without placeholders are left for the caller to compare.
pub fn unify(types: &TypeArena, expected: TypeId, got: TypeId) -> Option<Bindings> {
    let mut out = Vec::new();
    unify_into(types, expected, got, &mut out).then_some(out)
}

fn unify_into(types: &TypeArena, expected: TypeId, got: TypeId, out: &mut Bindings) -> bool {
    let e = types.follow(expected);
    let g = types.follow(got);
    if !types.is_polydef(e) {
        return true;
    }
    let (Some(es), gs) = (types.shape(e), types.shape(g)) else {
        return false;
    };
    match (es, gs) {
        (Shape::Polydef(name), _) => match out.iter().find(|(n, _)| n == name) {
            Some((_, prev)) => types.check_type(*prev, g),
            None => {
                out.push((name.clone(), g));
                true
            }
        },
        (Shape::Ref { inner: ei, .. }, Some(Shape::Ref { inner: gi, .. }))
        | (Shape::Array { inner: ei, .. }, Some(Shape::Array { inner: gi, .. }))
        | (Shape::Array { inner: ei, .. }, Some(Shape::StaticArray { inner: gi, .. })) => {
            unify_into(types, *ei, *gi, out)
        }
        (
            Shape::StaticArray {
                inner: ei,
                length: el,
            },
            Some(Shape::StaticArray {
                inner: gi,
                length: gl,
            }),
        ) => el == gl && unify_into(types, *ei, *gi, out),
        (
            Shape::Func {
                args: ea,
                ret: er,
                variadic: ev,
            },
            Some(Shape::Func {
                args: ga,
                ret: gr,
                variadic: gv,
            }),
        ) => {
            ev == gv
                && ea.len() == ga.len()
                && ea
                    .iter()
                    .zip(ga)
                    .all(|(x, y)| unify_into(types, *x, *y, out))
                && unify_into(types, *er, *gr, out)
        }
        (Shape::Params { inner, args }, Some(Shape::Struct(st))) => {
            let same_template = st
                .generic_base
                .is_some_and(|b| types.follow(b) == types.follow(*inner));
            same_template
                && args.len() == st.params.len()
                && args
                    .iter()
                    .zip(&st.params)
                    .all(|(x, y)| unify_into(types, *x, *y, out))
        }
        (Shape::Struct(a), Some(Shape::Struct(b))) => {
            !a.generic
                && a.members.len() == b.members.len()
                && a
                    .members
                    .iter()
                    .zip(&b.members)
                    .all(|((na, ma), (nb, mb))| na == nb && unify_into(types, *ma, *mb, out))
        }
        _ => false,
    }
}

/// Whether every argument fits its (possibly polymorphic) parameter with
/// consistent placeholder choices. On failure yields the index of the
/// first argument that does not fit.
pub fn polymorph_applies(
    types: &TypeArena,
    expected: &[TypeId],
    got: &[TypeId],
) -> Result<Bindings, usize> {
    let mut out = Vec::new();
    for (i, (e, g)) in expected.iter().zip(got).enumerate() {
        if !unify_into(types, *e, *g, &mut out) {
            return Err(i);
        }
    }
    Ok(out)
}

impl Session {
    /// Bind the placeholders of `expected` in the polymorph carried by
    /// `scope`. Callers must have checked applicability first.
    pub fn match_polymorph(
        &mut self,
        scope: ScopeId,
        expected: TypeId,
        got: TypeId,
    ) -> Result<(), InternalError> {
        let bindings = unify(&self.types, expected, got).ok_or_else(|| {
            InternalError::new(format!(
                "polymorph match failed: {} against {}",
                self.types.type_to_string(expected),
                self.types.type_to_string(got)
            ))
        })?;
        for (name, ty) in bindings {
            if let Some(existing) = self.scopes.lookup_local_type(scope, &name) {
                if self.types.check_type(existing, ty) {
                    continue;
                }
            }
            self.scopes.define_polymorph(scope, &name, ty)?;
        }
        Ok(())
    }

    // ─── Struct reification ────────────────────────────────────

    /// Concrete instance of a generic struct template, created once per
    /// structurally distinct argument list.
    pub fn reify_struct(
        &mut self,
        template: TypeId,
        args: &[TypeId],
    ) -> Result<TypeId, ResolveFailure> {
        let canon = self.types.follow(template);
        let name = self.types.get(canon).name.clone().unwrap_or_default();
        let st = match self.types.shape(canon) {
            Some(Shape::Struct(st)) if st.generic => st.clone(),
            _ => return Err(ResolveFailure::NotGeneric(name)),
        };
        if st.params.len() != args.len() {
            return Err(ResolveFailure::ArgCount(name, st.params.len()));
        }
        let cached = self.reified.iter().find(|r| {
            r.template == canon
                && r
                    .args
                    .iter()
                    .zip(args)
                    .all(|(a, b)| self.types.check_type(*a, *b))
        });
        if let Some(hit) = cached {
            return Ok(hit.result);
        }

        let shown: Vec<String> = args
            .iter()
            .map(|a| self.types.type_to_string(self.types.follow(*a)))
            .collect();
        let instance_name = format!("{name}({})", shown.join(", "));
        let scope = self.types.get(canon).scope.unwrap_or(self.scopes.builtins());
        let instance = self.types.make_def(&instance_name, scope, None);
        debug!(instance = %instance_name, "reifying generic struct");
        // Cached before members are built so self-references terminate.
        self.reified.push(Reified {
            template: canon,
            args: args.to_vec(),
            result: instance,
        });

        let map: Vec<(TypeId, TypeId)> = st
            .params
            .iter()
            .map(|p| self.types.follow(*p))
            .zip(args.iter().copied())
            .collect();
        let members: Vec<(String, TypeId)> = st
            .members
            .iter()
            .map(|(n, m)| (n.clone(), self.substitute(*m, &map)))
            .collect();
        self.types.set_shape(
            instance,
            Shape::Struct(StructShape {
                members: members.clone(),
                generic: false,
                params: args.to_vec(),
                generic_base: Some(canon),
            }),
        );
        for (_, m) in &members {
            self.resolve(*m)?;
        }
        self.register(instance);
        Ok(instance)
    }

    /// Copy of `ty` with placeholders replaced per `map`. Graphs without
    /// placeholders are shared, not copied.
    pub fn substitute(&mut self, ty: TypeId, map: &[(TypeId, TypeId)]) -> TypeId {
        let canon = self.types.follow(ty);
        if let Some((_, to)) = map.iter().find(|(from, _)| *from == canon) {
            return *to;
        }
        if !self.types.is_polydef(canon) {
            return ty;
        }
        let Some(shape) = self.types.shape(canon).cloned() else {
            return ty;
        };
        match shape {
            Shape::Ref { inner, owned } => {
                let inner = self.substitute(inner, map);
                self.types.make_ref(inner, owned)
            }
            Shape::Array { inner, owned } => {
                let inner = self.substitute(inner, map);
                self.types.make_array(inner, owned)
            }
            Shape::StaticArray { inner, length } => {
                let inner = self.substitute(inner, map);
                self.types.make_static_array(inner, length)
            }
            Shape::Func {
                args,
                ret,
                variadic,
            } => {
                let args = args.iter().map(|a| self.substitute(*a, map)).collect();
                let ret = self.substitute(ret, map);
                self.types.make_func(args, ret, variadic)
            }
            Shape::Struct(st) => {
                let members = st
                    .members
                    .iter()
                    .map(|(n, m)| (n.clone(), self.substitute(*m, map)))
                    .collect();
                self.types.make_struct(members)
            }
            Shape::Params { inner, args } => {
                let args = args.iter().map(|a| self.substitute(*a, map)).collect();
                self.types.make_params(inner, args)
            }
            _ => ty,
        }
    }

    /// Placeholders reachable from a signature or declaring type, by name.
    pub fn collect_placeholders(&self, ty: TypeId, out: &mut Vec<(String, TypeId)>) {
        let canon = self.types.follow(ty);
        let Some(shape) = self.types.shape(canon) else {
            return;
        };
        match shape {
            Shape::Polydef(name) => {
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((name.clone(), canon));
                }
            }
            Shape::Ref { inner, .. }
            | Shape::Array { inner, .. }
            | Shape::StaticArray { inner, .. } => self.collect_placeholders(*inner, out),
            Shape::Struct(st) if st.generic => {
                for p in &st.params {
                    self.collect_placeholders(*p, out);
                }
            }
            Shape::Func { args, ret, .. } => {
                for a in args {
                    self.collect_placeholders(*a, out);
                }
                self.collect_placeholders(*ret, out);
            }
            Shape::Params { args, .. } => {
                for a in args {
                    self.collect_placeholders(*a, out);
                }
            }
            _ => {}
        }
    }

    /// Pattern a receiver must unify with to use methods of `decl`:
    /// a generic template is matched through its own placeholders.
    pub fn method_pattern(&mut self, decl: TypeId) -> TypeId {
        let canon = self.types.follow(decl);
        match self.types.shape(canon) {
            Some(Shape::Struct(st)) if st.generic => {
                let params = st.params.clone();
                self.types.make_params(canon, params)
            }
            _ => decl,
        }
    }
}

// ─── Instantiation ─────────────────────────────────────────────

impl Checker {
    fn find_polymorph(&self, func: FnId, bindings: &Bindings) -> Option<PolyId> {
        let session = &self.prog.session;
        self.prog.function(func).polymorphs.iter().copied().find(|pid| {
            let scope = self.prog.polymorph(*pid).scope;
            let Some(binding) = &session.scopes.get(scope).polymorph else {
                return false;
            };
            binding.defs.len() == bindings.len()
                && bindings.iter().all(|(name, ty)| {
                    binding
                        .get(name)
                        .is_some_and(|b| session.types.check_type(b, *ty))
                })
        })
    }

    /// Specialize a generic function (or method, given the concrete
    /// receiver) for the argument types in `pairs` of
    /// (parameter type, argument type).
    pub fn instantiate(
        &mut self,
        func: FnId,
        pairs: &[(TypeId, TypeId)],
        receiver: Option<TypeId>,
        span: Span,
    ) -> CompileResult<PolyId> {
        let (expected, got): (Vec<TypeId>, Vec<TypeId>) = pairs.iter().copied().unzip();
        let bindings = polymorph_applies(&self.prog.session.types, &expected, &got).map_err(|i| {
            let types = &self.prog.session.types;
            SemanticError::new(
                SemanticErrorKind::PolymorphMismatch {
                    expected: types.type_to_string(expected[i]),
                    got: types.type_to_string(got[i]),
                },
                span,
            )
        })?;
        if let Some(hit) = self.find_polymorph(func, &bindings) {
            debug!(function = %self.prog.function(func).def.name.node, poly = hit.0, "reusing polymorph");
            return Ok(hit);
        }

        let pid = PolyId(self.prog.polymorphs.len() as u32);
        let def_scope = self.prog.function(func).def_scope;
        let def = self.prog.function(func).def.clone();
        let session = &mut self.prog.session;
        let scope = session.scopes.new_scope(Some(def_scope), ScopeKind::Function);
        session.scopes.get_mut(scope).polymorph = Some(Binding {
            poly: pid,
            defs: Vec::new(),
        });
        for (e, g) in pairs {
            session.match_polymorph(scope, *e, *g)?;
        }
        debug!(function = %def.name.node, poly = pid.0, "instantiating polymorph");

        let mut params = Vec::new();
        let mut args = Vec::new();
        if let Some(recv) = receiver {
            let self_ty = session.types.make_ref(recv, false);
            session.register(self_ty);
            let v = session.scopes.define_var(scope, "self", self_ty);
            params.push(v);
            args.push(self_ty);
        }
        for p in &def.params {
            let ty = self.param_type(scope, p)?;
            if self.prog.session.types.is_polydef(ty) {
                return Err(SemanticError::new(
                    SemanticErrorKind::CannotInfer(p.name.node.clone()),
                    p.span,
                )
                .into());
            }
            params.push(self.define_param(scope, p, ty)?);
            args.push(ty);
        }
        let ret = self.return_type(scope, &def)?;
        if self.prog.session.types.is_polydef(ret) {
            return Err(SemanticError::new(
                SemanticErrorKind::CannotInfer(def.name.node.clone()),
                def.span,
            )
            .into());
        }

        self.prog.polymorphs.push(Polymorph {
            id: pid,
            func,
            scope,
            args,
            ret,
            params,
            body: def.body.clone(),
        });
        self.prog.functions[func.0 as usize].polymorphs.push(pid);

        let mut body = def.body;
        self.check_fn_body(&mut body, scope, ret)?;
        self.prog.polymorphs[pid.0 as usize].body = body;
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::types::BaseKind;

    fn basic(a: &mut TypeArena, name: &str, base: BaseKind) -> TypeId {
        a.make_def(name, ScopeId(0), Some(Shape::Basic { base, size: 8 }))
    }

    #[test]
    fn placeholder_binds_consistently() {
        let mut a = TypeArena::new();
        let int = basic(&mut a, "int", BaseKind::Int);
        let string = basic(&mut a, "string", BaseKind::String);
        let t1 = a.make_polydef("T");
        let t2 = a.make_polydef("T");
        let ok = polymorph_applies(&a, &[t1, t2], &[int, int]).unwrap();
        assert_eq!(ok, vec![("T".to_string(), int)]);
        assert_eq!(polymorph_applies(&a, &[t1, t2], &[int, string]), Err(1));
    }

    #[test]
    fn structure_must_match() {
        let mut a = TypeArena::new();
        let int = basic(&mut a, "int", BaseKind::Int);
        let t = a.make_polydef("T");
        let ref_t = a.make_ref(t, false);
        let ref_int = a.make_ref(int, false);
        assert_eq!(unify(&a, ref_t, ref_int), Some(vec![("T".into(), int)]));
        assert_eq!(unify(&a, ref_t, int), None);
        let arr_t = a.make_array(t, false);
        let fixed = a.make_static_array(int, 4);
        assert_eq!(unify(&a, arr_t, fixed), Some(vec![("T".into(), int)]));
    }

    #[test]
    fn concrete_parameters_bind_nothing() {
        let mut a = TypeArena::new();
        let int = basic(&mut a, "int", BaseKind::Int);
        let string = basic(&mut a, "string", BaseKind::String);
        assert_eq!(unify(&a, int, string), Some(Vec::new()));
    }

    #[test]
    fn function_shapes_unify_pairwise() {
        let mut a = TypeArena::new();
        let int = basic(&mut a, "int", BaseKind::Int);
        let string = basic(&mut a, "string", BaseKind::String);
        let t = a.make_polydef("T");
        let u = a.make_polydef("U");
        let pattern = a.make_func(vec![t], u, false);
        let concrete = a.make_func(vec![int], string, false);
        let got = unify(&a, pattern, concrete).unwrap();
        assert_eq!(got, vec![("T".into(), int), ("U".into(), string)]);
        let variadic = a.make_func(vec![int], string, true);
        assert_eq!(unify(&a, pattern, variadic), None);
    }

    #[test]
    fn substitute_shares_concrete_graphs() {
        let mut s = Session::new().unwrap();
        let int = s.builtins.int;
        let t = s.types.make_polydef("T");
        let concrete = s.types.make_ref(int, false);
        assert_eq!(s.substitute(concrete, &[(t, int)]), concrete);
        let poly = s.types.make_array(t, false);
        let out = s.substitute(poly, &[(t, int)]);
        assert_ne!(out, poly);
        let expected = s.types.make_array(int, false);
        assert!(s.types.check_type(out, expected));
    }

    #[test]
    fn match_polymorph_binds_in_scope() {
        let mut s = Session::new().unwrap();
        let int = s.builtins.int;
        let root = s.new_package_scope();
        let scope = s.scopes.new_scope(Some(root), ScopeKind::Function);
        s.scopes.get_mut(scope).polymorph = Some(Binding {
            poly: PolyId(0),
            defs: Vec::new(),
        });
        let t = s.types.make_polydef("T");
        s.match_polymorph(scope, t, int).unwrap();
        s.match_polymorph(scope, t, int).unwrap();
        assert_eq!(s.scopes.lookup_polymorph(scope, "T"), Some(int));
        let ref_t = s.types.make_ref(t, false);
        assert!(s.match_polymorph(scope, ref_t, int).is_err());
    }
}
