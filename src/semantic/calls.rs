use tracing::trace;

use crate::errors::{CompileResult, InternalError};
use crate::parser::ast::*;
use crate::span::Span;

use super::errors::SemanticErrorKind;
use super::ids::{FnId, NodeId, TypeId};
use super::methods::MethodMatch;
use super::typecheck::{fail, Checker};
use super::types::Shape;

fn callee_name(callee: &Expr) -> String {
    match &callee.kind {
        ExprKind::Ident { name, .. } => name.clone(),
        ExprKind::Dot { field, .. } => field.node.clone(),
        _ => "<expression>".into(),
    }
}

impl Checker {
    pub(super) fn check_call(&mut self, expr: &mut Expr) -> CompileResult<TypeId> {
        let span = expr.span;
        let ExprKind::Call {
            callee,
            args,
            spread,
            target,
        } = &mut expr.kind
        else {
            return Err(InternalError::new("check_call on a non-call expression").into());
        };
        let spread = *spread;
        // Variadic storage is keyed by the callee; the call's own id keys
        // the temporary holding its result.
        let id = callee.id;

        if matches!(callee.kind, ExprKind::Dot { .. }) {
            if let Some(ty) = self.check_qualified(callee)? {
                self.prog.session.register(ty);
                callee.ty = Some(ty);
            } else if let ExprKind::Dot {
                object,
                field,
                access,
            } = &mut callee.kind
            {
                let obj_ty = self.check_expr(object, None)?;
                if !self.has_member(obj_ty, &field.node) {
                    return self.check_method_call(callee, args, spread, target, id, span);
                }
                self.borrow(object);
                let fty = self.resolve_member(object, field, access)?;
                self.prog.session.register(fty);
                callee.ty = Some(fty);
            }
        }

        if let ExprKind::Ident { name, var } = &mut callee.kind {
            let found = match var {
                Some(v) => Some(*v),
                None => self.prog.session.scopes.lookup_var(self.scope, name),
            };
            let Some(v) = found else {
                return fail(SemanticErrorKind::UnknownIdentifier(name.clone()), callee.span);
            };
            *var = Some(v);
            let info = self.prog.session.scopes.var(v);
            if let Some(fid) = info.func {
                if self.prog.function(fid).generic {
                    callee.ty = Some(info.ty);
                    return self.check_polymorph_call(fid, args, spread, target, id, span);
                }
            }
        }

        let fty = match callee.ty {
            Some(t) => t,
            None => self.check_expr(callee, None)?,
        };
        let Some(Shape::Func {
            args: params,
            ret,
            variadic,
        }) = self.types().shape(fty).cloned()
        else {
            return fail(SemanticErrorKind::NotCallable(self.show(fty)), callee.span);
        };
        let (direct, ext) = match &callee.kind {
            ExprKind::Ident { var: Some(v), .. } => {
                let var = self.prog.session.scopes.var(*v);
                (var.constant, var.ext)
            }
            _ => (false, false),
        };
        *target = if direct {
            CallTarget::Direct
        } else {
            CallTarget::Indirect
        };
        let name = callee_name(callee);
        self.check_args(&name, &params, variadic, args, spread, ext, id, span)?;
        Ok(ret)
    }

    fn has_member(&self, ty: TypeId, name: &str) -> bool {
        let types = self.types();
        let target = match types.shape(ty) {
            Some(Shape::Ref { inner, .. }) => *inner,
            _ => ty,
        };
        match types.shape(target) {
            Some(Shape::Struct(st)) => st.member(name).is_some(),
            _ => name == "length" || name == "name",
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_polymorph_call(
        &mut self,
        func: FnId,
        args: &mut [Expr],
        spread: bool,
        target: &mut CallTarget,
        id: NodeId,
        span: Span,
    ) -> CompileResult<TypeId> {
        let f = self.prog.function(func);
        let name = f.name.clone();
        let (params, _, variadic) = self.types().func_shape(f.ty)?;
        let params = params.to_vec();
        let expected = self.expected_args(&name, &params, variadic, args.len(), spread, span)?;
        for (arg, want) in args.iter_mut().zip(&expected) {
            let hint = (!self.types().is_polydef(*want)).then_some(*want);
            self.check_expr(arg, hint)?;
        }
        let pairs: Vec<(TypeId, TypeId)> = expected
            .iter()
            .zip(args.iter())
            .map(|(want, arg)| (*want, arg.ty.unwrap_or(*want)))
            .collect();
        let poly = self.instantiate(func, &pairs, None, span)?;
        let p = self.prog.polymorph(poly);
        let (concrete, ret) = (p.args.clone(), p.ret);
        let concrete_expected =
            self.expected_args(&name, &concrete, variadic, args.len(), spread, span)?;
        self.finish_args(&concrete, variadic, args, spread, false, &concrete_expected, id)?;
        *target = CallTarget::Polymorph { func, poly };
        Ok(ret)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_method_call(
        &mut self,
        callee: &mut Expr,
        args: &mut [Expr],
        spread: bool,
        target: &mut CallTarget,
        id: NodeId,
        span: Span,
    ) -> CompileResult<TypeId> {
        let ExprKind::Dot { object, field, .. } = &mut callee.kind else {
            return Err(InternalError::new("method call without a receiver").into());
        };
        let void = self.prog.session.builtins.void;
        let recv_ty = object.ty.unwrap_or(void);
        let types = self.types();
        let base = match types.shape(recv_ty) {
            Some(Shape::Ref { inner, .. }) => *inner,
            _ => recv_ty,
        };
        let found = self
            .prog
            .session
            .methods
            .find_method(types, base, &field.node);
        trace!(method = %field.node, outcome = ?found, "method lookup");
        let (func, poly) = match found {
            MethodMatch::Exact { func, poly } => (func, poly),
            MethodMatch::Polymorphic(func) | MethodMatch::Possible(func) => {
                let decl = self.prog.function(func).method_of.ok_or_else(|| {
                    InternalError::new(format!("method '{}' has no declaring type", field.node))
                })?;
                let pattern = self.prog.session.method_pattern(decl);
                let pid = self.instantiate(func, &[(pattern, base)], Some(base), span)?;
                let session = &mut self.prog.session;
                session
                    .methods
                    .define_method(&session.types, base, &field.node, func, Some(pid));
                (func, Some(pid))
            }
            MethodMatch::None => {
                return fail(
                    SemanticErrorKind::NoMethod {
                        ty: self.show(base),
                        name: field.node.clone(),
                    },
                    field.span,
                )
            }
        };

        let f = self.prog.function(func);
        let fty = f.ty;
        let (declared, declared_ret, variadic) = self.types().func_shape(fty)?;
        let (params, ret) = match poly {
            Some(pid) => {
                let p = self.prog.polymorph(pid);
                (p.args.clone(), p.ret)
            }
            None => (declared.to_vec(), declared_ret),
        };

        let auto_ref = !self.types().is_ref(recv_ty);
        if auto_ref && !object.is_lvalue() {
            self.make_temp(object);
        } else {
            self.borrow(object);
        }
        let name = field.node.clone();
        let rest = params.get(1..).unwrap_or(&[]);
        self.check_args(&name, rest, variadic, args, spread, false, id, span)?;
        callee.ty = Some(fty);
        *target = CallTarget::Method {
            func,
            poly,
            auto_ref,
        };
        Ok(ret)
    }

    // ─── Arguments ─────────────────────────────────────────────

    /// Parameter type each argument is checked against. Arguments past the
    /// fixed parameters take the variadic element type; a spread argument
    /// stands for the whole variadic array.
    fn expected_args(
        &self,
        name: &str,
        params: &[TypeId],
        variadic: bool,
        nargs: usize,
        spread: bool,
        span: Span,
    ) -> CompileResult<Vec<TypeId>> {
        let count_error = |expected| {
            fail(
                SemanticErrorKind::ArgCount {
                    name: name.to_string(),
                    expected,
                    got: nargs,
                },
                span,
            )
        };
        if spread {
            if !variadic {
                return fail(SemanticErrorKind::SpreadNotVariadic(name.to_string()), span);
            }
            if nargs != params.len() {
                return count_error(params.len());
            }
            return Ok(params.to_vec());
        }
        if !variadic {
            if nargs != params.len() {
                return count_error(params.len());
            }
            return Ok(params.to_vec());
        }
        let fixed = params.len().saturating_sub(1);
        if nargs < fixed {
            return count_error(fixed);
        }
        let Some(elem) = params.last().and_then(|t| self.types().inner(*t)) else {
            return Err(InternalError::new(format!("variadic '{name}' without an array tail")).into());
        };
        let mut out = params[..fixed].to_vec();
        out.resize(nargs, elem);
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_args(
        &mut self,
        name: &str,
        params: &[TypeId],
        variadic: bool,
        args: &mut [Expr],
        spread: bool,
        ext: bool,
        id: NodeId,
        span: Span,
    ) -> CompileResult<()> {
        let expected = self.expected_args(name, params, variadic, args.len(), spread, span)?;
        for (arg, want) in args.iter_mut().zip(&expected) {
            self.check_expr(arg, Some(*want))?;
        }
        self.finish_args(params, variadic, args, spread, ext, &expected, id)
    }

    /// Compatibility and ownership of already-typed arguments. User
    /// functions own their arguments; foreign ones only borrow them.
    #[allow(clippy::too_many_arguments)]
    fn finish_args(
        &mut self,
        params: &[TypeId],
        variadic: bool,
        args: &mut [Expr],
        spread: bool,
        ext: bool,
        expected: &[TypeId],
        id: NodeId,
    ) -> CompileResult<()> {
        let last = args.len().saturating_sub(1);
        for (i, (arg, want)) in args.iter_mut().zip(expected).enumerate() {
            if spread && i == last {
                let types = self.types();
                let got = arg.ty.unwrap_or(*want);
                let fits = match (types.shape(got), types.inner(*want)) {
                    (
                        Some(Shape::Array { inner, .. } | Shape::StaticArray { inner, .. }),
                        Some(elem),
                    ) => types.check_type(*inner, elem),
                    _ => false,
                };
                if !fits {
                    return fail(SemanticErrorKind::BadSpread(self.show(got)), arg.span);
                }
                continue;
            }
            self.expect_assignable(*want, arg)?;
            if ext {
                self.borrow(arg);
            } else {
                self.pass_value(arg, *want)?;
            }
        }
        if variadic && !spread {
            let fixed = params.len().saturating_sub(1);
            let extras = args.len().saturating_sub(fixed);
            if extras > 0 {
                let Some(elem) = params.last().and_then(|t| self.types().inner(*t)) else {
                    return Err(InternalError::new("variadic parameter without an element type").into());
                };
                let session = &mut self.prog.session;
                let storage = session.types.make_static_array(elem, extras as u64);
                session.register(storage);
                session.scopes.make_temp_var(self.scope, storage, id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::CallTarget;
    use crate::semantic::errors::SemanticErrorKind;
    use crate::semantic::typecheck::tests::{check, check_err};

    #[test]
    fn argument_count_is_checked() {
        assert_eq!(
            check_err("fn add(a int, b int) int { return a + b; } fn main() { add(1); }"),
            SemanticErrorKind::ArgCount {
                name: "add".into(),
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn polymorphs_are_cached_per_binding() {
        let prog = check(
            "fn identity(x $T) $T { return x; }
             fn main() {
                a := identity(1);
                b := identity(2);
                c := identity(\"s\");
             }",
        )
        .unwrap();
        assert_eq!(prog.polymorphs.len(), 2);
        assert_eq!(prog.functions[0].polymorphs.len(), 2);
    }

    #[test]
    fn inconsistent_placeholders_are_rejected() {
        let kind = check_err(
            "fn same(a $T, b $T) bool { return true; }
             fn main() { same(1, \"x\"); }",
        );
        assert_eq!(
            kind,
            SemanticErrorKind::PolymorphMismatch {
                expected: "$T".into(),
                got: "string".into()
            }
        );
    }

    #[test]
    fn recursive_polymorph_terminates() {
        let prog = check(
            "fn count(x $T, n int) int {
                if n == 0 { return 0; }
                return 1 + count(x, n - 1);
             }
             fn main() int { return count(\"a\", 3); }",
        )
        .unwrap();
        assert_eq!(prog.polymorphs.len(), 1);
    }

    #[test]
    fn variadic_calls_plan_storage() {
        let prog = check(
            "fn sum(xs ...int) int {
                t := 0;
                for x in xs { t = t + x; }
                return t;
             }
             fn main() int {
                nums [2]int = [4, 5];
                return sum(1, 2, 3) + sum() + sum(nums...);
             }",
        )
        .unwrap();
        let main = prog.function(prog.main.unwrap());
        assert_eq!(prog.session.scopes.get(main.scope).temp_vars.len(), 1);
        assert_eq!(
            check_err("fn one(x int) {} fn main() { xs := [1]; one(xs...); }"),
            SemanticErrorKind::SpreadNotVariadic("one".into())
        );
    }

    #[test]
    fn methods_on_concrete_types() {
        let prog = check(
            "type P struct { x int }
             impl P { fn getx() int { return self.x; } }
             fn make() P { return P{x: 1}; }
             fn main() int { p := P{x: 3}; return p.getx() + make().getx(); }",
        )
        .unwrap();
        let main = prog.function(prog.main.unwrap());
        // The rvalue receiver needs storage to take its address.
        assert_eq!(prog.session.scopes.get(main.scope).temp_vars.len(), 1);
        assert_eq!(
            check_err(
                "type P struct { x int }
                 fn main() { p := P{x: 3}; p.nope(); }"
            ),
            SemanticErrorKind::NoMethod {
                ty: "P".into(),
                name: "nope".into()
            }
        );
    }

    #[test]
    fn template_methods_specialize_per_receiver() {
        let prog = check(
            "type Box struct($T) { item $T }
             impl Box { fn get() T { return self.item; } }
             fn main() int {
                b Box(int);
                b.item = 5;
                s Box(string);
                return b.get() + b.get();
             }",
        )
        .unwrap();
        assert_eq!(prog.polymorphs.len(), 1);
        let concrete = prog
            .session
            .methods
            .entries()
            .iter()
            .filter(|e| e.poly.is_some())
            .count();
        assert_eq!(concrete, 1);
    }

    #[test]
    fn polymorphic_declaring_types_unify() {
        let prog = check(
            "type Box struct($T) { item $T }
             impl Box($T) { fn put(v $T) { self.item = v; } }
             fn main() {
                b Box(string);
                b.put(\"x\");
                c Box(int);
                c.put(1);
             }",
        )
        .unwrap();
        assert_eq!(prog.polymorphs.len(), 2);
    }

    #[test]
    fn builtin_calls_are_direct() {
        let prog = check("fn main() { println(itoa(42)); }").unwrap();
        let main = prog.function(prog.main.unwrap());
        let crate::parser::ast::StmtKind::Expr(call) = &main.def.body.stmts[0].kind else {
            panic!("expected an expression statement");
        };
        let crate::parser::ast::ExprKind::Call { target, args, .. } = &call.kind else {
            panic!("expected a call");
        };
        assert_eq!(*target, CallTarget::Direct);
        // The fresh string is only borrowed by the builtin.
        assert!(args[0].needs_temp);
    }
}
