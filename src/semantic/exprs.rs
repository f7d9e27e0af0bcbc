use crate::errors::CompileResult;
use crate::parser::ast::*;
use crate::span::{Span, Spanned};

use super::errors::SemanticErrorKind;
use super::ids::TypeId;
use super::typecheck::{fail, Checker};
use super::types::Shape;

impl Checker {
    /// Type an expression, record the type on the node and register it
    /// for emission. `expected` only steers literal typing.
    pub(super) fn check_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<TypeId>,
    ) -> CompileResult<TypeId> {
        let ty = self.expr_type(expr, expected)?;
        self.prog.session.register(ty);
        expr.ty = Some(ty);
        Ok(ty)
    }

    fn expr_type(&mut self, expr: &mut Expr, expected: Option<TypeId>) -> CompileResult<TypeId> {
        if let Some(ty) = self.check_qualified(expr)? {
            return Ok(ty);
        }
        let (id, span) = (expr.id, expr.span);
        let b = self.prog.session.builtins;
        match &mut expr.kind {
            ExprKind::Int(_) => Ok(expected
                .filter(|t| self.types().is_numeric(*t))
                .unwrap_or(b.int)),
            ExprKind::Float(_) => Ok(expected
                .filter(|t| self.types().is_float(*t))
                .unwrap_or(b.float)),
            ExprKind::Bool(_) => Ok(b.bool_),
            ExprKind::Str(_) => Ok(b.string),
            ExprKind::Ident { name, var } => {
                let Some(v) = self.prog.session.scopes.lookup_var(self.scope, name) else {
                    return fail(SemanticErrorKind::UnknownIdentifier(name.clone()), span);
                };
                *var = Some(v);
                let found = self.prog.session.scopes.var(v);
                if let Some(fid) = found.func {
                    if self.prog.function(fid).generic {
                        return fail(SemanticErrorKind::CannotInfer(name.clone()), span);
                    }
                }
                Ok(found.ty)
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expected, span),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, expected, span),
            ExprKind::Dot {
                object,
                field,
                access,
            } => {
                self.check_expr(object, None)?;
                self.borrow(object);
                self.resolve_member(object, field, access)
            }
            ExprKind::Call { .. } => self.check_call(expr),
            ExprKind::Index { object, index } => {
                let obj_ty = self.check_expr(object, None)?;
                self.borrow(object);
                self.expect_integer(index)?;
                let types = self.types();
                if types.is_string(obj_ty) {
                    return Ok(b.u8);
                }
                match types.shape(obj_ty) {
                    Some(Shape::Array { inner, .. } | Shape::StaticArray { inner, .. }) => {
                        Ok(*inner)
                    }
                    _ => fail(SemanticErrorKind::NotIndexable(self.show(obj_ty)), object.span),
                }
            }
            ExprKind::Slice { object, start, end } => {
                let obj_ty = self.check_expr(object, None)?;
                self.borrow(object);
                for bound in [start, end].into_iter().flatten() {
                    self.expect_integer(bound)?;
                }
                let types = self.types();
                if types.is_string(obj_ty) {
                    return Ok(b.string);
                }
                match types.shape(obj_ty) {
                    Some(Shape::Array { inner, .. } | Shape::StaticArray { inner, .. }) => {
                        let inner = *inner;
                        Ok(self.prog.session.types.make_array(inner, false))
                    }
                    _ => fail(SemanticErrorKind::NotSliceable(self.show(obj_ty)), object.span),
                }
            }
            ExprKind::Cast { expr: inner, to } => {
                let to_ty = self.prog.session.resolve_type_expr(self.scope, to)?;
                let from = self.check_expr(inner, None)?;
                if !self.castable(from, to_ty) {
                    return fail(
                        SemanticErrorKind::InvalidCast {
                            from: self.show(from),
                            to: self.show(to_ty),
                        },
                        span,
                    );
                }
                Ok(to_ty)
            }
            ExprKind::StructLit { ty, fields } => self.check_struct_lit(ty, fields, span),
            ExprKind::ArrayLit { elems } => {
                let ty = self.check_array_lit(elems, expected, span)?;
                if let Some(Shape::Array { inner, .. }) = self.types().shape(ty) {
                    // Backing storage the view points into.
                    let inner = *inner;
                    let n = elems.len() as u64;
                    let session = &mut self.prog.session;
                    let storage = session.types.make_static_array(inner, n);
                    session.register(storage);
                    session.scopes.make_temp_var(self.scope, storage, id);
                }
                Ok(ty)
            }
            ExprKind::New { ty, target } => {
                let session = &mut self.prog.session;
                let t = session.resolve_type_expr(self.scope, ty)?;
                *target = Some(t);
                Ok(session.types.make_ref(t, true))
            }
            ExprKind::TypeInfo { ty, target } => {
                let session = &mut self.prog.session;
                let t = session.resolve_type_expr(self.scope, ty)?;
                *target = Some(t);
                let info = session.builtins.type_;
                Ok(session.types.make_ref(info, false))
            }
            ExprKind::FnLit { def, func } => {
                let fid = self.declare_function(self.scope, (**def).clone(), None)?;
                let f = self.prog.function(fid);
                if f.generic {
                    return fail(SemanticErrorKind::CannotInfer("fn".into()), span);
                }
                let ty = f.ty;
                self.check_function(fid)?;
                *func = Some(fid);
                Ok(ty)
            }
        }
    }

    /// `pkg.name` and `Enum.Member`, recognized when the left side names no
    /// variable.
    pub(super) fn check_qualified(&mut self, expr: &mut Expr) -> CompileResult<Option<TypeId>> {
        let (qualifier, member, member_span) = match &expr.kind {
            ExprKind::Dot { object, field, .. } => match &object.kind {
                ExprKind::Ident { name, .. } => (name.clone(), field.node.clone(), field.span),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let scopes = &self.prog.session.scopes;
        if scopes.lookup_var(self.scope, &qualifier).is_some() {
            return Ok(None);
        }
        if let Some(pkg) = scopes.package_import(self.scope, &qualifier) {
            let Some(v) = scopes.lookup_local_var(pkg, &member) else {
                return fail(
                    SemanticErrorKind::UnknownIdentifier(format!("{qualifier}.{member}")),
                    member_span,
                );
            };
            let ty = scopes.var(v).ty;
            expr.kind = ExprKind::Ident {
                name: member,
                var: Some(v),
            };
            return Ok(Some(ty));
        }
        let Some(enum_ty) = scopes.lookup_type(self.scope, &qualifier) else {
            return Ok(None);
        };
        self.prog
            .session
            .resolve(enum_ty)
            .map_err(|f| f.at(member_span))?;
        let Some(Shape::Enum { members, .. }) = self.types().shape(enum_ty) else {
            return Ok(None);
        };
        let Some(value) = members.iter().find(|(n, _)| *n == member).map(|(_, v)| *v) else {
            return fail(
                SemanticErrorKind::UnknownEnumValue(qualifier, member),
                member_span,
            );
        };
        if let ExprKind::Dot { access, .. } = &mut expr.kind {
            *access = Access::EnumValue(value);
        }
        Ok(Some(enum_ty))
    }

    pub(super) fn resolve_member(
        &mut self,
        object: &Expr,
        field: &Spanned<String>,
        access: &mut Access,
    ) -> CompileResult<TypeId> {
        let b = self.prog.session.builtins;
        let obj_ty = object.ty.unwrap_or(b.void);
        let types = self.types();
        if field.node == "name" && types.is_enum(obj_ty) {
            let ExprKind::Dot {
                access: Access::EnumValue(value),
                ..
            } = &object.kind
            else {
                return fail(SemanticErrorKind::EnumNameNotConstant, field.span);
            };
            if let Some(Shape::Enum { members, .. }) = types.shape(obj_ty) {
                if let Some((name, _)) = members.iter().find(|(_, v)| v == value) {
                    *access = Access::EnumName(name.clone());
                    return Ok(b.string);
                }
            }
        }
        let (target, deref) = match types.shape(obj_ty) {
            Some(Shape::Ref { inner, .. }) => (*inner, true),
            _ => (obj_ty, false),
        };
        let sized = types.is_string(target) || types.is_array(target) || types.is_static_array(target);
        if field.node == "length" && sized && !deref {
            *access = Access::Length;
            return Ok(b.int);
        }
        if let Some(Shape::Struct(st)) = types.shape(target) {
            if let Some(m) = st.member(&field.node) {
                *access = Access::Field { deref };
                return Ok(m);
            }
        }
        fail(
            SemanticErrorKind::UnknownMember {
                ty: self.show(target),
                name: field.node.clone(),
            },
            field.span,
        )
    }

    fn expect_integer(&mut self, expr: &mut Expr) -> CompileResult<()> {
        let int = self.prog.session.builtins.int;
        let ty = self.check_expr(expr, Some(int))?;
        if self.types().is_integer(ty) {
            return Ok(());
        }
        fail(
            SemanticErrorKind::TypeMismatch {
                expected: "int".into(),
                got: self.show(ty),
            },
            expr.span,
        )
    }

    // ─── Operators ─────────────────────────────────────────────

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &mut Expr,
        expected: Option<TypeId>,
        span: Span,
    ) -> CompileResult<TypeId> {
        let b = self.prog.session.builtins;
        match op {
            UnaryOp::Ref => {
                let t = self.check_expr(operand, None)?;
                if !operand.is_lvalue() {
                    return fail(SemanticErrorKind::AddressOfRvalue, operand.span);
                }
                Ok(self.prog.session.types.make_ref(t, false))
            }
            UnaryOp::Deref => {
                let t = self.check_expr(operand, None)?;
                match self.types().shape(t) {
                    Some(Shape::Ref { inner, .. }) => Ok(*inner),
                    _ => fail(SemanticErrorKind::NotDereferenceable(self.show(t)), span),
                }
            }
            UnaryOp::Not => {
                let t = self.check_expr(operand, Some(b.bool_))?;
                if !self.types().is_bool(t) {
                    return fail(
                        SemanticErrorKind::InvalidOperator {
                            op: op.as_str().into(),
                            ty: self.show(t),
                        },
                        span,
                    );
                }
                Ok(b.bool_)
            }
            UnaryOp::Neg | UnaryOp::Plus => {
                let t = self.check_expr(operand, expected)?;
                if !self.types().is_numeric(t) {
                    return fail(
                        SemanticErrorKind::InvalidOperator {
                            op: op.as_str().into(),
                            ty: self.show(t),
                        },
                        span,
                    );
                }
                Ok(t)
            }
        }
    }

    /// Type both operands, letting a literal adopt the other side's type.
    fn check_operands(
        &mut self,
        lhs: &mut Expr,
        rhs: &mut Expr,
        expected: Option<TypeId>,
    ) -> CompileResult<(TypeId, TypeId)> {
        if lhs.is_literal() && !rhs.is_literal() {
            let rt = self.check_expr(rhs, expected)?;
            let lt = self.check_expr(lhs, Some(rt))?;
            Ok((lt, rt))
        } else {
            let lt = self.check_expr(lhs, expected)?;
            let rt = self.check_expr(rhs, Some(lt))?;
            Ok((lt, rt))
        }
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        expected: Option<TypeId>,
        span: Span,
    ) -> CompileResult<TypeId> {
        let b = self.prog.session.builtins;
        let arith_hint = expected.filter(|t| self.types().is_numeric(*t));
        let hint = if op.is_comparison() || op.is_logic() {
            None
        } else {
            arith_hint
        };
        let (lt, rt) = self.check_operands(lhs, rhs, hint)?;
        let types = self.types();
        let mismatch = || {
            fail(
                SemanticErrorKind::OperandMismatch {
                    op: op.as_str().into(),
                    left: types.type_to_string(lt),
                    right: types.type_to_string(rt),
                },
                span,
            )
        };
        let both = |pred: fn(&super::types::TypeArena, TypeId) -> bool| {
            pred(types, lt) && pred(types, rt)
        };
        match op {
            BinOp::And | BinOp::Or => {
                if !both(|t, x| t.is_bool(x)) {
                    return mismatch();
                }
                Ok(b.bool_)
            }
            BinOp::Eq | BinOp::Ne => {
                if both(|t, x| t.is_string(x)) {
                    // Literal operands are compared in place.
                    if !matches!(lhs.kind, ExprKind::Str(_)) {
                        self.borrow(lhs);
                    }
                    if !matches!(rhs.kind, ExprKind::Str(_)) {
                        self.borrow(rhs);
                    }
                    return Ok(b.bool_);
                }
                let scalar = |t: &super::types::TypeArena, x: TypeId| {
                    matches!(
                        t.shape(x),
                        Some(
                            Shape::Basic { .. }
                                | Shape::Enum { .. }
                                | Shape::Ref { .. }
                                | Shape::Func { .. }
                        )
                    )
                };
                let comparable = both(|t, x| t.is_numeric(x))
                    || (types.check_type(lt, rt) && scalar(types, lt))
                    || (types.is_ptr(lt) && types.is_ref(rt))
                    || (types.is_ref(lt) && types.is_ptr(rt));
                if !comparable {
                    return mismatch();
                }
                Ok(b.bool_)
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordered = both(|t, x| t.is_numeric(x))
                    || (both(|t, x| t.is_enum(x)) && types.check_type(lt, rt));
                if !ordered {
                    return mismatch();
                }
                Ok(b.bool_)
            }
            BinOp::Add if both(|t, x| t.is_string(x)) => {
                self.borrow(lhs);
                if !matches!(rhs.kind, ExprKind::Str(_)) {
                    self.borrow(rhs);
                }
                Ok(b.string)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if !both(|t, x| t.is_numeric(x)) {
                    return mismatch();
                }
                if types.check_type(lt, rt) || !types.is_float(rt) || types.is_float(lt) {
                    Ok(lt)
                } else {
                    Ok(rt)
                }
            }
            BinOp::Mod
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor
            | BinOp::Shl
            | BinOp::Shr => {
                if !both(|t, x| t.is_integer(x)) {
                    return mismatch();
                }
                Ok(lt)
            }
        }
    }

    fn castable(&self, from: TypeId, to: TypeId) -> bool {
        let t = self.types();
        if t.check_type(from, to) {
            return true;
        }
        let number = |x| t.is_numeric(x) || t.is_enum(x) || t.is_bool(x);
        let address = |x| t.is_ref(x) || t.is_ptr(x);
        (number(from) && number(to))
            || (address(from) && address(to))
            || (t.is_ptr(from) && t.is_integer(to))
            || (t.is_integer(from) && t.is_ptr(to))
    }

    // ─── Literals ──────────────────────────────────────────────

    fn check_struct_lit(
        &mut self,
        ty: &TypeExpr,
        fields: &mut [(Spanned<String>, Expr)],
        span: Span,
    ) -> CompileResult<TypeId> {
        let st_ty = self.prog.session.resolve_type_expr(self.scope, ty)?;
        if self.types().contains_generic_struct(st_ty) {
            return fail(SemanticErrorKind::CannotInfer(self.show(st_ty)), ty.span);
        }
        let members = match self.types().shape(st_ty) {
            Some(Shape::Struct(st)) => st.members.clone(),
            _ => {
                return fail(
                    SemanticErrorKind::TypeMismatch {
                        expected: "struct".into(),
                        got: self.show(st_ty),
                    },
                    span,
                )
            }
        };
        let mut seen: Vec<String> = Vec::with_capacity(fields.len());
        for (name, value) in fields.iter_mut() {
            if seen.contains(&name.node) {
                return fail(SemanticErrorKind::DuplicateField(name.node.clone()), name.span);
            }
            seen.push(name.node.clone());
            let Some(member_ty) = members.iter().find(|(n, _)| *n == name.node).map(|(_, t)| *t)
            else {
                return fail(
                    SemanticErrorKind::UnknownField {
                        ty: self.show(st_ty),
                        name: name.node.clone(),
                    },
                    name.span,
                );
            };
            self.check_expr(value, Some(member_ty))?;
            self.expect_assignable(member_ty, value)?;
            self.pass_value(value, member_ty)?;
        }
        Ok(st_ty)
    }

    /// Static when the context asks for a static array, otherwise a view
    /// over temporary storage.
    fn check_array_lit(
        &mut self,
        elems: &mut [Expr],
        expected: Option<TypeId>,
        span: Span,
    ) -> CompileResult<TypeId> {
        let (mut elem, fixed) = match expected.and_then(|t| self.types().shape(t)) {
            Some(Shape::StaticArray { inner, length }) => (Some(*inner), Some(*length)),
            Some(Shape::Array { inner, .. }) => (Some(*inner), None),
            _ => (None, None),
        };
        for e in elems.iter_mut() {
            let got = self.check_expr(e, elem)?;
            let want = *elem.get_or_insert(got);
            self.expect_assignable(want, e)?;
            self.pass_value(e, want)?;
        }
        let Some(elem) = elem else {
            return fail(SemanticErrorKind::CannotInfer("[]".into()), span);
        };
        match (fixed, expected) {
            (Some(length), Some(ty)) => {
                if elems.len() as u64 > length {
                    let shown = self.show(elem);
                    return fail(
                        SemanticErrorKind::TypeMismatch {
                            expected: self.show(ty),
                            got: format!("[{}]{shown}", elems.len()),
                        },
                        span,
                    );
                }
                Ok(ty)
            }
            _ => Ok(self.prog.session.types.make_array(elem, false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::semantic::errors::SemanticErrorKind;
    use crate::semantic::typecheck::tests::{check, check_err};

    #[test]
    fn operand_mismatch() {
        let kind = check_err("fn main() { x := 1 + \"a\"; }");
        assert_eq!(
            kind,
            SemanticErrorKind::OperandMismatch {
                op: "+".into(),
                left: "int".into(),
                right: "string".into()
            }
        );
    }

    #[test]
    fn literals_adopt_the_other_operand() {
        check("fn main() { f float = 2.5; g := 1 + f; h float = g; }").unwrap();
        check("fn main() { b u8 = 3; c := 1 + b; d u8 = c; }").unwrap();
    }

    #[test]
    fn string_concat_operands_get_temporaries() {
        let prog = check(
            "fn name() string { return \"x\"; }
             fn main() { s := name() + name() + \"!\"; }",
        )
        .unwrap();
        let main = prog.function(prog.main.unwrap());
        // Both calls and the inner concatenation; the literal is appended
        // in place.
        assert_eq!(prog.session.scopes.get(main.scope).temp_vars.len(), 3);
    }

    #[test]
    fn literal_string_comparison_needs_no_temporary() {
        let prog = check("fn main() { s := \"a\"; if s == \"a\" { } }").unwrap();
        let main = prog.function(prog.main.unwrap());
        assert!(prog.session.scopes.get(main.scope).temp_vars.is_empty());
    }

    #[test]
    fn enum_members_and_names() {
        check(
            "type Color enum { Red, Green = 4, Blue }
             fn main() int { c := Color.Blue; s := Color.Red.name; return c as int; }",
        )
        .unwrap();
        assert_eq!(
            check_err("type Color enum { Red } fn main() { c := Color.Purple; }"),
            SemanticErrorKind::UnknownEnumValue("Color".into(), "Purple".into())
        );
        assert_eq!(
            check_err("type Color enum { Red } fn main() { c := Color.Red; s := c.name; }"),
            SemanticErrorKind::EnumNameNotConstant
        );
    }

    #[test]
    fn struct_literals_check_fields() {
        assert_eq!(
            check_err("type P struct { x int } fn main() { p := P{y: 1}; }"),
            SemanticErrorKind::UnknownField {
                ty: "P".into(),
                name: "y".into()
            }
        );
        assert_eq!(
            check_err("type P struct { x int } fn main() { p := P{x: 1, x: 2}; }"),
            SemanticErrorKind::DuplicateField("x".into())
        );
    }

    #[test]
    fn member_access_through_references() {
        check(
            "type Node struct { v int; next &Node }
             fn sum(n &Node) int { return n.v + n.next.v; }
             fn main() {}",
        )
        .unwrap();
        assert_eq!(
            check_err("type P struct { x int } fn main() { p := P{x: 1}; q := p.z; }"),
            SemanticErrorKind::UnknownMember {
                ty: "P".into(),
                name: "z".into()
            }
        );
    }

    #[test]
    fn address_of_temporary_is_rejected() {
        assert_eq!(
            check_err("fn main() { p := &(1 + 2); }"),
            SemanticErrorKind::AddressOfRvalue
        );
    }

    #[test]
    fn array_literals() {
        check("fn main() { xs [3]int = [1, 2, 3]; ys := [4, 5]; n := ys.length + xs.length; }")
            .unwrap();
        assert_eq!(
            check_err("fn main() { xs := []; }"),
            SemanticErrorKind::CannotInfer("[]".into())
        );
    }

    #[test]
    fn invalid_casts() {
        assert_eq!(
            check_err("fn main() { s := \"a\" as int; }"),
            SemanticErrorKind::InvalidCast {
                from: "string".into(),
                to: "int".into()
            }
        );
    }
}
