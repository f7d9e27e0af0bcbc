/// Expression codegen. Every compound expression comes back parenthesized
/// or in postfix form, so results compose without further wrapping.
use crate::errors::InternalError;
use crate::parser::ast::*;
use crate::semantic::ids::{NodeId, TypeId, VarId};
use crate::semantic::types::Shape;

use super::c_mangle::{
    c_string_body, ext_name, member_name, poly_name, struct_init_name, struct_name, temp_name,
    var_name,
};
use super::c_types::{c_type, declare, int_suffix, pointer_type};
use super::{CResult, CodegenContext};

fn string_literal(s: &str) -> String {
    format!("init_string(\"{}\", {})", c_string_body(s), s.len())
}

impl CodegenContext<'_> {
    pub(super) fn expr_ty(&self, expr: &Expr) -> CResult<TypeId> {
        expr.ty
            .ok_or_else(|| InternalError::new("expression reached codegen without a type"))
    }

    /// C name of a variable.
    pub fn ident_name(&self, v: VarId) -> String {
        let var = self.scopes.var(v);
        if var.temp {
            temp_name(v)
        } else if var.ext {
            ext_name(&var.name)
        } else {
            var_name(v)
        }
    }

    /// Most recent temporary planned for `origin` whose type satisfies
    /// `want`, searching the current scope outwards.
    pub(super) fn temp_for(
        &self,
        origin: NodeId,
        want: impl Fn(TypeId) -> bool,
    ) -> CResult<VarId> {
        let mut current = Some(self.scope);
        while let Some(s) = current {
            let sc = self.scopes.get(s);
            let found = sc
                .temp_vars
                .iter()
                .rev()
                .find(|t| t.origin == origin && want(self.scopes.var(t.var).ty));
            if let Some(t) = found {
                return Ok(t.var);
            }
            current = sc.parent;
        }
        Err(InternalError::new(format!(
            "no temporary planned for expression {}",
            origin.0
        )))
    }

    /// Temporary holding the value of `expr` itself.
    fn value_temp(&self, expr: &Expr) -> CResult<VarId> {
        let ty = self.expr_ty(expr)?;
        self.temp_for(expr.id, |t| self.types.check_type(t, ty))
    }

    pub fn gen_expr(&mut self, expr: &Expr) -> CResult<String> {
        let raw = self.gen_raw(expr)?;
        if !expr.needs_temp {
            return Ok(raw);
        }
        let tmp = self.value_temp(expr)?;
        self.mark_initialized(tmp);
        Ok(format!("({} = {raw})", temp_name(tmp)))
    }

    /// An lvalue denoting the value of `expr`, parking it in its temporary
    /// when it has one.
    pub fn gen_place(&mut self, expr: &Expr) -> CResult<String> {
        if !expr.needs_temp {
            return self.gen_expr(expr);
        }
        let tmp = temp_name(self.value_temp(expr)?);
        let stored = self.gen_expr(expr)?;
        Ok(format!("(*({stored}, &{tmp}))"))
    }

    /// Value converted to `target`: `Any` wrapping, static array to view,
    /// reference to `ptr`.
    pub fn gen_coerced(&mut self, expr: &Expr, target: TypeId) -> CResult<String> {
        let ty = self.expr_ty(expr)?;
        let session = &self.prog.session;
        if session.is_any(target) && !session.is_any(ty) {
            return self.gen_any(expr);
        }
        if self.types.is_array(target) {
            if let Some(Shape::StaticArray { length, .. }) = self.types.shape(ty) {
                let length = *length;
                let value = self.gen_expr(expr)?;
                return Ok(format!("(struct array_type){{{length}, {value}}}"));
            }
        }
        if self.types.is_ptr(target) && self.types.is_ref(ty) {
            let value = self.gen_expr(expr)?;
            return Ok(format!("((ptr_type)({value}))"));
        }
        self.gen_expr(expr)
    }

    /// Value for a consuming position: lvalues holding dynamic storage are
    /// copied so the destination owns its own.
    pub fn gen_owned(&mut self, expr: &Expr, target: TypeId) -> CResult<String> {
        let ty = self.expr_ty(expr)?;
        if self.types.is_dynamic(ty)
            && expr.is_lvalue()
            && !expr.needs_temp
            && !self.types.is_static_array(ty)
            && !self.prog.session.is_any(target)
        {
            let value = self.gen_expr(expr)?;
            return Ok(self.copy_value(&value, ty));
        }
        self.gen_coerced(expr, target)
    }

    fn gen_any(&mut self, expr: &Expr) -> CResult<String> {
        let ty = self.expr_ty(expr)?;
        let any = struct_name(self.types.emit_id(self.prog.session.builtins.any));
        let info = self.type_info_ref(ty);
        let wrap = |addr: &str| {
            format!("({any}){{.value_pointer = (void *)&{addr}, .type = {info}}}")
        };
        if expr.needs_temp {
            let tmp = temp_name(self.value_temp(expr)?);
            let stored = self.gen_expr(expr)?;
            return Ok(format!("({stored}, {})", wrap(&tmp)));
        }
        if expr.is_lvalue() {
            let place = self.gen_expr(expr)?;
            return Ok(wrap(&place));
        }
        let aggregate = self.types.is_struct(ty)
            || self.types.is_static_array(ty)
            || self.types.is_array(ty)
            || self.types.is_string(ty);
        if aggregate {
            return Err(InternalError::new(format!(
                "no storage for Any value of type {}",
                self.types.type_to_string(ty)
            )));
        }
        let value = self.gen_expr(expr)?;
        let literal = format!("({}){{{value}}}", c_type(self.types, ty)?);
        Ok(wrap(&literal))
    }

    fn int_literal(&self, value: i64, ty: TypeId) -> String {
        let text = if self.types.is_float(ty) {
            let f = if self.types.basic_size(ty) == Some(4) { "f" } else { "" };
            format!("{}.0{f}", value.unsigned_abs())
        } else {
            format!("{}{}", value.unsigned_abs(), int_suffix(self.types, ty))
        };
        if value < 0 {
            format!("(-{text})")
        } else {
            text
        }
    }

    fn gen_raw(&mut self, expr: &Expr) -> CResult<String> {
        let ty = self.expr_ty(expr)?;
        match &expr.kind {
            ExprKind::Int(n) => Ok(self.int_literal(*n, ty)),
            ExprKind::Float(x) => {
                let f = if self.types.basic_size(ty) == Some(4) { "f" } else { "" };
                Ok(format!("{x:?}{f}"))
            }
            ExprKind::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            ExprKind::Str(s) => Ok(string_literal(s)),
            ExprKind::Ident { var, name } => match var {
                Some(v) => Ok(self.ident_name(*v)),
                None => Err(InternalError::new(format!("unresolved identifier '{name}'"))),
            },
            ExprKind::Unary { op, operand } => {
                let value = self.gen_expr(operand)?;
                Ok(format!("({}{value})", op.as_str()))
            }
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            ExprKind::Dot { object, access, field } => match access {
                Access::Field { deref } => {
                    let obj = if !*deref && object.needs_temp {
                        self.gen_place(object)?
                    } else {
                        self.gen_expr(object)?
                    };
                    let sep = if *deref { "->" } else { "." };
                    Ok(format!("{obj}{sep}{}", member_name(&field.node)))
                }
                Access::EnumValue(v) => Ok(self.int_literal(*v, ty)),
                Access::EnumName(name) => Ok(string_literal(name)),
                Access::Length => {
                    let obj_ty = self.expr_ty(object)?;
                    if let Some(Shape::StaticArray { length, .. }) = self.types.shape(obj_ty) {
                        return Ok(format!("{length}LL"));
                    }
                    let obj = self.gen_expr(object)?;
                    Ok(format!("((int64_t){obj}.length)"))
                }
                Access::Unresolved => Err(InternalError::new(format!(
                    "unresolved member '{}'",
                    field.node
                ))),
            },
            ExprKind::Call { .. } => self.gen_call(expr),
            ExprKind::Index { object, index } => {
                let obj_ty = self.expr_ty(object)?;
                let obj = self.gen_expr(object)?;
                let idx = self.gen_expr(index)?;
                if self.types.is_string(obj_ty) {
                    return Ok(format!("((uint8_t *){obj}.bytes)[{idx}]"));
                }
                match self.types.shape(obj_ty) {
                    Some(Shape::StaticArray { .. }) => Ok(format!("{obj}[{idx}]")),
                    Some(Shape::Array { inner, .. }) => {
                        let elem = pointer_type(self.types, *inner)?;
                        Ok(format!("(({elem}){obj}.data)[{idx}]"))
                    }
                    _ => Err(InternalError::new("index on a non-indexable value")),
                }
            }
            ExprKind::Slice { object, start, end } => {
                let obj_ty = self.expr_ty(object)?;
                let obj = self.gen_expr(object)?;
                let start = match start {
                    Some(s) => self.gen_expr(s)?,
                    None => "0".to_string(),
                };
                let end = match end {
                    Some(e) => self.gen_expr(e)?,
                    None => "-1".to_string(),
                };
                if self.types.is_string(obj_ty) {
                    return Ok(format!("string_slice({obj}, {start}, {end})"));
                }
                match self.types.shape(obj_ty) {
                    Some(Shape::StaticArray { inner, length }) => {
                        let elem = c_type(self.types, *inner)?;
                        Ok(format!(
                            "array_slice((struct array_type){{{length}, {obj}}}, {start}, {end}, sizeof({elem}))"
                        ))
                    }
                    Some(Shape::Array { inner, .. }) => {
                        let elem = c_type(self.types, *inner)?;
                        Ok(format!("array_slice({obj}, {start}, {end}, sizeof({elem}))"))
                    }
                    _ => Err(InternalError::new("slice of a non-sliceable value")),
                }
            }
            ExprKind::Cast { expr: inner, .. } => {
                let from = self.expr_ty(inner)?;
                if self.prog.session.is_any(ty) && !self.prog.session.is_any(from) {
                    return self.gen_any(inner);
                }
                let value = self.gen_expr(inner)?;
                if self.types.check_type(from, ty) {
                    return Ok(value);
                }
                Ok(format!("(({})({value}))", c_type(self.types, ty)?))
            }
            ExprKind::StructLit { fields, .. } => {
                let st = struct_name(self.types.emit_id(ty));
                if fields.is_empty() {
                    return Ok(format!("({st}){{0}}"));
                }
                let members = self.types.struct_shape(ty)?.members.clone();
                let mut parts = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    let member_ty = members
                        .iter()
                        .find(|(n, _)| *n == name.node)
                        .map(|(_, t)| *t)
                        .ok_or_else(|| InternalError::new(format!("unknown field '{}'", name.node)))?;
                    let v = self.gen_owned(value, member_ty)?;
                    parts.push(format!(".{} = {v}", member_name(&name.node)));
                }
                Ok(format!("({st}){{{}}}", parts.join(", ")))
            }
            ExprKind::ArrayLit { elems } => self.gen_array_lit(expr, elems, ty),
            ExprKind::New { target, .. } => {
                let t = target.ok_or_else(|| InternalError::new("unresolved `new` target"))?;
                if self.types.is_struct(t) {
                    return Ok(format!("{}(NULL)", struct_init_name(self.types.emit_id(t))));
                }
                Ok(format!("calloc(1, sizeof({}))", c_type(self.types, t)?))
            }
            ExprKind::TypeInfo { target, .. } => {
                let t = target.ok_or_else(|| InternalError::new("unresolved #type target"))?;
                Ok(format!("({})", self.type_info_ref(t)))
            }
            ExprKind::FnLit { func, .. } => {
                let fid = func.ok_or_else(|| InternalError::new("unchecked function literal"))?;
                Ok(var_name(self.prog.function(fid).var))
            }
        }
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> CResult<String> {
        let lt = self.expr_ty(lhs)?;
        let rt = self.expr_ty(rhs)?;
        let strings = self.types.is_string(lt) && self.types.is_string(rt);
        if strings && matches!(op, BinOp::Eq | BinOp::Ne) {
            let not = if op == BinOp::Ne { "!" } else { "" };
            return match (&lhs.kind, &rhs.kind) {
                (ExprKind::Str(a), ExprKind::Str(b)) => {
                    Ok(if (a == b) == (op == BinOp::Eq) { "1" } else { "0" }.to_string())
                }
                (ExprKind::Str(lit), _) => {
                    let other = self.gen_expr(rhs)?;
                    Ok(format!(
                        "{not}streq_lit({other}, \"{}\", {})",
                        c_string_body(lit),
                        lit.len()
                    ))
                }
                (_, ExprKind::Str(lit)) => {
                    let other = self.gen_expr(lhs)?;
                    Ok(format!(
                        "{not}streq_lit({other}, \"{}\", {})",
                        c_string_body(lit),
                        lit.len()
                    ))
                }
                _ => {
                    let l = self.gen_expr(lhs)?;
                    let r = self.gen_expr(rhs)?;
                    Ok(format!("{not}streq({l}, {r})"))
                }
            };
        }
        if strings && op == BinOp::Add {
            let l = self.gen_expr(lhs)?;
            if let ExprKind::Str(lit) = &rhs.kind {
                return Ok(format!(
                    "append_string_lit({l}, \"{}\", {})",
                    c_string_body(lit),
                    lit.len()
                ));
            }
            let r = self.gen_expr(rhs)?;
            return Ok(format!("append_string({l}, {r})"));
        }
        let l = self.gen_expr(lhs)?;
        let r = self.gen_expr(rhs)?;
        Ok(format!("({l} {} {r})", op.as_str()))
    }

    /// Static literals become compound literals; views fill their planned
    /// backing storage and point into it.
    fn gen_array_lit(&mut self, expr: &Expr, elems: &[Expr], ty: TypeId) -> CResult<String> {
        match self.types.shape(ty) {
            Some(Shape::StaticArray { inner, .. }) => {
                let inner = *inner;
                let values = self.gen_elements(elems, inner)?;
                let abstract_ty = declare(self.types, ty, "")?;
                Ok(format!("(({abstract_ty}){{{}}})", values.join(", ")))
            }
            Some(Shape::Array { inner, .. }) => {
                let inner = *inner;
                if elems.is_empty() {
                    return Ok("(struct array_type){0, NULL}".to_string());
                }
                let storage = self.temp_for(expr.id, |t| self.types.is_static_array(t))?;
                self.mark_initialized(storage);
                let s = temp_name(storage);
                let values = self.gen_elements(elems, inner)?;
                let mut parts: Vec<String> = values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| format!("{s}[{i}] = {v}"))
                    .collect();
                parts.push(format!("(struct array_type){{{}, {s}}}", elems.len()));
                Ok(format!("({})", parts.join(", ")))
            }
            _ => Err(InternalError::new("array literal without an array type")),
        }
    }

    /// Owned element values, in order.
    pub(super) fn gen_elements(&mut self, elems: &[Expr], elem: TypeId) -> CResult<Vec<String>> {
        elems.iter().map(|e| self.gen_owned(e, elem)).collect()
    }

    // ─── Calls ─────────────────────────────────────────────────

    fn gen_call(&mut self, expr: &Expr) -> CResult<String> {
        let ExprKind::Call {
            callee,
            args,
            spread,
            target,
        } = &expr.kind
        else {
            return Err(InternalError::new("gen_call on a non-call expression"));
        };
        let prog = self.prog;
        match target {
            CallTarget::Direct => {
                let ExprKind::Ident { var: Some(v), .. } = &callee.kind else {
                    return Err(InternalError::new("direct call without a named callee"));
                };
                let ext = self.scopes.var(*v).ext;
                let fty = self.expr_ty(callee)?;
                let (params, _, variadic) = self.types.func_shape(fty)?;
                let params = params.to_vec();
                let args = self.gen_args(&params, variadic, args, *spread, ext, callee.id)?;
                Ok(format!("{}({})", self.ident_name(*v), args.join(", ")))
            }
            CallTarget::Indirect => {
                let fty = self.expr_ty(callee)?;
                let (params, _, variadic) = self.types.func_shape(fty)?;
                let params = params.to_vec();
                let cast = c_type(self.types, fty)?;
                let f = self.gen_expr(callee)?;
                let args = self.gen_args(&params, variadic, args, *spread, false, callee.id)?;
                Ok(format!("(({cast})({f}))({})", args.join(", ")))
            }
            CallTarget::Polymorph { func, poly } => {
                let f = prog.function(*func);
                let p = prog.polymorph(*poly);
                let (_, _, variadic) = self.types.func_shape(f.ty)?;
                let args = self.gen_args(&p.args, variadic, args, *spread, false, callee.id)?;
                Ok(format!("{}({})", poly_name(*poly, f.var), args.join(", ")))
            }
            CallTarget::Method {
                func,
                poly,
                auto_ref,
            } => {
                let ExprKind::Dot { object, .. } = &callee.kind else {
                    return Err(InternalError::new("method call without a receiver"));
                };
                let f = prog.function(*func);
                let (declared, _, variadic) = self.types.func_shape(f.ty)?;
                let (name, params) = match poly {
                    Some(pid) => (poly_name(*pid, f.var), prog.polymorph(*pid).args.clone()),
                    None => (var_name(f.var), declared.to_vec()),
                };
                let receiver = if !*auto_ref {
                    self.gen_expr(object)?
                } else if object.needs_temp {
                    let tmp = temp_name(self.value_temp(object)?);
                    let stored = self.gen_expr(object)?;
                    format!("({stored}, &{tmp})")
                } else {
                    format!("(&{})", self.gen_expr(object)?)
                };
                let rest = params.get(1..).unwrap_or(&[]);
                let mut all = vec![receiver];
                all.extend(self.gen_args(rest, variadic, args, *spread, false, callee.id)?);
                Ok(format!("{name}({})", all.join(", ")))
            }
            CallTarget::Unresolved => Err(InternalError::new("unresolved call target")),
        }
    }

    /// Arguments in parameter order. Foreign callees borrow; everything
    /// else takes ownership. Trailing variadic arguments are packed into
    /// the storage planned for `origin`.
    fn gen_args(
        &mut self,
        params: &[TypeId],
        variadic: bool,
        args: &[Expr],
        spread: bool,
        ext: bool,
        origin: NodeId,
    ) -> CResult<Vec<String>> {
        let fixed = if variadic {
            params.len().saturating_sub(1)
        } else {
            params.len()
        };
        let mut out = Vec::with_capacity(params.len());
        for (arg, param) in args.iter().zip(params).take(fixed) {
            let value = if ext {
                self.gen_coerced(arg, *param)?
            } else {
                self.gen_owned(arg, *param)?
            };
            out.push(value);
        }
        if !variadic {
            return Ok(out);
        }
        let Some(&tail) = params.last() else {
            return Err(InternalError::new("variadic signature without parameters"));
        };
        if spread {
            let last = args
                .last()
                .ok_or_else(|| InternalError::new("spread call without arguments"))?;
            out.push(self.gen_coerced(last, tail)?);
            return Ok(out);
        }
        let extras = args.get(fixed..).unwrap_or(&[]);
        if extras.is_empty() {
            out.push("(struct array_type){0, NULL}".to_string());
            return Ok(out);
        }
        let elem = self
            .types
            .inner(tail)
            .ok_or_else(|| InternalError::new("variadic parameter without an element type"))?;
        let storage = self.temp_for(origin, |t| self.types.is_static_array(t))?;
        self.mark_initialized(storage);
        let s = temp_name(storage);
        let mut parts = Vec::with_capacity(extras.len() + 1);
        for (i, arg) in extras.iter().enumerate() {
            // The storage releases its elements, so borrowed values are
            // copied in.
            let value = if ext && (arg.is_lvalue() || arg.needs_temp) {
                let v = self.gen_coerced(arg, elem)?;
                self.copy_value(&v, elem)
            } else if ext {
                self.gen_coerced(arg, elem)?
            } else {
                self.gen_owned(arg, elem)?
            };
            parts.push(format!("{s}[{i}] = {value}"));
        }
        parts.push(format!("(struct array_type){{{}, {s}}}", extras.len()));
        out.push(format!("({})", parts.join(", ")));
        Ok(out)
    }
}
