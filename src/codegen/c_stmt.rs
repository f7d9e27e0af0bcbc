/// Statement codegen. Each checked scope becomes a C block that declares its
/// temporaries up front and releases its live dynamic values on the way out.
use crate::errors::InternalError;
use crate::parser::ast::{Block, Expr, ExprKind, Stmt, StmtKind};
use crate::semantic::ids::{ScopeId, TypeId, VarId};
use crate::semantic::scope::ScopeKind;
use crate::semantic::types::Shape;

use super::c_emitter::CEmitter;
use super::c_mangle::{struct_init_name, temp_name, var_name};
use super::c_types::{declare, pointer_type, zero_value};
use super::{CResult, CodegenContext};

impl CodegenContext<'_> {
    /// Body of a checked block: temporaries, statements, releases.
    pub fn emit_scope_body(&mut self, block: &Block, e: &mut CEmitter) -> CResult<()> {
        let scope = block_scope(block)?;
        let saved = self.scope;
        self.scope = scope;
        self.emit_temp_decls(scope, e)?;
        self.emit_scope_stmts(scope, &block.stmts, e)?;
        self.scope = saved;
        Ok(())
    }

    /// Temporaries start zeroed so releasing an unused one is harmless.
    pub(super) fn emit_temp_decls(&mut self, scope: ScopeId, e: &mut CEmitter) -> CResult<()> {
        let scopes = self.scopes;
        for t in &scopes.get(scope).temp_vars {
            let ty = scopes.var(t.var).ty;
            let decl = declare(self.types, ty, &temp_name(t.var))?;
            e.emit_line(&format!("{decl} = {};", zero_value(self.types, ty)));
        }
        Ok(())
    }

    fn emit_scope_stmts(&mut self, scope: ScopeId, stmts: &[Stmt], e: &mut CEmitter) -> CResult<()> {
        for stmt in stmts {
            self.emit_stmt(stmt, e)?;
        }
        if !self.scopes.get(scope).has_return {
            let frees = self.free_scope(scope)?;
            e.emit_lines(&frees);
        }
        Ok(())
    }

    fn emit_nested(&mut self, block: &Block, e: &mut CEmitter) -> CResult<()> {
        e.indent();
        self.emit_scope_body(block, e)?;
        e.dedent();
        Ok(())
    }

    pub fn emit_stmt(&mut self, stmt: &Stmt, e: &mut CEmitter) -> CResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.gen_expr(expr)?;
                e.emit_line(&format!("{value};"));
            }
            StmtKind::Decl { var, init, name, .. } => {
                let v = var.ok_or_else(|| {
                    InternalError::new(format!("unchecked declaration of '{}'", name.node))
                })?;
                self.emit_decl(v, init.as_ref(), e)?;
            }
            StmtKind::Assign { target, value } => self.emit_assign(target, value, e)?,
            StmtKind::Return(value) => self.emit_return(value.as_ref(), e)?,
            StmtKind::Break => self.emit_loop_exit("break;", e)?,
            StmtKind::Continue => self.emit_loop_exit("continue;", e)?,
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                let c = self.gen_expr(cond)?;
                e.emit_line(&format!("if ({c}) {{"));
                self.emit_nested(then_block, e)?;
                let mut next = else_branch.as_deref();
                while let Some(branch) = next {
                    match &branch.kind {
                        StmtKind::If {
                            cond,
                            then_block,
                            else_branch,
                        } => {
                            let c = self.gen_expr(cond)?;
                            e.emit_line(&format!("}} else if ({c}) {{"));
                            self.emit_nested(then_block, e)?;
                            next = else_branch.as_deref();
                        }
                        StmtKind::Block(block) => {
                            e.emit_line("} else {");
                            self.emit_nested(block, e)?;
                            next = None;
                        }
                        _ => {
                            e.emit_line("} else {");
                            e.indent();
                            self.emit_stmt(branch, e)?;
                            e.dedent();
                            next = None;
                        }
                    }
                }
                e.emit_line("}");
            }
            StmtKind::While { cond, body } => self.emit_while(cond, body, e)?,
            StmtKind::For {
                iter,
                body,
                index_var,
                item_var,
                ..
            } => self.emit_for(iter, body, *index_var, *item_var, e)?,
            StmtKind::Block(block) => {
                e.emit_line("{");
                self.emit_nested(block, e)?;
                e.emit_line("}");
            }
            // Hoisted; emitted with the other functions.
            StmtKind::Fn { .. } | StmtKind::TypeDecl(_) => {}
        }
        Ok(())
    }

    // ─── Declarations and assignment ───────────────────────────

    fn emit_decl(&mut self, v: VarId, init: Option<&Expr>, e: &mut CEmitter) -> CResult<()> {
        let ty = self.scopes.var(v).ty;
        let name = var_name(v);
        let decl = declare(self.types, ty, &name)?;
        let Some(value) = init else {
            if self.types.is_struct(ty) {
                e.emit_line(&format!("{decl};"));
                let init = struct_init_name(self.types.emit_id(ty));
                e.emit_line(&format!("{init}(&{name});"));
                self.mark_initialized(v);
            } else {
                e.emit_line(&format!("{decl} = {};", zero_value(self.types, ty)));
                if self.types.is_static_array(ty) {
                    self.mark_initialized(v);
                }
            }
            return Ok(());
        };
        if let Some(Shape::StaticArray { inner, .. }) = self.types.shape(ty) {
            let inner = *inner;
            if let ExprKind::ArrayLit { elems } = &value.kind {
                let values = self.gen_elements(elems, inner)?;
                e.emit_line(&format!("{decl} = {{{}}};", values.join(", ")));
            } else {
                e.emit_line(&format!("{decl} = {{0}};"));
                self.emit_static_store(&name, ty, value, e)?;
            }
        } else {
            let owned = self.gen_owned(value, ty)?;
            e.emit_line(&format!("{decl} = {owned};"));
        }
        self.mark_initialized(v);
        Ok(())
    }

    /// Fill static array storage at `place` from `value`. Elements read out
    /// of another variable are then replaced by copies.
    pub(super) fn emit_static_store(
        &mut self,
        place: &str,
        ty: TypeId,
        value: &Expr,
        e: &mut CEmitter,
    ) -> CResult<()> {
        let src = self.gen_expr(value)?;
        e.emit_line(&format!("memcpy({place}, {src}, sizeof({place}));"));
        if value.is_lvalue() {
            let copies = self.copy_in_place(place, ty, 0)?;
            e.emit_lines(&copies);
        }
        Ok(())
    }

    fn emit_assign(&mut self, target: &Expr, value: &Expr, e: &mut CEmitter) -> CResult<()> {
        let ty = self.expr_ty(target)?;
        if self.types.is_static_array(ty) {
            let place = self.gen_expr(target)?;
            return self.emit_static_store(&place, ty, value, e);
        }
        if !self.types.is_dynamic(ty) {
            let place = self.gen_expr(target)?;
            let v = self.gen_owned(value, ty)?;
            e.emit_line(&format!("{place} = {v};"));
            return Ok(());
        }

        let target_var = match &target.kind {
            ExprKind::Ident { var: Some(v), .. } => Some(*v),
            _ => None,
        };
        // First store into a local of this scope: nothing to release.
        if let Some(v) = target_var {
            let var = self.scopes.var(v);
            if var.scope == self.scope && !var.temp && !self.is_initialized(v) {
                let owned = self.gen_owned(value, ty)?;
                e.emit_line(&format!("{} = {owned};", var_name(v)));
                self.mark_initialized(v);
                return Ok(());
            }
        }

        // The old value lands in the swap temporary and dies with its scope.
        let tmp = self.temp_for(value.id, |t| self.types.check_type(t, ty))?;
        let owned = self.gen_owned(value, ty)?;
        e.emit_line(&format!("{} = {owned};", temp_name(tmp)));
        let place = self.gen_expr(target)?;
        e.emit_line(&format!("SWAP({place}, {});", temp_name(tmp)));
        self.mark_initialized(tmp);
        if let Some(v) = target_var {
            self.mark_initialized(v);
        }
        Ok(())
    }

    // ─── Control flow ──────────────────────────────────────────

    /// Local of the current function that a return can hand over without
    /// copying.
    fn movable_local(&self, value: &Expr) -> Option<VarId> {
        let ExprKind::Ident { var: Some(v), .. } = &value.kind else {
            return None;
        };
        let var = self.scopes.var(*v);
        if value.needs_temp
            || var.borrowed
            || var.constant
            || var.temp
            || var.ext
            || !self.types.is_dynamic(var.ty)
            || self.prog.session.is_any(self.ret)
        {
            return None;
        }
        let here = self.scopes.closest_fn_scope(self.scope)?;
        (self.scopes.closest_fn_scope(var.scope) == Some(here)).then_some(*v)
    }

    fn emit_return(&mut self, value: Option<&Expr>, e: &mut CEmitter) -> CResult<()> {
        let Some(value) = value else {
            let frees = self.free_until(ScopeKind::Function)?;
            if frees.is_empty() {
                e.emit_line("return;");
            } else {
                e.open("{");
                e.emit_lines(&frees);
                e.emit_line("return;");
                e.close();
            }
            return Ok(());
        };
        self.moved = self.movable_local(value);
        let result = if self.moved.is_some() {
            self.gen_coerced(value, self.ret)
        } else {
            self.gen_owned(value, self.ret)
        };
        let frees = result.and_then(|v| Ok((v, self.free_until(ScopeKind::Function)?)));
        self.moved = None;
        let (v, frees) = frees?;
        e.open("{");
        e.emit_line(&format!("{} = {v};", declare(self.types, self.ret, "_ret")?));
        e.emit_lines(&frees);
        e.emit_line("return _ret;");
        e.close();
        Ok(())
    }

    fn emit_loop_exit(&mut self, jump: &str, e: &mut CEmitter) -> CResult<()> {
        let frees = self.free_until(ScopeKind::Loop)?;
        e.emit_lines(&frees);
        e.emit_line(jump);
        Ok(())
    }

    /// A condition that parks values in temporaries is evaluated inside the
    /// body so they are released on every iteration.
    fn emit_while(&mut self, cond: &Expr, body: &Block, e: &mut CEmitter) -> CResult<()> {
        let scope = block_scope(body)?;
        let saved = self.scope;
        self.scope = scope;
        if self.scopes.get(scope).temp_vars.is_empty() {
            let c = self.gen_expr(cond)?;
            e.open(&format!("while ({c}) {{"));
        } else {
            e.open("while (1) {");
            self.emit_temp_decls(scope, e)?;
            let c = self.gen_expr(cond)?;
            let frees = self.free_scope(scope)?;
            e.open(&format!("if (!({c})) {{"));
            e.emit_lines(&frees);
            e.emit_line("break;");
            e.close();
        }
        self.emit_scope_stmts(scope, &body.stmts, e)?;
        e.close();
        self.scope = saved;
        Ok(())
    }

    fn emit_for(
        &mut self,
        iter: &Expr,
        body: &Block,
        index_var: Option<VarId>,
        item_var: Option<VarId>,
        e: &mut CEmitter,
    ) -> CResult<()> {
        let scope = block_scope(body)?;
        let item = item_var.ok_or_else(|| InternalError::new("unchecked loop variable"))?;
        let iter_ty = self.expr_ty(iter)?;
        let value = self.gen_expr(iter)?;
        let (view, elem) = match self.types.shape(iter_ty) {
            Some(Shape::StaticArray { inner, length }) => {
                (format!("(struct array_type){{{length}, {value}}}"), *inner)
            }
            Some(Shape::Array { inner, .. }) => (value, *inner),
            _ => return Err(InternalError::new("loop over a non-array value")),
        };
        if self.types.is_static_array(elem) {
            return Err(InternalError::new(
                "iteration over nested static arrays is not supported",
            ));
        }

        let it = e.fresh_temp("_iter");
        let i = e.fresh_temp("_idx");
        e.open("{");
        e.emit_line(&format!("struct array_type {it} = {view};"));
        e.open(&format!("for (long {i} = 0; {i} < {it}.length; {i}++) {{"));

        let saved = self.scope;
        self.scope = scope;
        self.emit_temp_decls(scope, e)?;
        let ptr = pointer_type(self.types, elem)?;
        let item_decl = declare(self.types, elem, &var_name(item))?;
        e.emit_line(&format!("{item_decl} = (({ptr}){it}.data)[{i}];"));
        if let Some(idx) = index_var {
            e.emit_line(&format!("int64_t {} = {i};", var_name(idx)));
        }
        self.emit_scope_stmts(scope, &body.stmts, e)?;
        self.scope = saved;

        e.close();
        e.close();
        Ok(())
    }
}

fn block_scope(block: &Block) -> CResult<ScopeId> {
    block
        .scope
        .ok_or_else(|| InternalError::new("block reached codegen without a scope"))
}
