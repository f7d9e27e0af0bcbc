use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::errors::CompileResult;
use crate::parser::ast::*;
use crate::span::Span;

use super::errors::{SemanticError, SemanticErrorKind};
use super::ids::{FnId, ScopeId, TypeId, VarId};
use super::scope::ScopeKind;
use super::types::{Shape, TypeArena};
use super::{FnDef, Global, PackageUnit, Program, Session};

pub(super) fn fail<T>(kind: SemanticErrorKind, span: Span) -> CompileResult<T> {
    Err(SemanticError::new(kind, span).into())
}

/// Walks declarations and bodies, annotating the AST in place and
/// planning the temporaries the generator needs.
pub struct Checker {
    pub(super) prog: Program,
    /// Scope statements are currently checked in.
    pub(super) scope: ScopeId,
    /// Return type of the function being checked.
    pub(super) ret: Option<TypeId>,
}

/// Check every package; the entry package comes last and must define
/// `main`.
pub fn check_program(session: Session, packages: Vec<PackageUnit>) -> CompileResult<Program> {
    let builtins = session.scopes.builtins();
    let mut checker = Checker {
        prog: Program::new(session),
        scope: builtins,
        ret: None,
    };

    // ─── Pass 1: Package scopes and imports ────────────────────

    let mut roots: FxHashMap<String, ScopeId> = FxHashMap::default();
    let mut units: Vec<(ScopeId, Module)> = Vec::with_capacity(packages.len());
    for pkg in packages {
        let root = checker.prog.session.new_package_scope();
        for item in &pkg.module.items {
            if let Item::Use(u) = item {
                let Some(&dep) = roots.get(&u.package.node) else {
                    return fail(
                        SemanticErrorKind::UnknownPackage(u.package.node.clone()),
                        u.package.span,
                    );
                };
                checker
                    .prog
                    .session
                    .scopes
                    .get_mut(root)
                    .imports
                    .insert(u.package.node.clone(), dep);
            }
        }
        debug!(package = %pkg.name, scope = root.0, "declaring package");
        roots.insert(pkg.name, root);
        units.push((root, pkg.module));
    }
    let Some((entry_root, entry_span)) = units.last().map(|(r, m)| (*r, m.span)) else {
        return fail(SemanticErrorKind::NoMain, Span::dummy());
    };

    // ─── Pass 2: Types ─────────────────────────────────────────

    for (root, module) in &units {
        let decls: Vec<&TypeDecl> = module
            .items
            .iter()
            .filter_map(|item| match item {
                Item::TypeDecl(decl) => Some(decl),
                _ => None,
            })
            .collect();
        checker.prog.session.define_types(*root, &decls)?;
    }

    // ─── Pass 3: Signatures ────────────────────────────────────

    let mut globals = Vec::new();
    for (root, module) in units {
        for item in module.items {
            match item {
                Item::Function(def) => {
                    checker.declare_function(root, def, None)?;
                }
                Item::Extern(ext) => checker.declare_extern(root, &ext)?,
                Item::Impl(block) => checker.declare_impl(root, block)?,
                Item::Global(stmt) => globals.push((root, stmt)),
                Item::TypeDecl(_) | Item::Use(_) => {}
            }
        }
    }
    let top_level = checker.prog.functions.len();

    // ─── Pass 4: Globals ───────────────────────────────────────

    for (root, mut stmt) in globals {
        checker.scope = root;
        checker.check_stmt(&mut stmt)?;
        checker.prog.globals.push(Global { scope: root, stmt });
    }

    // ─── Pass 5: Bodies ────────────────────────────────────────

    for i in 0..top_level {
        checker.check_function(FnId(i as u32))?;
    }

    let main = checker
        .prog
        .session
        .scopes
        .lookup_local_var(entry_root, "main")
        .and_then(|v| checker.prog.session.scopes.var(v).func);
    let Some(main) = main else {
        return fail(SemanticErrorKind::NoMain, entry_span);
    };
    checker.check_main(main)?;
    checker.prog.main = Some(main);
    debug!(
        functions = checker.prog.functions.len(),
        polymorphs = checker.prog.polymorphs.len(),
        types = checker.prog.session.registry.len(),
        "analysis complete"
    );
    Ok(checker.prog)
}

/// Names written as `$T` anywhere in a type expression.
fn collect_poly_names(expr: &TypeExpr, out: &mut Vec<String>) {
    match &expr.kind {
        TypeExprKind::Poly(name) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        TypeExprKind::Ref { inner, .. }
        | TypeExprKind::Array { inner, .. }
        | TypeExprKind::StaticArray { inner, .. } => collect_poly_names(inner, out),
        TypeExprKind::Func { args, ret, .. } => {
            for a in args {
                collect_poly_names(a, out);
            }
            if let Some(r) = ret {
                collect_poly_names(r, out);
            }
        }
        TypeExprKind::Params { base, args } => {
            collect_poly_names(base, out);
            for a in args {
                collect_poly_names(a, out);
            }
        }
        TypeExprKind::Struct { params, fields } => {
            for (_, f) in fields {
                collect_poly_names(f, out);
            }
            out.retain(|n| !params.iter().any(|p| p.node == *n));
        }
        TypeExprKind::Named(_) | TypeExprKind::External { .. } | TypeExprKind::Enum { .. } => {}
    }
}

impl Checker {
    pub(super) fn types(&self) -> &TypeArena {
        &self.prog.session.types
    }

    pub(super) fn show(&self, ty: TypeId) -> String {
        self.types().type_to_string(ty)
    }

    // ─── Declarations ──────────────────────────────────────────

    /// Create the function record, its parameter scope and the constant
    /// naming it. Methods and literals get a constant no lookup can reach.
    pub(super) fn declare_function(
        &mut self,
        scope: ScopeId,
        def: FunctionDef,
        method_of: Option<TypeId>,
    ) -> CompileResult<FnId> {
        let fid = FnId(self.prog.functions.len() as u32);
        let session = &mut self.prog.session;
        let fn_scope = session.scopes.new_scope(Some(scope), ScopeKind::Function);

        let mut placeholders = Vec::new();
        if let Some(decl) = method_of {
            session.collect_placeholders(decl, &mut placeholders);
        }
        let mut names: Vec<String> = def.poly_params.iter().map(|p| p.node.clone()).collect();
        for p in &def.params {
            collect_poly_names(&p.ty, &mut names);
        }
        if let Some(r) = &def.ret {
            collect_poly_names(r, &mut names);
        }
        for name in names {
            if !placeholders.iter().any(|(n, _)| *n == name) {
                let t = session.types.make_polydef(&name);
                placeholders.push((name, t));
            }
        }
        for (name, t) in &placeholders {
            session.scopes.bind_type(fn_scope, name, *t);
        }

        let mut params = Vec::with_capacity(def.params.len() + 1);
        let mut arg_types = Vec::with_capacity(def.params.len() + 1);
        if let Some(decl) = method_of {
            let self_ty = session.types.make_ref(decl, false);
            let v = session.scopes.define_var(fn_scope, "self", self_ty);
            session.scopes.var_mut(v).initialized = true;
            params.push(v);
            arg_types.push(self_ty);
        }
        for p in &def.params {
            let ty = self.param_type(fn_scope, p)?;
            params.push(self.define_param(fn_scope, p, ty)?);
            arg_types.push(ty);
        }
        let ret = self.return_type(fn_scope, &def)?;
        let variadic = def.params.last().is_some_and(|p| p.variadic);

        let session = &mut self.prog.session;
        let fty = session.types.make_func(arg_types, ret, variadic);
        session.register(fty);
        let generic = session.types.is_polydef(fty)
            || method_of.is_some_and(|d| session.types.contains_generic_struct(d));

        let name = def.name.node.clone();
        let var = if method_of.is_some() || name.is_empty() {
            session.scopes.detached_var(scope, &name, fty)
        } else {
            if session.scopes.lookup_local_var(scope, &name).is_some() {
                return fail(SemanticErrorKind::Redeclared(name), def.name.span);
            }
            session.scopes.define_var(scope, &name, fty)
        };
        let v = session.scopes.var_mut(var);
        v.constant = true;
        v.initialized = true;
        v.func = Some(fid);
        trace!(function = %name, id = fid.0, generic, "declared function");

        self.prog.functions.push(FnDef {
            name,
            var,
            def,
            def_scope: scope,
            scope: fn_scope,
            ty: fty,
            params,
            ret,
            generic,
            polymorphs: Vec::new(),
            method_of,
        });
        Ok(fid)
    }

    fn declare_extern(&mut self, root: ScopeId, ext: &ExternFn) -> CompileResult<()> {
        let mut args = Vec::with_capacity(ext.params.len());
        for p in &ext.params {
            args.push(self.param_type(root, p)?);
        }
        let ret = match &ext.ret {
            Some(r) => self.prog.session.resolve_type_expr(root, r)?,
            None => self.prog.session.builtins.void,
        };
        let variadic = ext.params.last().is_some_and(|p| p.variadic);
        let session = &mut self.prog.session;
        let fty = session.types.make_func(args, ret, variadic);
        session.register(fty);
        if session.scopes.lookup_local_var(root, &ext.name.node).is_some() {
            return fail(
                SemanticErrorKind::Redeclared(ext.name.node.clone()),
                ext.name.span,
            );
        }
        let v = session.scopes.define_var(root, &ext.name.node, fty);
        let var = session.scopes.var_mut(v);
        var.ext = true;
        var.constant = true;
        var.initialized = true;
        self.prog.externs.push(v);
        Ok(())
    }

    fn declare_impl(&mut self, root: ScopeId, block: ImplBlock) -> CompileResult<()> {
        let session = &mut self.prog.session;
        let decl = session.lower_type(root, &block.target)?;
        session.resolve(decl).map_err(|f| f.at(block.target.span))?;
        if matches!(session.types.shape(decl), Some(Shape::Polydef(_))) {
            return fail(SemanticErrorKind::MethodOnPlaceholder, block.target.span);
        }
        session.register(decl);
        for method in block.methods {
            let name = method.name.node.clone();
            let fid = self.declare_function(root, method, Some(decl))?;
            let session = &mut self.prog.session;
            session
                .methods
                .define_method(&session.types, decl, &name, fid, None);
        }
        Ok(())
    }

    pub(super) fn param_type(&mut self, scope: ScopeId, p: &Param) -> CompileResult<TypeId> {
        let session = &mut self.prog.session;
        let ty = session.resolve_type_expr(scope, &p.ty)?;
        if !p.variadic {
            return Ok(ty);
        }
        let arr = session.types.make_array(ty, false);
        session.register(arr);
        Ok(arr)
    }

    pub(super) fn define_param(
        &mut self,
        scope: ScopeId,
        p: &Param,
        ty: TypeId,
    ) -> CompileResult<VarId> {
        let session = &mut self.prog.session;
        if session.types.is_void(ty) {
            return fail(SemanticErrorKind::VoidVariable, p.span);
        }
        if session.scopes.lookup_local_var(scope, &p.name.node).is_some() {
            return fail(
                SemanticErrorKind::Redeclared(p.name.node.clone()),
                p.name.span,
            );
        }
        let v = session.scopes.define_var(scope, &p.name.node, ty);
        let borrowed = session.types.is_static_array(ty);
        let var = session.scopes.var_mut(v);
        var.initialized = true;
        var.borrowed = borrowed;
        Ok(v)
    }

    pub(super) fn return_type(&mut self, scope: ScopeId, def: &FunctionDef) -> CompileResult<TypeId> {
        let Some(r) = &def.ret else {
            return Ok(self.prog.session.builtins.void);
        };
        let ty = self.prog.session.resolve_type_expr(scope, r)?;
        if self.types().is_static_array(ty) {
            return fail(SemanticErrorKind::StaticArrayReturn, r.span);
        }
        Ok(ty)
    }

    fn check_main(&self, main: FnId) -> CompileResult<()> {
        let f = self.prog.function(main);
        if !f.params.is_empty() || f.generic {
            return fail(
                SemanticErrorKind::ArgCount {
                    name: "main".into(),
                    expected: 0,
                    got: f.params.len(),
                },
                f.def.name.span,
            );
        }
        if !self.types().is_void(f.ret) && !self.types().is_integer(f.ret) {
            return fail(
                SemanticErrorKind::ReturnMismatch {
                    expected: "int".into(),
                    got: self.show(f.ret),
                },
                f.def.name.span,
            );
        }
        Ok(())
    }

    // ─── Bodies ────────────────────────────────────────────────

    /// Check a non-generic function body. Generic bodies are only checked
    /// per polymorph.
    pub(super) fn check_function(&mut self, fid: FnId) -> CompileResult<()> {
        let f = self.prog.function(fid);
        if f.generic {
            return Ok(());
        }
        let (scope, ret, span) = (f.scope, f.ret, f.def.body.span);
        let idx = fid.0 as usize;
        let mut body = std::mem::replace(
            &mut self.prog.functions[idx].def.body,
            Block::new(Vec::new(), span),
        );
        self.check_fn_body(&mut body, scope, ret)?;
        self.prog.functions[idx].def.body = body;
        Ok(())
    }

    /// The body shares the function scope with the parameters.
    pub(super) fn check_fn_body(
        &mut self,
        body: &mut Block,
        scope: ScopeId,
        ret: TypeId,
    ) -> CompileResult<()> {
        let saved = (self.scope, self.ret);
        self.scope = scope;
        self.ret = Some(ret);
        body.scope = Some(scope);
        let result = self.check_stmts(&mut body.stmts);
        (self.scope, self.ret) = saved;
        result
    }

    fn check_block(&mut self, block: &mut Block, kind: ScopeKind) -> CompileResult<()> {
        let scope = self.prog.session.scopes.new_scope(Some(self.scope), kind);
        block.scope = Some(scope);
        let saved = self.scope;
        self.scope = scope;
        let result = self.check_stmts(&mut block.stmts);
        self.scope = saved;
        result
    }

    fn check_stmts(&mut self, stmts: &mut [Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    // ─── Statements ────────────────────────────────────────────

    pub(super) fn check_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Expr(e) => {
                self.check_expr(e, None)?;
                self.borrow(e);
            }
            StmtKind::Decl {
                name,
                ty,
                init,
                var,
            } => {
                *var = Some(self.check_decl(name, ty.as_ref(), init.as_mut())?);
            }
            StmtKind::Assign { target, value } => self.check_assign(target, value)?,
            StmtKind::Return(value) => self.check_return(value.as_mut(), span)?,
            StmtKind::Break => self.check_loop_exit("break", span)?,
            StmtKind::Continue => self.check_loop_exit("continue", span)?,
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.check_condition(cond)?;
                self.check_block(then_block, ScopeKind::Simple)?;
                if let Some(other) = else_branch {
                    self.check_stmt(other)?;
                }
            }
            StmtKind::While { cond, body } => {
                let scope = self
                    .prog
                    .session
                    .scopes
                    .new_scope(Some(self.scope), ScopeKind::Loop);
                body.scope = Some(scope);
                let saved = self.scope;
                self.scope = scope;
                let result = self
                    .check_condition(cond)
                    .and_then(|_| self.check_stmts(&mut body.stmts));
                self.scope = saved;
                result?;
            }
            StmtKind::For {
                index,
                item,
                iter,
                body,
                index_var,
                item_var,
            } => {
                let iter_ty = self.check_expr(iter, None)?;
                self.borrow(iter);
                let elem = match self.types().shape(iter_ty) {
                    Some(Shape::Array { inner, .. } | Shape::StaticArray { inner, .. }) => *inner,
                    _ => {
                        return fail(SemanticErrorKind::NotIterable(self.show(iter_ty)), iter.span)
                    }
                };
                let int = self.prog.session.builtins.int;
                let scopes = &mut self.prog.session.scopes;
                let scope = scopes.new_scope(Some(self.scope), ScopeKind::Loop);
                body.scope = Some(scope);
                if let Some(idx) = index {
                    let v = scopes.define_var(scope, &idx.node, int);
                    scopes.var_mut(v).initialized = true;
                    *index_var = Some(v);
                }
                let v = scopes.define_var(scope, &item.node, elem);
                scopes.var_mut(v).initialized = true;
                scopes.var_mut(v).borrowed = true;
                *item_var = Some(v);
                let saved = self.scope;
                self.scope = scope;
                let result = self.check_stmts(&mut body.stmts);
                self.scope = saved;
                result?;
            }
            StmtKind::Block(block) => self.check_block(block, ScopeKind::Simple)?,
            StmtKind::Fn { def, func } => {
                let fid = self.declare_function(self.scope, (**def).clone(), None)?;
                self.check_function(fid)?;
                *func = Some(fid);
            }
            StmtKind::TypeDecl(decl) => {
                self.prog.session.define_type(self.scope, decl)?;
            }
        }
        Ok(())
    }

    fn check_loop_exit(&self, word: &'static str, span: Span) -> CompileResult<()> {
        match self.prog.session.scopes.closest_loop_scope(self.scope) {
            Some(_) => Ok(()),
            None => fail(SemanticErrorKind::OutsideLoop(word), span),
        }
    }

    fn check_condition(&mut self, cond: &mut Expr) -> CompileResult<()> {
        let bool_ = self.prog.session.builtins.bool_;
        let ty = self.check_expr(cond, Some(bool_))?;
        if !self.types().is_bool(ty) {
            return fail(
                SemanticErrorKind::TypeMismatch {
                    expected: "bool".into(),
                    got: self.show(ty),
                },
                cond.span,
            );
        }
        Ok(())
    }

    fn check_decl(
        &mut self,
        name: &crate::span::Spanned<String>,
        ty: Option<&TypeExpr>,
        init: Option<&mut Expr>,
    ) -> CompileResult<VarId> {
        let declared = match ty {
            Some(te) => Some(self.prog.session.resolve_type_expr(self.scope, te)?),
            None => None,
        };
        let var_ty = match init {
            Some(e) => {
                let got = self.check_expr(e, declared)?;
                let var_ty = declared.unwrap_or(got);
                if self.types().is_polydef(var_ty) {
                    return fail(SemanticErrorKind::CannotInfer(name.node.clone()), e.span);
                }
                self.expect_assignable(var_ty, e)?;
                self.pass_value(e, var_ty)?;
                var_ty
            }
            None => match declared {
                Some(t) => t,
                None => return fail(SemanticErrorKind::CannotInfer(name.node.clone()), name.span),
            },
        };
        if self.types().is_void(var_ty) {
            return fail(SemanticErrorKind::VoidVariable, name.span);
        }
        let scopes = &mut self.prog.session.scopes;
        if scopes.lookup_local_var(self.scope, &name.node).is_some() {
            return fail(SemanticErrorKind::Redeclared(name.node.clone()), name.span);
        }
        Ok(scopes.define_var(self.scope, &name.node, var_ty))
    }

    fn check_assign(&mut self, target: &mut Expr, value: &mut Expr) -> CompileResult<()> {
        let target_ty = self.check_expr(target, None)?;
        let constant = match &target.kind {
            ExprKind::Ident { var: Some(v), .. } => {
                self.prog.session.scopes.var(*v).constant
            }
            _ => false,
        };
        if !target.is_lvalue() || constant {
            return fail(SemanticErrorKind::NotAssignable, target.span);
        }
        self.check_expr(value, Some(target_ty))?;
        self.expect_assignable(target_ty, value)?;
        let types = self.types();
        if types.is_static_array(target_ty) && types.is_dynamic(target_ty) {
            return fail(SemanticErrorKind::NotAssignable, target.span);
        }
        self.pass_value(value, target_ty)?;
        if self.types().is_dynamic(target_ty) {
            // Receives the previous value, released at scope exit.
            self.prog
                .session
                .scopes
                .make_temp_var(self.scope, target_ty, value.id);
        }
        Ok(())
    }

    fn check_return(&mut self, value: Option<&mut Expr>, span: Span) -> CompileResult<()> {
        let ret = self.ret.unwrap_or(self.prog.session.builtins.void);
        match value {
            Some(e) => {
                let got = self.check_expr(e, Some(ret))?;
                if self.types().is_void(ret) || !self.assignable(ret, got) {
                    return fail(
                        SemanticErrorKind::ReturnMismatch {
                            expected: self.show(ret),
                            got: self.show(got),
                        },
                        e.span,
                    );
                }
                self.pass_value(e, ret)?;
            }
            None => {
                if !self.types().is_void(ret) {
                    return fail(SemanticErrorKind::MissingReturnValue(self.show(ret)), span);
                }
            }
        }
        self.prog.session.scopes.get_mut(self.scope).has_return = true;
        Ok(())
    }

    // ─── Ownership planning ────────────────────────────────────

    pub(super) fn assignable(&self, target: TypeId, value: TypeId) -> bool {
        let types = self.types();
        if types.check_type(target, value) || self.prog.session.is_any(target) {
            return true;
        }
        if types.is_ptr(target) && types.is_ref(value) {
            return true;
        }
        match (types.shape(target), types.shape(value)) {
            (Some(Shape::Array { inner: a, .. }), Some(Shape::StaticArray { inner: b, .. })) => {
                types.check_type(*a, *b)
            }
            // An owner may be lent out as a borrow, never the reverse.
            (
                Some(Shape::Ref {
                    inner: a,
                    owned: false,
                }),
                Some(Shape::Ref {
                    inner: b,
                    owned: true,
                }),
            )
            | (
                Some(Shape::Array {
                    inner: a,
                    owned: false,
                }),
                Some(Shape::Array {
                    inner: b,
                    owned: true,
                }),
            ) => types.check_type(*a, *b),
            _ => false,
        }
    }

    pub(super) fn expect_assignable(&self, target: TypeId, value: &Expr) -> CompileResult<()> {
        let got = value.ty.unwrap_or(target);
        if self.assignable(target, got) {
            return Ok(());
        }
        fail(
            SemanticErrorKind::TypeMismatch {
                expected: self.show(target),
                got: self.show(got),
            },
            value.span,
        )
    }

    /// A dynamic value produced by this expression that nothing owns yet.
    fn is_fresh(&self, expr: &Expr) -> bool {
        let Some(ty) = expr.ty else {
            return false;
        };
        !expr.needs_temp
            && !expr.is_lvalue()
            && self.types().is_dynamic(ty)
            && matches!(
                expr.kind,
                ExprKind::Call { .. }
                    | ExprKind::Binary { .. }
                    | ExprKind::Slice { .. }
                    | ExprKind::StructLit { .. }
                    | ExprKind::Str(_)
                    | ExprKind::New { .. }
                    | ExprKind::Dot {
                        access: Access::EnumName(_),
                        ..
                    }
            )
    }

    /// Borrowing position: a fresh value is parked in a temporary so the
    /// enclosing scope releases it.
    pub(super) fn borrow(&mut self, expr: &mut Expr) {
        if self.is_fresh(expr) {
            self.make_temp(expr);
        }
    }

    pub(super) fn make_temp(&mut self, expr: &mut Expr) {
        let Some(ty) = expr.ty else {
            return;
        };
        expr.needs_temp = true;
        self.prog.session.scopes.make_temp_var(self.scope, ty, expr.id);
    }

    /// Consuming position: the destination takes ownership. Lvalues are
    /// copied by the generator; owned references cannot be.
    pub(super) fn pass_value(&mut self, expr: &mut Expr, target: TypeId) -> CompileResult<()> {
        let ty = expr.ty.unwrap_or(target);
        if self.prog.session.is_any(target) && !self.prog.session.is_any(ty) {
            if !expr.is_lvalue() {
                self.make_temp(expr);
            }
            return Ok(());
        }
        if expr.is_lvalue() && self.types().is_owned_ref(target) {
            return fail(SemanticErrorKind::OwnedRefCopy(self.show(target)), expr.span);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::CompileError;
    use crate::parser::parse_source;
    use crate::semantic::analyze;
    use crate::span::FileId;

    pub(crate) fn check(src: &str) -> CompileResult<Program> {
        let (module, _) = parse_source(src, FileId(0), 0)?;
        analyze(vec![PackageUnit {
            name: "main".into(),
            module,
        }])
    }

    pub(crate) fn check_err(src: &str) -> SemanticErrorKind {
        match check(src) {
            Err(CompileError::Semantic(e)) => e.kind,
            Err(other) => panic!("expected a semantic error, got {other}"),
            Ok(_) => panic!("expected a semantic error"),
        }
    }

    #[test]
    fn minimal_program_checks() {
        let prog = check("fn main() int { return 0; }").unwrap();
        assert!(prog.main.is_some());
        assert_eq!(prog.functions.len(), 1);
    }

    #[test]
    fn missing_main_is_reported() {
        assert_eq!(check_err("fn helper() {}"), SemanticErrorKind::NoMain);
    }

    #[test]
    fn unknown_identifier() {
        assert_eq!(
            check_err("fn main() { x = 1; }"),
            SemanticErrorKind::UnknownIdentifier("x".into())
        );
    }

    #[test]
    fn declaration_type_mismatch() {
        let kind = check_err("fn main() { x int = \"hello\"; }");
        assert_eq!(
            kind,
            SemanticErrorKind::TypeMismatch {
                expected: "int".into(),
                got: "string".into()
            }
        );
    }

    #[test]
    fn redeclaration_in_same_scope() {
        assert_eq!(
            check_err("fn main() { x := 1; x := 2; }"),
            SemanticErrorKind::Redeclared("x".into())
        );
        check("fn main() { x := 1; { x := \"shadow\"; } }").unwrap();
    }

    #[test]
    fn break_outside_loop() {
        assert_eq!(
            check_err("fn main() { break; }"),
            SemanticErrorKind::OutsideLoop("break")
        );
        check("fn main() { while true { if true { break; } } }").unwrap();
    }

    #[test]
    fn nested_functions_cannot_see_outer_locals() {
        let kind = check_err(
            "fn main() {
                secret := 42;
                fn peek() int { return secret; }
            }",
        );
        assert_eq!(kind, SemanticErrorKind::UnknownIdentifier("secret".into()));
        check(
            "fn helper() int { return 1; }
             fn main() { fn inner() int { return helper(); } }",
        )
        .unwrap();
    }

    #[test]
    fn return_checks() {
        assert_eq!(
            check_err("fn f() int { return; } fn main() {}"),
            SemanticErrorKind::MissingReturnValue("int".into())
        );
        assert_eq!(
            check_err("fn f() { return 1; } fn main() {}"),
            SemanticErrorKind::ReturnMismatch {
                expected: "void".into(),
                got: "int".into()
            }
        );
    }

    #[test]
    fn owned_reference_cannot_be_copied() {
        let kind = check_err(
            "type Node struct { v int }
             fn main() { a := new Node; b := a; }",
        );
        assert!(matches!(kind, SemanticErrorKind::OwnedRefCopy(_)));
    }

    #[test]
    fn owners_can_be_lent_as_borrows() {
        check(
            "type Foo struct { n int }
             fn peek(f &Foo) int { return f.n; }
             fn main() int { p := new Foo; return peek(p); }",
        )
        .unwrap();
    }

    #[test]
    fn borrows_cannot_become_owners() {
        let kind = check_err(
            "type Foo struct { n int }
             fn keep(f 'Foo) {}
             fn main() { x := Foo{n: 1}; keep(&x); }",
        );
        assert!(matches!(kind, SemanticErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn reassigning_dynamic_values_plans_swap_temps() {
        let prog = check(
            "fn main() {
                s := \"a\";
                s = \"b\";
                s = \"c\";
            }",
        )
        .unwrap();
        let main = prog.function(prog.main.unwrap());
        let temps = &prog.session.scopes.get(main.scope).temp_vars;
        assert_eq!(temps.len(), 2);
    }

    #[test]
    fn static_arrays_cannot_be_returned() {
        assert_eq!(
            check_err("fn f() [3]int { x [3]int; return x; } fn main() {}"),
            SemanticErrorKind::StaticArrayReturn
        );
    }

    #[test]
    fn globals_are_visible_in_functions() {
        check(
            "counter := 10;
             fn main() int { return counter; }",
        )
        .unwrap();
    }

    #[test]
    fn packages_resolve_qualified_names() {
        let (lib, _) = parse_source(
            "type Point struct { x int; y int }
             fn origin() Point { return Point{x: 0, y: 0}; }",
            FileId(0),
            0,
        )
        .unwrap();
        let (main, _) = parse_source(
            "use geo;
             fn main() int { p geo.Point = geo.origin(); return p.x; }",
            FileId(1),
            1000,
        )
        .unwrap();
        let prog = analyze(vec![
            PackageUnit {
                name: "geo".into(),
                module: lib,
            },
            PackageUnit {
                name: "main".into(),
                module: main,
            },
        ])
        .unwrap();
        assert_eq!(prog.functions.len(), 2);
    }

    #[test]
    fn unknown_package_is_reported() {
        assert_eq!(
            check_err("use nowhere; fn main() {}"),
            SemanticErrorKind::UnknownPackage("nowhere".into())
        );
    }
}
