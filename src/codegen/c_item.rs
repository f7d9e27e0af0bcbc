/// Item codegen: struct layouts and their helpers, function signatures and
/// bodies, externs, globals and the C entry point.
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::errors::InternalError;
use crate::parser::ast::{Block, StmtKind};
use crate::semantic::ids::{TypeId, VarId};
use crate::semantic::types::Shape;

use super::c_emitter::CEmitter;
use super::c_mangle::{
    ext_name, member_name, poly_name, struct_copy_name, struct_free_name, struct_init_name,
    struct_name, temp_name, var_name,
};
use super::c_types::{declare, param_list};
use super::{CResult, CodegenContext};

impl CodegenContext<'_> {
    // ─── Structs ───────────────────────────────────────────────

    /// Emittable structs with every struct held by value defined before
    /// the structs that contain it.
    pub fn struct_order(&self) -> Vec<TypeId> {
        let mut done = FxHashSet::default();
        let mut order = Vec::new();
        for ty in self.type_info_order() {
            if self.types.is_struct(ty) {
                self.visit_struct(ty, &mut done, &mut order);
            }
        }
        order
    }

    fn visit_struct(&self, ty: TypeId, done: &mut FxHashSet<u32>, order: &mut Vec<TypeId>) {
        if !done.insert(self.types.emit_id(ty)) {
            return;
        }
        if let Some(Shape::Struct(st)) = self.types.shape(ty) {
            for (_, member) in &st.members {
                if let Some(dep) = self.by_value_struct(*member) {
                    self.visit_struct(dep, done, order);
                }
            }
        }
        order.push(self.types.follow(ty));
    }

    /// Struct stored inline in a value of `ty`, looking through static
    /// arrays.
    fn by_value_struct(&self, mut ty: TypeId) -> Option<TypeId> {
        while let Some(Shape::StaticArray { inner, .. }) = self.types.shape(ty) {
            ty = *inner;
        }
        self.types.is_struct(ty).then_some(ty)
    }

    pub fn emit_struct_tags(&self, structs: &[TypeId], e: &mut CEmitter) {
        for &ty in structs {
            e.emit_line(&format!("{};", struct_name(self.types.emit_id(ty))));
        }
        if !structs.is_empty() {
            e.blank_line();
        }
    }

    pub fn emit_struct_definitions(&self, structs: &[TypeId], e: &mut CEmitter) -> CResult<()> {
        for &ty in structs {
            self.emit_struct_def(ty, e)?;
        }
        for &ty in structs {
            let id = self.types.emit_id(ty);
            let st = struct_name(id);
            e.emit_line(&format!("static {st} *{}({st} *x);", struct_init_name(id)));
            if self.types.is_dynamic(ty) {
                e.emit_line(&format!("static {st} {}({st} x);", struct_copy_name(id)));
                e.emit_line(&format!("static void {}({st} *x);", struct_free_name(id)));
            }
        }
        if !structs.is_empty() {
            e.blank_line();
        }
        for &ty in structs {
            self.emit_struct_helpers(ty, e)?;
        }
        Ok(())
    }

    fn emit_struct_def(&self, ty: TypeId, e: &mut CEmitter) -> CResult<()> {
        let st = self.types.struct_shape(ty)?;
        e.open(&format!("{} {{", struct_name(self.types.emit_id(ty))));
        if st.members.is_empty() {
            e.emit_line("char _empty;");
        }
        for (name, member) in &st.members {
            e.emit_line(&format!("{};", declare(self.types, *member, &member_name(name))?));
        }
        e.dedent();
        e.emit_line("};");
        e.blank_line();
        Ok(())
    }

    fn emit_struct_helpers(&self, ty: TypeId, e: &mut CEmitter) -> CResult<()> {
        let id = self.types.emit_id(ty);
        let st = struct_name(id);
        e.emit_lines(&[
            format!("static {st} *{}({st} *x) {{", struct_init_name(id)),
            "if (x == NULL) {".to_string(),
            format!("x = malloc(sizeof({st}));"),
            "}".to_string(),
            format!("memset(x, 0, sizeof({st}));"),
            "return x;".to_string(),
            "}".to_string(),
        ]);
        e.blank_line();
        if !self.types.is_dynamic(ty) {
            return Ok(());
        }

        let members = self.types.struct_shape(ty)?.members.clone();
        e.open(&format!("static {st} {}({st} x) {{", struct_copy_name(id)));
        for (name, member) in &members {
            let lines = self.copy_in_place(&format!("x.{}", member_name(name)), *member, 0)?;
            e.emit_lines(&lines);
        }
        e.emit_line("return x;");
        e.close();
        e.blank_line();

        e.open(&format!("static void {}({st} *x) {{", struct_free_name(id)));
        for (name, member) in &members {
            let lines = self.free_in_place(&format!("x->{}", member_name(name)), *member, 0)?;
            e.emit_lines(&lines);
        }
        e.close();
        e.blank_line();
        Ok(())
    }

    // ─── Functions ─────────────────────────────────────────────

    fn signature(&self, name: &str, params: &[VarId], ret: TypeId) -> CResult<String> {
        let list = if params.is_empty() {
            "void".to_string()
        } else {
            params
                .iter()
                .map(|&p| declare(self.types, self.scopes.var(p).ty, &var_name(p)))
                .collect::<CResult<Vec<_>>>()?
                .join(", ")
        };
        declare(self.types, ret, &format!("{name}({list})"))
    }

    pub fn emit_function_prototypes(&self, e: &mut CEmitter) -> CResult<()> {
        for f in self.prog.functions.iter().filter(|f| !f.generic) {
            e.emit_line(&format!("{};", self.signature(&var_name(f.var), &f.params, f.ret)?));
        }
        for p in &self.prog.polymorphs {
            let name = poly_name(p.id, self.prog.function(p.func).var);
            e.emit_line(&format!("{};", self.signature(&name, &p.params, p.ret)?));
        }
        e.blank_line();
        Ok(())
    }

    pub fn emit_function_definitions(&mut self, e: &mut CEmitter) -> CResult<()> {
        let prog = self.prog;
        for f in prog.functions.iter().filter(|f| !f.generic) {
            trace!(function = %f.name, "emitting function");
            let label = if f.name.is_empty() { "fn literal" } else { f.name.as_str() };
            self.emit_function(label, &var_name(f.var), &f.params, f.ret, &f.def.body, e)?;
        }
        for p in &prog.polymorphs {
            let f = prog.function(p.func);
            trace!(function = %f.name, poly = p.id.0, "emitting polymorph");
            let name = poly_name(p.id, f.var);
            self.emit_function(&f.name, &name, &p.params, p.ret, &p.body, e)?;
        }
        Ok(())
    }

    fn emit_function(
        &mut self,
        label: &str,
        name: &str,
        params: &[VarId],
        ret: TypeId,
        body: &Block,
        e: &mut CEmitter,
    ) -> CResult<()> {
        e.comment(label);
        e.open(&format!("{} {{", self.signature(name, params, ret)?));
        self.ret = ret;
        self.emit_scope_body(body, e)?;
        e.close();
        e.blank_line();
        Ok(())
    }

    // ─── Externs and globals ───────────────────────────────────

    /// Foreign functions are reached through `_vs_` pointers so they share
    /// the calling path of every other function value.
    pub fn emit_externs(&self, e: &mut CEmitter) -> CResult<()> {
        for &v in &self.prog.externs {
            let var = self.scopes.var(v);
            let (args, ret, _) = self.types.func_shape(var.ty)?;
            let proto = format!("{}({})", var.name, param_list(self.types, args)?);
            e.emit_line(&format!("extern {};", declare(self.types, ret, &proto)?));
            e.emit_line(&format!(
                "{} = {};",
                declare(self.types, var.ty, &ext_name(&var.name))?,
                var.name
            ));
        }
        if !self.prog.externs.is_empty() {
            e.blank_line();
        }
        Ok(())
    }

    fn global_var(&self, index: usize) -> CResult<Option<VarId>> {
        match &self.prog.globals[index].stmt.kind {
            StmtKind::Decl { var: Some(v), .. } => Ok(Some(*v)),
            StmtKind::Decl { name, .. } => Err(InternalError::new(format!(
                "unchecked global '{}'",
                name.node
            ))),
            _ => Ok(None),
        }
    }

    pub fn emit_global_storage(&self, e: &mut CEmitter) -> CResult<()> {
        for i in 0..self.prog.globals.len() {
            if let Some(v) = self.global_var(i)? {
                let ty = self.scopes.var(v).ty;
                e.emit_line(&format!("{};", declare(self.types, ty, &var_name(v))?));
            }
        }
        if !self.prog.globals.is_empty() {
            e.blank_line();
        }
        Ok(())
    }

    /// Initializers run in declaration order; their temporaries are
    /// released afterwards, the globals themselves never are.
    pub fn emit_globals_init(&mut self, e: &mut CEmitter) -> CResult<()> {
        let prog = self.prog;
        let mut roots = Vec::new();
        for g in &prog.globals {
            if !roots.contains(&g.scope) {
                roots.push(g.scope);
            }
        }

        e.open("void _vs_init_globals(void) {");
        for &root in &roots {
            self.emit_temp_decls(root, e)?;
        }
        for (i, g) in prog.globals.iter().enumerate() {
            self.scope = g.scope;
            let StmtKind::Decl { init: Some(value), .. } = &g.stmt.kind else {
                continue;
            };
            let Some(v) = self.global_var(i)? else {
                continue;
            };
            let ty = self.scopes.var(v).ty;
            let name = var_name(v);
            if self.types.is_static_array(ty) {
                self.emit_static_store(&name, ty, value, e)?;
            } else {
                let owned = self.gen_owned(value, ty)?;
                e.emit_line(&format!("{name} = {owned};"));
            }
            self.mark_initialized(v);
        }
        for &root in &roots {
            let scopes = self.scopes;
            for t in &scopes.get(root).temp_vars {
                let ty = scopes.var(t.var).ty;
                if self.is_initialized(t.var) {
                    e.emit_lines(&self.free_in_place(&temp_name(t.var), ty, 0)?);
                }
            }
        }
        e.close();
        e.blank_line();
        self.scope = self.scopes.builtins();
        Ok(())
    }

    pub fn emit_entry(&self, e: &mut CEmitter) -> CResult<()> {
        let main = self
            .prog
            .main
            .ok_or_else(|| InternalError::new("program has no entry point"))?;
        let f = self.prog.function(main);
        e.open("int main(void) {");
        e.emit_line("_vs_init_types();");
        e.emit_line("_vs_init_globals();");
        if self.types.is_void(f.ret) {
            e.emit_line(&format!("{}();", var_name(f.var)));
            e.emit_line("return 0;");
        } else {
            e.emit_line(&format!("return (int){}();", var_name(f.var)));
        }
        e.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::tests::compile_to_c;

    #[test]
    fn contained_structs_are_defined_first() {
        let c_code = compile_to_c(
            "type Outer struct { inner Inner; tag int }
             type Inner struct { v int }
             fn main() { o := Outer{tag: 1}; }",
        );
        let inner = c_code.find("    int64_t v;").unwrap();
        let outer = c_code.find("    int64_t tag;").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn plain_structs_have_no_copy_helper() {
        let c_code = compile_to_c(
            "type Pair struct { a int; b int }
             fn main() { p := Pair{a: 1, b: 2}; }",
        );
        let def = c_code.find("    int64_t a;").unwrap();
        let rest = &c_code[def..];
        let close = rest.find("};").unwrap();
        let tag_line = c_code[..def].lines().last().unwrap();
        let tag = tag_line.trim_end_matches(" {");
        let id = tag.trim_start_matches("struct _type_vs_");
        assert!(rest[close..].contains(&format!("_init_{id}(")));
        assert!(!c_code.contains(&format!("_copy_{id}(")));
    }

    #[test]
    fn globals_are_initialised_before_main_runs() {
        let c_code = compile_to_c(
            "greeting := \"hi\";
             counter int = 3;
             fn main() int { return counter; }",
        );
        let init = c_code.find("void _vs_init_globals(void) {").unwrap();
        let rest = &c_code[init..];
        assert!(rest.contains(" = init_string(\"hi\", 2);"));
        assert!(rest.contains(" = 3LL;"));
        let end = rest.find("\n}\n").unwrap();
        assert!(!rest[..end].contains("free("));
        assert!(c_code.contains("struct string_type _vs_"));
    }

    #[test]
    fn externs_are_bound_to_function_pointers() {
        let c_code = compile_to_c(
            "extern fn abs(n s32) s32;
             fn main() int { return abs(-3) as int; }",
        );
        assert!(c_code.contains("extern int32_t abs(int32_t);"));
        assert!(c_code.contains("int32_t (*_vs_abs)(int32_t) = abs;"));
        assert!(c_code.contains("_vs_abs((-3L))"));
    }

    #[test]
    fn void_main_returns_zero() {
        let c_code = compile_to_c("fn main() {}");
        let entry = c_code.find("int main(void) {").unwrap();
        assert!(c_code[entry..].contains("return 0;"));
    }
}
