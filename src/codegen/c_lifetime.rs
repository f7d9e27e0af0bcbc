/// Copy and release of dynamic values: strings, owned references and the
/// structs and static arrays that contain them.
use crate::semantic::ids::{ScopeId, TypeId};
use crate::semantic::scope::ScopeKind;
use crate::semantic::types::Shape;

use super::c_mangle::{struct_copy_name, struct_free_name, temp_name, var_name};
use super::c_types::{c_type, declare};
use super::{CResult, CodegenContext};

impl CodegenContext<'_> {
    /// Expression producing an independent copy of `value`.
    pub fn copy_value(&self, value: &str, ty: TypeId) -> String {
        if !self.types.is_dynamic(ty) {
            return value.to_string();
        }
        if self.types.is_string(ty) {
            format!("copy_string({value})")
        } else if self.types.is_struct(ty) {
            format!("{}({value})", struct_copy_name(self.types.emit_id(ty)))
        } else {
            value.to_string()
        }
    }

    /// Replace the storage reachable from `place` with fresh copies.
    pub fn copy_in_place(&self, place: &str, ty: TypeId, depth: usize) -> CResult<Vec<String>> {
        if !self.types.is_dynamic(ty) {
            return Ok(Vec::new());
        }
        let mut lines = Vec::new();
        match self.types.shape(ty) {
            Some(Shape::Struct(_)) => {
                let copy = struct_copy_name(self.types.emit_id(ty));
                lines.push(format!("{place} = {copy}({place});"));
            }
            Some(Shape::StaticArray { inner, length }) => {
                let i = format!("_i{depth}");
                lines.push(format!("for (long {i} = 0; {i} < {length}; {i}++) {{"));
                lines.extend(self.copy_in_place(&format!("{place}[{i}]"), *inner, depth + 1)?);
                lines.push("}".to_string());
            }
            Some(Shape::Ref { inner, .. }) => {
                let p = format!("_p{depth}");
                let inner_c = c_type(self.types, *inner)?;
                lines.push(format!("if ({place} != NULL) {{"));
                lines.push(format!("{} = malloc(sizeof({inner_c}));", declare(self.types, ty, &p)?));
                lines.push(format!("memcpy({p}, {place}, sizeof({inner_c}));"));
                lines.extend(self.copy_in_place(&format!("(*{p})"), *inner, depth + 1)?);
                lines.push(format!("{place} = {p};"));
                lines.push("}".to_string());
            }
            _ => lines.push(format!("{place} = copy_string({place});")),
        }
        Ok(lines)
    }

    /// Release the storage reachable from `place`.
    pub fn free_in_place(&self, place: &str, ty: TypeId, depth: usize) -> CResult<Vec<String>> {
        if !self.types.is_dynamic(ty) {
            return Ok(Vec::new());
        }
        let mut lines = Vec::new();
        match self.types.shape(ty) {
            Some(Shape::Struct(_)) => {
                let free = struct_free_name(self.types.emit_id(ty));
                lines.push(format!("{free}(&{place});"));
            }
            Some(Shape::StaticArray { inner, length }) => {
                let i = format!("_i{depth}");
                lines.push(format!("for (long {i} = 0; {i} < {length}; {i}++) {{"));
                lines.extend(self.free_in_place(&format!("{place}[{i}]"), *inner, depth + 1)?);
                lines.push("}".to_string());
            }
            Some(Shape::Ref { inner, .. }) => {
                lines.push(format!("if ({place} != NULL) {{"));
                lines.extend(self.free_in_place(&format!("(*{place})"), *inner, depth + 1)?);
                lines.push(format!("free({place});"));
                lines.push("}".to_string());
            }
            _ => {
                lines.push(format!("if ({place}.bytes != NULL) {{"));
                lines.push(format!("free({place}.bytes);"));
                lines.push("}".to_string());
            }
        }
        Ok(lines)
    }

    /// Releases for the live dynamic variables of `scope`, in declaration
    /// order. Borrowed, foreign and constant variables are skipped, as is
    /// a local being moved out by a return.
    pub fn free_scope(&self, scope: ScopeId) -> CResult<Vec<String>> {
        let mut lines = Vec::new();
        for &v in &self.scopes.get(scope).vars {
            let var = self.scopes.var(v);
            if var.borrowed
                || var.ext
                || var.constant
                || self.moved == Some(v)
                || !self.is_initialized(v)
                || !self.types.is_dynamic(var.ty)
            {
                continue;
            }
            let name = if var.temp { temp_name(v) } else { var_name(v) };
            lines.extend(self.free_in_place(&name, var.ty, 0)?);
        }
        Ok(lines)
    }

    /// Releases for every scope from the current one out to the nearest
    /// scope of `kind`, inclusive.
    pub fn free_until(&self, kind: ScopeKind) -> CResult<Vec<String>> {
        let mut lines = Vec::new();
        let mut current = Some(self.scope);
        while let Some(s) = current {
            lines.extend(self.free_scope(s)?);
            let sc = self.scopes.get(s);
            if sc.kind == kind || sc.kind == ScopeKind::Root {
                break;
            }
            current = sc.parent;
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::tests::compile_to_c;

    #[test]
    fn scope_exit_releases_in_declaration_order() {
        let c_code = compile_to_c(
            "fn main() {
                first := \"a\";
                second := \"b\";
             }",
        );
        let a = c_code.find("init_string(\"a\", 1)").unwrap();
        let rest = &c_code[a..];
        let ids: Vec<u32> = rest
            .lines()
            .filter(|l| l.trim_start().starts_with("free(_vs_"))
            .map(|l| {
                let start = l.find("_vs_").unwrap() + 4;
                let digits: String = l[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap()
            })
            .collect();
        assert_eq!(ids.len(), 2);
        // `first` was declared before `second`, so it is released first.
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn swap_temporaries_follow_the_variable_they_replaced() {
        let c_code = compile_to_c(
            "fn main() {
                s := \"abc\";
                s = \"x\";
                s = \"y\";
             }",
        );
        let y = c_code.find("init_string(\"y\", 1)").unwrap();
        let frees: Vec<&str> = c_code[y..]
            .lines()
            .map(str::trim_start)
            .filter(|l| l.starts_with("free("))
            .collect();
        assert_eq!(frees.len(), 3);
        assert!(frees[0].starts_with("free(_vs_"));
        assert!(frees[1].starts_with("free(_tmp"));
        assert!(frees[2].starts_with("free(_tmp"));
    }

    #[test]
    fn owned_references_are_released_recursively() {
        let c_code = compile_to_c(
            "type Box struct { label string }
             fn main() { b := new Box; }",
        );
        assert!(c_code.contains("_init_"));
        assert!(c_code.contains("(&(*_vs_"));
        assert!(c_code.contains("free(_vs_"));
    }

    #[test]
    fn static_arrays_of_strings_loop_over_elements() {
        let c_code = compile_to_c("fn main() { xs [2]string = [\"a\", \"b\"]; }");
        assert!(c_code.contains("for (long _i0 = 0; _i0 < 2; _i0++) {"));
        assert!(c_code.contains("[_i0].bytes != NULL"));
    }

    #[test]
    fn loop_items_are_borrowed() {
        let c_code = compile_to_c(
            "fn main() {
                xs [2]string = [\"a\", \"b\"];
                for x in xs { println(x); }
             }",
        );
        let body = c_code.find("for (long _i").unwrap();
        let body = &c_code[body..];
        let end = body.find("\n    }\n").unwrap_or(body.len());
        assert!(!body[..end].contains("free("));
    }
}
