/// Runtime type descriptors (`_type_info<N>`) backing `#type` and `Any`.
///
/// Every emitted type gets one descriptor whose C type is the reflection
/// struct matching its kind (`NumType`, `RefType`, `StructType`, ...). All
/// reflection structs begin with `id`, `base` and `name`, so any
/// descriptor can be viewed through a `Type` pointer.
use rustc_hash::FxHashSet;

use crate::semantic::ids::TypeId;
use crate::semantic::types::{BaseKind, Shape};

use super::c_emitter::CEmitter;
use super::c_mangle::{c_string_body, member_name, struct_name, type_info_name};
use super::c_types::int_suffix;
use super::{CResult, CodegenContext};

pub const BASE_INT: i64 = 1;
pub const BASE_BOOL: i64 = 2;
pub const BASE_FLOAT: i64 = 3;
pub const BASE_VOID: i64 = 4;
pub const BASE_ANY: i64 = 5;
pub const BASE_STRING: i64 = 6;
pub const BASE_ARRAY: i64 = 7;
pub const BASE_FN: i64 = 8;
pub const BASE_ENUM: i64 = 9;
pub const BASE_REF: i64 = 10;
pub const BASE_STRUCT: i64 = 11;
pub const BASE_PTR: i64 = 12;

/// `(struct string_type){n, "text"}` over static bytes; never released.
fn static_string(text: &str) -> String {
    format!("(struct string_type){{{}, \"{}\"}}", text.len(), c_string_body(text))
}

impl CodegenContext<'_> {
    /// Canonical emittable types reachable from the registry, one per
    /// emission id.
    pub fn type_info_order(&self) -> Vec<TypeId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for &ty in &self.prog.session.registry {
            self.collect_emittable(ty, &mut seen, &mut out);
        }
        out
    }

    fn collect_emittable(&self, ty: TypeId, seen: &mut FxHashSet<u32>, out: &mut Vec<TypeId>) {
        let canon = self.types.follow(ty);
        if !self.is_emittable(canon) || !seen.insert(self.types.emit_id(canon)) {
            return;
        }
        out.push(canon);
        let children: Vec<TypeId> = match self.types.shape(canon) {
            Some(
                Shape::Ref { inner, .. }
                | Shape::Array { inner, .. }
                | Shape::StaticArray { inner, .. }
                | Shape::Enum { inner, .. },
            ) => vec![*inner],
            Some(Shape::Struct(st)) => st.members.iter().map(|(_, m)| *m).collect(),
            Some(Shape::Func { args, ret, .. }) => {
                let mut all = args.clone();
                all.push(*ret);
                all
            }
            _ => Vec::new(),
        };
        for child in children {
            self.collect_emittable(child, seen, out);
        }
    }

    /// Concrete types with a C representation.
    pub fn is_emittable(&self, ty: TypeId) -> bool {
        match self.types.shape(ty) {
            None | Some(Shape::Params { .. } | Shape::Polydef(_) | Shape::External { .. }) => false,
            Some(_) => !self.types.is_polydef(ty) && !self.types.contains_generic_struct(ty),
        }
    }

    fn base_code(&self, ty: TypeId) -> i64 {
        if self.prog.session.is_any(ty) {
            return BASE_ANY;
        }
        match self.types.shape(ty) {
            Some(Shape::Basic { base, .. }) => match base {
                BaseKind::Int | BaseKind::Uint => BASE_INT,
                BaseKind::Float => BASE_FLOAT,
                BaseKind::Bool => BASE_BOOL,
                BaseKind::String => BASE_STRING,
                BaseKind::Void => BASE_VOID,
                BaseKind::Ptr => BASE_PTR,
            },
            Some(Shape::Ref { .. }) => BASE_REF,
            Some(Shape::Array { .. } | Shape::StaticArray { .. }) => BASE_ARRAY,
            Some(Shape::Struct(_)) => BASE_STRUCT,
            Some(Shape::Enum { .. }) => BASE_ENUM,
            Some(Shape::Func { .. }) => BASE_FN,
            _ => BASE_VOID,
        }
    }

    /// Reflection struct describing `ty`.
    fn descriptor_struct(&self, ty: TypeId) -> TypeId {
        let b = &self.prog.session.builtins;
        if self.prog.session.is_any(ty) {
            return b.type_;
        }
        match self.types.shape(ty) {
            Some(Shape::Basic {
                base: BaseKind::Int | BaseKind::Uint | BaseKind::Float,
                ..
            }) => b.num_type,
            Some(Shape::Ref { .. }) => b.ref_type,
            Some(Shape::Array { .. } | Shape::StaticArray { .. }) => b.array_type,
            Some(Shape::Struct(_)) => b.struct_type,
            Some(Shape::Enum { .. }) => b.enum_type,
            Some(Shape::Func { .. }) => b.fn_type,
            _ => b.type_,
        }
    }

    fn descriptor_c_type(&self, ty: TypeId) -> String {
        struct_name(self.types.emit_id(self.descriptor_struct(ty)))
    }

    /// `&Type` view of the descriptor of `ty`.
    pub fn type_info_ref(&self, ty: TypeId) -> String {
        let type_struct = struct_name(self.types.emit_id(self.prog.session.builtins.type_));
        format!(
            "({type_struct} *)&{}",
            type_info_name(self.types.emit_id(ty))
        )
    }

    pub fn emit_type_info_declarations(&self, infos: &[TypeId], e: &mut CEmitter) -> CResult<()> {
        for &ty in infos {
            e.emit_line(&format!(
                "extern {} {};",
                self.descriptor_c_type(ty),
                type_info_name(self.types.emit_id(ty))
            ));
        }
        e.blank_line();
        Ok(())
    }

    /// Descriptor storage followed by `_vs_init_types`, which fills it.
    pub fn emit_type_info_init(&self, infos: &[TypeId], e: &mut CEmitter) -> CResult<()> {
        let mut body = Vec::new();
        for &ty in infos {
            let d = type_info_name(self.types.emit_id(ty));
            e.emit_line(&format!("{} {d};", self.descriptor_c_type(ty)));
            for storage in self.descriptor_storage(ty, &d) {
                e.emit_line(&storage);
            }
            body.extend(self.descriptor_fields(ty, &d));
        }
        e.blank_line();
        e.open("void _vs_init_types(void) {");
        e.emit_lines(&body);
        e.close();
        e.blank_line();
        Ok(())
    }

    /// Backing arrays for the slices inside a descriptor.
    fn descriptor_storage(&self, ty: TypeId, d: &str) -> Vec<String> {
        let b = &self.prog.session.builtins;
        let type_ptr = format!("{} *", struct_name(self.types.emit_id(b.type_)));
        match self.types.shape(ty) {
            Some(Shape::Struct(st)) if !st.members.is_empty() => {
                let member = struct_name(self.types.emit_id(b.struct_member));
                vec![format!("{member} {d}_members[{}];", st.members.len())]
            }
            Some(Shape::Enum { members, .. }) if !members.is_empty() => {
                let n = members.len();
                vec![
                    format!("struct string_type {d}_names[{n}];"),
                    format!("int64_t {d}_values[{n}];"),
                ]
            }
            Some(Shape::Func { args, .. }) if !args.is_empty() => {
                vec![format!("{type_ptr}{d}_args[{}];", args.len())]
            }
            _ => Vec::new(),
        }
    }

    fn descriptor_fields(&self, ty: TypeId, d: &str) -> Vec<String> {
        let mut lines = vec![
            format!("{d}.id = {};", self.types.emit_id(ty)),
            format!("{d}.base = {};", self.base_code(ty)),
            format!("{d}.name = {};", static_string(&self.types.type_to_string(ty))),
        ];
        if self.prog.session.is_any(ty) {
            return lines;
        }
        let empty = "(struct array_type){0, NULL}";
        match self.types.shape(ty) {
            Some(Shape::Basic { base, size }) => {
                if matches!(base, BaseKind::Int | BaseKind::Uint | BaseKind::Float) {
                    let signed = *base != BaseKind::Uint;
                    lines.push(format!("{d}.size = {size};"));
                    lines.push(format!("{d}.is_signed = {};", u8::from(signed)));
                }
            }
            Some(Shape::Ref { inner, owned }) => {
                lines.push(format!("{d}.inner = {};", self.type_info_ref(*inner)));
                lines.push(format!("{d}.owned = {};", u8::from(*owned)));
            }
            Some(Shape::Array { inner, .. }) => {
                lines.push(format!("{d}.inner = {};", self.type_info_ref(*inner)));
                lines.push(format!("{d}.size = 0;"));
                lines.push(format!("{d}.is_static = 0;"));
            }
            Some(Shape::StaticArray { inner, length }) => {
                lines.push(format!("{d}.inner = {};", self.type_info_ref(*inner)));
                lines.push(format!("{d}.size = {length};"));
                lines.push(format!("{d}.is_static = 1;"));
            }
            Some(Shape::Struct(st)) => {
                let type_member = member_name("type");
                for (i, (name, m)) in st.members.iter().enumerate() {
                    lines.push(format!("{d}_members[{i}].name = {};", static_string(name)));
                    lines.push(format!(
                        "{d}_members[{i}].{type_member} = {};",
                        self.type_info_ref(*m)
                    ));
                }
                if st.members.is_empty() {
                    lines.push(format!("{d}.members = {empty};"));
                } else {
                    lines.push(format!(
                        "{d}.members = (struct array_type){{{}, {d}_members}};",
                        st.members.len()
                    ));
                }
            }
            Some(Shape::Enum { inner, members }) => {
                lines.push(format!("{d}.inner = {};", self.type_info_ref(*inner)));
                let suffix = int_suffix(self.types, self.prog.session.builtins.int);
                for (i, (name, value)) in members.iter().enumerate() {
                    lines.push(format!("{d}_names[{i}] = {};", static_string(name)));
                    lines.push(format!("{d}_values[{i}] = {value}{suffix};"));
                }
                if members.is_empty() {
                    lines.push(format!("{d}.names = {empty};"));
                    lines.push(format!("{d}.values = {empty};"));
                } else {
                    let n = members.len();
                    lines.push(format!("{d}.names = (struct array_type){{{n}, {d}_names}};"));
                    lines.push(format!("{d}.values = (struct array_type){{{n}, {d}_values}};"));
                }
            }
            Some(Shape::Func {
                args,
                ret,
                variadic,
            }) => {
                for (i, a) in args.iter().enumerate() {
                    lines.push(format!("{d}_args[{i}] = {};", self.type_info_ref(*a)));
                }
                if args.is_empty() {
                    lines.push(format!("{d}.args = {empty};"));
                } else {
                    lines.push(format!(
                        "{d}.args = (struct array_type){{{}, {d}_args}};",
                        args.len()
                    ));
                }
                lines.push(format!("{d}.ret = {};", self.type_info_ref(*ret)));
                lines.push(format!("{d}.is_variadic = {};", u8::from(*variadic)));
            }
            _ => {}
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::tests::compile_to_c;

    fn init_body(c_code: &str) -> &str {
        let start = c_code.find("void _vs_init_types(void) {").unwrap();
        let rest = &c_code[start..];
        &rest[..rest.find("\n}\n").unwrap()]
    }

    #[test]
    fn numeric_descriptors_record_size_and_sign() {
        let c_code = compile_to_c("fn main() { t := #type(u8); }");
        let init = init_body(&c_code);
        assert!(init.contains(".name = (struct string_type){2, \"u8\"};"));
        assert!(init.contains(".size = 1;"));
        assert!(init.contains(".is_signed = 0;"));
        assert!(c_code.contains("((struct _type_vs_"));
    }

    #[test]
    fn struct_descriptors_list_members() {
        let c_code = compile_to_c(
            "type Pair struct { left int; right string }
             fn main() { t := #type(Pair); }",
        );
        let init = init_body(&c_code);
        assert!(init.contains("_members[0].name = (struct string_type){4, \"left\"};"));
        assert!(init.contains("_members[1].name = (struct string_type){5, \"right\"};"));
        assert!(init.contains(".base = 11;"));
    }

    #[test]
    fn enum_descriptors_list_names_and_values() {
        let c_code = compile_to_c(
            "type Mode enum { Off, On = 3 }
             fn main() { t := #type(Mode); }",
        );
        let init = init_body(&c_code);
        assert!(init.contains("_names[1] = (struct string_type){2, \"On\"};"));
        assert!(init.contains("_values[1] = 3LL;"));
        assert!(c_code.contains("int64_t _type_info"));
    }

    #[test]
    fn function_descriptors_reference_their_signature() {
        let c_code = compile_to_c(
            "fn add(a int, b int) int { return a + b; }
             fn main() { f := add; t := #type(fn(int, int) int); }",
        );
        let init = init_body(&c_code);
        assert!(init.contains(".base = 8;"));
        assert!(init.contains("_args[1] = "));
        assert!(init.contains(".is_variadic = 0;"));
    }
}
