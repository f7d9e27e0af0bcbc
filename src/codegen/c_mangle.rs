/// Name mangling for C identifiers.
use crate::semantic::ids::{PolyId, VarId};

/// C11 reserved keywords that must be escaped.
const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
    "_Alignas", "_Alignof", "_Atomic", "_Generic", "_Noreturn", "_Static_assert",
    "_Thread_local",
];

/// Escape a struct member name if it collides with a C keyword.
pub fn member_name(name: &str) -> String {
    if C_KEYWORDS.contains(&name) {
        format!("_kw_{name}")
    } else {
        name.to_string()
    }
}

/// User variable or function: `_vs_12`
pub fn var_name(id: VarId) -> String {
    format!("_vs_{}", id.0)
}

/// Generator temporary: `_tmp12`
pub fn temp_name(id: VarId) -> String {
    format!("_tmp{}", id.0)
}

/// Foreign symbol alias: `_vs_println`
pub fn ext_name(name: &str) -> String {
    format!("_vs_{name}")
}

/// Specialization of the function named by `var`: `_poly_3_vs_12`
pub fn poly_name(poly: PolyId, var: VarId) -> String {
    format!("_poly_{}_vs_{}", poly.0, var.0)
}

/// Struct tag: `struct _type_vs_7`
pub fn struct_name(emit_id: u32) -> String {
    format!("struct _type_vs_{emit_id}")
}

pub fn struct_init_name(emit_id: u32) -> String {
    format!("_init_{emit_id}")
}

pub fn struct_copy_name(emit_id: u32) -> String {
    format!("_copy_{emit_id}")
}

pub fn struct_free_name(emit_id: u32) -> String {
    format!("_free_{emit_id}")
}

/// Runtime type descriptor: `_type_info7`
pub fn type_info_name(emit_id: u32) -> String {
    format!("_type_info{emit_id}")
}

/// Quote bytes as a C string literal body (without the quotes).
pub fn c_string_body(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_members_are_escaped() {
        assert_eq!(member_name("int"), "_kw_int");
        assert_eq!(member_name("type"), "type");
    }

    #[test]
    fn symbol_names() {
        assert_eq!(var_name(VarId(4)), "_vs_4");
        assert_eq!(temp_name(VarId(4)), "_tmp4");
        assert_eq!(poly_name(PolyId(1), VarId(9)), "_poly_1_vs_9");
        assert_eq!(struct_name(3), "struct _type_vs_3");
        assert_eq!(type_info_name(3), "_type_info3");
    }

    #[test]
    fn string_bodies_escape_specials() {
        assert_eq!(c_string_body("a\"b\n"), "a\\\"b\\n");
        assert_eq!(c_string_body("\0x"), "\\000x");
        assert_eq!(c_string_body("é"), "\\303\\251");
    }
}
