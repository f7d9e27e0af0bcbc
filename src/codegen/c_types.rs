/// Mapping from vs types to C declarators.
use crate::errors::InternalError;
use crate::semantic::ids::TypeId;
use crate::semantic::types::{BaseKind, Shape, TypeArena};

use super::c_mangle::struct_name;
use super::CResult;

/// C spelling of a basic type.
pub fn basic_to_c(base: BaseKind, size: u8) -> &'static str {
    match (base, size) {
        (BaseKind::Int, 1) => "int8_t",
        (BaseKind::Int, 2) => "int16_t",
        (BaseKind::Int, 4) => "int32_t",
        (BaseKind::Int, _) => "int64_t",
        (BaseKind::Uint, 1) => "uint8_t",
        (BaseKind::Uint, 2) => "uint16_t",
        (BaseKind::Uint, 4) => "uint32_t",
        (BaseKind::Uint, _) => "uint64_t",
        (BaseKind::Float, 4) => "float",
        (BaseKind::Float, _) => "double",
        (BaseKind::Bool, _) => "unsigned char",
        (BaseKind::String, _) => "struct string_type",
        (BaseKind::Void, _) => "void",
        (BaseKind::Ptr, _) => "ptr_type",
    }
}

fn join(base: &str, name: &str) -> String {
    if name.is_empty() {
        base.to_string()
    } else {
        format!("{base} {name}")
    }
}

/// Declare `name` with type `ty`. An empty name yields an abstract
/// declarator usable in casts and `sizeof`.
pub fn declare(types: &TypeArena, ty: TypeId, name: &str) -> CResult<String> {
    let Some(shape) = types.shape(ty) else {
        return Err(InternalError::new(format!(
            "unresolved type {} reached codegen",
            types.type_to_string(ty)
        )));
    };
    match shape {
        Shape::Basic { base, size } => Ok(join(basic_to_c(*base, *size), name)),
        Shape::Enum { inner, .. } => declare(types, *inner, name),
        Shape::Struct(_) => Ok(join(&struct_name(types.emit_id(ty)), name)),
        Shape::Array { .. } => Ok(join("struct array_type", name)),
        Shape::Ref { inner, .. } => declare(types, *inner, &pointer_declarator(types, *inner, name)),
        Shape::StaticArray { inner, length } => declare(types, *inner, &format!("{name}[{length}]")),
        Shape::Func { args, ret, .. } => {
            let params = param_list(types, args)?;
            declare(types, *ret, &format!("(*{name})({params})"))
        }
        Shape::Params { .. } | Shape::Polydef(_) | Shape::External { .. } => Err(InternalError::new(
            format!("type {} has no C representation", types.type_to_string(ty)),
        )),
    }
}

/// Declarator for a pointer to `pointee`. Arrays and functions bind
/// tighter than `*`, so those pointers are parenthesized.
fn pointer_declarator(types: &TypeArena, pointee: TypeId, name: &str) -> String {
    if types.is_static_array(pointee) || types.is_func(pointee) {
        format!("(*{name})")
    } else {
        format!("*{name}")
    }
}

/// Abstract C type name.
pub fn c_type(types: &TypeArena, ty: TypeId) -> CResult<String> {
    declare(types, ty, "")
}

/// Type of a pointer to `ty`, as used when casting `void *` storage.
pub fn pointer_type(types: &TypeArena, ty: TypeId) -> CResult<String> {
    declare(types, ty, &pointer_declarator(types, ty, ""))
}

/// Comma-separated parameter types, `void` when empty.
pub fn param_list(types: &TypeArena, args: &[TypeId]) -> CResult<String> {
    if args.is_empty() {
        return Ok("void".to_string());
    }
    let params = args
        .iter()
        .map(|a| c_type(types, *a))
        .collect::<CResult<Vec<_>>>()?;
    Ok(params.join(", "))
}

/// Initializer giving a zero value of `ty`.
pub fn zero_value(types: &TypeArena, ty: TypeId) -> &'static str {
    match types.shape(ty) {
        Some(Shape::Basic {
            base: BaseKind::String,
            ..
        })
        | Some(Shape::Struct(_) | Shape::Array { .. } | Shape::StaticArray { .. }) => "{0}",
        Some(Shape::Basic {
            base: BaseKind::Ptr,
            ..
        })
        | Some(Shape::Ref { .. } | Shape::Func { .. }) => "NULL",
        _ => "0",
    }
}

/// Suffix that gives an integer literal the width of `ty`.
pub fn int_suffix(types: &TypeArena, ty: TypeId) -> &'static str {
    let target = match types.shape(ty) {
        Some(Shape::Enum { inner, .. }) => *inner,
        _ => ty,
    };
    match types.shape(target) {
        Some(Shape::Basic {
            base: BaseKind::Int,
            size: 8,
        }) => "LL",
        Some(Shape::Basic {
            base: BaseKind::Uint,
            size: 8,
        }) => "ULL",
        Some(Shape::Basic {
            base: BaseKind::Int,
            size: 4,
        }) => "L",
        Some(Shape::Basic {
            base: BaseKind::Uint,
            size: 4,
        }) => "UL",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::ids::ScopeId;
    use pretty_assertions::assert_eq;

    fn basic(types: &mut TypeArena, name: &str, base: BaseKind, size: u8) -> TypeId {
        types.make_def(name, ScopeId(0), Some(Shape::Basic { base, size }))
    }

    #[test]
    fn basic_declarations() {
        let mut t = TypeArena::new();
        let int = basic(&mut t, "int", BaseKind::Int, 8);
        let u8_ = basic(&mut t, "u8", BaseKind::Uint, 1);
        let string = basic(&mut t, "string", BaseKind::String, 16);
        assert_eq!(declare(&t, int, "_vs_1").unwrap(), "int64_t _vs_1");
        assert_eq!(c_type(&t, u8_).unwrap(), "uint8_t");
        assert_eq!(declare(&t, string, "s").unwrap(), "struct string_type s");
    }

    #[test]
    fn pointers_to_arrays_and_functions_are_parenthesized() {
        let mut t = TypeArena::new();
        let int = basic(&mut t, "int", BaseKind::Int, 8);
        let arr = t.make_static_array(int, 3);
        let r = t.make_ref(arr, false);
        assert_eq!(declare(&t, r, "p").unwrap(), "int64_t (*p)[3]");
        let f = t.make_func(vec![int, int], int, false);
        assert_eq!(declare(&t, f, "f").unwrap(), "int64_t (*f)(int64_t, int64_t)");
        assert_eq!(c_type(&t, f).unwrap(), "int64_t (*)(int64_t, int64_t)");
        let rf = t.make_ref(f, false);
        assert_eq!(declare(&t, rf, "g").unwrap(), "int64_t (*(*g))(int64_t, int64_t)");
    }

    #[test]
    fn nested_declarators() {
        let mut t = TypeArena::new();
        let int = basic(&mut t, "int", BaseKind::Int, 8);
        let void = basic(&mut t, "void", BaseKind::Void, 0);
        let grid = t.make_static_array(int, 4);
        let grid = t.make_static_array(grid, 2);
        assert_eq!(declare(&t, grid, "g").unwrap(), "int64_t g[2][4]");
        let r = t.make_ref(int, false);
        let rr = t.make_ref(r, true);
        assert_eq!(declare(&t, rr, "x").unwrap(), "int64_t **x");
        let thunk = t.make_func(vec![], void, false);
        assert_eq!(declare(&t, thunk, "cb").unwrap(), "void (*cb)(void)");
        let ret_fn = t.make_func(vec![int], thunk, false);
        assert_eq!(
            declare(&t, ret_fn, "make").unwrap(),
            "void (*(*make)(int64_t))(void)"
        );
    }

    #[test]
    fn pointer_types_for_element_casts() {
        let mut t = TypeArena::new();
        let int = basic(&mut t, "int", BaseKind::Int, 8);
        assert_eq!(pointer_type(&t, int).unwrap(), "int64_t *");
        let row = t.make_static_array(int, 3);
        assert_eq!(pointer_type(&t, row).unwrap(), "int64_t (*)[3]");
    }

    #[test]
    fn placeholders_have_no_c_type() {
        let mut t = TypeArena::new();
        let p = t.make_polydef("T");
        assert!(c_type(&t, p).is_err());
    }

    #[test]
    fn zero_values_and_suffixes() {
        let mut t = TypeArena::new();
        let int = basic(&mut t, "int", BaseKind::Int, 8);
        let s32 = basic(&mut t, "s32", BaseKind::Int, 4);
        let string = basic(&mut t, "string", BaseKind::String, 16);
        let r = t.make_ref(int, false);
        assert_eq!(zero_value(&t, string), "{0}");
        assert_eq!(zero_value(&t, r), "NULL");
        assert_eq!(zero_value(&t, int), "0");
        assert_eq!(int_suffix(&t, int), "LL");
        assert_eq!(int_suffix(&t, s32), "L");
    }
}
