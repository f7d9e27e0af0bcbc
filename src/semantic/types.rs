use rustc_hash::FxHashSet;

use crate::errors::InternalError;

use super::ids::{ScopeId, TypeId};

/// Primitive representation of a `Basic` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Int,
    Uint,
    Float,
    Bool,
    String,
    Void,
    Ptr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructShape {
    pub members: Vec<(String, TypeId)>,
    /// Template with `$T` parameters awaiting reification.
    pub generic: bool,
    /// Placeholders of a template, or the concrete arguments of a
    /// reified instance.
    pub params: Vec<TypeId>,
    /// The template a reified instance was created from.
    pub generic_base: Option<TypeId>,
}

impl StructShape {
    pub fn plain(members: Vec<(String, TypeId)>) -> Self {
        Self {
            members,
            generic: false,
            params: Vec::new(),
            generic_base: None,
        }
    }

    pub fn member(&self, name: &str) -> Option<TypeId> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

/// Structural shape of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Basic { base: BaseKind, size: u8 },
    Ref { inner: TypeId, owned: bool },
    Array { inner: TypeId, owned: bool },
    StaticArray { inner: TypeId, length: u64 },
    Struct(StructShape),
    Enum { inner: TypeId, members: Vec<(String, i64)> },
    Func { args: Vec<TypeId>, ret: TypeId, variadic: bool },
    /// Generic template applied to arguments, pending reification.
    Params { inner: TypeId, args: Vec<TypeId> },
    /// Unbound placeholder such as `$T`.
    Polydef(String),
    /// Type living in another package, resolved by name there.
    External { package: String, name: String },
}

/// A node in the type graph.
///
/// Named references carry a `name` and a `scope` and get a `target` once
/// resolved. Definition nodes carry a `name` and a `shape`. Structural nodes
/// carry only a `shape`. `target` always wins over `shape`: registry
/// deduplication points a structural node at its canonical twin.
#[derive(Debug, Clone)]
pub struct Type {
    /// Emission identity (`_type_vs_<id>`, `_type_info<id>`).
    pub id: u32,
    pub name: Option<String>,
    pub scope: Option<ScopeId>,
    pub shape: Option<Shape>,
    pub target: Option<TypeId>,
    /// Underlying type shown in diagnostics as `name (aka ..)`.
    pub aka: Option<TypeId>,
}

/// Arena holding every type of one compilation.
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Type>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    // ── Constructors ──────────────────────────────────────────
    // Every constructor allocates a fresh node; none deduplicates.

    pub fn make(&mut self, shape: Shape) -> TypeId {
        let id = self.types.len() as u32;
        self.push(Type {
            id,
            name: None,
            scope: None,
            shape: Some(shape),
            target: None,
            aka: None,
        })
    }

    /// Named definition node (`type Name ...`, builtins).
    pub fn make_def(&mut self, name: &str, scope: ScopeId, shape: Option<Shape>) -> TypeId {
        let id = self.types.len() as u32;
        self.push(Type {
            id,
            name: Some(name.to_string()),
            scope: Some(scope),
            shape,
            target: None,
            aka: None,
        })
    }

    /// Unresolved reference to `name` as seen from `scope`.
    pub fn make_named(&mut self, name: &str, scope: ScopeId) -> TypeId {
        let id = self.types.len() as u32;
        self.push(Type {
            id,
            name: Some(name.to_string()),
            scope: Some(scope),
            shape: None,
            target: None,
            aka: None,
        })
    }

    /// Named node standing for a polymorph binding of `name`.
    pub fn make_bound(&mut self, name: &str, scope: ScopeId, target: TypeId) -> TypeId {
        let id = self.types.len() as u32;
        self.push(Type {
            id,
            name: Some(name.to_string()),
            scope: Some(scope),
            shape: None,
            target: Some(target),
            aka: Some(target),
        })
    }

    pub fn make_ref(&mut self, inner: TypeId, owned: bool) -> TypeId {
        self.make(Shape::Ref { inner, owned })
    }

    pub fn make_array(&mut self, inner: TypeId, owned: bool) -> TypeId {
        self.make(Shape::Array { inner, owned })
    }

    pub fn make_static_array(&mut self, inner: TypeId, length: u64) -> TypeId {
        self.make(Shape::StaticArray { inner, length })
    }

    pub fn make_struct(&mut self, members: Vec<(String, TypeId)>) -> TypeId {
        self.make(Shape::Struct(StructShape::plain(members)))
    }

    pub fn make_func(&mut self, args: Vec<TypeId>, ret: TypeId, variadic: bool) -> TypeId {
        self.make(Shape::Func {
            args,
            ret,
            variadic,
        })
    }

    pub fn make_params(&mut self, inner: TypeId, args: Vec<TypeId>) -> TypeId {
        self.make(Shape::Params { inner, args })
    }

    pub fn make_polydef(&mut self, name: &str) -> TypeId {
        let id = self.make(Shape::Polydef(name.to_string()));
        self.get_mut(id).name = Some(name.to_string());
        id
    }

    pub fn make_external(&mut self, package: &str, name: &str, scope: ScopeId) -> TypeId {
        let id = self.make(Shape::External {
            package: package.to_string(),
            name: name.to_string(),
        });
        self.get_mut(id).scope = Some(scope);
        id
    }

    // ── Navigation ────────────────────────────────────────────

    /// Follow named references, aliases, bindings and dedup links to the
    /// node that carries the shape.
    pub fn follow(&self, mut id: TypeId) -> TypeId {
        let mut hops = 0;
        while let Some(next) = self.get(id).target {
            if next == id || hops > self.types.len() {
                break;
            }
            id = next;
            hops += 1;
        }
        id
    }

    pub fn shape(&self, id: TypeId) -> Option<&Shape> {
        let canon = self.follow(id);
        let t = self.get(canon);
        if t.target.is_some() {
            return None;
        }
        t.shape.as_ref()
    }

    /// Emission id of the canonical node.
    pub fn emit_id(&self, id: TypeId) -> u32 {
        self.get(self.follow(id)).id
    }

    pub fn set_shape(&mut self, id: TypeId, shape: Shape) {
        self.get_mut(id).shape = Some(shape);
    }

    /// Point `id` at the canonical node `canon`, adopting its emission id.
    pub fn alias_to(&mut self, id: TypeId, canon: TypeId) {
        let emit = self.get(canon).id;
        let t = self.get_mut(id);
        t.target = Some(canon);
        t.id = emit;
    }

    pub fn struct_shape(&self, id: TypeId) -> Result<&StructShape, InternalError> {
        match self.shape(id) {
            Some(Shape::Struct(st)) => Ok(st),
            _ => Err(InternalError::new(format!(
                "expected struct type, got {}",
                self.type_to_string(id)
            ))),
        }
    }

    pub fn func_shape(&self, id: TypeId) -> Result<(&[TypeId], TypeId, bool), InternalError> {
        match self.shape(id) {
            Some(Shape::Func {
                args,
                ret,
                variadic,
            }) => Ok((args.as_slice(), *ret, *variadic)),
            _ => Err(InternalError::new(format!(
                "expected function type, got {}",
                self.type_to_string(id)
            ))),
        }
    }

    /// Element type of arrays, static arrays and references.
    pub fn inner(&self, id: TypeId) -> Option<TypeId> {
        match self.shape(id)? {
            Shape::Ref { inner, .. }
            | Shape::Array { inner, .. }
            | Shape::StaticArray { inner, .. }
            | Shape::Enum { inner, .. } => Some(*inner),
            _ => None,
        }
    }

    // ── Simple predicates ─────────────────────────────────────

    pub fn base(&self, id: TypeId) -> Option<BaseKind> {
        match self.shape(id)? {
            Shape::Basic { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn is_string(&self, id: TypeId) -> bool {
        self.base(id) == Some(BaseKind::String)
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        self.base(id) == Some(BaseKind::Void)
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        self.base(id) == Some(BaseKind::Bool)
    }

    pub fn is_ptr(&self, id: TypeId) -> bool {
        self.base(id) == Some(BaseKind::Ptr)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.base(id), Some(BaseKind::Int | BaseKind::Uint))
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        self.base(id) == Some(BaseKind::Float)
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_float(id)
    }

    pub fn is_ref(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Ref { .. }))
    }

    pub fn is_owned_ref(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Ref { owned: true, .. }))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Array { .. }))
    }

    pub fn is_static_array(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::StaticArray { .. }))
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Struct(_)))
    }

    pub fn is_enum(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Enum { .. }))
    }

    pub fn is_func(&self, id: TypeId) -> bool {
        matches!(self.shape(id), Some(Shape::Func { .. }))
    }

    pub fn basic_size(&self, id: TypeId) -> Option<u8> {
        match self.shape(id)? {
            Shape::Basic { size, .. } => Some(*size),
            Shape::Enum { inner, .. } => self.basic_size(*inner),
            _ => None,
        }
    }

    // ── Recursive predicates ──────────────────────────────────

    /// Owns heap storage: strings, owned references, and structs or static
    /// arrays containing them.
    pub fn is_dynamic(&self, id: TypeId) -> bool {
        self.is_dynamic_inner(id, &mut FxHashSet::default())
    }

    fn is_dynamic_inner(&self, id: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        let id = self.follow(id);
        if !visited.insert(id) {
            return false;
        }
        match self.shape(id) {
            Some(Shape::Basic { base, .. }) => *base == BaseKind::String,
            Some(Shape::Ref { owned, .. }) => *owned,
            Some(Shape::StaticArray { inner, .. }) => self.is_dynamic_inner(*inner, visited),
            Some(Shape::Struct(st)) => st
                .members
                .iter()
                .any(|(_, m)| self.is_dynamic_inner(*m, visited)),
            _ => false,
        }
    }

    /// Contains an unbound placeholder.
    pub fn is_polydef(&self, id: TypeId) -> bool {
        self.is_polydef_inner(id, &mut FxHashSet::default())
    }

    fn is_polydef_inner(&self, id: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        let id = self.follow(id);
        if !visited.insert(id) {
            return false;
        }
        match self.shape(id) {
            Some(Shape::Polydef(_)) => true,
            Some(
                Shape::Ref { inner, .. }
                | Shape::Array { inner, .. }
                | Shape::StaticArray { inner, .. },
            ) => self.is_polydef_inner(*inner, visited),
            Some(Shape::Struct(st)) => {
                !st.generic
                    && st
                        .members
                        .iter()
                        .any(|(_, m)| self.is_polydef_inner(*m, visited))
            }
            Some(Shape::Func { args, ret, .. }) => {
                args.iter().any(|a| self.is_polydef_inner(*a, visited))
                    || self.is_polydef_inner(*ret, visited)
            }
            Some(Shape::Params { args, .. }) => {
                args.iter().any(|a| self.is_polydef_inner(*a, visited))
            }
            _ => false,
        }
    }

    /// Refers to a generic struct template that has not been reified.
    pub fn contains_generic_struct(&self, id: TypeId) -> bool {
        self.contains_generic_inner(id, &mut FxHashSet::default())
    }

    fn contains_generic_inner(&self, id: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        let id = self.follow(id);
        if !visited.insert(id) {
            return false;
        }
        match self.shape(id) {
            Some(Shape::Struct(st)) => {
                st.generic
                    || st
                        .members
                        .iter()
                        .any(|(_, m)| self.contains_generic_inner(*m, visited))
            }
            Some(
                Shape::Ref { inner, .. }
                | Shape::Array { inner, .. }
                | Shape::StaticArray { inner, .. },
            ) => self.contains_generic_inner(*inner, visited),
            Some(Shape::Func { args, ret, .. }) => {
                args.iter().any(|a| self.contains_generic_inner(*a, visited))
                    || self.contains_generic_inner(*ret, visited)
            }
            Some(Shape::Params { .. }) => true,
            _ => false,
        }
    }

    // ── Structural equality ───────────────────────────────────

    /// Two types are interchangeable when they share a definition node or
    /// their shapes are structurally equal.
    pub fn check_type(&self, a: TypeId, b: TypeId) -> bool {
        self.check_inner(a, b, &mut FxHashSet::default())
    }

    fn check_inner(
        &self,
        a: TypeId,
        b: TypeId,
        visited: &mut FxHashSet<(TypeId, TypeId)>,
    ) -> bool {
        let a = self.follow(a);
        let b = self.follow(b);
        if a == b {
            return true;
        }
        // A pair already under comparison is assumed equal.
        if !visited.insert((a, b)) {
            return true;
        }
        let (ta, tb) = (self.get(a), self.get(b));
        let a_named = ta.name.is_some() && !matches!(ta.shape, Some(Shape::Polydef(_)));
        let b_named = tb.name.is_some() && !matches!(tb.shape, Some(Shape::Polydef(_)));
        if a_named && b_named {
            return false;
        }
        let (Some(sa), Some(sb)) = (&ta.shape, &tb.shape) else {
            return false;
        };
        match (sa, sb) {
            (Shape::Basic { base: ba, size: za }, Shape::Basic { base: bb, size: zb }) => {
                ba == bb && za == zb
            }
            (Shape::Enum { .. }, Shape::Enum { .. }) => false,
            // Ownership is part of identity: merging `'T` with `&T` would
            // hand one of them the other's release duty.
            (
                Shape::Ref {
                    inner: ia,
                    owned: oa,
                },
                Shape::Ref {
                    inner: ib,
                    owned: ob,
                },
            )
            | (
                Shape::Array {
                    inner: ia,
                    owned: oa,
                },
                Shape::Array {
                    inner: ib,
                    owned: ob,
                },
            ) => oa == ob && self.check_inner(*ia, *ib, visited),
            (
                Shape::StaticArray {
                    inner: ia,
                    length: la,
                },
                Shape::StaticArray {
                    inner: ib,
                    length: lb,
                },
            ) => la == lb && self.check_inner(*ia, *ib, visited),
            (Shape::Struct(x), Shape::Struct(y)) => {
                x.generic == y.generic
                    && x.members.len() == y.members.len()
                    && x
                        .members
                        .iter()
                        .zip(&y.members)
                        .all(|((na, ma), (nb, mb))| {
                            na == nb && self.check_inner(*ma, *mb, visited)
                        })
            }
            (
                Shape::Func {
                    args: aa,
                    ret: ra,
                    variadic: va,
                },
                Shape::Func {
                    args: ab,
                    ret: rb,
                    variadic: vb,
                },
            ) => {
                va == vb
                    && aa.len() == ab.len()
                    && aa
                        .iter()
                        .zip(ab)
                        .all(|(x, y)| self.check_inner(*x, *y, visited))
                    && self.check_inner(*ra, *rb, visited)
            }
            (
                Shape::Params {
                    inner: ia,
                    args: aa,
                },
                Shape::Params {
                    inner: ib,
                    args: ab,
                },
            ) => {
                self.check_inner(*ia, *ib, visited)
                    && aa.len() == ab.len()
                    && aa
                        .iter()
                        .zip(ab)
                        .all(|(x, y)| self.check_inner(*x, *y, visited))
            }
            (Shape::Polydef(x), Shape::Polydef(y)) => x == y,
            (
                Shape::External {
                    package: pa,
                    name: na,
                },
                Shape::External {
                    package: pb,
                    name: nb,
                },
            ) => pa == pb && na == nb,
            _ => false,
        }
    }

    // ── Display ───────────────────────────────────────────────

    pub fn type_to_string(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(id, &mut out, 0);
        out
    }

    fn write_type(&self, id: TypeId, out: &mut String, depth: usize) {
        if depth > 8 {
            out.push_str("...");
            return;
        }
        let t = self.get(id);
        if let Some(name) = &t.name {
            if matches!(t.shape, Some(Shape::Polydef(_))) && t.target.is_none() {
                out.push('$');
            }
            out.push_str(name);
            if let Some(aka) = t.aka {
                out.push_str(" (aka ");
                self.write_type(aka, out, depth + 1);
                out.push(')');
            }
            return;
        }
        if let Some(target) = t.target {
            self.write_type(target, out, depth + 1);
            return;
        }
        let Some(shape) = &t.shape else {
            out.push_str("<unresolved>");
            return;
        };
        match shape {
            Shape::Basic { base, size } => out.push_str(&format!("{base:?}{size}")),
            Shape::Ref { inner, owned } => {
                out.push(if *owned { '\'' } else { '&' });
                self.write_type(*inner, out, depth + 1);
            }
            Shape::Array { inner, owned } => {
                if *owned {
                    out.push('\'');
                }
                out.push_str("[]");
                self.write_type(*inner, out, depth + 1);
            }
            Shape::StaticArray { inner, length } => {
                out.push_str(&format!("[{length}]"));
                self.write_type(*inner, out, depth + 1);
            }
            Shape::Struct(st) => {
                out.push_str("struct {");
                for (i, (name, m)) in st.members.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(name);
                    out.push(' ');
                    self.write_type(*m, out, depth + 1);
                }
                out.push('}');
            }
            Shape::Enum { .. } => out.push_str("enum"),
            Shape::Func {
                args,
                ret,
                variadic,
            } => {
                out.push_str("fn(");
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if *variadic && i + 1 == args.len() {
                        out.push_str("...");
                        let elem = match self.shape(*a) {
                            Some(Shape::Array { inner, .. }) => *inner,
                            _ => *a,
                        };
                        self.write_type(elem, out, depth + 1);
                    } else {
                        self.write_type(*a, out, depth + 1);
                    }
                }
                out.push(')');
                if !self.is_void(*ret) {
                    out.push_str(" -> ");
                    self.write_type(*ret, out, depth + 1);
                }
            }
            Shape::Params { inner, args } => {
                self.write_type(*inner, out, depth + 1);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(*a, out, depth + 1);
                }
                out.push(')');
            }
            Shape::Polydef(name) => {
                out.push('$');
                out.push_str(name);
            }
            Shape::External { package, name } => {
                out.push_str(package);
                out.push('.');
                out.push_str(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int(arena: &mut TypeArena) -> TypeId {
        arena.make_def(
            "int",
            ScopeId(0),
            Some(Shape::Basic {
                base: BaseKind::Int,
                size: 8,
            }),
        )
    }

    fn string(arena: &mut TypeArena) -> TypeId {
        arena.make_def(
            "string",
            ScopeId(0),
            Some(Shape::Basic {
                base: BaseKind::String,
                size: 16,
            }),
        )
    }

    #[test]
    fn independent_structs_are_equal() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let s1 = a.make_struct(vec![("x".into(), i), ("y".into(), i)]);
        let s2 = a.make_struct(vec![("x".into(), i), ("y".into(), i)]);
        assert!(a.check_type(s1, s2));
        let s3 = a.make_struct(vec![("y".into(), i), ("x".into(), i)]);
        assert!(!a.check_type(s1, s3));
    }

    #[test]
    fn named_definitions_are_nominal() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let shape = Shape::Struct(StructShape::plain(vec![("x".into(), i)]));
        let p = a.make_def("P", ScopeId(0), Some(shape.clone()));
        let q = a.make_def("Q", ScopeId(0), Some(shape));
        assert!(!a.check_type(p, q));
        let r1 = a.make_named("P", ScopeId(0));
        a.get_mut(r1).target = Some(p);
        let r2 = a.make_named("P", ScopeId(1));
        a.get_mut(r2).target = Some(p);
        assert!(a.check_type(r1, r2));
    }

    #[test]
    fn static_arrays_compare_length() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let x = a.make_static_array(i, 3);
        let y = a.make_static_array(i, 4);
        let z = a.make_static_array(i, 3);
        assert!(!a.check_type(x, y));
        assert!(a.check_type(x, z));
    }

    #[test]
    fn function_types_compare_variadic_flag() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let f = a.make_func(vec![i], i, false);
        let g = a.make_func(vec![i], i, true);
        assert!(!a.check_type(f, g));
    }

    #[test]
    fn self_referential_struct_terminates() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let n1 = a.make_struct(vec![]);
        let r1 = a.make_ref(n1, false);
        a.set_shape(n1, Shape::Struct(StructShape::plain(vec![("v".into(), i), ("next".into(), r1)])));
        let n2 = a.make_struct(vec![]);
        let r2 = a.make_ref(n2, false);
        a.set_shape(n2, Shape::Struct(StructShape::plain(vec![("v".into(), i), ("next".into(), r2)])));
        assert!(a.check_type(n1, n2));
    }

    #[test]
    fn dynamic_types() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let s = string(&mut a);
        assert!(a.is_dynamic(s));
        assert!(!a.is_dynamic(i));
        let with_string = a.make_struct(vec![("name".into(), s)]);
        assert!(a.is_dynamic(with_string));
        let owned = a.make_ref(i, true);
        let borrowed = a.make_ref(s, false);
        assert!(a.is_dynamic(owned));
        assert!(!a.is_dynamic(borrowed));
        let arr = a.make_static_array(s, 2);
        assert!(a.is_dynamic(arr));
        let dyn_arr = a.make_array(s, false);
        assert!(!a.is_dynamic(dyn_arr));
    }

    #[test]
    fn ownership_separates_references() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let owned = a.make_ref(i, true);
        let borrowed = a.make_ref(i, false);
        let other_borrow = a.make_ref(i, false);
        assert!(!a.check_type(owned, borrowed));
        assert!(a.check_type(borrowed, other_borrow));
        let owned_arr = a.make_array(i, true);
        let arr = a.make_array(i, false);
        assert!(!a.check_type(owned_arr, arr));
    }

    #[test]
    fn polydef_detection() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let t = a.make_polydef("T");
        let arr = a.make_array(t, false);
        assert!(a.is_polydef(arr));
        let f = a.make_func(vec![i], arr, false);
        assert!(a.is_polydef(f));
        assert!(!a.is_polydef(i));
    }

    #[test]
    fn display_names() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let r = a.make_ref(i, false);
        let arr = a.make_array(r, false);
        assert_eq!(a.type_to_string(arr), "[]&int");
        let f = a.make_func(vec![i, i], i, true);
        assert_eq!(a.type_to_string(f), "fn(int, ...int) -> int");
    }

    // ── Equivalence-relation properties ───────────────────────

    #[derive(Debug, Clone)]
    enum Gen {
        Int,
        Str,
        Ref(Box<Gen>),
        Array(Box<Gen>),
        Static(Box<Gen>, u64),
        Struct(Vec<(u8, Gen)>),
    }

    fn gen() -> impl Strategy<Value = Gen> {
        let leaf = prop_oneof![Just(Gen::Int), Just(Gen::Str)];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(|g| Gen::Ref(Box::new(g))),
                inner.clone().prop_map(|g| Gen::Array(Box::new(g))),
                (inner.clone(), 1u64..3).prop_map(|(g, n)| Gen::Static(Box::new(g), n)),
                prop::collection::vec((0u8..3, inner), 0..3).prop_map(Gen::Struct),
            ]
        })
    }

    fn build(a: &mut TypeArena, g: &Gen, i: TypeId, s: TypeId) -> TypeId {
        match g {
            Gen::Int => i,
            Gen::Str => s,
            Gen::Ref(inner) => {
                let t = build(a, inner, i, s);
                a.make_ref(t, false)
            }
            Gen::Array(inner) => {
                let t = build(a, inner, i, s);
                a.make_array(t, false)
            }
            Gen::Static(inner, n) => {
                let t = build(a, inner, i, s);
                a.make_static_array(t, *n)
            }
            Gen::Struct(members) => {
                let ms = members
                    .iter()
                    .map(|(n, m)| (format!("m{n}"), build(a, m, i, s)))
                    .collect();
                a.make_struct(ms)
            }
        }
    }

    proptest! {
        #[test]
        fn check_type_is_an_equivalence(x in gen(), y in gen(), z in gen()) {
            let mut a = TypeArena::new();
            let i = int(&mut a);
            let s = string(&mut a);
            let tx = build(&mut a, &x, i, s);
            let tx2 = build(&mut a, &x, i, s);
            let ty = build(&mut a, &y, i, s);
            let tz = build(&mut a, &z, i, s);
            prop_assert!(a.check_type(tx, tx));
            prop_assert!(a.check_type(tx, tx2));
            prop_assert_eq!(a.check_type(tx, ty), a.check_type(ty, tx));
            if a.check_type(tx, ty) && a.check_type(ty, tz) {
                prop_assert!(a.check_type(tx, tz));
            }
        }
    }
}
