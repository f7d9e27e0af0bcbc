use super::ids::{FnId, PolyId, TypeId};
use super::polymorph::unify;
use super::types::{Shape, TypeArena};

/// A method declared on (or specialized for) a type.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub ty: TypeId,
    pub name: String,
    pub func: FnId,
    /// Set for specializations registered under a concrete receiver.
    pub poly: Option<PolyId>,
}

/// Outcome of a method lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodMatch {
    Exact { func: FnId, poly: Option<PolyId> },
    /// Declared on a polymorphic type the receiver unifies with.
    Polymorphic(FnId),
    /// Declared on the generic template the receiver was reified from.
    Possible(FnId),
    None,
}

/// Methods in declaration order.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    entries: Vec<MethodEntry>,
}

impl MethodRegistry {
    pub fn entries(&self) -> &[MethodEntry] {
        &self.entries
    }

    /// Add a method. Defining the same name on an equal type again keeps
    /// the first declaration and returns it.
    pub fn define_method(
        &mut self,
        types: &TypeArena,
        ty: TypeId,
        name: &str,
        func: FnId,
        poly: Option<PolyId>,
    ) -> FnId {
        let existing = self
            .entries
            .iter()
            .find(|e| e.name == name && types.check_type(e.ty, ty));
        if let Some(e) = existing {
            return e.func;
        }
        self.entries.push(MethodEntry {
            ty,
            name: name.to_string(),
            func,
            poly,
        });
        func
    }

    /// Exact concrete matches win immediately. Otherwise a polymorphic
    /// declaration the receiver unifies with, then one on the receiver's
    /// generic template.
    pub fn find_method(&self, types: &TypeArena, receiver: TypeId, name: &str) -> MethodMatch {
        let recv = types.follow(receiver);
        let template = match types.shape(recv) {
            Some(Shape::Struct(st)) => st.generic_base.map(|b| types.follow(b)),
            _ => None,
        };
        let mut polymorphic = None;
        let mut possible = None;
        for e in self.entries.iter().filter(|e| e.name == name) {
            let decl = types.follow(e.ty);
            if matches!(types.shape(decl), Some(Shape::Struct(st)) if st.generic) {
                if template == Some(decl) && possible.is_none() {
                    possible = Some(e.func);
                }
                continue;
            }
            if types.is_polydef(decl) {
                if polymorphic.is_none() && unify(types, decl, recv).is_some() {
                    polymorphic = Some(e.func);
                }
                continue;
            }
            if types.check_type(decl, recv) {
                return MethodMatch::Exact {
                    func: e.func,
                    poly: e.poly,
                };
            }
        }
        match (polymorphic, possible) {
            (Some(f), _) => MethodMatch::Polymorphic(f),
            (None, Some(f)) => MethodMatch::Possible(f),
            (None, None) => MethodMatch::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::ids::ScopeId;
    use crate::semantic::types::{BaseKind, StructShape};

    fn int(a: &mut TypeArena) -> TypeId {
        a.make_def(
            "int",
            ScopeId(0),
            Some(Shape::Basic {
                base: BaseKind::Int,
                size: 8,
            }),
        )
    }

    #[test]
    fn define_is_idempotent() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let p = a.make_def("P", ScopeId(0), Some(Shape::Struct(StructShape::plain(vec![("x".into(), i)]))));
        let mut reg = MethodRegistry::default();
        assert_eq!(reg.define_method(&a, p, "len", FnId(1), None), FnId(1));
        assert_eq!(reg.define_method(&a, p, "len", FnId(2), None), FnId(1));
        assert_eq!(reg.entries().len(), 1);
        assert_eq!(
            reg.find_method(&a, p, "len"),
            MethodMatch::Exact {
                func: FnId(1),
                poly: None
            }
        );
        assert_eq!(reg.find_method(&a, p, "missing"), MethodMatch::None);
    }

    #[test]
    fn template_methods_are_possible_matches() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let t = a.make_polydef("T");
        let template = a.make_def(
            "Box",
            ScopeId(0),
            Some(Shape::Struct(StructShape {
                members: vec![("item".into(), t)],
                generic: true,
                params: vec![t],
                generic_base: None,
            })),
        );
        let instance = a.make_def(
            "Box(int)",
            ScopeId(0),
            Some(Shape::Struct(StructShape {
                members: vec![("item".into(), i)],
                generic: false,
                params: vec![i],
                generic_base: Some(template),
            })),
        );
        let mut reg = MethodRegistry::default();
        reg.define_method(&a, template, "get", FnId(0), None);
        assert_eq!(reg.find_method(&a, instance, "get"), MethodMatch::Possible(FnId(0)));

        reg.define_method(&a, instance, "get", FnId(0), Some(PolyId(3)));
        assert_eq!(
            reg.find_method(&a, instance, "get"),
            MethodMatch::Exact {
                func: FnId(0),
                poly: Some(PolyId(3))
            }
        );
    }

    #[test]
    fn polymorphic_declarations_unify() {
        let mut a = TypeArena::new();
        let i = int(&mut a);
        let t = a.make_polydef("T");
        let arr_t = a.make_array(t, false);
        let arr_int = a.make_array(i, false);
        let mut reg = MethodRegistry::default();
        reg.define_method(&a, arr_t, "first", FnId(4), None);
        assert_eq!(reg.find_method(&a, arr_int, "first"), MethodMatch::Polymorphic(FnId(4)));
        assert_eq!(reg.find_method(&a, i, "first"), MethodMatch::None);
    }
}
