// discovery/probe.rs - Heuristic building blocks for role resolution.
//
// Each probe returns `Option`: a miss (unknown name, wrong signature, host
// exception) is just `None`, and the caller moves on to the next heuristic.

use crate::host::{FieldDescriptor, MethodDescriptor, Runtime, TypeKind};

/// Superclass walk bound for signature and field scans.
pub const MAX_HIERARCHY_DEPTH: usize = 10;

pub const STRING: &str = "java.lang.String";

/// `class` followed by its superclasses, nearest first, up to the depth bound.
pub fn hierarchy<R: Runtime>(rt: &R, class: &R::Class) -> Vec<R::Class> {
    let mut out = vec![class.clone()];
    while out.len() <= MAX_HIERARCHY_DEPTH {
        let Some(sup) = out.last().and_then(|c| rt.superclass(c)) else { break };
        if rt.class_name(&sup).as_deref() == Some("java.lang.Object") {
            break;
        }
        out.push(sup);
    }
    out
}

// ============================================================
// Known-name probes
// ============================================================

/// First name in `names` declared anywhere in the hierarchy (instance or
/// static per `is_static`), resolved together with its descriptor.
///
/// Names are tried in list order so the preferred mapping generation wins.
pub fn known_field<R: Runtime>(
    rt: &R,
    class: &R::Class,
    names: &[&str],
    is_static: bool,
) -> Option<(R::Field, FieldDescriptor)> {
    let declared: Vec<(R::Class, FieldDescriptor)> = hierarchy(rt, class)
        .into_iter()
        .flat_map(|c| rt.declared_fields(&c).into_iter().map(move |f| (c.clone(), f)))
        .filter(|(_, f)| f.is_static == is_static)
        .collect();
    names.iter().find_map(|name| {
        let (owner, desc) = declared.iter().find(|(_, f)| f.name == *name)?;
        let id = rt.field(owner, &desc.name, &desc.type_name, is_static)?;
        Some((id, desc.clone()))
    })
}

/// Like `known_field`, but the declared type must be `kind`.
pub fn known_field_of_kind<R: Runtime>(
    rt: &R,
    class: &R::Class,
    names: &[&str],
    kind: TypeKind,
) -> Option<R::Field> {
    names.iter().find_map(|name| {
        let (id, desc) = known_field(rt, class, &[name], false)?;
        (desc.kind() == kind).then_some(id)
    })
}

/// Three coordinate fields of `kind` by one of several known name triples.
pub fn known_triplet<R: Runtime>(
    rt: &R,
    class: &R::Class,
    triples: &[[&str; 3]],
    kind: TypeKind,
) -> Option<[R::Field; 3]> {
    triples.iter().find_map(|names| {
        Some([
            known_field_of_kind(rt, class, &[names[0]], kind)?,
            known_field_of_kind(rt, class, &[names[1]], kind)?,
            known_field_of_kind(rt, class, &[names[2]], kind)?,
        ])
    })
}

// ============================================================
// Signature scans
// ============================================================

/// First zero-arg instance method in the hierarchy whose name is in
/// `aliases` (alias order wins) and whose return type satisfies `ret`.
/// Returns the declaring class, the descriptor and the resolved id.
pub fn zero_arg_method<R: Runtime>(
    rt: &R,
    class: &R::Class,
    aliases: &[&str],
    ret: impl Fn(&str) -> bool,
) -> Option<(R::Class, MethodDescriptor, R::Method)> {
    let declared: Vec<(R::Class, MethodDescriptor)> = hierarchy(rt, class)
        .into_iter()
        .flat_map(|c| rt.declared_methods(&c).into_iter().map(move |m| (c.clone(), m)))
        .filter(|(_, m)| !m.is_static && m.params.is_empty() && ret(&m.return_type))
        .collect();
    aliases.iter().find_map(|alias| {
        let (owner, desc) = declared.iter().find(|(_, m)| m.name == *alias)?;
        let id = rt.method(owner, &desc.name, &[], &desc.return_type)?;
        Some((owner.clone(), desc.clone(), id))
    })
}

/// First instance method with exactly `params` whose name is in `aliases`
/// (any name when `aliases` is empty) and whose return type satisfies `ret`.
pub fn method_with_params<R: Runtime>(
    rt: &R,
    class: &R::Class,
    aliases: &[&str],
    params: &[&str],
    ret: impl Fn(&str) -> bool,
) -> Option<(MethodDescriptor, R::Method)> {
    let declared: Vec<MethodDescriptor> = hierarchy(rt, class)
        .into_iter()
        .flat_map(|c| rt.declared_methods(&c))
        .filter(|m| !m.is_static && m.params.iter().eq(params.iter()) && ret(&m.return_type))
        .collect();
    let pick = if aliases.is_empty() {
        declared.first().cloned()
    } else {
        aliases.iter().find_map(|a| declared.iter().find(|m| m.name == *a).cloned())
    }?;
    let id = rt.method(class, &pick.name, params, &pick.return_type)?;
    Some((pick, id))
}

/// Whether the hierarchy declares any method named in `aliases`.
pub fn declares_any_method<R: Runtime>(rt: &R, class: &R::Class, aliases: &[&str]) -> bool {
    hierarchy(rt, class)
        .iter()
        .flat_map(|c| rt.declared_methods(c))
        .any(|m| aliases.contains(&m.name.as_str()))
}

pub fn returns_kind(kind: TypeKind) -> impl Fn(&str) -> bool {
    move |t| TypeKind::of(t) == kind
}

pub fn returns_named(name: &'static str) -> impl Fn(&str) -> bool {
    move |t| t == name
}

// ============================================================
// Type-identity scans
// ============================================================

/// Declared instance fields across the hierarchy, nearest class first, in
/// declaration order.
pub fn instance_fields<R: Runtime>(rt: &R, class: &R::Class) -> Vec<(R::Class, FieldDescriptor)> {
    hierarchy(rt, class)
        .into_iter()
        .flat_map(|c| rt.declared_fields(&c).into_iter().map(move |f| (c.clone(), f)))
        .filter(|(_, f)| !f.is_static)
        .collect()
}

/// First instance field whose declared type is exactly `type_name`.
pub fn first_field_of_type<R: Runtime>(rt: &R, class: &R::Class, type_name: &str) -> Option<R::Field> {
    instance_fields(rt, class)
        .into_iter()
        .filter(|(_, f)| f.type_name == type_name)
        .find_map(|(owner, f)| rt.field(&owner, &f.name, &f.type_name, false))
}

/// The first `N` fields of `type_name` (static or not) declared by a single
/// class, in declaration order. Classes are tried nearest first, or base
/// class first when `base_first` is set.
pub fn positional_fields<R: Runtime, const N: usize>(
    rt: &R,
    class: &R::Class,
    type_name: &str,
    is_static: bool,
    base_first: bool,
) -> Option<[R::Field; N]> {
    let mut chain = hierarchy(rt, class);
    if base_first {
        chain.reverse();
    }
    chain.iter().find_map(|owner| {
        let ids: Vec<R::Field> = rt
            .declared_fields(owner)
            .iter()
            .filter(|f| f.is_static == is_static && f.type_name == type_name)
            .take(N)
            .map_while(|f| rt.field(owner, &f.name, &f.type_name, is_static))
            .collect();
        ids.try_into().ok()
    })
}

// ============================================================
// Value-shape validation
// ============================================================

/// Among instance fields of `obj`'s class whose declared type is accepted
/// by `declared`, pick the first whose live contents pass `accept`.
///
/// `accept` sees a small sample of the collection (or map values) held in
/// the field, and is only called for non-empty samples.
pub fn validated_collection_field<R: Runtime>(
    rt: &R,
    class: &R::Class,
    obj: &R::Object,
    declared: impl Fn(&FieldDescriptor) -> bool,
    sample: usize,
    accept: impl Fn(&[R::Object]) -> bool,
) -> Option<R::Field> {
    instance_fields(rt, class)
        .into_iter()
        .filter(|(_, f)| declared(f))
        .find_map(|(owner, f)| {
            let id = rt.field(&owner, &f.name, &f.type_name, false)?;
            let value = rt.read_object(obj, id)?;
            let items = rt.collection(&value, sample);
            (!items.is_empty() && accept(&items)).then_some(id)
        })
}
