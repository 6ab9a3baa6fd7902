// host/synthetic.rs - In-memory object graph implementing `Runtime`.
//
// Lets discovery and the state reader run against a hand-built class set:
// obfuscated names, singleton roots, hash map buckets and all. Only built
// for tests.

use super::{FieldDescriptor, HostThread, MethodDescriptor, Runtime, TypeKind, Value};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    pub owner: ClassId,
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodSlot {
    pub owner: ClassId,
    pub index: usize,
}

pub type Body = Rc<dyn Fn(&Synthetic, ObjId, &[Value<ObjId>]) -> Option<Value<ObjId>>>;

struct MethodDef {
    desc: MethodDescriptor,
    body: Body,
}

struct ClassDef {
    name: String,
    superclass: Option<ClassId>,
    interfaces: Vec<ClassId>,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDef>,
    statics: HashMap<String, Value<ObjId>>,
    /// Only loadable through this loader object when set.
    loader: Option<ObjId>,
}

#[derive(Default)]
struct ObjDef {
    class: usize,
    fields: HashMap<String, Value<ObjId>>,
    elements: Option<Vec<Option<ObjId>>>,
    text: Option<String>,
    enum_name: Option<String>,
}

pub struct Synthetic {
    classes: Vec<ClassDef>,
    objects: Vec<ObjDef>,
    threads: Vec<HostThread<ObjId>>,
    pub invocations: std::cell::Cell<usize>,
}

impl Default for Synthetic {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthetic {
    /// Empty graph with the handful of standard classes the bridge relies on.
    pub fn new() -> Self {
        let mut s = Synthetic {
            classes: Vec::new(),
            objects: Vec::new(),
            threads: Vec::new(),
            invocations: std::cell::Cell::new(0),
        };
        let object = s.class("java.lang.Object", None);
        s.class("java.lang.String", Some(object));
        s.class("java.lang.ClassLoader", Some(object));
        let collection = s.class("java.util.Collection", None);
        let list = s.class("java.util.List", None);
        s.implements(list, collection);
        let array_list = s.class("java.util.ArrayList", Some(object));
        s.implements(array_list, list);
        let map = s.class("java.util.Map", None);
        let hash_map = s.class("java.util.HashMap", Some(object));
        s.implements(hash_map, map);
        s.add_field(hash_map, "table", "[Ljava.util.HashMap$Node;", false);
        let node = s.class("java.util.HashMap$Node", Some(object));
        s.add_field(node, "key", "java.lang.Object", false);
        s.add_field(node, "value", "java.lang.Object", false);
        s.add_field(node, "next", "java.util.HashMap$Node", false);
        s.class("[Ljava.util.HashMap$Node;", Some(object));
        s.class("java.nio.FloatBuffer", Some(object));
        s.class("java.nio.IntBuffer", Some(object));
        s
    }

    // -- building -----------------------------------------------------------

    pub fn class(&mut self, name: &str, superclass: Option<ClassId>) -> ClassId {
        self.classes.push(ClassDef {
            name: name.to_string(),
            superclass,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            statics: HashMap::new(),
            loader: None,
        });
        ClassId(self.classes.len() - 1)
    }

    pub fn implements(&mut self, class: ClassId, iface: ClassId) {
        self.classes[class.0].interfaces.push(iface);
    }

    pub fn restrict_to_loader(&mut self, class: ClassId, loader: ObjId) {
        self.classes[class.0].loader = Some(loader);
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, type_name: &str, is_static: bool) {
        self.classes[class.0].fields.push(FieldDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_static,
        });
    }

    /// Remove a declared field, as if this host version never had it.
    pub fn drop_field(&mut self, class: ClassId, name: &str) {
        self.classes[class.0].fields.retain(|f| f.name != name);
    }

    /// Rename a declared field, carrying existing object values along.
    pub fn rename_field(&mut self, class: ClassId, from: &str, to: &str) {
        for f in self.classes[class.0].fields.iter_mut().filter(|f| f.name == from) {
            f.name = to.to_string();
        }
        for o in &mut self.objects {
            if let Some(v) = o.fields.remove(from) {
                o.fields.insert(to.to_string(), v);
            }
        }
    }

    /// Add `count` filler instance fields (for root-size thresholds).
    pub fn filler_fields(&mut self, class: ClassId, count: usize) {
        for i in 0..count {
            self.add_field(class, &format!("filler_{i}"), "int", false);
        }
    }

    pub fn add_method(
        &mut self,
        class: ClassId,
        name: &str,
        params: &[&str],
        ret: &str,
        body: impl Fn(&Synthetic, ObjId, &[Value<ObjId>]) -> Option<Value<ObjId>> + 'static,
    ) {
        self.classes[class.0].methods.push(MethodDef {
            desc: MethodDescriptor {
                name: name.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
                return_type: ret.to_string(),
                is_static: false,
            },
            body: Rc::new(body),
        });
    }

    /// Zero-arg method returning the named instance field.
    pub fn getter(&mut self, class: ClassId, name: &str, ret: &str, field: &str) {
        let field = field.to_string();
        self.add_method(class, name, &[], ret, move |s, this, _| s.get(this, &field));
    }

    pub fn object(&mut self, class: ClassId) -> ObjId {
        self.objects.push(ObjDef { class: class.0, ..Default::default() });
        ObjId(self.objects.len() - 1)
    }

    pub fn set(&mut self, obj: ObjId, field: &str, value: Value<ObjId>) {
        self.objects[obj.0].fields.insert(field.to_string(), value);
    }

    pub fn set_static(&mut self, class: ClassId, field: &str, value: Value<ObjId>) {
        self.classes[class.0].statics.insert(field.to_string(), value);
    }

    pub fn get(&self, obj: ObjId, field: &str) -> Option<Value<ObjId>> {
        self.objects[obj.0].fields.get(field).cloned()
    }

    pub fn new_string(&mut self, text: &str) -> ObjId {
        let class = self.find("java.lang.String").unwrap_or(ClassId(0));
        let id = self.object(class);
        self.objects[id.0].text = Some(text.to_string());
        id
    }

    pub fn enum_value(&mut self, class: ClassId, name: &str) -> ObjId {
        let id = self.object(class);
        self.objects[id.0].enum_name = Some(name.to_string());
        id
    }

    pub fn list(&mut self, items: &[ObjId]) -> ObjId {
        let class = self.find("java.util.ArrayList").unwrap_or(ClassId(0));
        let id = self.object(class);
        self.objects[id.0].elements = Some(items.iter().copied().map(Some).collect());
        id
    }

    /// A hash map with one bucket per entry; entries past `buckets` are
    /// chained through `next` so bucket walking is exercised.
    pub fn hash_map(&mut self, entries: &[(ObjId, ObjId)], buckets: usize) -> ObjId {
        let map_class = self.find("java.util.HashMap").unwrap_or(ClassId(0));
        let node_class = self.find("java.util.HashMap$Node").unwrap_or(ClassId(0));
        let table_class = self.find("[Ljava.util.HashMap$Node;").unwrap_or(ClassId(0));

        let buckets = buckets.max(1);
        let mut heads: Vec<Option<ObjId>> = vec![None; buckets];
        for (i, &(k, v)) in entries.iter().enumerate() {
            let node = self.object(node_class);
            self.set(node, "key", Value::Object(k));
            self.set(node, "value", Value::Object(v));
            let slot = i % buckets;
            let next = heads[slot].map_or(Value::Null, Value::Object);
            self.set(node, "next", next);
            heads[slot] = Some(node);
        }
        let table = self.object(table_class);
        self.objects[table.0].elements = Some(heads);

        let map = self.object(map_class);
        self.set(map, "table", Value::Object(table));
        self.objects[map.0].elements = Some(entries.iter().map(|&(_, v)| Some(v)).collect());
        map
    }

    pub fn thread(&mut self, name: &str, loader: Option<ObjId>) {
        self.threads.push(HostThread { name: name.to_string(), context_loader: loader });
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.classes.iter().position(|c| c.name == name).map(ClassId)
    }

    fn supers(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(class), move |c| self.classes[c.0].superclass)
    }

    fn default_for(type_name: &str) -> Value<ObjId> {
        match TypeKind::of(type_name) {
            TypeKind::Boolean => Value::Bool(false),
            TypeKind::Float => Value::Float(0.0),
            TypeKind::Double => Value::Double(0.0),
            TypeKind::Long => Value::Long(0),
            TypeKind::Object | TypeKind::Void => Value::Null,
            _ => Value::Int(0),
        }
    }
}

impl Runtime for Synthetic {
    type Class = ClassId;
    type Object = ObjId;
    type Field = FieldSlot;
    type Method = MethodSlot;

    fn loaded_classes(&self) -> Vec<ClassId> {
        (0..self.classes.len()).map(ClassId).collect()
    }

    fn live_threads(&self) -> Vec<HostThread<ObjId>> {
        self.threads.clone()
    }

    fn load_class(&self, loader: Option<&ObjId>, name: &str) -> Option<ClassId> {
        let id = self.find(name)?;
        match self.classes[id.0].loader {
            Some(required) if Some(&required) != loader => None,
            _ => Some(id),
        }
    }

    fn class_name(&self, class: &ClassId) -> Option<String> {
        Some(self.classes.get(class.0)?.name.clone())
    }

    fn superclass(&self, class: &ClassId) -> Option<ClassId> {
        self.classes.get(class.0)?.superclass
    }

    fn declared_fields(&self, class: &ClassId) -> Vec<FieldDescriptor> {
        self.classes[class.0].fields.clone()
    }

    fn declared_methods(&self, class: &ClassId) -> Vec<MethodDescriptor> {
        self.classes[class.0].methods.iter().map(|m| m.desc.clone()).collect()
    }

    fn same_class(&self, a: &ClassId, b: &ClassId) -> bool {
        a == b
    }

    fn is_assignable(&self, sub: &ClassId, sup: &ClassId) -> bool {
        let mut pending = vec![*sub];
        while let Some(c) = pending.pop() {
            if c == *sup {
                return true;
            }
            let def = &self.classes[c.0];
            pending.extend(def.superclass);
            pending.extend(def.interfaces.iter().copied());
        }
        false
    }

    fn field(&self, class: &ClassId, name: &str, type_name: &str, is_static: bool) -> Option<FieldSlot> {
        for owner in self.supers(*class) {
            let hit = self.classes[owner.0].fields.iter().position(|f| {
                f.name == name && f.type_name == type_name && f.is_static == is_static
            });
            if let Some(index) = hit {
                return Some(FieldSlot { owner, index });
            }
            if is_static {
                break;
            }
        }
        None
    }

    fn method(&self, class: &ClassId, name: &str, params: &[&str], ret: &str) -> Option<MethodSlot> {
        for owner in self.supers(*class) {
            let hit = self.classes[owner.0].methods.iter().position(|m| {
                m.desc.name == name && m.desc.return_type == ret && m.desc.params.iter().eq(params.iter())
            });
            if let Some(index) = hit {
                return Some(MethodSlot { owner, index });
            }
        }
        None
    }

    fn read_static(&self, class: &ClassId, field: FieldSlot) -> Option<Value<ObjId>> {
        let desc = &self.classes[field.owner.0].fields[field.index];
        let def = self.classes.get(class.0)?;
        Some(def.statics.get(&desc.name).cloned().unwrap_or_else(|| Self::default_for(&desc.type_name)))
    }

    fn read(&self, obj: &ObjId, field: FieldSlot) -> Option<Value<ObjId>> {
        let o = self.objects.get(obj.0)?;
        if !self.is_assignable(&ClassId(o.class), &field.owner) {
            return None;
        }
        let desc = &self.classes[field.owner.0].fields[field.index];
        Some(o.fields.get(&desc.name).cloned().unwrap_or_else(|| Self::default_for(&desc.type_name)))
    }

    fn invoke(&self, obj: &ObjId, method: MethodSlot, args: &[Value<ObjId>]) -> Option<Value<ObjId>> {
        self.invocations.set(self.invocations.get() + 1);
        let o = self.objects.get(obj.0)?;
        if !self.is_assignable(&ClassId(o.class), &method.owner) {
            return None;
        }
        let body = self.classes[method.owner.0].methods[method.index].body.clone();
        body(self, *obj, args)
    }

    fn class_of(&self, obj: &ObjId) -> Option<ClassId> {
        Some(ClassId(self.objects.get(obj.0)?.class))
    }

    fn is_instance(&self, obj: &ObjId, class: &ClassId) -> bool {
        self.class_of(obj).is_some_and(|c| self.is_assignable(&c, class))
    }

    fn same_object(&self, a: &ObjId, b: &ObjId) -> bool {
        a == b
    }

    fn identity_hash(&self, obj: &ObjId) -> i32 {
        0x1000 + obj.0 as i32
    }

    fn string(&self, obj: &ObjId) -> Option<String> {
        self.objects.get(obj.0)?.text.clone()
    }

    fn array(&self, obj: &ObjId, limit: usize) -> Vec<Option<ObjId>> {
        self.objects
            .get(obj.0)
            .and_then(|o| o.elements.clone())
            .map(|e| e.into_iter().take(limit).collect())
            .unwrap_or_default()
    }

    fn collection(&self, obj: &ObjId, limit: usize) -> Vec<ObjId> {
        self.invocations.set(self.invocations.get() + 1);
        self.array(obj, usize::MAX).into_iter().flatten().take(limit).collect()
    }

    fn enum_name(&self, obj: &ObjId) -> Option<String> {
        self.objects.get(obj.0)?.enum_name.clone()
    }
}
