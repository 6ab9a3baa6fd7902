// host/mod.rs - Reflection facade over the host runtime.
//
// Discovery and the state reader never talk to the VM directly. They go
// through `Runtime`, which exposes just enough structural reflection to walk
// an obfuscated object graph: enumerate classes, read declared members,
// look fields/methods up by name and type, read values and invoke methods.
//
// Every operation is infallible from the caller's point of view. A host-side
// exception is cleared where it happens and comes back as `None` (or an
// empty list), so "try the next heuristic" is a plain `.or_else` chain.
//
// A runtime can only be built with a `&PollThread`, and neither the token nor
// the runtime is `Send`. Code that only receives snapshots (render callback,
// network thread) therefore has no way to reach a host method.

pub mod jvm;
#[cfg(test)]
pub mod synthetic;

use crate::error::{BridgeError, Result};
use std::cell::Cell;
use std::marker::PhantomData;

// ============================================================
// Polling-thread capability
// ============================================================

thread_local! {
    static CLAIMED: Cell<bool> = const { Cell::new(false) };
}

/// Proof that the current thread is the designated polling thread.
///
/// Claimed once per thread, released on drop. Not `Send`/`Sync`, so it can
/// never be handed to another thread.
#[derive(Debug)]
pub struct PollThread {
    _not_send: PhantomData<*const ()>,
}

impl PollThread {
    pub fn claim() -> Result<Self> {
        CLAIMED.with(|c| {
            if c.get() {
                return Err(BridgeError::PollThreadClaimed);
            }
            c.set(true);
            Ok(PollThread { _not_send: PhantomData })
        })
    }
}

impl Drop for PollThread {
    fn drop(&mut self) {
        CLAIMED.with(|c| c.set(false));
    }
}

// ============================================================
// Values and descriptors
// ============================================================

/// A value read from a field or returned by a method.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<O> {
    Null,
    Object(O),
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl<O> Value<O> {
    pub fn object(self) -> Option<O> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Any numeric value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(v) => Some(v as f64),
            Value::Long(v) => Some(v as f64),
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// Primitive shape of a declared type, keyed off its qualified name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    Object,
}

impl TypeKind {
    pub fn of(type_name: &str) -> Self {
        match type_name {
            "boolean" => TypeKind::Boolean,
            "byte" => TypeKind::Byte,
            "char" => TypeKind::Char,
            "short" => TypeKind::Short,
            "int" => TypeKind::Int,
            "long" => TypeKind::Long,
            "float" => TypeKind::Float,
            "double" => TypeKind::Double,
            "void" => TypeKind::Void,
            _ => TypeKind::Object,
        }
    }

    fn code(self) -> Option<char> {
        Some(match self {
            TypeKind::Boolean => 'Z',
            TypeKind::Byte => 'B',
            TypeKind::Char => 'C',
            TypeKind::Short => 'S',
            TypeKind::Int => 'I',
            TypeKind::Long => 'J',
            TypeKind::Float => 'F',
            TypeKind::Double => 'D',
            TypeKind::Void => 'V',
            TypeKind::Object => return None,
        })
    }
}

/// VM type descriptor for a qualified type name, e.g. `double` -> `D`,
/// `java.util.List` -> `Ljava/util/List;`, `[I` stays `[I`.
pub fn descriptor(type_name: &str) -> String {
    if let Some(c) = TypeKind::of(type_name).code() {
        return c.to_string();
    }
    let slashed = type_name.replace('.', "/");
    if slashed.starts_with('[') {
        slashed
    } else {
        format!("L{};", slashed)
    }
}

/// Method descriptor, e.g. `(II)Lnet/minecraft/Chunk;`.
pub fn method_descriptor(params: &[&str], ret: &str) -> String {
    let mut s = String::from("(");
    for p in params {
        s.push_str(&descriptor(p));
    }
    s.push(')');
    s.push_str(&descriptor(ret));
    s
}

/// Last component of a qualified class name, nested-class suffix included.
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
    pub is_static: bool,
}

impl FieldDescriptor {
    pub fn kind(&self) -> TypeKind {
        TypeKind::of(&self.type_name)
    }
}

#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
}

/// Structural view of one host class, built transiently during discovery.
#[derive(Clone, Debug)]
pub struct HostClassDescriptor<C> {
    pub class: C,
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    pub superclass: Option<C>,
}

impl<C> HostClassDescriptor<C> {
    pub fn instance_field_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_static).count()
    }
}

/// A live host thread and the class loader its code runs under.
#[derive(Clone, Debug)]
pub struct HostThread<O> {
    pub name: String,
    pub context_loader: Option<O>,
}

// ============================================================
// Runtime facade
// ============================================================

pub trait Runtime {
    type Class: Clone + Send + Sync + 'static;
    type Object: Clone + Send + Sync + 'static;
    type Field: Copy + Send + Sync + 'static;
    type Method: Copy + Send + Sync + 'static;

    fn loaded_classes(&self) -> Vec<Self::Class>;
    fn live_threads(&self) -> Vec<HostThread<Self::Object>>;
    /// Load a class by qualified name through `loader` (bootstrap/system
    /// lookup when `None`).
    fn load_class(&self, loader: Option<&Self::Object>, name: &str) -> Option<Self::Class>;

    fn class_name(&self, class: &Self::Class) -> Option<String>;
    fn superclass(&self, class: &Self::Class) -> Option<Self::Class>;
    fn declared_fields(&self, class: &Self::Class) -> Vec<FieldDescriptor>;
    fn declared_methods(&self, class: &Self::Class) -> Vec<MethodDescriptor>;
    fn same_class(&self, a: &Self::Class, b: &Self::Class) -> bool;
    /// `sub` is `sup` or extends/implements it.
    fn is_assignable(&self, sub: &Self::Class, sup: &Self::Class) -> bool;

    /// Field lookup by name and declared type. Instance lookups also search
    /// superclasses.
    fn field(&self, class: &Self::Class, name: &str, type_name: &str, is_static: bool)
        -> Option<Self::Field>;
    fn method(&self, class: &Self::Class, name: &str, params: &[&str], ret: &str)
        -> Option<Self::Method>;

    fn read_static(&self, class: &Self::Class, field: Self::Field) -> Option<Value<Self::Object>>;
    fn read(&self, obj: &Self::Object, field: Self::Field) -> Option<Value<Self::Object>>;
    fn invoke(&self, obj: &Self::Object, method: Self::Method, args: &[Value<Self::Object>])
        -> Option<Value<Self::Object>>;

    fn class_of(&self, obj: &Self::Object) -> Option<Self::Class>;
    fn is_instance(&self, obj: &Self::Object, class: &Self::Class) -> bool;
    fn same_object(&self, a: &Self::Object, b: &Self::Object) -> bool;
    fn identity_hash(&self, obj: &Self::Object) -> i32;
    /// Contents of a host string object.
    fn string(&self, obj: &Self::Object) -> Option<String>;
    /// Elements of an object array (nulls preserved), at most `limit`.
    fn array(&self, obj: &Self::Object, limit: usize) -> Vec<Option<Self::Object>>;
    /// Non-null elements of a collection, or of a map's values, at most `limit`.
    fn collection(&self, obj: &Self::Object, limit: usize) -> Vec<Self::Object>;
    /// Constant name of an enum value.
    fn enum_name(&self, obj: &Self::Object) -> Option<String>;

    // -- conveniences ------------------------------------------------------

    fn read_object(&self, obj: &Self::Object, field: Self::Field) -> Option<Self::Object> {
        self.read(obj, field)?.object()
    }

    fn read_f64(&self, obj: &Self::Object, field: Self::Field) -> Option<f64> {
        self.read(obj, field)?.as_f64()
    }

    fn read_i32(&self, obj: &Self::Object, field: Self::Field) -> Option<i32> {
        self.read(obj, field)?.as_i32()
    }

    fn read_bool(&self, obj: &Self::Object, field: Self::Field) -> Option<bool> {
        self.read(obj, field)?.as_bool()
    }

    fn call(&self, obj: &Self::Object, method: Self::Method) -> Option<Value<Self::Object>> {
        self.invoke(obj, method, &[])
    }

    fn call_object(&self, obj: &Self::Object, method: Self::Method) -> Option<Self::Object> {
        self.call(obj, method)?.object()
    }

    fn class_name_of(&self, obj: &Self::Object) -> Option<String> {
        let class = self.class_of(obj)?;
        self.class_name(&class)
    }

    /// Structural descriptor of `class`.
    fn describe(&self, class: &Self::Class) -> Option<HostClassDescriptor<Self::Class>> {
        Some(HostClassDescriptor {
            name: self.class_name(class)?,
            fields: self.declared_fields(class),
            methods: self.declared_methods(class),
            superclass: self.superclass(class),
            class: class.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_for_common_types() {
        assert_eq!(descriptor("double"), "D");
        assert_eq!(descriptor("java.util.List"), "Ljava/util/List;");
        assert_eq!(descriptor("[Ljava.util.HashMap$Node;"), "[Ljava/util/HashMap$Node;");
        assert_eq!(method_descriptor(&["int", "int"], "net.minecraft.class_2818"), "(II)Lnet/minecraft/class_2818;");
        assert_eq!(method_descriptor(&[], "float"), "()F");
    }

    #[test]
    fn simple_names_keep_nested_suffix() {
        assert_eq!(simple_name("net.minecraft.client.gui.GuiChest"), "GuiChest");
        assert_eq!(simple_name("a.b$C"), "b$C");
        assert_eq!(simple_name("Plain"), "Plain");
    }

    #[test]
    fn poll_thread_is_claimed_once_per_thread() {
        std::thread::spawn(|| {
            let token = PollThread::claim().unwrap();
            assert!(matches!(PollThread::claim(), Err(BridgeError::PollThreadClaimed)));
            drop(token);
            assert!(PollThread::claim().is_ok());
        })
        .join()
        .unwrap();
    }
}
