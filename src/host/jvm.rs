// host/jvm.rs - `Runtime` backed by JNI, with JVMTI for class enumeration.
//
// Every handle handed out is a `GlobalRef`; the local reference it was
// promoted from is deleted right away. The polling thread is a native thread
// that stays attached for the whole session, so nothing ever pops its local
// frame for us.

use super::{
    descriptor, method_descriptor, FieldDescriptor, HostThread, MethodDescriptor, PollThread,
    Runtime, TypeKind, Value,
};
use jni::objects::{
    GlobalRef, JClass, JFieldID, JMethodID, JObject, JObjectArray, JStaticFieldID, JString, JValue,
    JValueOwned,
};
use jni::signature::{JavaType, Primitive, ReturnType};
use jni::sys::{jclass, jint, jvalue};
use jni::JNIEnv;
use std::cell::RefCell;
use std::ffi::c_void;
use tracing::warn;

const MODIFIER_STATIC: i32 = 0x0008;

// ============================================================
// Handles
// ============================================================

/// Resolved field locator. The raw id is valid on any thread for the life
/// of the class, so it is stored as an address.
#[derive(Clone, Copy, Debug)]
pub struct JvmField {
    raw: usize,
    is_static: bool,
    kind: TypeKind,
}

#[derive(Clone, Copy, Debug)]
pub struct JvmMethod {
    raw: usize,
    ret: TypeKind,
}

/// Standard classes looked up once per runtime.
struct Known {
    map: GlobalRef,
    collection: GlobalRef,
    thread: GlobalRef,
    system: GlobalRef,
}

pub struct JvmRuntime {
    env: RefCell<JNIEnv<'static>>,
    vm: *mut jni::sys::JavaVM,
    known: Known,
}

impl JvmRuntime {
    /// Wrap the polling thread's attached environment.
    pub fn new(env: JNIEnv<'static>, _thread: &PollThread) -> Option<Self> {
        let mut env = env;
        let vm = env.get_java_vm().ok()?.get_java_vm_pointer();
        let known = Known {
            map: find_global(&mut env, "java/util/Map")?,
            collection: find_global(&mut env, "java/util/Collection")?,
            thread: find_global(&mut env, "java/lang/Thread")?,
            system: find_global(&mut env, "java/lang/System")?,
        };
        Some(Self { env: RefCell::new(env), vm, known })
    }
}

// ============================================================
// Call-site helpers
// ============================================================

/// Turn a JNI result into an `Option`, clearing any pending exception.
fn guard<T>(env: &mut JNIEnv, r: jni::errors::Result<T>) -> Option<T> {
    let pending = env.exception_check().unwrap_or(false);
    if pending {
        let _ = env.exception_clear();
    }
    match r {
        Ok(v) if !pending => Some(v),
        _ => None,
    }
}

/// Promote a local reference to a global one and drop the local.
fn promote(env: &mut JNIEnv, local: JObject) -> Option<GlobalRef> {
    if local.is_null() {
        return None;
    }
    let global = env.new_global_ref(&local).ok();
    let _ = env.delete_local_ref(local);
    global
}

fn find_global(env: &mut JNIEnv, name: &str) -> Option<GlobalRef> {
    let r = env.find_class(name);
    let class = guard(env, r)?;
    promote(env, class.into())
}

fn return_type(kind: TypeKind) -> ReturnType {
    match kind {
        TypeKind::Object => ReturnType::Object,
        k => ReturnType::Primitive(primitive(k)),
    }
}

fn primitive(kind: TypeKind) -> Primitive {
    match kind {
        TypeKind::Boolean => Primitive::Boolean,
        TypeKind::Byte => Primitive::Byte,
        TypeKind::Char => Primitive::Char,
        TypeKind::Short => Primitive::Short,
        TypeKind::Int => Primitive::Int,
        TypeKind::Long => Primitive::Long,
        TypeKind::Float => Primitive::Float,
        TypeKind::Double => Primitive::Double,
        TypeKind::Void | TypeKind::Object => Primitive::Void,
    }
}

fn to_value(env: &mut JNIEnv, v: JValueOwned, kind: TypeKind) -> Option<Value<GlobalRef>> {
    Some(match kind {
        TypeKind::Boolean => Value::Bool(v.z().ok()?),
        TypeKind::Byte => Value::Int(v.b().ok()? as i32),
        TypeKind::Char => Value::Int(v.c().ok()? as i32),
        TypeKind::Short => Value::Int(v.s().ok()? as i32),
        TypeKind::Int => Value::Int(v.i().ok()?),
        TypeKind::Long => Value::Long(v.j().ok()?),
        TypeKind::Float => Value::Float(v.f().ok()?),
        TypeKind::Double => Value::Double(v.d().ok()?),
        TypeKind::Void => Value::Null,
        TypeKind::Object => {
            let o = v.l().ok()?;
            if o.is_null() {
                Value::Null
            } else {
                Value::Object(promote(env, o)?)
            }
        }
    })
}

fn to_jvalue(v: &Value<GlobalRef>) -> jvalue {
    match v {
        Value::Null => jvalue { l: std::ptr::null_mut() },
        Value::Object(o) => JValue::Object(o.as_obj()).as_jni(),
        Value::Bool(b) => JValue::Bool(*b as u8).as_jni(),
        Value::Int(i) => JValue::Int(*i).as_jni(),
        Value::Long(l) => JValue::Long(*l).as_jni(),
        Value::Float(f) => JValue::Float(*f).as_jni(),
        Value::Double(d) => JValue::Double(*d).as_jni(),
    }
}

/// Call a no-arg method returning an object, keeping the result local.
fn call_local<'a>(env: &mut JNIEnv<'a>, obj: &JObject, name: &str, sig: &str) -> Option<JObject<'a>> {
    let r = env.call_method(obj, name, sig, &[]);
    let o = guard(env, r)?.l().ok()?;
    if o.is_null() {
        None
    } else {
        Some(o)
    }
}

/// Read a host string and drop the local reference to it.
fn take_string(env: &mut JNIEnv, obj: JObject) -> Option<String> {
    if obj.is_null() {
        return None;
    }
    let js = JString::from(obj);
    let r = env.get_string(&js).map(String::from);
    let s = guard(env, r);
    let _ = env.delete_local_ref(js);
    s
}

fn call_string(env: &mut JNIEnv, obj: &JObject, name: &str) -> Option<String> {
    let o = call_local(env, obj, name, "()Ljava/lang/String;")?;
    take_string(env, o)
}

fn call_int(env: &mut JNIEnv, obj: &JObject, name: &str) -> Option<i32> {
    let r = env.call_method(obj, name, "()I", &[]);
    guard(env, r)?.i().ok()
}

/// Name of a `java.lang.Class` object held locally; drops the local.
fn take_class_name(env: &mut JNIEnv, class: JObject) -> Option<String> {
    let name = call_string(env, &class, "getName");
    let _ = env.delete_local_ref(class);
    name
}

/// Elements of an object array held locally, each passed to `f`; drops the
/// array and every element.
fn for_each_local<'a>(
    env: &mut JNIEnv<'a>,
    array: JObject<'a>,
    limit: usize,
    mut f: impl FnMut(&mut JNIEnv<'a>, JObject<'a>),
) {
    let array = JObjectArray::from(array);
    let len = env.get_array_length(&array).unwrap_or(0).max(0) as usize;
    for i in 0..len.min(limit) {
        let r = env.get_object_array_element(&array, i as jint);
        if let Some(item) = guard(env, r) {
            f(env, item);
        }
    }
    let _ = env.delete_local_ref(array);
}

// ============================================================
// JVMTI class enumeration
// ============================================================

const JVMTI_VERSION_1_2: jint = 0x3001_0200;
// 0-based positions in the jvmtiInterface_1_ function table.
const SLOT_DEALLOCATE: usize = 46;
const SLOT_GET_LOADED_CLASSES: usize = 77;

type JvmtiEnv = *mut *const *const c_void;
type GetLoadedClassesFn = unsafe extern "system" fn(JvmtiEnv, *mut jint, *mut *mut jclass) -> u32;
type DeallocateFn = unsafe extern "system" fn(JvmtiEnv, *mut u8) -> u32;

unsafe fn jvmti_env(vm: *mut jni::sys::JavaVM) -> Option<JvmtiEnv> {
    if vm.is_null() {
        return None;
    }
    let get_env = (**vm).GetEnv?;
    let mut env: *mut c_void = std::ptr::null_mut();
    if get_env(vm, &mut env, JVMTI_VERSION_1_2) != 0 || env.is_null() {
        return None;
    }
    Some(env as JvmtiEnv)
}

unsafe fn jvmti_slot(env: JvmtiEnv, index: usize) -> *const c_void {
    *(*env).add(index)
}

// ============================================================
// Runtime
// ============================================================

impl Runtime for JvmRuntime {
    type Class = GlobalRef;
    type Object = GlobalRef;
    type Field = JvmField;
    type Method = JvmMethod;

    fn loaded_classes(&self) -> Vec<GlobalRef> {
        let mut env = self.env.borrow_mut();
        let mut out = Vec::new();
        unsafe {
            let Some(ti) = jvmti_env(self.vm) else {
                warn!("JVMTI unavailable; class enumeration disabled");
                return out;
            };
            let get: GetLoadedClassesFn = std::mem::transmute(jvmti_slot(ti, SLOT_GET_LOADED_CLASSES));
            let dealloc: DeallocateFn = std::mem::transmute(jvmti_slot(ti, SLOT_DEALLOCATE));

            let mut count: jint = 0;
            let mut classes: *mut jclass = std::ptr::null_mut();
            if get(ti, &mut count, &mut classes) != 0 || classes.is_null() {
                return out;
            }
            out.reserve(count.max(0) as usize);
            for i in 0..count.max(0) as usize {
                let local = JObject::from_raw(*classes.add(i) as jni::sys::jobject);
                if let Some(g) = promote(&mut env, local) {
                    out.push(g);
                }
            }
            dealloc(ti, classes as *mut u8);
        }
        out
    }

    fn live_threads(&self) -> Vec<HostThread<GlobalRef>> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let mut out = Vec::new();

        let thread_class: &JClass = self.known.thread.as_obj().into();
        let r = env.call_static_method(thread_class, "getAllStackTraces", "()Ljava/util/Map;", &[]);
        let Some(traces) = guard(env, r).and_then(|v| v.l().ok()) else {
            return out;
        };
        let keys = call_local(env, &traces, "keySet", "()Ljava/util/Set;");
        let _ = env.delete_local_ref(traces);
        let Some(keys) = keys else { return out };
        let array = call_local(env, &keys, "toArray", "()[Ljava/lang/Object;");
        let _ = env.delete_local_ref(keys);
        let Some(array) = array else { return out };

        for_each_local(env, array, usize::MAX, |env, thread| {
            let name = call_string(env, &thread, "getName").unwrap_or_default();
            let loader = call_local(env, &thread, "getContextClassLoader", "()Ljava/lang/ClassLoader;")
                .and_then(|l| promote(env, l));
            let _ = env.delete_local_ref(thread);
            out.push(HostThread { name, context_loader: loader });
        });
        out
    }

    fn load_class(&self, loader: Option<&GlobalRef>, name: &str) -> Option<GlobalRef> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        match loader {
            Some(loader) => {
                let r = env.new_string(name);
                let jname = guard(env, r)?;
                let r = env.call_method(
                    loader.as_obj(),
                    "loadClass",
                    "(Ljava/lang/String;)Ljava/lang/Class;",
                    &[JValue::Object(&jname)],
                );
                let _ = env.delete_local_ref(jname);
                let class = guard(env, r)?.l().ok()?;
                promote(env, class)
            }
            None => find_global(env, &name.replace('.', "/")),
        }
    }

    fn class_name(&self, class: &GlobalRef) -> Option<String> {
        let mut env = self.env.borrow_mut();
        call_string(&mut env, class.as_obj(), "getName")
    }

    fn superclass(&self, class: &GlobalRef) -> Option<GlobalRef> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let sup = call_local(env, class.as_obj(), "getSuperclass", "()Ljava/lang/Class;")?;
        promote(env, sup)
    }

    fn declared_fields(&self, class: &GlobalRef) -> Vec<FieldDescriptor> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let mut out = Vec::new();
        let Some(fields) = call_local(env, class.as_obj(), "getDeclaredFields", "()[Ljava/lang/reflect/Field;")
        else {
            return out;
        };
        for_each_local(env, fields, usize::MAX, |env, f| {
            let name = call_string(env, &f, "getName");
            let type_name = call_local(env, &f, "getType", "()Ljava/lang/Class;")
                .and_then(|t| take_class_name(env, t));
            let modifiers = call_int(env, &f, "getModifiers").unwrap_or(0);
            let _ = env.delete_local_ref(f);
            if let (Some(name), Some(type_name)) = (name, type_name) {
                out.push(FieldDescriptor { name, type_name, is_static: modifiers & MODIFIER_STATIC != 0 });
            }
        });
        out
    }

    fn declared_methods(&self, class: &GlobalRef) -> Vec<MethodDescriptor> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let mut out = Vec::new();
        let Some(methods) =
            call_local(env, class.as_obj(), "getDeclaredMethods", "()[Ljava/lang/reflect/Method;")
        else {
            return out;
        };
        for_each_local(env, methods, usize::MAX, |env, m| {
            let name = call_string(env, &m, "getName");
            let return_type = call_local(env, &m, "getReturnType", "()Ljava/lang/Class;")
                .and_then(|t| take_class_name(env, t));
            let mut params = Vec::new();
            if let Some(types) = call_local(env, &m, "getParameterTypes", "()[Ljava/lang/Class;") {
                for_each_local(env, types, usize::MAX, |env, t| {
                    params.push(take_class_name(env, t).unwrap_or_default());
                });
            }
            let modifiers = call_int(env, &m, "getModifiers").unwrap_or(0);
            let _ = env.delete_local_ref(m);
            if let (Some(name), Some(return_type)) = (name, return_type) {
                out.push(MethodDescriptor {
                    name,
                    params,
                    return_type,
                    is_static: modifiers & MODIFIER_STATIC != 0,
                });
            }
        });
        out
    }

    fn same_class(&self, a: &GlobalRef, b: &GlobalRef) -> bool {
        self.same_object(a, b)
    }

    fn is_assignable(&self, sub: &GlobalRef, sup: &GlobalRef) -> bool {
        let mut env = self.env.borrow_mut();
        let sub: &JClass = sub.as_obj().into();
        let sup: &JClass = sup.as_obj().into();
        let r = env.is_assignable_from(sub, sup);
        guard(&mut env, r).unwrap_or(false)
    }

    fn field(&self, class: &GlobalRef, name: &str, type_name: &str, is_static: bool) -> Option<JvmField> {
        let mut env = self.env.borrow_mut();
        let cls: &JClass = class.as_obj().into();
        let sig = descriptor(type_name);
        let raw = if is_static {
            let r = env.get_static_field_id(cls, name, &sig);
            guard(&mut env, r)?.into_raw() as usize
        } else {
            let r = env.get_field_id(cls, name, &sig);
            guard(&mut env, r)?.into_raw() as usize
        };
        Some(JvmField { raw, is_static, kind: TypeKind::of(type_name) })
    }

    fn method(&self, class: &GlobalRef, name: &str, params: &[&str], ret: &str) -> Option<JvmMethod> {
        let mut env = self.env.borrow_mut();
        let cls: &JClass = class.as_obj().into();
        let r = env.get_method_id(cls, name, method_descriptor(params, ret));
        let id = guard(&mut env, r)?;
        Some(JvmMethod { raw: id.into_raw() as usize, ret: TypeKind::of(ret) })
    }

    fn read_static(&self, class: &GlobalRef, field: JvmField) -> Option<Value<GlobalRef>> {
        if !field.is_static {
            return None;
        }
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let cls: &JClass = class.as_obj().into();
        let id = unsafe { JStaticFieldID::from_raw(field.raw as jni::sys::jfieldID) };
        let ty = match field.kind {
            TypeKind::Object => JavaType::Object(String::from("java/lang/Object")),
            k => JavaType::Primitive(primitive(k)),
        };
        #[allow(unused_unsafe)]
        let r = unsafe { env.get_static_field_unchecked(cls, id, ty) };
        let v = guard(env, r)?;
        to_value(env, v, field.kind)
    }

    fn read(&self, obj: &GlobalRef, field: JvmField) -> Option<Value<GlobalRef>> {
        if field.is_static {
            return None;
        }
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let id = unsafe { JFieldID::from_raw(field.raw as jni::sys::jfieldID) };
        let r = unsafe { env.get_field_unchecked(obj.as_obj(), id, return_type(field.kind)) };
        let v = guard(env, r)?;
        to_value(env, v, field.kind)
    }

    fn invoke(&self, obj: &GlobalRef, method: JvmMethod, args: &[Value<GlobalRef>]) -> Option<Value<GlobalRef>> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let id = unsafe { JMethodID::from_raw(method.raw as jni::sys::jmethodID) };
        let args: Vec<jvalue> = args.iter().map(to_jvalue).collect();
        let r = unsafe { env.call_method_unchecked(obj.as_obj(), id, return_type(method.ret), &args) };
        let v = guard(env, r)?;
        to_value(env, v, method.ret)
    }

    fn class_of(&self, obj: &GlobalRef) -> Option<GlobalRef> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let r = env.get_object_class(obj.as_obj());
        let class = guard(env, r)?;
        promote(env, class.into())
    }

    fn is_instance(&self, obj: &GlobalRef, class: &GlobalRef) -> bool {
        let mut env = self.env.borrow_mut();
        let cls: &JClass = class.as_obj().into();
        let r = env.is_instance_of(obj.as_obj(), cls);
        guard(&mut env, r).unwrap_or(false)
    }

    fn same_object(&self, a: &GlobalRef, b: &GlobalRef) -> bool {
        let mut env = self.env.borrow_mut();
        let r = env.is_same_object(a.as_obj(), b.as_obj());
        guard(&mut env, r).unwrap_or(false)
    }

    fn identity_hash(&self, obj: &GlobalRef) -> i32 {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let system: &JClass = self.known.system.as_obj().into();
        let r = env.call_static_method(
            system,
            "identityHashCode",
            "(Ljava/lang/Object;)I",
            &[JValue::Object(obj.as_obj())],
        );
        guard(env, r).and_then(|v| v.i().ok()).unwrap_or(0)
    }

    fn string(&self, obj: &GlobalRef) -> Option<String> {
        let mut env = self.env.borrow_mut();
        let js: &JString = obj.as_obj().into();
        let r = env.get_string(js).map(String::from);
        guard(&mut env, r)
    }

    fn array(&self, obj: &GlobalRef, limit: usize) -> Vec<Option<GlobalRef>> {
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let array: &JObjectArray = obj.as_obj().into();
        let len = env.get_array_length(array).unwrap_or(0).max(0) as usize;
        let mut out = Vec::with_capacity(len.min(limit));
        for i in 0..len.min(limit) {
            let r = env.get_object_array_element(array, i as jint);
            let item = guard(env, r).and_then(|o| promote(env, o));
            out.push(item);
        }
        out
    }

    fn collection(&self, obj: &GlobalRef, limit: usize) -> Vec<GlobalRef> {
        let is_map = self.is_instance(obj, &self.known.map);
        if !is_map && !self.is_instance(obj, &self.known.collection) {
            return Vec::new();
        }
        let mut env = self.env.borrow_mut();
        let env = &mut *env;
        let array = if is_map {
            let Some(values) = call_local(env, obj.as_obj(), "values", "()Ljava/util/Collection;") else {
                return Vec::new();
            };
            let a = call_local(env, &values, "toArray", "()[Ljava/lang/Object;");
            let _ = env.delete_local_ref(values);
            a
        } else {
            call_local(env, obj.as_obj(), "toArray", "()[Ljava/lang/Object;")
        };
        let Some(array) = array else { return Vec::new() };

        let mut out = Vec::new();
        for_each_local(env, array, usize::MAX, |env, item| {
            if out.len() < limit {
                if let Some(g) = promote(env, item) {
                    out.push(g);
                }
            } else {
                let _ = env.delete_local_ref(item);
            }
        });
        out
    }

    fn enum_name(&self, obj: &GlobalRef) -> Option<String> {
        let mut env = self.env.borrow_mut();
        call_string(&mut env, obj.as_obj(), "name")
    }
}

// ============================================================
// VM lookup
// ============================================================

/// Find the VM already running in this process.
#[cfg(windows)]
pub fn locate_vm() -> crate::error::Result<jni::JavaVM> {
    use crate::error::BridgeError;
    use winapi::um::libloaderapi::{GetModuleHandleA, GetProcAddress};

    type GetCreatedVmsFn =
        unsafe extern "system" fn(*mut *mut jni::sys::JavaVM, jint, *mut jint) -> jint;

    unsafe {
        let module = GetModuleHandleA(b"jvm.dll\0".as_ptr() as _);
        if module.is_null() {
            return Err(BridgeError::VmNotFound);
        }
        let proc = GetProcAddress(module, b"JNI_GetCreatedJavaVMs\0".as_ptr() as _);
        if proc.is_null() {
            return Err(BridgeError::VmNotFound);
        }
        let get_vms: GetCreatedVmsFn = std::mem::transmute(proc);
        let mut vm: *mut jni::sys::JavaVM = std::ptr::null_mut();
        let mut count: jint = 0;
        if get_vms(&mut vm, 1, &mut count) != 0 || count == 0 || vm.is_null() {
            return Err(BridgeError::VmNotFound);
        }
        jni::JavaVM::from_raw(vm).map_err(|_| BridgeError::VmNotFound)
    }
}
