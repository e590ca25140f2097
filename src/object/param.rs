//! Typed parameter store.
//!
//! Parameters are written without validation: names the object does not
//! understand are kept and simply never read by its commit logic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::{IVec2, IVec3, Vec2, Vec3, Vec4};

use super::handle::Handle;

/// A tagged parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i32),
    Float(f32),
    Bool(bool),
    Vec2f(Vec2),
    Vec3f(Vec3),
    Vec4f(Vec4),
    Vec2i(IVec2),
    Vec3i(IVec3),
    Object(Handle),
    ObjectArray(Arc<[Handle]>),
    /// Opaque host pointer, stored as an address and never dereferenced.
    VoidPtr(usize),
    FloatArray(Arc<[f32]>),
    Vec3fArray(Arc<[Vec3]>),
}

impl ParamValue {
    /// Object handle if this is an object reference.
    pub fn as_object(&self) -> Option<Handle> {
        match self {
            ParamValue::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Every object handle this value references.
    pub fn handles(&self) -> Vec<Handle> {
        match self {
            ParamValue::Object(handle) => vec![*handle],
            ParamValue::ObjectArray(handles) => handles.to_vec(),
            _ => Vec::new(),
        }
    }
}

/// Name → value map of an object's (uncommitted) parameters.
#[derive(Clone, Debug, Default)]
pub struct ParamSet {
    values: HashMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Option<ParamValue> {
        self.values.insert(name.to_string(), value)
    }

    /// Drop a value, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every object handle referenced by a parameter.
    pub fn object_refs(&self) -> Vec<Handle> {
        self.values.values().flat_map(ParamValue::handles).collect()
    }

    /// Remove every parameter, returning the object handles they referenced.
    pub fn drain_object_refs(&mut self) -> Vec<Handle> {
        self.values.drain().flat_map(|(_, v)| v.handles()).collect()
    }

    pub fn get_f32(&self, name: &str, default: f32) -> f32 {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    pub fn get_i32(&self, name: &str, default: i32) -> i32 {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            Some(ParamValue::Int(v)) => *v != 0,
            _ => default,
        }
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.values.get(name) {
            Some(ParamValue::String(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn get_vec2f(&self, name: &str, default: Vec2) -> Vec2 {
        match self.values.get(name) {
            Some(ParamValue::Vec2f(v)) => *v,
            _ => default,
        }
    }

    /// Vec3 parameter; a single float is splatted.
    pub fn get_vec3f(&self, name: &str, default: Vec3) -> Vec3 {
        match self.values.get(name) {
            Some(ParamValue::Vec3f(v)) => *v,
            Some(ParamValue::Float(v)) => Vec3::splat(*v),
            _ => default,
        }
    }

    pub fn get_vec4f(&self, name: &str, default: Vec4) -> Vec4 {
        match self.values.get(name) {
            Some(ParamValue::Vec4f(v)) => *v,
            Some(ParamValue::Vec3f(v)) => v.extend(1.0),
            _ => default,
        }
    }

    pub fn get_vec3i(&self, name: &str, default: IVec3) -> IVec3 {
        match self.values.get(name) {
            Some(ParamValue::Vec3i(v)) => *v,
            _ => default,
        }
    }

    pub fn get_object(&self, name: &str) -> Option<Handle> {
        self.values.get(name).and_then(ParamValue::as_object)
    }

    pub fn get_object_array(&self, name: &str) -> Option<Arc<[Handle]>> {
        match self.values.get(name) {
            Some(ParamValue::ObjectArray(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn get_float_array(&self, name: &str) -> Option<Arc<[f32]>> {
        match self.values.get(name) {
            Some(ParamValue::FloatArray(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn get_vec3f_array(&self, name: &str) -> Option<Arc<[Vec3]>> {
        match self.values.get(name) {
            Some(ParamValue::Vec3fArray(v)) => Some(v.clone()),
            _ => None,
        }
    }
}
