//! Typed parameter ports.
//!
//! Every module owns two [`ParamList`]s, one for inputs and one for outputs.
//! Ports are created once while the module declares its parameters and keep
//! their [`ParamType`] for the rest of their life. Values are a tagged union
//! ([`ParamValue`]); handing a port a value of the wrong variant is a bug in
//! the calling module and panics, whereas a bad component index on a vector
//! port is reported as [`EngineError::OutOfRange`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Value type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Float,
    Float3,
    Float4,
    Int,
    String,
    Texture,
}

impl ParamType {
    /// Wire-format name used in port specifications (`name:type`).
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Float => "float",
            ParamType::Float3 => "float3",
            ParamType::Float4 => "float4",
            ParamType::Int => "int",
            ParamType::String => "string",
            ParamType::Texture => "texture",
        }
    }

    /// Number of addressable float components, zero for non-vector types.
    pub fn components(&self) -> usize {
        match self {
            ParamType::Float => 1,
            ParamType::Float3 => 3,
            ParamType::Float4 => 4,
            _ => 0,
        }
    }

    /// Zero value of this type.
    pub fn zero(&self) -> ParamValue {
        match self {
            ParamType::Float => ParamValue::Float(0.0),
            ParamType::Float3 => ParamValue::Float3([0.0; 3]),
            ParamType::Float4 => ParamValue::Float4([0.0; 4]),
            ParamType::Int => ParamValue::Int(0),
            ParamType::String => ParamValue::String(String::new()),
            ParamType::Texture => ParamValue::Texture(None),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "float" => Ok(ParamType::Float),
            "float3" => Ok(ParamType::Float3),
            "float4" => Ok(ParamType::Float4),
            "int" => Ok(ParamType::Int),
            "string" => Ok(ParamType::String),
            "texture" => Ok(ParamType::Texture),
            other => Err(EngineError::InvalidSpec(format!("unknown param type `{other}`"))),
        }
    }
}

/// Opaque handle to a texture owned by the graphics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

/// A port value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Int(i32),
    String(String),
    Texture(Option<TextureId>),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Float3(_) => ParamType::Float3,
            ParamValue::Float4(_) => ParamType::Float4,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::String(_) => ParamType::String,
            ParamValue::Texture(_) => ParamType::Texture,
        }
    }

    /// Converts a JSON value from a State file into a value of type `ty`.
    ///
    /// Numbers are accepted for `float` and `int`, arrays of the right
    /// length for vector types, strings for `string`, and an integer or
    /// `null` for `texture`.
    pub fn from_json(ty: ParamType, value: &serde_json::Value) -> Option<Self> {
        match ty {
            ParamType::Float => value.as_f64().map(|v| ParamValue::Float(v as f32)),
            ParamType::Float3 => floats_from_json::<3>(value).map(ParamValue::Float3),
            ParamType::Float4 => floats_from_json::<4>(value).map(ParamValue::Float4),
            ParamType::Int => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(ParamValue::Int),
            ParamType::String => value.as_str().map(|s| ParamValue::String(s.to_string())),
            ParamType::Texture => {
                if value.is_null() {
                    Some(ParamValue::Texture(None))
                } else {
                    value
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .map(|id| ParamValue::Texture(Some(TextureId(id))))
                }
            }
        }
    }

    /// Component `index` of a float or vector value.
    pub fn component(&self, index: usize) -> Result<f32> {
        let len = self.param_type().components();
        let value = match self {
            ParamValue::Float(v) if index == 0 => Some(*v),
            ParamValue::Float3(v) => v.get(index).copied(),
            ParamValue::Float4(v) => v.get(index).copied(),
            _ => None,
        };
        value.ok_or(EngineError::OutOfRange { index, len })
    }

    fn set_component(&mut self, value: f32, index: usize) -> Result<()> {
        let len = self.param_type().components();
        let slot = match self {
            ParamValue::Float(v) if index == 0 => Some(v),
            ParamValue::Float3(v) => v.get_mut(index),
            ParamValue::Float4(v) => v.get_mut(index),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::OutOfRange { index, len }),
        }
    }
}

fn floats_from_json<const N: usize>(value: &serde_json::Value) -> Option<[f32; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamDirection {
    In,
    Out,
}

impl ParamDirection {
    pub fn name(&self) -> &'static str {
        match self {
            ParamDirection::In => "input",
            ParamDirection::Out => "output",
        }
    }
}

/// Index of a port inside its [`ParamList`].
///
/// Modules keep these handles from `declare_params` and use them in `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub(crate) usize);

impl ParamId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A single named, typed value slot.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    direction: ParamDirection,
    default: ParamValue,
    value: ParamValue,
}

impl Param {
    fn new(direction: ParamDirection, name: String, default: ParamValue) -> Self {
        Self {
            name,
            direction,
            value: default.clone(),
            default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_type(&self) -> ParamType {
        self.default.param_type()
    }

    pub fn direction(&self) -> ParamDirection {
        self.direction
    }

    pub fn get(&self) -> &ParamValue {
        &self.value
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    /// Replaces the value.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not match the port type.
    pub fn set(&mut self, value: ParamValue) {
        assert_eq!(
            value.param_type(),
            self.param_type(),
            "type mismatch writing port `{}`",
            self.name
        );
        self.value = value;
    }

    /// Writes one component of a float or vector port.
    pub fn set_component(&mut self, value: f32, index: usize) -> Result<()> {
        self.value.set_component(value, index)
    }

    pub fn component(&self, index: usize) -> Result<f32> {
        self.value.component(index)
    }

    /// Restores the declared default value.
    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

/// Ordered list of ports for one direction of one module.
#[derive(Debug, Clone)]
pub struct ParamList {
    direction: ParamDirection,
    params: Vec<Param>,
}

impl ParamList {
    pub fn new(direction: ParamDirection) -> Self {
        Self {
            direction,
            params: Vec::new(),
        }
    }

    pub fn direction(&self) -> ParamDirection {
        self.direction
    }

    /// Creates a port of type `ty` holding the type's zero value.
    pub fn create(&mut self, ty: ParamType, name: &str) -> ParamId {
        self.create_with_default(name, ty.zero())
    }

    /// Creates a port whose type and default come from `default`.
    ///
    /// # Panics
    ///
    /// Panics if a port with the same name already exists in this list.
    pub fn create_with_default(&mut self, name: &str, default: ParamValue) -> ParamId {
        assert!(
            self.find(name).is_none(),
            "duplicate {} port `{name}`",
            self.direction.name()
        );
        self.params
            .push(Param::new(self.direction, name.to_string(), default));
        ParamId(self.params.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.params
            .iter()
            .position(|param| param.name == name)
            .map(ParamId)
    }

    pub fn param(&self, id: ParamId) -> &Param {
        &self.params[id.0]
    }

    pub fn param_mut(&mut self, id: ParamId) -> &mut Param {
        &mut self.params[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, id: ParamId) -> &ParamValue {
        self.params[id.0].get()
    }

    pub fn set(&mut self, id: ParamId, value: ParamValue) {
        self.params[id.0].set(value);
    }

    pub fn set_component(&mut self, id: ParamId, value: f32, index: usize) -> Result<()> {
        self.params[id.0].set_component(value, index)
    }

    pub fn float(&self, id: ParamId) -> f32 {
        match self.get(id) {
            ParamValue::Float(v) => *v,
            other => type_panic(self.param(id), ParamType::Float, other),
        }
    }

    pub fn float3(&self, id: ParamId) -> [f32; 3] {
        match self.get(id) {
            ParamValue::Float3(v) => *v,
            other => type_panic(self.param(id), ParamType::Float3, other),
        }
    }

    pub fn float4(&self, id: ParamId) -> [f32; 4] {
        match self.get(id) {
            ParamValue::Float4(v) => *v,
            other => type_panic(self.param(id), ParamType::Float4, other),
        }
    }

    pub fn int(&self, id: ParamId) -> i32 {
        match self.get(id) {
            ParamValue::Int(v) => *v,
            other => type_panic(self.param(id), ParamType::Int, other),
        }
    }

    pub fn string(&self, id: ParamId) -> &str {
        match self.get(id) {
            ParamValue::String(v) => v,
            other => type_panic(self.param(id), ParamType::String, other),
        }
    }

    pub fn set_float(&mut self, id: ParamId, value: f32) {
        self.set(id, ParamValue::Float(value));
    }

    pub fn set_float3(&mut self, id: ParamId, value: [f32; 3]) {
        self.set(id, ParamValue::Float3(value));
    }

    pub fn set_float4(&mut self, id: ParamId, value: [f32; 4]) {
        self.set(id, ParamValue::Float4(value));
    }

    pub fn set_int(&mut self, id: ParamId, value: i32) {
        self.set(id, ParamValue::Int(value));
    }
}

fn type_panic(param: &Param, wanted: ParamType, found: &ParamValue) -> ! {
    panic!(
        "port `{}` read as {wanted} but holds {}",
        param.name(),
        found.param_type()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_ports_start_at_zero() {
        let mut list = ParamList::new(ParamDirection::Out);
        let id = list.create(ParamType::Float3, "result_float3");

        assert_eq!(list.float3(id), [0.0; 3]);
        assert_eq!(list.param(id).param_type(), ParamType::Float3);
        assert_eq!(list.find("result_float3"), Some(id));
    }

    #[test]
    fn component_access_on_vectors() {
        let mut list = ParamList::new(ParamDirection::Out);
        let id = list.create(ParamType::Float4, "color");

        list.set_component(id, 0.5, 3).unwrap();
        assert_eq!(list.float4(id), [0.0, 0.0, 0.0, 0.5]);
        assert_eq!(list.param(id).component(3).unwrap(), 0.5);
    }

    #[test]
    fn out_of_range_component_is_reported() {
        let mut list = ParamList::new(ParamDirection::Out);
        let id = list.create(ParamType::Float3, "pos");

        let err = list.set_component(id, 1.0, 3).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange { index: 3, len: 3 }));
        assert_eq!(list.float3(id), [0.0; 3]);
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn mismatched_set_panics() {
        let mut list = ParamList::new(ParamDirection::In);
        let id = list.create(ParamType::Float, "param1");
        list.set(id, ParamValue::Int(3));
    }

    #[test]
    #[should_panic(expected = "duplicate input port")]
    fn duplicate_names_panic() {
        let mut list = ParamList::new(ParamDirection::In);
        list.create(ParamType::Float, "a");
        list.create(ParamType::Int, "a");
    }

    #[test]
    fn parses_json_values_by_type() {
        let vec = serde_json::json!([1.0, 2.0, 3.0]);
        assert_eq!(
            ParamValue::from_json(ParamType::Float3, &vec),
            Some(ParamValue::Float3([1.0, 2.0, 3.0]))
        );
        assert_eq!(ParamValue::from_json(ParamType::Float4, &vec), None);
        assert_eq!(
            ParamValue::from_json(ParamType::Texture, &serde_json::Value::Null),
            Some(ParamValue::Texture(None))
        );
    }

    #[test]
    fn type_names_round_trip() {
        for ty in [
            ParamType::Float,
            ParamType::Float3,
            ParamType::Float4,
            ParamType::Int,
            ParamType::String,
            ParamType::Texture,
        ] {
            assert_eq!(ty.name().parse::<ParamType>().unwrap(), ty);
        }
        assert!("matrix".parse::<ParamType>().is_err());
    }
}
