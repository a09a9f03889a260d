//! Scene description data: values, attributes and prim specs as authored in a layer.

use std::collections::BTreeMap;

use ferry_math::{DMat4, DVec2, DVec3, DVec4};

use super::ScenePath;

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    Vec2(DVec2),
    Vec3(DVec3),
    Vec4(DVec4),
    Matrix(DMat4),
    String(String),
    Token(String),
    Asset(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    Vec2Array(Vec<DVec2>),
    Vec3Array(Vec<DVec3>),
    Vec4Array(Vec<DVec4>),
    MatrixArray(Vec<DMat4>),
    StringArray(Vec<String>),
    TokenArray(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<DVec3> {
        match self {
            Value::Vec3(v) => Some(*v),
            Value::Double(d) => Some(DVec3::splat(*d)),
            Value::Int(i) => Some(DVec3::splat(*i as f64)),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<DMat4> {
        match self {
            Value::Matrix(m) => Some(*m),
            _ => None,
        }
    }

    /// String, token or asset path contents.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Token(s) | Value::Asset(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3_array(&self) -> Option<&[DVec3]> {
        match self {
            Value::Vec3Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_token_array(&self) -> Option<&[String]> {
        match self {
            Value::TokenArray(v) | Value::StringArray(v) => Some(v),
            _ => None,
        }
    }

    /// Linear interpolation between two samples. Values that cannot be
    /// blended (or arrays whose lengths differ) hold the earlier sample.
    pub fn lerp(&self, other: &Value, t: f64) -> Value {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => Value::Double(a + (b - a) * t),
            (Value::Vec2(a), Value::Vec2(b)) => Value::Vec2(a.lerp(*b, t)),
            (Value::Vec3(a), Value::Vec3(b)) => Value::Vec3(a.lerp(*b, t)),
            (Value::Vec4(a), Value::Vec4(b)) => Value::Vec4(a.lerp(*b, t)),
            (Value::DoubleArray(a), Value::DoubleArray(b)) if a.len() == b.len() => {
                Value::DoubleArray(a.iter().zip(b).map(|(x, y)| x + (y - x) * t).collect())
            }
            (Value::Vec3Array(a), Value::Vec3Array(b)) if a.len() == b.len() => {
                Value::Vec3Array(a.iter().zip(b).map(|(x, y)| x.lerp(*y, t)).collect())
            }
            _ => self.clone(),
        }
    }
}

/// One authored time sample.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSample {
    pub time: f64,
    pub value: Value,
}

/// An attribute as authored: default value plus optional time samples
/// (kept sorted by time).
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub type_name: String,
    pub uniform: bool,
    pub default: Option<Value>,
    pub samples: Vec<TimeSample>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            uniform: false,
            default: None,
            samples: Vec::new(),
        }
    }

    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }

    pub fn is_varying(&self) -> bool {
        self.samples.len() > 1
    }

    /// Authored sample times in ascending order.
    pub fn sample_times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Value at `time`: time samples win over the default, interpolated
    /// linearly between bracketing samples and held past either end.
    /// `None` time asks for the default value.
    pub fn value_at(&self, time: Option<f64>) -> Option<Value> {
        let Some(time) = time else {
            return self.default.clone().or_else(|| self.samples.first().map(|s| s.value.clone()));
        };
        if self.samples.is_empty() {
            return self.default.clone();
        }

        let upper = self.samples.partition_point(|s| s.time <= time);
        if upper == 0 {
            return Some(self.samples[0].value.clone());
        }
        let lower = &self.samples[upper - 1];
        if upper == self.samples.len() || lower.time == time {
            return Some(lower.value.clone());
        }
        let next = &self.samples[upper];
        let t = (time - lower.time) / (next.time - lower.time);
        Some(lower.value.lerp(&next.value, t))
    }

    /// Inserts or replaces a sample, keeping the list sorted.
    pub fn set_sample(&mut self, time: f64, value: Value) {
        let idx = self.samples.partition_point(|s| s.time < time);
        match self.samples.get_mut(idx) {
            Some(existing) if existing.time == time => existing.value = value,
            _ => self.samples.insert(idx, TimeSample { time, value }),
        }
    }
}

/// How a prim spec contributes to the composed prim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

/// A reference arc: an optional external layer plus an optional target prim.
/// Without a target prim the referenced layer's default prim is used.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub asset: Option<String>,
    pub prim_path: Option<ScenePath>,
}

/// A named variant set with its variants in authored order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantSetSpec {
    pub name: String,
    /// Each variant body is a prim spec named after the variant.
    pub variants: Vec<PrimSpec>,
}

/// A prim spec as authored in one layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimSpec {
    pub specifier: Specifier,
    pub type_name: Option<String>,
    pub name: String,
    pub active: Option<bool>,
    pub instanceable: Option<bool>,
    pub kind: Option<String>,
    pub references: Vec<Reference>,
    pub api_schemas: Vec<String>,
    /// Authored `variants = { ... }` selections.
    pub variant_selections: BTreeMap<String, String>,
    /// Names from `variantSets` metadata.
    pub variant_set_names: Vec<String>,
    pub variant_sets: Vec<VariantSetSpec>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<PrimSpec>,
}

impl PrimSpec {
    pub fn new(specifier: Specifier, type_name: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            specifier,
            type_name: type_name.map(str::to_string),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn variant_set(&self, name: &str) -> Option<&VariantSetSpec> {
        self.variant_sets.iter().find(|v| v.name == name)
    }
}

/// Layer-level metadata from the header block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMetadata {
    pub default_prim: Option<String>,
    pub time_codes_per_second: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub meters_per_unit: Option<f64>,
    pub up_axis: Option<String>,
    pub doc: Option<String>,
}
