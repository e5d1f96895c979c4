// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed values decoded from the evaluator's scalar renderings

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;

/// Marker the evaluator uses for values it cannot print (lambdas, derivations, ...)
pub const OPAQUE_MARKER: char = '«';

/// A scalar value as rendered by the evaluator
///
/// Decoding never fails: renderings that match no known literal are kept as
/// [`Value::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null`
    Null,

    /// `true` or `false`
    Bool(bool),

    /// Integer literal
    Int(i64),

    /// Floating point literal
    Float(f64),

    /// Double-quoted string with the quotes trimmed
    String(String),

    /// Path literal (`/...`, `./...`, `../...`)
    Path(String),

    /// Non-printable value such as `«lambda @ ...»`, kept verbatim
    Opaque(String),

    /// `[ ]`
    EmptyList,

    /// `{ }`
    EmptyAttrs,

    /// Rendering that matched no known literal
    Raw(String),
}

impl Value {
    /// Decode one rendered scalar line
    pub fn decode(rendered: &str) -> Self {
        match rendered {
            "[ ]" => return Self::EmptyList,
            "null" => return Self::Null,
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            "{ }" => return Self::EmptyAttrs,
            _ => {}
        }

        if rendered.starts_with(OPAQUE_MARKER) {
            return Self::Opaque(rendered.to_string());
        }

        // Only the surrounding quotes are trimmed, escapes stay as rendered.
        if rendered.starts_with('"') {
            return Self::String(rendered.trim_matches('"').to_string());
        }

        if let Ok(i) = rendered.parse::<i64>() {
            return Self::Int(i);
        }

        if let Ok(f) = rendered.parse::<f64>() {
            return Self::Float(f);
        }

        if rendered.starts_with('/') || rendered.starts_with("./") || rendered.starts_with("../") {
            return Self::Path(rendered.to_string());
        }

        tracing::warn!(value = rendered, "unrecognized literal");
        Self::Raw(rendered.to_string())
    }

    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's kind, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Path(_) => "path",
            Self::Opaque(_) => "opaque",
            Self::EmptyList => "list",
            Self::EmptyAttrs => "set",
            Self::Raw(_) => "raw",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Path(p) | Self::Opaque(p) | Self::Raw(p) => write!(f, "{p}"),
            Self::EmptyList => write!(f, "[ ]"),
            Self::EmptyAttrs => write!(f, "{{ }}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::String(s) | Self::Path(s) | Self::Opaque(s) | Self::Raw(s) => {
                serializer.serialize_str(s)
            }
            Self::EmptyList => serializer.serialize_seq(Some(0))?.end(),
            Self::EmptyAttrs => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::from(i),
            Value::Float(x) => serde_json::Number::from_f64(x).map_or(Self::Null, Self::Number),
            Value::String(s) | Value::Path(s) | Value::Opaque(s) | Value::Raw(s) => Self::String(s),
            Value::EmptyList => Self::Array(Vec::new()),
            Value::EmptyAttrs => Self::Object(serde_json::Map::new()),
        }
    }
}
