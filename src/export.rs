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

//! Nested JSON export of option values

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{InspectError, Result};
use crate::tree::split_path;

/// Option values keyed by their dotted paths, nested one object per segment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OptionsTree {
    root: Map<String, JsonValue>,
}

impl OptionsTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Insert `value` at `path`, creating intermediate objects
    ///
    /// Fails when a prefix of `path` already holds a non-object value.
    /// Inserting at an existing path replaces the previous value.
    pub fn insert(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Err(InspectError::PathConflict {
                path: path.to_string(),
            });
        };

        let mut current = &mut self.root;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            current = match entry {
                JsonValue::Object(map) => map,
                _ => {
                    return Err(InspectError::PathConflict {
                        path: path.to_string(),
                    });
                }
            };
        }
        current.insert(last.clone(), value);
        Ok(())
    }

    /// Compact JSON rendering
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| InspectError::protocol(e.to_string()))
    }

    /// Indented JSON rendering
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| InspectError::protocol(e.to_string()))
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.root
    }
}
