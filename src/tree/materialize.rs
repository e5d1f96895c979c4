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


//! Recursive conversion of configuration values into JSON
//!
//! The evaluator prints nested lists and sets lazily, as `[ ... ]` and
//! `{ ... }`. The [`Materializer`] forces them one level at a time: lists are
//! walked with `builtins.length` and `builtins.elemAt`, sets by selecting each
//! attribute. Output it cannot parse is kept as a JSON string.

use serde_json::{Map, Value as JsonValue};

use super::parse::{self, FieldValue, Shape, attr_selector, join_path};
use crate::error::{InspectError, Result};
use crate::session::Session;
use crate::value::Value;

/// Nesting beyond this depth is exported as `null`
pub const MAX_DEPTH: usize = 64;

pub(crate) struct Materializer<'a> {
    session: &'a mut Session,
    skip: &'a [String],
}

impl<'a> Materializer<'a> {
    pub(crate) fn new(session: &'a mut Session, skip: &'a [String]) -> Self {
        Self { session, skip }
    }

    /// Fully evaluate `expression`, reached through `path`
    pub(crate) async fn value(
        &mut self,
        expression: &str,
        path: &str,
        depth: usize,
    ) -> Result<JsonValue> {
        if self.is_skipped(path, expression) {
            tracing::debug!(path, "skipping configured path");
            return Ok(JsonValue::Null);
        }
        if depth > MAX_DEPTH {
            tracing::warn!(path, depth, "value nested too deeply");
            return Ok(JsonValue::Null);
        }

        let frame = self.session.evaluate_frame(expression).await?;
        let text = frame.text();
        if text.starts_with('[') && text != "[ ]" {
            return self.list(expression, path, depth).await;
        }

        let set = match parse::classify(expression, &frame) {
            Ok(Shape::Scalar(value)) => return Ok(value.into()),
            Ok(Shape::Set(set)) => set,
            Err(InspectError::UnexpectedFrame { .. }) => {
                tracing::debug!(path, "keeping unparsed value as text");
                return Ok(JsonValue::String(frame.into_text()));
            }
            Err(err) => return Err(err),
        };

        let mut object = Map::with_capacity(set.attributes.len());
        for attribute in set.attributes {
            let child_path = join_path(path, &attribute.name);
            let value = match attribute.value {
                FieldValue::Scalar(value) if !is_nested(&value) => value.into(),
                FieldValue::Scalar(_) | FieldValue::Placeholder => {
                    let child = format!("{expression}.{}", attr_selector(&attribute.name));
                    self.child(&child, &child_path, depth).await?
                }
            };
            object.insert(attribute.name, value);
        }
        Ok(JsonValue::Object(object))
    }

    async fn list(&mut self, expression: &str, path: &str, depth: usize) -> Result<JsonValue> {
        let length = self.session.length(expression).await?;
        let mut elements = Vec::with_capacity(length);
        for index in 0..length {
            let element = format!("(builtins.elemAt ({expression}) {index})");
            let element_path = join_path(path, &index.to_string());
            elements.push(self.child(&element, &element_path, depth).await?);
        }
        Ok(JsonValue::Array(elements))
    }

    /// Nested value; local failures become `null`
    async fn child(&mut self, expression: &str, path: &str, depth: usize) -> Result<JsonValue> {
        match Box::pin(self.value(expression, path, depth + 1)).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(path, error = %err, "could not evaluate nested value");
                Ok(JsonValue::Null)
            }
        }
    }

    fn is_skipped(&self, path: &str, expression: &str) -> bool {
        self.skip
            .iter()
            .any(|skip| skip == path || skip == expression)
    }
}

/// Whether a value rendered in place still needs its own evaluation
fn is_nested(value: &Value) -> bool {
    matches!(value, Value::Raw(text) if text.starts_with('[') || text.starts_with('{'))
}
