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

//! Terminal escape sequence scrubbing

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Single-character escapes, C1 controls, and CSI sequences (ESC [ or 0x9B)
// with parameter and intermediate bytes.
static ESCAPE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\x1B[@-Z\\-_]|[\x80-\x9A\x9C-\x9F]|(?:\x1B\[|\x9B)[0-?]*[ -/]*[@-~])").unwrap()
});

/// Remove color and control escape sequences from evaluator output
pub fn strip_escapes(text: &str) -> Cow<'_, str> {
    ESCAPE_SEQUENCE.replace_all(text, "")
}
