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

//! Framing of evaluator output into one unit per request
//!
//! The evaluator prints short results on a single line. Longer attribute sets
//! and lists are printed as a block: an opening line holding only `{` or `[`,
//! indented member lines, and a closing line starting with the matching
//! bracket. The [`FrameAssembler`] turns a stream of lines into [`Frame`]s.

use std::fmt;

/// One complete unit of evaluator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Single rendered line
    Line(String),
    /// Bracket-delimited block, lines joined with `\n` including both brackets
    Block(String),
}

impl Frame {
    /// Rendered text of the frame
    pub fn text(&self) -> &str {
        match self {
            Self::Line(text) | Self::Block(text) => text,
        }
    }

    /// Consume the frame, returning its rendered text
    pub fn into_text(self) -> String {
        match self {
            Self::Line(text) | Self::Block(text) => text,
        }
    }

    /// Whether this frame is a multi-line block
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Accumulates output lines into frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    open: Option<OpenBlock>,
}

#[derive(Debug)]
struct OpenBlock {
    closer: char,
    lines: Vec<String>,
}

impl FrameAssembler {
    /// Create an assembler with no open block
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator), returning a frame once complete
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return None;
        }

        if let Some(block) = self.open.as_mut() {
            block.lines.push(line.to_string());
            if line.starts_with(block.closer) {
                let block = self.open.take()?;
                return Some(Frame::Block(block.lines.join("\n")));
            }
            return None;
        }

        let closer = match line {
            "{" => '}',
            "[" => ']',
            _ => return Some(Frame::Line(line.to_string())),
        };
        self.open = Some(OpenBlock {
            closer,
            lines: vec![line.to_string()],
        });
        None
    }

    /// Whether a block has been opened but not yet closed
    pub fn is_mid_frame(&self) -> bool {
        self.open.is_some()
    }

    /// Number of lines buffered in the open block
    pub fn pending_lines(&self) -> usize {
        self.open.as_ref().map_or(0, |block| block.lines.len())
    }
}
