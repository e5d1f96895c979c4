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

//! Stream workers owned by a session
//!
//! Each evaluator stream gets its own task. The tasks talk to the session
//! through single-slot channels and stop once their stream or channel closes.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::escape::strip_escapes;
use super::frame::{Frame, FrameAssembler};
use crate::error::{InspectError, Result};

/// Size of a single read from the diagnostic stream
///
/// A read returning fewer bytes marks the end of one report.
pub const DIAGNOSTIC_CHUNK: usize = 1024;

/// Out-of-band event delivered to a waiting evaluation
#[derive(Debug)]
pub enum Diagnostic {
    /// The evaluator reported an error for the current expression
    EvalFailure(String),
    /// Reading or writing an evaluator stream failed
    StreamFailure(std::io::Error),
}

/// Write each queued expression to the evaluator, one per line
pub async fn forward_requests<W>(
    mut requests: mpsc::Receiver<String>,
    mut sink: W,
    faults: mpsc::Sender<Diagnostic>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(expression) = requests.recv().await {
        tracing::debug!(expression = %expression, "sending expression");
        if let Err(err) = write_line(&mut sink, &expression).await {
            tracing::error!(error = %err, "failed to write to evaluator");
            let _ = faults.send(Diagnostic::StreamFailure(err)).await;
            break;
        }
    }

    if let Err(err) = sink.shutdown().await {
        tracing::debug!(error = %err, "evaluator input already closed");
    }
    tracing::debug!("request forwarder stopped");
}

async fn write_line<W>(sink: &mut W, expression: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(expression.as_bytes()).await?;
    sink.write_all(b"\n").await?;
    sink.flush().await
}

/// Read evaluator output and deliver one frame per completed unit
pub async fn frame_output<R>(source: R, frames: mpsc::Sender<Result<Frame>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(source).lines();
    let mut assembler = FrameAssembler::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = strip_escapes(&line);
                if let Some(frame) = assembler.push_line(&line)
                    && frames.send(Ok(frame)).await.is_err()
                {
                    break;
                }
            }
            Ok(None) => {
                if assembler.is_mid_frame() {
                    let message = format!(
                        "evaluator output closed inside a block after {} lines",
                        assembler.pending_lines()
                    );
                    let _ = frames.send(Err(InspectError::protocol(message))).await;
                }
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read evaluator output");
                let _ = frames.send(Err(err.into())).await;
                break;
            }
        }
    }

    tracing::debug!("output framer stopped");
}

/// Drain the diagnostic stream, forwarding error reports
pub async fn drain_diagnostics<R>(
    mut source: R,
    error_marker: String,
    diagnostics: mpsc::Sender<Diagnostic>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; DIAGNOSTIC_CHUNK];
    let mut report = Vec::new();

    loop {
        match source.read(&mut chunk).await {
            Ok(0) => {
                if let Some(message) = classify(&report, &error_marker) {
                    let _ = diagnostics.send(Diagnostic::EvalFailure(message)).await;
                }
                break;
            }
            Ok(n) => {
                report.extend_from_slice(&chunk[..n]);
                if n < DIAGNOSTIC_CHUNK {
                    let buffered = std::mem::take(&mut report);
                    if let Some(message) = classify(&buffered, &error_marker)
                        && diagnostics
                            .send(Diagnostic::EvalFailure(message))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read evaluator diagnostics");
                let _ = diagnostics.send(Diagnostic::StreamFailure(err)).await;
                break;
            }
        }
    }

    tracing::debug!("diagnostics drainer stopped");
}

/// Classify one buffered report, returning the message if it is an error
pub fn classify(report: &[u8], error_marker: &str) -> Option<String> {
    let text = String::from_utf8_lossy(report);
    let text = strip_escapes(&text);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.starts_with(error_marker) {
        Some(text.to_string())
    } else {
        tracing::debug!(output = text, "evaluator info");
        None
    }
}
