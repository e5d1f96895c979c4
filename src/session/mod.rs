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

//! Interactive evaluator session
//!
//! A [`Session`] owns one evaluator process (normally `nix repl`) and turns its
//! line-oriented read-eval-print protocol into a request/response call:
//! [`Session::evaluate`] sends one expression and waits for either one output
//! frame or one error report. Three tasks own the process streams for the
//! lifetime of the session.
//!
//! Only one evaluation can be outstanding at a time. All evaluating methods
//! take `&mut self`, so overlapping calls on one session do not compile and
//! replies never need to be correlated with requests.

mod config;
mod escape;
mod frame;
mod workers;

pub use config::{DEFAULT_CLOSE_GRACE, DEFAULT_ERROR_MARKER, SessionConfig};
pub use escape::strip_escapes;
pub use frame::{Frame, FrameAssembler};
pub use workers::DIAGNOSTIC_CHUNK;

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{InspectError, Result};
use crate::value::Value;
use workers::Diagnostic;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Streams are being wired up
    Starting,
    /// Idle and accepting expressions
    Ready,
    /// An expression is in flight
    Evaluating,
    /// Shutdown has begun
    Closing,
    /// Closed explicitly or after a fatal failure
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Evaluating => "evaluating",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session ends of the worker channels
struct Channels {
    requests: mpsc::Sender<String>,
    frames: mpsc::Receiver<Result<Frame>>,
    diagnostics: mpsc::Receiver<Diagnostic>,
}

impl Channels {
    /// Send one expression and wait for whichever reply arrives first
    async fn round_trip(&mut self, expression: &str) -> Result<Frame> {
        self.requests
            .send(expression.to_string())
            .await
            .map_err(|_| InspectError::protocol("request forwarder has stopped"))?;

        tokio::select! {
            frame = self.frames.recv() => match frame {
                Some(frame) => frame,
                None => Err(InspectError::protocol("evaluator output closed")),
            },
            Some(diagnostic) = self.diagnostics.recv() => match diagnostic {
                Diagnostic::EvalFailure(message) => Err(InspectError::eval(message)),
                Diagnostic::StreamFailure(err) => Err(err.into()),
            },
        }
    }
}

/// A running evaluator with its stream workers
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    child: Option<Child>,
    channels: Option<Channels>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start the configured evaluator process
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SessionConfig) -> Result<Self> {
        let mut command = Command::new(&config.program);
        command
            .args(config.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %config.program,
            preload = ?config.preload,
            "starting evaluator process"
        );
        let mut child = command.spawn().map_err(|e| {
            InspectError::process(format!("failed to start '{}': {e}", config.program))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InspectError::process("evaluator stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InspectError::process("evaluator stdout is not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InspectError::process("evaluator stderr is not piped"))?;

        let mut session = Self::from_streams(stdin, stdout, stderr, config);
        session.child = Some(child);
        Ok(session)
    }

    /// Run the protocol over already connected streams
    ///
    /// `input` receives expressions, `output` yields rendered results and
    /// `diagnostics` yields error reports. Must be called from within a tokio
    /// runtime.
    pub fn from_streams<W, R, E>(input: W, output: R, diagnostics: E, config: SessionConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let mut session = Self {
            config,
            state: SessionState::Starting,
            child: None,
            channels: None,
            workers: Vec::with_capacity(3),
        };

        let (requests_tx, requests_rx) = mpsc::channel(1);
        let (frames_tx, frames_rx) = mpsc::channel(1);
        let (diagnostics_tx, diagnostics_rx) = mpsc::channel(1);

        session.workers.push(tokio::spawn(workers::forward_requests(
            requests_rx,
            input,
            diagnostics_tx.clone(),
        )));
        session
            .workers
            .push(tokio::spawn(workers::frame_output(output, frames_tx)));
        session.workers.push(tokio::spawn(workers::drain_diagnostics(
            diagnostics,
            session.config.error_marker.clone(),
            diagnostics_tx,
        )));

        session.channels = Some(Channels {
            requests: requests_tx,
            frames: frames_rx,
            diagnostics: diagnostics_rx,
        });
        session.state = SessionState::Ready;
        session
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Evaluate an expression, returning its rendered text
    pub async fn evaluate(&mut self, expression: &str) -> Result<String> {
        self.evaluate_frame(expression).await.map(Frame::into_text)
    }

    /// Evaluate an expression, returning the raw output frame
    pub async fn evaluate_frame(&mut self, expression: &str) -> Result<Frame> {
        if self.state != SessionState::Ready {
            return Err(InspectError::Closed);
        }
        let Some(channels) = self.channels.as_mut() else {
            return Err(InspectError::Closed);
        };

        self.state = SessionState::Evaluating;
        let started = Instant::now();

        let reply = match self.config.eval_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, channels.round_trip(expression)).await {
                    Ok(reply) => reply,
                    Err(_) => Err(InspectError::Timeout {
                        expression: expression.to_string(),
                        timeout,
                    }),
                }
            }
            None => channels.round_trip(expression).await,
        };

        let elapsed = started.elapsed();
        match &reply {
            Ok(frame) => {
                tracing::debug!(expression, ?elapsed, result = frame.text(), "evaluation done");
                self.state = SessionState::Ready;
            }
            Err(InspectError::Eval { message }) => {
                tracing::debug!(expression, ?elapsed, error = %message, "evaluation failed");
                self.state = SessionState::Ready;
            }
            Err(err) => {
                tracing::error!(expression, ?elapsed, error = %err, "evaluator session failed");
                self.state = SessionState::Closed;
            }
        }
        reply
    }

    /// Evaluate an expression and decode the result as a scalar
    pub async fn value(&mut self, expression: &str) -> Result<Value> {
        let rendered = self.evaluate(expression).await?;
        Ok(Value::decode(&rendered))
    }

    /// Length of the list `expression` evaluates to
    pub async fn length(&mut self, expression: &str) -> Result<usize> {
        let query = format!("builtins.length ({expression})");
        let value = self.value(&query).await?;
        match value.as_int().map(usize::try_from) {
            Some(Ok(length)) => Ok(length),
            _ => Err(InspectError::UnexpectedValue {
                expression: query,
                expected: "list length",
                found: value.to_string(),
            }),
        }
    }

    /// Rendered element `index` of the list `expression` evaluates to
    pub async fn element_at(&mut self, expression: &str, index: usize) -> Result<String> {
        self.evaluate(&format!("builtins.elemAt ({expression}) {index}"))
            .await
    }

    /// Whether `expression` evaluates to an attribute set
    ///
    /// Expressions the evaluator rejects (missing attributes included) are not
    /// attribute sets. Failures of the session itself are still returned.
    pub async fn is_attrs(&mut self, expression: &str) -> Result<bool> {
        match self.value(&format!("builtins.isAttrs ({expression})")).await {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::debug!(expression, error = %err, "not an attribute set");
                Ok(false)
            }
        }
    }

    /// Shut the evaluator down
    ///
    /// Closes the evaluator's input, waits for it to exit (killing it after
    /// the configured grace period) and stops the stream workers. Safe to call
    /// more than once and after a failed evaluation; only the first call does
    /// any work.
    pub async fn close(&mut self) -> Result<()> {
        let Some(channels) = self.channels.take() else {
            return Ok(());
        };
        self.state = SessionState::Closing;

        let Channels {
            requests,
            frames,
            diagnostics,
        } = channels;
        drop(requests);

        let status = match self.child.take() {
            Some(mut child) => Some(wait_for_exit(&mut child, self.config.close_grace).await),
            None => None,
        };

        drop(frames);
        drop(diagnostics);
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "session worker ended abnormally");
            }
        }
        self.state = SessionState::Closed;
        tracing::debug!("all streams flushed, evaluator stopped");

        match status {
            Some(Ok(status)) if !status.success() => Err(InspectError::process(format!(
                "evaluator exited with {status}"
            ))),
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

async fn wait_for_exit(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            tracing::warn!(?grace, "evaluator did not exit after closing its input, killing it");
            child.kill().await?;
            Ok(child.wait().await?)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.channels.is_some() {
            tracing::debug!(state = %self.state, "session dropped without close");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("program", &self.config.program)
            .field("state", &self.state)
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}
