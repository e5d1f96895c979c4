//! NixOS option inspection in Rust
//!
//! Drives an interactive `nix repl` and exposes a host's option namespace as a
//! lazily expanded tree with on-demand option metadata.

pub mod cli;
pub mod error;
pub mod export;
pub mod session;
pub mod tree;
pub mod value;

// Re-export main types
pub use error::{InspectError, Result};
pub use export::OptionsTree;
pub use session::{Frame, Session, SessionConfig, SessionState};
pub use tree::{Declaration, Definition, Node, NodeId, NodeKind, OptionInfo, Tree, TreeConfig};
pub use value::Value;
