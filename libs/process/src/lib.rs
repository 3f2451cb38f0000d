//! # nodestart-process
//!
//! The process-execution abstraction used by the nodestart launcher.
//!
//! A launcher starts long-running database-node processes through a
//! [`Runner`]. Each started process is controlled through a [`Process`]
//! handle. Two backends exist:
//!
//! - a bare-process runner that spawns OS processes on the local host
//! - a container runner that runs each process in its own container
//!
//! The coordinator that decides which nodes to start only talks to these
//! traits, so it stays backend-agnostic.
//!
//! ## Errors
//!
//! All backends report failures as [`ExecError`], a tagged error whose
//! [`ErrorKind`] tells "already gone" apart from retryable and permanent
//! failures with a single match.

mod error;
mod runner;

pub use error::{ErrorKind, ExecError};
pub use runner::{Process, Runner, Volume, PORT_OFFSET_INCREMENT};
