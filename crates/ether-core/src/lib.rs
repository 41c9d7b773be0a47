//! Shared runtime plumbing for the ether workspace.
//!
//! Every binary in the workspace funnels its logging through
//! [`init_tracing`], so the daemon and the command-line client agree on
//! filter syntax and output formats.

pub mod tracing;

pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
