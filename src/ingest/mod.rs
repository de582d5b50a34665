//! Experiment-log ingestion: line parsing, per-file state, and the
//! owning per-file context.

pub mod file;
pub mod parse;
pub mod record;

pub use file::LogFile;
pub use record::{ParameterSet, TaskStream, TaskStreams};
