//! Ingestion and time-series fusion for storage-benchmark experiment logs.
//!
//! One experiment log interleaves the output of several concurrently
//! running tasks (key-value store benchmarks, OS performance counters,
//! synthetic I/O pressure generators), each sampling on its own clock.
//! This crate parses such a log, aligns every stream onto the primary
//! task's timeline, segments the run into workload phases from
//! pressure-generator configuration drift, and summarizes the per-phase
//! throughput degradation ("pressure").

pub mod batch;
pub mod decode;
pub mod flatten;
pub mod fuse;
pub mod ingest;
pub mod options;
pub mod pressure;
pub mod workload;

pub type Result<T> = anyhow::Result<T>;
