//! Cross-phase performance-degradation summary ("pressure").
//!
//! Per workload phase, the mean of the primary throughput field is compared
//! against the baseline phase (number 0):
//!
//!   normalized = (baseline_mean - phase_mean) / baseline_mean
//!
//! Values near 1 denote near-total throughput loss; negative values denote
//! phases faster than the baseline.

use crate::Result;
use crate::fuse::FusedTable;
use crate::workload::{self, WorkloadPhase};

use anyhow::bail;
use serde::Serialize;
use std::collections::BTreeMap;

/// Ordering of the per-phase summary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureOrder {
    /// Ascending phase number (chronological).
    Chronological,
    /// Descending mean throughput.
    ThroughputDesc,
}

/// Summary of one workload-phase occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct PressureRecord {
    pub w_name: String,
    pub w_number: usize,
    pub mean_throughput: f64,
    pub normalized: f64,
}

/// The pressure summary handed to downstream consumers. The parallel lists
/// follow the same order as `records`.
#[derive(Debug, Clone, Serialize)]
pub struct PressureData {
    pub records: Vec<PressureRecord>,
    pub w_names: Vec<String>,
    pub w_pressure: Vec<f64>,
    pub w_normalized: Vec<f64>,
    /// Baseline mean throughput (phase number 0).
    pub w0: f64,
    /// Phase start times, per record.
    pub times: Vec<i64>,
    pub times_min: Vec<f64>,
}

/// Aggregate the throughput field per workload phase and normalize against
/// the baseline.
///
/// Rows are attributed to the latest phase whose start time does not exceed
/// the row's time, falling back to the first phase for earlier rows. Absent
/// throughput cells are skipped. A missing throughput column, a missing
/// baseline phase, and a zero baseline mean are all explicit errors.
pub fn compute_pressure(
    table: &FusedTable,
    phases: &[WorkloadPhase],
    field: &str,
    order: PressureOrder,
) -> Result<PressureData> {
    let col = table.column_index(field)?;
    if phases.is_empty() {
        bail!("no workload phases to aggregate pressure over");
    }

    // Group key (number, name): phase numbers are assigned sequentially by
    // the segmenter, so each phase has exactly one occurrence.
    let mut groups: BTreeMap<(usize, String), Vec<f64>> = BTreeMap::new();
    for (row, time) in table.times().iter().enumerate() {
        let Some(phase) = workload::phase_at_or_first(phases, *time) else {
            continue;
        };
        let samples = groups
            .entry((phase.number, phase.name.clone()))
            .or_default();
        if let Some(v) = table.value(row, col).and_then(|v| v.as_f64()) {
            samples.push(v);
        }
    }

    let mut records: Vec<PressureRecord> = groups
        .into_iter()
        .map(|((number, name), samples)| {
            let mean = if samples.is_empty() {
                f64::NAN
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            };
            PressureRecord {
                w_name: name,
                w_number: number,
                mean_throughput: mean,
                normalized: 0.0,
            }
        })
        .collect();

    let w0 = match records.iter().find(|r| r.w_number == 0) {
        Some(r) if r.mean_throughput != 0.0 && r.mean_throughput.is_finite() => r.mean_throughput,
        Some(_) => bail!("baseline phase w0 has zero or undefined mean throughput"),
        None => bail!("baseline phase w0 not found in fused table"),
    };
    for record in &mut records {
        record.normalized = (w0 - record.mean_throughput) / w0;
    }

    match order {
        PressureOrder::Chronological => records.sort_by_key(|r| r.w_number),
        PressureOrder::ThroughputDesc => records.sort_by(|a, b| {
            b.mean_throughput
                .partial_cmp(&a.mean_throughput)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
    }

    let times: Vec<i64> = records
        .iter()
        .map(|r| {
            phases
                .iter()
                .find(|p| p.number == r.w_number)
                .map(|p| p.start_time)
                .unwrap_or(0)
        })
        .collect();

    Ok(PressureData {
        w_names: records.iter().map(|r| r.w_name.clone()).collect(),
        w_pressure: records.iter().map(|r| r.mean_throughput).collect(),
        w_normalized: records.iter().map(|r| r.normalized).collect(),
        w0,
        times_min: times.iter().map(|t| *t as f64 / 60.0).collect(),
        times,
        records,
    })
}
