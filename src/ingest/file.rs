//! Per-file ingestion context.
//!
//! A `LogFile` owns everything parsed from one experiment log plus the
//! derived artifacts (workload phases, fused table, pressure summary).
//! Parsed state is read-only after load; derived artifacts are computed
//! once on first access and memoized in this context. Discarding the
//! context is the only form of invalidation.

use crate::Result;
use crate::flatten;
use crate::fuse::{self, FusedTable};
use crate::ingest::parse;
use crate::ingest::record::{ParameterSet, TaskStreams};
use crate::options::Options;
use crate::pressure::{self, PressureData, PressureOrder};
use crate::workload::{self, WorkloadPhase};

use anyhow::bail;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    options: Options,
    params: ParameterSet,
    tasks: TaskStreams,
    bench_params: Vec<ParameterSet>,

    num_at: usize,
    num_dbs: i64,
    num_ydbs: i64,
    stats_interval: i64,

    phases: Option<Vec<WorkloadPhase>>,
    fused: Option<Option<FusedTable>>,
    pressure: Option<Option<PressureData>>,
    label: Option<String>,
}

impl LogFile {
    /// Load an experiment log. The file is consumed in two passes: one for
    /// the parameter set and sample streams, one for the benchmark
    /// command echoes.
    pub fn open(path: &Path, options: Options) -> Result<LogFile> {
        let name = path.to_string_lossy();
        if !parse::accept_file(&name) {
            bail!("not an experiment log (expected *.out[.gz|.xz|.lzma]): {}", name);
        }

        let mut reader = parse::open_reader(path)?;
        let (params, tasks) = parse::parse_stream(&mut reader)?;

        let mut reader = parse::open_reader(path)?;
        let bench_params = parse::parse_bench_params(&mut reader)?;

        let num_at = params.get_i64_or("num_at", 0).max(0) as usize;
        let num_dbs = params.get_i64_or("num_dbs", 0);
        let num_ydbs = params.get_i64_or("num_ydbs", 0);
        let stats_interval = params.get_i64_or("stats_interval", 5);

        Ok(LogFile {
            path: path.to_path_buf(),
            options,
            params,
            tasks,
            bench_params,
            num_at,
            num_dbs,
            num_ydbs,
            stats_interval,
            phases: None,
            fused: None,
            pressure: None,
            label: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn tasks(&self) -> &TaskStreams {
        &self.tasks
    }

    /// Echoed db_bench parameters, one set per benchmark instance.
    pub fn bench_params(&self) -> &[ParameterSet] {
        &self.bench_params
    }

    pub fn num_at(&self) -> usize {
        self.num_at
    }

    pub fn stats_interval(&self) -> i64 {
        self.stats_interval
    }

    /// Sample times of one task stream, in record order.
    pub fn task_times(&self, task: &str) -> Vec<i64> {
        self.tasks
            .get(task)
            .map(|stream| {
                stream
                    .iter()
                    .filter_map(|raw| flatten::record_time(&flatten::flatten(raw)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Workload phases segmented from the pressure-generator streams.
    /// Empty when no generator instances ran.
    pub fn workload_phases(&mut self) -> &[WorkloadPhase] {
        if self.phases.is_none() {
            let instances = workload::instance_changes(&self.tasks, self.num_at);
            self.phases = Some(workload::segment(
                &instances,
                workload::DEFAULT_FUZZY,
                &self.options.w_labels,
            ));
        }
        self.phases.as_deref().unwrap_or_default()
    }

    /// The fused per-timestamp table, or `None` when no usable primary
    /// stream exists.
    pub fn fused_table(&mut self) -> Option<&FusedTable> {
        if self.fused.is_none() {
            self.workload_phases();
            let built = {
                let phases = self.phases.as_deref().unwrap_or_default();
                fuse::build_fused(&self.tasks, phases, self.num_at)
            };
            self.fused = Some(built);
        }
        self.fused.as_ref().and_then(|t| t.as_ref())
    }

    /// Throughput column used by the pressure summary.
    pub fn throughput_field(&self) -> &'static str {
        if self.num_ydbs > 0 {
            "ycsb[0].ops_per_s"
        } else {
            "db_bench[0].ops_per_s"
        }
    }

    /// The pressure summary, or `None` when the file ran no key-value
    /// store or no pressure generators (nothing to compare). Computed once
    /// and memoized; an error is reported fresh on every call.
    pub fn pressure_data(&mut self) -> Result<Option<&PressureData>> {
        if self.pressure.is_none() {
            let computed = self.compute_pressure()?;
            self.pressure = Some(computed);
        }
        Ok(self.pressure.as_ref().and_then(|p| p.as_ref()))
    }

    fn compute_pressure(&mut self) -> Result<Option<PressureData>> {
        if self.num_dbs == 0 && self.num_ydbs == 0 {
            return Ok(None);
        }
        if self.num_at == 0 {
            return Ok(None);
        }
        let field = self.throughput_field();
        let order = if self.options.use_at3_counters {
            PressureOrder::Chronological
        } else {
            PressureOrder::ThroughputDesc
        };
        self.fused_table();
        let Some(Some(table)) = &self.fused else {
            return Ok(None);
        };
        let phases = self.phases.as_deref().unwrap_or_default();
        pressure::compute_pressure(table, phases, field, order).map(Some)
    }

    /// Human-readable label: options override, then the `.label` sidecar,
    /// then the base file name.
    pub fn file_label(&mut self) -> &str {
        if self.label.is_none() {
            self.label = Some(self.resolve_label());
        }
        self.label.as_deref().unwrap_or_default()
    }

    fn resolve_label(&self) -> String {
        if let Some(label) = &self.options.file_label {
            return label.clone();
        }

        let name = self.path.to_string_lossy();
        let base = parse::decompose_filename(&name)
            .map(|(base, _, _)| base)
            .unwrap_or_else(|| name.to_string());

        let sidecar = format!("{}.label", base);
        if let Ok(text) = fs::read_to_string(&sidecar) {
            if let Some(line) = text.lines().next() {
                let line = line.trim();
                if !line.is_empty() {
                    return line.to_string();
                }
            }
        }

        Path::new(&base)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(base)
    }
}
