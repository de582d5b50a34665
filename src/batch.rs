//! Cross-file aggregation for an experiment batch.
//!
//! `ExperimentSet` groups independently ingested log files; `At3Store` is
//! the explicit, caller-owned store of pressure-generator samples behind
//! the write-ratio breakdown. Nothing here is process-global: the store is
//! created per batch run and passed to whatever needs it.

use crate::Result;
use crate::flatten;
use crate::ingest::LogFile;
use crate::options::Options;
use crate::pressure::PressureData;
use crate::workload;

use std::path::Path;

/// One or more experiment files analyzed together.
pub struct ExperimentSet {
    name: String,
    options: Options,
    files: Vec<LogFile>,
}

impl ExperimentSet {
    pub fn new(name: &str, options: Options) -> Self {
        ExperimentSet {
            name: name.to_string(),
            options,
            files: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_file(&mut self, path: &Path) -> Result<&mut LogFile> {
        let file = LogFile::open(path, self.options.clone())?;
        self.files.push(file);
        Ok(self.files.last_mut().unwrap())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files_mut(&mut self) -> &mut [LogFile] {
        &mut self.files
    }

    /// `(path, label)` pairs for listing the batch.
    pub fn file_labels(&mut self) -> Vec<(String, String)> {
        self.files
            .iter_mut()
            .map(|f| {
                let path = f.path().to_string_lossy().to_string();
                (path, f.file_label().to_string())
            })
            .collect()
    }

    /// Per-file pressure summaries, in registration order. Files without a
    /// usable summary yield `None`.
    pub fn file_pressures(&mut self) -> Result<Vec<Option<PressureData>>> {
        self.files
            .iter_mut()
            .map(|f| f.pressure_data().map(|p| p.cloned()))
            .collect()
    }
}

/// One pressure-generator sample in the batch store.
#[derive(Debug, Clone)]
pub struct At3Row {
    pub file_id: usize,
    pub instance: usize,
    pub time: i64,
    pub block_size: i64,
    pub random_ratio: f64,
    pub write_ratio: f64,
    pub mbps: f64,
    pub mbps_read: f64,
    pub mbps_write: f64,
    pub blocks_per_s: Option<f64>,
}

/// Mean throughput for one write ratio within a `(file, block_size,
/// random_ratio)` slice.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRatioPoint {
    pub write_ratio: f64,
    /// Mean MiB/s across all instances, scaled by the instance count.
    pub mbps_all: f64,
    /// Mean MiB/s of instance 0 alone.
    pub mbps_instance0: Option<f64>,
}

/// Explicit per-batch table of pressure-generator samples.
#[derive(Debug, Default)]
pub struct At3Store {
    files: Vec<(String, usize)>,
    rows: Vec<At3Row>,
}

impl At3Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file's generator streams and return its store id.
    pub fn insert_file(&mut self, file: &LogFile) -> usize {
        let file_id = self.files.len();
        let num_at = file.num_at();
        self.files
            .push((file.path().to_string_lossy().to_string(), num_at));

        for instance in 0..num_at {
            let Some(stream) = file.tasks().get(&workload::at3_task_name(instance)) else {
                continue;
            };
            for raw in stream {
                let record = flatten::flatten(raw);
                let int = |key: &str| flatten::get(&record, key).and_then(|v| v.as_i64());
                let float = |key: &str| flatten::get(&record, key).and_then(|v| v.as_f64());
                let (Some(time), Some(block_size)) = (int("time"), int("block_size")) else {
                    continue;
                };
                self.rows.push(At3Row {
                    file_id,
                    instance,
                    time,
                    block_size,
                    random_ratio: float("random_ratio").unwrap_or(0.0),
                    write_ratio: float("write_ratio").unwrap_or(0.0),
                    mbps: float("total_MiB/s").unwrap_or(0.0),
                    mbps_read: float("read_MiB/s").unwrap_or(0.0),
                    mbps_write: float("write_MiB/s").unwrap_or(0.0),
                    blocks_per_s: float("blocks/s"),
                });
            }
        }
        file_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct block sizes of one file, ascending.
    pub fn block_sizes(&self, file_id: usize) -> Vec<i64> {
        let mut sizes: Vec<i64> = self
            .rows
            .iter()
            .filter(|r| r.file_id == file_id)
            .map(|r| r.block_size)
            .collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    /// Distinct random ratios of one file, ascending.
    pub fn random_ratios(&self, file_id: usize) -> Vec<f64> {
        let mut ratios: Vec<f64> = self
            .rows
            .iter()
            .filter(|r| r.file_id == file_id)
            .map(|r| r.random_ratio)
            .collect();
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        ratios.dedup();
        ratios
    }

    /// Mean `mbps` per write ratio for the given slice, ascending by write
    /// ratio. The all-instances mean is scaled by the file's instance
    /// count so it reads as aggregate device throughput.
    pub fn write_ratio_breakdown(
        &self,
        file_id: usize,
        block_size: i64,
        random_ratio: f64,
    ) -> Vec<WriteRatioPoint> {
        let num_at = self
            .files
            .get(file_id)
            .map(|(_, num_at)| *num_at)
            .unwrap_or(0);

        let mut groups: Vec<(f64, Vec<f64>, Vec<f64>)> = Vec::new();
        for row in self.rows.iter().filter(|r| {
            r.file_id == file_id && r.block_size == block_size && r.random_ratio == random_ratio
        }) {
            let group = match groups.iter_mut().find(|(wr, _, _)| *wr == row.write_ratio) {
                Some(g) => g,
                None => {
                    groups.push((row.write_ratio, Vec::new(), Vec::new()));
                    groups.last_mut().unwrap()
                }
            };
            group.1.push(row.mbps);
            if row.instance == 0 {
                group.2.push(row.mbps);
            }
        }

        groups.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        groups
            .into_iter()
            .map(|(write_ratio, all, first)| WriteRatioPoint {
                write_ratio,
                mbps_all: mean(&all) * num_at as f64,
                mbps_instance0: if first.is_empty() {
                    None
                } else {
                    Some(mean(&first))
                },
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
