//! Timeline fusion: align every task's samples onto one canonical timeline.
//!
//! The primary task supplies the reference clock; every other task's rows
//! are matched onto it with a bounded fuzzy nearest-time search and merged
//! left, each field prefixed with its task name.

use crate::Result;
use crate::decode::Value;
use crate::flatten;
use crate::ingest::record::{TaskStream, TaskStreams};
use crate::workload::{self, WorkloadPhase};

use anyhow::bail;
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// Primary-task priority: the first present stream becomes the reference
/// clock for the fused table.
pub const PRIMARY_TASKS: &[&str] = &["ycsb[0]", "db_bench[0]", "access_time3[0]", "performancemonitor"];

/// One task's samples as an aligned column-oriented frame.
///
/// Columns appear in first-seen order across the flattened records; a record
/// missing a column contributes an absent cell.
#[derive(Debug, Clone)]
pub struct TaskFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl TaskFrame {
    pub fn from_stream(stream: &TaskStream) -> TaskFrame {
        let flats: Vec<flatten::FlatRecord> = stream.iter().map(flatten::flatten).collect();

        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for flat in &flats {
            for (key, _) in flat {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = flats
            .iter()
            .map(|flat| {
                let mut row = vec![None; columns.len()];
                for (key, value) in flat {
                    row[index[key]] = Some(value.clone());
                }
                row
            })
            .collect();

        TaskFrame { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Per-row `time` values, absent where the record had none.
    pub fn times(&self) -> Vec<Option<i64>> {
        match self.column_index("time") {
            Some(col) => self
                .rows
                .iter()
                .map(|row| row[col].as_ref().and_then(Value::as_i64))
                .collect(),
            None => vec![None; self.rows.len()],
        }
    }
}

/// Match a secondary timestamp onto the primary timestamp set.
///
/// The search radius `c` expands from 0 up to `max_range`, probing `t - c`
/// before `t + c` at each step; the first hit wins. This tie-break is part
/// of the output contract and must not change.
pub fn join_time(t: i64, times: &HashSet<i64>, max_range: i64) -> Option<i64> {
    let mut c = 0;
    while c <= max_range {
        if times.contains(&(t - c)) {
            return Some(t - c);
        }
        if times.contains(&(t + c)) {
            return Some(t + c);
        }
        c += 1;
    }
    None
}

/// The fused per-timestamp table consumed by the plotting layer.
///
/// Rows are strictly time-ascending and unique in time; `time`, `time_min`,
/// `w` and `w_name` are always present.
#[derive(Debug, Clone)]
pub struct FusedTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<Value>>>,
}

impl FusedTable {
    fn new(columns: Vec<String>, rows: Vec<Vec<Option<Value>>>) -> FusedTable {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        FusedTable { columns, index, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resolve a column requested by a consumer. Absent columns are a
    /// user-facing error naming the column, raised before any computation
    /// that would fail less specifically.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        match self.index.get(name) {
            Some(i) => Ok(*i),
            None => bail!("column named {:?} not found in fused table", name),
        }
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows[row][column].as_ref()
    }

    /// All cells of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<Option<&Value>>> {
        let col = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[col].as_ref()).collect())
    }

    /// Row times; total by construction (rows without a time never enter
    /// the table).
    pub fn times(&self) -> Vec<i64> {
        let col = self.index["time"];
        self.rows
            .iter()
            .map(|row| row[col].as_ref().and_then(Value::as_i64).unwrap_or(0))
            .collect()
    }

    /// Write the table as CSV, empty cells for absent values.
    pub fn write_csv(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{}", self.columns.join(","))?;
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(v) => csv_escape(&v.to_string()),
                    None => String::new(),
                })
                .collect();
            writeln!(out, "{}", cells.join(","))?;
        }
        Ok(())
    }
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Build the fused table, or `None` when no usable primary stream exists.
///
/// `phases` labels each row with the workload phase active at its time;
/// with no pressure-generator instances (`num_at == 0`) every row is
/// labeled phase 0 / `w0`.
pub fn build_fused(
    tasks: &TaskStreams,
    phases: &[WorkloadPhase],
    num_at: usize,
) -> Option<FusedTable> {
    let primary_name = PRIMARY_TASKS
        .iter()
        .copied()
        .find(|&name| tasks.get(name).is_some())?;
    let primary_stream = tasks.get(primary_name)?;
    if primary_stream.len() < 2 {
        return None;
    }

    let primary = TaskFrame::from_stream(primary_stream);
    let primary_times = primary.times();
    let time_set: HashSet<i64> = primary_times.iter().flatten().copied().collect();
    if time_set.is_empty() {
        return None;
    }
    let max = *time_set.iter().max()?;
    let min = *time_set.iter().min()?;
    let interval = ((max - min) as f64 / time_set.len() as f64).round() as i64;

    // Secondary frames with their rows keyed by matched primary time; the
    // earliest secondary row matching a given timestamp wins.
    struct Matched {
        name: String,
        frame: TaskFrame,
        by_time: HashMap<i64, usize>,
    }
    let mut secondaries: Vec<Matched> = Vec::new();
    for (name, stream) in tasks.iter() {
        if name == primary_name {
            continue;
        }
        let frame = TaskFrame::from_stream(stream);
        let mut by_time = HashMap::new();
        for (row, time) in frame.times().iter().enumerate() {
            if let Some(t) = time {
                if let Some(matched) = join_time(*t, &time_set, interval) {
                    by_time.entry(matched).or_insert(row);
                }
            }
        }
        secondaries.push(Matched {
            name: name.to_string(),
            frame,
            by_time,
        });
    }

    // Column layout: time, primary fields, secondary fields (all prefixed
    // with their task name), then the derived columns.
    let mut columns: Vec<String> = vec!["time".to_string()];
    let primary_time_col = primary.column_index("time");
    for (i, col) in primary.columns.iter().enumerate() {
        if Some(i) != primary_time_col {
            columns.push(format!("{}.{}", primary_name, col));
        }
    }
    for sec in &secondaries {
        for col in &sec.frame.columns {
            columns.push(format!("{}.{}", sec.name, col));
        }
    }
    columns.push("time_min".to_string());
    columns.push("w".to_string());
    columns.push("w_name".to_string());

    let mut rows: Vec<(i64, Vec<Option<Value>>)> = Vec::new();
    for (row_idx, time) in primary_times.iter().enumerate() {
        // Rows with no time or negative time are excluded.
        let Some(t) = *time else { continue };
        if t < 0 {
            continue;
        }

        let mut row: Vec<Option<Value>> = Vec::with_capacity(columns.len());
        row.push(Some(Value::Int(t)));
        for (i, cell) in primary.rows[row_idx].iter().enumerate() {
            if Some(i) != primary_time_col {
                row.push(cell.clone());
            }
        }
        for sec in &secondaries {
            match sec.by_time.get(&t) {
                Some(sec_row) => row.extend(sec.frame.rows[*sec_row].iter().cloned()),
                None => row.extend(std::iter::repeat_n(None, sec.frame.columns.len())),
            }
        }
        row.push(Some(Value::Float(t as f64 / 60.0)));

        let (w, w_name) = if num_at == 0 {
            (Some(Value::Int(0)), Some(Value::Str("w0".to_string())))
        } else {
            match workload::phase_at(phases, t) {
                Some(phase) => (
                    Some(Value::Int(phase.number as i64)),
                    Some(Value::Str(phase.name.clone())),
                ),
                None => (None, None),
            }
        };
        row.push(w);
        row.push(w_name);

        rows.push((t, row));
    }

    // Strict time order, first occurrence kept for duplicate timestamps.
    rows.sort_by_key(|(t, _)| *t);
    let mut seen: HashSet<i64> = HashSet::new();
    rows.retain(|(t, _)| seen.insert(*t));

    Some(FusedTable::new(
        columns,
        rows.into_iter().map(|(_, row)| row).collect(),
    ))
}

/// Sampling-interval statistics of one task stream, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStats {
    /// Samples whose successor is not exactly `expected` units later.
    pub gaps: usize,
    /// Consecutive samples sharing a timestamp.
    pub repeated: usize,
    pub mean_interval: f64,
}

/// Compute gap/repeat counts and the mean interval of sorted sample times
/// against the expected stats interval. Needs at least two samples.
pub fn interval_stats(times: &[i64], expected: i64) -> Option<IntervalStats> {
    if times.len() < 2 {
        return None;
    }
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    let set: HashSet<i64> = sorted.iter().copied().collect();

    let mut gaps = 0;
    let mut repeated = 0;
    let mut delta = 0i64;
    for (i, t) in sorted.iter().enumerate() {
        if i + 1 < sorted.len() && !set.contains(&(t + expected)) {
            gaps += 1;
        }
        if i > 0 {
            delta += t - sorted[i - 1];
            if *t == sorted[i - 1] {
                repeated += 1;
            }
        }
    }
    Some(IntervalStats {
        gaps,
        repeated,
        mean_interval: delta as f64 / (sorted.len() - 1) as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn times(ts: &[i64]) -> HashSet<i64> {
        ts.iter().copied().collect()
    }

    #[test]
    fn join_prefers_the_nearest_timestamp() {
        let set = times(&[10, 20, 30]);
        // 20 is found at radius 4, before 30 at radius 6.
        assert_eq!(join_time(24, &set, 10), Some(20));
        // 17-3 = 14 misses, 17+3 = 20 hits.
        assert_eq!(join_time(17, &set, 10), Some(20));
    }

    #[test]
    fn join_checks_minus_before_plus_at_equal_radius() {
        // 25 is equidistant from 20 and 30: t-c probes first.
        let set = times(&[10, 20, 30]);
        assert_eq!(join_time(25, &set, 10), Some(20));
    }

    #[test]
    fn join_gives_up_past_the_bound() {
        let set = times(&[10, 20, 30]);
        assert_eq!(join_time(45, &set, 5), None);
        // The bound itself is still probed.
        assert_eq!(join_time(35, &set, 5), Some(30));
    }

    fn stream_of(samples: &[(i64, f64)]) -> Vec<serde_json::Value> {
        samples
            .iter()
            .map(|(t, v)| json!({"time": t, "ops_per_s": v}))
            .collect()
    }

    fn push_all(tasks: &mut TaskStreams, name: &str, records: Vec<serde_json::Value>) {
        for r in records {
            tasks.push_record(name, r);
        }
    }

    #[test]
    fn no_primary_task_means_no_table() {
        let mut tasks = TaskStreams::new();
        push_all(&mut tasks, "unrelated", stream_of(&[(0, 1.0), (5, 2.0)]));
        assert!(build_fused(&tasks, &[], 0).is_none());
    }

    #[test]
    fn short_primary_stream_means_no_table() {
        let mut tasks = TaskStreams::new();
        push_all(&mut tasks, "ycsb[0]", stream_of(&[(0, 1.0)]));
        assert!(build_fused(&tasks, &[], 0).is_none());
    }

    #[test]
    fn rows_are_time_ascending_and_unique() {
        let mut tasks = TaskStreams::new();
        push_all(
            &mut tasks,
            "ycsb[0]",
            stream_of(&[(20, 1.0), (5, 2.0), (-3, 9.0), (20, 3.0), (10, 4.0)]),
        );
        let table = build_fused(&tasks, &[], 0).unwrap();
        assert_eq!(table.times(), vec![5, 10, 20]);
        // First occurrence kept for the duplicated timestamp.
        let ops = table.column_values("ycsb[0].ops_per_s").unwrap();
        assert_eq!(ops[2], Some(&Value::Float(1.0)));
    }

    #[test]
    fn secondary_fields_merge_with_task_prefix() {
        let mut tasks = TaskStreams::new();
        push_all(
            &mut tasks,
            "ycsb[0]",
            stream_of(&[(10, 1.0), (20, 2.0), (30, 3.0)]),
        );
        push_all(
            &mut tasks,
            "performancemonitor",
            vec![json!({"time": 24, "cpu": 55}), json!({"time": 31, "cpu": 60})],
        );
        let table = build_fused(&tasks, &[], 0).unwrap();
        let cpu = table.column_values("performancemonitor.cpu").unwrap();
        // 24 matches 20 (radius 4 beats 30 at radius 6); 31 matches 30.
        assert_eq!(cpu, vec![None, Some(&Value::Int(55)), Some(&Value::Int(60))]);
        // The secondary's own clock is preserved under its prefix.
        let sec_time = table.column_values("performancemonitor.time").unwrap();
        assert_eq!(sec_time[1], Some(&Value::Int(24)));
    }

    #[test]
    fn derived_columns_are_always_present() {
        let mut tasks = TaskStreams::new();
        push_all(&mut tasks, "db_bench[0]", stream_of(&[(60, 1.0), (120, 2.0)]));
        let table = build_fused(&tasks, &[], 0).unwrap();
        for col in ["time", "time_min", "w", "w_name"] {
            assert!(table.has_column(col), "missing column {}", col);
        }
        let minutes = table.column_values("time_min").unwrap();
        assert_eq!(minutes[0], Some(&Value::Float(1.0)));
        let w_name = table.column_values("w_name").unwrap();
        assert_eq!(w_name[0], Some(&Value::Str("w0".to_string())));
    }

    #[test]
    fn missing_column_lookup_names_the_column() {
        let mut tasks = TaskStreams::new();
        push_all(&mut tasks, "ycsb[0]", stream_of(&[(0, 1.0), (5, 2.0)]));
        let table = build_fused(&tasks, &[], 0).unwrap();
        let err = table.column_values("ycsb[0].nope").unwrap_err();
        assert!(err.to_string().contains("ycsb[0].nope"));
    }

    #[test]
    fn interval_stats_count_gaps_and_repeats() {
        let stats = interval_stats(&[0, 5, 5, 15, 20], 5).unwrap();
        // 0->5 ok, both 5s miss a sample at 10, 15->20 ok.
        assert_eq!(stats.gaps, 2);
        assert_eq!(stats.repeated, 1);
        assert_eq!(stats.mean_interval, 5.0);
    }
}
