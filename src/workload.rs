//! Workload-phase segmentation from pressure-generator configuration drift.
//!
//! Each `access_time3[<i>]` instance reports its settings with every sample.
//! A change of the (wait, random_ratio, write_ratio, iodepth) tuple marks a
//! change event; near-simultaneous events across all instances cluster into
//! one named workload phase.

use crate::decode::Value;
use crate::flatten::{self, FlatRecord};
use crate::ingest::record::TaskStreams;

use serde::Serialize;
use std::collections::BTreeMap;

/// Default fuzzy window for clustering change events, in time units.
pub const DEFAULT_FUZZY: i64 = 15;

/// Pressure-generator task name for instance `i`.
pub fn at3_task_name(instance: usize) -> String {
    format!("access_time3[{}]", instance)
}

/// The generator settings sampled from one record. Compared for equality
/// only; a missing field reads as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTuple {
    pub wait: Value,
    pub random_ratio: Value,
    pub write_ratio: Value,
    pub iodepth: Value,
}

impl ConfigTuple {
    pub fn from_record(record: &FlatRecord) -> Self {
        let field = |key: &str| flatten::get(record, key).cloned().unwrap_or(Value::Null);
        ConfigTuple {
            wait: field("wait"),
            random_ratio: field("random_ratio"),
            write_ratio: field("write_ratio"),
            iodepth: field("iodepth"),
        }
    }
}

/// One workload phase: a maximal interval with stable generator settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadPhase {
    pub start_time: i64,
    pub name: String,
    pub number: usize,
    /// Latest ConfigTuple of each instance that changed within the
    /// absorbed span, keyed by instance index.
    pub configs: BTreeMap<usize, ConfigTuple>,
}

/// Scan one instance's stream in time order and emit `(time, tuple)` change
/// events. The first record always emits an event.
pub fn config_changes(stream: &[serde_json::Value]) -> Vec<(i64, ConfigTuple)> {
    let mut events: Vec<(i64, ConfigTuple)> = Vec::new();
    let mut last: Option<ConfigTuple> = None;
    for raw in stream {
        let record = flatten::flatten(raw);
        let Some(time) = flatten::record_time(&record) else {
            continue;
        };
        let tuple = ConfigTuple::from_record(&record);
        if last.as_ref() != Some(&tuple) {
            last = Some(tuple.clone());
            events.push((time, tuple));
        }
    }
    events
}

/// Collect change events for instances `0..num_at` from the task streams.
pub fn instance_changes(tasks: &TaskStreams, num_at: usize) -> Vec<Vec<(i64, ConfigTuple)>> {
    (0..num_at)
        .map(|i| {
            tasks
                .get(&at3_task_name(i))
                .map(|stream| config_changes(stream))
                .unwrap_or_default()
        })
        .collect()
}

/// Cluster pooled change events into sequentially numbered phases.
///
/// Events are pooled across instances, de-duplicated by time and walked in
/// ascending order. A phase opened at `t0` absorbs every event with
/// `t <= bound` where the bound starts at `t0 + fuzzy` and extends to
/// `t + fuzzy` for each absorbed event, so a chain of near-simultaneous
/// changes keeps extending the phase. The boundary is inclusive.
///
/// A phase whose raw start time is within `fuzzy` of experiment start is
/// normalized to `start_time = 0`. Names come from `labels` by position,
/// falling back to `w<n>`.
pub fn segment(
    instances: &[Vec<(i64, ConfigTuple)>],
    fuzzy: i64,
    labels: &[String],
) -> Vec<WorkloadPhase> {
    // Pool events: time -> [(instance, tuple)], ascending and de-duplicated
    // by time.
    let mut pooled: BTreeMap<i64, Vec<(usize, ConfigTuple)>> = BTreeMap::new();
    for (instance, events) in instances.iter().enumerate() {
        for (time, tuple) in events {
            pooled.entry(*time).or_default().push((instance, tuple.clone()));
        }
    }
    let times: Vec<i64> = pooled.keys().copied().collect();

    let mut phases: Vec<WorkloadPhase> = Vec::new();
    let mut i = 0;
    while i < times.len() {
        let t0 = times[i];
        let number = phases.len();
        let name = labels
            .get(number)
            .cloned()
            .unwrap_or_else(|| format!("w{}", number));

        let mut phase = WorkloadPhase {
            start_time: if t0 > fuzzy { t0 } else { 0 },
            name,
            number,
            configs: BTreeMap::new(),
        };
        let mut bound = t0 + fuzzy;
        while i < times.len() && times[i] <= bound {
            let t = times[i];
            bound = t + fuzzy;
            for (instance, tuple) in &pooled[&t] {
                phase.configs.insert(*instance, tuple.clone());
            }
            i += 1;
        }
        phases.push(phase);
    }
    phases
}

/// The latest phase whose start time does not exceed `time`.
pub fn phase_at(phases: &[WorkloadPhase], time: i64) -> Option<&WorkloadPhase> {
    let mut last = None;
    for phase in phases {
        if phase.start_time > time {
            break;
        }
        last = Some(phase);
    }
    last
}

/// Like [`phase_at`], but falls back to the first phase for rows sampled
/// before any phase opened. Used by the pressure aggregation.
pub fn phase_at_or_first(phases: &[WorkloadPhase], time: i64) -> Option<&WorkloadPhase> {
    phase_at(phases, time).or_else(|| phases.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tuple(random_ratio: f64) -> ConfigTuple {
        ConfigTuple {
            wait: Value::Str("false".to_string()),
            random_ratio: Value::Float(random_ratio),
            write_ratio: Value::Float(0.0),
            iodepth: Value::Int(1),
        }
    }

    #[test]
    fn first_record_always_emits_a_change_event() {
        let stream = vec![
            json!({"time": 5, "wait": "false", "random_ratio": 0.0, "write_ratio": 0.0, "iodepth": 1}),
            json!({"time": 10, "wait": "false", "random_ratio": 0.0, "write_ratio": 0.0, "iodepth": 1}),
            json!({"time": 15, "wait": "false", "random_ratio": 0.5, "write_ratio": 0.0, "iodepth": 1}),
        ];
        let events = config_changes(&stream);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, 5);
        assert_eq!(events[1].0, 15);
    }

    #[test]
    fn events_at_exactly_the_fuzzy_boundary_merge() {
        let instances = vec![vec![(100, tuple(0.0)), (115, tuple(0.5))]];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phases.len(), 1);
        // The later event's tuple wins within the absorbed span.
        assert_eq!(phases[0].configs[&0], tuple(0.5));
    }

    #[test]
    fn events_past_the_fuzzy_boundary_open_a_new_phase() {
        let instances = vec![vec![(100, tuple(0.0)), (116, tuple(0.5))]];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[1].start_time, 116);
        assert_eq!(phases[1].number, 1);
        assert_eq!(phases[1].name, "w1");
    }

    #[test]
    fn absorption_window_extends_with_each_absorbed_event() {
        // 100, 112, 124: each within 15 of the previous, 124 not within 15
        // of 100. The chain still forms one phase.
        let instances = vec![vec![
            (100, tuple(0.0)),
            (112, tuple(0.3)),
            (124, tuple(0.6)),
        ]];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].configs[&0], tuple(0.6));
    }

    #[test]
    fn start_of_experiment_jitter_normalizes_to_zero() {
        let instances = vec![vec![(12, tuple(0.0)), (300, tuple(0.5))]];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].start_time, 0);
        assert_eq!(phases[1].start_time, 300);
    }

    #[test]
    fn caller_labels_apply_by_position() {
        let instances = vec![vec![(0, tuple(0.0)), (100, tuple(0.5))]];
        let labels = vec!["baseline".to_string()];
        let phases = segment(&instances, 15, &labels);
        assert_eq!(phases[0].name, "baseline");
        assert_eq!(phases[1].name, "w1");
    }

    #[test]
    fn cross_instance_events_pool_into_one_timeline() {
        let instances = vec![
            vec![(0, tuple(0.0)), (200, tuple(0.5))],
            vec![(3, tuple(0.1)), (206, tuple(0.7))],
        ];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[1].configs[&0], tuple(0.5));
        assert_eq!(phases[1].configs[&1], tuple(0.7));
    }

    #[test]
    fn phase_lookup_is_stepwise() {
        let instances = vec![vec![(0, tuple(0.0)), (100, tuple(0.5))]];
        let phases = segment(&instances, 15, &[]);
        assert_eq!(phase_at(&phases, 50).map(|p| p.number), Some(0));
        assert_eq!(phase_at(&phases, 100).map(|p| p.number), Some(1));
        assert_eq!(phase_at(&phases, 5000).map(|p| p.number), Some(1));
        assert_eq!(phase_at(&phases, -1), None);
        assert_eq!(phase_at_or_first(&phases, -1).map(|p| p.number), Some(0));
    }
}
