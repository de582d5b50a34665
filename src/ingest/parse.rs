//! Parsing of experiment output logs (`*.out`, optionally compressed).
//!
//! Two line grammars are recognized:
//!
//! Args.<dotted.name>: <value>
//! Task <name>, STATS: <json-object>
//!
//! plus a command-echo block per benchmark instance:
//!
//! Executing db_bench[<i>]. Command:
//!   ... --key="value" --key=value ...
//! [<first output line>
//!
//! All parse failures are local: a malformed JSON sample skips its line, a
//! truncated compressed stream stops ingestion with whatever was parsed so
//! far. Diagnostics go through `log::warn!`.

use crate::Result;
use crate::decode::{self, PARAM_CANDIDATES};
use crate::ingest::record::{ParameterSet, TaskStreams};

use anyhow::Context;
use flate2::read::GzDecoder;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use xz2::read::XzDecoder;

/// Split an experiment file name into `(base, ".out", compression-ext)`.
/// Returns `None` for names that are not experiment logs.
pub fn decompose_filename(filename: &str) -> Option<(String, String, Option<String>)> {
    let re = Regex::new(r"^(.*)(\.out)(\.gz|\.lzma|\.xz)?$").unwrap();
    let caps = re.captures(filename)?;
    Some((
        caps[1].to_string(),
        caps[2].to_string(),
        caps.get(3).map(|m| m.as_str().to_string()),
    ))
}

/// Whether a file name looks like an experiment log this crate ingests.
pub fn accept_file(filename: &str) -> bool {
    decompose_filename(filename).is_some()
}

/// Open a log file, transparently decompressing by extension.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let name = path.to_string_lossy();
    let file = File::open(path).with_context(|| format!("open log file {}", name))?;
    let ext = decompose_filename(&name).and_then(|(_, _, ext)| ext);
    let reader: Box<dyn Read> = match ext.as_deref() {
        Some(".gz") => Box::new(GzDecoder::new(file)),
        Some(".xz") | Some(".lzma") => Box::new(XzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Parse the parameter set and the per-task sample streams from a log
/// stream. Record 0 of every task is discarded before returning.
pub fn parse_stream(reader: &mut dyn BufRead) -> Result<(ParameterSet, TaskStreams)> {
    let args_re = Regex::new(r"Args\.([^:]+): *(.+)")?;
    let task_re = Regex::new(r"Task ([^,]+), STATS: (.+)")?;

    let mut params = ParameterSet::new();
    let mut tasks = TaskStreams::new();

    let mut line = String::new();
    let mut line_count = 0u64;
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => line_count += 1,
            Err(err) => {
                // Typically a truncated compressed stream; keep what we have.
                log::warn!("read error at line {}: {}", line_count + 1, err);
                break;
            }
        }

        if let Some(caps) = args_re.captures(&line) {
            params.insert(&caps[1], decode::decode(caps[2].trim_end(), PARAM_CANDIDATES));
        }

        if let Some(caps) = task_re.captures(&line) {
            let task = caps[1].to_string();
            match serde_json::from_str::<serde_json::Value>(&caps[2]) {
                Ok(record) => tasks.push_record(&task, record),
                Err(err) => {
                    log::warn!("json error (task {}): {}: {}", task, err, caps[2].trim_end());
                }
            }
        }
    }

    tasks.discard_first_records();
    Ok((params, tasks))
}

/// Extract the echoed db_bench command-line parameters, one parameter set
/// per benchmark instance in `0..num_dbs`.
///
/// The instance count comes from the `Args.num_dbs` line; each instance's
/// block is opened by the `Executing db_bench[<i>]. Command:` marker and
/// closed by the next line starting with `[`. Scanning stops after the last
/// instance's block.
pub fn parse_bench_params(reader: &mut dyn BufRead) -> Result<Vec<ParameterSet>> {
    let num_dbs_re = Regex::new(r"Args\.num_dbs: *([0-9]+)")?;
    let exec_re = Regex::new(r"Executing *db_bench\[([0-9]+)\]\. *Command:")?;
    let quoted_re = Regex::new(r#"\s*([^=]+)="([^"]+)""#)?;
    let bare_re = Regex::new(r"\s*([^=]+)=([^ ]+)")?;

    let mut benches: Vec<ParameterSet> = Vec::new();
    let mut num_dbs = 0usize;
    let mut cur_db: Option<usize> = None;

    let mut line = String::new();
    let mut line_count = 0u64;
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => line_count += 1,
            Err(err) => {
                log::warn!("read error at line {}: {}", line_count + 1, err);
                break;
            }
        }

        if num_dbs == 0 {
            if let Some(caps) = num_dbs_re.captures(&line) {
                num_dbs = caps[1].parse()?;
                benches.resize_with(num_dbs, ParameterSet::new);
            }
            continue;
        }

        if let Some(caps) = exec_re.captures(&line) {
            cur_db = Some(caps[1].parse()?);
            continue;
        }

        // A line starting with '[' ends the echo block of the current
        // instance; after the last instance there is nothing left to scan.
        if line.starts_with('[') {
            if cur_db == Some(num_dbs - 1) {
                break;
            }
            continue;
        }

        let Some(db) = cur_db else { continue };
        if db >= benches.len() {
            continue;
        }
        for token in line.trim_end().split("--") {
            if let Some(caps) = quoted_re.captures(token) {
                benches[db].insert(caps[1].trim(), decode::decode(&caps[2], PARAM_CANDIDATES));
            } else if let Some(caps) = bare_re.captures(token) {
                benches[db].insert(caps[1].trim(), decode::decode(&caps[2], PARAM_CANDIDATES));
            }
        }
    }

    Ok(benches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Value;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn filename_decomposition() {
        assert_eq!(
            decompose_filename("exp1.out.gz"),
            Some(("exp1".to_string(), ".out".to_string(), Some(".gz".to_string())))
        );
        assert_eq!(
            decompose_filename("a/b/exp1.out"),
            Some(("a/b/exp1".to_string(), ".out".to_string(), None))
        );
        assert!(accept_file("exp1.out.xz"));
        assert!(!accept_file("exp1.log"));
    }

    #[test]
    fn args_lines_last_occurrence_wins() {
        let log = "Args.num_at: 2\nnoise\nArgs.duration: 30\nArgs.num_at: 4\n";
        let (params, tasks) = parse_stream(&mut Cursor::new(log)).unwrap();
        assert_eq!(params.get_i64("num_at"), Some(4));
        assert_eq!(params.get_i64("duration"), Some(30));
        assert!(tasks.is_empty());
    }

    #[test]
    fn malformed_json_sample_is_skipped() {
        let log = concat!(
            "Task ycsb[0], STATS: {\"time\": 0, \"ops_per_s\": 10}\n",
            "Task ycsb[0], STATS: {broken\n",
            "Task ycsb[0], STATS: {\"time\": 5, \"ops_per_s\": 11}\n",
            "Task ycsb[0], STATS: {\"time\": 10, \"ops_per_s\": 12}\n",
        );
        let (_, tasks) = parse_stream(&mut Cursor::new(log)).unwrap();
        // 3 valid records, the first one discarded.
        assert_eq!(tasks.get("ycsb[0]").map(Vec::len), Some(2));
    }

    #[test]
    fn truncated_gzip_keeps_partial_result() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        for t in 0..20 {
            writeln!(enc, "Task mon, STATS: {{\"time\": {}}}", t).unwrap();
        }
        let mut bytes = enc.finish().unwrap();
        bytes.truncate(bytes.len() / 2);

        let mut reader = BufReader::new(GzDecoder::new(Cursor::new(bytes)));
        let (_, tasks) = parse_stream(&mut reader).unwrap();
        // Whatever decompressed cleanly survives, minus the first record.
        if let Some(stream) = tasks.get("mon") {
            assert!(stream.len() < 19);
        }
    }

    #[test]
    fn bench_params_from_command_echo() {
        let log = concat!(
            "Args.num_dbs: 2\n",
            "Executing db_bench[0]. Command:\n",
            "  db_bench --db=\"/mnt/db0\" --num=1000 \\\n",
            "  --benchmarks=readwhilewriting\n",
            "[0s] starting\n",
            "Executing db_bench[1]. Command:\n",
            "  db_bench --db=\"/mnt/db1\" --num=2000\n",
            "[0s] starting\n",
        );
        let benches = parse_bench_params(&mut Cursor::new(log)).unwrap();
        assert_eq!(benches.len(), 2);
        assert_eq!(benches[0].get("db"), Some(&Value::Str("/mnt/db0".to_string())));
        assert_eq!(benches[0].get_i64("num"), Some(1000));
        assert_eq!(
            benches[0].get("benchmarks"),
            Some(&Value::Str("readwhilewriting".to_string()))
        );
        assert_eq!(benches[1].get_i64("num"), Some(2000));
    }
}
