//! Typed-value decoding for raw log strings.
//!
//! Benchmark logs report numbers in several shapes: plain integers, floats,
//! decimal-suffixed counts ("10K" ops) and binary-suffixed sizes ("2GiB").
//! A decoded value keeps its most specific numeric type; strings that match
//! no candidate are kept verbatim.

use anyhow::bail;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// A decoded scalar from a log file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Integer view: exact for Int, rounded for Float.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(f.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// One interpretation attempted by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Int,
    Float,
    DecimalSuffix,
    BinarySuffix,
}

/// Candidate chain for `Args.*` parameter values.
pub const PARAM_CANDIDATES: &[Candidate] = &[Candidate::Int, Candidate::Float];

/// Candidate chain for sample-record leaf values.
pub const STAT_CANDIDATES: &[Candidate] =
    &[Candidate::Int, Candidate::Float, Candidate::DecimalSuffix];

/// Try each candidate in order and return the first successful
/// interpretation; if none parses, keep the raw string.
pub fn decode(raw: &str, candidates: &[Candidate]) -> Value {
    for candidate in candidates {
        let parsed = match candidate {
            Candidate::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            Candidate::Float => raw.trim().parse::<f64>().ok().map(Value::Float),
            Candidate::DecimalSuffix => decimal_suffix(raw).ok(),
            Candidate::BinarySuffix => binary_suffix(raw).ok(),
        };
        if let Some(v) = parsed {
            return v;
        }
    }
    Value::Str(raw.to_string())
}

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ *([0-9.]+) *([TBMK]) *$").unwrap());

static BINARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ *([0-9.]+) *([PTGMKptgmk])i?[Bb]? *$").unwrap());

/// Decode `<number><K|M|B|T>` as number * 1000^{1..4}.
///
/// Fails only when the suffix pattern matches but the numeric part does not
/// parse; callers in the candidate chain treat that as "no match".
pub fn decimal_suffix(raw: &str) -> anyhow::Result<Value> {
    let caps = match DECIMAL_RE.captures(raw) {
        Some(c) => c,
        None => bail!("no decimal suffix in {:?}", raw),
    };
    let factor = match &caps[2] {
        "K" => 1000i64,
        "M" => 1000i64.pow(2),
        "B" => 1000i64.pow(3),
        "T" => 1000i64.pow(4),
        _ => unreachable!(),
    };
    scale_number(&caps[1], factor)
}

/// Decode `<number><K|M|G|T|P>[i][B|b]` as number * 1024^{1..5},
/// suffix case-insensitive.
pub fn binary_suffix(raw: &str) -> anyhow::Result<Value> {
    let caps = match BINARY_RE.captures(raw) {
        Some(c) => c,
        None => bail!("no binary suffix in {:?}", raw),
    };
    let factor = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 1024i64,
        "M" => 1024i64.pow(2),
        "G" => 1024i64.pow(3),
        "T" => 1024i64.pow(4),
        "P" => 1024i64.pow(5),
        _ => unreachable!(),
    };
    scale_number(&caps[1], factor)
}

fn scale_number(number: &str, factor: i64) -> anyhow::Result<Value> {
    if let Ok(n) = number.parse::<i64>() {
        return Ok(match n.checked_mul(factor) {
            Some(scaled) => Value::Int(scaled),
            None => Value::Float(n as f64 * factor as f64),
        });
    }
    if let Ok(f) = number.parse::<f64>() {
        return Ok(Value::Float(f * factor as f64));
    }
    bail!("invalid number {:?}", number)
}
