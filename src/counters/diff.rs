//! Interval diff between two ordered counter snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Value};

use crate::counters::snapshot::{CounterClass, CounterSnapshot, SumKey, COUNTED};

/// Per-counter deltas, elapsed time and derived throughput between two
/// snapshots. Holds read-only references to both; neither input is
/// mutated.
///
/// Deltas are plain signed subtraction. A negative delta means the
/// counters were reset (pfctl -z, reboot) between samples; rollover
/// handling is the reporting layer's problem and is deliberately not
/// corrected here.
pub struct IntervalDiff<'a> {
    previous: &'a CounterSnapshot,
    current: &'a CounterSnapshot,
    seconds: f64,
    class_deltas: BTreeMap<CounterClass, i64>,
    sum_deltas: BTreeMap<SumKey, i64>,
    mbs: f64,
}

impl<'a> IntervalDiff<'a> {
    pub fn new(previous: &'a CounterSnapshot, current: &'a CounterSnapshot) -> Self {
        let mut seconds = current.timestamp().seconds_since(&previous.timestamp());
        // Same-second samples happen on coarse clocks and in tests; floor
        // to 1 so the rate stays defined. A negative elapsed time is a
        // clock anomaly and passes through untouched.
        if seconds == 0.0 {
            seconds = 1.0;
        }

        let class_deltas: BTreeMap<CounterClass, i64> = COUNTED
            .iter()
            .map(|&class| {
                (
                    class,
                    current.value(class) as i64 - previous.value(class) as i64,
                )
            })
            .collect();
        let sum_deltas: BTreeMap<SumKey, i64> = SumKey::ALL
            .iter()
            .map(|&key| (key, current.sum(key) as i64 - previous.sum(key) as i64))
            .collect();

        let all = sum_deltas[&SumKey::All] as f64;
        let mbs = (all * 8.0 / 1_000_000.0) / seconds;

        Self {
            previous,
            current,
            seconds,
            class_deltas,
            sum_deltas,
            mbs,
        }
    }

    /// Elapsed seconds between the samples, after the zero floor.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// Mean throughput over the interval, megabits per second.
    pub fn mbs(&self) -> f64 {
        self.mbs
    }

    pub fn class_delta(&self, class: CounterClass) -> i64 {
        self.class_deltas.get(&class).copied().unwrap_or(0)
    }

    pub fn sum_delta(&self, key: SumKey) -> i64 {
        self.sum_deltas.get(&key).copied().unwrap_or(0)
    }

    /// Flat report document: seconds, begin/end timestamps, throughput,
    /// and every class and sum delta keyed by its pf label.
    pub fn to_json(&self) -> Value {
        let mut doc = serde_json::Map::new();
        doc.insert("seconds".into(), json!(self.seconds));
        doc.insert("begin".into(), json!(self.previous.timestamp().format()));
        doc.insert("end".into(), json!(self.current.timestamp().format()));
        doc.insert("mbs".into(), json!(self.mbs));
        for (&class, &delta) in &self.class_deltas {
            doc.insert(class.label().into(), json!(delta));
        }
        for (&key, &delta) in &self.sum_deltas {
            doc.insert(key.label().into(), json!(delta));
        }
        Value::Object(doc)
    }
}

impl fmt::Display for IntervalDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = self.to_json();
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}", doc),
        }
    }
}
