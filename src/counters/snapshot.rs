//! pfctl interface counter parsing and aggregation.
//!
//! `pfctl -vvsI -i <if>` prints a loosely structured block per interface:
//!
//! ```text
//! igb0
//!         Cleared:     Fri Apr 22 14:22:28 2016
//!         References:  46
//!         In4/Pass:    [ Packets: 60939634           Bytes: 78438191152        ]
//!         ...
//! ```
//!
//! The format is not a versioned contract, so parsing is best-effort:
//! lines that do not look like a counter are skipped, malformed counter
//! lines are dropped without aborting the rest of the scan.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::counters::timestamp::Timestamp;

/// One raw pf counter: {direction} x {IP version} x {verdict}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CounterClass {
    In4Pass,
    In4Block,
    Out4Pass,
    Out4Block,
    In6Pass,
    In6Block,
    Out6Pass,
    Out6Block,
}

impl CounterClass {
    pub fn label(self) -> &'static str {
        match self {
            CounterClass::In4Pass => "In4/Pass",
            CounterClass::In4Block => "In4/Block",
            CounterClass::Out4Pass => "Out4/Pass",
            CounterClass::Out4Block => "Out4/Block",
            CounterClass::In6Pass => "In6/Pass",
            CounterClass::In6Block => "In6/Block",
            CounterClass::Out6Pass => "Out6/Pass",
            CounterClass::Out6Block => "Out6/Block",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "In4/Pass" => Some(CounterClass::In4Pass),
            "In4/Block" => Some(CounterClass::In4Block),
            "Out4/Pass" => Some(CounterClass::Out4Pass),
            "Out4/Block" => Some(CounterClass::Out4Block),
            "In6/Pass" => Some(CounterClass::In6Pass),
            "In6/Block" => Some(CounterClass::In6Block),
            "Out6/Pass" => Some(CounterClass::Out6Pass),
            "Out6/Block" => Some(CounterClass::Out6Block),
            _ => None,
        }
    }
}

/// The classes that are actually accumulated. pf does not meter
/// outbound-blocked traffic, so Out4/Block and Out6/Block are recognized
/// on input but never counted.
pub const COUNTED: [CounterClass; 6] = [
    CounterClass::In4Pass,
    CounterClass::In4Block,
    CounterClass::Out4Pass,
    CounterClass::In6Pass,
    CounterClass::In6Block,
    CounterClass::Out6Pass,
];

/// Aggregate categories derived from the raw classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SumKey {
    All,
    In,
    Out,
    V4,
    V6,
    Pass,
    Block,
}

impl SumKey {
    pub const ALL: [SumKey; 7] = [
        SumKey::All,
        SumKey::In,
        SumKey::Out,
        SumKey::V4,
        SumKey::V6,
        SumKey::Pass,
        SumKey::Block,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SumKey::All => "All",
            SumKey::In => "In",
            SumKey::Out => "Out",
            SumKey::V4 => "4",
            SumKey::V6 => "6",
            SumKey::Pass => "Pass",
            SumKey::Block => "Block",
        }
    }

    /// Membership table. This reproduces substring matching over the
    /// counter labels ("4" is contained in "In4/Pass", and so on) as an
    /// explicit exhaustive match.
    pub fn includes(self, class: CounterClass) -> bool {
        use CounterClass::*;
        match self {
            SumKey::All => true,
            SumKey::In => matches!(class, In4Pass | In4Block | In6Pass | In6Block),
            SumKey::Out => matches!(class, Out4Pass | Out4Block | Out6Pass | Out6Block),
            SumKey::V4 => matches!(class, In4Pass | In4Block | Out4Pass | Out4Block),
            SumKey::V6 => matches!(class, In6Pass | In6Block | Out6Pass | Out6Block),
            SumKey::Pass => matches!(class, In4Pass | Out4Pass | In6Pass | Out6Pass),
            SumKey::Block => matches!(class, In4Block | Out4Block | In6Block | Out6Block),
        }
    }
}

/// On a well-formed counter line the byte count is the 6th token:
/// `In4/Pass: [ Packets: 60939634 Bytes: 78438191152 ]`.
const VALUE_TOKEN: usize = 5;

/// One parsed, aggregated sample of all counters at a point in time.
/// Immutable once constructed; a new sample is a new instance.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    timestamp: Timestamp,
    cleared: Option<Timestamp>,
    values: BTreeMap<CounterClass, u64>,
    sums: BTreeMap<SumKey, u64>,
}

impl CounterSnapshot {
    /// Parse a raw pfctl dump, stamped with the current wall-clock time.
    pub fn parse(raw: &str) -> Self {
        Self::parse_at(raw, Timestamp::now())
    }

    /// Parse a raw pfctl dump with an explicit capture time. Used when
    /// replaying saved dumps, where "now" is not the sample time.
    pub fn parse_at(raw: &str, timestamp: Timestamp) -> Self {
        let mut values: BTreeMap<CounterClass, u64> =
            COUNTED.iter().map(|&class| (class, 0u64)).collect();
        let mut seen: Vec<CounterClass> = Vec::new();
        let mut cleared = None;

        for line in raw.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(first) = tokens.first() else { continue };
            let label = first.trim_end_matches(':');

            if label == "Cleared" {
                let text = tokens[1..].join(" ");
                match Timestamp::parse(&text) {
                    Ok(ts) => cleared = Some(ts),
                    Err(e) => debug!("Ignoring unparseable Cleared line: {}", e),
                }
                continue;
            }

            let Some(class) = CounterClass::from_label(label) else {
                continue;
            };
            let Some(token) = tokens.get(VALUE_TOKEN) else {
                debug!("Skipping truncated counter line for {}", label);
                continue;
            };
            match token.trim_end_matches(']').parse::<u64>() {
                Ok(bytes) => {
                    if COUNTED.contains(&class) {
                        values.insert(class, bytes);
                        seen.push(class);
                    }
                }
                Err(_) => {
                    debug!("Skipping counter line with non-numeric bytes for {}", label);
                }
            }
        }

        for class in COUNTED {
            if !seen.contains(&class) {
                warn!(
                    "Counter {} missing from pfctl output, treating as 0",
                    class.label()
                );
            }
        }

        let sums = Self::aggregate(&values);
        Self {
            timestamp,
            cleared,
            values,
            sums,
        }
    }

    /// Derive every sum from the raw values. Pure and idempotent.
    fn aggregate(values: &BTreeMap<CounterClass, u64>) -> BTreeMap<SumKey, u64> {
        SumKey::ALL
            .iter()
            .map(|&key| {
                let total = values
                    .iter()
                    .filter(|(&class, _)| key.includes(class))
                    .map(|(_, &bytes)| bytes)
                    .sum();
                (key, total)
            })
            .collect()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// pf's own "counters reset at" marker, when the dump carried one.
    pub fn cleared(&self) -> Option<Timestamp> {
        self.cleared
    }

    pub fn value(&self, class: CounterClass) -> u64 {
        self.values.get(&class).copied().unwrap_or(0)
    }

    pub fn sum(&self, key: SumKey) -> u64 {
        self.sums.get(&key).copied().unwrap_or(0)
    }

    /// Flat JSON document: timestamp, optional cleared marker, raw values
    /// and derived sums keyed by their pf labels.
    pub fn to_json(&self) -> Value {
        let values: serde_json::Map<String, Value> = COUNTED
            .iter()
            .map(|&class| (class.label().to_string(), json!(self.value(class))))
            .collect();
        let sums: serde_json::Map<String, Value> = SumKey::ALL
            .iter()
            .map(|&key| (key.label().to_string(), json!(self.sum(key))))
            .collect();
        json!({
            "timestamp": self.timestamp.format(),
            "cleared": self.cleared.map(|ts| ts.format()),
            "values": values,
            "sums": sums,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Literal pfctl dumps, one sample interval apart.
    pub const FIRST: &str = "igb0\n\
\tCleared:     Fri Apr 22 14:22:28 2016\n\
\tReferences:  46\n\
\tIn4/Pass:    [ Packets: 60939634           Bytes: 78438191152        ]\n\
\tIn4/Block:   [ Packets: 19863              Bytes: 1337478            ]\n\
\tOut4/Pass:   [ Packets: 30772200           Bytes: 2971388050         ]\n\
\tOut4/Block:  [ Packets: 1                  Bytes: 40                 ]\n\
\tIn6/Pass:    [ Packets: 35444914           Bytes: 22073635368        ]\n\
\tIn6/Block:   [ Packets: 3817               Bytes: 2630798            ]\n\
\tOut6/Pass:   [ Packets: 13026489           Bytes: 1796168437         ]\n\
\tOut6/Block:  [ Packets: 1                  Bytes: 86                 ]\n";

    pub const SECOND: &str = "igb0\n\
\tCleared:     Fri Apr 22 14:22:28 2016\n\
\tReferences:  46\n\
\tIn4/Pass:    [ Packets: 60939948           Bytes: 78438271821        ]\n\
\tIn4/Block:   [ Packets: 19866              Bytes: 1337700            ]\n\
\tOut4/Pass:   [ Packets: 30772514           Bytes: 2971407561         ]\n\
\tOut4/Block:  [ Packets: 1                  Bytes: 40                 ]\n\
\tIn6/Pass:    [ Packets: 35445961           Bytes: 22073733513        ]\n\
\tIn6/Block:   [ Packets: 3817               Bytes: 2630798            ]\n\
\tOut6/Pass:   [ Packets: 13026785           Bytes: 1796213111         ]\n\
\tOut6/Block:  [ Packets: 1                  Bytes: 86                 ]\n";

    #[test]
    fn test_parse_first_sample_values() {
        let snap = CounterSnapshot::parse(FIRST);
        let expected = [
            (CounterClass::In4Pass, 78438191152),
            (CounterClass::In4Block, 1337478),
            (CounterClass::Out4Pass, 2971388050),
            (CounterClass::In6Pass, 22073635368),
            (CounterClass::In6Block, 2630798),
            (CounterClass::Out6Pass, 1796168437),
        ];
        for (class, bytes) in expected {
            assert_eq!(snap.value(class), bytes, "{}", class.label());
        }
    }

    #[test]
    fn test_parse_second_sample_values() {
        let snap = CounterSnapshot::parse(SECOND);
        let expected = [
            (CounterClass::In4Pass, 78438271821),
            (CounterClass::In4Block, 1337700),
            (CounterClass::Out4Pass, 2971407561),
            (CounterClass::In6Pass, 22073733513),
            (CounterClass::In6Block, 2630798),
            (CounterClass::Out6Pass, 1796213111),
        ];
        for (class, bytes) in expected {
            assert_eq!(snap.value(class), bytes, "{}", class.label());
        }
    }

    #[test]
    fn test_outbound_block_is_not_counted() {
        let snap = CounterSnapshot::parse(FIRST);
        assert_eq!(snap.value(CounterClass::Out4Block), 0);
        assert_eq!(snap.value(CounterClass::Out6Block), 0);
        // Out sum must exclude the 40 and 86 bytes on the Block lines
        assert_eq!(snap.sum(SumKey::Out), 2971388050 + 1796168437);
    }

    #[test]
    fn test_in_and_out_sums() {
        let snap = CounterSnapshot::parse(FIRST);
        assert_eq!(
            snap.sum(SumKey::In),
            78438191152 + 1337478 + 22073635368 + 2630798
        );
        assert_eq!(snap.sum(SumKey::Out), 2971388050 + 1796168437);
    }

    #[test]
    fn test_sum_invariants() {
        for raw in [FIRST, SECOND] {
            let snap = CounterSnapshot::parse(raw);
            let all = snap.sum(SumKey::All);
            let values_total: u64 = COUNTED.iter().map(|&c| snap.value(c)).sum();
            assert_eq!(all, values_total);
            assert_eq!(snap.sum(SumKey::In) + snap.sum(SumKey::Out), all);
            assert_eq!(snap.sum(SumKey::V4) + snap.sum(SumKey::V6), all);
            assert_eq!(snap.sum(SumKey::Pass) + snap.sum(SumKey::Block), all);
        }
    }

    #[test]
    fn test_cleared_marker() {
        let snap = CounterSnapshot::parse(FIRST);
        assert_eq!(snap.cleared().unwrap().format(), "2016-04-22T14:22:28");
    }

    #[test]
    fn test_missing_cleared_is_none() {
        let snap = CounterSnapshot::parse(
            "igb0\n\tIn4/Pass:    [ Packets: 1 Bytes: 100 ]\n",
        );
        assert!(snap.cleared().is_none());
        assert_eq!(snap.value(CounterClass::In4Pass), 100);
    }

    #[test]
    fn test_unparseable_cleared_is_nonfatal() {
        let snap = CounterSnapshot::parse(
            "igb0\n\tCleared:     yesterday-ish\n\tIn4/Pass: [ Packets: 1 Bytes: 100 ]\n",
        );
        assert!(snap.cleared().is_none());
        assert_eq!(snap.value(CounterClass::In4Pass), 100);
    }

    #[test]
    fn test_truncated_line_does_not_corrupt_rest() {
        let raw = "igb0\n\
\tIn4/Pass:    [ Packets: 60939634\n\
\tIn4/Block:   [ Packets: 19863              Bytes: 1337478            ]\n\
\tOut4/Pass:   [ Packets: 30772200           Bytes: 2971388050         ]\n\
\tIn6/Pass:    [ Packets: 35444914           Bytes: 22073635368        ]\n\
\tIn6/Block:   [ Packets: 3817               Bytes: 2630798            ]\n\
\tOut6/Pass:   [ Packets: 13026489           Bytes: 1796168437         ]\n";
        let snap = CounterSnapshot::parse(raw);
        assert_eq!(snap.value(CounterClass::In4Pass), 0);
        assert_eq!(snap.value(CounterClass::In4Block), 1337478);
        assert_eq!(snap.value(CounterClass::Out6Pass), 1796168437);
    }

    #[test]
    fn test_non_numeric_value_is_skipped() {
        let raw = "\tIn4/Pass:    [ Packets: 1 Bytes: lots ]\n\
\tIn4/Block:   [ Packets: 2 Bytes: 200 ]\n";
        let snap = CounterSnapshot::parse(raw);
        assert_eq!(snap.value(CounterClass::In4Pass), 0);
        assert_eq!(snap.value(CounterClass::In4Block), 200);
    }

    #[test]
    fn test_empty_input_parses_to_zeroes() {
        let snap = CounterSnapshot::parse("");
        assert_eq!(snap.sum(SumKey::All), 0);
        assert!(snap.cleared().is_none());
    }

    #[test]
    fn test_label_round_trip() {
        for class in [
            CounterClass::In4Pass,
            CounterClass::In4Block,
            CounterClass::Out4Pass,
            CounterClass::Out4Block,
            CounterClass::In6Pass,
            CounterClass::In6Block,
            CounterClass::Out6Pass,
            CounterClass::Out6Block,
        ] {
            assert_eq!(CounterClass::from_label(class.label()), Some(class));
        }
        assert_eq!(CounterClass::from_label("References"), None);
    }

    #[test]
    fn test_membership_matches_substring_semantics() {
        for class in COUNTED {
            for key in SumKey::ALL {
                let by_substring =
                    key == SumKey::All || class.label().contains(key.label());
                assert_eq!(
                    key.includes(class),
                    by_substring,
                    "{} vs {}",
                    key.label(),
                    class.label()
                );
            }
        }
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = CounterSnapshot::parse(FIRST);
        let doc = snap.to_json();
        assert_eq!(doc["values"]["In4/Pass"], 78438191152u64);
        assert_eq!(doc["sums"]["All"], snap.sum(SumKey::All));
        assert_eq!(doc["cleared"], "2016-04-22T14:22:28");
    }
}
