//! Run counters and event tallies.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::attempt::Event;

/// Counters collected over one property run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Attempts executed in every phase
    pub attempts: usize,
    /// Attempts whose predicate held
    pub valid: usize,
    /// Attempts discarded by a failed precondition
    pub rejected: usize,
    /// Attempts that hit the choice cap
    pub overrun: usize,
    /// Attempts that failed or raised an error
    pub interesting: usize,
    /// Exploration attempts that mutated the best-scoring sequence
    pub targeted: usize,
    /// Replays spent by the shrinker
    pub shrink_calls: usize,
    /// Shrinker replays that produced a simpler example
    pub shrink_improvements: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
}

impl RunStats {
    /// Rejected plus overrun attempts
    pub fn invalid(&self) -> usize {
        self.rejected + self.overrun
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts ({} valid, {} rejected, {} overrun",
            self.attempts, self.valid, self.rejected, self.overrun
        )?;
        if self.targeted > 0 {
            write!(f, ", {} targeted", self.targeted)?;
        }
        write!(f, ")")?;
        if self.shrink_calls > 0 {
            write!(
                f,
                ", {} shrink replays ({} improvements)",
                self.shrink_calls, self.shrink_improvements
            )?;
        }
        write!(f, " in {:.2?}", self.duration)
    }
}

/// How often each event value was observed, counted once per attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTally {
    attempts: usize,
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl EventTally {
    /// Record the events of one attempt
    pub fn record(&mut self, events: &[Event]) {
        self.attempts += 1;
        let distinct: BTreeSet<(&str, &str)> = events
            .iter()
            .map(|e| (e.label.as_str(), e.value.as_str()))
            .collect();
        for (label, value) in distinct {
            *self
                .counts
                .entry(label.to_string())
                .or_default()
                .entry(value.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Attempts that observed `value` under `label`
    pub fn count(&self, label: &str, value: &str) -> usize {
        self.counts
            .get(label)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }

    /// Attempts recorded, with or without events
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for EventTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, values) in &self.counts {
            writeln!(f, "{}:", label)?;
            let mut values: Vec<(&String, &usize)> = values.iter().collect();
            values.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (value, count) in values {
                let percent = 100.0 * *count as f64 / self.attempts.max(1) as f64;
                writeln!(f, "  {:>6.2}%  {}", percent, value)?;
            }
        }
        Ok(())
    }
}
