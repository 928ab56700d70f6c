//! The terminal report of a property run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attempt::{Event, Status};
use crate::error::{Diagnostic, ErrorInfo};
use crate::statistics::{EventTally, RunStats};

/// The persisted part of an attempt: enough to replay it exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Every choice the attempt drew, in order
    pub choices: Vec<u64>,
    /// Position of the attempt within its run
    pub generation: u64,
    /// Choice cap the attempt ran under
    pub max_choices: usize,
}

/// A concrete example with everything observed while it ran
#[derive(Debug, Clone)]
pub struct Counterexample<T> {
    /// The value rebuilt from the final choices; `None` if rebuilding failed
    pub value: Option<T>,
    /// Named arguments as `(name, Debug rendering)`
    pub arguments: Vec<(String, String)>,
    /// Events recorded by the attempt
    pub events: Vec<Event>,
    /// The choices that reproduce it
    pub record: Record,
}

/// Classification of a run, highest priority first
#[derive(Debug, Clone)]
pub enum Verdict<T> {
    /// The predicate raised an error
    Error {
        example: Counterexample<T>,
        error: ErrorInfo,
    },
    /// The predicate returned false
    Fail(Counterexample<T>),
    /// Every attempt held; the best-scoring attempt is reported
    Scored {
        example: Counterexample<T>,
        score: f64,
    },
    /// Every attempt held
    Pass,
    /// Too many consecutive attempts were rejected or overran
    Exhausted { valid: usize, invalid: usize },
}

/// The result of [`Property::check`](crate::Property::check)
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    /// Property key used for persistence
    pub key: String,
    pub verdict: Verdict<T>,
    /// The property was expected to fail
    pub broken: bool,
    /// Master seed of the run; pass it to `Config::seed` to reproduce
    pub seed: u64,
    pub stats: RunStats,
    /// Event frequencies across exploration attempts
    pub events: EventTally,
    /// Non-fatal problems (store access, impure generators)
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    /// Whether the run counts as passing, taking `broken` into account
    pub fn is_pass(&self) -> bool {
        match &self.verdict {
            Verdict::Pass | Verdict::Scored { .. } => true,
            Verdict::Fail(_) | Verdict::Error { .. } => self.broken,
            Verdict::Exhausted { .. } => false,
        }
    }

    /// Whether a failing or erroring example was found, regardless of `broken`
    pub fn is_falsified(&self) -> bool {
        matches!(self.verdict, Verdict::Fail(_) | Verdict::Error { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.verdict, Verdict::Exhausted { .. })
    }

    /// The reported example, if there is one
    pub fn example(&self) -> Option<&Counterexample<T>> {
        match &self.verdict {
            Verdict::Error { example, .. } | Verdict::Fail(example) | Verdict::Scored { example, .. } => {
                Some(example)
            }
            Verdict::Pass | Verdict::Exhausted { .. } => None,
        }
    }

    /// The reported value, if there is one and it could be rebuilt
    pub fn value(&self) -> Option<&T> {
        self.example().and_then(|example| example.value.as_ref())
    }

    /// The captured error of an `Error` verdict
    pub fn error(&self) -> Option<&ErrorInfo> {
        match &self.verdict {
            Verdict::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The best score of a `Scored` verdict
    pub fn score(&self) -> Option<f64> {
        match &self.verdict {
            Verdict::Scored { score, .. } => Some(*score),
            _ => None,
        }
    }

    /// The choice record of the reported example
    pub fn record(&self) -> Option<&Record> {
        self.example().map(|example| &example.record)
    }
}

impl<T: fmt::Debug> Outcome<T> {
    /// Panic with the formatted report unless the run passed
    #[track_caller]
    pub fn assert_passed(&self) {
        if !self.is_pass() {
            panic!("{}", self);
        }
    }
}

fn write_example<T: fmt::Debug>(
    f: &mut fmt::Formatter<'_>,
    heading: &str,
    example: &Counterexample<T>,
) -> fmt::Result {
    if example.arguments.is_empty() {
        match &example.value {
            Some(value) => write!(f, "\n{}: {:?}", heading, value)?,
            None => write!(f, "\n{}: <could not be rebuilt>", heading)?,
        }
    } else {
        write!(f, "\n{}:", heading)?;
        for (name, value) in &example.arguments {
            write!(f, "\n    {} = {}", name, value)?;
        }
    }
    write!(
        f,
        "\nChoices: {:?} (generation {})",
        example.record.choices, example.record.generation
    )?;
    for event in &example.events {
        write!(f, "\n    {}: {}", event.label, event.value)?;
    }
    Ok(())
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            Verdict::Pass => write!(f, "Property {} passed", self.key)?,
            Verdict::Scored { example, score } => {
                write!(f, "Property {} passed; best score {}", self.key, score)?;
                write_example(f, "Best-scoring input", example)?;
            }
            Verdict::Fail(example) => {
                write!(f, "Property {} FAILED", self.key)?;
                write_example(f, "Minimal failing input", example)?;
            }
            Verdict::Error { example, error } => {
                write!(f, "Property {} raised an error: {}", self.key, error)?;
                write_example(f, "Minimal failing input", example)?;
            }
            Verdict::Exhausted { valid, invalid } => write!(
                f,
                "Property {} gave up: {} consecutive invalid attempts after {} valid ones",
                self.key, invalid, valid
            )?,
        }

        if self.broken {
            write!(f, "\n(marked broken: failures are expected)")?;
        }
        write!(f, "\nSeed: {} (use this to reproduce the run)", self.seed)?;
        write!(f, "\nStats: {}", self.stats)?;
        for diagnostic in &self.diagnostics {
            write!(f, "\nwarning: {}", diagnostic)?;
        }
        Ok(())
    }
}

/// Result of replaying one exact choice sequence
#[derive(Debug, Clone)]
pub struct Replay<T> {
    pub status: Status,
    /// The value produced, when generation completed
    pub value: Option<T>,
    /// The error raised, for an interesting attempt that errored
    pub error: Option<ErrorInfo>,
    pub score: Option<f64>,
    pub events: Vec<Event>,
    /// The choices actually drawn
    pub choices: Vec<u64>,
}
