//! A single trial: the choices it drew, its status, score and events.

use std::cell::RefCell;
use std::fmt::Debug;
use std::ops::RangeInclusive;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ErrorInfo, Stop};
use crate::rng::{self, ChoiceSource};

/// Lifecycle of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Still drawing choices
    InProgress,
    /// The predicate held
    Valid,
    /// A precondition failed; the attempt is discarded
    Rejected,
    /// The choice cap was reached
    Overrun,
    /// The predicate failed or raised an error
    Interesting,
}

/// A labeled observation recorded during an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub label: String,
    pub value: String,
}

/// A labeled range of choice positions drawn by one sub-structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub label: &'static str,
    pub start: usize,
    pub end: usize,
    pub depth: usize,
}

impl Span {
    /// Number of choices covered
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no choices
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Side information written through the ambient context as well as the attempt
#[derive(Debug, Default)]
pub(crate) struct Notes {
    pub(crate) events: Vec<Event>,
    pub(crate) arguments: Vec<(String, String)>,
    pub(crate) target_score: Option<f64>,
    pub(crate) rejected: bool,
}

impl Notes {
    pub(crate) fn record_event(&mut self, label: Option<String>, value: String) {
        let label = label.unwrap_or_else(|| format!("UNLABELED_EVENT_{}", self.events.len()));
        self.events.push(Event { label, value });
    }

    /// Returns false if a score was already set
    pub(crate) fn set_target(&mut self, score: f64) -> bool {
        if self.target_score.is_some() || score.is_nan() {
            return false;
        }
        self.target_score = Some(score);
        true
    }
}

/// One trial's mutable state
///
/// Possibilities draw from it through [`Attempt::choice`] and friends; every
/// draw is recorded so that the same sequence replays to the same value.
#[derive(Debug)]
pub struct Attempt {
    source: ChoiceSource,
    choices: Vec<u64>,
    max_choices: usize,
    status: Status,
    generation: u64,
    notes: Rc<RefCell<Notes>>,
    spans: Vec<Span>,
    open_spans: Vec<usize>,
    residual: Option<StdRng>,
}

impl Attempt {
    /// Create an attempt over an explicit choice source
    pub fn new(source: ChoiceSource, max_choices: usize, generation: u64) -> Self {
        Self {
            source,
            choices: Vec::new(),
            max_choices,
            status: Status::InProgress,
            generation,
            notes: Rc::new(RefCell::new(Notes::default())),
            spans: Vec::new(),
            open_spans: Vec::new(),
            residual: None,
        }
    }

    /// Attempt drawing fresh randomness from `seed`
    pub fn fresh(seed: u64, max_choices: usize) -> Self {
        Self::new(ChoiceSource::fresh(seed), max_choices, 0)
    }

    /// Attempt replaying `choices` exactly
    pub fn for_choices(choices: &[u64], max_choices: usize) -> Self {
        Self::new(ChoiceSource::exact(choices.to_vec()), max_choices, 0)
    }

    /// Draw a choice in `[0, n]`
    pub fn choice(&mut self, n: u64) -> Result<u64, Stop> {
        self.make_choice(n, |rng| rng::uniform(rng, n))
    }

    /// Draw a value in an inclusive range
    pub fn draw(&mut self, range: RangeInclusive<u64>) -> Result<u64, Stop> {
        let (lo, hi) = range.into_inner();
        if lo > hi {
            return Err(self.reject());
        }
        Ok(lo + self.choice(hi - lo)?)
    }

    /// Draw `true` with probability `p`
    pub fn weighted(&mut self, p: f64) -> Result<bool, Stop> {
        let value = if p.is_nan() || p <= 0.0 {
            self.forced_choice(0)?
        } else if p >= 1.0 {
            self.forced_choice(1)?
        } else {
            self.make_choice(1, |rng| u64::from(rng.gen_bool(p)))?
        };
        Ok(value == 1)
    }

    /// Record `value` as the next choice regardless of the source
    pub fn forced_choice(&mut self, value: u64) -> Result<u64, Stop> {
        self.ensure_open()?;
        if self.choices.len() >= self.max_choices {
            self.status = Status::Overrun;
            return Err(Stop::Overrun);
        }
        self.choices.push(value);
        Ok(value)
    }

    /// Mark the attempt rejected and return the signal to propagate
    pub fn reject(&mut self) -> Stop {
        self.notes.borrow_mut().rejected = true;
        if self.status == Status::InProgress {
            self.status = Status::Rejected;
        }
        Stop::Rejected
    }

    /// Reject unless `condition` holds
    pub fn assume(&mut self, condition: bool) -> Result<(), Stop> {
        if condition { Ok(()) } else { Err(self.reject()) }
    }

    /// Set the attempt's score; only the first call has an effect
    pub fn target(&mut self, score: f64) {
        if !self.notes.borrow_mut().set_target(score) {
            tracing::debug!(score, "ignoring repeated target() in one attempt");
        }
    }

    /// Record an unlabeled event
    pub fn event(&mut self, value: impl Debug) {
        self.notes.borrow_mut().record_event(None, format!("{:?}", value));
    }

    /// Record a labeled event
    pub fn labeled_event(&mut self, label: impl Into<String>, value: impl Debug) {
        self.notes
            .borrow_mut()
            .record_event(Some(label.into()), format!("{:?}", value));
    }

    /// Residual randomness for generators that need more than bounded choices
    ///
    /// Seeded from one full-width choice the first time it is requested.
    pub fn rng(&mut self) -> Result<&mut StdRng, Stop> {
        let rng = match self.residual.take() {
            Some(rng) => rng,
            None => StdRng::seed_from_u64(self.choice(u64::MAX)?),
        };
        Ok(self.residual.insert(rng))
    }

    /// Open a labeled span at the current position
    pub fn start_span(&mut self, label: &'static str) {
        let position = self.choices.len();
        self.spans.push(Span {
            label,
            start: position,
            end: position,
            depth: self.open_spans.len(),
        });
        self.open_spans.push(self.spans.len() - 1);
    }

    /// Close the innermost open span
    pub fn stop_span(&mut self) {
        if let Some(index) = self.open_spans.pop() {
            self.spans[index].end = self.choices.len();
        }
    }

    /// Close and drop the innermost open span
    pub fn discard_span(&mut self) {
        if let Some(index) = self.open_spans.pop() {
            self.spans.truncate(index);
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn choices(&self) -> &[u64] {
        &self.choices
    }

    pub fn max_choices(&self) -> usize {
        self.max_choices
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn target_score(&self) -> Option<f64> {
        self.notes.borrow().target_score
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.notes.borrow().events.clone()
    }

    pub(crate) fn notes(&self) -> Rc<RefCell<Notes>> {
        Rc::clone(&self.notes)
    }

    pub(crate) fn note_argument(&mut self, name: &str, rendered: String) {
        self.notes
            .borrow_mut()
            .arguments
            .push((name.to_string(), rendered));
    }

    /// Conclude the attempt; a pending rejection or abort takes precedence
    pub(crate) fn conclude(&mut self, status: Status) {
        if self.notes.borrow().rejected {
            self.status = Status::Rejected;
        } else if self.status == Status::InProgress {
            self.status = status;
        }
    }

    /// Conclude from a propagated stop signal
    pub(crate) fn abort(&mut self, stop: Stop) {
        match stop {
            Stop::Rejected => self.conclude(Status::Rejected),
            Stop::Overrun => self.conclude(Status::Overrun),
            Stop::Finished => self.conclude(Status::Valid),
        }
    }

    /// Freeze the attempt into its thread-safe summary
    pub(crate) fn complete(mut self, error: Option<ErrorInfo>) -> Completed {
        if self.status == Status::InProgress {
            self.conclude(Status::Valid);
        }
        while !self.open_spans.is_empty() {
            self.stop_span();
        }
        let notes = self.notes.take();
        Completed {
            choices: self.choices,
            status: self.status,
            score: notes.target_score,
            events: notes.events,
            arguments: notes.arguments,
            spans: self.spans,
            error: if self.status == Status::Interesting { error } else { None },
            generation: self.generation,
            max_choices: self.max_choices,
        }
    }

    fn make_choice(&mut self, n: u64, draw: impl FnOnce(&mut StdRng) -> u64) -> Result<u64, Stop> {
        self.ensure_open()?;
        if self.choices.len() >= self.max_choices {
            self.status = Status::Overrun;
            return Err(Stop::Overrun);
        }
        let value = self.source.next_choice(self.choices.len(), draw);
        if value > n {
            // Replayed value out of range for this draw
            self.status = Status::Rejected;
            return Err(Stop::Rejected);
        }
        self.choices.push(value);
        Ok(value)
    }

    fn ensure_open(&mut self) -> Result<(), Stop> {
        if self.status == Status::InProgress && self.notes.borrow().rejected {
            self.status = Status::Rejected;
        }
        match self.status {
            Status::InProgress => Ok(()),
            Status::Rejected => Err(Stop::Rejected),
            Status::Overrun => Err(Stop::Overrun),
            Status::Valid | Status::Interesting => Err(Stop::Finished),
        }
    }
}

/// Immutable summary of a finished attempt; safe to send across threads
#[derive(Debug, Clone)]
pub(crate) struct Completed {
    pub(crate) choices: Vec<u64>,
    pub(crate) status: Status,
    pub(crate) score: Option<f64>,
    pub(crate) events: Vec<Event>,
    pub(crate) arguments: Vec<(String, String)>,
    pub(crate) spans: Vec<Span>,
    pub(crate) error: Option<ErrorInfo>,
    pub(crate) generation: u64,
    pub(crate) max_choices: usize,
}

impl Completed {
    pub(crate) fn is_interesting(&self) -> bool {
        self.status == Status::Interesting
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }
}
