//! The search driver: stored-example replay, random and score-guided
//! exploration, hand-off to the shrinker, and persistence of the result.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::panic;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, RngCore};

use crate::attempt::{Attempt, Completed, Status};
use crate::config::Config;
use crate::error::{Diagnostic, ErrorInfo};
use crate::outcome::Record;
use crate::rng::{self, ChoiceSource};
use crate::shrink::{Shrinker, simpler};
use crate::statistics::{EventTally, RunStats};
use crate::store::{ExampleKind, ExampleStore, StoredExample};

/// Something the engine can run against an attempt
pub(crate) trait Trial {
    /// Run one attempt to completion; returns the captured error when the
    /// attempt ended as an error rather than a plain failure
    fn execute(&self, tc: &mut Attempt) -> Option<ErrorInfo>;
}

/// Why an attempt was run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Stored,
    Fresh,
    Targeted,
    Shrink,
}

impl Origin {
    /// Whether invalid results count toward the consecutive rejection limit
    fn counts_toward_rejections(self) -> bool {
        matches!(self, Origin::Stored | Origin::Fresh)
    }
}

/// Everything needed to run one attempt, independent of engine state
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    prefix: Option<Vec<u64>>,
    seed: u64,
    generation: u64,
    max_choices: usize,
    origin: Origin,
}

/// Run a plan on the current thread
pub(crate) fn execute_plan<T: Trial + ?Sized>(trial: &T, plan: &Plan) -> Completed {
    let source = match &plan.prefix {
        Some(prefix) => ChoiceSource::replay(prefix.clone(), plan.seed),
        None => ChoiceSource::fresh(plan.seed),
    };
    let mut tc = Attempt::new(source, plan.max_choices, plan.generation);
    let error = trial.execute(&mut tc);
    tc.complete(error)
}

/// Strategy for running a batch of exploration plans
pub(crate) trait Executor<T: ?Sized> {
    /// Plans handed over per batch
    fn width(&self) -> usize;

    /// Run `plans`, returning results in plan order
    fn run_batch(&self, trial: &T, plans: &[Plan]) -> Vec<Completed>;
}

/// Runs every attempt on the calling thread
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sequential;

impl<T: Trial + ?Sized> Executor<T> for Sequential {
    fn width(&self) -> usize {
        1
    }

    fn run_batch(&self, trial: &T, plans: &[Plan]) -> Vec<Completed> {
        plans.iter().map(|plan| execute_plan(trial, plan)).collect()
    }
}

/// Spreads each batch over scoped worker threads
#[derive(Debug, Clone, Copy)]
pub(crate) struct Parallel {
    pub(crate) workers: usize,
}

impl<T: Trial + Sync + ?Sized> Executor<T> for Parallel {
    fn width(&self) -> usize {
        self.workers.max(1) * 4
    }

    fn run_batch(&self, trial: &T, plans: &[Plan]) -> Vec<Completed> {
        if self.workers <= 1 || plans.len() <= 1 {
            return Sequential.run_batch(trial, plans);
        }

        let chunk_size = plans.len().div_ceil(self.workers);
        let joined = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = plans
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|plan| execute_plan(trial, plan))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        });

        match joined {
            Ok(chunks) => chunks
                .into_iter()
                .flat_map(|chunk| match chunk {
                    Ok(results) => results,
                    Err(payload) => panic::resume_unwind(payload),
                })
                .collect(),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// What a run found, before values are materialized
#[derive(Debug)]
pub(crate) struct Finding {
    pub(crate) failure: Option<Completed>,
    pub(crate) error: Option<Completed>,
    pub(crate) scoring: Option<Completed>,
    /// Valid and consecutive-invalid counts when the rejection limit was hit
    pub(crate) exhausted: Option<(usize, usize)>,
    pub(crate) stats: RunStats,
    pub(crate) events: EventTally,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// Drives one property run
pub(crate) struct Engine<'a, T: ?Sized, X> {
    trial: &'a T,
    config: &'a Config,
    key: String,
    executor: X,
    store: Option<Arc<dyn ExampleStore>>,
    rng: StdRng,
    pub(crate) stats: RunStats,
    events: EventTally,
    best_failure: Option<Completed>,
    best_error: Option<Completed>,
    best_scoring: Option<Completed>,
    failure_revision: u64,
    error_revision: u64,
    visited: HashSet<u64>,
    stored: Option<StoredExample>,
    stored_reproduced: bool,
    consecutive_invalid: usize,
    exhausted: bool,
    trivial: bool,
    calls: usize,
    generation: u64,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, T, X> Engine<'a, T, X>
where
    T: Trial + ?Sized,
    X: Executor<T>,
{
    pub(crate) fn new(
        trial: &'a T,
        config: &'a Config,
        key: String,
        seed: u64,
        store: Option<Arc<dyn ExampleStore>>,
        executor: X,
    ) -> Self {
        Self {
            trial,
            config,
            key,
            executor,
            store,
            rng: rng::create_rng(Some(seed)),
            stats: RunStats::default(),
            events: EventTally::default(),
            best_failure: None,
            best_error: None,
            best_scoring: None,
            failure_revision: 0,
            error_revision: 0,
            visited: HashSet::new(),
            stored: None,
            stored_reproduced: false,
            consecutive_invalid: 0,
            exhausted: false,
            trivial: false,
            calls: 0,
            generation: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Replay, explore, shrink, persist
    pub(crate) fn run(mut self) -> Finding {
        let started = Instant::now();

        self.replay_stored();
        self.explore();
        if self.best_interesting().is_some() {
            Shrinker::new(&mut self).run();
        }
        self.persist();

        self.stats.duration = started.elapsed();
        self.finish()
    }

    /// Minimize a known sequence without exploring or touching the store
    pub(crate) fn shrink_from(mut self, choices: Vec<u64>) -> Finding {
        let started = Instant::now();

        self.run_candidate(choices);
        if self.best_interesting().is_some() {
            Shrinker::new(&mut self).run();
        }

        self.stats.duration = started.elapsed();
        self.finish()
    }

    pub(crate) fn config(&self) -> &Config {
        self.config
    }

    /// The record shrinking currently targets: the best error, else the best failure
    pub(crate) fn best_interesting(&self) -> Option<&Completed> {
        self.best_error.as_ref().or(self.best_failure.as_ref())
    }

    /// Changes whenever the shrink target is replaced
    pub(crate) fn target_revision(&self) -> (bool, u64) {
        if self.best_error.is_some() {
            (true, self.error_revision)
        } else {
            (false, self.failure_revision)
        }
    }

    /// Whether a sequence has already been executed
    pub(crate) fn seen(&self, choices: &[u64]) -> bool {
        self.visited.contains(&rng::hash_choices(choices))
    }

    /// Replay `prefix` during shrinking; fallback randomness is derived from the prefix
    pub(crate) fn run_candidate(&mut self, prefix: Vec<u64>) {
        self.visited.insert(rng::hash_choices(&prefix));
        let max_choices = self
            .best_interesting()
            .map_or(self.config.max_choices, |best| best.max_choices);
        let plan = Plan {
            seed: rng::hash_choices(&prefix),
            prefix: Some(prefix),
            generation: self.next_generation(),
            max_choices,
            origin: Origin::Shrink,
        };
        let completed = execute_plan(self.trial, &plan);
        self.fold(completed, plan.origin);
    }

    fn replay_stored(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        match store.lookup(&self.key) {
            Ok(Some(stored)) => {
                tracing::debug!(
                    key = %self.key,
                    choices = stored.record.choices.len(),
                    "replaying stored example"
                );
                let plan = Plan {
                    seed: rng::hash_choices(&stored.record.choices),
                    prefix: Some(stored.record.choices.clone()),
                    generation: self.next_generation(),
                    max_choices: stored.record.max_choices,
                    origin: Origin::Stored,
                };
                let completed = execute_plan(self.trial, &plan);
                self.stored_reproduced = completed.is_interesting();
                self.fold(completed, plan.origin);
                self.stored = Some(stored);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to look up stored example");
                self.diagnostics.push(Diagnostic::LookupFailed {
                    key: self.key.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    fn should_explore(&self) -> bool {
        self.best_interesting().is_none()
            && !self.exhausted
            && !self.trivial
            && self.stats.valid < self.config.max_examples
            && self.calls < self.max_calls()
    }

    fn max_calls(&self) -> usize {
        self.config
            .max_examples
            .saturating_mul(10)
            .saturating_add(self.config.max_rejections)
    }

    fn explore(&mut self) {
        tracing::debug!(key = %self.key, "exploring");

        while self.should_explore() {
            let width = self
                .executor
                .width()
                .min(self.config.max_examples - self.stats.valid)
                .max(1);
            let plans: Vec<Plan> = (0..width).map(|_| self.plan()).collect();
            let results = self.executor.run_batch(self.trial, &plans);

            for (plan, completed) in plans.iter().zip(results) {
                if !self.should_explore() {
                    break;
                }
                self.events.record(&completed.events);
                self.fold(completed, plan.origin);
            }
        }

        if self.exhausted {
            tracing::debug!(
                key = %self.key,
                valid = self.stats.valid,
                invalid = self.consecutive_invalid,
                "gave up after too many invalid attempts"
            );
        }
    }

    /// Next exploration plan: a mutation of the best-scoring sequence or a fresh draw
    fn plan(&mut self) -> Plan {
        let generation = self.next_generation();
        let seed = self.rng.next_u64();
        let ratio = self.config.target_ratio;
        let targeted = self.best_scoring.is_some() && ratio > 0.0 && self.rng.gen_bool(ratio);

        if targeted {
            let base = self
                .best_scoring
                .as_ref()
                .map(|best| best.choices.clone())
                .unwrap_or_default();
            Plan {
                prefix: Some(mutate(&mut self.rng, base)),
                seed,
                generation,
                max_choices: self.config.max_choices,
                origin: Origin::Targeted,
            }
        } else {
            Plan {
                prefix: None,
                seed,
                generation,
                max_choices: self.config.max_choices,
                origin: Origin::Fresh,
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Fold a finished attempt into counters and the retained best records
    fn fold(&mut self, completed: Completed, origin: Origin) {
        self.stats.attempts += 1;
        if origin != Origin::Shrink {
            self.calls += 1;
        }
        if origin == Origin::Targeted {
            self.stats.targeted += 1;
        }
        self.visited.insert(rng::hash_choices(&completed.choices));

        match completed.status {
            Status::Valid => {
                self.stats.valid += 1;
                if origin.counts_toward_rejections() {
                    self.consecutive_invalid = 0;
                }
                if completed.choices.is_empty() && origin != Origin::Shrink {
                    self.trivial = true;
                }
            }
            Status::Interesting => {
                self.stats.interesting += 1;
                if origin.counts_toward_rejections() {
                    self.consecutive_invalid = 0;
                }
            }
            Status::Rejected | Status::Overrun | Status::InProgress => {
                if completed.status == Status::Overrun {
                    self.stats.overrun += 1;
                } else {
                    self.stats.rejected += 1;
                }
                if origin.counts_toward_rejections() {
                    self.consecutive_invalid += 1;
                    if self.consecutive_invalid >= self.config.max_rejections {
                        self.exhausted = true;
                    }
                }
                return;
            }
        }

        if let Some(score) = completed.score {
            let improves = self
                .best_scoring
                .as_ref()
                .and_then(|best| best.score)
                .is_none_or(|best| score > best);
            if improves {
                tracing::trace!(key = %self.key, score, "new best score");
                self.best_scoring = Some(completed.clone());
            }
        }

        if completed.is_interesting() {
            self.fold_interesting(completed, origin);
        }
    }

    fn fold_interesting(&mut self, completed: Completed, origin: Origin) {
        match &completed.error {
            Some(error) => {
                let replace = match &self.best_error {
                    None => true,
                    Some(best) => best.error.as_ref().is_some_and(|incumbent| {
                        incumbent.same_kind(error)
                            && simpler(&completed.choices, &best.choices)
                            && !self.vetoed(error, incumbent)
                    }),
                };
                if replace {
                    if self.best_error.is_none() && origin != Origin::Shrink {
                        tracing::debug!(key = %self.key, kind = %error.kind, "found an error");
                    }
                    self.best_error = Some(completed);
                    self.error_revision += 1;
                }
            }
            None => {
                let replace = self
                    .best_failure
                    .as_ref()
                    .is_none_or(|best| simpler(&completed.choices, &best.choices));
                if replace {
                    if self.best_failure.is_none() && origin != Origin::Shrink {
                        tracing::debug!(key = %self.key, "found a failure");
                    }
                    self.best_failure = Some(completed);
                    self.failure_revision += 1;
                }
            }
        }
    }

    fn vetoed(&self, candidate: &ErrorInfo, incumbent: &ErrorInfo) -> bool {
        self.config
            .comparator(&candidate.kind)
            .is_some_and(|compare| compare(candidate, incumbent) == Ordering::Greater)
    }

    /// Write the minimal example, or drop a stored one that no longer reproduces
    fn persist(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        match self.best_interesting() {
            Some(best) => {
                let improves = match &self.stored {
                    None => true,
                    Some(stored) => {
                        !self.stored_reproduced || simpler(&best.choices, &stored.record.choices)
                    }
                };
                if !improves {
                    return;
                }

                let kind = match &best.error {
                    Some(error) => ExampleKind::Error {
                        kind: error.kind.clone(),
                    },
                    None => ExampleKind::Fail,
                };
                let example = StoredExample::new(self.key.clone(), record_of(best), kind);
                match store.store(&example) {
                    Ok(()) => tracing::debug!(key = %self.key, "saved minimal example"),
                    Err(err) => {
                        tracing::warn!(key = %self.key, error = %err, "failed to save example");
                        self.diagnostics.push(Diagnostic::StoreFailed {
                            key: self.key.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }
            None => {
                if self.stored.is_none() || self.stored_reproduced {
                    return;
                }
                match store.remove(&self.key) {
                    Ok(()) => tracing::debug!(key = %self.key, "removed stale stored example"),
                    Err(err) => {
                        tracing::warn!(key = %self.key, error = %err, "failed to remove stale example");
                        self.diagnostics.push(Diagnostic::RemoveFailed {
                            key: self.key.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn finish(self) -> Finding {
        if let Some(best) = self.best_interesting() {
            tracing::info!(
                key = %self.key,
                choices = best.choices.len(),
                attempts = self.stats.attempts,
                shrinks = self.stats.shrink_calls,
                "property falsified"
            );
        }

        let exhausted = self.exhausted.then_some((self.stats.valid, self.consecutive_invalid));
        Finding {
            failure: self.best_failure,
            error: self.best_error,
            scoring: self.best_scoring,
            exhausted,
            stats: self.stats,
            events: self.events,
            diagnostics: self.diagnostics,
        }
    }
}

/// The persisted projection of a finished attempt
pub(crate) fn record_of(completed: &Completed) -> Record {
    Record {
        choices: completed.choices.clone(),
        generation: completed.generation,
        max_choices: completed.max_choices,
    }
}

/// Nudge one choice of `choices` up or down
fn mutate(rng: &mut StdRng, mut choices: Vec<u64>) -> Vec<u64> {
    if choices.is_empty() {
        return choices;
    }
    let index = rng.gen_range(0..choices.len());
    let value = choices[index];
    choices[index] = match rng.gen_range(0..4) {
        0 => value.saturating_add(1),
        1 => value.saturating_sub(1),
        2 => value.saturating_add(rng.gen_range(1..=16)),
        _ => value.saturating_sub(rng.gen_range(1..=16)),
    };
    choices
}
