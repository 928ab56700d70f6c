//! Properties: a possibility, a predicate over its values, and a configuration.
//!
//! A predicate may return `bool`, `()` or `Result<R, E>`. Returning `false`
//! marks a failure, `Err(e)` or a panic marks an error, and `Err(Stop)`
//! propagates a rejection back to the attempt boundary.

use std::any::{Any, type_name};
use std::fmt::{Debug, Display};
use std::panic::{self, AssertUnwindSafe};

use crate::attempt::{Attempt, Completed, Status};
use crate::config::{Config, ConfigError, default_config};
use crate::context;
use crate::engine::{Engine, Executor, Finding, Parallel, Sequential, Trial, record_of};
use crate::error::{Diagnostic, ErrorInfo, Stop};
use crate::outcome::{Counterexample, Outcome, Record, Replay, Verdict};
use crate::possibility::Possibility;
use crate::rng;

/// How a predicate judged one value
#[derive(Debug, Clone, PartialEq)]
pub enum Judgement {
    Pass,
    Fail,
    /// The attempt was abandoned (rejection or overrun)
    Stop(Stop),
    Error(ErrorInfo),
}

/// Predicate return types the engine can classify
pub trait Judge {
    fn judge(self) -> Judgement;
}

impl Judge for bool {
    fn judge(self) -> Judgement {
        if self { Judgement::Pass } else { Judgement::Fail }
    }
}

impl Judge for () {
    fn judge(self) -> Judgement {
        Judgement::Pass
    }
}

impl Judge for Judgement {
    fn judge(self) -> Judgement {
        self
    }
}

impl<R, E> Judge for Result<R, E>
where
    R: Judge,
    E: Display + 'static,
{
    fn judge(self) -> Judgement {
        match self {
            Ok(inner) => inner.judge(),
            Err(err) => match (&err as &dyn Any).downcast_ref::<Stop>() {
                Some(stop) => Judgement::Stop(*stop),
                None => Judgement::Error(ErrorInfo::from_error(type_name::<E>(), &err)),
            },
        }
    }
}

/// A named property ready to be checked
pub struct Property<P, F> {
    name: String,
    possibility: P,
    predicate: F,
    config: Config,
}

impl<P, F, R> Property<P, F>
where
    P: Possibility,
    F: Fn(P::Value) -> R,
    R: Judge,
{
    /// Create a property using this thread's default configuration
    pub fn new(name: impl Into<String>, possibility: P, predicate: F) -> Self {
        Self {
            name: name.into(),
            possibility,
            predicate,
            config: default_config(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn max_examples(mut self, n: usize) -> Self {
        self.config.max_examples = n;
        self
    }

    /// Mark the property as expected to fail
    pub fn broken(mut self) -> Self {
        self.config.broken = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identity used by the example store: `<name>::<value type>`
    pub fn key(&self) -> String {
        format!("{}::{}", self.name, type_name::<P::Value>())
    }

    /// Run the property on the calling thread
    pub fn check(&self) -> Result<Outcome<P::Value>, ConfigError> {
        self.run(Sequential)
    }

    /// Run exploration batches across `config.workers` threads
    pub fn check_parallel(&self) -> Result<Outcome<P::Value>, ConfigError>
    where
        P: Sync,
        F: Sync,
    {
        let workers = self.config.resolved_workers();
        self.run(Parallel { workers })
    }

    /// Run one exact choice sequence; choices past its end come from randomness derived from it
    pub fn replay(&self, choices: &[u64]) -> Replay<P::Value> {
        let max_choices = self.config.max_choices.max(choices.len());
        let mut tc = Attempt::for_choices(choices, max_choices);
        let error = self.execute(&mut tc);
        let completed = tc.complete(error);

        let value = match completed.status {
            Status::Valid | Status::Interesting => self.materialize(&completed.choices, max_choices),
            _ => None,
        };
        Replay {
            status: completed.status,
            value,
            error: completed.error,
            score: completed.score,
            events: completed.events,
            choices: completed.choices,
        }
    }

    /// Minimize a sequence known to fail, without exploring or touching the store
    ///
    /// Returns `None` if `choices` does not fail.
    pub fn shrink_from(&self, choices: &[u64]) -> Option<Record> {
        let finding = Engine::new(
            self,
            &self.config,
            self.key(),
            rng::hash_choices(choices),
            None,
            Sequential,
        )
        .shrink_from(choices.to_vec());
        finding.error.or(finding.failure).map(|best| record_of(&best))
    }

    fn run<X: Executor<Self>>(&self, executor: X) -> Result<Outcome<P::Value>, ConfigError> {
        self.config.validate()?;

        let key = self.key();
        let seed = self.config.seed.unwrap_or_else(rng::entropy_seed);
        let mut diagnostics = Vec::new();

        let store = match self.config.open_store() {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "example store unavailable");
                diagnostics.push(Diagnostic::LookupFailed {
                    key: key.clone(),
                    message: err.to_string(),
                });
                None
            }
        };

        tracing::debug!(key = %key, seed, "checking property");
        let finding = Engine::new(self, &self.config, key.clone(), seed, store, executor).run();
        Ok(self.outcome(key, seed, finding, diagnostics))
    }

    fn outcome(
        &self,
        key: String,
        seed: u64,
        finding: Finding,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Outcome<P::Value> {
        diagnostics.extend(finding.diagnostics);

        let verdict = if let Some(best) = finding.error
            && let Some(error) = best.error.clone()
        {
            Verdict::Error {
                example: self.counterexample(&key, best, &mut diagnostics),
                error,
            }
        } else if let Some(best) = finding.failure {
            Verdict::Fail(self.counterexample(&key, best, &mut diagnostics))
        } else if let Some((valid, invalid)) = finding.exhausted {
            Verdict::Exhausted { valid, invalid }
        } else if let Some(best) = finding.scoring
            && let Some(score) = best.score
        {
            Verdict::Scored {
                example: self.counterexample(&key, best, &mut diagnostics),
                score,
            }
        } else {
            Verdict::Pass
        };

        let broken = self.config.broken;
        if broken && matches!(verdict, Verdict::Pass | Verdict::Scored { .. }) {
            tracing::warn!(key = %key, "property is marked broken but passed");
            diagnostics.push(Diagnostic::BrokenButPassed { key: key.clone() });
        }

        Outcome {
            key,
            verdict,
            broken,
            seed,
            stats: finding.stats,
            events: finding.events,
            diagnostics,
        }
    }

    fn counterexample(
        &self,
        key: &str,
        best: Completed,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Counterexample<P::Value> {
        let value = self.materialize(&best.choices, best.max_choices);
        if value.is_none() {
            tracing::warn!(key = %key, "example could not be rebuilt from its choices");
            diagnostics.push(Diagnostic::NotReproducible { key: key.to_string() });
        }
        Counterexample {
            value,
            record: record_of(&best),
            arguments: best.arguments,
            events: best.events,
        }
    }

    /// Rebuild the value for `choices`; `None` if generation no longer follows them
    fn materialize(&self, choices: &[u64], max_choices: usize) -> Option<P::Value> {
        let mut tc = Attempt::for_choices(choices, max_choices);
        let produced = {
            let _scope = context::enter(tc.notes());
            panic::catch_unwind(AssertUnwindSafe(|| self.possibility.produce(&mut tc)))
        };
        // Drop any capture left behind by a panicking generator
        context::take_panic();

        match produced {
            Ok(Ok(value)) if tc.choices() == choices => Some(value),
            _ => None,
        }
    }
}

impl<P, F, R> Property<P, F>
where
    P: Possibility,
    P::Value: Debug,
    F: Fn(P::Value) -> R,
    R: Judge,
{
    /// Check the property and panic with the report unless it passed
    #[track_caller]
    pub fn assert(&self) {
        match self.check() {
            Ok(outcome) => outcome.assert_passed(),
            Err(err) => panic!("invalid configuration for {}: {}", self.name, err),
        }
    }
}

impl<P, F, R> Trial for Property<P, F>
where
    P: Possibility,
    F: Fn(P::Value) -> R,
    R: Judge,
{
    fn execute(&self, tc: &mut Attempt) -> Option<ErrorInfo> {
        let judged = {
            let _scope = context::enter(tc.notes());
            panic::catch_unwind(AssertUnwindSafe(|| -> Result<Judgement, Stop> {
                let value = self.possibility.produce(tc)?;
                Ok((self.predicate)(value).judge())
            }))
        };

        match judged {
            Ok(Ok(Judgement::Pass)) => {
                tc.conclude(Status::Valid);
                None
            }
            Ok(Ok(Judgement::Fail)) => {
                tc.conclude(Status::Interesting);
                None
            }
            Ok(Ok(Judgement::Stop(stop))) | Ok(Err(stop)) => {
                tc.abort(stop);
                None
            }
            Ok(Ok(Judgement::Error(mut error))) => {
                error.trace.truncate(self.config.max_trace_lines);
                tc.conclude(Status::Interesting);
                Some(error)
            }
            Err(payload) => {
                let error = ErrorInfo::from_panic(
                    payload.as_ref(),
                    context::take_panic(),
                    self.config.max_trace_lines,
                );
                tc.conclude(Status::Interesting);
                Some(error)
            }
        }
    }
}

/// Check a property with this thread's default configuration
pub fn check<P, F, R>(
    name: impl Into<String>,
    possibility: P,
    predicate: F,
) -> Result<Outcome<P::Value>, ConfigError>
where
    P: Possibility,
    F: Fn(P::Value) -> R,
    R: Judge,
{
    Property::new(name, possibility, predicate).check()
}

/// Check a property with an explicit configuration
pub fn check_with_config<P, F, R>(
    name: impl Into<String>,
    possibility: P,
    predicate: F,
    config: Config,
) -> Result<Outcome<P::Value>, ConfigError>
where
    P: Possibility,
    F: Fn(P::Value) -> R,
    R: Judge,
{
    Property::new(name, possibility, predicate).config(config).check()
}
