//! Choice-sequence shrinking.
//!
//! The shrinker edits the choice sequence of the current best failure and
//! replays each candidate through the engine. A candidate is kept only if it
//! reproduces the same classification (and error kind) with a simpler
//! sequence: shorter first, then lexicographically smaller.

use std::collections::HashMap;

use crate::attempt::Span;
use crate::engine::{Engine, Executor, Trial};

/// Shortlex order: `a` is simpler than `b`
pub fn simpler(a: &[u64], b: &[u64]) -> bool {
    (a.len(), a) < (b.len(), b)
}

/// Drives the shrink passes against an engine's current best failure
pub(crate) struct Shrinker<'e, 'a, T: ?Sized, X> {
    engine: &'e mut Engine<'a, T, X>,
    budget: usize,
    calls: usize,
}

impl<'e, 'a, T, X> Shrinker<'e, 'a, T, X>
where
    T: Trial + ?Sized,
    X: Executor<T>,
{
    pub(crate) fn new(engine: &'e mut Engine<'a, T, X>) -> Self {
        let budget = engine.config().max_shrinks;
        Self {
            engine,
            budget,
            calls: 0,
        }
    }

    /// Run passes until none of them improves the example or the budget runs out
    pub(crate) fn run(mut self) {
        let Some(start) = self.current() else {
            return;
        };
        tracing::debug!(choices = start.len(), budget = self.budget, "shrinking");

        loop {
            let before = self.current();

            self.delete_blocks();
            self.zero_blocks();
            self.reduce_values();
            self.normalize_spans();
            self.swap_adjacent();
            self.redistribute();

            if self.exhausted() || self.current() == before {
                break;
            }
        }

        tracing::debug!(
            calls = self.calls,
            choices = self.current().map_or(0, |c| c.len()),
            exhausted = self.exhausted(),
            "shrinking finished"
        );
    }

    fn current(&self) -> Option<Vec<u64>> {
        self.engine.best_interesting().map(|best| best.choices.clone())
    }

    fn current_spans(&self) -> Vec<Span> {
        self.engine
            .best_interesting()
            .map(|best| best.spans.clone())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.engine
            .best_interesting()
            .map_or(0, |best| best.choices.len())
    }

    fn exhausted(&self) -> bool {
        self.calls >= self.budget
    }

    /// Replay `candidate`; true if the shrink target is now `candidate` or simpler
    fn consider(&mut self, candidate: &[u64]) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        if candidate == current.as_slice() {
            return true;
        }
        if self.exhausted() || !simpler(candidate, &current) || self.engine.seen(candidate) {
            return false;
        }

        let before = self.engine.target_revision();
        self.calls += 1;
        self.engine.stats.shrink_calls += 1;
        self.engine.run_candidate(candidate.to_vec());

        let improved = self.engine.target_revision() != before;
        if improved {
            self.engine.stats.shrink_improvements += 1;
            tracing::trace!(choices = self.len(), "shrink improved");
        }
        improved
    }

    /// Smallest `v` in `[lo, hi]` with `f(v)`, assuming `f(hi)` holds
    fn bin_search_down(&mut self, mut lo: u64, mut hi: u64, mut f: impl FnMut(&mut Self, u64) -> bool) -> u64 {
        if f(self, lo) {
            return lo;
        }
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if f(self, mid) {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }

    /// Delete blocks of growing then shrinking size, scanning from the end
    fn delete_blocks(&mut self) {
        let mut sizes = Vec::new();
        let mut k = 1;
        while k <= self.len().max(1) {
            sizes.push(k);
            k *= 2;
        }
        let ascending = sizes.clone();
        sizes.extend(ascending.iter().rev().skip(1));

        for k in sizes {
            let mut i = self.len() as isize - k as isize;
            while i >= 0 && !self.exhausted() {
                let at = i as usize;
                let Some(current) = self.current() else {
                    return;
                };
                if at + k > current.len() {
                    i -= 1;
                    continue;
                }

                let mut attempt: Vec<u64> = current[..at]
                    .iter()
                    .chain(&current[at + k..])
                    .copied()
                    .collect();
                if self.consider(&attempt) {
                    continue;
                }
                // A deleted element often leaves a count one too high before it
                if at > 0 && attempt[at - 1] > 0 {
                    attempt[at - 1] -= 1;
                    if self.consider(&attempt) {
                        continue;
                    }
                }
                i -= 1;
            }
        }
    }

    /// Set whole blocks to zero
    fn zero_blocks(&mut self) {
        for k in [8usize, 4, 2] {
            let mut i = self.len() as isize - k as isize;
            while i >= 0 && !self.exhausted() {
                let at = i as usize;
                let Some(mut attempt) = self.current() else {
                    return;
                };
                if at + k <= attempt.len() && attempt[at..at + k].iter().any(|&v| v != 0) {
                    attempt[at..at + k].fill(0);
                    if self.consider(&attempt) {
                        i -= k as isize;
                        continue;
                    }
                }
                i -= 1;
            }
        }
    }

    /// Binary-search each choice toward zero, last position first
    fn reduce_values(&mut self) {
        let mut i = self.len();
        while i > 0 && !self.exhausted() {
            i -= 1;
            let Some(current) = self.current() else {
                return;
            };
            if i >= current.len() || current[i] == 0 {
                continue;
            }
            self.bin_search_down(0, current[i], |shrinker, v| {
                let Some(mut attempt) = shrinker.current() else {
                    return false;
                };
                if i >= attempt.len() {
                    return false;
                }
                attempt[i] = v;
                shrinker.consider(&attempt)
            });
        }
    }

    /// Sort, then equalize, runs of equal-length sibling spans
    fn normalize_spans(&mut self) {
        'restart: while !self.exhausted() {
            let Some(current) = self.current() else {
                return;
            };
            for run in sibling_runs(&self.current_spans()) {
                for group in run.chunk_by(|a, b| a.len() == b.len()) {
                    if group.len() < 2 {
                        continue;
                    }
                    let start = group[0].start;
                    let end = group[group.len() - 1].end;
                    let blocks: Vec<&[u64]> = group.iter().map(|s| &current[s.start..s.end]).collect();

                    let mut sorted = blocks.clone();
                    sorted.sort();
                    if sorted != blocks {
                        let candidate = splice(&current, start, end, sorted.concat());
                        if self.consider(&candidate) {
                            continue 'restart;
                        }
                    }

                    for pair in group.windows(2) {
                        let (a, b) = (&current[pair[0].start..pair[0].end], &current[pair[1].start..pair[1].end]);
                        if a < b {
                            let candidate = splice(&current, pair[1].start, pair[1].end, a.to_vec());
                            if self.consider(&candidate) {
                                continue 'restart;
                            }
                        }
                    }
                }
            }
            return;
        }
    }

    /// Swap out-of-order neighbours: single choices, then equal-length sibling spans
    fn swap_adjacent(&mut self) {
        for k in [2usize, 1] {
            let mut i = self.len() as isize - k as isize - 1;
            while i >= 0 && !self.exhausted() {
                let (a, b) = (i as usize, i as usize + k);
                if let Some(mut attempt) = self.current()
                    && b < attempt.len()
                    && attempt[a] > attempt[b]
                {
                    attempt.swap(a, b);
                    self.consider(&attempt);
                }
                i -= 1;
            }
        }

        let mut changed = true;
        while changed && !self.exhausted() {
            changed = false;
            let Some(current) = self.current() else {
                return;
            };
            for run in sibling_runs(&self.current_spans()) {
                for pair in run.windows(2) {
                    let (x, y) = (pair[0], pair[1]);
                    if x.len() != y.len() || current[x.start..x.end] <= current[y.start..y.end] {
                        continue;
                    }
                    let mut swapped = current[y.start..y.end].to_vec();
                    swapped.extend_from_slice(&current[x.start..x.end]);
                    let candidate = splice(&current, x.start, y.end, swapped);
                    if self.consider(&candidate) {
                        changed = true;
                        break;
                    }
                }
                if changed {
                    break;
                }
            }
        }
    }

    /// Move value from an earlier choice to a later one
    fn redistribute(&mut self) {
        for k in [2usize, 1] {
            let mut i = self.len() as isize - k as isize - 1;
            while i >= 0 && !self.exhausted() {
                let (a, b) = (i as usize, i as usize + k);
                i -= 1;
                let Some(current) = self.current() else {
                    return;
                };
                if b >= current.len() || current[a] == 0 {
                    continue;
                }
                let (x, y) = (current[a], current[b]);
                self.bin_search_down(0, x, |shrinker, v| {
                    let Some(mut attempt) = shrinker.current() else {
                        return false;
                    };
                    let Some(moved) = y.checked_add(x - v) else {
                        return false;
                    };
                    if b >= attempt.len() {
                        return false;
                    }
                    attempt[a] = v;
                    attempt[b] = moved;
                    shrinker.consider(&attempt)
                });
            }
        }
    }
}

/// Replace `choices[start..end]` with `replacement`
fn splice(choices: &[u64], start: usize, end: usize, replacement: Vec<u64>) -> Vec<u64> {
    let mut out = Vec::with_capacity(choices.len());
    out.extend_from_slice(&choices[..start]);
    out.extend(replacement);
    out.extend_from_slice(&choices[end..]);
    out
}

/// Maximal runs of contiguous, non-empty spans sharing a label and depth
fn sibling_runs(spans: &[Span]) -> Vec<Vec<Span>> {
    let mut runs: Vec<Vec<Span>> = Vec::new();
    let mut open: HashMap<(usize, &'static str), usize> = HashMap::new();

    for span in spans.iter().filter(|s| !s.is_empty()) {
        let key = (span.depth, span.label);
        match open.get(&key) {
            Some(&index) if runs[index].last().is_some_and(|last| last.end == span.start) => {
                runs[index].push(*span);
            }
            _ => {
                runs.push(vec![*span]);
                open.insert(key, runs.len() - 1);
            }
        }
    }

    runs.retain(|run| run.len() >= 2);
    runs
}
