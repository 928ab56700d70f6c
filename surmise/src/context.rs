//! Ambient access to the attempt currently running on this thread.
//!
//! Predicates receive their value, not the attempt, so `target`, `event` and
//! `reject` reach the attempt through a thread-local binding. The binding is
//! pushed when an attempt starts and popped by a guard, so it is restored on
//! every exit path including unwinding.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::panic;
use std::rc::Rc;
use std::sync::Once;

use crate::attempt::Notes;
use crate::error::{PanicCapture, Stop, backtrace_lines};

thread_local! {
    static CURRENT: RefCell<Vec<Rc<RefCell<Notes>>>> = const { RefCell::new(Vec::new()) };
    static LAST_PANIC: RefCell<Option<PanicCapture>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Guard returned by [`enter`]; pops the binding when dropped
pub(crate) struct Scope {
    depth: usize,
    // Bindings are per thread
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for Scope {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|stack| {
            if let Ok(mut stack) = stack.try_borrow_mut() {
                stack.truncate(self.depth);
            }
        });
    }
}

/// Bind `notes` as the current attempt on this thread
pub(crate) fn enter(notes: Rc<RefCell<Notes>>) -> Scope {
    install_panic_hook();
    CURRENT.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(notes);
        Scope {
            depth: stack.len() - 1,
            _not_send: PhantomData,
        }
    })
}

fn with_current<R>(f: impl FnOnce(&mut Notes) -> R) -> Option<R> {
    CURRENT
        .try_with(|stack| {
            let stack = stack.try_borrow().ok()?;
            let notes = stack.last()?;
            let mut notes = notes.try_borrow_mut().ok()?;
            Some(f(&mut notes))
        })
        .ok()
        .flatten()
}

/// Whether an attempt is bound on the current thread
pub fn in_attempt() -> bool {
    CURRENT
        .try_with(|stack| stack.try_borrow().map(|s| !s.is_empty()).unwrap_or(false))
        .unwrap_or(false)
}

/// Set the score of the running attempt; only the first call per attempt counts
pub fn target(score: f64) {
    match with_current(|notes| notes.set_target(score)) {
        Some(true) => {}
        Some(false) => tracing::debug!(score, "ignoring repeated target() in one attempt"),
        None => tracing::warn!(score, "target() called outside of a running property"),
    }
}

/// Record an unlabeled event on the running attempt
pub fn event(value: impl Debug) {
    let rendered = format!("{:?}", value);
    if with_current(|notes| notes.record_event(None, rendered)).is_none() {
        tracing::warn!("event() called outside of a running property");
    }
}

/// Record a labeled event on the running attempt
pub fn labeled_event(label: impl Into<String>, value: impl Debug) {
    let label = label.into();
    let rendered = format!("{:?}", value);
    if with_current(|notes| notes.record_event(Some(label), rendered)).is_none() {
        tracing::warn!("labeled_event() called outside of a running property");
    }
}

/// Reject the running attempt; propagate the returned signal with `Err(..)?`
pub fn reject() -> Stop {
    with_current(|notes| notes.rejected = true);
    Stop::Rejected
}

/// Reject the running attempt unless `condition` holds
pub fn assume(condition: bool) -> Result<(), Stop> {
    if condition { Ok(()) } else { Err(reject()) }
}

/// Take the panic details captured for this thread's last attempt panic
pub(crate) fn take_panic() -> Option<PanicCapture> {
    LAST_PANIC
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Install the process-wide hook that silences panics raised inside attempts
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !in_attempt() {
                previous(info);
                return;
            }

            let backtrace = backtrace_lines(&Backtrace::capture());
            let capture = PanicCapture {
                file: info.location().map(|l| l.file().to_string()),
                line: info.location().map(|l| l.line()),
                column: info.location().map(|l| l.column()),
                backtrace,
            };
            let _ = LAST_PANIC.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(capture);
                }
            });
        }));
    });
}
