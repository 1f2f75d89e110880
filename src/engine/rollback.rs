//! Ordered multi-record writes with explicit compensation.
//!
//! There is no transaction around a multi-record write. Each write is paired with a
//! compensator that undoes it. Writes run in order. When one fails, the compensators
//! of the writes that already succeeded run in reverse order and the original error
//! is returned. A compensator that itself fails is logged and skipped.

use tracing::{debug, error};

use crate::error::CadenceError;

type Action<'a> = Box<dyn FnOnce() -> Result<(), CadenceError> + 'a>;

pub struct WriteStep<'a> {
    label: &'static str,
    apply: Action<'a>,
    compensate: Action<'a>,
}

impl<'a> WriteStep<'a> {
    pub fn new(
        label: &'static str,
        apply: impl FnOnce() -> Result<(), CadenceError> + 'a,
        compensate: impl FnOnce() -> Result<(), CadenceError> + 'a,
    ) -> Self {
        Self {
            label,
            apply: Box::new(apply),
            compensate: Box::new(compensate),
        }
    }

    /// Last write of a sequence: nothing runs after it, so it never needs undoing.
    pub fn last(label: &'static str, apply: impl FnOnce() -> Result<(), CadenceError> + 'a) -> Self {
        Self::new(label, apply, || Ok(()))
    }
}

pub fn create_with_rollback(steps: Vec<WriteStep<'_>>) -> Result<(), CadenceError> {
    let mut done: Vec<(&'static str, Action<'_>)> = Vec::with_capacity(steps.len());

    for step in steps {
        match (step.apply)() {
            Ok(()) => done.push((step.label, step.compensate)),
            Err(err) => {
                debug!(failed = step.label, undo = done.len(), "write failed, compensating");
                for (label, compensate) in done.into_iter().rev() {
                    if let Err(undo_err) = compensate() {
                        error!(step = label, error = %undo_err, "compensation failed");
                    }
                }
                return Err(err.context(step.label));
            }
        }
    }
    Ok(())
}
