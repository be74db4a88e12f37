//! Write-conflict retry combinator
//!
//! Engines report optimistic-concurrency clashes as `WriteConflict`. The
//! operation is retried until it succeeds or fails with anything else.
//! Interruption is checked before every attempt, so a killed or expired
//! context stops the loop at the next attempt boundary.

use std::thread;
use std::time::Duration;

use super::context::OperationContext;
use crate::errors::StorageResult;
use crate::observability::{Event, Logger, Severity};
use crate::types::Namespace;

/// Run `op` until it does not fail with `WriteConflict`
pub fn write_conflict_retry<T, F>(
    ctx: &OperationContext,
    op_name: &str,
    ns: &Namespace,
    mut op: F,
) -> StorageResult<T>
where
    F: FnMut() -> StorageResult<T>,
{
    let mut attempt: u32 = 0;
    loop {
        ctx.check_for_interrupt()?;
        match op() {
            Err(e) if e.is_write_conflict() => {
                attempt += 1;
                log_and_backoff(op_name, ns, attempt);
            }
            result => return result,
        }
    }
}

/// Retry variant for teardown paths that must run to completion even when
/// the context that started the work has been killed
pub fn write_conflict_retry_uninterruptible<T, F>(
    op_name: &str,
    ns: &Namespace,
    mut op: F,
) -> StorageResult<T>
where
    F: FnMut() -> StorageResult<T>,
{
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Err(e) if e.is_write_conflict() => {
                attempt += 1;
                log_and_backoff(op_name, ns, attempt);
            }
            result => return result,
        }
    }
}

fn log_and_backoff(op_name: &str, ns: &Namespace, attempt: u32) {
    let severity = if attempt % 1000 == 0 {
        Severity::Warn
    } else {
        Severity::Trace
    };
    if Logger::enabled(severity) {
        let attempt_str = attempt.to_string();
        let ns_str = ns.to_string();
        Logger::log(
            severity,
            Event::WriteConflictRetry.as_str(),
            &[("attempt", &attempt_str), ("ns", &ns_str), ("op", op_name)],
        );
    }
    backoff(attempt);
}

fn backoff(attempt: u32) {
    match attempt {
        0..=3 => {}
        4..=9 => thread::yield_now(),
        10..=99 => thread::sleep(Duration::from_millis(1)),
        100..=199 => thread::sleep(Duration::from_millis(5)),
        _ => thread::sleep(Duration::from_millis(10)),
    }
}
