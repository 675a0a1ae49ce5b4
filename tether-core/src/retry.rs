//! Retry disposition classifier and bounded retry executor.
//!
//! Every remote call in the attachment flow goes through [`execute`]: the
//! operation performs one blocking request and reports a [`RetryOutcome`];
//! the classifier decides whether to stop, consume retry budget, or loop
//! for free because the peer is merely busy.
//!
//! The delay between attempts is a fixed interval, not exponential backoff.
//! The loop anticipates short-lived busy/transient conditions only; a real
//! outage exhausts the bounded budget and surfaces as a failure instead of
//! retrying forever.

use std::thread;
use std::time::Duration;

use crate::types::ErrorCode;

/// What to do after one remote call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The call succeeded; stop.
    StopSuccess,
    /// Deterministic failure; retrying cannot help.
    StopFatal,
    /// Real but possibly temporary network trouble; retry against the budget.
    RetryBounded,
    /// Peer busy with another request; retry without consuming budget.
    RetryUnbounded,
}

/// Map a domain error code to a retry disposition.
///
/// `None` means the call produced no reply at all (channel unreachable or
/// transport failure) and counts as bounded-retryable.
pub fn classify(code: Option<ErrorCode>) -> Disposition {
    match code {
        None => Disposition::RetryBounded,
        Some(ErrorCode::Ok) => Disposition::StopSuccess,
        Some(ErrorCode::GetHostByName | ErrorCode::Connect | ErrorCode::HttpTransient) => {
            Disposition::RetryBounded
        }
        Some(ErrorCode::Retry) => Disposition::RetryUnbounded,
        Some(_) => Disposition::StopFatal,
    }
}

/// Result of one remote call attempt: an optional payload plus the domain
/// error code, when a reply arrived at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub payload: Option<T>,
    pub code: Option<ErrorCode>,
}

impl<T> RetryOutcome<T> {
    pub fn new(payload: T, code: ErrorCode) -> Self {
        Self {
            payload: Some(payload),
            code: Some(code),
        }
    }

    /// The call never reached the peer: no payload, no code.
    pub fn unreachable() -> Self {
        Self {
            payload: None,
            code: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Some(ErrorCode::Ok)
    }
}

/// Per-call-site retry budget and the shared inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub sleep: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, sleep: Duration) -> Self {
        Self {
            max_attempts,
            sleep,
        }
    }
}

/// Run `operation` until it succeeds, fails deterministically, or exhausts
/// the bounded budget. Returns the last outcome as-is; callers must treat
/// "no success code" as failure.
///
/// Never sleeps after the attempt whose outcome is returned.
pub fn execute<T, F>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> RetryOutcome<T>,
{
    let mut bounded_attempts: u32 = 0;
    loop {
        let outcome = operation();
        match classify(outcome.code) {
            Disposition::StopSuccess | Disposition::StopFatal => return outcome,
            Disposition::RetryBounded => {
                bounded_attempts += 1;
                if bounded_attempts >= policy.max_attempts {
                    tracing::warn!(
                        attempts = bounded_attempts,
                        code = ?outcome.code,
                        "retry budget exhausted"
                    );
                    return outcome;
                }
                tracing::debug!(
                    attempt = bounded_attempts,
                    max_attempts = policy.max_attempts,
                    code = ?outcome.code,
                    "transient failure, retrying"
                );
            }
            Disposition::RetryUnbounded => {
                tracing::debug!("peer busy, retrying without consuming budget");
            }
        }
        if !policy.sleep.is_zero() {
            thread::sleep(policy.sleep);
        }
    }
}

/// Fixed delay between retry attempts, shared by every call site.
pub const STEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Attempt budgets for each remote call site.
///
/// Only the budgets differ per site; the classifier and the inter-attempt
/// interval are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTuning {
    pub config_fetch: RetryPolicy,
    pub registration: RetryPolicy,
    pub login: RetryPolicy,
    pub account_manager: RetryPolicy,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            config_fetch: RetryPolicy::new(5, STEP_INTERVAL),
            registration: RetryPolicy::new(3, STEP_INTERVAL),
            login: RetryPolicy::new(3, STEP_INTERVAL),
            account_manager: RetryPolicy::new(3, STEP_INTERVAL),
        }
    }
}

impl RetryTuning {
    /// Production budgets with no inter-attempt delay. Test use.
    pub fn instant() -> Self {
        let default = Self::default();
        Self {
            config_fetch: RetryPolicy::new(default.config_fetch.max_attempts, Duration::ZERO),
            registration: RetryPolicy::new(default.registration.max_attempts, Duration::ZERO),
            login: RetryPolicy::new(default.login.max_attempts, Duration::ZERO),
            account_manager: RetryPolicy::new(
                default.account_manager.max_attempts,
                Duration::ZERO,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
