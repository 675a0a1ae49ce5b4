//! Tether core library — attachment domain types and retry machinery.
//!
//! Public API surface:
//! - [`types`] — error codes, credentials, project and account payloads,
//!   attachment status
//! - [`retry`] — disposition classifier and bounded retry executor

pub mod retry;
pub mod types;

pub use retry::{classify, execute, Disposition, RetryOutcome, RetryPolicy, RetryTuning};
pub use types::{
    AccountManagerInfo, AccountReply, AccountRequest, AttachStatus, AttachmentState, Credentials,
    ErrorCode, ProjectCandidate, ProjectConfig,
};
