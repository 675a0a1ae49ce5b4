//! Per-project attachment state machine.
//!
//! Drives one project from `Ready` through credential resolution to a
//! terminal status. Registration is preferred when the project allows
//! client-side account creation (it also succeeds idempotently when the
//! account exists and the password matches); otherwise, or when the caller
//! forces it, the flow logs in against an existing account.

use tether_core::{
    retry, AccountReply, AccountRequest, AttachStatus, AttachmentState, Credentials, ErrorCode,
    ProjectConfig, RetryOutcome, RetryTuning,
};

use crate::channel::{account_outcome, AccountOp, ControlChannel};

/// Advance `project` to a terminal status under the given credentials.
///
/// The returned status is always also stored in `project.status`; callers
/// never need to re-read it. Preconditions (status `Ready`, config present)
/// are a caller contract; violating them yields `Undefined` without any
/// remote call.
pub fn advance(
    project: &mut AttachmentState,
    channel: &dyn ControlChannel,
    credentials: &Credentials,
    tuning: &RetryTuning,
    force_lookup: bool,
) -> AttachStatus {
    tracing::debug!(project = %project.display_name, "attempting attach");

    let config = match (project.status, project.config.clone()) {
        (AttachStatus::Ready, Some(config)) => config,
        _ => {
            tracing::error!(
                project = %project.display_name,
                status = %project.status,
                "attach attempted without downloaded configuration"
            );
            project.status = AttachStatus::Undefined;
            return AttachStatus::Undefined;
        }
    };

    project.status = AttachStatus::Ongoing;

    let request = account_request(&config, credentials);
    let outcome = if force_lookup || config.client_account_creation_disabled {
        tracing::debug!(project = %config.name, "account creation disabled or lookup forced, logging in");
        retry::execute(&tuning.login, || {
            account_outcome(channel, AccountOp::Lookup, &request)
        })
    } else {
        retry::execute(&tuning.registration, || {
            account_outcome(channel, AccountOp::Register, &request)
        })
    };

    let status = match resolved_authenticator(&config, &outcome) {
        Ok(authenticator) => attach_once(channel, &config, &authenticator),
        Err(status) => status,
    };
    project.status = status;
    status
}

/// Build the account RPC input from a downloaded configuration and the
/// session credentials. The team field is reserved and always empty here.
fn account_request(config: &ProjectConfig, credentials: &Credentials) -> AccountRequest {
    AccountRequest {
        url: config.secure_url_if_available().to_string(),
        email: credentials.email.clone(),
        username: credentials.username.clone(),
        password: credentials.password.clone(),
        team: String::new(),
        uses_name: config.uses_name,
    }
}

/// Map the final credential-resolution outcome to either an authenticator
/// token or a terminal failure status.
fn resolved_authenticator(
    config: &ProjectConfig,
    outcome: &RetryOutcome<AccountReply>,
) -> Result<String, AttachStatus> {
    // The code decides first; failure replies may carry no payload at all.
    match outcome.code {
        Some(ErrorCode::Ok) => {}
        Some(ErrorCode::DbNotUnique) => return Err(AttachStatus::NameNotUnique),
        Some(ErrorCode::BadPassword) => return Err(AttachStatus::BadPassword),
        Some(ErrorCode::DbNotFound) => return Err(AttachStatus::UnknownUser),
        code => {
            tracing::warn!(project = %config.name, code = ?code, "unmapped credential error");
            return Err(AttachStatus::Undefined);
        }
    }

    let Some(reply) = &outcome.payload else {
        tracing::error!(project = %config.name, "credential retrieval produced no reply");
        return Err(AttachStatus::Undefined);
    };
    if reply.authenticator.is_empty() {
        tracing::error!(project = %config.name, "credential retrieval returned no authenticator");
        return Err(AttachStatus::Undefined);
    }
    Ok(reply.authenticator.clone())
}

/// Issue the attach call once. No retry classification applies here: the
/// surrounding retries already happened during credential resolution, and
/// any failure, transport included, is terminal.
fn attach_once(
    channel: &dyn ControlChannel,
    config: &ProjectConfig,
    authenticator: &str,
) -> AttachStatus {
    if !channel.is_connected() {
        tracing::error!(project = %config.name, "control channel not connected for attach");
        return AttachStatus::Undefined;
    }
    match channel.attach_project(&config.master_url, &config.name, authenticator) {
        Ok(true) => {
            tracing::debug!(project = %config.name, "attach succeeded");
            AttachStatus::Success
        }
        Ok(false) => {
            tracing::error!(project = %config.name, "attach refused by client");
            AttachStatus::Undefined
        }
        Err(err) => {
            tracing::error!(project = %config.name, error = %err, "attach call failed");
            AttachStatus::Undefined
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
