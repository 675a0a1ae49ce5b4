//! Domain types for project attachment.
//!
//! All remote replies carry an [`ErrorCode`]; the retry machinery in
//! [`crate::retry`] only ever looks at that code, never at payload contents.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Domain error code returned by every control-channel operation.
///
/// Wire representation is the client's numeric code; unrecognized numbers are
/// preserved in [`ErrorCode::Other`] so round-trips never lose information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum ErrorCode {
    Ok,
    /// Connection to the remote peer refused or dropped.
    Connect,
    /// Name resolution failed, usually no internet.
    GetHostByName,
    /// No account with the given identity exists.
    DbNotFound,
    /// The identity is already taken by another account.
    DbNotUnique,
    /// Transient HTTP-level failure.
    HttpTransient,
    /// Peer is busy with another request; ask again.
    Retry,
    BadPassword,
    /// The project does not allow client-side account creation.
    AccountCreationDisabled,
    Other(i32),
}

impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        match value {
            0 => ErrorCode::Ok,
            -107 => ErrorCode::Connect,
            -113 => ErrorCode::GetHostByName,
            -136 => ErrorCode::DbNotFound,
            -137 => ErrorCode::DbNotUnique,
            -184 => ErrorCode::HttpTransient,
            -199 => ErrorCode::Retry,
            -206 => ErrorCode::BadPassword,
            -208 => ErrorCode::AccountCreationDisabled,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Ok => 0,
            ErrorCode::Connect => -107,
            ErrorCode::GetHostByName => -113,
            ErrorCode::DbNotFound => -136,
            ErrorCode::DbNotUnique => -137,
            ErrorCode::HttpTransient => -184,
            ErrorCode::Retry => -199,
            ErrorCode::BadPassword => -206,
            ErrorCode::AccountCreationDisabled => -208,
            ErrorCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i32::from(*self))
    }
}

// ---------------------------------------------------------------------------
// Credentials and candidates
// ---------------------------------------------------------------------------

/// Shared credential set used by every account RPC in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A project selected for attachment, before any configuration is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCandidate {
    pub url: String,
    pub display_name: String,
}

impl ProjectCandidate {
    /// Candidate chosen from a catalog entry.
    pub fn from_catalog(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
        }
    }

    /// Candidate with a manually typed URL; the URL doubles as its name
    /// until the configuration supplies the authoritative one.
    pub fn manual(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            display_name: url.clone(),
            url,
        }
    }
}

// ---------------------------------------------------------------------------
// Remote payloads
// ---------------------------------------------------------------------------

/// Project configuration downloaded over the control channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub master_url: String,
    /// HTTPS RPC endpoint, when the project offers one.
    #[serde(default)]
    pub web_rpc_url_base: String,
    #[serde(default)]
    pub client_account_creation_disabled: bool,
    /// Whether account RPCs identify the user by name instead of email.
    #[serde(default)]
    pub uses_name: bool,
    #[serde(default)]
    pub min_passwd_length: u32,
}

impl ProjectConfig {
    /// Prefer the HTTPS RPC endpoint over the master URL when present.
    pub fn secure_url_if_available(&self) -> &str {
        if self.web_rpc_url_base.is_empty() {
            &self.master_url
        } else {
            &self.web_rpc_url_base
        }
    }
}

/// Input bundle for account registration and lookup RPCs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    pub url: String,
    pub email: String,
    pub username: String,
    pub password: String,
    /// Reserved; always empty in this flow.
    #[serde(default)]
    pub team: String,
    pub uses_name: bool,
}

/// Reply to an account registration or lookup RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReply {
    /// Opaque credential token; required for the attach call.
    #[serde(default)]
    pub authenticator: String,
    #[serde(default)]
    pub message: String,
}

/// Last known account-manager binding, fetched as a failure diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountManagerInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub has_credentials: bool,
}

// ---------------------------------------------------------------------------
// Attachment state
// ---------------------------------------------------------------------------

/// Phase of one project's attachment, ordered by progress.
///
/// Forward-only: once `Ongoing` has been entered a project never returns to
/// `Uninitialized` or `Ready`; only replacing the whole selection resets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachStatus {
    /// Configuration not downloaded yet.
    #[default]
    Uninitialized,
    /// Configuration available, ready to be attached.
    Ready,
    /// Attach in progress.
    Ongoing,
    Success,
    /// Unmappable failure: contract violation, missing token, or an
    /// unrecognized domain code.
    Undefined,
    /// Registration failed, identity already taken.
    NameNotUnique,
    /// Login failed, wrong password.
    BadPassword,
    /// Login failed, no such account.
    UnknownUser,
    /// Configuration could not be downloaded; attach impossible.
    ConfigDownloadFailed,
}

impl AttachStatus {
    /// Terminal states: the flow will not touch this project again.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            AttachStatus::Uninitialized | AttachStatus::Ready | AttachStatus::Ongoing
        )
    }

    pub fn is_failure(self) -> bool {
        self.is_terminal() && self != AttachStatus::Success
    }

    /// Still waiting for an attach attempt.
    pub fn is_pending(self) -> bool {
        matches!(self, AttachStatus::Uninitialized | AttachStatus::Ready)
    }
}

impl fmt::Display for AttachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            AttachStatus::Uninitialized => "retrieving project configuration",
            AttachStatus::Ready => "ready to attach",
            AttachStatus::Ongoing => "attach in progress",
            AttachStatus::Success => "attached",
            AttachStatus::Undefined => "attach failed",
            AttachStatus::NameNotUnique => "username already in use",
            AttachStatus::BadPassword => "incorrect password",
            AttachStatus::UnknownUser => "no account with this identity",
            AttachStatus::ConfigDownloadFailed => "project configuration download failed",
        };
        f.write_str(description)
    }
}

/// Per-project attachment record, owned by the orchestrator's list.
///
/// `config` is populated exactly once, at the `Ready` transition, and is
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentState {
    pub url: String,
    pub display_name: String,
    pub config: Option<ProjectConfig>,
    pub status: AttachStatus,
}

impl AttachmentState {
    pub fn new(candidate: ProjectCandidate) -> Self {
        Self {
            url: candidate.url,
            display_name: candidate.display_name,
            config: None,
            status: AttachStatus::Uninitialized,
        }
    }
}

impl From<ProjectCandidate> for AttachmentState {
    fn from(candidate: ProjectCandidate) -> Self {
        Self::new(candidate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
