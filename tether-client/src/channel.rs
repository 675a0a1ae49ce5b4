//! Control channel to the locally running client process.
//!
//! [`ControlChannel`] is the seam every remote step of the attachment flow
//! goes through. [`SocketChannel`] implements it with newline-delimited JSON
//! request/response frames over a Unix domain socket, one connection per
//! request. All operations are blocking.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_core::{
    AccountManagerInfo, AccountReply, AccountRequest, ErrorCode, ProjectConfig, RetryOutcome,
};

use crate::error::ChannelError;

/// Blocking request/response surface of the client process.
///
/// Operations that carry a domain error code return a [`RetryOutcome`]: the
/// reply payload plus the code the retry classifier acts on. A transport
/// failure is reported as `Err`; retrying call sites convert it into an
/// empty outcome (bounded-retryable) rather than propagating it.
pub trait ControlChannel: Send + Sync {
    /// Whether the channel is currently usable at all.
    fn is_connected(&self) -> bool;

    fn fetch_project_config(&self, url: &str)
        -> Result<RetryOutcome<ProjectConfig>, ChannelError>;

    fn register_account(
        &self,
        request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError>;

    fn lookup_account(
        &self,
        request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError>;

    /// Attach an already-authenticated project. Single-shot, no domain code:
    /// the reply is a plain success flag.
    fn attach_project(
        &self,
        master_url: &str,
        name: &str,
        authenticator: &str,
    ) -> Result<bool, ChannelError>;

    fn add_account_manager(
        &self,
        url: &str,
        name: &str,
        password: &str,
    ) -> Result<ErrorCode, ChannelError>;

    /// Last known account-manager binding, if the client has one.
    fn account_manager_info(&self) -> Result<Option<AccountManagerInfo>, ChannelError>;
}

/// Which credential-resolution RPC to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOp {
    Register,
    Lookup,
}

/// One retry-executor attempt of a config fetch. A disconnected channel or
/// transport failure yields the empty outcome, which classifies as
/// bounded-retryable.
pub(crate) fn config_outcome(
    channel: &dyn ControlChannel,
    url: &str,
) -> RetryOutcome<ProjectConfig> {
    if !channel.is_connected() {
        tracing::warn!(url, "control channel not connected, config fetch skipped");
        return RetryOutcome::unreachable();
    }
    match channel.fetch_project_config(url) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(url, error = %err, "project config call failed");
            RetryOutcome::unreachable()
        }
    }
}

/// One retry-executor attempt of a registration or lookup RPC.
pub(crate) fn account_outcome(
    channel: &dyn ControlChannel,
    op: AccountOp,
    request: &AccountRequest,
) -> RetryOutcome<AccountReply> {
    if !channel.is_connected() {
        tracing::warn!(url = %request.url, "control channel not connected, account call skipped");
        return RetryOutcome::unreachable();
    }
    let result = match op {
        AccountOp::Register => channel.register_account(request),
        AccountOp::Lookup => channel.lookup_account(request),
    };
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(url = %request.url, op = ?op, error = %err, "account call failed");
            RetryOutcome::unreachable()
        }
    }
}

/// One retry-executor attempt of the account-manager attach RPC.
pub(crate) fn account_manager_outcome(
    channel: &dyn ControlChannel,
    url: &str,
    name: &str,
    password: &str,
) -> RetryOutcome<()> {
    if !channel.is_connected() {
        tracing::warn!(url, "control channel not connected, account manager call skipped");
        return RetryOutcome::unreachable();
    }
    match channel.add_account_manager(url, name, password) {
        Ok(code) => RetryOutcome::new((), code),
        Err(err) => {
            tracing::warn!(url, error = %err, "account manager call failed");
            RetryOutcome::unreachable()
        }
    }
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountRequest>,
}

impl ChannelRequest {
    fn op(op: &str) -> Self {
        Self {
            op: op.to_string(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response: domain code plus an optional payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// ---------------------------------------------------------------------------
// Unix socket implementation
// ---------------------------------------------------------------------------

/// Control channel over a Unix domain socket.
#[derive(Debug, Clone)]
pub struct SocketChannel {
    socket: PathBuf,
}

impl SocketChannel {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Send one request and return one response.
    fn send(&self, request: &ChannelRequest) -> Result<ChannelResponse, ChannelError> {
        if !self.socket.exists() {
            return Err(ChannelError::Disconnected {
                socket: self.socket.clone(),
            });
        }

        let mut stream = UnixStream::connect(&self.socket).map_err(|err| {
            if matches!(
                err.kind(),
                ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
            ) {
                ChannelError::Disconnected {
                    socket: self.socket.clone(),
                }
            } else {
                ChannelError::io(&self.socket, err)
            }
        })?;

        let frame = serde_json::to_string(request)?;
        stream
            .write_all(frame.as_bytes())
            .map_err(|e| ChannelError::io(&self.socket, e))?;
        stream
            .write_all(b"\n")
            .map_err(|e| ChannelError::io(&self.socket, e))?;
        stream
            .flush()
            .map_err(|e| ChannelError::io(&self.socket, e))?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| ChannelError::io(&self.socket, e))?;
        if read == 0 {
            return Err(ChannelError::Protocol(
                "client closed connection before responding".to_string(),
            ));
        }

        let response: ChannelResponse = serde_json::from_str(line.trim_end())?;
        Ok(response)
    }

    fn coded_reply<T: for<'de> Deserialize<'de>>(
        &self,
        request: &ChannelRequest,
    ) -> Result<RetryOutcome<T>, ChannelError> {
        let response = self.send(request)?;
        let payload = match response.payload {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(RetryOutcome {
            payload,
            code: Some(ErrorCode::from(response.code)),
        })
    }
}

impl ControlChannel for SocketChannel {
    fn is_connected(&self) -> bool {
        self.socket.exists()
    }

    fn fetch_project_config(
        &self,
        url: &str,
    ) -> Result<RetryOutcome<ProjectConfig>, ChannelError> {
        let mut request = ChannelRequest::op("project_config");
        request.url = Some(url.to_string());
        self.coded_reply(&request)
    }

    fn register_account(
        &self,
        account: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        let mut request = ChannelRequest::op("register_account");
        request.account = Some(account.clone());
        self.coded_reply(&request)
    }

    fn lookup_account(
        &self,
        account: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        let mut request = ChannelRequest::op("lookup_account");
        request.account = Some(account.clone());
        self.coded_reply(&request)
    }

    fn attach_project(
        &self,
        master_url: &str,
        name: &str,
        authenticator: &str,
    ) -> Result<bool, ChannelError> {
        let mut request = ChannelRequest::op("attach_project");
        request.url = Some(master_url.to_string());
        request.name = Some(name.to_string());
        request.authenticator = Some(authenticator.to_string());
        let response = self.send(&request)?;
        Ok(ErrorCode::from(response.code) == ErrorCode::Ok)
    }

    fn add_account_manager(
        &self,
        url: &str,
        name: &str,
        password: &str,
    ) -> Result<ErrorCode, ChannelError> {
        let mut request = ChannelRequest::op("add_account_manager");
        request.url = Some(url.to_string());
        request.name = Some(name.to_string());
        request.password = Some(password.to_string());
        let response = self.send(&request)?;
        Ok(ErrorCode::from(response.code))
    }

    fn account_manager_info(&self) -> Result<Option<AccountManagerInfo>, ChannelError> {
        let response = self.send(&ChannelRequest::op("account_manager_info"))?;
        match response.payload {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
