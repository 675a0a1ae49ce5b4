//! Attachment orchestrator.
//!
//! Owns the selected project list, the shared credential set, and the
//! single-flight guard around the background configuration batch. All
//! mutation of [`AttachmentState`] happens here or in the batch retriever
//! this service launches; callers only ever see snapshots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tether_core::{
    retry, AttachStatus, AttachmentState, Credentials, ErrorCode, ProjectCandidate, RetryTuning,
};

use crate::channel::{account_manager_outcome, ControlChannel};
use crate::error::ServiceError;
use crate::store::SettingsStore;
use crate::{attach, batch, lock};

/// Clears the single-flight flag on every exit path of the batch thread,
/// including panic.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates project selection, configuration retrieval, and attachment
/// over one control channel.
pub struct AttachService {
    channel: Arc<dyn ControlChannel>,
    store: Arc<dyn SettingsStore>,
    projects: Arc<Mutex<Vec<AttachmentState>>>,
    /// Bumped on every selection replacement, under the `projects` lock.
    /// An in-flight attach captures it and discards its result if the
    /// selection changed underneath.
    generation: AtomicU64,
    credentials: Mutex<Credentials>,
    batch_running: Arc<AtomicBool>,
    tuning: RetryTuning,
}

impl AttachService {
    pub fn new(channel: Arc<dyn ControlChannel>, store: Arc<dyn SettingsStore>) -> Self {
        Self::with_tuning(channel, store, RetryTuning::default())
    }

    pub fn with_tuning(
        channel: Arc<dyn ControlChannel>,
        store: Arc<dyn SettingsStore>,
        tuning: RetryTuning,
    ) -> Self {
        Self {
            channel,
            store,
            projects: Arc::new(Mutex::new(Vec::new())),
            generation: AtomicU64::new(0),
            credentials: Mutex::new(Credentials::default()),
            batch_running: Arc::new(AtomicBool::new(false)),
            tuning,
        }
    }

    /// Replace the shared credential set used by every account RPC.
    ///
    /// Email and username are persisted for later pre-population; the
    /// password never is. Persistence is best-effort and only logged on
    /// failure. No validation happens here.
    pub fn set_credentials(&self, email: &str, username: &str, password: &str) {
        *lock(&self.credentials) = Credentials::new(email, username, password);
        if let Err(err) = self.store.set_last_email(email) {
            tracing::warn!(error = %err, "failed to persist last email");
        }
        if let Err(err) = self.store.set_last_username(username) {
            tracing::warn!(error = %err, "failed to persist last username");
        }
    }

    /// Last persisted (email, username) pair, for pre-populating input
    /// fields. Missing or unreadable settings yield empty strings.
    pub fn user_defaults(&self) -> (String, String) {
        let email = self.store.last_email().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load last email");
            String::new()
        });
        let username = self.store.last_username().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load last username");
            String::new()
        });
        (email, username)
    }

    /// Replace the selection with catalog candidates and start downloading
    /// their configurations in the background.
    pub fn select_projects(
        &self,
        candidates: Vec<ProjectCandidate>,
    ) -> Result<(), ServiceError> {
        self.start_batch(candidates.into_iter().map(AttachmentState::new).collect())
    }

    /// Replace the selection with a single manually typed project URL and
    /// start downloading its configuration in the background.
    pub fn select_manual_project(&self, url: &str) -> Result<(), ServiceError> {
        self.start_batch(vec![AttachmentState::new(ProjectCandidate::manual(url))])
    }

    fn start_batch(&self, entries: Vec<AttachmentState>) -> Result<(), ServiceError> {
        if !self.channel.is_connected() {
            tracing::error!("selection refused, control channel not connected");
            return Err(ServiceError::Disconnected);
        }
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::error!("selection refused, configuration batch still running");
            return Err(ServiceError::BatchInFlight);
        }

        tracing::debug!(count = entries.len(), "projects selected, starting configuration batch");
        {
            let mut list = lock(&self.projects);
            *list = entries;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        let projects = Arc::clone(&self.projects);
        let channel = Arc::clone(&self.channel);
        let tuning = self.tuning;
        let guard = FlightGuard {
            flag: Arc::clone(&self.batch_running),
        };
        thread::spawn(move || {
            let _guard = guard;
            batch::run(&projects, channel.as_ref(), &tuning);
        });
        Ok(())
    }

    /// Whether the background configuration batch has finished. Readers
    /// should poll this before trusting the full project list as final.
    pub fn config_retrieval_finished(&self) -> bool {
        !self.batch_running.load(Ordering::SeqCst)
    }

    /// Snapshot of the current selection.
    pub fn projects(&self) -> Vec<AttachmentState> {
        lock(&self.projects).clone()
    }

    pub fn project_count(&self) -> usize {
        lock(&self.projects).len()
    }

    /// First project still awaiting an attach attempt, or `None` once every
    /// entry is ongoing or terminal.
    pub fn next_pending(&self) -> Option<AttachmentState> {
        lock(&self.projects)
            .iter()
            .find(|project| project.status.is_pending())
            .cloned()
    }

    /// True while any project has not reached `Success`.
    pub fn has_unresolved_conflicts(&self) -> bool {
        lock(&self.projects)
            .iter()
            .any(|project| project.status != AttachStatus::Success)
    }

    /// Drive one project's attachment state machine to a terminal status
    /// under the current credentials. Blocks on remote calls and retry
    /// delays; run off the primary thread of control.
    ///
    /// An unknown URL is a caller contract violation and yields `Undefined`.
    pub fn advance_project(&self, url: &str, force_lookup: bool) -> AttachStatus {
        let credentials = lock(&self.credentials).clone();
        let (generation, project) = {
            let list = lock(&self.projects);
            (
                self.generation.load(Ordering::SeqCst),
                list.iter().find(|project| project.url == url).cloned(),
            )
        };
        let Some(mut project) = project else {
            tracing::error!(url, "attach requested for unknown project");
            return AttachStatus::Undefined;
        };

        // Mirror the in-flight phase so snapshot readers see progress while
        // the blocking flow runs on the local copy.
        if project.status == AttachStatus::Ready && project.config.is_some() {
            let mut list = lock(&self.projects);
            if self.generation.load(Ordering::SeqCst) == generation {
                if let Some(slot) = list.iter_mut().find(|project| project.url == url) {
                    slot.status = AttachStatus::Ongoing;
                }
            }
        }

        let status = attach::advance(
            &mut project,
            self.channel.as_ref(),
            &credentials,
            &self.tuning,
            force_lookup,
        );

        // A reselection while the flow was blocked replaced the list; the
        // result belongs to the discarded entry, not the fresh one.
        let mut list = lock(&self.projects);
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(url, status = %status, "selection replaced mid-attach, result discarded");
            return status;
        }
        if let Some(slot) = list.iter_mut().find(|project| project.url == url) {
            *slot = project;
        }
        status
    }

    /// Attach an account manager with its own credentials. Independent of
    /// the project selection; nothing needs to be set up beforehand.
    ///
    /// Retries through the account-manager budget. On a final failure one
    /// best-effort diagnostic fetch of the last known account-manager state
    /// is logged; its own errors are swallowed.
    pub fn attach_account_manager(&self, url: &str, name: &str, password: &str) -> ErrorCode {
        tracing::debug!(url, name, "attaching account manager");
        let channel = self.channel.as_ref();
        let outcome = retry::execute(&self.tuning.account_manager, || {
            account_manager_outcome(channel, url, name, password)
        });
        if outcome.is_ok() {
            return ErrorCode::Ok;
        }

        match channel.account_manager_info() {
            Ok(Some(info)) => tracing::debug!(
                url = %info.url,
                name = %info.name,
                has_credentials = info.has_credentials,
                "last known account manager state"
            ),
            Ok(None) => tracing::debug!("no account manager info available"),
            Err(err) => tracing::warn!(error = %err, "account manager info fetch failed"),
        }
        outcome.code.unwrap_or(ErrorCode::Other(-1))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
