//! Batch configuration retriever.
//!
//! Processes the selected projects strictly sequentially: each project's
//! config fetch fully completes before the next starts. The remote peer
//! serves one control-channel request at a time anyway, so client-side
//! parallelism would gain nothing and break the single-flight invariant.

use std::sync::Mutex;

use tether_core::{retry, AttachStatus, AttachmentState, RetryTuning};

use crate::channel::{config_outcome, ControlChannel};
use crate::lock;

/// Fetch every project's configuration in list order.
///
/// Per project: a retry-executed config fetch; on success the entry becomes
/// `Ready` with the config stored and the display name replaced by the
/// config's authoritative project name; on anything else it becomes
/// `ConfigDownloadFailed` with the config left empty. The list lock is held
/// only to read the URL and to write the result, so readers observe
/// per-project completion.
pub fn run(
    projects: &Mutex<Vec<AttachmentState>>,
    channel: &dyn ControlChannel,
    tuning: &RetryTuning,
) {
    let count = lock(projects).len();
    tracing::debug!(count, "project configuration retrieval started");

    for index in 0..count {
        let (url, display_name) = {
            let list = lock(projects);
            let Some(project) = list.get(index) else { break };
            (project.url.clone(), project.display_name.clone())
        };

        tracing::debug!(project = %display_name, url = %url, "configuration download started");
        let outcome = retry::execute(&tuning.config_fetch, || config_outcome(channel, &url));

        let mut list = lock(projects);
        let Some(project) = list.get_mut(index) else { break };
        let ok = outcome.is_ok();
        match outcome.payload {
            Some(config) if ok => {
                project.display_name = config.name.clone();
                project.config = Some(config);
                project.status = AttachStatus::Ready;
                tracing::debug!(project = %project.display_name, "configuration download succeeded");
            }
            _ => {
                tracing::warn!(project = %display_name, url = %url, "could not load configuration");
                project.status = AttachStatus::ConfigDownloadFailed;
            }
        }
    }

    tracing::debug!("project configuration retrieval finished");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
