//! Scripted in-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};

use tether_core::{
    AccountManagerInfo, AccountReply, AccountRequest, ErrorCode, ProjectConfig, RetryOutcome,
};

use crate::channel::ControlChannel;
use crate::error::{ChannelError, StoreError};
use crate::store::SettingsStore;

/// Control channel replaying pre-scripted replies.
///
/// Each queue pops front-to-back and repeats its last entry once exhausted,
/// so "always fails this way" scripts need a single entry. Call counters
/// let tests assert exact attempt counts.
pub(crate) struct ScriptedChannel {
    pub connected: AtomicBool,
    configs: Mutex<HashMap<String, VecDeque<RetryOutcome<ProjectConfig>>>>,
    registrations: Mutex<VecDeque<RetryOutcome<AccountReply>>>,
    lookups: Mutex<VecDeque<RetryOutcome<AccountReply>>>,
    /// `None` scripts a transport failure.
    attaches: Mutex<VecDeque<Option<bool>>>,
    manager_codes: Mutex<VecDeque<ErrorCode>>,
    manager_infos: Mutex<VecDeque<Option<AccountManagerInfo>>>,
    pub config_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub attach_calls: AtomicUsize,
    pub manager_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            configs: Mutex::new(HashMap::new()),
            registrations: Mutex::new(VecDeque::new()),
            lookups: Mutex::new(VecDeque::new()),
            attaches: Mutex::new(VecDeque::new()),
            manager_codes: Mutex::new(VecDeque::new()),
            manager_infos: Mutex::new(VecDeque::new()),
            config_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            attach_calls: AtomicUsize::new(0),
            manager_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    pub fn disconnected() -> Self {
        let channel = Self::new();
        channel.connected.store(false, Ordering::SeqCst);
        channel
    }

    pub fn with_config(self, url: &str, outcome: RetryOutcome<ProjectConfig>) -> Self {
        self.configs
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn with_registration(self, outcome: RetryOutcome<AccountReply>) -> Self {
        self.registrations.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_lookup(self, outcome: RetryOutcome<AccountReply>) -> Self {
        self.lookups.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_attach(self, reply: Option<bool>) -> Self {
        self.attaches.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_manager_code(self, code: ErrorCode) -> Self {
        self.manager_codes.lock().unwrap().push_back(code);
        self
    }

    pub fn with_manager_info(self, info: Option<AccountManagerInfo>) -> Self {
        self.manager_infos.lock().unwrap().push_back(info);
        self
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>, what: &str) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("script exhausted: {what}"))
        }
    }
}

impl ControlChannel for ScriptedChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn fetch_project_config(
        &self,
        url: &str,
    ) -> Result<RetryOutcome<ProjectConfig>, ChannelError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        let mut configs = self.configs.lock().unwrap();
        let queue = configs
            .get_mut(url)
            .unwrap_or_else(|| panic!("no config script for {url}"));
        let outcome = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("config script exhausted for {url}"))
        };
        Ok(outcome)
    }

    fn register_account(
        &self,
        _request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.registrations, "register_account"))
    }

    fn lookup_account(
        &self,
        _request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.lookups, "lookup_account"))
    }

    fn attach_project(
        &self,
        _master_url: &str,
        _name: &str,
        _authenticator: &str,
    ) -> Result<bool, ChannelError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.attaches, "attach_project") {
            Some(flag) => Ok(flag),
            None => Err(ChannelError::Protocol("scripted transport failure".to_string())),
        }
    }

    fn add_account_manager(
        &self,
        _url: &str,
        _name: &str,
        _password: &str,
    ) -> Result<ErrorCode, ChannelError> {
        self.manager_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.manager_codes, "add_account_manager"))
    }

    fn account_manager_info(&self) -> Result<Option<AccountManagerInfo>, ChannelError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.manager_infos, "account_manager_info"))
    }
}

/// Channel whose config fetches block until the test releases them; used to
/// hold a batch open while exercising the single-flight guard.
pub(crate) struct GatedChannel {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedChannel {
    /// Returns the channel and the sender releasing one fetch per send.
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                gate: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl ControlChannel for GatedChannel {
    fn is_connected(&self) -> bool {
        true
    }

    fn fetch_project_config(
        &self,
        url: &str,
    ) -> Result<RetryOutcome<ProjectConfig>, ChannelError> {
        // Blocks until the test sends; a dropped sender unblocks everything.
        let _ = self.gate.lock().unwrap().recv();
        Ok(RetryOutcome::new(
            ProjectConfig {
                name: "Gated".to_string(),
                master_url: url.to_string(),
                ..ProjectConfig::default()
            },
            ErrorCode::Ok,
        ))
    }

    fn register_account(
        &self,
        _request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        unimplemented!("not used by single-flight tests")
    }

    fn lookup_account(
        &self,
        _request: &AccountRequest,
    ) -> Result<RetryOutcome<AccountReply>, ChannelError> {
        unimplemented!("not used by single-flight tests")
    }

    fn attach_project(
        &self,
        _master_url: &str,
        _name: &str,
        _authenticator: &str,
    ) -> Result<bool, ChannelError> {
        unimplemented!("not used by single-flight tests")
    }

    fn add_account_manager(
        &self,
        _url: &str,
        _name: &str,
        _password: &str,
    ) -> Result<ErrorCode, ChannelError> {
        unimplemented!("not used by single-flight tests")
    }

    fn account_manager_info(&self) -> Result<Option<AccountManagerInfo>, ChannelError> {
        unimplemented!("not used by single-flight tests")
    }
}

/// In-memory [`SettingsStore`].
#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<(String, String)>,
}

impl SettingsStore for MemoryStore {
    fn set_last_email(&self, email: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().0 = email.to_string();
        Ok(())
    }

    fn set_last_username(&self, username: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().1 = username.to_string();
        Ok(())
    }

    fn last_email(&self) -> Result<String, StoreError> {
        Ok(self.inner.lock().unwrap().0.clone())
    }

    fn last_username(&self) -> Result<String, StoreError> {
        Ok(self.inner.lock().unwrap().1.clone())
    }
}
