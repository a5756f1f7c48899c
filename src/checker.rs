use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};

use reqwest::Client;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, UpdateCheckError};
use crate::types::{
    AppInfo, LookupResponse, UpdateCheck, UpdateCheckerConfig, VersionProvider, LOOKUP_PATH,
};
use crate::version::{is_update_available, Version};

const USER_AGENT: &str = "appdate-rs";

/// Receives the outcome of checks started with [`UpdateChecker::check_now`].
pub trait UpdateObserver: Send + Sync {
    /// Called when the lookup succeeded.
    fn update_check_completed(&self, app_info: &AppInfo, update_available: bool);

    /// Called when the lookup failed. This can be caused by a network failure,
    /// an unexpected response or an unknown application identifier.
    fn update_check_failed(&self, error: &UpdateCheckError);
}

/// Checks the storefront for a newer version of an application.
///
/// Each checker runs at most one lookup at a time. Starting a check while
/// another is pending fails with [`UpdateCheckError::Busy`].
///
/// Dropping the checker cancels a pending lookup; once `drop` returns no
/// callback or observer method will be invoked for it.
pub struct UpdateChecker {
    lookup: Lookup,
    runtime: Handle,
    observer: Mutex<Option<Weak<dyn UpdateObserver>>>,
    state: Arc<CheckState>,
    task: Mutex<Option<AbortHandle>>,
}

impl UpdateChecker {
    /// Creates a new UpdateChecker with the given configuration.
    ///
    /// No network activity happens until a check is started. Unless a runtime
    /// is configured, this must be called from within a tokio runtime.
    pub fn new(config: UpdateCheckerConfig) -> Result<Self> {
        let url = lookup_url(&config.base_url, config.app_id)?;

        let runtime = match config.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| UpdateCheckError::NoRuntime)?,
        };

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(UpdateCheckError::ClientBuild)?;

        Ok(Self {
            lookup: Lookup {
                client,
                url,
                app_id: config.app_id,
                version_provider: config.version_provider,
            },
            runtime,
            observer: Mutex::new(None),
            state: Arc::new(CheckState::default()),
            task: Mutex::new(None),
        })
    }

    /// Creates a checker for `app_id` with default settings.
    pub fn with_app_id(app_id: u64, current_version: impl Into<String>) -> Result<Self> {
        Self::new(UpdateCheckerConfig::new(app_id, current_version))
    }

    /// The storefront identifier this checker looks up.
    pub fn app_id(&self) -> u64 {
        self.lookup.app_id
    }

    /// Registers the observer notified by [`check_now`](Self::check_now).
    ///
    /// Only a weak reference is kept. If the observer is dropped before a
    /// check completes, the outcome is discarded.
    pub fn set_observer<O: UpdateObserver + 'static>(&self, observer: &Arc<O>) {
        let observer: Arc<dyn UpdateObserver> = observer.clone();
        *self.observer.lock().unwrap() = Some(Arc::downgrade(&observer));
    }

    /// Removes the registered observer. Checks already started keep the one they captured.
    pub fn clear_observer(&self) {
        *self.observer.lock().unwrap() = None;
    }

    /// Starts a check in the background and reports the outcome to the observer.
    ///
    /// The observer registered at the time of this call is the one notified.
    pub fn check_now(&self) {
        let observer = self.observer.lock().unwrap().clone();
        let app_id = self.app_id();

        self.spawn_check(move |result| {
            let Some(observer) = observer.as_ref().and_then(Weak::upgrade) else {
                debug!(app_id, "No observer to notify, discarding update check result");
                return;
            };
            match result {
                Ok(check) => {
                    observer.update_check_completed(&check.app_info, check.update_available)
                }
                Err(e) => observer.update_check_failed(&e),
            }
        });
    }

    /// Starts a check in the background and passes the outcome to `completion`.
    ///
    /// The registered observer is not notified for this check.
    pub fn check_now_with_completion<F>(&self, completion: F)
    where
        F: FnOnce(Result<UpdateCheck>) + Send + 'static,
    {
        self.spawn_check(completion);
    }

    /// Performs a check and waits for its outcome.
    pub async fn check(&self) -> Result<UpdateCheck> {
        let _slot = InFlightSlot::acquire(&self.state)?;
        self.lookup.run().await
    }

    fn spawn_check<F>(&self, deliver: F)
    where
        F: FnOnce(Result<UpdateCheck>) + Send + 'static,
    {
        let slot = match InFlightSlot::acquire(&self.state) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(app_id = self.app_id(), "Update check rejected: {}", e);
                deliver(Err(e));
                return;
            }
        };

        let lookup = self.lookup.clone();
        let state = Arc::clone(&self.state);

        // Held across spawn so a check chained from the callback stores its handle after ours
        let mut task = self.task.lock().unwrap();
        let handle = self.runtime.spawn(async move {
            let result = lookup.run().await;
            // Free the slot first so the callback may start another check
            drop(slot);

            if !state.deliver(|| deliver(result)) {
                debug!(
                    app_id = lookup.app_id,
                    "Checker dropped before the check finished, discarding result"
                );
            }
        });

        *task = Some(handle.abort_handle());
    }
}

impl Drop for UpdateChecker {
    fn drop(&mut self) {
        self.state.shut_down();

        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Everything a single lookup needs, detached from the checker.
#[derive(Clone)]
struct Lookup {
    client: Client,
    url: Url,
    app_id: u64,
    version_provider: VersionProvider,
}

impl Lookup {
    async fn run(&self) -> Result<UpdateCheck> {
        let result = self.fetch_and_compare().await;
        match &result {
            Ok(check) => debug!(
                app_id = self.app_id,
                version = %check.app_info.version,
                update_available = check.update_available,
                "Update check finished"
            ),
            Err(e) => warn!(app_id = self.app_id, error = %e, "Update check failed"),
        }
        result
    }

    async fn fetch_and_compare(&self) -> Result<UpdateCheck> {
        debug!(app_id = self.app_id, url = %self.url, "Looking up application");

        let response = self
            .client
            .get(self.url.clone())
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(UpdateCheckError::ApiError { status, message });
        }

        let body = response.bytes().await?;
        let app_info = parse_lookup_response(self.app_id, &body)?;

        let current_version = (self.version_provider)();
        let update_available = compare_versions(&app_info.version, &current_version)?;

        Ok(UpdateCheck {
            app_info,
            update_available,
        })
    }
}

/// Builds the lookup URL for `app_id` under `base_url`.
fn lookup_url(base_url: &str, app_id: u64) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/{}", base_url.trim_end_matches('/'), LOOKUP_PATH))
        .map_err(|_| UpdateCheckError::InvalidBaseUrl(base_url.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UpdateCheckError::InvalidBaseUrl(base_url.to_string()));
    }
    url.query_pairs_mut().append_pair("id", &app_id.to_string());
    Ok(url)
}

/// Extracts the first application record from a lookup response body.
fn parse_lookup_response(app_id: u64, body: &[u8]) -> Result<AppInfo> {
    let response: LookupResponse = serde_json::from_slice(body)?;

    if response.result_count == 0 {
        return Err(UpdateCheckError::NotFound(app_id));
    }

    let first = response
        .results
        .into_iter()
        .next()
        .ok_or(UpdateCheckError::NotFound(app_id))?;

    AppInfo::from_record(first)
}

/// Returns true if `remote` is strictly newer than `current`.
fn compare_versions(remote: &str, current: &str) -> Result<bool> {
    let remote: Version = remote
        .parse()
        .map_err(|e| UpdateCheckError::MalformedResponse(format!("published version: {}", e)))?;
    let current: Version = current
        .parse()
        .map_err(|_| UpdateCheckError::InvalidCurrentVersion(current.to_string()))?;

    Ok(is_update_available(&remote, &current))
}

/// State shared between a checker and its background task.
#[derive(Default)]
struct CheckState {
    closed: AtomicBool,
    in_flight: AtomicBool,
    /// Held shared while a result is delivered, exclusively while shutting down.
    gate: RwLock<()>,
    delivering: Mutex<Vec<ThreadId>>,
}

impl CheckState {
    /// Runs `f` if the checker is still alive. Returns whether it ran.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let _delivering = DeliveringGuard::enter(self);
        f();
        true
    }

    /// Marks the checker dead and waits for in-progress deliveries on other threads.
    fn shut_down(&self) {
        self.closed.store(true, Ordering::Release);

        let current = thread::current().id();
        let delivering_here = self
            .delivering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&current);

        // Dropped from inside its own callback: this thread already holds the gate.
        if !delivering_here {
            drop(self.gate.write().unwrap_or_else(PoisonError::into_inner));
        }
    }
}

struct DeliveringGuard<'a> {
    state: &'a CheckState,
    thread: ThreadId,
}

impl<'a> DeliveringGuard<'a> {
    fn enter(state: &'a CheckState) -> Self {
        let thread = thread::current().id();
        state
            .delivering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(thread);
        Self { state, thread }
    }
}

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        let mut delivering = self
            .state
            .delivering
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = delivering.iter().position(|t| *t == self.thread) {
            delivering.swap_remove(pos);
        }
    }
}

/// The single in-flight slot of a checker. Released on drop.
struct InFlightSlot {
    state: Arc<CheckState>,
}

impl InFlightSlot {
    fn acquire(state: &Arc<CheckState>) -> Result<Self> {
        state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| UpdateCheckError::Busy)?;
        Ok(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}
