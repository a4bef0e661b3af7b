//! The engine coordinator: the only component callers talk to.
//!
//! Callers await results without blocking a thread. A miss is dispatched to
//! the execution unit and parked in the pending table under a fresh id; a
//! router thread matches responses back to it by id. The cache, the pending
//! table and the in-flight key index share one mutex because the router runs
//! on its own OS thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::cache::{cache_key, phrase_cache, PhraseCache};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::worker::{self, UnitSettings, WorkerRequest, WorkerResponse};
use crate::{BackendLoader, GenerationResult};

type GenerateReply = oneshot::Sender<Result<GenerationResult, EngineError>>;

/// Lifecycle state of a [`SpeechEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Model loaded, requests are served.
    Running,
    /// No model directory with the sentinel file was found.
    ModelMissing,
    /// The model directory resolved but the backend failed to load.
    ModelLoadFailed,
    /// The execution unit died. Permanent.
    Crashed,
    /// `destroy` was called.
    Destroyed,
}

enum Pending {
    Generate { key: String, waiters: Vec<GenerateReply> },
    Warmup(oneshot::Sender<Result<bool, EngineError>>),
    Probe(oneshot::Sender<bool>),
}

impl Pending {
    fn fail(self, error: EngineError) {
        match self {
            Pending::Generate { waiters, .. } => {
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
            Pending::Warmup(reply) => {
                let _ = reply.send(Err(error));
            }
            Pending::Probe(reply) => {
                let _ = reply.send(false);
            }
        }
    }
}

struct Shared {
    status: EngineStatus,
    requests: Option<UnboundedSender<WorkerRequest>>,
    cache: PhraseCache<GenerationResult>,
    pending: HashMap<u64, Pending>,
    in_flight: HashMap<String, u64>,
}

impl Shared {
    /// Move to a terminal status, dropping the unit's request channel and
    /// failing everything still pending.
    fn shut_down(&mut self, status: EngineStatus, error: EngineError) {
        self.status = status;
        self.requests = None;
        self.in_flight.clear();
        for (_, pending) in self.pending.drain() {
            pending.fail(error.clone());
        }
    }
}

struct Inner {
    shared: Mutex<Shared>,
    next_id: AtomicU64,
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `pending` and dispatch the request built from its id.
    ///
    /// Called with the lock held. Fails with `EngineCrashed` if the unit is gone.
    fn dispatch(
        &self,
        shared: &mut Shared,
        pending: Pending,
        request: impl FnOnce(u64) -> WorkerRequest,
    ) -> Result<u64, EngineError> {
        let id = self.next_id();
        let sent = shared
            .requests
            .as_ref()
            .is_some_and(|tx| tx.send(request(id)).is_ok());
        if !sent {
            let error = EngineError::EngineCrashed("execution unit is gone".to_string());
            pending.fail(error.clone());
            shared.shut_down(EngineStatus::Crashed, error.clone());
            return Err(error);
        }
        shared.pending.insert(id, pending);
        Ok(id)
    }

    fn crash(&self, message: &str) {
        let mut shared = self.shared.lock();
        if shared.status != EngineStatus::Running {
            return;
        }
        log::error!(
            "Speech execution unit failed ({message}); failing {} pending request(s)",
            shared.pending.len()
        );
        shared.shut_down(
            EngineStatus::Crashed,
            EngineError::EngineCrashed(message.to_string()),
        );
    }

    fn handle(&self, response: WorkerResponse) {
        match response {
            WorkerResponse::Ready { .. } => {
                log::debug!("Ignoring repeated ready report");
            }
            WorkerResponse::Generated { id, result } => {
                // The cache keeps its own copy, made outside the lock; the original
                // buffer goes to the callers.
                let cached = result.clone();
                let waiters = {
                    let mut shared = self.shared.lock();
                    match shared.pending.remove(&id) {
                        Some(Pending::Generate { key, waiters }) => {
                            shared.in_flight.remove(&key);
                            shared.cache.put(key, cached);
                            waiters
                        }
                        Some(other) => {
                            log::warn!("Response {id} does not match its request kind");
                            other.fail(EngineError::Synthesis("mismatched response".into()));
                            return;
                        }
                        None => {
                            log::debug!("Dropping response for unknown request {id}");
                            return;
                        }
                    }
                };
                deliver(waiters, result);
            }
            WorkerResponse::Failed { id, error } => {
                let pending = {
                    let mut shared = self.shared.lock();
                    let pending = shared.pending.remove(&id);
                    if let Some(Pending::Generate { key, .. }) = &pending {
                        shared.in_flight.remove(key);
                    }
                    pending
                };
                match pending {
                    Some(Pending::Warmup(reply)) => {
                        log::warn!("Warmup failed: {error}");
                        let _ = reply.send(Ok(false));
                    }
                    Some(pending) => pending.fail(error),
                    None => log::debug!("Dropping failure for unknown request {id}: {error}"),
                }
            }
            WorkerResponse::WarmedUp { id } => {
                if let Some(Pending::Warmup(reply)) = self.shared.lock().pending.remove(&id) {
                    let _ = reply.send(Ok(true));
                }
            }
            WorkerResponse::Availability { id, available } => {
                if let Some(Pending::Probe(reply)) = self.shared.lock().pending.remove(&id) {
                    let _ = reply.send(available);
                }
            }
            WorkerResponse::Fatal { message } => self.crash(&message),
        }
    }
}

fn deliver(waiters: Vec<GenerateReply>, result: GenerationResult) {
    let mut waiters = waiters.into_iter();
    let Some(last) = waiters.next_back() else {
        return;
    };
    for waiter in waiters {
        let _ = waiter.send(Ok(result.clone()));
    }
    let _ = last.send(Ok(result));
}

/// Non-blocking, cached phrase synthesis.
///
/// ```ignore
/// let engine = SpeechEngine::start(EngineConfig::default()).await;
/// match engine.generate("Gooood job!", 1.0).await {
///     Ok(audio) => play(audio.samples, audio.sample_rate),
///     Err(e) => log::warn!("Skipping speech: {e}"),
/// }
/// ```
pub struct SpeechEngine {
    inner: Arc<Inner>,
}

impl SpeechEngine {
    /// Start an engine with the default backend for the enabled features.
    pub async fn start(config: EngineConfig) -> Self {
        let loader = crate::engines::default_loader(&config);
        Self::start_with_loader(config, loader).await
    }

    /// Start an engine whose backend is built by `loader`.
    ///
    /// Never fails: problems are reflected in [`SpeechEngine::status`].
    pub async fn start_with_loader(config: EngineConfig, loader: BackendLoader) -> Self {
        let model_dir = match config.resolve_model_dir() {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("Speech engine disabled: {e}");
                return Self::with_status(EngineStatus::ModelMissing, None);
            }
        };

        let settings = UnitSettings {
            model_dir,
            reference_voice_file: config.reference_voice_file.clone(),
            warmup_text: config.warmup_text.clone(),
        };
        let handle = match worker::spawn(settings, loader) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to spawn speech execution unit: {e}");
                return Self::with_status(EngineStatus::Crashed, None);
            }
        };

        let engine = Self::with_status(EngineStatus::Running, Some(handle.requests));
        let (ready_tx, ready_rx) = oneshot::channel();
        let inner = Arc::clone(&engine.inner);
        let router = std::thread::Builder::new()
            .name("phrase-tts-router".to_string())
            .spawn(move || route(inner, handle.responses, ready_tx));
        if let Err(e) = router {
            log::error!("Failed to spawn speech response router: {e}");
            engine.inner.crash("router thread could not start");
            return engine;
        }

        match ready_rx.await {
            Ok(true) => log::info!("Speech engine ready"),
            Ok(false) => {
                log::warn!("Speech engine disabled: model failed to load");
                engine
                    .inner
                    .shared
                    .lock()
                    .shut_down(EngineStatus::ModelLoadFailed, EngineError::EngineUnavailable);
            }
            Err(_) => engine.inner.crash("execution unit exited during startup"),
        }
        engine
    }

    fn with_status(status: EngineStatus, requests: Option<UnboundedSender<WorkerRequest>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    status,
                    requests,
                    cache: phrase_cache(),
                    pending: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.shared.lock().status
    }

    /// True iff the model resolved, loaded, and the unit has not failed.
    pub fn is_available(&self) -> bool {
        self.status() == EngineStatus::Running
    }

    /// Generate speech for `text` at `speed`.
    ///
    /// Cache hits return a copy immediately. Concurrent misses for the same
    /// text and speed share a single synthesis.
    pub async fn generate(&self, text: &str, speed: f32) -> Result<GenerationResult, EngineError> {
        let key = cache_key(text, speed);
        let reply = {
            let mut shared = self.inner.shared.lock();
            if shared.status != EngineStatus::Running {
                return Err(EngineError::EngineUnavailable);
            }
            if let Some(hit) = shared.cache.get(&key) {
                log::debug!("Cache hit for {key:?}");
                return Ok(hit.clone());
            }

            let (tx, rx) = oneshot::channel();
            let in_flight = shared.in_flight.get(&key).copied();
            if let Some(Pending::Generate { waiters, .. }) =
                in_flight.and_then(|id| shared.pending.get_mut(&id))
            {
                log::debug!("Joining in-flight request for {key:?}");
                waiters.push(tx);
            } else {
                let pending = Pending::Generate {
                    key: key.clone(),
                    waiters: vec![tx],
                };
                let text = text.to_string();
                let id = self.inner.dispatch(&mut shared, pending, |id| {
                    WorkerRequest::Generate { id, text, speed }
                })?;
                shared.in_flight.insert(key, id);
            }
            rx
        };

        reply.await.unwrap_or_else(|_| {
            Err(EngineError::EngineCrashed(
                "request was dropped without a response".to_string(),
            ))
        })
    }

    /// [`generate`](Self::generate) at normal speed.
    pub async fn generate_default(&self, text: &str) -> Result<GenerationResult, EngineError> {
        self.generate(text, 1.0).await
    }

    /// Run a throwaway synthesis so the first real request is fast.
    ///
    /// `Ok(false)` means the warmup synthesis itself failed; the engine stays usable.
    pub async fn warmup(&self) -> Result<bool, EngineError> {
        let reply = {
            let mut shared = self.inner.shared.lock();
            if shared.status != EngineStatus::Running {
                return Err(EngineError::EngineUnavailable);
            }
            let (tx, rx) = oneshot::channel();
            self.inner
                .dispatch(&mut shared, Pending::Warmup(tx), |id| WorkerRequest::Warmup { id })?;
            rx
        };

        reply.await.unwrap_or_else(|_| {
            Err(EngineError::EngineCrashed(
                "warmup was dropped without a response".to_string(),
            ))
        })
    }

    /// Ask the execution unit whether its model is loaded.
    pub async fn check_availability(&self) -> bool {
        let reply = {
            let mut shared = self.inner.shared.lock();
            if shared.status != EngineStatus::Running {
                return false;
            }
            let (tx, rx) = oneshot::channel();
            if self
                .inner
                .dispatch(&mut shared, Pending::Probe(tx), |id| WorkerRequest::IsAvailable { id })
                .is_err()
            {
                return false;
            }
            rx
        };
        reply.await.unwrap_or(false)
    }

    /// Number of cached phrases.
    pub fn cached_entries(&self) -> usize {
        self.inner.shared.lock().cache.len()
    }

    /// Number of requests dispatched to the unit and not yet answered.
    pub fn pending_requests(&self) -> usize {
        self.inner.shared.lock().pending.len()
    }

    /// Stop the execution unit and clear all state. Safe to call repeatedly.
    ///
    /// Requests still in flight fail with `EngineUnavailable`. The unit thread
    /// finishes the inference it is running, if any, and then exits.
    pub fn destroy(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.status == EngineStatus::Destroyed {
            return;
        }
        log::info!(
            "Destroying speech engine ({} cached, {} pending)",
            shared.cache.len(),
            shared.pending.len()
        );
        shared.shut_down(EngineStatus::Destroyed, EngineError::EngineUnavailable);
        shared.cache.clear();
    }
}

impl Drop for SpeechEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Router thread: forwards the startup report, then resolves pending requests
/// until the unit's response channel closes.
fn route(
    inner: Arc<Inner>,
    mut responses: UnboundedReceiver<WorkerResponse>,
    ready: oneshot::Sender<bool>,
) {
    match responses.blocking_recv() {
        Some(WorkerResponse::Ready { available }) => {
            let _ = ready.send(available);
        }
        Some(other) => {
            log::error!("Execution unit sent {other:?} before reporting ready");
            inner.crash("protocol violation during startup");
            return;
        }
        None => {
            // Dropping `ready` tells the starter the unit died.
            return;
        }
    }

    while let Some(response) = responses.blocking_recv() {
        inner.handle(response);
    }

    inner.crash("execution unit exited unexpectedly");
}
