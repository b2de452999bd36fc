//! Background workers owned by the content context.
//!
//! A worker is a tokio task running a [`WorkerScript`]. The script reads
//! messages from its inbox and posts messages that any number of listeners
//! can observe. The first posted message is the readiness signal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;

use crate::error::{BridgeError, Result};

/// Buffered worker messages per listener before older ones are dropped.
const EVENT_CAPACITY: usize = 64;

/// Code a worker runs. Returning ends the worker.
#[async_trait]
pub trait WorkerScript: Send {
    async fn run(self: Box<Self>, scope: WorkerScope) -> Result<()>;
}

/// The worker side of a worker's channels.
pub struct WorkerScope {
    url: String,
    inbox: mpsc::UnboundedReceiver<Value>,
    outbox: broadcast::Sender<Value>,
}

impl WorkerScope {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next message posted to this worker, or `None` once nobody can post.
    pub async fn next_message(&mut self) -> Option<Value> {
        self.inbox.recv().await
    }

    pub fn post_message(&self, message: Value) {
        // No listeners is fine: the message is simply not observed.
        let _ = self.outbox.send(message);
    }
}

/// Built-in scripts selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Posts `"ready"`, then echoes every message back.
    Echo,
    /// Posts `0`, then replies with the number of messages received so far.
    Counter,
    /// Never posts anything.
    Silent,
    /// Fails before posting anything.
    Crash,
}

impl ScriptKind {
    pub fn name(self) -> &'static str {
        match self {
            ScriptKind::Echo => "echo",
            ScriptKind::Counter => "counter",
            ScriptKind::Silent => "silent",
            ScriptKind::Crash => "crash",
        }
    }

    pub fn instantiate(self) -> Box<dyn WorkerScript> {
        match self {
            ScriptKind::Echo => Box::new(EchoScript),
            ScriptKind::Counter => Box::new(CounterScript),
            ScriptKind::Silent => Box::new(SilentScript),
            ScriptKind::Crash => Box::new(CrashScript),
        }
    }
}

struct EchoScript;

#[async_trait]
impl WorkerScript for EchoScript {
    async fn run(self: Box<Self>, mut scope: WorkerScope) -> Result<()> {
        scope.post_message(Value::String("ready".to_string()));
        while let Some(message) = scope.next_message().await {
            scope.post_message(message);
        }
        Ok(())
    }
}

struct CounterScript;

#[async_trait]
impl WorkerScript for CounterScript {
    async fn run(self: Box<Self>, mut scope: WorkerScope) -> Result<()> {
        let mut count: u64 = 0;
        scope.post_message(Value::from(count));
        while scope.next_message().await.is_some() {
            count += 1;
            scope.post_message(Value::from(count));
        }
        Ok(())
    }
}

struct SilentScript;

#[async_trait]
impl WorkerScript for SilentScript {
    async fn run(self: Box<Self>, mut scope: WorkerScope) -> Result<()> {
        while scope.next_message().await.is_some() {}
        Ok(())
    }
}

struct CrashScript;

#[async_trait]
impl WorkerScript for CrashScript {
    async fn run(self: Box<Self>, scope: WorkerScope) -> Result<()> {
        Err(BridgeError::WorkerFailed(format!(
            "script at {} threw during startup",
            scope.url()
        )))
    }
}

pub type ScriptFactory = Arc<dyn Fn() -> Box<dyn WorkerScript> + Send + Sync>;

/// Resolves a worker url to the script that runs there.
#[derive(Clone, Default)]
pub struct WorkerCatalog {
    scripts: HashMap<String, ScriptFactory>,
    fallback: Option<ScriptFactory>,
}

impl fmt::Debug for WorkerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut urls: Vec<_> = self.scripts.keys().collect();
        urls.sort();
        f.debug_struct("WorkerCatalog")
            .field("urls", &urls)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, url: impl Into<String>, kind: ScriptKind) {
        self.register_script(url, move || kind.instantiate());
    }

    pub fn register_script<F>(&mut self, url: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn WorkerScript> + Send + Sync + 'static,
    {
        self.scripts.insert(url.into(), Arc::new(factory));
    }

    /// Script used for urls without an explicit registration.
    pub fn set_fallback(&mut self, kind: Option<ScriptKind>) {
        self.fallback = kind.map(|k| Arc::new(move || k.instantiate()) as ScriptFactory);
    }

    pub fn load(&self, url: &str) -> Result<Box<dyn WorkerScript>> {
        self.scripts
            .get(url)
            .or(self.fallback.as_ref())
            .map(|factory| factory())
            .ok_or_else(|| {
                BridgeError::WorkerFailed(format!(
                    "NetworkError: failed to load worker script from '{}'",
                    url
                ))
            })
    }
}

/// Controller-side handle to a running worker.
#[derive(Debug)]
pub struct Worker {
    url: String,
    inbox: mpsc::UnboundedSender<Value>,
    events: broadcast::Receiver<Value>,
    abort: AbortHandle,
}

impl Worker {
    /// Start `script` as a new task. The handle observes every message the
    /// script posts from the start, so the readiness message cannot be missed.
    pub fn spawn(url: &str, script: Box<dyn WorkerScript>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);

        let scope = WorkerScope {
            url: url.to_string(),
            inbox: inbox_rx,
            outbox: events_tx,
        };
        let task_url = url.to_string();
        let handle = tokio::spawn(async move {
            match script.run(scope).await {
                Ok(()) => tracing::debug!("Worker '{}' finished", task_url),
                Err(e) => tracing::warn!("Worker '{}' failed: {}", task_url, e),
            }
        });

        Self {
            url: url.to_string(),
            inbox: inbox_tx,
            events: events_rx,
            abort: handle.abort_handle(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for the worker's first message.
    pub async fn wait_ready(&mut self) -> Result<()> {
        next_event(&mut self.events, &self.url)
            .await
            .map_err(|_| {
                BridgeError::WorkerFailed(format!(
                    "worker '{}' exited before posting a message",
                    self.url
                ))
            })
    }

    /// A listener that sees messages posted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.events.resubscribe()
    }

    pub fn post_message(&self, message: Value) -> Result<()> {
        self.inbox.send(message).map_err(|_| {
            BridgeError::WorkerFailed(format!("worker '{}' is no longer running", self.url))
        })
    }

    pub fn terminate(&self) {
        self.abort.abort();
    }
}

/// Wait for the next message on a worker listener.
pub async fn next_event(events: &mut broadcast::Receiver<Value>, url: &str) -> Result<()> {
    match events.recv().await {
        Ok(_) => Ok(()),
        // Missed messages still mean the worker spoke.
        Err(broadcast::error::RecvError::Lagged(_)) => Ok(()),
        Err(broadcast::error::RecvError::Closed) => Err(BridgeError::WorkerFailed(format!(
            "worker '{}' terminated before replying",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn echo_worker_signals_ready_then_echoes() {
        let mut worker = Worker::spawn("echo.js", ScriptKind::Echo.instantiate());
        worker.wait_ready().await.unwrap();

        let mut events = worker.subscribe();
        worker.post_message(json!({ "ping": 1 })).unwrap();
        assert_eq!(events.recv().await.unwrap(), json!({ "ping": 1 }));

        worker.terminate();
    }

    #[tokio::test]
    async fn counter_worker_counts_messages() {
        let mut worker = Worker::spawn("counter.js", ScriptKind::Counter.instantiate());
        worker.wait_ready().await.unwrap();

        let mut events = worker.subscribe();
        worker.post_message(json!("a")).unwrap();
        worker.post_message(json!("b")).unwrap();
        assert_eq!(events.recv().await.unwrap(), json!(1));
        assert_eq!(events.recv().await.unwrap(), json!(2));

        worker.terminate();
    }

    #[tokio::test]
    async fn crashing_worker_never_becomes_ready() {
        let mut worker = Worker::spawn("crash.js", ScriptKind::Crash.instantiate());
        let err = worker.wait_ready().await.unwrap_err();
        assert!(err.to_string().contains("exited before posting"), "{}", err);
    }

    #[tokio::test]
    async fn terminate_fails_waiting_listeners() {
        let mut worker = Worker::spawn("silent.js", ScriptKind::Silent.instantiate());
        let mut events = worker.subscribe();
        worker.post_message(json!("hello")).unwrap();

        let url = worker.url().to_string();
        let waiter = tokio::spawn(async move { next_event(&mut events, &url).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.terminate();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("listener should be released")
            .unwrap();
        assert!(result.is_err());
        assert!(
            tokio::time::timeout(Duration::from_secs(2), worker.wait_ready())
                .await
                .unwrap()
                .is_err()
        );
    }

    #[test]
    fn catalog_prefers_explicit_registration_over_fallback() {
        let mut catalog = WorkerCatalog::new();
        assert!(catalog.load("http://x/w.js").is_err());

        catalog.set_fallback(Some(ScriptKind::Echo));
        assert!(catalog.load("http://x/w.js").is_ok());

        catalog.register("http://x/c.js", ScriptKind::Crash);
        assert!(catalog.load("http://x/c.js").is_ok());
    }

    #[test]
    fn unknown_url_reports_network_error() {
        let catalog = WorkerCatalog::new();
        let err = catalog.load("http://nowhere/w.js").err().unwrap();
        assert!(err.to_string().contains("NetworkError"));
    }

    #[test]
    fn script_kind_uses_lowercase_names() {
        let kind: ScriptKind = serde_json::from_value(json!("counter")).unwrap();
        assert_eq!(kind, ScriptKind::Counter);
    }
}
