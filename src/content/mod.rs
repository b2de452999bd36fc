//! The content side: page model, expression evaluation, and workers.
//!
//! All state lives in one [`ContentContext`]. Operations reach it through a
//! cloneable [`ContentHandle`]; nothing is process-global.

pub mod dom;
pub mod eval;
pub mod registry;
pub mod worker;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{BridgeError, Result};

pub use dom::{Document, Element, MouseEvent, MouseEventKind, NodeId, Rect};
pub use eval::JsValue;
pub use registry::WorkerRegistry;
pub use worker::{ScriptKind, Worker, WorkerCatalog, WorkerScope, WorkerScript};

/// Everything a remote operation can touch.
#[derive(Debug, Default)]
pub struct ContentContext {
    pub document: Document,
    pub catalog: WorkerCatalog,
    pub workers: WorkerRegistry,
}

impl ContentContext {
    pub fn new(document: Document, catalog: WorkerCatalog) -> Self {
        Self {
            document,
            catalog,
            workers: WorkerRegistry::new(),
        }
    }
}

/// Shared access to a [`ContentContext`].
#[derive(Debug, Clone, Default)]
pub struct ContentHandle {
    inner: Arc<Mutex<ContentContext>>,
}

impl ContentHandle {
    pub fn new(context: ContentContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ContentContext> {
        self.inner.lock().await
    }

    /// Evaluate an expression against the page and return its value.
    pub async fn evaluate(&self, code: &str) -> Result<Value> {
        tracing::debug!("Evaluating expression: {}", code);
        let ctx = self.inner.lock().await;
        eval::evaluate_to_json(code, &ctx.document)
    }

    /// Resolve `path` to an element and click its center.
    pub async fn generate_mouse_click(&self, path: &str) -> Result<()> {
        tracing::debug!("Generating mouse click on {}", path);
        let mut ctx = self.inner.lock().await;
        let target = eval::evaluate(path, &ctx.document)?;
        let node = match target {
            JsValue::Element(node) => node,
            other => {
                return Err(BridgeError::Evaluation(format!(
                    "TypeError: '{}' did not resolve to an element (got {})",
                    path,
                    other.to_js_string()
                )))
            }
        };
        ctx.document.synthesize_mouse_at_center(node)
    }

    /// Start a worker for `url` and register it once it posts its first
    /// message.
    pub async fn create_worker(&self, url: &str) -> Result<()> {
        tracing::info!("Creating worker with url '{}'", url);
        let script = self.inner.lock().await.catalog.load(url)?;

        let mut worker = Worker::spawn(url, script);
        if let Err(e) = worker.wait_ready().await {
            worker.terminate();
            return Err(e);
        }

        let replaced = self.inner.lock().await.workers.insert(worker);
        if let Some(old) = replaced {
            tracing::warn!("Worker '{}' replaced an existing worker; terminating the old one", url);
            old.terminate();
        }
        Ok(())
    }

    pub async fn terminate_worker(&self, url: &str) -> Result<()> {
        tracing::info!("Terminating worker with url '{}'", url);
        let worker = self.inner.lock().await.workers.remove(url)?;
        worker.terminate();
        Ok(())
    }

    /// Post `message` to the worker at `url` and wait for its next message.
    pub async fn post_message_to_worker(&self, url: &str, message: Value) -> Result<()> {
        tracing::debug!("Posting message to worker with url '{}'", url);
        let mut events = {
            let ctx = self.inner.lock().await;
            let worker = ctx.workers.get(url)?;
            let events = worker.subscribe();
            worker.post_message(message)?;
            events
        };
        worker::next_event(&mut events, url).await
    }

    pub async fn worker_urls(&self) -> Vec<String> {
        self.inner.lock().await.workers.urls()
    }

    pub async fn shutdown(&self) {
        self.inner.lock().await.workers.terminate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle() -> ContentHandle {
        let mut document = Document::default();
        document.push(Element::new("button").with_id("go").with_rect(0.0, 0.0, 10.0, 10.0));
        let mut catalog = WorkerCatalog::new();
        catalog.register("echo.js", ScriptKind::Echo);
        catalog.register("counter.js", ScriptKind::Counter);
        catalog.register("crash.js", ScriptKind::Crash);
        ContentHandle::new(ContentContext::new(document, catalog))
    }

    #[tokio::test]
    async fn click_records_events_on_target() {
        let content = handle();
        content
            .generate_mouse_click("document.getElementById('go')")
            .await
            .unwrap();
        assert_eq!(content.lock().await.document.elements[0].click_count(), 1);
    }

    #[tokio::test]
    async fn click_on_non_element_fails() {
        let content = handle();
        let err = content.generate_mouse_click("1 + 1").await.unwrap_err();
        assert!(err.to_string().starts_with("TypeError"), "{}", err);

        let err = content
            .generate_mouse_click("document.getElementById('missing')")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("got null"), "{}", err);
    }

    #[tokio::test]
    async fn worker_lifecycle() {
        let content = handle();
        content.create_worker("counter.js").await.unwrap();
        assert_eq!(content.worker_urls().await, vec!["counter.js"]);

        content
            .post_message_to_worker("counter.js", json!("tick"))
            .await
            .unwrap();

        content.terminate_worker("counter.js").await.unwrap();
        assert!(content.worker_urls().await.is_empty());
        assert!(content.terminate_worker("counter.js").await.unwrap_err().is_lookup());
    }

    #[tokio::test]
    async fn failed_start_does_not_register() {
        let content = handle();
        assert!(content.create_worker("crash.js").await.is_err());
        assert!(content.create_worker("unlisted.js").await.is_err());
        assert!(content.worker_urls().await.is_empty());
    }

    #[tokio::test]
    async fn recreating_a_worker_replaces_the_entry() {
        let content = handle();
        content.create_worker("echo.js").await.unwrap();
        content.create_worker("echo.js").await.unwrap();
        assert_eq!(content.worker_urls().await, vec!["echo.js"]);
        content.shutdown().await;
        assert!(content.worker_urls().await.is_empty());
    }

    #[tokio::test]
    async fn posting_to_unknown_worker_is_a_lookup_error() {
        let content = handle();
        let err = content
            .post_message_to_worker("nope.js", json!(1))
            .await
            .unwrap_err();
        assert!(err.is_lookup());
    }
}
