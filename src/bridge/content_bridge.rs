use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::dispatch::DispatchTable;
use super::transport::Endpoint;
use crate::content::ContentHandle;
use crate::protocol::{
    Envelope, Request, Response, WorkerPost, JSONRPC_CHANNEL, POST_MESSAGE_TO_WORKER_CHANNEL,
};

/// Content-side message loop.
///
/// Answers every `"jsonrpc"` request with exactly one response and relays
/// `"test:postMessageToWorker"` posts. Each incoming message is handled in
/// its own task, so slow operations never hold up the loop and responses may
/// leave in a different order than requests arrived.
#[derive(Debug, Clone)]
pub struct ContentBridge {
    context: ContentHandle,
    table: Arc<DispatchTable>,
}

impl ContentBridge {
    pub fn new(context: ContentHandle) -> Self {
        Self {
            context,
            table: Arc::new(DispatchTable::new()),
        }
    }

    pub fn context(&self) -> &ContentHandle {
        &self.context
    }

    /// Run one request to completion. Failures become the response error.
    pub async fn dispatch(&self, request: Request) -> Response {
        tracing::debug!("Dispatching {} (id {})", request.method, request.id);
        let result = self
            .table
            .dispatch(self.context.clone(), &request.method, request.params)
            .await;
        if let Err(e) = &result {
            tracing::warn!("{} (id {}) failed: {}", request.method, request.id, e);
        }
        Response::from_result(request.id, result)
    }

    /// Serve messages from `endpoint` until the other side goes away.
    pub async fn run(self, endpoint: Endpoint) {
        let (tx, mut rx) = endpoint.split();

        while let Some(Envelope { name, data }) = rx.recv().await {
            match name.as_str() {
                JSONRPC_CHANNEL => {
                    let bridge = self.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move { bridge.handle_request(data, tx).await });
                }
                POST_MESSAGE_TO_WORKER_CHANNEL => {
                    let bridge = self.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move { bridge.handle_worker_post(data, tx).await });
                }
                other => {
                    tracing::debug!("Ignoring message on unknown channel '{}'", other);
                }
            }
        }

        tracing::debug!("Content bridge endpoint closed");
    }

    async fn handle_request(&self, data: Value, tx: mpsc::UnboundedSender<Envelope>) {
        let response = match serde_json::from_value::<Request>(data.clone()) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => match data.get("id").filter(|id| !id.is_null()) {
                Some(id) => Response::failure(id.clone(), format!("Invalid request: {}", e)),
                None => {
                    tracing::warn!("Dropping uncorrelatable jsonrpc message: {}", e);
                    return;
                }
            },
        };

        match Envelope::response(&response) {
            Ok(envelope) => {
                if tx.send(envelope).is_err() {
                    tracing::debug!("Controller gone before response {} was sent", response.id);
                }
            }
            Err(e) => tracing::error!("Failed to encode response {}: {}", response.id, e),
        }
    }

    async fn handle_worker_post(&self, data: Value, tx: mpsc::UnboundedSender<Envelope>) {
        let post: WorkerPost = match serde_json::from_value(data) {
            Ok(post) => post,
            Err(e) => {
                tracing::warn!("Invalid worker post: {}", e);
                return;
            }
        };
        tracing::debug!(
            "Posting message '{}' to worker with url '{}'",
            post.message,
            post.url
        );

        match self
            .context
            .post_message_to_worker(&post.url, post.message)
            .await
        {
            Ok(()) => {
                let _ = tx.send(Envelope::worker_post_done());
            }
            Err(e) => tracing::warn!("Worker post to '{}' failed: {}", post.url, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transport;
    use crate::content::{ContentContext, Document, ScriptKind, WorkerCatalog};
    use serde_json::json;

    fn bridge() -> ContentBridge {
        let mut catalog = WorkerCatalog::new();
        catalog.register("echo.js", ScriptKind::Echo);
        ContentBridge::new(ContentHandle::new(ContentContext::new(
            Document::default(),
            catalog,
        )))
    }

    #[tokio::test]
    async fn evaluate_scenario() {
        let response = bridge()
            .dispatch(Request::new(1, "evaluate", vec![json!("1+1")]))
            .await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "result": 2, "error": null, "id": 1 })
        );
    }

    #[tokio::test]
    async fn terminate_unknown_worker_scenario() {
        let response = bridge()
            .dispatch(Request::new(2, "terminateWorker", vec![json!("http://x")]))
            .await;
        assert_eq!(response.id, 2);
        assert!(response.result().is_none());
        assert!(!response.error().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_request_with_id_gets_error() {
        let (mut controller, content) = transport::pair();
        tokio::spawn(bridge().run(content));

        controller
            .sender
            .send(Envelope::new(JSONRPC_CHANNEL, json!({ "id": 7, "params": [] })))
            .unwrap();
        let reply = controller.receiver.recv().await.unwrap();
        let response: Response = serde_json::from_value(reply.data).unwrap();
        assert_eq!(response.id, 7);
        assert!(response.error().unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn any_json_id_is_echoed() {
        let (mut controller, content) = transport::pair();
        tokio::spawn(bridge().run(content));

        for id in [json!("req-1"), json!(-3), json!(1.5)] {
            controller
                .sender
                .send(Envelope::new(
                    JSONRPC_CHANNEL,
                    json!({ "method": "evaluate", "params": ["1+1"], "id": id }),
                ))
                .unwrap();
            let reply = controller.receiver.recv().await.unwrap();
            assert_eq!(reply.data, json!({ "result": 2, "error": null, "id": id }));
        }
    }

    #[tokio::test]
    async fn worker_post_replies_without_payload() {
        let bridge = bridge();
        bridge.context().create_worker("echo.js").await.unwrap();

        let (mut controller, content) = transport::pair();
        tokio::spawn(bridge.run(content));

        controller
            .sender
            .send(Envelope::worker_post("echo.js", json!("hi")).unwrap())
            .unwrap();
        let reply = controller.receiver.recv().await.unwrap();
        assert_eq!(reply.name, POST_MESSAGE_TO_WORKER_CHANNEL);
        assert_eq!(reply.data, Value::Null);
    }
}
