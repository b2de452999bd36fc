use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::transport::Endpoint;
use crate::error::{BridgeError, Result};
use crate::protocol::{
    Envelope, Request, RequestId, Response, JSONRPC_CHANNEL, POST_MESSAGE_TO_WORKER_CHANNEL,
};

/// Shared state between callers and the response router.
struct ControllerState {
    /// Calls waiting for a response, keyed by request id
    pending: HashMap<RequestId, oneshot::Sender<Response>>,
    /// Direct worker posts waiting for completion, oldest first
    worker_posts: VecDeque<oneshot::Sender<()>>,
    /// Monotonically increasing request id counter
    next_id: RequestId,
    /// Set once the content side has gone away
    closed: bool,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            pending: HashMap::new(),
            worker_posts: VecDeque::new(),
            next_id: 1,
            closed: false,
        }
    }
}

/// Controller side of the bridge: issues requests and routes responses back
/// to their callers by id.
pub struct Controller {
    outbound: mpsc::UnboundedSender<Envelope>,
    state: Arc<Mutex<ControllerState>>,
    router: JoinHandle<()>,
    call_timeout: Option<Duration>,
}

impl Controller {
    pub fn new(endpoint: Endpoint) -> Self {
        let (outbound, inbound) = endpoint.split();
        let state = Arc::new(Mutex::new(ControllerState::new()));
        let router = tokio::spawn(route_responses(inbound, Arc::clone(&state)));
        Self {
            outbound,
            state,
            router,
            call_timeout: None,
        }
    }

    /// Stop waiting for a call after `timeout`. The remote operation itself
    /// keeps running; only this side gives up.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Send a request and wait for its raw response.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        let (response_tx, response_rx) = oneshot::channel();
        let request_id;

        {
            let mut s = self.state.lock().await;
            if s.closed {
                return Err(BridgeError::Transport("bridge connection closed".to_string()));
            }

            request_id = s.next_id;
            s.next_id += 1;

            let envelope = Envelope::request(&Request::new(request_id, method, params))?;
            s.pending.insert(request_id, response_tx);
            if self.outbound.send(envelope).is_err() {
                s.pending.remove(&request_id);
                return Err(BridgeError::Transport("bridge connection closed".to_string()));
            }
        }

        tracing::debug!("Sent {} (id {})", method, request_id);

        let received = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, response_rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.state.lock().await.pending.remove(&request_id);
                    return Err(BridgeError::Timeout(format!(
                        "{} (id {}) did not answer within {}ms",
                        method,
                        request_id,
                        limit.as_millis()
                    )));
                }
            },
            None => response_rx.await,
        };

        received.map_err(|_| {
            BridgeError::Transport(format!(
                "bridge connection closed before {} (id {}) was answered",
                method, request_id
            ))
        })
    }

    /// Invoke a remote method; a response error becomes [`BridgeError::Remote`].
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.request(method, params).await?.into_result()
    }

    pub async fn evaluate(&self, code: &str) -> Result<Value> {
        self.call("evaluate", vec![Value::from(code)]).await
    }

    pub async fn generate_mouse_click(&self, element_path: &str) -> Result<()> {
        self.call("generateMouseClick", vec![Value::from(element_path)])
            .await
            .map(drop)
    }

    pub async fn create_worker(&self, url: &str) -> Result<()> {
        self.call("createWorker", vec![Value::from(url)])
            .await
            .map(drop)
    }

    pub async fn terminate_worker(&self, url: &str) -> Result<()> {
        self.call("terminateWorker", vec![Value::from(url)])
            .await
            .map(drop)
    }

    pub async fn post_message_to_worker(&self, url: &str, message: Value) -> Result<()> {
        self.call("postMessageToWorker", vec![Value::from(url), message])
            .await
            .map(drop)
    }

    /// Post through the uncorrelated `"test:postMessageToWorker"` channel.
    ///
    /// Completions carry no id and are matched to posts in send order. A post
    /// to an unknown worker never completes, so pair this with a call timeout.
    pub async fn post_message_to_worker_direct(&self, url: &str, message: Value) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut s = self.state.lock().await;
            if s.closed {
                return Err(BridgeError::Transport("bridge connection closed".to_string()));
            }
            s.worker_posts.push_back(done_tx);
            if self
                .outbound
                .send(Envelope::worker_post(url, message)?)
                .is_err()
            {
                s.worker_posts.pop_back();
                return Err(BridgeError::Transport("bridge connection closed".to_string()));
            }
        }

        let closed = || {
            BridgeError::Transport(format!(
                "bridge connection closed before the post to '{}' completed",
                url
            ))
        };
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, done_rx).await {
                Ok(received) => received.map_err(|_| closed()),
                Err(_) => Err(BridgeError::Timeout(format!(
                    "worker at '{}' did not reply within {}ms",
                    url,
                    limit.as_millis()
                ))),
            },
            None => done_rx.await.map_err(|_| closed()),
        }
    }

    /// Number of calls still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// Deliver each incoming response to the caller waiting on its id.
async fn route_responses(
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    state: Arc<Mutex<ControllerState>>,
) {
    while let Some(envelope) = inbound.recv().await {
        match envelope.name.as_str() {
            JSONRPC_CHANNEL => {
                let response: Response = match serde_json::from_value(envelope.data) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!("Invalid response from content side: {}", e);
                        continue;
                    }
                };
                let mut s = state.lock().await;
                let waiting = response.id.as_u64().and_then(|id| s.pending.remove(&id));
                match waiting {
                    Some(sender) => {
                        let _ = sender.send(response);
                    }
                    None => tracing::warn!("Response for unknown request id: {}", response.id),
                }
            }
            POST_MESSAGE_TO_WORKER_CHANNEL => {
                let mut s = state.lock().await;
                // Posts whose caller timed out are skipped.
                while s.worker_posts.front().is_some_and(|tx| tx.is_closed()) {
                    s.worker_posts.pop_front();
                }
                match s.worker_posts.pop_front() {
                    Some(sender) => {
                        let _ = sender.send(());
                    }
                    None => tracing::warn!("Worker post completion with no post outstanding"),
                }
            }
            other => tracing::debug!("Ignoring message on unknown channel '{}'", other),
        }
    }

    tracing::debug!("Content side disconnected");

    // Dropping the senders fails every waiting caller.
    let mut s = state.lock().await;
    s.closed = true;
    s.pending.clear();
    s.worker_posts.clear();
}
