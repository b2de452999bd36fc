//! Method name → handler table for the `"jsonrpc"` channel.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use crate::content::ContentHandle;
use crate::error::{BridgeError, Result};

/// A result that is available now or later. Every handler returns one, so
/// the reply path is the same for immediate and asynchronous operations.
pub type Deferred = BoxFuture<'static, Result<Value>>;

type Handler = Box<dyn Fn(ContentHandle, Vec<Value>) -> Deferred + Send + Sync>;

/// Remote operations exposed over the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Evaluate,
    GenerateMouseClick,
    CreateWorker,
    TerminateWorker,
    PostMessageToWorker,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Evaluate,
        Method::GenerateMouseClick,
        Method::CreateWorker,
        Method::TerminateWorker,
        Method::PostMessageToWorker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Evaluate => "evaluate",
            Method::GenerateMouseClick => "generateMouseClick",
            Method::CreateWorker => "createWorker",
            Method::TerminateWorker => "terminateWorker",
            Method::PostMessageToWorker => "postMessageToWorker",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| BridgeError::MethodNotFound(s.to_string()))
    }
}

/// Handlers for every [`Method`], built once at startup.
pub struct DispatchTable {
    handlers: HashMap<Method, Handler>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        let mut handlers: HashMap<Method, Handler> = HashMap::new();

        handlers.insert(
            Method::Evaluate,
            Box::new(|ctx: ContentHandle, params: Vec<Value>| {
                async move {
                    let [code] = take_params::<1>(Method::Evaluate, params)?;
                    let code = as_string(Method::Evaluate, code)?;
                    ctx.evaluate(&code).await
                }
                .boxed()
            }),
        );

        handlers.insert(
            Method::GenerateMouseClick,
            Box::new(|ctx: ContentHandle, params: Vec<Value>| {
                async move {
                    let [path] = take_params::<1>(Method::GenerateMouseClick, params)?;
                    let path = as_string(Method::GenerateMouseClick, path)?;
                    ctx.generate_mouse_click(&path).await?;
                    Ok(Value::Null)
                }
                .boxed()
            }),
        );

        handlers.insert(
            Method::CreateWorker,
            Box::new(|ctx: ContentHandle, params: Vec<Value>| {
                async move {
                    let [url] = take_params::<1>(Method::CreateWorker, params)?;
                    let url = as_string(Method::CreateWorker, url)?;
                    ctx.create_worker(&url).await?;
                    Ok(Value::Null)
                }
                .boxed()
            }),
        );

        handlers.insert(
            Method::TerminateWorker,
            Box::new(|ctx: ContentHandle, params: Vec<Value>| {
                async move {
                    let [url] = take_params::<1>(Method::TerminateWorker, params)?;
                    let url = as_string(Method::TerminateWorker, url)?;
                    ctx.terminate_worker(&url).await?;
                    Ok(Value::Null)
                }
                .boxed()
            }),
        );

        handlers.insert(
            Method::PostMessageToWorker,
            Box::new(|ctx: ContentHandle, params: Vec<Value>| {
                async move {
                    let [url, message] = take_params::<2>(Method::PostMessageToWorker, params)?;
                    let url = as_string(Method::PostMessageToWorker, url)?;
                    ctx.post_message_to_worker(&url, message).await?;
                    Ok(Value::Null)
                }
                .boxed()
            }),
        );

        Self { handlers }
    }

    /// Look up `method` and start it with `params` spread positionally.
    /// Unknown names resolve to a lookup error without touching `ctx`.
    pub fn dispatch(&self, ctx: ContentHandle, method: &str, params: Vec<Value>) -> Deferred {
        let handler = method
            .parse::<Method>()
            .and_then(|m| {
                self.handlers
                    .get(&m)
                    .ok_or_else(|| BridgeError::MethodNotFound(method.to_string()))
            });
        match handler {
            Ok(handler) => handler(ctx, params),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

fn take_params<const N: usize>(method: Method, params: Vec<Value>) -> Result<[Value; N]> {
    let count = params.len();
    params.try_into().map_err(|_| BridgeError::InvalidParams {
        method: method.name().to_string(),
        message: format!("expected {} argument(s), got {}", N, count),
    })
}

fn as_string(method: Method, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(BridgeError::InvalidParams {
            method: method.name().to_string(),
            message: format!("expected a string, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentContext, Document, WorkerCatalog};
    use serde_json::json;

    fn ctx() -> ContentHandle {
        ContentHandle::new(ContentContext::new(Document::default(), WorkerCatalog::new()))
    }

    #[test]
    fn method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
        }
        assert!("_eval".parse::<Method>().unwrap_err().is_lookup());
    }

    #[tokio::test]
    async fn table_covers_every_method() {
        let table = DispatchTable::new();
        for method in Method::ALL {
            // No params: every handler is reached and rejects the arity.
            let err = table.dispatch(ctx(), method.name(), vec![]).await.unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidParams { .. }),
                "{}: {}",
                method,
                err
            );
        }
    }

    #[tokio::test]
    async fn evaluate_dispatches() {
        let table = DispatchTable::new();
        let value = table
            .dispatch(ctx(), "evaluate", vec![json!("1+1")])
            .await
            .unwrap();
        assert_eq!(value, json!(2));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let table = DispatchTable::new();
        let err = table
            .dispatch(ctx(), "toString", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown method: toString");
    }

    #[tokio::test]
    async fn wrong_arity_and_types_are_invalid_params() {
        let table = DispatchTable::new();
        let err = table.dispatch(ctx(), "evaluate", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid params for evaluate: expected 1 argument(s), got 0"
        );

        let err = table
            .dispatch(ctx(), "terminateWorker", vec![json!(5)])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams { .. }));

        let err = table
            .dispatch(ctx(), "postMessageToWorker", vec![json!("w.js")])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams { .. }));
    }
}
