//! Message transport between the two sides of the bridge.
//!
//! An [`Endpoint`] is one side of a bidirectional, ordered channel of
//! [`Envelope`]s. The in-process pair is the default; the WebSocket transport
//! produces the same endpoint shape on the controller side.

use tokio::sync::mpsc;

use crate::protocol::Envelope;

#[derive(Debug)]
pub struct Endpoint {
    pub sender: mpsc::UnboundedSender<Envelope>,
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Endpoint {
    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<Envelope>,
        mpsc::UnboundedReceiver<Envelope>,
    ) {
        (self.sender, self.receiver)
    }
}

/// Two connected endpoints: what one sends, the other receives.
pub fn pair() -> (Endpoint, Endpoint) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        Endpoint {
            sender: a_tx,
            receiver: a_rx,
        },
        Endpoint {
            sender: b_tx,
            receiver: b_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pair_is_crossed() {
        let (mut controller, mut content) = pair();
        controller
            .sender
            .send(Envelope::new("jsonrpc", json!(1)))
            .unwrap();
        content
            .sender
            .send(Envelope::new("jsonrpc", json!(2)))
            .unwrap();

        assert_eq!(content.receiver.recv().await.unwrap().data, json!(1));
        assert_eq!(controller.receiver.recv().await.unwrap().data, json!(2));
    }

    #[tokio::test]
    async fn dropping_one_side_closes_the_other() {
        let (controller, mut content) = pair();
        drop(controller);
        assert!(content.receiver.recv().await.is_none());
    }
}
