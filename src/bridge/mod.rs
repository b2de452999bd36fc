//! The message bridge between a controller and a content context.

pub mod content_bridge;
pub mod controller;
pub mod dispatch;
pub mod transport;
pub mod websocket;

pub use content_bridge::ContentBridge;
pub use controller::Controller;
pub use dispatch::{Deferred, DispatchTable, Method};
pub use transport::Endpoint;

use crate::content::ContentHandle;

/// Wire a controller to a content bridge in this process.
pub fn in_process(context: ContentHandle) -> Controller {
    let (controller_end, content_end) = transport::pair();
    tokio::spawn(ContentBridge::new(context).run(content_end));
    Controller::new(controller_end)
}
