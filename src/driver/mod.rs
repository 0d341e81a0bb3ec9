#[cfg(feature = "chrome")]
pub mod chrome;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::types::SelectorKind;

/// The browser session boundary.
///
/// Selector targets resolve live nodes through this trait and never hold
/// on to them between operations; a `Node` handle is only valid for the
/// immediate call sequence it was resolved for. "Not found" is data —
/// `find_one` returns `Ok(None)` and `find_all` an empty vec — while
/// invalid selector syntax and session faults are errors.
///
/// The driver owns one mutable "current window/frame" pointer. Window and
/// frame switches have session-wide visibility until switched again.
#[async_trait]
pub trait Driver: Send + Sync {
    type Node: Clone + Send + Sync;

    /// Resolve at most one node. `kind` is a concrete strategy; `Auto` is
    /// expanded by the caller before it reaches the driver.
    async fn find_one(&self, kind: SelectorKind, selector: &str) -> Result<Option<Self::Node>>;

    /// Resolve all matching nodes in document order. Empty, never an error.
    async fn find_all(&self, kind: SelectorKind, selector: &str) -> Result<Vec<Self::Node>>;

    async fn is_visible(&self, node: &Self::Node) -> Result<bool>;

    /// Text content; `raw` yields the inner HTML instead.
    async fn text(&self, node: &Self::Node, raw: bool) -> Result<String>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Value>;

    async fn set_attribute(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()>;

    async fn property(&self, node: &Self::Node, name: &str) -> Result<Value>;

    async fn set_property(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()>;

    async fn dispatch_event(
        &self,
        node: &Self::Node,
        event: &str,
        event_type: Option<&str>,
        options: Option<&Value>,
    ) -> Result<()>;

    async fn click(&self, node: &Self::Node) -> Result<()>;

    async fn double_click(&self, node: &Self::Node) -> Result<()>;

    async fn send_keys(&self, node: &Self::Node, text: &str) -> Result<()>;

    async fn clear(&self, node: &Self::Node) -> Result<()>;

    async fn scroll_into_view(&self, node: &Self::Node) -> Result<()>;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn refresh(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn current_title(&self) -> Result<String>;

    async fn window_handles(&self) -> Result<Vec<String>>;

    async fn current_window(&self) -> Result<String>;

    async fn switch_to_window(&self, handle: &str) -> Result<()>;

    /// Switch the session context into an iframe node.
    async fn switch_to_frame(&self, node: &Self::Node) -> Result<()>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Captured console output as a JSON string.
    async fn console_dump(&self) -> Result<String>;
}
