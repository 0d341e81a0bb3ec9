//! Deterministic test support.
//!
//! `MockDriver` implements the driver seam over an in-memory node tree
//! parsed from an HTML fixture. Resolution supports the compound CSS
//! subset page objects actually use (tag, `#id`, `.class`, descendant
//! chains) plus an explicit XPath registry so the auto-fallback chain can
//! be exercised; state mutators flip visibility, properties, and
//! attachment at runtime, and an event log records every action that
//! reaches a node.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::controller::Session;
use crate::driver::Driver;
use crate::errors::{PageError, Result};
use crate::types::SelectorKind;
use crate::wait::SyncConfig;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A session over a `MockDriver` with a short polling tick, for tests.
pub fn test_session(html: &str) -> Session<MockDriver> {
    Session::with_config(
        MockDriver::from_html(html),
        SyncConfig {
            tick: Duration::from_millis(10),
        },
    )
}

/// Handle into the mock node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockNode(usize);

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<usize>,
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    properties: BTreeMap<String, Value>,
    text: String,
    html: String,
    visible: bool,
    detached: bool,
}

#[derive(Debug, Clone)]
struct MockWindow {
    handle: String,
    title: String,
    url: String,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<NodeData>,
    xpath: BTreeMap<String, String>,
    windows: Vec<MockWindow>,
    current_window: usize,
    frame_ctx: Option<usize>,
    events: Vec<(usize, String)>,
    visits: Vec<String>,
    refreshes: u32,
    console: String,
}

#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// An empty document.
    pub fn new() -> Self {
        Self::from_html("<html><body></body></html>")
    }

    /// Parse an HTML fixture into the node tree.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut nodes = Vec::new();
        collect(document.root_element(), None, &mut nodes);
        Self {
            state: Arc::new(Mutex::new(MockState {
                nodes,
                windows: vec![MockWindow {
                    handle: "win-main".to_string(),
                    title: "pagebind fixture".to_string(),
                    url: "http://localhost:3000/".to_string(),
                }],
                console: "[]".to_string(),
                ..MockState::default()
            })),
        }
    }

    /// Map an XPath expression onto the nodes a CSS selector matches.
    pub async fn register_xpath(&self, xpath: &str, css: &str) {
        let mut state = self.state.lock().await;
        state.xpath.insert(xpath.to_string(), css.to_string());
    }

    /// Flip visibility of the first match.
    pub async fn set_visible(&self, selector: &str, visible: bool) {
        let mut state = self.state.lock().await;
        if let Some(index) = state.first_match(selector) {
            state.nodes[index].visible = visible;
        }
    }

    /// Flip visibility of every match.
    pub async fn set_visible_all(&self, selector: &str, visible: bool) {
        let mut state = self.state.lock().await;
        for index in state.matches(selector, false) {
            state.nodes[index].visible = visible;
        }
    }

    /// Set a property on the first match.
    pub async fn set_property_for(&self, selector: &str, name: &str, value: Value) {
        let mut state = self.state.lock().await;
        if let Some(index) = state.first_match(selector) {
            state.nodes[index].properties.insert(name.to_string(), value);
        }
    }

    /// Set a property on every match.
    pub async fn set_property_all(&self, selector: &str, name: &str, value: Value) {
        let mut state = self.state.lock().await;
        for index in state.matches(selector, false) {
            state.nodes[index]
                .properties
                .insert(name.to_string(), value.clone());
        }
    }

    /// Remove matching nodes (and their subtrees) from the document.
    pub async fn detach(&self, selector: &str) {
        let mut state = self.state.lock().await;
        for index in state.matches(selector, false) {
            state.nodes[index].detached = true;
        }
    }

    /// Restore previously detached matches.
    pub async fn attach(&self, selector: &str) {
        let mut state = self.state.lock().await;
        for index in state.matches(selector, true) {
            state.nodes[index].detached = false;
        }
    }

    /// Names of events dispatched to the first match, in order.
    pub async fn event_names(&self, selector: &str) -> Vec<String> {
        let state = self.state.lock().await;
        match state.first_match(selector) {
            Some(index) => state
                .events
                .iter()
                .filter(|(target, _)| *target == index)
                .map(|(_, name)| name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every url passed to `goto`, in order.
    pub async fn visits(&self) -> Vec<String> {
        self.state.lock().await.visits.clone()
    }

    pub async fn refreshes(&self) -> u32 {
        self.state.lock().await.refreshes
    }

    pub async fn add_window(&self, handle: &str, title: &str, url: &str) {
        let mut state = self.state.lock().await;
        state.windows.push(MockWindow {
            handle: handle.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        });
    }

    pub async fn set_console(&self, dump: String) {
        self.state.lock().await.console = dump;
    }

    /// Node index of the frame the session context was switched into.
    pub async fn frame_context(&self) -> Option<usize> {
        self.state.lock().await.frame_ctx
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn collect(element: ElementRef<'_>, parent: Option<usize>, nodes: &mut Vec<NodeData>) {
    let index = nodes.len();
    let value = element.value();
    let mut attributes = BTreeMap::new();
    for (name, attr) in value.attrs() {
        attributes.insert(name.to_string(), attr.to_string());
    }
    let style = attributes.get("style").cloned().unwrap_or_default();
    let hidden =
        attributes.contains_key("hidden") || style.replace(' ', "").contains("display:none");
    let mut properties = BTreeMap::new();
    if let Some(initial) = attributes.get("value") {
        properties.insert("value".to_string(), Value::String(initial.clone()));
    }
    if attributes.contains_key("disabled") {
        properties.insert("disabled".to_string(), Value::Bool(true));
    }
    nodes.push(NodeData {
        parent,
        tag: value.name().to_string(),
        id: attributes.get("id").cloned(),
        classes: value.classes().map(str::to_string).collect(),
        attributes,
        properties,
        text: element.text().collect::<String>(),
        html: element.inner_html(),
        visible: !hidden,
        detached: false,
    });
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect(child_element, Some(index), nodes);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Tag,
    Id,
    Class,
}

fn invalid(selector: &str, reason: impl Into<String>) -> PageError {
    PageError::InvalidSelector {
        selector: selector.to_string(),
        reason: reason.into(),
    }
}

fn parse_selector(selector: &str) -> Result<Vec<Compound>> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(invalid(selector, "empty selector"));
    }
    trimmed
        .split_whitespace()
        .map(|part| parse_compound(selector, part))
        .collect()
}

fn parse_compound(selector: &str, part: &str) -> Result<Compound> {
    let mut compound = Compound::default();
    let mut mode = Mode::Tag;
    let mut token = String::new();
    for ch in part.chars() {
        match ch {
            '#' => {
                flush(selector, mode, &mut token, &mut compound)?;
                mode = Mode::Id;
            }
            '.' => {
                flush(selector, mode, &mut token, &mut compound)?;
                mode = Mode::Class;
            }
            '*' if mode == Mode::Tag && token.is_empty() => {}
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => token.push(c),
            other => {
                return Err(invalid(
                    selector,
                    format!("unsupported selector syntax near {:?}", other),
                ))
            }
        }
    }
    flush(selector, mode, &mut token, &mut compound)?;
    Ok(compound)
}

fn flush(selector: &str, mode: Mode, token: &mut String, compound: &mut Compound) -> Result<()> {
    let value = std::mem::take(token);
    match mode {
        Mode::Tag => {
            if !value.is_empty() {
                compound.tag = Some(value);
            }
        }
        Mode::Id => {
            if value.is_empty() {
                return Err(invalid(selector, "empty id"));
            }
            compound.id = Some(value);
        }
        Mode::Class => {
            if value.is_empty() {
                return Err(invalid(selector, "empty class"));
            }
            compound.classes.push(value);
        }
    }
    Ok(())
}

fn compound_matches(node: &NodeData, compound: &Compound) -> bool {
    if let Some(ref tag) = compound.tag {
        if &node.tag != tag {
            return false;
        }
    }
    if let Some(ref id) = compound.id {
        if node.id.as_ref() != Some(id) {
            return false;
        }
    }
    compound
        .classes
        .iter()
        .all(|class| node.classes.iter().any(|c| c == class))
}

impl MockState {
    fn is_attached(&self, index: usize) -> bool {
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            if self.nodes[current].detached {
                return false;
            }
            cursor = self.nodes[current].parent;
        }
        true
    }

    fn matches_chain(&self, index: usize, chain: &[Compound]) -> bool {
        let (last, prefix) = match chain.split_last() {
            Some(split) => split,
            None => return false,
        };
        if !compound_matches(&self.nodes[index], last) {
            return false;
        }
        let mut needed = prefix;
        let mut cursor = self.nodes[index].parent;
        while let Some(parent) = cursor {
            if needed.is_empty() {
                break;
            }
            if let Some((next, rest)) = needed.split_last() {
                if compound_matches(&self.nodes[parent], next) {
                    needed = rest;
                }
            }
            cursor = self.nodes[parent].parent;
        }
        needed.is_empty()
    }

    fn css_find(&self, selector: &str, include_detached: bool) -> Result<Vec<usize>> {
        let chain = parse_selector(selector)?;
        Ok((0..self.nodes.len())
            .filter(|&index| include_detached || self.is_attached(index))
            .filter(|&index| self.matches_chain(index, &chain))
            .collect())
    }

    fn xpath_find(&self, selector: &str) -> Result<Vec<usize>> {
        if let Some(css) = self.xpath.get(selector) {
            let css = css.clone();
            return self.css_find(&css, false);
        }
        if selector.starts_with('/') || selector.starts_with('(') {
            return Ok(Vec::new());
        }
        Err(invalid(selector, "not a valid xpath expression"))
    }

    /// Tolerant lookup for test mutators: parse failures match nothing.
    fn matches(&self, selector: &str, include_detached: bool) -> Vec<usize> {
        self.css_find(selector, include_detached).unwrap_or_default()
    }

    fn first_match(&self, selector: &str) -> Option<usize> {
        self.matches(selector, false).into_iter().next()
    }

    fn record(&mut self, index: usize, event: &str) {
        self.events.push((index, event.to_string()));
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Node = MockNode;

    async fn find_one(&self, kind: SelectorKind, selector: &str) -> Result<Option<Self::Node>> {
        let state = self.state.lock().await;
        let found = match kind {
            SelectorKind::XPath => state.xpath_find(selector)?,
            _ => state.css_find(selector, false)?,
        };
        Ok(found.into_iter().next().map(MockNode))
    }

    async fn find_all(&self, kind: SelectorKind, selector: &str) -> Result<Vec<Self::Node>> {
        let state = self.state.lock().await;
        let found = match kind {
            SelectorKind::XPath => state.xpath_find(selector)?,
            _ => state.css_find(selector, false)?,
        };
        Ok(found.into_iter().map(MockNode).collect())
    }

    async fn is_visible(&self, node: &Self::Node) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.is_attached(node.0) && state.nodes[node.0].visible)
    }

    async fn text(&self, node: &Self::Node, raw: bool) -> Result<String> {
        let state = self.state.lock().await;
        let data = &state.nodes[node.0];
        Ok(if raw { data.html.clone() } else { data.text.clone() })
    }

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Value> {
        let state = self.state.lock().await;
        Ok(state.nodes[node.0]
            .attributes
            .get(name)
            .map(|value| Value::String(value.clone()))
            .unwrap_or(Value::Null))
    }

    async fn set_attribute(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        let attributes = &mut state.nodes[node.0].attributes;
        match value {
            Value::Null => {
                attributes.remove(name);
            }
            Value::String(text) => {
                attributes.insert(name.to_string(), text.clone());
            }
            other => {
                attributes.insert(name.to_string(), other.to_string());
            }
        }
        Ok(())
    }

    async fn property(&self, node: &Self::Node, name: &str) -> Result<Value> {
        let state = self.state.lock().await;
        Ok(state.nodes[node.0]
            .properties
            .get(name)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn set_property(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.nodes[node.0]
            .properties
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn dispatch_event(
        &self,
        node: &Self::Node,
        event: &str,
        _event_type: Option<&str>,
        _options: Option<&Value>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, event);
        Ok(())
    }

    async fn click(&self, node: &Self::Node) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, "click");
        Ok(())
    }

    async fn double_click(&self, node: &Self::Node) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, "dblclick");
        Ok(())
    }

    async fn send_keys(&self, node: &Self::Node, text: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, "input");
        let properties = &mut state.nodes[node.0].properties;
        let current = properties
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        properties.insert("value".to_string(), Value::String(current + text));
        Ok(())
    }

    async fn clear(&self, node: &Self::Node) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, "input");
        state.nodes[node.0]
            .properties
            .insert("value".to_string(), Value::String(String::new()));
        Ok(())
    }

    async fn scroll_into_view(&self, node: &Self::Node) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(node.0, "scroll");
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.visits.push(url.to_string());
        let current = state.current_window;
        state.windows[current].url = url.to_string();
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.refreshes += 1;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state.windows[state.current_window].url.clone())
    }

    async fn current_title(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state.windows[state.current_window].title.clone())
    }

    async fn window_handles(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.windows.iter().map(|w| w.handle.clone()).collect())
    }

    async fn current_window(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state.windows[state.current_window].handle.clone())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.windows.iter().position(|w| w.handle == handle) {
            Some(index) => {
                state.current_window = index;
                Ok(())
            }
            None => Err(PageError::WindowNotFound(format!(
                "no window with handle {:?}",
                handle
            ))),
        }
    }

    async fn switch_to_frame(&self, node: &Self::Node) -> Result<()> {
        let mut state = self.state.lock().await;
        state.frame_ctx = Some(node.0);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(PNG_MAGIC.to_vec())
    }

    async fn console_dump(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state.console.clone())
    }
}
