//! Headless Chrome driver.
//!
//! Element work happens through injected JavaScript against a page-side
//! node registry: resolution stores the live node under an integer id in
//! `window.__pagebind.nodes` and hands the id back as the node handle.
//! Every script returns a JSON-stringified payload so results survive the
//! evaluation boundary regardless of type. Handles are invalidated by
//! navigation, which is fine — selector targets re-resolve on every
//! operation and never cache handles.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::driver::Driver;
use crate::errors::{PageError, Result};
use crate::types::{BrowserConfig, SelectorKind};

const REGISTRY: &str =
    "var reg = window.__pagebind = window.__pagebind || { seq: 0, nodes: {}, ctx: null, logs: [], logging: false };";

/// Handle into the page-side node registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromeNode(u64);

pub struct ChromeDriver {
    browser: Browser,
    current: RwLock<Arc<Tab>>,
}

fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn lookup_statement(kind: SelectorKind, selector: &str) -> String {
    let sel = js_str(selector);
    match kind {
        SelectorKind::XPath => format!(
            "el = document.evaluate({sel}, root, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;"
        ),
        _ => format!("el = root.querySelector({sel});"),
    }
}

fn lookup_all_statement(kind: SelectorKind, selector: &str) -> String {
    let sel = js_str(selector);
    match kind {
        SelectorKind::XPath => format!(
            "var snapshot = document.evaluate({sel}, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\n\
             for (var i = 0; i < snapshot.snapshotLength; i++) {{ found.push(snapshot.snapshotItem(i)); }}"
        ),
        _ => format!(
            "var list = root.querySelectorAll({sel});\n\
             for (var i = 0; i < list.length; i++) {{ found.push(list[i]); }}"
        ),
    }
}

impl ChromeDriver {
    /// Launch a browser and open the initial tab.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );

        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| PageError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| PageError::LaunchFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| PageError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            browser,
            current: RwLock::new(tab),
        })
    }

    async fn tab(&self) -> Arc<Tab> {
        self.current.read().await.clone()
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let tab = self.tab().await;
        let result = tab
            .evaluate(script, false)
            .map_err(|e| PageError::DriverError(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    /// Evaluate a script whose last statement returns `JSON.stringify(...)`.
    async fn eval_json(&self, script: &str) -> Result<Value> {
        match self.eval(script).await? {
            Value::String(payload) => Ok(serde_json::from_str(&payload)?),
            _ => Ok(Value::Null),
        }
    }

    /// Run `body` with `el` bound to the registered node.
    async fn with_node(&self, node: &ChromeNode, body: &str) -> Result<Value> {
        let script = format!(
            r#"(function() {{
    {REGISTRY}
    var el = reg.nodes[{id}];
    if (!el) {{ return JSON.stringify({{ error: 'stale' }}); }}
    {body}
}})()"#,
            id = node.0,
        );
        let result = self.eval_json(&script).await?;
        if result.get("error").and_then(Value::as_str) == Some("stale") {
            return Err(PageError::DriverError(format!(
                "stale node handle {}",
                node.0
            )));
        }
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Patch the page console so `console_dump` has something to report.
    pub async fn capture_console(&self) -> Result<()> {
        let script = format!(
            r#"(function() {{
    {REGISTRY}
    if (reg.logging) {{ return JSON.stringify({{ value: true }}); }}
    reg.logging = true;
    ['log', 'info', 'warn', 'error'].forEach(function(level) {{
        var original = console[level];
        console[level] = function() {{
            reg.logs.push({{
                level: level,
                message: Array.prototype.slice.call(arguments).map(String).join(' ')
            }});
            original.apply(console, arguments);
        }};
    }});
    return JSON.stringify({{ value: true }});
}})()"#
        );
        self.eval_json(&script).await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    type Node = ChromeNode;

    async fn find_one(&self, kind: SelectorKind, selector: &str) -> Result<Option<Self::Node>> {
        let script = format!(
            r#"(function() {{
    {REGISTRY}
    var root = reg.ctx || document;
    var el = null;
    try {{
        {lookup}
    }} catch (err) {{
        return JSON.stringify({{ error: 'invalid-selector', message: String(err) }});
    }}
    if (!el) {{ return JSON.stringify({{ id: null }}); }}
    var id = ++reg.seq;
    reg.nodes[id] = el;
    return JSON.stringify({{ id: id }});
}})()"#,
            lookup = lookup_statement(kind, selector),
        );
        let result = self.eval_json(&script).await?;
        if result.get("error").and_then(Value::as_str) == Some("invalid-selector") {
            return Err(PageError::InvalidSelector {
                selector: selector.to_string(),
                reason: result
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("rejected by the browser")
                    .to_string(),
            });
        }
        Ok(result.get("id").and_then(Value::as_u64).map(ChromeNode))
    }

    async fn find_all(&self, kind: SelectorKind, selector: &str) -> Result<Vec<Self::Node>> {
        let script = format!(
            r#"(function() {{
    {REGISTRY}
    var root = reg.ctx || document;
    var found = [];
    try {{
        {lookup}
    }} catch (err) {{
        return JSON.stringify({{ error: 'invalid-selector', message: String(err) }});
    }}
    var ids = [];
    for (var j = 0; j < found.length; j++) {{
        var id = ++reg.seq;
        reg.nodes[id] = found[j];
        ids.push(id);
    }}
    return JSON.stringify({{ ids: ids }});
}})()"#,
            lookup = lookup_all_statement(kind, selector),
        );
        let result = self.eval_json(&script).await?;
        if result.get("error").and_then(Value::as_str) == Some("invalid-selector") {
            return Err(PageError::InvalidSelector {
                selector: selector.to_string(),
                reason: result
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("rejected by the browser")
                    .to_string(),
            });
        }
        Ok(result
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_u64)
                    .map(ChromeNode)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_visible(&self, node: &Self::Node) -> Result<bool> {
        let value = self
            .with_node(
                node,
                r#"var style = window.getComputedStyle(el);
    var visible = !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length)
        && style.visibility !== 'hidden' && style.display !== 'none';
    return JSON.stringify({ value: visible });"#,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&self, node: &Self::Node, raw: bool) -> Result<String> {
        let body = if raw {
            "return JSON.stringify({ value: el.innerHTML });"
        } else {
            "return JSON.stringify({ value: el.textContent });"
        };
        let value = self.with_node(node, body).await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Value> {
        let body = format!(
            "return JSON.stringify({{ value: el.getAttribute({}) }});",
            js_str(name)
        );
        self.with_node(node, &body).await
    }

    async fn set_attribute(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()> {
        let body = format!(
            r#"var v = {value};
    if (v === null) {{ el.removeAttribute({name}); }}
    else {{ el.setAttribute({name}, typeof v === 'string' ? v : JSON.stringify(v)); }}
    return JSON.stringify({{ value: true }});"#,
            value = value,
            name = js_str(name),
        );
        self.with_node(node, &body).await?;
        Ok(())
    }

    async fn property(&self, node: &Self::Node, name: &str) -> Result<Value> {
        let body = format!(
            r#"var v = el[{}];
    return JSON.stringify({{ value: (v === undefined ? null : v) }});"#,
            js_str(name)
        );
        self.with_node(node, &body).await
    }

    async fn set_property(&self, node: &Self::Node, name: &str, value: &Value) -> Result<()> {
        let body = format!(
            "el[{name}] = {value};\n    return JSON.stringify({{ value: true }});",
            name = js_str(name),
            value = value,
        );
        self.with_node(node, &body).await?;
        Ok(())
    }

    async fn dispatch_event(
        &self,
        node: &Self::Node,
        event: &str,
        event_type: Option<&str>,
        options: Option<&Value>,
    ) -> Result<()> {
        let ctor = match event_type {
            Some(kind) => format!("window[{}] || Event", js_str(kind)),
            None => "Event".to_string(),
        };
        let opts = options
            .map(Value::to_string)
            .unwrap_or_else(|| "{ bubbles: true }".to_string());
        let body = format!(
            "var Ctor = {ctor};\n    el.dispatchEvent(new Ctor({event}, {opts}));\n    return JSON.stringify({{ value: true }});",
            event = js_str(event),
        );
        self.with_node(node, &body).await?;
        Ok(())
    }

    async fn click(&self, node: &Self::Node) -> Result<()> {
        self.with_node(node, "el.click();\n    return JSON.stringify({ value: true });")
            .await?;
        Ok(())
    }

    async fn double_click(&self, node: &Self::Node) -> Result<()> {
        self.with_node(
            node,
            "el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true }));\n    return JSON.stringify({ value: true });",
        )
        .await?;
        Ok(())
    }

    async fn send_keys(&self, node: &Self::Node, text: &str) -> Result<()> {
        let body = format!(
            r#"el.focus();
    var current = el.value === undefined ? '' : String(el.value);
    el.value = current + {text};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return JSON.stringify({{ value: true }});"#,
            text = js_str(text),
        );
        self.with_node(node, &body).await?;
        Ok(())
    }

    async fn clear(&self, node: &Self::Node) -> Result<()> {
        self.with_node(
            node,
            r#"el.value = '';
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return JSON.stringify({ value: true });"#,
        )
        .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, node: &Self::Node) -> Result<()> {
        self.with_node(
            node,
            "el.scrollIntoView({ block: 'center' });\n    return JSON.stringify({ value: true });",
        )
        .await?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let tab = self.tab().await;
        tab.navigate_to(url)
            .map_err(|e| PageError::NavigationFailed(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| PageError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let tab = self.tab().await;
        tab.reload(false, None)
            .map_err(|e| PageError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab().await.get_url())
    }

    async fn current_title(&self) -> Result<String> {
        let value = self.eval("document.title").await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn window_handles(&self) -> Result<Vec<String>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|_| PageError::DriverError("tab registry lock poisoned".to_string()))?;
        Ok(tabs.iter().map(|tab| tab.get_target_id().to_string()).collect())
    }

    async fn current_window(&self) -> Result<String> {
        Ok(self.tab().await.get_target_id().to_string())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<()> {
        let target = {
            let tabs = self
                .browser
                .get_tabs()
                .lock()
                .map_err(|_| PageError::DriverError("tab registry lock poisoned".to_string()))?;
            tabs.iter()
                .find(|tab| tab.get_target_id() == handle)
                .cloned()
        };
        match target {
            Some(tab) => {
                debug!(handle, "switching window");
                *self.current.write().await = tab;
                Ok(())
            }
            None => Err(PageError::WindowNotFound(format!(
                "no window with handle {:?}",
                handle
            ))),
        }
    }

    async fn switch_to_frame(&self, node: &Self::Node) -> Result<()> {
        self.with_node(
            node,
            r#"if (!el.contentDocument) { return JSON.stringify({ error: 'stale' }); }
    reg.ctx = el.contentDocument;
    return JSON.stringify({ value: true });"#,
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let tab = self.tab().await;
        tab.capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )
        .map_err(|e| PageError::ScreenshotFailed(e.to_string()))
    }

    async fn console_dump(&self) -> Result<String> {
        let script = format!(
            r#"(function() {{
    {REGISTRY}
    return JSON.stringify({{ value: JSON.stringify(reg.logs) }});
}})()"#
        );
        let result = self.eval_json(&script).await?;
        Ok(result
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or("[]")
            .to_string())
    }
}
