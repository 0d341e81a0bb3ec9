//! Single-node selector target.

use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

use crate::controller::Session;
use crate::driver::Driver;
use crate::element::check::Check;
use crate::errors::{PageError, Result};
use crate::template::{substitute, TemplateParams};
use crate::types::{ErrorPolicy, SelectorKind};
use crate::wait::OnError;

/// A declarative handle on at most one DOM node.
///
/// The element is a description, not a live handle: every operation
/// resolves the selector against the current document through the session
/// driver. `raw_selector` is the immutable template; `active_selector` is
/// what actually gets resolved and persists until the next `format` call.
pub struct Element<D: Driver> {
    session: Session<D>,
    raw_selector: String,
    active_selector: String,
    kind: SelectorKind,
}

impl<D: Driver> Element<D> {
    pub(crate) fn new(
        session: Session<D>,
        selector: impl Into<String>,
        kind: SelectorKind,
    ) -> Result<Self> {
        let raw_selector = selector.into();
        if raw_selector.trim().is_empty() {
            return Err(PageError::ConfigurationError(
                "element selector must not be empty".to_string(),
            ));
        }
        Ok(Self {
            session,
            active_selector: raw_selector.clone(),
            raw_selector,
            kind,
        })
    }

    pub fn selector(&self) -> &str {
        &self.active_selector
    }

    pub fn raw_selector(&self) -> &str {
        &self.raw_selector
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub(crate) fn session(&self) -> &Session<D> {
        &self.session
    }

    /// Substitute placeholders into the selector template.
    ///
    /// The active selector is recomputed from the raw template, so
    /// formatting with the same parameters is idempotent and the result
    /// persists until the next `format` call. Unresolved placeholders stay
    /// verbatim.
    pub fn format(&mut self, params: &TemplateParams) -> &mut Self {
        self.active_selector = substitute(&self.raw_selector, params);
        self
    }

    /// Resolve the live node, or `None` if nothing matches right now.
    ///
    /// Non-existence is an expected transient state during
    /// synchronization, so it is data rather than an error. Under
    /// `SelectorKind::Auto` an invalid-selector rejection falls through to
    /// the next strategy in the chain; under an explicit kind it
    /// propagates. Other driver faults always propagate.
    pub async fn resolve(&self) -> Result<Option<D::Node>> {
        for kind in self.kind.resolution_order() {
            match self
                .session
                .driver()
                .find_one(*kind, &self.active_selector)
                .await
            {
                Ok(Some(node)) => return Ok(Some(node)),
                Ok(None) => {}
                Err(PageError::InvalidSelector { .. }) if self.kind == SelectorKind::Auto => {
                    debug!(selector = %self.active_selector, strategy = ?kind, "selector rejected, trying next strategy");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    pub fn check(&self) -> Check<'_, D> {
        Check::new(self)
    }

    /// Scroll to the element and click it.
    pub async fn click(&self) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            let driver = self.session.driver();
            driver.scroll_into_view(&node).await?;
            driver.click(&node).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    pub async fn double_click(&self) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            let driver = self.session.driver();
            driver.scroll_into_view(&node).await?;
            driver.double_click(&node).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    pub async fn scroll_to(&self) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            self.session.driver().scroll_into_view(&node).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    /// Text content of the element; `raw` reads the inner HTML instead.
    pub async fn text(&self, raw: bool) -> Result<Option<String>> {
        match self.resolve().await? {
            Some(node) => Ok(Some(self.session.driver().text(&node, raw).await?)),
            None => Ok(None),
        }
    }

    /// Current input value.
    pub async fn value(&self) -> Result<Option<String>> {
        match self.resolve().await? {
            Some(node) => {
                let value = self.session.driver().property(&node, "value").await?;
                Ok(Some(match value {
                    Value::String(text) => text,
                    Value::Null => String::new(),
                    other => other.to_string(),
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<Value>> {
        match self.resolve().await? {
            Some(node) => Ok(Some(self.session.driver().attribute(&node, name).await?)),
            None => Ok(None),
        }
    }

    pub async fn set_attribute(&self, name: &str, value: &Value) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            self.session.driver().set_attribute(&node, name, value).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    pub async fn property(&self, name: &str) -> Result<Option<Value>> {
        match self.resolve().await? {
            Some(node) => Ok(Some(self.session.driver().property(&node, name).await?)),
            None => Ok(None),
        }
    }

    pub async fn set_property(&self, name: &str, value: &Value) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            self.session.driver().set_property(&node, name, value).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    pub async fn dispatch_event(
        &self,
        event: &str,
        event_type: Option<&str>,
        options: Option<&Value>,
    ) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            self.session
                .driver()
                .dispatch_event(&node, event, event_type, options)
                .await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    /// Send input to the element.
    ///
    /// `force` writes the inner HTML directly, for targets without a focus
    /// handler; `clear` empties the current content first.
    pub async fn send_input(&self, value: &str, force: bool, clear: bool) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            let driver = self.session.driver();
            if force {
                let content = if clear {
                    value.to_string()
                } else {
                    format!("{}{}", driver.text(&node, true).await?, value)
                };
                driver
                    .set_property(&node, "innerHTML", &Value::String(content))
                    .await?;
            } else {
                if clear {
                    driver.clear(&node).await?;
                }
                driver.send_keys(&node, value).await?;
            }
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    /// Select an option element naturally: set the property, fire change.
    pub async fn select(&self) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            let driver = self.session.driver();
            driver.scroll_into_view(&node).await?;
            driver
                .set_property(&node, "selected", &Value::Bool(true))
                .await?;
            driver
                .dispatch_event(&node, "change", None, Some(&json!({ "bubbles": true })))
                .await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    /// Switch the session context into this iframe element.
    pub async fn switch_into(&self) -> Result<Option<&Self>> {
        if let Some(node) = self.resolve().await? {
            self.session.driver().switch_to_frame(&node).await?;
            Ok(Some(self))
        } else {
            Ok(None)
        }
    }

    /// Wait until the element resolves.
    pub async fn wait_present(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().available(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::NotFound,
            format!(
                "element by selector {:?} was not found",
                self.active_selector
            ),
            "absent",
        )
    }

    /// Wait until the element no longer resolves.
    pub async fn wait_absent(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().unavailable(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::NotFound,
            format!(
                "element by selector {:?} was still present",
                self.active_selector
            ),
            "present",
        )
    }

    pub async fn wait_visible(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().visible(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::NotVisible,
            format!(
                "element by selector {:?} was not found or is not visible",
                self.active_selector
            ),
            "invisible",
        )
    }

    pub async fn wait_invisible(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().invisible(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::StillVisible,
            format!(
                "element by selector {:?} was not found or is visible",
                self.active_selector
            ),
            "visible",
        )
    }

    pub async fn wait_enabled(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().enabled(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::InvalidState,
            format!(
                "element by selector {:?} was not found or is disabled",
                self.active_selector
            ),
            "disabled",
        )
    }

    pub async fn wait_disabled(&self, timeout: u32, policy: ErrorPolicy) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(timeout, || self.check().disabled(), false, OnError::Swallow)
            .await?;
        if met {
            return Ok(Some(self));
        }
        self.fail(
            policy,
            PageError::InvalidState,
            format!(
                "element by selector {:?} was not found or is enabled",
                self.active_selector
            ),
            "enabled",
        )
    }

    fn fail(
        &self,
        policy: ErrorPolicy,
        kind: fn(String) -> PageError,
        default_message: String,
        found: &str,
    ) -> Result<Option<&Self>> {
        match policy.resolve(default_message, &self.active_selector, found) {
            Some(message) => Err(kind(message)),
            None => Ok(None),
        }
    }
}

impl<D: Driver> Clone for Element<D> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            raw_selector: self.raw_selector.clone(),
            active_selector: self.active_selector.clone(),
            kind: self.kind,
        }
    }
}

impl<D: Driver> fmt::Debug for Element<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("raw_selector", &self.raw_selector)
            .field("active_selector", &self.active_selector)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    const PAGE: &str = r#"
        <html><body>
            <todo-task id="task-1" class="task"><h4>first</h4></todo-task>
            <todo-task id="task-2" class="task"><h4>second</h4></todo-task>
            <button id="save" class="primary">Save</button>
            <input id="title" value="draft">
        </body></html>
    "#;

    fn session() -> Session<MockDriver> {
        crate::testing::test_session(PAGE)
    }

    #[tokio::test]
    async fn resolves_existing_element() {
        let session = session();
        let button = session.element("button#save").unwrap();
        assert!(button.resolve().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_element_resolves_to_none() {
        let session = session();
        let ghost = session.element("#missing").unwrap();
        assert!(ghost.resolve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_selector_is_rejected_at_construction() {
        let session = session();
        let err = session.element("   ").unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn format_updates_active_selector_and_keeps_raw() {
        let session = session();
        let mut task = session.element("todo-task#task-${id}").unwrap();
        task.format(&TemplateParams::new().with("id", 2));
        assert_eq!(task.selector(), "todo-task#task-2");
        assert_eq!(task.raw_selector(), "todo-task#task-${id}");
        assert!(task.resolve().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn format_is_idempotent_and_persists_until_reformatted() {
        let session = session();
        let mut task = session.element("todo-task#task-${id}").unwrap();
        task.format(&TemplateParams::new().with("id", 1));
        task.format(&TemplateParams::new().with("id", 1));
        assert_eq!(task.selector(), "todo-task#task-1");
        // a resolution does not reset the formatted selector
        let _ = task.resolve().await.unwrap();
        assert_eq!(task.selector(), "todo-task#task-1");
        task.format(&TemplateParams::new().with("id", 2));
        assert_eq!(task.selector(), "todo-task#task-2");
    }

    #[tokio::test]
    async fn format_to_missing_id_resolves_to_none() {
        let session = session();
        let mut task = session.element("todo-task#task-${id}").unwrap();
        task.format(&TemplateParams::new().with("id", 999));
        assert!(task.resolve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn click_scrolls_then_clicks_and_returns_self() {
        let session = session();
        let button = session.element("#save").unwrap();
        assert!(button.click().await.unwrap().is_some());
        let events = session.driver().event_names("#save").await;
        assert_eq!(events, vec!["scroll".to_string(), "click".to_string()]);
    }

    #[tokio::test]
    async fn click_on_missing_element_returns_none() {
        let session = session();
        let ghost = session.element("#missing").unwrap();
        assert!(ghost.click().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_text_value_and_attributes() {
        let session = session();
        let task = session.element("todo-task#task-1 h4").unwrap();
        assert_eq!(task.text(false).await.unwrap(), Some("first".to_string()));

        let input = session.element("#title").unwrap();
        assert_eq!(input.value().await.unwrap(), Some("draft".to_string()));

        let button = session.element("#save").unwrap();
        let class = button.attribute("class").await.unwrap().unwrap();
        assert_eq!(class, Value::String("primary".to_string()));
        assert_eq!(
            session.element("#missing").unwrap().text(false).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn send_input_appends_and_clear_resets() {
        let session = session();
        let input = session.element("#title").unwrap();
        input.send_input("new title", false, true).await.unwrap();
        assert_eq!(input.value().await.unwrap(), Some("new title".to_string()));
        input.send_input("!", false, false).await.unwrap();
        assert_eq!(input.value().await.unwrap(), Some("new title!".to_string()));
    }

    #[tokio::test]
    async fn wait_present_raises_not_found_with_selector_in_message() {
        let session = session();
        let mut task = session.element("todo-task#task-${id}").unwrap();
        task.format(&TemplateParams::new().with("id", 999));
        let err = task.wait_present(1, ErrorPolicy::Raise).await.unwrap_err();
        assert!(matches!(err, PageError::NotFound(_)));
        assert!(err.to_string().contains("todo-task#task-999"));
    }

    #[tokio::test]
    async fn wait_present_silent_returns_none_on_timeout() {
        let session = session();
        let ghost = session.element("#missing").unwrap();
        assert!(ghost
            .wait_present(1, ErrorPolicy::Silent)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn wait_present_succeeds_immediately_for_existing_element() {
        let session = session();
        let button = session.element("#save").unwrap();
        assert!(button
            .wait_present(1, ErrorPolicy::Raise)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn wait_absent_succeeds_for_missing_and_fails_for_present() {
        let session = session();
        assert!(session
            .element("#missing")
            .unwrap()
            .wait_absent(1, ErrorPolicy::Raise)
            .await
            .unwrap()
            .is_some());
        let err = session
            .element("#save")
            .unwrap()
            .wait_absent(1, ErrorPolicy::Raise)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still present"));
    }

    #[tokio::test]
    async fn wait_visible_respects_visibility_state() {
        let session = session();
        session.driver().set_visible("#save", false).await;
        let button = session.element("#save").unwrap();
        let err = button.wait_visible(1, ErrorPolicy::Raise).await.unwrap_err();
        assert!(matches!(err, PageError::NotVisible(_)));
        assert!(button
            .wait_invisible(1, ErrorPolicy::Raise)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn custom_error_template_substitutes_expected_and_found() {
        let session = session();
        let ghost = session.element("#missing").unwrap();
        let err = ghost
            .wait_present(
                1,
                ErrorPolicy::RaiseWith("wanted ${expected} but it was ${found}".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "wanted #missing but it was absent"
        );
    }

    #[tokio::test]
    async fn xpath_fallback_resolves_under_auto() {
        let session = session();
        session
            .driver()
            .register_xpath("//button[@id='save']", "#save")
            .await;
        let button = session.element("//button[@id='save']").unwrap();
        assert!(button.resolve().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn explicit_css_kind_propagates_invalid_selector() {
        let session = session();
        let bad = session
            .element_by("//not-css", SelectorKind::Css)
            .unwrap();
        let err = bad.resolve().await.unwrap_err();
        assert!(matches!(err, PageError::InvalidSelector { .. }));
    }
}
