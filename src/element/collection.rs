//! Collection selector target.

use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::controller::Session;
use crate::driver::Driver;
use crate::element::check::Checks;
use crate::errors::{PageError, Result};
use crate::template::{substitute, TemplateParams};
use crate::types::{ErrorPolicy, SelectorKind};
use crate::wait::OnError;

/// A declarative handle on an ordered set of DOM nodes.
///
/// Shares the selector/format contract of `Element`, but resolution yields
/// zero or more nodes and is recomputed on every call — the DOM mutates
/// concurrently with test execution, so counts and aggregates are never
/// cached.
pub struct Elements<D: Driver> {
    session: Session<D>,
    raw_selector: String,
    active_selector: String,
    kind: SelectorKind,
}

impl<D: Driver> Elements<D> {
    pub(crate) fn new(
        session: Session<D>,
        selector: impl Into<String>,
        kind: SelectorKind,
    ) -> Result<Self> {
        let raw_selector = selector.into();
        if raw_selector.trim().is_empty() {
            return Err(PageError::ConfigurationError(
                "elements selector must not be empty".to_string(),
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

    /// Substitute placeholders into the selector template. Same policy as
    /// `Element::format`: recomputed from the raw template, persistent
    /// until reformatted.
    pub fn format(&mut self, params: &TemplateParams) -> &mut Self {
        self.active_selector = substitute(&self.raw_selector, params);
        self
    }

    /// Resolve every matching node, in document order. Empty, never absent.
    pub async fn resolve_all(&self) -> Result<Vec<D::Node>> {
        for kind in self.kind.resolution_order() {
            match self
                .session
                .driver()
                .find_all(*kind, &self.active_selector)
                .await
            {
                Ok(nodes) if !nodes.is_empty() => return Ok(nodes),
                Ok(_) => {}
                Err(PageError::InvalidSelector { .. }) if self.kind == SelectorKind::Auto => {
                    debug!(selector = %self.active_selector, strategy = ?kind, "selector rejected, trying next strategy");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Vec::new())
    }

    /// Live element count, recomputed on every call.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.resolve_all().await?.len())
    }

    pub fn checks(&self) -> Checks<'_, D> {
        Checks::new(self)
    }

    /// Text of every resolved element, order preserved.
    pub async fn texts(&self, raw: bool) -> Result<Vec<String>> {
        let driver = self.session.driver();
        let mut collected = Vec::new();
        for node in self.resolve_all().await? {
            collected.push(driver.text(&node, raw).await?);
        }
        Ok(collected)
    }

    /// Input value of every resolved element.
    pub async fn values(&self) -> Result<Vec<String>> {
        let driver = self.session.driver();
        let mut collected = Vec::new();
        for node in self.resolve_all().await? {
            let value = driver.property(&node, "value").await?;
            collected.push(match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            });
        }
        Ok(collected)
    }

    pub async fn attributes(&self, name: &str) -> Result<Vec<Value>> {
        let driver = self.session.driver();
        let mut collected = Vec::new();
        for node in self.resolve_all().await? {
            collected.push(driver.attribute(&node, name).await?);
        }
        Ok(collected)
    }

    /// Set an attribute on every resolved element. An absent collection is
    /// a no-op, not an error.
    pub async fn set_attributes(&self, name: &str, value: &Value) -> Result<&Self> {
        let driver = self.session.driver();
        for node in self.resolve_all().await? {
            driver.set_attribute(&node, name, value).await?;
        }
        Ok(self)
    }

    pub async fn properties(&self, name: &str) -> Result<Vec<Value>> {
        let driver = self.session.driver();
        let mut collected = Vec::new();
        for node in self.resolve_all().await? {
            collected.push(driver.property(&node, name).await?);
        }
        Ok(collected)
    }

    pub async fn set_properties(&self, name: &str, value: &Value) -> Result<&Self> {
        let driver = self.session.driver();
        for node in self.resolve_all().await? {
            driver.set_property(&node, name, value).await?;
        }
        Ok(self)
    }

    /// Wait for the collection to reach `length` elements.
    ///
    /// `strict` demands exactly `length`; otherwise at least `length`.
    pub async fn wait_for_count(
        &self,
        timeout: u32,
        length: usize,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(
                timeout,
                move || async move {
                    let count = self.count().await?;
                    Ok(if strict { count == length } else { count >= length })
                },
                false,
                OnError::Swallow,
            )
            .await?;
        if met {
            return Ok(Some(self));
        }
        let found = self.count().await.unwrap_or(0);
        self.fail(
            policy,
            PageError::NotFound,
            format!(
                "{:?} elements by selector {:?} found, expected {:?}",
                found, self.active_selector, length
            ),
            length,
            found,
        )
    }

    /// Wait for the count gate and all-member visibility to hold on the
    /// same tick.
    pub async fn wait_visible(
        &self,
        timeout: u32,
        length: usize,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(
                timeout,
                move || async move {
                    let count = self.count().await?;
                    let gate = if strict { count == length } else { count >= length };
                    Ok(gate && self.checks().visible().await?)
                },
                false,
                OnError::Swallow,
            )
            .await?;
        if met {
            return Ok(Some(self));
        }
        let found = self.count().await.unwrap_or(0);
        self.fail(
            policy,
            PageError::NotVisible,
            format!(
                "{} elements by selector {:?} not visible",
                length, self.active_selector
            ),
            length,
            found,
        )
    }

    pub async fn wait_invisible(
        &self,
        timeout: u32,
        length: usize,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(
                timeout,
                move || async move {
                    let count = self.count().await?;
                    let gate = if strict { count == length } else { count >= length };
                    Ok(gate && self.checks().invisible().await?)
                },
                false,
                OnError::Swallow,
            )
            .await?;
        if met {
            return Ok(Some(self));
        }
        let found = self.count().await.unwrap_or(0);
        self.fail(
            policy,
            PageError::StillVisible,
            format!(
                "{} elements by selector {:?} not invisible",
                length, self.active_selector
            ),
            length,
            found,
        )
    }

    pub async fn wait_enabled(
        &self,
        timeout: u32,
        length: usize,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(
                timeout,
                move || async move {
                    let count = self.count().await?;
                    let gate = if strict { count == length } else { count >= length };
                    Ok(gate && self.checks().enabled().await?)
                },
                false,
                OnError::Swallow,
            )
            .await?;
        if met {
            return Ok(Some(self));
        }
        let found = self.count().await.unwrap_or(0);
        self.fail(
            policy,
            PageError::InvalidState,
            format!(
                "{} elements by selector {:?} not enabled",
                length, self.active_selector
            ),
            length,
            found,
        )
    }

    pub async fn wait_disabled(
        &self,
        timeout: u32,
        length: usize,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<Option<&Self>> {
        let met = self
            .session
            .engine()
            .wait_until(
                timeout,
                move || async move {
                    let count = self.count().await?;
                    let gate = if strict { count == length } else { count >= length };
                    Ok(gate && self.checks().disabled().await?)
                },
                false,
                OnError::Swallow,
            )
            .await?;
        if met {
            return Ok(Some(self));
        }
        let found = self.count().await.unwrap_or(0);
        self.fail(
            policy,
            PageError::InvalidState,
            format!(
                "{} elements by selector {:?} not disabled",
                length, self.active_selector
            ),
            length,
            found,
        )
    }

    fn fail(
        &self,
        policy: ErrorPolicy,
        kind: fn(String) -> PageError,
        default_message: String,
        expected: usize,
        found: usize,
    ) -> Result<Option<&Self>> {
        match policy.resolve(default_message, &expected.to_string(), &found.to_string()) {
            Some(message) => Err(kind(message)),
            None => Ok(None),
        }
    }
}

impl<D: Driver> Clone for Elements<D> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            raw_selector: self.raw_selector.clone(),
            active_selector: self.active_selector.clone(),
            kind: self.kind,
        }
    }
}

impl<D: Driver> fmt::Debug for Elements<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elements")
            .field("raw_selector", &self.raw_selector)
            .field("active_selector", &self.active_selector)
            .field("kind", &self.kind)
            .finish()
    }
}
