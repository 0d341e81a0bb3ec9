//! Stateless predicates over selector targets.
//!
//! A check is a borrowed view bound to exactly one target; evaluating it
//! performs a fresh resolution and never mutates selector state. The state
//! predicates (visible/invisible, enabled/disabled) require existence:
//! a node that does not resolve is neither, and the predicate is false.

use serde_json::Value;

use crate::driver::Driver;
use crate::element::collection::Elements;
use crate::element::single::Element;
use crate::errors::Result;

/// JS-style truthiness for property values crossing the driver boundary.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Predicates for a single element.
pub struct Check<'a, D: Driver> {
    element: &'a Element<D>,
}

impl<'a, D: Driver> Clone for Check<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: Driver> Copy for Check<'a, D> {}

impl<'a, D: Driver> Check<'a, D> {
    pub(crate) fn new(element: &'a Element<D>) -> Self {
        Self { element }
    }

    /// The element resolves to a node.
    pub async fn available(self) -> Result<bool> {
        Ok(self.element.resolve().await?.is_some())
    }

    /// The element does not resolve.
    pub async fn unavailable(self) -> Result<bool> {
        Ok(self.element.resolve().await?.is_none())
    }

    /// The element resolves and is rendered visible.
    pub async fn visible(self) -> Result<bool> {
        match self.element.resolve().await? {
            Some(node) => self.element.session().driver().is_visible(&node).await,
            None => Ok(false),
        }
    }

    /// The element resolves but is not rendered visible.
    ///
    /// Distinct from `unavailable`: an invisible element still exists in
    /// the DOM.
    pub async fn invisible(self) -> Result<bool> {
        match self.element.resolve().await? {
            Some(node) => Ok(!self.element.session().driver().is_visible(&node).await?),
            None => Ok(false),
        }
    }

    pub async fn enabled(self) -> Result<bool> {
        match self.element.resolve().await? {
            Some(node) => {
                let disabled = self
                    .element
                    .session()
                    .driver()
                    .property(&node, "disabled")
                    .await?;
                Ok(!truthy(&disabled))
            }
            None => Ok(false),
        }
    }

    pub async fn disabled(self) -> Result<bool> {
        match self.element.resolve().await? {
            Some(node) => {
                let disabled = self
                    .element
                    .session()
                    .driver()
                    .property(&node, "disabled")
                    .await?;
                Ok(truthy(&disabled))
            }
            None => Ok(false),
        }
    }
}

/// All-or-nothing predicates for a collection.
///
/// Every predicate requires a non-empty resolution: an empty collection is
/// never vacuously visible, invisible, enabled, or disabled. "No elements"
/// must not be mistaken for "satisfied".
pub struct Checks<'a, D: Driver> {
    elements: &'a Elements<D>,
}

impl<'a, D: Driver> Clone for Checks<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: Driver> Copy for Checks<'a, D> {}

impl<'a, D: Driver> Checks<'a, D> {
    pub(crate) fn new(elements: &'a Elements<D>) -> Self {
        Self { elements }
    }

    /// At least one element resolves.
    pub async fn available(self) -> Result<bool> {
        Ok(!self.elements.resolve_all().await?.is_empty())
    }

    /// Nothing resolves.
    pub async fn unavailable(self) -> Result<bool> {
        Ok(self.elements.resolve_all().await?.is_empty())
    }

    pub async fn visible(self) -> Result<bool> {
        let found = self.elements.resolve_all().await?;
        if found.is_empty() {
            return Ok(false);
        }
        let driver = self.elements.session().driver();
        for node in &found {
            if !driver.is_visible(node).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn invisible(self) -> Result<bool> {
        let found = self.elements.resolve_all().await?;
        if found.is_empty() {
            return Ok(false);
        }
        let driver = self.elements.session().driver();
        for node in &found {
            if driver.is_visible(node).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn enabled(self) -> Result<bool> {
        let found = self.elements.resolve_all().await?;
        if found.is_empty() {
            return Ok(false);
        }
        let driver = self.elements.session().driver();
        for node in &found {
            if truthy(&driver.property(node, "disabled").await?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn disabled(self) -> Result<bool> {
        let found = self.elements.resolve_all().await?;
        if found.is_empty() {
            return Ok(false);
        }
        let driver = self.elements.session().driver();
        for node in &found {
            if !truthy(&driver.property(node, "disabled").await?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_session, MockDriver};
    use serde_json::json;

    const PAGE: &str = r#"
        <html><body>
            <button id="go">Go</button>
            <button id="stop" disabled>Stop</button>
            <div id="hidden-note" style="display:none">psst</div>
            <ul>
                <li class="item">one</li>
                <li class="item">two</li>
                <li class="item">three</li>
            </ul>
        </body></html>
    "#;

    #[tokio::test]
    async fn availability_tracks_resolution() {
        let session = test_session(PAGE);
        let go = session.element("#go").unwrap();
        assert!(go.check().available().await.unwrap());
        assert!(!go.check().unavailable().await.unwrap());

        let ghost = session.element("#missing").unwrap();
        assert!(!ghost.check().available().await.unwrap());
        assert!(ghost.check().unavailable().await.unwrap());
    }

    #[tokio::test]
    async fn invisible_requires_existence() {
        let session = test_session(PAGE);
        let note = session.element("#hidden-note").unwrap();
        assert!(note.check().invisible().await.unwrap());
        assert!(!note.check().visible().await.unwrap());

        // a missing element is neither visible nor invisible
        let ghost = session.element("#missing").unwrap();
        assert!(!ghost.check().visible().await.unwrap());
        assert!(!ghost.check().invisible().await.unwrap());
    }

    #[tokio::test]
    async fn enabled_and_disabled_require_existence() {
        let session = test_session(PAGE);
        assert!(session.element("#go").unwrap().check().enabled().await.unwrap());
        assert!(session.element("#stop").unwrap().check().disabled().await.unwrap());

        let ghost = session.element("#missing").unwrap();
        assert!(!ghost.check().enabled().await.unwrap());
        assert!(!ghost.check().disabled().await.unwrap());
    }

    #[tokio::test]
    async fn disabling_a_node_flips_only_the_state_predicates() {
        let session = test_session(PAGE);
        let go = session.element("#go").unwrap();
        assert!(go.check().enabled().await.unwrap());
        assert!(!go.check().disabled().await.unwrap());

        session
            .driver()
            .set_property_for("#go", "disabled", json!(true))
            .await;

        assert!(!go.check().enabled().await.unwrap());
        assert!(go.check().disabled().await.unwrap());
        // existence and visibility are untouched
        assert!(go.check().available().await.unwrap());
        assert!(go.check().visible().await.unwrap());
    }

    #[tokio::test]
    async fn empty_collection_fails_closed() {
        let session = test_session(PAGE);
        let none: crate::Elements<MockDriver> = session.elements(".nothing").unwrap();
        assert!(!none.checks().visible().await.unwrap());
        assert!(!none.checks().invisible().await.unwrap());
        assert!(!none.checks().enabled().await.unwrap());
        assert!(!none.checks().disabled().await.unwrap());
        assert!(none.checks().unavailable().await.unwrap());
    }

    #[tokio::test]
    async fn collection_visibility_is_all_or_nothing() {
        let session = test_session(PAGE);
        let items = session.elements("li.item").unwrap();
        assert!(items.checks().visible().await.unwrap());

        session.driver().set_visible_all("li.item", false).await;
        assert!(!items.checks().visible().await.unwrap());
        assert!(items.checks().invisible().await.unwrap());

        // one visible member breaks invisibility unanimity too
        session.driver().set_visible("li.item", true).await;
        assert!(!items.checks().visible().await.unwrap());
        assert!(!items.checks().invisible().await.unwrap());
    }

    #[test]
    fn truthiness_follows_js_coercion() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("disabled")));
    }
}
