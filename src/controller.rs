//! Session sharing, the controller orchestrator, and component scoping.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::driver::Driver;
use crate::element::{Element, Elements};
use crate::errors::{PageError, Result};
use crate::group::GroupBuilder;
use crate::resource::Resource;
use crate::types::{ErrorPolicy, SelectorKind};
use crate::wait::{OnError, SyncConfig, SyncEngine};

/// Cheaply-cloned handle on the shared driver and wait engine.
///
/// Every selector target holds one; the controller holds one and no
/// registry of targets, so there is no ownership cycle between components
/// and the session they resolve through.
pub struct Session<D: Driver> {
    inner: Arc<SessionInner<D>>,
}

struct SessionInner<D: Driver> {
    driver: D,
    engine: SyncEngine,
    id: String,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, SyncConfig::default())
    }

    pub fn with_config(driver: D, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                driver,
                engine: SyncEngine::new(config),
                id: uuid::Uuid::new_v4().to_string(),
            }),
        }
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Declare a single-element target with the default resolution kind.
    pub fn element(&self, selector: impl Into<String>) -> Result<Element<D>> {
        Element::new(self.clone(), selector, SelectorKind::default())
    }

    pub fn element_by(
        &self,
        selector: impl Into<String>,
        kind: SelectorKind,
    ) -> Result<Element<D>> {
        Element::new(self.clone(), selector, kind)
    }

    /// Declare a collection target with the default resolution kind.
    pub fn elements(&self, selector: impl Into<String>) -> Result<Elements<D>> {
        Elements::new(self.clone(), selector, SelectorKind::default())
    }

    pub fn elements_by(
        &self,
        selector: impl Into<String>,
        kind: SelectorKind,
    ) -> Result<Elements<D>> {
        Elements::new(self.clone(), selector, kind)
    }

    pub fn group(&self) -> GroupBuilder<D> {
        GroupBuilder::new(self.clone(), None)
    }

    /// A component scope whose children resolve under `root`.
    pub fn component(&self, root: impl Into<String>) -> Component<D> {
        let root = root.into();
        Component {
            session: self.clone(),
            root: if root.trim().is_empty() { None } else { Some(root) },
        }
    }

    pub async fn pause(&self, ticks: u32) {
        self.inner.engine.pause(ticks).await;
    }
}

impl<D: Driver> Clone for Session<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A reusable page region: a root selector prefixed onto every child
/// target declared through it.
pub struct Component<D: Driver> {
    session: Session<D>,
    root: Option<String>,
}

impl<D: Driver> Component<D> {
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn session(&self) -> &Session<D> {
        &self.session
    }

    pub fn element(&self, selector: &str) -> Result<Element<D>> {
        Element::new(
            self.session.clone(),
            self.scoped(selector),
            SelectorKind::default(),
        )
    }

    pub fn elements(&self, selector: &str) -> Result<Elements<D>> {
        Elements::new(
            self.session.clone(),
            self.scoped(selector),
            SelectorKind::default(),
        )
    }

    pub fn group(&self) -> GroupBuilder<D> {
        GroupBuilder::new(self.session.clone(), self.root.clone())
    }

    fn scoped(&self, selector: &str) -> String {
        match self.root.as_deref() {
            Some(root) => format!("{} {}", root, selector),
            None => selector.to_string(),
        }
    }
}

/// Owns the session, the navigation base url, the environment bag, and the
/// logging span for one browser session.
pub struct Controller<D: Driver> {
    session: Session<D>,
    base_url: Url,
    env: Resource,
    span: tracing::Span,
}

impl<D: Driver> std::fmt::Debug for Controller<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("base_url", &self.base_url)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Controller<D> {
    pub fn new(driver: D, base_url: &str) -> Result<Self> {
        Self::with_env(driver, base_url, Resource::new())
    }

    pub fn with_env(driver: D, base_url: &str, env: Resource) -> Result<Self> {
        Self::from_session(Session::new(driver), base_url, env)
    }

    pub fn from_session(session: Session<D>, base_url: &str, env: Resource) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PageError::ConfigurationError(format!("invalid base url {:?}: {}", base_url, e))
        })?;
        let span = tracing::info_span!("controller", session = %session.id());
        Ok(Self {
            session,
            base_url,
            env,
            span,
        })
    }

    pub fn session(&self) -> &Session<D> {
        &self.session
    }

    pub fn env(&self) -> &Resource {
        &self.env
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn element(&self, selector: impl Into<String>) -> Result<Element<D>> {
        self.session.element(selector)
    }

    pub fn elements(&self, selector: impl Into<String>) -> Result<Elements<D>> {
        self.session.elements(selector)
    }

    pub fn group(&self) -> GroupBuilder<D> {
        self.session.group()
    }

    pub fn component(&self, root: impl Into<String>) -> Component<D> {
        self.session.component(root)
    }

    /// Navigate to the base url.
    pub async fn open(&self) -> Result<()> {
        info!(parent: &self.span, url = %self.base_url, "opening base url");
        self.session.driver().goto(self.base_url.as_str()).await
    }

    /// Navigate to a route resolved against the base url.
    pub async fn navigate(&self, route: &str) -> Result<()> {
        let url = self.base_url.join(route).map_err(|e| {
            PageError::ConfigurationError(format!("invalid route {:?}: {}", route, e))
        })?;
        info!(parent: &self.span, url = %url, "navigating");
        self.session.driver().goto(url.as_str()).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.session.driver().refresh().await
    }

    /// Current url of the focused window.
    pub async fn location(&self) -> Result<String> {
        self.session.driver().current_url().await
    }

    /// Current title of the focused window.
    pub async fn title(&self) -> Result<String> {
        self.session.driver().current_title().await
    }

    /// Check (or poll for) the current location.
    ///
    /// `strict` requires equality; otherwise containment. A `timeout` of
    /// zero evaluates once without polling.
    pub async fn is_location(
        &self,
        route: &str,
        timeout: u32,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<bool> {
        let met = if timeout == 0 {
            self.location_matches(route, strict).await?
        } else {
            self.session
                .engine()
                .wait_until(
                    timeout,
                    || self.location_matches(route, strict),
                    false,
                    OnError::Swallow,
                )
                .await?
        };
        if met {
            return Ok(true);
        }
        let found = self.location().await.unwrap_or_default();
        match policy.resolve(
            format!(
                "Location {:?} was not matched, instead found {:?}",
                route, found
            ),
            route,
            &found,
        ) {
            Some(message) => Err(PageError::LocationMismatch(message)),
            None => Ok(false),
        }
    }

    /// Like `is_location`, satisfied by any of `routes`.
    pub async fn is_location_any(
        &self,
        routes: &[&str],
        timeout: u32,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<bool> {
        let met = if timeout == 0 {
            self.any_location_matches(routes, strict).await?
        } else {
            self.session
                .engine()
                .wait_until(
                    timeout,
                    || self.any_location_matches(routes, strict),
                    false,
                    OnError::Swallow,
                )
                .await?
        };
        if met {
            return Ok(true);
        }
        let found = self.location().await.unwrap_or_default();
        match policy.resolve(
            format!(
                "None of {:?} matched the location, instead found {:?}",
                routes, found
            ),
            &routes.join(", "),
            &found,
        ) {
            Some(message) => Err(PageError::LocationMismatch(message)),
            None => Ok(false),
        }
    }

    async fn location_matches(&self, route: &str, strict: bool) -> Result<bool> {
        let location = self.location().await?;
        Ok(if strict {
            location == route
        } else {
            location.contains(route)
        })
    }

    async fn any_location_matches(&self, routes: &[&str], strict: bool) -> Result<bool> {
        let location = self.location().await?;
        Ok(routes.iter().any(|route| {
            if strict {
                location == *route
            } else {
                location.contains(route)
            }
        }))
    }

    /// Switch to the window whose title matches.
    ///
    /// The search serializes through the session and probes every handle;
    /// on failure the originating window is restored so the session is
    /// left in a deterministic context.
    pub async fn window_by_title(
        &self,
        title: &str,
        timeout: u32,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<bool> {
        self.window_search(title, true, timeout, strict, policy).await
    }

    /// Switch to the window whose url matches.
    pub async fn window_by_location(
        &self,
        location: &str,
        timeout: u32,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<bool> {
        self.window_search(location, false, timeout, strict, policy)
            .await
    }

    async fn window_search(
        &self,
        needle: &str,
        by_title: bool,
        timeout: u32,
        strict: bool,
        policy: ErrorPolicy,
    ) -> Result<bool> {
        let driver = self.session.driver();
        let origin = driver.current_window().await?;
        let result = if timeout == 0 {
            self.probe_windows(needle, by_title, strict).await
        } else {
            self.session
                .engine()
                .wait_until(
                    timeout,
                    || self.probe_windows(needle, by_title, strict),
                    false,
                    OnError::Swallow,
                )
                .await
        };
        match result {
            Ok(true) => {
                info!(parent: &self.span, needle, by_title, "window switch succeeded");
                Ok(true)
            }
            Ok(false) => {
                driver.switch_to_window(&origin).await?;
                let found = if by_title {
                    driver.current_title().await.unwrap_or_default()
                } else {
                    driver.current_url().await.unwrap_or_default()
                };
                let what = if by_title { "title" } else { "location" };
                match policy.resolve(
                    format!(
                        "Window by {} {:?} not found, found {:?}",
                        what, needle, found
                    ),
                    needle,
                    &found,
                ) {
                    Some(message) => Err(PageError::WindowNotFound(message)),
                    None => Ok(false),
                }
            }
            Err(err) => {
                if let Err(restore) = driver.switch_to_window(&origin).await {
                    warn!(parent: &self.span, error = %restore, "could not restore originating window");
                }
                Err(err)
            }
        }
    }

    async fn probe_windows(&self, needle: &str, by_title: bool, strict: bool) -> Result<bool> {
        let driver = self.session.driver();
        for handle in driver.window_handles().await? {
            driver.switch_to_window(&handle).await?;
            let haystack = if by_title {
                driver.current_title().await?
            } else {
                driver.current_url().await?
            };
            let hit = if strict {
                haystack == needle
            } else {
                haystack.contains(needle)
            };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Generic condition wait through the session engine.
    pub async fn wait_until<F, Fut>(
        &self,
        timeout: u32,
        condition: F,
        reverse: bool,
        on_error: OnError,
    ) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.session
            .engine()
            .wait_until(timeout, condition, reverse, on_error)
            .await
    }

    /// Plain fixed delay of `ticks` ticks.
    pub async fn pause(&self, ticks: u32) {
        self.session.pause(ticks).await;
    }

    /// Capture a screenshot into `dir`, named by prefix and timestamp.
    pub async fn screen_shot(&self, prefix: Option<&str>, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let bytes = self.session.driver().screenshot().await?;
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let name = match prefix {
            Some(prefix) => format!("{}_{}.png", prefix, stamp),
            None => format!("{}.png", stamp),
        };
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        info!(parent: &self.span, path = %path.display(), "screenshot saved");
        Ok(path)
    }

    /// Dump captured console output into `dir` as a json file.
    pub async fn browser_logs(&self, name: Option<&str>, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dump = self.session.driver().console_dump().await?;
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let file = match name {
            Some(name) => format!("console.{}.{}.json", name, stamp),
            None => format!("console.{}.json", stamp),
        };
        let path = dir.join(file);
        tokio::fs::write(&path, dump).await?;
        info!(parent: &self.span, path = %path.display(), "console log saved");
        Ok(path)
    }

    /// Close out the session.
    pub fn exit(self) {
        info!(parent: &self.span, "session closed");
    }
}
