//! Session handle over an automation capability
//!
//! A [`Session`] exclusively owns one browser connection. Read operations
//! take `&self` and navigation takes `&mut self`, so page extraction cannot
//! move the browser.

use crate::config::{AutomationConfig, CollectorConfig, PacingConfig};
use crate::error::{CollectorError, DriverError, Result};
use crate::site::SiteMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Opaque reference to an element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// Browser automation capability
#[async_trait::async_trait]
pub trait Automation: Send + Sync {
    /// Load `url` in the browser
    async fn navigate(&self, url: &str) -> std::result::Result<(), DriverError>;

    async fn current_url(&self) -> std::result::Result<String, DriverError>;

    /// Elements matching `selector`, under `scope` when given
    async fn find_elements(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> std::result::Result<Vec<ElementHandle>, DriverError>;

    /// Visible text of an element
    async fn text(&self, element: &ElementHandle) -> std::result::Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> std::result::Result<Option<String>, DriverError>;

    async fn click(&self, element: &ElementHandle) -> std::result::Result<(), DriverError>;

    async fn send_keys(
        &self,
        element: &ElementHandle,
        text: &str,
    ) -> std::result::Result<(), DriverError>;

    /// End the browser session
    async fn close(&self) -> std::result::Result<(), DriverError>;
}

/// Opens automation connections
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &AutomationConfig,
    ) -> std::result::Result<Box<dyn Automation>, DriverError>;
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, nothing loaded yet
    Open,
    /// At least one page has been loaded
    Active,
    Closed,
}

/// Exclusive owner of one automation connection
pub struct Session {
    automation: Box<dyn Automation>,
    site: Arc<SiteMap>,
    pacing: PacingConfig,
    state: SessionState,
    signed_in: bool,
    last_page_load: Option<Instant>,
    page_loads: u64,
}

impl Session {
    /// Connect through `connector`
    pub async fn open(connector: &dyn Connector, config: &CollectorConfig) -> Result<Self> {
        let automation = connector
            .connect(&config.automation)
            .await
            .map_err(|e| CollectorError::Connection(e.to_string()))?;

        let site = SiteMap::new(config.league(), config.site.clone(), config.selectors.clone());
        info!("Session opened for league {}", config.league_id);

        Ok(Self::with_automation(automation, Arc::new(site), config.pacing.clone()))
    }

    /// Wrap an already-connected automation
    pub fn with_automation(
        automation: Box<dyn Automation>,
        site: Arc<SiteMap>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            automation,
            site,
            pacing,
            state: SessionState::Open,
            signed_in: false,
            last_page_load: None,
            page_loads: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn site(&self) -> &SiteMap {
        &self.site
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub(crate) fn mark_signed_in(&mut self) {
        self.signed_in = true;
    }

    /// Number of page loads performed through this session
    pub fn page_loads(&self) -> u64 {
        self.page_loads
    }

    fn ensure_usable(&self) -> std::result::Result<(), DriverError> {
        if self.state == SessionState::Closed {
            return Err(DriverError::Connection("session is closed".to_string()));
        }
        Ok(())
    }

    /// Wait out the randomized gap since the previous page load
    async fn pace(&mut self) {
        let min = self.pacing.min_page_interval_ms;
        let max = self.pacing.max_page_interval_ms;
        if max == 0 {
            return;
        }

        let interval = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
        if let Some(last) = self.last_page_load {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                debug!("Pacing page load, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Load `url`, respecting page pacing
    pub async fn navigate(&mut self, url: &str) -> std::result::Result<(), DriverError> {
        self.ensure_usable()?;
        self.pace().await;

        debug!("Navigating to {}", url);
        let result = self.automation.navigate(url).await;
        self.last_page_load = Some(Instant::now());
        self.page_loads += 1;
        self.state = SessionState::Active;

        result
    }

    /// Click an element; may load a new page
    pub async fn click(&mut self, element: &ElementHandle) -> std::result::Result<(), DriverError> {
        self.ensure_usable()?;
        self.pace().await;

        let result = self.automation.click(element).await;
        self.last_page_load = Some(Instant::now());

        result
    }

    pub async fn send_keys(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> std::result::Result<(), DriverError> {
        self.ensure_usable()?;
        self.automation.send_keys(element, text).await
    }

    pub async fn current_url(&self) -> std::result::Result<String, DriverError> {
        self.ensure_usable()?;
        self.automation.current_url().await
    }

    pub async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> std::result::Result<Vec<ElementHandle>, DriverError> {
        self.ensure_usable()?;
        self.automation.find_elements(scope, selector).await
    }

    pub async fn find_first(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> std::result::Result<Option<ElementHandle>, DriverError> {
        Ok(self.find_all(scope, selector).await?.into_iter().next())
    }

    /// Trimmed text of an element
    pub async fn text(&self, element: &ElementHandle) -> std::result::Result<String, DriverError> {
        self.ensure_usable()?;
        Ok(self.automation.text(element).await?.trim().to_string())
    }

    pub async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> std::result::Result<Option<String>, DriverError> {
        self.ensure_usable()?;
        self.automation.attribute(element, name).await
    }

    /// Poll until `selector` matches, up to the configured ready timeout
    pub async fn wait_for(&self, selector: &str) -> std::result::Result<ElementHandle, DriverError> {
        let deadline = Instant::now() + self.pacing.page_ready_timeout();

        loop {
            if let Some(element) = self.find_first(None, selector).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::NoSuchElement { selector: selector.to_string() });
            }
            tokio::time::sleep(self.pacing.ready_poll_interval()).await;
        }
    }

    /// Close the underlying connection
    pub async fn close(mut self) -> std::result::Result<(), DriverError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        let result = self.automation.close().await;
        info!("Session closed after {} page loads", self.page_loads);
        result
    }
}

/// Open a session, run `body`, and close the session however `body` ends
///
/// A panic inside `body` still closes the session before it resumes.
pub async fn with_session<T, F>(
    connector: &dyn Connector,
    config: &CollectorConfig,
    body: F,
) -> Result<T>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
{
    let mut session = Session::open(connector, config).await?;

    let outcome = AssertUnwindSafe(body(&mut session)).catch_unwind().await;

    if let Err(e) = session.close().await {
        warn!("Failed to close session cleanly: {}", e);
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
