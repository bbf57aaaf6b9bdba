//! Automation backend for server-rendered pages
//!
//! Pages are fetched over HTTP and selectors are answered with `scraper`.
//! Element handles are recorded as selector paths from the document root and
//! are invalidated by the next navigation.

use crate::config::AutomationConfig;
use crate::error::DriverError;
use crate::session::{Automation, Connector, ElementHandle};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub url: String,
    pub body: String,
}

/// Source of page bodies
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, DriverError>;
}

#[async_trait::async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, DriverError> {
        (**self).fetch(url).await
    }
}

/// Fetches pages with `reqwest`
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(config: &AutomationConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(config.command_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DriverError::Connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, DriverError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::Http(format!("HTTP request failed with status: {status}")));
        }

        let url = response.url().to_string();
        let body = response.text().await?;
        debug!("Fetched {} ({} bytes)", url, body.len());

        Ok(FetchedPage { url, body })
    }
}

type ElementPath = Vec<(String, usize)>;

#[derive(Default)]
struct PageState {
    url: Option<String>,
    body: Option<Arc<str>>,
    generation: u64,
    handles: Vec<ElementPath>,
    closed: bool,
}

/// [`Automation`] over a [`PageSource`]
pub struct HtmlAutomation<S> {
    source: S,
    state: Mutex<PageState>,
}

fn parse_selector(selector: &str) -> Result<Selector, DriverError> {
    Selector::parse(selector).map_err(|e| DriverError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

fn resolve<'a>(document: &'a Html, path: &ElementPath) -> Result<Option<ElementRef<'a>>, DriverError> {
    let mut current: Option<ElementRef<'a>> = None;

    for (step, (selector, index)) in path.iter().enumerate() {
        let selector = parse_selector(selector)?;
        let next = if step == 0 {
            document.select(&selector).nth(*index)
        } else {
            match current {
                Some(element) => element.select(&selector).nth(*index),
                None => None,
            }
        };
        if next.is_none() {
            return Ok(None);
        }
        current = next;
    }

    Ok(current)
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

impl<S: PageSource> HtmlAutomation<S> {
    pub fn new(source: S) -> Self {
        Self { source, state: Mutex::new(PageState::default()) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PageState>, DriverError> {
        let state = self
            .state
            .lock()
            .map_err(|_| DriverError::Protocol("page state lock poisoned".to_string()))?;
        if state.closed {
            return Err(DriverError::Connection("session is closed".to_string()));
        }
        Ok(state)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        self.lock().map(|_| ())
    }

    fn handle_path(state: &PageState, handle: &ElementHandle) -> Result<ElementPath, DriverError> {
        let stale = || DriverError::StaleElement(handle.0.clone());
        let (generation, index) = handle.0.split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let index: usize = index.parse().map_err(|_| stale())?;

        if generation != state.generation {
            return Err(stale());
        }
        state.handles.get(index).cloned().ok_or_else(stale)
    }

    /// Run `f` against the element behind `handle`
    fn with_element<R>(
        &self,
        handle: &ElementHandle,
        f: impl FnOnce(ElementRef<'_>, &PageState) -> R,
    ) -> Result<R, DriverError> {
        let state = self.lock()?;
        let path = Self::handle_path(&state, handle)?;
        let body = state.body.clone().ok_or_else(|| DriverError::Protocol("no page loaded".into()))?;

        let document = Html::parse_document(&body);
        let element =
            resolve(&document, &path)?.ok_or_else(|| DriverError::StaleElement(handle.0.clone()))?;
        Ok(f(element, &state))
    }

    fn find_sync(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let parsed = parse_selector(selector)?;
        let mut state = self.lock()?;
        let body = state.body.clone().ok_or_else(|| DriverError::Protocol("no page loaded".into()))?;
        let document = Html::parse_document(&body);

        let (base, count) = match scope {
            None => (Vec::new(), document.select(&parsed).count()),
            Some(handle) => {
                let path = Self::handle_path(&state, handle)?;
                let element = resolve(&document, &path)?
                    .ok_or_else(|| DriverError::StaleElement(handle.0.clone()))?;
                let count = element.select(&parsed).count();
                (path, count)
            }
        };

        let generation = state.generation;
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let mut path = base.clone();
            path.push((selector.to_string(), index));
            state.handles.push(path);
            handles.push(ElementHandle(format!("{generation}:{}", state.handles.len() - 1)));
        }

        Ok(handles)
    }

    fn link_target(&self, handle: &ElementHandle) -> Result<String, DriverError> {
        let href = self.with_element(handle, |element, state| {
            element.value().attr("href").map(|href| (href.to_string(), state.url.clone()))
        })?;

        let (href, current) = href.ok_or_else(|| {
            DriverError::Unsupported("click on an element without href".to_string())
        })?;

        match current {
            Some(current) => url::Url::parse(&current)
                .and_then(|base| base.join(&href))
                .map(|u| u.to_string())
                .map_err(|e| DriverError::Protocol(format!("cannot resolve {href:?}: {e}"))),
            None => Ok(href),
        }
    }
}

#[async_trait::async_trait]
impl<S: PageSource> Automation for HtmlAutomation<S> {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        let page = self.source.fetch(url).await?;

        let mut state = self.lock()?;
        state.url = Some(page.url);
        state.body = Some(Arc::from(page.body));
        state.generation += 1;
        state.handles.clear();

        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.lock()?.url.clone().ok_or_else(|| DriverError::Protocol("no page loaded".into()))
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.find_sync(scope, selector)
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.with_element(element, |element, _| normalized_text(element))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.with_element(element, |element, _| {
            if name == "textContent" {
                Some(element.text().collect::<String>())
            } else {
                element.value().attr(name).map(str::to_string)
            }
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let target = self.link_target(element)?;
        self.navigate(&target).await
    }

    async fn send_keys(&self, _element: &ElementHandle, _text: &str) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("typing into forms".to_string()))
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.lock()?;
        *state = PageState { closed: true, ..PageState::default() };
        Ok(())
    }
}

/// Connects [`HtmlAutomation`] over plain HTTP
#[derive(Debug, Default, Clone)]
pub struct HtmlConnector;

#[async_trait::async_trait]
impl Connector for HtmlConnector {
    async fn connect(&self, config: &AutomationConfig) -> Result<Box<dyn Automation>, DriverError> {
        let source = HttpPageSource::new(config)?;
        Ok(Box::new(HtmlAutomation::new(source)))
    }
}
