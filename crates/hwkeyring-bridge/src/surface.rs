//! Signing surface lifecycle
//!
//! The host owns the actual window or tab. [`SigningSurface`] tracks what the
//! bridge believes about it, so a second surface is never opened while one is
//! open and teardown always returns to `Closed`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hwkeyring_core::{Error, Result};

/// Host handle for a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabRef {
    pub id: u64,
    pub window_id: u64,
}

/// Where the host should open a new surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Next to the tab that initiated the request, in its window
    AdjacentTo(TabRef),
    /// In a window of its own
    NewWindow,
}

/// Host window and tab manager
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// Active tab, if it lives in a normal browser window
    async fn active_normal_tab(&self) -> Result<Option<TabRef>>;

    /// Open `url` and return the new tab once the host reports it open
    async fn open(&self, url: &str, placement: &Placement) -> Result<TabRef>;

    /// Bring a tab to the front
    async fn focus(&self, tab: &TabRef) -> Result<()>;

    /// Close a tab
    async fn close(&self, tab: &TabRef) -> Result<()>;
}

/// Lifecycle state of the signing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    #[default]
    Closed,
    Opening,
    Open {
        surface: TabRef,
        /// Tab to refocus after teardown
        opener: Option<TabRef>,
    },
    Closing,
}

/// Surface tab and the opener to refocus afterwards
type Opened = (TabRef, Option<TabRef>);

/// Single signing surface driven through a [`SurfaceHost`]
pub struct SigningSurface {
    host: Arc<dyn SurfaceHost>,
    url: String,
    state: SurfaceState,
    /// Host open in flight; runs detached so an interrupted caller cannot lose the tab
    opening: Option<JoinHandle<Result<Opened>>>,
}

impl SigningSurface {
    pub fn new(host: Arc<dyn SurfaceHost>, url: impl Into<String>) -> Self {
        Self {
            host,
            url: url.into(),
            state: SurfaceState::Closed,
            opening: None,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Make sure a surface is open and in front
    ///
    /// An already-open surface is refocused. Otherwise one is opened beside
    /// the active tab when that tab is in a normal window, or in a new window.
    /// An open interrupted earlier is picked up rather than started again.
    pub async fn acquire(&mut self) -> Result<TabRef> {
        if let SurfaceState::Open { surface, .. } = self.state {
            debug!(tab = surface.id, "Refocusing open signing surface");
            self.host.focus(&surface).await?;
            return Ok(surface);
        }

        if self.opening.is_none() {
            self.state = SurfaceState::Opening;
            let host = self.host.clone();
            let url = self.url.clone();
            self.opening = Some(tokio::spawn(async move { open_on(host.as_ref(), &url).await }));
        }

        match self.settle_open().await {
            Ok((surface, opener)) => {
                debug!(tab = surface.id, window = surface.window_id, "Signing surface open");
                self.state = SurfaceState::Open { surface, opener };
                Ok(surface)
            }
            Err(e) => {
                self.state = SurfaceState::Closed;
                Err(e)
            }
        }
    }

    async fn settle_open(&mut self) -> Result<Opened> {
        let Some(pending) = self.opening.as_mut() else {
            return Err(Error::Surface("No signing surface is opening".to_string()));
        };
        let joined = pending.await;
        self.opening = None;
        joined.map_err(|e| Error::Surface(format!("Surface open task failed: {}", e)))?
    }

    /// Close the surface and refocus the opener
    ///
    /// Host failures are logged, never returned; the state always ends `Closed`.
    pub async fn teardown(&mut self) {
        if self.opening.is_some() {
            // the host may still hand back a tab that needs closing
            self.state = match self.settle_open().await {
                Ok((surface, opener)) => SurfaceState::Open { surface, opener },
                Err(_) => SurfaceState::Closed,
            };
        }

        let SurfaceState::Open { surface, opener } = self.state else {
            self.state = SurfaceState::Closed;
            return;
        };

        self.state = SurfaceState::Closing;
        close_and_refocus(self.host.as_ref(), surface, opener).await;
        self.state = SurfaceState::Closed;
        debug!(tab = surface.id, "Signing surface closed");
    }

    /// Hand an open or opening surface to a background teardown
    ///
    /// For callers that cannot await [`teardown`](Self::teardown), such as a
    /// `Drop` impl. The state is `Closed` on return.
    pub fn abandon(&mut self) {
        let state = std::mem::take(&mut self.state);
        let pending = self.opening.take();
        if !matches!(state, SurfaceState::Open { .. }) && pending.is_none() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to close an abandoned signing surface");
            return;
        };
        let host = self.host.clone();
        runtime.spawn(async move {
            let opened = match (state, pending) {
                (SurfaceState::Open { surface, opener }, _) => Some((surface, opener)),
                (_, Some(pending)) => match pending.await {
                    Ok(Ok(opened)) => Some(opened),
                    _ => None,
                },
                _ => None,
            };
            if let Some((surface, opener)) = opened {
                debug!(tab = surface.id, "Closing abandoned signing surface");
                close_and_refocus(host.as_ref(), surface, opener).await;
            }
        });
    }
}

async fn open_on(host: &dyn SurfaceHost, url: &str) -> Result<Opened> {
    let opener = host.active_normal_tab().await?;
    let placement = match opener {
        Some(tab) => Placement::AdjacentTo(tab),
        None => Placement::NewWindow,
    };
    let surface = host.open(url, &placement).await?;
    Ok((surface, opener))
}

async fn close_and_refocus(host: &dyn SurfaceHost, surface: TabRef, opener: Option<TabRef>) {
    if let Err(e) = host.close(&surface).await {
        // the user may already have closed it
        warn!(tab = surface.id, error = %e, "Failed to close signing surface");
    }
    if let Some(opener) = opener {
        if let Err(e) = host.focus(&opener).await {
            warn!(tab = opener.id, error = %e, "Failed to refocus opener tab");
        }
    }
}
