//! Booking surface: the scheduling page opened when the assistant talks
//! about finding a time.

use crate::error::{Result, WidgetError};
use crate::runtime::RuntimeEvent;
use crate::session::Identity;
use tokio::sync::broadcast;
use url::Url;

/// Host used for bare `user/event` links.
const CAL_HOST: &str = "https://cal.com/";

/// A booking page to open, with contact prefill applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    /// Link with `name` / `email` query parameters appended.
    pub url: Url,
    pub prefill: Identity,
}

impl BookingRequest {
    #[must_use]
    pub fn new(link: &Url, prefill: Identity) -> Self {
        let mut url = link.clone();
        if !prefill.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(name) = &prefill.name {
                query.append_pair("name", name);
            }
            if let Some(email) = &prefill.email {
                query.append_pair("email", email);
            }
        }
        Self { url, prefill }
    }
}

/// Whatever shows the booking page to the user.
pub trait BookingSurface: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the surface could not be shown.
    fn open(&self, request: &BookingRequest) -> Result<()>;
}

/// Hands booking requests to the rendering adapter as runtime events.
#[derive(Debug, Clone)]
pub struct EventBookingSurface {
    events: broadcast::Sender<RuntimeEvent>,
}

impl EventBookingSurface {
    #[must_use]
    pub fn new(events: broadcast::Sender<RuntimeEvent>) -> Self {
        Self { events }
    }
}

impl BookingSurface for EventBookingSurface {
    fn open(&self, request: &BookingRequest) -> Result<()> {
        self.events
            .send(RuntimeEvent::BookingOpened(request.clone()))
            .map(|_| ())
            .map_err(|_| WidgetError::Booking("no one is listening for booking requests".into()))
    }
}

/// Resolve a configured link. Blank means "no booking page"; bare
/// `user/event` paths are taken as Cal.com links.
///
/// # Errors
///
/// Returns [`WidgetError::Config`] for links that do not parse.
pub fn booking_link(raw: &str) -> Result<Option<Url>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_owned()
    } else {
        format!("{CAL_HOST}{}", raw.trim_start_matches('/'))
    };
    Url::parse(&candidate)
        .map(Some)
        .map_err(|e| WidgetError::Config(format!("invalid booking link {raw:?}: {e}")))
}
