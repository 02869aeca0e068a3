//! Navigation bridge between the editing surface and the page.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use vitrine_protocol::{Message, NavigationIntent};

const SOURCE: &str = "vitrine::live::history";

/// Local navigation primitives.
pub trait Navigator: Send + Sync {
    fn push(&self, url: &str);
    fn replace(&self, url: &str);
    fn back(&self);
}

/// Applies remote navigation and reports local navigation without echoing
/// remote-initiated moves back.
pub struct HistoryBridge<N> {
    navigator: N,
    programmatic: AtomicBool,
}

impl<N: Navigator> HistoryBridge<N> {
    pub fn new(navigator: N) -> Self {
        Self {
            navigator,
            programmatic: AtomicBool::new(false),
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Apply a navigation requested by the editing surface.
    pub fn apply(&self, intent: &NavigationIntent) {
        self.programmatic.store(true, Ordering::SeqCst);
        match intent {
            NavigationIntent::Push { url } => self.navigator.push(url),
            NavigationIntent::Replace { url } => self.navigator.replace(url),
            NavigationIntent::Pop => self.navigator.back(),
        }
    }

    /// Message for the editing surface after the page location changed,
    /// or `None` when the change came from [`apply`](Self::apply).
    pub fn location_changed(&self, url: &str, title: Option<&str>) -> Option<Message> {
        if self.programmatic.swap(false, Ordering::SeqCst) {
            debug!(target = SOURCE, url, "suppressed echo of remote navigation");
            return None;
        }
        Some(Message::Location {
            url: url.to_string(),
            title: title.map(str::to_string),
        })
    }
}
