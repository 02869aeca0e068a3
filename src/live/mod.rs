//! Page-side live editing: the active-query registry and the
//! synchronization protocol spoken with the editing surface.

pub mod channel;
pub mod history;
pub mod refresh;
pub mod registry;
pub mod submit;
pub mod sync;

pub use channel::{ChannelError, LocalChannel, MessageChannel};
pub use history::{HistoryBridge, Navigator};
pub use refresh::{RefreshAction, RefreshHandler, RefreshOutcome, Revalidator, decide};
pub use registry::{ActiveQueryRegistry, QueryRegistration, Subscription};
pub use submit::{HttpPerspectiveSubmitter, PerspectiveSubmitter, SessionCookies, SubmitError};
pub use sync::{SyncError, VisualEditingSync};
