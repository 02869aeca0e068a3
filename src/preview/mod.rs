//! Preview sessions: signed cookie, enablement state machine and the
//! entry/exit protocol.

pub mod cookie;
pub mod protocol;
pub mod session;
pub mod state;
pub mod validation;

pub use cookie::{CookieError, CookieSettings, SameSite, SessionCookie};
pub use protocol::{EnterOutcome, PreviewError, PreviewService};
pub use session::{
    PreviewSession, SessionCommit, SessionField, SessionMutation, SessionSnapshot,
};
pub use state::{
    PerspectiveChange, PreviewContext, PreviewMachine, PreviewState, TransitionError,
};
pub use validation::{
    PreviewUrlValidation, PreviewValidator, SecretDocumentValidator, sanitize_redirect,
};
