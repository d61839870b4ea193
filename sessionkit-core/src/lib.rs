//! Client-side session orchestration for identity SDK integrations.
//!
//! `sessionkit-core` owns the small state machine every demo client used to
//! reimplement by hand: account initialization and registration, connecting
//! to a server counterpart, correlating outbound requests with inbound
//! replies under a deadline, matching stored credentials against a request,
//! and biometric-gated backup/restore.
//!
//! The identity SDK itself is an external collaborator reached through the
//! [`IdentitySdk`] trait. Platform code implements it (Swift/Kotlin through
//! `UniFFI`), tests and the developer CLI use [`sdk::memory::MemoryIdentitySdk`].
//!
//! ```rust,ignore
//! let sdk = Arc::new(MemoryIdentitySdk::new());
//! let session = Session::new(
//!     SessionConfig::from_environment(&Environment::Sandbox, "/tmp/account1"),
//!     sdk,
//!     Arc::new(MemoryPreferences::new()),
//! );
//! session.initialize().await?;
//! session.connect("server-inbox".to_string(), HashMap::new()).await?;
//! session.notify_server_for_request(ServerRequest::Auth).await?;
//! ```
use strum::{Display, EnumString};

/// The SDK environment a session targets.
///
/// Discovery payloads carry a sandbox flag that must match this value before
/// a connection is attempted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumString,
    serde::Serialize,
    serde::Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Sandbox environment used by the demo servers.
    Sandbox,
    /// Production environment.
    Production,
}

impl Environment {
    /// Whether discovery payloads for this environment carry the sandbox flag.
    #[must_use]
    pub const fn is_sandbox(self) -> bool {
        matches!(self, Self::Sandbox)
    }
}

mod error;
pub use error::*;

pub mod logger;

mod defaults;
pub use defaults::*;

mod credential_type;
pub use credential_type::*;

mod types;
pub use types::*;

mod message;
pub use message::*;

pub mod sdk;
pub use sdk::{IdentitySdk, LivenessCapture, SdkError};

mod account;
pub use account::AccountFacade;

mod dispatcher;
pub use dispatcher::{DispatchTarget, ListenerDispatcher};

mod pending;
pub use pending::*;

mod matcher;
pub use matcher::CredentialMatcher;

mod state;
pub use state::*;

pub mod preferences;
pub use preferences::{PreferencesError, PreferencesStore, ServerPreferences};

mod session;
pub use session::{Session, SessionObserver};

uniffi::setup_scaffolding!("sessionkit_core");
