//! nbsync-exec: Remote session abstraction
//!
//! Provides the session traits used by the collector and an SSH implementation
//! for polling network devices.

pub mod credentials;
pub mod error;
pub mod result;
pub mod ssh;
pub mod traits;

pub use credentials::{CredentialError, ResolvedSecret, Secret};
pub use error::ExecError;
pub use result::{CommandOutput, ConnectionInfo};
pub use ssh::{SshConnector, SshSession};
pub use traits::{Connector, Session};
