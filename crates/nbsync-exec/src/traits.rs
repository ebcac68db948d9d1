//! Session traits

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandOutput, ConnectionInfo};

/// An open command session on one device
#[async_trait]
pub trait Session: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError>;
    async fn close(&self) -> Result<(), ExecError>;
    fn session_type(&self) -> &'static str;
}

/// Opens sessions; one call per device per run
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, info: &ConnectionInfo) -> Result<Arc<dyn Session>, ExecError>;
}
