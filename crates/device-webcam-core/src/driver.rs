//! The lifecycle contract between a protocol driver and its host service.

use std::collections::HashMap;

use async_trait::async_trait;
use device_webcam_redisedge::{InferenceError, RedisEdgeError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::frame::FrameError;
use crate::models::{AsyncValues, CommandRequest, CommandValue, ProtocolProperties};

pub type AsyncValuesSender = mpsc::Sender<AsyncValues>;
pub type AsyncValuesReceiver = mpsc::Receiver<AsyncValues>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid command request: {0}")]
    RequestShape(String),

    #[error("driver has not been initialized")]
    NotInitialized,

    #[error("driver is already initialized")]
    AlreadyInitialized,

    #[error("driver is unusable after failed initialization: {0}")]
    Failed(String),

    #[error("driver has been stopped")]
    Stopped,

    #[error("error while initializing RedisEdge - {0}")]
    Initialization(#[source] RedisEdgeError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("detection failed: {0}")]
    Detection(#[from] InferenceError),

    #[error("async values channel is closed")]
    AsyncChannelClosed,
}

impl DriverError {
    /// True for errors caused by the request itself rather than driver state.
    pub fn is_request_error(&self) -> bool {
        matches!(self, DriverError::RequestShape(_))
    }
}

/// Implemented once per device type; the host calls these from any number
/// of worker tasks concurrently.
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Performs protocol-specific initialization. `async_values` carries
    /// readings the driver produces on its own schedule.
    async fn initialize(&self, async_values: AsyncValuesSender) -> Result<(), DriverError>;

    async fn handle_read_commands(
        &self,
        device_name: &str,
        protocols: &HashMap<String, ProtocolProperties>,
        requests: &[CommandRequest],
    ) -> Result<Vec<CommandValue>, DriverError>;

    /// `params[i]` carries the value for `requests[i]`.
    async fn handle_write_commands(
        &self,
        device_name: &str,
        protocols: &HashMap<String, ProtocolProperties>,
        requests: &[CommandRequest],
        params: &[CommandValue],
    ) -> Result<(), DriverError>;

    /// Shuts the driver down gracefully, or immediately when `force` is set,
    /// closing the async values channel.
    async fn stop(&self, force: bool) -> Result<(), DriverError>;
}
