use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use device_webcam_redisedge::{
    Connector, Detections, InferenceError, RedisConnector, RedisEdge, RedisEdgeConfig,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{DeviceSettings, ServiceConfig};
use crate::driver::{AsyncValuesSender, DriverError, ProtocolDriver};
use crate::frame::read_frame;
use crate::models::{AsyncValues, CommandRequest, CommandValue, ProtocolProperties};

/// Resource name of the captured image; always the first read request.
pub const FRAME_RESOURCE: &str = "Frame";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStatus {
    Uninitialized,
    Ready,
    Failed(String),
    Stopped,
}

enum DriverState<C: Connector> {
    Uninitialized,
    Ready(Arc<RedisEdge<C>>),
    Failed(String),
    Stopped,
}

/// Webcam driver that counts people and dogs in captured frames using a
/// RedisEdge server.
pub struct WebcamDriver<C: Connector = RedisConnector> {
    settings: DeviceSettings,
    edge_config: RedisEdgeConfig,
    // Taken by the one successful call to `initialize`.
    connector: Mutex<Option<C>>,
    state: RwLock<DriverState<C>>,
    async_values: Mutex<Option<AsyncValuesSender>>,
}

impl WebcamDriver<RedisConnector> {
    pub fn new(config: ServiceConfig) -> Result<Self, DriverError> {
        let connector = RedisConnector::open(&config.redisedge.server_url)
            .map_err(DriverError::Initialization)?;
        Ok(Self::with_connector(config, connector))
    }
}

impl<C: Connector> WebcamDriver<C> {
    pub fn with_connector(config: ServiceConfig, connector: C) -> Self {
        Self {
            settings: config.device,
            edge_config: config.redisedge,
            connector: Mutex::new(Some(connector)),
            state: RwLock::new(DriverState::Uninitialized),
            async_values: Mutex::new(None),
        }
    }

    pub fn status(&self) -> DriverStatus {
        match &*self.state.read() {
            DriverState::Uninitialized => DriverStatus::Uninitialized,
            DriverState::Ready(_) => DriverStatus::Ready,
            DriverState::Failed(reason) => DriverStatus::Failed(reason.clone()),
            DriverState::Stopped => DriverStatus::Stopped,
        }
    }

    /// The shared client, or the error matching the current state.
    fn ready_edge(&self) -> Result<Arc<RedisEdge<C>>, DriverError> {
        match &*self.state.read() {
            DriverState::Ready(edge) => Ok(Arc::clone(edge)),
            DriverState::Uninitialized => Err(DriverError::NotInitialized),
            DriverState::Failed(reason) => Err(DriverError::Failed(reason.clone())),
            DriverState::Stopped => Err(DriverError::Stopped),
        }
    }

    /// Takes the connector and stores the host's sender under the state lock,
    /// so a concurrent `stop` either rejects this call or drops the sender.
    fn claim_connector(&self, async_values: AsyncValuesSender) -> Result<C, DriverError> {
        let state = self.state.read();
        match &*state {
            DriverState::Uninitialized => {}
            DriverState::Ready(_) => return Err(DriverError::AlreadyInitialized),
            DriverState::Failed(reason) => return Err(DriverError::Failed(reason.clone())),
            DriverState::Stopped => return Err(DriverError::Stopped),
        }
        let connector = self
            .connector
            .lock()
            .take()
            .ok_or(DriverError::AlreadyInitialized)?;
        *self.async_values.lock() = Some(async_values);
        drop(state);
        Ok(connector)
    }

    fn finish_initialize(&self, edge: RedisEdge<C>) -> Result<(), DriverError> {
        let mut state = self.state.write();
        if matches!(*state, DriverState::Stopped) {
            edge.close();
            return Err(DriverError::Stopped);
        }
        *state = DriverState::Ready(Arc::new(edge));
        Ok(())
    }

    fn fail_initialize(&self, reason: String) {
        let mut state = self.state.write();
        if !matches!(*state, DriverState::Stopped) {
            *state = DriverState::Failed(reason);
        }
        // Failed is terminal; close the host's channel.
        self.async_values.lock().take();
    }

    async fn detect(&self, edge: &RedisEdge<C>, frame: &[u8]) -> Result<Detections, DriverError> {
        match edge.detect(frame).await {
            Ok(detections) => Ok(detections),
            Err(InferenceError::NotImplemented) if self.settings.placeholder_detections => {
                warn!("object detection is not implemented; reporting zero counts");
                Ok(Detections::default())
            }
            Err(err) => {
                debug!("YOLO detection failed - {err}");
                Err(DriverError::Detection(err))
            }
        }
    }

    /// Reads the requested resources and pushes them through the async values
    /// channel handed to `initialize`.
    pub async fn push_reading(
        &self,
        device_name: &str,
        requests: &[CommandRequest],
    ) -> Result<(), DriverError> {
        let command_values = self
            .handle_read_commands(device_name, &HashMap::new(), requests)
            .await?;

        let sender = self
            .async_values
            .lock()
            .clone()
            .ok_or(DriverError::AsyncChannelClosed)?;
        sender
            .send(AsyncValues {
                device_name: device_name.to_string(),
                command_values,
            })
            .await
            .map_err(|_| DriverError::AsyncChannelClosed)
    }
}

#[async_trait]
impl<C: Connector> ProtocolDriver for WebcamDriver<C> {
    async fn initialize(&self, async_values: AsyncValuesSender) -> Result<(), DriverError> {
        debug!("WebcamDriver.initialize called");

        let connector = self.claim_connector(async_values)?;

        match RedisEdge::initialize(self.edge_config.clone(), connector).await {
            Ok(edge) => {
                self.finish_initialize(edge)?;
                info!("WebcamDriver initialized");
                Ok(())
            }
            Err(err) => {
                error!("WebcamDriver.initialize: error while initializing RedisEdge - {err}");
                self.fail_initialize(err.to_string());
                Err(DriverError::Initialization(err))
            }
        }
    }

    async fn handle_read_commands(
        &self,
        device_name: &str,
        protocols: &HashMap<String, ProtocolProperties>,
        requests: &[CommandRequest],
    ) -> Result<Vec<CommandValue>, DriverError> {
        debug!(device_name, "WebcamDriver.handle_read_commands called");
        let edge = self.ready_edge()?;

        if requests.len() != 1 && requests.len() != 3 {
            return Err(DriverError::RequestShape(
                "either 1 or 3 command requests are supported".to_string(),
            ));
        }
        let frame_request = &requests[0];
        debug!(
            ?protocols,
            resource = %frame_request.device_resource_name,
            attributes = ?frame_request.attributes,
            "read request"
        );
        if frame_request.device_resource_name != FRAME_RESOURCE {
            return Err(DriverError::RequestShape(format!(
                "{FRAME_RESOURCE} must be the first request"
            )));
        }

        let origin = Utc::now().timestamp_millis();
        // TODO: capture from a video source instead of the configured still image
        let frame = read_frame(&self.settings.sample_image).await?;

        let mut values = Vec::with_capacity(requests.len());
        values.push(CommandValue::binary(
            &frame_request.device_resource_name,
            origin,
            frame.media_type(),
            frame.data.clone(),
        ));
        debug!(bytes = frame.data.len(), media_type = frame.media_type(), "read frame");

        if let [_, people, dogs] = requests {
            let detections = self.detect(&edge, &frame.data).await?;
            values.push(CommandValue::uint64(
                &people.device_resource_name,
                origin,
                detections.people,
            ));
            values.push(CommandValue::uint64(
                &dogs.device_resource_name,
                origin,
                detections.dogs,
            ));
        }

        debug!(device_name, values = values.len(), "WebcamDriver.handle_read_commands exited");
        Ok(values)
    }

    async fn handle_write_commands(
        &self,
        device_name: &str,
        protocols: &HashMap<String, ProtocolProperties>,
        requests: &[CommandRequest],
        params: &[CommandValue],
    ) -> Result<(), DriverError> {
        debug!(device_name, "WebcamDriver.handle_write_commands called");
        self.ready_edge()?;

        if requests.len() != 1 {
            return Err(DriverError::RequestShape(
                "too many command requests; only one supported".to_string(),
            ));
        }
        if params.len() != 1 {
            return Err(DriverError::RequestShape(
                "the number of parameters is not correct; only one supported".to_string(),
            ));
        }

        debug!(
            ?protocols,
            resource = %requests[0].device_resource_name,
            parameter = ?params[0],
            "write request accepted"
        );
        Ok(())
    }

    async fn stop(&self, force: bool) -> Result<(), DriverError> {
        debug!(force, "WebcamDriver.stop called");

        let previous = std::mem::replace(&mut *self.state.write(), DriverState::Stopped);
        match previous {
            DriverState::Stopped => return Err(DriverError::Stopped),
            DriverState::Ready(edge) => edge.close(),
            DriverState::Uninitialized | DriverState::Failed(_) => {}
        }
        self.connector.lock().take();
        self.async_values.lock().take();

        info!(force, "WebcamDriver stopped");
        Ok(())
    }
}
