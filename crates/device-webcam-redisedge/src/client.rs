use tracing::{debug, info};

use crate::config::RedisEdgeConfig;
use crate::connection::{Connector, RedisConnector};
use crate::error::{InferenceError, Result};
use crate::inference::{yolo_detect, Detections};
use crate::modules::verify_modules;
use crate::pool::Pool;
use crate::provision::{ensure_resource, Provisioning, RemoteResource};

/// A RedisEdge server that passed the module check and holds the model and
/// script this device needs.
pub struct RedisEdge<C: Connector = RedisConnector> {
    config: RedisEdgeConfig,
    pool: Pool<C>,
}

impl RedisEdge<RedisConnector> {
    pub async fn connect(config: RedisEdgeConfig) -> Result<Self> {
        let connector = RedisConnector::open(&config.server_url)?;
        Self::initialize(config, connector).await
    }
}

impl<C: Connector> RedisEdge<C> {
    /// Checks modules, then provisions the model and then the script.
    ///
    /// The first failure aborts the sequence; in particular the script is not
    /// attempted when the model could not be provisioned.
    pub async fn initialize(config: RedisEdgeConfig, connector: C) -> Result<Self> {
        debug!(server_url = %config.server_url, "RedisEdge initialization started");

        let pool = Pool::new(connector, &config.pool);
        let edge = Self { config, pool };

        edge.check_modules().await?;
        edge.provision(&RemoteResource::Model(edge.config.model.clone()))
            .await?;
        edge.provision(&RemoteResource::Script(edge.config.script.clone()))
            .await?;

        info!("RedisEdge ready");
        Ok(edge)
    }

    pub async fn check_modules(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        verify_modules(&mut *conn, &self.config.required_modules).await
    }

    pub async fn provision(&self, resource: &RemoteResource) -> Result<Provisioning> {
        let mut conn = self.pool.acquire().await?;
        Ok(ensure_resource(&mut *conn, resource).await?)
    }

    pub async fn detect(&self, frame: &[u8]) -> std::result::Result<Detections, InferenceError> {
        yolo_detect(frame)
    }

    pub fn config(&self) -> &RedisEdgeConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    /// Releases pooled connections; later calls fail with a connectivity error.
    pub fn close(&self) {
        self.pool.close();
    }
}
