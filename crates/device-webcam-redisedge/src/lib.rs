//! Client for a RedisEdge server (Redis with the RedisAI and RedisGears
//! modules): connection pooling, module checks, model/script provisioning and
//! YOLO detection requests.

mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod inference;
pub mod memory;
pub mod modules;
pub mod pool;
pub mod provision;

pub use client::RedisEdge;
pub use config::{ModelConfig, PoolOptions, RedisEdgeConfig, ScriptConfig};
pub use connection::{Connector, EdgeConnection, ModuleInfo, RedisConnection, RedisConnector};
pub use error::{InferenceError, MissingModules, ProvisionError, RedisEdgeError, UnmetModule};
pub use inference::Detections;
pub use memory::{MemoryConnection, MemoryConnector, RecordedCommand};
pub use modules::{check_requirements, verify_modules};
pub use pool::{Pool, PooledConnection};
pub use provision::{ensure_resource, Provisioning, RemoteResource, ResourceKind};
