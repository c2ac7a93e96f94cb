//! Webcam protocol driver: answers host read/write commands with captured
//! frames and people/dog counts produced by a RedisEdge server.

pub mod config;
pub mod driver;
pub mod frame;
pub mod models;
mod webcam;

pub use config::{ConfigError, DeviceSettings, ServiceConfig, DEFAULT_CONFIG_PATH};
pub use driver::{AsyncValuesReceiver, AsyncValuesSender, DriverError, ProtocolDriver};
pub use frame::{read_frame, Frame, FrameError, FrameFormat};
pub use models::{AsyncValues, CommandRequest, CommandValue, ProtocolProperties, Reading};
pub use webcam::{DriverStatus, WebcamDriver, FRAME_RESOURCE};
