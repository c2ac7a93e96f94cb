//! In-process stand-in for a RedisEdge server.
//!
//! Used for dry runs of the device service without a server and by the test
//! suites. State is shared by every connection dialled from the same
//! [`MemoryConnector`], and every command is recorded in order.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::RedisEdgeConfig;
use crate::connection::{Connector, EdgeConnection, ModelSet, ModuleInfo, ScriptSet};
use crate::error::{RedisEdgeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    ModuleList,
    Exists(String),
    ModelSet {
        key: String,
        backend: String,
        device: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        blob: Bytes,
    },
    ScriptSet {
        key: String,
        device: String,
        blob: Bytes,
    },
}

impl RecordedCommand {
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            RecordedCommand::ModelSet { .. } | RecordedCommand::ScriptSet { .. }
        )
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    modules: Vec<ModuleInfo>,
    keys: HashSet<String>,
    commands: Vec<RecordedCommand>,
    dials: usize,
    refuse_connections: bool,
    set_reply: Option<String>,
    failing: HashSet<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server with the modules the stock configuration requires.
    pub fn with_stock_modules() -> Self {
        Self::new().with_module("rg", 301).with_module("ai", 200)
    }

    /// A stock server that already holds the configured model and script, so
    /// initialization needs neither blob file.
    pub fn preloaded(config: &RedisEdgeConfig) -> Self {
        Self::with_stock_modules()
            .with_key(&config.model.key)
            .with_key(&config.script.key)
    }

    pub fn with_module(self, name: &str, version: i64) -> Self {
        self.state.lock().modules.push(ModuleInfo::new(name, version));
        self
    }

    /// Marks `key` as already present on the server.
    pub fn with_key(self, key: &str) -> Self {
        self.state.lock().keys.insert(key.to_string());
        self
    }

    /// Replaces the `OK` acknowledgement of model and script uploads.
    pub fn reply_to_uploads(self, reply: &str) -> Self {
        self.state.lock().set_reply = Some(reply.to_string());
        self
    }

    pub fn refuse_connections(self) -> Self {
        self.state.lock().refuse_connections = true;
        self
    }

    /// Makes every invocation of `command` (e.g. `"EXISTS"`) fail with a transport error.
    pub fn fail_command(self, command: &'static str) -> Self {
        self.state.lock().failing.insert(command);
        self
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|command| command.is_upload())
            .count()
    }

    pub fn dial_count(&self) -> usize {
        self.state.lock().dials
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().keys.contains(key)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        let mut state = self.state.lock();
        state.dials += 1;
        if state.refuse_connections {
            return Err(RedisEdgeError::Connectivity(
                "connection refused".to_string(),
            ));
        }
        Ok(MemoryConnection {
            id: state.dials,
            state: Arc::clone(&self.state),
            broken: false,
        })
    }
}

pub struct MemoryConnection {
    id: usize,
    state: Arc<Mutex<MemoryState>>,
    broken: bool,
}

impl MemoryConnection {
    /// Sequence number of the dial that produced this connection.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn record(&mut self, name: &'static str, command: RecordedCommand) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(command);
        if state.failing.contains(name) {
            drop(state);
            self.broken = true;
            return Err(RedisEdgeError::command(name, "connection reset by peer"));
        }
        Ok(())
    }

    fn store(&self, key: &str) -> String {
        let mut state = self.state.lock();
        let reply = state.set_reply.clone().unwrap_or_else(|| "OK".to_string());
        if reply == "OK" {
            state.keys.insert(key.to_string());
        }
        reply
    }
}

#[async_trait]
impl EdgeConnection for MemoryConnection {
    async fn module_list(&mut self) -> Result<Vec<ModuleInfo>> {
        self.record("MODULE LIST", RecordedCommand::ModuleList)?;
        Ok(self.state.lock().modules.clone())
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        self.record("EXISTS", RecordedCommand::Exists(key.to_string()))?;
        Ok(self.state.lock().keys.contains(key))
    }

    async fn model_set(&mut self, model: ModelSet<'_>) -> Result<String> {
        self.record(
            "AI.MODELSET",
            RecordedCommand::ModelSet {
                key: model.key.to_string(),
                backend: model.backend.to_string(),
                device: model.device.to_string(),
                inputs: model.inputs.to_vec(),
                outputs: model.outputs.to_vec(),
                blob: Bytes::copy_from_slice(model.blob),
            },
        )?;
        Ok(self.store(model.key))
    }

    async fn script_set(&mut self, script: ScriptSet<'_>) -> Result<String> {
        self.record(
            "AI.SCRIPTSET",
            RecordedCommand::ScriptSet {
                key: script.key.to_string(),
                device: script.device.to_string(),
                blob: Bytes::copy_from_slice(script.blob),
            },
        )?;
        Ok(self.store(script.key))
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}
