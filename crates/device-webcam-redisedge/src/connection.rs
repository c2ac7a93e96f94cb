//! Command-level access to a RedisEdge server.
//!
//! [`EdgeConnection`] is the seam between the provisioning logic and the
//! wire: [`RedisConnection`] speaks the Redis protocol, while
//! [`crate::memory::MemoryConnection`] answers from process memory.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, Value};
use tracing::debug;

use crate::error::{RedisEdgeError, Result};

/// An extension module reported by `MODULE LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub version: i64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Arguments of `AI.MODELSET`.
#[derive(Debug, Clone, Copy)]
pub struct ModelSet<'a> {
    pub key: &'a str,
    pub backend: &'a str,
    pub device: &'a str,
    pub inputs: &'a [String],
    pub outputs: &'a [String],
    pub blob: &'a [u8],
}

/// Arguments of `AI.SCRIPTSET`.
#[derive(Debug, Clone, Copy)]
pub struct ScriptSet<'a> {
    pub key: &'a str,
    pub device: &'a str,
    pub blob: &'a [u8],
}

#[async_trait]
pub trait EdgeConnection: Send {
    async fn module_list(&mut self) -> Result<Vec<ModuleInfo>>;
    async fn exists(&mut self, key: &str) -> Result<bool>;
    /// Returns the server's status reply verbatim.
    async fn model_set(&mut self, model: ModelSet<'_>) -> Result<String>;
    /// Returns the server's status reply verbatim.
    async fn script_set(&mut self, script: ScriptSet<'_>) -> Result<String>;

    /// Broken connections are closed instead of being returned to the pool.
    fn is_broken(&self) -> bool {
        false
    }
}

/// Dials new connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: EdgeConnection + 'static;

    async fn connect(&self) -> Result<Self::Connection>;
}

#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Parses the URL without dialling; connections are opened lazily by the pool.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|err| {
            RedisEdgeError::Connectivity(format!("invalid server url '{url}': {err}"))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| RedisEdgeError::Connectivity(err.to_string()))?;
        debug!("dialled new RedisEdge connection");
        Ok(RedisConnection {
            conn,
            broken: false,
        })
    }
}

pub struct RedisConnection {
    conn: MultiplexedConnection,
    broken: bool,
}

impl RedisConnection {
    async fn query<T: FromRedisValue>(&mut self, command: &'static str, cmd: &redis::Cmd) -> Result<T> {
        let result: redis::RedisResult<T> = cmd.query_async(&mut self.conn).await;
        result.map_err(|err| {
            if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
                self.broken = true;
            }
            RedisEdgeError::command(command, err)
        })
    }
}

#[async_trait]
impl EdgeConnection for RedisConnection {
    async fn module_list(&mut self) -> Result<Vec<ModuleInfo>> {
        let entries: Vec<Value> = self.query("MODULE LIST", &module_list_cmd()).await?;

        let mut modules = Vec::with_capacity(entries.len());
        for entry in &entries {
            match parse_module_entry(entry) {
                Some(module) => modules.push(module),
                None => debug!(?entry, "skipping malformed MODULE LIST entry"),
            }
        }
        Ok(modules)
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        self.query("EXISTS", &exists_cmd(key)).await
    }

    async fn model_set(&mut self, model: ModelSet<'_>) -> Result<String> {
        self.query("AI.MODELSET", &model_set_cmd(&model)).await
    }

    async fn script_set(&mut self, script: ScriptSet<'_>) -> Result<String> {
        self.query("AI.SCRIPTSET", &script_set_cmd(&script)).await
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

fn module_list_cmd() -> redis::Cmd {
    let mut cmd = redis::cmd("MODULE");
    cmd.arg("LIST");
    cmd
}

fn exists_cmd(key: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("EXISTS");
    cmd.arg(key);
    cmd
}

/// `AI.MODELSET key backend device INPUTS in.. OUTPUTS out.. blob`
fn model_set_cmd(model: &ModelSet<'_>) -> redis::Cmd {
    let mut cmd = redis::cmd("AI.MODELSET");
    cmd.arg(model.key)
        .arg(model.backend)
        .arg(model.device)
        .arg("INPUTS")
        .arg(model.inputs)
        .arg("OUTPUTS")
        .arg(model.outputs)
        .arg(model.blob);
    cmd
}

/// `AI.SCRIPTSET key device blob`
fn script_set_cmd(script: &ScriptSet<'_>) -> redis::Cmd {
    let mut cmd = redis::cmd("AI.SCRIPTSET");
    cmd.arg(script.key).arg(script.device).arg(script.blob);
    cmd
}

/// Each `MODULE LIST` entry is a flat field/value array such as
/// `["name", "ai", "ver", 10002, ...]`.
fn parse_module_entry(entry: &Value) -> Option<ModuleInfo> {
    let fields: Vec<Value> = redis::from_redis_value(entry).ok()?;

    let mut name = None;
    let mut version = None;
    for pair in fields.chunks_exact(2) {
        let field: String = redis::from_redis_value(&pair[0]).ok()?;
        match field.as_str() {
            "name" => name = redis::from_redis_value::<String>(&pair[1]).ok(),
            "ver" => version = redis::from_redis_value::<i64>(&pair[1]).ok(),
            _ => {}
        }
    }

    Some(ModuleInfo::new(name?, version?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(text: &str) -> Value {
        Value::BulkString(text.as_bytes().to_vec())
    }

    #[test]
    fn parses_module_list_entry_fields_by_name() {
        let entry = Value::Array(vec![
            bulk("name"),
            bulk("ai"),
            bulk("ver"),
            Value::Int(10002),
            bulk("path"),
            bulk("/usr/lib/redis/modules/redisai.so"),
        ]);

        assert_eq!(parse_module_entry(&entry), Some(ModuleInfo::new("ai", 10002)));
    }

    #[test]
    fn rejects_entries_without_a_version() {
        let entry = Value::Array(vec![bulk("name"), bulk("rg")]);
        assert_eq!(parse_module_entry(&entry), None);
    }

    fn wire_args(cmd: &redis::Cmd) -> Vec<Vec<u8>> {
        cmd.args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => bytes.to_vec(),
                redis::Arg::Cursor => b"<cursor>".to_vec(),
            })
            .collect()
    }

    fn words(words: &[&str]) -> Vec<Vec<u8>> {
        words.iter().map(|word| word.as_bytes().to_vec()).collect()
    }

    #[test]
    fn model_set_arguments_follow_the_server_grammar() {
        let inputs = vec!["input".to_string()];
        let outputs = vec!["output".to_string()];
        let cmd = model_set_cmd(&ModelSet {
            key: "redisai:model:yolo",
            backend: "TF",
            device: "CPU",
            inputs: &inputs,
            outputs: &outputs,
            blob: b"\x00graph\xff",
        });

        let mut expected = words(&[
            "AI.MODELSET",
            "redisai:model:yolo",
            "TF",
            "CPU",
            "INPUTS",
            "input",
            "OUTPUTS",
            "output",
        ]);
        expected.push(b"\x00graph\xff".to_vec());
        assert_eq!(wire_args(&cmd), expected);
    }

    #[test]
    fn model_set_expands_every_input_and_output_name() {
        let inputs = vec!["a".to_string(), "b".to_string()];
        let outputs = vec!["c".to_string()];
        let cmd = model_set_cmd(&ModelSet {
            key: "m",
            backend: "TF",
            device: "GPU",
            inputs: &inputs,
            outputs: &outputs,
            blob: b"pb",
        });

        assert_eq!(
            wire_args(&cmd),
            words(&["AI.MODELSET", "m", "TF", "GPU", "INPUTS", "a", "b", "OUTPUTS", "c", "pb"])
        );
    }

    #[test]
    fn script_set_arguments_follow_the_server_grammar() {
        let cmd = script_set_cmd(&ScriptSet {
            key: "redisai:script:yolo-boxes",
            device: "CPU",
            blob: b"def boxes(x): return x",
        });

        assert_eq!(
            wire_args(&cmd),
            words(&[
                "AI.SCRIPTSET",
                "redisai:script:yolo-boxes",
                "CPU",
                "def boxes(x): return x",
            ])
        );
    }

    #[test]
    fn lookup_commands_are_built_verbatim() {
        assert_eq!(wire_args(&module_list_cmd()), words(&["MODULE", "LIST"]));
        assert_eq!(
            wire_args(&exists_cmd("redisai:model:yolo")),
            words(&["EXISTS", "redisai:model:yolo"])
        );
    }

    #[test]
    fn invalid_url_is_a_connectivity_error() {
        let err = RedisConnector::open("not a url").expect_err("url should be rejected");
        assert!(matches!(err, RedisEdgeError::Connectivity(_)));
    }
}
