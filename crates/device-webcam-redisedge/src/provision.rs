//! Idempotent provisioning of the RedisAI model and script.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::config::{ModelConfig, ScriptConfig};
use crate::connection::{EdgeConnection, ModelSet, ScriptSet};
use crate::error::ProvisionError;

/// Reply the server sends when a model or script was stored.
pub const SUCCESS_REPLY: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Model,
    Script,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Script => "script",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-side artifact identified by key and created from a local blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResource {
    Model(ModelConfig),
    Script(ScriptConfig),
}

impl RemoteResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RemoteResource::Model(_) => ResourceKind::Model,
            RemoteResource::Script(_) => ResourceKind::Script,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            RemoteResource::Model(model) => &model.key,
            RemoteResource::Script(script) => &script.key,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            RemoteResource::Model(model) => &model.path,
            RemoteResource::Script(script) => &script.path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    /// The key was already present; nothing was uploaded.
    Existing,
    Created,
}

/// Makes sure `resource` exists on the server, uploading it if absent.
///
/// An existing key is accepted as-is; its content is not compared with the
/// local blob. The blob is read only when an upload is needed, and a read
/// failure aborts before anything is sent.
pub async fn ensure_resource<E>(
    conn: &mut E,
    resource: &RemoteResource,
) -> Result<Provisioning, ProvisionError>
where
    E: EdgeConnection + ?Sized,
{
    let kind = resource.kind();
    let key = resource.key();
    debug!(%kind, key, "provisioning RedisAI resource");

    let exists = conn.exists(key).await.map_err(|err| {
        let err = ProvisionError::Lookup {
            kind,
            key: key.to_string(),
            message: err.to_string(),
        };
        error!("{err}");
        err
    })?;

    if exists {
        debug!(%kind, key, "existing RedisAI key found");
        return Ok(Provisioning::Existing);
    }

    let blob = read_blob(kind, resource.path()).await?;

    let reply = match resource {
        RemoteResource::Model(model) => {
            conn.model_set(ModelSet {
                key: &model.key,
                backend: &model.backend,
                device: &model.device,
                inputs: &model.inputs,
                outputs: &model.outputs,
                blob: &blob,
            })
            .await
        }
        RemoteResource::Script(script) => {
            conn.script_set(ScriptSet {
                key: &script.key,
                device: &script.device,
                blob: &blob,
            })
            .await
        }
    }
    .map_err(|err| {
        let err = ProvisionError::Upload {
            kind,
            key: key.to_string(),
            message: err.to_string(),
        };
        error!("{err}");
        err
    })?;

    if reply != SUCCESS_REPLY {
        let err = ProvisionError::UnexpectedReply {
            kind,
            key: key.to_string(),
            reply,
        };
        error!("{err}");
        return Err(err);
    }

    info!(%kind, key, bytes = blob.len(), "created RedisAI key");
    Ok(Provisioning::Created)
}

async fn read_blob(kind: ResourceKind, path: &Path) -> Result<Bytes, ProvisionError> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Bytes::from(contents)),
        Err(source) => {
            let err = ProvisionError::ReadBlob {
                kind,
                path: path.to_path_buf(),
                source,
            };
            error!("{err}");
            Err(err)
        }
    }
}
