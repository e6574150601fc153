use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state::{ClientObject, WorkerState};
use crate::error::PacketError;

/// Kind of retrieval work a dispatched worker performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerType {
    MessengerWorker,
    TopicWorker,
    ForumWorker,
    BlogWorker,
}

impl WorkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::MessengerWorker => "MESSENGER_WORKER",
            WorkerType::TopicWorker => "TOPIC_WORKER",
            WorkerType::ForumWorker => "FORUM_WORKER",
            WorkerType::BlogWorker => "BLOG_WORKER",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase();
        let key = key.strip_suffix("_WORKER").unwrap_or(&key);
        match key {
            "MESSENGER" => Ok(WorkerType::MessengerWorker),
            "TOPIC" => Ok(WorkerType::TopicWorker),
            "FORUM" => Ok(WorkerType::ForumWorker),
            "BLOG" => Ok(WorkerType::BlogWorker),
            _ => Err(format!("unknown worker type: {s}")),
        }
    }
}

/// Work-source descriptor sent with a dispatch: which community to archive
/// from and which platform generation it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub root_url: String,
    pub version: u8,
}

impl Target {
    pub fn new(root_url: impl Into<String>, version: u8) -> Self {
        Self {
            root_url: root_url.into(),
            version,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    DispatchWorker {
        target: Target,
        worker_type: WorkerType,
    },
    StateInput {
        client_object: ClientObject,
    },
    TerminateWorker,
    Terminate,
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::DispatchWorker { .. } => "DISPATCH_WORKER",
            ClientAction::StateInput { .. } => "STATE_INPUT",
            ClientAction::TerminateWorker => "TERMINATE_WORKER",
            ClientAction::Terminate => "TERMINATE",
        }
    }
}

/// Outbound packet, written to the worker's stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPacket {
    pub worker_id: Option<String>,
    pub action: ClientAction,
}

impl ClientPacket {
    pub fn dispatch_worker(target: Target, worker_type: WorkerType) -> Self {
        Self {
            worker_id: None,
            action: ClientAction::DispatchWorker {
                target,
                worker_type,
            },
        }
    }

    pub fn state_input(worker_id: impl Into<String>, client_object: ClientObject) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            action: ClientAction::StateInput { client_object },
        }
    }

    pub fn terminate_worker(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            action: ClientAction::TerminateWorker,
        }
    }

    /// Global shutdown request; the worker process exits after handling it.
    pub fn terminate() -> Self {
        Self {
            worker_id: None,
            action: ClientAction::Terminate,
        }
    }

    pub fn encode(&self) -> Result<String, PacketError> {
        let mut data = Map::new();
        match &self.action {
            ClientAction::DispatchWorker {
                target,
                worker_type,
            } => {
                data.insert("target".into(), to_value(target)?);
                data.insert("worker_type".into(), Value::from(worker_type.as_str()));
            }
            ClientAction::StateInput { client_object } => {
                data.insert("client_object".into(), to_value(client_object)?);
            }
            ClientAction::TerminateWorker | ClientAction::Terminate => {}
        }
        WirePacket {
            worker_id: self.worker_id.clone(),
            action: self.action.name().to_string(),
            data,
        }
        .encode()
    }

    pub fn decode(line: &str) -> Result<Self, PacketError> {
        let wire = WirePacket::parse(line)?;
        let action = match wire.action.as_str() {
            "DISPATCH_WORKER" => ClientAction::DispatchWorker {
                target: wire.field_or_alias("DISPATCH_WORKER", "target", "ic")?,
                worker_type: wire.field("DISPATCH_WORKER", "worker_type")?,
            },
            "STATE_INPUT" => ClientAction::StateInput {
                client_object: wire.field("STATE_INPUT", "client_object")?,
            },
            "TERMINATE_WORKER" => ClientAction::TerminateWorker,
            "TERMINATE" => ClientAction::Terminate,
            other => return Err(PacketError::UnknownAction(other.to_string())),
        };
        Ok(Self {
            worker_id: wire.worker_id,
            action,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    UuidAvailable { uuid: String },
    ChromedriverStarted,
    ChromedriverError { stacktrace: String },
    StateChanged { state: WorkerState },
    ProgressUpdate { progress: f64 },
    ResultAvailable { path: PathBuf },
}

impl ServerAction {
    pub fn name(&self) -> &'static str {
        match self {
            ServerAction::UuidAvailable { .. } => "UUID_AVAILABLE",
            ServerAction::ChromedriverStarted => "CHROMEDRIVER_STARTED",
            ServerAction::ChromedriverError { .. } => "CHROMEDRIVER_ERROR",
            ServerAction::StateChanged { .. } => "STATE_CHANGED",
            ServerAction::ProgressUpdate { .. } => "PROGRESS_UPDATE",
            ServerAction::ResultAvailable { .. } => "RESULT_AVAILABLE",
        }
    }
}

/// Inbound packet, read from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerPacket {
    pub worker_id: Option<String>,
    pub action: ServerAction,
}

impl ServerPacket {
    pub fn new(worker_id: Option<String>, action: ServerAction) -> Self {
        Self { worker_id, action }
    }

    pub fn decode(line: &str) -> Result<Self, PacketError> {
        let wire = WirePacket::parse(line)?;
        let action = match wire.action.as_str() {
            "UUID_AVAILABLE" => ServerAction::UuidAvailable {
                uuid: wire.field("UUID_AVAILABLE", "uuid")?,
            },
            "CHROMEDRIVER_STARTED" => ServerAction::ChromedriverStarted,
            "CHROMEDRIVER_ERROR" => ServerAction::ChromedriverError {
                stacktrace: wire.field("CHROMEDRIVER_ERROR", "stacktrace")?,
            },
            "STATE_CHANGED" => {
                let state: WorkerState = wire.field("STATE_CHANGED", "state")?;
                state.validate()?;
                ServerAction::StateChanged { state }
            }
            "PROGRESS_UPDATE" => {
                let progress: f64 = wire.field("PROGRESS_UPDATE", "progress")?;
                ServerAction::ProgressUpdate {
                    progress: progress.clamp(0.0, 1.0),
                }
            }
            "RESULT_AVAILABLE" => ServerAction::ResultAvailable {
                path: wire.field("RESULT_AVAILABLE", "path")?,
            },
            other => return Err(PacketError::UnknownAction(other.to_string())),
        };
        Ok(Self {
            worker_id: wire.worker_id,
            action,
        })
    }

    pub fn encode(&self) -> Result<String, PacketError> {
        let mut data = Map::new();
        match &self.action {
            ServerAction::UuidAvailable { uuid } => {
                data.insert("uuid".into(), Value::from(uuid.as_str()));
            }
            ServerAction::ChromedriverStarted => {}
            ServerAction::ChromedriverError { stacktrace } => {
                data.insert("stacktrace".into(), Value::from(stacktrace.as_str()));
            }
            ServerAction::StateChanged { state } => {
                data.insert("state".into(), to_value(state)?);
            }
            ServerAction::ProgressUpdate { progress } => {
                data.insert("progress".into(), Value::from(*progress));
            }
            ServerAction::ResultAvailable { path } => {
                data.insert("path".into(), to_value(path)?);
            }
        }
        WirePacket {
            worker_id: self.worker_id.clone(),
            action: self.action.name().to_string(),
            data,
        }
        .encode()
    }
}

/// The shape shared by both directions on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WirePacket {
    #[serde(default)]
    worker_id: Option<String>,

    #[serde(alias = "shared_action")]
    action: String,

    #[serde(default)]
    data: Map<String, Value>,
}

impl WirePacket {
    fn parse(line: &str) -> Result<Self, PacketError> {
        serde_json::from_str(line.trim()).map_err(PacketError::InvalidJson)
    }

    fn encode(&self) -> Result<String, PacketError> {
        serde_json::to_string(self).map_err(PacketError::Encode)
    }

    fn field<T: DeserializeOwned>(
        &self,
        action: &'static str,
        field: &'static str,
    ) -> Result<T, PacketError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Err(PacketError::MissingField { action, field }),
            Some(v) => serde_json::from_value(v.clone()).map_err(|source| {
                PacketError::SchemaMismatch {
                    action,
                    field,
                    source,
                }
            }),
        }
    }

    fn field_or_alias<T: DeserializeOwned>(
        &self,
        action: &'static str,
        field: &'static str,
        alias: &'static str,
    ) -> Result<T, PacketError> {
        if self.data.contains_key(field) {
            self.field(action, field)
        } else {
            self.field(action, alias)
                .map_err(|_| PacketError::MissingField { action, field })
        }
    }
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, PacketError> {
    serde_json::to_value(v).map_err(PacketError::Encode)
}
