//! Stable re-exports for consumers (`cli` and external crates).
//!
//! Prefer importing from `archivist_core::api` instead of reaching into internal modules.

pub use crate::channel::{on_line, PacketChannel, PacketSink};
pub use crate::config::{
    load_default, load_from, AppConfig, ChannelConfig, LoggingConfig, ServerConfig,
    ShutdownConfig,
};
pub use crate::error::{
    ChannelError, ConfigError, CoreError, PacketError, SessionError, SupervisorError,
};
pub use crate::proto::{
    ButtonAction, ButtonConfig, ClientAction, ClientObject, ClientPacket, ServerAction,
    ServerPacket, StateMode, Target, WorkerState, WorkerType,
};
pub use crate::registry::{ListenerId, ListenerRegistry, ServerListener};
pub use crate::session::{
    DriverFailure, SessionEvent, SessionEvents, SessionHub, SessionPhase, TerminationReason,
    WorkerSession,
};
pub use crate::supervisor::{
    check_installation, executable_name, executable_path, normalize_exit, InstallationStatus,
    ProcessSupervisor, ShutdownOutcome,
};
