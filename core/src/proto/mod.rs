mod packet;
mod state;

pub use packet::{
    ClientAction, ClientPacket, ServerAction, ServerPacket, Target, WorkerType,
};
pub use state::{ButtonAction, ButtonConfig, ClientObject, StateMode, WorkerState};
