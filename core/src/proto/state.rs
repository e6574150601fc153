use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::PacketError;

/// Opaque payload attached to a button and echoed back verbatim when the
/// button is selected. Its meaning belongs to the worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientObject {
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<Value>),
    Object(Map<String, Value>),
}

impl Default for ClientObject {
    fn default() -> Self {
        ClientObject::Bool(true)
    }
}

impl From<bool> for ClientObject {
    fn from(v: bool) -> Self {
        ClientObject::Bool(v)
    }
}

impl From<i64> for ClientObject {
    fn from(v: i64) -> Self {
        ClientObject::Number(v.into())
    }
}

impl From<&str> for ClientObject {
    fn from(v: &str) -> Self {
        ClientObject::Text(v.to_string())
    }
}

impl From<String> for ClientObject {
    fn from(v: String) -> Self {
        ClientObject::Text(v)
    }
}

/// What the local side does when a button is selected, besides echoing the
/// client object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonAction {
    #[default]
    None,
    OpenLog,
    #[serde(alias = "EXPORT_CONTENT")]
    ExportArchive,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(alias = "text")]
    pub label: String,

    #[serde(default, alias = "shared_action")]
    pub action: ButtonAction,

    #[serde(default)]
    pub client_object: ClientObject,
}

impl ButtonConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::None,
            client_object: ClientObject::default(),
        }
    }

    pub fn with_action(mut self, action: ButtonAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_client_object(mut self, client_object: impl Into<ClientObject>) -> Self {
        self.client_object = client_object.into();
        self
    }
}

/// What should currently be presented for one worker.
///
/// Progressive when `buttons` is absent, selective when it holds at least
/// one button. `Some(vec![])` never survives decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub note: String,

    #[serde(default)]
    pub hint: String,

    #[serde(default = "default_indeterminate")]
    pub indeterminate: bool,

    #[serde(default, alias = "button_configs")]
    pub buttons: Option<Vec<ButtonConfig>>,
}

fn default_indeterminate() -> bool {
    true
}

/// Borrowed view used by presenters to pick a layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateMode<'a> {
    Progressive { indeterminate: bool },
    Selective { buttons: &'a [ButtonConfig] },
}

impl WorkerState {
    pub fn progressive(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            hint: String::new(),
            indeterminate: default_indeterminate(),
            buttons: None,
        }
    }

    pub fn selective(note: impl Into<String>, buttons: Vec<ButtonConfig>) -> Self {
        Self {
            note: note.into(),
            hint: String::new(),
            indeterminate: default_indeterminate(),
            buttons: Some(buttons),
        }
    }

    /// Local placeholder shown between dispatch and the first state packet.
    pub fn connecting() -> Self {
        Self::progressive("Connecting to ChromeDriver...")
            .with_hint("This may take a while on the first run.")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn determinate(mut self) -> Self {
        self.indeterminate = false;
        self
    }

    pub fn is_progressive(&self) -> bool {
        self.buttons.is_none()
    }

    pub fn is_selective(&self) -> bool {
        self.buttons.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn mode(&self) -> StateMode<'_> {
        match self.buttons.as_deref() {
            Some(buttons) => StateMode::Selective { buttons },
            None => StateMode::Progressive {
                indeterminate: self.indeterminate,
            },
        }
    }

    pub fn validate(&self) -> Result<(), PacketError> {
        if self.buttons.as_ref().is_some_and(|b| b.is_empty()) {
            return Err(PacketError::InvalidState(
                "selective state must carry at least one button",
            ));
        }
        Ok(())
    }
}
