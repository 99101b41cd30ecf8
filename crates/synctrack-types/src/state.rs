//! Connection checkpoint state in its three shapes.
//!
//! - [`StateWrapper`] is what a state store persists. It has no "not set"
//!   variant: absence of a checkpoint is `Option::None` at the store boundary.
//! - [`ConnectionCheckpoint`] is the domain union, exactly one payload per
//!   [`ConnectionStateType`].
//! - [`ConnectionState`] is the flat wire value exchanged with API layers,
//!   with one optional field per payload. It is validated into a
//!   [`ConnectionCheckpoint`] before anything is written.
//!
//! The protocol-level [`StateType`] has three variants while the wire-level
//! [`ConnectionStateType`] has four. The mapping is not a bijection:
//! `NotSet` has no protocol counterpart and only ever appears at the
//! "no checkpoint yet" boundary.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::StreamDescriptor;
use crate::job::ConnectionId;

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

/// Protocol-level state type, as carried by stored checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    Global,
    Stream,
    Legacy,
}

impl StateType {
    pub const ALL: [Self; 3] = [Self::Global, Self::Stream, Self::Legacy];

    /// Storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Stream => "stream",
            Self::Legacy => "legacy",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "global" => Some(Self::Global),
            "stream" => Some(Self::Stream),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-level state type of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStateType {
    /// No checkpoint has been written yet.
    NotSet,
    Legacy,
    Global,
    Stream,
}

impl ConnectionStateType {
    pub const ALL: [Self; 4] = [Self::NotSet, Self::Legacy, Self::Global, Self::Stream];

    /// Protocol-level counterpart; `None` for [`ConnectionStateType::NotSet`].
    #[must_use]
    pub fn state_type(self) -> Option<StateType> {
        match self {
            Self::NotSet => None,
            Self::Legacy => Some(StateType::Legacy),
            Self::Global => Some(StateType::Global),
            Self::Stream => Some(StateType::Stream),
        }
    }
}

impl From<StateType> for ConnectionStateType {
    fn from(value: StateType) -> Self {
        match value {
            StateType::Global => Self::Global,
            StateType::Stream => Self::Stream,
            StateType::Legacy => Self::Legacy,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Resumption point of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub stream_descriptor: StreamDescriptor,
    #[serde(default)]
    pub stream_state: Value,
}

/// Shared resumption point plus auxiliary per-stream cursors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    #[serde(default)]
    pub shared_state: Value,
    #[serde(default)]
    pub stream_states: Vec<StreamState>,
}

/// Persisted checkpoint of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StateWrapper {
    /// Opaque blob predating per-stream checkpointing.
    Legacy(Value),
    Global(GlobalState),
    Stream(Vec<StreamState>),
}

impl StateWrapper {
    #[must_use]
    pub fn state_type(&self) -> StateType {
        match self {
            Self::Legacy(_) => StateType::Legacy,
            Self::Global(_) => StateType::Global,
            Self::Stream(_) => StateType::Stream,
        }
    }
}

/// Domain view of a connection's checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCheckpoint {
    NotSet,
    Legacy(Value),
    Global(GlobalState),
    Stream(Vec<StreamState>),
}

impl ConnectionCheckpoint {
    #[must_use]
    pub fn state_type(&self) -> ConnectionStateType {
        match self {
            Self::NotSet => ConnectionStateType::NotSet,
            Self::Legacy(_) => ConnectionStateType::Legacy,
            Self::Global(_) => ConnectionStateType::Global,
            Self::Stream(_) => ConnectionStateType::Stream,
        }
    }

    /// Storage form; `None` means "erase whatever is stored".
    #[must_use]
    pub fn into_wrapper(self) -> Option<StateWrapper> {
        match self {
            Self::NotSet => None,
            Self::Legacy(blob) => Some(StateWrapper::Legacy(blob)),
            Self::Global(global) => Some(StateWrapper::Global(global)),
            Self::Stream(streams) => Some(StateWrapper::Stream(streams)),
        }
    }

    /// Wire form for `connection_id`, with only the matching payload set.
    #[must_use]
    pub fn into_wire(self, connection_id: ConnectionId) -> ConnectionState {
        let state_type = self.state_type();
        let mut wire = ConnectionState {
            connection_id,
            state_type,
            state: None,
            global_state: None,
            stream_state: None,
        };
        match self {
            Self::NotSet => {}
            Self::Legacy(blob) => wire.state = Some(blob),
            Self::Global(global) => wire.global_state = Some(global),
            Self::Stream(streams) => wire.stream_state = Some(streams),
        }
        wire
    }
}

impl From<Option<StateWrapper>> for ConnectionCheckpoint {
    fn from(value: Option<StateWrapper>) -> Self {
        match value {
            None => Self::NotSet,
            Some(StateWrapper::Legacy(blob)) => Self::Legacy(blob),
            Some(StateWrapper::Global(global)) => Self::Global(global),
            Some(StateWrapper::Stream(streams)) => Self::Stream(streams),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire value
// ---------------------------------------------------------------------------

/// Connection state as exchanged with API layers.
///
/// Exactly the payload field matching `state_type` is populated; `NotSet`
/// populates none. Use [`ConnectionCheckpoint::try_from`] to validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connection_id: ConnectionId,
    pub state_type: ConnectionStateType,
    /// Legacy blob. An explicit JSON `null` is a present blob.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_state: Option<GlobalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_state: Option<Vec<StreamState>>,
}

impl ConnectionState {
    /// Wire value for a connection without a checkpoint.
    #[must_use]
    pub fn not_set(connection_id: ConnectionId) -> Self {
        ConnectionCheckpoint::NotSet.into_wire(connection_id)
    }
}

/// Any value present under the field, `null` included. Absence is handled
/// by `#[serde(default)]`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Rejection of a wire state whose payload does not match its type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed connection state: {reason}")]
pub struct MalformedState {
    pub reason: String,
}

impl MalformedState {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

fn check_unique_streams(streams: &[StreamState]) -> Result<(), MalformedState> {
    let mut seen = HashSet::with_capacity(streams.len());
    for s in streams {
        if !seen.insert(&s.stream_descriptor) {
            return Err(MalformedState::new(format!(
                "stream '{}' appears more than once",
                s.stream_descriptor
            )));
        }
    }
    Ok(())
}

impl TryFrom<ConnectionState> for ConnectionCheckpoint {
    type Error = MalformedState;

    fn try_from(wire: ConnectionState) -> Result<Self, Self::Error> {
        let populated = usize::from(wire.state.is_some())
            + usize::from(wire.global_state.is_some())
            + usize::from(wire.stream_state.is_some());
        if populated > 1 {
            return Err(MalformedState::new(
                "more than one of state, global_state, stream_state is populated",
            ));
        }

        match (wire.state_type, wire.state, wire.global_state, wire.stream_state) {
            (ConnectionStateType::NotSet, None, None, None) => Ok(Self::NotSet),
            (ConnectionStateType::NotSet, ..) => {
                Err(MalformedState::new("state_type not_set carries a payload"))
            }
            (ConnectionStateType::Legacy, Some(blob), None, None) => Ok(Self::Legacy(blob)),
            (ConnectionStateType::Global, None, Some(global), None) => {
                check_unique_streams(&global.stream_states)?;
                Ok(Self::Global(global))
            }
            (ConnectionStateType::Stream, None, None, Some(streams)) => {
                if streams.is_empty() {
                    return Err(MalformedState::new(
                        "state_type stream requires at least one stream state",
                    ));
                }
                check_unique_streams(&streams)?;
                Ok(Self::Stream(streams))
            }
            (ty, ..) => Err(MalformedState::new(format!(
                "payload does not match state_type {ty:?}"
            ))),
        }
    }
}
