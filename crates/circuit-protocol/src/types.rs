//! Common types used in the protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ProtocolError;

// ============================================================================
// Circuit State
// ============================================================================

/// State of a logical circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit energised.
    On = 1,
    /// Circuit de-energised.
    Off = 2,
    /// Physical state disagrees with the logical one.
    Inconsistent = 3,
}

impl CircuitState {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether a remote command may request this state.
    pub fn is_commandable(self) -> bool {
        matches!(self, CircuitState::On | CircuitState::Off)
    }

    /// ON becomes OFF and OFF becomes ON. INCONSISTENT is returned unchanged.
    pub fn toggled(self) -> Self {
        match self {
            CircuitState::On => CircuitState::Off,
            CircuitState::Off => CircuitState::On,
            CircuitState::Inconsistent => CircuitState::Inconsistent,
        }
    }
}

impl TryFrom<u8> for CircuitState {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CircuitState::On),
            2 => Ok(CircuitState::Off),
            3 => Ok(CircuitState::Inconsistent),
            other => Err(ProtocolError::OutOfRange {
                field: "state",
                value: other as i128,
            }),
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(state: CircuitState) -> u8 {
        state.as_u8()
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::On => write!(f, "ON"),
            CircuitState::Off => write!(f, "OFF"),
            CircuitState::Inconsistent => write!(f, "INCONSISTENT"),
        }
    }
}

// ============================================================================
// Paths and Status
// ============================================================================

/// Address of a trait instance on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitPath {
    /// Trait profile id.
    pub profile_id: u32,
    /// Trait instance id.
    pub instance_id: u32,
}

impl TraitPath {
    /// Path to instance 0 of the control trait.
    pub fn circuit_control() -> Self {
        TraitPath {
            profile_id: LOGICAL_CIRCUIT_CONTROL_TRAIT_ID,
            instance_id: DEFAULT_TRAIT_INSTANCE,
        }
    }
}

/// A status code qualified by the profile that defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode {
    /// Defining profile.
    pub profile_id: u32,
    /// Code within the profile.
    pub code: u16,
}

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode::common(STATUS_SUCCESS);
    pub const BAD_REQUEST: StatusCode = StatusCode::common(STATUS_BAD_REQUEST);
    pub const UNSUPPORTED_MESSAGE: StatusCode = StatusCode::common(STATUS_UNSUPPORTED_MESSAGE);
    pub const INTERNAL_ERROR: StatusCode = StatusCode::common(STATUS_INTERNAL_ERROR);
    pub const REQUEST_EXPIRED_IN_TIME: StatusCode = StatusCode::wdm(STATUS_REQUEST_EXPIRED_IN_TIME);
    pub const VERSION_MISMATCH: StatusCode = StatusCode::wdm(STATUS_VERSION_MISMATCH);

    /// Status code from the Common profile.
    pub const fn common(code: u16) -> Self {
        StatusCode {
            profile_id: PROFILE_COMMON,
            code,
        }
    }

    /// Status code from the data management profile.
    pub const fn wdm(code: u16) -> Self {
        StatusCode {
            profile_id: PROFILE_WDM,
            code,
        }
    }

    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match (self.profile_id, self.code) {
            (PROFILE_COMMON, STATUS_SUCCESS) => "success",
            (PROFILE_COMMON, STATUS_BAD_REQUEST) => "bad_request",
            (PROFILE_COMMON, STATUS_UNSUPPORTED_MESSAGE) => "unsupported_message",
            (PROFILE_COMMON, STATUS_INTERNAL_ERROR) => "internal_error",
            (PROFILE_WDM, STATUS_REQUEST_EXPIRED_IN_TIME) => "request_expired_in_time",
            (PROFILE_WDM, STATUS_VERSION_MISMATCH) => "version_mismatch",
            _ => "unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X}:0x{:04X})", self.name(), self.profile_id, self.code)
    }
}

// ============================================================================
// Trait Schema
// ============================================================================

/// Property handles of the LogicalCircuitStateTrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PropertyHandle {
    /// The trait as a whole.
    Root = 1,
    /// `state`
    State = 2,
    /// `brightness`
    Brightness = 3,
}

/// Schema entry for one property handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Handle described by this entry.
    pub handle: PropertyHandle,
    /// Enclosing property.
    pub parent: PropertyHandle,
    /// Context tag of the property inside its parent.
    pub context_tag: u8,
    /// Property name.
    pub name: &'static str,
    /// Whether the property may be null.
    pub nullable: bool,
}

/// Leaf properties of the LogicalCircuitStateTrait, in tag order.
pub const CIRCUIT_STATE_PROPERTIES: &[PropertyInfo] = &[
    PropertyInfo {
        handle: PropertyHandle::State,
        parent: PropertyHandle::Root,
        context_tag: 1,
        name: "state",
        nullable: false,
    },
    PropertyInfo {
        handle: PropertyHandle::Brightness,
        parent: PropertyHandle::Root,
        context_tag: 2,
        name: "brightness",
        nullable: true,
    },
];

impl PropertyHandle {
    /// Look up a handle by its raw value.
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(PropertyHandle::Root),
            2 => Some(PropertyHandle::State),
            3 => Some(PropertyHandle::Brightness),
            _ => None,
        }
    }

    /// Raw handle value.
    pub fn raw(self) -> u16 {
        self as u16
    }

    /// Schema entry for a leaf property. The root has none.
    pub fn info(self) -> Option<&'static PropertyInfo> {
        CIRCUIT_STATE_PROPERTIES.iter().find(|p| p.handle == self)
    }
}

/// The traits a light controller publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitSource {
    /// LogicalCircuitStateTrait: readable state.
    CircuitState,
    /// LogicalCircuitControlTrait: commands only.
    CircuitControl,
}

impl TraitSource {
    /// Profile id of the trait.
    pub fn profile_id(self) -> u32 {
        match self {
            TraitSource::CircuitState => LOGICAL_CIRCUIT_STATE_TRAIT_ID,
            TraitSource::CircuitControl => LOGICAL_CIRCUIT_CONTROL_TRAIT_ID,
        }
    }

    /// Leaf properties of the trait.
    pub fn properties(self) -> &'static [PropertyInfo] {
        match self {
            TraitSource::CircuitState => CIRCUIT_STATE_PROPERTIES,
            TraitSource::CircuitControl => &[],
        }
    }
}

impl fmt::Display for TraitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitSource::CircuitState => write!(f, "LogicalCircuitStateTrait"),
            TraitSource::CircuitControl => write!(f, "LogicalCircuitControlTrait"),
        }
    }
}
