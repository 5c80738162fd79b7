//! Protocol constants
//!
//! Profile identifiers, message types, status codes and the context tags used by the
//! custom command envelope and the logical-circuit traits.

// ============================================================================
// Profiles
// ============================================================================

/// Common profile. Carries generic status codes and the status report message.
pub const PROFILE_COMMON: u32 = 0x0000_0000;
/// Data management profile. Carries command messages and their status codes.
pub const PROFILE_WDM: u32 = 0x0000_000B;

/// Vendor prefix shared by the lighting trait profiles.
const LIGHTING_VENDOR: u32 = 0x235A;

/// LogicalCircuitStateTrait: publishes `state` and `brightness`.
pub const LOGICAL_CIRCUIT_STATE_TRAIT_ID: u32 = (LIGHTING_VENDOR << 16) | 0x0237;
/// LogicalCircuitControlTrait: accepts SetLogicalCircuitState commands.
pub const LOGICAL_CIRCUIT_CONTROL_TRAIT_ID: u32 = (LIGHTING_VENDOR << 16) | 0x020D;

// ============================================================================
// Message Types
// ============================================================================

/// Status report (Common profile).
pub const MSG_TYPE_STATUS_REPORT: u8 = 0x01;
/// Custom command request expecting a response (WDM profile).
pub const MSG_TYPE_CUSTOM_COMMAND_REQUEST: u8 = 0x29;
/// Successful response to a custom command (WDM profile).
pub const MSG_TYPE_CUSTOM_COMMAND_RESPONSE: u8 = 0x2A;
/// Custom command sent without waiting for a response (WDM profile).
pub const MSG_TYPE_ONE_WAY_COMMAND: u8 = 0x2B;

// ============================================================================
// Status Codes
// ============================================================================

/// Common: operation succeeded.
pub const STATUS_SUCCESS: u16 = 0x0000;
/// Common: the request was malformed or carried invalid arguments.
pub const STATUS_BAD_REQUEST: u16 = 0x0010;
/// Common: the command type is not supported by the receiver.
pub const STATUS_UNSUPPORTED_MESSAGE: u16 = 0x0011;
/// Common: the receiver failed for a reason unrelated to the request.
pub const STATUS_INTERNAL_ERROR: u16 = 0x0050;
/// WDM: the command expired, or the receiver cannot tell the time.
pub const STATUS_REQUEST_EXPIRED_IN_TIME: u16 = 0x0024;
/// WDM: the must-be version did not match the published version.
pub const STATUS_VERSION_MISMATCH: u16 = 0x0025;

// ============================================================================
// Command Envelope Tags
// ============================================================================

/// Path to the target trait instance.
pub const CMD_TAG_PATH: u8 = 1;
/// Command type identifier.
pub const CMD_TAG_COMMAND_TYPE: u8 = 2;
/// Time the command was initiated (accepted, not interpreted).
pub const CMD_TAG_INITIATION_TIME: u8 = 3;
/// Time the command should take effect (accepted, not interpreted).
pub const CMD_TAG_ACTION_TIME: u8 = 4;
/// Expiry time in microseconds since the epoch.
pub const CMD_TAG_EXPIRY_TIME: u8 = 5;
/// Version the target trait must be at.
pub const CMD_TAG_MUST_BE_VERSION: u8 = 6;
/// Command-specific argument structure.
pub const CMD_TAG_ARGUMENT: u8 = 7;

/// Instance locator inside the path.
pub const PATH_TAG_INSTANCE_LOCATOR: u8 = 1;
/// Trait profile id inside the instance locator.
pub const PATH_TAG_TRAIT_PROFILE_ID: u8 = 1;
/// Trait instance id inside the instance locator.
pub const PATH_TAG_TRAIT_INSTANCE_ID: u8 = 2;

/// Trait version inside a command response.
pub const RESPONSE_TAG_VERSION: u8 = 1;

// ============================================================================
// LogicalCircuitControlTrait
// ============================================================================

/// SetLogicalCircuitState command id.
pub const SET_LOGICAL_CIRCUIT_STATE_REQUEST_ID: u32 = 1;
/// SetLogicalCircuitState parameter: circuit state.
pub const SET_STATE_PARAM_STATE: u8 = 1;
/// SetLogicalCircuitState parameter: level.
pub const SET_STATE_PARAM_LEVEL: u8 = 2;

/// Highest valid brightness level.
pub const MAX_LEVEL: u8 = 100;
/// Trait instance used by a single light.
pub const DEFAULT_TRAIT_INSTANCE: u32 = 0;
