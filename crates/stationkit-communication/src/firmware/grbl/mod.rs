//! GRBL controller protocol
//!
//! Wire tokens, status report parsing and the homing / move operations.

pub mod motion;
pub mod status_parser;

pub use motion::MotionProtocol;
pub use status_parser::StatusParser;

/// Run the homing cycle
pub const HOME_COMMAND: &str = "$H";
/// Real-time status report request
pub const STATUS_QUERY: &str = "?";
/// Affirmative acknowledgement line
pub const ACK: &str = "ok";
/// State name reported when motion has stopped
pub const IDLE_MARKER: &str = "Idle";
/// State name reported after a limit hit or abort
pub const ALARM_STATE: &str = "Alarm";
/// Prefix of a rejected command reply
pub const ERROR_PREFIX: &str = "error:";
