//! `mockrobot-types` – shared vocabulary for the MockRobot driver stack.
//!
//! Everything that crosses a crate boundary lives here: the operations a UI
//! may request, the process identifiers and statuses reported by the robot's
//! onboard software, and the error taxonomy that the driver renders into the
//! UI-facing result strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter name carrying the location a `Pick` takes from.
pub const SOURCE_LOCATION: &str = "Source Location";
/// Parameter name carrying the location a `Place` puts to.
pub const DESTINATION_LOCATION: &str = "Destination Location";
/// Every parameter name the UI is allowed to send.
pub const VALID_PARAMETER_NAMES: [&str; 2] = [SOURCE_LOCATION, DESTINATION_LOCATION];

// ────────────────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────────────────

/// High-level operations the UI can ask the robot to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Pick an object up from `Source Location`.
    Pick,
    /// Put the held object down at `Destination Location`.
    Place,
    /// Pick from `Source Location`, then place at `Destination Location`.
    Transfer,
}

impl Operation {
    /// The name the UI uses for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Pick => "Pick",
            Operation::Place => "Place",
            Operation::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pick" => Ok(Operation::Pick),
            "Place" => Ok(Operation::Place),
            "Transfer" => Ok(Operation::Transfer),
            other => Err(ValidationError::InvalidOperation(other.to_string())),
        }
    }
}

/// A request exactly as received from the UI, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<i64>,
}

impl OperationRequest {
    pub fn new(
        operation: Operation,
        parameter_names: impl IntoIterator<Item = impl Into<String>>,
        parameter_values: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            operation,
            parameter_names: parameter_names.into_iter().map(Into::into).collect(),
            parameter_values: parameter_values.into_iter().collect(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Processes
// ────────────────────────────────────────────────────────────────────────────

/// Identifier the onboard software assigns to a process when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a process as reported by a `status%<id>` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    InProgress,
    FinishedSuccessfully,
    TerminatedWithError,
}

impl ProcessStatus {
    /// Exact text the onboard software sends for this status.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ProcessStatus::InProgress => "In Progress",
            ProcessStatus::FinishedSuccessfully => "Finished Successfully",
            ProcessStatus::TerminatedWithError => "Terminated With Error",
        }
    }

    /// Parse a status reply. Surrounding whitespace is ignored; anything else
    /// must match exactly.
    pub fn from_wire(text: &str) -> Option<Self> {
        match text.trim() {
            "In Progress" => Some(ProcessStatus::InProgress),
            "Finished Successfully" => Some(ProcessStatus::FinishedSuccessfully),
            "Terminated With Error" => Some(ProcessStatus::TerminatedWithError),
            _ => None,
        }
    }

    /// `true` once no further polling is needed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::InProgress)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures of the TCP link itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error(
        "Connection already open on {0}. Press 'Abort' to close the current connection \
         before attempting to establish a new one"
    )]
    AlreadyConnected(String),

    #[error("Error: Failed to connect: {0}. Make sure the robot is on and connected to power.")]
    ConnectFailed(String),

    #[error(
        "Error: MockRobot is not connected. Press 'Open Connection' and then try your request again."
    )]
    NotConnected,

    #[error("Error: Timeout waiting for response. Check connection.")]
    ResponseTimeout,

    #[error("Error: Connection closed by the robot.")]
    ConnectionClosed,

    #[error("Error: Socket failure: {0}")]
    Io(String),
}

/// Calls made in the wrong driver state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error(
        "Error: MockRobot is not initialized. Press 'Initialize' and then try your request again."
    )]
    NotInitialized,

    #[error(
        "Error: Another process is already running (process_id:{}). \
         Please wait for it to complete and try again",
        describe_process(.0)
    )]
    ProcessAlreadyRunning(Option<ProcessId>),
}

fn describe_process(id: &Option<ProcessId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "pending".to_string(),
    }
}

/// Rejections of a UI request before anything is sent to the robot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "Validation Error: Invalid operation: {0}. Supported operations are Pick, Place, and Transfer."
    )]
    InvalidOperation(String),

    #[error(
        "Validation Error: Invalid parameter name: {0}. \
         Select from valid names: Source Location, Destination Location"
    )]
    InvalidParameterName(String),

    #[error("Validation Error: Invalid parameter value: {value}. Select from valid range: {min}..={max}")]
    InvalidParameterValue { value: i64, min: i64, max: i64 },

    #[error("Validation Error: {operation} requires the parameter '{name}'")]
    MissingParameter { operation: Operation, name: String },

    #[error(
        "Validation Error: {names} parameter name(s) were given with {values} parameter value(s)"
    )]
    ParameterCountMismatch { names: usize, values: usize },
}

/// Failures while exchanging a command with the onboard software.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Error: Unknown response: {0}")]
    MalformedResponse(String),

    #[error("Robot reported {0}")]
    RemoteError(String),

    #[error(
        "Error: The robot reports another process is already running. \
         Please wait for it to complete and try again"
    )]
    ProcessAlreadyRunning,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Terminal outcomes of watching a started process, other than success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Error, process {0} terminated with error")]
    Terminated(ProcessId),

    #[error("Error, status of process {id} could not be retrieved: {source}")]
    Status {
        id: ProcessId,
        #[source]
        source: ProtocolError,
    },

    #[error("Error: Process {id} timeout after {secs}s. Consider hard reset of instrument.")]
    Timeout { id: ProcessId, secs: u64 },

    #[error(
        "Error: Monitoring of process {0} was cancelled and its state is unknown. \
         Consider hard reset of instrument."
    )]
    Cancelled(ProcessId),
}

impl MonitorError {
    /// `true` when the robot's real state is unknown to the driver.
    pub fn requires_hard_reset(&self) -> bool {
        matches!(self, MonitorError::Timeout { .. } | MonitorError::Cancelled(_))
    }
}

/// Which driver step a command failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialization,
    Pick,
    Place,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Initialization => f.write_str("Initialization"),
            Stage::Pick => f.write_str("Pick command"),
            Stage::Place => f.write_str("Place command"),
        }
    }
}

/// Everything a UI-facing driver call can fail with.
///
/// The driver converts this into the plain message string the UI expects via
/// its `Display` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{stage} not started: {source}")]
    NotStarted {
        stage: Stage,
        #[source]
        source: ProtocolError,
    },

    #[error("{stage} started but errored before completion: {source}")]
    Incomplete {
        stage: Stage,
        #[source]
        source: MonitorError,
    },
}

impl DriverError {
    /// `true` when the failure left the robot in an unknown state.
    pub fn requires_hard_reset(&self) -> bool {
        match self {
            DriverError::Incomplete { source, .. } => source.requires_hard_reset(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_ui_names() {
        assert_eq!("Pick".parse::<Operation>().unwrap(), Operation::Pick);
        assert_eq!("Place".parse::<Operation>().unwrap(), Operation::Place);
        assert_eq!("Transfer".parse::<Operation>().unwrap(), Operation::Transfer);
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let err = "Make smoothie".parse::<Operation>().unwrap_err();
        assert_eq!(err, ValidationError::InvalidOperation("Make smoothie".into()));
        assert!(err.to_string().contains("Validation Error: Invalid operation"));
        // Names are case-sensitive, matching the UI contract.
        assert!("pick".parse::<Operation>().is_err());
    }

    #[test]
    fn operation_serializes_as_ui_name() {
        let json = serde_json::to_string(&Operation::Transfer).unwrap();
        assert_eq!(json, "\"Transfer\"");
    }

    #[test]
    fn status_wire_text() {
        assert_eq!(
            ProcessStatus::from_wire("Finished Successfully\n"),
            Some(ProcessStatus::FinishedSuccessfully)
        );
        assert_eq!(ProcessStatus::from_wire("In Progress"), Some(ProcessStatus::InProgress));
        assert_eq!(
            ProcessStatus::from_wire("Terminated With Error"),
            Some(ProcessStatus::TerminatedWithError)
        );
        assert_eq!(ProcessStatus::from_wire("finished successfully"), None);
        assert!(!ProcessStatus::InProgress.is_terminal());
        assert!(ProcessStatus::TerminatedWithError.is_terminal());
    }

    #[test]
    fn process_running_message_names_the_process() {
        let err = StateError::ProcessAlreadyRunning(Some(ProcessId(7)));
        let msg = err.to_string();
        assert!(msg.contains("already running"));
        assert!(msg.contains("process_id:7"));

        let pending = StateError::ProcessAlreadyRunning(None).to_string();
        assert!(pending.contains("process_id:pending"));
    }

    #[test]
    fn driver_error_messages_carry_stage() {
        let err = DriverError::NotStarted {
            stage: Stage::Initialization,
            source: ProtocolError::RemoteError("Error: arm jammed".into()),
        };
        assert_eq!(
            err.to_string(),
            "Initialization not started: Robot reported Error: arm jammed"
        );

        let err = DriverError::Incomplete {
            stage: Stage::Pick,
            source: MonitorError::Timeout { id: ProcessId(3), secs: 300 },
        };
        assert!(err.to_string().starts_with("Pick command started but errored"));
        assert!(err.to_string().contains("Consider hard reset"));
        assert!(err.requires_hard_reset());
    }

    #[test]
    fn transparent_errors_keep_inner_message() {
        let err: DriverError = ConnectionError::NotConnected.into();
        assert_eq!(err.to_string(), ConnectionError::NotConnected.to_string());
        assert!(!err.requires_hard_reset());
    }
}
