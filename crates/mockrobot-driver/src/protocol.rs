//! [`CommandProtocol`] – encoding of robot commands and decoding of replies.
//!
//! Commands are plain text, `<verb>%<param>%<param>…`:
//!
//! | Command | Wire text |
//! |---|---|
//! | [`Command::Home`] | `home` |
//! | [`Command::Pick`] | `pick%<location>` |
//! | [`Command::Place`] | `place%<location>` |
//! | [`Command::Status`] | `status%<process id>` |
//!
//! A reply to a process-starting command is a non-negative process id, a
//! negative number when another process is already running, or
//! `Error: <text>`.  A reply to a status query is one of the three
//! [`ProcessStatus`] texts.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use mockrobot_types::{ConnectionError, ProcessId, ProcessStatus, ProtocolError};
use tracing::{debug, info};

use crate::connection::ConnectionManager;

/// Prefix the onboard software puts in front of every error reply.
pub const REMOTE_ERROR_PREFIX: &str = "Error:";

// ────────────────────────────────────────────────────────────────────────────
// Transport seam
// ────────────────────────────────────────────────────────────────────────────

/// One request/reply exchange with the robot.
///
/// [`Mutex<ConnectionManager>`] is the production implementation; tests swap
/// in scripted transports.
pub trait Transport: Send + Sync {
    fn exchange(&self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, ConnectionError>;
}

impl Transport for Mutex<ConnectionManager> {
    fn exchange(&self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, ConnectionError> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_and_await_readable(payload, timeout)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// A command understood by the onboard software.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Home,
    Pick(i64),
    Place(i64),
    Status(ProcessId),
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Home => "home",
            Command::Pick(_) => "pick",
            Command::Place(_) => "place",
            Command::Status(_) => "status",
        }
    }

    /// Wire representation, e.g. `pick%10`.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Home => f.write_str(self.verb()),
            Command::Pick(location) | Command::Place(location) => {
                write!(f, "{}%{location}", self.verb())
            }
            Command::Status(id) => write!(f, "{}%{id}", self.verb()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Protocol engine
// ────────────────────────────────────────────────────────────────────────────

/// Sends commands over a [`Transport`] and classifies the replies.
pub struct CommandProtocol<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<T: Transport + ?Sized> Clone for CommandProtocol<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Transport + ?Sized> Copy for CommandProtocol<'_, T> {}

impl<'a, T: Transport + ?Sized> CommandProtocol<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Send a process-starting command and return the id the robot assigned.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RemoteError`] for an `Error:` reply.
    /// - [`ProtocolError::ProcessAlreadyRunning`] for a negative id.
    /// - [`ProtocolError::MalformedResponse`] for anything else that is not a
    ///   clean non-negative integer.
    /// - [`ProtocolError::Connection`] when the exchange itself fails.
    pub fn start_process(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<ProcessId, ProtocolError> {
        let reply = self.send(command, timeout)?;
        let id = parse_start_reply(&reply)?;
        info!(command = %command, process_id = %id, "process started");
        Ok(id)
    }

    /// Ask the robot for the status of `process_id`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::RemoteError`] for an `Error:` reply,
    /// [`ProtocolError::MalformedResponse`] for an unknown status text and
    /// [`ProtocolError::Connection`] when the exchange fails or times out.
    pub fn query_status(
        &self,
        process_id: ProcessId,
        timeout: Duration,
    ) -> Result<ProcessStatus, ProtocolError> {
        let reply = self.send(&Command::Status(process_id), timeout)?;
        let status = parse_status_reply(&reply)?;
        debug!(process_id = %process_id, status = %status, "status polled");
        Ok(status)
    }

    fn send(&self, command: &Command, timeout: Duration) -> Result<String, ProtocolError> {
        let bytes = self
            .transport
            .exchange(command.encode().as_bytes(), timeout)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Classify the reply to `home`, `pick` or `place`.
pub fn parse_start_reply(reply: &str) -> Result<ProcessId, ProtocolError> {
    let text = reply.trim();
    if text.starts_with(REMOTE_ERROR_PREFIX) {
        return Err(ProtocolError::RemoteError(text.to_string()));
    }
    if let Some(digits) = text.strip_prefix('-')
        && is_integer(digits)
    {
        return Err(ProtocolError::ProcessAlreadyRunning);
    }
    if is_integer(text)
        && let Ok(id) = text.parse::<u64>()
    {
        return Ok(ProcessId(id));
    }
    Err(ProtocolError::MalformedResponse(text.to_string()))
}

/// Classify the reply to `status%<id>`.
pub fn parse_status_reply(reply: &str) -> Result<ProcessStatus, ProtocolError> {
    let text = reply.trim();
    if text.starts_with(REMOTE_ERROR_PREFIX) {
        return Err(ProtocolError::RemoteError(text.to_string()));
    }
    ProcessStatus::from_wire(text).ok_or_else(|| ProtocolError::MalformedResponse(text.to_string()))
}

fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn commands_encode_with_percent_separator() {
        assert_eq!(Command::Home.encode(), "home");
        assert_eq!(Command::Pick(10).encode(), "pick%10");
        assert_eq!(Command::Place(3).encode(), "place%3");
        assert_eq!(Command::Status(ProcessId(42)).encode(), "status%42");
    }

    #[test]
    fn start_reply_classification() {
        assert_eq!(parse_start_reply("17"), Ok(ProcessId(17)));
        assert_eq!(parse_start_reply("0\n"), Ok(ProcessId(0)));
        assert_eq!(parse_start_reply("-1"), Err(ProtocolError::ProcessAlreadyRunning));
        assert_eq!(
            parse_start_reply("Error: gripper fault"),
            Err(ProtocolError::RemoteError("Error: gripper fault".into()))
        );
    }

    #[test]
    fn start_reply_must_be_a_clean_integer() {
        for bad in ["12%done", "twelve", "", "-", "+5", "1.5", "-x"] {
            assert_eq!(
                parse_start_reply(bad),
                Err(ProtocolError::MalformedResponse(bad.trim().to_string())),
                "reply {bad:?}"
            );
        }
    }

    #[test]
    fn status_reply_classification() {
        assert_eq!(parse_status_reply("In Progress"), Ok(ProcessStatus::InProgress));
        assert_eq!(
            parse_status_reply("Finished Successfully\r\n"),
            Ok(ProcessStatus::FinishedSuccessfully)
        );
        assert!(matches!(
            parse_status_reply("Error: unknown process"),
            Err(ProtocolError::RemoteError(_))
        ));
        assert_eq!(
            parse_status_reply("Sleeping"),
            Err(ProtocolError::MalformedResponse("Sleeping".into()))
        );
    }

    #[test]
    fn start_process_sends_encoded_command() {
        let transport = ScriptedTransport::replying(["5"]);
        let protocol = CommandProtocol::new(&transport);
        let id = protocol.start_process(&Command::Pick(10), T).unwrap();
        assert_eq!(id, ProcessId(5));
        assert_eq!(transport.sent(), vec!["pick%10".to_string()]);
    }

    #[test]
    fn query_status_sends_process_id() {
        let transport = ScriptedTransport::replying(["Terminated With Error"]);
        let protocol = CommandProtocol::new(&transport);
        let status = protocol.query_status(ProcessId(9), T).unwrap();
        assert_eq!(status, ProcessStatus::TerminatedWithError);
        assert_eq!(transport.sent(), vec!["status%9".to_string()]);
    }

    #[test]
    fn transport_timeout_surfaces_as_protocol_error() {
        let transport = ScriptedTransport::default();
        let protocol = CommandProtocol::new(&transport);
        assert_eq!(
            protocol.start_process(&Command::Home, T),
            Err(ProtocolError::Connection(ConnectionError::ResponseTimeout))
        );
        assert_eq!(
            protocol.query_status(ProcessId(1), T),
            Err(ProtocolError::Connection(ConnectionError::ResponseTimeout))
        );
    }
}
