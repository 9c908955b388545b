//! `mockrobot-driver` – device driver for the MockRobot arm.
//!
//! Translates the UI's four buttons into the robot's text protocol over one
//! persistent TCP connection, and tracks whether a long-running robot
//! process is in flight.
//!
//! # Modules
//!
//! - [`validator`] – [`OperationValidator`][validator::OperationValidator]:
//!   checks operation, parameter names and parameter values before anything
//!   reaches the wire.
//! - [`connection`] – [`ConnectionManager`][connection::ConnectionManager]:
//!   owns the socket; the single send/await-reply chokepoint.
//! - [`protocol`] – [`CommandProtocol`][protocol::CommandProtocol]: encodes
//!   commands and classifies replies.
//! - [`ticker`] – [`Ticker`][ticker::Ticker] and
//!   [`CancelHandle`][ticker::CancelHandle]: interruptible poll wait.
//! - [`monitor`] – [`ProcessMonitor`][monitor::ProcessMonitor]: polls a
//!   started process until it finishes, fails or times out.
//! - [`session`] – [`DriverSession`][session::DriverSession]: connected /
//!   homed / in-flight state.
//! - [`driver`] – [`MockRobotDriver`]: the UI-facing state machine.
//! - [`sim`] – [`SimRobot`][sim::SimRobot]: simulated onboard software for
//!   tests and offline demos.

pub mod config;
pub mod connection;
pub mod driver;
pub mod monitor;
pub mod protocol;
pub mod session;
pub mod sim;
pub mod ticker;
pub mod validator;

pub use config::DriverConfig;
pub use driver::{MockRobotDriver, into_message};
pub use session::SessionStatus;
pub use ticker::CancelHandle;
