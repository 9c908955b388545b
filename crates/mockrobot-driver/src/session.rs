//! [`DriverSession`] – the driver's persistent state between UI calls.
//!
//! The session answers three questions: is the robot connected (and to
//! which address), has it been homed, and is a process in flight.  Only
//! [`MockRobotDriver`][crate::MockRobotDriver] holds one.
//!
//! "In flight" is modelled as a *claim*.  A UI call takes the claim before
//! it sends its first command and gives it back once every process it
//! started has reached a terminal state, so a `Transfer` keeps the claim
//! across both of its legs.  Once the robot has started a process the claim
//! carries its id, and keeps the most recent one until it is released.
//!
//! Opening a connection is tracked separately: the address being dialled is
//! recorded before the socket connects, so the session lock never has to be
//! held while the connect blocks.

use mockrobot_types::{ConnectionError, ProcessId, StateError};

/// Read-only view of a [`DriverSession`], handed to UIs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub ip_address: Option<String>,
    /// Address of a connection attempt still in progress.
    pub connecting: Option<String>,
    pub homed: bool,
    pub busy: bool,
    pub current_process: Option<ProcessId>,
}

impl SessionStatus {
    pub fn connected(&self) -> bool {
        self.ip_address.is_some()
    }
}

#[derive(Debug, Default)]
struct Claim {
    process: Option<ProcessId>,
}

#[derive(Debug, Default)]
pub struct DriverSession {
    ip_address: Option<String>,
    connecting: Option<String>,
    homed: bool,
    claim: Option<Claim>,
}

impl DriverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.ip_address.is_some()
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// `true` while a UI call holds the claim.
    pub fn is_busy(&self) -> bool {
        self.claim.is_some()
    }

    pub fn current_process(&self) -> Option<ProcessId> {
        self.claim.as_ref().and_then(|c| c.process)
    }

    /// Reserve the session for a connection attempt to `ip_address`.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnected`] naming the open (or currently
    /// dialled) address.
    pub fn begin_connect(&mut self, ip_address: &str) -> Result<(), ConnectionError> {
        if let Some(current) = self.ip_address.as_ref().or(self.connecting.as_ref()) {
            return Err(ConnectionError::AlreadyConnected(current.clone()));
        }
        self.connecting = Some(ip_address.to_string());
        Ok(())
    }

    /// End the attempt started by [`begin_connect`][Self::begin_connect].
    pub fn finish_connect(&mut self, connected: bool) {
        if let Some(ip_address) = self.connecting.take()
            && connected
        {
            self.ip_address = Some(ip_address);
        }
    }

    /// Record the homing outcome.  A disconnected session is never homed.
    pub fn set_homed(&mut self, homed: bool) {
        self.homed = homed && self.is_connected();
    }

    /// Take the in-flight claim.
    ///
    /// # Errors
    ///
    /// [`StateError::ProcessAlreadyRunning`] naming the running process when
    /// another call already holds the claim.
    pub fn claim(&mut self) -> Result<(), StateError> {
        if self.claim.is_some() {
            return Err(StateError::ProcessAlreadyRunning(self.current_process()));
        }
        self.claim = Some(Claim::default());
        Ok(())
    }

    /// Attach the id of the process the claim holder just started.
    pub fn set_process(&mut self, id: ProcessId) {
        if let Some(claim) = self.claim.as_mut() {
            claim.process = Some(id);
        }
    }

    pub fn release(&mut self) {
        self.claim = None;
    }

    /// Back to the disconnected state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            ip_address: self.ip_address.clone(),
            connecting: self.connecting.clone(),
            homed: self.homed,
            busy: self.is_busy(),
            current_process: self.current_process(),
        }
    }
}
