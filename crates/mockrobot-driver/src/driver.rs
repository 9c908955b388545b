//! [`MockRobotDriver`] – the four UI-facing verbs.
//!
//! | UI button | Method | Preconditions |
//! |---|---|---|
//! | Open Connection | [`open_connection`][MockRobotDriver::open_connection] | not connected |
//! | Initialize | [`initialize`][MockRobotDriver::initialize] | connected, idle |
//! | Execute Operation | [`execute_operation`][MockRobotDriver::execute_operation] | connected, homed, idle, valid request |
//! | Abort | [`abort`][MockRobotDriver::abort] | connected, idle |
//!
//! Each verb returns an empty string on success and a readable message on
//! failure.  The `try_*` variants return the underlying [`DriverError`]
//! instead.
//!
//! Calls block until every process they start has finished.  The driver is
//! `Sync`: a call made from another thread while a process is in flight is
//! refused with a process-running error rather than queued.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mockrobot_types::{
    ConnectionError, DriverError, OperationRequest, ProcessId, Stage, StateError,
};
use tracing::{error, info, warn};

use crate::config::DriverConfig;
use crate::connection::ConnectionManager;
use crate::monitor::ProcessMonitor;
use crate::protocol::{Command, CommandProtocol};
use crate::session::{DriverSession, SessionStatus};
use crate::ticker::CancelHandle;
use crate::validator::{OperationValidator, ValidatedOperation};

/// Render a driver result the way the UI expects it.
pub fn into_message(result: Result<(), DriverError>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    }
}

/// Driver for the MockRobot arm.
///
/// # Example
///
/// ```no_run
/// use mockrobot_driver::MockRobotDriver;
///
/// let driver = MockRobotDriver::new();
/// assert_eq!(driver.open_connection("192.168.1.1"), "");
/// assert_eq!(driver.initialize(), "");
/// assert_eq!(driver.execute_operation("Pick", &["Source Location"], &[10]), "");
/// assert_eq!(driver.abort(), "");
/// ```
pub struct MockRobotDriver {
    config: DriverConfig,
    validator: OperationValidator,
    session: Mutex<DriverSession>,
    link: Mutex<ConnectionManager>,
    cancel: CancelHandle,
}

impl Default for MockRobotDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRobotDriver {
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Self {
        Self {
            validator: OperationValidator::new(config.valid_range.clone()),
            link: Mutex::new(ConnectionManager::new(config.port, config.connect_timeout)),
            session: Mutex::new(DriverSession::new()),
            cancel: CancelHandle::new(),
            config,
        }
    }

    /// Snapshot of the session for display.
    pub fn status(&self) -> SessionStatus {
        self.session().status()
    }

    /// Handle that interrupts the poll wait of the process in flight.
    ///
    /// Cancelling ends the current call with an error that asks for a hard
    /// reset; the robot itself is not told to stop.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // ────────────────────────────────────────────────────────────────────
    // UI boundary
    // ────────────────────────────────────────────────────────────────────

    pub fn open_connection(&self, ip_address: &str) -> String {
        info!(ip = ip_address, "OpenConnection called");
        report(self.try_open_connection(ip_address))
    }

    pub fn initialize(&self) -> String {
        info!("Initialize called");
        report(self.try_initialize())
    }

    pub fn execute_operation<S: AsRef<str>>(
        &self,
        operation: &str,
        parameter_names: &[S],
        parameter_values: &[i64],
    ) -> String {
        info!(
            operation,
            parameter_names = ?parameter_names.iter().map(|n| AsRef::<str>::as_ref(n)).collect::<Vec<&str>>(),
            ?parameter_values,
            "ExecuteOperation called"
        );
        report(self.try_execute_operation(operation, parameter_names, parameter_values))
    }

    pub fn abort(&self) -> String {
        info!("Abort called");
        report(self.try_abort())
    }

    // ────────────────────────────────────────────────────────────────────
    // Typed API
    // ────────────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnected`] if a connection is open, or
    /// [`ConnectionError::ConnectFailed`] if the robot cannot be reached.
    pub fn try_open_connection(&self, ip_address: &str) -> Result<(), DriverError> {
        self.session().begin_connect(ip_address)?;
        let opened = self.link().open(ip_address);
        self.session().finish_connect(opened.is_ok());
        opened.map_err(DriverError::from)
    }

    /// Home the robot.  Homing an already-homed robot runs the sequence again.
    pub fn try_initialize(&self) -> Result<(), DriverError> {
        let _flight = self.begin(false)?;
        {
            let mut session = self.session();
            if session.is_homed() {
                warn!("MockRobot already initialized; homing again");
                session.set_homed(false);
            }
        }

        self.run_process(Stage::Initialization, Command::Home, self.config.home_timeout)?;
        self.session().set_homed(true);
        info!("initialization finished");
        Ok(())
    }

    pub fn try_execute_operation<S: AsRef<str>>(
        &self,
        operation: &str,
        parameter_names: &[S],
        parameter_values: &[i64],
    ) -> Result<(), DriverError> {
        let flight = self.begin(true)?;
        let validated = self
            .validator
            .validate(operation, parameter_names, parameter_values)?;
        self.dispatch(&flight, validated)
    }

    /// Same as [`try_execute_operation`][Self::try_execute_operation] for an
    /// already-typed request.
    pub fn try_execute(&self, request: &OperationRequest) -> Result<(), DriverError> {
        let flight = self.begin(true)?;
        let validated = self.validator.validate_request(request)?;
        self.dispatch(&flight, validated)
    }

    /// Close the connection and forget all session state.
    ///
    /// # Errors
    ///
    /// Refused while disconnected or while a process is in flight; an active
    /// process is never pre-empted.
    pub fn try_abort(&self) -> Result<(), DriverError> {
        let mut session = self.session();
        if !session.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        if session.is_busy() {
            return Err(StateError::ProcessAlreadyRunning(session.current_process()).into());
        }
        self.link().close();
        session.reset();
        info!("connection aborted");
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Internals
    // ────────────────────────────────────────────────────────────────────

    /// Check preconditions and take the in-flight claim in one step.
    fn begin(&self, require_homed: bool) -> Result<InFlight<'_>, DriverError> {
        let mut session = self.session();
        if !session.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        if require_homed && !session.is_homed() {
            return Err(DriverError::from(StateError::NotInitialized));
        }
        session.claim()?;
        self.cancel.reset();
        Ok(InFlight { driver: self })
    }

    fn dispatch(
        &self,
        _flight: &InFlight<'_>,
        operation: ValidatedOperation,
    ) -> Result<(), DriverError> {
        let timeout = self.config.operation_timeout;
        info!(operation = %operation.operation(), "dispatching operation");
        match operation {
            ValidatedOperation::Pick { source } => {
                self.run_process(Stage::Pick, Command::Pick(source), timeout)
            }
            ValidatedOperation::Place { destination } => {
                self.run_process(Stage::Place, Command::Place(destination), timeout)
            }
            ValidatedOperation::Transfer {
                source,
                destination,
            } => {
                self.run_process(Stage::Pick, Command::Pick(source), timeout)?;
                self.run_process(Stage::Place, Command::Place(destination), timeout)
            }
        }
    }

    /// Start `command`, then wait for it with an independent budget of the
    /// same length.  Must be called with the claim held.
    fn run_process(
        &self,
        stage: Stage,
        command: Command,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let protocol = CommandProtocol::new(&self.link);
        let id: ProcessId = protocol
            .start_process(&command, timeout)
            .map_err(|source| DriverError::NotStarted { stage, source })?;
        self.session().set_process(id);

        let monitor = ProcessMonitor::new(
            protocol,
            self.config.poll_interval,
            self.config.status_timeout,
            self.cancel.clone(),
        );
        monitor
            .await_completion(id, timeout)
            .map_err(|source| DriverError::Incomplete { stage, source })
    }

    fn session(&self) -> MutexGuard<'_, DriverSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> MutexGuard<'_, ConnectionManager> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII guard for the in-flight claim; dropping it releases the claim.
struct InFlight<'a> {
    driver: &'a MockRobotDriver,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.driver.session().release();
    }
}

fn report(result: Result<(), DriverError>) -> String {
    if let Err(e) = &result {
        if e.requires_hard_reset() {
            error!(error = %e, "call failed; robot requires a hard reset");
        } else {
            error!(error = %e, "call failed");
        }
    }
    into_message(result)
}
