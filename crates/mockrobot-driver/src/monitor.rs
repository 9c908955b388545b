//! [`ProcessMonitor`] – waits for a started robot process to finish.
//!
//! The monitor polls `status%<id>` once per poll interval until the process
//! reaches a terminal status, a status query fails, or the completion budget
//! runs out.  It is the only part of the driver that blocks for long periods,
//! and it keeps no state beyond one call.

use std::time::{Duration, Instant};

use mockrobot_types::{MonitorError, ProcessId, ProcessStatus};
use tracing::{debug, info, warn};

use crate::protocol::{CommandProtocol, Transport};
use crate::ticker::{CancelHandle, Tick, Ticker};

pub struct ProcessMonitor<'a, T: Transport + ?Sized> {
    protocol: CommandProtocol<'a, T>,
    ticker: Ticker,
    status_timeout: Duration,
}

impl<'a, T: Transport + ?Sized> ProcessMonitor<'a, T> {
    pub fn new(
        protocol: CommandProtocol<'a, T>,
        poll_interval: Duration,
        status_timeout: Duration,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            protocol,
            ticker: Ticker::new(poll_interval, cancel),
            status_timeout,
        }
    }

    /// Block until `process_id` finishes successfully.
    ///
    /// The budget is measured from the moment this is called, on the
    /// monotonic clock.  Every poll is preceded by one full interval, so a
    /// process is never queried the instant it starts.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Terminated`] when the robot reports
    ///   `Terminated With Error`.  This is final and never retried.
    /// - [`MonitorError::Status`] when a status query fails for any reason.
    /// - [`MonitorError::Timeout`] when `overall_timeout` elapses first.
    /// - [`MonitorError::Cancelled`] when the wait is cancelled.
    pub fn await_completion(
        &self,
        process_id: ProcessId,
        overall_timeout: Duration,
    ) -> Result<(), MonitorError> {
        let started = Instant::now();
        loop {
            if self.ticker.wait() == Tick::Cancelled {
                warn!(process_id = %process_id, "monitoring cancelled");
                return Err(MonitorError::Cancelled(process_id));
            }

            match self.protocol.query_status(process_id, self.status_timeout) {
                Ok(ProcessStatus::FinishedSuccessfully) => {
                    info!(
                        process_id = %process_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "process finished successfully"
                    );
                    return Ok(());
                }
                Ok(ProcessStatus::TerminatedWithError) => {
                    warn!(process_id = %process_id, "process terminated with error");
                    return Err(MonitorError::Terminated(process_id));
                }
                Ok(ProcessStatus::InProgress) => {
                    debug!(process_id = %process_id, "process in progress");
                }
                Err(source) => {
                    warn!(process_id = %process_id, error = %source, "status query failed");
                    return Err(MonitorError::Status {
                        id: process_id,
                        source,
                    });
                }
            }

            if started.elapsed() > overall_timeout {
                warn!(
                    process_id = %process_id,
                    timeout_secs = overall_timeout.as_secs(),
                    "process timed out; robot state is unknown"
                );
                return Err(MonitorError::Timeout {
                    id: process_id,
                    secs: overall_timeout.as_secs(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::ScriptedTransport;
    use mockrobot_types::{ConnectionError, ProtocolError};
    use std::thread;

    const POLL: Duration = Duration::from_millis(1);

    fn monitor(transport: &ScriptedTransport) -> ProcessMonitor<'_, ScriptedTransport> {
        ProcessMonitor::new(
            CommandProtocol::new(transport),
            POLL,
            Duration::from_millis(10),
            CancelHandle::new(),
        )
    }

    #[test]
    fn polls_until_finished() {
        let transport =
            ScriptedTransport::replying(["In Progress", "In Progress", "Finished Successfully"]);
        monitor(&transport)
            .await_completion(ProcessId(4), Duration::from_secs(5))
            .unwrap();
        assert_eq!(transport.sent(), vec!["status%4"; 3]);
    }

    #[test]
    fn terminated_with_error_is_final() {
        let transport = ScriptedTransport::replying(["In Progress", "Terminated With Error"]);
        let err = monitor(&transport)
            .await_completion(ProcessId(2), Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err, MonitorError::Terminated(ProcessId(2)));
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn failed_status_query_stops_immediately() {
        let transport = ScriptedTransport::replying(["In Progress", "Dancing"]);
        let err = monitor(&transport)
            .await_completion(ProcessId(2), Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(
            err,
            MonitorError::Status {
                id: ProcessId(2),
                source: ProtocolError::MalformedResponse("Dancing".into()),
            }
        );
    }

    #[test]
    fn status_timeout_is_not_retried() {
        let transport = ScriptedTransport::default();
        transport.push(Err(ConnectionError::ResponseTimeout));
        transport.push(Ok(b"Finished Successfully".to_vec()));
        let err = monitor(&transport)
            .await_completion(ProcessId(8), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Status { .. }));
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn overall_timeout_requires_hard_reset() {
        let transport = ScriptedTransport::default();
        for _ in 0..1000 {
            transport.push(Ok(b"In Progress".to_vec()));
        }
        let err = monitor(&transport)
            .await_completion(ProcessId(1), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Timeout { id: ProcessId(1), .. }));
        assert!(err.requires_hard_reset());
        assert!(err.to_string().contains("Consider hard reset"));
    }

    #[test]
    fn cancellation_interrupts_poll_wait() {
        let transport = ScriptedTransport::replying(["Finished Successfully"]);
        let cancel = CancelHandle::new();
        let monitor = ProcessMonitor::new(
            CommandProtocol::new(&transport),
            Duration::from_secs(30),
            Duration::from_millis(10),
            cancel.clone(),
        );

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });
        let err = monitor
            .await_completion(ProcessId(6), Duration::from_secs(60))
            .unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err, MonitorError::Cancelled(ProcessId(6)));
        assert!(transport.sent().is_empty());
    }
}
