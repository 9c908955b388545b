//! [`SimRobot`] – in-process stand-in for the MockRobot onboard software.
//!
//! Listens on a local TCP port and speaks the same text protocol as the real
//! robot, so the whole driver can be exercised in tests and CI pipelines
//! without hardware.  Each verb's behaviour can be scripted:
//!
//! | [`VerbBehavior`] | Reply to the command | Later `status%<id>` replies |
//! |---|---|---|
//! | `Complete { polls }` | new process id | `In Progress` × `polls`, then `Finished Successfully` |
//! | `Terminate { polls }` | new process id | `In Progress` × `polls`, then `Terminated With Error` |
//! | `Delayed { delay, polls }` | new process id, sent after `delay` | as `Complete` |
//! | `Reply(text)` | `text` verbatim | – |
//! | `Silent` | nothing | – |
//!
//! Like the real robot, only one process runs at a time: a process-starting
//! command sent while another is still running is answered with `-1`.
//!
//! # Example
//!
//! ```rust
//! use mockrobot_driver::sim::{SimRobot, VerbBehavior};
//! use mockrobot_driver::{DriverConfig, MockRobotDriver};
//! use std::time::Duration;
//!
//! let sim = SimRobot::builder()
//!     .on("place", VerbBehavior::Terminate { polls: 0 })
//!     .spawn()
//!     .expect("sim must start");
//!
//! let driver = MockRobotDriver::with_config(DriverConfig {
//!     port: sim.port(),
//!     poll_interval: Duration::from_millis(1),
//!     ..DriverConfig::default()
//! });
//! assert_eq!(driver.open_connection("127.0.0.1"), "");
//! assert_eq!(driver.initialize(), "");
//! assert_eq!(driver.execute_operation("Pick", &["Source Location"], &[3]), "");
//! assert_ne!(driver.execute_operation("Place", &["Destination Location"], &[4]), "");
//! ```

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mockrobot_types::ProcessStatus;
use tracing::{debug, warn};

use crate::connection::RECEIVE_BUFFER_SIZE;

const ACCEPT_POLL: Duration = Duration::from_millis(10);
const READ_POLL: Duration = Duration::from_millis(20);
const SIM_BIND_ADDR: &str = "127.0.0.1:0";

/// How the simulated robot answers one verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbBehavior {
    Complete { polls: u32 },
    Terminate { polls: u32 },
    Delayed { delay: Duration, polls: u32 },
    Reply(String),
    Silent,
}

/// One answer to send back, possibly after a pause.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SimReply {
    text: String,
    delay: Duration,
}

impl SimReply {
    fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delay: Duration::ZERO,
        }
    }
}

struct Running {
    id: u64,
    remaining: u32,
    outcome: ProcessStatus,
}

struct SimState {
    default_polls: u32,
    behaviors: HashMap<String, VerbBehavior>,
    next_id: u64,
    running: Option<Running>,
    finished: HashMap<u64, ProcessStatus>,
    commands: Vec<String>,
}

impl SimState {
    fn handle(&mut self, raw: &str) -> Option<SimReply> {
        let text = raw.trim();
        self.commands.push(text.to_string());

        let (verb, arg) = match text.split_once('%') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (text, None),
        };

        match verb {
            "status" => self.status(arg).map(SimReply::now),
            "home" if arg.is_none() => self.start(verb),
            "pick" | "place" => match arg.map(str::parse::<i64>) {
                Some(Ok(_)) => self.start(verb),
                _ => Some(SimReply::now(format!("Error: Invalid parameter for {verb}"))),
            },
            _ => Some(SimReply::now(format!("Error: Unknown command: {text}"))),
        }
    }

    fn start(&mut self, verb: &str) -> Option<SimReply> {
        let behavior = self
            .behaviors
            .get(verb)
            .cloned()
            .unwrap_or(VerbBehavior::Complete {
                polls: self.default_polls,
            });

        let (remaining, outcome, delay) = match behavior {
            VerbBehavior::Reply(text) => return Some(SimReply::now(text)),
            VerbBehavior::Silent => return None,
            VerbBehavior::Complete { polls } => {
                (polls, ProcessStatus::FinishedSuccessfully, Duration::ZERO)
            }
            VerbBehavior::Terminate { polls } => {
                (polls, ProcessStatus::TerminatedWithError, Duration::ZERO)
            }
            VerbBehavior::Delayed { delay, polls } => {
                (polls, ProcessStatus::FinishedSuccessfully, delay)
            }
        };

        if self.running.is_some() {
            return Some(SimReply::now("-1"));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.running = Some(Running {
            id,
            remaining,
            outcome,
        });
        Some(SimReply {
            text: id.to_string(),
            delay,
        })
    }

    fn status(&mut self, arg: Option<&str>) -> Option<String> {
        match self.behaviors.get("status") {
            Some(VerbBehavior::Reply(text)) => return Some(text.clone()),
            Some(VerbBehavior::Silent) => return None,
            _ => {}
        }

        let Some(id) = arg.and_then(|a| a.parse::<u64>().ok()) else {
            return Some("Error: Invalid parameter for status".to_string());
        };

        if let Some(running) = self.running.as_mut().filter(|r| r.id == id) {
            if running.remaining > 0 {
                running.remaining -= 1;
                return Some(ProcessStatus::InProgress.as_wire().to_string());
            }
            let outcome = running.outcome;
            self.running = None;
            self.finished.insert(id, outcome);
            return Some(outcome.as_wire().to_string());
        }

        match self.finished.get(&id) {
            Some(status) => Some(status.as_wire().to_string()),
            None => Some(format!("Error: Unknown process id {id}")),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Fluent builder for a [`SimRobot`].
pub struct SimRobotBuilder {
    default_polls: u32,
    behaviors: HashMap<String, VerbBehavior>,
}

impl SimRobotBuilder {
    /// `In Progress` replies before a process without a scripted behaviour
    /// finishes successfully.  Defaults to 1.
    pub fn polls_until_done(mut self, polls: u32) -> Self {
        self.default_polls = polls;
        self
    }

    /// Script the behaviour of `verb` (`home`, `pick`, `place` or `status`).
    /// For `status` only `Reply` and `Silent` have an effect.
    pub fn on(mut self, verb: &str, behavior: VerbBehavior) -> Self {
        self.behaviors.insert(verb.to_string(), behavior);
        self
    }

    /// Bind the listener and start serving on a background thread.
    pub fn spawn(self) -> io::Result<SimRobot> {
        let listener = TcpListener::bind(SIM_BIND_ADDR)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let state = Arc::new(Mutex::new(SimState {
            default_polls: self.default_polls,
            behaviors: self.behaviors,
            next_id: 0,
            running: None,
            finished: HashMap::new(),
            commands: Vec::new(),
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("mockrobot-sim".to_string())
                .spawn(move || accept_loop(listener, state, stop))?
        };

        debug!(%addr, "simulated robot listening");
        Ok(SimRobot {
            addr,
            state,
            stop,
            handle: Some(handle),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// Running simulated robot.  Stops serving when dropped.
pub struct SimRobot {
    addr: SocketAddr,
    state: Arc<Mutex<SimState>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimRobot {
    pub fn builder() -> SimRobotBuilder {
        SimRobotBuilder {
            default_polls: 1,
            behaviors: HashMap::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command received so far, in order, without surrounding
    /// whitespace.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .clone()
    }
}

impl Drop for SimRobot {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("simulated robot thread panicked");
        }
    }
}

fn accept_loop(listener: TcpListener, state: Arc<Mutex<SimState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "driver connected to simulated robot");
                if let Err(e) = serve(stream, &state, &stop) {
                    debug!(error = %e, "simulated robot connection ended");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "simulated robot accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<SimState>, stop: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];

    while !stop.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => return Err(e),
        };
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
        let reply = state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(&request);
        if let Some(reply) = reply {
            if !reply.delay.is_zero() {
                thread::sleep(reply.delay);
            }
            stream.write_all(reply.text.as_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SimState {
        SimState {
            default_polls: 1,
            behaviors: HashMap::new(),
            next_id: 0,
            running: None,
            finished: HashMap::new(),
            commands: Vec::new(),
        }
    }

    fn reply(state: &mut SimState, cmd: &str) -> String {
        state.handle(cmd).expect("reply expected").text
    }

    #[test]
    fn process_lifecycle() {
        let mut s = state();
        assert_eq!(reply(&mut s, "pick%3"), "1");
        assert_eq!(reply(&mut s, "status%1"), "In Progress");
        assert_eq!(reply(&mut s, "status%1"), "Finished Successfully");
        // Finished processes keep reporting their final status.
        assert_eq!(reply(&mut s, "status%1"), "Finished Successfully");
        assert_eq!(reply(&mut s, "home"), "2");
    }

    #[test]
    fn busy_robot_answers_negative() {
        let mut s = state();
        assert_eq!(reply(&mut s, "home"), "1");
        assert_eq!(reply(&mut s, "place%4"), "-1");
    }

    #[test]
    fn scripted_failure() {
        let mut s = state();
        s.behaviors
            .insert("pick".into(), VerbBehavior::Terminate { polls: 0 });
        assert_eq!(reply(&mut s, "pick%1"), "1");
        assert_eq!(reply(&mut s, "status%1"), "Terminated With Error");
    }

    #[test]
    fn delayed_start_carries_its_pause() {
        let mut s = state();
        s.behaviors.insert(
            "pick".into(),
            VerbBehavior::Delayed {
                delay: Duration::from_millis(150),
                polls: 0,
            },
        );
        let started = s.handle("pick%2").expect("reply expected");
        assert_eq!(started.text, "1");
        assert_eq!(started.delay, Duration::from_millis(150));
        // The busy answer is never held back.
        assert_eq!(s.handle("place%3"), Some(SimReply::now("-1")));
    }

    #[test]
    fn bad_input_gets_error_replies() {
        let mut s = state();
        assert!(reply(&mut s, "pick%abc").starts_with("Error:"));
        assert!(reply(&mut s, "dance").starts_with("Error:"));
        assert!(reply(&mut s, "status%99").starts_with("Error:"));
        assert_eq!(s.commands, vec!["pick%abc", "dance", "status%99"]);
    }

    #[test]
    fn silent_behaviour_sends_nothing() {
        let mut s = state();
        s.behaviors.insert("status".into(), VerbBehavior::Silent);
        assert_eq!(s.handle("status%1"), None);
    }

    #[test]
    fn serves_over_tcp() {
        let sim = SimRobot::builder().spawn().unwrap();
        let mut stream = TcpStream::connect(sim.addr()).unwrap();
        stream.write_all(b"home").unwrap();
        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"1");
        assert_eq!(sim.commands(), vec!["home".to_string()]);
    }
}
