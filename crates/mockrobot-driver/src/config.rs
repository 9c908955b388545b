//! Fixed driver constants, gathered into one value so that tests and the
//! simulator can shrink the timings.

use std::ops::RangeInclusive;
use std::time::Duration;

/// TCP port the MockRobot onboard software listens on.
pub const DEFAULT_PORT: u16 = 1000;
/// Upper bound on establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Start and completion budget for `home`.
pub const DEFAULT_HOME_TIMEOUT: Duration = Duration::from_secs(120);
/// Start and completion budget for `pick` / `place`.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Wait between two `status%<id>` queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// How long a single `status%<id>` query may wait for its reply.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(1);
/// Locations the arm can reach.
pub const DEFAULT_VALID_RANGE: RangeInclusive<i64> = 1..=17;

/// Timings and limits used by [`MockRobotDriver`][crate::MockRobotDriver].
///
/// `DriverConfig::default()` carries the production values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    pub home_timeout: Duration,
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
    pub status_timeout: Duration,
    pub valid_range: RangeInclusive<i64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            home_timeout: DEFAULT_HOME_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            valid_range: DEFAULT_VALID_RANGE,
        }
    }
}
