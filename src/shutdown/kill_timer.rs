//! Best-effort forced-exit timer.

use std::time::Duration;

/// Environment flag that suppresses the forced exit.
///
/// Set to any value in automated tests so timer arming can be asserted
/// without actually terminating the test process.
pub const TEST_MODE_ENV: &str = "FAULT_GUARD_UNIT_TEST";

/// Arm a one-shot timer that forces the process to exit after `timeout`.
///
/// The timer is a detached task: nothing joins it and it never keeps the
/// process alive. If in-flight work drains and the runtime shuts down
/// before the grace period elapses, the process exits normally and the
/// timer simply disappears with it.
pub fn arm(timeout: Duration, exit_code: i32) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        if std::env::var_os(TEST_MODE_ENV).is_some() {
            tracing::warn!(
                timeout = ?timeout,
                exit_code,
                "kill timeout reached, test mode active, skipping forced exit"
            );
            return;
        }

        tracing::error!(
            timeout = ?timeout,
            exit_code,
            pid = std::process::id(),
            "kill timeout reached, forcing exit"
        );
        std::process::exit(exit_code);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn armed_timer_does_not_exit_in_test_mode() {
        std::env::set_var(TEST_MODE_ENV, "1");
        arm(Duration::from_millis(10), 1);
        // If the exit were not suppressed this test would kill the process.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
