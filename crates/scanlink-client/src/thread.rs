//! Bounded thread joins

use std::thread::{JoinHandle, spawn};
use std::time::Duration;

pub(crate) trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    /// Join from a watchdog thread and wait for it at most `timeout`
    ///
    /// On timeout the watchdog keeps waiting in the background; the target
    /// thread is not interrupted.
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "thread panicked during join",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_within_timeout() {
        let handle = spawn(|| std::thread::sleep(Duration::from_millis(5)));
        assert!(handle.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_times_out() {
        let handle = spawn(|| std::thread::sleep(Duration::from_millis(300)));
        assert!(handle.join_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_panicked_thread() {
        let handle = spawn(|| panic!("worker failed"));
        assert!(handle.join_timeout(Duration::from_secs(1)).is_err());
    }
}
