//! Thread helpers shared by the pool and the scheduler.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// Join `handle`, giving up after `timeout`.
///
/// A helper thread performs the actual join so a stuck thread can be
/// detached instead of hanging the caller. Returns `true` if the thread
/// exited cleanly within the timeout.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, label: &str) -> bool {
    if handle.thread().id() == thread::current().id() {
        debug!(thread = label, "Skipping self-join");
        return false;
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    let joiner = thread::spawn(move || {
        let result = handle.join();
        let _ = tx.send(result.is_ok());
    });

    let joined = match rx.recv_timeout(timeout) {
        Ok(true) => {
            debug!(thread = label, "Thread joined");
            true
        }
        Ok(false) => {
            warn!(thread = label, "Thread panicked");
            false
        }
        Err(_) => {
            warn!(thread = label, "Thread did not exit within timeout - detaching");
            return false;
        }
    };

    let _ = joiner.join();
    joined
}
