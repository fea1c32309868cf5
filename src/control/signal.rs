//! Signal bus: start/stop instructions from the control plane to the scheduler.
//!
//! A bounded crossbeam channel with a single consumer. Overflow policy: a
//! sender blocks for at most the configured send timeout while the queue is
//! full, then gets [`HmError::SignalQueueFull`]; the signal is not enqueued.
//! Once the receiver is gone every send fails with [`HmError::ChannelClosed`].

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::control::module_id::{ModuleId, SignalTarget};
use crate::core::errors::{HmError, Result};

const COMPONENT: &str = "signal_bus";

/// Point-in-time instruction; discarded once consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub target: SignalTarget,
    pub run: bool,
}

impl Signal {
    #[must_use]
    pub const fn start(id: ModuleId) -> Self {
        Self {
            target: SignalTarget::Module(id),
            run: true,
        }
    }

    #[must_use]
    pub const fn stop(id: ModuleId) -> Self {
        Self {
            target: SignalTarget::Module(id),
            run: false,
        }
    }

    /// Restart every module under the active profile.
    #[must_use]
    pub const fn restart_all() -> Self {
        Self {
            target: SignalTarget::All,
            run: true,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.run { "run" } else { "stop" };
        write!(f, "{verb} {}", self.target)
    }
}

/// Create a bus with room for `capacity` pending signals.
#[must_use]
pub fn signal_bus(capacity: usize, send_timeout: Duration) -> (SignalSender, SignalReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        SignalSender { tx, send_timeout },
        SignalReceiver { rx },
    )
}

/// Producer half; cheap to clone.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<Signal>,
    send_timeout: Duration,
}

impl SignalSender {
    /// Enqueue `signal`, blocking up to the send timeout when the queue is full.
    ///
    /// Callers must not hold other locks here.
    pub fn send(&self, signal: Signal) -> Result<()> {
        self.tx
            .send_timeout(signal, self.send_timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => HmError::SignalQueueFull {
                    waited: self.send_timeout,
                },
                SendTimeoutError::Disconnected(_) => HmError::ChannelClosed {
                    component: COMPONENT,
                },
            })
    }

    /// Signals currently waiting to be consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer half, owned by the scheduler.
#[derive(Debug)]
pub struct SignalReceiver {
    rx: Receiver<Signal>,
}

impl SignalReceiver {
    /// Block until a signal arrives. `None` once every sender is gone.
    pub fn recv(&self) -> Option<Signal> {
        self.rx.recv().ok()
    }

    /// Wait up to `timeout`. `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Signal>> {
        match self.rx.recv_timeout(timeout) {
            Ok(signal) => Ok(Some(signal)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HmError::ChannelClosed {
                component: COMPONENT,
            }),
        }
    }

    /// Take up to `max` queued signals without blocking.
    pub fn drain(&self, max: usize) -> Vec<Signal> {
        let mut out = Vec::new();
        for _ in 0..max {
            match self.rx.try_recv() {
                Ok(signal) => out.push(signal),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_arrive_in_order() {
        let (tx, rx) = signal_bus(4, Duration::from_millis(50));
        tx.send(Signal::start(ModuleId::Live)).unwrap();
        tx.send(Signal::stop(ModuleId::Disk)).unwrap();
        tx.send(Signal::restart_all()).unwrap();
        assert_eq!(tx.pending(), 3);
        assert_eq!(
            rx.drain(10),
            vec![
                Signal::start(ModuleId::Live),
                Signal::stop(ModuleId::Disk),
                Signal::restart_all()
            ]
        );
    }

    #[test]
    fn full_queue_times_out_instead_of_blocking_forever() {
        let (tx, _rx) = signal_bus(1, Duration::from_millis(20));
        tx.send(Signal::start(ModuleId::Cpu)).unwrap();
        let err = tx.send(Signal::start(ModuleId::Ram)).unwrap_err();
        assert!(matches!(err, HmError::SignalQueueFull { .. }));
        assert_eq!(tx.pending(), 1);
    }

    #[test]
    fn dropped_receiver_closes_the_bus() {
        let (tx, rx) = signal_bus(1, Duration::from_millis(20));
        drop(rx);
        let err = tx.send(Signal::start(ModuleId::Cpu)).unwrap_err();
        assert!(matches!(err, HmError::ChannelClosed { component: "signal_bus" }));
    }

    #[test]
    fn recv_timeout_reports_idle_and_disconnect() {
        let (tx, rx) = signal_bus(1, Duration::from_millis(20));
        assert!(rx.recv_timeout(Duration::from_millis(5)).unwrap().is_none());
        drop(tx);
        assert!(rx.recv_timeout(Duration::from_millis(5)).is_err());
        assert!(rx.recv().is_none());
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Signal::stop(ModuleId::Disk).to_string(), "stop disk");
        assert_eq!(Signal::restart_all().to_string(), "run all");
    }
}
