//! Start/stop state shared by the scheduling loops.
//!
//! Every `start` opens a new epoch and spawns one task bound to it. `stop`
//! (or a later `start`) moves the epoch on, so a task whose timer already
//! fired still sees that it is stale and exits without running its body.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Control {
    pub epoch: u64,
    pub running: bool,
}

#[derive(Debug)]
pub(crate) struct RunControl {
    tx: watch::Sender<Control>,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(Control::default()),
        }
    }

    /// Open a new epoch. `None` if already running.
    pub fn start(&self) -> Option<u64> {
        let mut started = None;
        self.tx.send_if_modified(|control| {
            if control.running {
                return false;
            }
            control.running = true;
            control.epoch += 1;
            started = Some(control.epoch);
            true
        });
        started
    }

    /// Close the current epoch. `false` if not running.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|control| {
            if !control.running {
                return false;
            }
            control.running = false;
            control.epoch += 1;
            true
        })
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().running
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        let control = *self.tx.borrow();
        control.running && control.epoch == epoch
    }

    pub fn subscribe(&self) -> watch::Receiver<Control> {
        self.tx.subscribe()
    }
}
