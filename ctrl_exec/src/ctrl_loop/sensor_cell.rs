//! Shared sensor cell
//!
//! The sensor client writes each received sample into the cell and the control loop copies the
//! latest one out at the start of a cycle. The one-shot input latches live behind the same lock
//! as the sample.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::msg::sensor::SensorMsg;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Latest sensor sample and input latches, shared between threads.
#[derive(Debug, Default)]
pub struct SensorCell {
    inner: Mutex<CellState>,
}

/// A sensor message along with the instant it was written into the cell.
#[derive(Debug, Clone)]
pub struct SensorSample {
    pub msg: SensorMsg,
    pub received: Instant,
}

#[derive(Debug, Default)]
struct CellState {
    sample: Option<SensorSample>,
    latch: InputLatch,

    /// Set once the writer has stopped for good.
    source_lost: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Tracks whether the first sensor sample and the first reference have been received.
///
/// Transitions only go forward: once an input is latched it stays latched, and once both are
/// latched the state is `Ready` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLatch {
    AwaitingInput { sensor: bool, reference: bool },
    Ready,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for InputLatch {
    fn default() -> Self {
        InputLatch::AwaitingInput {
            sensor: false,
            reference: false,
        }
    }
}

impl InputLatch {
    fn with_sensor(self) -> Self {
        match self {
            InputLatch::AwaitingInput {
                reference: true, ..
            } => InputLatch::Ready,
            InputLatch::AwaitingInput { .. } => InputLatch::AwaitingInput {
                sensor: true,
                reference: false,
            },
            InputLatch::Ready => InputLatch::Ready,
        }
    }

    fn with_reference(self) -> Self {
        match self {
            InputLatch::AwaitingInput { sensor: true, .. } => InputLatch::Ready,
            InputLatch::AwaitingInput { .. } => InputLatch::AwaitingInput {
                sensor: false,
                reference: true,
            },
            InputLatch::Ready => InputLatch::Ready,
        }
    }
}

impl SensorCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored sample with `msg` and latch the sensor input.
    pub fn write_sensor(&self, msg: SensorMsg) {
        let mut state = self.lock();
        state.sample = Some(SensorSample {
            msg,
            received: Instant::now(),
        });
        state.latch = state.latch.with_sensor();
    }

    /// Latch the reference input.
    pub fn latch_reference(&self) {
        let mut state = self.lock();
        state.latch = state.latch.with_reference();
    }

    pub fn latch(&self) -> InputLatch {
        self.lock().latch
    }

    pub fn is_ready(&self) -> bool {
        self.latch() == InputLatch::Ready
    }

    /// Copy of the latest sample, `None` if no sample has been written yet.
    pub fn read(&self) -> Option<SensorSample> {
        self.lock().sample.clone()
    }

    /// Record that no more samples will be written, for example because the receiving thread
    /// has stopped.
    pub fn mark_source_lost(&self) {
        self.lock().source_lost = true;
    }

    pub fn is_source_lost(&self) -> bool {
        self.lock().source_lost
    }

    /// The cell only holds plain data so a panic while it was locked cannot leave it
    /// inconsistent.
    fn lock(&self) -> MutexGuard<CellState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch_is_monotonic() {
        let cell = SensorCell::new();
        assert_eq!(cell.latch(), InputLatch::default());
        assert!(cell.read().is_none());

        cell.latch_reference();
        cell.latch_reference();
        assert_eq!(
            cell.latch(),
            InputLatch::AwaitingInput {
                sensor: false,
                reference: true
            }
        );

        cell.write_sensor(SensorMsg::new(vec![0.0], vec![0.0]));
        assert!(cell.is_ready());

        // Nothing moves the latch back
        cell.write_sensor(SensorMsg::new(vec![1.0], vec![0.0]));
        cell.latch_reference();
        assert!(cell.is_ready());
    }

    #[test]
    fn test_sensor_then_reference() {
        let cell = SensorCell::new();
        cell.write_sensor(SensorMsg::new(vec![0.0], vec![0.0]));
        assert_eq!(
            cell.latch(),
            InputLatch::AwaitingInput {
                sensor: true,
                reference: false
            }
        );

        cell.latch_reference();
        assert!(cell.is_ready());
    }

    #[test]
    fn test_last_write_wins() {
        let cell = SensorCell::new();
        cell.write_sensor(SensorMsg::new(vec![1.0], vec![0.0]));
        cell.write_sensor(SensorMsg::new(vec![2.0], vec![0.0]));

        assert_eq!(cell.read().unwrap().msg.joint_state.position, vec![2.0]);
    }

    #[test]
    fn test_no_torn_reads() {
        let cell = Arc::new(SensorCell::new());
        let writer_cell = cell.clone();

        // Every sample the writer produces has all positions and velocities equal
        let writer = thread::spawn(move || {
            for i in 0..5000 {
                let v = i as f64;
                writer_cell.write_sensor(SensorMsg::new(vec![v; 7], vec![v; 7]));
            }
        });

        let mut reads = 0;
        while reads < 5000 {
            if let Some(sample) = cell.read() {
                let state = sample.msg.state();
                assert!(state.iter().all(|x| *x == state[0]));
                reads += 1;
            }
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_poisoned_cell_still_usable() {
        let cell = Arc::new(SensorCell::new());
        let panicking = cell.clone();

        let _ = thread::spawn(move || {
            let _guard = panicking.inner.lock().unwrap();
            panic!("poison the cell");
        })
        .join();

        cell.write_sensor(SensorMsg::new(vec![1.0], vec![0.0]));
        assert!(cell.read().is_some());
    }

    #[test]
    fn test_source_lost_is_sticky() {
        let cell = SensorCell::new();
        cell.write_sensor(SensorMsg::new(vec![0.5], vec![0.0]));
        assert!(!cell.is_source_lost());

        cell.mark_source_lost();
        assert!(cell.is_source_lost());

        // The last sample is still readable
        assert_eq!(cell.read().unwrap().msg.joint_state.position, vec![0.5]);
        cell.write_sensor(SensorMsg::new(vec![1.0], vec![0.0]));
        assert!(cell.is_source_lost());
    }
}
