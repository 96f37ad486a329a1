use crate::error::{DbError, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct TrackerState {
    open: usize,
    max: usize,
}

/// Counts the connections a driver has open.
///
/// A maximum of 0 means unlimited.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ConnectionTracker {
    pub fn new(max: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState { open: 0, max })),
        }
    }

    pub fn acquire(&self) -> Result<ConnectionSlot> {
        let mut state = self.state.lock().map_err(|_| DbError::lock_poisoned())?;
        if state.max > 0 && state.open >= state.max {
            return Err(DbError::ConnectionLimit { max: state.max });
        }
        state.open += 1;
        log::debug!("Connection slot acquired ({} open)", state.open);
        Ok(ConnectionSlot {
            state: Arc::clone(&self.state),
        })
    }

    pub fn open_count(&self) -> Result<usize> {
        let state = self.state.lock().map_err(|_| DbError::lock_poisoned())?;
        Ok(state.open)
    }

    pub fn max(&self) -> Result<usize> {
        let state = self.state.lock().map_err(|_| DbError::lock_poisoned())?;
        Ok(state.max)
    }

    pub fn set_max(&self, max: usize) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| DbError::lock_poisoned())?;
        state.max = max;
        Ok(())
    }
}

/// One open connection; released on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    state: Arc<Mutex<TrackerState>>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        match self.state.lock() {
            Ok(mut state) => {
                state.open = state.open.saturating_sub(1);
                log::debug!("Connection slot released ({} open)", state.open);
            }
            Err(_) => log::warn!("Connection tracker lock poisoned on release"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_and_releases() {
        let tracker = ConnectionTracker::new(0);
        let a = tracker.acquire().unwrap();
        let b = tracker.acquire().unwrap();
        assert_eq!(tracker.open_count().unwrap(), 2);
        drop(a);
        assert_eq!(tracker.open_count().unwrap(), 1);
        drop(b);
        assert_eq!(tracker.open_count().unwrap(), 0);
    }

    #[test]
    fn test_tracker_enforces_max() {
        let tracker = ConnectionTracker::new(1);
        let slot = tracker.acquire().unwrap();
        match tracker.acquire() {
            Err(DbError::ConnectionLimit { max }) => assert_eq!(max, 1),
            other => panic!("Expected ConnectionLimit, got {:?}", other.map(|_| ())),
        }
        drop(slot);
        assert!(tracker.acquire().is_ok());
    }

    #[test]
    fn test_tracker_shared_between_clones() {
        let tracker = ConnectionTracker::new(2);
        let other = tracker.clone();
        let _slot = other.acquire().unwrap();
        assert_eq!(tracker.open_count().unwrap(), 1);
        tracker.set_max(5).unwrap();
        assert_eq!(other.max().unwrap(), 5);
    }

    #[test]
    fn test_tracker_across_threads() {
        let tracker = ConnectionTracker::new(0);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = tracker.clone();
                std::thread::spawn(move || {
                    let _slot = t.acquire().unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.open_count().unwrap(), 0);
    }
}
