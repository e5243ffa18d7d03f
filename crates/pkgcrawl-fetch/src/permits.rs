use std::sync::{Condvar, Mutex, PoisonError};

/// Counting semaphore capping the number of requests in flight.
///
/// Permits are returned when the [`Permit`] guard drops, including on error
/// and panic paths.
pub struct ConnectionPermits {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

pub struct Permit<'a> {
    pool: &'a ConnectionPermits,
}

impl ConnectionPermits {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Blocks until a permit is free.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        Permit {
            pool: self,
        }
    }

    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            pool: self,
        })
    }

    pub fn available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut available = self
            .pool
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.pool.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_permits_are_returned_on_drop() {
        let permits = ConnectionPermits::new(2);
        let a = permits.acquire();
        let _b = permits.acquire();
        assert!(permits.try_acquire().is_none());

        drop(a);
        assert_eq!(permits.available(), 1);
        assert!(permits.try_acquire().is_some());
        assert_eq!(permits.available(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let permits = ConnectionPermits::new(0);
        assert_eq!(permits.capacity(), 1);
    }

    #[test]
    fn test_concurrency_never_exceeds_capacity() {
        let permits = Arc::new(ConnectionPermits::new(3));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let permits = permits.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    let _permit = permits.acquire();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(permits.available(), 3);
    }
}
