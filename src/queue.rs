use core::{cell::RefCell, future::poll_fn, task::Poll};

use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    waitqueue::MultiWakerRegistration,
};
use embassy_time::{with_timeout, Duration};
use heapless::Deque;

use crate::record::SensorRecord;

/// Readers that can park in [`SampleQueue::receive`] at once
const MAX_WAITING_READERS: usize = 4;

struct Inner<const N: usize> {
    records: Deque<SensorRecord, N>,
    waiters: MultiWakerRegistration<MAX_WAITING_READERS>,
}

/// Bounded FIFO of records with a single writer.
/// A full queue drops its oldest record, writes never block or fail.
pub struct SampleQueue<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<Inner<N>>>,
}

impl<M: RawMutex, const N: usize> Default for SampleQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> SampleQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                records: Deque::new(),
                waiters: MultiWakerRegistration::new(),
            })),
        }
    }

    /// Appends a record, returns true if the oldest one was evicted to make room
    pub fn publish(&self, record: SensorRecord) -> bool {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let evicted = inner.records.is_full() && inner.records.pop_front().is_some();
            // room was made above, only a zero-capacity queue drops the record here
            let _ = inner.records.push_back(record);
            inner.waiters.wake();
            evicted
        })
    }

    /// Most recent record, left in the queue
    pub fn peek_latest(&self) -> Option<SensorRecord> {
        self.inner.lock(|inner| inner.borrow().records.back().copied())
    }

    /// Oldest record, removed
    pub fn try_receive(&self) -> Option<SensorRecord> {
        self.inner.lock(|inner| inner.borrow_mut().records.pop_front())
    }

    /// Waits up to `timeout` for a record and removes it
    pub async fn receive(&self, timeout: Duration) -> Option<SensorRecord> {
        let next = poll_fn(|cx| {
            self.inner.lock(|inner| {
                let mut inner = inner.borrow_mut();
                match inner.records.pop_front() {
                    Some(record) => Poll::Ready(record),
                    None => {
                        inner.waiters.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        });

        with_timeout(timeout, next).await.ok()
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&self) {
        self.inner.lock(|inner| inner.borrow_mut().records.clear());
    }
}
