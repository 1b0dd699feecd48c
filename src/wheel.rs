use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::slot::SlotList;
use crate::{ConstructionError, Handler};

/// One pending invocation stored in a slot.
struct TimerEntry<T> {
    /// Full revolutions the cursor must complete before this entry expires.
    circles: u64,
    payload: T,
}

struct Inner<T> {
    interval: Duration,
    slots: Box<[Mutex<SlotList<TimerEntry<T>>>]>,
    /// Slot the next tick will scan. Written only by the tick loop.
    cursor: AtomicUsize,
    handler: Arc<dyn Handler<T>>,
    running: AtomicBool,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

/// Single-level timing wheel scheduling delayed one-shot callbacks.
///
/// The wheel partitions time into `slot_count` buckets of `interval` width.
/// Each tick the loop scans exactly one slot, fires the timers whose
/// revolution count has reached zero, and advances the cursor. Insertion and
/// cancellation are O(1) and only contend on the target slot's own lock, so
/// a long scan of one slot never starves scheduling against the rest of the
/// ring.
///
/// `TimeWheel` is a cheap handle over shared state: clone it to drive the
/// blocking [`run`](TimeWheel::run) loop on one thread while scheduling and
/// cancelling from others.
///
/// Timers still pending when the wheel is stopped are dropped without firing.
pub struct TimeWheel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TimeWheel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TimeWheel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeWheel")
            .field("interval", &self.inner.interval)
            .field("slot_count", &self.inner.slots.len())
            .field("running", &self.inner.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + 'static> TimeWheel<T> {
    /// Create a wheel with the given tick interval, slot count, and handler.
    ///
    /// Fails fast on a zero interval or a zero slot count; no partially
    /// usable wheel is ever produced.
    pub fn new<H>(
        interval: Duration,
        slot_count: usize,
        handler: H,
    ) -> Result<Self, ConstructionError>
    where
        H: Handler<T> + 'static,
    {
        if interval.is_zero() {
            return Err(ConstructionError::ZeroInterval);
        }
        if slot_count == 0 {
            return Err(ConstructionError::ZeroSlotCount);
        }

        let slots = (0..slot_count)
            .map(|_| Mutex::new(SlotList::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let (stop_tx, stop_rx) = channel::bounded(1);

        Ok(Self {
            inner: Arc::new(Inner {
                interval,
                slots,
                cursor: AtomicUsize::new(0),
                handler: Arc::new(handler),
                running: AtomicBool::new(false),
                stop_tx,
                stop_rx,
            }),
        })
    }

    /// Run the tick loop on the calling thread, blocking until a matching
    /// [`stop`](TimeWheel::stop). A stop requested before the loop started
    /// terminates it on entry, so spawning `run` and stopping immediately
    /// never strands the loop.
    ///
    /// Ticks are strictly sequential: the loop scans one slot per interval
    /// and never overlaps scans. Fired handlers run on their own threads and
    /// are never waited on.
    ///
    /// # Panics
    ///
    /// Panics if the wheel is already running.
    pub fn run(&self) {
        let inner = &self.inner;
        assert!(
            !inner.running.swap(true, Ordering::AcqRel),
            "time wheel is already running"
        );

        log::debug!(
            "time wheel running: interval {:?}, {} slots",
            inner.interval,
            inner.slots.len()
        );

        let ticker = channel::tick(inner.interval);
        let stop_rx = &inner.stop_rx;
        loop {
            crossbeam::select! {
                recv(ticker) -> _ => inner.tick(),
                recv(stop_rx) -> _ => break,
            }
        }

        // A request racing with teardown already matched this run; discard
        // it so the next run starts clean.
        while stop_rx.try_recv().is_ok() {}

        inner.running.store(false, Ordering::Release);
        log::debug!("time wheel stopped");
    }

    /// Request termination of the run loop. Non-blocking; [`run`](TimeWheel::run)
    /// returns asynchronously after observing the request. Pending timers are
    /// not fired.
    ///
    /// Requests collapse: at most one is ever outstanding, and one issued
    /// while the wheel is stopped is held for the next run.
    pub fn stop(&self) {
        // Bounded(1): a second request while one is pending is already
        // covered by the first.
        let _ = self.inner.stop_tx.try_send(());
    }

    /// Schedule `payload` for delivery to the handler after `delay`.
    ///
    /// The delay is quantized to whole intervals: the timer lands
    /// `delay / interval` ticks ahead of the cursor, accurate to within one
    /// interval. A zero delay (or any delay shorter than one interval) lands
    /// in the cursor's own slot and fires when that slot is next scanned,
    /// normally the immediate next tick — never inline at creation. If
    /// creation races with an in-progress scan of that slot, the timer waits
    /// one full revolution.
    ///
    /// The returned handle does not keep the wheel alive.
    pub fn new_timer(&self, delay: Duration, payload: T) -> TimerHandle<T> {
        let inner = &self.inner;
        let (slot, circles) = inner.placement(delay);
        let (key, generation) = inner.slots[slot].lock().push_back(TimerEntry {
            circles,
            payload,
        });

        TimerHandle {
            wheel: Arc::downgrade(&self.inner),
            slot,
            key,
            generation,
        }
    }

    /// Whether the tick loop is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Tick interval the wheel was constructed with.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Number of slots in the ring.
    pub fn slot_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Total timers currently pending across all slots.
    pub fn pending(&self) -> usize {
        self.inner.slots.iter().map(|s| s.lock().len()).sum()
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Map a delay onto `(target slot, revolution count)` relative to the
    /// current cursor.
    fn placement(&self, delay: Duration) -> (usize, u64) {
        let slot_count = self.slots.len() as u64;
        let steps = (delay.as_nanos() / self.interval.as_nanos()) as u64;
        let circles = steps / slot_count;
        let cursor = self.cursor.load(Ordering::Acquire) as u64;
        let slot = ((cursor + steps % slot_count) % slot_count) as usize;
        (slot, circles)
    }

    /// Scan the cursor slot, dispatch expired timers, advance the cursor.
    fn tick(&self) {
        let cursor = self.cursor.load(Ordering::Acquire);
        let expired = self.slots[cursor].lock().sweep(|entry| {
            if entry.circles > 0 {
                entry.circles -= 1;
                true
            } else {
                false
            }
        });

        if !expired.is_empty() {
            log::trace!("slot {} expired {} timer(s)", cursor, expired.len());
        }

        // Fire-and-forget: each handler runs on its own thread so a slow or
        // panicking handler cannot stall the loop or the rest of the scan.
        // Dispatch order follows scan (insertion) order.
        for entry in expired {
            let handler = Arc::clone(&self.handler);
            thread::spawn(move || {
                if catch_unwind(AssertUnwindSafe(|| handler.handle(entry.payload))).is_err() {
                    log::error!("timer handler panicked");
                }
            });
        }

        self.cursor
            .store((cursor + 1) % self.slots.len(), Ordering::Release);
    }
}

/// Handle to one scheduled invocation.
///
/// The handle stays valid for the lifetime of its timer and becomes inert
/// once the timer fires, is cancelled, or the wheel itself is dropped.
/// Internally it carries the owning slot plus a generation-tagged key, so an
/// expired handle can never cancel an unrelated timer that reused its
/// storage.
pub struct TimerHandle<T> {
    wheel: Weak<Inner<T>>,
    slot: usize,
    key: usize,
    generation: u32,
}

impl<T> TimerHandle<T> {
    /// Cancel the timer if it is still pending, without firing it.
    ///
    /// Returns `true` if this call removed the timer. Idempotent: cancelling
    /// an already-fired or already-cancelled timer is a no-op returning
    /// `false`. Safe to call concurrently with the tick loop — the slot lock
    /// serializes cancellation against the scan, so a timer is never both
    /// fired and cancelled.
    pub fn cancel(&self) -> bool {
        let Some(wheel) = self.wheel.upgrade() else {
            return false;
        };
        let mut slot = wheel.slots[self.slot].lock();
        slot.remove(self.key, self.generation).is_some()
    }
}

impl<T> fmt::Debug for TimerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("slot", &self.slot)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}
