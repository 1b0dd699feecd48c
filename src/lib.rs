//! A single-level timing wheel for delayed one-shot callbacks, with O(1)
//! scheduling and cancellation and a non-blocking dispatch discipline: slow
//! handlers never stall the tick loop.
//!
//! The crate also bundles two independent utilities that share nothing with
//! the wheel: a consistent-hash ring ([`ring`]) and a time-ordered unique-ID
//! generator ([`snowflake`]).

mod slot;
mod wheel;

pub mod ring;
pub mod snowflake;

pub use wheel::{TimeWheel, TimerHandle};

/// Errors rejecting an invalid wheel configuration at construction time.
///
/// A wheel is either fully constructed or not constructed at all; there is
/// no partially usable instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    #[error("slot count must be greater than zero")]
    ZeroSlotCount,
}

/// The callback capability invoked once per fired timer.
///
/// Handlers are shared across dispatch threads, so the single method takes
/// `&self`. Any `Fn(T) + Send + Sync` closure is a handler:
///
/// ```
/// use std::time::Duration;
/// use timewheel::TimeWheel;
///
/// let wheel = TimeWheel::new(Duration::from_millis(100), 60, |msg: String| {
///     println!("{msg}");
/// })
/// .unwrap();
/// wheel.new_timer(Duration::from_secs(3), "expired".to_owned());
/// ```
///
/// The wheel neither observes nor propagates handler failures; a panicking
/// handler is isolated on its dispatch thread and logged.
pub trait Handler<T>: Send + Sync {
    fn handle(&self, payload: T);
}

impl<T, F> Handler<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn handle(&self, payload: T) {
        self(payload)
    }
}
