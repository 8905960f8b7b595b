use std::sync::{Mutex, MutexGuard, PoisonError};

// Emits a trace event tagged with the current thread when the `tracing` feature is enabled.
macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "tracing")] {
            tracing::trace!("{:?}: {}", std::thread::current().id(), format_args!($($tt)*))
        }
    }
}

pub(crate) use trace;

// Acquire the writer lock.
//
// A panic while holding the lock can only occur in `Hash` or `Eq`. Inserts and
// removes compare keys before touching a slot, and a grow hashes keys before the
// new table is published. An insert that triggers a grow has already completed,
// so a poisoned lock still protects a consistent table.
#[inline]
pub fn lock(writer: &Mutex<()>) -> MutexGuard<'_, ()> {
    writer.lock().unwrap_or_else(PoisonError::into_inner)
}
