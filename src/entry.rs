//! Per-key entry model: snapshots, merge patches and in-flight handles.
//!
//! The store owns every entry. Callers only ever receive an [`Entry`]
//! snapshot; re-read the cache to observe later state.

use crate::error::Error;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;

/// Handle to a running load operation.
///
/// Cloned into every snapshot taken while the load runs. [`wait`](Self::wait)
/// resolves once the load's outcome has been committed by its `Settle`, or
/// the `Settle` was dropped without being applied.
#[derive(Clone)]
pub struct InFlight {
    id: u64,
    done: Shared<BoxFuture<'static, ()>>,
}

/// Sending half of an [`InFlight`]; dropping it releases every waiter.
pub(crate) struct Completion {
    _tx: oneshot::Sender<()>,
}

impl InFlight {
    pub(crate) fn new(id: u64) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel::<()>();
        let done = rx.map(|_| ()).boxed().shared();
        (InFlight { id, done }, Completion { _tx: tx })
    }

    /// Identifier of the load operation, unique per cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the owning load has settled (or been abandoned).
    pub fn is_done(&self) -> bool {
        self.done.clone().now_or_never().is_some()
    }

    /// Wait until the owning load settles.
    pub async fn wait(&self) {
        self.done.clone().await
    }
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InFlight {}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Snapshot of one cache entry.
#[derive(Clone, Debug)]
pub struct Entry<V> {
    pub(crate) data: Option<V>,
    pub(crate) error: Option<Error>,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) subscribers: usize,
}

/// Read outcome of an entry.
///
/// Data wins over an in-flight reload (stale-while-revalidate), an in-flight
/// load wins over a previous error.
#[derive(Debug, PartialEq)]
pub enum EntryStatus<'a, V> {
    /// A committed value is available.
    Ready(&'a V),
    /// A load is running; wait on the handle and read again.
    Loading(&'a InFlight),
    /// The last load failed terminally.
    Failed(&'a Error),
    /// Created by a `set` that provided nothing yet.
    Empty,
}

impl<V> Entry<V> {
    pub fn data(&self) -> Option<&V> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of distinct subscribers at snapshot time.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
    }

    pub fn status(&self) -> EntryStatus<'_, V> {
        if let Some(data) = &self.data {
            EntryStatus::Ready(data)
        } else if let Some(in_flight) = &self.in_flight {
            EntryStatus::Loading(in_flight)
        } else if let Some(error) = &self.error {
            EntryStatus::Failed(error)
        } else {
            EntryStatus::Empty
        }
    }

    /// Consume the snapshot, keeping only the value.
    pub fn into_data(self) -> Option<V> {
        self.data
    }
}

/// One field of a [`Patch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Field<T> {
    /// Leave the current value untouched.
    #[default]
    Keep,
    /// Replace the current value.
    Set(T),
    /// Remove the current value.
    Clear,
}

impl<T> Field<T> {
    pub(crate) fn apply(self, slot: &mut Option<T>) {
        match self {
            Field::Keep => {}
            Field::Set(value) => *slot = Some(value),
            Field::Clear => *slot = None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Field::Keep)
    }
}

/// Merge patch applied by `Cache::set`.
///
/// Only fields that are not [`Field::Keep`] change; subscribers are never
/// part of a patch and survive every merge.
#[derive(Clone, Debug)]
pub struct Patch<V> {
    pub data: Field<V>,
    pub error: Field<Error>,
    pub in_flight: Field<InFlight>,
}

impl<V> Default for Patch<V> {
    fn default() -> Self {
        Patch {
            data: Field::Keep,
            error: Field::Keep,
            in_flight: Field::Keep,
        }
    }
}

impl<V> Patch<V> {
    /// Empty patch: creates the entry if needed and notifies, changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful commit: sets data, clears error and in-flight.
    pub fn resolved(data: V) -> Self {
        Patch {
            data: Field::Set(data),
            error: Field::Clear,
            in_flight: Field::Clear,
        }
    }

    /// Failed commit: sets error, clears data and in-flight.
    pub fn failed(error: Error) -> Self {
        Patch {
            data: Field::Clear,
            error: Field::Set(error),
            in_flight: Field::Clear,
        }
    }

    pub fn with_data(mut self, data: V) -> Self {
        self.data = Field::Set(data);
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Field::Set(error);
        self
    }

    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = Field::Set(in_flight);
        self
    }

    pub fn clear_data(mut self) -> Self {
        self.data = Field::Clear;
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Field::Clear;
        self
    }

    pub fn clear_in_flight(mut self) -> Self {
        self.in_flight = Field::Clear;
        self
    }
}
