//! Lazy, memoized, single-flight metadata collections.
//!
//! A `DeferredList<T>` wraps one population callback and transitions
//! NEW -> POPULATING -> POPULATED exactly once per lifetime. Concurrent
//! first accessors block on a condition variable until the single
//! population finishes and then observe the same result. A callback that
//! re-enters its own list fails with a recursion error instead of
//! deadlocking. `reset` discards contents and returns the list to NEW.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::error::{CubeflowError, Result};

type Fetch<T> = Box<dyn Fn() -> Result<Vec<T>> + Send + Sync>;

enum State<T> {
    New { epoch: u64 },
    Populating { epoch: u64, owner: ThreadId },
    Populated { epoch: u64, items: Arc<Vec<T>> },
}

impl<T> State<T> {
    fn epoch(&self) -> u64 {
        match self {
            State::New { epoch }
            | State::Populating { epoch, .. }
            | State::Populated { epoch, .. } => *epoch,
        }
    }
}

pub struct DeferredList<T> {
    name: String,
    fetch: Fetch<T>,
    state: Mutex<State<T>>,
    populated: Condvar,
}

impl<T> fmt::Debug for DeferredList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock().unwrap() {
            State::New { .. } => "new",
            State::Populating { .. } => "populating",
            State::Populated { .. } => "populated",
        };
        f.debug_struct("DeferredList")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}

impl<T> DeferredList<T> {
    pub fn named<F>(name: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Result<Vec<T>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fetch: Box::new(fetch),
            state: Mutex::new(State::New { epoch: 0 }),
            populated: Condvar::new(),
        }
    }

    /// A list that is already populated; the callback just replays the
    /// contents after a `reset`.
    pub fn preloaded(name: impl Into<String>, items: Vec<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let list = Self::named(name, move || Ok(items.clone()));
        let _ = list.get();
        list
    }

    /// Return the populated contents, populating on first access. At most
    /// one population runs per lifetime; concurrent callers block until it
    /// finishes. The populating thread re-entering this list is an error.
    pub fn get(&self) -> Result<Arc<Vec<T>>> {
        let my_epoch;
        {
            let mut state = self.state.lock().unwrap();
            loop {
                match &*state {
                    State::Populated { items, .. } => return Ok(items.clone()),
                    State::Populating { owner, .. } => {
                        if *owner == thread::current().id() {
                            return Err(CubeflowError::RecursivePopulation(self.name.clone()));
                        }
                        state = self.populated.wait(state).unwrap();
                    }
                    State::New { epoch } => {
                        my_epoch = *epoch;
                        break;
                    }
                }
            }
            *state = State::Populating {
                epoch: my_epoch,
                owner: thread::current().id(),
            };
        }

        let fetched = (self.fetch)();

        let mut state = self.state.lock().unwrap();
        let current = state.epoch();
        if current != my_epoch {
            // reset() intervened; hand the data to this caller but leave the
            // list in its reset state.
            return fetched.map(Arc::new);
        }
        match fetched {
            Ok(items) => {
                let items = Arc::new(items);
                *state = State::Populated {
                    epoch: my_epoch,
                    items: items.clone(),
                };
                self.populated.notify_all();
                Ok(items)
            }
            Err(e) => {
                *state = State::New { epoch: my_epoch };
                self.populated.notify_all();
                Err(e)
            }
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), State::Populated { .. })
    }

    /// Discard contents and return to NEW. The next access repopulates.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        let epoch = state.epoch();
        *state = State::New { epoch: epoch + 1 };
        self.populated.notify_all();
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
