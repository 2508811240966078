use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

#[cfg(not(feature = "log-to-stdout"))]
use log::{debug, warn};
use parking_lot::Mutex;

#[cfg(feature = "log-to-stdout")]
use crate::{debug, warn};

type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TokenState {
    cancelled: bool,
    callbacks: Vec<CancelCallback>,
}

/// Cooperative cancellation token. Clones share the state.
/// Once cancelled it stays cancelled. Callbacks fire exactly once, in registration order
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Cancel the token and fire registered callbacks. Subsequent calls do nothing
    pub fn cancel(&self) {
        let callbacks = {
            let mut state = self.state.lock();

            if state.cancelled {
                return;
            }

            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };

        debug!("Token cancelled. Firing {} callback(s)", callbacks.len());

        for callback in callbacks {
            fire(callback)
        }
    }

    /// Register a cancellation callback. Fires immediately if the token is already cancelled
    pub fn register<F: FnOnce() + Send + 'static>(&self, callback: F) {
        let mut state = self.state.lock();

        if state.cancelled {
            drop(state);
            fire(Box::new(callback))
        } else {
            state.callbacks.push(Box::new(callback))
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();

        f.debug_struct("CancellationToken")
            .field("cancelled", &state.cancelled)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

fn fire(callback: CancelCallback) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        warn!(
            "Cancellation callback panicked: {}",
            crate::callback_registry::panic_message(&panic)
        );
    }
}
