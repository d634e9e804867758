//! Process-wide transport state.
//!
//! [`init`] must be called once before connections are opened from several
//! threads, and [`unload`] releases the transport after the last connection
//! is gone. Neither is ever called implicitly. Every open connection holds
//! a [`LiveConnection`] token, so `unload` can refuse to run while
//! connections are still alive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sphinxql_core::{Error, Result, StateErrorKind};

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Initialize the transport layer. Calling it again is harmless.
pub fn init() -> Result<()> {
    if !INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("SphinxQL transport initialized");
    }
    Ok(())
}

/// Tear down the transport layer.
///
/// Fails with `StateErrorKind::LibraryBusy` while connections are open.
pub fn unload() -> Result<()> {
    let live = LIVE_CONNECTIONS.load(Ordering::SeqCst);
    if live > 0 {
        return Err(Error::state(
            StateErrorKind::LibraryBusy,
            format!("Cannot unload transport: {} connection(s) still open", live),
        ));
    }
    if INITIALIZED.swap(false, Ordering::SeqCst) {
        tracing::debug!("SphinxQL transport unloaded");
    }
    Ok(())
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

/// Number of connections currently open in this process.
pub fn live_connections() -> usize {
    LIVE_CONNECTIONS.load(Ordering::SeqCst)
}

/// Registration of one open connection; released on drop.
#[derive(Debug)]
pub(crate) struct LiveConnection(());

impl LiveConnection {
    pub(crate) fn register() -> Self {
        if !is_initialized() {
            tracing::trace!("Connection opened before library::init()");
        }
        LIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
        LiveConnection(())
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        LIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}
