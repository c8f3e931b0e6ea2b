//! Ctrl-C handling for the run loop.
//!
//! The handler only records that SIGINT arrived. The launcher polls the flag
//! and kills the running tool, then the runner aborts the pipeline. It is
//! installed once configuration is resolved, so Ctrl-C at a tool prompt still
//! ends the process.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT handler and return the flag it sets.
pub fn install() -> &'static AtomicBool {
    #[cfg(unix)]
    {
        // SAFETY: the handler only performs an atomic store, which is async-signal-safe.
        unsafe {
            libc::signal(
                libc::SIGINT,
                on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t,
            );
        }
    }

    &INTERRUPTED
}
