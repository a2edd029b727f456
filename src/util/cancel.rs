//! Cooperative cancellation, polled between files.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{AssayError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Route SIGINT to this token instead of the default handler.
    /// Only one token per process can be wired.
    pub fn cancel_on_interrupt(&self) -> Result<()> {
        if INTERRUPT_FLAG.set(self.flag.clone()).is_err() {
            return Err(AssayError::ConfigError(
                "an interrupt handler is already installed".to_string(),
            ));
        }
        let action = SigAction::new(
            SigHandler::Handler(on_interrupt),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe { signal::sigaction(Signal::SIGINT, &action) }
            .map_err(|e| AssayError::ConfigError(format!("failed to install SIGINT handler: {e}")))?;
        Ok(())
    }
}

static INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_interrupt(_: nix::libc::c_int) {
    if let Some(flag) = INTERRUPT_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}
