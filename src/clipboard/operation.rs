//! Asynchronous paste operation
//!
//! A paste target may run the transfer in the background and report the
//! result later. It calls `set_async_mode`, `start_operation`, then
//! `end_operation` with a result code; the outcome is forwarded to an
//! [`OperationHandler`] (the buffer coordinator).

use parking_lot::Mutex;
use std::sync::Weak;
use tracing::{debug, warn};

/// Success
pub const S_OK: u32 = 0x0000_0000;
/// Success, nothing done
pub const S_FALSE: u32 = 0x0000_0001;
/// Operation aborted
pub const E_ABORT: u32 = 0x8000_4004;
/// Unspecified failure
pub const E_FAIL: u32 = 0x8000_4005;
/// HRESULT_FROM_WIN32(ERROR_CANCELLED)
pub const E_CANCELLED: u32 = 0x8007_04C7;

/// Drop effect reported by a target that moved or copied the data
pub const DROPEFFECT_COPY: u32 = 1;

/// How a paste target ended the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Target finished
    Completed {
        /// `S_OK`; `S_FALSE` means the target finished without performing the drop
        performed: bool,
        /// Drop effect the target reported
        effects: u32,
    },
    /// User cancelled or aborted in the target
    Cancelled,
    /// Target failed
    Failed {
        /// Result code reported by the target
        code: u32,
    },
}

impl OperationOutcome {
    /// Map an end-of-operation result code and drop effect
    pub fn from_hresult(result: u32, effects: u32) -> Self {
        match result {
            S_OK | S_FALSE => Self::Completed {
                performed: result == S_OK,
                effects,
            },
            E_ABORT | E_CANCELLED => Self::Cancelled,
            code => Self::Failed { code },
        }
    }
}

/// Receives the end of an asynchronous operation
pub trait OperationHandler: Send + Sync {
    /// The target called `end_operation`
    fn operation_ended(&self, outcome: OperationOutcome);
}

#[derive(Debug, Default)]
struct OperationFlags {
    async_mode: bool,
    in_operation: bool,
}

/// Async-operation state exposed alongside the virtual file data object
pub struct AsyncOperation {
    flags: Mutex<OperationFlags>,
    handler: Weak<dyn OperationHandler>,
}

impl AsyncOperation {
    /// Operation that reports to `handler`
    pub fn new(handler: Weak<dyn OperationHandler>) -> Self {
        Self {
            flags: Mutex::new(OperationFlags {
                async_mode: true,
                in_operation: false,
            }),
            handler,
        }
    }

    /// Target asks to run synchronously (`false`) or asynchronously (`true`)
    pub fn set_async_mode(&self, enabled: bool) {
        self.flags.lock().async_mode = enabled;
    }

    /// Whether asynchronous extraction is allowed
    pub fn is_async(&self) -> bool {
        self.flags.lock().async_mode
    }

    /// Target begins extracting
    pub fn start_operation(&self) {
        let mut flags = self.flags.lock();
        flags.in_operation = true;
        debug!("Async paste operation started");
    }

    /// Whether an operation is running
    pub fn in_operation(&self) -> bool {
        self.flags.lock().in_operation
    }

    /// Target finished, cancelled or failed
    pub fn end_operation(&self, result: u32, effects: u32) {
        {
            let mut flags = self.flags.lock();
            if !flags.in_operation {
                warn!("end_operation without start_operation (0x{:08X})", result);
            }
            flags.in_operation = false;
        }

        let outcome = OperationOutcome::from_hresult(result, effects);
        debug!("Async paste operation ended: {:?}", outcome);
        if let Some(handler) = self.handler.upgrade() {
            handler.operation_ended(outcome);
        }
    }
}

impl std::fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("flags", &*self.flags.lock())
            .finish()
    }
}
