//! Write path: normalize, redact and append
//!
//! A permission or read-only-filesystem failure must not take down the host
//! process, so by default the emitter logs one warning and turns every later
//! emit into a no-op. Strict mode returns every error instead.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::config::LoadedConfig;
use crate::error::{GuckError, Result};
use crate::event::{EmitContext, Event, EventInput};
use crate::redact::Redactor;
use crate::storage::JsonlStore;

/// Outcome of a single emit
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// The event was appended
    Written(Event),
    /// Capture is disabled in configuration
    Disabled,
    /// Writes were switched off after a permission error
    Suppressed,
}

/// Appends events to the local store
#[derive(Debug)]
pub struct Emitter {
    store: JsonlStore,
    redactor: Redactor,
    context: EmitContext,
    enabled: bool,
    strict: bool,
    write_disabled: AtomicBool,
}

impl Emitter {
    pub fn new(store: JsonlStore, redactor: Redactor, context: EmitContext) -> Self {
        Self {
            store,
            redactor,
            context,
            enabled: true,
            strict: false,
            write_disabled: AtomicBool::new(false),
        }
    }

    /// Emitter wired from loaded configuration
    pub fn from_config(loaded: &LoadedConfig) -> Self {
        Self::new(
            JsonlStore::new(&loaded.store_dir),
            Redactor::new(&loaded.config.redaction),
            loaded.emit_context(),
        )
        .with_enabled(loaded.config.enabled)
        .with_strict(loaded.strict_write_errors)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn context(&self) -> &EmitContext {
        &self.context
    }

    pub fn writes_disabled(&self) -> bool {
        self.write_disabled.load(Ordering::Relaxed)
    }

    /// Normalize, redact and append one event
    pub fn emit(&self, input: EventInput) -> Result<EmitOutcome> {
        if !self.enabled {
            return Ok(EmitOutcome::Disabled);
        }
        if self.writes_disabled() {
            return Ok(EmitOutcome::Suppressed);
        }

        let event = self.redactor.redact_event(input.normalize(&self.context));
        match self.store.append(&event) {
            Ok(_) => Ok(EmitOutcome::Written(event)),
            Err(GuckError::Io(e)) if !self.strict && is_permission_error(&e) => {
                if !self.write_disabled.swap(true, Ordering::Relaxed) {
                    warn!(
                        "Write to {} failed ({}); disabling further writes. \
                         Set GUCK_STRICT_WRITE_ERRORS=1 to fail hard.",
                        self.store.root().display(),
                        e
                    );
                }
                Ok(EmitOutcome::Suppressed)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_permission_error(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EACCES || code == libc::EPERM || code == libc::EROFS
    ) || err.kind() == std::io::ErrorKind::PermissionDenied
}
