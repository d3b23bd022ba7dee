//! Adapter session configuration
//!
//! Carries the requested bit rate and the out-of-band reporting hooks.
//! Transport faults after `init` are non-fatal to the data path and reach
//! the application only through the error hook; informational text (such as
//! the firmware version at open time) goes through the message hook.

use std::sync::Arc;

use log::{error, info};

use crate::error::CombiError;

/// Callback invoked for every recoverable transport error
pub type ErrorHook = Arc<dyn Fn(CombiError) + Send + Sync>;
/// Callback invoked for informational text
pub type MessageHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration consumed by [`crate::CombiAdapter`]
#[derive(Clone)]
pub struct AdapterConfig {
    /// Requested CAN bit rate in kHz
    pub bitrate_khz: u32,
    /// Query and report the firmware version during `init`
    pub print_version: bool,
    /// Recoverable-error sink
    pub on_error: ErrorHook,
    /// Informational-message sink
    pub on_message: MessageHook,
}

impl AdapterConfig {
    /// Create a configuration with the given bit rate and default hooks
    ///
    /// The default hooks forward to the `log` facade.
    pub fn new(bitrate_khz: u32) -> Self {
        Self {
            bitrate_khz,
            print_version: false,
            on_error: Arc::new(|err| error!("combi: {}", err)),
            on_message: Arc::new(|msg| info!("combi: {}", msg)),
        }
    }

    /// Request version logging at open time
    pub fn with_print_version(mut self, print_version: bool) -> Self {
        self.print_version = print_version;
        self
    }

    /// Install a recoverable-error callback
    pub fn with_on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(CombiError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(hook);
        self
    }

    /// Install an informational-message callback
    pub fn with_on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_message = Arc::new(hook);
        self
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(500)
    }
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("bitrate_khz", &self.bitrate_khz)
            .field("print_version", &self.print_version)
            .finish()
    }
}
