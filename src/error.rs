//! Error types for the CombiAdapter driver
//!
//! This module defines the error types used throughout the driver
//! for handling USB communication and protocol errors.

use thiserror::Error;

/// Result type alias for CombiAdapter operations
pub type Result<T> = std::result::Result<T, CombiError>;

/// Error types for CombiAdapter operations
#[derive(Error, Debug)]
pub enum CombiError {
    /// USB error from the rusb library
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// No CombiAdapter found on the bus
    #[error("No CombiAdapter found")]
    DeviceNotFound,

    /// Session has not been initialized
    #[error("Adapter is not initialized")]
    NotInitialized,

    /// Failed to claim interface
    #[error("Failed to claim USB interface: {0}")]
    ClaimInterface(rusb::Error),

    /// Failed to detach kernel driver
    #[error("Failed to detach kernel driver: {0}")]
    DetachKernelDriver(rusb::Error),

    /// Failed to activate the device configuration
    #[error("Failed to set USB configuration: {0}")]
    SetConfiguration(rusb::Error),

    /// Bulk transfer failed
    #[error("Bulk transfer failed: {0}")]
    BulkTransfer(rusb::Error),

    /// Timeout during read operation
    #[error("Read timeout")]
    ReadTimeout,

    /// A bulk write accepted fewer bytes than the encoded packet
    #[error("Short write: sent {actual} bytes of {expected}")]
    ShortWrite { expected: usize, actual: usize },

    /// Invalid response from device
    #[error("Invalid response from device: expected {expected} bytes, got {actual}")]
    InvalidResponse { expected: usize, actual: usize },

    /// Inbound frame payload too short or carrying an impossible length
    #[error("Malformed frame payload ({0} bytes)")]
    MalformedFrame(usize),

    /// The device handle is still shared with a running task
    #[error("Device handle still in use during teardown")]
    HandleInUse,
}

impl CombiError {
    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CombiError::ReadTimeout | CombiError::Usb(rusb::Error::Timeout)
        )
    }

    /// Check if this error is a USB error
    pub fn is_usb_error(&self) -> bool {
        matches!(
            self,
            CombiError::Usb(_)
                | CombiError::ClaimInterface(_)
                | CombiError::DetachKernelDriver(_)
                | CombiError::SetConfiguration(_)
                | CombiError::BulkTransfer(_)
        )
    }
}
