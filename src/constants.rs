//! CombiAdapter protocol constants
//!
//! This module contains the constants used by the CombiAdapter wire
//! protocol, the USB topology of the device, and the sizing/timing
//! parameters of the transport tasks.

use std::time::Duration;

// ============================================================================
// Protocol command codes
// ============================================================================

/// Version query/response
pub const CMD_VERSION: u8 = 0x20;
/// Open/close the logical CAN connection (1-byte boolean payload)
pub const CMD_OPEN: u8 = 0x80;
/// Set the CAN bitrate (4-byte big-endian value in Hz)
pub const CMD_SET_BITRATE: u8 = 0x81;
/// Inbound CAN frame notification
pub const CMD_RX_FRAME: u8 = 0x82;
/// Outbound CAN frame; on the receive path this is the device's
/// acknowledgment of a previously transmitted frame
pub const CMD_TX_FRAME: u8 = 0x83;

/// Message terminator sentinel
pub const TERMINATOR: u8 = 0x00;

/// Number of bytes preceding the payload (command + 16-bit length)
pub const HEADER_LEN: usize = 3;

// ============================================================================
// Frame payload layout (RxFrame / TxFrame)
// ============================================================================

/// Fixed payload length of a TxFrame/RxFrame message
pub const FRAME_PAYLOAD_LEN: usize = 15;
/// Total encoded size of a transmit packet (header + payload + terminator)
pub const TX_PACKET_LEN: usize = HEADER_LEN + FRAME_PAYLOAD_LEN + 1;
/// Offset of the little-endian identifier within the payload
pub const FRAME_ID_OFFSET: usize = 0;
/// Offset of the data bytes within the payload
pub const FRAME_DATA_OFFSET: usize = 4;
/// Offset of the actual-data-length byte within the payload
pub const FRAME_LEN_OFFSET: usize = 12;

/// Offset of the minor version byte within a Version response payload
pub const VERSION_MINOR_OFFSET: usize = 4;
/// Offset of the major version byte within a Version response payload
pub const VERSION_MAJOR_OFFSET: usize = 5;

// ============================================================================
// CAN limits
// ============================================================================

/// Maximum data length of a classic CAN frame
pub const CAN_MAX_DLEN: usize = 8;
/// Standard (11-bit) frame format mask
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// Extended (29-bit) frame format mask
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

// ============================================================================
// USB topology
// ============================================================================

/// CombiAdapter vendor id
pub const COMBI_VID: u16 = 0xFFFF;
/// CombiAdapter product id
pub const COMBI_PID: u16 = 0x0005;
/// Configuration value to activate
pub const USB_CONFIGURATION: u8 = 1;
/// Interface number carrying the bulk endpoints
pub const USB_INTERFACE: u8 = 1;
/// Bulk IN endpoint address (endpoint 2, direction IN)
pub const ENDPOINT_IN: u8 = 0x82;
/// Bulk OUT endpoint address (endpoint 5, direction OUT)
pub const ENDPOINT_OUT: u8 = 0x05;
/// Full-speed bulk maximum packet size
pub const MAX_PACKET_SIZE: usize = 64;

// ============================================================================
// Task sizing and timing
// ============================================================================

/// Ring buffer capacity; several packets deep to absorb scheduling jitter
/// between the USB reader and the frame parser
pub const RING_CAPACITY: usize = MAX_PACKET_SIZE * 10;
/// Outbound frame queue depth
pub const OUTBOUND_QUEUE_CAPACITY: usize = 10;
/// Inbound frame queue depth
pub const INBOUND_QUEUE_CAPACITY: usize = 20;

/// Upper bound on a single parser/pump wait; every blocking wait re-checks
/// the shutdown flag on this schedule
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Bulk read timeout for the USB reader task
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Bulk write timeout for handshake requests and transmit packets
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Grace period after sending Open(0) so the device can drain
pub const CLOSE_GRACE: Duration = Duration::from_millis(200);
/// Grace period for the tasks to observe the shutdown flag
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(10);
