//! CombiAdapter session
//!
//! This module provides the `CombiAdapter` struct owning the USB resources
//! (context, device, configuration, interface, bulk endpoints) and the
//! three transport tasks that run for the lifetime of an open session:
//! the USB reader, the frame parser and the transmit pump.
//!
//! # Example
//!
//! ```no_run
//! use combi_usb::{AdapterConfig, CanFrame, CombiAdapter};
//!
//! fn main() -> combi_usb::Result<()> {
//!     if !combi_usb::probe() {
//!         println!("No CombiAdapter found");
//!         return Ok(());
//!     }
//!
//!     let mut adapter = CombiAdapter::new(AdapterConfig::new(500));
//!     adapter.init()?;
//!
//!     adapter
//!         .sender()
//!         .send(CanFrame::outgoing(0x7E0, &[0x02, 0x10, 0x01]))
//!         .ok();
//!
//!     for frame in adapter.receiver().iter().take(10) {
//!         println!("RX  {}", frame);
//!     }
//!
//!     adapter.close()
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{trace, warn};
use rusb::{Context, DeviceHandle, UsbContext};

use crate::config::{AdapterConfig, ErrorHook};
use crate::constants::{
    CLOSE_GRACE, CMD_OPEN, CMD_SET_BITRATE, CMD_VERSION, COMBI_PID, COMBI_VID, ENDPOINT_IN,
    ENDPOINT_OUT, HEADER_LEN, INBOUND_QUEUE_CAPACITY, MAX_PACKET_SIZE, OUTBOUND_QUEUE_CAPACITY,
    POLL_INTERVAL, READ_TIMEOUT, RING_CAPACITY, SHUTDOWN_GRACE, USB_CONFIGURATION, USB_INTERFACE,
    VERSION_MAJOR_OFFSET, VERSION_MINOR_OFFSET, WRITE_TIMEOUT,
};
use crate::error::{CombiError, Result};
use crate::frame::CanFrame;
use crate::gate::TxGate;
use crate::packet::CombiPacket;
use crate::parser::FrameParser;
use crate::pump::TxPump;
use crate::ring::RingBuffer;

/// Check whether a CombiAdapter is present on the USB subsystem
///
/// Explicit and idempotent; opens and closes a probe handle without side
/// effects. Capability-discovery collaborators call this before wiring the
/// adapter into their registry.
pub fn probe() -> bool {
    match Context::new() {
        Ok(context) => context
            .open_device_with_vid_pid(COMBI_VID, COMBI_PID)
            .is_some(),
        Err(_) => false,
    }
}

/// How far `init` progressed; drives which teardown steps apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitStage {
    Closed,
    ContextReady,
    DeviceOpen,
    Configured,
    InterfaceClaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownStep {
    ReleaseInterface,
    CloseDevice,
    CloseContext,
}

/// Teardown plan for a given init progress, innermost resource first
///
/// libusb folds releasing the active configuration into closing the device
/// handle, so `Configured` adds no step beyond `DeviceOpen`.
fn teardown_steps(stage: InitStage) -> &'static [TeardownStep] {
    use TeardownStep::*;
    match stage {
        InitStage::Closed => &[],
        InitStage::ContextReady => &[CloseContext],
        InitStage::DeviceOpen | InitStage::Configured => &[CloseDevice, CloseContext],
        InitStage::InterfaceClaimed => &[ReleaseInterface, CloseDevice, CloseContext],
    }
}

/// CombiAdapter transport session
///
/// Orchestrates device open, handshake, bitrate configuration and close,
/// and exposes the inbound/outbound frame queues to the caller. Frames
/// written to [`CombiAdapter::sender`] are transmitted with at most one
/// frame awaiting device acknowledgment at any time; decoded inbound frames
/// arrive on [`CombiAdapter::receiver`].
pub struct CombiAdapter {
    config: AdapterConfig,
    context: Option<Context>,
    handle: Option<Arc<DeviceHandle<Context>>>,
    stage: InitStage,
    shutdown: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    outbound_tx: Sender<CanFrame>,
    outbound_rx: Receiver<CanFrame>,
    inbound_tx: Sender<CanFrame>,
    inbound_rx: Receiver<CanFrame>,
    active: bool,
}

impl CombiAdapter {
    /// Create a session with the given configuration
    ///
    /// No USB resources are touched until [`CombiAdapter::init`].
    pub fn new(config: AdapterConfig) -> Self {
        let (outbound_tx, outbound_rx) = bounded(OUTBOUND_QUEUE_CAPACITY);
        let (inbound_tx, inbound_rx) = bounded(INBOUND_QUEUE_CAPACITY);
        Self {
            config,
            context: None,
            handle: None,
            stage: InitStage::Closed,
            shutdown: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
            outbound_tx,
            outbound_rx,
            inbound_tx,
            inbound_rx,
            active: false,
        }
    }

    /// Adapter name
    pub fn name(&self) -> &'static str {
        "CombiAdapter"
    }

    /// Handle to the outbound frame queue
    pub fn sender(&self) -> Sender<CanFrame> {
        self.outbound_tx.clone()
    }

    /// Handle to the inbound frame queue
    pub fn receiver(&self) -> Receiver<CanFrame> {
        self.inbound_rx.clone()
    }

    /// Accepted but not implemented at transport level
    pub fn set_filter(&mut self, _identifiers: &[u32]) -> Result<()> {
        Ok(())
    }

    /// Open and fully activate the session
    ///
    /// Opens the bus context, the device and its configuration/interface,
    /// performs the open handshake and bitrate configuration, then starts
    /// the reader, parser and transmit tasks. On failure, only the
    /// resources acquired so far are torn down (best effort, each teardown
    /// error reported through the error hook) and the step's error is
    /// returned.
    pub fn init(&mut self) -> Result<()> {
        match self.try_init() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.teardown();
                Err(err)
            }
        }
    }

    fn try_init(&mut self) -> Result<()> {
        self.shutdown.store(false, Ordering::Relaxed);

        let context = Context::new()?;
        self.context = Some(context);
        self.stage = InitStage::ContextReady;

        let handle = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.open_device_with_vid_pid(COMBI_VID, COMBI_PID))
            .ok_or(CombiError::DeviceNotFound)?;
        self.handle = Some(Arc::new(handle));
        self.stage = InitStage::DeviceOpen;

        // Kernel driver detach is best effort; not every platform supports it.
        let on_error = Arc::clone(&self.config.on_error);
        if let Err(err) = self
            .exclusive_handle()?
            .set_auto_detach_kernel_driver(true)
        {
            if err != rusb::Error::NotSupported {
                on_error(CombiError::DetachKernelDriver(err));
            }
        }

        self.exclusive_handle()?
            .set_active_configuration(USB_CONFIGURATION)
            .map_err(CombiError::SetConfiguration)?;
        self.stage = InitStage::Configured;

        self.exclusive_handle()?
            .claim_interface(USB_INTERFACE)
            .map_err(CombiError::ClaimInterface)?;
        self.stage = InitStage::InterfaceClaimed;

        let handle = Arc::clone(self.handle.as_ref().ok_or(CombiError::NotInitialized)?);

        // Defensive reset in case a previous session left the device open.
        self.write_packet(&handle, CombiPacket::new(CMD_OPEN, vec![0]))?;

        if self.config.print_version {
            match self.read_version_on(&handle) {
                Ok(version) => (self.config.on_message)(&version),
                Err(err) => (self.config.on_error)(err),
            }
        }

        let rate_hz = self.config.bitrate_khz * 1000;
        self.write_packet(
            &handle,
            CombiPacket::new(CMD_SET_BITRATE, rate_hz.to_be_bytes().to_vec()),
        )?;

        self.write_packet(&handle, CombiPacket::new(CMD_OPEN, vec![1]))?;

        self.spawn_tasks(handle);
        self.active = true;
        Ok(())
    }

    /// Deactivate and release all resources
    ///
    /// Always attempts full teardown; individual step failures are reported
    /// through the error hook and do not stop later steps.
    pub fn close(&mut self) -> Result<()> {
        if self.active {
            if let Some(handle) = self.handle.as_ref() {
                // Let the device drain before the tasks stop.
                if let Err(err) = self.write_packet(handle, CombiPacket::new(CMD_OPEN, vec![0])) {
                    (self.config.on_error)(err);
                }
                thread::sleep(CLOSE_GRACE);
            }
        }

        self.shutdown.store(true, Ordering::Relaxed);
        thread::sleep(SHUTDOWN_GRACE);
        for task in self.tasks.drain(..) {
            if task.join().is_err() {
                warn!("transport task panicked during shutdown");
            }
        }
        self.active = false;
        self.teardown();
        Ok(())
    }

    /// Query the firmware version, synchronously
    ///
    /// Writes a `Version` request and performs one direct blocking read on
    /// the inbound endpoint, bypassing the streaming parser. Intended for
    /// use before the session is fully active (the parser would otherwise
    /// consume the response).
    pub fn read_version(&self) -> Result<String> {
        let handle = self.handle.as_ref().ok_or(CombiError::NotInitialized)?;
        self.read_version_on(handle)
    }

    fn read_version_on(&self, handle: &DeviceHandle<Context>) -> Result<String> {
        self.write_packet(handle, CombiPacket::new(CMD_VERSION, Vec::new()))?;
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = match handle.read_bulk(ENDPOINT_IN, &mut buf, WRITE_TIMEOUT) {
            Ok(n) => n,
            Err(rusb::Error::Timeout) => return Err(CombiError::ReadTimeout),
            Err(err) => return Err(CombiError::BulkTransfer(err)),
        };
        format_version(&buf[..n])
    }

    fn write_packet(&self, handle: &DeviceHandle<Context>, packet: CombiPacket) -> Result<()> {
        let bytes = packet.encode();
        let n = handle
            .write_bulk(ENDPOINT_OUT, &bytes, WRITE_TIMEOUT)
            .map_err(CombiError::BulkTransfer)?;
        if n != bytes.len() {
            return Err(CombiError::ShortWrite {
                expected: bytes.len(),
                actual: n,
            });
        }
        Ok(())
    }

    /// Mutable access to the device handle; only possible while no task
    /// holds a clone
    fn exclusive_handle(&mut self) -> Result<&mut DeviceHandle<Context>> {
        self.handle
            .as_mut()
            .and_then(Arc::get_mut)
            .ok_or(CombiError::HandleInUse)
    }

    fn spawn_tasks(&mut self, handle: Arc<DeviceHandle<Context>>) {
        let ring = Arc::new(RingBuffer::with_capacity(RING_CAPACITY));
        let gate = Arc::new(TxGate::new());

        {
            let handle = Arc::clone(&handle);
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&self.shutdown);
            let on_error = Arc::clone(&self.config.on_error);
            self.tasks
                .push(thread::spawn(move || run_reader(handle, ring, shutdown, on_error)));
        }

        {
            let parser = FrameParser::new(
                ring,
                Arc::clone(&gate),
                self.inbound_tx.clone(),
                Arc::clone(&self.shutdown),
                Arc::clone(&self.config.on_error),
            );
            self.tasks.push(thread::spawn(move || parser.run()));
        }

        {
            let pump = TxPump::new(
                self.outbound_rx.clone(),
                gate,
                Arc::clone(&self.shutdown),
                Arc::clone(&self.config.on_error),
            );
            self.tasks.push(thread::spawn(move || {
                pump.run(move |bytes| {
                    handle
                        .write_bulk(ENDPOINT_OUT, bytes, WRITE_TIMEOUT)
                        .map_err(CombiError::BulkTransfer)
                })
            }));
        }
    }

    /// Release whatever `init` acquired, innermost resource first
    ///
    /// Every step is attempted; failures are reported individually through
    /// the error hook and never stop the remaining steps.
    fn teardown(&mut self) {
        for step in teardown_steps(self.stage) {
            match step {
                TeardownStep::ReleaseInterface => {
                    match self.handle.as_mut().and_then(Arc::get_mut) {
                        Some(handle) => {
                            if let Err(err) = handle.release_interface(USB_INTERFACE) {
                                (self.config.on_error)(CombiError::Usb(err));
                            }
                        }
                        None => (self.config.on_error)(CombiError::HandleInUse),
                    }
                }
                TeardownStep::CloseDevice => {
                    // Dropping the handle closes the device and releases
                    // its active configuration.
                    self.handle = None;
                }
                TeardownStep::CloseContext => {
                    self.context = None;
                }
            }
        }
        self.stage = InitStage::Closed;
    }
}

impl Drop for CombiAdapter {
    fn drop(&mut self) {
        if self.active || self.stage != InitStage::Closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for CombiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombiAdapter")
            .field("stage", &self.stage)
            .field("active", &self.active)
            .field("bitrate_khz", &self.config.bitrate_khz)
            .finish()
    }
}

/// Pull raw bytes from the inbound bulk endpoint into the ring buffer
fn run_reader(
    handle: Arc<DeviceHandle<Context>>,
    ring: Arc<RingBuffer>,
    shutdown: Arc<AtomicBool>,
    on_error: ErrorHook,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        match handle.read_bulk(ENDPOINT_IN, &mut buf, READ_TIMEOUT) {
            Ok(0) => continue,
            Ok(n) => {
                trace!("usb rx {:02X?}", &buf[..n]);
                // The ring reports short writes when full; offer the rest
                // again once the parser has drained some bytes.
                let mut rest = &buf[..n];
                while !rest.is_empty() && !shutdown.load(Ordering::Relaxed) {
                    let written = ring.write(rest);
                    rest = &rest[written..];
                    if written == 0 {
                        ring.wait_writable(POLL_INTERVAL);
                    }
                }
            }
            Err(rusb::Error::Timeout) => continue,
            Err(err) => on_error(CombiError::BulkTransfer(err)),
        }
    }
}

/// Format a raw Version response as a dotted version string
fn format_version(response: &[u8]) -> Result<String> {
    let expected = HEADER_LEN + VERSION_MAJOR_OFFSET + 2;
    let (packet, _) = CombiPacket::parse(response).ok_or(CombiError::InvalidResponse {
        expected,
        actual: response.len(),
    })?;
    if packet.cmd != CMD_VERSION || packet.data.len() <= VERSION_MAJOR_OFFSET {
        return Err(CombiError::InvalidResponse {
            expected,
            actual: response.len(),
        });
    }
    Ok(format!(
        "CombiAdapter: v{}.{}",
        packet.data[VERSION_MAJOR_OFFSET],
        packet.data[VERSION_MINOR_OFFSET]
    ))
}
