//! Single-slot, lock-free packet handoff between mainline code and the timer ISR.
//!
//! Each track owns one [`PacketSlot`]. Mainline code publishes the *pending*
//! packet into the slot; the waveform generator takes it at the next packet
//! boundary and copies it into its own *transmitting* buffer, which mainline
//! code never sees.
//!
//! ## Semantics
//!
//! - At most one packet is queued beyond the one in flight.
//! - Publishing while a packet is still pending replaces it (last write wins).
//! - A packet being written is never visible to the interrupt handler, and a
//!   packet being read is never overwritten.
//!
//! ## Protocol
//!
//! The slot is guarded by a single atomic state byte:
//!
//! ```text
//!            producer                      consumer (ISR)
//!   EMPTY/READY --CAS--> WRITING --store--> READY --CAS--> READING --store--> EMPTY
//! ```
//!
//! The consumer never waits: if the slot is `WRITING` it simply reports
//! nothing pending and the filler packet goes out instead. The producer only
//! spins while the consumer is `READING`, which cannot be observed on a single
//! core because the interrupt handler runs to completion.

use core::cell::UnsafeCell;
use core::convert::Infallible;
use core::hint::spin_loop;
use portable_atomic::{AtomicU8, Ordering};

use crate::consts::MAX_SENT_RESETS;
use crate::error::DccError;
use crate::packet::Packet;

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;
const READING: u8 = 3;

/// Pending-packet slot for one track.
///
/// # Safety
///
/// `PacketSlot` hands out shared references to both contexts. This is sound
/// because:
/// - there is a single producer (the mainline loop) and a single consumer
///   (the waveform generator of this track)
/// - the buffer is only written while the state is `WRITING` and only read
///   while the state is `READING`, and each of those states is entered
///   through a compare-and-swap owned by exactly one side
#[derive(Debug)]
pub struct PacketSlot {
    state: AtomicU8,
    packet: UnsafeCell<Packet>,
    sent_resets: AtomicU8,
}

// SAFETY: access to `packet` is serialised by the `state` protocol above.
unsafe impl Sync for PacketSlot {}

impl PacketSlot {
    /// Creates an empty slot. `const` so that it can live in a `static`.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            packet: UnsafeCell::new(Packet::EMPTY),
            sent_resets: AtomicU8::new(0),
        }
    }

    /// Queues a payload for transmission after the packet currently in flight.
    ///
    /// The XOR checksum is appended here. If a previously scheduled packet has
    /// not been picked up yet it is replaced.
    ///
    /// # Arguments
    /// - `payload`: address and instruction bytes, at most
    ///   [`MAX_PACKET_SIZE`](crate::consts::MAX_PACKET_SIZE)
    /// - `repeats`: number of extra transmissions after the first one
    ///
    /// # Errors
    /// [`DccError::PacketTooLong`] if the payload does not fit; nothing is queued.
    pub fn schedule(&self, payload: &[u8], repeats: u8) -> Result<(), DccError> {
        let packet = Packet::with_checksum(payload, repeats)?;
        self.publish(packet);
        Ok(())
    }

    /// Publishes a fully built packet. See [`schedule`](Self::schedule).
    pub fn publish(&self, packet: Packet) {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current == EMPTY || current == READY {
                if self
                    .state
                    .compare_exchange(current, WRITING, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
            } else {
                spin_loop();
            }
        }

        // SAFETY: the WRITING state gives the producer exclusive access.
        unsafe {
            *self.packet.get() = packet;
        }
        self.state.store(READY, Ordering::Release);
        self.sent_resets.store(0, Ordering::Relaxed);
    }

    /// Takes the pending packet, if one is ready. Interrupt context only.
    ///
    /// Never blocks: a packet that is still being written is left alone.
    pub fn take(&self) -> Option<Packet> {
        let _ = self
            .state
            .compare_exchange(READY, READING, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        // SAFETY: the READING state gives the consumer exclusive access.
        let packet = unsafe { *self.packet.get() };
        self.state.store(EMPTY, Ordering::Release);
        self.sent_resets.store(0, Ordering::Relaxed);
        Some(packet)
    }

    /// Returns `true` while a scheduled packet has not been picked up yet.
    pub fn is_pending(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), WRITING | READY)
    }

    /// Non-blocking check that the last scheduled packet has been picked up.
    ///
    /// Returns `Err(nb::Error::WouldBlock)` while it is still pending.
    pub fn poll_taken(&self) -> nb::Result<(), Infallible> {
        if self.is_pending() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Number of filler (idle or reset) packets sent since the last real packet.
    ///
    /// Saturates at [`MAX_SENT_RESETS`]. Cleared whenever a packet is
    /// scheduled or picked up.
    pub fn sent_resets_since_packet(&self) -> u8 {
        self.sent_resets.load(Ordering::Relaxed)
    }

    /// Records that a filler packet has been loaded. Interrupt context only.
    pub(crate) fn note_filler_sent(&self) {
        let sent = self.sent_resets.load(Ordering::Relaxed);
        if sent < MAX_SENT_RESETS {
            self.sent_resets.store(sent + 1, Ordering::Relaxed);
        }
    }
}

impl Default for PacketSlot {
    fn default() -> Self {
        Self::new()
    }
}
