// src/message/flags.rs

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by engine send, recv and dial calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct OpFlags: u8 {
        /// Do not wait: fail with `WouldBlock` on send/recv, dial in the background.
        const NONBLOCK = 0b01;
    }
}
