//! Permission bits attached to every execution context.

use bitflags::bitflags;

bitflags! {
    /// Declares which interop families a context may invoke.
    ///
    /// A syscall whose required flags are not fully contained in the current
    /// context's flags faults before its handler runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        /// May read chain state.
        const READ_STATES = 0b0000_0001;
        /// May write chain state.
        const WRITE_STATES = 0b0000_0010;
        /// May call other contracts.
        const ALLOW_CALL = 0b0000_0100;
        /// May emit notifications.
        const ALLOW_NOTIFY = 0b0000_1000;

        /// Read and write states.
        const STATES = Self::READ_STATES.bits() | Self::WRITE_STATES.bits();
        /// Read states and call out, but never mutate.
        const READ_ONLY = Self::READ_STATES.bits() | Self::ALLOW_CALL.bits();
        /// Everything.
        const ALL = Self::STATES.bits() | Self::ALLOW_CALL.bits() | Self::ALLOW_NOTIFY.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_contains_everything() {
        assert!(CallFlags::ALL.contains(CallFlags::READ_STATES));
        assert!(CallFlags::ALL.contains(CallFlags::WRITE_STATES));
        assert!(CallFlags::ALL.contains(CallFlags::ALLOW_CALL));
        assert!(CallFlags::ALL.contains(CallFlags::ALLOW_NOTIFY));
    }

    #[test]
    fn test_read_only_cannot_write() {
        assert!(!CallFlags::READ_ONLY.contains(CallFlags::WRITE_STATES));
    }
}
