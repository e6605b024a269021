//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Gatework engine.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Anything that bounds memory, recursion, or document size lives here.

/// Sentinel node index meaning "unassigned".
pub const UNASSIGNED_INDEX: u16 = u16::MAX;

/// Maximum number of sockets on either side of a component boundary.
///
/// Packed component I/O is a single `u64`, one bit per socket.
pub const MAX_SOCKETS: usize = 64;

/// Maximum number of inputs on a variable-arity gate.
pub const MAX_GATE_ARITY: usize = 64;

/// Minimum number of inputs on a variable-arity gate (everything but NOT).
pub const MIN_GATE_ARITY: usize = 2;

/// Maximum number of dependencies a single scene can own.
///
/// Component nodes address dependencies with a `u8`.
pub const MAX_DEPENDENCIES: usize = 255;

/// Maximum nesting of `signal` calls during one propagation.
///
/// Gate networks are expected to be acyclic or to settle (latches).
/// An oscillating feedback loop reaches this bound, the remainder of the
/// cascade is dropped and the scene is flagged as unstable.
pub const MAX_PROPAGATION_DEPTH: usize = 1024;

/// Scene clock rate in ticks per second.
pub const TICKS_PER_SECOND: u64 = 10;

/// Length of one scene clock tick in nanoseconds.
pub const TICK_NANOS: u64 = 1_000_000_000 / TICKS_PER_SECOND;

// =============================================================================
// METADATA LIMITS
// =============================================================================

/// Maximum scene name length in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum scene author length in bytes.
pub const MAX_AUTHOR_LENGTH: usize = 32;

/// Maximum scene description length in bytes.
pub const MAX_DESCRIPTION_LENGTH: usize = 512;

// =============================================================================
// DOCUMENT FORMAT
// =============================================================================

/// Magic bytes for the binary scene document header.
pub const MAGIC_BYTES: &[u8; 4] = b"GWRK";

/// Current binary document format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// File extension used for component documents in a library directory.
pub const COMPONENT_EXTENSION: &str = "gwc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_io_fits_sockets() {
        assert_eq!(MAX_SOCKETS, u64::BITS as usize);
    }

    #[test]
    fn tick_length_matches_rate() {
        assert_eq!(TICK_NANOS * TICKS_PER_SECOND, 1_000_000_000);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"GWRK");
    }
}
