//! Tunable limits threaded through every layer of the crate.
//!
//! Grounded on the teacher's `Config` struct (`config.rs` in `benfred-py-spy`),
//! which every sampling routine takes a `&Config` to pick up its rate/format/
//! locking-strategy choices. This crate has no commandline surface of its own
//! (command registration is out of scope per spec §1), so `Config` only
//! carries the bounds the object introspector, stack walker and command
//! surface need (spec §10.3).

/// Bounds and defaults for the object introspector, frame recovery and the
/// command surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bound on the type-name C string read in object descriptors
    /// (spec §3, Object descriptor invariant).
    pub max_typename_len: usize,
    /// Bound on string/bytes payload reads, mirroring the teacher's
    /// `copy_string`/`copy_bytes` refusal thresholds.
    pub max_string_len: usize,
    /// Bound on how many elements of a list/tuple/set/dict are walked
    /// before the introspector truncates with a trailing ellipsis,
    /// mirroring `format_variable`'s `remaining` budget logic.
    pub max_container_items: usize,
    /// The (before, after) line window `py-list` uses absent explicit
    /// arguments (spec §4.6).
    pub list_window: (usize, usize),
    /// Recursion guard for the stack walker, mirroring the teacher's
    /// "Max frame recursion depth reached" checks.
    pub max_frames: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_typename_len: 256,
            max_string_len: 4096,
            max_container_items: 1024,
            list_window: (5, 5),
            max_frames: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_typename_len, 256);
        assert_eq!(config.list_window, (5, 5));
    }
}
