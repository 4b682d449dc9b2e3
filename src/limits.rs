//! Configuration: runtime-adjustable resource limits the caller passes
//! to each match, replacing what would otherwise be compile-time
//! constants.

/// Resource limits enforced during a match. The `init_*` fields exist only
/// as `Vec::with_capacity` hints for the initial arenas; they are not hard
/// limits, unlike the `max_*` fields.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Backtrack-stack depth beyond which a match fails fatally.
    pub max_backtrack: usize,
    /// Capture-buffer length beyond which a match fails fatally.
    pub max_captures: usize,
    /// Capture-stack depth (concurrently active left-recursive calls)
    /// beyond which a match fails fatally.
    pub max_capture_stack: usize,
    pub init_backtrack: usize,
    pub init_captures: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_backtrack: 4096,
            max_captures: 1 << 16,
            max_capture_stack: 1024,
            init_backtrack: 32,
            init_captures: 32,
        }
    }
}
