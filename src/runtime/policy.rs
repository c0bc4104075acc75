//! The library's configuration surface: limits and strictness toggles threaded through
//! instantiation and execution. A plain `Copy` struct constructed by the host, not read
//! from any file format — config-file parsing belongs to the out-of-scope CLI front-ends.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Traps `CallStackExhausted` once nested `call`/`call_indirect` depth exceeds this.
    pub max_call_stack_depth: usize,
    /// When true, a misaligned memory access traps instead of being treated as a hint.
    pub enforce_alignment: bool,
    /// Page cap applied on top of a memory's own declared maximum; `0` means unlimited.
    pub max_memory_size: u32,
    /// When true, errors raised by host delegate functions are coerced into `Trap::Host`
    /// at the call boundary instead of propagating as-is.
    pub translate_exceptions: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> ExecutionPolicy {
        ExecutionPolicy {
            max_call_stack_depth: 512,
            enforce_alignment: false,
            max_memory_size: 0,
            translate_exceptions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_expected_values() {
        let policy = ExecutionPolicy::default();
        assert_eq!(policy.max_call_stack_depth, 512);
        assert!(!policy.enforce_alignment);
        assert_eq!(policy.max_memory_size, 0);
        assert!(!policy.translate_exceptions);
    }
}
