//! Stack growth for the recursive parts of the interpreter.
//!
//! Parsing nested lists and evaluating non-tail sub-expressions recurse
//! natively. Each recursive step goes through [`ensure_sufficient_stack`],
//! which moves onto a freshly allocated segment when the current one runs
//! low, so depth is bounded by [`crate::MAX_PARSE_DEPTH`] and
//! [`crate::MAX_EVAL_DEPTH`] rather than by the thread's stack size.

/// Keep at least this much stack free before recursing.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
