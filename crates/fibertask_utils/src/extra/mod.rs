//! Fixed-capacity inline containers that avoid heap allocation on hot paths.

mod array_deque;

pub use array_deque::ArrayDeque;
