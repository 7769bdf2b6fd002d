//! Operation token tracking for io_uring completion correlation.
//!
//! Each submitted operation gets a unique token (user_data) that identifies
//! the operation type and its I/O context when the completion arrives.

#![allow(dead_code)] // Slab introspection is exercised by the tests

use slab::Slab;

/// Type of in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Receive posted on a worker's endpoint.
    Recv {
        /// Context index in the receive pool.
        ctx: usize,
    },
    /// Echo send posted on a worker's endpoint.
    Send {
        /// Context index in the send pool.
        ctx: usize,
    },
}

/// Allocator for operation tokens with O(1) lookup.
///
/// Uses a slab to efficiently allocate and deallocate tokens, providing
/// stable identifiers for in-flight operations.
pub struct TokenAllocator {
    ops: Slab<OpType>,
}

impl TokenAllocator {
    /// Create a new token allocator with specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            ops: Slab::with_capacity(capacity),
        }
    }

    /// Allocate a new token for an operation.
    ///
    /// Returns the token (user_data value for io_uring).
    pub fn alloc(&mut self, op: OpType) -> u64 {
        self.ops.insert(op) as u64
    }

    /// Free a token, making it available for reuse.
    ///
    /// Returns the operation that was associated with the token, or `None`
    /// for a token this worker never issued (a spurious completion).
    pub fn free(&mut self, token: u64) -> Option<OpType> {
        let idx = token as usize;
        if self.ops.contains(idx) {
            Some(self.ops.remove(idx))
        } else {
            None
        }
    }

    /// Number of currently allocated tokens.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_allocator() {
        let mut alloc = TokenAllocator::new(16);

        let t1 = alloc.alloc(OpType::Recv { ctx: 0 });
        let t2 = alloc.alloc(OpType::Send { ctx: 3 });

        assert_eq!(alloc.len(), 2);

        assert_eq!(alloc.free(t1), Some(OpType::Recv { ctx: 0 }));
        assert_eq!(alloc.free(t1), None); // double free is a spurious token
        assert_eq!(alloc.len(), 1);

        // Slab reuses the freed slot.
        let t3 = alloc.alloc(OpType::Recv { ctx: 1 });
        assert_eq!(t3, t1);

        assert_eq!(alloc.free(t2), Some(OpType::Send { ctx: 3 }));
        assert_eq!(alloc.free(t3), Some(OpType::Recv { ctx: 1 }));
        assert!(alloc.is_empty());
    }

    #[test]
    fn test_unknown_token_is_none() {
        let mut alloc = TokenAllocator::new(4);
        assert_eq!(alloc.free(42), None);
    }
}
