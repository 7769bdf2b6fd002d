//! Pre-allocated I/O contexts for the completion-based datapath.
//!
//! A context carries one in-flight operation through the kernel: a fixed
//! datagram buffer, the peer address slot, and the `iovec`/`msghdr` pair
//! that `RecvMsg`/`SendMsg` point at. Contexts are boxed and owned by a
//! single worker, so the msghdr pointers stay valid for as long as the
//! kernel holds the operation.

#![allow(dead_code)] // Pool introspection is exercised by the tests

use std::mem;

/// One reusable datagram I/O context.
///
/// The msghdr is rebuilt by `prepare_recv`/`prepare_send` immediately
/// before each submission; its pointers reference this context's own
/// buffer and address slot. The context must not move while an operation
/// is in flight, which the owning worker guarantees by boxing.
pub struct IoContext {
    buf: Box<[u8]>,
    addr: libc::sockaddr_storage,
    addr_len: libc::socklen_t,
    iov: libc::iovec,
    msg: libc::msghdr,
}

impl IoContext {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buf: vec![0u8; buffer_size].into_boxed_slice(),
            addr: unsafe { mem::zeroed() },
            addr_len: 0,
            iov: libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            },
            msg: unsafe { mem::zeroed() },
        }
    }

    /// Build the msghdr for a receive covering the whole buffer.
    ///
    /// The kernel fills the peer address slot and rewrites `msg_namelen`
    /// when the operation completes.
    pub fn prepare_recv(&mut self) -> *mut libc::msghdr {
        self.iov = libc::iovec {
            iov_base: self.buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: self.buf.len(),
        };
        self.msg = unsafe { mem::zeroed() };
        self.msg.msg_name = &mut self.addr as *mut libc::sockaddr_storage as *mut libc::c_void;
        self.msg.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        self.msg.msg_iov = &mut self.iov;
        self.msg.msg_iovlen = 1;
        &mut self.msg
    }

    /// Build the msghdr for sending the first `len` buffered bytes to the
    /// staged peer address.
    pub fn prepare_send(&mut self, len: usize) -> *mut libc::msghdr {
        debug_assert!(len <= self.buf.len());
        self.iov = libc::iovec {
            iov_base: self.buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: len,
        };
        self.msg = unsafe { mem::zeroed() };
        self.msg.msg_name = &mut self.addr as *mut libc::sockaddr_storage as *mut libc::c_void;
        self.msg.msg_namelen = self.addr_len;
        self.msg.msg_iov = &mut self.iov;
        self.msg.msg_iovlen = 1;
        &mut self.msg
    }

    /// Copy payload and peer address from a completed receive, so the
    /// receive context can be re-posted while the echo is still in flight.
    pub fn stage_echo(&mut self, recv: &IoContext, len: usize) {
        debug_assert!(len <= self.buf.len());
        self.buf[..len].copy_from_slice(&recv.buf[..len]);
        self.addr = recv.addr;
        self.addr_len = recv.peer_len();
    }

    /// Peer address length reported by the kernel for the last receive.
    pub fn peer_len(&self) -> libc::socklen_t {
        self.msg.msg_namelen
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }
}

/// Fixed pool of I/O contexts with a LIFO free list.
///
/// LIFO keeps the most recently completed context hottest in cache.
pub struct ContextPool {
    contexts: Vec<Box<IoContext>>,
    free_list: Vec<usize>,
}

impl ContextPool {
    /// Pre-allocate `count` contexts with `buffer_size`-byte buffers.
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let contexts = (0..count)
            .map(|_| Box::new(IoContext::new(buffer_size)))
            .collect();
        Self {
            contexts,
            free_list: (0..count).collect(),
        }
    }

    /// Take a free context index, or `None` if all are in flight.
    pub fn acquire(&mut self) -> Option<usize> {
        self.free_list.pop()
    }

    /// Return a context to the free list.
    pub fn release(&mut self, idx: usize) {
        debug_assert!(idx < self.contexts.len(), "context index out of bounds");
        self.free_list.push(idx);
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut IoContext {
        &mut self.contexts[idx]
    }

    pub fn capacity(&self) -> usize {
        self.contexts.len()
    }

    pub fn available(&self) -> usize {
        self.free_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_lifo_reuse() {
        let mut pool = ContextPool::new(4, 512);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.available(), 2);

        pool.release(b);
        let c = pool.acquire().unwrap();
        assert_eq!(c, b); // most recently freed comes back first

        pool.release(a);
        pool.release(c);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = ContextPool::new(2, 512);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());

        pool.release(a);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_prepare_recv_covers_whole_buffer() {
        let mut ctx = IoContext::new(2048);
        let msg = ctx.prepare_recv();
        let msg = unsafe { &*msg };
        assert_eq!(msg.msg_iovlen, 1);
        assert_eq!(
            msg.msg_namelen as usize,
            std::mem::size_of::<libc::sockaddr_storage>()
        );
        let iov = unsafe { &*msg.msg_iov };
        assert_eq!(iov.iov_len, 2048);
        assert_eq!(iov.iov_base as *const u8, ctx.buffer().as_ptr());
    }

    #[test]
    fn test_stage_echo_copies_payload_and_peer() {
        let mut recv = IoContext::new(64);
        recv.prepare_recv();
        recv.buf[..5].copy_from_slice(b"hello");

        // Fabricate the state a completed receive leaves behind.
        let sin = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 9000u16.to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from(std::net::Ipv4Addr::LOCALHOST).to_be(),
            },
            sin_zero: [0; 8],
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                &sin as *const libc::sockaddr_in as *const u8,
                &mut recv.addr as *mut libc::sockaddr_storage as *mut u8,
                mem::size_of::<libc::sockaddr_in>(),
            );
        }
        recv.msg.msg_namelen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

        let mut send = IoContext::new(64);
        send.stage_echo(&recv, 5);
        assert_eq!(&send.buffer()[..5], b"hello");

        let msg = unsafe { &*send.prepare_send(5) };
        assert_eq!(
            msg.msg_namelen as usize,
            mem::size_of::<libc::sockaddr_in>()
        );
        let iov = unsafe { &*msg.msg_iov };
        assert_eq!(iov.iov_len, 5);
    }
}
