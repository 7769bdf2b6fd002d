//! CPU affinity utilities for pinning worker threads to specific cores.

use std::io;

/// Pin the current thread to a single CPU.
///
/// On Linux this uses `sched_setaffinity`. On other platforms it is a
/// no-op; the kernel scheduler keeps the thread wherever it likes.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu_id: usize) -> io::Result<()> {
    use std::mem;

    unsafe {
        let mut cpu_set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut cpu_set);
        libc::CPU_SET(cpu_id, &mut cpu_set);

        if libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &cpu_set) == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Pin the current thread to a single CPU (no-op on non-Linux platforms).
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_cpu_id: usize) -> io::Result<()> {
    Ok(())
}
