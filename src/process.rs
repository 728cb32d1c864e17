//! The public per-process handle.

use crate::mm::AccessFlags;
use crate::system::{Kernel, Pid};
use crate::Status;
use std::sync::{Arc, Mutex};

/// Handle to one process's address space. Dropping the handle destroys the
/// process: every segment is deleted, the swap chains are released and the
/// page-table slot goes back to the pool.
pub struct Process {
    pid: Pid,
    kernel: Arc<Mutex<Kernel>>,
}

impl Process {
    pub(crate) fn new(pid: Pid, kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { pid, kernel }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Map `pages` pages at `start` with the given access rights.
    pub fn create_segment(&self, start: usize, pages: usize, flags: AccessFlags) -> Status {
        self.kernel
            .lock()
            .unwrap()
            .create_segment(self.pid, start.into(), pages, flags)
    }

    /// Map `pages` pages at `start` and seed their swap clusters from
    /// `content`, which must hold exactly `pages` pages of bytes. The pages
    /// stay on the partition until they fault in.
    pub fn load_segment(
        &self,
        start: usize,
        pages: usize,
        flags: AccessFlags,
        content: &[u8],
    ) -> Status {
        self.kernel
            .lock()
            .unwrap()
            .load_segment(self.pid, start.into(), pages, flags, content)
    }

    /// Unmap the segment starting at `start`.
    pub fn delete_segment(&self, start: usize) -> Status {
        self.kernel
            .lock()
            .unwrap()
            .delete_segment(self.pid, start.into())
    }

    /// Resolve a faulting access: bring the page at `va` in from swap.
    pub fn page_fault(&self, va: usize) -> Status {
        self.kernel.lock().unwrap().page_fault(self.pid, va.into())
    }

    /// Physical address of `va`, if its page is mapped and resident.
    pub fn physical_address(&self, va: usize) -> Option<usize> {
        self.kernel
            .lock()
            .unwrap()
            .physical_address(self.pid, va.into())
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // a poisoned lock means the kernel died mid-operation; there is
        // nothing left worth tearing down then
        if let Ok(mut kernel) = self.kernel.lock() {
            kernel.destroy_process(self.pid);
        }
    }
}
