use crate::{
    kernel_abi::SupportedArch,
    log::LogLevel::LogDebug,
    remote_ptr::{RemotePtr, Void},
};
use libc::pid_t;
use nix::sys::uio::pread;
use std::{
    fs::{File, OpenOptions},
    io,
    mem::size_of,
    os::unix::io::AsRawFd,
    slice,
};

/// The view of a traced process that the kernel ABI layer needs: which
/// architecture it runs and a way to read its memory.
pub trait Task {
    fn tid(&self) -> pid_t;

    fn arch(&self) -> SupportedArch;

    /// Read the number of bytes.
    /// Number of bytes read can be less than desired
    /// - Returns Err(()) if No bytes could be read at all AND there was an error
    /// - Returns Ok(usize) if 0 or more bytes could be read. All bytes requested may not have been
    /// read.
    fn read_bytes_fallible(&mut self, addr: RemotePtr<Void>, buf: &mut [u8]) -> Result<usize, ()>;

    /// If the data can't all be read, then if `ok` is non-null
    /// sets *ok to false, otherwise asserts.
    fn read_bytes_helper(&mut self, addr: RemotePtr<Void>, buf: &mut [u8], ok: Option<&mut bool>) {
        let result_nread = self.read_bytes_fallible(addr, buf);
        match result_nread {
            Ok(nread) if nread == buf.len() => (),
            _ => {
                let nread = result_nread.unwrap_or(0);
                match ok {
                    Some(ok_flag) => *ok_flag = false,
                    None => ed_assert!(
                        self,
                        false,
                        "Should have read {} bytes from {}, but only read {}",
                        buf.len(),
                        addr,
                        nread
                    ),
                }
            }
        }
    }

    /// Read bytes from `child_addr` into `buf`, or don't
    /// return.
    fn read_bytes(&mut self, child_addr: RemotePtr<Void>, buf: &mut [u8]) {
        self.read_bytes_helper(child_addr, buf, None)
    }
}

/// Read `count` values from `child_addr`.
pub fn read_mem<D: Copy + Default, T: Task + ?Sized>(
    task: &mut T,
    child_addr: RemotePtr<D>,
    count: usize,
    ok: Option<&mut bool>,
) -> Vec<D> {
    let mut v: Vec<D> = vec![D::default(); count];
    let u8_slice =
        unsafe { slice::from_raw_parts_mut(v.as_mut_ptr() as *mut u8, count * size_of::<D>()) };
    task.read_bytes_helper(RemotePtr::cast(child_addr), u8_slice, ok);
    v
}

/// A `Task` that reads tracee memory through `/proc/<tid>/mem`.
///
/// The caller is responsible for having the right to do so (i.e. being the
/// ptracer of `tid`, or `tid` being this process).
pub struct ProcMemTask {
    tid: pid_t,
    arch: SupportedArch,
    mem_fd: File,
}

impl ProcMemTask {
    pub fn open(tid: pid_t, arch: SupportedArch) -> io::Result<ProcMemTask> {
        let mem_fd = OpenOptions::new()
            .read(true)
            .open(format!("/proc/{}/mem", tid))?;
        Ok(ProcMemTask { tid, arch, mem_fd })
    }
}

impl Task for ProcMemTask {
    fn tid(&self) -> pid_t {
        self.tid
    }

    fn arch(&self) -> SupportedArch {
        self.arch
    }

    fn read_bytes_fallible(&mut self, addr: RemotePtr<Void>, buf: &mut [u8]) -> Result<usize, ()> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut all_read = 0;
        while all_read < buf.len() {
            // pread64 etc can't handle addresses that appear to be negative ...
            // like [vsyscall].
            let offset = (addr.as_u64() + all_read as u64) as i64;
            if offset < 0 {
                break;
            }
            match pread(self.mem_fd.as_raw_fd(), &mut buf[all_read..], offset as _) {
                Ok(0) => break,
                Ok(nread) => all_read += nread,
                Err(e) => {
                    log!(
                        LogDebug,
                        "Reading {} bytes at {} from task {} failed: {:?}",
                        buf.len() - all_read,
                        addr + all_read,
                        self.tid,
                        e
                    );
                    break;
                }
            }
        }

        if all_read == 0 {
            Err(())
        } else {
            // We did successfully read _some_ data, so return success and ignore
            // any error.
            Ok(all_read)
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::BTreeMap;

    /// A tracee whose address space is a handful of mapped bytes.
    pub struct FakeTask {
        pub arch: SupportedArch,
        pub mem: BTreeMap<usize, u8>,
    }

    impl FakeTask {
        pub fn new(arch: SupportedArch) -> FakeTask {
            FakeTask {
                arch,
                mem: BTreeMap::new(),
            }
        }

        pub fn poke(&mut self, addr: usize, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.mem.insert(addr + i, *b);
            }
        }
    }

    impl Task for FakeTask {
        fn tid(&self) -> pid_t {
            1234
        }

        fn arch(&self) -> SupportedArch {
            self.arch
        }

        fn read_bytes_fallible(
            &mut self,
            addr: RemotePtr<Void>,
            buf: &mut [u8],
        ) -> Result<usize, ()> {
            let mut nread = 0;
            for (i, b) in buf.iter_mut().enumerate() {
                match self.mem.get(&(addr.as_usize() + i)) {
                    Some(v) => {
                        *b = *v;
                        nread += 1;
                    }
                    None => break,
                }
            }
            if nread == 0 && !buf.is_empty() {
                Err(())
            } else {
                Ok(nread)
            }
        }
    }
}
