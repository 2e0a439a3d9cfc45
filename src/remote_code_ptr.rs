use crate::{
    kernel_abi::{syscall_instruction_length, SupportedArch},
    remote_ptr::RemotePtr,
};
use std::{
    fmt::{Display, Formatter, Result},
    ops::{Add, Sub},
};

/// A location in a tracee's code. This is a coordinate only; it is resolved
/// through the tracee's memory (see `Task`), never dereferenced here.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct RemoteCodePtr {
    ptr: usize,
}

impl RemoteCodePtr {
    pub fn null() -> RemoteCodePtr {
        RemoteCodePtr { ptr: 0 }
    }

    pub fn from_val(val: usize) -> RemoteCodePtr {
        RemoteCodePtr { ptr: val }
    }

    pub fn as_usize(&self) -> usize {
        self.ptr
    }

    /// As the name indicates this is just a cast. No try_into().unwrap() here!
    pub fn as_isize(&self) -> isize {
        self.ptr as isize
    }

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn decrement_by_syscall_insn_length(self, arch: SupportedArch) -> RemoteCodePtr {
        self - syscall_instruction_length(arch)
    }

    pub fn increment_by_syscall_insn_length(self, arch: SupportedArch) -> RemoteCodePtr {
        self + syscall_instruction_length(arch)
    }

    /// `int3` is a single byte on x86 and x86-64.
    pub fn decrement_by_bkpt_insn_length(self, _arch: SupportedArch) -> RemoteCodePtr {
        self - 1usize
    }

    pub fn increment_by_bkpt_insn_length(self, _arch: SupportedArch) -> RemoteCodePtr {
        self + 1usize
    }

    pub fn to_data_ptr<T>(&self) -> RemotePtr<T> {
        RemotePtr::<T>::new_from_val(self.as_usize())
    }

    pub fn register_value(&self) -> usize {
        self.as_usize()
    }
}

impl Display for RemoteCodePtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}", self.ptr)
    }
}

impl Add<usize> for RemoteCodePtr {
    type Output = Self;

    /// Wraps like the instruction pointer does.
    fn add(self, delta: usize) -> Self::Output {
        Self::from_val(self.as_usize().wrapping_add(delta))
    }
}

impl Sub<usize> for RemoteCodePtr {
    type Output = Self;

    fn sub(self, delta: usize) -> Self::Output {
        Self::from_val(self.as_usize().wrapping_sub(delta))
    }
}

impl Sub<RemoteCodePtr> for RemoteCodePtr {
    type Output = isize;

    fn sub(self, rhs: RemoteCodePtr) -> Self::Output {
        self.as_isize().wrapping_sub(rhs.as_isize())
    }
}

impl From<usize> for RemoteCodePtr {
    fn from(addr: usize) -> Self {
        RemoteCodePtr::from_val(addr)
    }
}

impl<T> From<RemotePtr<T>> for RemoteCodePtr {
    fn from(p: RemotePtr<T>) -> Self {
        p.to_code_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_test() {
        let a = RemoteCodePtr::null();
        assert_eq!(0, a.as_usize());
        assert_eq!(a, RemoteCodePtr::default());
    }

    #[test]
    fn syscall_insn_stepping() {
        let ip = RemoteCodePtr::from_val(0x1002);
        for &arch in &[SupportedArch::X86, SupportedArch::X64] {
            let at = ip.decrement_by_syscall_insn_length(arch);
            assert_eq!(at.as_usize(), 0x1000);
            assert_eq!(at.increment_by_syscall_insn_length(arch), ip);
            assert_eq!(ip - at, 2);
        }
    }

    #[test]
    fn bkpt_stepping() {
        let ip = RemoteCodePtr::from_val(0x2001);
        assert_eq!(
            ip.decrement_by_bkpt_insn_length(SupportedArch::X64).as_usize(),
            0x2000
        );
    }

    #[test]
    fn stepping_wraps_at_address_space_ends() {
        let ip = RemoteCodePtr::from_val(1);
        let back = ip.decrement_by_syscall_insn_length(SupportedArch::X86);
        assert_eq!(back.as_usize(), usize::MAX);
        assert_eq!(back.increment_by_syscall_insn_length(SupportedArch::X86), ip);
        assert_eq!(
            RemoteCodePtr::null()
                .decrement_by_bkpt_insn_length(SupportedArch::X64)
                .increment_by_bkpt_insn_length(SupportedArch::X64),
            RemoteCodePtr::null()
        );
        assert_eq!(ip - back, 2);
    }

    #[test]
    fn data_ptr_and_display() {
        let ip = RemoteCodePtr::from(0xdead_usize);
        assert_eq!(ip.to_data_ptr::<u8>().as_usize(), 0xdead);
        assert_eq!(format!("{}", ip), "0xdead");
        assert_eq!(ip.register_value(), 0xdead);
    }
}
