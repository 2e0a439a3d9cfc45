#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(non_snake_case)]

use crate::{
    kernel_metadata::signal_name,
    log::LogLevel::LogDebug,
    remote_code_ptr::RemoteCodePtr,
    remote_ptr::RemotePtr,
    siginfo::SigInfoFields,
    task::{read_mem, Task},
};
use std::{
    convert::TryFrom,
    fmt::{self, Display, Formatter, LowerHex},
    io,
    io::ErrorKind,
    marker::PhantomData,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SupportedArch {
    X86,
    X64,
}

/// ELF `e_machine` values.
pub const EM_386: u32 = 3;
pub const EM_X86_64: u32 = 62;

impl SupportedArch {
    pub fn all() -> &'static [SupportedArch] {
        &[SupportedArch::X86, SupportedArch::X64]
    }

    /// Like `try_from()` but an unknown tag is a fatal error. Use this where
    /// the tag comes from rd itself rather than from a user or a trace.
    pub fn from_raw_or_die(e_machine: u32) -> SupportedArch {
        match SupportedArch::try_from(e_machine) {
            Ok(arch) => arch,
            Err(e) => fatal!("{}", e),
        }
    }

    pub fn word_size(self) -> usize {
        arch_descriptor(self).word_size
    }
}

impl TryFrom<u32> for SupportedArch {
    type Error = io::Error;

    fn try_from(e_machine: u32) -> Result<Self, Self::Error> {
        match e_machine {
            EM_386 => Ok(SupportedArch::X86),
            EM_X86_64 => Ok(SupportedArch::X64),
            _ => Err(io::Error::new(
                ErrorKind::Other,
                format!("Unsupported architecture (e_machine {})", e_machine),
            )),
        }
    }
}

impl Display for SupportedArch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", arch_descriptor(*self).name)
    }
}

#[cfg(target_arch = "x86_64")]
pub const RD_NATIVE_ARCH: SupportedArch = SupportedArch::X64;

#[cfg(target_arch = "x86")]
pub const RD_NATIVE_ARCH: SupportedArch = SupportedArch::X86;

#[cfg(target_arch = "x86_64")]
pub mod native_arch {
    pub use super::x64::*;
}

#[cfg(target_arch = "x86")]
pub mod native_arch {
    pub use super::x86::*;
}

macro_rules! rd_kernel_abi_arch_function {
    ($func_name:ident, $arch:expr) => {
        match $arch {
            crate::kernel_abi::SupportedArch::X86 => crate::kernel_abi::x86::$func_name(),
            crate::kernel_abi::SupportedArch::X64 => crate::kernel_abi::x64::$func_name(),
        }
    };
    ($func_name:ident, $arch:expr, $($exp:expr),+) => {
        match $arch {
            crate::kernel_abi::SupportedArch::X86 => crate::kernel_abi::x86::$func_name($($exp),+),
            crate::kernel_abi::SupportedArch::X64 => crate::kernel_abi::x64::$func_name($($exp),+),
        }
    };
}

pub const INT80_INSN: [u8; 2] = [0xcd, 0x80];
pub const SYSENTER_INSN: [u8; 2] = [0x0f, 0x34];
pub const SYSCALL_INSN: [u8; 2] = [0x0f, 0x05];

/// All invoke-syscall instructions we know of are this long.
pub const SYSCALL_INSN_LENGTH: usize = 2;

/// One encoding of an invoke-syscall instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyscallInsn {
    pub name: &'static str,
    pub bytes: [u8; SYSCALL_INSN_LENGTH],
    /// The syscall table this instruction enters. `int 0x80` and `sysenter`
    /// use the 32-bit table even when executed by a 64-bit process.
    pub syscall_arch: SupportedArch,
}

/// Everything this layer needs to know about an architecture. There is one
/// of these per `SupportedArch`, see `arch_descriptor()`.
#[derive(Debug)]
pub struct ArchDescriptor {
    pub arch: SupportedArch,
    pub name: &'static str,
    pub word_size: usize,
    /// Every encoding that is recognized as a syscall site.
    pub syscall_insns: &'static [SyscallInsn],
    /// The encoding rd writes when it needs to inject a syscall.
    pub canonical_syscall_insn: &'static [u8],
    pub syscall_insn_length: usize,
    pub siginfo_size: usize,
}

pub fn arch_descriptor(arch: SupportedArch) -> &'static ArchDescriptor {
    rd_kernel_abi_arch_function!(descriptor, arch)
}

/// If `ptr` in `t` is at an invoke-syscall instruction, return the
/// architecture of the syscall table that instruction enters.
///
/// Unreadable memory is not an error: it simply isn't a syscall site.
pub fn get_syscall_instruction_arch<T: Task + ?Sized>(
    t: &mut T,
    ptr: RemoteCodePtr,
) -> Option<SupportedArch> {
    let desc = arch_descriptor(t.arch());
    let mut ok = true;
    let code: Vec<u8> = read_mem(
        t,
        ptr.to_data_ptr::<u8>(),
        desc.syscall_insn_length,
        Some(&mut ok),
    );
    if !ok {
        log!(LogDebug, "Can't read code at {}; not a syscall site", ptr);
        return None;
    }

    desc.syscall_insns
        .iter()
        .find(|insn| insn.bytes[..] == code[..])
        .map(|insn| insn.syscall_arch)
}

pub fn is_at_syscall_instruction<T: Task + ?Sized>(t: &mut T, ptr: RemoteCodePtr) -> bool {
    get_syscall_instruction_arch(t, ptr).is_some()
}

/// Return the code bytes of an invoke-syscall instruction. The slice must
/// have the length given by `syscall_instruction_length`.
pub fn syscall_instruction(arch: SupportedArch) -> &'static [u8] {
    arch_descriptor(arch).canonical_syscall_insn
}

/// Return the length of all invoke-syscall instructions. Currently,
/// they must all have the same length!
pub fn syscall_instruction_length(arch: SupportedArch) -> usize {
    arch_descriptor(arch).syscall_insn_length
}

/// Write into `dest` the `siginfo_t` that a kernel of architecture `a` would
/// have produced for the same signal event as `siginfo`.
///
/// `dest` is completely overwritten. Only the union members that
/// (`si_code`, `si_signo`) select are carried over, so nothing from holes or
/// inactive members of `siginfo` reaches the tracee. `dest` must be exactly
/// the size of `a`'s `siginfo_t`.
pub fn set_arch_siginfo(siginfo: &libc::siginfo_t, a: SupportedArch, dest: &mut [u8]) {
    let fields = SigInfoFields::from_native(siginfo);
    log!(
        LogDebug,
        "Converting siginfo for {} (si_code {}) to {}",
        signal_name(fields.signo),
        fields.code,
        a
    );
    rd_kernel_abi_arch_function!(write_siginfo, a, &fields, dest)
}

/// Like `set_arch_siginfo()` but returns a freshly allocated buffer of the
/// right size.
pub fn set_arch_siginfo_vec(siginfo: &libc::siginfo_t, a: SupportedArch) -> Vec<u8> {
    let mut dest = vec![0u8; arch_descriptor(a).siginfo_size];
    set_arch_siginfo(siginfo, a, &mut dest);
    dest
}

/// The reverse of `set_arch_siginfo()`: interpret `src`, a `siginfo_t` laid
/// out for architecture `a`, and return the equivalent native record.
/// Pointers are zero extended and signed words sign extended when widening.
pub fn set_native_siginfo_from_arch(a: SupportedArch, src: &[u8]) -> libc::siginfo_t {
    let fields = rd_kernel_abi_arch_function!(siginfo_fields, a, src);
    log!(
        LogDebug,
        "Converting {} siginfo for {} (si_code {}) to native",
        a,
        signal_name(fields.signo),
        fields.code
    );
    fields.to_native()
}

///////////////////// Ptr

/// A pointer as it is laid out in a tracee structure: `ValT` wide.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Ptr<ValT: Copy, ReferentT> {
    val: ValT,
    referent: PhantomData<ReferentT>,
}

impl<ValT: Copy, ReferentT> Ptr<ValT, ReferentT> {
    pub fn referent_size(&self) -> usize {
        std::mem::size_of::<ReferentT>()
    }

    pub fn raw(&self) -> ValT {
        self.val
    }
}

impl<ReferentT> Ptr<u32, ReferentT> {
    pub fn rptr(&self) -> RemotePtr<ReferentT> {
        RemotePtr::new_from_val(self.val as usize)
    }

    /// Narrowing rule for 32-bit tracees: the upper bits of a wider
    /// address are discarded.
    pub fn from_remote_ptr(r: RemotePtr<ReferentT>) -> Ptr<u32, ReferentT> {
        Ptr {
            val: r.as_u64() as u32,
            referent: PhantomData,
        }
    }
}

impl<ReferentT> Ptr<u64, ReferentT> {
    pub fn rptr(&self) -> RemotePtr<ReferentT> {
        RemotePtr::new_from_val(self.val as usize)
    }

    pub fn from_remote_ptr(r: RemotePtr<ReferentT>) -> Ptr<u64, ReferentT> {
        Ptr {
            val: r.as_u64(),
            referent: PhantomData,
        }
    }
}

impl<T> From<RemotePtr<T>> for Ptr<u32, T> {
    fn from(r: RemotePtr<T>) -> Self {
        Ptr::<u32, T>::from_remote_ptr(r)
    }
}

impl<T> From<RemotePtr<T>> for Ptr<u64, T> {
    fn from(r: RemotePtr<T>) -> Self {
        Ptr::<u64, T>::from_remote_ptr(r)
    }
}

impl<ValT: Copy + LowerHex, ReferenT> Display for Ptr<ValT, ReferenT> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.val)
    }
}

pub mod common {
    pub type int16_t = i16;
    pub type int32_t = i32;
    pub type int64_t = i64;
    pub type uint8_t = u8;
    pub type uint16_t = u16;
    pub type uint32_t = u32;
    pub type uint64_t = u64;
    pub type pid_t = int32_t;
    pub type uid_t = uint32_t;
    pub type __kernel_timer_t = int32_t;
    pub type int = int32_t;
    pub type signed_int = int32_t;
    pub type unsigned_int = uint32_t;
}

pub mod w64 {
    pub use super::common::*;
    pub type signed_short = int16_t;
    pub type unsigned_short = uint16_t;

    pub type signed_long = int64_t;
    pub type unsigned_long = uint64_t;

    // These really only exist as proper abstractions so that adding x32
    // (x86-64's ILP32 ABI) support is relatively easy.
    pub type syscall_slong_t = int64_t;
    pub type syscall_ulong_t = uint64_t;
    pub type sigchld_clock_t = int64_t;
}

pub mod x64 {
    pub use super::w64::*;
    use super::{ArchDescriptor, SupportedArch, SyscallInsn, SYSCALL_INSN, SYSCALL_INSN_LENGTH, SYSENTER_INSN};

    pub const SIGINFO_PADDING: usize = 28;

    pub type ptr<T> = super::Ptr<u64, T>;

    const SYSCALL_INSNS: [SyscallInsn; 2] = [
        SyscallInsn {
            name: "syscall",
            bytes: SYSCALL_INSN,
            syscall_arch: SupportedArch::X64,
        },
        SyscallInsn {
            name: "sysenter",
            bytes: SYSENTER_INSN,
            syscall_arch: SupportedArch::X86,
        },
    ];

    static DESCRIPTOR: ArchDescriptor = ArchDescriptor {
        arch: SupportedArch::X64,
        name: "x86_64",
        word_size: 8,
        syscall_insns: &SYSCALL_INSNS,
        canonical_syscall_insn: &SYSCALL_INSN,
        syscall_insn_length: SYSCALL_INSN_LENGTH,
        siginfo_size: std::mem::size_of::<siginfo_t>(),
    };

    pub fn descriptor() -> &'static ArchDescriptor {
        &DESCRIPTOR
    }

    // IMPORTANT ! ////////////////////////
    include!("include/base_arch_defns.rs");

    #[cfg(target_arch = "x86_64")]
    mod assert {
        use super::*;

        const_assert_eq!(std::mem::size_of::<siginfo_t>(), 128);
        assert_eq_size!(libc::siginfo_t, siginfo_t);
        assert_eq_align!(libc::siginfo_t, siginfo_t);
        assert_eq_size!(sigval_t, u64);
    }
}

pub mod w32 {
    pub use super::common::*;
    pub type signed_short = int16_t;
    pub type unsigned_short = uint16_t;

    pub type signed_long = int32_t;
    pub type unsigned_long = uint32_t;

    // These really only exist as proper abstractions so that adding x32
    // (x86-64's ILP32 ABI) support is relatively easy.
    pub type syscall_slong_t = int32_t;
    pub type syscall_ulong_t = uint32_t;
    pub type sigchld_clock_t = int32_t;
}

pub mod x86 {
    pub use super::w32::*;
    use super::{ArchDescriptor, SupportedArch, SyscallInsn, INT80_INSN, SYSCALL_INSN_LENGTH, SYSENTER_INSN};

    pub const SIGINFO_PADDING: usize = 29;

    pub type ptr<T> = super::Ptr<u32, T>;

    const SYSCALL_INSNS: [SyscallInsn; 2] = [
        SyscallInsn {
            name: "int $0x80",
            bytes: INT80_INSN,
            syscall_arch: SupportedArch::X86,
        },
        SyscallInsn {
            name: "sysenter",
            bytes: SYSENTER_INSN,
            syscall_arch: SupportedArch::X86,
        },
    ];

    static DESCRIPTOR: ArchDescriptor = ArchDescriptor {
        arch: SupportedArch::X86,
        name: "x86",
        word_size: 4,
        syscall_insns: &SYSCALL_INSNS,
        canonical_syscall_insn: &INT80_INSN,
        syscall_insn_length: SYSCALL_INSN_LENGTH,
        siginfo_size: std::mem::size_of::<siginfo_t>(),
    };

    pub fn descriptor() -> &'static ArchDescriptor {
        &DESCRIPTOR
    }

    // IMPORTANT ! ////////////////////////
    include!("include/base_arch_defns.rs");

    mod assert {
        use super::*;

        const_assert_eq!(std::mem::size_of::<siginfo_t>(), 128);
        assert_eq_size!(sigval_t, u32);
    }

    #[cfg(target_arch = "x86")]
    mod native_assert {
        use super::*;

        assert_eq_size!(libc::siginfo_t, siginfo_t);
        assert_eq_align!(libc::siginfo_t, siginfo_t);
    }
}
