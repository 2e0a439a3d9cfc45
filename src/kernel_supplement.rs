//! Kernel constants that are not reliably exported by `libc` for every
//! target we care about.

// si_code values for signals raised from user space.
// See include/uapi/asm-generic/siginfo.h
pub const SI_USER: i32 = 0;
pub const SI_KERNEL: i32 = 0x80;
pub const SI_QUEUE: i32 = -1;
pub const SI_TIMER: i32 = -2;
pub const SI_MESGQ: i32 = -3;
pub const SI_TKILL: i32 = -6;

pub const SEGV_MAPERR: i32 = 1;

pub const BUS_MCEERR_AR: i32 = 4;

pub const CLD_EXITED: i32 = 1;
pub const CLD_KILLED: i32 = 2;

pub const POLL_IN: i32 = 1;

pub const SYS_SECCOMP: i32 = 1;

// AUDIT_ARCH_* values reported in the `_arch` field of SIGSYS siginfo.
// See include/uapi/linux/audit.h
pub const AUDIT_ARCH_I386: u32 = 0x4000_0003;
pub const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
