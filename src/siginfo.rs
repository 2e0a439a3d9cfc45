//! An architecture independent view of `siginfo_t`.
//!
//! The kernel structure is a C union whose active members are picked by
//! `si_code` and `si_signo`. Here each relevant combination is a variant that
//! carries only its own fields, so code that builds or reads a `siginfo_t`
//! for some architecture (see `kernel_abi::x86`/`kernel_abi::x64`) can never
//! touch an inactive member.

use crate::{
    kernel_abi::native_arch,
    kernel_supplement::{SI_MESGQ, SI_QUEUE, SI_TIMER, SI_TKILL, SI_USER},
    remote_ptr::{RemotePtr, Void},
    sig::{Sig, SIGCHLD, SIGIO, SIGSYS},
};
use libc::{pid_t, uid_t};
use std::{
    mem::{size_of, zeroed},
    slice,
};

/// Which group of fields `si_code` selects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CodeKind {
    /// kill(2), tkill(2), tgkill(2)
    Kill,
    /// sigqueue(3), POSIX message queues
    Queue,
    /// POSIX timer expiry
    Timer,
    Other,
}

pub fn code_kind(si_code: i32) -> CodeKind {
    match si_code {
        SI_USER | SI_TKILL => CodeKind::Kill,
        SI_QUEUE | SI_MESGQ => CodeKind::Queue,
        SI_TIMER => CodeKind::Timer,
        _ => CodeKind::Other,
    }
}

/// Which group of fields `si_signo` selects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignoKind {
    Child,
    Fault,
    Poll,
    /// seccomp SIGSYS
    Sys,
    Other,
}

pub fn signo_kind(si_signo: i32) -> SignoKind {
    // Only compared against known signals.
    let sig = unsafe { Sig::from_raw_unchecked(si_signo) };
    match sig {
        SIGCHLD => SignoKind::Child,
        SIGIO => SignoKind::Poll,
        SIGSYS => SignoKind::Sys,
        s if s.is_fault_signal() => SignoKind::Fault,
        _ => SignoKind::Other,
    }
}

/// `union sigval`. We never know which member the sender meant so both
/// interpretations are kept, at native width.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Sigval {
    pub sival_ptr: RemotePtr<Void>,
    pub sival_int: i32,
}

impl Sigval {
    /// The sigval a sender that used `sival_ptr` would have produced.
    pub fn from_ptr(p: RemotePtr<Void>) -> Sigval {
        let bytes = (p.as_usize()).to_ne_bytes();
        let mut int_bytes = [0u8; 4];
        int_bytes.copy_from_slice(&bytes[0..4]);
        Sigval {
            sival_ptr: p,
            sival_int: i32::from_ne_bytes(int_bytes),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CodeFields {
    Kill {
        pid: pid_t,
        uid: uid_t,
    },
    Queue {
        pid: pid_t,
        uid: uid_t,
        value: Sigval,
    },
    Timer {
        tid: i32,
        overrun: i32,
        value: Sigval,
    },
    Other,
}

impl CodeFields {
    pub fn kind(&self) -> CodeKind {
        match self {
            CodeFields::Kill { .. } => CodeKind::Kill,
            CodeFields::Queue { .. } => CodeKind::Queue,
            CodeFields::Timer { .. } => CodeKind::Timer,
            CodeFields::Other => CodeKind::Other,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignoFields {
    Child {
        pid: pid_t,
        uid: uid_t,
        status: i32,
        utime: i64,
        stime: i64,
    },
    /// `addr_lsb` is only meaningful for some codes (e.g. BUS_MCEERR_AR) but
    /// always lives at the same place.
    Fault {
        addr: RemotePtr<Void>,
        addr_lsb: i16,
    },
    Poll {
        band: i64,
        fd: i32,
    },
    Sys {
        call_addr: RemotePtr<Void>,
        syscall: i32,
        arch: u32,
    },
    Other,
}

impl SignoFields {
    pub fn kind(&self) -> SignoKind {
        match self {
            SignoFields::Child { .. } => SignoKind::Child,
            SignoFields::Fault { .. } => SignoKind::Fault,
            SignoFields::Poll { .. } => SignoKind::Poll,
            SignoFields::Sys { .. } => SignoKind::Sys,
            SignoFields::Other => SignoKind::Other,
        }
    }
}

/// Everything in a `siginfo_t` that survives translation between
/// architectures. Both field groups may be present at once; in the raw
/// structure they overlay each other and the `si_signo` group is written
/// last.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SigInfoFields {
    pub signo: i32,
    pub errno: i32,
    pub code: i32,
    pub by_code: CodeFields,
    pub by_signo: SignoFields,
}

impl SigInfoFields {
    /// Do the variants match what `code` and `signo` select?
    pub fn is_consistent(&self) -> bool {
        self.by_code.kind() == code_kind(self.code) && self.by_signo.kind() == signo_kind(self.signo)
    }

    pub fn from_native(si: &libc::siginfo_t) -> SigInfoFields {
        let bytes = unsafe {
            slice::from_raw_parts(
                si as *const libc::siginfo_t as *const u8,
                size_of::<libc::siginfo_t>(),
            )
        };
        native_arch::siginfo_fields(bytes)
    }

    pub fn to_native(&self) -> libc::siginfo_t {
        let mut si: libc::siginfo_t = unsafe { zeroed() };
        let bytes = unsafe {
            slice::from_raw_parts_mut(
                &mut si as *mut libc::siginfo_t as *mut u8,
                size_of::<libc::siginfo_t>(),
            )
        };
        native_arch::write_siginfo(self, bytes);
        si
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel_supplement::{BUS_MCEERR_AR, CLD_KILLED, POLL_IN, SI_KERNEL};

    #[test]
    fn code_kinds() {
        assert_eq!(code_kind(SI_USER), CodeKind::Kill);
        assert_eq!(code_kind(SI_TKILL), CodeKind::Kill);
        assert_eq!(code_kind(SI_QUEUE), CodeKind::Queue);
        assert_eq!(code_kind(SI_MESGQ), CodeKind::Queue);
        assert_eq!(code_kind(SI_TIMER), CodeKind::Timer);
        assert_eq!(code_kind(SI_KERNEL), CodeKind::Other);
        assert_eq!(code_kind(CLD_KILLED), CodeKind::Other);
    }

    #[test]
    fn signo_kinds() {
        assert_eq!(signo_kind(libc::SIGCHLD), SignoKind::Child);
        for s in &[libc::SIGILL, libc::SIGBUS, libc::SIGFPE, libc::SIGSEGV, libc::SIGTRAP] {
            assert_eq!(signo_kind(*s), SignoKind::Fault);
        }
        assert_eq!(signo_kind(libc::SIGIO), SignoKind::Poll);
        assert_eq!(signo_kind(libc::SIGSYS), SignoKind::Sys);
        assert_eq!(signo_kind(libc::SIGUSR1), SignoKind::Other);
        assert_eq!(signo_kind(0), SignoKind::Other);
    }

    #[test]
    fn consistency() {
        let mut f = SigInfoFields {
            signo: libc::SIGIO,
            errno: 0,
            code: POLL_IN,
            by_code: CodeFields::Other,
            by_signo: SignoFields::Poll { band: 1, fd: 3 },
        };
        assert!(f.is_consistent());
        f.code = SI_USER;
        assert!(!f.is_consistent());
        f.by_code = CodeFields::Kill { pid: 1, uid: 0 };
        assert!(f.is_consistent());
        f.signo = libc::SIGUSR2;
        assert!(!f.is_consistent());
    }

    #[test]
    fn native_round_trip() {
        let f = SigInfoFields {
            signo: libc::SIGUSR1,
            errno: 0,
            code: SI_USER,
            by_code: CodeFields::Kill { pid: 9, uid: 10 },
            by_signo: SignoFields::Other,
        };
        assert_eq!(SigInfoFields::from_native(&f.to_native()), f);

        let bus = SigInfoFields {
            signo: libc::SIGBUS,
            errno: 0,
            code: BUS_MCEERR_AR,
            by_code: CodeFields::Other,
            by_signo: SignoFields::Fault {
                addr: RemotePtr::new_from_val(0xdead_b000),
                addr_lsb: 12,
            },
        };
        let native = bus.to_native();
        assert_eq!(native.si_signo, libc::SIGBUS);
        assert_eq!(native.si_code, BUS_MCEERR_AR);
        assert_eq!(SigInfoFields::from_native(&native), bus);
    }

    #[test]
    fn both_groups_overlay() {
        // kill -SEGV from user space selects both the kill and the fault
        // members. They share bytes and the fault group is written last.
        let f = SigInfoFields {
            signo: libc::SIGSEGV,
            errno: 0,
            code: SI_USER,
            by_code: CodeFields::Kill { pid: 9, uid: 10 },
            by_signo: SignoFields::Fault {
                addr: RemotePtr::new_from_val(0x7000),
                addr_lsb: 0,
            },
        };
        let back = SigInfoFields::from_native(&f.to_native());
        assert_eq!(back.by_signo, f.by_signo);
        assert_eq!(back.by_code.kind(), CodeKind::Kill);
        assert!(back.is_consistent());
    }

    #[test]
    fn sigval_from_ptr_aliases_int() {
        let v = Sigval::from_ptr(RemotePtr::new_from_val(0x1234_5678));
        assert_eq!(v.sival_ptr.as_usize(), 0x1234_5678);
        #[cfg(target_endian = "little")]
        assert_eq!(v.sival_int, 0x1234_5678);
    }
}
