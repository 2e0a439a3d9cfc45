use crate::{
    remote_ptr::Void,
    siginfo::{
        code_kind,
        signo_kind,
        CodeFields,
        CodeKind,
        SigInfoFields,
        SignoFields,
        SignoKind,
        Sigval,
    },
};
use std::{
    mem::{size_of, zeroed},
    ptr::copy_nonoverlapping,
    slice,
};

pub const STD_PAD: usize = size_of::<unsigned_long>() - size_of::<int>();

#[repr(C)]
#[derive(Copy, Clone)]
pub union sigval_t {
    pub sival_int: signed_int,
    pub sival_ptr: ptr<Void>,
}

impl Default for sigval_t {
    fn default() -> Self {
        sigval_t {
            sival_ptr: ptr::<Void>::default(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_kill {
    pub si_pid_: pid_t,
    pub si_uid_: uid_t,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_timer {
    pub si_tid_: __kernel_timer_t,
    pub si_overrun_: signed_int,
    pub si_sigval_: sigval_t,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_rt {
    pub si_pid_: pid_t,
    pub si_uid_: uid_t,
    pub si_sigval_: sigval_t,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_sigchld {
    pub si_pid_: pid_t,
    pub si_uid_: uid_t,
    pub si_status_: signed_int,
    pub __pad: [u8; STD_PAD],
    pub si_utime_: sigchld_clock_t,
    pub si_stime_: sigchld_clock_t,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_sigfault {
    pub si_addr_: ptr<Void>,
    pub si_addr_lsb_: signed_short,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_sigpoll {
    pub si_band_: signed_long,
    pub si_fd_: signed_int,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct siginfo_sigsys {
    pub _call_addr: ptr<Void>,
    pub _syscall: signed_int,
    pub _arch: unsigned_int,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union siginfo_sifields {
    pub padding: [int; SIGINFO_PADDING],
    pub _kill: siginfo_kill,
    pub _timer: siginfo_timer,
    pub _rt: siginfo_rt,
    pub _sigchld: siginfo_sigchld,
    pub _sigfault: siginfo_sigfault,
    pub _sigpoll: siginfo_sigpoll,
    pub _sigsys: siginfo_sigsys,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct siginfo_t {
    pub si_signo: int,
    pub si_errno: int,
    pub si_code: int,
    pub __pad: [u8; STD_PAD],
    pub _sifields: siginfo_sifields,
}

/// si_ptr/si_int are a union and we don't know which part is valid.
/// The only case where it matters is when we're mapping 64->32, in which
/// case we assign the ptr first (which is bigger and gets truncated) and
/// then the int. The result is the same whatever the endianness.
fn assign_sigval(to: &mut sigval_t, from: &Sigval) {
    to.sival_ptr = ptr::<Void>::from_remote_ptr(from.sival_ptr);
    to.sival_int = from.sival_int;
}

fn read_sigval(from: &sigval_t) -> Sigval {
    unsafe {
        Sigval {
            sival_ptr: from.sival_ptr.rptr(),
            sival_int: from.sival_int,
        }
    }
}

/// Write `fields` into `dest` laid out as this architecture's `siginfo_t`.
///
/// The whole of `dest` is written. Bytes not covered by a selected member are
/// zero.
pub fn write_siginfo(fields: &SigInfoFields, dest: &mut [u8]) {
    if dest.len() != size_of::<siginfo_t>() {
        fatal!(
            "siginfo buffer is {} bytes but the {} siginfo_t is {}",
            dest.len(),
            descriptor().name,
            size_of::<siginfo_t>()
        );
    }
    if !fields.is_consistent() {
        fatal!(
            "siginfo fields don't match si_signo {} / si_code {}: {:?}",
            fields.signo,
            fields.code,
            fields
        );
    }

    let mut si: siginfo_t = unsafe { zeroed() };
    si.si_signo = fields.signo;
    si.si_errno = fields.errno;
    si.si_code = fields.code;

    let sf = &mut si._sifields;
    unsafe {
        match fields.by_code {
            CodeFields::Kill { pid, uid } => {
                sf._kill.si_pid_ = pid;
                sf._kill.si_uid_ = uid;
            }
            CodeFields::Queue { pid, uid, value } => {
                sf._rt.si_pid_ = pid;
                sf._rt.si_uid_ = uid;
                assign_sigval(&mut sf._rt.si_sigval_, &value);
            }
            CodeFields::Timer {
                tid,
                overrun,
                value,
            } => {
                sf._timer.si_tid_ = tid;
                sf._timer.si_overrun_ = overrun;
                assign_sigval(&mut sf._timer.si_sigval_, &value);
            }
            CodeFields::Other => (),
        }

        match fields.by_signo {
            SignoFields::Child {
                pid,
                uid,
                status,
                utime,
                stime,
            } => {
                sf._sigchld.si_pid_ = pid;
                sf._sigchld.si_uid_ = uid;
                sf._sigchld.si_status_ = status;
                sf._sigchld.si_utime_ = utime as sigchld_clock_t;
                sf._sigchld.si_stime_ = stime as sigchld_clock_t;
            }
            SignoFields::Fault { addr, addr_lsb } => {
                sf._sigfault.si_addr_ = ptr::<Void>::from_remote_ptr(addr);
                sf._sigfault.si_addr_lsb_ = addr_lsb;
            }
            SignoFields::Poll { band, fd } => {
                sf._sigpoll.si_band_ = band as signed_long;
                sf._sigpoll.si_fd_ = fd;
            }
            SignoFields::Sys {
                call_addr,
                syscall,
                arch,
            } => {
                sf._sigsys._call_addr = ptr::<Void>::from_remote_ptr(call_addr);
                sf._sigsys._syscall = syscall;
                sf._sigsys._arch = arch;
            }
            SignoFields::Other => (),
        }
    }

    let bytes = unsafe {
        slice::from_raw_parts(&si as *const siginfo_t as *const u8, size_of::<siginfo_t>())
    };
    dest.copy_from_slice(bytes);
}

/// Read the members of `src`, laid out as this architecture's `siginfo_t`,
/// that its `si_code` and `si_signo` select.
pub fn siginfo_fields(src: &[u8]) -> SigInfoFields {
    if src.len() != size_of::<siginfo_t>() {
        fatal!(
            "siginfo buffer is {} bytes but the {} siginfo_t is {}",
            src.len(),
            descriptor().name,
            size_of::<siginfo_t>()
        );
    }

    let mut si: siginfo_t = unsafe { zeroed() };
    unsafe {
        copy_nonoverlapping(
            src.as_ptr(),
            &mut si as *mut siginfo_t as *mut u8,
            size_of::<siginfo_t>(),
        );
    }

    let sf = &si._sifields;
    let by_code = unsafe {
        match code_kind(si.si_code) {
            CodeKind::Kill => CodeFields::Kill {
                pid: sf._kill.si_pid_,
                uid: sf._kill.si_uid_,
            },
            CodeKind::Queue => CodeFields::Queue {
                pid: sf._rt.si_pid_,
                uid: sf._rt.si_uid_,
                value: read_sigval(&sf._rt.si_sigval_),
            },
            CodeKind::Timer => CodeFields::Timer {
                tid: sf._timer.si_tid_,
                overrun: sf._timer.si_overrun_,
                value: read_sigval(&sf._timer.si_sigval_),
            },
            CodeKind::Other => CodeFields::Other,
        }
    };

    let by_signo = unsafe {
        match signo_kind(si.si_signo) {
            SignoKind::Child => SignoFields::Child {
                pid: sf._sigchld.si_pid_,
                uid: sf._sigchld.si_uid_,
                status: sf._sigchld.si_status_,
                utime: sf._sigchld.si_utime_ as i64,
                stime: sf._sigchld.si_stime_ as i64,
            },
            SignoKind::Fault => SignoFields::Fault {
                addr: sf._sigfault.si_addr_.rptr(),
                addr_lsb: sf._sigfault.si_addr_lsb_,
            },
            SignoKind::Poll => SignoFields::Poll {
                band: sf._sigpoll.si_band_ as i64,
                fd: sf._sigpoll.si_fd_,
            },
            SignoKind::Sys => SignoFields::Sys {
                call_addr: sf._sigsys._call_addr.rptr(),
                syscall: sf._sigsys._syscall,
                arch: sf._sigsys._arch,
            },
            SignoKind::Other => SignoFields::Other,
        }
    };

    SigInfoFields {
        signo: si.si_signo,
        errno: si.si_errno,
        code: si.si_code,
        by_code,
        by_signo,
    }
}
