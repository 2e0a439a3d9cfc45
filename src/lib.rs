#![allow(clippy::upper_case_acronyms)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;
#[cfg(test)]
#[macro_use]
extern crate memoffset;

#[macro_use]
pub mod log;
#[macro_use]
pub mod kernel_abi;
pub mod flags;
pub mod kernel_metadata;
pub mod kernel_supplement;
pub mod remote_code_ptr;
pub mod remote_ptr;
pub mod sig;
pub mod siginfo;
pub mod task;
pub mod util;
