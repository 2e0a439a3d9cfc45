use std::env;

lazy_static! {
    static ref FLAGS: Flags = init_flags();
}

/// Process-wide settings. There is no command line at this layer so
/// everything is picked up from the environment once, on first use.
#[derive(Clone, Debug, Default)]
pub struct Flags {
    /// Any warning or error that would be printed is treated as fatal
    pub fatal_errors_and_warnings: bool,
}

impl Flags {
    pub fn get() -> &'static Flags {
        &*FLAGS
    }
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(val) => !val.is_empty() && val != "0",
        Err(_) => false,
    }
}

pub fn init_flags() -> Flags {
    Flags {
        fatal_errors_and_warnings: env_flag("RD_FATAL_ERRORS"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unset_env_flag_is_false() {
        assert!(!env_flag("RD_KERNEL_ABI_SURELY_NOT_SET_ANYWHERE"));
    }

    #[test]
    fn zero_and_empty_are_false() {
        env::set_var("RD_KERNEL_ABI_TEST_FLAG_ZERO", "0");
        env::set_var("RD_KERNEL_ABI_TEST_FLAG_EMPTY", "");
        env::set_var("RD_KERNEL_ABI_TEST_FLAG_ON", "1");
        assert!(!env_flag("RD_KERNEL_ABI_TEST_FLAG_ZERO"));
        assert!(!env_flag("RD_KERNEL_ABI_TEST_FLAG_EMPTY"));
        assert!(env_flag("RD_KERNEL_ABI_TEST_FLAG_ON"));
    }
}
