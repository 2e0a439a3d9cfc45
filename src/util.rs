use std::env;

pub fn running_under_rd() -> bool {
    env::var("RUNNING_UNDER_RD").is_ok()
}
