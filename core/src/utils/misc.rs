use std::time::{SystemTime, UNIX_EPOCH};

/// Objects that expose a short static name, used for per-type counters.
pub trait Typename {
    fn typename(&self) -> &'static str;
}

pub fn get_unix_secs_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn get_unix_millis_now() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

pub fn get_unix_nanos_now() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos()
}
