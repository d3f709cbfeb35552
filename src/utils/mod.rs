pub mod pair_lock;
pub mod time;
