pub mod account;
pub mod general;

pub use account::{getkey, start, status};
pub use general::{help, logs, ping};
