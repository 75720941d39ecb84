pub mod poll;
pub mod stats;
pub mod user;
pub mod vote;

pub use user::{login, signup};
