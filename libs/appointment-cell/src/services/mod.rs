pub mod booking;
pub mod lifecycle;
pub mod merge;
pub mod notify;
