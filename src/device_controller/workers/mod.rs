pub mod heartbeating_thread;
pub mod polling_thread;
pub mod writing_thread;
