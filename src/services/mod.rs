pub mod api;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod telegram;
