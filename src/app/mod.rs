pub mod dispatch;
pub mod report;

pub use dispatch::dispatch;
