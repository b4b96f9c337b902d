pub mod agent;
pub mod providers;
pub mod session;
pub mod tools;

pub use session::SessionContext;
