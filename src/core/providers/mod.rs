pub mod compatible;
pub mod response;
pub mod scrub;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use response::{Message, ModelTurn, Role, ToolCall};
pub use scrub::{sanitize_api_error, scrub_secret_patterns};
pub use traits::Provider;
