pub mod gateway;
pub mod openrouter;
pub mod prompts;

pub use gateway::{LlmChatRequest, LlmGateway, LlmGatewayError, LlmStreamFuture, LlmStreamSummary};
pub use openrouter::{OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig};
pub use prompts::{PLANNER_SYSTEM_PROMPT, schedule_request};
