pub mod client;
pub mod dispatch;

pub use client::{ToolError, WebsiteApiClient};
pub use dispatch::{FunctionCallSpec, ToolRequest, dispatch_calls, tool_declarations};
