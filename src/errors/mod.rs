mod mcp_error;
mod proxy_error;
mod tool_error;

pub use mcp_error::{ErrorCode, McpError};
pub use proxy_error::{ProxyError, ProxyErrorKind, ProxyResult};
pub use tool_error::{ToolError, ToolErrorKind};
