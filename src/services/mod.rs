pub mod credentials;
pub mod data_stream;
pub mod instance_cache;
pub mod instance_resolver;
pub mod logger;
pub mod proxy_executor;
pub mod request_builder;
pub mod security;
pub mod session;
pub mod tool_executor;
pub mod validation;
pub mod verification;
