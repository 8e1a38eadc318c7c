pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_VERIFY_MS: u64 = 10_000;
    pub const USER_AGENT: &str = concat!("dhis2-bridge/", env!("CARGO_PKG_VERSION"));
}

pub mod dhis2 {
    pub const API_PREFIX: &str = "api/";
    pub const API_SEGMENT: &str = "/api/";
    pub const ME_PATH: &str = "api/me";
    pub const SYSTEM_INFO_PATH: &str = "api/system/info";
    pub const RESPONSE_EVENT: &str = "dhis2-response";
    pub const INSTANCES_EVENT: &str = "instances";
    pub const NO_DESCRIPTION: &str = "No description";
}

pub mod cache {
    pub const DEFAULT_TTL_MS: u64 = 300_000;
}

pub mod limits {
    pub const ERROR_BODY_PREVIEW_BYTES: usize = 4_096;
    pub const SUGGESTION_LIMIT: usize = 3;
}

pub mod buffers {
    pub const CRYPTO_KEY_SIZE: usize = 32;
    pub const CRYPTO_IV_SIZE: usize = 12;
    pub const CRYPTO_TAG_SIZE: usize = 16;
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http", "https"];
}

pub mod mcp {
    pub const PROTOCOL_VERSION: &str = "2024-11-05";
    pub const SERVER_NAME: &str = "dhis2-bridge";
    pub const DATA_NOTIFICATION: &str = "notifications/dhis2/data";
    pub const CANCELLED_NOTIFICATION: &str = "notifications/cancelled";
    /// Tools whose results embed upstream payloads and skip redaction.
    pub const VERBATIM_RESULT_TOOLS: &[&str] = &["dhis_request"];
}
