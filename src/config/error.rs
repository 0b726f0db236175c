//! 配置错误 - 启动阶段的致命错误

use thiserror::Error;

/// 配置加载与校验错误
///
/// 任何一个错误都会让整个 setup 失败，不会启动任何 watcher。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("read config file {path} error: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("channel {name}: type is {channel_type} but .{channel_type} is not set")]
    MissingChannelPayload { name: String, channel_type: String },

    #[error(
        "non-exist channel name: {name} in .namespaces[{namespace_index}].resources[{resource_index}]"
    )]
    UnknownResourceChannel {
        namespace_index: usize,
        resource_index: usize,
        name: String,
    },

    #[error("non-exist channel name: {name} in {location}")]
    UnknownChannel { name: String, location: String },

    #[error("channel group cycle detected at: {0}")]
    GroupCycle(String),

    #[error("invalid resync period {value:?} in {location}: {reason}")]
    InvalidResyncPeriod {
        value: String,
        location: String,
        reason: String,
    },

    #[error("channel {channel}: parse {template} template error: {reason}")]
    InvalidTemplate {
        channel: String,
        template: &'static str,
        reason: String,
    },

    #[error("channel {channel}: unsupported writer: {writer}")]
    UnsupportedWriter { channel: String, writer: String },

    #[error("channel {channel}: {reason}")]
    InvalidChannel { channel: String, reason: String },

    #[error(".namespaces[{namespace_index}].resources[{resource_index}]: resource is empty")]
    EmptyResource {
        namespace_index: usize,
        resource_index: usize,
    },

    #[error(
        "duplicate resource {resource} in namespace {namespace:?} at .namespaces[{namespace_index}].resources[{resource_index}]"
    )]
    DuplicateResource {
        namespace: String,
        resource: String,
        namespace_index: usize,
        resource_index: usize,
    },
}
