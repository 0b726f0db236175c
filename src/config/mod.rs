//! Informers 配置 - 从 JSON / YAML 文件加载
//!
//! 配置分三层：全局 → namespace → resource，越具体的层级优先。
//! 层级合并见 [`policy`]，resync 抖动见 [`resync`]。

pub mod error;
pub mod policy;
pub mod resync;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::notification::channels::callback::CallbackConfig;
use crate::notification::channels::flock::FlockConfig;
use crate::notification::channels::print::PrintConfig;
use crate::notification::channels::telegram::TelegramConfig;

pub use error::ConfigError;
pub use policy::{
    resolve_policies, EffectivePolicy, PolicyTable, ResourceKey, DEFAULT_MAX_RETRIES, DEFAULT_WORKERS,
};
pub use resync::{build_resync_period_func, ResyncPeriodFunc, DEFAULT_MIN_RESYNC_PERIOD};

/// 根配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// 要监听的 namespace 及其资源
    pub namespaces: Vec<NamespaceConfig>,
    /// 渠道名 → 渠道配置
    pub channels: BTreeMap<String, ChannelConfig>,
    /// 全局默认渠道
    pub default_channel_names: Vec<String>,
    /// 全局默认 worker 数
    pub default_workers: usize,
    /// 全局默认最大重试次数
    pub default_max_retries: u32,
    /// 全局最小 resync 间隔，实际间隔在 [min, 2*min) 之间随机
    pub min_resync_period: String,
}

/// Namespace 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceConfig {
    /// 空字符串表示所有 namespace
    pub namespace: String,
    pub resources: Vec<ResourceConfig>,
    pub default_channel_names: Vec<String>,
    pub default_workers: usize,
    pub default_max_retries: u32,
    pub min_resync_period: String,
}

/// 单个资源的监听配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConfig {
    /// 要监听的资源，如 "deployments.v1.apps"
    pub resource: String,
    pub notice_when_added: bool,
    pub notice_when_deleted: bool,
    /// 配合 `update_on` 使用：非空时只有列出的字段变化才通知
    pub notice_when_updated: bool,
    /// 点分字段路径，如 "spec.replicas"
    pub update_on: Vec<String>,
    pub channel_names: Vec<String>,
    pub resync_period: String,
    pub workers: usize,
    pub max_retries: u32,
}

/// 渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Callback,
    Group,
    Print,
    Telegram,
    Flock,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelType::Callback => "callback",
            ChannelType::Group => "group",
            ChannelType::Print => "print",
            ChannelType::Telegram => "telegram",
            ChannelType::Flock => "flock",
        };
        f.write_str(s)
    }
}

/// 渠道配置：`type` 决定哪个 payload 字段生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackConfig>,
    /// 成员渠道名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<PrintConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flock: Option<FlockConfig>,
}

impl ChannelConfig {
    /// 检查 `type` 对应的 payload 是否存在
    pub fn check_payload(&self, name: &str) -> Result<(), ConfigError> {
        let present = match self.channel_type {
            ChannelType::Callback => self.callback.is_some(),
            ChannelType::Group => self.group.is_some(),
            ChannelType::Print => self.print.is_some(),
            ChannelType::Telegram => self.telegram.is_some(),
            ChannelType::Flock => self.flock.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(ConfigError::MissingChannelPayload {
                name: name.to_string(),
                channel_type: self.channel_type.to_string(),
            })
        }
    }
}

impl Config {
    /// 从文件加载配置，按扩展名选择 JSON 或 YAML
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let parse: fn(&str) -> Result<Config, ConfigError> = match ext.as_str() {
            ".json" => Self::from_json_str,
            ".yaml" => Self::from_yaml_str,
            _ => return Err(ConfigError::UnsupportedFileType(ext)),
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
defaultChannelNames: [stdout]
minResyncPeriod: 1h
channels:
  stdout:
    type: print
    print:
      writer: stdout
namespaces:
  - namespace: default
    resources:
      - resource: deployments.v1.apps
        noticeWhenAdded: true
        updateOn: [spec.replicas]
"#;

    #[test]
    fn test_parse_yaml() {
        let config = Config::from_yaml_str(YAML).unwrap();
        assert_eq!(config.default_channel_names, vec!["stdout"]);
        assert_eq!(config.min_resync_period, "1h");
        assert_eq!(config.channels["stdout"].channel_type, ChannelType::Print);
        let resource = &config.namespaces[0].resources[0];
        assert_eq!(resource.resource, "deployments.v1.apps");
        assert!(resource.notice_when_added);
        assert!(!resource.notice_when_deleted);
        assert_eq!(resource.update_on, vec!["spec.replicas"]);
    }

    #[test]
    fn test_unknown_channel_type_is_parse_error() {
        let json = r#"{"channels": {"x": {"type": "carrier-pigeon"}}}"#;
        assert!(matches!(Config::from_json_str(json), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_check_payload() {
        let config = ChannelConfig {
            channel_type: ChannelType::Callback,
            callback: None,
            group: None,
            print: None,
            telegram: None,
            flock: None,
        };
        let err = config.check_payload("hook").unwrap_err();
        assert!(err.to_string().contains("hook"));
        assert!(err.to_string().contains("callback"));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let err = Config::load_from_file(&path).unwrap_err();
        assert_eq!(err.to_string(), "unsupported file type: .toml");
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.YAML");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(YAML.as_bytes()).unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.namespaces.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load_from_file("/nonexistent/kbb.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
