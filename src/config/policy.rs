//! 生效策略 - 把三层配置合并成每个资源的最终行为
//!
//! 合并规则：
//! - 标量（workers / max_retries / resync）：resource → namespace → 全局 → 系统默认，
//!   取第一个非零 / 非空值
//! - 渠道列表：整体覆盖而不是合并，resource 非空用 resource，否则 namespace，否则全局

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::error::ConfigError;
use super::resync::{build_resync_period_func, ResyncPeriodFunc};
use super::{ChannelType, Config};

/// 所有层级都没有配置 workers 时的默认值
pub const DEFAULT_WORKERS: usize = 1;
/// 所有层级都没有配置 max_retries 时的默认值
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 资源标识：(namespace, resource)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceKey {
    /// 空字符串表示所有 namespace
    pub namespace: String,
    pub resource: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "*/{}", self.resource)
        } else {
            write!(f, "{}/{}", self.namespace, self.resource)
        }
    }
}

/// 单个资源的生效策略，setup 时计算一次，之后只读
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicy {
    pub channel_names: Vec<String>,
    pub workers: usize,
    pub max_retries: u32,
    #[serde(rename = "minResyncPeriod", serialize_with = "serialize_resync")]
    pub resync: ResyncPeriodFunc,
    pub notice_when_added: bool,
    pub notice_when_deleted: bool,
    pub notice_when_updated: bool,
    pub update_on: Vec<String>,
}

fn serialize_resync<S: Serializer>(f: &ResyncPeriodFunc, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:?}", f.base()))
}

/// 所有资源的生效策略表
pub type PolicyTable = BTreeMap<ResourceKey, EffectivePolicy>;

fn first_non_zero<T: Copy + Default + PartialEq>(values: &[T], fallback: T) -> T {
    values
        .iter()
        .copied()
        .find(|v| *v != T::default())
        .unwrap_or(fallback)
}

fn first_non_empty<'a>(lists: &[&'a Vec<String>]) -> &'a Vec<String> {
    lists
        .iter()
        .copied()
        .find(|l| !l.is_empty())
        .unwrap_or(lists[lists.len() - 1])
}

fn resync_with_default(
    raw: &str,
    location: impl FnOnce() -> String,
    inherited: ResyncPeriodFunc,
) -> Result<ResyncPeriodFunc, ConfigError> {
    match build_resync_period_func(raw) {
        Ok(Some(f)) => Ok(f),
        Ok(None) => Ok(inherited),
        Err(reason) => Err(ConfigError::InvalidResyncPeriod {
            value: raw.to_string(),
            location: location(),
            reason,
        }),
    }
}

impl Config {
    /// 启动前校验整个配置，任何错误都让 setup 失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, channel) in &self.channels {
            channel.check_payload(name)?;
        }
        self.check_groups()?;

        self.check_names(&self.default_channel_names, || {
            ".defaultChannelNames".to_string()
        })?;

        let mut seen = HashSet::new();
        for (ns_index, ns) in self.namespaces.iter().enumerate() {
            self.check_names(&ns.default_channel_names, || {
                format!(".namespaces[{}].defaultChannelNames", ns_index)
            })?;

            for (res_index, res) in ns.resources.iter().enumerate() {
                if res.resource.trim().is_empty() {
                    return Err(ConfigError::EmptyResource {
                        namespace_index: ns_index,
                        resource_index: res_index,
                    });
                }
                for name in &res.channel_names {
                    if !self.channels.contains_key(name) {
                        return Err(ConfigError::UnknownResourceChannel {
                            namespace_index: ns_index,
                            resource_index: res_index,
                            name: name.clone(),
                        });
                    }
                }
                if !seen.insert(ResourceKey::new(&ns.namespace, &res.resource)) {
                    return Err(ConfigError::DuplicateResource {
                        namespace: ns.namespace.clone(),
                        resource: res.resource.clone(),
                        namespace_index: ns_index,
                        resource_index: res_index,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_names(
        &self,
        names: &[String],
        location: impl Fn() -> String,
    ) -> Result<(), ConfigError> {
        match names.iter().find(|n| !self.channels.contains_key(*n)) {
            Some(name) => Err(ConfigError::UnknownChannel {
                name: name.clone(),
                location: location(),
            }),
            None => Ok(()),
        }
    }

    /// 组成员必须存在且不能成环
    fn check_groups(&self) -> Result<(), ConfigError> {
        for (name, channel) in &self.channels {
            if let Some(members) = &channel.group {
                self.check_names(members, || format!(".channels.{}.group", name))?;
            }
        }
        for name in self.channels.keys() {
            self.walk_group(name, &mut Vec::new())?;
        }
        Ok(())
    }

    fn walk_group<'a>(&'a self, name: &'a str, path: &mut Vec<&'a str>) -> Result<(), ConfigError> {
        if path.contains(&name) {
            path.push(name);
            return Err(ConfigError::GroupCycle(path.join(" -> ")));
        }
        let Some(channel) = self.channels.get(name) else {
            return Ok(());
        };
        if channel.channel_type != ChannelType::Group {
            return Ok(());
        }
        path.push(name);
        for member in channel.group.iter().flatten() {
            self.walk_group(member, path)?;
        }
        path.pop();
        Ok(())
    }
}

/// 校验配置并计算每个资源的生效策略
pub fn resolve_policies(config: &Config) -> Result<PolicyTable, ConfigError> {
    config.validate()?;

    let global_resync = resync_with_default(
        &config.min_resync_period,
        || ".minResyncPeriod".to_string(),
        ResyncPeriodFunc::default(),
    )?;

    let mut table = PolicyTable::new();
    for (ns_index, ns) in config.namespaces.iter().enumerate() {
        let ns_resync = resync_with_default(
            &ns.min_resync_period,
            || format!(".namespaces[{}].minResyncPeriod", ns_index),
            global_resync,
        )?;

        for (res_index, res) in ns.resources.iter().enumerate() {
            let resync = resync_with_default(
                &res.resync_period,
                || format!(".namespaces[{}].resources[{}].resyncPeriod", ns_index, res_index),
                ns_resync,
            )?;

            let policy = EffectivePolicy {
                channel_names: first_non_empty(&[
                    &res.channel_names,
                    &ns.default_channel_names,
                    &config.default_channel_names,
                ])
                .clone(),
                workers: first_non_zero(
                    &[res.workers, ns.default_workers, config.default_workers],
                    DEFAULT_WORKERS,
                ),
                max_retries: first_non_zero(
                    &[res.max_retries, ns.default_max_retries, config.default_max_retries],
                    DEFAULT_MAX_RETRIES,
                ),
                resync,
                notice_when_added: res.notice_when_added,
                notice_when_deleted: res.notice_when_deleted,
                notice_when_updated: res.notice_when_updated,
                update_on: res.update_on.clone(),
            };
            table.insert(ResourceKey::new(&ns.namespace, &res.resource), policy);
        }
    }
    Ok(table)
}
