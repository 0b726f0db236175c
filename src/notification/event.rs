//! 资源变更事件
//!
//! 由外部 event source 产生，dispatcher 同步消费，本模块不做持久化。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 无法识别的事件类型（来自 event source 的集成错误）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct EventTypeError(pub String);

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    Added,
    Deleted,
    Updated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Deleted => "DELETED",
            EventType::Updated => "UPDATED",
        }
    }

    /// 通知附件颜色
    pub fn color(&self) -> &'static str {
        match self {
            EventType::Added => "#2EB886",
            EventType::Deleted => "#D50200",
            EventType::Updated => "#DAA038",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADDED" => Ok(EventType::Added),
            "DELETED" => Ok(EventType::Deleted),
            "UPDATED" => Ok(EventType::Updated),
            _ => Err(EventTypeError(s.to_string())),
        }
    }
}

impl TryFrom<String> for EventType {
    type Error = EventTypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

/// 一次资源变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// 当前对象
    pub obj: Value,
    /// 变更前的对象，只有 UPDATED 才有
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_obj: Option<Value>,
}

impl Event {
    pub fn added(obj: Value) -> Self {
        Self {
            event_type: EventType::Added,
            obj,
            old_obj: None,
        }
    }

    pub fn deleted(obj: Value) -> Self {
        Self {
            event_type: EventType::Deleted,
            obj,
            old_obj: None,
        }
    }

    pub fn updated(old_obj: Value, obj: Value) -> Self {
        Self {
            event_type: EventType::Updated,
            obj,
            old_obj: Some(old_obj),
        }
    }

    pub fn name(&self) -> &str {
        lookup_path(&self.obj, "metadata.name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        lookup_path(&self.obj, "metadata.namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.obj.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    /// `namespace/name`，集群级对象只有 `name`
    pub fn key(&self) -> String {
        match self.namespace() {
            "" => self.name().to_string(),
            ns => format!("{}/{}", ns, self.name()),
        }
    }

    /// 模板渲染上下文
    pub fn template_context(&self) -> Value {
        json!({
            "Type": self.event_type.as_str(),
            "Key": self.key(),
            "Kind": self.kind(),
            "Name": self.name(),
            "Namespace": self.namespace(),
            "Obj": self.obj,
            "OldObj": self.old_obj.clone().unwrap_or(Value::Null),
        })
    }

    /// 列出的字段里是否至少有一个在新旧对象之间发生了变化
    ///
    /// 两边都不存在视为相等，只有一边存在视为变化。没有旧对象时无法比较，视为变化。
    pub fn fields_changed(&self, paths: &[String]) -> bool {
        let Some(old) = &self.old_obj else {
            return true;
        };
        paths
            .iter()
            .any(|p| lookup_path(old, p) != lookup_path(&self.obj, p))
    }
}

/// 按点分路径查找字段，数字段可索引数组，如 `spec.containers.0.image`
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(replicas: i64, ready: i64) -> Value {
        json!({
            "kind": "Deployment",
            "metadata": {"name": "nginx", "namespace": "default"},
            "spec": {"replicas": replicas, "template": {"spec": {"containers": [{"image": "nginx:1"}]}}},
            "status": {"readyReplicas": ready}
        })
    }

    #[test]
    fn test_event_type_parse() {
        assert_eq!("ADDED".parse::<EventType>().unwrap(), EventType::Added);
        assert_eq!("deleted".parse::<EventType>().unwrap(), EventType::Deleted);
        let err = "BOOKMARK".parse::<EventType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown event type: BOOKMARK");
    }

    #[test]
    fn test_event_deserialize_unknown_type() {
        let err = serde_json::from_value::<Event>(json!({"type": "ERROR", "obj": {}})).unwrap_err();
        assert!(err.to_string().contains("unknown event type: ERROR"));
    }

    #[test]
    fn test_event_serde() {
        let event = Event::added(deployment(1, 1));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ADDED");
        assert!(value.get("oldObj").is_none());
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_key_and_kind() {
        let event = Event::added(deployment(1, 1));
        assert_eq!(event.key(), "default/nginx");
        assert_eq!(event.kind(), "Deployment");

        let node = Event::deleted(json!({"kind": "Node", "metadata": {"name": "node-1"}}));
        assert_eq!(node.key(), "node-1");
        assert_eq!(node.namespace(), "");
    }

    #[test]
    fn test_lookup_path() {
        let obj = deployment(3, 2);
        assert_eq!(lookup_path(&obj, "spec.replicas"), Some(&json!(3)));
        assert_eq!(lookup_path(&obj, ".spec.replicas"), Some(&json!(3)));
        assert_eq!(
            lookup_path(&obj, "spec.template.spec.containers.0.image"),
            Some(&json!("nginx:1"))
        );
        assert_eq!(lookup_path(&obj, "spec.missing"), None);
        assert_eq!(lookup_path(&obj, "spec.replicas.deeper"), None);
    }

    #[test]
    fn test_fields_changed() {
        let paths = vec!["spec.replicas".to_string()];

        let only_status = Event::updated(deployment(3, 1), deployment(3, 3));
        assert!(!only_status.fields_changed(&paths));

        let scaled = Event::updated(deployment(3, 3), deployment(5, 3));
        assert!(scaled.fields_changed(&paths));

        let appeared = Event::updated(json!({"spec": {}}), json!({"spec": {"replicas": 1}}));
        assert!(appeared.fields_changed(&paths));

        let both_missing = Event::updated(json!({}), json!({}));
        assert!(!both_missing.fields_changed(&paths));
    }

    #[test]
    fn test_template_context() {
        let ctx = Event::updated(deployment(1, 1), deployment(2, 1)).template_context();
        assert_eq!(ctx["Type"], "UPDATED");
        assert_eq!(ctx["Key"], "default/nginx");
        assert_eq!(ctx["OldObj"]["spec"]["replicas"], 1);
        assert_eq!(ctx["Obj"]["spec"]["replicas"], 2);
    }
}
