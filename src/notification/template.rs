//! 通知模板
//!
//! 语法：普通文本 + `{{ .Path }}` 字段引用，路径是渲染上下文里的点分字段，
//! 如 `{{ .Obj.metadata.name }}`，`{{ . }}` 渲染整个上下文。
//! 上下文字段见 [`Event::template_context`]。
//!
//! 每个渠道在构造时编译四个模板：标题（不区分事件类型）和
//! ADDED / DELETED / UPDATED 三个正文模板。

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use super::event::{lookup_path, Event, EventType};
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed action starting at offset {0}")]
    Unclosed(usize),
    #[error("bad action {{{{{0}}}}}: expected a field path like .Obj.metadata.name")]
    BadAction(String),
    #[error("field {0} not found")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    /// 点分路径，空字符串表示整个上下文
    Field(String),
}

/// 编译后的模板
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn action_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\.(?:[A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)?$").expect("valid action regex")
    })
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + start))?;

            let action = after_open[..end].trim();
            if !action_pattern().is_match(action) {
                return Err(TemplateError::BadAction(action.to_string()));
            }
            segments.push(Segment::Field(action[1..].to_string()));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// 渲染模板，引用不存在的字段返回错误
    pub fn render(&self, ctx: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(path) => {
                    let value = lookup_path(ctx, path)
                        .ok_or_else(|| TemplateError::MissingField(format!(".{}", path)))?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Null => {}
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// 渠道配置里的模板字段，空字符串表示使用默认模板
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub added_template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deleted_template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_template: String,
}

/// 各渠道的默认模板
#[derive(Debug, Clone, Copy)]
pub struct TemplateDefaults {
    pub title: &'static str,
    pub added: &'static str,
    pub deleted: &'static str,
    pub updated: &'static str,
}

/// 聊天 / 回调类渠道的默认模板
pub const MESSAGE_DEFAULTS: TemplateDefaults = TemplateDefaults {
    title: "New Event [{{.Type}}]",
    added: "{{.Kind}} {{.Key}} added",
    deleted: "{{.Kind}} {{.Key}} deleted",
    updated: "{{.Kind}} {{.Key}} updated",
};

/// print 渠道的默认模板，输出形如 `[ADDED] default/nginx`
pub const PRINT_DEFAULTS: TemplateDefaults = TemplateDefaults {
    title: "[{{.Type}}]",
    added: "{{.Key}}",
    deleted: "{{.Key}}",
    updated: "{{.Key}}",
};

/// 渲染结果
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub title: String,
    pub body: String,
}

/// 一个渠道的全部模板
#[derive(Debug, Clone)]
pub struct TemplateSet {
    title: Template,
    added: Template,
    deleted: Template,
    updated: Template,
}

impl TemplateSet {
    /// 编译模板，失败时错误里带上渠道名和模板名
    pub fn compile(
        channel: &str,
        config: &TemplateConfig,
        defaults: TemplateDefaults,
    ) -> Result<Self, ConfigError> {
        let compile_one = |template: &'static str, source: &str, default: &str| {
            let source = if source.is_empty() { default } else { source };
            Template::parse(source).map_err(|e| ConfigError::InvalidTemplate {
                channel: channel.to_string(),
                template,
                reason: e.to_string(),
            })
        };

        Ok(Self {
            title: compile_one("title", &config.title_template, defaults.title)?,
            added: compile_one("added", &config.added_template, defaults.added)?,
            deleted: compile_one("deleted", &config.deleted_template, defaults.deleted)?,
            updated: compile_one("updated", &config.updated_template, defaults.updated)?,
        })
    }

    fn body_for(&self, event_type: EventType) -> &Template {
        match event_type {
            EventType::Added => &self.added,
            EventType::Deleted => &self.deleted,
            EventType::Updated => &self.updated,
        }
    }

    /// 按事件类型选择正文模板并渲染
    pub fn render(&self, event: &Event) -> anyhow::Result<Rendered> {
        let ctx = event.template_context();
        let title = self
            .title
            .render(&ctx)
            .map_err(|e| anyhow::anyhow!("execute title template error: {}", e))?;
        let body = self
            .body_for(event.event_type)
            .render(&ctx)
            .map_err(|e| anyhow::anyhow!("execute {} template error: {}", event.event_type, e))?;
        Ok(Rendered {
            title: title.trim().to_string(),
            body: body.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Event {
        Event::added(json!({
            "kind": "Deployment",
            "metadata": {"name": "nginx", "namespace": "default"},
            "spec": {"replicas": 3}
        }))
    }

    #[test]
    fn test_parse_and_render() {
        let t = Template::parse("{{ .Kind }} {{.Key}} has {{.Obj.spec.replicas}} replicas").unwrap();
        let out = t.render(&event().template_context()).unwrap();
        assert_eq!(out, "Deployment default/nginx has 3 replicas");
    }

    #[test]
    fn test_plain_text_and_whole_context() {
        let t = Template::parse("no actions } here").unwrap();
        assert_eq!(t.render(&json!({})).unwrap(), "no actions } here");

        let t = Template::parse("{{.}}").unwrap();
        assert_eq!(t.render(&json!({"a": 1})).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Template::parse("abc {{ .Type").unwrap_err(), TemplateError::Unclosed(4));
        assert!(matches!(Template::parse("{{ }}"), Err(TemplateError::BadAction(_))));
        assert!(matches!(Template::parse("{{ Type }}"), Err(TemplateError::BadAction(_))));
        assert!(matches!(Template::parse("{{ .a..b }}"), Err(TemplateError::BadAction(_))));
    }

    #[test]
    fn test_missing_field_is_error() {
        let t = Template::parse("{{ .Obj.status.phase }}").unwrap();
        let err = t.render(&event().template_context()).unwrap_err();
        assert_eq!(err, TemplateError::MissingField(".Obj.status.phase".to_string()));
    }

    #[test]
    fn test_compile_error_names_template() {
        let config = TemplateConfig {
            deleted_template: "{{ .Key".to_string(),
            ..Default::default()
        };
        let err = TemplateSet::compile("ops", &config, MESSAGE_DEFAULTS).unwrap_err();
        match err {
            ConfigError::InvalidTemplate { channel, template, .. } => {
                assert_eq!(channel, "ops");
                assert_eq!(template, "deleted");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_render_selects_body_by_type() {
        let config = TemplateConfig {
            added_template: "+ {{.Name}}".to_string(),
            deleted_template: "- {{.Name}}".to_string(),
            updated_template: "~ {{.Name}}".to_string(),
            ..Default::default()
        };
        let set = TemplateSet::compile("t", &config, MESSAGE_DEFAULTS).unwrap();
        let obj = event().obj;

        assert_eq!(set.render(&Event::added(obj.clone())).unwrap().body, "+ nginx");
        assert_eq!(set.render(&Event::deleted(obj.clone())).unwrap().body, "- nginx");
        let updated = set.render(&Event::updated(obj.clone(), obj)).unwrap();
        assert_eq!(updated.body, "~ nginx");
        assert_eq!(updated.title, "New Event [UPDATED]");
    }

    #[test]
    fn test_render_failure_is_error() {
        let config = TemplateConfig {
            added_template: "{{ .OldObj.spec }}".to_string(),
            ..Default::default()
        };
        let set = TemplateSet::compile("t", &config, MESSAGE_DEFAULTS).unwrap();
        let err = set.render(&event()).unwrap_err();
        assert!(err.to_string().contains("ADDED"));
        assert!(err.to_string().contains(".OldObj.spec"));
    }

    #[test]
    fn test_print_defaults() {
        let set = TemplateSet::compile("p", &TemplateConfig::default(), PRINT_DEFAULTS).unwrap();
        let rendered = set.render(&event()).unwrap();
        assert_eq!(rendered.title, "[ADDED]");
        assert_eq!(rendered.body, "default/nginx");
    }
}
