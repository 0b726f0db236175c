//! Resync 抖动调度
//!
//! 配置里写的是最小 resync 间隔，实际间隔在 `[base, 2*base)` 之间随机，
//! 避免同一进程（或多个节点）里大量 watcher 在同一时刻做全量 list。

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// 所有层级都没有配置时使用的最小 resync 间隔（12 小时）
pub const DEFAULT_MIN_RESYNC_PERIOD: Duration = Duration::from_secs(12 * 60 * 60);

/// Resync 间隔生成器
///
/// 每次调用 [`ResyncPeriodFunc::next_period`] 都会重新采样。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncPeriodFunc {
    base: Duration,
}

impl ResyncPeriodFunc {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// 配置的最小间隔
    pub fn base(&self) -> Duration {
        self.base
    }

    /// 返回 `[base, 2*base)` 内均匀分布的一个新间隔
    pub fn next_period(&self) -> Duration {
        let base_nanos = u64::try_from(self.base.as_nanos()).unwrap_or(u64::MAX);
        if base_nanos == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..base_nanos);
        self.base + Duration::from_nanos(jitter)
    }
}

impl Default for ResyncPeriodFunc {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RESYNC_PERIOD)
    }
}

/// 从配置字符串构建 resync 生成器
///
/// 空字符串返回 `Ok(None)`，由调用方继承上一级的默认值。
/// 解析失败或非正数返回错误描述。
pub fn build_resync_period_func(raw: &str) -> Result<Option<ResyncPeriodFunc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let base = parse_duration(raw)?;
    if base.is_zero() {
        return Err("resync period must be positive".to_string());
    }
    Ok(Some(ResyncPeriodFunc::new(base)))
}

fn full_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:\d+\.?\d*|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
            .expect("valid duration regex")
    })
}

fn component_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("valid duration regex")
    })
}

/// 解析 `300ms`、`1h30m`、`1.5h` 这类时长表达式
///
/// 单位：ns, us (µs), ms, s, m, h。单独的 `0` 合法。
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(format!("negative duration: {}", s));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if !full_pattern().is_match(s) {
        return Err(format!("invalid duration: {}", s));
    }

    let mut total_nanos = 0f64;
    for caps in component_pattern().captures_iter(s) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|e| format!("invalid number {:?}: {}", &caps[1], e))?;
        let unit_nanos = match &caps[2] {
            "ns" => 1f64,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => return Err(format!("unknown unit {:?} in duration {}", other, s)),
        };
        total_nanos += value * unit_nanos;
    }

    if total_nanos > u64::MAX as f64 {
        return Err(format!("duration out of range: {}", s));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
