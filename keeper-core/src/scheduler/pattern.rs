use crate::constants::cron as cron_consts;
use crate::{KeeperError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 已校验的定时表达式，按 UTC 计算
#[derive(Debug, Clone)]
pub struct CronPattern {
    source: String,
    schedule: Schedule,
}

impl CronPattern {
    /// 解析标准 5 字段（分 时 日 月 周）或带秒的 6 字段表达式
    ///
    /// 周字段中的数字按 0/7=周日 的惯例解释。
    pub fn parse(pattern: &str) -> Result<Self> {
        let normalized = normalize(pattern)?;
        let schedule = Schedule::from_str(&normalized)?;
        Ok(Self {
            source: pattern.trim().to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 指定时间之后的下一次触发时间
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// 从现在开始的若干次触发时间
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.upcoming(Utc).take(count).collect()
    }
}

impl std::fmt::Display for CronPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// 表达式语法是否有效
pub fn validate_pattern(pattern: &str) -> bool {
    CronPattern::parse(pattern).is_ok()
}

/// 接下来的若干次触发时间，表达式无效时返回空列表
pub fn next_executions(pattern: &str, count: usize) -> Vec<DateTime<Utc>> {
    CronPattern::parse(pattern)
        .map(|p| p.upcoming(count))
        .unwrap_or_default()
}

/// 转换为 cron 库使用的带秒格式
fn normalize(pattern: &str) -> Result<String> {
    let pattern = pattern.trim();
    if pattern.starts_with('@') {
        return Ok(pattern.to_string());
    }

    let mut fields: Vec<String> = pattern.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        cron_consts::CRON_FIELDS_COUNT => fields.insert(0, "0".to_string()),
        cron_consts::CRON_FIELDS_WITH_SECONDS => {}
        n => {
            return Err(KeeperError::schedule(format!(
                "定时表达式应包含 {} 或 {} 个字段，实际为 {n}: {pattern}",
                cron_consts::CRON_FIELDS_COUNT,
                cron_consts::CRON_FIELDS_WITH_SECONDS
            )));
        }
    }

    fields[5] = translate_day_of_week(&fields[5])?;
    Ok(fields.join(" "))
}

/// 把周字段中的数字展开为星期名称
///
/// cron 库的数字周从 1=周日 开始，与常见的 0=周日 不一致，统一转换成名称后再交给它解析。
fn translate_day_of_week(field: &str) -> Result<String> {
    let mut items: Vec<String> = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(parse_number(step, item)?)),
            None => (item, None),
        };

        let numeric = !base.is_empty() && base.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '*');
        if !numeric || (base == "*" && step.is_none()) {
            items.push(item.to_string());
            continue;
        }

        let (start, end) = if base == "*" {
            (0, 6)
        } else if let Some((start, end)) = base.split_once('-') {
            (parse_number(start, item)?, parse_number(end, item)?)
        } else {
            let value = parse_number(base, item)?;
            (value, if step.is_some() { 6 } else { value })
        };

        let step = step.unwrap_or(1);
        if end > 7 || start > end || step == 0 {
            return Err(KeeperError::schedule(format!("周字段无效: {item}")));
        }

        for day in (start..=end).step_by(step as usize) {
            let name = WEEKDAY_NAMES[(day % 7) as usize].to_string();
            if !items.contains(&name) {
                items.push(name);
            }
        }
    }

    Ok(items.join(","))
}

fn parse_number(value: &str, item: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| KeeperError::schedule(format!("周字段无效: {item}")))
}
