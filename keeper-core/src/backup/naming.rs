use crate::constants::archive;
use crate::{KeeperError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// 生成备份文件名：backup-<UTC时间戳>-<随机后缀>.tar.gz
///
/// 时间戳精确到毫秒，同一毫秒内的多次调用依靠随机后缀区分。
pub fn generate_artifact_name(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}-{}{}",
        archive::ARTIFACT_PREFIX,
        now.format(archive::TIMESTAMP_FORMAT),
        &suffix[..archive::SUFFIX_LEN],
        archive::ARTIFACT_EXTENSION
    )
}

/// 是否是本工具生成的备份文件（不含写入中的临时文件）
pub fn is_artifact_name(name: &str) -> bool {
    name.starts_with(archive::ARTIFACT_PREFIX) && name.ends_with(archive::ARTIFACT_EXTENSION)
}

/// 从文件名中解析创建时间
pub fn parse_artifact_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name
        .strip_prefix(archive::ARTIFACT_PREFIX)?
        .strip_suffix(archive::ARTIFACT_EXTENSION)?;
    // 去掉随机后缀
    let (timestamp, suffix) = stem.rsplit_once('-')?;
    if suffix.len() != archive::SUFFIX_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(timestamp, archive::TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// 校验恢复请求中的文件名，拒绝路径穿越
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(KeeperError::restore(format!("备份文件名无效: {name}")));
    }
    Ok(())
}
