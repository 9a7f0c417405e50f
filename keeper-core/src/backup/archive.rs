use super::result::{BackupOptions, SourceKind, SourceOutcome, SourceReport};
use crate::config::SourcesConfig;
use crate::constants::sources::archive_dirs;
use crate::{KeeperError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::debug;
use walkdir::WalkDir;

/// 备份数据源的位置
#[derive(Debug, Clone)]
pub struct BackupSources {
    pub data_store: PathBuf,
    pub uploads_dir: PathBuf,
    pub config_files: Vec<PathBuf>,
    pub logs_dir: PathBuf,
}

impl BackupSources {
    pub fn from_config(config: &SourcesConfig) -> Self {
        Self {
            data_store: PathBuf::from(&config.data_store),
            uploads_dir: PathBuf::from(&config.uploads_dir),
            config_files: config.config_files.iter().map(PathBuf::from).collect(),
            logs_dir: PathBuf::from(&config.logs_dir),
        }
    }
}

/// 归档完成后的摘要
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub size: u64,
    pub sha256: String,
    pub sources: Vec<SourceReport>,
}

/// 把选中的数据源写入 gzip 压缩的 tar 文件
///
/// 同步执行，调用方负责放到阻塞线程池。`exclude` 下的内容不会被收录，
/// 避免备份目录位于数据源内部时把自己打包进去。
pub fn write_archive(
    sources: &BackupSources,
    options: &BackupOptions,
    target: &Path,
    compression_level: u32,
    exclude: Option<&Path>,
) -> Result<ArchiveSummary> {
    let file = File::create(target)?;
    let encoder = GzEncoder::new(file, Compression::new(compression_level));
    let mut builder = Builder::new(encoder);

    let mut reports = Vec::with_capacity(SourceKind::ALL.len());
    for source in SourceKind::ALL {
        let outcome = if options.includes(source) {
            append_source(&mut builder, sources, source, exclude)?
        } else {
            SourceOutcome::NotRequested
        };
        debug!(?source, ?outcome, "数据源处理完成");
        reports.push(SourceReport { source, outcome });
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| KeeperError::backup(format!("完成归档失败: {e}")))?;
    let mut file = encoder
        .finish()
        .map_err(|e| KeeperError::backup(format!("完成压缩失败: {e}")))?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    let size = std::fs::metadata(target)?.len();
    let sha256 = sha256_file(target)?;

    Ok(ArchiveSummary {
        size,
        sha256,
        sources: reports,
    })
}

fn append_source<W: Write>(
    builder: &mut Builder<W>,
    sources: &BackupSources,
    source: SourceKind,
    exclude: Option<&Path>,
) -> Result<SourceOutcome> {
    match source {
        SourceKind::DataStore => {
            append_path(builder, &sources.data_store, archive_dirs::DATA_STORE, exclude)
        }
        SourceKind::Uploads => append_path(builder, &sources.uploads_dir, archive_dirs::UPLOADS, exclude),
        SourceKind::Logs => append_path(builder, &sources.logs_dir, archive_dirs::LOGS, exclude),
        SourceKind::Config => {
            let mut entries = 0;
            for path in &sources.config_files {
                if path.is_file() {
                    let name = file_name(path)?;
                    append_file(builder, path, &format!("{}/{name}", archive_dirs::CONFIG))?;
                    entries += 1;
                } else {
                    debug!("配置文件不存在，跳过: {}", path.display());
                }
            }
            if entries == 0 {
                Ok(SourceOutcome::SkippedMissing)
            } else {
                Ok(SourceOutcome::Included { entries })
            }
        }
    }
}

/// 收录单个文件或整个目录，路径不存在时返回 SkippedMissing
fn append_path<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    archive_dir: &str,
    exclude: Option<&Path>,
) -> Result<SourceOutcome> {
    if path.is_file() {
        let name = file_name(path)?;
        append_file(builder, path, &format!("{archive_dir}/{name}"))?;
        return Ok(SourceOutcome::Included { entries: 1 });
    }
    if !path.is_dir() {
        return Ok(SourceOutcome::SkippedMissing);
    }

    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let walker = WalkDir::new(path).into_iter().filter_entry(|entry| {
        match (&exclude, entry.file_type().is_dir()) {
            (Some(excluded), true) => entry
                .path()
                .canonicalize()
                .map(|p| &p != excluded)
                .unwrap_or(true),
            _ => true,
        }
    });

    let mut entries = 0;
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative_path = entry.path().strip_prefix(path)?;
        // tar归档内部统一使用Unix风格路径
        let relative = relative_path.to_string_lossy().replace('\\', "/");
        append_file(builder, entry.path(), &format!("{archive_dir}/{relative}"))?;
        entries += 1;
    }

    Ok(SourceOutcome::Included { entries })
}

fn append_file<W: Write>(builder: &mut Builder<W>, path: &Path, archive_path: &str) -> Result<()> {
    builder
        .append_path_with_name(path, archive_path)
        .map_err(|e| KeeperError::backup(format!("添加文件到归档失败 {}: {e}", path.display())))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| KeeperError::backup(format!("无法获取文件名: {}", path.display())))
}

/// 计算文件的 SHA-256
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// 遍历归档所有条目校验完整性，返回文件条目列表
pub fn verify_archive(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut names = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| KeeperError::restore(format!("读取归档失败: {e}")))?
    {
        let mut entry = entry.map_err(|e| KeeperError::restore(format!("归档条目损坏: {e}")))?;
        // 读完内容才能发现截断的数据
        std::io::copy(&mut entry, &mut std::io::sink())
            .map_err(|e| KeeperError::restore(format!("归档内容损坏: {e}")))?;
        if entry.header().entry_type().is_file() {
            let name = entry
                .path()
                .map_err(|e| KeeperError::restore(format!("归档路径无效: {e}")))?
                .to_string_lossy()
                .to_string();
            names.push(name);
        }
    }

    Ok(names)
}
