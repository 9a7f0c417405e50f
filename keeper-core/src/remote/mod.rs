// 远程存储模块
// 通过 OAuth 授权访问云端文件存储，备份文件可选地上传一份远程副本

pub mod client;
pub mod models;

pub use client::RemoteStorageClient;
pub use models::{RemoteFile, RemoteFolder, StorageQuota, TokenSet};

use crate::Result;
use async_trait::async_trait;

/// 编排器依赖的远程存储能力
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// 是否持有可用凭据，不发起网络请求
    async fn is_authorized(&self) -> bool;

    async fn upload_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<RemoteFile>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}
