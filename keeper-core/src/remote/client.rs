use super::RemoteStorage;
use super::models::{
    AboutResponse, CreateFileRequest, FileListResponse, RemoteFile, RemoteFolder, StorageQuota,
    TokenSet,
};
use crate::config::RemoteConfig;
use crate::constants::remote;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// 令牌缓存
#[derive(Debug, Default)]
struct TokenState {
    refresh_token: Option<String>,
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.expires_at {
            Some(expires_at) if expires_at - Duration::seconds(remote::TOKEN_EXPIRY_MARGIN_SECS) > now => {
                Some(token)
            }
            None => Some(token),
            _ => None,
        }
    }

    fn store(&mut self, tokens: &TokenSet) {
        self.access_token = Some(tokens.access_token.clone());
        self.expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        // 刷新响应通常不会返回新的 refresh_token
        if let Some(refresh) = &tokens.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
    }
}

/// 远程文件存储客户端
///
/// 访问令牌缓存在内存中，过期前自动用刷新令牌换取新令牌。
/// 刷新令牌本身不落盘，持久化由调用方通过密钥存储完成。
#[derive(Debug, Clone)]
pub struct RemoteStorageClient {
    client: Client,
    config: RemoteConfig,
    tokens: Arc<RwLock<TokenState>>,
}

impl RemoteStorageClient {
    /// 创建新的远程存储客户端
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(remote::REQUEST_TIMEOUT_SECS))
            .user_agent(remote::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            config,
            tokens: Arc::new(RwLock::new(TokenState::default())),
        })
    }

    /// 生成用户授权地址
    pub fn generate_auth_url(&self) -> Result<String> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.config.scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url.to_string())
    }

    /// 用授权码换取令牌
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<TokenSet> {
        let code = code.trim();
        if code.is_empty() {
            return Err(KeeperError::InvalidInput("授权码不能为空".to_string()));
        }

        let tokens = self
            .request_tokens(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        if tokens.refresh_token.is_none() {
            warn!("授权响应中没有刷新令牌，定时任务将无法上传");
        }
        self.tokens.write().await.store(&tokens);
        info!("远程存储授权成功");
        Ok(tokens)
    }

    /// 设置刷新令牌，同时丢弃缓存的访问令牌
    pub async fn set_refresh_token(&self, refresh_token: impl Into<String>) {
        let mut state = self.tokens.write().await;
        state.refresh_token = Some(refresh_token.into());
        state.access_token = None;
        state.expires_at = None;
    }

    /// 当前的刷新令牌
    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.read().await.refresh_token.clone()
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenSet> {
        let response = self.client.post(&self.config.token_url).form(form).send().await?;
        let response = check_response(response).await?;
        Ok(response.json::<TokenSet>().await?)
    }

    /// 获取可用的访问令牌，必要时刷新
    async fn access_token(&self) -> Result<String> {
        {
            let state = self.tokens.read().await;
            if let Some(token) = state.valid_access_token(Utc::now()) {
                return Ok(token.to_string());
            }
        }

        let mut state = self.tokens.write().await;
        // 等待写锁期间可能已被其他任务刷新
        if let Some(token) = state.valid_access_token(Utc::now()) {
            return Ok(token.to_string());
        }
        let refresh_token = state
            .refresh_token
            .clone()
            .ok_or_else(|| KeeperError::auth("未设置刷新令牌，请先完成授权"))?;

        debug!("刷新访问令牌");
        let tokens = self
            .request_tokens(&[
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        state.store(&tokens);
        Ok(tokens.access_token)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<Response> {
        let token = self.access_token().await?;
        let response = builder.bearer_auth(token).send().await?;
        check_response(response).await
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// 新建文件夹
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteFolder> {
        let body = CreateFileRequest {
            name,
            mime_type: Some(remote::FOLDER_MIME_TYPE),
            parents: parent_id.into_iter().collect(),
        };
        let response = self
            .authorized(
                self.client
                    .post(self.api_url("files"))
                    .query(&[("fields", "id,name,createdTime")])
                    .json(&body),
            )
            .await?;
        let folder = response.json::<RemoteFolder>().await?;
        info!("已创建远程文件夹: {} ({})", folder.name, folder.id);
        Ok(folder)
    }

    /// 列出文件夹
    pub async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<RemoteFolder>> {
        let mut query = format!("mimeType='{}' and trashed=false", remote::FOLDER_MIME_TYPE);
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        let response = self
            .authorized(self.client.get(self.api_url("files")).query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,createdTime)"),
                ("orderBy", "name"),
            ]))
            .await?;
        Ok(response.json::<FileListResponse<RemoteFolder>>().await?.files)
    }

    /// 上传文件
    pub async fn upload_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<RemoteFile> {
        let metadata = serde_json::to_string(&CreateFileRequest {
            name,
            mime_type: Some(mime_type),
            parents: folder_id.into_iter().collect(),
        })?;
        let boundary = format!("keeper-{}", Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, mime_type, &bytes);
        let size = bytes.len();

        let url = format!(
            "{}/files",
            self.config.upload_base_url.trim_end_matches('/')
        );
        let response = self
            .authorized(
                self.client
                    .post(url)
                    .query(&[("uploadType", "multipart"), ("fields", remote::FILE_FIELDS)])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={boundary}"),
                    )
                    .body(body),
            )
            .await?;
        let file = response.json::<RemoteFile>().await?;
        info!("上传完成: {} ({} 字节) -> {}", name, size, file.id);
        Ok(file)
    }

    /// 下载文件内容
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url(&format!("files/{file_id}")))
                    .query(&[("alt", "media")]),
            )
            .await?;
        let bytes = response.bytes().await?;
        debug!("下载完成: {} ({} 字节)", file_id, bytes.len());
        Ok(bytes.to_vec())
    }

    /// 列出文件（不含文件夹），按创建时间倒序
    pub async fn list_files(&self, folder_id: Option<&str>, page_size: u32) -> Result<Vec<RemoteFile>> {
        let mut query = format!("mimeType!='{}' and trashed=false", remote::FOLDER_MIME_TYPE);
        if let Some(folder) = folder_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(folder)));
        }
        let fields = format!("files({})", remote::FILE_FIELDS);
        let page_size = page_size.clamp(1, 1000).to_string();
        let response = self
            .authorized(self.client.get(self.api_url("files")).query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("orderBy", "createdTime desc"),
                ("pageSize", page_size.as_str()),
            ]))
            .await?;
        Ok(response.json::<FileListResponse<RemoteFile>>().await?.files)
    }

    /// 删除文件
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.authorized(self.client.delete(self.api_url(&format!("files/{file_id}"))))
            .await?;
        info!("已删除远程文件: {}", file_id);
        Ok(())
    }

    /// 获取文件元数据
    pub async fn get_metadata(&self, file_id: &str) -> Result<RemoteFile> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url(&format!("files/{file_id}")))
                    .query(&[("fields", remote::FILE_FIELDS)]),
            )
            .await?;
        Ok(response.json::<RemoteFile>().await?)
    }

    /// 检查授权是否有效，任何错误都视为未授权
    pub async fn check_auth(&self) -> bool {
        match self
            .authorized(self.client.get(self.api_url("about")).query(&[("fields", "user")]))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("授权检查失败: {}", e);
                false
            }
        }
    }

    /// 获取存储配额
    pub async fn get_storage_quota(&self) -> Result<StorageQuota> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url("about"))
                    .query(&[("fields", "storageQuota")]),
            )
            .await?;
        Ok(response.json::<AboutResponse>().await?.storage_quota)
    }
}

#[async_trait]
impl RemoteStorage for RemoteStorageClient {
    async fn is_authorized(&self) -> bool {
        let state = self.tokens.read().await;
        state.refresh_token.is_some() || state.valid_access_token(Utc::now()).is_some()
    }

    async fn upload_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<RemoteFile> {
        RemoteStorageClient::upload_file(self, name, bytes, mime_type, folder_id).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        RemoteStorageClient::download_file(self, file_id).await
    }
}

/// 非 2xx 响应转换为错误，401/403 归为授权错误
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(KeeperError::auth(format!("{status}: {body}")))
        }
        _ => Err(KeeperError::remote(format!("{status}: {body}"))),
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related_body(boundary: &str, metadata: &str, mime_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Form, Json, Router,
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response as AxumResponse},
        routing::{get, post},
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockState {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        refreshes: Arc<Mutex<usize>>,
    }

    fn bearer_ok(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer at-"))
    }

    async fn token(
        State(state): State<MockState>,
        Form(form): Form<HashMap<String, String>>,
    ) -> AxumResponse {
        match form.get("grant_type").map(String::as_str) {
            Some("authorization_code") if form.get("code").map(String::as_str) == Some("good-code") => {
                Json(json!({"access_token": "at-1", "expires_in": 3600, "refresh_token": "rt-1", "token_type": "Bearer"}))
                    .into_response()
            }
            Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("rt-1") => {
                *state.refreshes.lock().unwrap() += 1;
                Json(json!({"access_token": "at-2", "expires_in": 3600})).into_response()
            }
            _ => (StatusCode::BAD_REQUEST, "invalid_grant").into_response(),
        }
    }

    async fn upload(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("multipart/related; boundary=") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let id = format!("file-{}", state.files.lock().unwrap().len() + 1);
        state.files.lock().unwrap().insert(id.clone(), body.to_vec());
        Json(json!({
            "id": id,
            "name": "uploaded",
            "size": body.len().to_string(),
            "mimeType": "application/gzip",
            "createdTime": "2026-01-01T00:00:00Z"
        }))
        .into_response()
    }

    async fn file(
        State(state): State<MockState>,
        Path(id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let files = state.files.lock().unwrap();
        let Some(bytes) = files.get(&id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        if query.get("alt").map(String::as_str) == Some("media") {
            bytes.clone().into_response()
        } else {
            Json(json!({"id": id, "name": "uploaded", "size": bytes.len().to_string()})).into_response()
        }
    }

    async fn remove(
        State(state): State<MockState>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match state.files.lock().unwrap().remove(&id) {
            Some(_) => StatusCode::NO_CONTENT.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn list(
        State(state): State<MockState>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let q = query.get("q").cloned().unwrap_or_default();
        if q.starts_with("mimeType='") {
            return Json(json!({"files": [{"id": "folder-1", "name": "backups"}]})).into_response();
        }
        let files: Vec<_> = state
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(id, bytes)| json!({"id": id, "name": "uploaded", "size": bytes.len().to_string()}))
            .collect();
        Json(json!({ "files": files })).into_response()
    }

    async fn create_folder(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({"id": "folder-new", "name": body["name"]})).into_response()
    }

    async fn about(headers: HeaderMap) -> AxumResponse {
        if !bearer_ok(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({
            "user": {"displayName": "tester"},
            "storageQuota": {"limit": "1000", "usage": "250", "usageInDrive": "200", "usageInDriveTrash": "10"}
        }))
        .into_response()
    }

    async fn spawn_mock() -> (RemoteConfig, MockState) {
        let state = MockState::default();
        let app = Router::new()
            .route("/token", post(token))
            .route("/upload/files", post(upload))
            .route("/api/files", get(list).post(create_folder))
            .route("/api/files/{id}", get(file).delete(remove))
            .route("/api/about", get(about))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = RemoteConfig {
            enabled: true,
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            token_url: format!("http://{addr}/token"),
            api_base_url: format!("http://{addr}/api"),
            upload_base_url: format!("http://{addr}/upload"),
            ..RemoteConfig::default()
        };
        (config, state)
    }

    #[test]
    fn test_generate_auth_url() {
        let config = RemoteConfig {
            client_id: "client-1".to_string(),
            ..RemoteConfig::default()
        };
        let client = RemoteStorageClient::new(config).unwrap();
        let url = Url::parse(&client.generate_auth_url().unwrap()).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[tokio::test]
    async fn test_exchange_then_upload_and_download() {
        let (config, _state) = spawn_mock().await;
        let client = RemoteStorageClient::new(config).unwrap();
        assert!(!client.is_authorized().await);

        let tokens = client.exchange_code_for_tokens("good-code").await.unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert!(client.is_authorized().await);
        assert_eq!(client.refresh_token().await.as_deref(), Some("rt-1"));

        let payload = b"archive-bytes".to_vec();
        let file = client
            .upload_file("backup.tar.gz", payload.clone(), "application/gzip", Some("folder-1"))
            .await
            .unwrap();
        assert_eq!(file.id, "file-1");
        assert!(file.size.unwrap() > payload.len() as u64);

        // 上传的是 multipart 包体，内容应包含原始数据
        let stored = client.download_file(&file.id).await.unwrap();
        let stored = String::from_utf8_lossy(&stored);
        assert!(stored.contains("archive-bytes"));
        assert!(stored.contains("\"parents\":[\"folder-1\"]"));
    }

    #[tokio::test]
    async fn test_refresh_token_used_on_demand() {
        let (config, state) = spawn_mock().await;
        let client = RemoteStorageClient::new(config).unwrap();
        client.set_refresh_token("rt-1").await;
        assert!(client.is_authorized().await);

        assert!(client.check_auth().await);
        let quota = client.get_storage_quota().await.unwrap();
        assert_eq!(quota.limit, Some(1000));
        assert_eq!(quota.usage, Some(250));
        // 第二次调用复用缓存的访问令牌
        assert_eq!(*state.refreshes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let (config, _state) = spawn_mock().await;
        let client = RemoteStorageClient::new(config).unwrap();

        assert!(!client.check_auth().await);
        let err = client.download_file("file-1").await.unwrap_err();
        assert!(matches!(err, KeeperError::Auth(_)));

        client.set_refresh_token("revoked").await;
        let err = client.get_storage_quota().await.unwrap_err();
        assert!(matches!(err, KeeperError::Remote(_)));
    }

    #[tokio::test]
    async fn test_folders_list_and_delete() {
        let (config, _state) = spawn_mock().await;
        let client = RemoteStorageClient::new(config).unwrap();
        client.set_refresh_token("rt-1").await;

        let folder = client.create_folder("keeper", None).await.unwrap();
        assert_eq!(folder.id, "folder-new");
        assert_eq!(folder.name, "keeper");

        let folders = client.list_folders(None).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "backups");

        let file = client
            .upload_file("a.tar.gz", vec![1, 2, 3], "application/gzip", None)
            .await
            .unwrap();
        assert_eq!(client.list_files(None, 10).await.unwrap().len(), 1);
        assert_eq!(client.get_metadata(&file.id).await.unwrap().id, file.id);

        client.delete_file(&file.id).await.unwrap();
        assert!(client.list_files(None, 10).await.unwrap().is_empty());
        let err = client.get_metadata(&file.id).await.unwrap_err();
        assert!(matches!(err, KeeperError::Remote(_)));
    }
}
