//! 加密的密钥存储
//!
//! 按账户保存远程存储的刷新令牌等敏感信息。文件内容为 JSON，
//! 每个值使用 AES-256-GCM 单独加密，密钥由口令经 Argon2id 派生，
//! 口令只从环境变量读取，不写入配置文件。

use crate::constants::secrets;
use crate::{KeeperError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STORE_VERSION: u8 = 1;
const VERIFIER_PLAINTEXT: &[u8] = b"keeper-secret-store";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptedValue {
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    salt: String,
    /// 用于在打开时检查口令是否正确
    verifier: EncryptedValue,
    #[serde(default)]
    secrets: BTreeMap<String, EncryptedValue>,
}

struct DerivedKey([u8; secrets::KEY_SIZE]);

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// 密钥存储
pub struct SecretStore {
    path: PathBuf,
    key: DerivedKey,
    file: StoreFile,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("path", &self.path)
            .field("accounts", &self.accounts())
            .finish()
    }
}

impl SecretStore {
    /// 打开密钥存储，文件不存在时创建新的存储
    pub fn open<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if passphrase.is_empty() {
            return Err(KeeperError::secret("口令不能为空"));
        }

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content)?;
            if file.version != STORE_VERSION {
                return Err(KeeperError::secret(format!(
                    "不支持的密钥存储版本: {}",
                    file.version
                )));
            }
            let salt = decode(&file.salt)?;
            let key = derive_key(passphrase, &salt)?;
            decrypt(&key, &file.verifier)
                .map_err(|_| KeeperError::secret("口令错误或密钥文件已损坏"))?;
            debug!("已打开密钥存储: {}", path.display());
            return Ok(Self { path, key, file });
        }

        let mut salt = [0u8; secrets::SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(passphrase, &salt)?;
        let verifier = encrypt(&key, VERIFIER_PLAINTEXT)?;
        let store = Self {
            path,
            key,
            file: StoreFile {
                version: STORE_VERSION,
                salt: STANDARD.encode(salt),
                verifier,
                secrets: BTreeMap::new(),
            },
        };
        store.save()?;
        info!("已创建密钥存储: {}", store.path.display());
        Ok(store)
    }

    /// 使用环境变量中的口令打开，未设置口令时返回 None
    pub fn open_from_env<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        match std::env::var(secrets::PASSPHRASE_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => Self::open(path, &passphrase).map(Some),
            _ => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存或覆盖某个账户的密钥
    pub fn put(&mut self, account: &str, secret: &str) -> Result<()> {
        if account.trim().is_empty() {
            return Err(KeeperError::InvalidInput("账户名不能为空".to_string()));
        }
        let value = encrypt(&self.key, secret.as_bytes())?;
        self.file.secrets.insert(account.to_string(), value);
        self.save()
    }

    pub fn get(&self, account: &str) -> Result<Option<String>> {
        let Some(value) = self.file.secrets.get(account) else {
            return Ok(None);
        };
        let plaintext = decrypt(&self.key, value)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| KeeperError::secret(format!("密钥内容不是有效的 UTF-8: {e}")))
    }

    /// 删除账户，返回是否存在
    pub fn remove(&mut self, account: &str) -> Result<bool> {
        if self.file.secrets.remove(account).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn accounts(&self) -> Vec<String> {
        self.file.secrets.keys().cloned().collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.file)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<DerivedKey> {
    let mut key = [0u8; secrets::KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| KeeperError::secret(format!("密钥派生失败: {e}")))?;
    Ok(DerivedKey(key))
}

fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> Result<EncryptedValue> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| KeeperError::secret(format!("创建加密器失败: {e}")))?;
    let mut nonce_bytes = [0u8; secrets::NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| KeeperError::secret(format!("加密失败: {e}")))?;
    Ok(EncryptedValue {
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn decrypt(key: &DerivedKey, value: &EncryptedValue) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| KeeperError::secret(format!("创建加密器失败: {e}")))?;
    let nonce = decode(&value.nonce)?;
    if nonce.len() != secrets::NONCE_SIZE {
        return Err(KeeperError::secret(format!("nonce 长度无效: {}", nonce.len())));
    }
    let ciphertext = decode(&value.ciphertext)?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| KeeperError::secret("解密失败"))
}

fn decode(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| KeeperError::secret(format!("base64 解码失败: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("secrets.json");

        let mut store = SecretStore::open(&path, "correct horse").unwrap();
        store.put("default", "refresh-token-1").unwrap();
        store.put("offsite", "refresh-token-2").unwrap();

        let reopened = SecretStore::open(&path, "correct horse").unwrap();
        assert_eq!(reopened.get("default").unwrap().as_deref(), Some("refresh-token-1"));
        assert_eq!(reopened.accounts(), vec!["default", "offsite"]);
        assert_eq!(reopened.get("missing").unwrap(), None);

        // 明文不会出现在文件中
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("refresh-token-1"));
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        SecretStore::open(&path, "right").unwrap().put("default", "x").unwrap();

        let err = SecretStore::open(&path, "wrong").unwrap_err();
        assert!(matches!(err, KeeperError::Secret(_)));
        assert!(SecretStore::open(&path, "").is_err());
    }

    #[test]
    fn test_remove() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        let mut store = SecretStore::open(&path, "pass").unwrap();
        store.put("default", "x").unwrap();

        assert!(store.remove("default").unwrap());
        assert!(!store.remove("default").unwrap());
        let reopened = SecretStore::open(&path, "pass").unwrap();
        assert!(reopened.accounts().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        SecretStore::open(&path, "pass").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
