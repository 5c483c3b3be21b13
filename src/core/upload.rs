//! 上传图片处理模块
//!
//! 校验扩展名、大小与实际内容，然后以内容哈希命名落盘。

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 允许的图片扩展名
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// 图片存放子目录
const IMAGE_SUBDIR: &str = "waste_images";

/// 上传错误
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("uploaded image is empty")]
    Empty,

    #[error("image size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),

    #[error("file is not an image: {0}")]
    NotAnImage(String),

    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

/// 用户上传的图片
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// 原始文件名
    pub file_name: String,
    /// 客户端声明的类型
    pub content_type: Option<String>,
    /// 图片内容
    pub bytes: Vec<u8>,
}

/// 已保存的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// 相对上传根目录的路径（使用 `/` 分隔）
    pub relative_path: String,
    /// 内容SHA-256
    pub sha256: String,
    /// 检测到的MIME类型
    pub mime_type: String,
}

/// 上传图片存储
#[derive(Debug, Clone)]
pub struct UploadStore {
    /// 根目录
    root: PathBuf,
    /// 大小上限
    max_bytes: u64,
}

impl UploadStore {
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        Self { root, max_bytes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// 校验图片，返回规范化的扩展名和检测到的MIME类型
    pub fn validate(&self, upload: &ImageUpload) -> Result<(String, String), UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let size = upload.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let extension = Path::new(&upload.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(UploadError::UnsupportedExtension(extension));
        }

        if let Some(declared) = upload.content_type.as_deref() {
            if !declared.is_empty() && !declared.starts_with("image/") {
                return Err(UploadError::NotAnImage(format!(
                    "declared content type {}",
                    declared
                )));
            }
        }

        let kind = infer::get(&upload.bytes)
            .ok_or_else(|| UploadError::NotAnImage("unrecognised content".to_string()))?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(UploadError::NotAnImage(format!(
                "detected {}",
                kind.mime_type()
            )));
        }

        Ok((extension, kind.mime_type().to_string()))
    }

    /// 校验并保存图片
    pub fn store(&self, upload: &ImageUpload) -> Result<StoredImage, UploadError> {
        let (extension, mime_type) = self.validate(upload)?;

        let sha256 = hex::encode(Sha256::digest(&upload.bytes));
        let file_name = format!(
            "{}-{}.{}",
            &sha256[..16],
            uuid::Uuid::new_v4().simple(),
            extension
        );

        let dir = self.root.join(IMAGE_SUBDIR);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(&file_name), &upload.bytes)?;

        tracing::info!("已保存上传图片: {}/{}", IMAGE_SUBDIR, file_name);

        Ok(StoredImage {
            relative_path: format!("{}/{}", IMAGE_SUBDIR, file_name),
            sha256,
            mime_type,
        })
    }

    /// 删除已保存的图片（写历史失败时调用）
    pub fn remove(&self, relative_path: &str) {
        let path = self.root.join(relative_path);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("删除上传图片失败 {}: {}", path.display(), e);
        }
    }
}
