//! 图像句柄
//!
//! 只保存文件名和字节内容，不解码图像。

use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, AppResult, FileError};

/// 一张待上传图像；克隆时只增加引用计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    file_name: String,
    data: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(file_name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// 从磁盘读取图像文件
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if !path.exists() {
            return Err(AppError::File(FileError::NotFound { path: display }));
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::file_read_failed(display.clone(), e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(display);

        Ok(Self::new(file_name, data))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 参考图像与样品图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub reference: ImageHandle,
    pub sample: ImageHandle,
}
