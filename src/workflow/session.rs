//! 处理会话
//!
//! 封装"我正在分析哪一对图像"这一信息

use std::fmt::Display;
use std::sync::Arc;

use crate::error::Failure;
use crate::models::{ImageHandle, ImagePair, QcSettings};

/// 会话标记
///
/// 每次开始新会话时递增；定时器和网络回调都带着它，
/// 与当前活动会话不一致的回调一律丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionTag(pub u64);

impl Display for SessionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 开始处理的请求，对应操作员点击"开始分析"
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub reference: Option<ImageHandle>,
    pub sample: Option<ImageHandle>,
    pub settings: Option<QcSettings>,
}

impl StartRequest {
    pub fn new(reference: ImageHandle, sample: ImageHandle, settings: QcSettings) -> Self {
        Self {
            reference: Some(reference),
            sample: Some(sample),
            settings: Some(settings),
        }
    }

    /// 校验图像与设置是否齐全
    pub fn validate(self) -> Result<(ImagePair, QcSettings), Failure> {
        let reference = self
            .reference
            .ok_or_else(|| Failure::validation("请先选择参考图像"))?;
        let sample = self
            .sample
            .ok_or_else(|| Failure::validation("请先选择样品图像"))?;
        let settings = self
            .settings
            .ok_or_else(|| Failure::validation("缺少分析设置"))?;

        if reference.is_empty() || sample.is_empty() {
            return Err(Failure::validation("图像文件为空"));
        }

        Ok((ImagePair { reference, sample }, settings))
    }
}

/// 一次处理会话，由编排器独占
#[derive(Debug, Clone)]
pub struct Session {
    pub tag: SessionTag,
    /// 上传成功后由服务器分配
    pub session_id: Option<String>,
    pub images: ImagePair,
    pub settings: Arc<QcSettings>,
    pub is_active: bool,
}

impl Session {
    pub fn new(tag: SessionTag, images: ImagePair, settings: QcSettings) -> Self {
        Self {
            tag,
            session_id: None,
            images,
            settings: Arc::new(settings),
            is_active: true,
        }
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[会话 {} ID#{} 参考#{} 样品#{}]",
            self.tag,
            self.session_id.as_deref().unwrap_or("-"),
            self.images.reference.file_name(),
            self.images.sample.file_name()
        )
    }
}
