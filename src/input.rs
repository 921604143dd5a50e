// 该文件是 Tanshang （探伤） 项目的一部分。
// src/input.rs - 图像采集
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Tanshang 贡献者

use std::time::Duration;

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 一次采集的结果
#[derive(Debug)]
pub enum Acquisition {
  /// 完整的一帧
  Frame(Frame),
  /// 超时或不完整，本轮跳过
  Incomplete { reason: String },
  /// 有限输入源已耗尽
  Closed,
}

/// 阻塞式图像源。返回 `Err` 表示采集故障，循环必须终止。
pub trait ImageSource {
  type Error: std::error::Error + Send + Sync + 'static;

  fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, Self::Error>;
}

impl<S: ImageSource + ?Sized> ImageSource for Box<S> {
  type Error = S::Error;

  fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, Self::Error> {
    (**self).acquire(timeout)
  }
}

mod image_file;
pub use self::image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    if url.scheme() == GStreamerInput::SCHEME {
      return Ok(InputWrapper::GStreamer(GStreamerInput::from_url(url)?));
    }

    if url.scheme() == ImageFileInput::SCHEME {
      return Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?));
    }

    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl ImageSource for InputWrapper {
  type Error = InputError;

  fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, Self::Error> {
    match self {
      InputWrapper::ImageFile(input) => input.acquire(timeout).map_err(InputError::from),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.acquire(timeout).map_err(InputError::from),
    }
  }
}
