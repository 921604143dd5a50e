// 该文件是 Tanshang （探伤） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, pipeline::Inspection};

/// 接收已绘制的帧及其检测结果
pub trait Render {
  type Error: std::error::Error + Send + Sync + 'static;

  fn render_result(&mut self, frame: &Frame, result: &Inspection) -> Result<(), Self::Error>;
}

impl<R: Render + ?Sized> Render for Box<R> {
  type Error = R::Error;

  fn render_result(&mut self, frame: &Frame, result: &Inspection) -> Result<(), Self::Error> {
    (**self).render_result(frame, result)
  }
}

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  SaveImageFile(SaveImageFileOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideo(GStreamerVideoOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => Ok(OutputWrapper::GStreamerVideo(
        GStreamerVideoOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&mut self, frame: &Frame, result: &Inspection) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFile(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideo(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

/// 不输出任何内容，未指定 `--output` 时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Render for NullOutput {
  type Error = std::convert::Infallible;

  fn render_result(&mut self, _frame: &Frame, _result: &Inspection) -> Result<(), Self::Error> {
    Ok(())
  }
}
