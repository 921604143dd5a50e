// 该文件是 Tanshang （探伤） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 相机/视频输入
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

//! # GStreamer 输入
//!
//! 以 appsink 限时拉取样本，对应采集协议中的 `acquire(timeout)`：
//! - 拉到样本：转换为 [`Frame`]（GRAY8 保持单通道，BGR/RGB 为三通道）
//! - 超时：`Acquisition::Incomplete`
//! - 流结束：`Acquisition::Closed`
//! - 总线上的错误消息：采集故障
//!
//! ```no_run
//! use tanshang::{FromUrl, input::GStreamerInput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://camera/dev/video0?width=1280&height=960&fps=15&format=GRAY8")?;
//! let input = GStreamerInput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, time::Duration};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ChannelOrder, Frame, FrameError, strip_row_padding},
  input::{Acquisition, ImageSource},
  url_path,
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 单个样本转换失败，只影响当前帧
#[derive(Error, Debug)]
enum SampleError {
  #[error("{0}")]
  Pipeline(String),
  #[error("unsupported format {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("{0}")]
  Frame(#[from] FrameError),
}

/// GStreamer 视频输入，Drop 时停止管道
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = url_path(url);
    let format = query
      .get("format")
      .cloned()
      .unwrap_or_else(|| String::from("BGR"));

    let source = match url.host_str() {
      Some("camera") => camera_source(&path, &query),
      Some("file") => format!("filesrc location={} ! decodebin", path),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    let description = format!(
      "{} ! videoconvert ! video/x-raw,format={} ! appsink max-buffers=2 drop=true name=sink",
      source, format
    );
    Self::launch(&description)
  }
}

fn camera_source(device: &str, query: &HashMap<String, String>) -> String {
  let mut source = format!("v4l2src device={}", device);
  let width = query.get("width").and_then(|v| v.parse::<u32>().ok());
  let height = query.get("height").and_then(|v| v.parse::<u32>().ok());
  let fps = query.get("fps").and_then(|v| v.parse::<u32>().ok());

  if width.is_some() || height.is_some() || fps.is_some() {
    source.push_str(" ! video/x-raw");
    if let Some(width) = width {
      source.push_str(&format!(",width={}", width));
    }
    if let Some(height) = height {
      source.push_str(&format!(",height={}", height));
    }
    if let Some(fps) = fps {
      source.push_str(&format!(",framerate={}/1", fps));
    }
  }
  source
}

impl GStreamerInput {
  pub fn launch(description: &str) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }

  /// 取出总线上的第一条错误消息
  fn pending_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(format!(
        "{} ({:?})",
        err.error(),
        err.debug().map(|d| d.to_string())
      )),
      _ => None,
    }
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    } else {
      debug!("GStreamer input pipeline stopped");
    }
  }
}

impl ImageSource for GStreamerInput {
  type Error = GStreamerInputError;

  fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, Self::Error> {
    if let Some(message) = self.pending_error() {
      error!("GStreamer pipeline error: {}", message);
      return Err(GStreamerInputError::PipelineError(message));
    }

    let timeout = gst::ClockTime::from_mseconds(timeout.as_millis() as u64);
    let Some(sample) = self.appsink.try_pull_sample(timeout) else {
      if self.appsink.is_eos() {
        info!("GStreamer input reached end of stream");
        return Ok(Acquisition::Closed);
      }
      return Ok(Acquisition::Incomplete {
        reason: format!("no sample within {}", timeout),
      });
    };

    match convert_sample(&sample) {
      Ok(frame) => Ok(Acquisition::Frame(frame)),
      Err(e) => {
        warn!("Failed to convert sample: {}", e);
        Ok(Acquisition::Incomplete {
          reason: e.to_string(),
        })
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<Frame, SampleError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| SampleError::Pipeline("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| SampleError::Pipeline("No caps in sample".to_string()))?;
  let video_info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| SampleError::Pipeline("Failed to get video info from caps".to_string()))?;

  let (channels, order) = match video_info.format() {
    gst_video::VideoFormat::Gray8 => (1u8, ChannelOrder::Rgb),
    gst_video::VideoFormat::Rgb => (3, ChannelOrder::Rgb),
    gst_video::VideoFormat::Bgr => (3, ChannelOrder::Bgr),
    other => return Err(SampleError::UnsupportedFormat(other)),
  };

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width as usize * channels as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| SampleError::Pipeline(format!("Failed to map buffer for reading: {}", e)))?;

  let packed = strip_row_padding(map.as_slice(), row_bytes, stride, height as usize)?;
  Ok(Frame::from_raw(width, height, channels, order, packed)?)
}
