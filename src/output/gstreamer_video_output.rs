// 该文件是 Tanshang （探伤） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 显示/视频文件输出
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

//! # GStreamer 视频输出
//!
//! 将绘制后的帧推入 appsrc，可以直接显示，也可以编码为视频文件。
//!
//! ## URL
//!
//! - `gst://display` - 本地窗口显示
//! - `gst://file/output.mp4?fps=15` - 编码为文件（mp4/mkv/avi/webm）
//!
//! 帧尺寸取自第一帧，之后尺寸变化视为错误。RGB 行按协商得到的 stride 补齐。
//!
//! ```no_run
//! use tanshang::{FromUrl, output::GStreamerVideoOutput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://file/records/line-3.mp4?fps=15")?;
//! let output = GStreamerVideoOutput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, pad_rows},
  output::Render,
  pipeline::Inspection,
  url_path,
};

const DEFAULT_FPS: i32 = 30;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 帧尺寸与已协商的尺寸不同
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// GStreamer 视频输出，Drop 时发送 EOS 并停止管道
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: i32,
  info: Option<gst_video::VideoInfo>,
  frame_count: u64,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let fps: i32 = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse().ok())
      .filter(|fps| *fps > 0)
      .unwrap_or(DEFAULT_FPS);

    let sink = match url.host_str() {
      Some("display") => "autovideosink sync=false".to_string(),
      Some("file") => encoder_for(&url_path(url)),
      _ => return Err(GStreamerVideoOutputError::SchemeMismatch),
    };

    Self::launch(&format!("appsrc name=src ! videoconvert ! {}", sink), fps)
  }
}

/// 按扩展名选择编码与封装，默认 MP4
fn encoder_for(file_path: &str) -> String {
  let encoder = if file_path.ends_with(".mkv") {
    "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
  } else if file_path.ends_with(".avi") {
    "video/x-raw,format=I420 ! x264enc ! avimux"
  } else if file_path.ends_with(".webm") {
    "vp8enc ! webmmux"
  } else {
    "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
  };
  format!("{} ! filesink location={}", encoder, file_path)
}

impl GStreamerVideoOutput {
  pub fn launch(description: &str, fps: i32) -> Result<Self, GStreamerVideoOutputError> {
    gst::init()?;

    info!("Creating video output pipeline: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcNotFound)?;
    appsrc.set_format(gst::Format::Time);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      fps,
      info: None,
      frame_count: 0,
    })
  }

  /// 第一帧到达时协商 caps 并启动管道，返回每行的 stride
  fn negotiate(&mut self, width: u32, height: u32) -> Result<usize, GStreamerVideoOutputError> {
    if let Some(info) = &self.info {
      if (info.width(), info.height()) == (width, height) {
        return Ok(info.stride()[0] as usize);
      }
      return Err(GStreamerVideoOutputError::FrameSizeChanged {
        expected: (info.width(), info.height()),
        actual: (width, height),
      });
    }

    let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width, height)
      .fps(gst::Fraction::new(self.fps, 1))
      .build()?;
    let caps = info.to_caps()?;
    self.appsrc.set_caps(Some(&caps));
    self.pipeline.set_state(gst::State::Playing)?;

    let stride = info.stride()[0] as usize;
    info!(
      "Video output initialized: {}x{} @ {} fps, stride {}",
      width, height, self.fps, stride
    );
    self.info = Some(info);
    Ok(stride)
  }

  fn push_frame(&mut self, data: Vec<u8>) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer = gst::Buffer::from_mut_slice(data);

    let frame_duration = 1_000_000_000 / self.fps as u64;
    {
      let buffer_ref = buffer.make_mut();
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * frame_duration,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }
    self.frame_count += 1;

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if self.info.is_some() {
      let _ = self.appsrc.end_of_stream();
      // 等待 EOS 写入文件尾
      if let Some(bus) = self.pipeline.bus() {
        let _ = bus.timed_pop_filtered(
          gst::ClockTime::from_seconds(2),
          &[gst::MessageType::Eos, gst::MessageType::Error],
        );
      }
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&mut self, frame: &Frame, _result: &Inspection) -> Result<(), Self::Error> {
    let stride = self.negotiate(frame.width(), frame.height())?;
    let rgb = frame.to_rgb_image();
    let row_bytes = rgb.width() as usize * 3;
    self.push_frame(pad_rows(rgb.as_raw(), row_bytes, stride))
  }
}
