// 该文件是 Tanshang （探伤） 项目的一部分。
// src/frame.rs - 灰度/彩色帧定义
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

use image::{GrayImage, ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

mod transform;
pub use self::transform::{FrameSize, FrameTransform, Rotation, TransformError};

const GRAY_CHANNELS: u8 = 1;
const COLOR_CHANNELS: u8 = 3;

/// 无效帧错误，只中止当前帧
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("无效帧: 尺寸为零 ({width}x{height})")]
  ZeroDimensions { width: u32, height: u32 },
  #[error("无效帧: 不支持的通道数 {0}")]
  UnsupportedChannels(u8),
  #[error("无效帧: 数据长度不匹配, 期望 {expected}, 实际 {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// 彩色帧在内存中的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Rgb,
  Bgr,
}

/// 一帧图像：单通道灰度或三通道彩色
#[derive(Debug, Clone)]
pub enum Frame {
  Gray(GrayImage),
  Color { image: RgbImage, order: ChannelOrder },
}

impl Frame {
  /// 从相机原始字节构造帧（HWC 排列）
  pub fn from_raw(
    width: u32,
    height: u32,
    channels: u8,
    order: ChannelOrder,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::ZeroDimensions { width, height });
    }
    if channels != GRAY_CHANNELS && channels != COLOR_CHANNELS {
      return Err(FrameError::UnsupportedChannels(channels));
    }

    let expected = width as usize * height as usize * channels as usize;
    let actual = data.len();
    if actual != expected {
      return Err(FrameError::BufferSizeMismatch { expected, actual });
    }

    let frame = if channels == GRAY_CHANNELS {
      GrayImage::from_raw(width, height, data).map(Frame::Gray)
    } else {
      RgbImage::from_raw(width, height, data).map(|image| Frame::Color { image, order })
    };
    frame.ok_or(FrameError::BufferSizeMismatch { expected, actual })
  }

  pub fn width(&self) -> u32 {
    match self {
      Frame::Gray(image) => image.width(),
      Frame::Color { image, .. } => image.width(),
    }
  }

  pub fn height(&self) -> u32 {
    match self {
      Frame::Gray(image) => image.height(),
      Frame::Color { image, .. } => image.height(),
    }
  }

  pub fn channels(&self) -> u8 {
    match self {
      Frame::Gray(_) => GRAY_CHANNELS,
      Frame::Color { .. } => COLOR_CHANNELS,
    }
  }

  pub fn is_gray(&self) -> bool {
    matches!(self, Frame::Gray(_))
  }

  pub fn validate(&self) -> Result<(), FrameError> {
    let (width, height) = (self.width(), self.height());
    if width == 0 || height == 0 {
      return Err(FrameError::ZeroDimensions { width, height });
    }
    Ok(())
  }

  /// 将灰度帧原地提升为三通道，彩色帧保持不变
  pub fn promote_to_color(&mut self) {
    if let Frame::Gray(gray) = self {
      let image = gray_to_rgb(gray);
      *self = Frame::Color {
        image,
        order: ChannelOrder::Rgb,
      };
    }
  }

  /// 供绘制使用的三通道缓冲区，灰度帧会先被提升
  pub fn color_mut(&mut self) -> (&mut RgbImage, ChannelOrder) {
    self.promote_to_color();
    match self {
      Frame::Color { image, order } => (image, *order),
      Frame::Gray(_) => unreachable!("灰度帧已提升为彩色"),
    }
  }

  /// 以 RGB 顺序导出图像（拷贝）
  pub fn to_rgb_image(&self) -> RgbImage {
    match self {
      Frame::Gray(gray) => gray_to_rgb(gray),
      Frame::Color {
        image,
        order: ChannelOrder::Rgb,
      } => image.clone(),
      Frame::Color {
        image,
        order: ChannelOrder::Bgr,
      } => swap_red_blue(image),
    }
  }
}

impl From<GrayImage> for Frame {
  fn from(image: GrayImage) -> Self {
    Frame::Gray(image)
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::Color {
      image,
      order: ChannelOrder::Rgb,
    }
  }
}

pub(crate) fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
  ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
    let v = gray.get_pixel(x, y)[0];
    Rgb([v, v, v])
  })
}

pub(crate) fn swap_red_blue(image: &RgbImage) -> RgbImage {
  ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
    let [b, g, r] = image.get_pixel(x, y).0;
    Rgb([r, g, b])
  })
}

/// 按帧的通道顺序排列颜色
pub(crate) fn pixel_in_order(color: [u8; 3], order: ChannelOrder) -> Rgb<u8> {
  match order {
    ChannelOrder::Rgb => Rgb(color),
    ChannelOrder::Bgr => Rgb([color[2], color[1], color[0]]),
  }
}

/// 去掉每行末尾的对齐填充，`stride` 为源缓冲区的行字节数
pub fn strip_row_padding(
  data: &[u8],
  row_bytes: usize,
  stride: usize,
  rows: usize,
) -> Result<Vec<u8>, FrameError> {
  if rows == 0 || row_bytes == 0 {
    return Ok(Vec::new());
  }

  let expected = stride * (rows - 1) + row_bytes;
  if stride < row_bytes || data.len() < expected {
    return Err(FrameError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut packed = Vec::with_capacity(row_bytes * rows);
  for row in data.chunks(stride).take(rows) {
    packed.extend_from_slice(&row[..row_bytes]);
  }
  Ok(packed)
}

/// 将紧凑排列的行按 `stride` 补零对齐，`stride` 不能小于 `row_bytes`
pub fn pad_rows(data: &[u8], row_bytes: usize, stride: usize) -> Vec<u8> {
  if row_bytes == 0 || stride <= row_bytes {
    return data.to_vec();
  }

  let rows = data.len() / row_bytes;
  let mut padded = vec![0u8; stride * rows];
  for (src, dst) in data.chunks_exact(row_bytes).zip(padded.chunks_exact_mut(stride)) {
    dst[..row_bytes].copy_from_slice(src);
  }
  padded
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_rejects_zero_dimensions() {
    let err = Frame::from_raw(0, 4, 3, ChannelOrder::Bgr, vec![]).unwrap_err();
    assert_eq!(
      err,
      FrameError::ZeroDimensions {
        width: 0,
        height: 4
      }
    );
  }

  #[test]
  fn from_raw_rejects_unsupported_channels() {
    for channels in [0u8, 2, 4] {
      let data = vec![0u8; 4 * channels as usize];
      let err = Frame::from_raw(2, 2, channels, ChannelOrder::Rgb, data).unwrap_err();
      assert_eq!(err, FrameError::UnsupportedChannels(channels));
    }
  }

  #[test]
  fn from_raw_rejects_short_buffer() {
    let err = Frame::from_raw(2, 2, 3, ChannelOrder::Rgb, vec![0u8; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::BufferSizeMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn promote_gray_keeps_dimensions() {
    let mut frame = Frame::from_raw(3, 2, 1, ChannelOrder::Rgb, vec![7u8; 6]).unwrap();
    assert!(frame.is_gray());
    frame.promote_to_color();
    assert_eq!(frame.channels(), 3);
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(frame.to_rgb_image().get_pixel(2, 1).0, [7, 7, 7]);
  }

  #[test]
  fn bgr_frame_exports_rgb() {
    let frame = Frame::from_raw(1, 1, 3, ChannelOrder::Bgr, vec![1, 2, 3]).unwrap();
    assert_eq!(frame.to_rgb_image().get_pixel(0, 0).0, [3, 2, 1]);
  }

  #[test]
  fn row_padding_is_removed() {
    // 2x2 RGB，每行对齐到 8 字节
    let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
    let packed = strip_row_padding(&data, 6, 8, 2).unwrap();
    assert_eq!(packed, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

    // 最后一行可以没有填充
    let packed = strip_row_padding(&data[..14], 6, 8, 2).unwrap();
    assert_eq!(packed.len(), 12);

    assert!(matches!(
      strip_row_padding(&data[..10], 6, 8, 2),
      Err(FrameError::BufferSizeMismatch { expected: 14, actual: 10 })
    ));
  }

  #[test]
  fn rows_are_padded_to_stride() {
    // 宽 3 的 RGB 行为 9 字节，对齐到 12
    let data: Vec<u8> = (1..=18).collect();
    let padded = pad_rows(&data, 9, 12);
    assert_eq!(padded.len(), 24);
    assert_eq!(&padded[..9], &data[..9]);
    assert_eq!(&padded[9..12], &[0, 0, 0]);
    assert_eq!(&padded[12..21], &data[9..]);
    assert_eq!(strip_row_padding(&padded, 9, 12, 2).unwrap(), data);
  }

  #[test]
  fn aligned_rows_are_unchanged() {
    let data = vec![5u8; 24];
    assert_eq!(pad_rows(&data, 12, 12), data);
  }
}
