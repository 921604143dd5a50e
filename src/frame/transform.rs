// 该文件是 Tanshang （探伤） 项目的一部分。
// src/frame/transform.rs - 采集后的帧缩放与旋转
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

use std::str::FromStr;

use image::{
  ImageBuffer, Pixel,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::trace;

use crate::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
  #[error("无效的尺寸 '{0}'，应为 <宽>x<高>，例如 1000x600")]
  InvalidSize(String),
  #[error("无效的旋转角度 '{0}'，只支持 0、90、180、270")]
  InvalidRotation(String),
}

/// `<宽>x<高>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
  pub width: u32,
  pub height: u32,
}

impl FromStr for FrameSize {
  type Err = TransformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || TransformError::InvalidSize(s.to_string());
    let (width, height) = s
      .trim()
      .split_once(['x', 'X'])
      .ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
      return Err(invalid());
    }
    Ok(Self { width, height })
  }
}

/// 顺时针旋转角度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
  #[default]
  None,
  Clockwise90,
  Clockwise180,
  Clockwise270,
}

impl FromStr for Rotation {
  type Err = TransformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "0" => Ok(Rotation::None),
      "90" => Ok(Rotation::Clockwise90),
      "180" => Ok(Rotation::Clockwise180),
      "270" => Ok(Rotation::Clockwise270),
      other => Err(TransformError::InvalidRotation(other.to_string())),
    }
  }
}

/// 检测前对每一帧先缩放、再顺时针旋转。
///
/// 例如安装方向为横向的相机：`--resize 1000x600 --rotate 90` 得到 600x1000 的竖向帧，
/// 检测框和标注都在变换后的帧上。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTransform {
  pub resize: Option<FrameSize>,
  pub rotation: Rotation,
}

impl FrameTransform {
  pub fn new(resize: Option<FrameSize>, rotation: Rotation) -> Self {
    Self { resize, rotation }
  }

  pub fn is_identity(&self) -> bool {
    self.resize.is_none() && self.rotation == Rotation::None
  }

  /// 通道数与通道顺序保持不变。无效帧原样返回，交给流水线报告。
  pub fn apply(&self, frame: Frame) -> Frame {
    if self.is_identity() || frame.validate().is_err() {
      return frame;
    }

    let (width, height) = (frame.width(), frame.height());
    let transformed = match frame {
      Frame::Gray(image) => Frame::Gray(self.apply_image(image)),
      Frame::Color { image, order } => Frame::Color {
        image: self.apply_image(image),
        order,
      },
    };
    trace!(
      "帧变换: {}x{} -> {}x{}",
      width,
      height,
      transformed.width(),
      transformed.height()
    );
    transformed
  }

  fn apply_image<P>(&self, image: ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
  where
    P: Pixel<Subpixel = u8> + 'static,
  {
    let image = match self.resize {
      Some(size) if image.dimensions() != (size.width, size.height) => {
        imageops::resize(&image, size.width, size.height, FilterType::Triangle)
      }
      _ => image,
    };

    match self.rotation {
      Rotation::None => image,
      Rotation::Clockwise90 => imageops::rotate90(&image),
      Rotation::Clockwise180 => imageops::rotate180(&image),
      Rotation::Clockwise270 => imageops::rotate270(&image),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ChannelOrder;
  use image::{GrayImage, Luma, Rgb, RgbImage};

  #[test]
  fn sizes_and_rotations_parse() {
    assert_eq!(
      "1000x600".parse::<FrameSize>().unwrap(),
      FrameSize {
        width: 1000,
        height: 600
      }
    );
    assert!("1000".parse::<FrameSize>().is_err());
    assert!("0x600".parse::<FrameSize>().is_err());
    assert_eq!("90".parse::<Rotation>().unwrap(), Rotation::Clockwise90);
    assert!(matches!(
      "45".parse::<Rotation>(),
      Err(TransformError::InvalidRotation(_))
    ));
  }

  #[test]
  fn resize_then_rotate_gives_portrait_frame() {
    let transform = FrameTransform::new("1000x600".parse().ok(), Rotation::Clockwise90);
    let frame = Frame::Color {
      image: RgbImage::new(1280, 960),
      order: ChannelOrder::Bgr,
    };

    let frame = transform.apply(frame);
    assert_eq!((frame.width(), frame.height()), (600, 1000));
    assert!(matches!(
      frame,
      Frame::Color {
        order: ChannelOrder::Bgr,
        ..
      }
    ));
  }

  #[test]
  fn rotation_is_clockwise() {
    // 2x1：左黑右白，顺时针 90° 后变为上黑下白
    let mut image = GrayImage::new(2, 1);
    image.put_pixel(1, 0, Luma([255]));
    let frame = FrameTransform::new(None, Rotation::Clockwise90).apply(Frame::Gray(image));

    assert!(frame.is_gray());
    let rgb = frame.to_rgb_image();
    assert_eq!(rgb.dimensions(), (1, 2));
    assert_eq!(*rgb.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(*rgb.get_pixel(0, 1), Rgb([255, 255, 255]));
  }

  #[test]
  fn identity_and_invalid_frames_pass_through() {
    let frame = FrameTransform::default().apply(Frame::from(RgbImage::new(7, 3)));
    assert_eq!((frame.width(), frame.height()), (7, 3));

    let transform = FrameTransform::new("10x10".parse().ok(), Rotation::Clockwise90);
    let empty = transform.apply(Frame::from(RgbImage::new(0, 0)));
    assert_eq!((empty.width(), empty.height()), (0, 0));
  }
}
