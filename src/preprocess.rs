// 该文件是 Tanshang （探伤） 项目的一部分。
// src/preprocess.rs - 帧预处理
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
  frame::{ChannelOrder, Frame, FrameError, gray_to_rgb},
  model::InputTensor,
};

pub const INPUT_WIDTH: u32 = 640;
pub const INPUT_HEIGHT: u32 = 640;
const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// 网络空间到帧空间的缩放比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
  pub x_scale: f32,
  pub y_scale: f32,
}

impl ScaleFactors {
  pub fn new(frame_width: u32, frame_height: u32, input_width: u32, input_height: u32) -> Self {
    Self {
      x_scale: frame_width as f32 / input_width as f32,
      y_scale: frame_height as f32 / input_height as f32,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  input_width: u32,
  input_height: u32,
}

impl Default for Preprocessor {
  fn default() -> Self {
    Self::new(INPUT_WIDTH, INPUT_HEIGHT)
  }
}

impl Preprocessor {
  pub fn new(input_width: u32, input_height: u32) -> Self {
    Self {
      input_width,
      input_height,
    }
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }

  /// 生成 (1, 3, H, W) 的 RGB 张量（像素乘以 1/255，不减均值，不裁剪）
  pub fn preprocess(&self, frame: &Frame) -> Result<(InputTensor, ScaleFactors), FrameError> {
    frame.validate()?;

    // 缩放比例必须取自原始帧尺寸
    let scale = ScaleFactors::new(
      frame.width(),
      frame.height(),
      self.input_width,
      self.input_height,
    );

    let (source, swap_rb) = match frame {
      Frame::Gray(gray) => (Cow::Owned(gray_to_rgb(gray)), false),
      Frame::Color { image, order } => (Cow::Borrowed(image), *order == ChannelOrder::Bgr),
    };

    let resized = resize(&source, self.input_width, self.input_height);
    let tensor = self.to_nchw(&resized, swap_rb);

    debug!(
      "预处理完成: {}x{}x{} -> {:?}, 缩放 ({:.3}, {:.3})",
      frame.width(),
      frame.height(),
      frame.channels(),
      tensor.shape(),
      scale.x_scale,
      scale.y_scale
    );

    Ok((tensor, scale))
  }

  fn to_nchw(&self, image: &RgbImage, swap_rb: bool) -> InputTensor {
    let width = self.input_width as usize;
    let height = self.input_height as usize;
    let plane = width * height;
    let mut data = vec![0f32; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = y as usize * width + x as usize;
      for c in 0..3 {
        let src = if swap_rb { 2 - c } else { c };
        data[c * plane + idx] = pixel[src] as f32 * PIXEL_SCALE;
      }
    }

    InputTensor::new(width, height, data)
  }
}

fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  if image.dimensions() == (width, height) {
    return image.clone();
  }
  image::imageops::resize(image, width, height, FilterType::Triangle)
}
