// 该文件是 Tanshang （探伤） 项目的一部分。
// src/model.rs - 模型接口与张量
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

/// 每行的固定前缀：cx, cy, w, h, objectness
pub const ROW_PREFIX: usize = 5;

/// 推理后端。前向计算对流水线是不透明的：张量进，张量出。
pub trait Model {
  type Error;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量形状不支持: {0:?}")]
  UnsupportedShape(Vec<usize>),
  #[error("张量数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("每行至少需要 {min} 列, 实际 {actual} 列")]
  TooFewColumns { min: usize, actual: usize },
}

/// NCHW 浮点输入张量，形状 (1, 3, H, W)
#[derive(Debug, Clone)]
pub struct InputTensor {
  shape: [usize; 4],
  data: Box<[f32]>,
}

impl InputTensor {
  pub(crate) fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), 3 * width * height);
    Self {
      shape: [1, 3, height, width],
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn width(&self) -> usize {
    self.shape[3]
  }

  pub fn height(&self) -> usize {
    self.shape[2]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 读取 (c, y, x) 处的值
  pub fn at(&self, c: usize, y: usize, x: usize) -> f32 {
    let (h, w) = (self.height(), self.width());
    self.data[c * h * w + y * w + x]
  }
}

/// 检测网络输出：num_candidates 行，每行 5 + num_classes 列
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  columns: usize,
  data: Box<[f32]>,
}

impl OutputTensor {
  /// 接受 (N, C) 或 (1, N, C) 形状
  pub fn from_shape(shape: &[usize], data: Vec<f32>) -> Result<Self, TensorError> {
    let (rows, columns) = match shape {
      [rows, columns] => (*rows, *columns),
      [1, rows, columns] => (*rows, *columns),
      _ => return Err(TensorError::UnsupportedShape(shape.to_vec())),
    };

    if columns <= ROW_PREFIX {
      return Err(TensorError::TooFewColumns {
        min: ROW_PREFIX + 1,
        actual: columns,
      });
    }

    let expected = rows * columns;
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      columns,
      data: data.into_boxed_slice(),
    })
  }

  pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, TensorError> {
    let columns = rows.first().map(Vec::len).unwrap_or(ROW_PREFIX + 1);
    let num_rows = rows.len();
    let mut data = Vec::with_capacity(num_rows * columns);
    for row in rows {
      if row.len() != columns {
        return Err(TensorError::LengthMismatch {
          expected: columns,
          actual: row.len(),
        });
      }
      data.extend(row);
    }
    Self::from_shape(&[num_rows, columns], data)
  }

  pub fn num_rows(&self) -> usize {
    self.data.len() / self.columns
  }

  pub fn num_classes(&self) -> usize {
    self.columns - ROW_PREFIX
  }

  pub fn rows(&self) -> std::slice::ChunksExact<'_, f32> {
    self.data.chunks_exact(self.columns)
  }
}

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError};
