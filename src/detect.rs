// 该文件是 Tanshang （探伤） 项目的一部分。
// src/detect.rs - 检测框、候选与检测结果
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

use crate::labels::{ClassList, DefectKind};

/// 帧坐标系下的检测框，左上角为原点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> i64 {
    self.width.max(0) as i64 * self.height.max(0) as i64
  }

  pub fn right(&self) -> i64 {
    self.x as i64 + self.width as i64
  }

  pub fn bottom(&self) -> i64 {
    self.y as i64 + self.height as i64
  }

  /// 交并比
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let x1 = (self.x as i64).max(other.x as i64);
    let y1 = (self.y as i64).max(other.y as i64);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let intersection = (x2 - x1).max(0) * (y2 - y1).max(0);
    let union = self.area() + other.area() - intersection;

    if union > 0 {
      intersection as f32 / union as f32
    } else {
      0.0
    }
  }
}

/// 解码后、抑制前的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BoundingBox,
  pub class_id: usize,
  /// 取自 objectness，而非类别分数
  pub confidence: f32,
}

/// 抑制后带标签的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub label: String,
  pub kind: DefectKind,
  pub confidence: f32,
}

impl Detection {
  pub fn from_candidate(candidate: &Candidate, classes: &ClassList) -> Self {
    let label = classes.label_or_unknown(candidate.class_id).to_string();
    Self {
      bbox: candidate.bbox,
      kind: DefectKind::from_label(&label),
      label,
      confidence: candidate.confidence,
    }
  }

  /// 叠加在框上方的文字
  pub fn caption(&self) -> String {
    format!("{}: {:.2}", self.label, self.confidence)
  }
}

/// 为抑制后的候选框附上标签，保持顺序
pub fn label_candidates(candidates: &[Candidate], classes: &ClassList) -> Vec<Detection> {
  candidates
    .iter()
    .map(|candidate| Detection::from_candidate(candidate, classes))
    .collect()
}

mod decoder;
mod suppressor;

pub use self::decoder::Decoder;
pub use self::suppressor::Suppressor;
