// 该文件是 Tanshang （探伤） 项目的一部分。
// src/detect/decoder.rs - 网络输出解码
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

use tracing::{debug, trace};

use crate::{
  detect::{BoundingBox, Candidate},
  model::{OutputTensor, ROW_PREFIX},
  preprocess::ScaleFactors,
};

const OBJECTNESS_INDEX: usize = 4;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct Decoder {
  /// objectness 阈值（严格大于才保留）
  confidence_threshold: f32,
  /// 类别分数阈值（严格大于才保留）
  class_threshold: f32,
}

impl Default for Decoder {
  fn default() -> Self {
    Self::new(DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

impl Decoder {
  pub fn new(confidence_threshold: f32, class_threshold: f32) -> Self {
    Self {
      confidence_threshold,
      class_threshold,
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn class_threshold(&self) -> f32 {
    self.class_threshold
  }

  pub fn decode(&self, output: &OutputTensor, scale: ScaleFactors) -> Vec<Candidate> {
    let candidates: Vec<Candidate> = output
      .rows()
      .filter_map(|row| self.decode_row(row, scale))
      .collect();

    debug!(
      "解码 {} 行, 保留 {} 个候选框",
      output.num_rows(),
      candidates.len()
    );
    candidates
  }

  fn decode_row(&self, row: &[f32], scale: ScaleFactors) -> Option<Candidate> {
    let objectness = row[OBJECTNESS_INDEX];
    // 写成取反形式，NaN 同样被丢弃
    if !(objectness > self.confidence_threshold) {
      return None;
    }

    let (class_id, class_score) = argmax(&row[ROW_PREFIX..])?;
    if !(class_score > self.class_threshold) {
      return None;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);

    // `as i32` 向零截断，不做四舍五入
    let bbox = BoundingBox::new(
      ((cx - w / 2.0) * scale.x_scale) as i32,
      ((cy - h / 2.0) * scale.y_scale) as i32,
      (w * scale.x_scale) as i32,
      (h * scale.y_scale) as i32,
    );

    if bbox.width <= 0 || bbox.height <= 0 {
      trace!("丢弃尺寸无效的候选框: {:?}", bbox);
      return None;
    }

    Some(Candidate {
      bbox,
      class_id,
      confidence: objectness,
    })
  }
}

/// 首个最大值的位置，分数相同时取编号最小者
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((idx, score)),
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  const UNIT: ScaleFactors = ScaleFactors {
    x_scale: 1.0,
    y_scale: 1.0,
  };

  fn tensor(rows: Vec<Vec<f32>>) -> OutputTensor {
    OutputTensor::from_rows(rows).unwrap()
  }

  #[test]
  fn objectness_at_threshold_is_discarded() {
    let decoder = Decoder::default();
    let at = tensor(vec![vec![100.0, 100.0, 10.0, 10.0, 0.5, 0.9, 0.1]]);
    assert!(decoder.decode(&at, UNIT).is_empty());

    let above = tensor(vec![vec![100.0, 100.0, 10.0, 10.0, 0.5 + 1e-6, 0.9, 0.1]]);
    assert_eq!(decoder.decode(&above, UNIT).len(), 1);
  }

  #[test]
  fn class_score_at_threshold_is_discarded() {
    let decoder = Decoder::default();
    let rows = tensor(vec![vec![100.0, 100.0, 10.0, 10.0, 0.9, 0.5, 0.2]]);
    assert!(decoder.decode(&rows, UNIT).is_empty());
  }

  #[test]
  fn thresholds_are_independent() {
    let decoder = Decoder::new(0.5, 0.2);
    let rows = tensor(vec![vec![100.0, 100.0, 10.0, 10.0, 0.9, 0.3, 0.1]]);
    assert_eq!(decoder.decode(&rows, UNIT).len(), 1);

    let decoder = Decoder::new(0.95, 0.2);
    assert!(decoder.decode(&rows, UNIT).is_empty());
  }

  #[test]
  fn boxes_are_scaled_and_truncated() {
    let scale = ScaleFactors {
      x_scale: 2.0,
      y_scale: 1.5,
    };
    let rows = tensor(vec![vec![320.0, 320.0, 64.0, 64.0, 0.9, 0.8, 0.1]]);
    let candidates = Decoder::default().decode(&rows, scale);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].bbox, BoundingBox::new(576, 432, 128, 96));

    let rows = tensor(vec![vec![10.9, 10.9, 3.9, 3.9, 0.9, 0.8, 0.1]]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    // (10.9 - 1.95) = 8.95 -> 8, 3.9 -> 3
    assert_eq!(candidates[0].bbox, BoundingBox::new(8, 8, 3, 3));
  }

  #[test]
  fn negative_corner_truncates_toward_zero() {
    let rows = tensor(vec![vec![1.0, 1.0, 5.0, 5.0, 0.9, 0.8, 0.1]]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    // 1 - 2.5 = -1.5 -> -1
    assert_eq!(candidates[0].bbox, BoundingBox::new(-1, -1, 5, 5));
  }

  #[test]
  fn confidence_is_objectness() {
    let rows = tensor(vec![vec![50.0, 50.0, 10.0, 10.0, 0.7, 0.99, 0.1]]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    assert_eq!(candidates[0].confidence, 0.7);
  }

  #[test]
  fn argmax_ties_pick_first_class() {
    let rows = tensor(vec![vec![
      50.0, 50.0, 10.0, 10.0, 0.9, 0.7, 0.7, 0.3,
    ]]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    assert_eq!(candidates[0].class_id, 0);

    let rows = tensor(vec![vec![
      50.0, 50.0, 10.0, 10.0, 0.9, 0.3, 0.7, 0.7,
    ]]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn nan_scores_are_discarded() {
    let rows = tensor(vec![
      vec![50.0, 50.0, 10.0, 10.0, f32::NAN, 0.8, 0.1],
      vec![50.0, 50.0, 10.0, 10.0, 0.9, f32::NAN, f32::NAN],
    ]);
    assert!(Decoder::default().decode(&rows, UNIT).is_empty());
  }

  #[test]
  fn degenerate_boxes_are_dropped() {
    let rows = tensor(vec![vec![50.0, 50.0, 0.5, 10.0, 0.9, 0.8, 0.1]]);
    assert!(Decoder::default().decode(&rows, UNIT).is_empty());
  }

  #[test]
  fn every_row_is_considered() {
    let rows = tensor(vec![
      vec![50.0, 50.0, 10.0, 10.0, 0.1, 0.8, 0.1],
      vec![150.0, 50.0, 10.0, 10.0, 0.9, 0.1, 0.8],
      vec![250.0, 50.0, 10.0, 10.0, 0.6, 0.8, 0.1],
    ]);
    let candidates = Decoder::default().decode(&rows, UNIT);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].class_id, 1);
    assert_eq!(candidates[1].class_id, 0);
  }
}
