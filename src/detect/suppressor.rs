// 该文件是 Tanshang （探伤） 项目的一部分。
// src/detect/suppressor.rs - 非极大值抑制
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

use tracing::debug;

use crate::detect::Candidate;

pub const DEFAULT_NMS_THRESHOLD: f32 = 0.5;

/// 贪心 NMS。默认不区分类别，所有候选框一起抑制。
#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
  nms_threshold: f32,
  per_class: bool,
}

impl Default for Suppressor {
  fn default() -> Self {
    Self::new(DEFAULT_NMS_THRESHOLD, false)
  }
}

impl Suppressor {
  pub fn new(nms_threshold: f32, per_class: bool) -> Self {
    Self {
      nms_threshold,
      per_class,
    }
  }

  pub fn nms_threshold(&self) -> f32 {
    self.nms_threshold
  }

  pub fn per_class(&self) -> bool {
    self.per_class
  }

  /// 结果按选中顺序（置信度降序）排列
  pub fn suppress(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let total = candidates.len();

    // 稳定排序，置信度相同时保持输入顺序；total_cmp 对 NaN 也是全序
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
      let overlapped = kept
        .iter()
        .any(|best| self.competes(best, &candidate) && self.overlaps(best, &candidate));
      if !overlapped {
        kept.push(candidate);
      }
    }

    debug!(
      "NMS: {} -> {} (阈值 {}, 按类别: {})",
      total,
      kept.len(),
      self.nms_threshold,
      self.per_class
    );
    kept
  }

  fn competes(&self, a: &Candidate, b: &Candidate) -> bool {
    !self.per_class || a.class_id == b.class_id
  }

  fn overlaps(&self, a: &Candidate, b: &Candidate) -> bool {
    a.bbox.iou(&b.bbox) > self.nms_threshold
  }
}
