// 该文件是 Tanshang （探伤） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  annotate::{Annotation, Annotator},
  detect::{Decoder, Detection, Suppressor, label_candidates},
  frame::{Frame, FrameError},
  labels::ClassList,
  model::Model,
  preprocess::{INPUT_HEIGHT, INPUT_WIDTH, Preprocessor},
};

/// 阈值与抑制策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InspectConfig {
  pub confidence_threshold: f32,
  pub class_threshold: f32,
  pub nms_threshold: f32,
  pub per_class_nms: bool,
  pub input_width: u32,
  pub input_height: u32,
}

impl Default for InspectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.5,
      class_threshold: 0.5,
      nms_threshold: 0.5,
      per_class_nms: false,
      input_width: INPUT_WIDTH,
      input_height: INPUT_HEIGHT,
    }
  }
}

#[derive(Error, Debug)]
pub enum InspectError<E> {
  #[error("{0}")]
  InvalidFrame(#[from] FrameError),
  #[error("推理失败: {0}")]
  Inference(E),
}

/// 一帧的检测结果
#[derive(Debug, Clone)]
pub struct Inspection {
  pub detections: Vec<Detection>,
  pub annotation: Annotation,
}

/// 进程级的只读句柄：模型、类别列表和各阶段，启动时构建一次
pub struct Inspector<M> {
  model: M,
  classes: ClassList,
  preprocessor: Preprocessor,
  decoder: Decoder,
  suppressor: Suppressor,
  annotator: Annotator,
}

impl<M: Model> Inspector<M> {
  pub fn new(model: M, classes: ClassList, config: InspectConfig) -> Self {
    info!(
      "检测配置: 置信度 {}, 类别 {}, NMS {}, 按类别抑制 {}, 输入 {}x{}",
      config.confidence_threshold,
      config.class_threshold,
      config.nms_threshold,
      config.per_class_nms,
      config.input_width,
      config.input_height
    );

    Self {
      model,
      classes,
      preprocessor: Preprocessor::new(config.input_width, config.input_height),
      decoder: Decoder::new(config.confidence_threshold, config.class_threshold),
      suppressor: Suppressor::new(config.nms_threshold, config.per_class_nms),
      annotator: Annotator::default(),
    }
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn classes(&self) -> &ClassList {
    &self.classes
  }

  /// 预处理、推理、解码与抑制，不修改帧
  pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InspectError<M::Error>> {
    let (tensor, scale) = self.preprocessor.preprocess(frame)?;

    let now = Instant::now();
    let output = self
      .model
      .infer(&tensor)
      .map_err(InspectError::Inference)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let candidates = self.decoder.decode(&output, scale);
    let survivors = self.suppressor.suppress(candidates);
    Ok(label_candidates(&survivors, &self.classes))
  }

  /// 完整流水线，帧被原地绘制
  pub fn inspect(&self, frame: &mut Frame) -> Result<Inspection, InspectError<M::Error>> {
    let detections = self.detect(frame)?;
    let annotation = self.annotator.annotate(frame, &detections);
    Ok(Inspection {
      detections,
      annotation,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    annotate::{RESULT_NOT_OK, RESULT_OK},
    model::{InputTensor, OutputTensor},
  };
  use image::{GrayImage, RgbImage};

  struct FixedModel(OutputTensor);

  impl Model for FixedModel {
    type Error = std::convert::Infallible;

    fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
      assert_eq!(input.shape(), [1, 3, 640, 640]);
      Ok(self.0.clone())
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Error = String;

    fn infer(&self, _input: &InputTensor) -> Result<OutputTensor, Self::Error> {
      Err("npu offline".to_string())
    }
  }

  fn inspector(rows: Vec<Vec<f32>>) -> Inspector<FixedModel> {
    let output = OutputTensor::from_rows(rows).unwrap();
    Inspector::new(
      FixedModel(output),
      ClassList::new(["Dent", "Spot"]),
      InspectConfig::default(),
    )
  }

  #[test]
  fn overlapping_rows_collapse_to_best() {
    let inspector = inspector(vec![
      vec![320.0, 320.0, 64.0, 64.0, 0.9, 0.8, 0.1],
      vec![322.0, 322.0, 64.0, 64.0, 0.6, 0.1, 0.8],
      vec![100.0, 100.0, 20.0, 20.0, 0.4, 0.9, 0.1],
    ]);
    let mut frame = Frame::from(RgbImage::new(1280, 960));
    let inspection = inspector.inspect(&mut frame).unwrap();

    assert_eq!(inspection.detections.len(), 1);
    let dent = &inspection.detections[0];
    assert_eq!(dent.label, "Dent");
    assert_eq!(dent.confidence, 0.9);
    assert!(inspection.annotation.has_text(RESULT_NOT_OK));
    assert!(
      inspection
        .annotation
        .has_text("Dent Count: 1 | Spot Count: 0")
    );
  }

  #[test]
  fn no_rows_is_ok() {
    let inspector = inspector(Vec::new());
    let mut frame = Frame::from(RgbImage::new(320, 240));
    let inspection = inspector.inspect(&mut frame).unwrap();
    assert!(inspection.detections.is_empty());
    assert!(inspection.annotation.has_text(RESULT_OK));
  }

  #[test]
  fn gray_frame_comes_out_colored() {
    let inspector = inspector(vec![vec![320.0, 320.0, 64.0, 64.0, 0.9, 0.1, 0.8]]);
    let mut frame = Frame::from(GrayImage::new(800, 600));
    let inspection = inspector.inspect(&mut frame).unwrap();

    assert_eq!(frame.channels(), 3);
    assert_eq!((frame.width(), frame.height()), (800, 600));
    assert_eq!(inspection.annotation.verdict.spot_count, 1);
  }

  #[test]
  fn invalid_frame_is_reported() {
    let inspector = inspector(Vec::new());
    let mut frame = Frame::from(RgbImage::new(0, 0));
    assert!(matches!(
      inspector.inspect(&mut frame),
      Err(InspectError::InvalidFrame(_))
    ));
  }

  #[test]
  fn inference_errors_are_wrapped() {
    let inspector = Inspector::new(
      FailingModel,
      ClassList::new(["Dent"]),
      InspectConfig::default(),
    );
    let mut frame = Frame::from(RgbImage::new(64, 64));
    match inspector.inspect(&mut frame) {
      Err(InspectError::Inference(message)) => assert_eq!(message, "npu offline"),
      other => panic!("unexpected result: {:?}", other.map(|i| i.detections)),
    }
  }
}
