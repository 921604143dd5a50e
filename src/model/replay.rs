// 该文件是 Tanshang （探伤） 项目的一部分。
// src/model/replay.rs - 回放录制的网络输出
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{InputTensor, Model, OutputTensor, TensorError},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("输出文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("输出张量无效: {0}")]
  TensorError(#[from] TensorError),
}

/// 对每一帧都返回同一份录制输出的模型。
///
/// 文件内容为 JSON 二维数组，每个元素是一行
/// `[cx, cy, w, h, objectness, class_score_0, ...]`。
#[derive(Debug, Clone)]
pub struct ReplayModel {
  output: OutputTensor,
}

impl ReplayModel {
  pub fn new(output: OutputTensor) -> Self {
    Self { output }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayModelError> {
    let path = path.as_ref();
    info!("加载录制输出: {}", path.display());
    let bytes = std::fs::read(path)?;
    let rows: Vec<Vec<f32>> = serde_json::from_slice(&bytes)?;
    let output = OutputTensor::from_rows(rows)?;
    debug!(
      "录制输出: {} 行, {} 个类别",
      output.num_rows(),
      output.num_classes()
    );
    Ok(Self { output })
  }
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayModelError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::load(url_path(url))
  }
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    debug!("回放输出, 输入形状 {:?}", input.shape());
    Ok(self.output.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn loads_rows_from_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      "[[320, 320, 64, 64, 0.9, 0.8, 0.1], [10, 10, 4, 4, 0.2, 0.1, 0.9]]"
    )
    .unwrap();

    let model = ReplayModel::load(file.path()).unwrap();
    let input = InputTensor::new(2, 2, vec![0.0; 12]);
    let output = model.infer(&input).unwrap();
    assert_eq!(output.num_rows(), 2);
    assert_eq!(output.num_classes(), 2);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("file:///tmp/out.json").unwrap();
    assert!(matches!(
      ReplayModel::from_url(&url),
      Err(ReplayModelError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn rejects_malformed_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"rows\": 1}}").unwrap();
    assert!(matches!(
      ReplayModel::load(file.path()),
      Err(ReplayModelError::ParseError(_))
    ));
  }
}
