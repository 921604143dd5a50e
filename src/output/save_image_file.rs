// 该文件是 Tanshang （探伤） 项目的一部分。
// src/output/save_image_file.rs - 保存最新一帧的快照
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, output::Render, pipeline::Inspection, url_path,
};

/// 每帧覆盖写同一个文件
#[derive(Debug)]
pub struct SaveImageFileOutput {
  path: PathBuf,
  saved: u64,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(url_path(uri)))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      saved: 0,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&mut self, frame: &Frame) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    frame.to_rgb_image().save(&self.path)?;
    self.saved += 1;

    debug!("保存第 {} 张快照到文件: {}", self.saved, self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&mut self, frame: &Frame, _result: &Inspection) -> Result<(), Self::Error> {
    self.save_image(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::annotate::{Annotation, Verdict};
  use image::{Rgb, RgbImage};

  fn empty_inspection() -> Inspection {
    Inspection {
      detections: Vec::new(),
      annotation: Annotation {
        verdict: Verdict::default(),
        texts: Vec::new(),
      },
    }
  }

  #[test]
  fn snapshot_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("latest.png");
    let mut output = SaveImageFileOutput::new(&path);

    let first = Frame::from(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
    output.render_result(&first, &empty_inspection()).unwrap();
    let second = Frame::from(RgbImage::from_pixel(6, 2, Rgb([1, 2, 3])));
    output.render_result(&second, &empty_inspection()).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (6, 2));
    assert_eq!(*saved.get_pixel(0, 0), Rgb([1, 2, 3]));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
