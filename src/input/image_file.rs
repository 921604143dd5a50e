// 该文件是 Tanshang （探伤） 项目的一部分。
// src/input/image_file.rs - 图像文件/目录输入
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

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{Acquisition, ImageSource},
  url_path,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("No image found in {0}")]
  NoImages(String),
}

/// 从单个图像文件或目录（按文件名排序）依次读取帧。
///
/// `image:///data/part.png`、`image:///data/frames?loop` 均可。
#[derive(Debug)]
pub struct ImageFileInput {
  paths: Vec<PathBuf>,
  cursor: usize,
  looping: bool,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let looping = url.query_pairs().any(|(k, _)| k == "loop");
    Self::open(url_path(url), looping)
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let paths = if path.is_dir() {
      let mut paths = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image(p))
        .collect::<Vec<_>>();
      paths.sort();
      paths
    } else {
      // 提前检查文件存在
      std::fs::metadata(path)?;
      vec![path.to_path_buf()]
    };

    if paths.is_empty() {
      return Err(ImageFileInputError::NoImages(path.display().to_string()));
    }

    info!("图像输入: {} 个文件, 循环: {}", paths.len(), looping);
    Ok(Self {
      paths,
      cursor: 0,
      looping,
    })
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  fn next_path(&mut self) -> Option<PathBuf> {
    if self.cursor >= self.paths.len() {
      if !self.looping {
        return None;
      }
      self.cursor = 0;
    }
    let path = self.paths[self.cursor].clone();
    self.cursor += 1;
    Some(path)
  }
}

impl ImageSource for ImageFileInput {
  type Error = ImageFileInputError;

  fn acquire(&mut self, _timeout: Duration) -> Result<Acquisition, Self::Error> {
    let Some(path) = self.next_path() else {
      debug!("图像输入已耗尽");
      return Ok(Acquisition::Closed);
    };

    // 单个文件损坏只跳过这一帧
    let decoded = ImageReader::open(&path)?
      .with_guessed_format()?
      .decode();
    match decoded {
      Ok(image) => {
        debug!("读取图像: {}", path.display());
        Ok(Acquisition::Frame(into_frame(image)))
      }
      Err(e) => {
        warn!("无法解码图像 {}: {}", path.display(), e);
        Ok(Acquisition::Incomplete {
          reason: format!("{}: {}", path.display(), e),
        })
      }
    }
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    })
    .unwrap_or(false)
}

/// 灰度图保持单通道，其余转为 RGB
fn into_frame(image: DynamicImage) -> Frame {
  match image {
    DynamicImage::ImageLuma8(gray) => Frame::Gray(gray),
    other if other.color().channel_count() <= 2 => Frame::Gray(other.to_luma8()),
    other => Frame::from(other.to_rgb8()),
  }
}
