// 该文件是 Tanshang （探伤） 项目的一部分。
// src/labels.rs - 类别列表与缺陷种类
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
use tracing::{debug, info};

pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取类别文件 {path}: {source}")]
  IoError {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("类别文件为空: {0}")]
  Empty(String),
}

/// 按类别编号排列的标签，启动时加载一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassList {
  labels: Box<[String]>,
}

impl ClassList {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 每行一个标签，去掉首尾空白，行号即类别编号。
  /// 末尾的空行不计入类别，中间的空行保留以免编号错位。
  pub fn parse(text: &str) -> Self {
    let mut labels: Vec<&str> = text.lines().map(str::trim).collect();
    while labels.last().is_some_and(|label| label.is_empty()) {
      labels.pop();
    }
    Self::new(labels)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::IoError {
      path: path.display().to_string(),
      source,
    })?;

    let classes = Self::parse(&text);
    if classes.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }

    info!("加载了 {} 个类别: {}", classes.len(), path.display());
    debug!("类别列表: {:?}", classes.labels);
    Ok(classes)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  pub fn label_or_unknown(&self, class_id: usize) -> &str {
    self.get(class_id).unwrap_or(UNKNOWN_LABEL)
  }
}

/// 缺陷种类。新增种类只需在此处加一个变体和它的配色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
  Dent,
  Spot,
}

impl DefectKind {
  pub const ALL: [DefectKind; 2] = [DefectKind::Dent, DefectKind::Spot];

  /// 按标签精确匹配，未列出的标签都归入 Spot
  pub fn from_label(label: &str) -> Self {
    Self::ALL
      .into_iter()
      .find(|kind| kind.label() == label)
      .unwrap_or(DefectKind::Spot)
  }

  pub fn label(&self) -> &'static str {
    match self {
      DefectKind::Dent => "Dent",
      DefectKind::Spot => "Spot",
    }
  }

  /// 边框颜色（RGB）
  pub fn box_color(&self) -> [u8; 3] {
    match self {
      DefectKind::Dent => [255, 0, 0],
      DefectKind::Spot => [50, 0, 255],
    }
  }

  /// 标签文字颜色（RGB）
  pub fn text_color(&self) -> [u8; 3] {
    match self {
      DefectKind::Dent => [20, 0, 255],
      DefectKind::Spot => [255, 0, 255],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parse_trims_and_keeps_order() {
    let classes = ClassList::parse("Dent \r\n  Spot\n");
    assert_eq!(classes.len(), 2);
    assert_eq!(classes.get(0), Some("Dent"));
    assert_eq!(classes.get(1), Some("Spot"));
    assert_eq!(classes.get(2), None);
    assert_eq!(classes.label_or_unknown(7), UNKNOWN_LABEL);
  }

  #[test]
  fn trailing_blank_lines_are_dropped() {
    let classes = ClassList::parse("Dent\n\nSpot\n\n  \n");
    assert_eq!(classes.len(), 3);
    assert_eq!(classes.get(1), Some(""));
    assert!(ClassList::parse("\n\n").is_empty());
  }

  #[test]
  fn load_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Dent").unwrap();
    writeln!(file, "Spot").unwrap();
    let classes = ClassList::load(file.path()).unwrap();
    assert_eq!(classes, ClassList::new(["Dent", "Spot"]));
  }

  #[test]
  fn load_rejects_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(
      ClassList::load(file.path()),
      Err(LabelError::Empty(_))
    ));
  }

  #[test]
  fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("sona.names");
    assert!(matches!(
      ClassList::load(&missing),
      Err(LabelError::IoError { .. })
    ));
  }

  #[test]
  fn kinds_match_labels_exactly() {
    assert_eq!(DefectKind::from_label("Dent"), DefectKind::Dent);
    assert_eq!(DefectKind::from_label("dent"), DefectKind::Spot);
    assert_eq!(DefectKind::from_label("Scratch"), DefectKind::Spot);
    assert_ne!(
      DefectKind::Dent.box_color(),
      DefectKind::Spot.box_color()
    );
  }
}
