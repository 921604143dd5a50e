// 该文件是 Tanshang （探伤） 项目的一部分。
// src/annotate.rs - 检测结果绘制与判定
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  detect::{BoundingBox, Detection},
  frame::{ChannelOrder, Frame, pixel_in_order},
  labels::DefectKind,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 24.0;
const COUNT_FONT_SIZE: f32 = 18.0;
const BOX_THICKNESS: i32 = 2;
const LABEL_BASELINE_OFFSET: i32 = 2;
const VERDICT_HALF_WIDTH: i32 = 120;
const VERDICT_BASELINE_Y: i32 = 40;
const COUNT_ANCHOR: (i32, i32) = (20, 50);

const OK_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const NOT_OK_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const COUNT_COLOR: [u8; 3] = [255, 255, 255]; // 白色

// DejaVu Sans，许可见 assets/FONT-LICENSE.txt
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/font.ttf");

pub const RESULT_OK: &str = "Result OK";
pub const RESULT_NOT_OK: &str = "Result NotOK";

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 每帧的判定结果，由检测列表推导
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
  pub dent_count: usize,
  pub spot_count: usize,
}

impl Verdict {
  pub fn from_detections(detections: &[Detection]) -> Self {
    detections
      .iter()
      .fold(Verdict::default(), |mut verdict, detection| {
        match detection.kind {
          DefectKind::Dent => verdict.dent_count += 1,
          DefectKind::Spot => verdict.spot_count += 1,
        }
        verdict
      })
  }

  pub fn count(&self, kind: DefectKind) -> usize {
    match kind {
      DefectKind::Dent => self.dent_count,
      DefectKind::Spot => self.spot_count,
    }
  }

  pub fn total(&self) -> usize {
    self.dent_count + self.spot_count
  }

  /// 没有任何缺陷时为合格
  pub fn is_ok(&self) -> bool {
    self.total() == 0
  }

  pub fn headline(&self) -> &'static str {
    if self.is_ok() { RESULT_OK } else { RESULT_NOT_OK }
  }

  pub fn count_line(&self) -> Option<String> {
    (!self.is_ok()).then(|| {
      format!(
        "Dent Count: {} | Spot Count: {}",
        self.dent_count, self.spot_count
      )
    })
  }
}

/// 一条文字叠加，anchor 为基线左端点
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
  pub text: String,
  pub anchor: (i32, i32),
  pub color: [u8; 3],
  pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub verdict: Verdict,
  pub texts: Vec<TextOverlay>,
}

impl Annotation {
  pub fn has_text(&self, text: &str) -> bool {
    self.texts.iter().any(|overlay| overlay.text == text)
  }
}

/// 在帧上绘制检测框、标签和判定结果。
///
/// 默认使用内嵌字体，`load_font` 可替换为其他 TTF/OTF 字体。
#[derive(Clone)]
pub struct Annotator {
  font: FontArc,
}

impl Default for Annotator {
  fn default() -> Self {
    let font = FontArc::try_from_slice(EMBEDDED_FONT).expect("无法加载嵌入的字体文件");
    Self::with_font(font)
  }
}

impl std::fmt::Debug for Annotator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Annotator").finish_non_exhaustive()
  }
}

impl Annotator {
  pub fn with_font(font: FontArc) -> Self {
    Self { font }
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.display());
    Ok(Self::with_font(font))
  }

  pub fn annotate(&self, frame: &mut Frame, detections: &[Detection]) -> Annotation {
    let (image, order) = frame.color_mut();
    let mut texts = Vec::with_capacity(detections.len() + 2);

    for detection in detections {
      let kind = detection.kind;
      draw_box(image, &detection.bbox, pixel_in_order(kind.box_color(), order));
      texts.push(TextOverlay {
        text: detection.caption(),
        anchor: (
          detection.bbox.x,
          detection.bbox.y - LABEL_BASELINE_OFFSET,
        ),
        color: kind.text_color(),
        size: LABEL_FONT_SIZE,
      });
    }

    let verdict = Verdict::from_detections(detections);
    let verdict_anchor = (
      image.width() as i32 / 2 - VERDICT_HALF_WIDTH,
      VERDICT_BASELINE_Y,
    );
    texts.push(TextOverlay {
      text: verdict.headline().to_string(),
      anchor: verdict_anchor,
      color: if verdict.is_ok() { OK_COLOR } else { NOT_OK_COLOR },
      size: LABEL_FONT_SIZE,
    });
    if let Some(count_line) = verdict.count_line() {
      texts.push(TextOverlay {
        text: count_line,
        anchor: COUNT_ANCHOR,
        color: COUNT_COLOR,
        size: COUNT_FONT_SIZE,
      });
    }

    for overlay in &texts {
      draw_overlay(image, order, &self.font, overlay);
    }

    debug!(
      "绘制 {} 个检测框, 判定: {}",
      detections.len(),
      verdict.headline()
    );

    Annotation { verdict, texts }
  }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
  for t in 0..BOX_THICKNESS {
    let width = bbox.width - 2 * t;
    let height = bbox.height - 2 * t;
    if width <= 0 || height <= 0 {
      break;
    }
    let rect = Rect::at(bbox.x + t, bbox.y + t).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}

fn draw_overlay(image: &mut RgbImage, order: ChannelOrder, font: &FontArc, overlay: &TextOverlay) {
  let (x, baseline) = overlay.anchor;
  // draw_text_mut 以文字顶端定位
  let top = baseline - overlay.size as i32;
  draw_text_mut(
    image,
    pixel_in_order(overlay.color, order),
    x,
    top,
    PxScale::from(overlay.size),
    font,
    &overlay.text,
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::labels::ClassList;
  use image::GrayImage;

  fn detection(label: &str, bbox: BoundingBox, confidence: f32) -> Detection {
    Detection {
      bbox,
      label: label.to_string(),
      kind: DefectKind::from_label(label),
      confidence,
    }
  }

  #[test]
  fn empty_detections_are_ok() {
    let mut frame = Frame::from(RgbImage::new(640, 480));
    let annotation = Annotator::default().annotate(&mut frame, &[]);

    assert!(annotation.verdict.is_ok());
    assert!(annotation.has_text(RESULT_OK));
    assert!(!annotation.has_text(RESULT_NOT_OK));
    assert!(
      !annotation
        .texts
        .iter()
        .any(|overlay| overlay.text.starts_with("Dent Count"))
    );
    assert_eq!(annotation.texts[0].anchor, (200, 40));
    assert_eq!(annotation.texts[0].color, OK_COLOR);
  }

  #[test]
  fn one_dent_is_not_ok() {
    let mut frame = Frame::from(RgbImage::new(640, 480));
    let dent = detection("Dent", BoundingBox::new(10, 20, 30, 40), 0.91);
    let annotation = Annotator::default().annotate(&mut frame, &[dent]);

    assert_eq!(
      annotation.verdict,
      Verdict {
        dent_count: 1,
        spot_count: 0
      }
    );
    assert!(annotation.has_text(RESULT_NOT_OK));
    assert!(annotation.has_text("Dent Count: 1 | Spot Count: 0"));
    assert!(annotation.has_text("Dent: 0.91"));

    let label = &annotation.texts[0];
    assert_eq!(label.anchor, (10, 18));
    assert_eq!(label.color, DefectKind::Dent.text_color());
  }

  #[test]
  fn other_labels_count_as_spots() {
    let mut frame = Frame::from(RgbImage::new(100, 100));
    let detections = [
      detection("Spot", BoundingBox::new(1, 1, 10, 10), 0.8),
      detection("Scratch", BoundingBox::new(50, 50, 10, 10), 0.7),
      detection("Dent", BoundingBox::new(20, 20, 10, 10), 0.6),
    ];
    let annotation = Annotator::default().annotate(&mut frame, &detections);
    assert!(annotation.has_text("Dent Count: 1 | Spot Count: 2"));
  }

  #[test]
  fn boxes_use_kind_colors() {
    // 框放在判定文字下方，避免与文字重叠
    let mut frame = Frame::from(RgbImage::new(400, 400));
    let detections = [
      detection("Dent", BoundingBox::new(10, 200, 20, 20), 0.9),
      detection("Spot", BoundingBox::new(260, 260, 20, 20), 0.9),
    ];
    Annotator::default().annotate(&mut frame, &detections);

    let image = frame.to_rgb_image();
    assert_eq!(*image.get_pixel(10, 205), Rgb(DefectKind::Dent.box_color()));
    assert_eq!(*image.get_pixel(11, 205), Rgb(DefectKind::Dent.box_color()));
    assert_eq!(*image.get_pixel(260, 270), Rgb(DefectKind::Spot.box_color()));
    assert_eq!(*image.get_pixel(20, 210), Rgb([0, 0, 0]));
  }

  #[test]
  fn bgr_frames_get_swapped_colors() {
    let mut frame = Frame::Color {
      image: RgbImage::new(200, 200),
      order: ChannelOrder::Bgr,
    };
    let dent = detection("Dent", BoundingBox::new(5, 150, 20, 20), 0.9);
    Annotator::default().annotate(&mut frame, &[dent]);
    assert_eq!(
      *frame.to_rgb_image().get_pixel(5, 160),
      Rgb(DefectKind::Dent.box_color())
    );
  }

  #[test]
  fn verdict_text_is_drawn_with_embedded_font() {
    let mut frame = Frame::from(RgbImage::new(640, 480));
    Annotator::default().annotate(&mut frame, &[]);

    // "Result OK" 基线在 (200, 40)，字高 24
    let image = frame.to_rgb_image();
    let green = (200..360)
      .flat_map(|x| (10..45).map(move |y| (x, y)))
      .filter(|&(x, y)| {
        let pixel = image.get_pixel(x, y);
        pixel[1] > 0 && pixel[0] == 0 && pixel[2] == 0
      })
      .count();
    assert!(green > 0);
    // 文字区域之外保持原样
    assert_eq!(*image.get_pixel(320, 300), Rgb([0, 0, 0]));
  }

  #[test]
  fn font_file_overrides_embedded_font() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, EMBEDDED_FONT).unwrap();
    assert!(Annotator::load_font(&path).is_ok());

    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Annotator::load_font(&path),
      Err(FontError::InvalidFont(_))
    ));
    assert!(matches!(
      Annotator::load_font(dir.path().join("missing.ttf")),
      Err(FontError::IoError(_))
    ));
  }

  #[test]
  fn gray_frame_is_promoted_before_drawing() {
    let mut frame = Frame::from(GrayImage::new(64, 48));
    let classes = ClassList::new(["Dent", "Spot"]);
    let spot = Detection::from_candidate(
      &crate::detect::Candidate {
        bbox: BoundingBox::new(4, 4, 10, 10),
        class_id: 1,
        confidence: 0.7,
      },
      &classes,
    );
    Annotator::default().annotate(&mut frame, &[spot]);
    assert_eq!(frame.channels(), 3);
    assert_eq!((frame.width(), frame.height()), (64, 48));
  }

  #[test]
  fn boxes_outside_the_frame_are_clipped() {
    let mut frame = Frame::from(RgbImage::new(20, 20));
    let dent = detection("Dent", BoundingBox::new(-10, -10, 100, 100), 0.9);
    let annotation = Annotator::default().annotate(&mut frame, &[dent]);
    assert!(annotation.has_text("Dent: 0.90"));
  }
}
