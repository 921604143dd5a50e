// 该文件是 Tanshang （探伤） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use tanshang::{
  frame::{FrameSize, FrameTransform, Rotation},
  pipeline::InspectConfig,
  preprocess::{INPUT_HEIGHT, INPUT_WIDTH},
};

/// 表面缺陷（凹坑/斑点）在线检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 replay:///models/line-3.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源，例如 image:///data/frames?loop 或 gst://camera/dev/video0?format=GRAY8
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出，例如 image:///tmp/latest.png 或 gst://display
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 类别列表文件，每行一个类别名
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 绘制文字用的字体文件 (TTF/OTF)，默认使用内嵌字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 目标置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 类别分数阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub class_threshold: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 只在同一类别内做 NMS
  #[arg(long)]
  pub per_class_nms: bool,

  /// 单次采集超时（毫秒）
  #[arg(long, default_value_t = 1000, value_name = "MILLISECONDS")]
  pub timeout_ms: u64,

  /// 检测前把每帧缩放到指定尺寸，例如 1000x600
  #[arg(long, value_name = "WxH")]
  pub resize: Option<FrameSize>,

  /// 缩放后顺时针旋转角度 (0/90/180/270)
  #[arg(long, default_value = "0", value_name = "DEGREES")]
  pub rotate: Rotation,

  /// 最大处理帧数，0 表示无限制
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: u64,
}

impl Args {
  pub fn inspect_config(&self) -> InspectConfig {
    InspectConfig {
      confidence_threshold: self.confidence,
      class_threshold: self.class_threshold,
      nms_threshold: self.nms_threshold,
      per_class_nms: self.per_class_nms,
      input_width: INPUT_WIDTH,
      input_height: INPUT_HEIGHT,
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn transform(&self) -> FrameTransform {
    FrameTransform::new(self.resize, self.rotate)
  }
}
