// 该文件是 Tanshang （探伤） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tanshang::{
  FromUrl,
  annotate::Annotator,
  input::InputWrapper,
  labels::ClassList,
  model::ReplayModel,
  output::{NullOutput, OutputWrapper, Render},
  pipeline::Inspector,
  task::{InspectionLoop, LoopSummary, QuitSignal},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!(
    "输出: {}",
    args
      .output
      .as_ref()
      .map(|url| url.to_string())
      .unwrap_or_else(|| "无".to_string())
  );

  // 资源加载失败直接退出，不进入采集
  let classes = ClassList::load(&args.labels)
    .with_context(|| format!("无法加载类别列表 {}", args.labels.display()))?;
  let model = ReplayModel::from_url(&args.model).context("无法加载模型")?;
  let annotator = match &args.font {
    Some(path) => Annotator::load_font(path)
      .with_context(|| format!("无法加载字体 {}", path.display()))?,
    None => Annotator::default(),
  };
  let inspector = Inspector::new(model, classes, args.inspect_config()).with_annotator(annotator);

  let input = InputWrapper::from_url(&args.input).context("无法打开输入源")?;
  let quit = QuitSignal::ctrlc()?;

  let summary = match &args.output {
    Some(url) => {
      let output = OutputWrapper::from_url(url).context("无法创建输出")?;
      run(&args, &inspector, input, output, quit)?
    }
    None => run(&args, &inspector, input, NullOutput, quit)?,
  };

  info!(
    "处理完成: {} 帧, 不合格 {} 帧",
    summary.processed, summary.rejected
  );
  Ok(())
}

fn run<O: Render>(
  args: &args::Args,
  inspector: &Inspector<ReplayModel>,
  input: InputWrapper,
  output: O,
  quit: QuitSignal,
) -> Result<LoopSummary> {
  InspectionLoop::new(inspector, input, output)
    .with_quit_signal(quit)
    .with_timeout(args.timeout())
    .with_max_frames(Some(args.max_frames))
    .with_transform(args.transform())
    .run()
}
