// 该文件是 Tanshang （探伤） 项目的一部分。
// src/task.rs - 采集循环
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

//! 采集循环状态机：
//!
//! ```text
//! Running --(帧不完整/帧无效)--> Skipped --> Running
//! Running --(检测并输出)------> Processed --> Running
//! Running --(输入耗尽)--------> Closed --> Quit
//! Running --(中断/帧数上限)------------> Quit
//! Running --(采集/推理/输出故障)-------> Fault
//! ```
//!
//! 采集到的帧先经过 [`FrameTransform`]（可选的缩放与旋转）再进入检测。

use std::{
  sync::mpsc::{self, Receiver, Sender, TryRecvError},
  thread,
  time::{Duration, Instant},
};

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::{
  annotate::Verdict,
  frame::FrameTransform,
  input::{Acquisition, ImageSource},
  model::Model,
  output::Render,
  pipeline::{InspectError, Inspector},
};

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(1000);
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  Running,
  /// 正常退出，进程返回 0
  Quit,
  /// 故障退出，进程返回非 0
  Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
  Skipped,
  Processed(Verdict),
  /// 输入源已耗尽，本轮没有帧
  Closed,
}

/// 退出信号，每轮循环结束时检查一次
#[derive(Debug)]
pub struct QuitSignal {
  rx: Receiver<()>,
}

impl QuitSignal {
  pub fn channel() -> (Sender<()>, Self) {
    let (tx, rx) = mpsc::channel();
    (tx, Self { rx })
  }

  /// 安装 Ctrl-C 处理函数。收到信号后若循环迟迟不退出，强制结束进程。
  pub fn ctrlc() -> anyhow::Result<Self> {
    let (tx, signal) = Self::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(signal)
  }

  fn requested(&self) -> bool {
    match self.rx.try_recv() {
      Ok(()) => true,
      Err(TryRecvError::Empty) => false,
      // 发送端已释放，不会再有信号
      Err(TryRecvError::Disconnected) => false,
    }
  }
}

/// 循环结束时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
  pub processed: u64,
  pub skipped: u64,
  pub rejected: u64,
}

pub struct InspectionLoop<'a, M, S, O> {
  inspector: &'a Inspector<M>,
  source: S,
  output: O,
  quit: Option<QuitSignal>,
  transform: FrameTransform,
  timeout: Duration,
  max_frames: Option<u64>,
  state: LoopState,
  summary: LoopSummary,
}

impl<'a, M, S, O> InspectionLoop<'a, M, S, O>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  S: ImageSource,
  O: Render,
{
  pub fn new(inspector: &'a Inspector<M>, source: S, output: O) -> Self {
    Self {
      inspector,
      source,
      output,
      quit: None,
      transform: FrameTransform::default(),
      timeout: DEFAULT_ACQUIRE_TIMEOUT,
      max_frames: None,
      state: LoopState::Running,
      summary: LoopSummary::default(),
    }
  }

  pub fn with_quit_signal(mut self, quit: QuitSignal) -> Self {
    self.quit = Some(quit);
    self
  }

  pub fn with_transform(mut self, transform: FrameTransform) -> Self {
    self.transform = transform;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// `None` 或 `Some(0)` 表示不限制
  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames.filter(|n| *n > 0);
    self
  }

  pub fn state(&self) -> LoopState {
    self.state
  }

  pub fn summary(&self) -> LoopSummary {
    self.summary
  }

  /// 执行一轮。出错时状态转为 `Fault`。
  pub fn step(&mut self) -> anyhow::Result<FrameOutcome> {
    if self.state != LoopState::Running {
      return Err(anyhow!("循环已结束: {:?}", self.state));
    }

    let outcome = self.advance();
    match &outcome {
      Ok(FrameOutcome::Skipped) => self.summary.skipped += 1,
      Ok(FrameOutcome::Closed) => {}
      Ok(FrameOutcome::Processed(verdict)) => {
        self.summary.processed += 1;
        if !verdict.is_ok() {
          self.summary.rejected += 1;
        }
        if self.max_frames.is_some_and(|n| self.summary.processed >= n) {
          info!("达到指定帧数 {}, 退出任务循环", self.summary.processed);
          self.state = LoopState::Quit;
        }
      }
      Err(e) => {
        error!("采集循环故障: {:#}", e);
        self.state = LoopState::Fault;
      }
    }

    if self.state == LoopState::Running && self.quit.as_ref().is_some_and(QuitSignal::requested) {
      warn!("中断信号接收，退出任务循环");
      self.state = LoopState::Quit;
    }

    outcome
  }

  fn advance(&mut self) -> anyhow::Result<FrameOutcome> {
    let acquired = self
      .source
      .acquire(self.timeout)
      .map_err(|e| anyhow::Error::new(e).context("图像采集失败"))?;

    let mut frame = match acquired {
      Acquisition::Frame(frame) => self.transform.apply(frame),
      Acquisition::Incomplete { reason } => {
        warn!("帧不完整，跳过: {}", reason);
        return Ok(FrameOutcome::Skipped);
      }
      Acquisition::Closed => {
        info!("输入源已关闭");
        self.state = LoopState::Quit;
        return Ok(FrameOutcome::Closed);
      }
    };

    let now = Instant::now();
    let inspection = match self.inspector.inspect(&mut frame) {
      Ok(inspection) => inspection,
      Err(InspectError::InvalidFrame(e)) => {
        warn!("帧无效，跳过: {}", e);
        return Ok(FrameOutcome::Skipped);
      }
      Err(InspectError::Inference(e)) => {
        return Err(anyhow::Error::new(e).context("推理失败"));
      }
    };
    let elapsed_a = now.elapsed();

    self
      .output
      .render_result(&frame, &inspection)
      .map_err(|e| anyhow::Error::new(e).context("输出失败"))?;
    let elapsed_b = now.elapsed();

    let verdict = inspection.annotation.verdict;
    info!(
      "第 {} 帧: {}, 凹坑 {}, 斑点 {}, 耗时: {:.2?} / {:.2?}",
      self.summary.processed + 1,
      verdict.headline(),
      verdict.dent_count,
      verdict.spot_count,
      elapsed_a,
      elapsed_b
    );
    Ok(FrameOutcome::Processed(verdict))
  }

  /// 运行到 `Quit` 或 `Fault`。故障时返回导致故障的错误。
  pub fn run(mut self) -> anyhow::Result<LoopSummary> {
    info!("开始任务...");
    let mut fault = None;
    while self.state == LoopState::Running {
      if let Err(e) = self.step() {
        fault = Some(e);
      }
    }

    debug!("循环结束: {:?}, {:?}", self.state, self.summary);
    match fault {
      Some(e) => Err(e),
      None => {
        info!(
          "任务完成: 处理 {} 帧, 不合格 {} 帧, 跳过 {} 次",
          self.summary.processed, self.summary.rejected, self.summary.skipped
        );
        Ok(self.summary)
      }
    }
  }
}
