// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 后处理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{model::PostProcess, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 处理输入中的每一帧并渲染结果
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: PostProcess<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut frames = 0usize;
    for frame in input {
      let now = Instant::now();
      let result = model.process(&frame)?;
      info!("第 {} 帧后处理完成，耗时: {:.2?}", frames, now.elapsed());
      output.render_result(&frame, &result)?;
      frames += 1;
    }

    if frames == 0 {
      return Err(anyhow::anyhow!("没有输入帧"));
    }
    info!("任务完成，共处理 {} 帧", frames);
    Ok(())
  }
}

/// 对第一帧重复后处理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: PostProcess<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，重复后处理 {} 次...", self.repeat);

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.process(&frame)?;
      let elapsed = now.elapsed();
      info!("({})后处理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    // 前两次包含冷启动开销，不计入平均值
    let warm = if times.len() > 2 { &times[2..] } else { &times[..] };
    warn!(
      "平均后处理时间: {:.2?}",
      warm.iter().sum::<Duration>() / warm.len() as u32
    );

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};

  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("never")]
  struct Never;

  struct Doubler {
    calls: Cell<usize>,
  }

  impl PostProcess for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Never;

    fn process(&self, input: &u32) -> Result<u32, Never> {
      self.calls.set(self.calls.get() + 1);
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Collect {
    seen: RefCell<Vec<(u32, u32)>>,
  }

  impl Render<u32, u32> for &Collect {
    type Error = Never;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), Never> {
      self.seen.borrow_mut().push((*frame, *result));
      Ok(())
    }
  }

  #[test]
  fn one_shot_renders_every_frame() {
    let sink = Collect::default();
    let model = Doubler { calls: Cell::new(0) };
    OneShotTask.run_task(vec![1, 2, 3].into_iter(), model, &sink).unwrap();
    assert_eq!(*sink.seen.borrow(), vec![(1, 2), (2, 4), (3, 6)]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let sink = Collect::default();
    let model = Doubler { calls: Cell::new(0) };
    assert!(OneShotTask.run_task(std::iter::empty(), model, &sink).is_err());
  }

  #[test]
  fn repeat_shot_renders_once() {
    let sink = Collect::default();
    let model = Doubler { calls: Cell::new(0) };
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(vec![7, 8].into_iter(), &model, &sink)
      .unwrap();
    assert_eq!(model.calls.get(), 5);
    assert_eq!(*sink.seen.borrow(), vec![(7, 14)]);
  }
}
