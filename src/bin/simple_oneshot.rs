// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧后处理
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use beifeng::{
  FromUrl,
  input::TensorDirInput,
  model::Yolov5P6Builder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Beifeng 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置，yolov5p6:// 使用内置配置，yolov5p6:///path/config.json 读取配置文件
  #[arg(long, value_name = "MODEL", default_value = "yolov5p6://")]
  pub model: Url,
  /// 原始张量目录，例如 tensor:///data/frame0?image=/data/frame0.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///out.jpg 或 record:///out.txt / record:///out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 覆盖 NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
  /// 覆盖所有类别的置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut builder = Yolov5P6Builder::from_url(&args.model)?;
  if let Some(threshold) = args.nms_threshold {
    builder = builder.nms_threshold(threshold);
  }
  if let Some(threshold) = args.confidence {
    builder = builder.class_threshold(threshold);
  }

  let input = TensorDirInput::from_url(&args.input)?;
  let model = builder.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}
