// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 模型后处理
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

use std::sync::Arc;

use serde::Serialize;

/// 将推理引擎的原始输出转换为最终检测结果
pub trait PostProcess {
  type Input;
  type Output;
  type Error;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<T: PostProcess> PostProcess for &T {
  type Input = T::Input;
  type Output = T::Output;
  type Error = T::Error;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).process(input)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原始图像像素坐标
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub labels: Arc<[String]>,
}

impl DetectResult {
  pub fn label_of(&self, item: &DetectItem) -> &str {
    self
      .labels
      .get(item.class_id as usize)
      .map(String::as_str)
      .unwrap_or("unknown")
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

mod config;
mod decode;
mod grid;
mod nms;
mod yolov5p6;

pub use self::config::{ConfigError, HeadDescriptor, ModelConfig};
pub use self::decode::{DecodeError, ImageGeometry, decode_head};
pub use self::grid::{GridTable, HeadGrid};
pub use self::nms::{iou, non_max_suppression};
pub use self::yolov5p6::{Yolov5P6, Yolov5P6Builder};

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
