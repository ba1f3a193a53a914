// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/config.rs - 检测头与模型配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// 单个检测头的静态配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadDescriptor {
  /// 特征图宽度（列数）
  pub grid_width: usize,
  /// 特征图高度（行数）
  pub grid_height: usize,
  /// 每个网格单元对应的输入像素数
  pub stride: f32,
  /// 先验框 (宽, 高)，单位为模型输入像素
  pub anchors: Vec<[f32; 2]>,
}

impl HeadDescriptor {
  pub fn new(grid_width: usize, grid_height: usize, stride: f32, anchors: &[[f32; 2]]) -> Self {
    Self {
      grid_width,
      grid_height,
      stride,
      anchors: anchors.to_vec(),
    }
  }

  pub fn cells(&self) -> usize {
    self.grid_width * self.grid_height
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub classes: Vec<String>,
  /// 每个类别独立的置信度阈值，严格大于才保留
  pub class_thresholds: Vec<f32>,
  pub nms_threshold: f32,
  pub anchors_per_head: usize,
  pub heads: Vec<HeadDescriptor>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("类别列表为空")]
  EmptyClasses,
  #[error("类别阈值数量 {thresholds} 与类别数量 {classes} 不一致")]
  ThresholdCountMismatch { classes: usize, thresholds: usize },
  #[error("类别 {class} 的置信度阈值 {value} 不在 (0, 1) 区间内")]
  ClassThresholdOutOfRange { class: usize, value: f32 },
  #[error("NMS 阈值 {0} 不在 (0, 1) 区间内")]
  NmsThresholdOutOfRange(f32),
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: u32, height: u32 },
  #[error("没有配置任何检测头")]
  NoHeads,
  #[error("检测头 {head} 配置无效: {reason}")]
  InvalidHead { head: usize, reason: String },
}

impl ConfigError {
  fn head(head: usize, reason: impl Into<String>) -> Self {
    ConfigError::InvalidHead {
      head,
      reason: reason.into(),
    }
  }
}

const YOLOV5P6_INPUT_W: u32 = 512;
const YOLOV5P6_INPUT_H: u32 = 512;
const YOLOV5P6_CLASSES: [&str; 2] = ["car", "ped"];
const YOLOV5P6_OBJECT_THRESH: [f32; 2] = [0.4, 0.4];
const YOLOV5P6_NMS_THRESH: f32 = 0.45;
const YOLOV5P6_ANCHOR_NUM: usize = 3;
const YOLOV5P6_GRID_SIZES: [usize; 6] = [64, 32, 16, 8, 4, 2];
const YOLOV5P6_STRIDES: [f32; 6] = [8.0, 16.0, 32.0, 64.0, 128.0, 256.0];
const YOLOV5P6_ANCHORS: [[[f32; 2]; 3]; 6] = [
  [[16.0, 14.0], [9.0, 30.0], [25.0, 22.0]],
  [[18.0, 52.0], [40.0, 32.0], [27.0, 83.0]],
  [[55.0, 46.0], [82.0, 60.0], [41.0, 122.0]],
  [[100.0, 84.0], [75.0, 162.0], [138.0, 110.0]],
  [[190.0, 158.0], [121.0, 251.0], [259.0, 246.0]],
  [[191.0, 378.0], [451.0, 269.0], [683.0, 393.0]],
];

/// 六检测头 yolov5-p6（512x512，car / ped 两类）的内置配置
impl Default for ModelConfig {
  fn default() -> Self {
    let heads = YOLOV5P6_GRID_SIZES
      .iter()
      .zip(YOLOV5P6_STRIDES)
      .zip(YOLOV5P6_ANCHORS.iter())
      .map(|((&size, stride), anchors)| HeadDescriptor::new(size, size, stride, anchors))
      .collect();

    Self {
      input_width: YOLOV5P6_INPUT_W,
      input_height: YOLOV5P6_INPUT_H,
      classes: YOLOV5P6_CLASSES.iter().map(|c| c.to_string()).collect(),
      class_thresholds: YOLOV5P6_OBJECT_THRESH.to_vec(),
      nms_threshold: YOLOV5P6_NMS_THRESH,
      anchors_per_head: YOLOV5P6_ANCHOR_NUM,
      heads,
    }
  }
}

fn in_unit_interval(value: f32) -> bool {
  value > 0.0 && value < 1.0
}

impl ModelConfig {
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: ModelConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }

  pub fn num_classes(&self) -> usize {
    self.classes.len()
  }

  /// tx, ty, tw, th, objectness 加上各类别 logit
  pub fn channels_per_anchor(&self) -> usize {
    5 + self.num_classes()
  }

  /// 某个检测头张量应有的元素个数
  pub fn expected_len(&self, head: &HeadDescriptor) -> usize {
    self.anchors_per_head * self.channels_per_anchor() * head.cells()
  }

  /// 在任何解码开始之前拒绝无效配置
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.classes.is_empty() {
      error!("类别列表为空");
      return Err(ConfigError::EmptyClasses);
    }

    if self.class_thresholds.len() != self.classes.len() {
      error!(
        "类别阈值数量 {} 与类别数量 {} 不一致",
        self.class_thresholds.len(),
        self.classes.len()
      );
      return Err(ConfigError::ThresholdCountMismatch {
        classes: self.classes.len(),
        thresholds: self.class_thresholds.len(),
      });
    }

    if let Some((class, &value)) = self
      .class_thresholds
      .iter()
      .enumerate()
      .find(|(_, t)| !in_unit_interval(**t))
    {
      error!("类别 {} 的置信度阈值 {} 无效", class, value);
      return Err(ConfigError::ClassThresholdOutOfRange { class, value });
    }

    if !in_unit_interval(self.nms_threshold) {
      error!("NMS 阈值 {} 无效", self.nms_threshold);
      return Err(ConfigError::NmsThresholdOutOfRange(self.nms_threshold));
    }

    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize {
        width: self.input_width,
        height: self.input_height,
      });
    }

    if self.heads.is_empty() {
      return Err(ConfigError::NoHeads);
    }

    for (idx, head) in self.heads.iter().enumerate() {
      if head.grid_width == 0 || head.grid_height == 0 {
        return Err(ConfigError::head(
          idx,
          format!("网格尺寸 {}x{} 无效", head.grid_width, head.grid_height),
        ));
      }
      if !(head.stride.is_finite() && head.stride > 0.0) {
        return Err(ConfigError::head(idx, format!("步长 {} 无效", head.stride)));
      }
      if head.anchors.len() != self.anchors_per_head {
        return Err(ConfigError::head(
          idx,
          format!(
            "先验框数量为 {}, 期望 {}",
            head.anchors.len(),
            self.anchors_per_head
          ),
        ));
      }
      if let Some([w, h]) = head
        .anchors
        .iter()
        .find(|[w, h]| !(w.is_finite() && *w > 0.0 && h.is_finite() && *h > 0.0))
      {
        return Err(ConfigError::head(idx, format!("先验框尺寸 {}x{} 无效", w, h)));
      }
      debug!(
        "检测头 {}: 网格 {}x{}, 步长 {}, 先验框 {:?}",
        idx, head.grid_width, head.grid_height, head.stride, head.anchors
      );
    }

    Ok(())
  }
}
