// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/yolov5p6.rs - 六检测头 yolov5-p6 后处理流水线
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

use std::{path::PathBuf, sync::Arc};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{
    ConfigError, DecodeError, DetectItem, DetectResult, GridTable, HeadDescriptor, HeadGrid,
    ImageGeometry, ModelConfig, PostProcess, decode_head, non_max_suppression,
  },
};

pub struct Yolov5P6 {
  config: ModelConfig,
  grid: GridTable,
  labels: Arc<[String]>,
}

pub struct Yolov5P6Builder {
  config_path: Option<PathBuf>,
  config: Option<ModelConfig>,
  nms_threshold: Option<f32>,
  class_threshold: Option<f32>,
}

impl FromUrlWithScheme for Yolov5P6Builder {
  const SCHEME: &'static str = "yolov5p6";
}

/// `yolov5p6:///path/to/config.json` 读取配置文件，`yolov5p6://` 使用内置配置
impl FromUrl for Yolov5P6Builder {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("模型配置必须使用 {} 方案, 实际为 {}", Self::SCHEME, url.scheme());
      return Err(ConfigError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url.path();
    Ok(Yolov5P6Builder {
      config_path: (!path.is_empty()).then(|| PathBuf::from(path)),
      config: None,
      nms_threshold: None,
      class_threshold: None,
    })
  }
}

impl Default for Yolov5P6Builder {
  fn default() -> Self {
    Self::with_config(ModelConfig::default())
  }
}

impl Yolov5P6Builder {
  pub fn with_config(config: ModelConfig) -> Self {
    Self {
      config_path: None,
      config: Some(config),
      nms_threshold: None,
      class_threshold: None,
    }
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = Some(threshold);
    self
  }

  /// 将所有类别的置信度阈值统一设为该值
  pub fn class_threshold(mut self, threshold: f32) -> Self {
    self.class_threshold = Some(threshold);
    self
  }

  pub fn build(self) -> Result<Yolov5P6, ConfigError> {
    let mut config = match (self.config, self.config_path) {
      (Some(config), _) => config,
      (None, Some(path)) => ModelConfig::from_json_file(path)?,
      (None, None) => {
        info!("使用内置 yolov5-p6 六检测头配置");
        ModelConfig::default()
      }
    };

    if let Some(threshold) = self.nms_threshold {
      config.nms_threshold = threshold;
    }
    if let Some(threshold) = self.class_threshold {
      config.class_thresholds.fill(threshold);
    }
    config.validate()?;

    let grid = GridTable::new(&config.heads);
    let labels = config.classes.iter().cloned().collect();

    info!(
      "后处理流水线就绪: 输入 {}x{}, {} 个检测头, {} 个类别, NMS 阈值 {}",
      config.input_width,
      config.input_height,
      config.heads.len(),
      config.num_classes(),
      config.nms_threshold
    );

    Ok(Yolov5P6 {
      config,
      grid,
      labels,
    })
  }
}

impl Yolov5P6 {
  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn labels(&self) -> &Arc<[String]> {
    &self.labels
  }

  /// 解码所有检测头并按检测头顺序拼接候选框，不做 NMS
  pub fn decode(&self, frame: &Frame) -> Result<Vec<DetectItem>, DecodeError> {
    let expected = self.config.heads.len();
    if frame.num_outputs() != expected {
      error!(
        "预期输出张量数量为 {}, 实际为 {}",
        expected,
        frame.num_outputs()
      );
      return Err(DecodeError::HeadCountMismatch {
        expected,
        actual: frame.num_outputs(),
      });
    }

    let geometry = ImageGeometry::new(frame.image_width(), frame.image_height(), &self.config)?;
    debug!(
      "原始图像 {}x{}, 缩放比例 {:.4}x{:.4}",
      frame.image_width(),
      frame.image_height(),
      geometry.scale_w,
      geometry.scale_h
    );

    let jobs: Vec<(usize, &HeadDescriptor, &HeadGrid, &[f32])> = self
      .config
      .heads
      .iter()
      .zip(self.grid.iter())
      .enumerate()
      .filter_map(|(idx, (head, grid))| frame.output(idx).map(|tensor| (idx, head, grid, tensor)))
      .collect();

    let decode = |&(idx, head, grid, tensor): &(usize, &HeadDescriptor, &HeadGrid, &[f32])| {
      decode_head(idx, tensor, head, grid, &self.config, &geometry)
    };

    // 按检测头顺序收集，出错时报告序号最小的检测头
    #[cfg(feature = "parallel")]
    let per_head: Vec<Result<Vec<DetectItem>, DecodeError>> = jobs.par_iter().map(decode).collect();
    #[cfg(not(feature = "parallel"))]
    let per_head: Vec<Result<Vec<DetectItem>, DecodeError>> = jobs.iter().map(decode).collect();
    let per_head = per_head.into_iter().collect::<Result<Vec<_>, _>>()?;

    Ok(per_head.into_iter().flatten().collect())
  }
}

impl PostProcess for Yolov5P6 {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DecodeError;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let candidates = self.decode(input)?;
    debug!("候选框总数: {}", candidates.len());

    // 跨检测头的全局 NMS
    let items = non_max_suppression(candidates, self.config.nms_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      labels: self.labels.clone(),
    })
  }
}
