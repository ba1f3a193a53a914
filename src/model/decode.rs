// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/decode.rs - 单个检测头的边界框解码
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

use thiserror::Error;
use tracing::{debug, error};

use crate::model::{DetectItem, HeadDescriptor, HeadGrid, ModelConfig, sigmoid};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("检测头 {head}: 张量大小不匹配, 期望 {expected}, 实际 {actual}")]
  TensorSizeMismatch {
    head: usize,
    expected: usize,
    actual: usize,
  },
  #[error("输出张量数量不匹配, 期望 {expected}, 实际 {actual}")]
  HeadCountMismatch { expected: usize, actual: usize },
  #[error("检测头 {head}: 先验框数量不匹配, 期望 {expected}, 实际 {actual}")]
  AnchorCountMismatch {
    head: usize,
    expected: usize,
    actual: usize,
  },
  #[error("检测头 {head}: 网格尺寸不匹配, 期望 {expected:?}, 实际 {actual:?}")]
  GridSizeMismatch {
    head: usize,
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("原始图像尺寸无效: {width}x{height}")]
  InvalidImageSize { width: u32, height: u32 },
}

/// 原始图像尺寸以及模型输入到原始图像的缩放比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry {
  pub image_width: f32,
  pub image_height: f32,
  pub scale_w: f32,
  pub scale_h: f32,
}

impl ImageGeometry {
  pub fn new(image_width: u32, image_height: u32, config: &ModelConfig) -> Result<Self, DecodeError> {
    if image_width == 0 || image_height == 0 {
      return Err(DecodeError::InvalidImageSize {
        width: image_width,
        height: image_height,
      });
    }
    let image_width = image_width as f32;
    let image_height = image_height as f32;
    Ok(Self {
      image_width,
      image_height,
      scale_w: image_width / config.input_width as f32,
      scale_h: image_height / config.input_height as f32,
    })
  }

  /// 四个角点全部落在原始图像内才接受，不做裁剪
  #[inline]
  fn contains(&self, bbox: &[f32; 4]) -> bool {
    bbox[0] >= 0.0 && bbox[1] >= 0.0 && bbox[2] <= self.image_width && bbox[3] <= self.image_height
  }
}

/// 解码一个检测头的原始输出
///
/// 张量布局为 `[anchor, channel, row, column]`，其中 channel 依次为
/// `tx, ty, tw, th, objectness, class_0 .. class_{C-1}`。
/// 置信度为 `sigmoid(class) * sigmoid(objectness)`，严格大于该类别阈值才生成候选框；
/// 超出原始图像边界的框直接丢弃。
pub fn decode_head(
  head_index: usize,
  tensor: &[f32],
  head: &HeadDescriptor,
  grid: &HeadGrid,
  config: &ModelConfig,
  geometry: &ImageGeometry,
) -> Result<Vec<DetectItem>, DecodeError> {
  if head.anchors.len() != config.anchors_per_head {
    error!(
      "检测头 {}: 先验框数量 {} 与配置 {} 不一致",
      head_index,
      head.anchors.len(),
      config.anchors_per_head
    );
    return Err(DecodeError::AnchorCountMismatch {
      head: head_index,
      expected: config.anchors_per_head,
      actual: head.anchors.len(),
    });
  }

  let (grid_w, grid_h) = (head.grid_width, head.grid_height);
  if (grid.width(), grid.height()) != (grid_w, grid_h) {
    error!(
      "检测头 {}: 网格 {}x{} 与检测头 {}x{} 不一致",
      head_index,
      grid.width(),
      grid.height(),
      grid_w,
      grid_h
    );
    return Err(DecodeError::GridSizeMismatch {
      head: head_index,
      expected: (grid_w, grid_h),
      actual: (grid.width(), grid.height()),
    });
  }

  let expected = config.expected_len(head);
  if tensor.len() != expected {
    error!(
      "检测头 {}: 张量大小 {} 与期望大小 {} 不一致",
      head_index,
      tensor.len(),
      expected
    );
    return Err(DecodeError::TensorSizeMismatch {
      head: head_index,
      expected,
      actual: tensor.len(),
    });
  }

  let spatial = grid_w * grid_h;
  let channels = config.channels_per_anchor();
  let stride = head.stride;
  let mut items = Vec::new();

  for row in 0..grid_h {
    for col in 0..grid_w {
      let cell = row * grid_w + col;
      let (grid_x, grid_y) = grid.coord(row, col);

      for (anchor_idx, &[anchor_w, anchor_h]) in head.anchors.iter().enumerate() {
        let at = |channel: usize| tensor[(anchor_idx * channels + channel) * spatial + cell];

        let objectness = sigmoid(at(4));

        for (class_id, &threshold) in config.class_thresholds.iter().enumerate() {
          let score = sigmoid(at(5 + class_id)) * objectness;
          if score <= threshold {
            continue;
          }

          let bx = (sigmoid(at(0)) * 2.0 - 0.5 + grid_x) * stride;
          let by = (sigmoid(at(1)) * 2.0 - 0.5 + grid_y) * stride;
          let bw = (sigmoid(at(2)) * 2.0).powi(2) * anchor_w;
          let bh = (sigmoid(at(3)) * 2.0).powi(2) * anchor_h;

          let bbox = [
            (bx - bw / 2.0) * geometry.scale_w,
            (by - bh / 2.0) * geometry.scale_h,
            (bx + bw / 2.0) * geometry.scale_w,
            (by + bh / 2.0) * geometry.scale_h,
          ];

          if !geometry.contains(&bbox) || bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
            continue;
          }

          items.push(DetectItem {
            class_id: class_id as u32,
            score,
            bbox,
          });
        }
      }
    }
  }

  debug!("检测头 {}: 解码得到 {} 个候选框", head_index, items.len());
  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;

  const FAR_NEGATIVE: f32 = -30.0;
  const FAR_POSITIVE: f32 = 30.0;

  /// 单类别、单先验框、1x1 网格、64x64 输入
  fn tiny_config(threshold: f32) -> ModelConfig {
    ModelConfig {
      input_width: 64,
      input_height: 64,
      classes: vec!["thing".to_string()],
      class_thresholds: vec![threshold],
      nms_threshold: 0.45,
      anchors_per_head: 1,
      heads: vec![HeadDescriptor::new(1, 1, 64.0, &[[64.0, 64.0]])],
    }
  }

  /// [tx, ty, tw, th, objectness, class]
  fn decode_one(config: &ModelConfig, raw: [f32; 6], image: (u32, u32)) -> Vec<DetectItem> {
    let head = &config.heads[0];
    let grid = HeadGrid::new(head.grid_width, head.grid_height);
    let geometry = ImageGeometry::new(image.0, image.1, config).unwrap();
    decode_head(0, &raw, head, &grid, config, &geometry).unwrap()
  }

  #[test]
  fn box_filling_the_image_is_kept() {
    let config = tiny_config(0.4);
    let items = decode_one(&config, [0.0, 0.0, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, [0.0, 0.0, 64.0, 64.0]);
    assert_eq!(items[0].class_id, 0);
  }

  #[test]
  fn box_past_right_edge_is_dropped_even_at_max_confidence() {
    let config = tiny_config(0.4);
    let items = decode_one(&config, [0.01, 0.0, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn box_past_left_edge_is_dropped_not_clamped() {
    let config = tiny_config(0.4);
    let items = decode_one(&config, [-0.01, 0.0, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn box_past_top_edge_is_dropped() {
    let config = tiny_config(0.4);
    let items = decode_one(&config, [0.0, -0.01, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn box_slightly_past_bottom_edge_is_dropped() {
    // 先验框高 60, 中心 y 略大于 34 时 ymax 超出 64
    let config = ModelConfig {
      heads: vec![HeadDescriptor::new(1, 1, 64.0, &[[60.0, 60.0]])],
      ..tiny_config(0.4)
    };
    let inside = decode_one(&config, [0.0, 0.0, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].bbox, [2.0, 2.0, 62.0, 62.0]);

    // sigmoid(0.07) * 2 - 0.5 ~= 0.5350, 中心 y ~= 34.24, ymax ~= 64.24
    let items = decode_one(&config, [0.0, 0.07, 0.0, 0.0, FAR_POSITIVE, FAR_POSITIVE], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn coordinates_are_scaled_to_original_image() {
    let config = tiny_config(0.4);
    // 宽度缩小到 0.25 倍先验框，中心在 (32, 32)
    let items = decode_one(&config, [0.0, 0.0, -1.0986123, 0.0, FAR_POSITIVE, FAR_POSITIVE], (128, 32));
    assert_eq!(items.len(), 1);
    let [xmin, ymin, xmax, ymax] = items[0].bbox;
    assert!((xmin - 48.0).abs() < 1e-3, "xmin = {xmin}");
    assert!((xmax - 80.0).abs() < 1e-3, "xmax = {xmax}");
    assert!((ymin - 0.0).abs() < 1e-3);
    assert!((ymax - 32.0).abs() < 1e-3);
  }

  #[test]
  fn confidence_below_threshold_is_rejected() {
    let config = tiny_config(0.4);
    // sigmoid(-0.4473) ~= 0.39
    let items = decode_one(&config, [0.0, 0.0, 0.0, 0.0, FAR_POSITIVE, -0.4473], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn confidence_equal_to_threshold_is_rejected() {
    let class_logit = 0.3;
    let objectness_logit = 1.2;
    let conf = sigmoid(class_logit) * sigmoid(objectness_logit);

    let config = tiny_config(conf);
    let items = decode_one(&config, [0.0, 0.0, 0.0, 0.0, objectness_logit, class_logit], (64, 64));
    assert!(items.is_empty());

    let config = tiny_config(conf - 1e-4);
    let items = decode_one(&config, [0.0, 0.0, 0.0, 0.0, objectness_logit, class_logit], (64, 64));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].score, conf);
  }

  #[test]
  fn thresholds_are_per_class() {
    let config = ModelConfig {
      classes: vec!["a".to_string(), "b".to_string()],
      class_thresholds: vec![0.9, 0.3],
      ..tiny_config(0.5)
    };
    let head = &config.heads[0];
    let grid = HeadGrid::new(1, 1);
    let geometry = ImageGeometry::new(64, 64, &config).unwrap();
    // 两个类别的置信度都约为 0.5
    let raw = [0.0, 0.0, 0.0, 0.0, FAR_POSITIVE, 0.0, 0.0];
    let items = decode_head(0, &raw, head, &grid, &config, &geometry).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn low_objectness_suppresses_all_classes() {
    let config = tiny_config(0.4);
    let items = decode_one(&config, [0.0, 0.0, 0.0, 0.0, FAR_NEGATIVE, FAR_POSITIVE], (64, 64));
    assert!(items.is_empty());
  }

  #[test]
  fn follows_anchor_channel_row_column_layout() {
    // 2 个先验框, 网格宽 3 高 2, 单类别
    let config = ModelConfig {
      input_width: 96,
      input_height: 64,
      anchors_per_head: 2,
      heads: vec![HeadDescriptor::new(3, 2, 32.0, &[[8.0, 8.0], [16.0, 16.0]])],
      ..tiny_config(0.4)
    };
    let head = &config.heads[0];
    let grid = HeadGrid::new(3, 2);
    let geometry = ImageGeometry::new(96, 64, &config).unwrap();

    let channels = config.channels_per_anchor();
    let mut raw = vec![FAR_NEGATIVE; config.expected_len(head)];
    // 只点亮 anchor 1 在 (row 1, column 2) 处
    let (anchor, row, col) = (1, 1, 2);
    let addr = |channel: usize| ((anchor * channels + channel) * 2 + row) * 3 + col;
    for channel in 0..4 {
      raw[addr(channel)] = 0.0;
    }
    raw[addr(4)] = FAR_POSITIVE;
    raw[addr(5)] = FAR_POSITIVE;

    let items = decode_head(0, &raw, head, &grid, &config, &geometry).unwrap();
    assert_eq!(items.len(), 1);
    // 中心 (2.5 * 32, 1.5 * 32) = (80, 48), 尺寸 16x16
    assert_eq!(items[0].bbox, [72.0, 40.0, 88.0, 56.0]);
  }

  #[test]
  fn wrong_tensor_size_fails_fast() {
    let config = tiny_config(0.4);
    let head = &config.heads[0];
    let grid = HeadGrid::new(1, 1);
    let geometry = ImageGeometry::new(64, 64, &config).unwrap();
    let err = decode_head(3, &[0.0; 5], head, &grid, &config, &geometry).unwrap_err();
    assert_eq!(
      err,
      DecodeError::TensorSizeMismatch {
        head: 3,
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn anchor_count_disagreeing_with_config_is_an_error() {
    let config = ModelConfig {
      heads: vec![HeadDescriptor::new(1, 1, 64.0, &[[8.0, 8.0], [16.0, 16.0]])],
      ..tiny_config(0.4)
    };
    let head = &config.heads[0];
    let grid = HeadGrid::new(1, 1);
    let geometry = ImageGeometry::new(64, 64, &config).unwrap();
    let err = decode_head(2, &[0.0; 6], head, &grid, &config, &geometry).unwrap_err();
    assert_eq!(
      err,
      DecodeError::AnchorCountMismatch {
        head: 2,
        expected: 1,
        actual: 2
      }
    );
  }

  #[test]
  fn grid_built_for_another_head_is_an_error() {
    let config = ModelConfig {
      heads: vec![HeadDescriptor::new(2, 3, 32.0, &[[8.0, 8.0]])],
      ..tiny_config(0.4)
    };
    let head = &config.heads[0];
    let grid = HeadGrid::new(3, 2);
    let geometry = ImageGeometry::new(64, 64, &config).unwrap();
    let raw = vec![FAR_POSITIVE; config.expected_len(head)];
    let err = decode_head(1, &raw, head, &grid, &config, &geometry).unwrap_err();
    assert_eq!(
      err,
      DecodeError::GridSizeMismatch {
        head: 1,
        expected: (2, 3),
        actual: (3, 2)
      }
    );
  }

  #[test]
  fn zero_image_size_is_rejected() {
    let config = tiny_config(0.4);
    assert_eq!(
      ImageGeometry::new(0, 10, &config),
      Err(DecodeError::InvalidImageSize {
        width: 0,
        height: 10
      })
    );
  }
}
