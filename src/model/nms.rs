// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/nms.rs - 交并比与非极大值抑制
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

use tracing::debug;

use crate::model::DetectItem;

/// 计算两个 `[x_min, y_min, x_max, y_max]` 边界框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inner_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inner_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inner = inner_w * inner_h;

  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - inner;

  if union > 0.0 { inner / union } else { 0.0 }
}

/// 按类别进行贪心非极大值抑制
///
/// 按置信度降序（稳定排序，分数相同保持原顺序）遍历，保留当前框后
/// 抑制其后所有同类别且 IoU 大于阈值的框。被抑制的框不再参与比较。
pub fn non_max_suppression(mut items: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut suppressed = vec![false; items.len()];
  let mut keep = Vec::new();

  for i in 0..items.len() {
    if suppressed[i] {
      continue;
    }

    let best = &items[i];
    for j in (i + 1)..items.len() {
      if !suppressed[j]
        && items[j].class_id == best.class_id
        && iou(&best.bbox, &items[j].bbox) > threshold
      {
        suppressed[j] = true;
      }
    }
    keep.push(best.clone());
  }

  debug!("NMS: {} 个候选框保留 {} 个", items.len(), keep.len());
  keep
}
