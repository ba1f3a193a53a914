// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;

use crate::model::{DetectItem, DetectResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_COLOR: [u8; 3] = [255, 0, 0]; // 红色

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  box_color: [u8; 3],
  label_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
    }
  }
}

#[derive(Error, Debug)]
pub enum FontError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

impl Draw {
  /// 加载 TTF/OTF 字体后才会绘制类别标签
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, FontError> {
    let data = std::fs::read(path)?;
    self.font = Some(FontVec::try_from_vec(data)?);
    Ok(self)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在图像上绘制全部检测框，坐标为原始图像像素
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_bbox_with_label(image, item, result.label_of(item));
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, label: &str) {
    let x_min = item.bbox[0].floor() as i32;
    let y_min = item.bbox[1].floor() as i32;
    let x_max = item.bbox[2].ceil() as i32;
    let y_max = item.bbox[3].ceil() as i32;

    // 边框加粗为 2 像素，向内收缩
    for t in 0..BOX_THICKNESS {
      let w = x_max - x_min - 2 * t;
      let h = y_max - y_min - 2 * t;
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    if let Some(font) = &self.font {
      let text = format!("{}{:.2}", label, item.score);
      let text_y = (y_min - self.font_size as i32).max(0);
      draw_text_mut(
        image,
        Rgb(self.label_color),
        x_min,
        text_y,
        PxScale::from(self.font_size),
        font,
        &text,
      );
    }
  }
}
