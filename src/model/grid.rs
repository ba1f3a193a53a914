// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/grid.rs - 网格坐标表
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

use crate::model::HeadDescriptor;

/// 单个检测头的网格坐标，按 `row * width + column` 存放 `(column, row)`
#[derive(Debug, Clone)]
pub struct HeadGrid {
  width: usize,
  height: usize,
  coords: Box<[(f32, f32)]>,
}

impl HeadGrid {
  pub fn new(width: usize, height: usize) -> Self {
    let coords = (0..height)
      .flat_map(|row| (0..width).map(move |col| (col as f32, row as f32)))
      .collect();
    Self {
      width,
      height,
      coords,
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  #[inline]
  pub fn coord(&self, row: usize, col: usize) -> (f32, f32) {
    self.coords[row * self.width + col]
  }
}

/// 所有检测头的网格坐标，启动时计算一次，之后只读
#[derive(Debug, Clone)]
pub struct GridTable {
  heads: Box<[HeadGrid]>,
}

impl GridTable {
  pub fn new(heads: &[HeadDescriptor]) -> Self {
    Self {
      heads: heads
        .iter()
        .map(|h| HeadGrid::new(h.grid_width, h.grid_height))
        .collect(),
    }
  }

  pub fn head(&self, index: usize) -> Option<&HeadGrid> {
    self.heads.get(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, HeadGrid> {
    self.heads.iter()
  }

  pub fn len(&self) -> usize {
    self.heads.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heads.is_empty()
  }
}
