// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - 原始输出帧定义
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

use std::path::{Path, PathBuf};

/// 一次推理的全部原始输出，以及原始图像的尺寸
///
/// `outputs[i]` 是第 i 个检测头的扁平张量，布局为 `[anchor, channel, row, column]`。
#[derive(Debug, Clone)]
pub struct Frame {
  outputs: Box<[Box<[f32]>]>,
  image_width: u32,
  image_height: u32,
  source: Option<PathBuf>,
}

impl Frame {
  pub fn new(outputs: Vec<Vec<f32>>, image_width: u32, image_height: u32) -> Self {
    Self {
      outputs: outputs.into_iter().map(Vec::into_boxed_slice).collect(),
      image_width,
      image_height,
      source: None,
    }
  }

  /// 记录原始图像路径，供渲染输出使用
  pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn num_outputs(&self) -> usize {
    self.outputs.len()
  }

  pub fn output(&self, index: usize) -> Option<&[f32]> {
    self.outputs.get(index).map(|o| &o[..])
  }

  pub fn image_width(&self) -> u32 {
    self.image_width
  }

  pub fn image_height(&self) -> u32 {
    self.image_height
  }

  pub fn source(&self) -> Option<&Path> {
    self.source.as_deref()
  }
}
