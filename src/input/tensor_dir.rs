// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/tensor_dir.rs - 从目录读取推理引擎导出的原始张量
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, query_value};

#[derive(Error, Debug)]
pub enum TensorDirInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[cfg(feature = "read_image_file")]
  #[error("图像读取错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("张量文件 {path} 大小 {len} 字节不是 4 的倍数")]
  MisalignedTensor { path: String, len: usize },
  #[error("目录 {0} 中没有找到 output0.bin")]
  NoTensors(String),
  #[error("缺少原始图像尺寸, 需要 image=<路径> 或 width=<宽>&height=<高>")]
  MissingImageSize,
  #[error("原始图像尺寸参数无效: {0}")]
  InvalidImageSize(String),
}

/// `tensor:///dir?image=/path/origin.jpg` 或 `tensor:///dir?width=W&height=H`
///
/// 目录中依次存放 `output0.bin`、`output1.bin` ……，每个文件是一个检测头的
/// 小端 f32 扁平张量，读到第一个缺失的文件为止。
pub struct TensorDirInput {
  frame: Option<Frame>,
}

impl FromUrlWithScheme for TensorDirInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorDirInput {
  type Error = TensorDirInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorDirInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let dir = PathBuf::from(url.path());
    let outputs = read_tensor_dir(&dir)?;
    let source = query_value(url, "image").map(PathBuf::from);
    let (width, height) = image_size(url, source.as_deref())?;
    info!(
      "读取 {} 个输出张量, 原始图像尺寸 {}x{}",
      outputs.len(),
      width,
      height
    );

    let frame = Frame::new(outputs, width, height);
    let frame = match source {
      Some(path) => frame.with_source(path),
      None => frame,
    };

    Ok(TensorDirInput { frame: Some(frame) })
  }
}

impl Iterator for TensorDirInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

fn read_tensor_dir(dir: &Path) -> Result<Vec<Vec<f32>>, TensorDirInputError> {
  let mut outputs = Vec::new();
  loop {
    let path = dir.join(format!("output{}.bin", outputs.len()));
    if !path.is_file() {
      break;
    }
    let tensor = read_f32_le(&path)?;
    debug!("张量 {}: {} 个元素", path.display(), tensor.len());
    outputs.push(tensor);
  }

  if outputs.is_empty() {
    error!("目录 {} 中没有张量文件", dir.display());
    return Err(TensorDirInputError::NoTensors(dir.display().to_string()));
  }
  Ok(outputs)
}

fn parse_dim(url: &Url, key: &str) -> Result<Option<u32>, TensorDirInputError> {
  query_value(url, key)
    .map(|v| {
      v.parse::<u32>()
        .map_err(|_| TensorDirInputError::InvalidImageSize(format!("{}={}", key, v)))
    })
    .transpose()
}

fn image_size(url: &Url, source: Option<&Path>) -> Result<(u32, u32), TensorDirInputError> {
  if let (Some(width), Some(height)) = (parse_dim(url, "width")?, parse_dim(url, "height")?) {
    return Ok((width, height));
  }

  match source {
    #[cfg(feature = "read_image_file")]
    Some(path) => Ok(image::image_dimensions(path)?),
    _ => Err(TensorDirInputError::MissingImageSize),
  }
}

/// 读取小端 f32 原始张量文件
pub fn read_f32_le(path: impl AsRef<Path>) -> Result<Vec<f32>, TensorDirInputError> {
  let path = path.as_ref();
  let bytes = std::fs::read(path)?;
  if bytes.len() % 4 != 0 {
    return Err(TensorDirInputError::MisalignedTensor {
      path: path.display().to_string(),
      len: bytes.len(),
    });
  }

  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

/// 以小端 f32 写出张量，格式与 [`read_f32_le`] 一致
pub fn write_f32_le(path: impl AsRef<Path>, data: &[f32]) -> Result<(), std::io::Error> {
  let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
  std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn reads_consecutive_outputs_with_explicit_size() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    write_f32_le(dir.join("output0.bin"), &[1.0, -2.5]).unwrap();
    write_f32_le(dir.join("output1.bin"), &[3.0]).unwrap();
    // output2 缺失, output3 不应被读取
    write_f32_le(dir.join("output3.bin"), &[9.0]).unwrap();

    let url = Url::parse(&format!("tensor://{}?width=640&height=480", dir.display())).unwrap();
    let mut input = TensorDirInput::from_url(&url).unwrap();
    let frame = input.next().unwrap();
    assert!(input.next().is_none());

    assert_eq!(frame.num_outputs(), 2);
    assert_eq!(frame.output(0), Some(&[1.0, -2.5][..]));
    assert_eq!(frame.output(1), Some(&[3.0][..]));
    assert_eq!((frame.image_width(), frame.image_height()), (640, 480));
    assert!(frame.source().is_none());
  }

  #[test]
  fn missing_size_is_an_error() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    write_f32_le(dir.join("output0.bin"), &[0.0]).unwrap();
    let url = Url::parse(&format!("tensor://{}", dir.display())).unwrap();
    assert!(matches!(
      TensorDirInput::from_url(&url),
      Err(TensorDirInputError::MissingImageSize)
    ));

    let url = Url::parse(&format!("tensor://{}?width=abc&height=1", dir.display())).unwrap();
    assert!(matches!(
      TensorDirInput::from_url(&url),
      Err(TensorDirInputError::InvalidImageSize(_))
    ));
  }

  #[test]
  fn empty_dir_and_misaligned_files_are_rejected() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let url = Url::parse(&format!("tensor://{}?width=1&height=1", dir.display())).unwrap();
    assert!(matches!(
      TensorDirInput::from_url(&url),
      Err(TensorDirInputError::NoTensors(_))
    ));

    std::fs::write(dir.join("output0.bin"), [0u8; 6]).unwrap();
    assert!(matches!(
      TensorDirInput::from_url(&url),
      Err(TensorDirInputError::MisalignedTensor { len: 6, .. })
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("image:///tmp/a.jpg").unwrap();
    assert!(matches!(
      TensorDirInput::from_url(&url),
      Err(TensorDirInputError::SchemeMismatch(_))
    ));
  }
}
