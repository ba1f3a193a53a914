// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/record.rs - 检测结果文本/JSON 记录
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

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{DetectItem, DetectResult},
  output::Render,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RecordFormat {
  Text,
  Json,
}

/// `record:///path/result.txt` 每行一个检测框，`record:///path/result.json` 输出 JSON 数组
pub struct RecordOutput {
  path: PathBuf,
  format: RecordFormat,
}

#[derive(Serialize)]
struct RecordEntry<'a> {
  label: &'a str,
  #[serde(flatten)]
  item: &'a DetectItem,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = PathBuf::from(url.path());
    let format = match path.extension().and_then(|e| e.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("json") => RecordFormat::Json,
      _ => RecordFormat::Text,
    };
    Ok(RecordOutput { path, format })
  }
}

impl RecordOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn to_text(result: &DetectResult) -> String {
    result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          result.label_of(item),
          item.score,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn to_json(result: &DetectResult) -> Result<String, serde_json::Error> {
    let entries: Vec<RecordEntry> = result
      .items
      .iter()
      .map(|item| RecordEntry {
        label: result.label_of(item),
        item,
      })
      .collect();
    serde_json::to_string_pretty(&entries)
  }
}

impl Render<Frame, DetectResult> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, _frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let content = match self.format {
      RecordFormat::Text => Self::to_text(result),
      RecordFormat::Json => Self::to_json(result)?,
    };

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.path, content)?;
    warn!("保存检测记录到文件: {}", self.path.display());
    Ok(())
  }
}
