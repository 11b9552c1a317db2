pub mod document;
pub mod export;
pub mod overpass;

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use massing_core::context::ContextSnapshot;
use massing_core::session::SessionModel;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::document::{ContextDocument, ModelDocument, decode_context, decode_model};

pub const MODEL_FILENAME: &str = "model.json";
pub const CONTEXT_FILENAME: &str = "context.json";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive error: {0}")]
    Archive(#[from] ZipError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{document}: unsupported schema version {found:?}, expected {expected}")]
    SchemaVersion {
        document: &'static str,
        found: Option<u64>,
        expected: u32,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

/// 从会话文件读出的内容。模型尚未进入 `SessionStore`，由调用方决定如何重置会话。
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSession {
    pub model: SessionModel,
    pub context: Option<ContextSnapshot>,
    pub created_at: Option<String>,
}

pub trait SessionLoader {
    fn load(&self, path: &Path) -> Result<LoadedSession, IoError>;
}

pub trait SessionSaver {
    fn save(
        &self,
        model: &SessionModel,
        context: Option<&ContextSnapshot>,
        path: &Path,
    ) -> Result<(), IoError>;
}

/// 会话归档：zip 内含 `model.json`，以及可选的 `context.json`。
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveFacade;

impl ArchiveFacade {
    pub fn new() -> Self {
        Self
    }

    /// 写出归档。只有存在中心点且至少一个建筑时才写入 `context.json`。
    pub fn encode(
        &self,
        model: &SessionModel,
        context: Option<&ContextSnapshot>,
    ) -> Result<Vec<u8>, IoError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        let model_json = serde_json::to_vec_pretty(&ModelDocument::from_model(model))?;
        writer.start_file(MODEL_FILENAME, options)?;
        writer.write_all(&model_json).map_err(ZipError::Io)?;

        if let Some(snapshot) = context.filter(|snapshot| !snapshot.buildings.is_empty()) {
            let context_json = serde_json::to_vec_pretty(&ContextDocument::from(snapshot))?;
            writer.start_file(CONTEXT_FILENAME, options)?;
            writer.write_all(&context_json).map_err(ZipError::Io)?;
        }

        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }

    /// 读取归档。不是 zip 时按纯 `model.json` 解析；两者都失败时报告 zip 错误。
    pub fn decode(&self, bytes: &[u8]) -> Result<LoadedSession, IoError> {
        let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(archive) => archive,
            Err(zip_error) => {
                let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
                    return Err(IoError::Archive(zip_error));
                };
                debug!("输入不是 zip 归档，按纯 JSON 模型解析");
                let (model, created_at) = decode_model(value)?;
                return Ok(LoadedSession {
                    model,
                    context: None,
                    created_at,
                });
            }
        };

        let model_value = match read_entry(&mut archive, MODEL_FILENAME)? {
            Some(text) => serde_json::from_str::<Value>(&text)?,
            None => {
                return Err(IoError::InvalidDocument(format!(
                    "missing {MODEL_FILENAME}"
                )));
            }
        };
        let (model, created_at) = decode_model(model_value)?;

        let context = match read_entry(&mut archive, CONTEXT_FILENAME)? {
            Some(text) => Some(decode_context(serde_json::from_str::<Value>(&text)?)?),
            None => None,
        };

        Ok(LoadedSession {
            model,
            context,
            created_at,
        })
    }
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, IoError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(ZipError::Io)?;
    Ok(Some(text))
}

impl SessionLoader for ArchiveFacade {
    fn load(&self, path: &Path) -> Result<LoadedSession, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let session = self.decode(&bytes)?;
        info!(
            path = %path.display(),
            blocks = session.model.blocks.len(),
            context = session.context.is_some(),
            "会话文件已加载"
        );
        Ok(session)
    }
}

impl SessionSaver for ArchiveFacade {
    fn save(
        &self,
        model: &SessionModel,
        context: Option<&ContextSnapshot>,
        path: &Path,
    ) -> Result<(), IoError> {
        let bytes = self.encode(model, context)?;
        fs::write(path, bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), blocks = model.blocks.len(), "会话文件已保存");
        Ok(())
    }
}
