use crate::models::upload_item::SourceFile;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 根据扩展名推断 MIME 类型，不支持的文件返回 None
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// 读取单个文件的元数据并转换为 SourceFile
pub async fn load_source_file(path: &Path) -> Result<SourceFile> {
    let mime_type = mime_type_for(path)
        .with_context(|| format!("不支持的文件类型: {}", path.display()))?;

    let metadata = fs::metadata(path)
        .await
        .with_context(|| format!("无法读取文件信息: {}", path.display()))?;

    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    Ok(SourceFile::new(path, file_name, metadata.len(), mime_type))
}

/// 从文件夹中加载所有支持的收据文件
///
/// 按文件名排序，保证选择顺序稳定
pub async fn load_source_files(folder_path: &str) -> Result<Vec<SourceFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if mime_type_for(&path).is_some() {
            paths.push(path);
        } else {
            tracing::debug!("跳过不支持的文件: {}", path.display());
        }
    }

    paths.sort();

    let files = try_join_all(paths.iter().map(|path| load_source_file(path))).await?;
    tracing::info!("在 {} 中找到 {} 个收据文件", folder_path, files.len());

    Ok(files)
}
