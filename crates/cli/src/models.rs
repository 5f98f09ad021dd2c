use anyhow::{Context as AnyhowContext, Result};
use reframe_vector_store::normalize_model_id;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const HF_REVISION: &str = "main";

/// `(model id, Hugging Face repo)` for every model the embedder can load.
const SOURCES: [(&str, &str); 4] = [
    ("all-minilm-l6-v2", "sentence-transformers/all-MiniLM-L6-v2"),
    ("all-minilm-l12-v2", "sentence-transformers/all-MiniLM-L12-v2"),
    ("bge-small", "BAAI/bge-small-en-v1.5"),
    ("all-mpnet-base-v2", "sentence-transformers/all-mpnet-base-v2"),
];

/// `(file in the Hugging Face repo, file under <model_dir>/<model_id>/)`
const ASSETS: [(&str, &str); 2] = [
    ("onnx/model.onnx", "model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
];

#[derive(Debug, Serialize)]
pub struct InstallModelReport {
    pub model_dir: String,
    pub model_id: String,
    pub skipped: Vec<String>,
    pub downloaded: Vec<DownloadedAsset>,
}

#[derive(Debug, Serialize)]
pub struct DownloadedAsset {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

fn hf_repo_for(model_id: &str) -> Result<&'static str> {
    SOURCES
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, repo)| *repo)
        .with_context(|| format!("No download source for embedding model '{model_id}'"))
}

fn asset_url(repo: &str, filename: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/{HF_REVISION}/{filename}")
}

/// Fetch the ONNX export and tokenizer of `model_id` into `<model_dir>/<model_id>/`.
///
/// Existing files are kept unless `force` is set; `dry_run` only reports what would be fetched.
pub async fn install_model(
    model_dir: &Path,
    model_id: &str,
    force: bool,
    dry_run: bool,
) -> Result<InstallModelReport> {
    let model_id = normalize_model_id(model_id);
    let repo = hf_repo_for(&model_id)?;
    let target_dir = model_dir.join(&model_id);
    let mut skipped = Vec::new();
    let mut downloaded = Vec::new();

    let client = Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    for (remote, local) in ASSETS {
        let local_path = target_dir.join(local);
        let display = format!("{model_id}/{local}");

        if local_path.exists() && !force {
            skipped.push(display);
            continue;
        }

        if dry_run {
            downloaded.push(DownloadedAsset {
                path: display,
                bytes: 0,
                sha256: String::new(),
            });
            continue;
        }

        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create directory {}", target_dir.display()))?;

        let url = asset_url(repo, remote);
        let tmp_path = temp_path_for(&local_path);
        log::info!("Downloading {url}");
        let (bytes, sha256) = download_or_discard(&client, &url, &tmp_path).await?;

        std::fs::rename(&tmp_path, &local_path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                tmp_path.display(),
                local_path.display()
            )
        })?;

        downloaded.push(DownloadedAsset {
            path: display,
            bytes,
            sha256,
        });
    }

    Ok(InstallModelReport {
        model_dir: model_dir.display().to_string(),
        model_id,
        skipped,
        downloaded,
    })
}

/// Like [`download`], but removes a partially written `dest` on failure.
async fn download_or_discard(client: &Client, url: &str, dest: &Path) -> Result<(u64, String)> {
    let result = download(client, url, dest).await;
    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

async fn download(client: &Client, url: &str, dest: &Path) -> Result<(u64, String)> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Download failed: GET {url}"))?
        .error_for_status()
        .with_context(|| format!("Download failed: GET {url}"))?;

    let mut file = std::fs::File::create(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("Failed while reading HTTP body from {url}"))?
    {
        file.write_all(&chunk)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
    }
    file.flush()
        .with_context(|| format!("Failed to flush {}", dest.display()))?;

    Ok((bytes, to_lower_hex(&hasher.finalize())))
}

fn to_lower_hex(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(LUT[(byte >> 4) as usize] as char);
        out.push(LUT[(byte & 0x0f) as usize] as char);
    }
    out
}

fn temp_path_for(path: &Path) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    PathBuf::from(format!("{}.{}.{}.download", path.display(), std::process::id(), ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_point_at_the_pinned_repo() {
        assert_eq!(
            asset_url(hf_repo_for("all-minilm-l6-v2").unwrap(), "onnx/model.onnx"),
            "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx"
        );
        assert_eq!(hf_repo_for("bge-small").unwrap(), "BAAI/bge-small-en-v1.5");
    }

    #[test]
    fn unknown_models_have_no_source() {
        assert!(hf_repo_for("gpt-embedder").is_err());
    }

    #[test]
    fn temp_paths_are_siblings() {
        let path = Path::new("models/all-minilm-l6-v2/model.onnx");
        let tmp = temp_path_for(path);
        assert_eq!(tmp.parent(), path.parent());
        assert!(tmp.to_string_lossy().ends_with(".download"));
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(to_lower_hex(&[0xab, 0x01]), "ab01");
    }

    #[tokio::test]
    async fn existing_assets_are_skipped_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("all-minilm-l6-v2");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("model.onnx"), b"onnx").unwrap();
        std::fs::write(target.join("tokenizer.json"), b"{}").unwrap();

        let report = install_model(dir.path(), "all-minilm-l6-v2", false, false).await.unwrap();
        assert_eq!(report.skipped.len(), 2);
        assert!(report.downloaded.is_empty());
    }

    #[tokio::test]
    async fn dry_run_lists_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let report = install_model(dir.path(), "sentence-transformers/all-MiniLM-L6-v2", false, true)
            .await
            .unwrap();
        let paths: Vec<&str> = report.downloaded.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["all-minilm-l6-v2/model.onnx", "all-minilm-l6-v2/tokenizer.json"]);
        assert!(!dir.path().join("all-minilm-l6-v2").exists());
    }

    #[tokio::test]
    async fn dry_run_follows_the_configured_model() {
        let dir = tempfile::tempdir().unwrap();
        let report = install_model(dir.path(), "bge-small-en-v1.5", false, true)
            .await
            .unwrap();
        assert_eq!(report.model_id, "bge-small");
        assert_eq!(report.downloaded[0].path, "bge-small/model.onnx");
    }

    #[tokio::test]
    async fn truncated_download_leaves_no_temp_file() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = temp_path_for(&dir.path().join("model.onnx"));
        let client = Client::new();
        let err = download_or_discard(&client, &format!("http://{addr}/model.onnx"), &dest).await;
        assert!(err.is_err());
        assert!(!dest.exists());
    }
}
