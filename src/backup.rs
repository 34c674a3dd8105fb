use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::StorageMode;
use crate::store::{data_file_for, DB_FILE, LOCAL_STORAGE_FILE};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/tutord.sqlite3";
const LOCAL_ENTRY: &str = "data/local-storage.json";
pub const BUNDLE_FORMAT_V1: &str = "tutord-workspace-v1";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub format: String,
    pub app_version: String,
    pub storage_mode: StorageMode,
    pub exported_at: String,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub bundle_format: String,
    pub out_path: PathBuf,
    pub storage_mode: StorageMode,
    pub entry_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub storage_mode: StorageMode,
    pub restored_path: PathBuf,
}

fn entry_name(mode: StorageMode) -> &'static str {
    match mode {
        StorageMode::Sqlite => DB_ENTRY,
        StorageMode::Demo => LOCAL_ENTRY,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Writes the workspace's storage file for `mode` into a zip bundle.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    mode: StorageMode,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let data_path = data_file_for(workspace_path, mode);
    if !data_path.is_file() {
        return Err(anyhow!(
            "workspace storage not found: {}",
            data_path.to_string_lossy()
        ));
    }
    let data = std::fs::read(&data_path)
        .with_context(|| format!("failed to read {}", data_path.to_string_lossy()))?;
    let checksum = sha256_hex(&data);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        storage_mode: mode,
        exported_at: crate::model::now_ts(),
        entries: vec![ManifestEntry {
            path: entry_name(mode).to_string(),
            sha256: checksum.clone(),
            size: data.len() as u64,
        }],
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(entry_name(mode), opts)
        .context("failed to start storage entry")?;
    zip.write_all(&data).context("failed to write storage entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(
        out = %out_path.display(),
        mode = mode.as_str(),
        bytes = data.len(),
        "workspace exported"
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        out_path: out_path.to_path_buf(),
        storage_mode: mode,
        entry_count: 2,
        sha256: checksum,
    })
}

/// Restores a bundle (or a bare `tutord.sqlite3` copy) into `workspace_path`.
/// The caller must drop any open store before calling and reopen it after.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    if !is_zip_file(in_path)? {
        if !is_sqlite_file(in_path)? {
            return Err(anyhow!(
                "not a tutord bundle or sqlite database: {}",
                in_path.to_string_lossy()
            ));
        }
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        let dst = workspace_path.join(DB_FILE);
        replace_file(&dst, &bytes)?;
        return Ok(ImportSummary {
            bundle_format_detected: "sqlite3".to_string(),
            storage_mode: StorageMode::Sqlite,
            restored_path: dst,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let wanted = entry_name(manifest.storage_mode);
    let entry = manifest
        .entries
        .iter()
        .find(|e| e.path == wanted)
        .ok_or_else(|| anyhow!("manifest does not list {}", wanted))?;

    let mut bytes = Vec::new();
    archive
        .by_name(wanted)
        .with_context(|| format!("bundle missing {}", wanted))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to extract {}", wanted))?;
    let actual = sha256_hex(&bytes);
    if actual != entry.sha256 {
        return Err(anyhow!(
            "checksum mismatch for {}: expected {}, got {}",
            wanted,
            entry.sha256,
            actual
        ));
    }

    let dst = match manifest.storage_mode {
        StorageMode::Sqlite => workspace_path.join(DB_FILE),
        StorageMode::Demo => workspace_path.join(LOCAL_STORAGE_FILE),
    };
    replace_file(&dst, &bytes)?;

    tracing::info!(
        from = %in_path.display(),
        mode = manifest.storage_mode.as_str(),
        "workspace imported"
    );
    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
        storage_mode: manifest.storage_mode,
        restored_path: dst,
    })
}

fn replace_file(dst: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp_name = dst.as_os_str().to_owned();
    tmp_name.push(".importing");
    let tmp_dst = PathBuf::from(tmp_name);
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    let mut out = File::create(&tmp_dst)
        .with_context(|| format!("failed to create temp file {}", tmp_dst.to_string_lossy()))?;
    out.write_all(bytes)
        .with_context(|| format!("failed to write {}", tmp_dst.to_string_lossy()))?;
    out.flush().context("failed to flush extracted storage")?;
    drop(out);
    std::fs::rename(&tmp_dst, dst).with_context(|| {
        format!(
            "failed to move extracted storage to {}",
            dst.to_string_lossy()
        )
    })?;
    Ok(())
}

fn read_signature<const N: usize>(path: &Path) -> anyhow::Result<Option<[u8; N]>> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; N];
    match f.read_exact(&mut sig) {
        Ok(()) => Ok(Some(sig)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e).context("failed to read file signature"),
    }
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    Ok(read_signature::<4>(path)? == Some([0x50, 0x4B, 0x03, 0x04]))
}

fn is_sqlite_file(path: &Path) -> anyhow::Result<bool> {
    Ok(read_signature::<16>(path)?.as_ref() == Some(SQLITE_MAGIC))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_import_restores_local_storage() {
        let src = tempfile::tempdir().expect("src");
        let dst = tempfile::tempdir().expect("dst");
        let out = tempfile::tempdir().expect("out");
        let payload = br#"{"classrooms":"[]"}"#;
        std::fs::write(src.path().join(LOCAL_STORAGE_FILE), payload).expect("seed");

        let bundle = out.path().join("ws.zip");
        let export = export_workspace_bundle(src.path(), StorageMode::Demo, &bundle).expect("export");
        assert_eq!(export.sha256, sha256_hex(payload));

        let import = import_workspace_bundle(&bundle, dst.path()).expect("import");
        assert_eq!(import.storage_mode, StorageMode::Demo);
        assert_eq!(
            std::fs::read(dst.path().join(LOCAL_STORAGE_FILE)).expect("restored"),
            payload
        );
    }

    #[test]
    fn tampered_entry_is_rejected() {
        let out = tempfile::tempdir().expect("out");
        let bundle = out.path().join("bad.zip");
        let manifest = Manifest {
            format: BUNDLE_FORMAT_V1.to_string(),
            app_version: "0".into(),
            storage_mode: StorageMode::Demo,
            exported_at: String::new(),
            entries: vec![ManifestEntry {
                path: LOCAL_ENTRY.into(),
                sha256: sha256_hex(b"original"),
                size: 8,
            }],
        };
        let mut zip = ZipWriter::new(File::create(&bundle).expect("create"));
        let opts = FileOptions::default();
        zip.start_file(MANIFEST_ENTRY, opts).expect("start");
        zip.write_all(serde_json::to_string(&manifest).expect("json").as_bytes())
            .expect("write");
        zip.start_file(LOCAL_ENTRY, opts).expect("start");
        zip.write_all(b"tampered").expect("write");
        zip.finish().expect("finish");

        let ws = tempfile::tempdir().expect("ws");
        let err = import_workspace_bundle(&bundle, ws.path()).expect_err("checksum");
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(!ws.path().join(LOCAL_STORAGE_FILE).exists());
    }

    #[test]
    fn random_files_are_refused() {
        let dir = tempfile::tempdir().expect("dir");
        let junk = dir.path().join("junk.bin");
        std::fs::write(&junk, b"hello").expect("write");
        assert!(import_workspace_bundle(&junk, dir.path()).is_err());
    }
}
