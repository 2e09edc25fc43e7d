use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "coursevault-backup-v1";

/// A file to store in the bundle under `name` (a relative, `/`-separated path).
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub name: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    sha256: String,
    size: u64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub entry_count: usize,
}

pub fn export_bundle(entries: &[BundleEntry], out_path: &Path) -> anyhow::Result<ExportSummary> {
    let mut listed = Vec::with_capacity(entries.len());
    for entry in entries {
        if safe_relative_path(&entry.name).is_none() {
            return Err(anyhow!("invalid bundle entry name: {}", entry.name));
        }
        let (sha256, size) = hash_file(&entry.source)?;
        listed.push(ManifestEntry {
            name: entry.name.clone(),
            sha256,
            size,
        });
    }

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

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "entries": listed,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for entry in entries {
        zip.start_file(entry.name.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", entry.name))?;
        let mut src = File::open(&entry.source).with_context(|| {
            format!("failed to open {}", entry.source.to_string_lossy())
        })?;
        io::copy(&mut src, &mut zip)
            .with_context(|| format!("failed to write entry {}", entry.name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len(),
    })
}

/// Extracts every manifest entry under `dest_dir`, checking each checksum
/// before the file is renamed into place.
pub fn import_bundle(in_path: &Path, dest_dir: &Path) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a backup bundle: {}",
            in_path.to_string_lossy()
        ));
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
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let entries: Vec<ManifestEntry> = serde_json::from_value(
        manifest
            .get("entries")
            .cloned()
            .unwrap_or_else(|| json!([])),
    )
    .context("manifest.json has an invalid entry list")?;

    std::fs::create_dir_all(dest_dir).with_context(|| {
        format!("failed to create directory {}", dest_dir.to_string_lossy())
    })?;

    for entry in &entries {
        let rel = safe_relative_path(&entry.name)
            .ok_or_else(|| anyhow!("unsafe bundle entry name: {}", entry.name))?;
        let dst = dest_dir.join(rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }

        let tmp_dst = importing_path(&dst);
        if tmp_dst.exists() {
            let _ = std::fs::remove_file(&tmp_dst);
        }
        let out = File::create(&tmp_dst)
            .with_context(|| format!("failed to create {}", tmp_dst.to_string_lossy()))?;
        let mut writer = HashingWriter::new(out);
        {
            let mut zipped = archive
                .by_name(&entry.name)
                .with_context(|| format!("bundle missing {}", entry.name))?;
            io::copy(&mut zipped, &mut writer)
                .with_context(|| format!("failed to extract {}", entry.name))?;
        }
        let (sha256, size) = writer.finish().context("failed to flush extracted entry")?;
        if sha256 != entry.sha256 || size != entry.size {
            let _ = std::fs::remove_file(&tmp_dst);
            return Err(anyhow!("checksum mismatch for {}", entry.name));
        }

        if dst.exists() {
            std::fs::remove_file(&dst).with_context(|| {
                format!("failed to remove existing {}", dst.to_string_lossy())
            })?;
        }
        std::fs::rename(&tmp_dst, &dst)
            .with_context(|| format!("failed to move extracted entry to {}", dst.to_string_lossy()))?;
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

// Only plain relative components; no `..`, roots or prefixes.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn importing_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".importing");
    dst.with_file_name(name)
}

fn hash_file(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut f, &mut hasher)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn finish(mut self) -> io::Result<(String, u64)> {
        self.inner.flush()?;
        Ok((format!("{:x}", self.hasher.finalize()), self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
