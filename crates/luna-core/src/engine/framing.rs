//! Wire framing for exec-channel transfers
//!
//! Copy-in sends a gzip-compressed tar, base64-encoded, to
//! `cat | base64 -d | tar xvfz - -C <dir>`. Copy-out receives the base64 text
//! of an uncompressed tar produced by `tar cf - -C <dir> . | base64`.
//! Everything here is synchronous and meant to run on the blocking pool.

use std::io::{self, Read, Seek};
use std::path::{Component, Path};

use base64::engine::general_purpose::STANDARD;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::SpooledTempFile;

use crate::error::{LunaError, LunaResult};

/// Remote command that unpacks a copy-in payload into `container_path`
pub fn copy_in_command(container_path: &str) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!(
            "cat | base64 -d | tar xvfz - -C {}",
            shell_words::quote(container_path)
        ),
    ]
}

/// Remote command that streams `container_path` out as base64 tar
pub fn copy_out_command(container_path: &str) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!(
            "tar cf - -C {} . | base64",
            shell_words::quote(container_path)
        ),
    ]
}

/// Remote command that creates the completion marker
pub fn marker_command(marker: &str) -> Vec<String> {
    vec!["touch".to_string(), marker.to_string()]
}

fn io_error(action: &str, err: io::Error) -> LunaError {
    LunaError::transfer(format!("{}: {}", action, err))
}

/// Incrementally built gzip tar archive
pub struct ArchiveWriter {
    builder: tar::Builder<GzEncoder<SpooledTempFile>>,
}

impl ArchiveWriter {
    pub fn new(spool_threshold: usize) -> Self {
        let encoder = GzEncoder::new(SpooledTempFile::new(spool_threshold), Compression::default());
        Self {
            builder: tar::Builder::new(encoder),
        }
    }

    /// Append one regular file whose content must be exactly `size` bytes
    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        size: u64,
        mtime: u64,
        mut reader: R,
    ) -> LunaResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(0o644);
        header.set_mtime(mtime);

        let mut counted = CountingReader::new((&mut reader).take(size));
        self.builder
            .append_data(&mut header, name, &mut counted)
            .map_err(|e| LunaError::transfer_with_path(format!("failed to archive file: {}", e), name))?;
        let written = counted.count;

        let mut extra = [0u8; 1];
        let longer = reader
            .read(&mut extra)
            .map_err(|e| LunaError::transfer_with_path(e.to_string(), name))?
            > 0;
        if written != size || longer {
            return Err(LunaError::transfer_with_path(
                format!(
                    "content length does not match stat ({} bytes expected, {})",
                    size,
                    if longer {
                        "more found".to_string()
                    } else {
                        format!("{} found", written)
                    }
                ),
                name,
            ));
        }
        Ok(())
    }

    /// Finish the archive and return it rewound
    pub fn finish(self) -> LunaResult<SpooledTempFile> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| io_error("failed to finish archive", e))?;
        let mut archive = encoder
            .finish()
            .map_err(|e| io_error("failed to finish compression", e))?;
        archive
            .rewind()
            .map_err(|e| io_error("failed to rewind archive", e))?;
        Ok(archive)
    }
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Drops ASCII whitespace, so line-wrapped base64 decodes cleanly
struct SkipWhitespace<R> {
    inner: R,
}

impl<R: Read> Read for SkipWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let byte = buf[i];
                if !byte.is_ascii_whitespace() {
                    buf[kept] = byte;
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Base64-encode `input` into a new rewound buffer
pub fn encode_base64<R: Read>(mut input: R, spool_threshold: usize) -> LunaResult<SpooledTempFile> {
    let mut encoder =
        base64::write::EncoderWriter::new(SpooledTempFile::new(spool_threshold), &STANDARD);
    io::copy(&mut input, &mut encoder).map_err(|e| io_error("failed to encode payload", e))?;
    let mut encoded = encoder
        .finish()
        .map_err(|e| io_error("failed to encode payload", e))?;
    encoded
        .rewind()
        .map_err(|e| io_error("failed to rewind payload", e))?;
    Ok(encoded)
}

/// Decode base64 text, ignoring line breaks, into a new rewound buffer
pub fn decode_base64<R: Read>(input: R, spool_threshold: usize) -> LunaResult<SpooledTempFile> {
    let mut decoder = base64::read::DecoderReader::new(SkipWhitespace { inner: input }, &STANDARD);
    let mut decoded = SpooledTempFile::new(spool_threshold);
    io::copy(&mut decoder, &mut decoded).map_err(|e| io_error("invalid base64 output", e))?;
    decoded
        .rewind()
        .map_err(|e| io_error("failed to rewind archive", e))?;
    Ok(decoded)
}

/// Relative path of an archive entry with `./` and `/` markers removed
///
/// `None` for entries that name the archive root itself.
pub fn entry_relative_path(raw: &Path) -> LunaResult<Option<String>> {
    let mut parts = Vec::new();
    for component in raw.components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => continue,
            Component::ParentDir => {
                return Err(LunaError::transfer_with_path(
                    "archive entry escapes the target directory",
                    raw.display().to_string(),
                ));
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join("/")))
    }
}

/// Walk an uncompressed tar and hand every regular file to `on_file`
///
/// Directories, links and other entry types are skipped. Returns the number
/// of files visited.
pub fn for_each_file<R, F>(archive: R, mut on_file: F) -> LunaResult<usize>
where
    R: Read,
    F: FnMut(String, Vec<u8>) -> LunaResult<()>,
{
    let mut archive = tar::Archive::new(archive);
    let entries = archive
        .entries()
        .map_err(|e| io_error("unreadable archive", e))?;

    let mut files = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| io_error("corrupt archive entry", e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw_path = entry
            .path()
            .map_err(|e| io_error("archive entry has an invalid path", e))?
            .into_owned();
        let Some(relative) = entry_relative_path(&raw_path)? else {
            continue;
        };

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| LunaError::transfer_with_path(e.to_string(), relative.as_str()))?;
        on_file(relative, content)?;
        files += 1;
    }
    Ok(files)
}
