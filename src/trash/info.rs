//! `.trashinfo` sidecars: `[Trash Info]` with a percent-encoded `Path=` and a UTC
//! `DeletionDate=`.

use crate::errors::{FileOpError, FileOpErrorCode, FileOpResult};
use chrono::Utc;
use std::{
    borrow::Cow,
    fmt::Write as _,
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

pub const TRASH_INFO_EXT: &str = "trashinfo";
const HEADER: &str = "[Trash Info]";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashInfo {
    pub original_path: PathBuf,
    pub deletion_date: Option<String>,
}

impl TrashInfo {
    pub fn now(original_path: &Path) -> Self {
        Self {
            original_path: original_path.to_path_buf(),
            deletion_date: Some(Utc::now().format(DATE_FORMAT).to_string()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{HEADER}\nPath={}\n",
            encode_trash_info_path(&self.original_path)
        );
        if let Some(date) = &self.deletion_date {
            out.push_str("DeletionDate=");
            out.push_str(date);
            out.push('\n');
        }
        out
    }

    pub fn parse(contents: &str) -> FileOpResult<Self> {
        let mut in_section = false;
        let mut path = None;
        let mut date = None;
        for line in contents.lines().map(str::trim) {
            if line.starts_with('[') {
                in_section = line == HEADER;
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some(value) = line.strip_prefix("Path=") {
                path = Some(decode_trash_info_path(value)?);
            } else if let Some(value) = line.strip_prefix("DeletionDate=") {
                date = Some(value.to_string());
            }
        }
        let original_path = path.ok_or_else(|| {
            FileOpError::invalid_path("Invalid trash info: no Path entry in [Trash Info]")
        })?;
        Ok(Self {
            original_path,
            deletion_date: date,
        })
    }
}

/// Sidecar path for an item named `name` under `info_root`.
pub fn info_path_for(info_root: &Path, name: &std::ffi::OsStr) -> PathBuf {
    let mut file = name.to_os_string();
    file.push(".");
    file.push(TRASH_INFO_EXT);
    info_root.join(file)
}

pub fn read_trash_info(path: &Path) -> FileOpResult<TrashInfo> {
    let contents = fs::read_to_string(path).map_err(|e| {
        FileOpError::from_io_error(&format!("Failed to read trash info {}", path.display()), e)
    })?;
    TrashInfo::parse(&contents)
}

/// Writes the sidecar to a temp sibling and renames it over `path`.
pub fn write_trash_info(path: &Path, info: &TrashInfo) -> FileOpResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| FileOpError::invalid_path(format!("Invalid info path: {}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{name}.tmp-{}", std::process::id()));
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(info.render().as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        FileOpError::from_io_error(&format!("Failed to write trash info {}", path.display()), e)
    })
}

fn percent_encode_segment(segment: &[u8], out: &mut String) {
    for byte in segment {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char);
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
}

/// Percent-encodes every byte outside the unreserved set, keeping `/` separators.
pub fn encode_trash_info_path(path: &Path) -> String {
    let bytes = path_bytes(path);
    let mut out = String::with_capacity(bytes.len().saturating_mul(3).max(1));
    let absolute = bytes.starts_with(b"/");
    if absolute {
        out.push('/');
    }
    let mut first_segment = true;
    for segment in bytes[usize::from(absolute)..].split(|b| *b == b'/') {
        if segment.is_empty() {
            continue;
        }
        if !first_segment {
            out.push('/');
        }
        percent_encode_segment(segment, &mut out);
        first_segment = false;
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out
    }
}

pub fn decode_trash_info_path(encoded: &str) -> FileOpResult<PathBuf> {
    fn hex_val(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }
    let invalid = |at: usize| {
        FileOpError::new(
            FileOpErrorCode::InvalidPath,
            format!("Invalid percent encoding at index {at} in '{encoded}'"),
        )
    };

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(invalid(i));
            }
            let hi = hex_val(bytes[i + 1]).ok_or_else(|| invalid(i + 1))?;
            let lo = hex_val(bytes[i + 2]).ok_or_else(|| invalid(i + 2))?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    if out.is_empty() {
        return Err(FileOpError::invalid_path("Invalid trash info: empty Path"));
    }
    path_from_bytes(out)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> FileOpResult<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> FileOpResult<PathBuf> {
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|_| FileOpError::invalid_path("Invalid trash info: Path is not UTF-8"))
}
