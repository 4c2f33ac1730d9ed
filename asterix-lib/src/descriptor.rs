//! The decoding context shared by every channel.
//!
//! A [FormatDescriptor] is built once from a definitions list file: a plain text file with
//! one definition file path per line. Paths that cannot be opened as given are retried
//! relative to the directory containing the list file. Individual definition files that
//! cannot be opened or parsed are logged and skipped; only a missing list file prevents
//! construction.
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error};

use crate::definition::{Definition, DefinitionParser, XmlParser};
use crate::{Error, Result};

/// Environment variable providing the path to the definitions list file.
pub const DEFINITIONS_ENV: &str = "ASTERIX_DEFINITIONS";

/// Read-only schema for every loaded ASTERIX category.
#[derive(Debug)]
pub struct FormatDescriptor {
    definition: Definition,
}

impl FormatDescriptor {
    #[must_use]
    pub fn new(definition: Definition) -> Self {
        Self { definition }
    }

    /// Build from the definitions list at `ini_path` using [XmlParser].
    ///
    /// # Errors
    /// [Error::Config] if the list file cannot be opened. Problems with the listed files are
    /// logged and do not fail construction.
    pub fn load<P: AsRef<Path>>(ini_path: P) -> Result<Self> {
        Self::load_with(ini_path, &XmlParser)
    }

    /// Build from the definitions list at `ini_path` using the provided parser.
    ///
    /// # Errors
    /// [Error::Config] if the list file cannot be opened.
    pub fn load_with<P: AsRef<Path>>(ini_path: P, parser: &dyn DefinitionParser) -> Result<Self> {
        let ini_path = ini_path.as_ref();
        let ini = File::open(ini_path).map_err(|source| Error::Config {
            path: ini_path.to_path_buf(),
            source,
        })?;
        let ini_dir = list_dir(ini_path);

        let mut definition = Definition::new();
        let mut reader = BufReader::new(ini);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    error!(path = ?ini_path, %err, "failed reading definitions list");
                    break;
                }
            }
            let entry = trim_eol(&line);
            if entry.is_empty() {
                continue;
            }
            let entry = entry_path(entry);

            let Some((path, file)) = open_listed(&entry, ini_dir.as_deref()) else {
                error!(path = ?entry, "failed to open definitions file");
                continue;
            };

            match parser.parse(&mut BufReader::new(file)) {
                Ok(categories) => {
                    debug!(?path, count = categories.len(), "loaded definitions");
                    definition.merge(&path, categories);
                }
                Err(err) => error!(?path, %err, "failed to parse definitions file"),
            }
        }

        Ok(Self::new(definition))
    }

    /// Build from the list file named by [DEFINITIONS_ENV].
    ///
    /// # Errors
    /// [Error::Config] if the variable is unset or the list file cannot be opened.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(DEFINITIONS_ENV).ok_or_else(|| Error::Config {
            path: PathBuf::from(format!("${DEFINITIONS_ENV}")),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "variable not set"),
        })?;
        Self::load(PathBuf::from(path))
    }

    #[must_use]
    pub fn definition(&self) -> &Definition {
        &self.definition
    }
}

/// Directory portion of the list file path, including the trailing separator, or `None`
/// when the path has no directory component.
fn list_dir(path: &Path) -> Option<String> {
    let s = path.to_string_lossy();
    let idx = s.rfind(['/', '\\'])?;
    if idx == 0 {
        return None;
    }
    Some(s[..=idx].to_string())
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

#[cfg(unix)]
fn entry_path(entry: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(entry))
}

#[cfg(not(unix))]
fn entry_path(entry: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(entry).into_owned())
}

fn open_listed(entry: &Path, ini_dir: Option<&str>) -> Option<(PathBuf, File)> {
    if let Ok(file) = File::open(entry) {
        return Some((entry.to_path_buf(), file));
    }
    let mut path = OsString::from(ini_dir?);
    path.push(entry);
    let path = PathBuf::from(path);
    let file = File::open(&path).ok()?;
    Some((path, file))
}

/// Guards one-time construction of a [FormatDescriptor].
///
/// Concurrent first use results in exactly one construction and every caller receives the
/// same `Arc`. A failed construction caches nothing, so a later call retries.
#[derive(Debug, Default)]
pub struct DescriptorCell {
    inner: Mutex<Option<Arc<FormatDescriptor>>>,
}

impl DescriptorCell {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Return the cached descriptor, constructing it with `init` if there is none yet.
    ///
    /// # Errors
    /// Any error returned by `init`.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<FormatDescriptor>>
    where
        F: FnOnce() -> Result<FormatDescriptor>,
    {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(descriptor) = guard.as_ref() {
            return Ok(Arc::clone(descriptor));
        }
        let descriptor = Arc::new(init()?);
        *guard = Some(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// The cached descriptor, if construction has succeeded.
    #[must_use]
    pub fn get(&self) -> Option<Arc<FormatDescriptor>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone)
    }
}

fn global() -> &'static DescriptorCell {
    static CELL: OnceLock<DescriptorCell> = OnceLock::new();
    CELL.get_or_init(DescriptorCell::new)
}

/// Process-wide descriptor built from [DEFINITIONS_ENV] on first use.
///
/// Returns `None`, after logging, if the definitions list cannot be opened; the next call
/// tries again.
#[must_use]
pub fn get_or_create_context() -> Option<Arc<FormatDescriptor>> {
    match global().get_or_try_init(FormatDescriptor::from_env) {
        Ok(descriptor) => Some(descriptor),
        Err(err) => {
            error!(%err, "failed to create format descriptor");
            None
        }
    }
}
