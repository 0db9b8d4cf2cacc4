//! Process-wide stream handler registry.
//!
//! Transports load service descriptions through [`open`], which picks the
//! handler registered for the URL scheme. `file`, `http` and `https` have
//! default handlers; the NTLM shim overrides `http`/`https` for a short,
//! scoped window (see [`crate::ntlm::NtlmScope`]).

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;
use url::Url;

/// Size information for an opened resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStat {
    pub size: u64,
}

/// An opened resource.
pub trait ResourceStream: Read + Seek + Send {
    fn stat(&mut self) -> io::Result<ResourceStat>;

    /// True once every byte has been read.
    fn eof(&self) -> bool;
}

/// Opens resources for one URL scheme.
pub trait StreamHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, url: &str) -> io::Result<Box<dyn ResourceStream>>;

    fn url_stat(&self, url: &str) -> io::Result<ResourceStat> {
        self.open(url)?.stat()
    }
}

/// Fully buffered resource.
#[derive(Debug, Clone)]
pub struct BufferedStream {
    buffer: Cursor<Vec<u8>>,
}

impl BufferedStream {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            buffer: Cursor::new(bytes),
        }
    }
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Seek for BufferedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl ResourceStream for BufferedStream {
    fn stat(&mut self) -> io::Result<ResourceStat> {
        Ok(ResourceStat {
            size: self.buffer.get_ref().len() as u64,
        })
    }

    fn eof(&self) -> bool {
        self.buffer.position() >= self.buffer.get_ref().len() as u64
    }
}

/// Local files, as `file://` URLs or plain paths.
#[derive(Debug, Default)]
pub struct FileHandler;

impl StreamHandler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&self, url: &str) -> io::Result<Box<dyn ResourceStream>> {
        let path = match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("not a file path: {}", url))
            })?,
            _ => PathBuf::from(url),
        };
        Ok(Box::new(BufferedStream::new(std::fs::read(path)?)))
    }
}

/// Plain HTTP(S) fetches.
#[derive(Debug, Default)]
pub struct HttpHandler;

impl StreamHandler for HttpHandler {
    fn name(&self) -> &'static str {
        "http"
    }

    fn open(&self, url: &str) -> io::Result<Box<dyn ResourceStream>> {
        debug!(url = %url, "Fetching resource");
        let bytes = reqwest::blocking::get(url)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(io::Error::other)?;
        Ok(Box::new(BufferedStream::new(bytes.to_vec())))
    }
}

type Registry = HashMap<String, Arc<dyn StreamHandler>>;

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(default_handlers()));

fn default_handlers() -> Registry {
    let mut handlers: Registry = HashMap::new();
    handlers.insert("file".to_string(), Arc::new(FileHandler));
    handlers.insert("http".to_string(), Arc::new(HttpHandler));
    handlers.insert("https".to_string(), Arc::new(HttpHandler));
    handlers
}

/// Handler currently registered for `scheme`.
pub fn handler_for(scheme: &str) -> Option<Arc<dyn StreamHandler>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&scheme.to_ascii_lowercase())
        .cloned()
}

/// Register `handler` for `scheme`, returning the one it replaces.
pub fn register(scheme: &str, handler: Arc<dyn StreamHandler>) -> Option<Arc<dyn StreamHandler>> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(scheme.to_ascii_lowercase(), handler)
}

/// Put back the default handler for `scheme` (or remove a custom scheme).
pub fn restore(scheme: &str) {
    let scheme = scheme.to_ascii_lowercase();
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    match default_handlers().remove(&scheme) {
        Some(handler) => {
            registry.insert(scheme, handler);
        }
        None => {
            registry.remove(&scheme);
        }
    }
}

/// Scheme used to pick a handler; paths and drive letters count as `file`.
fn scheme_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme().len() > 1 => parsed.scheme().to_string(),
        _ => "file".to_string(),
    }
}

/// Open `url` through the registered handler.
pub fn open(url: &str) -> io::Result<Box<dyn ResourceStream>> {
    let scheme = scheme_of(url);
    let handler = handler_for(&scheme).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no stream handler registered for '{}'", scheme),
        )
    })?;
    debug!(url = %url, handler = handler.name(), "Opening stream");
    handler.open(url)
}

/// Read a whole resource.
pub fn read_to_end(url: &str) -> io::Result<Vec<u8>> {
    let mut stream = open(url)?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}
