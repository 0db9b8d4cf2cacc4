//! NTLM-authenticated stream shim.
//!
//! Some services only hand out their WSDL behind NTLM. While a client is
//! being constructed, [`NtlmScope`] swaps the `http`/`https` stream handlers
//! for [`NtlmStreamHandler`], which fetches each resource once over a fresh,
//! non-reusable connection and serves reads from memory. Dropping the scope
//! puts the previous handlers back on every exit path.

use std::cell::Cell;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use curl::easy::{Auth, Easy, HttpVersion};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::stream::{self, ResourceStat, ResourceStream, StreamHandler};

/// Schemes overridden while a scope is installed.
const SHIMMED_SCHEMES: &[&str] = &["http", "https"];

/// Serializes installations; the handler swap is process-wide.
static INSTALL_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) fn lock_installs() -> MutexGuard<'static, ()> {
    INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    static INSTALLED_HERE: Cell<bool> = Cell::new(false);
}

/// NTLM username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct NtlmCredentials {
    username: String,
    password: String,
}

impl NtlmCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for NtlmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Stream handler performing NTLM-authenticated fetches.
#[derive(Debug, Clone)]
pub struct NtlmStreamHandler {
    credentials: NtlmCredentials,
}

impl NtlmStreamHandler {
    pub fn new(credentials: NtlmCredentials) -> Self {
        Self { credentials }
    }
}

impl StreamHandler for NtlmStreamHandler {
    fn name(&self) -> &'static str {
        "ntlm"
    }

    fn open(&self, url: &str) -> io::Result<Box<dyn ResourceStream>> {
        debug!(url = %url, "NTLM stream open");
        Ok(Box::new(NtlmStream::fetch(url, &self.credentials)?))
    }
}

/// A resource fetched in full over NTLM.
pub struct NtlmStream {
    url: String,
    buffer: Cursor<Vec<u8>>,
    handle: Option<Easy>,
}

impl NtlmStream {
    /// Fetch `url` into memory with a single authenticated request.
    pub fn fetch(url: &str, credentials: &NtlmCredentials) -> io::Result<Self> {
        let (mut handle, bytes) = perform_fetch(url, credentials).map_err(io::Error::other)?;
        check_status(url, handle.response_code().map_err(io::Error::other)?)?;
        debug!(url = %url, size = bytes.len(), "NTLM stream buffer created");
        Ok(Self {
            url: url.to_string(),
            buffer: Cursor::new(bytes),
            handle: Some(handle),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_buffer(url: &str, bytes: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            buffer: Cursor::new(bytes),
            handle: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn position(&self) -> u64 {
        self.buffer.position()
    }
}

fn check_status(url: &str, code: u32) -> io::Result<()> {
    let kind = match code {
        200..=299 => return Ok(()),
        401 | 403 => io::ErrorKind::PermissionDenied,
        404 => io::ErrorKind::NotFound,
        _ => io::ErrorKind::Other,
    };
    Err(io::Error::new(kind, format!("HTTP status {} for {}", code, url)))
}

fn perform_fetch(url: &str, credentials: &NtlmCredentials) -> Result<(Easy, Vec<u8>), curl::Error> {
    let mut handle = Easy::new();
    handle.url(url)?;
    handle.http_version(HttpVersion::V11)?;
    handle.forbid_reuse(true)?;
    handle.fresh_connect(true)?;

    let mut auth = Auth::new();
    auth.ntlm(true);
    handle.http_auth(&auth)?;
    handle.username(credentials.username())?;
    handle.password(credentials.password())?;

    let mut bytes = Vec::new();
    {
        let mut transfer = handle.transfer();
        transfer.write_function(|data| {
            bytes.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }
    Ok((handle, bytes))
}

impl Read for NtlmStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.buffer.read(buf)?;
        debug!(requested = buf.len(), read, "NTLM stream read");
        Ok(read)
    }
}

impl Seek for NtlmStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl ResourceStream for NtlmStream {
    fn stat(&mut self) -> io::Result<ResourceStat> {
        Ok(ResourceStat {
            size: self.buffer.get_ref().len() as u64,
        })
    }

    fn eof(&self) -> bool {
        self.buffer.position() >= self.buffer.get_ref().len() as u64
    }
}

impl Drop for NtlmStream {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            debug!(url = %self.url, "NTLM stream close");
        }
    }
}

/// Installed NTLM handlers; the previous handlers return on drop.
pub struct NtlmScope {
    previous: Vec<(&'static str, Option<Arc<dyn StreamHandler>>)>,
    _guard: MutexGuard<'static, ()>,
}

impl NtlmScope {
    /// Install the shim, blocking while another thread holds a scope.
    ///
    /// Not re-entrant: fails with `WouldBlock` if this thread already holds one.
    pub fn install(credentials: NtlmCredentials) -> io::Result<Self> {
        if INSTALLED_HERE.with(Cell::get) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "NTLM stream shim is already installed on this thread",
            ));
        }
        let guard = lock_installs();
        INSTALLED_HERE.with(|installed| installed.set(true));
        let handler: Arc<dyn StreamHandler> = Arc::new(NtlmStreamHandler::new(credentials));
        let previous = SHIMMED_SCHEMES
            .iter()
            .map(|scheme| (*scheme, stream::register(scheme, handler.clone())))
            .collect();
        debug!("NTLM stream handler installed");
        Ok(Self {
            previous,
            _guard: guard,
        })
    }
}

impl Drop for NtlmScope {
    fn drop(&mut self) {
        for (scheme, previous) in self.previous.drain(..) {
            match previous {
                Some(handler) => {
                    stream::register(scheme, handler);
                }
                None => stream::restore(scheme),
            }
        }
        INSTALLED_HERE.with(|installed| installed.set(false));
        debug!("Default stream handlers restored");
    }
}

/// Run `f` with the NTLM shim installed.
pub fn with_ntlm<T>(credentials: NtlmCredentials, f: impl FnOnce() -> T) -> io::Result<T> {
    let _scope = NtlmScope::install(credentials)?;
    Ok(f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn creds() -> NtlmCredentials {
        NtlmCredentials::new("DOMAIN\\user", "secret")
    }

    fn http_handler_name() -> &'static str {
        stream::handler_for("http").map(|h| h.name()).unwrap_or("none")
    }

    #[test]
    fn test_stream_serves_reads_from_buffer() {
        let mut stream = NtlmStream::from_buffer("http://host/svc?wsdl", b"<definitions/>".to_vec());
        assert_eq!(stream.url(), "http://host/svc?wsdl");
        assert_eq!(stream.stat().unwrap().size, 14);
        assert!(!stream.eof());

        let mut first = [0u8; 4];
        stream.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"<def");
        assert_eq!(stream.position(), 4);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(stream.eof());

        stream.seek(SeekFrom::Start(0)).unwrap();
        assert!(!stream.eof());
    }

    #[test]
    fn test_scope_installs_and_restores() {
        with_ntlm(creds(), || {
            assert_eq!(http_handler_name(), "ntlm");
            assert_eq!(stream::handler_for("https").unwrap().name(), "ntlm");
            assert_eq!(stream::handler_for("file").unwrap().name(), "file");
        })
        .unwrap();

        let _guard = lock_installs();
        assert_eq!(http_handler_name(), "http");
        assert_eq!(stream::handler_for("https").unwrap().name(), "http");
    }

    #[test]
    fn test_scope_restores_on_panic() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            with_ntlm::<()>(creds(), || panic!("construction failed"))
        }));
        assert!(result.is_err());

        let _guard = lock_installs();
        assert_eq!(http_handler_name(), "http");
    }

    #[test]
    fn test_nested_install_fails_instead_of_blocking() {
        let nested = with_ntlm(creds(), || {
            let inner = NtlmScope::install(creds());
            assert_eq!(inner.err().map(|e| e.kind()), Some(io::ErrorKind::WouldBlock));
            assert_eq!(http_handler_name(), "ntlm");
            with_ntlm(creds(), || ()).is_err()
        })
        .unwrap();
        assert!(nested);

        drop(NtlmScope::install(creds()).unwrap());
        let _guard = lock_installs();
        assert_eq!(http_handler_name(), "http");
    }

    #[test]
    fn test_non_success_status_is_an_error() {
        assert!(check_status("http://host/svc?wsdl", 200).is_ok());
        assert!(check_status("http://host/svc?wsdl", 204).is_ok());

        let denied = check_status("http://host/svc?wsdl", 401).unwrap_err();
        assert_eq!(denied.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(denied.to_string(), "HTTP status 401 for http://host/svc?wsdl");
        assert_eq!(check_status("http://host/x", 404).unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(check_status("http://host/x", 500).unwrap_err().kind(), io::ErrorKind::Other);
        assert!(check_status("http://host/x", 302).is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("DOMAIN\\\\user"));
        assert!(!rendered.contains("secret"));
    }
}
