//! Execution-environment guards.
//!
//! Code that runs both during server rendering and in the browser receives an
//! explicit [`Environment`] instead of probing for browser globals. On the
//! server every accessor hands back an inert implementation with the same
//! signature as the real one, so callers never branch on context themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::sanitize::HtmlSanitizer;

/// Errors raised by [`Storage`] writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {used} of {quota} bytes in use, write needs {requested}")]
    QuotaExceeded {
        quota: usize,
        used: usize,
        requested: usize,
    },
}

/// Key/value storage with the `localStorage` / `sessionStorage` surface.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` if the write does not fit.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str);

    fn clear(&self);

    fn len(&self) -> usize;

    /// Name of the `index`th key, in the storage's iteration order.
    fn key(&self, index: usize) -> Option<String>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only view of the browser window.
pub trait Window: Send + Sync {
    fn location_href(&self) -> String;

    /// Viewport width and height in CSS pixels.
    fn inner_size(&self) -> (u32, u32);

    fn user_agent(&self) -> Option<String>;

    fn device_pixel_ratio(&self) -> f64;
}

/// Storage that remembers nothing. Writes succeed and are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStorage;

impl Storage for NoopStorage {
    fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove_item(&self, _key: &str) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn key(&self, _index: usize) -> Option<String> {
        None
    }
}

/// Window stand-in used outside the browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWindow;

impl Window for NoopWindow {
    fn location_href(&self) -> String {
        String::new()
    }

    fn inner_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn user_agent(&self) -> Option<String> {
        None
    }

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }
}

/// In-process storage with an optional byte quota.
///
/// Usage is measured as the UTF-8 length of every key plus its value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: Mutex::default(),
            quota: Some(quota),
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A panic mid-write cannot leave the map half-updated, so recover
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items();
        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let requested = key.len() + value.len();
            if used + requested > quota {
                return Err(StorageError::QuotaExceeded {
                    quota,
                    used,
                    requested,
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items().remove(key);
    }

    fn clear(&self) {
        self.items().clear();
    }

    fn len(&self) -> usize {
        self.items().len()
    }

    fn key(&self, index: usize) -> Option<String> {
        self.items().keys().nth(index).cloned()
    }
}

/// The browser-provided capabilities a host can inject.
#[derive(Clone, Default)]
pub struct BrowserCapabilities {
    pub local_storage: Option<Arc<dyn Storage>>,
    pub session_storage: Option<Arc<dyn Storage>>,
    pub window: Option<Arc<dyn Window>>,
    pub sanitizer: Option<Arc<dyn HtmlSanitizer>>,
}

impl BrowserCapabilities {
    #[must_use]
    pub fn with_local_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.local_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_session_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Arc<dyn Window>) -> Self {
        self.window = Some(window);
        self
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn HtmlSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }
}

impl fmt::Debug for BrowserCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserCapabilities")
            .field("local_storage", &self.local_storage.is_some())
            .field("session_storage", &self.session_storage.is_some())
            .field("window", &self.window.is_some())
            .field("sanitizer", &self.sanitizer.is_some())
            .finish()
    }
}

/// Where the calling code is executing, and what it may touch there.
#[derive(Debug, Clone)]
pub enum Environment {
    /// Server rendering: no browser APIs.
    Server,
    /// Client execution with the capabilities the host provided.
    Browser(BrowserCapabilities),
}

impl Environment {
    #[must_use]
    pub const fn server() -> Self {
        Self::Server
    }

    #[must_use]
    pub const fn browser(capabilities: BrowserCapabilities) -> Self {
        Self::Browser(capabilities)
    }

    #[must_use]
    pub const fn is_server(&self) -> bool {
        matches!(self, Self::Server)
    }

    #[must_use]
    pub const fn is_browser(&self) -> bool {
        matches!(self, Self::Browser(_))
    }

    const fn capabilities(&self) -> Option<&BrowserCapabilities> {
        match self {
            Self::Server => None,
            Self::Browser(caps) => Some(caps),
        }
    }

    /// `localStorage`, or a no-op storage outside the browser.
    #[must_use]
    pub fn local_storage(&self) -> Arc<dyn Storage> {
        self.capabilities()
            .and_then(|caps| caps.local_storage.clone())
            .unwrap_or_else(|| Arc::new(NoopStorage))
    }

    /// `sessionStorage`, or a no-op storage outside the browser.
    #[must_use]
    pub fn session_storage(&self) -> Arc<dyn Storage> {
        self.capabilities()
            .and_then(|caps| caps.session_storage.clone())
            .unwrap_or_else(|| Arc::new(NoopStorage))
    }

    /// The window, or a no-op window outside the browser.
    #[must_use]
    pub fn window(&self) -> Arc<dyn Window> {
        self.capabilities()
            .and_then(|caps| caps.window.clone())
            .unwrap_or_else(|| Arc::new(NoopWindow))
    }

    #[must_use]
    pub fn sanitizer(&self) -> Option<&dyn HtmlSanitizer> {
        self.capabilities()
            .and_then(|caps| caps.sanitizer.as_deref())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Server
    }
}
