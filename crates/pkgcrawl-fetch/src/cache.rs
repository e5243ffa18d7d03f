//! Content-addressed store for HTTP response bodies and their validators.
//!
//! Each URL maps to a body entry named by the blake3 hash of the URL, plus an
//! optional `<key>.info` entry holding `{"etag": .., "last-modified": ..}`.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use pkgcrawl_utils::{hash::hash_key, lock::FileLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use ureq::http::{
    header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED},
    HeaderMap, HeaderValue, Method,
};

use crate::error::{CacheError, CacheResult};

pub const INFO_SUFFIX: &str = ".info";

/// Binary archives are never worth the disk space.
const UNCACHED_CONTENT_TYPES: [&str; 2] = ["application/zip", "application/octet-stream"];

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
struct Validators {
    etag: Option<String>,
    #[serde(rename = "last-modified")]
    last_modified: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResponseCache {
    base_path: PathBuf,
    debug: bool,
}

impl ResponseCache {
    pub fn new(base_path: impl Into<PathBuf>) -> CacheResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|source| {
            CacheError::Io {
                action: "create cache directory",
                path: base_path.clone(),
                source,
            }
        })?;
        Ok(Self {
            base_path,
            debug: false,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Stable key for `url`; `suffix` distinguishes the validator entry.
    pub fn key(url: &str, suffix: &str) -> String {
        format!("{}{suffix}", hash_key(url))
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Exclusive per-URL lock serialising lookup, request and `record`.
    pub fn lock(&self, url: &str) -> CacheResult<FileLock> {
        Ok(FileLock::acquire_in(
            &self.base_path.join("locks"),
            &Self::key(url, ""),
        )?)
    }

    fn age(&self, key: &str) -> Option<Duration> {
        let modified = fs::metadata(self.path(key)).ok()?.modified().ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// True if a body exists for `url` and was written less than `max_age` ago.
    pub fn is_fresh(&self, url: &str, max_age: Duration) -> bool {
        let Some(age) = self.age(&Self::key(url, "")) else {
            return false;
        };
        let fresh = age < max_age;
        if self.debug {
            if fresh {
                debug!("Cached response for {} is fresh ({}s)", url, age.as_secs());
            } else {
                debug!(
                    "Cached response for {} is {}s old, needs validation",
                    url,
                    age.as_secs()
                );
            }
        }
        fresh
    }

    /// Returns the cached body for `url`, if any.
    pub fn retrieve(&self, url: &str) -> Option<Vec<u8>> {
        fs::read(self.path(&Self::key(url, ""))).ok()
    }

    /// `If-None-Match`/`If-Modified-Since` built from stored validators.
    ///
    /// Empty unless both the validator entry and the body entry exist, since a
    /// 304 is useless without a body to fall back on.
    pub fn conditional_headers(&self, url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let Ok(info) = fs::read(self.path(&Self::key(url, INFO_SUFFIX))) else {
            return headers;
        };
        if !self.path(&Self::key(url, "")).exists() {
            return headers;
        }
        let Ok(validators) = serde_json::from_slice::<Validators>(&info) else {
            return headers;
        };

        if let Some(value) = validators
            .etag
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = validators
            .last_modified
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(IF_MODIFIED_SINCE, value);
        }

        headers
    }

    /// Applies a response to the cache and returns the body the caller should use.
    ///
    /// * only `GET` with status 200 or 304 is considered
    /// * 304 returns the cached body and refreshes its timestamp, or the given
    ///   body untouched when nothing is cached
    /// * 200 is stored unless `Cache-Control: no-store` or an archive content type
    pub fn record(
        &self,
        method: &Method,
        url: &str,
        status: u16,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> CacheResult<Vec<u8>> {
        if *method != Method::GET {
            trace!("Skipping cache for {} {}", method, url);
            return Ok(body);
        }
        if status != 200 && status != 304 {
            trace!("Skipping cache for {} with status {}", url, status);
            return Ok(body);
        }

        let key = Self::key(url, "");

        if status == 304 {
            return match fs::read(self.path(&key)) {
                Ok(cached) => {
                    if self.debug {
                        debug!(
                            "Using cached content for {} from {}",
                            url,
                            self.path(&key).display()
                        );
                    }
                    self.touch(url)?;
                    Ok(cached)
                }
                Err(_) => Ok(body),
            };
        }

        let header = |name| headers.get(name).and_then(|h: &HeaderValue| h.to_str().ok());

        if header(CACHE_CONTROL)
            .is_some_and(|value| value.split(',').any(|field| field.trim() == "no-store"))
        {
            return Ok(body);
        }

        if let Some(content_type) = header(CONTENT_TYPE) {
            let mime = content_type.split(';').next().unwrap_or_default().trim();
            if UNCACHED_CONTENT_TYPES.contains(&mime) {
                if self.debug {
                    debug!("Skipping cache for {} since it is an archive", url);
                }
                return Ok(body);
            }
        }

        let validators = Validators {
            etag: header(ETAG).map(String::from),
            last_modified: header(LAST_MODIFIED).map(String::from),
        };

        if self.debug {
            debug!("Caching {} in {}", url, self.path(&key).display());
        }

        self.write_atomic(&key, &body)?;

        let info_key = Self::key(url, INFO_SUFFIX);
        if validators.etag.is_some() || validators.last_modified.is_some() {
            let info = serde_json::to_vec_pretty(&validators).unwrap_or_default();
            self.write_atomic(&info_key, &info)?;
        } else {
            let _ = fs::remove_file(self.path(&info_key));
        }

        Ok(body)
    }

    /// Refreshes the modification time of the body and validator entries.
    pub fn touch(&self, url: &str) -> CacheResult<()> {
        let now = SystemTime::now();
        for key in [Self::key(url, ""), Self::key(url, INFO_SUFFIX)] {
            let path = self.path(&key);
            let Ok(file) = OpenOptions::new().write(true).open(&path) else {
                continue;
            };
            file.set_modified(now).map_err(|source| {
                CacheError::Io {
                    action: "touch",
                    path,
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Deletes entries older than `ttl`, returning how many were removed.
    ///
    /// Lock files nobody holds are removed as well; they are not counted.
    pub fn sweep(&self, ttl: Duration) -> CacheResult<usize> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    action: "read cache directory",
                    path: self.base_path.clone(),
                    source,
                })
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or(Duration::ZERO);
            if age > ttl {
                fs::remove_file(&path).map_err(|source| {
                    CacheError::Io {
                        action: "remove",
                        path: path.clone(),
                        source,
                    }
                })?;
                removed += 1;
            }
        }

        let locks = self.sweep_locks()?;
        debug!("Swept {} stale cache entries and {} lock files", removed, locks);
        Ok(removed)
    }

    fn sweep_locks(&self) -> CacheResult<usize> {
        let dir = self.base_path.join("locks");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    action: "read lock directory",
                    path: dir,
                    source,
                })
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("lock") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(lock) = FileLock::try_acquire_in(&dir, name)? {
                lock.remove()?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_atomic(&self, key: &str, content: &[u8]) -> CacheResult<()> {
        let path = self.path(key);
        let tmp_path = self.path(&format!("{key}.part"));

        let io_err = |action, path: &Path| {
            let path = path.to_path_buf();
            move |source| {
                CacheError::Io {
                    action,
                    path,
                    source,
                }
            }
        };

        let mut file = File::create(&tmp_path).map_err(io_err("create", &tmp_path))?;
        file.write_all(content)
            .map_err(io_err("write", &tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(io_err("rename", &path))?;
        Ok(())
    }
}
