//! Test doubles for the updater's collaborators.

use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::archive::ArchiveExtractor;
use crate::download::{Auth, HttpClient, HttpResponse};
use crate::error::UpdateError;
use crate::handoff::Handoff;
use crate::manager::{Confirmer, UpdateOffer};
use crate::release::{ReleaseInfo, ReleaseSource};

/// Build an in-memory zip archive. Files are stored executable.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Write a zip archive to `path`.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    fs::write(path, zip_bytes(entries)).unwrap();
}

/// Plays back a fixed sequence of responses.
enum Script {
    Sequence(Mutex<VecDeque<Result<HttpResponse, UpdateError>>>),
    Repeat(Result<HttpResponse, String>),
}

/// HTTP client returning scripted responses and counting requests.
pub struct ScriptedHttpClient {
    script: Script,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedHttpClient {
    /// Answer each request with the next entry; fail once they run out.
    pub fn new(responses: Vec<Result<HttpResponse, UpdateError>>) -> Self {
        Self::with_script(Script::Sequence(Mutex::new(responses.into())))
    }

    /// Answer every request the same way.
    pub fn repeating(response: Result<HttpResponse, UpdateError>) -> Self {
        Self::with_script(Script::Repeat(response.map_err(|e| e.to_string())))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str, _auth: Option<&Auth>) -> Result<HttpResponse, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        match &self.script {
            Script::Sequence(responses) => responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpdateError::NetworkError("script exhausted".to_string()))),
            Script::Repeat(Ok(response)) => Ok(response.clone()),
            Script::Repeat(Err(message)) => Err(UpdateError::NetworkError(message.clone())),
        }
    }
}

/// Extractor that writes a partial tree and then fails.
pub struct FailingExtractor;

impl ArchiveExtractor for FailingExtractor {
    fn extract(&self, _archive: &Path, out_dir: &Path) -> Result<(), UpdateError> {
        fs::create_dir_all(out_dir.join("bin"))?;
        fs::write(out_dir.join("bin").join("partial"), b"half")?;
        Err(UpdateError::IoError(std::io::Error::other("no space left on device")))
    }
}

/// Extractor that ignores the archive, writes `bin/tool` slowly and
/// records how many extractions ran at once.
pub struct SlowExtractor {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    runs: AtomicUsize,
}

impl SlowExtractor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ArchiveExtractor for SlowExtractor {
    fn extract(&self, _archive: &Path, out_dir: &Path) -> Result<(), UpdateError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        std::thread::sleep(self.delay);
        fs::create_dir_all(out_dir.join("bin"))?;
        fs::write(out_dir.join("bin").join("tool"), b"tool")?;

        self.runs.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Release source returning a fixed release, or failing.
pub struct StaticReleaseSource {
    release: Option<ReleaseInfo>,
    error_status: Option<u16>,
    calls: AtomicUsize,
}

impl StaticReleaseSource {
    pub fn new(release: ReleaseInfo) -> Self {
        Self {
            release: Some(release),
            error_status: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source whose server is unreachable.
    pub fn offline() -> Self {
        Self {
            release: None,
            error_status: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source whose server answers with `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            release: None,
            error_status: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for StaticReleaseSource {
    async fn fetch_latest_release(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<ReleaseInfo, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.error_status {
            return Err(UpdateError::DownloadFailed { status });
        }
        self.release
            .clone()
            .ok_or_else(|| UpdateError::NetworkError("connection refused".to_string()))
    }
}

/// Confirmer giving the same answer every time.
pub struct FixedConfirmer {
    answer: bool,
    offers: Mutex<Vec<UpdateOffer>>,
}

impl FixedConfirmer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            offers: Mutex::new(Vec::new()),
        }
    }

    pub fn offers(&self) -> Vec<UpdateOffer> {
        self.offers.lock().unwrap().clone()
    }
}

impl Confirmer for FixedConfirmer {
    fn confirm(&self, offer: &UpdateOffer) -> Result<bool, UpdateError> {
        self.offers.lock().unwrap().push(offer.clone());
        Ok(self.answer)
    }
}

/// Handoff that records requests instead of spawning anything.
#[derive(Default)]
pub struct RecordingHandoff {
    scheduled: Mutex<Vec<(PathBuf, PathBuf, Duration)>>,
}

impl RecordingHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<(PathBuf, PathBuf, Duration)> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl Handoff for RecordingHandoff {
    fn schedule(&self, old: &Path, new: &Path, delay: Duration) -> Result<(), UpdateError> {
        self.scheduled
            .lock()
            .unwrap()
            .push((old.to_path_buf(), new.to_path_buf(), delay));
        Ok(())
    }
}
