//! Ingestion writer
//!
//! One writer drives one job through its whole life:
//!
//! ```text
//! Open -> Rotating -> Open -> ... -> Closing -> Done
//!   \________________________________________-> Cancelling -> Cancelled
//! ```
//!
//! Records are appended as NDJSON to a local buffer. Once the buffer reaches
//! the rotation threshold it is closed, gzipped, uploaded, and replaced by a
//! fresh file. [`IngestionWriter::close`] uploads what is left and reports
//! the job done; [`IngestionWriter::cancel`] reports a classified failure.
//! Every step runs to completion before the next one starts.

pub mod buffer;

pub use buffer::{BufferFile, BufferRegistry, FinishedBuffer};

use crate::api::{
    CreateJobRequest, FailType, FailureResult, JobControlClient, JobMetadata, SourceSummary,
    SuccessResult,
};
use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::events::{EventReporter, JobEvent, JobStatus, JobSummary};
use crate::normalize::Normalizer;
use crate::upload::{CloudUploaderFactory, UploadArtifact, UploadContext, UploadTarget, Uploader, UploaderFactory};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Writer Constants
// ============================================================================

/// Main buffer size that triggers rotation.
pub const DEFAULT_ROTATION_THRESHOLD_BYTES: u64 = 99_000_000;

/// `job_result.status` reported by a successful close.
pub const SUCCESS_STATUS: &str = "ready_for_loading";

/// Service-account key written for GCS stages.
pub const CREDENTIALS_FILE_NAME: &str = "service_account.json";

/// Debug log entries are cut to this many bytes.
pub const MAX_DEBUG_ENTRY_BYTES: usize = 4096;

/// What the job is, as registered with the ingestion service
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub source: String,
    pub record_type: String,
    pub config_id: String,
    pub metadata: Value,
    pub priority: Option<i64>,
    pub is_snapshot: bool,
}

impl JobRequest {
    pub fn new(source: impl Into<String>, record_type: impl Into<String>, config_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            record_type: record_type.into(),
            config_id: config_id.into(),
            metadata: json!({}),
            priority: None,
            is_snapshot: false,
        }
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn snapshot(mut self, is_snapshot: bool) -> Self {
        self.is_snapshot = is_snapshot;
        self
    }

    fn to_wire(&self) -> CreateJobRequest {
        CreateJobRequest {
            source: self.source.clone(),
            record_type: self.record_type.clone(),
            config_id: self.config_id.clone(),
            is_snapshot: self.is_snapshot,
            priority: self.priority,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Buffer directory. Defaults to the system temp dir for signed-URL
    /// uploads and the working directory otherwise.
    pub work_dir: Option<PathBuf>,
    pub rotation_threshold: u64,
    /// Delete the buffer file and its artifact after a successful upload.
    pub remove_uploaded: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            work_dir: None,
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD_BYTES,
            remove_uploaded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Rotating,
    Closing,
    Done,
    Cancelling,
    Cancelled,
}

impl WriterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WriterState::Done | WriterState::Cancelled)
    }
}

pub struct IngestionWriter {
    job_id: String,
    request: JobRequest,
    job_metadata: Value,
    backend: &'static str,
    jobs: Arc<JobControlClient>,
    uploader: Box<dyn Uploader>,
    buffers: BufferRegistry,
    credentials_file: Option<PathBuf>,
    rotation_threshold: u64,
    remove_uploaded: bool,
    state: WriterState,
    bytes_written: u64,
    uploads: u64,
    pass_counter: u64,
    fail_counter: u64,
    debug_log: BTreeSet<String>,
    events: EventReporter,
}

impl std::fmt::Debug for IngestionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionWriter")
            .field("job_id", &self.job_id)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl IngestionWriter {
    /// Create the job and open the first buffer, uploading through the real
    /// cloud backends.
    pub async fn create(config: &Config, request: JobRequest) -> Result<Self> {
        let factory = CloudUploaderFactory::new(config)?;
        Self::create_with(config, request, WriterOptions::default(), &factory).await
    }

    #[instrument(skip_all, fields(source = %request.source, config_id = %request.config_id))]
    pub async fn create_with(
        config: &Config,
        request: JobRequest,
        options: WriterOptions,
        factory: &dyn UploaderFactory,
    ) -> Result<Self> {
        let jobs = Arc::new(JobControlClient::from_config(config)?);
        let created = jobs.create_job(&request.to_wire()).await?;
        let target = UploadTarget::from_stage(created.stage_details.as_ref(), jobs.is_partner())?;

        let work_dir = match options.work_dir {
            Some(dir) => dir,
            None if target == UploadTarget::SignedUrl => std::env::temp_dir(),
            None => PathBuf::from("."),
        };
        std::fs::create_dir_all(&work_dir)?;

        let credentials_file = match &target {
            UploadTarget::Gcs {
                credentials_json, ..
            } => Some(write_credentials_file(&work_dir, credentials_json)?),
            _ => None,
        };

        let ctx = UploadContext {
            job_id: &created.job_id,
            jobs: &jobs,
            credentials_file: credentials_file.as_deref(),
        };
        let uploader = match factory.create(&target, ctx).await {
            Ok(uploader) => uploader,
            Err(e) => {
                remove_file_if_exists(credentials_file.as_deref());
                return Err(e);
            },
        };

        let mut buffers = BufferRegistry::new(&work_dir);
        if let Err(e) = buffers.open_main() {
            remove_file_if_exists(credentials_file.as_deref());
            return Err(e);
        }

        info!(
            job_id = %created.job_id,
            backend = target.backend_name(),
            work_dir = %work_dir.display(),
            "Ingestion writer ready"
        );

        let writer = Self {
            job_id: created.job_id,
            request,
            job_metadata: created.metadata,
            backend: target.backend_name(),
            jobs,
            uploader,
            buffers,
            credentials_file,
            rotation_threshold: options.rotation_threshold.max(1),
            remove_uploaded: options.remove_uploaded,
            state: WriterState::Open,
            bytes_written: 0,
            uploads: 0,
            pass_counter: 0,
            fail_counter: 0,
            debug_log: BTreeSet::new(),
            events: EventReporter::new(config.partner_tenant_id.clone(), config.partner_client_id.clone()),
        };
        writer.emit(JobStatus::InProgress, None);
        Ok(writer)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Metadata returned by the ingestion service at job creation.
    pub fn job_metadata(&self) -> &Value {
        &self.job_metadata
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Size of the current main buffer.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Artifacts uploaded so far.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn work_dir(&self) -> &Path {
        self.buffers.dir()
    }

    pub fn credentials_file(&self) -> Option<&Path> {
        self.credentials_file.as_deref()
    }

    pub fn record_pass(&mut self) {
        self.pass_counter += 1;
    }

    pub fn record_fail(&mut self, reason: &str) {
        self.fail_counter += 1;
        self.add_debug_log(reason);
    }

    pub fn add_debug_log(&mut self, entry: &str) {
        let entry = sanitize_debug_entry(entry);
        if !entry.is_empty() {
            self.debug_log.insert(entry);
        }
    }

    pub fn debug_log(&self) -> impl Iterator<Item = &str> {
        self.debug_log.iter().map(String::as_str)
    }

    /// Append one record to the main buffer, rotating once it reaches the
    /// threshold.
    pub async fn write<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<()> {
        self.ensure_writable()?;
        let line = encode_line(record)?;
        self.bytes_written = self.buffers.main_mut()?.append(&line)?;

        if self.bytes_written >= self.rotation_threshold {
            self.rotate().await?;
        }
        Ok(())
    }

    /// Append one record to the named side buffer. Side buffers never rotate.
    pub async fn write_custom<T: Serialize + ?Sized>(&mut self, record: &T, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let line = encode_line(record)?;
        self.buffers.custom_mut(name)?.append(&line)?;
        Ok(())
    }

    /// Write everything the normalizer has buffered, in order.
    pub async fn write_all(&mut self, normalizer: &mut dyn Normalizer) -> Result<usize> {
        let records = normalizer.drain();
        let count = records.len();
        for record in &records {
            self.write(record).await?;
        }
        debug!(normalizer = normalizer.name(), count, "Wrote normalized records");
        Ok(count)
    }

    #[instrument(skip(self), fields(job_id = %self.job_id))]
    async fn rotate(&mut self) -> Result<()> {
        self.state = WriterState::Rotating;

        if let Some(finished) = self.buffers.finish_main()? {
            self.upload_file(&finished.path).await?;
            info!("Ingested data: {} bytes", finished.len);
        }

        self.buffers.open_main()?;
        self.bytes_written = 0;
        self.state = WriterState::Open;
        Ok(())
    }

    async fn upload_file(&mut self, path: &Path) -> Result<()> {
        let artifact_path = dassana_common::compression::gzip_file(path).map_err(|e| {
            IngestError::stage_write(format!("Failed to compress {}: {}", path.display(), e))
        })?;
        let artifact = UploadArtifact::from_path(&artifact_path)?;

        self.uploader.upload(&artifact).await?;
        self.uploads += 1;

        if self.remove_uploaded {
            remove_file_if_exists(Some(path));
            remove_file_if_exists(Some(&artifact_path));
        }
        Ok(())
    }

    /// Upload what is left, report the job done and clean up the credential
    /// file. The only path that reports success.
    ///
    /// Only an `Open` writer can close. After a failed rotation or a failed
    /// close some data never reached the stage, so the job has to be
    /// cancelled instead.
    #[instrument(skip(self, debug_log), fields(job_id = %self.job_id))]
    pub async fn close<I, S>(&mut self, pass_counter: u64, fail_counter: u64, debug_log: I) -> Result<Value>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_closable()?;
        self.state = WriterState::Closing;
        self.pass_counter = pass_counter;
        self.fail_counter = fail_counter;
        for entry in debug_log {
            self.add_debug_log(entry.as_ref());
        }

        let outcome = self.finish_and_report().await;
        remove_file_if_exists(self.credentials_file.as_deref());

        let response = outcome?;
        self.state = WriterState::Done;
        self.emit(JobStatus::ReadyForLoading, None);
        Ok(response)
    }

    async fn finish_and_report(&mut self) -> Result<Value> {
        if let Some(finished) = self.buffers.finish_main()? {
            if self.bytes_written > 0 {
                self.upload_file(&finished.path).await?;
                info!("Ingested remaining data: {} bytes", self.bytes_written);
                self.bytes_written = 0;
            } else {
                remove_file_if_exists(Some(&finished.path));
            }
        }

        for (name, finished) in self.buffers.finish_custom()? {
            if finished.len > 0 {
                self.upload_file(&finished.path).await?;
                debug!(buffer = %name, bytes = finished.len, "Uploaded custom buffer");
            } else {
                remove_file_if_exists(Some(&finished.path));
            }
        }

        let metadata = JobMetadata {
            job_result: SuccessResult {
                status: SUCCESS_STATUS.to_string(),
                source: SourceSummary {
                    pass: self.pass_counter,
                    fail: self.fail_counter,
                    debug_log: self.debug_log.iter().cloned().collect(),
                },
            },
        };
        self.jobs.report_done(&self.job_id, &metadata).await
    }

    /// Report `error` as the job's failure.
    ///
    /// The credential file is removed before anything else. If the report is
    /// rejected a bare `cancel` report is sent instead; if that fails too its
    /// error is returned.
    #[instrument(skip(self, error), fields(job_id = %self.job_id, kind = ?error.kind()))]
    pub async fn cancel(&mut self, error: &IngestError) -> Result<Value> {
        remove_file_if_exists(self.credentials_file.as_deref());
        self.ensure_not_terminal()?;
        self.state = WriterState::Cancelling;

        let abandoned = self.buffers.close_all();
        if !abandoned.is_empty() {
            debug!(files = abandoned.len(), "Left unuploaded buffers on disk");
        }

        let kind = error.kind();
        self.add_debug_log(&error.debug_entry());
        let metadata = JobMetadata {
            job_result: FailureResult {
                failure_reason: error.failure_reason(),
                status: kind.status().to_string(),
                debug_log: self.debug_log.iter().cloned().collect(),
                pass: self.pass_counter,
                fail: self.fail_counter,
                error_code: kind.error_code().to_string(),
            },
        };

        let reported = match self.jobs.report_failure(&self.job_id, &metadata, kind.fail_type()).await {
            Ok(response) => Ok(response),
            Err(report_error) => {
                warn!(error = %report_error, "Failure report rejected, sending fallback cancel");
                self.jobs
                    .report_failure(&self.job_id, &json!({}), FailType::Cancel)
                    .await
            },
        };

        self.state = WriterState::Cancelled;
        self.emit(JobStatus::Failed, Some(error));
        reported
    }

    fn emit(&self, status: JobStatus, error: Option<&IngestError>) {
        let event = JobEvent::new(&self.request.source, status)
            .with_job(&self.job_id)
            .with_connection(&self.request.config_id);
        let summary = match status {
            JobStatus::InProgress => None,
            JobStatus::ReadyForLoading | JobStatus::Failed => Some(JobSummary {
                pass: self.pass_counter,
                fail: self.fail_counter,
                debug_log: self.debug_log.iter().cloned().collect(),
            }),
        };
        self.events.emit(&event, summary.as_ref(), error);
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            other => Err(IngestError::invalid_state(format!(
                "Cannot write while writer is {:?}",
                other
            ))),
        }
    }

    fn ensure_closable(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            other => Err(IngestError::invalid_state(format!(
                "Cannot close job {} while writer is {:?}; cancel it instead",
                self.job_id, other
            ))),
        }
    }

    fn ensure_not_terminal(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(IngestError::invalid_state(format!(
                "Job {} is already {:?}",
                self.job_id, self.state
            )));
        }
        Ok(())
    }
}

impl Drop for IngestionWriter {
    fn drop(&mut self) {
        remove_file_if_exists(self.credentials_file.as_deref());
    }
}

fn encode_line<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

fn write_credentials_file(dir: &Path, contents: &str) -> Result<PathBuf> {
    let path = dir.join(CREDENTIALS_FILE_NAME);
    std::fs::write(&path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(path)
}

/// Best-effort delete; a missing file is not an error.
fn remove_file_if_exists(path: Option<&Path>) {
    let Some(path) = path else { return };
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

/// Collapse control characters and whitespace runs, then cap the length on a
/// char boundary.
pub fn sanitize_debug_entry(entry: &str) -> String {
    let mut clean = entry
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if clean.len() > MAX_DEBUG_ENTRY_BYTES {
        let mut cut = MAX_DEBUG_ENTRY_BYTES;
        while !clean.is_char_boundary(cut) {
            cut -= 1;
        }
        clean.truncate(cut);
    }
    clean
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_control_characters() {
        assert_eq!(
            sanitize_debug_entry("line one\n\tline\u{0007}two  "),
            "line one line two"
        );
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_DEBUG_ENTRY_BYTES);
        let clean = sanitize_debug_entry(&long);
        assert!(clean.len() <= MAX_DEBUG_ENTRY_BYTES);
        assert!(clean.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line(&json!({"a": 1})).unwrap(), b"{\"a\":1}\n");
    }

    #[test]
    fn test_job_request_builder() {
        let request = JobRequest::new("aws_s3_access", "snapshot", "cfg-1")
            .priority(0)
            .snapshot(true)
            .metadata(json!({"k": "v"}));
        let wire = request.to_wire();
        assert_eq!(wire.priority, Some(0));
        assert!(wire.is_snapshot);
        assert_eq!(wire.metadata["k"], "v");
    }

    #[test]
    fn test_credentials_file_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credentials_file(dir.path(), "{}").unwrap();
        assert_eq!(path.file_name().unwrap(), CREDENTIALS_FILE_NAME);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        remove_file_if_exists(Some(&path));
        assert!(!path.exists());
        remove_file_if_exists(Some(&path));
    }
}
