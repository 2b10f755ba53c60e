//! Export sinks
//!
//! A sink is a byte stream with an explicit end. `finish` marks the output
//! complete; `abort` leaves it in a state a caller can tell apart from a
//! valid, possibly empty, result.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination of an export stream
pub trait ExportSink {
    /// Append bytes to the stream
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Mark the stream complete
    fn finish(&mut self) -> io::Result<()>;

    /// Mark the stream incomplete. Must not fail.
    fn abort(&mut self, reason: &str);
}

/// Sink over any writer. Completion state is kept on the sink.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    finished: bool,
    aborted: Option<String>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            finished: false,
            aborted: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reason given to `abort`, if the stream was aborted
    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ExportSink for WriterSink<W> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        let _ = self.writer.flush();
        self.aborted = Some(reason.to_string());
    }
}

/// File sink writing to `<path>.partial`, renamed to `<path>` on finish.
///
/// An aborted export leaves the `.partial` file behind and never touches
/// `<path>`.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    partial_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create the partial file, truncating any leftover from an earlier run
    pub fn create(path: &Path) -> io::Result<Self> {
        let partial_path = partial_path_for(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            partial_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }
}

impl ExportSink for FileSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::Other, "export sink already closed")),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "export sink already closed"))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial_path, &self.path)
    }

    fn abort(&mut self, _reason: &str) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// `<path>.partial`
pub fn partial_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
