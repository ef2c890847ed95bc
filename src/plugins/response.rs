use std::io::{self, Write};

use crate::core::error::{BundlerError, Result};

/// A writer that counts the bytes passed through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The fully rendered body of one content request.
///
/// The declared length is fixed when the body is rendered; [`write_to`]
/// refuses to report success if a different number of bytes reached the
/// destination.
///
/// [`write_to`]: ResponseContent::write_to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContent {
    path: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl ResponseContent {
    /// Creates a response for `path` holding `bytes`.
    pub fn new<P: Into<String>>(path: P, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// The request path the content was rendered for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The group of the plugin that rendered the content, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The declared content length.
    pub fn content_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The rendered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The rendered bytes as text, replacing invalid UTF-8.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Streams the content to `out` and flushes it.
    ///
    /// # Errors
    ///
    /// Returns `ContentProcessing` when writing fails or the number of bytes
    /// written differs from the declared length.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<u64> {
        let mut counter = CountingWriter::new(out);
        let written = counter.write_all(&self.bytes);
        let flushed = counter.flush();
        written.and(flushed).map_err(|e| {
            BundlerError::content_processing_error(
                format!("Failed to write content for '{}'", self.path),
                Some(Box::new(e)),
            )
        })?;

        let count = counter.count();
        if count != self.content_length() {
            return Err(BundlerError::content_processing_error(
                format!(
                    "Content for '{}' declared {} bytes but {} were written",
                    self.path,
                    self.content_length(),
                    count
                ),
                None,
            ));
        }
        Ok(count)
    }
}
