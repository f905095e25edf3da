pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by index cache persistence.
///
/// Read-side problems never surface here: a missing, stale, or corrupt entry is
/// reported as a cache miss instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {message}")]
    Json { message: String },

    #[error("batch update has {files} files but {timestamps} modification timestamps")]
    BatchLengthMismatch { files: usize, timestamps: usize },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        // Symbol payloads and file tables carry workspace paths; keep them out of error text.
        Self::Json {
            message: redact_quoted(&err.to_string()),
        }
    }
}

fn redact_quoted(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        out.push_str(&rest[..=start]);
        rest = &rest[start + 1..];

        let bytes = rest.as_bytes();
        let mut end = None;
        let mut escaped = false;
        for (idx, &b) in bytes.iter().enumerate() {
            match b {
                b'\\' if !escaped => escaped = true,
                b'"' if !escaped => {
                    end = Some(idx);
                    break;
                }
                _ => escaped = false,
            }
        }

        match end {
            Some(end) => {
                out.push_str("<redacted>\"");
                rest = &rest[end + 1..];
            }
            None => {
                out.push_str("<redacted>");
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
