use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure in the conversion/upload path maps onto exactly one of these
/// kinds; nothing is reported as a bare boolean or swallowed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("jpeg encode failed: {0}")]
    Encode(String),

    #[error("corrupt sjpg container: {0}")]
    CorruptContainer(String),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// `strip` is the 0-based index of the failing strip upload, or `None`
    /// when the whole payload was rejected (single-shot upload, dismiss).
    #[error("upload rejected{}: {reason}", strip_suffix(.strip))]
    UploadRejected {
        strip: Option<usize>,
        reason: String,
    },
}

fn strip_suffix(strip: &Option<usize>) -> String {
    match strip {
        Some(i) => format!(" at strip {i}"),
        None => String::new(),
    }
}
