//! `fileext` keyword: match the extension of a file seen in an HTTP transaction
//!
//! ```text
//! alert http any any -> any any (fileext:"pdf"; sid:1;)
//! alert http any any -> any any (fileext:!"exe"; sid:2;)
//! ```

use tracing::debug;

use crate::error::DetectError;

use super::content::parse_content_string;
use super::{AppProto, File, FileFlags, SigMatchCtx, Signature};

pub const KEYWORD: &str = "fileext";

/// Parsed `fileext` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExtData {
    ext: Vec<u8>,
    negated: bool,
}

impl FileExtData {
    /// Parse a `fileext` argument (content-string syntax)
    pub fn parse(arg: &str) -> Result<Self, DetectError> {
        let content = parse_content_string(arg).map_err(|reason| DetectError::InvalidValue {
            keyword: KEYWORD,
            reason,
        })?;

        debug!(
            ext = %String::from_utf8_lossy(&content.pattern),
            negated = content.negated,
            "will look for fileext"
        );

        Ok(Self {
            ext: content.pattern,
            negated: content.negated,
        })
    }

    pub fn ext(&self) -> &[u8] {
        &self.ext
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Evaluate against `file` for transaction `tx_id`.
    ///
    /// A file without a name, or one belonging to another transaction, never
    /// matches, negated or not.
    pub fn matches(&self, file: &File, tx_id: u64) -> bool {
        let Some(name) = file.name.as_deref() else {
            return false;
        };
        if file.txid != tx_id {
            return false;
        }

        has_extension(name, &self.ext) != self.negated
    }
}

/// `name` ends in `.` followed by `ext` (case sensitive)
fn has_extension(name: &[u8], ext: &[u8]) -> bool {
    if name.len() <= ext.len() {
        return false;
    }
    let offset = name.len() - ext.len();
    name[offset - 1] == b'.' && &name[offset..] == ext
}

/// Keyword setup: parse `arg` and attach the match to `sig`.
///
/// Rejects signatures already bound to a non-HTTP application protocol. On
/// error the signature is left unchanged.
pub fn setup(sig: &mut Signature, arg: &str) -> Result<(), DetectError> {
    let data = FileExtData::parse(arg)?;

    if !matches!(sig.alproto, AppProto::Unknown | AppProto::Http) {
        return Err(DetectError::ConflictingKeywords {
            keyword: KEYWORD,
            required: AppProto::Http.name(),
            current: sig.alproto.name(),
        });
    }

    sig.file_matches.push(SigMatchCtx::FileExt(data));
    sig.alproto = AppProto::Http;
    sig.file_flags.insert(FileFlags::NEED_FILE | FileFlags::NEED_FILENAME);
    Ok(())
}
