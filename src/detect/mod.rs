//! Signature match keywords
//!
//! Keywords are registered once at start-up in a [`KeywordTable`]. Setting up
//! a keyword parses its argument and attaches a [`SigMatchCtx`] to the
//! signature; the context is owned by the signature and dropped with it.
//!
//! Only file keywords are provided here (`fileext`); the rest of the rule
//! language lives elsewhere.

pub mod content;
pub mod fileext;

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DetectError;

pub use fileext::FileExtData;

/// Application protocol a signature is bound to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppProto {
    #[default]
    Unknown,
    Http,
    Dns,
}

impl AppProto {
    pub fn name(&self) -> &'static str {
        match self {
            AppProto::Unknown => "unknown",
            AppProto::Http => "http",
            AppProto::Dns => "dns",
        }
    }
}

impl fmt::Display for AppProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// File inspection requirements of a signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileFlags(u8);

impl FileFlags {
    pub const NEED_FILE: FileFlags = FileFlags(0x01);
    pub const NEED_FILENAME: FileFlags = FileFlags(0x02);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FileFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        FileFlags(self.0 | rhs.0)
    }
}

/// A file observed in an application-layer transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    pub name: Option<Vec<u8>>,
    /// Transaction the file belongs to
    pub txid: u64,
}

impl File {
    pub fn new(name: Option<Vec<u8>>, txid: u64) -> Self {
        Self { name, txid }
    }
}

/// Per-signature match state, one variant per keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigMatchCtx {
    FileExt(FileExtData),
}

impl SigMatchCtx {
    pub fn keyword(&self) -> &'static str {
        match self {
            SigMatchCtx::FileExt(_) => fileext::KEYWORD,
        }
    }

    /// Evaluate a file match for transaction `tx_id`
    pub fn file_match(&self, file: &File, tx_id: u64) -> bool {
        match self {
            SigMatchCtx::FileExt(data) => data.matches(file, tx_id),
        }
    }
}

/// The part of a signature the file keywords act on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub alproto: AppProto,
    pub file_flags: FileFlags,
    pub file_matches: Vec<SigMatchCtx>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every file match of the signature matches `file`.
    /// A signature without file matches never matches a file.
    pub fn file_match(&self, file: &File, tx_id: u64) -> bool {
        !self.file_matches.is_empty() && self.file_matches.iter().all(|m| m.file_match(file, tx_id))
    }
}

pub type SetupFn = fn(&mut Signature, &str) -> Result<(), DetectError>;

/// Registration record of a match keyword
#[derive(Clone, Copy)]
pub struct Keyword {
    pub name: &'static str,
    /// Protocol the keyword inspects
    pub alproto: AppProto,
    pub setup: SetupFn,
}

impl fmt::Debug for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyword")
            .field("name", &self.name)
            .field("alproto", &self.alproto)
            .finish_non_exhaustive()
    }
}

/// Keyword registration table, filled at start-up and read-only afterwards
#[derive(Debug, Default)]
pub struct KeywordTable {
    keywords: Vec<Keyword>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in keyword registered
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(Keyword {
            name: fileext::KEYWORD,
            alproto: AppProto::Http,
            setup: fileext::setup,
        });
        table
    }

    /// Register `keyword`, replacing an earlier one of the same name
    pub fn register(&mut self, keyword: Keyword) {
        debug!(keyword = keyword.name, "registering rule option");
        match self.keywords.iter_mut().find(|k| k.name == keyword.name) {
            Some(existing) => *existing = keyword,
            None => self.keywords.push(keyword),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Keyword> {
        self.keywords.iter().find(|k| k.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keywords.iter().map(|k| k.name)
    }

    /// Run the setup of keyword `name` with argument `arg` on `sig`
    pub fn setup(&self, sig: &mut Signature, name: &str, arg: &str) -> Result<(), DetectError> {
        let keyword = self
            .lookup(name)
            .ok_or_else(|| DetectError::UnknownKeyword(name.to_string()))?;
        (keyword.setup)(sig, arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let table = KeywordTable::with_builtins();
        let kw = table.lookup("fileext").unwrap();
        assert_eq!(kw.alproto, AppProto::Http);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["fileext"]);
    }

    #[test]
    fn test_unknown_keyword() {
        let table = KeywordTable::with_builtins();
        let mut sig = Signature::new();
        assert_eq!(
            table.setup(&mut sig, "filemagic", "pdf"),
            Err(DetectError::UnknownKeyword("filemagic".into()))
        );
    }

    #[test]
    fn test_signature_file_match_all() {
        let table = KeywordTable::with_builtins();
        let mut sig = Signature::new();
        table.setup(&mut sig, "fileext", "gz").unwrap();
        table.setup(&mut sig, "fileext", "!\"tgz\"").unwrap();

        let f = File::new(Some(b"backup.tar.gz".to_vec()), 9);
        assert!(sig.file_match(&f, 9));
        assert!(!sig.file_match(&f, 8));

        let g = File::new(Some(b"backup.zip".to_vec()), 9);
        assert!(!sig.file_match(&g, 9));
    }

    #[test]
    fn test_signature_without_file_matches() {
        let sig = Signature::new();
        assert!(!sig.file_match(&File::new(Some(b"a.pdf".to_vec()), 0), 0));
    }

    #[test]
    fn test_register_replaces() {
        fn reject(_: &mut Signature, _: &str) -> Result<(), DetectError> {
            Err(DetectError::InvalidValue {
                keyword: "fileext",
                reason: "disabled".into(),
            })
        }

        let mut table = KeywordTable::with_builtins();
        table.register(Keyword {
            name: "fileext",
            alproto: AppProto::Http,
            setup: reject,
        });
        assert_eq!(table.names().count(), 1);
        assert!(table.setup(&mut Signature::new(), "fileext", "pdf").is_err());
    }

    #[test]
    fn test_file_flags() {
        let mut flags = FileFlags::empty();
        assert!(flags.is_empty());
        flags.insert(FileFlags::NEED_FILE | FileFlags::NEED_FILENAME);
        assert_eq!(flags.bits(), 0x03);
        assert!(flags.contains(FileFlags::NEED_FILENAME));
    }
}
