//! A forgiving unified-diff hunk applier for pasted patches.
//!
//! `paste-patch` takes the full text of a document and a unified-diff patch
//! (typically copied from a code review, a chat, or an AI assistant) and
//! rewrites the document hunk by hunk. It does not trust the line numbers in
//! the `@@ ... @@` headers. Each hunk is seated by searching the current text
//! for the hunk's *context* lines, so a patch still applies after the document
//! has drifted a little from the version the patch was made against.
//!
//! ## Getting Started
//!
//! ```rust
//! use paste_patch::apply_patch;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = "fn main() {\n    println!(\"Hello, world!\");\n}\n";
//! let patch = "\
//! @@ -1,3 +1,3 @@
//!  fn main() {
//! -    println!(\"Hello, world!\");
//! +    println!(\"Hello, patch!\");
//!  }
//! ";
//!
//! let patched = apply_patch(document, patch)?;
//! assert_eq!(patched, "fn main() {\n    println!(\"Hello, patch!\");\n}\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### The Patching Pipeline
//!
//! 1.  **Splitting:** [`split_hunks`] cuts the raw patch text at every line that
//!     starts with `@@`. Anything before the first header (file headers, prose)
//!     is discarded.
//! 2.  **Parsing:** [`Hunk::parse`] reads the header with [`HunkHeader::parse`]
//!     and classifies each body line as context, addition, or deletion.
//! 3.  **Searching:** [`find_context`] scans the document, starting at the
//!     cursor, for lines equal to the hunk's first context line and scores each
//!     candidate against the whole context *fingerprint*.
//! 4.  **Splicing:** [`Document::apply_hunk`] replaces the matched region with
//!     the hunk's context and added lines and moves the cursor past them.
//!
//! Hunks are applied strictly in order. Every hunk searches only at or after
//! the point where the previous hunk's content ended.
//!
//! ### Matching Rules
//!
//! - The first candidate whose every context line matches wins immediately.
//! - Otherwise the first candidate with the highest number of matching context
//!   lines is used, which lets the patch survive edits around the change.
//! - If no line equals the first context line, the hunk fails and the whole
//!   patch is rejected. The caller's document is never partially patched.
//!
//! ### Failure Isolation
//!
//! ```rust
//! use paste_patch::{apply_patch, ApplyError, HunkApplyError};
//!
//! let document = "alpha\nbeta\ngamma\n";
//! let patch = "\
//! @@ -1,2 +1,2 @@
//!  alpha
//! -beta
//! +BETA
//! @@ -9,2 +9,2 @@
//!  omega
//! -psi
//! +PSI
//! ";
//!
//! let err = apply_patch(document, patch).unwrap_err();
//! assert!(matches!(
//!     err,
//!     ApplyError::Hunk { index: 2, reason: HunkApplyError::ContextNotFound, .. }
//! ));
//! ```
//!
//! ## Feature Flags
//!
//! ### `parallel`
//!
//! - **Enabled by default.**
//! - Scores the candidate positions of a hunk in parallel with
//!   [`rayon`](https://crates.io/crates/rayon). The chosen position is always the
//!   same one the sequential scan would pick.
//! - Disable it with `default-features = false` for targets without threads:
//!   ```toml
//!   [dependencies]
//!   paste-patch = { version = "0.2.0", default-features = false }
//!   ```
use log::{debug, info, trace, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use similar::udiff::unified_diff;
use similar::TextDiff;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- Error Types ---

/// The reason a single hunk could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HunkApplyError {
    /// The hunk has no context lines, so there is nothing to search for.
    /// Only raised under [`EmptyContextPolicy::Fail`].
    #[error("Hunk has no context lines to anchor it")]
    EmptyContext,
    /// No line at or after the cursor equals the hunk's first context line.
    #[error("Context not found")]
    ContextNotFound,
    /// A deleted line did not match the document at its expected position.
    /// Only raised when [`ApplyOptions::verify_deletions`] is enabled.
    #[error("Deleted line {line} does not match: expected {expected:?}, found {found:?}")]
    DeletionMismatch {
        /// The 1-based line number in the document.
        line: usize,
        /// The payload of the deletion line in the hunk.
        expected: String,
        /// The document line at that position, if the document is long enough.
        found: Option<String>,
    },
}

/// Errors returned when applying a patch text to a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The input does not contain any `@@ -` hunk header.
    ///
    /// This is an informational condition: there is simply nothing to apply.
    #[error("Input does not contain a valid diff patch")]
    NotAPatch,
    /// A hunk could not be seated. No part of the patch was applied.
    #[error("Failed to apply hunk {index}: {reason}")]
    Hunk {
        /// The 1-based index of the hunk within the patch.
        index: usize,
        /// The raw text of the failing hunk, header included.
        hunk: String,
        #[source]
        reason: HunkApplyError,
    },
}

/// Errors raised by [`apply_patch_to_file`].
#[derive(Error, Debug)]
pub enum PatchError {
    /// There is no document at the target path to patch.
    #[error("Target document not found: {0}")]
    TargetNotFound(PathBuf),
    /// The user does not have permission to read or write to the specified path.
    #[error("Permission denied for path: {path:?}")]
    PermissionDenied { path: PathBuf },
    /// The target path exists but is a directory, not a file.
    #[error("Target path is a directory, not a file: {path:?}")]
    TargetIsDirectory { path: PathBuf },
    /// An I/O error occurred while reading or writing the document.
    #[error("I/O error while processing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The patch itself could not be applied.
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

// --- Configuration ---

/// What to do with a hunk that has no context lines (a pure insertion or a
/// pure deletion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyContextPolicy {
    /// Reject the hunk with [`HunkApplyError::EmptyContext`].
    #[default]
    Fail,
    /// Seat the hunk at the current cursor, clamped to the end of the document.
    InsertAtCursor,
}

/// Options for configuring how a patch is applied.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// If `true`, [`apply_patch_to_file`] does not write anything and returns a
    /// diff of the proposed change instead.
    pub dry_run: bool,
    /// How to seat hunks that have no context lines.
    pub empty_context: EmptyContextPolicy,
    /// If `true`, every deleted line must equal the document line it removes.
    /// Off by default: deletions are trusted positionally.
    pub verify_deletions: bool,
    /// Limits the search to this many lines after the cursor.
    /// `None` searches to the end of the document.
    pub search_window: Option<usize>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            empty_context: EmptyContextPolicy::Fail,
            verify_deletions: false,
            search_window: None,
        }
    }
}

impl ApplyOptions {
    /// Creates a new builder for `ApplyOptions`.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::{ApplyOptions, EmptyContextPolicy};
    /// let options = ApplyOptions::builder()
    ///     .dry_run(true)
    ///     .empty_context(EmptyContextPolicy::InsertAtCursor)
    ///     .search_window(Some(200))
    ///     .build();
    ///
    /// assert!(options.dry_run);
    /// assert_eq!(options.empty_context, EmptyContextPolicy::InsertAtCursor);
    /// assert!(!options.verify_deletions);
    /// assert_eq!(options.search_window, Some(200));
    /// ```
    pub fn builder() -> ApplyOptionsBuilder {
        ApplyOptionsBuilder::default()
    }
}

/// A builder for creating `ApplyOptions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptionsBuilder {
    dry_run: Option<bool>,
    empty_context: Option<EmptyContextPolicy>,
    verify_deletions: Option<bool>,
    search_window: Option<Option<usize>>,
}

impl ApplyOptionsBuilder {
    /// If `true`, no files will be modified. Instead, a diff of the proposed
    /// changes will be returned in [`PatchResult`].
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Sets the policy for hunks without context lines.
    pub fn empty_context(mut self, policy: EmptyContextPolicy) -> Self {
        self.empty_context = Some(policy);
        self
    }

    /// Requires deleted lines to match the document before they are removed.
    pub fn verify_deletions(mut self, verify: bool) -> Self {
        self.verify_deletions = Some(verify);
        self
    }

    /// Bounds the context search to `window` lines after the cursor.
    pub fn search_window(mut self, window: Option<usize>) -> Self {
        self.search_window = Some(window);
        self
    }

    /// Builds the `ApplyOptions`.
    pub fn build(self) -> ApplyOptions {
        let default = ApplyOptions::default();
        ApplyOptions {
            dry_run: self.dry_run.unwrap_or(default.dry_run),
            empty_context: self.empty_context.unwrap_or(default.empty_context),
            verify_deletions: self.verify_deletions.unwrap_or(default.verify_deletions),
            search_window: self.search_window.unwrap_or(default.search_window),
        }
    }
}

// --- Results ---

/// Describes how a hunk was seated in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Every context line matched at its offset.
    Exact,
    /// Only some context lines matched; this was the best candidate found.
    Partial {
        /// Number of context lines that matched.
        score: usize,
        /// Total number of context lines in the hunk.
        total: usize,
    },
    /// The hunk had no context and was seated at the cursor.
    Cursor,
}

/// Represents the region of the document a hunk replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkLocation {
    /// The 0-based line index where the hunk was seated.
    pub start_index: usize,
    /// The number of document lines replaced (the delete span).
    pub length: usize,
}

impl std::fmt::Display for HunkLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}", self.start_index + 1)
    }
}

/// The outcome of one successfully applied hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedHunk {
    /// Where the hunk was seated.
    pub location: HunkLocation,
    /// How the location was found.
    pub match_type: MatchType,
    /// The document lines that were replaced.
    pub replaced_lines: Vec<String>,
    /// The cursor the next hunk will search from.
    pub next_cursor: usize,
}

/// Per-hunk details of a successful patch application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// One entry per hunk, in patch order.
    pub hunks: Vec<AppliedHunk>,
}

impl ApplyReport {
    /// Returns `true` if every hunk's context matched exactly.
    pub fn all_exact(&self) -> bool {
        self.hunks
            .iter()
            .all(|h| !matches!(h.match_type, MatchType::Partial { .. }))
    }

    /// Returns the hunks that were seated on a partial context match, paired
    /// with their 1-based index.
    pub fn partial_matches(&self) -> Vec<(usize, &AppliedHunk)> {
        self.hunks
            .iter()
            .enumerate()
            .filter(|(_, h)| matches!(h.match_type, MatchType::Partial { .. }))
            .map(|(i, h)| (i + 1, h))
            .collect()
    }
}

/// The result of an in-memory patch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryResult {
    /// The new content after applying every hunk.
    pub new_content: String,
    /// Details for each applied hunk.
    pub report: ApplyReport,
}

/// The result of [`apply_patch_to_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// Details for each applied hunk.
    pub report: ApplyReport,
    /// A unified diff of the proposed change. Only populated in dry-run mode.
    pub diff: Option<String>,
}

// --- Data Structures ---

/// The role of a line inside a hunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// An unchanged line. Anything that does not start with `+` or `-`.
    Context,
    /// A line starting with `+`.
    Addition,
    /// A line starting with `-`.
    Deletion,
}

/// A single line of a hunk body with its marker character removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    /// The line without its leading marker.
    pub text: String,
}

impl HunkLine {
    /// Classifies a raw hunk line and strips its first character.
    ///
    /// An empty line is an empty context line.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::{HunkLine, LineKind};
    /// assert_eq!(HunkLine::parse("+added").kind, LineKind::Addition);
    /// assert_eq!(HunkLine::parse("-gone").text, "gone");
    /// assert_eq!(HunkLine::parse(" kept").kind, LineKind::Context);
    /// assert_eq!(HunkLine::parse("").text, "");
    /// ```
    pub fn parse(line: &str) -> Self {
        let kind = if line.starts_with('+') {
            LineKind::Addition
        } else if line.starts_with('-') {
            LineKind::Deletion
        } else {
            LineKind::Context
        };
        let mut chars = line.chars();
        chars.next();
        Self {
            kind,
            text: chars.as_str().to_string(),
        }
    }
}

/// The numbers in a `@@ -oldStart,oldLines +newStart,newLines @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    /// Defaults to 1 when the header omits it.
    pub old_lines: usize,
    pub new_start: usize,
    /// Defaults to 1 when the header omits it.
    pub new_lines: usize,
}

impl HunkHeader {
    /// Parses a hunk header line.
    ///
    /// Returns `None` if the line does not follow the
    /// `@@ -<n>[,<n>] +<n>[,<n>] @@` pattern. Text after the closing `@@`
    /// (such as a function name) is ignored.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::HunkHeader;
    /// let header = HunkHeader::parse("@@ -12,4 +12,5 @@ fn main() {").unwrap();
    /// assert_eq!((header.old_start, header.old_lines), (12, 4));
    /// assert_eq!((header.new_start, header.new_lines), (12, 5));
    ///
    /// let short = HunkHeader::parse("@@ -3 +3 @@").unwrap();
    /// assert_eq!(short.old_lines, 1);
    ///
    /// assert!(HunkHeader::parse("@@ garbage @@").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("@@ -")?;
        let (old, rest) = rest.split_once(" +")?;
        let (new, _) = rest.split_once(" @@")?;
        let (old_start, old_lines) = parse_range(old)?;
        let (new_start, new_lines) = parse_range(new)?;
        Some(Self {
            old_start,
            old_lines,
            new_start,
            new_lines,
        })
    }
}

/// Parses `start[,count]`, defaulting `count` to 1.
fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((parse_number(start)?, parse_number(count)?)),
        None => Some((parse_number(range)?, 1)),
    }
}

fn parse_number(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Represents a single hunk of changes within a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// The parsed header, or `None` if the header line was malformed.
    pub header: Option<HunkHeader>,
    /// The body lines, in order.
    pub lines: Vec<HunkLine>,
    /// The hunk text exactly as it appeared in the patch.
    pub raw: String,
}

impl Hunk {
    /// Parses one hunk fragment as produced by [`split_hunks`].
    ///
    /// The first line is the header. The newline that terminates the fragment
    /// does not produce an extra empty line, and `\ No newline at end of file`
    /// markers are skipped.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::{Hunk, LineKind};
    /// let hunk = Hunk::parse("@@ -1,2 +1,2 @@\n context\n-old\n+new\n");
    /// assert_eq!(hunk.header.unwrap().old_lines, 2);
    /// assert_eq!(hunk.lines.len(), 3);
    /// assert_eq!(hunk.lines[2].kind, LineKind::Addition);
    /// ```
    pub fn parse(text: &str) -> Self {
        let body = text.strip_suffix('\n').unwrap_or(text);
        let mut lines = body.split('\n');
        let header = lines.next().and_then(HunkHeader::parse);
        let lines = lines
            .filter(|l| !l.starts_with('\\'))
            .map(HunkLine::parse)
            .collect();
        Self {
            header,
            lines,
            raw: text.to_string(),
        }
    }

    /// Extracts the context fingerprint: the payloads of every context line,
    /// in order. This is the search key used to seat the hunk.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::Hunk;
    /// let hunk = Hunk::parse("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
    /// assert_eq!(hunk.context_lines(), vec!["a", "c"]);
    /// ```
    pub fn context_lines(&self) -> Vec<&str> {
        self.lines_of(|kind| kind == LineKind::Context)
    }

    /// Extracts the lines spliced into the document: context and additions,
    /// in order.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::Hunk;
    /// let hunk = Hunk::parse("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
    /// assert_eq!(hunk.replace_block(), vec!["a", "B", "c"]);
    /// ```
    pub fn replace_block(&self) -> Vec<&str> {
        self.lines_of(|kind| kind != LineKind::Deletion)
    }

    /// Extracts the added lines.
    pub fn added_lines(&self) -> Vec<&str> {
        self.lines_of(|kind| kind == LineKind::Addition)
    }

    /// Extracts the removed lines.
    pub fn removed_lines(&self) -> Vec<&str> {
        self.lines_of(|kind| kind == LineKind::Deletion)
    }

    fn lines_of(&self, keep: impl Fn(LineKind) -> bool) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| keep(l.kind))
            .map(|l| l.text.as_str())
            .collect()
    }

    /// Checks if the hunk contains any additions or deletions.
    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.kind != LineKind::Context)
    }

    /// The number of document lines this hunk replaces.
    ///
    /// This is the header's `oldLines` when it parsed and is nonzero, otherwise
    /// the number of context lines.
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::Hunk;
    /// assert_eq!(Hunk::parse("@@ -4,3 +4,3 @@\n a\n-b\n+c\n").delete_span(), 3);
    /// // A malformed header falls back to the context length.
    /// assert_eq!(Hunk::parse("@@ ?? @@\n a\n-b\n+c\n").delete_span(), 1);
    /// ```
    pub fn delete_span(&self) -> usize {
        match self.header {
            Some(header) if header.old_lines > 0 => header.old_lines,
            _ => self.context_lines().len(),
        }
    }
}

/// An ordered list of hunks parsed from a patch text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}

impl Patch {
    /// Parses a patch text into its hunks.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::NotAPatch`] if the text fails [`is_patch_like`].
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::{Patch, ApplyError};
    /// let patch = Patch::parse("--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n@@ -5 +5 @@\n-c\n+d\n").unwrap();
    /// assert_eq!(patch.hunks.len(), 2);
    /// assert_eq!(Patch::parse("just some text"), Err(ApplyError::NotAPatch));
    /// ```
    pub fn parse(text: &str) -> Result<Self, ApplyError> {
        if !is_patch_like(text) {
            return Err(ApplyError::NotAPatch);
        }
        let hunks: Vec<Hunk> = split_hunks(text).into_iter().map(Hunk::parse).collect();
        trace!("Parsed {} hunk(s) from patch text.", hunks.len());
        Ok(Self { hunks })
    }

    /// Creates a new `Patch` by diffing two texts.
    ///
    /// The patch, applied to `old_text`, reproduces `new_text`.
    pub fn from_texts(old_text: &str, new_text: &str, context_len: usize) -> Self {
        let diff_text = diff_texts(old_text, new_text, context_len);
        Self {
            hunks: split_hunks(&diff_text)
                .into_iter()
                .map(Hunk::parse)
                .collect(),
        }
    }
}

// --- Core Logic ---

/// Returns `true` if `text` contains a `@@ -` hunk header marker.
///
/// This is a cheap gate, not a validator.
///
/// # Example
///
/// ```
/// # use paste_patch::is_patch_like;
/// assert!(!is_patch_like("no diff here"));
/// assert!(is_patch_like("@@ -1,1 +1,1 @@"));
/// ```
pub fn is_patch_like(text: &str) -> bool {
    text.contains("@@ -")
}

/// Splits a patch text into hunk fragments.
///
/// The text is cut before every line that starts with `@@`. The fragment before
/// the first such line is discarded, and every returned fragment starts with its
/// own header line.
///
/// # Example
///
/// ```
/// # use paste_patch::split_hunks;
/// let patch = "diff --git a/f b/f\n@@ -1 +1 @@\n-a\n+b\n@@ -9 +9 @@\n-c\n+d\n";
/// assert_eq!(
///     split_hunks(patch),
///     vec!["@@ -1 +1 @@\n-a\n+b\n", "@@ -9 +9 @@\n-c\n+d\n"]
/// );
/// ```
pub fn split_hunks(patch: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in patch.split_inclusive('\n') {
        if line.starts_with("@@") {
            starts.push(offset);
        }
        offset += line.len();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(patch.len());
            &patch[start..end]
        })
        .collect()
}

/// Produces unified-diff hunk text that turns `old_text` into `new_text`.
///
/// The output has no file headers and can be fed straight to [`apply_patch`].
///
/// # Example
///
/// ```
/// # use paste_patch::{apply_patch, diff_texts};
/// let old = "one\ntwo\nthree\nfour\nfive\n";
/// let new = "one\ntwo\nTHREE\nfour\nfive\n";
/// let patch = diff_texts(old, new, 2);
/// assert!(patch.starts_with("@@ -1,5 +1,5 @@"));
/// assert_eq!(apply_patch(old, &patch).unwrap(), new);
/// ```
pub fn diff_texts(old_text: &str, new_text: &str, context_len: usize) -> String {
    TextDiff::from_lines(old_text, new_text)
        .unified_diff()
        .context_radius(context_len)
        .to_string()
}

/// A candidate position for a hunk and how many context lines matched there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    pub start_index: usize,
    pub score: usize,
}

impl MatchCandidate {
    /// Higher score wins; equal scores keep the earlier index.
    fn better(self, other: Self) -> Self {
        if other.score > self.score
            || (other.score == self.score && other.start_index < self.start_index)
        {
            other
        } else {
            self
        }
    }
}

/// Counts the fingerprint lines that equal the document line at the same
/// offset from `start`. Lines past the end of the document never match.
///
/// # Example
///
/// ```
/// # use paste_patch::match_score;
/// let lines = ["a", "b", "x", "d"];
/// assert_eq!(match_score(&lines, 0, &["a", "b", "c", "d"]), 3);
/// assert_eq!(match_score(&lines, 3, &["d", "e"]), 1);
/// ```
pub fn match_score<T: AsRef<str>>(target_lines: &[T], start: usize, fingerprint: &[&str]) -> usize {
    fingerprint
        .iter()
        .enumerate()
        .filter(|(k, expected)| {
            target_lines
                .get(start + k)
                .is_some_and(|line| line.as_ref() == **expected)
        })
        .count()
}

/// Searches for the best position of a context fingerprint at or after
/// `start_line`.
///
/// Only lines equal to the first fingerprint line are candidates. The earliest
/// candidate where the whole fingerprint matches is returned as soon as it is
/// found; otherwise the earliest candidate with the highest score wins.
/// `window` bounds the number of lines examined after `start_line`.
///
/// Returns `None` for an empty fingerprint or when no candidate exists.
///
/// # Example
///
/// ```
/// # use paste_patch::{find_context, MatchCandidate};
/// let lines = ["x", "y", "q", "x", "y", "z"];
/// // The partial match at 0 loses to the exact match at 3.
/// assert_eq!(
///     find_context(&lines, &["x", "y", "z"], 0, None),
///     Some(MatchCandidate { start_index: 3, score: 3 })
/// );
/// assert_eq!(find_context(&lines, &["zzz"], 0, None), None);
/// ```
pub fn find_context<T: AsRef<str> + Sync>(
    target_lines: &[T],
    fingerprint: &[&str],
    start_line: usize,
    window: Option<usize>,
) -> Option<MatchCandidate> {
    let first = *fingerprint.first()?;
    let end = window.map_or(target_lines.len(), |w| {
        start_line.saturating_add(w).min(target_lines.len())
    });
    if start_line >= end {
        trace!(
            "    Search range {}..{} is empty.",
            start_line,
            end
        );
        return None;
    }
    trace!(
        "    Searching lines {}..{} for a {}-line fingerprint anchored on {:?}",
        start_line,
        end,
        fingerprint.len(),
        first
    );

    let anchors = (start_line..end).filter(|&i| target_lines[i].as_ref() == first);

    // The earliest perfect anchor ends the search before any partial scoring.
    // Otherwise every anchor is scored independently and the reduction keeps
    // the earliest highest score.
    #[cfg(feature = "parallel")]
    let best = {
        let perfect = anchors
            .clone()
            .find(|&i| match_score(target_lines, i, fingerprint) == fingerprint.len());
        if let Some(i) = perfect {
            trace!("      Candidate index {} matched every context line.", i);
            return Some(MatchCandidate {
                start_index: i,
                score: fingerprint.len(),
            });
        }

        let anchors: Vec<usize> = anchors.collect();
        trace!("      Scoring {} anchor candidate(s) in parallel.", anchors.len());
        anchors
            .par_iter()
            .map(|&i| MatchCandidate {
                start_index: i,
                score: match_score(target_lines, i, fingerprint),
            })
            .reduce_with(MatchCandidate::better)
    };

    #[cfg(not(feature = "parallel"))]
    let best = {
        let mut best: Option<MatchCandidate> = None;
        for i in anchors {
            let candidate = MatchCandidate {
                start_index: i,
                score: match_score(target_lines, i, fingerprint),
            };
            trace!(
                "      Candidate index {} scored {}/{}",
                i,
                candidate.score,
                fingerprint.len()
            );
            if candidate.score == fingerprint.len() {
                return Some(candidate);
            }
            best = Some(best.map_or(candidate, |b| b.better(candidate)));
        }
        best
    };

    if let Some(candidate) = best {
        trace!(
            "      Selected index {} with score {}/{}",
            candidate.start_index,
            candidate.score,
            fingerprint.len()
        );
    }
    best
}

/// A strategy for seating a hunk in a document.
pub trait HunkFinder {
    /// Finds where to apply `hunk` in `target_lines`, searching at or after
    /// `start_line`.
    ///
    /// The returned location must lie within `target_lines`.
    fn find_location<T: AsRef<str> + Sync>(
        &self,
        hunk: &Hunk,
        target_lines: &[T],
        start_line: usize,
    ) -> Result<(HunkLocation, MatchType), HunkApplyError>;
}

/// The built-in, content-addressed strategy.
///
/// Header line numbers never influence the position; only `oldLines` is used,
/// as the delete span.
#[derive(Debug)]
pub struct DefaultHunkFinder<'a> {
    options: &'a ApplyOptions,
}

impl<'a> DefaultHunkFinder<'a> {
    /// Creates a new finder with the given options.
    pub fn new(options: &'a ApplyOptions) -> Self {
        Self { options }
    }
}

impl<'a> HunkFinder for DefaultHunkFinder<'a> {
    fn find_location<T: AsRef<str> + Sync>(
        &self,
        hunk: &Hunk,
        target_lines: &[T],
        start_line: usize,
    ) -> Result<(HunkLocation, MatchType), HunkApplyError> {
        let fingerprint = hunk.context_lines();

        if fingerprint.is_empty() {
            return match self.options.empty_context {
                EmptyContextPolicy::Fail => {
                    debug!("    Hunk has no context lines; refusing to guess a position.");
                    Err(HunkApplyError::EmptyContext)
                }
                EmptyContextPolicy::InsertAtCursor => {
                    let start_index = start_line.min(target_lines.len());
                    let length = hunk.delete_span().min(target_lines.len() - start_index);
                    debug!(
                        "    Hunk has no context lines; seating it at the cursor (index {}).",
                        start_index
                    );
                    Ok((
                        HunkLocation {
                            start_index,
                            length,
                        },
                        MatchType::Cursor,
                    ))
                }
            };
        }

        let candidate = find_context(
            target_lines,
            &fingerprint,
            start_line,
            self.options.search_window,
        )
        .ok_or_else(|| {
            debug!(
                "    No line at or after index {} equals the first context line {:?}.",
                start_line, fingerprint[0]
            );
            HunkApplyError::ContextNotFound
        })?;

        let total = fingerprint.len();
        let match_type = if candidate.score == total {
            debug!("    Found exact match at index {}.", candidate.start_index);
            MatchType::Exact
        } else {
            debug!(
                "    Best match at index {} matched {}/{} context lines.",
                candidate.start_index, candidate.score, total
            );
            MatchType::Partial {
                score: candidate.score,
                total,
            }
        };

        let length = hunk
            .delete_span()
            .min(target_lines.len() - candidate.start_index);
        Ok((
            HunkLocation {
                start_index: candidate.start_index,
                length,
            },
            match_type,
        ))
    }
}

/// Checks every deletion against the document, laying the hunk's old side
/// (context and deletions) over the lines starting at `start`.
fn verify_deletions<T: AsRef<str>>(
    hunk: &Hunk,
    target_lines: &[T],
    start: usize,
) -> Result<(), HunkApplyError> {
    let old_side = hunk
        .lines
        .iter()
        .filter(|l| l.kind != LineKind::Addition)
        .enumerate();
    for (offset, line) in old_side {
        if line.kind != LineKind::Deletion {
            continue;
        }
        let found = target_lines.get(start + offset).map(|l| l.as_ref());
        if found != Some(line.text.as_str()) {
            return Err(HunkApplyError::DeletionMismatch {
                line: start + offset + 1,
                expected: line.text.clone(),
                found: found.map(String::from),
            });
        }
    }
    Ok(())
}

/// The text being patched, as lines, together with the search cursor.
///
/// Applying a hunk never mutates a `Document`; it produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    cursor: usize,
}

impl Document {
    /// Splits `text` on `\n`. A trailing newline becomes a final empty line,
    /// so [`Document::to_text`] reproduces the input exactly.
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(String::from).collect(),
            cursor: 0,
        }
    }

    /// Creates a document from lines, with the cursor at the start.
    pub fn from_lines<T: AsRef<str>>(lines: &[T]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.as_ref().to_string()).collect(),
            cursor: 0,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The index the next hunk's search starts from.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Joins the lines back into text.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Applies one hunk with the [`DefaultHunkFinder`].
    ///
    /// # Example
    ///
    /// ```
    /// # use paste_patch::{ApplyOptions, Document, Hunk, MatchType};
    /// let document = Document::from_lines(&["a", "b", "c", "d"]);
    /// let hunk = Hunk::parse("@@ -2,2 +2,2 @@\n b\n+x\n-c\n");
    ///
    /// let (patched, applied) = document.apply_hunk(&hunk, &ApplyOptions::default()).unwrap();
    /// assert_eq!(patched.lines(), ["a", "b", "x", "d"]);
    /// assert_eq!(applied.match_type, MatchType::Exact);
    /// assert_eq!(applied.replaced_lines, vec!["b", "c"]);
    /// assert_eq!(patched.cursor(), 3);
    /// // The input document is untouched.
    /// assert_eq!(document.lines(), ["a", "b", "c", "d"]);
    /// ```
    pub fn apply_hunk(
        &self,
        hunk: &Hunk,
        options: &ApplyOptions,
    ) -> Result<(Document, AppliedHunk), HunkApplyError> {
        self.apply_hunk_with(hunk, &DefaultHunkFinder::new(options), options)
    }

    /// Applies one hunk, seating it with a custom [`HunkFinder`].
    pub fn apply_hunk_with<F: HunkFinder>(
        &self,
        hunk: &Hunk,
        finder: &F,
        options: &ApplyOptions,
    ) -> Result<(Document, AppliedHunk), HunkApplyError> {
        let (location, match_type) = finder.find_location(hunk, &self.lines, self.cursor)?;

        let start = location.start_index.min(self.lines.len());
        let end = start.saturating_add(location.length).min(self.lines.len());
        if options.verify_deletions {
            verify_deletions(hunk, &self.lines, start)?;
        }
        if !hunk.has_changes() {
            debug!("    Hunk contains only context; content is unchanged.");
        }

        let replace_block = hunk.replace_block();
        let mut lines = Vec::with_capacity(self.lines.len() - (end - start) + replace_block.len());
        lines.extend_from_slice(&self.lines[..start]);
        lines.extend(replace_block.iter().map(|s| s.to_string()));
        lines.extend_from_slice(&self.lines[end..]);

        let next_cursor = start + replace_block.len();
        trace!(
            "    Replaced {} line(s) at index {} with {} line(s); cursor moves to {}.",
            end - start,
            start,
            replace_block.len(),
            next_cursor
        );

        let applied = AppliedHunk {
            location: HunkLocation {
                start_index: start,
                length: end - start,
            },
            match_type,
            replaced_lines: self.lines[start..end].to_vec(),
            next_cursor,
        };
        Ok((
            Document {
                lines,
                cursor: next_cursor,
            },
            applied,
        ))
    }
}

/// An iterator that applies hunks from a patch one by one.
///
/// Each step yields the outcome of one hunk. After the first failure the
/// iterator is exhausted; the intermediate document is still available, but
/// callers that want all-or-nothing semantics should discard it.
///
/// # Example
///
/// ```
/// # use paste_patch::{ApplyOptions, HunkApplier, Patch};
/// let patch = Patch::parse("@@ -1,2 +1,2 @@\n a\n-b\n+B\n@@ -3,2 +3,2 @@\n c\n-d\n+D\n").unwrap();
/// let options = ApplyOptions::default();
/// let mut applier = HunkApplier::new(&patch, "a\nb\nc\nd", &options);
///
/// let first = applier.next().unwrap().unwrap();
/// assert_eq!(first.next_cursor, 2);
/// assert_eq!(applier.document().to_text(), "a\nB\nc\nd");
///
/// let second = applier.next().unwrap().unwrap();
/// assert_eq!(second.location.start_index, 2);
/// assert!(applier.next().is_none());
///
/// let document = applier.into_document();
/// assert_eq!(document.cursor(), 4);
/// assert_eq!(document.to_text(), "a\nB\nc\nD");
/// ```
#[derive(Debug)]
pub struct HunkApplier<'a> {
    hunks: std::iter::Enumerate<std::slice::Iter<'a, Hunk>>,
    document: Document,
    options: &'a ApplyOptions,
    failed: bool,
}

impl<'a> HunkApplier<'a> {
    /// Creates a new `HunkApplier` over `content`.
    pub fn new(patch: &'a Patch, content: &str, options: &'a ApplyOptions) -> Self {
        Self {
            hunks: patch.hunks.iter().enumerate(),
            document: Document::new(content),
            options,
            failed: false,
        }
    }

    /// The document with every hunk applied so far.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consumes the applier and returns the current document.
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Consumes the applier and returns the current document as text.
    pub fn into_content(self) -> String {
        self.document.to_text()
    }
}

impl<'a> Iterator for HunkApplier<'a> {
    type Item = Result<AppliedHunk, ApplyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (i, hunk) = self.hunks.next()?;
        match self.document.apply_hunk(hunk, self.options) {
            Ok((document, applied)) => {
                self.document = document;
                Some(Ok(applied))
            }
            Err(reason) => {
                self.failed = true;
                Some(Err(ApplyError::Hunk {
                    index: i + 1,
                    hunk: hunk.raw.clone(),
                    reason,
                }))
            }
        }
    }
}

/// Applies a parsed [`Patch`] to `content` in memory.
///
/// Either every hunk applies and the new content is returned, or the first
/// failure is returned and nothing else happens.
///
/// # Example
///
/// ```
/// # use paste_patch::{apply_patch_to_content, ApplyOptions, MatchType, Patch};
/// let patch = Patch::parse("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n").unwrap();
/// let result = apply_patch_to_content(&patch, "a\nb\nc\n", &ApplyOptions::default()).unwrap();
///
/// assert_eq!(result.new_content, "a\nB\nc\n");
/// // "c" is not directly after "a" in the document, so only 1 of 2 context
/// // lines matched at their offsets.
/// assert_eq!(result.report.hunks[0].match_type, MatchType::Partial { score: 1, total: 2 });
/// ```
pub fn apply_patch_to_content(
    patch: &Patch,
    content: &str,
    options: &ApplyOptions,
) -> Result<InMemoryResult, ApplyError> {
    let total_hunks = patch.hunks.len();
    if total_hunks == 0 {
        warn!("  Patch contains no hunks; content is unchanged.");
    }

    let mut applier = HunkApplier::new(patch, content, options);
    let mut hunks = Vec::with_capacity(total_hunks);
    for i in 1..=total_hunks {
        info!("  Applying Hunk {}/{}...", i, total_hunks);
        match applier.next() {
            Some(Ok(applied)) => hunks.push(applied),
            Some(Err(error)) => {
                warn!("  {}", error);
                return Err(error);
            }
            None => break,
        }
    }

    Ok(InMemoryResult {
        new_content: applier.into_content(),
        report: ApplyReport { hunks },
    })
}

/// Applies a patch text to a document text with explicit options.
pub fn apply_patch_with_options(
    document: &str,
    patch_text: &str,
    options: &ApplyOptions,
) -> Result<InMemoryResult, ApplyError> {
    let patch = Patch::parse(patch_text)?;
    apply_patch_to_content(&patch, document, options)
}

/// Applies a patch text to a document text with default options.
///
/// # Errors
///
/// - [`ApplyError::NotAPatch`] if the patch text has no `@@ -` marker.
/// - [`ApplyError::Hunk`] naming the first hunk that could not be seated.
pub fn apply_patch(document: &str, patch_text: &str) -> Result<String, ApplyError> {
    apply_patch_with_options(document, patch_text, &ApplyOptions::default())
        .map(|result| result.new_content)
}

/// Converts a `std::io::Error` into a more specific `PatchError`.
fn map_io_error(path: PathBuf, e: std::io::Error) -> PatchError {
    match e.kind() {
        std::io::ErrorKind::NotFound => PatchError::TargetNotFound(path),
        std::io::ErrorKind::PermissionDenied => PatchError::PermissionDenied { path },
        std::io::ErrorKind::IsADirectory => PatchError::TargetIsDirectory { path },
        _ => PatchError::Io { path, source: e },
    }
}

/// Applies a patch text to the document stored at `target`.
///
/// The file is written only after every hunk applied. If any hunk fails, the
/// file is left exactly as it was. In dry-run mode nothing is written and the
/// result carries a unified diff of the proposed change.
///
/// # Example
///
/// ```
/// # use paste_patch::{apply_patch_to_file, ApplyOptions};
/// # use std::fs;
/// # use tempfile::tempdir;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempdir()?;
/// let path = dir.path().join("hello.txt");
/// fs::write(&path, "greeting\nHello, world!\n")?;
///
/// let patch = "@@ -1,2 +1,2 @@\n greeting\n-Hello, world!\n+Hello, patch!\n";
/// let result = apply_patch_to_file(&path, patch, ApplyOptions::default())?;
///
/// assert!(result.diff.is_none());
/// assert_eq!(fs::read_to_string(&path)?, "greeting\nHello, patch!\n");
/// # Ok(())
/// # }
/// ```
pub fn apply_patch_to_file(
    target: &Path,
    patch_text: &str,
    options: ApplyOptions,
) -> Result<PatchResult, PatchError> {
    info!("Applying patch to: {}", target.display());
    let patch = Patch::parse(patch_text)?;

    if target.is_dir() {
        return Err(PatchError::TargetIsDirectory {
            path: target.to_path_buf(),
        });
    }
    if !target.is_file() {
        return Err(PatchError::TargetNotFound(target.to_path_buf()));
    }

    let original_content =
        fs::read_to_string(target).map_err(|e| map_io_error(target.to_path_buf(), e))?;
    trace!(
        "  Read {} lines from target document.",
        original_content.lines().count()
    );

    let result = apply_patch_to_content(&patch, &original_content, &options)?;

    let mut diff = None;
    if options.dry_run {
        info!("  DRY RUN: Would write changes to '{}'", target.display());
        diff = Some(unified_diff(
            similar::Algorithm::default(),
            &original_content,
            &result.new_content,
            3,
            Some(("a", "b")),
        ));
    } else if result.new_content == original_content {
        info!("  Patch produced no changes; '{}' left as is.", target.display());
    } else {
        fs::write(target, &result.new_content)
            .map_err(|e| map_io_error(target.to_path_buf(), e))?;
        info!("  Successfully wrote changes to '{}'", target.display());
    }

    Ok(PatchResult {
        report: result.report,
        diff,
    })
}
