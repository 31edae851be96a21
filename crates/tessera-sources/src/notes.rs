use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tessera_core::{Document, NoteSource, NotesConfig, TesseraError};

/// Maximum note size to read (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Metadata parsed from a note's `---` frontmatter block.
///
/// # Examples
///
/// ```
/// use tessera_sources::notes::parse_note;
///
/// let (meta, body) = parse_note("---\ntitle: Paris\ntags: [travel, france]\n---\nBody text.");
/// assert_eq!(meta.title.as_deref(), Some("Paris"));
/// assert!(meta.has_tag("france"));
/// assert_eq!(body, "Body text.");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    /// `title:` value.
    pub title: Option<String>,
    /// Values of `tag:` and `tags:` (inline list or block list).
    pub tags: Vec<String>,
}

impl Frontmatter {
    /// Whether the note carries `tag`; a leading `#` on either side is ignored.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim().trim_start_matches('#');
        !wanted.is_empty() && self.tags.iter().any(|t| t == wanted)
    }
}

/// Split a note into frontmatter and body.
///
/// Only flat `key: value` pairs and simple lists are understood, which covers
/// the fields notes are selected by. A note without frontmatter returns
/// defaults and the whole content as body.
pub fn parse_note(content: &str) -> (Frontmatter, &str) {
    let Some((block, body)) = split_frontmatter(content) else {
        return (Frontmatter::default(), content);
    };

    let mut meta = Frontmatter::default();
    let mut list_key: Option<String> = None;

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if matches!(list_key.as_deref(), Some("tag" | "tags")) {
                push_tag(&mut meta.tags, item);
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            list_key = None;
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        list_key = Some(key.clone());

        match key.as_str() {
            "title" if !value.is_empty() => meta.title = Some(unquote(value).to_string()),
            "tag" | "tags" if !value.is_empty() => {
                let inner = value
                    .strip_prefix('[')
                    .and_then(|v| v.strip_suffix(']'))
                    .unwrap_or(value);
                for item in inner.split(',') {
                    push_tag(&mut meta.tags, item);
                }
            }
            _ => {}
        }
    }

    (meta, body)
}

fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    None
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = unquote(raw).trim_start_matches('#').trim();
    if !tag.is_empty() {
        tags.push(tag.to_string());
    }
}

/// [`NoteSource`] over a directory of Markdown notes.
///
/// The vault is walked recursively; hidden directories such as `.obsidian`
/// are skipped. Directory traversal runs on tokio's blocking pool.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tessera_sources::notes::VaultNotes;
///
/// let vault = VaultNotes::new(Path::new("/home/me/obsidian/test"), "md");
/// let notes = vault.scan("travel").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct VaultNotes {
    root: PathBuf,
    extension: String,
}

impl VaultNotes {
    /// Notes under `root` with the given file extension.
    pub fn new(root: &Path, extension: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Build from configuration, expanding `~` and `$VARS` in the vault path.
    pub fn from_config(config: &NotesConfig) -> Self {
        let raw = config.vault_path.to_string_lossy();
        let expanded = shellexpand::full(&raw)
            .map(|p| PathBuf::from(p.as_ref()))
            .unwrap_or_else(|_| config.vault_path.clone());
        Self::new(&expanded, &config.extension)
    }

    /// Vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every note tagged `tag`, ordered by path.
    ///
    /// Unreadable, oversized, or non-UTF-8 files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::ExternalSourceUnavailable`] if the vault
    /// directory does not exist.
    pub fn scan(&self, tag: &str) -> Result<Vec<Document>, TesseraError> {
        if !self.root.is_dir() {
            return Err(TesseraError::ExternalSourceUnavailable(format!(
                "note vault not found: {}",
                self.root.display()
            )));
        }

        let walker = ignore::WalkBuilder::new(&self.root).build();
        let mut notes = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable vault entry");
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }

            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() > MAX_FILE_SIZE {
                tracing::debug!(path = %path.display(), "skipping oversized note");
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let (meta, body) = parse_note(&content);
            if !meta.has_tag(tag) {
                continue;
            }

            notes.push(Document {
                id: path.to_string_lossy().to_string(),
                title: meta.title,
                text: body.to_string(),
                tag: Some(tag.to_string()),
            });
        }

        notes.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(tag, count = notes.len(), vault = %self.root.display(), "scanned vault");
        Ok(notes)
    }
}

#[async_trait]
impl NoteSource for VaultNotes {
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Document>, TesseraError> {
        let vault = self.clone();
        let tag = tag.to_string();
        tokio::task::spawn_blocking(move || vault.scan(&tag))
            .await
            .map_err(|e| TesseraError::ExternalSourceUnavailable(format!("vault scan aborted: {e}")))?
    }
}
