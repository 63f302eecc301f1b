use uuid::Uuid;

use crate::{MediaError, MediaKind, MediaResult};

/// Maximum number of keys a fallback chain may contain
const MAX_CANDIDATES: usize = 8;

/// Deterministic mapping from logical media references to storage keys.
///
/// The stored corpus spans several historical naming conventions: keys under
/// the current namespace, root-relative `uploads/` paths from before the
/// namespace existed, bare filenames, `jpg`/`jpeg` spelling drift, and two
/// preview spellings (`thumb-` prefix for images, `.poster.jpg` suffix for
/// video). The store has no glob capability cheap enough to use per request,
/// so reads enumerate a fixed fallback chain instead of searching.
///
/// All methods are pure except [`KeyResolver::generated_object_name`], which
/// mints the per-attempt unique name.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    namespace: String,
}

impl KeyResolver {
    pub fn new<S: Into<String>>(namespace: S) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Canonical storage key for a media object.
    ///
    /// Strips directories and unsafe characters, lowercases and normalizes
    /// the extension (`jpeg` becomes `jpg`; a missing or unrecognized
    /// extension gets the kind's default appended), and prefixes the
    /// canonical namespace. The output can never contain a path-traversal
    /// sequence because every separator is removed before assembly.
    pub fn canonical_key(&self, original_name: &str, kind: MediaKind) -> MediaResult<String> {
        let (stem, ext) = split_name(original_name, kind);
        if stem.is_empty() {
            return Err(MediaError::InvalidName {
                name: original_name.to_string(),
            });
        }
        Ok(format!("{}/uploads/{}.{}", self.namespace, stem, ext))
    }

    /// Unique object name for a fresh upload attempt.
    ///
    /// Uniqueness lives here rather than in [`KeyResolver::canonical_key`]
    /// so key derivation stays pure; a retried upload mints a new name and
    /// therefore a new key, which is what makes a partially written first
    /// attempt unreachable.
    pub fn generated_object_name(&self, declared_name: &str) -> String {
        let token = Uuid::new_v4().simple();
        if declared_name.is_empty() {
            token.to_string()
        } else {
            format!("{}-{}", token, declared_name)
        }
    }

    /// Key of the derived preview for a stored media object.
    ///
    /// Images get a `thumb-` prefix under a `thumbnails/` sub-namespace.
    /// Videos get a `.poster.jpg` suffix in the same directory as the
    /// original; downstream players look there first, so poster naming wins
    /// over thumbnail naming for video.
    pub fn thumbnail_key_for(&self, media_key: &str, kind: MediaKind) -> String {
        match kind {
            MediaKind::Video => match media_key.rfind('.') {
                Some(dot) => format!("{}.poster.jpg", &media_key[..dot]),
                None => format!("{}.poster.jpg", media_key),
            },
            MediaKind::Image => match media_key.rfind('/') {
                Some(slash) => format!(
                    "{}/thumbnails/thumb-{}",
                    &media_key[..slash],
                    &media_key[slash + 1..]
                ),
                None => format!("thumbnails/thumb-{}", media_key),
            },
        }
    }

    /// Full fallback chain for a read, canonical key first.
    ///
    /// Deterministic and bounded; callers probe in order and stop at the
    /// first hit. A reference that sanitizes to nothing yields an empty
    /// chain.
    pub fn candidate_keys_for(&self, reference: &str) -> Vec<String> {
        let file = basename(reference);
        let kind = kind_of_name(file);
        let canonical = match self.canonical_key(file, kind) {
            Ok(key) => key,
            Err(_) => return Vec::new(),
        };
        let canonical_file = basename(&canonical).to_string();

        let mut candidates = Vec::with_capacity(MAX_CANDIDATES);
        candidates.push(canonical.clone());
        // Legacy root-relative path from before the namespace existed
        candidates.push(format!("uploads/{}", canonical_file));

        // jpg/jpeg spelling drift
        if let Some(alternate) = alternate_spelling(&canonical_file) {
            candidates.push(format!("{}/uploads/{}", self.namespace, alternate));
            candidates.push(format!("uploads/{}", alternate));
        }

        // Bare filename, the oldest convention
        candidates.push(canonical_file.clone());

        // Preview spellings: some objects only ever existed as previews
        if canonical_file.starts_with("thumb-") {
            candidates.push(format!(
                "{}/uploads/thumbnails/{}",
                self.namespace, canonical_file
            ));
        } else {
            match kind {
                MediaKind::Video => candidates.push(self.thumbnail_key_for(&canonical, kind)),
                MediaKind::Image => candidates.push(format!(
                    "{}/uploads/thumbnails/thumb-{}",
                    self.namespace, canonical_file
                )),
            }
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|key| seen.insert(key.clone()));
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }
}

/// Strip directories, drop unsafe characters, and split off a normalized
/// extension. Whitespace becomes `-`; anything outside `[A-Za-z0-9._-]` is
/// removed; leading and trailing dots and dashes are trimmed.
fn split_name(name: &str, kind: MediaKind) -> (String, &'static str) {
    let file = basename(name);
    let mut sanitized = String::with_capacity(file.len());
    for ch in file.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            sanitized.push(ch);
        } else if ch.is_whitespace() {
            sanitized.push('-');
        }
    }
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == '-');

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            match normalize_extension(&ext.to_ascii_lowercase(), kind) {
                Some(known) => (stem.to_string(), known),
                // Unknown extensions are part of the name, not replaced
                None => (sanitized.to_string(), kind.default_extension()),
            }
        }
        _ => (sanitized.to_string(), kind.default_extension()),
    }
}

fn normalize_extension(ext: &str, kind: MediaKind) -> Option<&'static str> {
    if ext == "jpeg" {
        return Some("jpg");
    }
    kind.known_extensions()
        .iter()
        .find(|known| **known == ext)
        .copied()
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn kind_of_name(file: &str) -> MediaKind {
    match file.rsplit_once('.') {
        Some((_, ext)) => MediaKind::from_extension(ext),
        None => MediaKind::Image,
    }
}

fn alternate_spelling(file: &str) -> Option<String> {
    if let Some(stem) = file.strip_suffix(".jpg") {
        Some(format!("{}.jpeg", stem))
    } else {
        file.strip_suffix(".jpeg")
            .map(|stem| format!("{}.jpg", stem))
    }
}
