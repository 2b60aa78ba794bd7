//! Set similarity and identifier normalisation.

use std::collections::BTreeSet;

/// Jaccard index `|A ∩ B| / |A ∪ B|`. Zero when either side is empty.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

pub fn intersection(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    a.intersection(b).cloned().collect()
}

/// Case-fold a path and fold separators to `/`.
pub fn normalize_path(path: &str) -> String {
    let folded = path.trim().replace('\\', "/").to_lowercase();
    let mut rest = folded.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.trim_matches('/').to_string()
}

pub fn normalize_ident(ident: &str) -> String {
    ident.trim().to_lowercase()
}

pub fn normalize_paths<I, S>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| normalize_path(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn normalize_idents<I, S>(idents: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    idents
        .into_iter()
        .map(|i| normalize_ident(i.as_ref()))
        .filter(|i| !i.is_empty())
        .collect()
}

/// Module a file belongs to: its parent directory, or its stem for a bare
/// file name.
pub fn parent_module(path: &str) -> Option<String> {
    let normalized = normalize_path(path);
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let file = segments.pop()?;
    match segments.last() {
        Some(parent) => Some(parent.to_string()),
        None => file_stem(file),
    }
}

pub(crate) fn file_stem(file: &str) -> Option<String> {
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
