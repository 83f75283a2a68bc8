//! Flat `key=value` files: the deployment record store and the
//! transactional-update configuration.
//!
//! Loading is loose: a missing file is empty. Lines that are blank, comments
//! (`#`/`;`) or `[section]` headers are kept verbatim; anything else must be
//! a `key=value` pair. Only keys of the leading (unnamed) section are read or
//! written, and writing rewrites just the affected lines.

use crate::error::{KubicError, Result};
use crate::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `raw` holds the original text until `set` touches the entry.
    Entry {
        key: String,
        value: String,
        raw: Option<String>,
    },
    Section(String),
    Other(String),
}

#[derive(Debug, Clone)]
pub struct KvFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl KvFile {
    /// Load `path`, treating a missing file as empty.
    pub fn loose_load(path: &Path) -> Result<Self> {
        match io::read_optional(path)? {
            Some(text) => Self::parse(path, &text),
            None => Ok(Self {
                path: path.to_path_buf(),
                lines: Vec::new(),
            }),
        }
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut lines = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(Line::Other(raw.to_string()));
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                lines.push(Line::Section(raw.to_string()));
                continue;
            }
            let (key, value) = split_entry(trimmed).ok_or_else(|| KubicError::MalformedStore {
                path: path.to_path_buf(),
                line: idx + 1,
                content: raw.to_string(),
            })?;
            lines.push(Line::Entry {
                key,
                value: unquote(value.trim()).to_string(),
                raw: Some(raw.to_string()),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .last()
    }

    /// Entries of the unnamed section, in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines
            .iter()
            .take_while(|l| !matches!(l, Line::Section(_)))
            .filter_map(|l| match l {
                Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
                _ => None,
            })
    }

    /// Whether `key` can be written and read back unchanged.
    pub fn check_key(key: &str) -> Result<()> {
        if key.trim().is_empty() || key.contains(['\n', '\r']) || encode_key(key).is_none() {
            return Err(KubicError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Insert or overwrite `key`. New keys go after the last existing entry
    /// of the unnamed section.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        Self::check_key(key)?;
        if value.contains(['\n', '\r']) {
            return Err(KubicError::InvalidKey(key.to_string()));
        }

        let section_start = self
            .lines
            .iter()
            .position(|l| matches!(l, Line::Section(_)))
            .unwrap_or(self.lines.len());

        let mut found = false;
        for line in &mut self.lines[..section_start] {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k.as_str() == key {
                    if v.as_str() != value {
                        *v = value.to_string();
                        *raw = None;
                    }
                    found = true;
                }
            }
        }
        if !found {
            let insert_at = self.lines[..section_start]
                .iter()
                .rposition(|l| matches!(l, Line::Entry { .. }))
                .map(|i| i + 1)
                .unwrap_or(section_start);
            self.lines.insert(
                insert_at,
                Line::Entry {
                    key: key.to_string(),
                    value: value.to_string(),
                    raw: None,
                },
            );
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { raw: Some(raw), .. } => out.push_str(raw),
                Line::Entry { key, value, raw: None } => {
                    // check_key ran in set, so the key is encodable.
                    out.push_str(&encode_key(key).unwrap_or_else(|| key.clone()));
                    out.push('=');
                    out.push_str(value);
                }
                Line::Section(raw) | Line::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self) -> Result<()> {
        io::atomic_write(&self.path, self.render().as_bytes())
    }
}

/// Split `key=value`. A key wrapped in backticks or double quotes may
/// contain `=` and start with comment or section characters.
fn split_entry(line: &str) -> Option<(String, &str)> {
    for q in ['`', '"'] {
        if let Some(rest) = line.strip_prefix(q) {
            let (key, after) = rest.split_once(q)?;
            let value = after.trim_start().strip_prefix('=')?;
            return (!key.is_empty()).then(|| (key.to_string(), value));
        }
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then(|| (key.to_string(), value))
}

/// The key as written to disk, quoted when a bare key would not read back
/// as itself. `None` if no quote character fits.
fn encode_key(key: &str) -> Option<String> {
    let bare_ok = !key.contains('=')
        && !key.starts_with(['#', ';', '[', '`', '"'])
        && key.trim() == key;
    if bare_ok {
        return Some(key.to_string());
    }
    ['`', '"']
        .into_iter()
        .find(|q| !key.contains(*q))
        .map(|q| format!("{q}{key}{q}"))
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\'', '`'] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let kv = KvFile::loose_load(&dir.path().join("absent.conf")).unwrap();
        assert_eq!(kv.entries().count(), 0);
        assert_eq!(kv.render(), "");
    }

    #[test]
    fn malformed_line_is_rejected_with_line_number() {
        let err = KvFile::parse(Path::new("x.conf"), "A=1\nnot a pair\n").unwrap_err();
        match err {
            KubicError::MalformedStore { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "not a pair");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn set_preserves_comments_and_other_keys() {
        let text = "# transactional-update settings\nREBOOT_METHOD=auto\n\nUPDATE_METHOD=dup\n";
        let mut kv = KvFile::parse(Path::new("t.conf"), text).unwrap();
        kv.set("REBOOT_METHOD", "kured").unwrap();
        assert_eq!(
            kv.render(),
            "# transactional-update settings\nREBOOT_METHOD=kured\n\nUPDATE_METHOD=dup\n"
        );
    }

    #[test]
    fn new_key_lands_before_first_section() {
        let text = "A=1\n[extra]\nB=2\n";
        let mut kv = KvFile::parse(Path::new("t.conf"), text).unwrap();
        kv.set("C", "3").unwrap();
        assert_eq!(kv.render(), "A=1\nC=3\n[extra]\nB=2\n");
        assert_eq!(kv.get("B"), None);
    }

    #[test]
    fn quoted_values_are_unquoted() {
        let kv = KvFile::parse(Path::new("t.conf"), "REBOOT_METHOD=\"rebootmgr\"\n").unwrap();
        assert_eq!(kv.get("REBOOT_METHOD"), Some("rebootmgr"));
    }

    #[test]
    fn unwritable_keys_are_rejected() {
        let mut kv = KvFile::parse(Path::new("t.conf"), "").unwrap();
        assert!(matches!(kv.set("", "c"), Err(KubicError::InvalidKey(_))));
        assert!(matches!(kv.set("a\nb", "c"), Err(KubicError::InvalidKey(_))));
        assert!(matches!(kv.set("a`b\"c=d", "c"), Err(KubicError::InvalidKey(_))));
        assert!(kv.render().is_empty());
    }

    #[test]
    fn untouched_entries_keep_their_formatting() {
        let text = "ZYPPER_PACKAGES=\"vim less\"\n  UPDATE_METHOD = dup\nREBOOT_METHOD=auto\n";
        let mut kv = KvFile::parse(Path::new("t.conf"), text).unwrap();
        assert_eq!(kv.get("ZYPPER_PACKAGES"), Some("vim less"));
        assert_eq!(kv.get("UPDATE_METHOD"), Some("dup"));

        kv.set("REBOOT_METHOD", "kured").unwrap();
        assert_eq!(
            kv.render(),
            "ZYPPER_PACKAGES=\"vim less\"\n  UPDATE_METHOD = dup\nREBOOT_METHOD=kured\n"
        );
    }

    #[test]
    fn setting_an_unchanged_value_keeps_the_line() {
        let mut kv = KvFile::parse(Path::new("t.conf"), "REBOOT_METHOD = 'kured'\n").unwrap();
        kv.set("REBOOT_METHOD", "kured").unwrap();
        assert_eq!(kv.render(), "REBOOT_METHOD = 'kured'\n");
    }

    #[test]
    fn awkward_keys_are_quoted_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k8s-yaml.conf");
        let keys = [
            "#weird.yaml",
            ";odd.yaml",
            "[bracketed].yaml",
            "/srv/a=b.yaml",
            " padded.yaml",
            "`tick.yaml",
        ];

        let mut kv = KvFile::loose_load(&path).unwrap();
        for (i, key) in keys.iter().enumerate() {
            kv.set(key, &format!("digest{i}")).unwrap();
        }
        kv.save().unwrap();

        let mut reloaded = KvFile::loose_load(&path).unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(reloaded.get(key), Some(format!("digest{i}").as_str()), "{key}");
        }
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("`#weird.yaml`=digest0\n"));

        // Redeploying overwrites in place instead of appending.
        reloaded.set("#weird.yaml", "again").unwrap();
        assert_eq!(reloaded.entries().count(), keys.len());
        assert_eq!(reloaded.get("#weird.yaml"), Some("again"));
    }

    #[test]
    fn save_then_load_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/k8s-yaml.conf");
        let mut kv = KvFile::loose_load(&path).unwrap();
        kv.set("/usr/share/k8s-yaml/kured/kured.yaml", "abc123").unwrap();
        kv.save().unwrap();

        let reloaded = KvFile::loose_load(&path).unwrap();
        assert_eq!(
            reloaded.get("/usr/share/k8s-yaml/kured/kured.yaml"),
            Some("abc123")
        );
    }
}
