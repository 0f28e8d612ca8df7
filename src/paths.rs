//! Sync roots, key mapping and file discovery

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::types::{SyncFileEntry, SyncKey};

/// Key prefix for files under the editor's user directory
pub const CURSOR_USER_PREFIX: &str = "cursor-user";
/// Key prefix for files under `~/.cursor`
pub const DOT_CURSOR_PREFIX: &str = "dot-cursor";
/// Key of the generated installed-extensions listing
pub const EXTENSIONS_KEY: &str = "cursor-user/extensions.json";

const DENYLIST_DIRS: &[&str] = &[
    "extensions",
    "logs",
    "CachedData",
    "CachedExtensions",
    "CachedProfilesData",
    "Crashpad",
    "DawnCache",
    "GPUCache",
    "blob_storage",
    "Local Storage",
    "Session Storage",
    "Network",
    "shared_proto_db",
    "databases",
];

const DENYLIST_FILES: &[&str] = &["TransportSecurity"];

const DENYLIST_GLOBS: &[&str] = &["Cookies*", "*.db", "*.db-journal", "*.db-wal", "*.log"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// The two local directories that hold synced files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoots {
    pub cursor_user: PathBuf,
    pub dot_cursor: PathBuf,
}

impl SyncRoots {
    pub fn new(cursor_user: impl Into<PathBuf>, dot_cursor: impl Into<PathBuf>) -> Self {
        Self {
            cursor_user: cursor_user.into(),
            dot_cursor: dot_cursor.into(),
        }
    }

    /// Platform default roots
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::Config("cannot determine home directory".to_string()))?;

        if cfg!(target_os = "windows") {
            let app_data = std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData").join("Roaming"));
            let profile = std::env::var_os("USERPROFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.clone());
            return Ok(Self::new(
                app_data.join("Cursor").join("User"),
                profile.join(".cursor"),
            ));
        }

        if cfg!(target_os = "macos") {
            return Ok(Self::new(
                home.join("Library")
                    .join("Application Support")
                    .join("Cursor")
                    .join("User"),
                home.join(".cursor"),
            ));
        }

        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"));
        Ok(Self::new(
            config_home.join("Cursor").join("User"),
            home.join(".cursor"),
        ))
    }

    /// Absolute path for a key, `None` for unknown prefixes or escaping paths
    pub fn resolve_key(&self, key: &str) -> Option<PathBuf> {
        let (prefix, rel) = key.split_once('/')?;
        let root = match prefix {
            CURSOR_USER_PREFIX => &self.cursor_user,
            DOT_CURSOR_PREFIX => &self.dot_cursor,
            _ => return None,
        };

        let mut path = root.clone();
        for segment in rel.split('/') {
            let component = Path::new(segment).components().next();
            match component {
                Some(Component::Normal(_)) if Path::new(segment).components().count() == 1 => {
                    path.push(segment)
                }
                _ => return None,
            }
        }
        Some(path)
    }
}

/// SyncKey `a/b/c` → remote filename `a--b--c`
pub fn key_to_remote_name(key: &str) -> String {
    key.replace('/', "--")
}

/// Remote filename `a--b--c` → SyncKey `a/b/c` (lossy for literal `--`)
pub fn remote_name_to_key(name: &str) -> SyncKey {
    name.replace("--", "/")
}

/// File discovery and key resolution
pub trait FileDiscovery: Send + Sync {
    /// Current sync set, sorted by key
    fn enumerate(&self) -> Result<Vec<SyncFileEntry>>;

    /// Local target for a key
    fn resolve_key(&self, key: &str) -> Option<PathBuf>;
}

/// Glob-filtered walk of the two sync roots
#[derive(Debug, Clone)]
pub struct RootedDiscovery {
    roots: SyncRoots,
    cursor_user_globs: Vec<Pattern>,
    dot_cursor_globs: Vec<Pattern>,
    exclude_globs: Vec<Pattern>,
    deny_globs: Vec<Pattern>,
    max_bytes: u64,
}

impl RootedDiscovery {
    pub fn new(roots: SyncRoots, config: &SyncConfig) -> Result<Self> {
        let mut cursor_user_globs = Vec::new();
        let mut dot_cursor_globs = Vec::new();

        for glob in &config.enabled_paths {
            let pattern = compile(glob)?;
            if glob == "settings.json"
                || glob == "keybindings.json"
                || glob == "extensions.json"
                || glob.starts_with("snippets")
            {
                cursor_user_globs.push(pattern);
            } else if glob.starts_with("skills")
                || glob.starts_with("commands")
                || glob.starts_with("rules")
            {
                dot_cursor_globs.push(pattern);
            } else {
                tracing::warn!("Ignoring include glob outside known roots: {}", glob);
            }
        }

        let exclude_globs = config
            .exclude_globs
            .iter()
            .map(|g| compile(g))
            .collect::<Result<Vec<_>>>()?;
        let deny_globs = DENYLIST_GLOBS
            .iter()
            .map(|g| compile(g))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roots,
            cursor_user_globs,
            dot_cursor_globs,
            exclude_globs,
            deny_globs,
            max_bytes: config.max_file_size_bytes(),
        })
    }

    pub fn roots(&self) -> &SyncRoots {
        &self.roots
    }

    fn collect(&self, root: &Path, prefix: &str, include: &[Pattern], out: &mut Vec<SyncFileEntry>) {
        if !root.is_dir() || include.is_empty() {
            return;
        }

        for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.is_denylisted(&rel) {
                continue;
            }
            if !include.iter().any(|p| p.matches_with(&rel, MATCH_OPTIONS)) {
                continue;
            }
            if self.exclude_globs.iter().any(|p| p.matches_with(&rel, MATCH_OPTIONS)) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() <= self.max_bytes => {}
                Ok(meta) => {
                    tracing::debug!("Skipping {} ({} bytes over cap)", rel, meta.len());
                    continue;
                }
                Err(_) => continue,
            }

            out.push(SyncFileEntry::new(entry.path(), format!("{}/{}", prefix, rel)));
        }
    }

    fn is_denylisted(&self, rel: &str) -> bool {
        if let Some(top) = rel.split('/').next() {
            if DENYLIST_DIRS.contains(&top) {
                return true;
            }
        }

        let file_name = rel.rsplit('/').next().unwrap_or(rel);
        DENYLIST_FILES.contains(&file_name)
            || self.deny_globs.iter().any(|p| p.matches_with(file_name, MATCH_OPTIONS))
    }
}

impl FileDiscovery for RootedDiscovery {
    fn enumerate(&self) -> Result<Vec<SyncFileEntry>> {
        let mut entries = Vec::new();
        self.collect(&self.roots.cursor_user, CURSOR_USER_PREFIX, &self.cursor_user_globs, &mut entries);
        self.collect(&self.roots.dot_cursor, DOT_CURSOR_PREFIX, &self.dot_cursor_globs, &mut entries);
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn resolve_key(&self, key: &str) -> Option<PathBuf> {
        self.roots.resolve_key(key)
    }
}

fn compile(glob: &str) -> Result<Pattern> {
    Pattern::new(glob).map_err(|e| SyncError::Config(format!("invalid glob '{}': {}", glob, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, RootedDiscovery) {
        let dir = tempfile::tempdir().unwrap();
        let roots = SyncRoots::new(dir.path().join("User"), dir.path().join(".cursor"));
        let user = &roots.cursor_user;
        let dot = &roots.dot_cursor;

        touch(&user.join("settings.json"), "{}");
        touch(&user.join("keybindings.json"), "[]");
        touch(&user.join("snippets/rust.json"), "{}");
        touch(&user.join("state.db"), "x");
        touch(&user.join("logs/settings.json"), "x");
        touch(&user.join("workspaceStorage/foo.json"), "x");
        touch(&dot.join("rules/style.mdc"), "rule");
        touch(&dot.join("rules/nested/deep.mdc"), "rule");
        touch(&dot.join("skills/review/SKILL.md"), "skill");
        touch(&dot.join("commands/a/b.md"), "cmd");
        touch(&dot.join("extensions/foo/package.json"), "{}");

        let discovery = RootedDiscovery::new(roots, &SyncConfig::default()).unwrap();
        (dir, discovery)
    }

    #[test]
    fn test_enumerate_default_globs() {
        let (_dir, discovery) = fixture();
        let keys: Vec<_> = discovery
            .enumerate()
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();

        assert_eq!(
            keys,
            vec![
                "cursor-user/keybindings.json",
                "cursor-user/settings.json",
                "cursor-user/snippets/rust.json",
                "dot-cursor/commands/a/b.md",
                "dot-cursor/rules/style.mdc",
                "dot-cursor/skills/review/SKILL.md",
            ]
        );
    }

    #[test]
    fn test_exclude_globs_and_size_cap() {
        let (dir, _) = fixture();
        let roots = SyncRoots::new(dir.path().join("User"), dir.path().join(".cursor"));
        touch(&roots.cursor_user.join("snippets/big.json"), &"x".repeat(2048));

        let config = SyncConfig {
            exclude_globs: vec!["keybindings.json".into()],
            max_file_size_kb: 1,
            ..SyncConfig::default()
        };
        let discovery = RootedDiscovery::new(roots, &config).unwrap();
        let keys: Vec<_> = discovery.enumerate().unwrap().into_iter().map(|e| e.key).collect();

        assert!(!keys.contains(&"cursor-user/keybindings.json".to_string()));
        assert!(!keys.contains(&"cursor-user/snippets/big.json".to_string()));
        assert!(keys.contains(&"cursor-user/settings.json".to_string()));
    }

    #[test]
    fn test_missing_roots_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let roots = SyncRoots::new(dir.path().join("nope"), dir.path().join("nada"));
        let discovery = RootedDiscovery::new(roots, &SyncConfig::default()).unwrap();
        assert!(discovery.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_key() {
        let roots = SyncRoots::new("/home/u/.config/Cursor/User", "/home/u/.cursor");
        assert_eq!(
            roots.resolve_key("cursor-user/snippets/rust.json"),
            Some(PathBuf::from("/home/u/.config/Cursor/User/snippets/rust.json"))
        );
        assert_eq!(
            roots.resolve_key("dot-cursor/rules/a.mdc"),
            Some(PathBuf::from("/home/u/.cursor/rules/a.mdc"))
        );
        assert_eq!(roots.resolve_key("other/settings.json"), None);
        assert_eq!(roots.resolve_key("cursor-user/../../etc/passwd"), None);
        assert_eq!(roots.resolve_key("cursor-user"), None);
    }

    #[test]
    fn test_remote_name_escaping() {
        assert_eq!(key_to_remote_name("cursor-user/snippets/rust.json"), "cursor-user--snippets--rust.json");
        assert_eq!(remote_name_to_key("dot-cursor--rules--a.mdc"), "dot-cursor/rules/a.mdc");
        // lossy: a literal double dash becomes a separator
        assert_eq!(remote_name_to_key(&key_to_remote_name("dot-cursor/my--rule.mdc")), "dot-cursor/my/rule.mdc");
    }
}
