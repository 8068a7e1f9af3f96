//! Classification heuristics and external collaborator contracts.

use regex::RegexSet;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Directory names treated as cache directories; every file beneath one is
/// cache junk.
pub const CACHE_DIR_TOKENS: &[&str] = &[
    "cache",
    ".cache",
    "tmp",
    ".tmp",
    "temp",
    ".temp",
    ".thumbnails",
    "thumbs",
    ".thumbs",
];

/// Extensions that mark a file as temporary regardless of its name.
pub const TEMP_EXTENSIONS: &[&str] = &[
    "tmp",
    "temp",
    "bak",
    "old",
    "swp",
    "part",
    "crdownload",
    "partial",
];

/// Glob-style name patterns for temp/leftover files.
const TEMP_NAME_GLOBS: &[&str] = &[
    "~*",
    "*.tmp",
    "*.temp",
    "core.*",
    "*.bak",
    "*.swp",
    ".ds_store",
    "thumbs.db",
];

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 8);
    regex.push('^');
    for c in glob.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex
}

/// Compiled name-matching rules. Build once, reuse across walks.
pub struct JunkPatterns {
    temp_names: RegexSet,
}

impl JunkPatterns {
    pub fn new() -> Self {
        let patterns: Vec<String> = TEMP_NAME_GLOBS.iter().map(|g| glob_to_regex(g)).collect();
        Self {
            // The globs are static and valid; a failure here is a programmer
            // error, not a data error.
            temp_names: RegexSet::new(&patterns).expect("invalid builtin glob pattern"),
        }
    }

    /// Does this directory name mark a cache directory?
    pub fn is_cache_dir_name(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        CACHE_DIR_TOKENS.contains(&lowered.as_str())
    }

    /// Does this file look temporary, by extension or by name pattern?
    pub fn is_temp_file(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if TEMP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                return true;
            }
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.temp_names.is_match(&n.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for JunkPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity parsed out of a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version_code: i64,
}

/// Outcome of trying to read a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveVerdict {
    /// The archive parsed and declares this package
    Package(PackageInfo),
    /// The file claims to be a package archive but cannot be parsed
    Corrupt,
    /// This inspector cannot judge the file; classification falls through
    Unsupported,
}

/// Caller-supplied protection rules. A `false` answer is authoritative; the
/// classifier never overrides it.
pub trait SafetyPolicy: Send + Sync {
    fn is_safe_to_delete(&self, path: &Path) -> bool;
    fn is_safe_to_scan(&self, dir: &Path) -> bool;
}

/// Caller-supplied view of what is installed on the host.
pub trait PackageRegistry: Send + Sync {
    fn is_installed(&self, package: &str) -> bool;
    fn installed_packages(&self) -> HashSet<String>;
    /// Version code of an installed package, `None` when not installed.
    fn installed_version(&self, package: &str) -> Option<i64>;
}

/// Caller-supplied package archive parser.
pub trait ArchiveInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> ArchiveVerdict;
}

/// Everything may be scanned and deleted. The default for hosts without
/// protection rules.
pub struct PermissiveSafety;

impl SafetyPolicy for PermissiveSafety {
    fn is_safe_to_delete(&self, _path: &Path) -> bool {
        true
    }

    fn is_safe_to_scan(&self, _dir: &Path) -> bool {
        true
    }
}

/// A fixed package table; useful for tests and for hosts that snapshot their
/// package list up front.
#[derive(Default)]
pub struct StaticPackageRegistry {
    packages: HashMap<String, i64>,
}

impl StaticPackageRegistry {
    pub fn new(packages: HashMap<String, i64>) -> Self {
        Self { packages }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl PackageRegistry for StaticPackageRegistry {
    fn is_installed(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    fn installed_packages(&self) -> HashSet<String> {
        self.packages.keys().cloned().collect()
    }

    fn installed_version(&self, package: &str) -> Option<i64> {
        self.packages.get(package).copied()
    }
}

/// An inspector that judges nothing; package archives fall through to the
/// other heuristics.
pub struct NoopArchiveInspector;

impl ArchiveInspector for NoopArchiveInspector {
    fn inspect(&self, _path: &Path) -> ArchiveVerdict {
        ArchiveVerdict::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_names_match_case_insensitively() {
        let patterns = JunkPatterns::new();
        assert!(patterns.is_cache_dir_name(".cache"));
        assert!(patterns.is_cache_dir_name("Cache"));
        assert!(patterns.is_cache_dir_name(".Thumbnails"));
        assert!(!patterns.is_cache_dir_name("caches-archive"));
        assert!(!patterns.is_cache_dir_name("Documents"));
    }

    #[test]
    fn temp_extension_matches() {
        let patterns = JunkPatterns::new();
        assert!(patterns.is_temp_file(Path::new("/a/report.tmp")));
        assert!(patterns.is_temp_file(Path::new("/a/backup.BAK")));
        assert!(!patterns.is_temp_file(Path::new("/a/report.pdf")));
    }

    #[test]
    fn temp_name_globs_match() {
        let patterns = JunkPatterns::new();
        assert!(patterns.is_temp_file(Path::new("/a/~lock.docx")));
        assert!(patterns.is_temp_file(Path::new("/a/core.1234")));
        assert!(patterns.is_temp_file(Path::new("/a/.DS_Store")));
        assert!(patterns.is_temp_file(Path::new("/a/Thumbs.db")));
        assert!(!patterns.is_temp_file(Path::new("/a/score.1234")));
    }

    #[test]
    fn glob_translation_escapes_metacharacters() {
        assert_eq!(glob_to_regex("*.tmp"), "^.*\\.tmp$");
        assert_eq!(glob_to_regex("core.*"), "^core\\..*$");
    }

    #[test]
    fn static_registry_lookups() {
        let registry =
            StaticPackageRegistry::new(HashMap::from([("com.example.app".to_string(), 42)]));

        assert!(registry.is_installed("com.example.app"));
        assert!(!registry.is_installed("com.gone.app"));
        assert_eq!(registry.installed_version("com.example.app"), Some(42));
        assert_eq!(registry.installed_version("com.gone.app"), None);
        assert_eq!(registry.installed_packages().len(), 1);
    }
}
