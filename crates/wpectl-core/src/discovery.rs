use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::catalog::DirectorySet;

/// Steam product id of the wallpaper engine workshop content.
pub const WORKSHOP_PRODUCT_ID: &str = "431960";

const WORKSHOP_CONTENT_SUFFIX: &str = "steamapps/workshop/content/431960";
const PRESET_ASSETS_SUFFIX: &str = "steamapps/common/wallpaper_engine/assets/presets";

/// Well-known Steam install roots relative to the home directory: a native
/// install plus the Flatpak sandbox variants.
const STEAM_ROOTS: &[&str] = &[
    ".local/share/Steam",
    ".steam/steam",
    ".var/app/com.valvesoftware.Steam/.local/share/Steam",
    ".var/app/com.valvesoftware.Steam/.data/Steam",
    ".var/app/com.valvesoftware.Steam/.steam/steam",
];

/// Snap installs live under a per-revision directory, hence the wildcard.
const SNAP_ROOT_GLOBS: &[&str] = &[
    "snap/steam/*/.local/share/Steam",
    "snap/steam/*/.steam/steam",
];

const LIBRARY_MANIFESTS: &[&str] = &[
    ".local/share/Steam/steamapps/libraryfolders.vdf",
    ".steam/steam/steamapps/libraryfolders.vdf",
    ".var/app/com.valvesoftware.Steam/.local/share/Steam/steamapps/libraryfolders.vdf",
];

/// Depth cap for the last-resort home directory search.
const FALLBACK_SEARCH_DEPTH: usize = 6;

/// Enumerates every directory that may hold wallpaper items for the current
/// user. Returns only directories that exist.
pub fn discover() -> DirectorySet {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    discover_under(&home)
}

/// Discovery rooted at an explicit home directory.
pub fn discover_under(home: &Path) -> DirectorySet {
    let mut bases: DirectorySet = STEAM_ROOTS.iter().map(|root| home.join(root)).collect();

    for manifest in LIBRARY_MANIFESTS {
        let path = home.join(manifest);
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for library in library_paths(&content) {
            if library.is_dir() {
                trace!(library = %library.display(), "library root from manifest");
                bases.insert(library);
            }
        }
    }

    for pattern in SNAP_ROOT_GLOBS {
        let pattern = home.join(pattern);
        let Some(pattern) = pattern.to_str() else {
            continue;
        };
        let Ok(matches) = glob::glob(pattern) else {
            continue;
        };
        bases.extend(matches.flatten());
    }

    let mut found = DirectorySet::new();
    for base in &bases {
        for suffix in [WORKSHOP_CONTENT_SUFFIX, PRESET_ASSETS_SUFFIX] {
            let candidate = base.join(suffix);
            if candidate.is_dir() {
                found.insert(candidate);
            }
        }
    }

    if found.is_empty() {
        debug!("no well-known install found, falling back to bounded home search");
        found.extend(fallback_search(home));
    }

    found
}

/// Extracts `"path" "<value>"` pairs from a Steam library manifest. The
/// format is VDF, but a line-based scan for the one key we need is enough;
/// anything malformed is simply not matched.
fn library_paths(manifest: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for line in manifest.lines() {
        let mut rest = line;
        while let Some(idx) = rest.find("\"path\"") {
            rest = &rest[idx + "\"path\"".len()..];
            let Some(quoted) = rest.trim_start().strip_prefix('"') else {
                break;
            };
            let Some(end) = quoted.find('"') else {
                break;
            };
            if end > 0 {
                paths.push(PathBuf::from(&quoted[..end]));
            }
            rest = &quoted[end + 1..];
        }
    }
    paths
}

/// Depth-limited search for a directory literally named after the workshop
/// product id. Unreadable subtrees are skipped, never fatal.
fn fallback_search(home: &Path) -> Vec<PathBuf> {
    WalkDir::new(home)
        .max_depth(FALLBACK_SEARCH_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == WORKSHOP_PRODUCT_ID)
        .map(|entry| entry.into_path())
        .collect()
}
