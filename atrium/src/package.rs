//! App packages.
//!
//! A package is an SQLite file with one table, `files(path, file)`. It is
//! extracted into a folder before the app runs; `main.wasm` is required.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, params};

/// Module every app folder must contain.
pub const MAIN_MODULE: &str = "main.wasm";

/// File extension of packaged apps.
pub const PACKAGE_EXT: &str = "app";

/// Relative path inside the package, rejecting anything escaping the folder.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let p = Path::new(path);
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Extract `archive` into `dest`. Returns the number of files written.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let conn = Connection::open_with_flags(archive, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open package: {:?}", archive))?;
    let mut stmt = conn.prepare("SELECT path, file FROM files").context("Package has no files table")?;
    let entries = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if !entries.iter().any(|(p, _)| safe_relative(p).is_some_and(|r| r == Path::new(MAIN_MODULE))) {
        bail!("package {:?} has no {MAIN_MODULE}", archive);
    }

    std::fs::create_dir_all(dest).with_context(|| format!("Failed to create directory: {:?}", dest))?;
    let mut written = 0;
    for (path, data) in entries {
        let Some(rel) = safe_relative(&path) else {
            tracing::warn!(path, "skipping package entry outside the app folder");
            continue;
        };
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, data.unwrap_or_default()).with_context(|| format!("Failed to write {:?}", target))?;
        written += 1;
    }
    tracing::info!(?archive, files = written, "package extracted");
    Ok(written)
}

/// Pack every file under `src` into a new package at `archive`.
pub fn pack(src: &Path, archive: &Path) -> Result<usize> {
    if !src.join(MAIN_MODULE).is_file() {
        bail!("{:?} has no {MAIN_MODULE}", src);
    }
    if archive.exists() {
        std::fs::remove_file(archive)?;
    }
    let mut conn = Connection::open(archive).with_context(|| format!("Failed to create package: {:?}", archive))?;
    conn.execute_batch("CREATE TABLE files (path TEXT NOT NULL, file BLOB)")?;
    let tx = conn.transaction()?;
    let mut count = 0;
    let mut pending = vec![src.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let rel = path.strip_prefix(src)?;
            let name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
            tx.execute("INSERT INTO files (path, file) VALUES (?1, ?2)", params![name, std::fs::read(&path)?])?;
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Locate the folder of app `name` under `apps_dir`, extracting
/// `<name>.app` when the folder is missing or older than the package.
pub fn resolve(apps_dir: &Path, name: &str) -> Result<PathBuf> {
    let folder = apps_dir.join(name);
    let archive = apps_dir.join(format!("{name}.{PACKAGE_EXT}"));
    if archive.is_file() {
        let packed = std::fs::metadata(&archive)?.modified().ok();
        let unpacked = std::fs::metadata(folder.join(MAIN_MODULE)).and_then(|m| m.modified()).ok();
        let stale = match (packed, unpacked) {
            (Some(p), Some(u)) => p > u,
            (_, None) => true,
            (None, Some(_)) => false,
        };
        if stale {
            extract(&archive, &folder)?;
        }
    }
    Ok(folder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        assert_eq!(safe_relative("img/a.png"), Some(PathBuf::from("img/a.png")));
        assert_eq!(safe_relative("./main.wasm"), Some(PathBuf::from("main.wasm")));
        assert_eq!(safe_relative("../etc/passwd"), None);
        assert_eq!(safe_relative("/abs"), None);
        assert_eq!(safe_relative(""), None);
    }

    #[test]
    fn package_without_main_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.app");
        let conn = Connection::open(&archive).unwrap();
        conn.execute_batch("CREATE TABLE files (path TEXT NOT NULL, file BLOB)").unwrap();
        conn.execute("INSERT INTO files VALUES ('readme.txt', x'00')", []).unwrap();
        drop(conn);
        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("main.wasm"));
    }
}
