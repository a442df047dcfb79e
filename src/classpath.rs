//! Byte providers: locate `<name>.class` in directories and archives.

use std::{
    env,
    fmt::Debug,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use zip::ZipArchive;

#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

pub trait ClassPathEntry: Debug + Send + Sync {
    /// `class_name` is an internal name such as `java/lang/Object`, without `.class`.
    /// Returns the bytes and a description of where they came from.
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)>;
}

/// Builds an entry from one `-cp` style path: a path list, a `dir/*` wildcard, an archive,
/// or a plain directory.
pub fn new_entry(path: &str) -> Box<dyn ClassPathEntry> {
    if path.contains(PATH_LIST_SEPARATOR) {
        return Box::new(CompositeEntry::new(path));
    }
    if path.ends_with('*') {
        return Box::new(WildcardEntry::new(path));
    }
    if is_archive(Path::new(path)) {
        match ZipEntry::new(path) {
            Some(entry) => return Box::new(entry),
            None => log::warn!("cannot open class path archive {path}"),
        }
    }
    Box::new(DirEntry::new(path))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

#[derive(Debug)]
pub struct DirEntry {
    base_path: PathBuf,
}

impl DirEntry {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        let base_path = base_path.canonicalize().unwrap_or(base_path);
        Self { base_path }
    }
}

impl ClassPathEntry for DirEntry {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        let path = self.base_path.join(format!("{class_name}.class"));
        let bytes = fs::read(&path).ok()?;
        Some((bytes, path.display().to_string()))
    }
}

#[derive(Debug)]
pub struct ZipEntry {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
}

impl ZipEntry {
    pub fn new(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file = File::open(&path).ok()?;
        let archive = ZipArchive::new(file).ok()?;
        Some(Self {
            path,
            archive: Mutex::new(archive),
        })
    }
}

impl ClassPathEntry for ZipEntry {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        let mut archive = self.archive.lock();
        let mut class_file = archive.by_name(&format!("{class_name}.class")).ok()?;
        let mut content = Vec::with_capacity(class_file.size() as usize);
        class_file.read_to_end(&mut content).ok()?;
        Some((content, self.path.display().to_string()))
    }
}

#[derive(Debug, Default)]
pub struct CompositeEntry {
    entries: Vec<Box<dyn ClassPathEntry>>,
}

impl CompositeEntry {
    pub fn new(path_list: &str) -> Self {
        let entries = path_list
            .split(PATH_LIST_SEPARATOR)
            .filter(|path| !path.is_empty())
            .map(new_entry)
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<Box<dyn ClassPathEntry>>) -> Self {
        Self { entries }
    }
}

impl ClassPathEntry for CompositeEntry {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        self.entries
            .iter()
            .find_map(|entry| entry.read_class(class_name))
    }
}

/// `dir/*`: every jar directly inside `dir`.
#[derive(Debug)]
pub struct WildcardEntry {
    inner: CompositeEntry,
}

impl WildcardEntry {
    pub fn new(path: &str) -> Self {
        let base_dir = path.trim_end_matches('*');
        let mut entries: Vec<Box<dyn ClassPathEntry>> = Vec::new();
        if let Ok(read_dir) = fs::read_dir(base_dir) {
            let mut archives: Vec<_> = read_dir
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_archive(path))
                .collect();
            archives.sort();
            for archive in archives {
                if let Some(entry) = ZipEntry::new(archive) {
                    entries.push(Box::new(entry));
                }
            }
        }
        Self {
            inner: CompositeEntry::from_entries(entries),
        }
    }
}

impl ClassPathEntry for WildcardEntry {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        self.inner.read_class(class_name)
    }
}

/// Boot, extension and user class paths, searched in that order.
#[derive(Debug)]
pub struct ClassPath {
    boot: CompositeEntry,
    ext: CompositeEntry,
    user: Box<dyn ClassPathEntry>,
}

impl ClassPath {
    pub fn parse(jre_option: Option<&str>, cp_option: Option<&str>) -> Self {
        let (boot, ext) = match jre_dir(jre_option) {
            Some(jre_dir) => {
                let lib = jre_dir.join("lib");
                (
                    CompositeEntry::from_entries(vec![Box::new(WildcardEntry::new(
                        &lib.join("*").to_string_lossy(),
                    ))]),
                    CompositeEntry::from_entries(vec![Box::new(WildcardEntry::new(
                        &lib.join("ext").join("*").to_string_lossy(),
                    ))]),
                )
            }
            None => {
                log::warn!("no jre directory found, only the user class path is searched");
                (CompositeEntry::default(), CompositeEntry::default())
            }
        };
        let user = new_entry(cp_option.filter(|cp| !cp.is_empty()).unwrap_or("."));
        Self { boot, ext, user }
    }
}

fn jre_dir(jre_option: Option<&str>) -> Option<PathBuf> {
    if let Some(jre) = jre_option {
        let path = PathBuf::from(jre);
        if path.exists() {
            return Some(path);
        }
    }
    let local = PathBuf::from("./jre");
    if local.exists() {
        return Some(local);
    }
    let java_home = env::var_os("JAVA_HOME")?;
    let path = PathBuf::from(java_home).join("jre");
    path.exists().then_some(path)
}

impl ClassPathEntry for ClassPath {
    fn read_class(&self, class_name: &str) -> Option<(Vec<u8>, String)> {
        self.boot
            .read_class(class_name)
            .or_else(|| self.ext.read_class(class_name))
            .or_else(|| self.user.read_class(class_name))
    }
}
