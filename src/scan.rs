use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use tracing::debug;
use zip::ZipArchive;

use crate::classfile::read_class;
use crate::hierarchy::{ClassSource, LoaderId, LocatedClass};
use crate::ir::RawClass;

/// Loader that defines classes from `--input`.
pub const INPUT_LOADER: &str = "app";
/// Parent of [`INPUT_LOADER`], defining classes from `--classpath`.
pub const CLASSPATH_LOADER: &str = "classpath";

/// One class read from the input, with the URI it was read from.
#[derive(Clone, Debug)]
pub struct ScannedClass {
    pub uri: String,
    pub class: Arc<RawClass>,
}

/// Everything read for one run.
pub struct ScanOutput {
    /// Input classes in deterministic path order; these get planned.
    pub targets: Vec<ScannedClass>,
    pub index: ClassIndex,
    pub artifacts: Vec<Artifact>,
}

impl ScanOutput {
    pub fn class_count(&self) -> usize {
        self.index.len()
    }
}

/// Classes grouped by defining loader, parents first.
///
/// Lookups delegate parent-first, as JVM class loaders do.
#[derive(Debug, Default)]
pub struct ClassIndex {
    loaders: Vec<(LoaderId, HashMap<String, Arc<RawClass>>)>,
}

impl ClassIndex {
    pub fn insert(&mut self, loader: &LoaderId, class: Arc<RawClass>) {
        let position = match self.loaders.iter().position(|(id, _)| id == loader) {
            Some(position) => position,
            None => {
                self.loaders.push((loader.clone(), HashMap::new()));
                self.loaders.len() - 1
            }
        };
        let classes = &mut self.loaders[position].1;
        if classes.contains_key(&class.name) {
            debug!(class = %class.name, %loader, "duplicate class definition ignored");
            return;
        }
        classes.insert(class.name.clone(), class);
    }

    pub fn len(&self) -> usize {
        self.loaders.iter().map(|(_, classes)| classes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassSource for ClassIndex {
    fn locate(&self, loader: &LoaderId, name: &str) -> Option<LocatedClass> {
        let visible = self
            .loaders
            .iter()
            .position(|(id, _)| id == loader)
            .map_or(0, |position| position + 1);
        self.loaders[..visible]
            .iter()
            .find_map(|(id, classes)| {
                classes.get(name).map(|class| LocatedClass {
                    loader: id.clone(),
                    class: Arc::clone(class),
                })
            })
    }
}

struct Collector {
    loader: LoaderId,
    is_input: bool,
    targets: Vec<ScannedClass>,
    index: ClassIndex,
    artifacts: Vec<Artifact>,
}

impl Collector {
    fn add(&mut self, uri: String, data: &[u8]) -> Result<()> {
        let class = Arc::new(read_class(data).with_context(|| format!("failed to parse {uri}"))?);
        if self.is_input {
            self.targets.push(ScannedClass {
                uri,
                class: Arc::clone(&class),
            });
        }
        self.index.insert(&self.loader, class);
        Ok(())
    }
}

pub fn scan_inputs(input: &Path, classpath: &[PathBuf]) -> Result<ScanOutput> {
    let mut collector = Collector {
        loader: LoaderId::new(CLASSPATH_LOADER),
        is_input: false,
        targets: Vec::new(),
        index: ClassIndex::default(),
        artifacts: Vec::new(),
    };

    // Keep deterministic ordering by sorting classpath entries and directory listings.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by_key(|path| path_key(path));
    for entry in classpath_entries {
        scan_path(&entry, true, &mut collector)?;
    }

    collector.loader = LoaderId::new(INPUT_LOADER);
    collector.is_input = true;
    scan_path(input, true, &mut collector)?;

    Ok(ScanOutput {
        targets: collector.targets,
        index: collector.index,
        artifacts: collector.artifacts,
    })
}

fn scan_path(path: &Path, strict: bool, collector: &mut Collector) -> Result<()> {
    if path.is_dir() {
        return scan_dir(path, collector);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(path, collector),
        "jar" => scan_jar_file(path, collector),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, collector: &mut Collector) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by_key(|entry| path_key(entry));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, collector)?;
        } else {
            scan_path(&entry, false, collector)?;
        }
    }

    Ok(())
}

fn scan_class_file(path: &Path, collector: &mut Collector) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let uri = path_to_uri(path);
    collector.add(uri.clone(), &data)?;
    push_artifact(collector, uri, data.len() as u64, None);
    Ok(())
}

fn scan_jar_file(path: &Path, collector: &mut Collector) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_artifact(collector, path_to_uri(path), jar_len, None);

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let entry_uri = jar_entry_uri(path, &name);
        collector.add(entry_uri.clone(), &data)?;
        push_artifact(collector, entry_uri, entry.size(), Some(jar_index));
    }

    Ok(())
}

/// Record an artifact and return its index for parent linkage (e.g., JAR entries).
fn push_artifact(
    collector: &mut Collector,
    uri: String,
    len: u64,
    parent_index: Option<i64>,
) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let roles: Option<Vec<Value>> = if collector.is_input {
        serde_json::to_value(ArtifactRoles::AnalysisTarget)
            .ok()
            .map(|role| vec![role])
    } else {
        None
    };
    let artifact = match (parent_index, roles) {
        (Some(parent_index), Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        (Some(parent_index), None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .build(),
        (None, Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        (None, None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = collector.artifacts.len() as i64;
    collector.artifacts.push(artifact);
    index
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
