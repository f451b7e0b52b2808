//! Dependency manifest (`<artifact>.deps.json`) parsing and private closure resolution.
//!
//! Only the manifest that sits next to the artifact is consulted. Modules on the shared
//! allowlist resolve to the host and are never staged; everything else must be found in
//! the artifact directory.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::error::{ScanError, ScanResult};

/// Where a dependency is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The host's copy is used; nothing is staged.
    Host,
    /// A private copy in the artifact directory.
    Private(PathBuf),
    /// Listed in the manifest but not present on disk.
    Missing,
}

/// One runtime module of the dependency closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Library that declared the asset.
    pub library: String,
    /// Library version.
    pub version: String,
    /// Module name (asset file stem).
    pub module: String,
    /// Where it resolved to.
    pub resolution: Resolution,
}

/// A library entry of the selected runtime target.
#[derive(Debug, Clone, Default)]
pub struct LibraryEntry {
    /// Library version.
    pub version: String,
    /// Direct dependencies by name.
    pub dependencies: Vec<String>,
    /// Runtime asset paths, relative to the package root.
    pub runtime: Vec<String>,
}

/// Parsed dependency manifest.
#[derive(Debug, Clone)]
pub struct DependencyManifest {
    path: PathBuf,
    runtime_target: String,
    libraries: IndexMap<String, LibraryEntry>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(rename = "runtimeTarget", default)]
    runtime_target: Option<RawRuntimeTarget>,
    #[serde(default)]
    targets: IndexMap<String, IndexMap<String, RawLibrary>>,
}

#[derive(Deserialize)]
struct RawRuntimeTarget {
    name: String,
}

#[derive(Deserialize)]
struct RawLibrary {
    #[serde(default)]
    dependencies: IndexMap<String, String>,
    #[serde(default)]
    runtime: IndexMap<String, serde_json::Value>,
}

impl DependencyManifest {
    /// Path of the manifest next to `artifact`.
    pub fn path_for(artifact: &Path) -> PathBuf {
        let stem = artifact
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        artifact.with_file_name(format!("{stem}.deps.json"))
    }

    /// Read and parse a manifest.
    pub fn load(path: &Path) -> ScanResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ScanError::dependency_manifest(path, e.to_string()))?;
        Self::parse(path, &text)
    }

    /// Parse manifest text.
    pub fn parse(path: &Path, text: &str) -> ScanResult<Self> {
        let raw: RawManifest = serde_json::from_str(text)
            .map_err(|e| ScanError::dependency_manifest(path, e.to_string()))?;

        let RawManifest {
            runtime_target,
            mut targets,
        } = raw;

        let runtime_target = match runtime_target {
            Some(target) => target.name,
            None => targets
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| ScanError::dependency_manifest(path, "no targets"))?,
        };

        let target = targets.swap_remove(&runtime_target).ok_or_else(|| {
            ScanError::dependency_manifest(path, format!("runtime target '{runtime_target}' not listed"))
        })?;

        let libraries = target
            .into_iter()
            .map(|(key, lib)| {
                let (name, version) = key.split_once('/').unwrap_or((key.as_str(), ""));
                let entry = LibraryEntry {
                    version: version.to_string(),
                    dependencies: lib.dependencies.into_keys().collect(),
                    runtime: lib.runtime.into_keys().collect(),
                };
                (name.to_string(), entry)
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            runtime_target,
            libraries,
        })
    }

    /// Manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selected runtime target name.
    pub fn runtime_target(&self) -> &str {
        &self.runtime_target
    }

    /// Look up a library by name.
    pub fn library(&self, name: &str) -> Option<&LibraryEntry> {
        self.libraries.get(name).or_else(|| {
            self.libraries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Resolve the runtime closure of `root`, excluding the root's own assets.
    ///
    /// Libraries are visited breadth-first. A shared library resolves to the host and its
    /// own dependencies are not followed.
    pub fn resolve(
        &self,
        root: &str,
        artifact_dir: &Path,
        config: &LoaderConfig,
    ) -> ScanResult<Vec<ResolvedDependency>> {
        let root_entry = self.library(root).ok_or_else(|| {
            ScanError::dependency_manifest(&self.path, format!("root library '{root}' not listed"))
        })?;

        let mut resolved = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = root_entry.dependencies.iter().cloned().collect();
        seen.insert(root.to_ascii_lowercase());

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.to_ascii_lowercase()) {
                continue;
            }

            let Some(entry) = self.library(&name) else {
                debug!("Dependency '{}' has no entry in {}", name, self.path.display());
                continue;
            };

            if config.is_shared(&name) {
                resolved.push(ResolvedDependency {
                    library: name.clone(),
                    version: entry.version.clone(),
                    module: name,
                    resolution: Resolution::Host,
                });
                continue;
            }

            for asset in &entry.runtime {
                let Some(file_name) = Path::new(asset).file_name() else {
                    continue;
                };
                let module = Path::new(file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();

                let resolution = if config.is_shared(&module) {
                    Resolution::Host
                } else {
                    let candidate = artifact_dir.join(file_name);
                    if candidate.is_file() {
                        Resolution::Private(candidate)
                    } else {
                        Resolution::Missing
                    }
                };

                resolved.push(ResolvedDependency {
                    library: name.clone(),
                    version: entry.version.clone(),
                    module,
                    resolution,
                });
            }

            queue.extend(entry.dependencies.iter().cloned());
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"{
      "runtimeTarget": { "name": ".NETCoreApp,Version=v9.0", "signature": "" },
      "targets": {
        ".NETCoreApp,Version=v9.0": {
          "App.Data/1.0.0": {
            "dependencies": {
              "Microsoft.EntityFrameworkCore.Design": "9.0.0",
              "Humanizer.Core": "2.14.1",
              "Missing.Lib": "1.0.0"
            },
            "runtime": { "App.Data.dll": {} }
          },
          "Microsoft.EntityFrameworkCore.Design/9.0.0": {
            "dependencies": { "Mono.TextTemplating": "3.0.0" },
            "runtime": { "lib/net8.0/Microsoft.EntityFrameworkCore.Design.dll": {} }
          },
          "Mono.TextTemplating/3.0.0": {
            "runtime": { "lib/net6.0/Mono.TextTemplating.dll": {} }
          },
          "Humanizer.Core/2.14.1": {
            "dependencies": { "App.Data": "1.0.0" },
            "runtime": { "lib/net6.0/Humanizer.dll": {} }
          },
          "Missing.Lib/1.0.0": {
            "runtime": { "lib/net8.0/Missing.Lib.dll": {} }
          }
        }
      }
    }"#;

    #[test]
    fn test_path_for() {
        assert_eq!(
            DependencyManifest::path_for(Path::new("/out/App.Data.dll")),
            PathBuf::from("/out/App.Data.deps.json")
        );
    }

    #[test]
    fn test_resolve_closure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Humanizer.dll"), b"MZ").unwrap();

        let manifest = DependencyManifest::parse(Path::new("App.Data.deps.json"), MANIFEST).unwrap();
        assert_eq!(manifest.runtime_target(), ".NETCoreApp,Version=v9.0");

        let resolved = manifest
            .resolve("App.Data", dir.path(), &LoaderConfig::default())
            .unwrap();

        let summary: Vec<(&str, &Resolution)> = resolved
            .iter()
            .map(|d| (d.module.as_str(), &d.resolution))
            .collect();

        assert_eq!(summary, vec![
            ("Microsoft.EntityFrameworkCore.Design", &Resolution::Host),
            (
                "Humanizer",
                &Resolution::Private(dir.path().join("Humanizer.dll"))
            ),
            ("Missing.Lib", &Resolution::Missing),
        ]);
    }

    #[test]
    fn test_missing_root() {
        let manifest = DependencyManifest::parse(Path::new("x.deps.json"), MANIFEST).unwrap();
        let err = manifest
            .resolve("Other", Path::new("."), &LoaderConfig::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::DependencyManifest { .. }));
    }

    #[test]
    fn test_malformed_manifest() {
        let err = DependencyManifest::parse(Path::new("x.deps.json"), "{ not json").unwrap_err();
        assert!(matches!(err, ScanError::DependencyManifest { .. }));

        let err = DependencyManifest::parse(Path::new("x.deps.json"), "{}").unwrap_err();
        assert!(err.to_string().contains("no targets"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = DependencyManifest::load(&dir.path().join("App.deps.json"));
        assert!(result.is_err());
    }
}
