//! Solution, project and artifact discovery on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ScannerConfig;

/// Finds the solution manifest, its migration projects and their compiled artifacts.
#[derive(Debug, Clone)]
pub struct ProjectLocator {
    config: ScannerConfig,
}

impl ProjectLocator {
    /// Create a locator.
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Walk `start` and its ancestors for a directory holding exactly one solution manifest.
    ///
    /// A relative `start` is resolved against the current directory first.
    pub fn find_solution_manifest(&self, start: &Path) -> Option<PathBuf> {
        let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());

        for dir in start.ancestors() {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };

            let mut manifests: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_extension(p, &self.config.solution_extensions))
                .collect();

            match manifests.len() {
                0 => continue,
                1 => {
                    let manifest = manifests.remove(0);
                    debug!("Found solution manifest {}", manifest.display());
                    return Some(manifest);
                }
                n => {
                    warn!(
                        "Skipping {}: {} solution manifests, cannot pick one",
                        dir.display(),
                        n
                    );
                }
            }
        }

        None
    }

    /// All project manifests beneath `root`, in file-name order.
    pub fn enumerate_project_manifests(&self, root: &Path) -> Vec<PathBuf> {
        let extension = std::slice::from_ref(&self.config.project_extension);

        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_extension(e.path(), extension))
            .map(|e| e.into_path())
            .collect()
    }

    /// Whether the manifest text mentions any project marker.
    pub fn is_migration_project(&self, manifest: &Path) -> bool {
        let content = match fs::read_to_string(manifest) {
            Ok(content) => content.to_lowercase(),
            Err(e) => {
                debug!("Cannot read {}: {}", manifest.display(), e);
                return false;
            }
        };

        self.config
            .project_markers
            .iter()
            .any(|marker| content.contains(&marker.to_lowercase()))
    }

    /// First built artifact for the project, searching configurations in order.
    ///
    /// Looks in `<dir>/bin/<configuration>/<tfm>/<stem>.<ext>`.
    pub fn locate_artifact(&self, manifest: &Path) -> Option<PathBuf> {
        let project_dir = manifest.parent()?;
        let stem = manifest.file_stem()?.to_string_lossy();
        let file_name = format!("{}.{}", stem, self.config.artifact_extension);

        for configuration in &self.config.build_configurations {
            let config_dir = project_dir.join("bin").join(configuration);
            let Ok(entries) = fs::read_dir(&config_dir) else {
                continue;
            };

            let mut frameworks: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            frameworks.sort();

            if let Some(artifact) = frameworks
                .iter()
                .map(|tfm| tfm.join(&file_name))
                .find(|candidate| candidate.is_file())
            {
                debug!("Found artifact {}", artifact.display());
                return Some(artifact);
            }
        }

        debug!("No built artifact for {}", manifest.display());
        None
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn locator() -> ProjectLocator {
        ProjectLocator::new(&ScannerConfig::default())
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_find_solution_walks_up() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("App.sln"), "");
        let nested = root.path().join("src/Data/Migrations");
        fs::create_dir_all(&nested).unwrap();

        let found = locator().find_solution_manifest(&nested).unwrap();
        assert_eq!(found, root.path().join("App.sln"));
    }

    #[test]
    fn test_find_solution_slnx_case_insensitive() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("App.SLNX"), "");

        let found = locator().find_solution_manifest(root.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "App.SLNX");
    }

    #[test]
    fn test_ambiguous_directory_is_skipped() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("Outer.sln"), "");
        let inner = root.path().join("inner");
        write(&inner.join("A.sln"), "");
        write(&inner.join("B.slnx"), "");

        let found = locator().find_solution_manifest(&inner).unwrap();
        assert_eq!(found, root.path().join("Outer.sln"));
    }

    #[test]
    fn test_enumerate_projects_sorted() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("src/Zeta/Zeta.csproj"), "");
        write(&root.path().join("src/Alpha/Alpha.csproj"), "");
        write(&root.path().join("src/Alpha/readme.md"), "");

        let projects = locator().enumerate_project_manifests(root.path());
        let names: Vec<_> = projects
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Alpha.csproj", "Zeta.csproj"]);
    }

    #[test]
    fn test_is_migration_project() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("Data.csproj");
        let web = root.path().join("Web.csproj");
        write(
            &data,
            r#"<Project><ItemGroup><PackageReference Include="nabs.launchpad.core.datamigrations" /></ItemGroup></Project>"#,
        );
        write(&web, "<Project />");

        let locator = locator();
        assert!(locator.is_migration_project(&data));
        assert!(!locator.is_migration_project(&web));
        assert!(!locator.is_migration_project(&root.path().join("Missing.csproj")));
    }

    #[test]
    fn test_locate_artifact_prefers_debug() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("Data/Data.csproj");
        write(&manifest, "");
        write(&root.path().join("Data/bin/Release/net9.0/Data.dll"), "");
        write(&root.path().join("Data/bin/Debug/net9.0/Data.dll"), "");

        let artifact = locator().locate_artifact(&manifest).unwrap();
        assert!(artifact.ends_with("bin/Debug/net9.0/Data.dll"));
    }

    #[test]
    fn test_locate_artifact_falls_back_to_release() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("Data/Data.csproj");
        write(&manifest, "");
        fs::create_dir_all(root.path().join("Data/bin/Debug/net9.0")).unwrap();
        write(&root.path().join("Data/bin/Release/net8.0/Data.dll"), "");

        let artifact = locator().locate_artifact(&manifest).unwrap();
        assert!(artifact.ends_with("bin/Release/net8.0/Data.dll"));
    }

    #[test]
    fn test_locate_artifact_unbuilt() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("Data/Data.csproj");
        write(&manifest, "");
        assert!(locator().locate_artifact(&manifest).is_none());
    }
}
