//! Runs the import, normalize and export steps over every file of a directory.

use std::{
    fmt, fs,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    conversion::{Asset, Exporter, Importer, Scene},
    error::{Error, FileError, Result},
    format::fbx::{FbxExporter, FbxImporter},
    normalize::normalize,
    profile::ExportProfile,
    scan::scan,
};

/// The name of the directory, inside the source directory, that receives the exports.
pub const EXPORT_DIR_NAME: &str = "MixamoExport";

/// What to do with a file that has no joint to put under the synthetic root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EmptySkeleton {
    /// Export the file with an empty synthetic root.
    #[default]
    Export,
    /// Leave the file out of the export and report it as skipped.
    Skip,
}

/// One file to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl FileTask {
    /// Creates a task that writes the file, under the same name, into `destination_dir`.
    pub fn new(source: PathBuf, destination_dir: &Path) -> Self {
        let destination = destination_dir.join(source.file_name().unwrap_or_default());
        Self {
            source,
            destination,
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: FileError,
}

/// The outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub exported: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FileFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.exported.len()
    }

    pub fn failed(&self) -> usize {
        self.failed.len()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exported, {} failed",
            self.succeeded(),
            self.failed()
        )?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        for failure in &self.failed {
            write!(f, "\n  {}: {}", failure.path.display(), failure.error)?;
        }

        Ok(())
    }
}

enum Outcome {
    Exported,
    Skipped,
}

/// The scene, borrowed for one file. The scene is reset when the borrow starts and again
/// when it ends, whichever way the task exits.
struct ScopedScene<'a> {
    scene: &'a mut Scene,
}

impl<'a> ScopedScene<'a> {
    fn acquire(scene: &'a mut Scene) -> Self {
        scene.reset();
        Self { scene }
    }
}

impl Deref for ScopedScene<'_> {
    type Target = Scene;

    fn deref(&self) -> &Scene {
        self.scene
    }
}

impl DerefMut for ScopedScene<'_> {
    fn deref_mut(&mut self) -> &mut Scene {
        self.scene
    }
}

impl Drop for ScopedScene<'_> {
    fn drop(&mut self) {
        self.scene.reset();
    }
}

/// Processes the files of a directory one at a time, each in a freshly reset scene.
pub struct BatchPipeline {
    importer: Box<dyn Importer>,
    exporter: Box<dyn Exporter>,
    profile: ExportProfile,
    empty_skeleton: EmptySkeleton,
    scene: Scene,
}

impl BatchPipeline {
    /// Creates an FBX pipeline. The profile is used as is for every file of every run.
    pub fn new(profile: ExportProfile) -> Self {
        Self::with_formats(profile, FbxImporter::default(), FbxExporter::default())
    }

    pub fn with_formats(
        profile: ExportProfile,
        importer: impl Importer + 'static,
        exporter: impl Exporter + 'static,
    ) -> Self {
        Self {
            importer: Box::new(importer),
            exporter: Box::new(exporter),
            profile,
            empty_skeleton: EmptySkeleton::default(),
            scene: Scene::default(),
        }
    }

    pub fn empty_skeleton(mut self, policy: EmptySkeleton) -> Self {
        self.empty_skeleton = policy;
        self
    }

    pub fn profile(&self) -> &ExportProfile {
        &self.profile
    }

    /// The live scene. It's empty outside of a run.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Checks the source directory, creates the export directory and lists the tasks. Any
    /// error here stops the run before a file is touched.
    pub fn plan(&self, source_dir: &Path) -> Result<Vec<FileTask>> {
        let metadata = fs::metadata(source_dir).map_err(|source| Error::SourceDirectory {
            path: source_dir.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(Error::SourceDirectory {
                path: source_dir.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let destination_dir = source_dir.join(EXPORT_DIR_NAME);
        fs::create_dir_all(&destination_dir).map_err(|source| Error::DestinationDirectory {
            path: destination_dir.clone(),
            source,
        })?;

        let files = scan(source_dir, self.importer.extensions())?;
        Ok(files
            .into_iter()
            .map(|file| FileTask::new(file, &destination_dir))
            .collect())
    }

    /// Processes every supported file of `source_dir`. Files that fail are recorded in the
    /// report and the run goes on.
    pub fn run(&mut self, source_dir: &Path) -> Result<RunReport> {
        let tasks = self.plan(source_dir)?;
        log::info!(
            "Exporting {} files to \"{}\" as {}",
            tasks.len(),
            source_dir.join(EXPORT_DIR_NAME).display(),
            self.profile.file_version
        );

        let mut report = RunReport::default();
        for task in tasks {
            match self.process(&task) {
                Ok(Outcome::Exported) => {
                    log::info!("Exported \"{}\"", task.destination.display());
                    report.exported.push(task.source);
                }
                Ok(Outcome::Skipped) => {
                    log::info!("Skipped \"{}\": no joint to export", task.source.display());
                    report.skipped.push(task.source);
                }
                Err(error) => {
                    log::warn!("Failed to process \"{}\": {}", task.source.display(), error);
                    report.failed.push(FileFailure {
                        path: task.source,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    fn process(&mut self, task: &FileTask) -> std::result::Result<Outcome, FileError> {
        let mut scene = ScopedScene::acquire(&mut self.scene);

        let asset = Asset::from_path(&task.source)
            .with_context(|| format!("Failed to read \"{}\"", task.source.display()))
            .map_err(FileError::Import)?;
        self.importer
            .import(&asset, &mut scene)
            .map_err(FileError::Import)?;

        let normalized = normalize(&mut scene)?;
        if normalized.reparented.is_empty() && self.empty_skeleton == EmptySkeleton::Skip {
            return Ok(Outcome::Skipped);
        }

        let bytes = self
            .exporter
            .export(&scene, normalized.root, &self.profile)
            .map_err(FileError::Export)?;
        fs::write(&task.destination, bytes)
            .with_context(|| format!("Failed to write \"{}\"", task.destination.display()))
            .map_err(FileError::Export)?;

        Ok(Outcome::Exported)
    }
}
