use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::models::report::PlaneReport;

/// Fixed interface to the external numerical models. The models are opaque
/// collaborators; the orchestration core only cares about their inputs,
/// outputs, and failure text.
pub trait InferenceBackend: Send + Sync {
    /// Segment a locally staged volume, writing mesh files into `output_dir`.
    /// Returns the paths of the produced files.
    fn segment(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> impl Future<Output = Result<Vec<PathBuf>, InferenceError>> + Send;

    /// Infer anatomical landmarks from a locally staged volume and derive the
    /// computed-plane report.
    fn locate_planes(
        &self,
        input: &Path,
    ) -> impl Future<Output = Result<PlaneReport, InferenceError>> + Send;
}

/// Backend that shells out to external model commands.
///
/// The segmentation command is invoked as `<cmd> -i <input> -o <output_dir>`;
/// the plane command as `<cmd> <input>`, emitting the report as JSON on
/// stdout. A non-zero exit captures stderr verbatim as the model error.
pub struct CommandBackend {
    segment_cmd: Vec<String>,
    plane_cmd: Vec<String>,
}

impl CommandBackend {
    pub fn new(segment_command: &str, plane_command: &str) -> Result<Self, InferenceError> {
        Ok(Self {
            segment_cmd: split_command(segment_command)?,
            plane_cmd: split_command(plane_command)?,
        })
    }

    async fn run(&self, argv: &[String], extra: &[&std::ffi::OsStr]) -> Result<Vec<u8>, InferenceError> {
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .args(extra)
            .output()
            .await
            .map_err(InferenceError::Spawn)?;

        if !output.status.success() {
            return Err(InferenceError::Model(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl InferenceBackend for CommandBackend {
    async fn segment(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, InferenceError> {
        self.run(
            &self.segment_cmd,
            &[
                "-i".as_ref(),
                input.as_os_str(),
                "-o".as_ref(),
                output_dir.as_os_str(),
            ],
        )
        .await?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(output_dir)
            .await
            .map_err(InferenceError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(InferenceError::Io)? {
            if entry
                .file_type()
                .await
                .map_err(InferenceError::Io)?
                .is_file()
            {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn locate_planes(&self, input: &Path) -> Result<PlaneReport, InferenceError> {
        let stdout = self.run(&self.plane_cmd, &[input.as_os_str()]).await?;
        serde_json::from_slice(&stdout).map_err(InferenceError::Parse)
    }
}

fn split_command(command: &str) -> Result<Vec<String>, InferenceError> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(InferenceError::EmptyCommand);
    }
    Ok(argv)
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("failed to launch model command: {0}")]
    Spawn(std::io::Error),

    #[error("{0}")]
    Model(String),

    #[error("model report was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model output directory could not be read: {0}")]
    Io(std::io::Error),

    #[error("model command is empty")]
    EmptyCommand,
}
