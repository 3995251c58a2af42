use crate::models::job::CaseRef;

/// Fixed suffix of the input volume under the per-case input prefix.
const INPUT_VOLUME_SUFFIX: &str = "/ct.nii.gz";
/// Fixed suffix of the computed-plane report under the per-case output prefix.
const PLANE_REPORT_SUFFIX: &str = "/information.json";

/// Named artifacts associated with a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The NIfTI input volume staged before compute.
    InputVolume,
    /// The directory prefix under which segmentation mesh files are uploaded.
    MeshDir,
    /// The computed-plane JSON report.
    PlaneReport,
}

/// Derives canonical object-store keys from a case and an artifact kind.
///
/// Key layout is a single configurable template strategy: both prefixes carry
/// `{uid}` and `{cid}` placeholders filled from the job arguments, so a given
/// `(user_id, case_id, artifact_kind)` always resolves to the identical key.
#[derive(Debug, Clone)]
pub struct PathResolver {
    input_template: String,
    output_template: String,
}

impl PathResolver {
    pub fn new(
        input_template: impl Into<String>,
        output_template: impl Into<String>,
    ) -> Result<Self, PathError> {
        let input_template = input_template.into();
        let output_template = output_template.into();

        for template in [&input_template, &output_template] {
            if !template.contains("{uid}") || !template.contains("{cid}") {
                return Err(PathError::MissingPlaceholder(template.clone()));
            }
        }

        Ok(Self {
            input_template,
            output_template,
        })
    }

    /// Prefix under which a case's input artifacts live.
    pub fn input_prefix(&self, case: &CaseRef) -> String {
        render(&self.input_template, case)
    }

    /// Prefix under which a case's computed artifacts are uploaded.
    pub fn output_prefix(&self, case: &CaseRef) -> String {
        render(&self.output_template, case)
    }

    /// Full object key for a named artifact of this case.
    pub fn key(&self, case: &CaseRef, kind: ArtifactKind) -> String {
        match kind {
            ArtifactKind::InputVolume => self.input_prefix(case) + INPUT_VOLUME_SUFFIX,
            ArtifactKind::MeshDir => self.output_prefix(case),
            ArtifactKind::PlaneReport => self.output_prefix(case) + PLANE_REPORT_SUFFIX,
        }
    }

    /// Object key for one produced mesh file under the case's mesh directory.
    pub fn mesh_key(&self, case: &CaseRef, file_name: &str) -> String {
        format!("{}/{}", self.output_prefix(case), file_name)
    }
}

fn render(template: &str, case: &CaseRef) -> String {
    template
        .replace("{uid}", &case.user_id)
        .replace("{cid}", &case.case_id)
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("key template {0:?} must contain both {{uid}} and {{cid}} placeholders")]
    MissingPlaceholder(String),
}
