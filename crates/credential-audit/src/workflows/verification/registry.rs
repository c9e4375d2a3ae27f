use serde::Serialize;

use super::domain::{StepKey, StepType};

pub const LICENSE_VERIFICATION: &str = "license_verification";
pub const SANCTIONS_SCREENING: &str = "sanctions_screening";
pub const NPDB_QUERY: &str = "npdb_query";
pub const EDUCATION_VERIFICATION: &str = "education_verification";
pub const BOARD_CERTIFICATION: &str = "board_certification";
pub const DEA_VERIFICATION: &str = "dea_verification";
pub const WORK_HISTORY_REVIEW: &str = "work_history_review";
pub const COMMITTEE_REVIEW: &str = "committee_review";

/// Catalog entry describing one verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationStepDefinition {
    pub key: &'static str,
    pub display_name: &'static str,
    pub step_type: StepType,
    pub dependencies: Vec<&'static str>,
}

/// Static catalog of known verification steps and the order they depend on each other.
///
/// Dependency policy lives only here; the state store never hard-codes workflow order.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<VerificationStepDefinition>,
}

impl StepRegistry {
    pub fn standard() -> Self {
        Self {
            steps: standard_step_definitions(),
        }
    }

    pub fn from_definitions(steps: Vec<VerificationStepDefinition>) -> Self {
        Self { steps }
    }

    pub fn definitions(&self) -> &[VerificationStepDefinition] {
        &self.steps
    }

    pub fn definition(&self, step_key: &str) -> Option<&VerificationStepDefinition> {
        self.steps.iter().find(|step| step.key == step_key)
    }

    /// Prerequisites of a step; unknown keys have none.
    pub fn dependencies_of(&self, step_key: &str) -> Vec<StepKey> {
        self.definition(step_key)
            .map(|step| step.dependencies.iter().copied().map(StepKey::from).collect())
            .unwrap_or_default()
    }

    pub fn step_type_of(&self, step_key: &str) -> StepType {
        self.definition(step_key)
            .map(|step| step.step_type)
            .unwrap_or(StepType::Other)
    }

    pub fn display_name_of<'a>(&'a self, step_key: &'a str) -> &'a str {
        self.definition(step_key)
            .map(|step| step.display_name)
            .unwrap_or(step_key)
    }

    pub fn contains(&self, step_key: &str) -> bool {
        self.definition(step_key).is_some()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_step_definitions() -> Vec<VerificationStepDefinition> {
    vec![
        VerificationStepDefinition {
            key: LICENSE_VERIFICATION,
            display_name: "State License Verification",
            step_type: StepType::License,
            dependencies: vec![],
        },
        VerificationStepDefinition {
            key: SANCTIONS_SCREENING,
            display_name: "OIG/SAM Exclusions Screen",
            step_type: StepType::Sanctions,
            dependencies: vec![],
        },
        VerificationStepDefinition {
            key: NPDB_QUERY,
            display_name: "NPDB Malpractice Query",
            step_type: StepType::Malpractice,
            dependencies: vec![],
        },
        VerificationStepDefinition {
            key: EDUCATION_VERIFICATION,
            display_name: "Education & Training Verification",
            step_type: StepType::Education,
            dependencies: vec![LICENSE_VERIFICATION],
        },
        VerificationStepDefinition {
            key: BOARD_CERTIFICATION,
            display_name: "Board Certification",
            step_type: StepType::BoardCertification,
            dependencies: vec![EDUCATION_VERIFICATION],
        },
        VerificationStepDefinition {
            key: DEA_VERIFICATION,
            display_name: "DEA Registration Check",
            step_type: StepType::DeaRegistration,
            dependencies: vec![LICENSE_VERIFICATION],
        },
        VerificationStepDefinition {
            key: WORK_HISTORY_REVIEW,
            display_name: "Work History Review",
            step_type: StepType::WorkHistory,
            dependencies: vec![],
        },
        VerificationStepDefinition {
            key: COMMITTEE_REVIEW,
            display_name: "Credentialing Committee Review",
            step_type: StepType::CommitteeReview,
            dependencies: vec![
                LICENSE_VERIFICATION,
                SANCTIONS_SCREENING,
                NPDB_QUERY,
                EDUCATION_VERIFICATION,
                BOARD_CERTIFICATION,
            ],
        },
    ]
}
