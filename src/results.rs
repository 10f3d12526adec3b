//! Outcome types reported by officers.

use crate::types::{PropertyOperation, PublisherManifest, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a single operation inside a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Success,
    PublisherNotFound,
    PermissionConflict,
    KeyNotFound,
    VersionConflict,
    ValidationError,
    UnknownError,
    Skipped,
}

impl OperationStatus {
    pub fn is_success(self) -> bool {
        self == OperationStatus::Success
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: PropertyOperation,
    pub status: OperationStatus,
    pub message: String,
}

impl OperationResult {
    pub fn success(operation: PropertyOperation) -> Self {
        Self {
            operation,
            status: OperationStatus::Success,
            message: String::new(),
        }
    }

    pub fn failure(
        operation: PropertyOperation,
        status: OperationStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            status,
            message: message.into(),
        }
    }
}

/// Outcome of a whole manifest at one officer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManifestStatus {
    TotalSuccess,
    PartialSuccess,
    Skip,
    Error,
}

impl ManifestStatus {
    /// Derive the manifest status from its per-operation outcomes.
    ///
    /// An empty manifest applied at the cursor counts as a total success.
    pub fn from_operations(results: &[OperationResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.status.is_success()).count();
        if succeeded == results.len() {
            ManifestStatus::TotalSuccess
        } else if succeeded == 0 && results.iter().all(|r| r.status == OperationStatus::Skipped) {
            ManifestStatus::Skip
        } else {
            ManifestStatus::PartialSuccess
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestResult {
    /// Name of the officer that produced this result.
    pub officer: String,
    pub manifest: Arc<PublisherManifest>,
    pub operation_results: Vec<OperationResult>,
    pub status: ManifestStatus,
    pub description: String,
    pub timestamp: Timestamp,
}

impl ManifestResult {
    pub(crate) fn new(
        officer: &str,
        manifest: Arc<PublisherManifest>,
        operation_results: Vec<OperationResult>,
        status: ManifestStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            officer: officer.to_string(),
            manifest,
            operation_results,
            status,
            description: description.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Build a result with no operation outcomes (error or skip paths).
    pub(crate) fn bare(
        officer: &str,
        manifest: Arc<PublisherManifest>,
        status: ManifestStatus,
        description: impl Into<String>,
    ) -> Self {
        Self::new(officer, manifest, Vec::new(), status, description)
    }

    pub fn is_success(&self) -> bool {
        self.status == ManifestStatus::TotalSuccess
    }
}
