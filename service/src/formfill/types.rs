//! Wire types for the form-filling service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Required steps for one legislator's web form, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub required_actions: Vec<RequiredAction>,
}

/// One step of a web form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAction {
    /// Field token, e.g. `$NAME_FIRST` or `$TOPIC`
    pub value: String,
    /// Closed set of acceptable values, when the field is a select
    #[serde(default, rename = "options_hash", skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionSet>,
}

/// Allowed values for a select field.
///
/// The service sends either a plain list or a label-to-value map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionSet {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

/// A selectable option with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormOption {
    pub label: String,
    pub value: String,
}

impl OptionSet {
    /// Options in wire order for lists, label order for maps.
    #[must_use]
    pub fn options(&self) -> Vec<FormOption> {
        match self {
            Self::List(values) => values
                .iter()
                .map(|v| FormOption {
                    label: v.clone(),
                    value: v.clone(),
                })
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(label, value)| FormOption {
                    label: label.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, value: &str) -> bool {
        match self {
            Self::List(values) => values.iter().any(|v| v == value),
            Self::Map(map) => map.values().any(|v| v == value),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(values) => values.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }
}

/// Body of a form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub bio_id: String,
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Success,
    Failure,
}

/// Result of one submission; `detail` is the raw response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    pub detail: Value,
}

impl SubmitOutcome {
    /// Anything other than `"status": "success"` counts as a failure.
    #[must_use]
    pub fn from_response(detail: Value) -> Self {
        let status = match detail.get("status").and_then(Value::as_str) {
            Some("success") => SubmitStatus::Success,
            _ => SubmitStatus::Failure,
        };
        Self { status, detail }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SubmitStatus::Success
    }
}
