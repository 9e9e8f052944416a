use serde::{Deserialize, Serialize};

use crate::error::FileGuardError;

/// One replace-style edit from the wire. Field names are PascalCase on the
/// wire (`LineNumber`, `Type`, `Text`, `OldText`).
///
/// `Text` is always required. At least one of `LineNumber` / `OldText` must
/// be present to anchor the edit. `LineNumber` is 1-based and checked against
/// the file at apply time, because earlier edits in a batch can change the
/// line count.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EditDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(rename = "Type", default = "default_edit_type")]
    pub edit_type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_text: Option<String>,
}

pub const REPLACE_EDIT_TYPE: &str = "Replace";

fn default_edit_type() -> String {
    REPLACE_EDIT_TYPE.to_string()
}

impl EditDescriptor {
    pub fn replace_line(line_number: u32, text: impl Into<String>) -> Self {
        Self {
            line_number: Some(line_number),
            edit_type: default_edit_type(),
            text: text.into(),
            old_text: None,
        }
    }

    pub fn replace_text(old_text: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            line_number: None,
            edit_type: default_edit_type(),
            text: text.into(),
            old_text: Some(old_text.into()),
        }
    }

    pub fn replace_in_line(
        line_number: u32,
        old_text: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            line_number: Some(line_number),
            edit_type: default_edit_type(),
            text: text.into(),
            old_text: Some(old_text.into()),
        }
    }
}

/// Validates a whole batch before any I/O and returns normalized copies with
/// `Text`/`OldText` line endings canonicalized to `\n`. Any structural
/// problem rejects the entire batch.
pub fn validate_batch(edits: &[EditDescriptor]) -> Result<Vec<EditDescriptor>, FileGuardError> {
    let mut normalized = Vec::with_capacity(edits.len());
    for (index, edit) in edits.iter().enumerate() {
        if edit.edit_type != REPLACE_EDIT_TYPE {
            return Err(FileGuardError::Validation(format!(
                "edit {index}: unsupported type '{}'; only '{REPLACE_EDIT_TYPE}' is supported",
                edit.edit_type
            )));
        }
        if edit.text.is_empty() {
            return Err(FileGuardError::Validation(format!(
                "edit {index}: Text is required and must be non-empty"
            )));
        }
        if edit.line_number.is_none() && edit.old_text.is_none() {
            return Err(FileGuardError::Validation(format!(
                "edit {index}: at least one of LineNumber or OldText must anchor the edit"
            )));
        }
        if edit.line_number == Some(0) {
            return Err(FileGuardError::Validation(format!(
                "edit {index}: LineNumber is 1-based and must be positive"
            )));
        }
        normalized.push(EditDescriptor {
            line_number: edit.line_number,
            edit_type: edit.edit_type.clone(),
            text: normalize_newlines(&edit.text),
            old_text: edit.old_text.as_deref().map(normalize_newlines),
        });
    }
    Ok(normalized)
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
