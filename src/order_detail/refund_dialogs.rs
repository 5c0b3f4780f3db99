//! Refund request, approval and rejection dialogs.

use strum::IntoEnumIterator;
use validator::{Validate, ValidationError};

use crate::{errors::ServiceError, models::RefundReason};

/// A modal holding one form. Reopening always starts from a blank form.
#[derive(Clone, Debug, Default)]
pub struct RefundDialog<F> {
    open: bool,
    submitting: bool,
    form: F,
}

impl<F: Default + Validate> RefundDialog<F> {
    pub fn open(&mut self) {
        self.form = F::default();
        self.submitting = false;
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.submitting = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut F {
        &mut self.form
    }

    /// Submit button state.
    pub fn can_submit(&self) -> bool {
        self.open && !self.submitting && self.form.validate().is_ok()
    }

    pub(crate) fn begin_submit(&mut self) -> Result<(), ServiceError> {
        if !self.open {
            return Err(ServiceError::ValidationError(
                "dialog is not open".to_string(),
            ));
        }
        if self.submitting {
            return Err(ServiceError::Conflict(
                "a submission is already in flight".to_string(),
            ));
        }
        self.form.validate()?;
        self.submitting = true;
        Ok(())
    }

    /// Re-enables the submit button; a successful submission also closes the dialog.
    pub(crate) fn finish_submit(&mut self, succeeded: bool) {
        self.submitting = false;
        if succeeded {
            self.open = false;
        }
    }
}

#[derive(Clone, Debug, Default, Validate)]
pub struct RefundRequestForm {
    #[validate(required)]
    pub reason: Option<RefundReason>,
    pub notes: String,
}

impl RefundRequestForm {
    /// Options for the reason select, in display order.
    pub fn reason_options() -> Vec<(RefundReason, &'static str)> {
        RefundReason::iter().map(|r| (r, r.label())).collect()
    }
}

#[derive(Clone, Debug, Validate)]
pub struct RefundApprovalForm {
    pub notes: String,
    pub create_import_voucher: bool,
}

impl Default for RefundApprovalForm {
    fn default() -> Self {
        Self {
            notes: String::new(),
            create_import_voucher: true,
        }
    }
}

#[derive(Clone, Debug, Default, Validate)]
pub struct RefundRejectionForm {
    #[validate(custom = "validate_notes_present")]
    pub notes: String,
}

fn validate_notes_present(notes: &str) -> Result<(), ValidationError> {
    if notes.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("Vui lòng nhập lý do từ chối".into());
        return Err(err);
    }
    Ok(())
}

/// Blank free text is sent as absent.
pub(crate) fn optional_notes(notes: &str) -> Option<String> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
