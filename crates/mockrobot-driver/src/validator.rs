//! [`OperationValidator`] – input interlock for `ExecuteOperation`.
//!
//! Every request coming from the UI passes through
//! [`OperationValidator::validate`] before anything is put on the wire.  The
//! checks run in a fixed order and the first failure is returned:
//!
//! 1. the operation name must be `Pick`, `Place` or `Transfer`;
//! 2. every parameter name must be `Source Location` or
//!    `Destination Location`;
//! 3. every parameter value must lie inside the valid location range;
//! 4. names and values must pair up one-to-one;
//! 5. the operation must be given every location it needs.
//!
//! A successful validation yields a [`ValidatedOperation`] with the locations
//! already resolved, so dispatch never has to index into the raw arrays.

use std::ops::RangeInclusive;

use mockrobot_types::{
    DESTINATION_LOCATION, Operation, OperationRequest, SOURCE_LOCATION, VALID_PARAMETER_NAMES,
    ValidationError,
};

use crate::config::DEFAULT_VALID_RANGE;

/// A request that passed validation, with its locations resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedOperation {
    Pick { source: i64 },
    Place { destination: i64 },
    Transfer { source: i64, destination: i64 },
}

impl ValidatedOperation {
    pub fn operation(&self) -> Operation {
        match self {
            ValidatedOperation::Pick { .. } => Operation::Pick,
            ValidatedOperation::Place { .. } => Operation::Place,
            ValidatedOperation::Transfer { .. } => Operation::Transfer,
        }
    }
}

/// Pure rule set applied to UI requests.
///
/// # Example
///
/// ```
/// use mockrobot_driver::validator::{OperationValidator, ValidatedOperation};
///
/// let validator = OperationValidator::default();
/// let ok = validator.validate("Pick", &["Source Location"], &[10]).unwrap();
/// assert_eq!(ok, ValidatedOperation::Pick { source: 10 });
///
/// assert!(validator.validate("Pick", &["Source Location"], &[18]).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct OperationValidator {
    valid_range: RangeInclusive<i64>,
}

impl Default for OperationValidator {
    fn default() -> Self {
        Self::new(DEFAULT_VALID_RANGE)
    }
}

impl OperationValidator {
    pub fn new(valid_range: RangeInclusive<i64>) -> Self {
        Self { valid_range }
    }

    /// Validate a raw UI request.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, in the order described in
    /// the module docs.
    pub fn validate<S: AsRef<str>>(
        &self,
        operation: &str,
        names: &[S],
        values: &[i64],
    ) -> Result<ValidatedOperation, ValidationError> {
        let operation: Operation = operation.parse()?;
        self.validate_parts(operation, names, values)
    }

    /// Validate an already-typed [`OperationRequest`].
    pub fn validate_request(
        &self,
        request: &OperationRequest,
    ) -> Result<ValidatedOperation, ValidationError> {
        self.validate_parts(
            request.operation,
            &request.parameter_names,
            &request.parameter_values,
        )
    }

    fn validate_parts<S: AsRef<str>>(
        &self,
        operation: Operation,
        names: &[S],
        values: &[i64],
    ) -> Result<ValidatedOperation, ValidationError> {
        if let Some(bad) = names
            .iter()
            .map(|n| AsRef::<str>::as_ref(n))
            .find(|name| !VALID_PARAMETER_NAMES.contains(name))
        {
            return Err(ValidationError::InvalidParameterName(bad.to_string()));
        }

        if let Some(&bad) = values.iter().find(|v| !self.valid_range.contains(*v)) {
            return Err(ValidationError::InvalidParameterValue {
                value: bad,
                min: *self.valid_range.start(),
                max: *self.valid_range.end(),
            });
        }

        if names.len() != values.len() {
            return Err(ValidationError::ParameterCountMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let lookup = |wanted: &str| -> Result<i64, ValidationError> {
            names
                .iter()
                .position(|n| AsRef::<str>::as_ref(n) == wanted)
                .map(|idx| values[idx])
                .ok_or_else(|| ValidationError::MissingParameter {
                    operation,
                    name: wanted.to_string(),
                })
        };

        let validated = match operation {
            Operation::Pick => ValidatedOperation::Pick {
                source: lookup(SOURCE_LOCATION)?,
            },
            Operation::Place => ValidatedOperation::Place {
                destination: lookup(DESTINATION_LOCATION)?,
            },
            Operation::Transfer => ValidatedOperation::Transfer {
                source: lookup(SOURCE_LOCATION)?,
                destination: lookup(DESTINATION_LOCATION)?,
            },
        };
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> OperationValidator {
        OperationValidator::default()
    }

    #[test]
    fn pick_in_range_is_accepted() {
        for v in 1..=17 {
            let ok = validator().validate("Pick", &[SOURCE_LOCATION], &[v]).unwrap();
            assert_eq!(ok, ValidatedOperation::Pick { source: v });
        }
    }

    #[test]
    fn values_outside_range_are_rejected() {
        for v in [-3, 0, 18, 122] {
            let err = validator()
                .validate("Pick", &[SOURCE_LOCATION], &[v])
                .unwrap_err();
            assert_eq!(
                err,
                ValidationError::InvalidParameterValue { value: v, min: 1, max: 17 }
            );
            assert!(err.to_string().contains("Invalid parameter value"));
        }
    }

    #[test]
    fn unknown_operation_is_reported_first() {
        // Names and values are bad too, but the operation is checked first.
        let err = validator()
            .validate("Make smoothie", &["Source"], &[122])
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidOperation("Make smoothie".into()));
    }

    #[test]
    fn names_are_checked_before_values() {
        let err = validator()
            .validate("Transfer", &["Source", "Destination"], &[122, 5])
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidParameterName("Source".into()));
    }

    #[test]
    fn transfer_resolves_locations_by_name() {
        let ok = validator()
            .validate(
                "Transfer",
                &[DESTINATION_LOCATION, SOURCE_LOCATION],
                &[5, 12],
            )
            .unwrap();
        assert_eq!(ok, ValidatedOperation::Transfer { source: 12, destination: 5 });
        assert_eq!(ok.operation(), Operation::Transfer);
    }

    #[test]
    fn transfer_without_destination_is_rejected() {
        let err = validator()
            .validate("Transfer", &[SOURCE_LOCATION], &[3])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParameter {
                operation: Operation::Transfer,
                name: DESTINATION_LOCATION.into(),
            }
        );
    }

    #[test]
    fn place_needs_destination_location() {
        let err = validator()
            .validate("Place", &[SOURCE_LOCATION], &[3])
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingParameter { .. }));
        let ok = validator()
            .validate("Place", &[DESTINATION_LOCATION], &[3])
            .unwrap();
        assert_eq!(ok, ValidatedOperation::Place { destination: 3 });
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = validator()
            .validate("Pick", &[SOURCE_LOCATION], &[3, 4])
            .unwrap_err();
        assert_eq!(err, ValidationError::ParameterCountMismatch { names: 1, values: 2 });
    }

    #[test]
    fn typed_request_uses_same_rules() {
        let request = OperationRequest::new(Operation::Pick, [SOURCE_LOCATION], [17]);
        assert!(validator().validate_request(&request).is_ok());

        let request = OperationRequest::new(Operation::Pick, [SOURCE_LOCATION], [0]);
        assert!(validator().validate_request(&request).is_err());
    }

    #[test]
    fn custom_range_is_honoured() {
        let narrow = OperationValidator::new(1..=4);
        assert!(narrow.validate("Pick", &[SOURCE_LOCATION], &[5]).is_err());
        assert!(narrow.validate("Pick", &[SOURCE_LOCATION], &[4]).is_ok());
    }
}
