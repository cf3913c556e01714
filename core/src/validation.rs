//! Query validation.
//!
//! Every check here is a pure, total function: invalid input is reported as
//! a returned [`ValidationError`], never as a panic or an `Err` to be
//! propagated. Callers run all checks and fold the results into a
//! [`ValidationReport`] keyed by form field.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use soc_protocol::FieldType;
use soc_protocol::QueryCriterion;
use soc_protocol::QueryOperator;
use soc_protocol::QueryValue;
use soc_protocol::Role;
use soc_protocol::SchemaField;
use soc_protocol::TimeRange;

use crate::policy::RolePolicy;
use crate::schema_catalog::SchemaCatalog;

pub const WILDCARD_TYPE_MESSAGE: &str = "Wildcard only works on keyword/text fields";
pub const DATE_OPERATOR_MESSAGE: &str = "Use term/match on keyword or text fields, not dates";
pub const VALUE_REQUIRED_MESSAGE: &str = "Value is required";
pub const VALUE_NOT_NUMERIC_MESSAGE: &str = "Value must be numeric";
pub const FIELD_REQUIRED_MESSAGE: &str = "Field is required";

/// Form field a validation message is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorField {
    Field,
    Operator,
    Value,
    TimeRange,
}

impl ErrorField {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorField::Field => "field",
            ErrorField::Operator => "operator",
            ErrorField::Value => "value",
            ErrorField::TimeRange => "timeRange",
        }
    }
}

impl fmt::Display for ErrorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: ErrorField,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: ErrorField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Operator/type compatibility.
pub fn validate_operator(field_type: FieldType, operator: QueryOperator) -> Option<ValidationError> {
    if operator == QueryOperator::Wildcard && !field_type.supports_wildcard() {
        return Some(ValidationError::new(
            ErrorField::Operator,
            WILDCARD_TYPE_MESSAGE,
        ));
    }

    if matches!(operator, QueryOperator::Term | QueryOperator::Match) && field_type == FieldType::Date
    {
        return Some(ValidationError::new(
            ErrorField::Operator,
            DATE_OPERATOR_MESSAGE,
        ));
    }

    None
}

/// Value well-formedness for the field type. The operator does not change
/// the outcome.
pub fn validate_value(
    value: &QueryValue,
    field_type: FieldType,
    _operator: QueryOperator,
) -> Option<ValidationError> {
    if value.is_blank() {
        return Some(ValidationError::new(ErrorField::Value, VALUE_REQUIRED_MESSAGE));
    }

    if field_type.is_numeric() && value.as_number().is_none() {
        return Some(ValidationError::new(
            ErrorField::Value,
            VALUE_NOT_NUMERIC_MESSAGE,
        ));
    }

    None
}

/// Role-based lookback ceiling.
pub fn validate_lookback(role: Role, time_range: TimeRange) -> Option<ValidationError> {
    let policy = RolePolicy::for_role(role);
    if policy.permits(time_range) {
        return None;
    }
    let message = policy
        .ceiling_message()
        .unwrap_or_else(|| format!("Lookback {time_range} is not permitted for {role}"));
    Some(ValidationError::new(ErrorField::TimeRange, message))
}

/// Operators offered as choices for a field. `None` is a field the catalog
/// does not know.
pub fn allowed_operators(field_type: Option<FieldType>) -> &'static [QueryOperator] {
    const TERM_ONLY: &[QueryOperator] = &[QueryOperator::Term];
    const TEXT: &[QueryOperator] = &[QueryOperator::Match, QueryOperator::Wildcard];
    const ALL: &[QueryOperator] = &[
        QueryOperator::Term,
        QueryOperator::Match,
        QueryOperator::Wildcard,
    ];

    match field_type {
        None | Some(FieldType::Date) => TERM_ONLY,
        Some(FieldType::Text) => TEXT,
        Some(_) => ALL,
    }
}

/// Offered operators that would also pass [`validate_operator`].
pub fn selectable_operators(field_type: FieldType) -> Vec<QueryOperator> {
    allowed_operators(Some(field_type))
        .iter()
        .copied()
        .filter(|op| validate_operator(field_type, *op).is_none())
        .collect()
}

/// Per-field validation messages for one submission.
///
/// Recording a second error for the same field replaces the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    errors: BTreeMap<ErrorField, String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: Option<ValidationError>) {
        if let Some(err) = result {
            self.errors.insert(err.field, err.message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, field: ErrorField) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    pub fn errors(&self) -> impl Iterator<Item = ValidationError> + '_ {
        self.errors
            .iter()
            .map(|(field, message)| ValidationError::new(*field, message.clone()))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Run all three checks on a typed criterion.
pub fn validate_criterion(criterion: &QueryCriterion, role: Role) -> ValidationReport {
    let field_type = criterion.field.field_type;
    let mut report = ValidationReport::new();
    report.record(validate_operator(field_type, criterion.operator));
    report.record(validate_value(&criterion.value, field_type, criterion.operator));
    report.record(validate_lookback(role, criterion.time_range));
    report
}

/// Raw form input before the field name has been resolved against the
/// schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionDraft {
    pub field_name: String,
    pub operator: QueryOperator,
    pub value: QueryValue,
    pub time_range: TimeRange,
}

/// Resolve a draft against the catalog and validate it.
///
/// Field names the catalog does not know are treated as `text`, matching how
/// the builder form behaves before the schema has loaded.
pub fn resolve_criterion(
    draft: CriterionDraft,
    catalog: &SchemaCatalog,
    role: Role,
) -> Result<QueryCriterion, ValidationReport> {
    let field_type = catalog
        .field_type(&draft.field_name)
        .unwrap_or(FieldType::Text);
    let criterion = QueryCriterion {
        field: SchemaField::new(draft.field_name, field_type),
        operator: draft.operator,
        value: draft.value,
        time_range: draft.time_range,
    };

    let mut report = ValidationReport::new();
    if criterion.field.name.trim().is_empty() {
        report.record(Some(ValidationError::new(
            ErrorField::Field,
            FIELD_REQUIRED_MESSAGE,
        )));
    }
    for err in validate_criterion(&criterion, role).errors() {
        report.record(Some(err));
    }

    if report.is_empty() {
        Ok(criterion)
    } else {
        tracing::debug!("criterion rejected: {report}");
        Err(report)
    }
}
