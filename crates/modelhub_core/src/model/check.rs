//! Field validators.
//!
//! A field carries the ordered list of validators that apply to it, selected
//! once when the field is built. Each validator returns a human-readable
//! message on failure. Multiple fields are validated element by element.

use super::field::Field;
use super::handler::ModelHandler;
use super::entity::Instance;
use crate::registry::Registry;
use crate::value::Value;
use std::cmp::Ordering;

/// Inputs of one validator run.
pub struct CheckContext<'a> {
    pub registry: &'a Registry,
    pub model: &'a ModelHandler,
    pub instance: Option<&'a Instance>,
    pub field: &'a Field,
    pub value: &'a Value,
    pub create: bool,
}

impl CheckContext<'_> {
    /// Non-null elements the element-wise validators look at.
    fn elements(&self) -> Vec<&Value> {
        match (self.field.is_multiple(), self.value) {
            (_, Value::Null) => Vec::new(),
            (true, Value::List(items)) => items.iter().filter(|item| !item.is_null()).collect(),
            (_, value) => vec![value],
        }
    }
}

pub type Check = fn(&CheckContext<'_>) -> Option<String>;

pub(crate) fn select(field: &Field) -> Vec<Check> {
    let mut checks: Vec<Check> = vec![valid_type];
    if !field.is_optional() {
        if field.is_multiple() {
            checks.push(at_least_one_element);
        } else {
            checks.push(not_none);
        }
    }
    if field.is_unique() {
        checks.push(is_unique);
    }
    if field.is_static() {
        checks.push(is_static);
    }
    if field.values_allowed().is_some() {
        checks.push(in_values);
    }
    if field.range_bounds().is_some() {
        checks.push(in_range);
    }
    if field.length_bounds().is_some() {
        checks.push(in_length);
    }
    checks
}

pub fn valid_type(ctx: &CheckContext<'_>) -> Option<String> {
    if ctx.field.is_multiple() && !matches!(ctx.value, Value::List(_) | Value::Null) {
        return Some(format!("The value {} should be a list", ctx.value));
    }
    ctx.elements()
        .into_iter()
        .find(|value| !ctx.registry.value_matches(ctx.field.datatype(), value))
        .map(|value| {
            format!(
                "The value {value} should be typed as {}",
                ctx.field.datatype()
            )
        })
}

pub fn not_none(ctx: &CheckContext<'_>) -> Option<String> {
    ctx.value
        .is_null()
        .then(|| "The value can't be None".to_string())
}

pub fn at_least_one_element(ctx: &CheckContext<'_>) -> Option<String> {
    match ctx.value {
        Value::List(items) if !items.is_empty() => None,
        _ => Some("The list must contain at least one element".to_string()),
    }
}

pub fn is_unique(ctx: &CheckContext<'_>) -> Option<String> {
    if ctx.value.is_null() {
        return None;
    }
    let holder = ctx
        .model
        .instances()
        .where_eq(ctx.field.name(), ctx.value.clone())
        .first()?;
    if ctx.instance == Some(&holder) {
        return None;
    }
    Some(format!(
        "Value already existing in the column : {}",
        ctx.value
    ))
}

pub fn is_static(ctx: &CheckContext<'_>) -> Option<String> {
    (!ctx.create).then(|| "The value can't be modified (static field)".to_string())
}

pub fn in_values(ctx: &CheckContext<'_>) -> Option<String> {
    let allowed = ctx.field.values_allowed()?;
    ctx.elements()
        .into_iter()
        .find(|value| !allowed.contains(value))
        .map(|value| format!("The value {value} doesn't belong to the list of authorized values"))
}

pub fn in_range(ctx: &CheckContext<'_>) -> Option<String> {
    let (low, high) = ctx.field.range_bounds()?;
    ctx.elements()
        .into_iter()
        .find(|value| {
            let above = matches!(
                value.partial_cmp(&low),
                Some(Ordering::Greater | Ordering::Equal)
            );
            let below = matches!(
                value.partial_cmp(&high),
                Some(Ordering::Less | Ordering::Equal)
            );
            !(above && below)
        })
        .map(|value| format!("The value {value} doesn't belong to the range ({low}, {high})"))
}

pub fn in_length(ctx: &CheckContext<'_>) -> Option<String> {
    let (min, max) = ctx.field.length_bounds()?;
    ctx.elements().into_iter().find_map(|value| {
        let length = value.len()?;
        (length < min || length > max).then(|| {
            format!("The value length {length} doesn't belong to the length range ({min}, {max})")
        })
    })
}
