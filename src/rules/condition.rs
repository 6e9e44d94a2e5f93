//! Single-condition evaluation.

use crate::rules::fields::FieldValue;
use crate::rules::model::{Condition, Predicate};

/// Evaluate one condition against an already-resolved field value.
///
/// Never fails: ordering predicates on a non-numeric field, an
/// unparseable comparison value, or an unrecognised predicate all
/// evaluate to `false`.
pub fn evaluate(condition: &Condition, value: FieldValue<'_>) -> bool {
    let expected = condition.value.as_str();
    match condition.predicate {
        Predicate::Contains => value.as_text().contains(expected),
        Predicate::NotContains => !value.as_text().contains(expected),
        Predicate::Equals => value.as_text() == expected,
        Predicate::NotEquals => value.as_text() != expected,
        Predicate::LessThan => compare(value, expected).is_some_and(|(a, b)| a < b),
        Predicate::GreaterThan => compare(value, expected).is_some_and(|(a, b)| a > b),
        Predicate::Unknown => false,
    }
}

fn compare(value: FieldValue<'_>, expected: &str) -> Option<(i64, i64)> {
    let actual = value.as_number()?;
    let expected = expected.trim().parse::<i64>().ok()?;
    Some((actual, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::Field;

    fn cond(predicate: Predicate, value: &str) -> Condition {
        Condition::new(Field::Subject, predicate, value)
    }

    #[test]
    fn contains_is_case_sensitive() {
        let v = FieldValue::Text("Interview tomorrow");
        assert!(evaluate(&cond(Predicate::Contains, "Interview"), v));
        assert!(!evaluate(&cond(Predicate::Contains, "interview"), v));
        assert!(evaluate(&cond(Predicate::NotContains, "interview"), v));
        assert!(!evaluate(&cond(Predicate::NotContains, "tomorrow"), v));
    }

    #[test]
    fn empty_needle_is_always_contained() {
        assert!(evaluate(&cond(Predicate::Contains, ""), FieldValue::Text("")));
    }

    #[test]
    fn equals_is_exact() {
        let v = FieldValue::Text("Hello");
        assert!(evaluate(&cond(Predicate::Equals, "Hello"), v));
        assert!(!evaluate(&cond(Predicate::Equals, "Hello "), v));
        assert!(evaluate(&cond(Predicate::NotEquals, "hello"), v));
    }

    #[test]
    fn string_predicates_stringify_numbers() {
        let v = FieldValue::Number(12);
        assert!(evaluate(&cond(Predicate::Equals, "12"), v));
        assert!(evaluate(&cond(Predicate::Contains, "1"), v));
    }

    #[test]
    fn ordering_on_numbers() {
        let v = FieldValue::Number(2);
        assert!(evaluate(&cond(Predicate::LessThan, "5"), v));
        assert!(!evaluate(&cond(Predicate::GreaterThan, "5"), v));
        assert!(!evaluate(&cond(Predicate::LessThan, "2"), v));
        assert!(evaluate(&cond(Predicate::GreaterThan, "1"), v));
    }

    #[test]
    fn ordering_on_text_is_false() {
        let v = FieldValue::Text("7");
        assert!(!evaluate(&cond(Predicate::LessThan, "10"), v));
        assert!(!evaluate(&cond(Predicate::GreaterThan, "1"), v));
    }

    #[test]
    fn ordering_with_unparseable_value_is_false() {
        let v = FieldValue::Number(3);
        assert!(!evaluate(&cond(Predicate::LessThan, "soon"), v));
        assert!(!evaluate(&cond(Predicate::GreaterThan, "1.5"), v));
    }

    #[test]
    fn unknown_predicate_is_false() {
        assert!(!evaluate(&cond(Predicate::Unknown, "x"), FieldValue::Text("x")));
    }
}
