//! Opt-in rules for per-pod headless services.

use crate::pod::PodSnapshot;

/// Kubernetes limit for Service names (DNS-1035 label).
pub const MAX_NAME_LENGTH: usize = 63;

/// Outcome of evaluating a pod against the opt-in rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    IneligibleMissingAnnotation,
    IneligibleNoAddress,
    IneligibleNameTooLong,
}

impl Verdict {
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::IneligibleMissingAnnotation => "opt-in annotation missing or not \"true\"",
            Self::IneligibleNoAddress => "no pod IP assigned",
            Self::IneligibleNameTooLong => "pod name exceeds 63 characters",
        }
    }
}

/// Evaluates the rules in order; the first failing rule names the verdict.
///
/// Only the literal value `"true"` opts in.
pub fn evaluate(pod: &PodSnapshot, annotation_key: &str) -> Verdict {
    if pod.annotations.get(annotation_key).map(String::as_str) != Some("true") {
        return Verdict::IneligibleMissingAnnotation;
    }
    if pod.address.as_deref().is_none_or(str::is_empty) {
        return Verdict::IneligibleNoAddress;
    }
    if pod.key.name.len() > MAX_NAME_LENGTH {
        return Verdict::IneligibleNameTooLong;
    }
    Verdict::Eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{snapshot, TEST_ANNOTATION};

    #[test]
    fn test_valid_pod_is_eligible() {
        let pod = snapshot("default", "test-pod", &[(TEST_ANNOTATION, "true")], Some("10.0.0.1"));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::Eligible);
    }

    #[test]
    fn test_missing_annotation() {
        let pod = snapshot("default", "test-pod", &[], Some("10.0.0.1"));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleMissingAnnotation);
    }

    #[test]
    fn test_only_literal_true_opts_in() {
        for value in ["True", "TRUE", "1", "yes", "", " true"] {
            let pod = snapshot("default", "test-pod", &[(TEST_ANNOTATION, value)], Some("10.0.0.1"));
            assert_eq!(
                evaluate(&pod, TEST_ANNOTATION),
                Verdict::IneligibleMissingAnnotation,
                "value {:?} must opt out",
                value
            );
        }
    }

    #[test]
    fn test_other_annotation_key_does_not_opt_in() {
        let pod = snapshot("default", "test-pod", &[("other/key", "true")], Some("10.0.0.1"));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleMissingAnnotation);
    }

    #[test]
    fn test_missing_address() {
        let pod = snapshot("default", "test-pod", &[(TEST_ANNOTATION, "true")], None);
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleNoAddress);

        let pod = snapshot("default", "test-pod", &[(TEST_ANNOTATION, "true")], Some(""));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleNoAddress);
    }

    #[test]
    fn test_name_length_boundary() {
        let at_limit = "a".repeat(MAX_NAME_LENGTH);
        let pod = snapshot("default", &at_limit, &[(TEST_ANNOTATION, "true")], Some("10.0.0.1"));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::Eligible);

        let over_limit = "a".repeat(MAX_NAME_LENGTH + 1);
        let pod = snapshot("default", &over_limit, &[(TEST_ANNOTATION, "true")], Some("10.0.0.1"));
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleNameTooLong);
    }

    #[test]
    fn test_rule_order_reports_first_failure() {
        let long = "this-is-a-very-long-pod-name-that-exceeds-the-maximum-length-of-63-characters";
        let pod = snapshot("default", long, &[], None);
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleMissingAnnotation);

        let pod = snapshot("default", long, &[(TEST_ANNOTATION, "true")], None);
        assert_eq!(evaluate(&pod, TEST_ANNOTATION), Verdict::IneligibleNoAddress);
    }
}
