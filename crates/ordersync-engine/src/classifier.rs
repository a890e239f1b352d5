//! Address validation classification.
//!
//! Pure interpretation of the free-form status string the commerce
//! platform attaches to an order's shipping address.

use ordersync_connector::SourceOrder;

/// Interpreted address validation state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStatus {
    /// No validation has run, or the platform reported nothing.
    NotValidated,
    /// Validation succeeded cleanly.
    Verified,
    /// Validation succeeded with corrections or warnings.
    Warning,
    /// Validation failed outright.
    Failed,
}

impl AddressStatus {
    /// Interpret the raw status string from the commerce platform.
    ///
    /// Unknown vocabulary maps to `NotValidated` so new platform statuses
    /// never cause spurious tagging.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return AddressStatus::NotValidated;
        };
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return AddressStatus::NotValidated;
        }

        // Order matters: "validation_failed" and "address validation
        // error" both contain substrings of the verified vocabulary.
        if normalized.contains("warn") {
            return AddressStatus::Warning;
        }
        if normalized.contains("fail") || normalized.contains("error") {
            return AddressStatus::Failed;
        }
        if normalized.contains("success")
            || normalized.contains("verified")
            || normalized == "validated"
            || normalized == "valid"
        {
            return AddressStatus::Verified;
        }

        AddressStatus::NotValidated
    }

    /// Whether this state indicates a problem worth flagging downstream.
    #[must_use]
    pub fn is_issue(self) -> bool {
        matches!(self, AddressStatus::Warning | AddressStatus::Failed)
    }
}

/// Whether the order's address validation outcome warrants tagging.
#[must_use]
pub fn has_address_issue(order: &SourceOrder) -> bool {
    AddressStatus::parse(order.address_status.as_deref()).is_issue()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order_with_status(status: Option<&str>) -> SourceOrder {
        SourceOrder {
            id: "1".to_string(),
            order_number: "1001".to_string(),
            modified_at: Utc::now(),
            address_status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_status_is_not_validated() {
        assert_eq!(AddressStatus::parse(None), AddressStatus::NotValidated);
        assert_eq!(AddressStatus::parse(Some("")), AddressStatus::NotValidated);
        assert_eq!(
            AddressStatus::parse(Some("   ")),
            AddressStatus::NotValidated
        );
    }

    #[test]
    fn test_verified_vocabulary() {
        for raw in ["validation_successful", "verified", "Validated", "valid"] {
            assert_eq!(
                AddressStatus::parse(Some(raw)),
                AddressStatus::Verified,
                "raw: {raw}"
            );
        }
    }

    #[test]
    fn test_warning_vocabulary() {
        for raw in ["validation_warning", "Address Warning", "warned"] {
            assert_eq!(
                AddressStatus::parse(Some(raw)),
                AddressStatus::Warning,
                "raw: {raw}"
            );
        }
    }

    #[test]
    fn test_failed_vocabulary() {
        for raw in ["validation_failed", "Address validation failed", "error"] {
            assert_eq!(
                AddressStatus::parse(Some(raw)),
                AddressStatus::Failed,
                "raw: {raw}"
            );
        }
    }

    #[test]
    fn test_unknown_vocabulary_is_not_validated() {
        assert_eq!(
            AddressStatus::parse(Some("something_new")),
            AddressStatus::NotValidated
        );
    }

    #[test]
    fn test_only_warning_and_failed_are_issues() {
        assert!(!AddressStatus::NotValidated.is_issue());
        assert!(!AddressStatus::Verified.is_issue());
        assert!(AddressStatus::Warning.is_issue());
        assert!(AddressStatus::Failed.is_issue());
    }

    #[test]
    fn test_has_address_issue() {
        assert!(has_address_issue(&order_with_status(Some(
            "validation_failed"
        ))));
        assert!(has_address_issue(&order_with_status(Some(
            "validation_warning"
        ))));
        assert!(!has_address_issue(&order_with_status(Some(
            "validation_successful"
        ))));
        assert!(!has_address_issue(&order_with_status(None)));
    }
}
