use crate::config::RegistrationSettings;

/// Minimum member age enforced by the eligibility rule and the final submission gate.
pub const DEFAULT_MINIMUM_AGE: u32 = 60;

const MINIMUM_AGE_FLOOR: u32 = 18;
const MINIMUM_AGE_CEILING: u32 = 120;

/// Policy dial backing the age-eligibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPolicy {
    minimum_age: u32,
}

impl RegistrationPolicy {
    pub fn new(minimum_age: u32) -> Self {
        let sanitized = if (MINIMUM_AGE_FLOOR..=MINIMUM_AGE_CEILING).contains(&minimum_age) {
            minimum_age
        } else {
            DEFAULT_MINIMUM_AGE
        };

        Self {
            minimum_age: sanitized,
        }
    }

    pub fn minimum_age(&self) -> u32 {
        self.minimum_age
    }

    pub fn is_eligible(&self, age: Option<u32>) -> bool {
        age.is_some_and(|age| age >= self.minimum_age)
    }

    pub fn ineligible_message(&self) -> String {
        format!(
            "You must be at least {} years old to join",
            self.minimum_age
        )
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_AGE)
    }
}

impl From<&RegistrationSettings> for RegistrationPolicy {
    fn from(settings: &RegistrationSettings) -> Self {
        Self::new(settings.minimum_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_minimums_fall_back_to_default() {
        assert_eq!(RegistrationPolicy::new(0).minimum_age(), DEFAULT_MINIMUM_AGE);
        assert_eq!(RegistrationPolicy::new(500).minimum_age(), DEFAULT_MINIMUM_AGE);
        assert_eq!(RegistrationPolicy::new(65).minimum_age(), 65);
    }

    #[test]
    fn eligibility_requires_a_known_age() {
        let policy = RegistrationPolicy::default();
        assert!(policy.is_eligible(Some(60)));
        assert!(!policy.is_eligible(Some(59)));
        assert!(!policy.is_eligible(None));
    }
}
