//! Runtime environment detection

use std::env;

/// Deployment environment, selected by `APP_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Production,
}

impl RuntimeEnvironment {
    /// Read `APP_ENV`; only the literal `production` selects production mode.
    pub fn from_env() -> Self {
        match env::var("APP_ENV") {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::Development,
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            RuntimeEnvironment::parse("production"),
            RuntimeEnvironment::Production
        );
        assert_eq!(
            RuntimeEnvironment::parse(" Production "),
            RuntimeEnvironment::Production
        );
        assert_eq!(
            RuntimeEnvironment::parse("staging"),
            RuntimeEnvironment::Development
        );
        assert!(!RuntimeEnvironment::default().is_production());
    }
}
