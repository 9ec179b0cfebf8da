//! Build environment selection.
//!
//! The environment is resolved once at startup and then handed to every
//! stage through [`BuildContext`](crate::stages::BuildContext). Nothing
//! writes it afterwards.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

use crate::pipeline::Step;

/// Name of the environment variable consulted when `--env` is not given.
pub const ENV_VAR: &str = "ASSETPIPE_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Resolve the environment for this process.
    ///
    /// Priority: CLI flag, then `ASSETPIPE_ENV`, then the config file, then
    /// `development`. An unparseable variable is ignored.
    pub fn current(cli: Option<Environment>, config: Option<Environment>) -> Environment {
        cli.or_else(|| {
            std::env::var(ENV_VAR)
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .or(config)
        .unwrap_or_default()
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// Gate a pipeline step on this environment.
    ///
    /// The returned step runs `step` only when `self == target`; otherwise it
    /// hands its input back untouched.
    pub fn when<T: 'static>(self, target: Environment, step: Step<T>) -> Step<T> {
        if self == target {
            step
        } else {
            Box::new(|input| Ok(input))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!(
                "invalid environment: {other} (expected \"development\" or \"production\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_passes_input_through_for_other_environment() {
        let upper: Step<String> = Box::new(|s: String| Ok(s.to_uppercase()));
        let gated = Environment::Development.when(Environment::Production, upper);
        assert_eq!(gated("abc".to_string()).unwrap(), "abc");
    }

    #[test]
    fn when_runs_step_for_matching_environment() {
        let upper: Step<String> = Box::new(|s: String| Ok(s.to_uppercase()));
        let gated = Environment::Production.when(Environment::Production, upper);
        assert_eq!(gated("abc".to_string()).unwrap(), "ABC");
    }

    #[test]
    fn cli_flag_wins_over_config() {
        let env = Environment::current(Some(Environment::Production), Some(Environment::Development));
        assert_eq!(env, Environment::Production);
    }

    #[test]
    fn parses_short_names() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" Development ".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }
}
