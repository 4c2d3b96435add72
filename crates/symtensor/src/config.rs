//! Process-wide defaults read once from the environment.
//!
//! | Variable                    | Values                       | Default   |
//! |-----------------------------|------------------------------|-----------|
//! | `SYMTENSOR_FLOATX`          | `float32`, `float64`         | `float64` |
//! | `SYMTENSOR_ON_UNUSED_INPUT` | `raise`, `warn`, `ignore`    | `raise`   |
//! | `SYMTENSOR_SEED`            | unsigned 64-bit integer      | unset     |
//!
//! Unparseable values fall back to the default.

use std::env;

use once_cell::sync::Lazy;

use crate::tensor::DType;

pub const FLOATX_VAR: &str = "SYMTENSOR_FLOATX";
pub const ON_UNUSED_INPUT_VAR: &str = "SYMTENSOR_ON_UNUSED_INPUT";
pub const SEED_VAR: &str = "SYMTENSOR_SEED";

/// What compilation does with an explicit input that no output or update depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnusedInputPolicy {
    #[default]
    Raise,
    Warn,
    Ignore,
}

impl UnusedInputPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raise" => Some(UnusedInputPolicy::Raise),
            "warn" => Some(UnusedInputPolicy::Warn),
            "ignore" => Some(UnusedInputPolicy::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Dtype of `scalar`/`vector`/`matrix` variables and of float-producing ops on integers.
    pub float_dtype: DType,
    pub on_unused_input: UnusedInputPolicy,
    /// Seed used by random streams created without one.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            float_dtype: DType::F64,
            on_unused_input: UnusedInputPolicy::Raise,
            seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let float_dtype = lookup(FLOATX_VAR)
            .and_then(|value| value.trim().parse::<DType>().ok())
            .filter(|dtype| dtype.is_float())
            .unwrap_or(defaults.float_dtype);
        let on_unused_input = lookup(ON_UNUSED_INPUT_VAR)
            .and_then(|value| UnusedInputPolicy::parse(&value))
            .unwrap_or(defaults.on_unused_input);
        let seed = lookup(SEED_VAR).and_then(|value| value.trim().parse::<u64>().ok());
        Config {
            float_dtype,
            on_unused_input,
            seed,
        }
    }
}

static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// Returns the process-wide configuration, reading the environment on first use.
pub fn config() -> &'static Config {
    &CONFIG
}
