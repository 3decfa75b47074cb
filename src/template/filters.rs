//! Custom template filters

use crate::fixsets::pbx_quote;
use minijinja::value::Value;
use minijinja::{Error, State};

/// Register all custom filters with a minijinja Environment
pub fn register_filters(env: &mut minijinja::Environment) {
    env.add_filter("regex_escape", filter_regex_escape);
    env.add_filter("pbx_quote", filter_pbx_quote);
}

/// Escape a value for literal use inside a rule pattern
fn filter_regex_escape(_state: &State, value: Value) -> Result<Value, Error> {
    Ok(Value::from(regex::escape(&value.to_string())))
}

/// Quote a value the way project.pbxproj does when it has non-identifier chars
fn filter_pbx_quote(_state: &State, value: Value) -> Result<Value, Error> {
    Ok(Value::from(pbx_quote(&value.to_string())))
}
