//! Template engine for cfgpatch
//!
//! User-defined rules are written as Jinja2-compatible templates so one
//! config can follow the project's settings.
//!
//! # Features
//!
//! - Variable substitution: `{{ defaults.ios_version }}`, `{{ paths.pbxproj }}`, `{{ vars.team }}`
//! - Filters: `regex_escape` (for patterns), `pbx_quote` (for pbxproj values)
//! - Strict undefined handling with "did you mean" suggestions
//!
//! Patterns that need a literal `{{` can wrap it in `{% raw %}...{% endraw %}`.

mod context;
mod engine;
mod errors;
mod filters;

pub use context::TemplateContext;
pub use engine::TemplateEngine;
pub use errors::{TemplateError, suggest_correction};
