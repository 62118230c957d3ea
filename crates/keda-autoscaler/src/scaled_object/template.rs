//! Rendering of Prometheus query templates.
//!
//! Queries may reference the revision they scale as `{{ revisionName }}`. The dotted form
//! `{{ .revisionName }}`, which users know from Go templates, is accepted as well.
//!
//! Only `{{ }}` is template syntax. PromQL commonly contains `{#` or `{%` in label matchers,
//! so block and comment tags use `{{% %}}` and `{{/* */}}` instead. The environment has no
//! globals, filters or tests, which makes every name besides `revisionName` undefined.

use std::{borrow::Cow, sync::LazyLock};

use minijinja::{Environment, UndefinedBehavior, context, syntax::SyntaxConfig};
use regex::Regex;
use snafu::{ResultExt, Snafu};

static DOTTED_VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\{\{-?\s*)\.([A-Za-z_])").expect("failed to compile dotted variable regex")
});

static QUERY_SYNTAX: LazyLock<SyntaxConfig> = LazyLock::new(|| {
    SyntaxConfig::builder()
        .variable_delimiters("{{", "}}")
        .block_delimiters("{{%", "%}}")
        .comment_delimiters("{{/*", "*/}}")
        .build()
        .expect("failed to build query template syntax")
});

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse query template {template:?}"))]
    Parse {
        source: minijinja::Error,
        template: String,
    },

    #[snafu(display("failed to render query template {template:?}"))]
    Render {
        source: minijinja::Error,
        template: String,
    },
}

/// Renders `template` with `revisionName` set to `revision_name`.
///
/// Referencing any other variable is an error.
pub fn render_query(template: &str, revision_name: &str) -> Result<String, Error> {
    let normalized = normalize(template);

    let mut env = Environment::empty();
    env.set_syntax(QUERY_SYNTAX.clone());
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    let compiled = env
        .template_from_str(&normalized)
        .context(ParseSnafu { template })?;

    compiled
        .render(context! { revisionName => revision_name })
        .context(RenderSnafu { template })
}

/// Turns `{{ .name }}` into `{{ name }}`.
fn normalize(template: &str) -> Cow<'_, str> {
    DOTTED_VARIABLE_REGEX.replace_all(template, "${1}${2}")
}
