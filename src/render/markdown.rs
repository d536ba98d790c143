use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::entities::Resource;
use crate::error::LookupError;
use crate::lookup::AccumulatedState;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(serde::Serialize)]
struct ResourceRow {
    name: &'static str,
    path: &'static str,
}

fn env() -> Result<&'static Environment<'static>, LookupError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter("truncate", |s: String, max_bytes: usize| -> String {
        if s.len() <= max_bytes {
            return s;
        }
        if max_bytes == 0 {
            return "…".to_string();
        }
        let mut boundary = max_bytes;
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let mut out = s[..boundary].trim_end().to_string();
        out.push('…');
        out
    });
    env.add_filter("cell", |s: String| -> String {
        s.replace('|', "\\|").replace(['\r', '\n'], " ")
    });
    env.add_template("lookup.md.j2", include_str!("../../templates/lookup.md.j2"))?;
    env.add_template(
        "resources.md.j2",
        include_str!("../../templates/resources.md.j2"),
    )?;

    Ok(ENV.get_or_init(|| env))
}

pub fn state_footer(state: &AccumulatedState, more_hint: &str) -> String {
    let shown = state.options.len();
    let mut footer = match state.total {
        Some(total) => format!(
            "Showing {shown} of {total} options (page {}).",
            state.current_page
        ),
        None => format!("Showing {shown} options (page {}).", state.current_page),
    };
    if state.has_more && !more_hint.trim().is_empty() {
        footer.push(' ');
        footer.push_str(more_hint.trim());
    }
    footer
}

pub fn lookup_markdown(
    resource: Resource,
    state: &AccumulatedState,
    more_hint: &str,
) -> Result<String, LookupError> {
    let tmpl = env()?.get_template("lookup.md.j2")?;
    let mut body = tmpl.render(context! {
        resource => resource.name(),
        term => state.term.as_str(),
        options => &state.options,
        last_error => state.last_error.as_deref(),
    })?;
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push('\n');
    body.push_str(&state_footer(state, more_hint));
    body.push('\n');
    Ok(body)
}

pub fn resources_markdown() -> Result<String, LookupError> {
    let rows: Vec<ResourceRow> = Resource::ALL
        .iter()
        .map(|r| ResourceRow {
            name: r.name(),
            path: r.path(),
        })
        .collect();
    let tmpl = env()?.get_template("resources.md.j2")?;
    Ok(tmpl.render(context! { rows => rows })?)
}
