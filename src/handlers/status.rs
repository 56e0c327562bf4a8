// Human-readable status page served as raw HTML

use serde::Deserialize;
use serde_json::Value;

use crate::backend::Backend;
use crate::config;
use crate::logger::FUNCTION_INSTANCE_ID;
use crate::schema::{ErrorTree, Validate};
use crate::wrapper::{http_handler, Endpoint, HandlerConfig, Reply, RequestContext};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub verbose: Option<String>,
}

impl StatusQuery {
    pub fn is_verbose(&self) -> bool {
        self.verbose.as_deref() == Some("true")
    }
}

impl Validate for StatusQuery {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if let Some(flag) = self.verbose.as_deref() {
            if flag != "true" && flag != "false" {
                errors.push(&["verbose"], "verbose must be \"true\" or \"false\"");
            }
        }
        errors.into_result()
    }
}

pub fn render_status(query: &StatusQuery, correlation_id: &str) -> String {
    let mut rows = vec![
        format!("<tr><th>Service</th><td>{}</td></tr>", env!("CARGO_PKG_NAME")),
        format!("<tr><th>Version</th><td>{}</td></tr>", env!("CARGO_PKG_VERSION")),
        format!("<tr><th>Project</th><td>{}</td></tr>", escape(Backend::instance().project_id())),
    ];
    if query.is_verbose() {
        rows.push(format!("<tr><th>Environment</th><td>{:?}</td></tr>", config::config().environment));
        rows.push(format!("<tr><th>Instance</th><td>{}</td></tr>", FUNCTION_INSTANCE_ID.as_str()));
        rows.push(format!("<tr><th>Correlation</th><td>{}</td></tr>", escape(correlation_id)));
    }

    format!(
        "<!doctype html><html><head><title>Status</title></head><body><h1>OK</h1><table>{}</table></body></html>",
        rows.join("")
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub async fn status_page_handler(ctx: RequestContext<Value, StatusQuery>) -> anyhow::Result<Reply<Value>> {
    Ok(Reply::ok(Value::String(render_status(&ctx.query, &ctx.correlation_id))))
}

/// GET /statusPage
pub fn status_page() -> Endpoint {
    http_handler(
        status_page_handler,
        HandlerConfig::new()
            .query_type::<StatusQuery>()
            .raw_html_response()
            .function_name("statusPage"),
    )
}
