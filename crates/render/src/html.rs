//! Assembly of a self-contained visualization document.

use crate::errors::Result;
use crate::payload::{embed, to_script_json, VisualizationParams};

/// Client-side drawing script; carries the payload placeholder.
pub const CLIENT_SCRIPT: &str = include_str!("../assets/attention_viz.js");

pub const DOCUMENT_TITLE: &str = "att_viz";

const FONT_STYLE: &str = "font-family:'Helvetica Neue', Helvetica, Arial, sans-serif;";

/// Build the HTML for one payload. The root element id is taken from
/// `params.root_div_id`.
pub fn populate_document(params: &VisualizationParams) -> Result<String> {
    let json = to_script_json(params)?;
    let script = embed(CLIENT_SCRIPT, &json)?;
    let root_id = escape_attribute(&params.root_div_id);

    let mut html = String::with_capacity(script.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{DOCUMENT_TITLE}</title>\n</head>\n<body>\n"));
    html.push_str(&format!("<div id=\"{root_id}\" style=\"{FONT_STYLE}\">\n"));
    html.push_str("    <span style=\"user-select:none\">\n");
    html.push_str("        Layer: <select id=\"layer\"></select>\n");
    html.push_str("    </span>\n");
    html.push_str("    <div id='vis'></div>\n");
    html.push_str("</div>\n");
    html.push_str("<script type=\"text/javascript\">\n");
    html.push_str(&script);
    html.push_str("\n</script>\n</body>\n</html>\n");
    Ok(html)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
