// Server-rendered dashboard pages
//
// Pure functions from data to HTML. Every interpolated string goes
// through `escape_html`.

use crate::emitters::Emitter;

pub const PAGE_TITLE: &str = "Methane Hotspot Prototype";
pub const PAGE_DESCRIPTION: &str = "MVP map and emitter dashboard";
pub const MAP_PLACEHOLDER_TEXT: &str = "Map placeholder (MapLibre/Leaflet will be wired in next PR).";

/// Escape the five HTML-significant characters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Common HTML frame around every page
pub fn render_layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <meta name="description" content="{description}">
  </head>
  <body style="margin: 0; font-family: Arial, sans-serif">
{body}
  </body>
</html>
"#,
        title = escape_html(PAGE_TITLE),
        description = escape_html(PAGE_DESCRIPTION),
        body = body,
    )
}

/// Section listing each emitter's name, confidence and last-seen date
pub fn render_emitter_list(emitters: &[Emitter]) -> String {
    let items: String = emitters
        .iter()
        .map(|emitter| {
            format!(
                "      <li data-emitter-id=\"{id}\"><strong>{name}</strong> \u{2014} confidence: {confidence} \u{2014} last seen: {last_seen}</li>\n",
                id = escape_html(&emitter.id),
                name = escape_html(&emitter.name),
                confidence = emitter.confidence,
                last_seen = escape_html(&emitter.last_seen),
            )
        })
        .collect();

    format!(
        "  <section>\n    <h2>Persistent Emitters (placeholder)</h2>\n    <ul>\n{items}    </ul>\n  </section>\n"
    )
}

/// Home page: heading, map placeholder box, emitter list
pub fn render_home(emitters: &[Emitter]) -> String {
    let main = format!(
        r#"<main style="padding: 1rem">
  <h1>Methane Hotspot Map Dashboard</h1>
  <div id="map" style="border: 1px solid #ccc; background: #f7f7f7; border-radius: 8px; min-height: 280px; display: flex; align-items: center; justify-content: center; margin-bottom: 16px">
    <p>{placeholder}</p>
  </div>
{list}</main>"#,
        placeholder = escape_html(MAP_PLACEHOLDER_TEXT),
        list = render_emitter_list(emitters),
    );

    render_layout(&main)
}
