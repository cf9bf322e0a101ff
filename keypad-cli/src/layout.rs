//! Generate an HTML/SVG picture of a key matrix.
//! One rectangle per position, labelled with its symbol, with the drive and
//! sense line numbers along the edges.

use keypad_matrix::{Polarity, Topology};

/// Key unit size in SVG pixels.
const U: f64 = 54.0;
/// Gap between keys.
const GAP: f64 = 4.0;
/// Step: key + gap.
const S: f64 = U + GAP;
/// Key corner radius.
const R: f64 = 4.0;
/// Room for the line labels left of and above the grid.
const HEADER: f64 = 60.0;
/// Margin around the SVG content.
const MARGIN: f64 = 20.0;

fn render_grid(topology: &Topology<'_>) -> String {
    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<g transform="translate({}, {})">"#,
        MARGIN + HEADER,
        MARGIN + HEADER
    ));

    for (col, line) in topology.columns().iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="{}" y="-12" class="line">{}</text>"#,
            col as f64 * S + U / 2.0,
            line.id.0
        ));
    }
    for (row, line) in topology.rows().iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="-12" y="{}" class="line row">{}</text>"#,
            row as f64 * S + U / 2.0 + 1.0,
            line.id.0
        ));
    }

    for coord in topology.coords() {
        let x = coord.col as f64 * S;
        let y = coord.row as f64 * S;
        let symbol = topology.symbol_at(coord.row, coord.col);
        let key_class = if symbol.is_some() { "key" } else { "key unused" };

        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{U}" height="{U}" rx="{R}" class="{key_class}"><title>{coord}</title></rect>"#
        ));

        if let Some(symbol) = symbol {
            let label = symbol.as_str();
            let font_class = if label.len() > 3 { " small" } else { "" };
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" class="label{font_class}">{}</text>"#,
                x + U / 2.0,
                y + U / 2.0 + 1.0,
                html_escape(label),
            ));
        }
    }

    svg.push_str("</g>");
    svg
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Generate the complete HTML document with inline SVG.
pub fn generate_html(title: &str, topology: &Topology<'_>) -> String {
    let cols = topology.columns().len() as f64;
    let rows = topology.rows().len() as f64;
    let total_width = cols * S - GAP + HEADER + 2.0 * MARGIN;
    let total_height = rows * S - GAP + HEADER + 2.0 * MARGIN;
    let wiring = match topology.polarity() {
        Polarity::ActiveHigh => "rows driven high, columns pulled down",
        Polarity::ActiveLow => "rows driven low, columns pulled up",
    };
    let title = html_escape(title);

    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{
    background: #1a1a2e;
    color: #eee;
    font-family: system-ui, -apple-system, sans-serif;
    display: flex;
    flex-direction: column;
    align-items: center;
    padding: 2em;
  }}
  svg {{
    filter: drop-shadow(0 2px 8px rgba(0,0,0,0.3));
  }}
  .key {{
    fill: #16213e;
    stroke: #0f3460;
    stroke-width: 1.5;
  }}
  .key:hover {{
    fill: #1a1a5e;
    stroke: #e94560;
  }}
  .key.unused {{
    fill: #0d1117;
    stroke: #21262d;
    stroke-dasharray: 3 3;
  }}
  .label {{
    fill: #eee;
    font-family: "JetBrains Mono", "Fira Code", monospace;
    font-size: 13px;
    text-anchor: middle;
    dominant-baseline: middle;
    pointer-events: none;
  }}
  .label.small {{
    font-size: 10px;
  }}
  .line {{
    fill: #53a8b6;
    font-family: "JetBrains Mono", "Fira Code", monospace;
    font-size: 11px;
    text-anchor: middle;
  }}
  .line.row {{
    text-anchor: end;
    dominant-baseline: middle;
  }}
</style>
</head>
<body>
<h1>{title}</h1>
<p>{rows}&times;{cols} matrix, {wiring}</p>
<svg width="{total_width}" height="{total_height}" xmlns="http://www.w3.org/2000/svg">
"#
    );

    html.push_str(&render_grid(topology));
    html.push_str("\n</svg>\n</body>\n</html>\n");
    html
}
