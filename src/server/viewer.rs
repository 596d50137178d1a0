//! Viewer module - generates the Leaflet map page listing the served layers.

/// Escape HTML special characters to prevent XSS attacks.
fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Generate an HTML page with a Leaflet map and a layer picker.
///
/// MBTiles rows follow the TMS scheme, so the tile layer is created with
/// `tms: true`.
///
/// # Arguments
///
/// * `layers` - Names of the currently registered layers
pub fn generate_viewer_html(layers: &[String]) -> String {
    let options: String = layers
        .iter()
        .map(|name| {
            format!(
                r#"            <option value="{}">{}</option>
"#,
                html_escape(&urlencoding::encode(name)),
                html_escape(name)
            )
        })
        .collect();

    let empty_notice = if layers.is_empty() {
        r#"<div class="empty">No layers are being served yet.</div>"#
    } else {
        ""
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>MBTiles Server</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
        }}
        #map {{
            width: 100vw;
            height: 100vh;
        }}
        .layer-panel {{
            position: absolute;
            top: 16px;
            right: 16px;
            background: rgba(0, 0, 0, 0.85);
            color: #fff;
            padding: 12px 16px;
            border-radius: 8px;
            font-size: 13px;
            z-index: 1000;
        }}
        .layer-panel select {{
            margin-top: 6px;
            width: 100%;
        }}
        .empty {{
            margin-top: 6px;
            color: rgba(255, 255, 255, 0.6);
        }}
    </style>
</head>
<body>
    <div id="map"></div>

    <div class="layer-panel">
        <label for="layer">Layer</label>
        <select id="layer">
{options}        </select>
        {empty_notice}
    </div>

    <script>
        const map = L.map('map').setView([0, 0], 2);
        const picker = document.getElementById('layer');
        let current = null;

        function show(layer) {{
            if (current) {{
                map.removeLayer(current);
            }}
            if (!layer) {{
                return;
            }}
            current = L.tileLayer('/' + layer + '/{{z}}/{{x}}/{{y}}', {{
                tms: true,
                maxZoom: 22
            }}).addTo(map);
        }}

        picker.addEventListener('change', () => show(picker.value));
        show(picker.value);
    </script>
</body>
</html>"##,
        options = options,
        empty_notice = empty_notice,
    )
}
