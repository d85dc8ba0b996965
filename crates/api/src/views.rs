//! HTML Views
//!
//! Plain server-rendered pages. Live gauge values are not part of the page;
//! the dashboard script receives them over `/ws`.

use obd_scheduler::OBD_DATA_EVENT;
use signals::{Selection, SignalCatalog, SignalDescriptor, SignalState};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;background:#111;color:#eee;margin:2em}\
table{border-collapse:collapse}td,th{padding:.4em 1em;text-align:left}\
.gauges{display:flex;flex-wrap:wrap;gap:1em}\
.gauge{background:#222;border-radius:8px;padding:1em;min-width:10em;text-align:center}\
.value{font-size:2.5em;font-weight:bold}.unit{color:#999}a{color:#8cf}";

/// Escape text for HTML bodies and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title><style>{STYLE}</style></head>\n<body>\n{body}</body></html>\n",
        title = escape(title),
    )
}

/// Selection form: one row per catalog signal, three radio options each
pub fn setup_page(catalog: &SignalCatalog, selection: &Selection) -> String {
    let mut body = String::from(
        "<h1>Gauge setup</h1>\n<form method=\"post\" action=\"/setup\">\n<table>\n\
         <tr><th>Signal</th><th>Unit</th>",
    );
    for state in SignalState::ALL {
        let _ = write!(body, "<th>{}</th>", escape(state.as_str()));
    }
    body.push_str("</tr>\n");

    for signal in catalog.iter() {
        let current = selection.state(&signal.key);
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td>",
            escape(&signal.label),
            escape(signal.unit())
        );
        for state in SignalState::ALL {
            let _ = write!(
                body,
                "<td><input type=\"radio\" name=\"{key}\" value=\"{value}\"{checked}></td>",
                key = escape(&signal.key),
                value = escape(state.as_str()),
                checked = if state == current { " checked" } else { "" },
            );
        }
        body.push_str("</tr>\n");
    }

    body.push_str(
        "</table>\n<p><button type=\"submit\">Save</button> \
         <a href=\"/dashboard\">Dashboard</a></p>\n</form>\n",
    );
    page("OBD-II Setup", &body)
}

/// Gauge page for the enabled signals
pub fn dashboard_page<'a>(enabled: impl IntoIterator<Item = &'a SignalDescriptor>) -> String {
    let mut gauges = String::new();
    let mut count = 0usize;
    for signal in enabled {
        count += 1;
        let _ = write!(
            gauges,
            "<div class=\"gauge\"><div>{label}</div>\
             <div class=\"value\" id=\"{key}\">--</div>\
             <div class=\"unit\">{unit}</div></div>\n",
            label = escape(&signal.label),
            key = escape(&signal.key),
            unit = escape(signal.unit()),
        );
    }

    let mut body = String::from("<h1>OBD-II Dashboard</h1>\n");
    if count == 0 {
        body.push_str("<p>No gauges enabled.</p>\n");
    } else {
        let _ = write!(body, "<div class=\"gauges\">\n{gauges}</div>\n");
    }
    body.push_str("<p><a href=\"/setup\">Setup</a> <span id=\"status\">connecting</span></p>\n");
    let _ = write!(body, "<script>\n{}</script>\n", dashboard_script());
    page("OBD-II Dashboard", &body)
}

fn dashboard_script() -> String {
    format!(
        r#"(function () {{
  var status = document.getElementById("status");
  function connect() {{
    var scheme = location.protocol === "https:" ? "wss://" : "ws://";
    var ws = new WebSocket(scheme + location.host + "/ws");
    ws.onopen = function () {{ status.textContent = "live"; }};
    ws.onmessage = function (msg) {{
      var frame = JSON.parse(msg.data);
      if (frame.event !== "{event}") return;
      for (var key in frame.data) {{
        var el = document.getElementById(key);
        if (el) el.textContent = Number(frame.data[key]).toFixed(1);
      }}
    }};
    ws.onclose = function () {{
      status.textContent = "reconnecting";
      setTimeout(connect, 2000);
    }};
  }}
  connect();
}})();
"#,
        event = OBD_DATA_EVENT
    )
}
