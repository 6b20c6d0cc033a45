//! Browser side of live reload.

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast::error::RecvError;

use kiln_core::{ReloadBus, ReloadMessage};

/// Websocket endpoint browsers connect to.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// URL of the client script injected into every HTML page.
pub const LIVERELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Forward every bus message to one connected browser until it goes away.
pub async fn forward_reloads(mut socket: WebSocket, bus: ReloadBus) {
    let mut rx = bus.subscribe();

    if send(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }
    tracing::debug!(clients = bus.subscriber_count(), "Live reload client connected");

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    // Missed messages; a full reload covers them all.
                    Err(RecvError::Lagged(_)) => ReloadMessage::Reload,
                    Err(RecvError::Closed) => break,
                };
                if send(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("Live reload client disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize reload message");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

/// Insert the client script tag before the last `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{LIVERELOAD_SCRIPT_PATH}"></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}

/// The live reload client.
///
/// Reloads the page on `reload`; on `css` it re-fetches matching stylesheets
/// in place and falls back to a full reload when none match.
pub fn livereload_client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{LIVERELOAD_PATH}';
  let attempts = 0;
  const maxAttempts = 10;

  function refreshStylesheet(path) {{
    let matched = false;
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const href = new URL(link.href, location.href);
      if (href.pathname === path) {{
        href.searchParams.set('kiln', Date.now().toString());
        link.href = href.toString();
        matched = true;
      }}
    }});
    if (!matched) {{
      location.reload();
    }}
  }}

  function connect() {{
    const ws = new WebSocket(url);

    ws.onopen = function() {{
      if (attempts > 0) {{
        location.reload();
      }}
      attempts = 0;
    }};

    ws.onmessage = function(event) {{
      const msg = JSON.parse(event.data);
      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;
        case 'css':
          refreshStylesheet(msg.path);
          break;
        case 'connected':
          console.log('[kiln] live reload connected');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (attempts < maxAttempts) {{
        attempts++;
        setTimeout(connect, 1000 * attempts);
      }}
    }};
  }}

  connect();
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><body><h1>Hi</h1></BODY></html>";
        assert_eq!(
            inject_script(html),
            r#"<html><body><h1>Hi</h1><script src="/__livereload.js"></script></BODY></html>"#
        );
    }

    #[test]
    fn appends_without_body() {
        assert_eq!(
            inject_script("<p>fragment</p>"),
            r#"<p>fragment</p><script src="/__livereload.js"></script>"#
        );
    }

    #[test]
    fn client_targets_livereload_endpoint() {
        let script = livereload_client_script();
        assert!(script.contains("/__livereload'"));
        assert!(script.contains("case 'css'"));
    }

    #[test]
    fn messages_use_wire_format() {
        let json = serde_json::to_string(&ReloadMessage::Reload).unwrap();
        assert_eq!(json, r#"{"type":"reload"}"#);
    }
}
