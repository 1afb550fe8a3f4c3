//! HTML consent page for the authorization endpoint.

use crate::engine::{APPROVE, AuthorizationRequest};

/// Render the consent page for a validated authorization request.
///
/// All request values are HTML-escaped. The password field is only shown
/// when the server gates approvals on a password.
#[must_use]
pub fn render_consent_page(request: &AuthorizationRequest, ask_password: bool) -> String {
    let password_html = if ask_password {
        r#"<label for="password">Password</label>
<input type="password" id="password" name="password" required autofocus>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Sign in to {client_id}</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f5f5f5; margin: 0; display: flex; justify-content: center; align-items: center; min-height: 100vh; }}
.card {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; max-width: 420px; width: 100%; }}
h1 {{ font-size: 20px; margin: 0 0 8px; color: #333; }}
.subtitle {{ color: #666; font-size: 14px; margin: 0 0 24px; word-break: break-all; }}
label {{ display: block; font-size: 14px; font-weight: 500; margin-bottom: 6px; color: #333; }}
input[type="password"] {{ width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; font-size: 14px; box-sizing: border-box; }}
button {{ width: 100%; padding: 10px; background: #4a90d9; color: #fff; border: none; border-radius: 4px; font-size: 14px; font-weight: 500; cursor: pointer; margin-top: 16px; }}
button:hover {{ background: #357abd; }}
</style>
</head>
<body>
<div class="card">
<h1>Sign in as {me}</h1>
<p class="subtitle"><strong>{client_id}</strong> is requesting <code>{scope}</code> access ({response_type})</p>
<form method="POST" action="/indieauth/auth">
<input type="hidden" name="me" value="{me}">
<input type="hidden" name="client_id" value="{client_id}">
<input type="hidden" name="redirect_uri" value="{redirect_uri}">
<input type="hidden" name="state" value="{state}">
<input type="hidden" name="response_type" value="{response_type}">
<input type="hidden" name="scope" value="{scope}">
{password_html}
<button type="submit" name="approve" value="{approve}">{approve}</button>
</form>
</div>
</body>
</html>"#,
        me = html_escape(&request.me),
        client_id = html_escape(&request.client_id),
        redirect_uri = html_escape(&request.redirect_uri),
        state = html_escape(request.state.as_deref().unwrap_or_default()),
        response_type = request.response_type.as_str(),
        scope = html_escape(&request.scope),
        approve = APPROVE,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
