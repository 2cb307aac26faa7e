use crate::service::AdminView;
use crate::strategy::StrategyDescriptor;

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    v_htmlescape::escape(text).to_string()
}

fn page(title: &str, body: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        * {{
            box-sizing: border-box;
            margin: 0;
            padding: 0;
        }}

        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: #f4f5f7;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 20px;
        }}

        .container {{
            background: white;
            border-radius: 12px;
            box-shadow: 0 10px 30px rgba(0, 0, 0, 0.12);
            max-width: 560px;
            width: 100%;
            padding: 36px;
        }}

        h1 {{
            color: #333;
            font-size: 24px;
            margin-bottom: 16px;
        }}

        p, li, td, th {{
            color: #555;
            font-size: 14px;
            line-height: 1.6;
        }}

        .provider-section {{
            margin-bottom: 16px;
        }}

        .btn {{
            display: inline-flex;
            align-items: center;
            justify-content: center;
            width: 100%;
            padding: 12px 24px;
            border: none;
            border-radius: 8px;
            font-size: 16px;
            font-weight: 600;
            color: white;
            text-decoration: none;
            cursor: pointer;
        }}

        .btn-danger {{
            background-color: #dc3545;
        }}

        .error {{
            color: #dc3545;
            background-color: #f8d7da;
            border: 1px solid #f5c6cb;
            border-radius: 8px;
            padding: 12px;
            margin-bottom: 16px;
        }}

        code {{
            background: #f8f9fa;
            padding: 2px 6px;
            border-radius: 4px;
            word-break: break-all;
        }}

        table {{
            width: 100%;
            border-collapse: collapse;
            margin-top: 8px;
        }}

        td, th {{
            text-align: left;
            padding: 6px 4px;
            border-bottom: 1px solid #e0e0e0;
        }}
    </style>
</head>
<body>
    <div class="container">
        {body}
    </div>
</body>
</html>"#, title = escape_html(title), body = body)
}

/// Login page listing the registered strategies
pub fn login_page_html(strategies: &[StrategyDescriptor], error: Option<&str>) -> String {
    let mut body = String::from("<h1>Sign in</h1>");

    if let Some(error) = error {
        body.push_str(&format!(r#"<div class="error">Login failed: {}</div>"#, escape_html(error)));
    }

    if strategies.is_empty() {
        body.push_str("<p>No single sign-on providers are configured.</p>");
    }

    for strategy in strategies {
        body.push_str(&format!(
            r#"
        <div class="provider-section">
            <a href="{url}" class="btn" style="background-color: {color};">
                <i class="fa {icon}"></i>&nbsp;{label}
            </a>
        </div>"#,
            url = escape_html(&strategy.url),
            color = strategy.color,
            icon = strategy.icon,
            label = escape_html(&strategy.labels.login),
        ));
    }

    page("Sign in", &body)
}

/// Confirmation page for removing a provider link
pub fn deauth_page_html(service: &str, action: &str) -> String {
    let body = format!(
        r#"<h1>Disconnect {service}</h1>
        <p>Your account will no longer be linked to {service}. You will not be able to sign in with {service} until you link it again.</p>
        <form method="post" action="{action}" style="margin-top: 24px;">
            <button type="submit" class="btn btn-danger">Disconnect {service}</button>
        </form>"#,
        service = escape_html(service),
        action = escape_html(action),
    );
    page(&format!("Disconnect {}", service), &body)
}

/// Admin settings summary for one provider
pub fn admin_page_html(view: &AdminView) -> String {
    let mut body = format!(
        r#"<h1>{title}</h1>
        <p>Callback URL to register with the provider:</p>
        <p><code>{callback}</code></p>
        <p>Client ID: <code>{client_id}</code></p>
        <p>New account registration: <strong>{registration}</strong></p>"#,
        title = escape_html(&view.title),
        callback = escape_html(&view.callback_url),
        client_id = escape_html(view.client_id.as_deref().unwrap_or("not set")),
        registration = if view.registration_disabled { "disabled" } else { "allowed" },
    );

    if !view.role2group.is_empty() {
        body.push_str("<h3>Role to group mappings</h3><table><tr><th>Role</th><th>Group</th></tr>");
        for mapping in &view.role2group {
            body.push_str(&format!(
                "<tr><td><code>{}</code></td><td>{}</td></tr>",
                escape_html(&mapping.role_id),
                escape_html(&mapping.group_name)
            ));
        }
        body.push_str("</table>");
    }

    body.push_str("<h3>Available groups</h3><ul>");
    for name in &view.group_names {
        body.push_str(&format!("<li>{}</li>", escape_html(name)));
    }
    body.push_str("</ul>");

    page(&view.title, &body)
}

/// Error page shown when a login is refused
pub fn error_page_html(message: &str) -> String {
    let body = format!(
        r#"<h1>Unable to sign in</h1>
        <div class="error">{}</div>
        <p><a href="/auth/login">Back to sign in</a></p>"#,
        escape_html(message)
    );
    page("Unable to sign in", &body)
}
