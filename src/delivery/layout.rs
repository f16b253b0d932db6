//! Fixed HTML layout wrapped around primary-mode bodies

use chrono::Datelike;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{app_name}} Notification</title>
<style>
  body { font-family: Arial, Helvetica, sans-serif; background-color: #f4f6f8; margin: 0; padding: 0; }
  .container { max-width: 600px; background-color: #ffffff; margin: 30px auto; padding: 30px; border-radius: 10px; }
  .header { text-align: center; font-size: 22px; font-weight: bold; color: #333333; margin-bottom: 10px; }
  .divider { height: 2px; background-color: #007bff; width: 100px; margin: 10px auto 20px; }
  .content { font-size: 15px; color: #333333; line-height: 1.6; }
  .footer { font-size: 13px; color: #777777; text-align: center; margin-top: 25px; }
</style>
</head>
<body>
  <div class="container">
    <div class="header">{{app_name}} Notification</div>
    <div class="divider"></div>
    <div class="content">
{{body}}
    </div>
    <div class="footer">
      <p>
        <span>This is an automated email from {{app_name}}.</span>
        <br>
        <span>&copy; {{year}} {{app_name}}. All rights reserved.</span>
      </p>
    </div>
  </div>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone)]
pub struct NotificationLayout {
    app_name: String,
}

impl NotificationLayout {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// The body is trusted HTML and inserted unescaped.
    pub fn render(&self, body: &str, year: i32) -> String {
        // body last so its content is never scanned for layout tokens
        TEMPLATE
            .replace("{{app_name}}", &escape_html(&self.app_name))
            .replace("{{year}}", &year.to_string())
            .replace("{{body}}", body)
    }

    pub fn render_now(&self, body: &str) -> String {
        self.render(body, chrono::Utc::now().year())
    }
}
