//! Message bodies for lifecycle notifications.

/// Every message the session lifecycle sends to end users or to the
/// audit inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate<'a> {
    SignupCodeSent {
        first_name: &'a str,
        last_name: &'a str,
        code: &'a str,
    },
    SignupCodeResent {
        first_name: &'a str,
        last_name: &'a str,
        code: &'a str,
    },
    SignupCompleted {
        first_name: &'a str,
        last_name: &'a str,
    },
    ResetCodeSent {
        first_name: &'a str,
        last_name: &'a str,
        code: &'a str,
    },
    Audit {
        subject: &'a str,
        body: &'a str,
    },
}

/// Subject and HTML body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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

fn greeting(first_name: &str, last_name: &str) -> String {
    let name = format!("{} {}", first_name.trim(), last_name.trim());
    let name = name.trim();
    if name.is_empty() {
        "<p>Hello,</p>".to_string()
    } else {
        format!("<p>Hello {},</p>", escape(name))
    }
}

impl EmailTemplate<'_> {
    pub fn render(&self) -> Rendered {
        match self {
            EmailTemplate::SignupCodeSent {
                first_name,
                last_name,
                code,
            } => Rendered {
                subject: "Signup Verification Code".to_string(),
                html: format!(
                    "{}<p>Thanks for signing up. Your verification code is <b>{}</b>.</p>",
                    greeting(first_name, last_name),
                    escape(code)
                ),
            },
            EmailTemplate::SignupCodeResent {
                first_name,
                last_name,
                code,
            } => Rendered {
                subject: "Signup Verification Code Resent".to_string(),
                html: format!(
                    "{}<p>Here is your new verification code: <b>{}</b>. Earlier codes no longer work.</p>",
                    greeting(first_name, last_name),
                    escape(code)
                ),
            },
            EmailTemplate::SignupCompleted {
                first_name,
                last_name,
            } => Rendered {
                subject: "Signup Completed".to_string(),
                html: format!(
                    "{}<p>Your account has been verified, you can now log in.</p>",
                    greeting(first_name, last_name)
                ),
            },
            EmailTemplate::ResetCodeSent {
                first_name,
                last_name,
                code,
            } => Rendered {
                subject: "Reset password code".to_string(),
                html: format!(
                    "{}<p>Use the code <b>{}</b> to choose a new password. \
                     If you did not ask for a reset, ignore this message.</p>",
                    greeting(first_name, last_name),
                    escape(code)
                ),
            },
            EmailTemplate::Audit { subject, body } => Rendered {
                subject: subject.to_string(),
                html: format!("<p>{}</p>", escape(body)),
            },
        }
    }
}
