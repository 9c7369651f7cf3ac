//! `${VAR}` placeholder expansion for config files.
//!
//! Keeps bot tokens and other credentials out of the config file itself:
//! write `token = "${SUPPORT_BOT_TOKEN}"` and export the variable instead.

/// Expand `${VAR}` and `${VAR:-default}` placeholders against the process
/// environment. A variable that is unset and has no default is left verbatim
/// so validation can point at it.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            // Unterminated placeholder, emit the remainder untouched.
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&expand(&tail[..end], &lookup));
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}

fn expand(placeholder: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let (name, default) = match placeholder.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (placeholder, None),
    };

    if name.is_empty() {
        return format!("${{{placeholder}}}");
    }
    match lookup(name) {
        Some(value) => value,
        None => match default {
            Some(d) => d.to_string(),
            None => format!("${{{placeholder}}}"),
        },
    }
}
