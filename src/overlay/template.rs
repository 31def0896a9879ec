//! Placeholder substitution and drawtext escaping for overlay strings.
//!
//! Templates use `{token}` placeholders. Substitution is a single pass over
//! the template: substituted values are never rescanned, unknown tokens are
//! left verbatim, and the result does not depend on the order of the
//! replacement pairs.

/// Token for the track title in the track overlay template.
pub const TITLE: &str = "title";
/// Token for the track artist in the track overlay template.
pub const ARTIST: &str = "artist";
/// Token for the live broadcast title in the call-to-action template.
pub const LIVE_TITLE: &str = "live_title";
/// Token for the channel name in the call-to-action template.
pub const CHANNEL_NAME: &str = "channel_name";

/// Substitute `{token}` placeholders in `template` with the matching value.
///
/// Every occurrence of a known token is replaced. A `{...}` group whose name
/// is not in `values` (or an unterminated `{`) is copied through unchanged.
#[must_use]
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        // A nested '{' means this brace did not open a token; emit it and rescan
        // from the inner brace.
        if name.contains('{') {
            out.push('{');
            rest = after;
            continue;
        }

        match values.iter().find(|(token, _)| *token == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Build the track overlay string (`{title}`, `{artist}`).
#[must_use]
pub fn track_text(template: &str, title: &str, artist: &str) -> String {
    render(template, &[(TITLE, title), (ARTIST, artist)])
}

/// Build the call-to-action string (`{live_title}`, `{channel_name}`).
#[must_use]
pub fn cta_text(template: &str, live_title: &str, channel_name: &str) -> String {
    render(
        template,
        &[(LIVE_TITLE, live_title), (CHANNEL_NAME, channel_name)],
    )
}

/// Escape a display string for a quoted drawtext `text='...'` value.
///
/// Backslashes are doubled first so the escapes added for `:` and `'` are
/// not themselves re-escaped. Line breaks collapse to a single space.
#[must_use]
pub fn sanitize_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace("\r\n", " ")
        .replace(['\r', '\n'], " ")
}
