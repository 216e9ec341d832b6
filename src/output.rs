//! Output formatting for search hits
//!
//! Plain output is one hit per line, tab separated, so it pipes cleanly into
//! `cut`/`awk`:
//!
//! ```text
//! keep_alive	ripple::Handoff	../structripple_1_1Handoff.html#a3
//! ```

use crate::index::types::resolve_anchor;
use crate::query::SearchHit;
use std::io::{self, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, WriteColor};

/// Parse a `--color` value into a termcolor choice
pub fn color_choice(value: &str) -> ColorChoice {
    match value {
        "always" => ColorChoice::Always,
        "never" => ColorChoice::Never,
        _ => {
            if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
    }
}

/// Anchor URL as printed: resolved to a `file://` URL when `resolve_dir` is set
pub fn display_url(hit: &SearchHit, resolve_dir: Option<&Path>) -> String {
    match resolve_dir {
        Some(dir) => resolve_anchor(&hit.anchor_url, dir),
        None => hit.anchor_url.clone(),
    }
}

/// Print hits as `label<TAB>scope<TAB>url`, highlighting the matched part of
/// the label
pub fn print_hits<W: WriteColor>(
    out: &mut W,
    hits: &[SearchHit],
    query: &str,
    resolve_dir: Option<&Path>,
) -> io::Result<()> {
    let needle = crate::query::normalize(query);

    for hit in hits {
        print_label(out, &hit.display_label, &needle)?;
        write!(out, "\t")?;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}", hit.scope_description)?;
        out.reset()?;
        write!(out, "\t")?;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "{}", display_url(hit, resolve_dir))?;
        out.reset()?;
        writeln!(out)?;
    }

    Ok(())
}

fn print_label<W: WriteColor>(out: &mut W, label: &str, needle: &str) -> io::Result<()> {
    // ASCII lowering keeps byte offsets aligned with `label`
    let found = if needle.is_empty() {
        None
    } else {
        label.to_ascii_lowercase().find(needle)
    };

    let Some(start) = found else {
        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "{}", label)?;
        return out.reset();
    };
    let end = start + needle.len();

    if start > 0 {
        write!(out, "{}", &label[..start])?;
    }
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(out, "{}", &label[start..end])?;
    out.reset()?;
    if end < label.len() {
        write!(out, "{}", &label[end..])?;
    }
    Ok(())
}

/// Print hits as a JSON array
pub fn print_json<W: Write>(out: &mut W, hits: &[SearchHit], resolve_dir: Option<&Path>) -> io::Result<()> {
    let hits: Vec<SearchHit> = hits
        .iter()
        .map(|hit| SearchHit {
            anchor_url: display_url(hit, resolve_dir),
            ..hit.clone()
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &hits)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{Section, SectionSet};
    use crate::query::MatchKind;
    use termcolor::Buffer;

    fn hit() -> SearchHit {
        SearchHit {
            display_label: "keep_alive".to_string(),
            anchor_url: "../structripple_1_1Handoff.html#a3".to_string(),
            scope_description: "ripple::Handoff".to_string(),
            token: "keep_alive".to_string(),
            token_len: 10,
            match_kind: MatchKind::Exact,
            sections: SectionSet::single(Section::All),
        }
    }

    #[test]
    fn test_plain_line() {
        let mut buf = Buffer::no_color();
        print_hits(&mut buf, &[hit()], "ALIVE", None).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert_eq!(text, "keep_alive\tripple::Handoff\t../structripple_1_1Handoff.html#a3\n");
    }

    #[test]
    fn test_resolved_line() {
        let mut buf = Buffer::no_color();
        print_hits(&mut buf, &[hit()], "keep", Some(Path::new("/docs/html/search"))).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert!(text.ends_with("file:///docs/html/structripple_1_1Handoff.html#a3\n"));
    }

    #[test]
    fn test_json_output() {
        let mut out = Vec::new();
        print_json(&mut out, &[hit()], None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["display_label"], "keep_alive");
        assert_eq!(value[0]["match_kind"], "exact");
        assert_eq!(value[0]["scope_description"], "ripple::Handoff");
    }

    #[test]
    fn test_color_choice() {
        assert_eq!(color_choice("always"), ColorChoice::Always);
        assert_eq!(color_choice("never"), ColorChoice::Never);
    }
}
