//! Audio-file filtering and the HTML5 player page.
//!
//! The listing for a directory is not a bare file index: it is a small
//! player application. The page carries an `<audio>` element, prev/next
//! controls, and an ordered list of the directory's music files; the
//! accompanying script (served from `_static_/`) drives playback.

use std::fmt::Write;

use tracing::warn;

/// Audio filename suffixes recognized by default, all lower case.
pub const STANDARD_AUDIO_FORMATS: &[&str] = &["mp3", "ogg", "wav", "flac", "aac", "wma"];

/// Whether `filename`'s suffix is in `formats`. A file without a suffix
/// never matches.
///
/// Suffix comparison is case-insensitive; `formats` members must already
/// be lower case.
pub fn is_matching_filename(filename: &str, formats: &[String]) -> bool {
    let Some((stem, suffix)) = filename.rsplit_once('.') else {
        warn!(filename, "unable to obtain suffix");
        return false;
    };
    if stem.is_empty() {
        // dotfiles like ".flac" have no stem to play
        return false;
    }
    formats.iter().any(|f| f.eq_ignore_ascii_case(suffix))
}

/// Filter `names` down to the audio files, preserving order.
pub fn filter_audio_files<'a>(names: &'a [String], formats: &[String]) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| is_matching_filename(name, formats))
        .map(String::as_str)
        .collect()
}

/// Render the player page for a directory.
///
/// `names` should already be sorted the way the tracks are to appear;
/// only audio files are shown. `client_debug` unhides the on-page debug
/// area, useful when chasing mobile browser quirks without a console.
pub fn render_player_page(
    names: &[String],
    dir_name: Option<&str>,
    formats: &[String],
    client_debug: bool,
) -> String {
    let tracks = filter_audio_files(names, formats);

    let title = match dir_name {
        Some(dir) => format!("Directory: {} ({} music files)", dir, tracks.len()),
        None => format!("{} music files", tracks.len()),
    };
    let title = escape_html(&title);

    let mut page = String::new();
    let _ = write!(page, "<!DOCTYPE html><head><title>{title}</title>");
    page.push_str("<link rel='stylesheet' type='text/css' href='_static_/player.css' />");
    page.push_str("</head>");
    let _ = write!(page, "<body><h1>{title}</h1>");
    page.push_str("<audio controls preload='auto'></audio>");
    page.push_str("<button id='prev'>&lt;&lt;</button>");
    page.push_str("<button id='next'>&gt;&gt;</button>");
    page.push_str("<div id='debug' class='hidden'>Debug text appears here</div>");
    page.push_str("<ol>");
    for (i, track) in tracks.iter().enumerate() {
        let _ = write!(page, "<li id='track-{i}'>{}</li>", escape_html(track));
    }
    page.push_str("</ol>");
    page.push_str("<script>");
    let quoted: Vec<String> = tracks.iter().map(|t| format!("\"{}\"", escape_js(t))).collect();
    let _ = write!(page, "var trackNames = [{}];", quoted.join(","));
    let _ = write!(page, "var clientDebugging = {client_debug};");
    page.push_str("</script>");
    page.push_str("<script src='_static_/player_control.js'></script>");
    page.push_str("</body></html>\n");
    page
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{filter_audio_files, is_matching_filename, render_player_page};

    fn formats() -> Vec<String> {
        super::STANDARD_AUDIO_FORMATS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suffix_matching_is_case_insensitive() {
        assert!(is_matching_filename("song.mp3", &formats()));
        assert!(is_matching_filename("song.MP3", &formats()));
        assert!(is_matching_filename("a.b.flac", &formats()));
        assert!(!is_matching_filename("song.txt", &formats()));
        assert!(!is_matching_filename("no-suffix", &formats()));
        assert!(!is_matching_filename(".flac", &formats()));
    }

    #[test]
    fn filter_keeps_only_audio_files() {
        let names: Vec<String> = ["cover.jpg", "one.mp3", "two.ogg", "README"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(vec!["one.mp3", "two.ogg"], filter_audio_files(&names, &formats()));
    }

    #[test]
    fn player_page_lists_tracks_in_order() {
        let names: Vec<String> = ["b.mp3", "notes.txt", "a.ogg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let page = render_player_page(&names, None, &formats(), false);

        assert!(page.contains("<title>2 music files</title>"));
        assert!(page.contains("<audio controls preload='auto'>"));
        assert!(page.contains("<li id='track-0'>b.mp3</li>"));
        assert!(page.contains("<li id='track-1'>a.ogg</li>"));
        assert!(page.contains("var trackNames = [\"b.mp3\",\"a.ogg\"];"));
        assert!(page.contains("var clientDebugging = false;"));
        assert!(!page.contains("notes.txt"));
    }

    #[test]
    fn player_page_escapes_markup_in_names() {
        let names = vec!["<script>.mp3".to_string()];
        let page = render_player_page(&names, Some("a & b"), &formats(), true);

        assert!(page.contains("Directory: a &amp; b (1 music files)"));
        assert!(page.contains("<li id='track-0'>&lt;script&gt;.mp3</li>"));
        assert!(page.contains("var clientDebugging = true;"));
    }
}
