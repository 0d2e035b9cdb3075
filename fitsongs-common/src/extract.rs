//! Workout page extraction
//!
//! Pattern matching against the page markup, nothing more. The markup is not
//! under our control; when it shifts, extraction comes back empty and the
//! pipeline treats that as a non-authoritative miss rather than caching it.
//!
//! Two passes: structured `application/ld+json` script blocks first, then a
//! fallback over the `song-lockup` figure markup.

use serde_json::Value;

use crate::model::{Song, WorkoutData, WorkoutMetadata};

const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Capability to turn fetched page content into metadata + songs.
pub trait WorkoutExtractor: Send + Sync {
    /// Extract whatever the markup yields; an empty playlist is a valid
    /// (untrusted) result, never an error.
    fn extract(&self, html: &str) -> WorkoutData;
}

/// Extractor for the current page markup.
#[derive(Debug, Default)]
pub struct DefaultExtractor;

impl WorkoutExtractor for DefaultExtractor {
    fn extract(&self, html: &str) -> WorkoutData {
        let metadata = extract_metadata(html);

        let mut songs = extract_from_ld_json(html);
        if songs.is_empty() {
            songs = extract_from_markup(html);
        }

        WorkoutData { metadata, songs }
    }
}

// --- metadata ---------------------------------------------------------------

fn extract_metadata(html: &str) -> WorkoutMetadata {
    let mut metadata = WorkoutMetadata::default();

    if let Some(block) = find_block_with_class(html, "<h1", "</h1>", "t-intro-elevated") {
        metadata.title = non_empty(inner_text(block));
    }

    if let Some(subcaption) = find_block_with_class(html, "<div", "</div>", "workout-subcaption") {
        classify_attributes(subcaption, &mut metadata);
    }

    metadata.trainer = find_trainer(html);
    metadata
}

/// Walk the subcaption attribute list and sort each entry into a field.
fn classify_attributes(subcaption: &str, metadata: &mut WorkoutMetadata) {
    let mut pos = 0;
    while let Some((start, end)) = next_tag_block_ci(subcaption, "<li", "</li>", pos) {
        pos = end;
        let block = &subcaption[start..end];
        if !open_tag(block).contains("metadata__attribute") {
            continue;
        }

        let text = inner_text(block);
        if text.is_empty() {
            continue;
        }

        if text.ends_with("min") {
            metadata.duration = Some(text);
        } else if text.starts_with("Ep") {
            metadata.episode = Some(text);
        } else if ["Cycle", "Strength", "Yoga", "HIIT"]
            .iter()
            .any(|kw| text.contains(kw))
        {
            metadata.workout_type = Some(text);
        } else if let Some((ts, te)) = next_tag_block_ci(block, "<time", "</time>", 0) {
            let time_block = &block[ts..te];
            metadata.date = non_empty(inner_text(time_block));
            metadata.datetime = tag_attr(open_tag(time_block), "datetime");
        } else if metadata.genre.is_none() {
            metadata.genre = Some(text);
        }
    }
}

fn find_trainer(html: &str) -> Option<String> {
    let mut pos = 0;
    while let Some((start, end)) = next_tag_block_ci(html, "<a", "</a>", pos) {
        pos = end;
        let block = &html[start..end];
        if let Some(href) = tag_attr(open_tag(block), "href") {
            if href.contains("/trainer/") {
                return non_empty(inner_text(block));
            }
        }
    }
    None
}

// --- songs: ld+json pass ----------------------------------------------------

fn extract_from_ld_json(html: &str) -> Vec<Song> {
    let mut songs = Vec::new();
    let mut pos = 0;

    while let Some((start, end)) = next_tag_block_ci(html, "<script", "</script>", pos) {
        pos = end;
        let block = &html[start..end];
        if !open_tag(block).contains("application/ld+json") {
            continue;
        }

        let Ok(value) = serde_json::from_str::<Value>(&inner_raw(block)) else {
            continue;
        };
        if value.is_object() && value.to_string().contains("workoutData") {
            collect_songs(&value, &mut songs);
        }
    }

    songs
}

/// Recursively search for playlist-shaped arrays anywhere in the document.
fn collect_songs(value: &Value, songs: &mut Vec<Song>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key_lc = key.to_ascii_lowercase();
                if matches!(key_lc.as_str(), "tracks" | "songs" | "playlist" | "music") {
                    if let Value::Array(items) = child {
                        songs.extend(items.iter().filter_map(parse_song_value));
                    }
                }
                collect_songs(child, songs);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_songs(item, songs);
            }
        }
        _ => {}
    }
}

fn parse_song_value(item: &Value) -> Option<Song> {
    let obj = item.as_object()?;

    let title = ["name", "title", "trackName"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))?
        .to_string();

    let artist = obj
        .get("artist")
        .or_else(|| obj.get("by"))
        .or_else(|| obj.get("performer"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(m) => m.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let apple_music_url = ["url", "link"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string);

    Some(Song {
        title,
        artist,
        apple_music_url,
    })
}

// --- songs: markup fallback -------------------------------------------------

fn extract_from_markup(html: &str) -> Vec<Song> {
    let mut songs = Vec::new();
    let mut pos = 0;

    while let Some((start, end)) = next_tag_block_ci(html, "<figure", "</figure>", pos) {
        pos = end;
        let figure = &html[start..end];
        if !open_tag(figure).contains("song-lockup") {
            continue;
        }

        let Some(title_link) = find_block_with_class(figure, "<a", "</a>", "song-lockup__song-name")
        else {
            continue;
        };

        let title = inner_text(title_link);
        if title.is_empty() {
            continue;
        }
        let apple_music_url = tag_attr(open_tag(title_link), "href");

        let artist = find_block_with_class(figure, "<div", "</div>", "song-lockup__artist-name")
            .map(inner_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

        songs.push(Song {
            title,
            artist,
            apple_music_url,
        });
    }

    songs
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// --- markup slicing helpers -------------------------------------------------

fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Find the next `open..close` tag block at or after `from`; returns byte
/// offsets of the whole block including both tags.
fn next_tag_block_ci(s: &str, open: &str, close: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let ol = to_lower(open);
    let cl = to_lower(close);
    let start = lc.get(from..)?.find(&ol)? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&cl)?;
    Some((start, open_end + end_rel + close.len()))
}

/// First block of the given tag whose opening tag mentions `class_token`.
fn find_block_with_class<'a>(
    s: &'a str,
    open: &str,
    close: &str,
    class_token: &str,
) -> Option<&'a str> {
    let mut pos = 0;
    while let Some((start, end)) = next_tag_block_ci(s, open, close, pos) {
        let block = &s[start..end];
        if open_tag(block).contains(class_token) {
            return Some(block);
        }
        pos = end;
    }
    None
}

/// The opening tag of a block, up to and including `>`.
fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(idx) => &block[..=idx],
        None => block,
    }
}

/// Attribute value from an opening tag, `name="value"` form only.
fn tag_attr(tag: &str, name: &str) -> Option<String> {
    let lc = to_lower(tag);
    let needle = format!("{}=\"", to_lower(name));
    let start = lc.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

/// Raw content between the opening and closing tags of a block.
fn inner_raw(block: &str) -> String {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return block[oe + 1..cs].to_string();
            }
        }
    }
    String::new()
}

/// Tag-stripped, whitespace-collapsed, entity-decoded text of a block.
fn inner_text(block: &str) -> String {
    let mut out = String::with_capacity(block.len());
    let mut in_tag = false;
    for ch in inner_raw(block).chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = out
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
