use crate::audio::track::Track;

/// Queue listing: the current track as `#1`, then up to `limit` upcoming entries numbered from
/// `#2`, then a `... y N más` line for whatever was left out. The whole text stays within
/// `budget` bytes.
pub fn render_queue<'a>(
    current: Option<&Track>,
    upcoming: impl Iterator<Item = &'a Track>,
    limit: usize,
    budget: usize,
) -> String {
    let upcoming: Vec<&Track> = upcoming.collect();
    // Peor caso del pie: todos ocultos
    let reserve = more_line(upcoming.len()).len();

    let mut out = String::new();
    if let Some(current) = current {
        let line = format!("► **#1** {current}\n");
        out.push_str(truncate(&line, budget.saturating_sub(reserve)));
    }

    let mut shown = 0usize;
    for (i, track) in upcoming.iter().enumerate().take(limit) {
        let line = format!("**#{}** {}\n", i + 2, track);
        let more_follow = i + 1 < upcoming.len();
        let needed = line.len() + if more_follow { reserve } else { 0 };
        if out.len() + needed > budget {
            break;
        }
        out.push_str(&line);
        shown += 1;
    }

    let hidden = upcoming.len() - shown;
    if hidden > 0 {
        out.push_str(&more_line(hidden));
    }
    out.trim_end().to_string()
}

fn more_line(hidden: usize) -> String {
    format!("*... y {hidden} más*")
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub fn search_results(results: &[Track]) -> String {
    let mut out = String::from("🔍 **Resultados** (usa `play <número>`)\n");
    for (i, track) in results.iter().enumerate() {
        out.push_str(&format!("**#{}** {}\n", i + 1, track));
    }
    out.trim_end().to_string()
}

pub fn tracks_added(tracks: &[Track]) -> String {
    match tracks {
        [track] => format!("➕ Agregado a la cola: {track}"),
        _ => format!("📋 Playlist agregada: {} canciones", tracks.len()),
    }
}
