//! Overlapping sliding-window text chunker.
//!
//! Splits a source's extracted text into [`Segment`]s of at most
//! `chunk_size` characters, preferring to break on whitespace so a token is
//! never split when a whitespace boundary is available inside the window.
//! Consecutive segments share `overlap` characters, so content near a
//! boundary appears in both neighbors and retrieval keeps some redundancy.
//!
//! Offsets are character positions into the trimmed input; the same input
//! and parameters always produce the same segments.

use crate::models::Segment;

/// Split `text` into overlapping segments.
///
/// The input is trimmed first; empty or whitespace-only text yields zero
/// segments (callers treat that as "no extractable text"). Requires
/// `overlap < chunk_size`, which [`crate::config::load_config`] enforces.
///
/// Each segment starts `overlap` characters before the end of its
/// predecessor. A window that would split mid-token is shortened to end just
/// after the last whitespace inside it, unless that would land inside the
/// overlap region and stall progress.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Segment> {
    debug_assert!(chunk_size > 0 && overlap < chunk_size);

    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let window_end = (start + chunk_size).min(chars.len());
        let mut end = window_end;

        // Only shorten to a whitespace boundary when the window is full;
        // the final partial window keeps the tail intact.
        if window_end < chars.len() {
            if let Some(pos) = chars[start..window_end]
                .iter()
                .rposition(|c| c.is_whitespace())
            {
                let candidate = start + pos + 1;
                // Breaking inside the overlap region would make the next
                // segment start at or before this one.
                if candidate > start + overlap {
                    end = candidate;
                }
            }
        }

        segments.push(Segment {
            content: chars[start..end].iter().collect(),
            index,
            char_start: start as i64,
            char_end: end as i64,
        });

        if end == chars.len() {
            break;
        }
        start = end - overlap;
        index += 1;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the original text from segments by dropping each segment's
    /// overlap with its predecessor.
    fn reconstruct(segments: &[Segment]) -> String {
        let mut out: Vec<char> = Vec::new();
        for seg in segments {
            let chars: Vec<char> = seg.content.chars().collect();
            let already = out.len() as i64 - seg.char_start;
            assert!(already >= 0, "gap before segment {}", seg.index);
            out.extend(&chars[already as usize..]);
        }
        out.into_iter().collect()
    }

    #[test]
    fn short_text_single_segment() {
        let segments = chunk_text("Hello, world!", 1000, 200);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[0].content, "Hello, world!");
        assert_eq!(segments[0].char_start, 0);
        assert_eq!(segments[0].char_end, 13);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\t  ", 1000, 200).is_empty());
    }

    #[test]
    fn nonblank_text_always_yields_segments() {
        assert_eq!(chunk_text("x", 1000, 200).len(), 1);
    }

    #[test]
    fn indices_contiguous_from_zero() {
        let text = "word ".repeat(500);
        let segments = chunk_text(&text, 100, 20);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index, i as i64);
        }
    }

    #[test]
    fn reconstruction_is_exact() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(60);
        let trimmed = text.trim().to_string();
        let segments = chunk_text(&text, 120, 30);
        assert_eq!(reconstruct(&segments), trimmed);
    }

    #[test]
    fn reconstruction_is_exact_without_whitespace() {
        let text: String = ('a'..='z').cycle().take(5000).collect();
        let segments = chunk_text(&text, 300, 50);
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn breaks_on_whitespace_inside_window() {
        // 10-char words; every full window ends right after a space.
        let text = "abcdefghi ".repeat(50);
        let segments = chunk_text(&text, 95, 20);
        for seg in &segments[..segments.len() - 1] {
            assert!(
                seg.content.ends_with(' '),
                "segment {} split mid-token: {:?}",
                seg.index,
                &seg.content[seg.content.len().saturating_sub(12)..]
            );
        }
    }

    #[test]
    fn segments_never_exceed_chunk_size() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        for seg in chunk_text(&text, 137, 41) {
            assert!(seg.content.chars().count() <= 137);
        }
    }

    #[test]
    fn consecutive_segments_share_overlap() {
        let text: String = ('a'..='z').cycle().take(10_000).collect();
        let segments = chunk_text(&text, 1000, 200);
        for pair in segments.windows(2) {
            let shared = pair[0].char_end - pair[1].char_start;
            assert!(shared >= 200, "only {} chars shared", shared);
        }
    }

    #[test]
    fn ten_thousand_chars_step_scenario() {
        // New content per step = chunk_size - overlap = 800, so a
        // 10,000-char text produces ceil(10000 / 800) = 13 segments.
        let text: String = ('a'..='z').cycle().take(10_000).collect();
        let segments = chunk_text(&text, 1000, 200);
        assert_eq!(segments.len(), 13);
        for seg in &segments {
            assert!(seg.content.chars().count() <= 1000);
        }
        assert_eq!(segments.last().unwrap().char_end, 10_000);
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta. ".repeat(40);
        let a = chunk_text(&text, 90, 15);
        let b = chunk_text(&text, 90, 15);
        assert_eq!(a, b);
    }

    #[test]
    fn offsets_are_character_positions() {
        // Multibyte input: offsets count chars, not bytes.
        let text = "é".repeat(250);
        let segments = chunk_text(&text, 100, 10);
        assert_eq!(segments[0].char_end, 100);
        assert_eq!(segments[1].char_start, 90);
        assert_eq!(segments.last().unwrap().char_end, 250);
    }
}
