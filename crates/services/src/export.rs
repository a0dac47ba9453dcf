use chrono::{DateTime, SecondsFormat, Utc};

use sereno_transcription::TranscriptSegment;

/// Renders the finalized transcript as one `[HH:MM:SS] text` line per
/// segment, in creation order. Times are UTC.
pub fn render_transcript(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|seg| format!("[{}] {}", seg.created_at.format("%H:%M:%S"), seg.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Download name for an export taken at `now`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!(
        "transcricao-{}.txt",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn segment(text: &str, h: u32, m: u32, s: u32) -> TranscriptSegment {
        TranscriptSegment {
            id: format!("seg-{h}-{m}-{s}"),
            text: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 8, 28, h, m, s).unwrap(),
            is_final: true,
        }
    }

    #[test]
    fn test_render_lines_in_order() {
        let segments = vec![
            segment("Bom dia a todos", 14, 30, 5),
            segment("Vamos começar", 14, 30, 42),
        ];
        assert_eq!(
            render_transcript(&segments),
            "[14:30:05] Bom dia a todos\n[14:30:42] Vamos começar"
        );
    }

    #[test]
    fn test_render_empty_transcript() {
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn test_export_file_name() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 14, 30, 5).unwrap();
        assert_eq!(
            export_file_name(now),
            "transcricao-2026-08-28T14:30:05.000Z.txt"
        );
    }
}
