//! PHI masking engine.
//!
//! Spans from every detector are clamped to the text, collapsed so that no
//! two overlap, and spliced out in descending `start` order. Splicing from
//! the right keeps every not-yet-processed offset valid.

use std::collections::BTreeMap;

use psylens_core::models::phi::{MaskMode, MaskingMetadata, PhiSpan};

/// Replace every span in `text` with a mask token.
///
/// Returns the masked text and metadata describing what was masked. The
/// metadata never contains masked content. Detection completeness fields
/// are left at their defaults; the scrubber fills them in.
pub fn mask_phi(text: &str, spans: &[PhiSpan], mode: MaskMode) -> (String, MaskingMetadata) {
    let kept = collapse(normalize(text, spans));

    let mut masked = text.to_string();
    for span in kept.iter().rev() {
        masked.replace_range(span.start..span.end, &mode.token_for(&span.entity_type));
    }

    let mut entity_types_counted = BTreeMap::new();
    for span in &kept {
        *entity_types_counted
            .entry(span.entity_type.clone())
            .or_insert(0) += 1;
    }

    let metadata = MaskingMetadata {
        phi_detected: !kept.is_empty(),
        entity_count: kept.len(),
        entity_types_counted,
        ..MaskingMetadata::default()
    };

    (masked, metadata)
}

/// Clamp spans to the text and widen them outward to `char` boundaries.
/// Widening masks slightly more rather than splitting a character.
fn normalize(text: &str, spans: &[PhiSpan]) -> Vec<PhiSpan> {
    spans
        .iter()
        .filter_map(|span| {
            let mut start = span.start.min(text.len());
            let mut end = span.end.min(text.len());
            while !text.is_char_boundary(start) {
                start -= 1;
            }
            while !text.is_char_boundary(end) {
                end += 1;
            }
            (start < end).then(|| PhiSpan {
                start,
                end,
                ..span.clone()
            })
        })
        .collect()
}

/// Collapse overlapping spans into a disjoint set, ordered by `start`.
///
/// Spans fully inside a kept span are dropped (widest match wins).
/// Partially overlapping spans are merged into their union, labelled with
/// the type of the widest input span in the chain; the union's own width
/// never decides the label. Adjacent spans stay separate.
fn collapse(mut spans: Vec<PhiSpan>) -> Vec<PhiSpan> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    // Each kept span with the width of the input span that labels it.
    let mut kept: Vec<(PhiSpan, usize)> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some((last, label_len)) = kept.last_mut() {
            if last.contains(&span) {
                continue;
            }
            if last.overlaps(&span) {
                if span.len() > *label_len {
                    last.entity_type = span.entity_type.clone();
                    last.source = span.source;
                    *label_len = span.len();
                }
                last.end = last.end.max(span.end);
                continue;
            }
        }
        let len = span.len();
        kept.push((span, len));
    }
    kept.into_iter().map(|(span, _)| span).collect()
}

#[cfg(test)]
mod tests {
    use psylens_core::models::phi::DetectorId;

    use super::*;

    fn span(start: usize, end: usize, entity_type: &str) -> PhiSpan {
        PhiSpan::new(start, end, entity_type, DetectorId::Pattern)
    }

    #[test]
    fn masks_example_sentence() {
        let text = "Call Dr. Smith at 555-123-4567 tomorrow";
        let spans = vec![
            PhiSpan::new(5, 14, "NAME", DetectorId::ClinicalNer),
            span(18, 30, "PHONE"),
        ];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "Call [NAME] at [PHONE] tomorrow");
        assert!(meta.phi_detected);
        assert_eq!(meta.entity_count, 2);
        assert_eq!(meta.entity_types_counted["NAME"], 1);
        assert_eq!(meta.entity_types_counted["PHONE"], 1);
    }

    #[test]
    fn redaction_mode_uses_fixed_token() {
        let text = "Call Dr. Smith at 555-123-4567 tomorrow";
        let spans = vec![span(5, 14, "NAME"), span(18, 30, "PHONE")];
        let (masked, _) = mask_phi(text, &spans, MaskMode::Redaction);
        assert_eq!(masked, "Call [REDACTED] at [REDACTED] tomorrow");
    }

    #[test]
    fn no_spans_is_identity() {
        let (masked, meta) = mask_phi("nothing here", &[], MaskMode::Token);
        assert_eq!(masked, "nothing here");
        assert!(!meta.phi_detected);
        assert_eq!(meta.entity_count, 0);
        assert!(meta.entity_types_counted.is_empty());
    }

    #[test]
    fn contained_span_is_dropped() {
        // "Dr. Smith" (NER) contains "Smith" (pattern).
        let text = "Call Dr. Smith now";
        let spans = vec![span(9, 14, "SURNAME"), span(5, 14, "NAME")];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "Call [NAME] now");
        assert_eq!(meta.entity_count, 1);
    }

    #[test]
    fn duplicate_spans_count_once() {
        let text = "Call Dr. Smith now";
        let spans = vec![
            PhiSpan::new(5, 14, "NAME", DetectorId::ClinicalNer),
            span(5, 14, "NAME"),
        ];
        let (_, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(meta.entity_count, 1);
    }

    #[test]
    fn partial_overlap_is_merged_into_union() {
        let text = "seen 2024-03-01 12:30 in clinic";
        // DATE 5..15, and a wider DATETIME 10..21 overlapping its tail.
        let spans = vec![span(5, 15, "DATE"), span(10, 21, "DATETIME")];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "seen [DATETIME] in clinic");
        assert_eq!(meta.entity_count, 1);
        assert!(!masked.contains("12:30"));
        assert!(!masked.contains("2024"));
    }

    #[test]
    fn overlap_chain_is_labelled_by_widest_input_span() {
        let text = "0123456789abcdefghijklm rest";
        // DATE 0..10, X 5..14 (narrower), NAME 12..23 (widest input, but
        // narrower than the 0..14 union it extends).
        let spans = vec![span(0, 10, "DATE"), span(5, 14, "X"), span(12, 23, "NAME")];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "[NAME] rest");
        assert_eq!(meta.entity_count, 1);
    }

    #[test]
    fn adjacent_spans_stay_separate() {
        let text = "AAAABBBB rest";
        let spans = vec![span(0, 4, "A"), span(4, 8, "B")];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "[A][B] rest");
        assert_eq!(meta.entity_count, 2);
    }

    #[test]
    fn out_of_range_spans_are_clamped_or_dropped() {
        let text = "short";
        let spans = vec![span(3, 99, "X"), span(50, 60, "Y"), span(2, 2, "Z")];
        let (masked, meta) = mask_phi(text, &spans, MaskMode::Token);
        assert_eq!(masked, "sho[X]");
        assert_eq!(meta.entity_count, 1);
    }

    #[test]
    fn spans_are_widened_to_char_boundaries() {
        let text = "Zoë rang";
        // Byte 3 falls inside 'ë' (bytes 2..4).
        let (masked, _) = mask_phi(text, &[span(0, 3, "NAME")], MaskMode::Token);
        assert_eq!(masked, "[NAME] rang");
    }
}
