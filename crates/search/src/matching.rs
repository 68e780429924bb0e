//! Exact label matching: the entities a dragged label currently stands for.

use canvas_core::{EntityKind, LabelPair, Labeled};

/// Entities whose labels contain exactly `label`. Empty when nothing matches.
pub fn find_by_label<'a, T: Labeled>(entities: &'a [T], label: &LabelPair) -> Vec<&'a T> {
    entities.iter().filter(|e| e.has_label(&label.key, &label.value)).collect()
}

/// Tooltip line for a label chip.
pub fn match_summary(kind: EntityKind, count: usize) -> String {
    if count == 0 {
        format!("No matching {}", kind.plural())
    } else {
        format!("Matching {} {}(s)", count, kind.as_str())
    }
}
