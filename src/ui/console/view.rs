use crate::debugger::StackSnapshot;
use crate::ui::console::print::style::LineNumberView;
use itertools::Itertools;

/// Render source lines of the snapshot routine around the current line.
///
/// Line numbers are 1-based, the current line is marked with `>`.
pub fn render_source(snapshot: &StackSnapshot, bounds: usize) -> String {
    let routine = snapshot.routine();
    let current = snapshot.absolute_line();
    let start = current.saturating_sub(bounds);
    let end = (current + bounds + 1).min(routine.line_count());

    (start..end)
        .filter_map(|idx| routine.line(idx).map(|line| (idx, line)))
        .map(|(idx, line)| {
            let marker = if idx == current { ">" } else { " " };
            let number = format!("{:>4}", idx + 1);
            format!("{marker}{} {line}", LineNumberView::from(number))
        })
        .join("\n")
}
