//! Plain-text grid tables for operator output.

/// Render `rows` under `headers` as a `+---+` bordered grid.
///
/// Rows shorter than the header are padded with empty cells.
pub fn render_grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = vec![rule(&widths, '-'), line(&widths, headers.iter().copied()), rule(&widths, '=')];
    for row in rows {
        out.push(line(&widths, row.iter().map(String::as_str)));
        out.push(rule(&widths, '-'));
    }
    out.join("\n")
}

fn rule(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.extend(std::iter::repeat(fill).take(w + 2));
        line.push('+');
    }
    line
}

fn line<'a>(widths: &[usize], mut cells: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::from("|");
    for w in widths {
        let cell = cells.next().unwrap_or("");
        let pad = w.saturating_sub(cell.chars().count());
        out.push(' ');
        out.push_str(cell);
        out.extend(std::iter::repeat(' ').take(pad + 1));
        out.push('|');
    }
    out
}

/// Grid with a `@@ title @@` banner, or a placeholder when there is nothing to show.
pub fn titled_grid(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        format!("@@ {} @@\n-- Nothing to display --\n", title)
    } else {
        format!("@@ {} @@\n{}\n", title, render_grid(headers, rows))
    }
}

/// Comma-joined list truncated to nine entries.
pub fn format_pids(pids: &[String]) -> String {
    let shown = pids.iter().take(9).map(String::as_str).collect::<Vec<_>>().join(", ");
    if pids.len() > 9 {
        format!("{}... ({} more)", shown, pids.len() - 9)
    } else {
        shown
    }
}
