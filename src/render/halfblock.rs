use crossterm::{
    cursor,
    style::{ResetColor, SetBackgroundColor, SetForegroundColor},
    Command,
};
use std::io::{self, Write};

use super::make_color;

pub type HalfblockCell = ([u8; 3], [u8; 3]);

pub const HALF_BLOCK: char = '\u{2584}';

// --- Downsample ---

/// Box-filters an RGB image onto a `term_cols x term_rows` grid of half-block cells.
///
/// Each cell covers two vertically stacked sub-pixels: the background paints the top one
/// and the `HALF_BLOCK` glyph paints the bottom one.
pub fn downsample_to_terminal(
    fb: &[[u8; 3]],
    width: usize,
    height: usize,
    term_cols: usize,
    term_rows: usize,
) -> Vec<HalfblockCell> {
    let mut out = vec![([0u8; 3], [0u8; 3]); term_cols * term_rows];
    if width == 0 || height == 0 {
        return out;
    }
    let sub_rows = term_rows * 2;

    let average = |x0: usize, x1: usize, y0: usize, y1: usize| -> [u8; 3] {
        let mut sum = [0u32; 3];
        let mut count = 0u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = fb[y * width + x];
                sum[0] += p[0] as u32;
                sum[1] += p[1] as u32;
                sum[2] += p[2] as u32;
                count += 1;
            }
        }
        if count == 0 {
            return [0, 0, 0];
        }
        [
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        ]
    };

    // Source span for destination cell `i` of `n`; never empty while the source has pixels.
    let span = |i: usize, n: usize, len: usize| {
        let start = i * len / n;
        let end = ((i + 1) * len / n).max(start + 1).min(len);
        (start.min(len - 1), end)
    };

    for term_row in 0..term_rows {
        let (top_y0, top_y1) = span(term_row * 2, sub_rows, height);
        let (bot_y0, bot_y1) = span(term_row * 2 + 1, sub_rows, height);
        for term_col in 0..term_cols {
            let (x0, x1) = span(term_col, term_cols, width);
            let top = average(x0, x1, top_y0, top_y1);
            let bottom = average(x0, x1, bot_y0, bot_y1);
            out[term_row * term_cols + term_col] = (top, bottom);
        }
    }

    out
}

// --- Output ---

fn write_ansi_command(buf: &mut String, command: impl Command) -> io::Result<()> {
    command
        .write_ansi(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "failed to encode ANSI command"))
}

/// Writes the cells row by row, only switching colors when they change.
pub fn write_halfblock_cells(
    cells: &[HalfblockCell],
    term_cols: usize,
    term_rows: usize,
    use_truecolor: bool,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let mut last_bg: Option<[u8; 3]> = None;
    let mut last_fg: Option<[u8; 3]> = None;
    let mut row_buf = String::with_capacity(term_cols * 8 + 32);

    for term_row in 0..term_rows {
        row_buf.clear();
        write_ansi_command(&mut row_buf, cursor::MoveToColumn(0))?;

        for x in 0..term_cols {
            let (top, bottom) = cells[term_row * term_cols + x];
            if last_bg != Some(top) {
                write_ansi_command(
                    &mut row_buf,
                    SetBackgroundColor(make_color(top[0], top[1], top[2], use_truecolor)),
                )?;
                last_bg = Some(top);
            }
            if last_fg != Some(bottom) {
                write_ansi_command(
                    &mut row_buf,
                    SetForegroundColor(make_color(
                        bottom[0],
                        bottom[1],
                        bottom[2],
                        use_truecolor,
                    )),
                )?;
                last_fg = Some(bottom);
            }
            row_buf.push(HALF_BLOCK);
        }

        write_ansi_command(&mut row_buf, ResetColor)?;
        row_buf.push('\n');
        last_bg = None;
        last_fg = None;
        stdout.write_all(row_buf.as_bytes())?;
    }
    stdout.flush()
}

/// Prints an RGB image to the terminal, fitted to `term_cols` columns while keeping the
/// image aspect ratio (one cell is two sub-pixels tall).
pub fn print_preview(
    fb: &[[u8; 3]],
    width: usize,
    height: usize,
    term_cols: usize,
    use_truecolor: bool,
    stdout: &mut impl Write,
) -> io::Result<()> {
    if width == 0 || height == 0 || term_cols == 0 {
        return Ok(());
    }
    let cols = term_cols.min(width);
    let term_rows = ((height * cols) / (width * 2)).max(1);
    let cells = downsample_to_terminal(fb, width, height, cols, term_rows);
    write_halfblock_cells(&cells, cols, term_rows, use_truecolor, stdout)
}

/// Truecolor support as advertised by the terminal environment.
pub fn detect_truecolor() -> bool {
    match std::env::var("COLORTERM") {
        Ok(val) => val == "truecolor" || val == "24bit",
        Err(_) => match std::env::var("TERM_PROGRAM") {
            Ok(prog) => prog != "Apple_Terminal",
            Err(_) => match std::env::var("TERM") {
                Ok(term) => {
                    term.contains("ghostty") || term.contains("kitty") || term.contains("wezterm")
                }
                Err(_) => false,
            },
        },
    }
}
