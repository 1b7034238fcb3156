//! Preview pane: the display sink for frames forwarded by the scheduler.
//!
//! Each terminal cell shows two pixels stacked vertically with `▀`: the
//! foreground is the upper pixel and the background the lower one. Frames are
//! scaled nearest-neighbour to fit the pane, aspect ratio preserved.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    style::Color,
    text::Line,
    widgets::Paragraph,
    Frame,
};

use rtsp_proto::protocol::{PixelFormat, RawFrame, SessionState};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_muted, C_BADGE_REC},
    widgets::pane_chrome::{pane_chrome, Badge},
};

const HALF_BLOCK: &str = "▀";

/// Receives frames on the UI thread.
pub trait DisplaySink {
    /// Show `frame`. `None` means the tick produced nothing; the last frame
    /// stays up.
    fn present(&mut self, frame: Option<RawFrame>);
}

/// A frame reduced to terminal cells: `(upper, lower)` colour per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct HalfBlockImage {
    pub cols: u16,
    pub rows: u16,
    pub cells: Vec<([u8; 3], [u8; 3])>,
}

/// Largest `(width, height)` in pixels with the source's aspect ratio that fits
/// in `max_w` x `max_h`. Zero only when the bounds are zero.
pub fn fit(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 || max_w == 0 || max_h == 0 {
        return (0, 0);
    }
    // Compare max_w/src_w against max_h/src_h without floats.
    if max_w as u64 * src_h as u64 <= max_h as u64 * src_w as u64 {
        let h = (src_h as u64 * max_w as u64 / src_w as u64).max(1) as u32;
        (max_w, h.min(max_h))
    } else {
        let w = (src_w as u64 * max_h as u64 / src_h as u64).max(1) as u32;
        (w.min(max_w), max_h)
    }
}

/// Nearest-neighbour downscale of `frame` into at most `cols` x `rows` cells.
pub fn half_blocks(frame: &RawFrame, cols: u16, rows: u16) -> HalfBlockImage {
    let (w, h) = fit(frame.width(), frame.height(), cols as u32, rows as u32 * 2);
    let out_rows = h.div_ceil(2);
    let mut cells = Vec::with_capacity((w * out_rows) as usize);

    let sample = |x: u32, y: u32| -> [u8; 3] {
        let sx = (x as u64 * frame.width() as u64 / w as u64) as u32;
        let sy = (y as u64 * frame.height() as u64 / h as u64) as u32;
        frame.pixel(sx, sy)
    };

    for row in 0..out_rows {
        let top = row * 2;
        for x in 0..w {
            let upper = sample(x, top);
            // Odd height: the last row's lower half repeats the upper pixel.
            let lower = if top + 1 < h { sample(x, top + 1) } else { upper };
            cells.push((upper, lower));
        }
    }

    HalfBlockImage {
        cols: w as u16,
        rows: out_rows as u16,
        cells,
    }
}

fn rgb(p: [u8; 3]) -> Color {
    Color::Rgb(p[0], p[1], p[2])
}

#[derive(Default)]
pub struct PreviewPane {
    frame: Option<RawFrame>,
    /// Last conversion, reused while neither the frame nor the pane size changed.
    cache: Option<HalfBlockImage>,
    presented: u64,
}

impl PreviewPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Forget the picture and the count, ready for a new session.
    pub fn clear(&mut self) {
        self.frame = None;
        self.cache = None;
        self.presented = 0;
    }

    fn image_for(&mut self, cols: u16, rows: u16) -> Option<&HalfBlockImage> {
        let frame = self.frame.as_ref()?;
        let stale = match &self.cache {
            Some(img) => {
                let (w, h) = fit(frame.width(), frame.height(), cols as u32, rows as u32 * 2);
                img.cols as u32 != w || img.rows as u32 != h.div_ceil(2)
            }
            None => true,
        };
        if stale {
            self.cache = Some(half_blocks(frame, cols, rows));
        }
        self.cache.as_ref()
    }
}

impl DisplaySink for PreviewPane {
    fn present(&mut self, frame: Option<RawFrame>) {
        let Some(frame) = frame else {
            return;
        };
        if frame.format() != PixelFormat::Rgb24 {
            return;
        }
        self.frame = Some(frame);
        self.cache = None;
        self.presented += 1;
    }
}

impl Component for PreviewPane {
    fn id(&self) -> ComponentId {
        ComponentId::Preview
    }

    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if matches!(action, Action::Stop) {
            self.clear();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let badge = match state.session {
            SessionState::Running => Some(Badge {
                text: "● REC",
                color: C_BADGE_REC,
            }),
            _ => None,
        };
        let block = pane_chrome("preview", focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(image) = self.image_for(inner.width, inner.height) else {
            let hint = match state.session {
                SessionState::Starting => " connecting…",
                SessionState::Running => " waiting for first frame…",
                _ => " enter a camera URL above and press Enter",
            };
            frame.render_widget(Paragraph::new(Line::styled(hint, style_muted())), inner);
            return;
        };

        // Center the picture in the pane.
        let x0 = inner.x + (inner.width - image.cols) / 2;
        let y0 = inner.y + (inner.height - image.rows) / 2;
        let buf = frame.buffer_mut();
        for row in 0..image.rows {
            for col in 0..image.cols {
                let (upper, lower) = image.cells[(row as usize) * image.cols as usize + col as usize];
                if let Some(cell) = buf.cell_mut((x0 + col, y0 + row)) {
                    cell.set_symbol(HALF_BLOCK).set_fg(rgb(upper)).set_bg(rgb(lower));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half red, right half blue; top row bright, rest dark.
    fn test_frame(w: u32, h: u32) -> RawFrame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if y == 0 { 255 } else { 100 };
                if x < w / 2 {
                    data.extend([v, 0, 0]);
                } else {
                    data.extend([0, 0, v]);
                }
            }
        }
        RawFrame::from_bytes(w, h, data).unwrap()
    }

    #[test]
    fn test_fit_preserves_aspect() {
        // 16:9 into a wide box is height-bound.
        assert_eq!(fit(1920, 1080, 200, 90), (160, 90));
        // ...and into a tall box is width-bound.
        assert_eq!(fit(1920, 1080, 80, 200), (80, 45));
        // Never larger than the box.
        assert_eq!(fit(4, 4, 2, 10), (2, 2));
        assert_eq!(fit(640, 360, 0, 10), (0, 0));
        assert_eq!(fit(2, 1000, 10, 10), (1, 10));
    }

    #[test]
    fn test_half_blocks_geometry() {
        let img = half_blocks(&test_frame(1920, 1080), 80, 24);
        // 24 rows hold 48 pixel rows; 16:9 at 48 high is 85 wide > 80, so width-bound.
        assert_eq!(img.cols, 80);
        assert_eq!(img.rows, 23);
        assert_eq!(img.cells.len(), 80 * 23);
    }

    #[test]
    fn test_half_blocks_sample_nearest() {
        let img = half_blocks(&test_frame(4, 4), 4, 2);
        assert_eq!((img.cols, img.rows), (4, 2));
        // First cell: top pixel of the red half over the dark row below it.
        assert_eq!(img.cells[0], ([255, 0, 0], [100, 0, 0]));
        // Last column of the first row is blue.
        assert_eq!(img.cells[3], ([0, 0, 255], [0, 0, 100]));
        assert_eq!(img.cells[4], ([100, 0, 0], [100, 0, 0]));
    }

    #[test]
    fn test_odd_height_repeats_last_row() {
        let img = half_blocks(&test_frame(2, 3), 2, 2);
        assert_eq!((img.cols, img.rows), (2, 2));
        assert_eq!(img.cells[2].0, img.cells[2].1);
    }

    #[test]
    fn test_present_ignores_empty_ticks() {
        let mut pane = PreviewPane::new();
        pane.present(None);
        assert!(!pane.has_frame());
        assert_eq!(pane.presented(), 0);

        pane.present(Some(test_frame(4, 4)));
        pane.present(None);
        assert!(pane.has_frame());
        assert_eq!(pane.presented(), 1);
    }

    #[test]
    fn test_cache_follows_pane_size() {
        let mut pane = PreviewPane::new();
        assert!(pane.image_for(10, 10).is_none());
        pane.present(Some(test_frame(8, 8)));
        assert_eq!(pane.image_for(4, 2).map(|i| (i.cols, i.rows)), Some((4, 2)));
        assert_eq!(pane.image_for(8, 4).map(|i| (i.cols, i.rows)), Some((8, 4)));
    }
}
