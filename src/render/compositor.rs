//! Scrolling note compositor.
//!
//! New note marks are painted into a history surface that is wider than the
//! viewport and circular along x. Every frame the strip the head will reach
//! next is recycled and the window right behind the head is copied into the
//! visible surface, so per-frame cost does not grow with history length.

use rand::Rng;

use super::style::{sanitize, NoteStyle};
use super::surface::{Region, Rgb, Surface, SurfaceError};
use crate::audio::notes::{emphasis_bias, loudest, NoteVector, TOTAL_NOTES};

/// History columns beyond the viewport width.
pub const EXTRA_WIDTH: u32 = 100;
/// Share of the viewport showing history; the rest is the "now" area.
pub const VISIBLE_FRACTION: f32 = 0.75;
/// Slack on each side of the recycled strip.
pub const RECYCLE_MARGIN: i64 = 5;
/// Largest radius a mark can have (full loudness).
pub const MAX_MARK_RADIUS: i64 = 17;

const ACTIVE_THRESHOLD: f32 = 0.5;
const GRAPH_SCALE: f32 = 25.0;
const GRAPH_OFFSET: f32 = 75.0;

/// Contiguous run of physical history columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: i64,
    pub len: i64,
}

/// Circular x-axis of the history surface. Every wrap goes through here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapAxis {
    width: i64,
}

impl WrapAxis {
    pub fn new(width: u32) -> Self {
        Self {
            width: width.max(1) as i64,
        }
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn wrap(&self, x: i64) -> i64 {
        x.rem_euclid(self.width)
    }

    pub fn wrap_f32(&self, x: f32) -> f32 {
        x.rem_euclid(self.width as f32)
    }

    /// Physical spans of the logical range `[start, start + len)`, in logical
    /// order. At most two; the second always starts at column 0.
    pub fn split(&self, start: i64, len: i64) -> Vec<Span> {
        let len = len.clamp(0, self.width);
        if len == 0 {
            return Vec::new();
        }
        let start = self.wrap(start);
        let first = len.min(self.width - start);
        let mut spans = vec![Span { start, len: first }];
        if first < len {
            spans.push(Span {
                start: 0,
                len: len - first,
            });
        }
        spans
    }
}

/// Paint position in the history surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollHead {
    position: i64,
    step: i64,
}

impl ScrollHead {
    pub fn new(step: u32) -> Self {
        Self {
            position: 0,
            step: step as i64,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn advance(&mut self, axis: &WrapAxis) {
        self.position = axis.wrap(self.position + self.step);
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

/// One set of notes to paint this frame.
pub struct NoteLayer<'a> {
    pub notes: &'a NoteVector,
    /// Columns ahead of the head where the marks spawn.
    pub offset: i64,
    /// Multiplier on loudness for color only.
    pub brightness: f32,
}

/// Live drawing parameters for one frame.
pub struct FrameParams<'a> {
    pub zoom: f32,
    pub drift: f32,
    pub emphasis: &'a [f32],
}

/// Vertical center of a key's row; low keys sit low, zoom scales around the
/// middle of the surface.
pub fn key_y(key: usize, height: f32, zoom: f32) -> f32 {
    let row = height / TOTAL_NOTES as f32;
    let zoom_offset = height / 2.0 * (zoom - 1.0);
    (TOTAL_NOTES - key - 1) as f32 * row * zoom - zoom_offset
}

pub struct ScrollCompositor<S: Surface> {
    history: S,
    visible: S,
    axis: WrapAxis,
    scroll_step: i64,
    show_emphasis_graph: bool,
}

impl<S: Surface> ScrollCompositor<S> {
    pub fn new(
        history: S,
        visible: S,
        width: u32,
        height: u32,
        scroll_step: u32,
        show_emphasis_graph: bool,
    ) -> Result<Self, SurfaceError> {
        let mut compositor = Self {
            history,
            visible,
            axis: WrapAxis::new(width + EXTRA_WIDTH),
            scroll_step: scroll_step as i64,
            show_emphasis_graph,
        };
        compositor.resize(width, height)?;
        Ok(compositor)
    }

    /// Resizes to a new viewport. Both surfaces start out blank.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.history.resize(width + EXTRA_WIDTH, height)?;
        self.visible.resize(width, height)?;
        self.axis = WrapAxis::new(width + EXTRA_WIDTH);
        Ok(())
    }

    pub fn axis(&self) -> &WrapAxis {
        &self.axis
    }

    pub fn visible(&self) -> &S {
        &self.visible
    }

    /// Width of the scrolling history window inside the viewport.
    pub fn visible_width(&self) -> i64 {
        (self.visible.width() as f32 * VISIBLE_FRACTION).round() as i64
    }

    /// How far ahead of the head a mark may spawn without being recycled
    /// before the head reaches it.
    pub fn max_spawn_offset(&self) -> i64 {
        let lead = self.axis.width() - self.visible_width() - self.scroll_step - RECYCLE_MARGIN;
        (lead - MAX_MARK_RADIUS).max(0)
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.visible.clear();
    }

    /// Paints a layer's marks into history at `head + offset`.
    pub fn paint<R: Rng>(
        &mut self,
        head: i64,
        layer: &NoteLayer<'_>,
        style: &dyn NoteStyle,
        params: &FrameParams<'_>,
        rng: &mut R,
    ) {
        let height = self.history.height() as f32;
        let width = self.axis.width() as f32;
        let spawn_x = self.axis.wrap(head + layer.offset) as f32;
        let drift = if params.drift.is_finite() {
            params.drift.max(0.0)
        } else {
            0.0
        };

        for (key, &energy) in layer.notes.iter().enumerate() {
            let energy = sanitize(energy);
            let x_drift = rng.gen::<f32>() * drift - drift / 2.0;
            let y_drift = rng.gen::<f32>() * drift - drift / 2.0;
            let radius = style.radius(energy);
            if radius <= 0.0 {
                continue;
            }

            let color = style.color(key, energy * layer.brightness);
            let x = self.axis.wrap_f32(spawn_x + x_drift);
            let y = key_y(key, height, params.zoom) + y_drift;

            self.history.fill_circle(color, x, y, radius);
            // Marks straddling the seam get their other half on the far side.
            if x + radius > width {
                self.history.fill_circle(color, x - width, y, radius);
            } else if x - radius < 0.0 {
                self.history.fill_circle(color, x + width, y, radius);
            }
        }
    }

    /// Clears the strip the head will paint over next.
    pub fn recycle(&mut self, head: i64) {
        let height = self.history.height();
        let start = head - self.visible_width() - self.scroll_step - RECYCLE_MARGIN;
        let len = self.scroll_step + 2 * RECYCLE_MARGIN;
        for span in self.axis.split(start, len) {
            self.history
                .clear_rect(Region::new(span.start as i32, 0, span.len as u32, height));
        }
    }

    /// History spans behind the head and the visible x each one lands at.
    pub fn composite_plan(&self, head: i64) -> Vec<(Span, i64)> {
        let visible_width = self.visible_width();
        let mut dst_x = 0;
        self.axis
            .split(head - visible_width, visible_width)
            .into_iter()
            .map(|span| {
                let placed = (span, dst_x);
                dst_x += span.len;
                placed
            })
            .collect()
    }

    /// Rebuilds the visible surface from the history window behind the head.
    pub fn composite(&mut self, head: i64) {
        self.visible.clear();
        let height = self.visible.height();
        for (span, dst_x) in self.composite_plan(head) {
            let len = span.len as u32;
            self.history.copy_region(
                Region::new(span.start as i32, 0, len, height),
                &mut self.visible,
                Region::new(dst_x as i32, 0, len, height),
            );
        }
    }

    /// Draws the loud keys at the "now" line and the emphasis graph. Not
    /// persisted into history.
    pub fn overlay(&mut self, notes: &NoteVector, style: &dyn NoteStyle, params: &FrameParams<'_>) {
        let height = self.visible.height() as f32;
        let now_x = self.visible_width() as f32;
        let peak = loudest(notes);

        for (key, &energy) in notes.iter().enumerate() {
            let y = key_y(key, height, params.zoom);

            let energy = sanitize(energy);
            if peak > 0.0 && energy / peak > ACTIVE_THRESHOLD {
                self.visible
                    .fill_circle(Rgb::WHITE, now_x, y, style.radius(energy));
            }

            if self.show_emphasis_graph {
                let weight = GRAPH_SCALE * emphasis_bias(key as f32, params.emphasis);
                if weight > 0.0 && weight.is_finite() {
                    self.visible.fill_circle(
                        style.color(11, weight / 15.0),
                        now_x + GRAPH_OFFSET - weight,
                        y,
                        weight / 3.0,
                    );
                }
            }
        }
    }

    /// Visible x where a look-ahead layer shows. The "now" area stands in for
    /// the lead: the largest spawn offset lands on the right edge.
    pub fn preview_x(&self, offset: i64) -> f32 {
        let now_x = self.visible_width() as f32;
        let area = self.visible.width() as f32 - now_x;
        let max_offset = self.max_spawn_offset();
        if max_offset == 0 {
            return now_x;
        }
        now_x + area * offset.clamp(0, max_offset) as f32 / max_offset as f32
    }

    /// Draws a look-ahead layer's loud keys into the "now" area, in their
    /// own colors at the layer's brightness. Not persisted into history.
    pub fn preview(&mut self, layer: &NoteLayer<'_>, style: &dyn NoteStyle, params: &FrameParams<'_>) {
        let peak = loudest(layer.notes);
        if peak <= 0.0 {
            return;
        }
        let height = self.visible.height() as f32;
        let x = self.preview_x(layer.offset);

        for (key, &energy) in layer.notes.iter().enumerate() {
            let energy = sanitize(energy);
            if energy / peak > ACTIVE_THRESHOLD {
                let color = style.color(key, energy * layer.brightness);
                self.visible
                    .fill_circle(color, x, key_y(key, height, params.zoom), style.radius(energy));
            }
        }
    }

    /// Full frame: paint every layer in order, recycle, composite, show the
    /// look-ahead layers, then overlay `active`.
    pub fn render_frame<R: Rng>(
        &mut self,
        head: i64,
        layers: &[NoteLayer<'_>],
        active: &NoteVector,
        style: &dyn NoteStyle,
        params: &FrameParams<'_>,
        rng: &mut R,
    ) {
        for layer in layers {
            self.paint(head, layer, style, params, rng);
        }
        self.recycle(head);
        self.composite(head);
        for layer in layers.iter().filter(|layer| layer.offset > 0) {
            self.preview(layer, style, params);
        }
        self.overlay(active, style, params);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::notes::SILENCE;
    use crate::render::style::PitchClassStyle;
    use crate::render::surface::Canvas;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Op {
        Circle { x: f32, y: f32, radius: f32, color: Rgb },
        Rect,
        Clear(Region),
        CopyIn { src: Region, dst: Region },
    }

    /// Surface that only records what was asked of it.
    #[derive(Default)]
    pub struct RecordingSurface {
        pub width: u32,
        pub height: u32,
        pub ops: Vec<Op>,
    }

    impl RecordingSurface {
        pub fn circles(&self) -> Vec<(f32, f32, f32)> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Circle { x, y, radius, .. } => Some((*x, *y, *radius)),
                    _ => None,
                })
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn fill_circle(&mut self, color: Rgb, x: f32, y: f32, radius: f32) {
            self.ops.push(Op::Circle { x, y, radius, color });
        }

        fn fill_rect(&mut self, _color: Rgb, _x: f32, _y: f32, _width: f32, _height: f32) {
            self.ops.push(Op::Rect);
        }

        fn clear_rect(&mut self, region: Region) {
            self.ops.push(Op::Clear(region));
        }

        fn copy_region(&self, src: Region, dst: &mut Self, dst_rect: Region) {
            dst.ops.push(Op::CopyIn { src, dst: dst_rect });
        }

        fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
            self.width = width;
            self.height = height;
            self.ops.clear();
            Ok(())
        }
    }

    fn recording(width: u32, height: u32) -> ScrollCompositor<RecordingSurface> {
        ScrollCompositor::new(
            RecordingSurface::default(),
            RecordingSurface::default(),
            width,
            height,
            5,
            false,
        )
        .unwrap()
    }

    fn still() -> FrameParams<'static> {
        FrameParams {
            zoom: 1.0,
            drift: 0.0,
            emphasis: &[25.0, 54.0, 80.0],
        }
    }

    const STYLE: PitchClassStyle = PitchClassStyle { brightness: 0.5 };

    #[test]
    fn split_handles_the_seam() {
        let axis = WrapAxis::new(100);
        assert_eq!(axis.split(10, 20), vec![Span { start: 10, len: 20 }]);
        assert_eq!(
            axis.split(90, 20),
            vec![Span { start: 90, len: 10 }, Span { start: 0, len: 10 }]
        );
        assert_eq!(
            axis.split(-5, 10),
            vec![Span { start: 95, len: 5 }, Span { start: 0, len: 5 }]
        );
        assert_eq!(axis.split(0, 0), vec![]);
        assert_eq!(axis.split(30, 500), vec![Span { start: 30, len: 70 }, Span { start: 0, len: 30 }]);
    }

    #[test]
    fn head_returns_home_after_a_full_lap() {
        let axis = WrapAxis::new(1380);
        let mut head = ScrollHead::new(5);
        for tick in 1..=(1380 / 5) {
            head.advance(&axis);
            if tick < 1380 / 5 {
                assert_ne!(head.position(), 0);
            }
        }
        assert_eq!(head.position(), 0);
    }

    #[test]
    fn composite_plan_covers_the_window_exactly() {
        let compositor = recording(400, 108);
        let visible_width = compositor.visible_width();
        assert_eq!(visible_width, 300);

        for head in 0..compositor.axis().width() {
            let plan = compositor.composite_plan(head);
            assert!(!plan.is_empty() && plan.len() <= 2, "head {}", head);

            let mut expected_dst = 0;
            let mut logical = head - visible_width;
            for (span, dst_x) in &plan {
                assert_eq!(*dst_x, expected_dst);
                assert_eq!(span.start, compositor.axis().wrap(logical));
                expected_dst += span.len;
                logical += span.len;
            }
            assert_eq!(expected_dst, visible_width);
            assert_eq!(logical, head);

            if head >= visible_width {
                assert_eq!(plan.len(), 1);
            }
        }
    }

    #[test]
    fn composite_copies_history_pixels_into_place() {
        let mut compositor =
            ScrollCompositor::new(Canvas::new(1, 1).unwrap(), Canvas::new(1, 1).unwrap(), 40, 10, 5, false)
                .unwrap();
        // history width 140, window 30 wide
        compositor.history.fill_rect(Rgb::WHITE, 5.0, 0.0, 1.0, 10.0);
        compositor.history.fill_rect(Rgb::WHITE, 125.0, 0.0, 1.0, 10.0);

        compositor.composite(10);

        let alpha = |x: u32| compositor.visible().data()[((5 * 40 + x) * 4 + 3) as usize];
        // column 125 sits 15 columns behind the seam, column 5 after it
        assert_eq!(alpha(5), 255);
        assert_eq!(alpha(25), 255);
        assert_eq!(alpha(6), 0);
        assert_eq!(alpha(24), 0);
        assert_eq!(alpha(35), 0);
    }

    #[test]
    fn recycle_splits_across_the_seam() {
        let mut compositor = recording(400, 108);
        // window 300, history 500; strip starts at 0 - 300 - 5 - 5 = -310
        compositor.recycle(0);
        assert_eq!(
            compositor.history.ops,
            vec![Op::Clear(Region::new(190, 0, 15, 108))]
        );

        compositor.history.ops.clear();
        compositor.recycle(305);
        assert_eq!(
            compositor.history.ops,
            vec![
                Op::Clear(Region::new(495, 0, 5, 108)),
                Op::Clear(Region::new(0, 0, 10, 108)),
            ]
        );
    }

    #[test]
    fn recycled_strip_never_touches_the_visible_window() {
        let compositor = recording(400, 108);
        let axis = *compositor.axis();
        let visible_width = compositor.visible_width();
        let head = 123;
        let window: Vec<i64> = (head - visible_width..head).map(|x| axis.wrap(x)).collect();
        let strip = head - visible_width - 5 - RECYCLE_MARGIN;
        for span in axis.split(strip, 5 + 2 * RECYCLE_MARGIN) {
            for x in span.start..span.start + span.len {
                // Only the trailing margin may overlap the oldest columns.
                if window.contains(&x) {
                    let age = window.iter().position(|&w| w == x).unwrap() as i64;
                    assert!(age < RECYCLE_MARGIN);
                }
            }
        }
    }

    #[test]
    fn silence_paints_nothing() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(7);
        let layer = NoteLayer {
            notes: &SILENCE,
            offset: 0,
            brightness: 1.0,
        };
        compositor.render_frame(0, &[layer], &SILENCE, &STYLE, &still(), &mut rng);

        assert!(compositor.history.circles().is_empty());
        assert!(compositor.visible().circles().is_empty());
    }

    #[test]
    fn nan_notes_are_painted_as_silence() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(7);
        let notes = [f32::NAN; TOTAL_NOTES];
        let layer = NoteLayer {
            notes: &notes,
            offset: 0,
            brightness: 1.0,
        };
        compositor.render_frame(0, &[layer], &notes, &STYLE, &still(), &mut rng);
        assert!(compositor.history.circles().is_empty());
        assert!(compositor.visible().circles().is_empty());
    }

    #[test]
    fn paint_lands_at_head_plus_offset_in_key_rows() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(1);
        let mut notes = SILENCE;
        notes[0] = 1.0;
        notes[107] = 1.0;
        let layer = NoteLayer {
            notes: &notes,
            offset: 40,
            brightness: 1.0,
        };
        compositor.paint(100, &layer, &STYLE, &still(), &mut rng);

        let circles = compositor.history.circles();
        assert_eq!(circles, vec![(140.0, 107.0, 17.0), (140.0, 0.0, 17.0)]);
    }

    #[test]
    fn marks_on_the_seam_are_drawn_twice() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(1);
        let mut notes = SILENCE;
        notes[50] = 1.0;
        let layer = NoteLayer {
            notes: &notes,
            offset: 0,
            brightness: 1.0,
        };
        compositor.paint(495, &layer, &STYLE, &still(), &mut rng);

        let xs: Vec<f32> = compositor.history.circles().iter().map(|c| c.0).collect();
        assert_eq!(xs, vec![495.0, -5.0]);
    }

    #[test]
    fn drift_stays_within_half_its_magnitude() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(99);
        let notes = [1.0; TOTAL_NOTES];
        let layer = NoteLayer {
            notes: &notes,
            offset: 0,
            brightness: 1.0,
        };
        let params = FrameParams {
            drift: 4.0,
            ..still()
        };
        compositor.paint(200, &layer, &STYLE, &params, &mut rng);

        for (key, (x, y, _)) in compositor.history.circles().into_iter().enumerate() {
            assert!((x - 200.0).abs() <= 2.0);
            assert!((y - key_y(key, 108.0, 1.0)).abs() <= 2.0);
        }
    }

    #[test]
    fn overlay_marks_only_keys_above_half_the_peak() {
        let mut compositor = recording(400, 108);
        let mut notes = SILENCE;
        notes[10] = 0.8;
        notes[20] = 0.5;
        notes[30] = 0.3;
        compositor.overlay(&notes, &STYLE, &still());

        let circles = compositor.visible().circles();
        assert_eq!(circles.len(), 2);
        assert!(circles.iter().all(|c| c.0 == 300.0));
    }

    #[test]
    fn lead_maps_into_the_now_area() {
        let compositor = recording(400, 108);
        // now area is [300, 400), the largest lead is 173
        assert_eq!(compositor.preview_x(0), 300.0);
        assert_eq!(compositor.preview_x(173), 400.0);
        assert_eq!(compositor.preview_x(500), 400.0);
        let mid = compositor.preview_x(150);
        assert!(mid > 300.0 && mid < 400.0);
    }

    #[test]
    fn look_ahead_layer_shows_ahead_of_now() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(3);
        let mut upcoming = SILENCE;
        upcoming[49] = 0.6;
        upcoming[20] = 0.1;
        let layers = [
            NoteLayer {
                notes: &upcoming,
                offset: 150,
                brightness: 0.35,
            },
            NoteLayer {
                notes: &SILENCE,
                offset: 0,
                brightness: 1.0,
            },
        ];
        compositor.render_frame(0, &layers, &SILENCE, &STYLE, &still(), &mut rng);

        let circles = compositor.visible().circles();
        assert_eq!(circles.len(), 1);
        let (x, y, radius) = circles[0];
        assert_eq!(x, compositor.preview_x(150));
        assert!(x > 300.0);
        assert_eq!(y, key_y(49, 108.0, 1.0));
        assert_eq!(radius, STYLE.radius(0.6));
    }

    #[test]
    fn active_layer_is_never_shown_as_look_ahead() {
        let mut compositor = recording(400, 108);
        let mut rng = StdRng::seed_from_u64(3);
        let mut notes = SILENCE;
        notes[49] = 0.6;
        let layer = NoteLayer {
            notes: &notes,
            offset: 0,
            brightness: 1.0,
        };
        compositor.render_frame(0, &[layer], &SILENCE, &STYLE, &still(), &mut rng);
        assert!(compositor.visible().circles().is_empty());
    }

    #[test]
    fn emphasis_graph_is_optional() {
        let mut compositor = ScrollCompositor::new(
            RecordingSurface::default(),
            RecordingSurface::default(),
            400,
            108,
            5,
            true,
        )
        .unwrap();
        compositor.overlay(&SILENCE, &STYLE, &still());
        assert_eq!(compositor.visible().circles().len(), TOTAL_NOTES);
    }

    #[test]
    fn spawn_offset_stays_ahead_of_the_recycled_strip() {
        let compositor = recording(400, 108);
        // 500 - 300 - 5 - 5 - 17
        assert_eq!(compositor.max_spawn_offset(), 173);
    }

    #[test]
    fn key_rows_flip_and_zoom_around_the_middle() {
        assert_eq!(key_y(107, 108.0, 1.0), 0.0);
        assert_eq!(key_y(0, 108.0, 1.0), 107.0);
        // at 2x the middle row stays put
        assert_eq!(key_y(53, 108.0, 2.0), key_y(53, 108.0, 1.0) * 2.0 - 54.0);
    }
}
