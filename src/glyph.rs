use anyhow::{anyhow, Context, Result};
use lyon::math::point;
use lyon::path::Path as LyonPath;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Hard cap on a fetched typeface; anything bigger is a broken source.
const MAX_TYPEFACE_BYTES: u64 = 16 * 1024 * 1024;

/// Advance used for characters the face has no glyph for, as a fraction
/// of the label height.
const MISSING_GLYPH_ADVANCE: f32 = 0.4;

/// Where the label typeface comes from. One fetch per scene instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphSource {
    Path(PathBuf),
    Url(String),
}

impl GlyphSource {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            GlyphSource::Url(raw.to_string())
        } else {
            GlyphSource::Path(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for GlyphSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlyphSource::Path(path) => write!(f, "{}", path.display()),
            GlyphSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Anything that can turn label text into geometry. Implemented by the
/// resolved typeface; tests substitute a fixed-quad shaper.
pub trait LabelShaper {
    /// Returns `None` when the text produces no geometry (for example,
    /// all whitespace).
    fn shape_label(&self, text: &str, height: f32) -> Option<crate::mesh::Mesh>;
}

/// Parsed label typeface, shared read-only once resolved. The raw bytes
/// are kept and the face is re-parsed per shaping call; parsing is a
/// zero-copy header walk, and storing the face would borrow from our own
/// field.
pub struct GlyphResource {
    data: Arc<Vec<u8>>,
    units_per_em: f32,
}

impl GlyphResource {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let face =
            ttf_parser::Face::parse(&bytes, 0).map_err(|err| anyhow!("typeface parse failed: {err}"))?;
        let units_per_em = face.units_per_em();
        if units_per_em == 0 {
            return Err(anyhow!("typeface reports zero units per em"));
        }
        Ok(Self { data: Arc::new(bytes), units_per_em: f32::from(units_per_em) })
    }
}

impl LabelShaper for GlyphResource {
    fn shape_label(&self, text: &str, height: f32) -> Option<crate::mesh::Mesh> {
        let face = ttf_parser::Face::parse(&self.data, 0).ok()?;
        let scale = height / self.units_per_em;
        let mut outline = OutlineAccumulator::new(scale);
        let mut pen_x = 0.0f32;
        for ch in text.chars() {
            match face.glyph_index(ch) {
                Some(glyph) => {
                    outline.set_pen(pen_x);
                    // Whitespace has no outline; the pen still advances.
                    let _ = face.outline_glyph(glyph, &mut outline);
                    let advance = face.glyph_hor_advance(glyph).unwrap_or(0);
                    pen_x += f32::from(advance) * scale;
                }
                None => pen_x += height * MISSING_GLYPH_ADVANCE,
            }
        }
        let path = outline.build();

        let mut tessellator = FillTessellator::new();
        let mut geometry: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
        tessellator
            .tessellate_path(
                &path,
                &FillOptions::tolerance(height / 64.0),
                &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
                    [vertex.position().x, vertex.position().y]
                }),
            )
            .ok()?;
        if geometry.indices.is_empty() {
            return None;
        }
        let mut mesh = crate::mesh::Mesh::from_flat_triangles(&geometry.vertices, geometry.indices, 0.0);
        mesh.recenter();
        Some(mesh)
    }
}

/// Collects `ttf-parser` outline callbacks into one lyon path, scaled to
/// label units and offset by the running pen position.
struct OutlineAccumulator {
    builder: lyon::path::Builder,
    scale: f32,
    pen_x: f32,
    contour_open: bool,
}

impl OutlineAccumulator {
    fn new(scale: f32) -> Self {
        Self { builder: LyonPath::builder(), scale, pen_x: 0.0, contour_open: false }
    }

    fn set_pen(&mut self, pen_x: f32) {
        self.pen_x = pen_x;
    }

    fn map(&self, x: f32, y: f32) -> lyon::math::Point {
        point(self.pen_x + x * self.scale, y * self.scale)
    }

    fn build(mut self) -> LyonPath {
        if self.contour_open {
            self.builder.close();
        }
        self.builder.build()
    }
}

impl ttf_parser::OutlineBuilder for OutlineAccumulator {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.contour_open {
            self.builder.close();
        }
        let at = self.map(x, y);
        self.builder.begin(at);
        self.contour_open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let to = self.map(x, y);
        self.builder.line_to(to);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let ctrl = self.map(x1, y1);
        let to = self.map(x, y);
        self.builder.quadratic_bezier_to(ctrl, to);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let ctrl1 = self.map(x1, y1);
        let ctrl2 = self.map(x2, y2);
        let to = self.map(x, y);
        self.builder.cubic_bezier_to(ctrl1, ctrl2, to);
    }

    fn close(&mut self) {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
    }
}

#[derive(Clone)]
enum GlyphState {
    Pending,
    Ready(Arc<GlyphResource>),
    Failed,
}

/// One-shot asynchronous typeface load. The worker thread reads and
/// parses the source; the owning scene polls once per frame. The shared
/// cancellation token is checked by the worker before sending and by
/// `poll` before accepting, so a resolution that lands after `cancel()`
/// cannot mutate anything.
pub struct GlyphLoader {
    state: GlyphState,
    cancel: Arc<AtomicBool>,
    rx: Receiver<Result<GlyphResource>>,
}

impl GlyphLoader {
    pub fn spawn(source: GlyphSource) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let token = Arc::clone(&cancel);
        let (tx, rx) = channel();
        thread::spawn(move || {
            let result = fetch_source(&source).and_then(GlyphResource::from_bytes);
            if token.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(result);
        });
        Self { state: GlyphState::Pending, cancel, rx }
    }

    /// Non-blocking. Returns true exactly when the resource became ready
    /// during this call; the caller uses that edge to trigger the first
    /// synchronization pass.
    pub fn poll(&mut self) -> bool {
        if !matches!(self.state, GlyphState::Pending) {
            return false;
        }
        if self.cancel.load(Ordering::SeqCst) {
            return false;
        }
        match self.rx.try_recv() {
            Ok(Ok(resource)) => {
                self.state = GlyphState::Ready(Arc::new(resource));
                true
            }
            Ok(Err(err)) => {
                eprintln!("[glyph] typeface load failed: {err:?}");
                self.state = GlyphState::Failed;
                false
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                eprintln!("[glyph] typeface loader exited without a result");
                self.state = GlyphState::Failed;
                false
            }
        }
    }

    pub fn resource(&self) -> Option<&Arc<GlyphResource>> {
        match &self.state {
            GlyphState::Ready(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, GlyphState::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, GlyphState::Pending) && !self.cancel.load(Ordering::SeqCst)
    }

    /// Structural teardown signal. After this call the loader never
    /// transitions again, whatever the worker does.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn fetch_source(source: &GlyphSource) -> Result<Vec<u8>> {
    match source {
        GlyphSource::Path(path) => {
            fs::read(path).with_context(|| format!("Failed to read typeface {}", path.display()))
        }
        GlyphSource::Url(url) => {
            let response =
                ureq::get(url).call().with_context(|| format!("Typeface request to {url} failed"))?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_TYPEFACE_BYTES)
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to read typeface body from {url}"))?;
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn poll_until_settled(loader: &mut GlyphLoader) {
        for _ in 0..200 {
            if loader.poll() || !loader.is_pending() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn source_parse_distinguishes_urls_from_paths() {
        assert_eq!(
            GlyphSource::parse("https://fonts.local/label.ttf"),
            GlyphSource::Url("https://fonts.local/label.ttf".to_string())
        );
        assert_eq!(GlyphSource::parse("assets/fonts/label.ttf"), GlyphSource::Path("assets/fonts/label.ttf".into()));
    }

    #[test]
    fn garbage_bytes_do_not_parse() {
        assert!(GlyphResource::from_bytes(vec![0u8; 32]).is_err());
    }

    #[test]
    fn missing_file_fails_and_stays_unready() {
        let mut loader = GlyphLoader::spawn(GlyphSource::Path("no/such/typeface.ttf".into()));
        poll_until_settled(&mut loader);
        assert!(!loader.is_ready());
        assert!(!loader.is_pending());
        assert!(loader.resource().is_none());
        // Failure is terminal; further polls are no-ops.
        assert!(!loader.poll());
    }

    #[test]
    fn cancel_suppresses_late_resolutions() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[0u8; 64]).expect("write bytes");
        let mut loader = GlyphLoader::spawn(GlyphSource::Path(file.path().to_path_buf()));
        loader.cancel();
        // Give the worker ample time to finish either side of the token check.
        thread::sleep(Duration::from_millis(50));
        for _ in 0..10 {
            assert!(!loader.poll());
        }
        assert!(!loader.is_ready());
        assert!(!loader.is_pending());
    }
}
